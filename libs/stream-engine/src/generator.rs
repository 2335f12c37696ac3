//! The send loop: pull a chunk, stamp a header, encode, transmit, pace.
//!
//! One generator owns one codec and one transport for its whole run.
//! Packet ids are allocated per attempted cycle, so a cycle skipped on
//! an encode or send failure leaves a visible gap in the id sequence on
//! the receiving side.

use std::time::{Duration, Instant};

use stream_api::{
    EnvelopeCodec, ErrorKind, EventBatch, EventSource, PacketHeader, StreamError, StreamTransport,
};

use crate::codec::select_codec;
use crate::config::{GeneratorConfig, SizingMode};
use crate::control::{ControlHandle, ControlState};
use crate::transport::open_transport;

/// Totals for one complete run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Envelopes handed to the transport, heartbeats included.
    pub packets: u64,
    /// Event records across all sent envelopes.
    pub events: u64,
    /// Payload bytes across all sent envelopes (framing excluded).
    pub bytes: u64,
    /// Cycles skipped because the codec rejected the packet.
    pub encode_errors: u64,
    /// Cycles skipped on a per-send transport failure.
    pub send_errors: u64,
}

pub struct Generator {
    codec: Box<dyn EnvelopeCodec>,
    transport: Box<dyn StreamTransport>,
    sizing: SizingMode,
    /// Packets per second; 0 means unthrottled.
    rate: f64,
    report_every: Duration,
    control: ControlHandle,
    next_pid: u64,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("sizing", &self.sizing)
            .field("rate", &self.rate)
            .field("next_pid", &self.next_pid)
            .finish_non_exhaustive()
    }
}

impl Generator {
    /// Build from a finished configuration. Sizing is validated before
    /// the transport is opened, so a config conflict never touches the
    /// network.
    pub fn from_config(cfg: &GeneratorConfig, control: ControlHandle) -> Result<Self, StreamError> {
        let sizing = cfg.sizing()?;
        let codec = select_codec(cfg.codec);
        let transport = open_transport(cfg.transport, &cfg.transport_config)?;
        Ok(Self::with_parts(codec, transport, sizing, cfg.rate, cfg.report_time, control))
    }

    /// Assemble from already-built parts.
    pub fn with_parts(
        codec: Box<dyn EnvelopeCodec>,
        transport: Box<dyn StreamTransport>,
        sizing: SizingMode,
        rate: f64,
        report_time: u64,
        control: ControlHandle,
    ) -> Self {
        Self {
            codec,
            transport,
            sizing,
            rate,
            report_every: Duration::from_secs(report_time.max(1)),
            control,
            next_pid: 0,
        }
    }

    /// Drive the source until it is exhausted or the control state goes
    /// to `Stop`. The transport is closed on every exit path; a lost
    /// connection ([`ErrorKind::Connect`]) aborts the run.
    pub async fn run(&mut self, source: &mut dyn EventSource) -> Result<RunStats, StreamError> {
        let mut stats = RunStats::default();
        // A batch still owed further cycles in multiplier mode.
        let mut pending: Option<(EventBatch, u32)> = None;

        let mut pacer = if self.rate > 0.0 {
            let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / self.rate));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the
            // post-send tick already paces the first cycle.
            interval.tick().await;
            Some(interval)
        } else {
            None
        };

        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut reported = RunStats::default();

        let outcome = loop {
            match self.control.state() {
                ControlState::Stop => break Ok(()),
                ControlState::Pause => {
                    tracing::info!("generator paused");
                    if self.control.wait_resume().await == ControlState::Stop {
                        break Ok(());
                    }
                    tracing::info!("generator resumed");
                }
                ControlState::Run => {}
            }

            let batch = match pending.take() {
                Some((batch, remaining)) => {
                    if remaining > 1 {
                        pending = Some((batch.clone(), remaining - 1));
                    }
                    batch
                }
                None => match self.next_chunk(source, &mut pending)? {
                    Some(batch) => batch,
                    None => {
                        tracing::info!("source exhausted");
                        break Ok(());
                    }
                },
            };

            let pid = self.next_pid;
            self.next_pid += 1;
            let header = PacketHeader::for_batch(pid, &batch);

            let frames = match self.codec.encode(&header, &batch) {
                Ok(frames) => frames,
                Err(e) => {
                    stats.encode_errors += 1;
                    tracing::warn!(pid, error = %e, "encode failed, cycle skipped");
                    continue;
                }
            };

            match self.transport.send(&frames) {
                Ok(res) => {
                    stats.packets += 1;
                    stats.events += header.event_count;
                    stats.bytes += res.bytes as u64;
                }
                Err(e) if e.kind() == ErrorKind::Connect => break Err(e),
                Err(e) => {
                    stats.send_errors += 1;
                    tracing::warn!(pid, error = %e, "send failed, cycle skipped");
                }
            }

            if let Some(pacer) = pacer.as_mut() {
                pacer.tick().await;
            }

            if last_report.elapsed() >= self.report_every {
                report_progress(&stats, &reported, last_report.elapsed());
                reported = stats;
                last_report = Instant::now();
            }
        };

        self.transport.close();
        tracing::info!(
            packets = stats.packets,
            events = stats.events,
            bytes = stats.bytes,
            encode_errors = stats.encode_errors,
            send_errors = stats.send_errors,
            elapsed_s = started.elapsed().as_secs_f64(),
            "run finished"
        );
        outcome.map(|()| stats)
    }

    /// Pull the next chunk from the source, shaped by the sizing mode.
    /// `None` means the source is exhausted.
    fn next_chunk(
        &mut self,
        source: &mut dyn EventSource,
        pending: &mut Option<(EventBatch, u32)>,
    ) -> Result<Option<EventBatch>, StreamError> {
        match self.sizing {
            SizingMode::Natural => source.next_batch(usize::MAX),
            SizingMode::Multiplier(n) => {
                let Some(batch) = source.next_batch(usize::MAX)? else {
                    return Ok(None);
                };
                if n > 1 {
                    *pending = Some((batch.clone(), n - 1));
                }
                Ok(Some(batch))
            }
            SizingMode::Records(target) => {
                let Some(batch) = source.next_batch(target)? else {
                    return Ok(None);
                };
                // An empty batch stays a heartbeat; anything else is
                // replicated up and cut down to the exact budget.
                if batch.is_empty() || batch.len() == target {
                    return Ok(Some(batch));
                }
                let mut sized = batch.clone();
                while sized.len() < target {
                    sized.extend_from(&batch);
                }
                sized.truncate(target);
                Ok(Some(sized))
            }
        }
    }
}

fn report_progress(total: &RunStats, prev: &RunStats, window: Duration) {
    let secs = window.as_secs_f64().max(f64::EPSILON);
    tracing::info!(
        packets = total.packets,
        packet_rate = (total.packets - prev.packets) as f64 / secs,
        event_rate = (total.events - prev.events) as f64 / secs,
        byte_rate = (total.bytes - prev.bytes) as f64 / secs,
        encode_errors = total.encode_errors,
        send_errors = total.send_errors,
        "progress"
    );
}
