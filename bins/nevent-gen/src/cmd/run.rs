use std::sync::Arc;

use stream_api::{EventSource, Role};
use stream_engine::{
    ControlState, Controller, Generator, GeneratorConfig, open_transport, select_codec,
};

use super::config::Effective;
use super::error::NeventGenError;
use super::source::{FileSource, SyntheticSource};

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(eff: &Effective) -> Result<(), NeventGenError> {
    if eff.listen {
        run_listen(eff)
    } else {
        run_produce(eff).await
    }
}

// ═══════════════════════════════════════════════════════════════
//  Producer mode
// ═══════════════════════════════════════════════════════════════

async fn run_produce(eff: &Effective) -> Result<(), NeventGenError> {
    let mut source: Box<dyn EventSource> = match &eff.file {
        Some(path) => {
            tracing::info!(file = %path, "replaying event file");
            Box::new(FileSource::open(path)?)
        }
        None => {
            tracing::info!(seed = eff.seed, "generating synthetic events");
            Box::new(SyntheticSource::new(eff.seed, eff.heartbeat_every))
        }
    };

    let mut cfg = GeneratorConfig::new(eff.transport_config(Role::Transmitter));
    cfg.codec = eff.codec;
    cfg.transport = eff.transport;
    cfg.multiplier = eff.multiplier;
    cfg.bytes = eff.bytes;
    cfg.rate = eff.rate;
    cfg.report_time = eff.report_time;

    let (controller, handle) = Controller::new(eff.initial_state);
    let mut generator = Generator::from_config(&cfg, handle)?;

    println!("Neutron Event Generator");
    println!("  producer : {} / {}", eff.uri.brokers.join(","), eff.uri.topic);
    println!("  codec    : {:?} over {:?}", eff.codec, eff.transport);
    if eff.rate > 0.0 {
        println!("  rate     : {:.1} packet/s", eff.rate);
    }
    println!("  status   : {}", eff.initial_state);
    println!();
    println!("Commands: run | pause | stop  (Ctrl+C to stop)");
    println!();

    let controller = Arc::new(controller);
    spawn_command_reader(controller.clone());

    let ctrl_c = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.request(ControlState::Stop);
        }
    });

    let stats = generator.run(source.as_mut()).await?;
    println!(
        "done: {} packets, {} events, {} bytes ({} encode / {} send errors)",
        stats.packets, stats.events, stats.bytes, stats.encode_errors, stats.send_errors
    );
    Ok(())
}

/// stdin control surface. The thread lives until EOF or `stop`; it is
/// detached and dies with the process.
fn spawn_command_reader(controller: Arc<Controller>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            match line.trim() {
                "run" => {
                    controller.request(ControlState::Run);
                }
                "pause" => {
                    controller.request(ControlState::Pause);
                }
                "stop" | "q" | "quit" => {
                    controller.request(ControlState::Stop);
                    break;
                }
                "" => {}
                other => {
                    println!("  unknown command: {other} (run | pause | stop)");
                }
            }
        }
    });
}

// ═══════════════════════════════════════════════════════════════
//  Listen mode
// ═══════════════════════════════════════════════════════════════

/// Receiver counterpart: subscribe, decode, log. Ends when the peer
/// closes the stream.
fn run_listen(eff: &Effective) -> Result<(), NeventGenError> {
    let codec = select_codec(eff.codec);
    let mut transport = open_transport(eff.transport, &eff.transport_config(Role::Receiver))?;

    println!("Neutron Event Listener");
    println!("  source : {} / {}", eff.uri.brokers.join(","), eff.uri.topic);
    println!();

    let mut packets = 0u64;
    let mut events = 0u64;
    loop {
        let frames = match transport.recv() {
            Ok(frames) => frames,
            Err(e) if e.kind() == stream_api::ErrorKind::Connect => {
                tracing::info!(error = %e, "stream closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "receive failed");
                continue;
            }
        };
        match codec.decode(&frames) {
            Ok((header, batch)) => {
                packets += 1;
                events += header.event_count;
                if header.is_heartbeat() {
                    tracing::info!(pid = header.packet_id, "heartbeat");
                } else {
                    tracing::info!(
                        pid = header.packet_id,
                        events = header.event_count,
                        bytes = batch.byte_len(),
                        "packet"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "undecodable envelope"),
        }
    }
    transport.close();

    println!("received: {packets} packets, {events} events");
    Ok(())
}
