use clap::Args;
use serde::Deserialize;

use stream_api::{Role, TransportConfig};
use stream_engine::{CodecKind, ControlState, TransportKind};

use super::error::NeventGenError;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Producer destination, `//host:port[,host:port...]/topic`.
    pub producer: Option<String>,
    pub codec: Option<CodecKind>,
    pub transport: Option<TransportKind>,
    pub multiplier: Option<u32>,
    pub bytes: Option<usize>,
    pub rate: Option<f64>,
    pub report_time: Option<u64>,
    /// Initial control state, `run` or `pause`.
    pub status: Option<ControlState>,
    pub file: Option<String>,
    pub seed: Option<i64>,
    /// Emit an empty (heartbeat) batch every Nth synthetic pull. 0 = never.
    pub heartbeat_every: Option<u64>,
    /// Backend tuning options, forwarded verbatim to the transport.
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, String>,
}

pub fn load_config(path: &str) -> Result<Config, NeventGenError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| NeventGenError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content)
        .map_err(|e| NeventGenError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct GenArgs {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml", env = "NEVENT_GEN_CONFIG")]
    pub config: String,

    /// Destination URI: //host:port[,host:port...]/topic
    #[arg(long)]
    pub producer: Option<String>,

    /// Envelope codec: passthrough | packed
    #[arg(long)]
    pub codec: Option<String>,

    /// Transport backend: broker | socket
    #[arg(long)]
    pub transport: Option<String>,

    /// Send each source batch N times (conflicts with --bytes)
    #[arg(long)]
    pub multiplier: Option<u32>,

    /// Target chunk size in bytes per packet (conflicts with --multiplier)
    #[arg(long)]
    pub bytes: Option<usize>,

    /// Packets per second (0 = unthrottled)
    #[arg(long)]
    pub rate: Option<f64>,

    /// Seconds between progress reports
    #[arg(long)]
    pub report_time: Option<u64>,

    /// Event file to replay (8-byte LE records). Without it, synthetic events
    #[arg(long)]
    pub file: Option<String>,

    /// PRNG seed for synthetic events (0 = current time)
    #[arg(long)]
    pub seed: Option<i64>,

    /// Emit an empty heartbeat batch every Nth synthetic pull (0 = never)
    #[arg(long)]
    pub heartbeat_every: Option<u64>,

    /// Start in the running state instead of paused
    #[arg(long)]
    pub run: bool,

    /// Receiver mode: subscribe, decode and log incoming packets
    #[arg(long)]
    pub listen: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Producer URI
// ═══════════════════════════════════════════════════════════════

/// Parsed `//host:port[,host:port...]/topic` destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerUri {
    pub brokers: Vec<String>,
    pub topic: String,
}

pub fn parse_producer_uri(uri: &str) -> Result<ProducerUri, NeventGenError> {
    let rest = uri
        .strip_prefix("//")
        .ok_or_else(|| NeventGenError::Config(format!("producer URI must start with //: {uri}")))?;
    let (hosts, topic) = rest
        .split_once('/')
        .ok_or_else(|| NeventGenError::Config(format!("producer URI is missing /topic: {uri}")))?;
    if topic.is_empty() {
        return Err(NeventGenError::Config(format!(
            "producer URI has an empty topic: {uri}"
        )));
    }

    let mut brokers = Vec::new();
    for entry in hosts.split(',') {
        let (host, port) = entry.split_once(':').ok_or_else(|| {
            NeventGenError::Config(format!("broker {entry:?} is missing a port in {uri}"))
        })?;
        if host.is_empty() {
            return Err(NeventGenError::Config(format!(
                "broker {entry:?} has an empty host in {uri}"
            )));
        }
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NeventGenError::Config(format!(
                "broker {entry:?} has a bad port in {uri}"
            )));
        }
        brokers.push(entry.to_string());
    }
    if brokers.is_empty() {
        return Err(NeventGenError::Config(format!(
            "producer URI has no broker address: {uri}"
        )));
    }

    Ok(ProducerUri {
        brokers,
        topic: topic.to_string(),
    })
}

fn parse_codec(name: &str) -> Result<CodecKind, NeventGenError> {
    match name {
        "passthrough" => Ok(CodecKind::Passthrough),
        "packed" => Ok(CodecKind::Packed),
        other => Err(NeventGenError::Config(format!(
            "unknown codec: {other} (expected passthrough | packed)"
        ))),
    }
}

fn parse_transport(name: &str) -> Result<TransportKind, NeventGenError> {
    match name {
        "broker" => Ok(TransportKind::Broker),
        "socket" => Ok(TransportKind::Socket),
        other => Err(NeventGenError::Config(format!(
            "unknown transport: {other} (expected broker | socket)"
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Final configuration after the merge: config.toml < env/CLI.
pub struct Effective {
    pub uri: ProducerUri,
    pub codec: CodecKind,
    pub transport: TransportKind,
    pub multiplier: u32,
    pub bytes: usize,
    pub rate: f64,
    pub report_time: u64,
    pub initial_state: ControlState,
    pub file: Option<String>,
    pub seed: i64,
    pub heartbeat_every: u64,
    pub listen: bool,
    pub options: Vec<(String, String)>,
}

impl Effective {
    pub fn new(args: &GenArgs) -> Result<Self, NeventGenError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &GenArgs, cfg: Config) -> Result<Self, NeventGenError> {
        let producer = args
            .producer
            .clone()
            .or(cfg.producer)
            .ok_or_else(|| NeventGenError::Config("no producer URI configured".into()))?;
        let uri = parse_producer_uri(&producer)?;

        let codec = match &args.codec {
            Some(name) => parse_codec(name)?,
            None => cfg.codec.unwrap_or_default(),
        };
        let transport = match &args.transport {
            Some(name) => parse_transport(name)?,
            None => cfg.transport.unwrap_or_default(),
        };

        let initial_state = if args.run {
            ControlState::Run
        } else {
            match cfg.status {
                Some(ControlState::Stop) => {
                    return Err(NeventGenError::Config(
                        "status cannot start at stop (use run or pause)".into(),
                    ));
                }
                Some(state) => state,
                None => ControlState::Pause,
            }
        };

        Ok(Self {
            uri,
            codec,
            transport,
            multiplier: args.multiplier.or(cfg.multiplier).unwrap_or(1),
            bytes: args.bytes.or(cfg.bytes).unwrap_or(0),
            rate: args.rate.or(cfg.rate).unwrap_or(0.0),
            report_time: args.report_time.or(cfg.report_time).unwrap_or(10),
            initial_state,
            file: args.file.clone().or(cfg.file),
            seed: args.seed.or(cfg.seed).unwrap_or(0),
            heartbeat_every: args.heartbeat_every.or(cfg.heartbeat_every).unwrap_or(0),
            listen: args.listen,
            options: cfg.options.into_iter().collect(),
        })
    }

    /// Transport view of the destination. Multi-broker lists keep the
    /// first address; the rest are failover candidates the backends do
    /// not use yet.
    pub fn transport_config(&self, role: Role) -> TransportConfig {
        let mut tc = TransportConfig::new(self.uri.brokers[0].clone(), self.uri.topic.clone(), role);
        tc.options = self.options.clone();
        tc
    }
}
