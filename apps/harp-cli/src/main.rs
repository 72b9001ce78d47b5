use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use harp_device as dev;
use harp_device::ClockSynchronizer;
use harp_transport as harp;
use harp_transport::HarpBus;

mod config;
use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "harp",
    version,
    about = "Harp ClockSynchronizer device tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// JSON config with backend/device defaults (created if missing)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mock,
    Serial,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show device identity and register map
    Info {
        /// Print as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the embedded device metadata verbatim
    Metadata,
    /// List the building blocks this device exposes
    Elements,
    /// Validate device metadata YAML (file or directory)
    Validate {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        dir: Option<String>,
        /// Print parsed metadata as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List available ports
    List {
        #[arg(long, value_enum)]
        backend: Option<Backend>,
    },
    /// Decode a raw Harp frame given as hex bytes
    Decode {
        /// Bytes like 01 04 00 ff 02 06
        #[arg(required = true)]
        data: Vec<String>,
    },
    /// Read messages from a device and group them by register
    Group {
        #[arg(long, value_enum)]
        backend: Option<Backend>,
        /// Port path (e.g., /dev/ttyUSB0, COM3) or mock0
        #[arg(long)]
        device: Option<String>,
        /// Maximum messages to read
        #[arg(long, default_value_t = 64u32)]
        count: u32,
        /// Request every core register before reading
        #[arg(long, action = ArgAction::SetTrue)]
        dump: bool,
        /// Print grouping metrics after the run
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Read a single register
    Query {
        #[arg(long, value_enum)]
        backend: Option<Backend>,
        #[arg(long)]
        device: Option<String>,
        /// Register address
        #[arg(long)]
        address: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Info { json } => device_info(json),
        Commands::Metadata => device_metadata().await,
        Commands::Elements => list_elements(),
        Commands::Validate { file, dir, json } => {
            metadata_validate(file.as_deref(), dir.as_deref(), json)
        }
        Commands::List { backend } => list_ports(backend.unwrap_or(cfg.backend)),
        Commands::Decode { data } => decode_frame(&data),
        Commands::Group {
            backend,
            device,
            count,
            dump,
            metrics,
        } => {
            let backend = backend.unwrap_or(cfg.backend);
            let device = device.unwrap_or_else(|| cfg.device.clone());
            let timeout = cfg.recv_timeout_ms;
            let messages = match backend {
                Backend::Mock => {
                    let mut link = ClockSynchronizer::open_with(mock_device(&device)?, timeout)?;
                    read_messages(&mut link, count, dump)?
                }
                Backend::Serial => {
                    let bus = harp::SerialBus::open_with(&device, cfg.baud)?;
                    let mut link = ClockSynchronizer::open_with(bus, timeout)?;
                    read_messages(&mut link, count, dump)?
                }
            };
            group_and_print(messages, metrics).await
        }
        Commands::Query {
            backend,
            device,
            address,
        } => {
            let backend = backend.unwrap_or(cfg.backend);
            let device = device.unwrap_or_else(|| cfg.device.clone());
            let timeout = cfg.recv_timeout_ms;
            match backend {
                Backend::Mock => {
                    let mut link = ClockSynchronizer::open_with(mock_device(&device)?, timeout)?;
                    query_register(&mut link, address)
                }
                Backend::Serial => {
                    let bus = harp::SerialBus::open_with(&device, cfg.baud)?;
                    let mut link = ClockSynchronizer::open_with(bus, timeout)?;
                    query_register(&mut link, address)
                }
            }
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Serialize)]
struct RegisterRow {
    address: u8,
    register: dev::RegisterType,
    payload_type: harp::PayloadType,
    length: usize,
    access: &'static [dev::Access],
}

fn device_info(json: bool) -> Result<()> {
    let rows: Vec<RegisterRow> = ClockSynchronizer::register_map()
        .iter()
        .map(|(address, register)| RegisterRow {
            address,
            register,
            payload_type: register.payload_type(),
            length: register.length(),
            access: register.access(),
        })
        .collect();
    if json {
        let out = serde_json::json!({
            "device": ClockSynchronizer::NAME,
            "whoAmI": ClockSynchronizer::WHO_AM_I,
            "registers": rows,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!(
        "{} (whoAmI={})",
        ClockSynchronizer::NAME,
        ClockSynchronizer::WHO_AM_I
    );
    for r in rows {
        println!(
            "{:>3}\t{}\t{:?}[{}]\t{:?}",
            r.address, r.register, r.payload_type, r.length, r.access
        );
    }
    Ok(())
}

async fn device_metadata() -> Result<()> {
    let mut s = dev::get_metadata();
    while let Some(text) = s.next().await {
        print!("{text}");
    }
    Ok(())
}

fn list_elements() -> Result<()> {
    for e in dev::ELEMENTS {
        println!("{}\t{:?}\t{}", e.name, e.category, e.description);
    }
    Ok(())
}

fn metadata_validate(file: Option<&str>, dir: Option<&str>, json: bool) -> Result<()> {
    match (file, dir) {
        (Some(f), None) => {
            let desc = dev::load_metadata_file(f)?;
            println!(
                "ok: {} (whoAmI={}, registers={})",
                desc.device,
                desc.who_am_i,
                desc.registers.len()
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&desc)?);
            }
        }
        (None, Some(d)) => {
            let reg = dev::load_metadata_dir(d)?;
            println!("ok: loaded {} devices", reg.devices.len());
            if json {
                println!("{}", serde_json::to_string_pretty(&reg.devices)?);
            }
        }
        _ => {
            return Err(anyhow::anyhow!("provide --file <path> or --dir <dir>"));
        }
    }
    Ok(())
}

fn list_ports(backend: Backend) -> Result<()> {
    let ports = match backend {
        Backend::Mock => harp::MockBus::list()?,
        Backend::Serial => harp::SerialBus::list()?,
    };
    for p in ports {
        println!("{}\t{}", p.name, p.driver);
    }
    Ok(())
}

fn decode_frame(data_hex: &[String]) -> Result<()> {
    let bytes = parse_hex_bytes(data_hex)?;
    let (msg, used) = harp::HarpMessage::parse(&bytes)?;
    if used != bytes.len() {
        warn!(trailing = bytes.len() - used, "ignoring bytes after frame");
    }
    match dev::decode_register(&ClockSynchronizer::register_map(), &msg) {
        Ok(rec) => println!("{}", serde_json::to_string_pretty(&rec)?),
        Err(e) => {
            warn!(error = %e, "no register decoding, printing raw message");
            println!("{}", serde_json::to_string_pretty(&msg)?);
        }
    }
    Ok(())
}

/// A mock bus answering like a ClockSynchronizer, with one heartbeat queued.
fn mock_device(name: &str) -> Result<harp::MockBus> {
    use harp::PayloadType;
    let mut bus = harp::MockBus::open(name)?;
    let who = ClockSynchronizer::WHO_AM_I.to_le_bytes().to_vec();
    bus.set_register(0, PayloadType::U16, who);
    for addr in 1..=7u8 {
        bus.set_register(addr, PayloadType::U8, vec![1]);
    }
    bus.set_register(8, PayloadType::U32, 0u32.to_le_bytes().to_vec());
    bus.set_register(9, PayloadType::U16, 0u16.to_le_bytes().to_vec());
    bus.set_register(10, PayloadType::U8, vec![0x01]);
    bus.set_register(11, PayloadType::U8, vec![0]);
    let mut name_bytes = ClockSynchronizer::NAME.as_bytes().to_vec();
    name_bytes.resize(25, 0);
    bus.set_register(12, PayloadType::U8, name_bytes);
    bus.set_register(13, PayloadType::U16, 0u16.to_le_bytes().to_vec());
    bus.set_register(14, PayloadType::U8, vec![0x1A]);
    bus.set_register(15, PayloadType::U8, vec![0]);
    bus.set_register(16, PayloadType::U8, vec![0; 16]);
    bus.set_register(17, PayloadType::U8, vec![0; 8]);
    bus.set_register(18, PayloadType::U16, 0u16.to_le_bytes().to_vec());
    bus.set_register(19, PayloadType::U8, vec![0; 32]);
    bus.push(harp::HarpMessage::new(
        harp::MessageType::Event,
        18,
        PayloadType::U16,
        1u16.to_le_bytes().to_vec(),
    ));
    Ok(bus)
}

fn read_messages<B: HarpBus>(
    link: &mut dev::DeviceLink<B>,
    count: u32,
    dump: bool,
) -> Result<Vec<harp::HarpMessage>> {
    if dump {
        for (addr, reg) in ClockSynchronizer::register_map().iter() {
            link.send(&harp::HarpMessage::read(addr, reg.payload_type()))?;
        }
    }
    let out = link
        .take(count as usize)
        .collect::<dev::Result<Vec<_>>>()?;
    info!(n = out.len(), "messages received");
    Ok(out)
}

async fn group_and_print(messages: Vec<harp::HarpMessage>, metrics: bool) -> Result<()> {
    let hub = dev::MetricsHub::new()?;
    let mut grouped =
        dev::group_by_register(stream::iter(messages)).with_metrics(hub.dev.clone());
    let mut groups = Vec::new();
    while let Some(group) = grouped.next().await {
        groups.push(group?);
    }
    let map = ClockSynchronizer::register_map();
    for g in groups {
        let key = g.key();
        let msgs = g.collect::<Vec<_>>().await.into_iter().collect::<dev::Result<Vec<_>>>()?;
        let last = msgs
            .last()
            .and_then(|m| dev::decode_register(&map, m).ok())
            .map(|r| serde_json::to_string(&r.value))
            .transpose()?
            .unwrap_or_default();
        println!("{key}\tn={}\tlast={last}", msgs.len());
    }
    if metrics {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

fn query_register<B: HarpBus>(link: &mut dev::DeviceLink<B>, address: u8) -> Result<()> {
    let map = ClockSynchronizer::register_map();
    let reg = map.lookup(address)?;
    let msg = link.read_register(reg)?;
    let rec = dev::decode_register(&map, &msg)?;
    println!("{}", serde_json::to_string_pretty(&rec)?);
    Ok(())
}

fn parse_hex_bytes(items: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len());
    for s in items {
        let t = s.trim();
        let no_prefix = t.strip_prefix("0x").unwrap_or(t);
        let b = u8::from_str_radix(no_prefix, 16)
            .map_err(|e| anyhow::anyhow!("invalid hex byte '{t}': {e}"))?;
        out.push(b);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_accept_prefix() {
        let bytes = parse_hex_bytes(&["0x01".into(), "04".into(), "ff".into()]).unwrap();
        assert_eq!(bytes, vec![0x01, 0x04, 0xFF]);
        assert!(parse_hex_bytes(&["zz".into()]).is_err());
    }

    #[test]
    fn mock_dump_reads_every_register() {
        let mut link = ClockSynchronizer::open_with(mock_device("mock0").unwrap(), 10).unwrap();
        let msgs = read_messages(&mut link, 64, true).unwrap();
        // queued heartbeat + one reply per core register
        assert_eq!(msgs.len(), 21);
        assert!(msgs.iter().all(|m| !m.is_error()));
    }

    #[test]
    fn query_reports_identity() {
        let mut link = ClockSynchronizer::open_with(mock_device("mock0").unwrap(), 10).unwrap();
        assert!(query_register(&mut link, 0).is_ok());
        assert!(query_register(&mut link, 40).is_err());
    }
}
