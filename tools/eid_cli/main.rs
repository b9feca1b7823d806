// tools/eid_cli/main.rs
//
// Field diagnostic for the EID reader link. Dials the reader, prints status
// lines as they arrive, and applies the survey app's normalisation
// (trailing 8-character ID, first-scan-wins dedup) so a reader can be
// checked in the field without the full survey app.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use eidlink::{list_reader_ports, EidReader, EidReaderConfig, ReaderEvent, TargetDescriptor};

/// The survey app keys scans on the trailing characters of each frame.
const SHORT_ID_LEN: usize = 8;

#[derive(Parser)]
#[command(name = "eid_cli", about = "EID reader link diagnostic")]
struct Args {
    /// List candidate serial ports and exit
    #[arg(long)]
    list: bool,

    /// Serial device bound to the reader's RFCOMM channel
    #[arg(long)]
    port: Option<String>,

    /// Bluetooth hardware address of the reader
    #[arg(long)]
    address: Option<String>,

    /// Baud rate for the bound channel
    #[arg(long, default_value_t = eidlink::io::eid::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Display name used in status lines
    #[arg(long, default_value = "HR5")]
    name: String,

    /// JSON reader configuration file (replaces the flags above)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<EidReaderConfig, String> {
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        return serde_json::from_str(&text)
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e));
    }

    let port = args
        .port
        .clone()
        .ok_or("--port is required unless --config or --list is given")?;

    let mut config = EidReaderConfig::new(
        TargetDescriptor::new(args.address.clone().unwrap_or_default()),
        port,
    );
    config.baud_rate = args.baud;
    config.display_name = Some(args.name.clone());
    Ok(config)
}

fn short_id(frame: &str) -> String {
    let chars: Vec<char> = frame.chars().collect();
    let start = chars.len().saturating_sub(SHORT_ID_LEN);
    chars[start..].iter().collect::<String>().to_uppercase()
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.list {
        return match list_reader_ports() {
            Ok(ports) => {
                for p in ports {
                    println!("{}  [{}]", p.port_name, p.port_type);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let (mut reader, mut events) = EidReader::new(config);
    if let Err(e) = reader.start() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut failed = false;

    while let Some(event) = events.recv().await {
        match event {
            ReaderEvent::Status(_, line) => println!("{}", line),
            ReaderEvent::Eid(frame) => {
                let id = short_id(&frame);
                if seen.insert(id.clone()) {
                    println!("Bird {} scanned", id);
                }
            }
            ReaderEvent::Error(err) => {
                failed = true;
                println!("{}", err);
            }
            ReaderEvent::Ended(reason) => {
                println!("Link closed ({})", reason);
                break;
            }
        }
    }

    reader.stop().await;
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
