//! # Etiqueta CLI
//!
//! Command-line interface for Gicisky e-paper labels.
//!
//! ## Usage
//!
//! ```bash
//! # List supported labels
//! etiqueta models
//!
//! # Render a service call to PNG
//! etiqueta render --model 0x32 --input call.json --png label.png
//!
//! # Run a full transfer against a simulated label
//! etiqueta simulate --model 0x32 --input call.json --nack-part 3
//!
//! # Decode advertisement manufacturer data
//! etiqueta advert 321d0107 00
//!
//! # Serve the HTTP API over simulated labels
//! etiqueta serve --simulate AA:BB:CC:DD:EE:FF@0x32
//! ```

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use etiqueta::{
    EtiquetaError, LabelWriter, WriteTarget,
    config::AppConfig,
    device::{self, catalog::parse_model_id, discovery},
    payload::ServiceCall,
    server::{self, AppState},
    transfer::{FaultPlan, SimulatedLabel, SimulatedNetwork},
};

/// Etiqueta - Gicisky e-paper label utility
#[derive(Parser, Debug)]
#[command(name = "etiqueta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "etiqueta.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List supported label models
    Models,

    /// Render a service call to PNG
    Render {
        /// Model id (decimal or 0xNN)
        #[arg(long, value_parser = parse_model_id)]
        model: u8,

        /// Service call JSON file ("-" for stdin)
        #[arg(long, default_value = "-")]
        input: String,

        /// Output PNG
        #[arg(long, value_name = "FILE", default_value = "label.png")]
        png: PathBuf,
    },

    /// Render and transfer to an in-process simulated label
    Simulate {
        #[arg(long, value_parser = parse_model_id)]
        model: u8,

        /// Service call JSON file ("-" for stdin)
        #[arg(long, default_value = "-")]
        input: String,

        /// Make the label re-request this part once
        #[arg(long)]
        nack_part: Vec<u32>,

        /// Drop the link after this part
        #[arg(long)]
        drop_at: Option<u32>,

        /// Save what the label displays afterwards
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long)]
        listen: Option<String>,

        /// Simulated label as ADDRESS@MODEL (repeatable)
        #[arg(long = "simulate", value_name = "ADDRESS@MODEL")]
        labels: Vec<String>,
    },

    /// Decode label advertisement manufacturer data (hex)
    Advert {
        /// Manufacturer data bytes, e.g. "321d010700"
        data: Vec<String>,

        /// Manufacturer id
        #[arg(long, default_value = "0x5053", value_parser = parse_u16)]
        manufacturer_id: u16,
    },

    /// Write the default configuration file
    GenConfig {
        /// Destination (defaults to --config)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let (config, source) = AppConfig::load(&cli.config);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    source.log(&cli.config);

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), EtiquetaError> {
    match cli.command {
        Commands::Models => {
            println!("{:<6} {:<12} {:>9} {:<12} {:>6}", "ID", "NAME", "SIZE", "COLORS", "CHUNKS");
            for p in device::Catalog::builtin().profiles() {
                println!(
                    "{:<6} {:<12} {:>9} {:<12} {:>6}",
                    format!("{:#04x}", p.model_id),
                    p.name,
                    format!("{}x{}", p.width, p.height),
                    format!("{:?}", p.color_model),
                    p.chunk_count()
                );
            }
        }

        Commands::Render { model, input, png } => {
            let call = read_call(&input)?;
            let writer = LabelWriter::from_config(&config, Arc::new(SimulatedNetwork::new()))?;
            let composition = writer.render(model, call).await?;
            for warning in &composition.warnings {
                eprintln!("warning: {}", warning);
            }
            std::fs::write(&png, composition.canvas.to_png()?)?;
            println!("Saved to {}", png.display());
        }

        Commands::Simulate {
            model,
            input,
            nack_part,
            drop_at,
            png,
        } => {
            let call = read_call(&input)?;
            let profile = device::Catalog::builtin().lookup(model)?.clone();

            let mut faults = FaultPlan {
                disconnect_at_part: drop_at,
                ..FaultPlan::default()
            };
            for part in nack_part {
                *faults.nack_parts.entry(part).or_insert(0) += 1;
            }

            let address = "00:00:00:00:00:01";
            let label = SimulatedLabel::with_faults(profile, faults);
            let writer = LabelWriter::from_config(&config, Arc::new(label.clone()))?;

            let report = writer
                .write(&WriteTarget::new(address, model), call, &CancellationToken::new())
                .await?;
            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            println!(
                "Transferred {} bytes in {} chunks ({} writes, {} ms)",
                report.transfer.bytes,
                report.transfer.chunks,
                report.transfer.writes,
                report.transfer.elapsed_ms
            );

            if let Some(path) = png {
                let canvas = label
                    .displayed_canvas()
                    .ok_or_else(|| EtiquetaError::Server("label shows no frame".into()))??;
                std::fs::write(&path, canvas.to_png()?)?;
                println!("Saved display to {}", path.display());
            }
        }

        Commands::Serve { listen, labels } => {
            let catalog = device::Catalog::builtin();
            let mut network = SimulatedNetwork::new();
            for entry in &labels {
                let (address, model) = entry.rsplit_once('@').ok_or_else(|| {
                    EtiquetaError::Config(format!("expected ADDRESS@MODEL, got '{}'", entry))
                })?;
                let model = parse_model_id(model).map_err(EtiquetaError::Config)?;
                let profile = catalog.lookup(model)?.clone();
                tracing::info!(address, model = profile.name, "simulated label registered");
                network.add(address, SimulatedLabel::new(profile));
            }
            if labels.is_empty() {
                tracing::warn!("no link adapter configured; every write will fail to connect");
            }

            let writer = LabelWriter::from_config(&config, Arc::new(network))?;
            let listen = listen.unwrap_or_else(|| config.server.listen.clone());
            server::serve(Arc::new(AppState::new(writer)), &listen).await?;
        }

        Commands::Advert {
            data,
            manufacturer_id,
        } => {
            let bytes = parse_hex(&data.concat())?;
            match discovery::parse_advertisement(manufacturer_id, &bytes) {
                Some(adv) => {
                    let model = device::Catalog::builtin()
                        .lookup(adv.model_id)
                        .map(|p| p.name)
                        .unwrap_or("unknown");
                    println!("model:    {:#04x} ({})", adv.model_id, model);
                    println!("battery:  {:.1} V ({}%)", adv.battery_volts, adv.battery_percent);
                    println!("firmware: {:#06x}", adv.firmware);
                }
                None => {
                    return Err(EtiquetaError::Config(
                        "not a Gicisky advertisement (id 0x5053, 5 bytes)".into(),
                    ));
                }
            }
        }

        Commands::GenConfig { path } => {
            let path = path.unwrap_or(cli.config);
            AppConfig::write_default(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

/// Read a service call from a file, or stdin for "-".
fn read_call(input: &str) -> Result<ServiceCall, EtiquetaError> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(Path::new(input))?
    };
    serde_json::from_str(&text)
        .map_err(|e| EtiquetaError::Config(format!("invalid service call: {}", e)))
}

fn parse_hex(s: &str) -> Result<Vec<u8>, EtiquetaError> {
    let s: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if !s.is_ascii() || s.len() % 2 != 0 {
        return Err(EtiquetaError::Config(format!("invalid hex '{}'", s)));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| EtiquetaError::Config(format!("invalid hex '{}'", &s[i..i + 2])))
        })
        .collect()
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("invalid id '{}'", s))
}
