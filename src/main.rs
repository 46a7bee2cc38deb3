//! `bbfe` command-line front end.
//!
//! Connects to a Libera BBFE, runs one operation and prints the result.
//!
//! ```bash
//! bbfe --host bbfe01 read Temperature
//! bbfe --host bbfe01 write PhaseClock1 20
//! bbfe --json list
//! RUST_LOG=bbfe_bridge=debug bbfe --host bbfe01 status
//! ```

use anyhow::{bail, Context, Result};
use bbfe_bridge::codec;
use bbfe_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use bbfe_bridge::logging::{self, LogFormat};
use bbfe_bridge::{AttributeBridge, AttributeSchema, BridgeError, HealthState, HealthStatus};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

/// Libera BBFE attribute bridge
#[derive(Parser, Debug)]
#[command(name = "bbfe", version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Instrument host (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Instrument port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Print results and logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize and report device health
    Status,

    /// List the attribute table (no connection needed)
    List,

    /// Read one attribute
    Read {
        /// Attribute name
        name: String,
    },

    /// Write one attribute
    Write {
        /// Attribute name
        name: String,
        /// New value
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Send the instrument reset command
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(host) = &cli.host {
        config.instrument.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.instrument.port = port;
    }

    let format = if cli.json { LogFormat::Json } else { LogFormat::Text };
    logging::init_from_config(&config, format)?;

    if let Commands::List = cli.command {
        list_attributes(cli.json)?;
        return Ok(());
    }

    if config.instrument.host.is_empty() {
        bail!("no instrument host: pass --host, set BBFE_INSTRUMENT__HOST or add it to the configuration file");
    }

    let bridge = AttributeBridge::from_config(&config.instrument);
    let health = bridge
        .initialize(&config.instrument.host, config.instrument.port)
        .await;

    let outcome = run(&bridge, &cli.command, &health, cli.json).await;
    bridge.shutdown().await;
    outcome.map_err(|e| {
        let (local, touches_health) = e
            .downcast_ref::<BridgeError>()
            .map_or((false, false), |err| (err.is_local(), err.touches_health()));
        if local {
            e.context("rejected before contacting the instrument")
        } else if touches_health {
            e.context(format!("device is now {}", bridge.health().state))
        } else {
            e
        }
    })
}

async fn run(bridge: &AttributeBridge, command: &Commands, health: &HealthStatus, as_json: bool) -> Result<()> {
    if let Commands::Status = command {
        print_result(as_json, json!(health), &format!("{}: {}", health.state, health.message));
        return Ok(());
    }
    if health.state == HealthState::Fault {
        bail!("{}", health.message);
    }

    match command {
        Commands::Read { name } => {
            let value = bridge.read_attribute(name).await?;
            let unit = bridge.schema().lookup(name)?.unit.clone().unwrap_or_default();
            print_result(
                as_json,
                json!({ "attribute": name, "value": value, "unit": unit }),
                format!("{name} = {value} {unit}").trim_end(),
            );
        }
        Commands::Write { name, value } => {
            let spec = bridge.schema().lookup(name)?;
            let value = codec::coerce(value, spec.value_type)?;
            bridge.write_attribute(name, value.clone()).await?;
            print_result(
                as_json,
                json!({ "attribute": name, "written": value }),
                &format!("{name} <- {value}"),
            );
        }
        Commands::Reset => {
            bridge.reset().await?;
            print_result(as_json, json!({ "reset": "ok" }), "reset acknowledged");
        }
        Commands::Status | Commands::List => {}
    }
    Ok(())
}

fn list_attributes(as_json: bool) -> Result<()> {
    let schema = AttributeSchema::libera_bbfe();
    if as_json {
        let specs: Vec<_> = schema.iter().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    for spec in schema.iter() {
        let access = if spec.is_writable() { "rw" } else { "ro" };
        let range = spec
            .bounds()
            .map(|(min, max)| format!(" [{min}, {max}]"))
            .unwrap_or_default();
        let unit = spec.unit.as_deref().map(|u| format!(" {u}")).unwrap_or_default();
        println!(
            "  {:<22} {} {:<7}{}{}  {}",
            spec.name,
            access,
            spec.value_type.to_string(),
            range,
            unit,
            spec.label()
        );
    }
    Ok(())
}

fn print_result(as_json: bool, value: serde_json::Value, text: &str) {
    if as_json {
        println!("{value}");
    } else {
        println!("{text}");
    }
}
