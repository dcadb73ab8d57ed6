// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point of the Modbus descriptor reader
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use serde::Serialize;

use rust_modbus_descriptors::config::{self, Config, TransportKind};
use rust_modbus_descriptors::descriptor::DecodedValue;
use rust_modbus_descriptors::modbus::ModbusTransport;

/// Read the identification descriptors of a Modbus device
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML), created with default values if missing
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Modbus link: tcp or rtu
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Modbus TCP device address
    #[arg(short, long)]
    address: Option<String>,

    /// Modbus TCP device port
    #[arg(short, long)]
    port: Option<u16>,

    /// Serial port of a Modbus RTU device
    #[arg(long)]
    serial_port: Option<String>,

    /// Serial line speed
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Modbus unit id of the device
    #[arg(short, long)]
    unit_id: Option<u8>,

    /// Object id the read starts from
    #[arg(long)]
    start_object_id: Option<u8>,

    /// Round trip timeout in milliseconds, 0 disables it
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the descriptors as JSON
    #[arg(long)]
    json: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,
}

#[derive(Debug, Serialize)]
struct DescriptorReport {
    timestamp: chrono::DateTime<chrono::Utc>,
    unit_id: u8,
    descriptors: BTreeMap<String, DecodedValue>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    config.apply_args(
        args.transport,
        args.address,
        args.port,
        args.serial_port,
        args.baud_rate,
        args.unit_id,
        args.start_object_id,
        args.timeout_ms,
    );
    debug!("Effective configuration: {:?}", config);

    let tags = config.tag_table()?;
    let unit_id = config.connection.unit_id;
    let mut transport = ModbusTransport::connect(&config.connection).await?;
    let reader = config.reader.build_reader(unit_id);
    let descriptors = reader
        .read_all(&mut transport, config.reader.start_object_id)
        .await?;
    transport.disconnect().await?;

    let report = DescriptorReport {
        timestamp: chrono::Utc::now(),
        unit_id,
        descriptors: tags.decode(&descriptors)?,
    };
    info!("Decoded {} descriptor(s)", report.descriptors.len());

    if let Some(output_path) = args.output {
        println!("Saving descriptors to: {}", output_path.display());
        std::fs::write(output_path, serde_json::to_string_pretty(&report)?)?;
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Device descriptors (unit {})", report.unit_id);
        println!("--------------------------");
        let width = report.descriptors.keys().map(String::len).max().unwrap_or(0);
        for (name, value) in &report.descriptors {
            println!("{:<width$} : {}", name, value);
        }
    }

    Ok(())
}
