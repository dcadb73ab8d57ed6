// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use rust_modbus_descriptors::config::{Config, TransportKind};
use rust_modbus_descriptors::modbus::ModbusTransport;
use rust_modbus_descriptors::uuid_device::{uuid_tag_table, UuidDevice, UuidVersion};

/// Exercise the UUID test firmware: read, regenerate and read the UUIDs again
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Configuration file (YAML), created with default values if missing
    #[clap(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Modbus link: tcp or rtu
    #[clap(long)]
    transport: Option<TransportKind>,

    /// Modbus TCP device address
    #[clap(long)]
    address: Option<String>,

    /// Modbus TCP device port
    #[clap(long)]
    port: Option<u16>,

    /// Serial port of a Modbus RTU device
    #[clap(long)]
    serial_port: Option<String>,

    /// Modbus unit id of the device
    #[clap(long)]
    unit_id: Option<u8>,

    /// Only regenerate this version (1, 3, 4, 5 or 6)
    #[clap(long)]
    version: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let version = args.version.map(UuidVersion::try_from).transpose()?;

    let mut config = Config::from_file(&args.config)?;
    config.apply_args(
        args.transport,
        args.address,
        args.port,
        args.serial_port,
        None,
        args.unit_id,
        None,
        None,
    );

    // Configured tags go on top of the UUID fields
    let tags = config.extend_tag_table(uuid_tag_table())?;

    let transport = ModbusTransport::connect(&config.connection).await?;
    let reader = config.reader.build_reader(config.connection.unit_id);
    let mut device = UuidDevice::new(transport, reader)
        .with_regen_register(config.uuid.regen_register)
        .with_tags(tags);

    println!("UUIDs before regeneration");
    print!("{}", device.read_uuids().await?);

    match version {
        Some(version) => device.regen_uuid(version).await?,
        None => device.regen_all().await?,
    }

    println!("UUIDs after regeneration");
    print!("{}", device.read_uuids().await?);

    device.into_transport().disconnect().await?;
    info!("Done");
    Ok(())
}
