// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use rust_modbus_descriptors::modbus::{rtu, DescriptorModbusServer};

/// Modbus TCP or RTU server simulating the UUID test device
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Listen address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Listen port
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Maximum number of descriptor objects per response
    #[clap(long, default_value = "3")]
    objects_per_page: usize,

    /// Serve Modbus RTU on this serial port instead of TCP
    #[clap(long)]
    serial_port: Option<String>,

    /// Serial baud rate
    #[clap(long, default_value = "115200")]
    baud_rate: u32,

    /// Unit id answered on the serial bus
    #[clap(long, default_value = "5")]
    unit_id: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    // Every connection shares the objects and registers of this device
    let device = DescriptorModbusServer::uuid_test_device()
        .with_objects_per_page(args.objects_per_page);

    if let Some(serial_port) = &args.serial_port {
        let builder = tokio_serial::new(serial_port, args.baud_rate);
        let port = tokio_serial::SerialStream::open(&builder)
            .with_context(|| format!("Failed to open serial port {}", serial_port))?;
        info!(
            "Simulated UUID test device answering unit {} on {} at {} baud (namespace {})",
            args.unit_id,
            serial_port,
            args.baud_rate,
            device.namespace()
        );
        rtu::serve(port, args.unit_id, device).await?;
        return Ok(());
    }

    let socket_addr: SocketAddr = format!("{}:{}", args.address, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.address, args.port))?;
    let listener = TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("Failed to bind {}", socket_addr))?;
    info!(
        "Simulated UUID test device listening on {} (namespace {})",
        socket_addr,
        device.namespace()
    );

    let server = Server::new(listener);
    let on_connected = move |stream, socket_addr| {
        let device = device.clone();
        async move {
            info!("Client connected from {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(device.clone()))
            })
        }
    };
    let on_process_error = |err| {
        error!("Modbus server error: {err}");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}
