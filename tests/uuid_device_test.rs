// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End to end UUID regeneration against the simulated UUID test firmware

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use uuid::Uuid;

use rust_modbus_descriptors::descriptor::DescriptorReader;
use rust_modbus_descriptors::modbus::{DescriptorModbusServer, ModbusTransport};
use rust_modbus_descriptors::config::{Config, TagConfig};
use rust_modbus_descriptors::descriptor::TagKind;
use rust_modbus_descriptors::uuid_device::{
    uuid_tag_table, UuidDevice, UuidDeviceError, UuidVersion, UUID_NAME,
};

const UNIT_ID: u8 = 5;

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

async fn start_test_server(
    device: DescriptorModbusServer,
) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let socket_addr = listener.local_addr()?;

    let server = Server::new(listener);
    let on_connected = move |stream, socket_addr| {
        let device = device.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(device.clone()))
            })
        }
    };
    let on_process_error = |err| {
        eprintln!("Server error: {}", err);
    };

    tokio::spawn(async move {
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            eprintln!("Server error: {}", e);
        }
    });
    time::sleep(Duration::from_millis(100)).await;

    Ok(socket_addr)
}

async fn connect(
    device: DescriptorModbusServer,
) -> Result<UuidDevice<ModbusTransport>, Box<dyn std::error::Error>> {
    let socket_addr = start_test_server(device).await?;
    let transport = ModbusTransport::connect_tcp(socket_addr, UNIT_ID).await?;
    let reader = DescriptorReader::new(UNIT_ID).with_timeout(Some(Duration::from_secs(1)));
    Ok(UuidDevice::new(transport, reader))
}

#[tokio::test]
async fn test_read_uuids_from_test_firmware() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let firmware = DescriptorModbusServer::uuid_test_device();
    let namespace = firmware.namespace();
    let mut device = connect(firmware).await?;

    let report = device.read_uuids().await?;

    assert_eq!(report.namespace, namespace);
    assert_eq!(report.uuids.len(), UuidVersion::ALL.len());
    for (version, uuid) in &report.uuids {
        assert_eq!(uuid.get_version_num(), usize::from(version.number()));
    }
    assert_eq!(
        report.uuids[&UuidVersion::V3],
        Uuid::new_v3(&namespace, UUID_NAME)
    );
    assert_eq!(
        report.uuids[&UuidVersion::V5],
        Uuid::new_v5(&namespace, UUID_NAME)
    );

    Ok(())
}

#[tokio::test]
async fn test_regeneration_changes_time_and_random_uuids() -> Result<(), Box<dyn std::error::Error>>
{
    setup();
    let mut device = connect(DescriptorModbusServer::uuid_test_device()).await?;

    let before = device.read_uuids().await?;
    // v1 and v6 are time based
    time::sleep(Duration::from_millis(5)).await;
    device.regen_all().await?;
    let after = device.read_uuids().await?;

    assert_eq!(before.namespace, after.namespace);
    for version in [UuidVersion::V1, UuidVersion::V4, UuidVersion::V6] {
        assert_ne!(
            before.uuids[&version], after.uuids[&version],
            "{version} should have changed"
        );
    }
    // Name based UUIDs only depend on the namespace
    for version in [UuidVersion::V3, UuidVersion::V5] {
        assert_eq!(before.uuids[&version], after.uuids[&version]);
    }

    Ok(())
}

#[tokio::test]
async fn test_single_version_regeneration() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let mut device = connect(DescriptorModbusServer::uuid_test_device()).await?;

    let before = device.read_uuids().await?;
    device.regen_uuid(UuidVersion::V4).await?;
    let after = device.read_uuids().await?;

    assert_ne!(before.uuids[&UuidVersion::V4], after.uuids[&UuidVersion::V4]);
    assert_eq!(before.uuids[&UuidVersion::V1], after.uuids[&UuidVersion::V1]);
    assert_eq!(before.uuids[&UuidVersion::V6], after.uuids[&UuidVersion::V6]);

    Ok(())
}

#[tokio::test]
async fn test_configured_tags_keep_uuid_fields() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let firmware = DescriptorModbusServer::uuid_test_device();
    let namespace = firmware.namespace();
    let mut config = Config::default();
    config.tags = vec![TagConfig {
        id: 0x05,
        name: "model".to_string(),
        kind: TagKind::String,
    }];

    let tags = config.extend_tag_table(uuid_tag_table())?;
    let mut device = connect(firmware).await?.with_tags(tags);
    let report = device.read_uuids().await?;

    assert_eq!(report.namespace, namespace);
    assert_eq!(report.uuids.len(), UuidVersion::ALL.len());
    Ok(())
}

#[tokio::test]
async fn test_device_without_uuids() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let plain = DescriptorModbusServer::new();
    plain.set_object(0x00, "ACME");
    let mut device = connect(plain).await?;

    let result = device.read_uuids().await;

    assert!(matches!(result, Err(UuidDeviceError::MissingField(field)) if field == "uuid_ns"));
    Ok(())
}

#[tokio::test]
async fn test_regen_on_unknown_register_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    setup();
    let mut device = connect(DescriptorModbusServer::uuid_test_device())
        .await?
        .with_regen_register(16);

    let result = device.regen_uuid(UuidVersion::V4).await;

    assert!(matches!(result, Err(UuidDeviceError::Read(_))));
    Ok(())
}
