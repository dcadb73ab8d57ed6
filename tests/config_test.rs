// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_modbus_descriptors::config::{
    self, Config, ConnectionConfig, ReaderConfig, TagConfig, TransportKind,
};
use rust_modbus_descriptors::descriptor::{DecodedValue, DescriptorMap, ReadDeviceIdCode, TagKind};
use rust_modbus_descriptors::error::TagError;
use rust_modbus_descriptors::uuid_device::uuid_tag_table;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let config = Config {
        connection: ConnectionConfig {
            transport: TransportKind::Rtu,
            serial_port: "/dev/ttyACM4".to_string(),
            unit_id: 7,
            ..ConnectionConfig::default()
        },
        reader: ReaderConfig {
            read_code: ReadDeviceIdCode::Regular,
            timeout_ms: 250,
            ..ReaderConfig::default()
        },
        tags: vec![TagConfig {
            id: 0x80,
            name: "serial_number".to_string(),
            kind: TagKind::Integer,
        }],
        ..Config::default()
    };

    config.save_to_file(&config_path)?;
    let loaded_config = Config::from_file(&config_path)?;

    assert_eq!(loaded_config.connection.transport, TransportKind::Rtu);
    assert_eq!(loaded_config.connection.serial_port, "/dev/ttyACM4");
    assert_eq!(loaded_config.connection.unit_id, 7);
    assert_eq!(loaded_config.reader.read_code, ReadDeviceIdCode::Regular);
    assert_eq!(loaded_config.reader.timeout(), Some(Duration::from_millis(250)));
    assert_eq!(loaded_config.tags, config.tags);

    // Loading a missing file writes the defaults
    let non_existent_path = temp_dir.path().join("non_existent.yaml");
    let default_config = Config::from_file(&non_existent_path)?;
    assert!(non_existent_path.exists());
    assert_eq!(default_config.connection.port, 502);
    assert_eq!(default_config.connection.address, "127.0.0.1");
    assert_eq!(default_config.reader.read_code, ReadDeviceIdCode::Extended);
    assert_eq!(default_config.uuid.regen_register, 15);

    Ok(())
}

#[test]
fn test_partial_sections_use_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        r#"
connection:
  unit_id: 9
reader:
  timeout_ms: 0
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.connection.unit_id, 9);
    assert_eq!(config.connection.port, 502);
    assert_eq!(config.reader.timeout(), None);
    assert_eq!(config.reader.max_pages, 256);
    assert!(config.tags.is_empty());

    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();

    config.apply_args(
        Some(TransportKind::Tcp),
        Some("192.168.0.1".to_string()),
        Some(5020),
        None,
        None,
        Some(3),
        Some(0x80),
        Some(100),
    );

    assert_eq!(config.connection.address, "192.168.0.1");
    assert_eq!(config.connection.port, 5020);
    assert_eq!(config.connection.unit_id, 3);
    assert_eq!(config.connection.baud_rate, 115_200);
    assert_eq!(config.reader.start_object_id, 0x80);

    let reader = config.reader.build_reader(config.connection.unit_id);
    assert_eq!(reader.unit_id(), 3);
    assert_eq!(reader.timeout(), Some(Duration::from_millis(100)));
    assert_eq!(reader.read_code(), ReadDeviceIdCode::Extended);
}

#[test]
fn test_tag_table_from_config() {
    let mut config = Config::default();
    config.tags = vec![
        TagConfig {
            id: 0x80,
            name: "serial_number".to_string(),
            kind: TagKind::Integer,
        },
        TagConfig {
            id: 0x00,
            name: "manufacturer".to_string(),
            kind: TagKind::String,
        },
    ];

    let descriptors: DescriptorMap = [
        (0x00, b"ACME".to_vec()),
        (0x80, vec![0x00, 0x01, 0x00]),
    ]
    .into_iter()
    .collect();

    let fields = config.tag_table().unwrap().decode(&descriptors).unwrap();
    assert_eq!(fields.get("manufacturer"), Some(&DecodedValue::Text("ACME".to_string())));
    assert_eq!(fields.get("serial_number"), Some(&DecodedValue::Integer(256)));
    assert!(!fields.contains_key("vendor_name"));
}

#[test]
fn test_config_tags_extend_the_uuid_table() {
    let mut config = Config::default();
    config.tags = vec![TagConfig {
        id: 0xA0,
        name: "lot_number".to_string(),
        kind: TagKind::Integer,
    }];

    let table = config.extend_tag_table(uuid_tag_table()).unwrap();
    assert_eq!(table.len(), uuid_tag_table().len() + 1);
    assert_eq!(table.get(0x8A).map(|tag| tag.name.as_str()), Some("uuid_ns"));

    let descriptors: DescriptorMap = [
        (0x8A, b"6ba7b810-9dad-11d1-80b4-00c04fd430c8\0".to_vec()),
        (0xA0, vec![0x2A]),
    ]
    .into_iter()
    .collect();
    let fields = table.decode(&descriptors).unwrap();
    assert_eq!(fields.get("lot_number"), Some(&DecodedValue::Integer(42)));
    assert!(fields.contains_key("uuid_ns"));

    // A configured tag may not steal a UUID field name
    config.tags[0].name = "uuid4".to_string();
    assert!(matches!(
        config.extend_tag_table(uuid_tag_table()),
        Err(TagError::DuplicateName { object_id: 0xA0, .. })
    ));
}

#[test]
fn test_transport_kind_parsing() {
    assert_eq!("TCP".parse::<TransportKind>().unwrap(), TransportKind::Tcp);
    assert_eq!("rtu".parse::<TransportKind>().unwrap(), TransportKind::Rtu);
    assert!("udp".parse::<TransportKind>().is_err());
}

#[test]
fn test_config_schema_output() -> Result<()> {
    config::output_config_schema()?;
    Ok(())
}
