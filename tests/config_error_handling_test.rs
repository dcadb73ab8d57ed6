// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_modbus_descriptors::config::Config;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// Load `yaml`, expect a failure and a valid sample file next to it.
fn assert_rejected_with_sample(yaml: &str) -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "Sample config file was not created"
    );

    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.connection.port, 502);
    assert_eq!(sample_config.connection.unit_id, 5);

    Ok(())
}

#[test]
fn test_type_mismatch_creates_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
connection:
  port: "not-an-integer"
  address: 12345
"#,
    )
}

#[test]
fn test_out_of_range_values_create_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
connection:
  port: 99999
  unit_id: 0
"#,
    )
}

#[test]
fn test_unknown_read_code_creates_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
reader:
  read_code: everything
"#,
    )
}

#[test]
fn test_duplicate_tags_create_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
tags:
  - id: 128
    name: serial_number
    kind: integer
  - id: 128
    name: lot_number
    kind: string
"#,
    )
}

#[test]
fn test_tag_reusing_a_standard_name_creates_sample_file() -> Result<()> {
    setup();
    assert_rejected_with_sample(
        r#"
tags:
  - id: 128
    name: vendor_name
    kind: string
"#,
    )
}

#[test]
fn test_invalid_yaml_is_rejected() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "connection: [unclosed")?;

    assert!(Config::from_file(&config_path).is_err());
    Ok(())
}
