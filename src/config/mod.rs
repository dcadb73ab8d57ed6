// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the descriptor tools
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `connection`: How to reach the device (Modbus TCP or RTU, unit id)
//! - `reader`: Read device identification options (access type, timeout, page cap)
//! - `tags`: Device specific descriptor names and decoders
//! - `uuid`: UUID test device settings
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_descriptors::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("rtu".parse().unwrap()),        // Transport
//!     None,                                // TCP address
//!     None,                                // TCP port
//!     Some("/dev/ttyACM4".to_string()),    // Serial port
//!     Some(115200),                        // Baud rate
//!     Some(5),                             // Unit id
//!     None,                                // Start object id
//!     Some(500),                           // Timeout in ms
//! );
//!
//! println!("Unit id: {}", config.connection.unit_id);
//! ```

pub mod connection;
pub mod reader;
pub mod utils;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::descriptor::{DescriptorTagTable, ObjectId};
use crate::error::TagError;

pub use connection::{ConnectionConfig, TransportKind};
pub use reader::{ReaderConfig, TagConfig, UuidConfig};
pub use utils::{is_valid_ip_address, output_config_schema};

/// JSON schema the configuration file is validated against.
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the configuration
/// file, allowing for minimal configuration when custom settings are not required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// How to reach the device.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Options of every read session.
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Device specific descriptors, added to the standard Modbus objects.
    ///
    /// A tag on a standard object id renames it.
    #[serde(default)]
    pub tags: Vec<TagConfig>,

    /// UUID test device settings.
    #[serde(default)]
    pub uuid: UuidConfig,
}

impl Config {
    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file failing schema
    /// validation, deserialization or the specific rules makes the load fail
    /// and leaves a `.sample.yaml` with default values next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        Self::parse_checked(&yaml_value, &contents).or_else(|err| {
            error!("Rejected configuration {}: {:#}", path.display(), err);
            if let Err(e) = Self::write_sample(path) {
                error!("Failed to create sample config: {:#}", e);
            }
            Err(err.context(format!("Invalid configuration in {}", path.display())))
        })
    }

    /// Schema validation, deserialization, then the rules the schema cannot express.
    fn parse_checked(yaml_value: &serde_yml::Value, contents: &str) -> Result<Self> {
        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        let json_value =
            serde_json::to_value(yaml_value).context("Failed to convert YAML to JSON")?;
        if let Err(error) = validator.validate(&json_value) {
            anyhow::bail!("Schema validation failed: {}", error);
        }

        let config: Config =
            serde_yml::from_str(contents).context("Failed to deserialize configuration")?;
        utils::validate_specific_rules(&config)?;
        Ok(config)
    }

    /// Write the default configuration next to `path` as `<name>.sample.yaml`.
    fn write_sample(path: &Path) -> Result<()> {
        let sample_path = path.with_extension("sample.yaml");
        if let Some(parent) = sample_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        Self::default().save_to_file(&sample_path)?;
        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;
        fs::write(path, yaml)
            .with_context(|| format!("Failed to write configuration to {:?}", path))
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values explicitly provided override the existing configuration.
    ///
    /// # Parameters
    ///
    /// * `transport` - Modbus TCP or RTU
    /// * `address` - Host of a Modbus TCP device
    /// * `port` - TCP port of a Modbus TCP device
    /// * `serial_port` - Serial device of a Modbus RTU device
    /// * `baud_rate` - Serial line speed
    /// * `unit_id` - Modbus unit id of the device
    /// * `start_object_id` - Object the read starts from
    /// * `timeout_ms` - Round trip bound in milliseconds, 0 disables it
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        transport: Option<TransportKind>,
        address: Option<String>,
        port: Option<u16>,
        serial_port: Option<String>,
        baud_rate: Option<u32>,
        unit_id: Option<u8>,
        start_object_id: Option<ObjectId>,
        timeout_ms: Option<u64>,
    ) {
        if let Some(transport) = transport {
            debug!("Overriding transport from command line: {:?}", transport);
            self.connection.transport = transport;
        }
        if let Some(address) = address {
            debug!("Overriding address from command line: {}", address);
            self.connection.address = address;
        }
        if let Some(port) = port {
            debug!("Overriding port from command line: {}", port);
            self.connection.port = port;
        }
        if let Some(serial_port) = serial_port {
            debug!("Overriding serial port from command line: {}", serial_port);
            self.connection.serial_port = serial_port;
        }
        if let Some(baud_rate) = baud_rate {
            debug!("Overriding baud rate from command line: {}", baud_rate);
            self.connection.baud_rate = baud_rate;
        }
        if let Some(unit_id) = unit_id {
            debug!("Overriding unit id from command line: {}", unit_id);
            self.connection.unit_id = unit_id;
        }
        if let Some(start) = start_object_id {
            debug!("Overriding start object id from command line: {}", start);
            self.reader.start_object_id = start;
        }
        if let Some(timeout_ms) = timeout_ms {
            debug!("Overriding timeout from command line: {} ms", timeout_ms);
            self.reader.timeout_ms = timeout_ms;
        }
    }

    /// Standard Modbus objects plus the configured tags.
    pub fn tag_table(&self) -> Result<DescriptorTagTable, TagError> {
        self.extend_tag_table(DescriptorTagTable::standard())
    }

    /// `base` plus the configured tags. A configured tag replaces the tag of
    /// the same object in `base`, but may not reuse a name of another object.
    pub fn extend_tag_table(&self, base: DescriptorTagTable) -> Result<DescriptorTagTable, TagError> {
        self.tags.iter().try_fold(base, |table, tag| {
            table.with_tag(tag.id, tag.name.clone(), tag.kind.decoder())
        })
    }
}
