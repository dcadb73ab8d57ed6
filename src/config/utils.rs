// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::debug;

use super::{Config, TransportKind, CONFIG_SCHEMA};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_modbus_descriptors --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Unit id**: must be a Modbus slave address (1-247)
/// - **Port Range**: the TCP port must be within 1-65534
/// - **Serial port**: must not be empty when the RTU transport is selected
/// - **Page cap**: at least one page per session
/// - **Tags**: names must not be empty, neither an object id nor a name may
///   appear twice, and a name may not be taken from another standard object
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let connection = &config.connection;
    if !(1..=247).contains(&connection.unit_id) {
        anyhow::bail!("Invalid unit id: {}", connection.unit_id);
    }

    match connection.transport {
        TransportKind::Tcp => {
            if connection.port < 1 || connection.port > 65534 {
                anyhow::bail!("Invalid port number: {}", connection.port);
            }
            if !is_valid_ip_address(&connection.address) {
                // Hostnames are resolved at connection time
                debug!("Potentially invalid address format: {}", connection.address);
            }
        }
        TransportKind::Rtu => {
            if connection.serial_port.trim().is_empty() {
                anyhow::bail!("RTU transport selected without a serial port");
            }
        }
    }

    if config.reader.max_pages == 0 {
        anyhow::bail!("reader.max_pages must be at least 1");
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for tag in &config.tags {
        if tag.name.trim().is_empty() {
            anyhow::bail!("Tag for object 0x{:02X} has an empty name", tag.id);
        }
        if !ids.insert(tag.id) {
            anyhow::bail!("Object 0x{:02X} is tagged more than once", tag.id);
        }
        if !names.insert(tag.name.as_str()) {
            anyhow::bail!("Tag name '{}' is used more than once", tag.name);
        }
    }
    config.tag_table().context("Invalid descriptor tags")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagConfig;
    use crate::descriptor::TagKind;

    fn tag(id: u8, name: &str) -> TagConfig {
        TagConfig {
            id,
            name: name.to_string(),
            kind: TagKind::String,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_unit_id_range() {
        let mut config = Config::default();
        config.connection.unit_id = 0;
        assert!(validate_specific_rules(&config).is_err());
        config.connection.unit_id = 248;
        assert!(validate_specific_rules(&config).is_err());
        config.connection.unit_id = 247;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_rtu_requires_serial_port() {
        let mut config = Config::default();
        config.connection.transport = TransportKind::Rtu;
        config.connection.serial_port = " ".to_string();
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_duplicate_tags_are_rejected() {
        let mut config = Config::default();
        config.tags = vec![tag(0x8A, "uuid_ns"), tag(0x8A, "namespace")];
        assert!(validate_specific_rules(&config).is_err());

        config.tags = vec![tag(0x8A, "uuid_ns"), tag(0x8B, "uuid_ns")];
        assert!(validate_specific_rules(&config).is_err());

        config.tags = vec![tag(0x8A, "uuid_ns"), tag(0x8B, "uuid1")];
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_tag_may_not_take_a_standard_name() {
        let mut config = Config::default();
        config.tags = vec![tag(0x80, "product_code")];
        assert!(validate_specific_rules(&config).is_err());

        // Renaming the standard object itself is fine
        config.tags = vec![tag(0x01, "product_code")];
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_ip_address_validation() {
        assert!(is_valid_ip_address("192.168.1.10"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("not an address"));
    }
}
