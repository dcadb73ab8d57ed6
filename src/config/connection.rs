// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus connection configuration
//!
//! This module defines how the descriptor tools reach the device: Modbus TCP
//! or Modbus RTU over a serial port.

use serde::{Deserialize, Serialize};

/// Modbus link used to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Modbus TCP, uses `address` and `port`
    Tcp,
    /// Modbus RTU, uses `serial_port` and `baud_rate`
    Rtu,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "rtu" => Ok(TransportKind::Rtu),
            other => Err(format!("unknown transport '{other}' (expected tcp or rtu)")),
        }
    }
}

/// Configuration of the connection to the device.
///
/// # Fields
///
/// * `transport` - Modbus TCP or RTU
/// * `address` - Host of a Modbus TCP device (default: 127.0.0.1)
/// * `port` - TCP port of a Modbus TCP device (default: 502)
/// * `serial_port` - Serial device of a Modbus RTU device (default: /dev/ttyACM0)
/// * `baud_rate` - Serial line speed (default: 115200)
/// * `unit_id` - Modbus unit (slave) id of the device (default: 5)
///
/// # Example
///
/// ```
/// use rust_modbus_descriptors::config::{ConnectionConfig, TransportKind};
///
/// let connection = ConnectionConfig {
///     transport: TransportKind::Rtu,
///     serial_port: "/dev/ttyACM4".to_string(),
///     ..ConnectionConfig::default()
/// };
/// assert_eq!(connection.unit_id, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Modbus link used to reach the device.
    pub transport: TransportKind,

    /// Host of a Modbus TCP device.
    ///
    /// Can be an IPv4/IPv6 address or a hostname.
    pub address: String,

    /// TCP port of a Modbus TCP device.
    ///
    /// Valid range is 1-65534. Default value is 502, which is the standard Modbus TCP port.
    pub port: u16,

    /// Serial device of a Modbus RTU device.
    pub serial_port: String,

    /// Serial line speed in baud.
    pub baud_rate: u32,

    /// Modbus unit (slave) id, 1-247.
    pub unit_id: u8,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            address: "127.0.0.1".to_string(),
            port: 502,
            serial_port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            unit_id: 5,
        }
    }
}
