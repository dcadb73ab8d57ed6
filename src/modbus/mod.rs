// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! Descriptors travel as Read Device Identification requests (function code
//! 0x2B, MEI type 0x0E), which tokio-modbus exposes as custom requests.
//!
//! ## Key Components
//!
//! - [`mei`]: encoding and decoding of the request and response PDUs
//! - [`ModbusTransport`]: client side, implements the descriptor transport over
//!   a Modbus TCP or RTU connection
//! - [`rtu`]: serial framing of the 0x2B exchange, both sides
//! - [`DescriptorModbusServer`]: server side, simulates a device publishing
//!   descriptors (and the UUID test firmware)
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_descriptors::descriptor::DescriptorReader;
//! use rust_modbus_descriptors::modbus::ModbusTransport;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut transport = ModbusTransport::connect_rtu("/dev/ttyACM4", 115200, 5)?;
//! let descriptors = DescriptorReader::new(5).read_all(&mut transport, 0).await?;
//! println!("{} objects", descriptors.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod mei;
pub mod rtu;
pub mod simulator;

pub use client::ModbusTransport;
pub use simulator::DescriptorModbusServer;
