// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust Modbus descriptors library
//!
//! This library reads the identification objects ("descriptors") a Modbus
//! device publishes through the Read Device Identification function, merges
//! the pages into one map and decodes them into named fields.
//!
//! - [`descriptor`]: data model, paginated reader and tag decoding
//! - [`transport`]: the transport seam the reader talks through
//! - [`modbus`]: tokio-modbus client transport, PDU codec and device simulator
//! - [`uuid_device`]: helpers for the UUID test firmware
//! - [`config`]: YAML configuration of the command line tools

pub mod config;
pub mod descriptor;
pub mod error;
pub mod modbus;
pub mod transport;
pub mod uuid_device;

pub use config::Config;
pub use descriptor::{read_all, DescriptorMap, DescriptorReader, DescriptorTagTable};
pub use error::{DescriptorError, TagError};
pub use transport::{DeviceInfoTransport, RegisterWriter};
