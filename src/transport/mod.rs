// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transport abstraction
//!
//! The descriptor reader only needs to send one typed request and wait for one
//! typed response. Wire encoding belongs to the implementation:
//! - [`ModbusTransport`](crate::modbus::ModbusTransport): tokio-modbus client (TCP or RTU)
//! - [`MockTransport`]: scripted responses for tests and dry runs

pub mod mock;

use async_trait::async_trait;

use crate::descriptor::{DeviceInfoRequest, ReadResult};
use crate::error::DescriptorError;

pub use mock::{MockReply, MockTransport};

/// Capability to run one "read device information" round trip.
#[async_trait]
pub trait DeviceInfoTransport: Send {
    /// Send `request` and wait for the matching page.
    async fn execute(&mut self, request: DeviceInfoRequest) -> Result<ReadResult, DescriptorError>;
}

/// Capability to write one holding register.
#[async_trait]
pub trait RegisterWriter: Send {
    /// Write `value` to holding register `address` of unit `unit_id`.
    async fn write_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), DescriptorError>;
}
