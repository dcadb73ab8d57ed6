// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! tokio-modbus backed transport
//!
//! As in the rest of the crate, "client" is the side asking for descriptors
//! (Modbus master) and "server" the device answering them (Modbus slave).

use std::fmt::Debug;
use std::net::SocketAddr;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_modbus::prelude::*;

use super::mei;
use super::rtu::RtuClient;
use crate::config::{ConnectionConfig, TransportKind};
use crate::descriptor::{DeviceInfoRequest, ReadResult};
use crate::error::DescriptorError;
use crate::transport::{DeviceInfoTransport, RegisterWriter};

/// Descriptor transport over a tokio-modbus client context.
///
/// The unit id of every request selects the slave before the request is sent,
/// so one connection can serve several devices on a shared RTU bus.
pub struct ModbusTransport {
    ctx: client::Context,
}

impl ModbusTransport {
    /// Wrap an already connected context.
    pub fn from_context(ctx: client::Context) -> Self {
        Self { ctx }
    }

    /// Connect to a Modbus TCP device.
    pub async fn connect_tcp(socket_addr: SocketAddr, unit_id: u8) -> Result<Self, DescriptorError> {
        info!("Connecting to Modbus TCP device at {} (unit {})", socket_addr, unit_id);
        let ctx = tcp::connect_slave(socket_addr, Slave(unit_id)).await?;
        Ok(Self::from_context(ctx))
    }

    /// Open a serial port and talk Modbus RTU over it.
    pub fn connect_rtu(path: &str, baud_rate: u32, unit_id: u8) -> Result<Self, DescriptorError> {
        info!(
            "Opening Modbus RTU device on {} at {} baud (unit {})",
            path, baud_rate, unit_id
        );
        let builder = tokio_serial::new(path, baud_rate);
        let port = tokio_serial::SerialStream::open(&builder).map_err(std::io::Error::from)?;
        Ok(Self::attach_rtu(port, unit_id))
    }

    /// Talk Modbus RTU over an already open byte stream.
    pub fn attach_rtu<T>(stream: T, unit_id: u8) -> Self
    where
        T: AsyncRead + AsyncWrite + Debug + Send + Unpin + 'static,
    {
        let client: Box<dyn Client> = Box::new(RtuClient::new(stream, Slave(unit_id)));
        Self::from_context(client::Context::from(client))
    }

    /// Connect the way `config` describes. TCP hosts are resolved first.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DescriptorError> {
        match config.transport {
            TransportKind::Tcp => {
                let socket_addr = tokio::net::lookup_host((config.address.as_str(), config.port))
                    .await?
                    .next()
                    .ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::AddrNotAvailable,
                            format!("{} does not resolve to any address", config.address),
                        )
                    })?;
                Self::connect_tcp(socket_addr, config.unit_id).await
            }
            TransportKind::Rtu => {
                Self::connect_rtu(&config.serial_port, config.baud_rate, config.unit_id)
            }
        }
    }

    pub async fn disconnect(mut self) -> Result<(), DescriptorError> {
        self.ctx.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceInfoTransport for ModbusTransport {
    async fn execute(&mut self, request: DeviceInfoRequest) -> Result<ReadResult, DescriptorError> {
        self.ctx.set_slave(Slave(request.unit_id));
        let data = mei::encode_request(&request);
        debug!("Sending read device identification request {:02X?}", data);

        let response = self
            .ctx
            .call(Request::Custom(mei::FUNCTION_CODE, data.into()))
            .await??;

        match response {
            Response::Custom(mei::FUNCTION_CODE, data) => mei::decode_response(request.read_code, &data),
            other => Err(DescriptorError::protocol(format!(
                "unexpected response to read device identification: {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl RegisterWriter for ModbusTransport {
    async fn write_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), DescriptorError> {
        self.ctx.set_slave(Slave(unit_id));
        debug!("Writing {} to holding register {} of unit {}", value, address, unit_id);
        self.ctx.write_single_register(address, value).await??;
        Ok(())
    }
}
