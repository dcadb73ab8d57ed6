// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated descriptor device
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides
//! descriptors, while the client is the device that requests them.
//!
//! ## Supported Requests
//!
//! | Function | Description |
//! |----------|-------------|
//! | 0x2B / 0x0E | Read Device Identification, stream and individual access |
//! | 0x03 | Read Holding Registers |
//! | 0x06 | Write Single Register |
//! | 0x10 | Write Multiple Registers |
//!
//! Any other function code returns an IllegalFunction exception.
//!
//! Writing a UUID version number to holding register 15 regenerates that UUID
//! descriptor, as the UUID test firmware does.

use std::{
    collections::{BTreeMap, HashMap},
    future,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio_modbus::prelude::*;
use uuid::Uuid;

use super::mei;
use crate::descriptor::{DescriptorValue, ObjectId, ReadDeviceIdCode, ReadResult};
use crate::uuid_device::{encode_uuid_descriptor, UuidVersion, REGEN_REGISTER, UUID_NAME, UUID_NAMESPACE_OBJECT};

/// Largest value that still fits a response page on its own.
pub const MAX_OBJECT_LEN: usize = mei::MAX_PDU_LEN - mei::RESPONSE_HEADER_LEN - 2;

/// Default number of objects per response page.
pub const DEFAULT_OBJECTS_PER_PAGE: usize = 3;

/// A Modbus server exposing descriptor objects through Read Device Identification.
///
/// Clones share the same objects and registers, so one instance can be handed
/// to every accepted connection.
#[derive(Clone)]
pub struct DescriptorModbusServer {
    /// Descriptor objects by id, each at most [`MAX_OBJECT_LEN`] bytes
    objects: Arc<Mutex<BTreeMap<ObjectId, DescriptorValue>>>,

    /// Holding registers (read-write)
    holding_registers: Arc<Mutex<HashMap<u16, u16>>>,

    /// Namespace of the v3 and v5 UUIDs
    namespace: Uuid,

    /// Node id of the v1 and v6 UUIDs
    node_id: [u8; 6],

    objects_per_page: usize,
}

impl tokio_modbus::server::Service for DescriptorModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::Custom(mei::FUNCTION_CODE, data) => self
                .read_device_identification(&data)
                .map(|data| Response::Custom(mei::FUNCTION_CODE, Bytes::from(data))),
            Request::ReadHoldingRegisters(addr, cnt) => {
                debug!(
                    "Reading {} holding registers starting from address {}",
                    cnt, addr
                );
                self.read_holding_registers(addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            Request::WriteMultipleRegisters(addr, values) => {
                debug!(
                    "Writing {} values to holding registers starting from address {}",
                    values.len(),
                    addr
                );
                self.write_holding_registers(addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::WriteSingleRegister(addr, value) => {
                debug!("Writing value {} to holding register {}", value, addr);
                self.write_holding_registers(addr, std::slice::from_ref(&value))
                    .map(|_| Response::WriteSingleRegister(addr, value))
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

impl Default for DescriptorModbusServer {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorModbusServer {
    /// Create a server with no objects and no registers.
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            holding_registers: Arc::new(Mutex::new(HashMap::new())),
            namespace: Uuid::new_v4(),
            node_id: rand::random(),
            objects_per_page: DEFAULT_OBJECTS_PER_PAGE,
        }
    }

    /// Create a server behaving like the UUID test firmware.
    ///
    /// Standard identification objects 0x00-0x06, the namespace at 0x8A, one
    /// UUID per supported version, and the regeneration register set to 0.
    pub fn uuid_test_device() -> Self {
        let server = Self::new();
        {
            let mut objects = server.lock_objects();
            for (object_id, value) in [
                (0x00, "Example Instruments"),
                (0x01, "UUID-TEST"),
                (0x02, "1.0.0"),
                (0x03, "https://example.com/uuid-test"),
                (0x04, "UUID test device"),
                (0x05, "UT-1"),
                (0x06, "uuid-test-firmware"),
            ] {
                objects.insert(object_id, value.as_bytes().to_vec());
            }
            objects.insert(UUID_NAMESPACE_OBJECT, encode_uuid_descriptor(&server.namespace));
        }
        for version in UuidVersion::ALL {
            server.regenerate(version);
        }
        server.lock_registers().insert(REGEN_REGISTER, 0);
        server
    }

    /// Maximum number of objects per response page (at least 1).
    pub fn with_objects_per_page(mut self, objects_per_page: usize) -> Self {
        self.objects_per_page = objects_per_page.max(1);
        self
    }

    pub fn namespace(&self) -> Uuid {
        self.namespace
    }

    /// Install or replace one object. Values too long for a page are truncated.
    pub fn set_object(&self, object_id: ObjectId, value: impl Into<DescriptorValue>) {
        let mut value = value.into();
        if value.len() > MAX_OBJECT_LEN {
            warn!(
                "Object 0x{:02X} is {} bytes long, truncating to {}",
                object_id,
                value.len(),
                MAX_OBJECT_LEN
            );
            value.truncate(MAX_OBJECT_LEN);
        }
        self.lock_objects().insert(object_id, value);
    }

    pub fn object(&self, object_id: ObjectId) -> Option<DescriptorValue> {
        self.lock_objects().get(&object_id).cloned()
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.lock_registers().insert(address, value);
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjectId, DescriptorValue>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_registers(&self) -> std::sync::MutexGuard<'_, HashMap<u16, u16>> {
        self.holding_registers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generate a new UUID of `version` and publish it.
    fn regenerate(&self, version: UuidVersion) {
        let uuid = match version {
            UuidVersion::V1 => Uuid::now_v1(&self.node_id),
            UuidVersion::V3 => Uuid::new_v3(&self.namespace, UUID_NAME),
            UuidVersion::V4 => Uuid::new_v4(),
            UuidVersion::V5 => Uuid::new_v5(&self.namespace, UUID_NAME),
            UuidVersion::V6 => Uuid::now_v6(&self.node_id),
        };
        info!("Regenerated UUID {}: {}", version, uuid);
        self.lock_objects()
            .insert(version.object_id(), encode_uuid_descriptor(&uuid));
    }

    fn read_device_identification(&self, data: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        let (read_code, object_id) = mei::decode_request(data)?;
        debug!(
            "Read device identification ({}) from object 0x{:02X}",
            read_code, object_id
        );

        let objects = self.lock_objects();
        let mut page = match read_code {
            ReadDeviceIdCode::Individual => {
                let value = objects.get(&object_id).ok_or_else(|| {
                    error!("Exception::IllegalDataAddress - no object 0x{object_id:02X}");
                    ExceptionCode::IllegalDataAddress
                })?;
                ReadResult::page(false, 0, [(object_id, value.clone())])
            }
            stream => stream_page(&objects, stream, object_id, self.objects_per_page),
        };
        page.conformity_level = conformity_level(&objects);

        mei::encode_response(read_code, &page).map_err(|e| {
            error!("Exception::ServerDeviceFailure - {e}");
            ExceptionCode::ServerDeviceFailure
        })
    }

    fn read_holding_registers(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        let registers = self.lock_registers();
        (0..cnt)
            .map(|i| {
                let reg_addr = addr.checked_add(i).ok_or(ExceptionCode::IllegalDataAddress)?;
                registers.get(&reg_addr).copied().ok_or_else(|| {
                    error!("Exception::IllegalDataAddress - no register {reg_addr}");
                    ExceptionCode::IllegalDataAddress
                })
            })
            .collect()
    }

    /// Write holding registers, then run the regeneration hook.
    ///
    /// Every address is checked before anything is written.
    fn write_holding_registers(&self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        let mut regen = None;
        {
            let mut registers = self.lock_registers();
            let mut targets = Vec::with_capacity(values.len());
            for (i, value) in values.iter().enumerate() {
                let reg_addr = u16::try_from(i)
                    .ok()
                    .and_then(|i| addr.checked_add(i))
                    .filter(|reg_addr| registers.contains_key(reg_addr))
                    .ok_or_else(|| {
                        error!("Exception::IllegalDataAddress - write beyond known registers");
                        ExceptionCode::IllegalDataAddress
                    })?;
                if reg_addr == REGEN_REGISTER {
                    regen = Some(UuidVersion::try_from(*value).map_err(|e| {
                        error!("Exception::IllegalDataValue - {e}");
                        ExceptionCode::IllegalDataValue
                    })?);
                }
                targets.push((reg_addr, *value));
            }
            registers.extend(targets);
        }

        if let Some(version) = regen {
            self.regenerate(version);
        }
        Ok(())
    }
}

/// Next page of a stream access starting at `object_id`.
///
/// An object id that is not a known object in the category restarts the
/// stream at the first object. A page always holds at least one object when
/// the category is not empty, so the cursor moves on every page.
fn stream_page(
    objects: &BTreeMap<ObjectId, DescriptorValue>,
    read_code: ReadDeviceIdCode,
    object_id: ObjectId,
    objects_per_page: usize,
) -> ReadResult {
    let last = read_code.last_object_id();
    let start = if object_id <= last && objects.contains_key(&object_id) {
        object_id
    } else {
        0
    };

    let mut page = ReadResult::default();
    let mut budget = mei::MAX_PDU_LEN - mei::RESPONSE_HEADER_LEN;
    for (id, value) in objects.range(start..=last) {
        let cost = 2 + value.len();
        let full = page.information.len() == objects_per_page || cost > budget;
        if full && !page.information.is_empty() {
            page.more_follows = true;
            page.next_object_id = *id;
            break;
        }
        budget = budget.saturating_sub(cost);
        page.information.insert(*id, value.clone());
    }
    page
}

/// Conformity level: highest category present, with individual access.
fn conformity_level(objects: &BTreeMap<ObjectId, DescriptorValue>) -> u8 {
    let category = match objects.keys().next_back() {
        Some(id) if *id > ReadDeviceIdCode::Regular.last_object_id() => ReadDeviceIdCode::Extended,
        Some(id) if *id > ReadDeviceIdCode::Basic.last_object_id() => ReadDeviceIdCode::Regular,
        _ => ReadDeviceIdCode::Basic,
    };
    0x80 | u8::from(category)
}
