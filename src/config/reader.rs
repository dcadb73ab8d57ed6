// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Descriptor reader and tag configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::descriptor::{
    DescriptorReader, ObjectId, ReadDeviceIdCode, TagKind, DEFAULT_MAX_PAGES,
};

/// Options of a descriptor read session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Access type of the requests. Default is `extended`, which reaches the
    /// private objects 0x80-0xFF where device specific descriptors live.
    pub read_code: ReadDeviceIdCode,

    /// Object the first request starts from.
    pub start_object_id: ObjectId,

    /// Bound of a single round trip in milliseconds, 0 disables it.
    pub timeout_ms: u64,

    /// Maximum number of round trips in one session.
    pub max_pages: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_code: ReadDeviceIdCode::Extended,
            start_object_id: 0,
            timeout_ms: 1000,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ReaderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Reader for `unit_id` with these options.
    pub fn build_reader(&self, unit_id: u8) -> DescriptorReader {
        DescriptorReader::new(unit_id)
            .with_read_code(self.read_code)
            .with_timeout(self.timeout())
            .with_max_pages(self.max_pages)
    }
}

/// One device specific descriptor tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    /// Object id of the descriptor
    pub id: ObjectId,
    /// Field name it is reported under
    pub name: String,
    /// Decoder applied to its bytes
    pub kind: TagKind,
}

/// UUID test device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UuidConfig {
    /// Holding register triggering a UUID regeneration.
    pub regen_register: u16,
}

impl Default for UuidConfig {
    fn default() -> Self {
        Self {
            regen_register: crate::uuid_device::REGEN_REGISTER,
        }
    }
}
