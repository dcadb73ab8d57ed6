// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! UUID test device
//!
//! The UUID test firmware publishes one UUID per supported version as a
//! descriptor object, formatted as a NUL terminated hyphenated string, and
//! regenerates the UUID of version `v` when `v` is written to holding
//! register 15.
//!
//! | Object Id | Field | Content |
//! |-----------|-------|---------|
//! | 0x8A | uuid_ns | Namespace used by v3 and v5 |
//! | 0x8B | uuid1 | Date-time and node |
//! | 0x8D | uuid3 | MD5 of namespace and name |
//! | 0x8E | uuid4 | Random |
//! | 0x8F | uuid5 | SHA1 of namespace and name |
//! | 0x90 | uuid6 | Reordered date-time and node |
//!
//! [`UuidDevice`] composes a transport, a [`DescriptorReader`] and a
//! [`DescriptorTagTable`] holding the fields above; it owns no protocol logic
//! of its own.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::descriptor::{parse_string, DescriptorReader, DescriptorTagTable, ObjectId};
use crate::error::{DescriptorError, TagError};
use crate::transport::{DeviceInfoTransport, RegisterWriter};

/// Holding register triggering a regeneration.
pub const REGEN_REGISTER: u16 = 15;

/// Object holding the namespace UUID. Version `v` lives at `UUID_NAMESPACE_OBJECT + v`.
pub const UUID_NAMESPACE_OBJECT: ObjectId = 0x8A;

/// Length of the published string, NUL terminator included.
pub const UUID_STRING_LEN: usize = 37;

/// Name hashed with the namespace for v3 and v5.
pub const UUID_NAME: &[u8] = b"test";

/// UUID versions the test firmware can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UuidVersion {
    V1 = 1,
    V3 = 3,
    V4 = 4,
    V5 = 5,
    V6 = 6,
}

impl UuidVersion {
    pub const ALL: [UuidVersion; 5] = [
        UuidVersion::V1,
        UuidVersion::V3,
        UuidVersion::V4,
        UuidVersion::V5,
        UuidVersion::V6,
    ];

    pub fn number(self) -> u16 {
        self as u16
    }

    /// Descriptor object publishing this version.
    pub fn object_id(self) -> ObjectId {
        UUID_NAMESPACE_OBJECT + self as u8
    }

    /// Field name in the tag table.
    pub fn field_name(self) -> String {
        format!("uuid{}", self.number())
    }
}

impl TryFrom<u16> for UuidVersion {
    type Error = UuidDeviceError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(UuidVersion::V1),
            3 => Ok(UuidVersion::V3),
            4 => Ok(UuidVersion::V4),
            5 => Ok(UuidVersion::V5),
            6 => Ok(UuidVersion::V6),
            other => Err(UuidDeviceError::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for UuidVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Errors of the UUID test device layer.
#[derive(Error, Debug)]
pub enum UuidDeviceError {
    #[error("UUID version {0} is not supported (expected one of 1, 3, 4, 5, 6)")]
    UnsupportedVersion(u16),

    #[error(transparent)]
    Read(#[from] DescriptorError),

    #[error(transparent)]
    Decode(#[from] TagError),

    #[error("Descriptor '{0}' is missing from the device")]
    MissingField(String),

    #[error("Descriptor '{field}' does not hold a UUID: {source}")]
    InvalidUuid {
        field: String,
        #[source]
        source: uuid::Error,
    },
}

/// Format `uuid` the way the firmware publishes it.
pub fn encode_uuid_descriptor(uuid: &Uuid) -> Vec<u8> {
    let mut value = uuid.hyphenated().to_string().into_bytes();
    value.push(0);
    value
}

/// UUIDs read back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidReport {
    pub namespace: Uuid,
    pub uuids: BTreeMap<UuidVersion, Uuid>,
}

impl fmt::Display for UuidReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "namespace : {}", self.namespace)?;
        for (version, uuid) in &self.uuids {
            writeln!(f, "{:<9} : {}", version.field_name(), uuid)?;
        }
        Ok(())
    }
}

/// Tag table of the UUID fields, on top of the standard objects.
pub fn uuid_tag_table() -> DescriptorTagTable {
    UuidVersion::ALL.iter().fold(
        DescriptorTagTable::standard().tag(UUID_NAMESPACE_OBJECT, "uuid_ns", parse_string),
        |table, version| table.tag(version.object_id(), version.field_name(), parse_string),
    )
}

/// A UUID test device reached through `transport`.
pub struct UuidDevice<T> {
    transport: T,
    reader: DescriptorReader,
    tags: DescriptorTagTable,
    regen_register: u16,
}

impl<T> UuidDevice<T>
where
    T: DeviceInfoTransport + RegisterWriter,
{
    /// `reader` selects the unit id, timeout and page cap used for every read.
    pub fn new(transport: T, reader: DescriptorReader) -> Self {
        Self {
            transport,
            reader,
            tags: uuid_tag_table(),
            regen_register: REGEN_REGISTER,
        }
    }

    pub fn with_regen_register(mut self, register: u16) -> Self {
        self.regen_register = register;
        self
    }

    /// Replace the tag table; it must still name `uuid_ns` and the `uuidN` fields.
    pub fn with_tags(mut self, tags: DescriptorTagTable) -> Self {
        self.tags = tags;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Ask the device to generate a new UUID of `version`.
    pub async fn regen_uuid(&mut self, version: UuidVersion) -> Result<(), UuidDeviceError> {
        info!("Regenerating UUID {} on unit {}", version, self.reader.unit_id());
        self.transport
            .write_register(self.reader.unit_id(), self.regen_register, version.number())
            .await?;
        Ok(())
    }

    /// Regenerate every supported version, in ascending order.
    pub async fn regen_all(&mut self) -> Result<(), UuidDeviceError> {
        for version in UuidVersion::ALL {
            self.regen_uuid(version).await?;
        }
        Ok(())
    }

    /// Read all descriptors and extract the namespace and every UUID.
    pub async fn read_uuids(&mut self) -> Result<UuidReport, UuidDeviceError> {
        let descriptors = self.reader.read_all(&mut self.transport, 0).await?;
        let fields = self.tags.decode(&descriptors)?;
        debug!("Decoded {} descriptor field(s)", fields.len());

        let parse = |field: String| -> Result<Uuid, UuidDeviceError> {
            let text = fields
                .get(&field)
                .and_then(|value| value.as_text())
                .ok_or_else(|| UuidDeviceError::MissingField(field.clone()))?;
            Uuid::parse_str(text).map_err(|source| UuidDeviceError::InvalidUuid { field, source })
        };

        let namespace = parse("uuid_ns".to_string())?;
        let mut uuids = BTreeMap::new();
        for version in UuidVersion::ALL {
            let uuid = parse(version.field_name())?;
            if uuid.get_version_num() != usize::from(version.number()) {
                warn!(
                    "Device published {} for {}, which carries version {}",
                    uuid,
                    version,
                    uuid.get_version_num()
                );
            }
            uuids.insert(version, uuid);
        }

        Ok(UuidReport { namespace, uuids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ReadResult;
    use crate::transport::MockTransport;

    #[test]
    fn test_version_validation() {
        assert_eq!(UuidVersion::try_from(4).unwrap(), UuidVersion::V4);
        for invalid in [0, 2, 7, 15] {
            assert!(matches!(
                UuidVersion::try_from(invalid),
                Err(UuidDeviceError::UnsupportedVersion(v)) if v == invalid
            ));
        }
    }

    #[test]
    fn test_object_ids_follow_the_namespace() {
        assert_eq!(UuidVersion::V1.object_id(), 0x8B);
        assert_eq!(UuidVersion::V6.object_id(), 0x90);
        assert_eq!(UuidVersion::V3.field_name(), "uuid3");
    }

    #[test]
    fn test_encoded_descriptor_is_nul_terminated() {
        let value = encode_uuid_descriptor(&Uuid::nil());
        assert_eq!(value.len(), UUID_STRING_LEN);
        assert_eq!(value.last(), Some(&0));
    }

    #[tokio::test]
    async fn test_regen_all_writes_every_version() {
        let mut device = UuidDevice::new(MockTransport::default(), DescriptorReader::new(5));

        device.regen_all().await.unwrap();

        assert_eq!(
            device.transport().writes(),
            &[(5, 15, 1), (5, 15, 3), (5, 15, 4), (5, 15, 5), (5, 15, 6)]
        );
    }

    #[tokio::test]
    async fn test_read_uuids_reports_missing_field() {
        let namespace = Uuid::new_v4();
        let page = ReadResult::page(
            false,
            0,
            [(UUID_NAMESPACE_OBJECT, encode_uuid_descriptor(&namespace))],
        );
        let mut device = UuidDevice::new(MockTransport::with_pages([page]), DescriptorReader::new(5));

        let err = device.read_uuids().await.unwrap_err();

        assert!(matches!(err, UuidDeviceError::MissingField(field) if field == "uuid1"));
    }
}
