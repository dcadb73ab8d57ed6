// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device descriptors
//!
//! A device exposes its metadata (vendor, product, firmware version, UUIDs...)
//! as *descriptor objects* addressed by a one byte object id. The objects are
//! only served in small pages: every response carries a `more_follows` flag and
//! the id of the next object to ask for.
//!
//! ## Key Components
//!
//! - [`DescriptorMap`]: the merged object id to bytes mapping of one read session
//! - [`ReadResult`]: one page as returned by a single round trip
//! - [`DescriptorReader`]: the cursor driven loop gluing pages together
//! - [`DescriptorTagTable`]: caller supplied names and decoders for object ids
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_descriptors::descriptor::{DescriptorReader, DescriptorTagTable};
//! use rust_modbus_descriptors::modbus::ModbusTransport;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut transport = ModbusTransport::connect_tcp("127.0.0.1:502".parse()?, 5).await?;
//! let descriptors = DescriptorReader::new(5).read_all(&mut transport, 0).await?;
//! let fields = DescriptorTagTable::standard().decode(&descriptors)?;
//! for (name, value) in &fields {
//!     println!("{name}: {value}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod tags;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use reader::{read_all, DescriptorReader, DEFAULT_MAX_PAGES};
pub use tags::{
    parse_bytes, parse_integer, parse_string, DecodedValue, DescriptorTag, DescriptorTagTable,
    TagDecoder, TagKind,
};

/// Identifier of one descriptor slot.
pub type ObjectId = u8;

/// Raw bytes of one descriptor object. Interpretation is up to the tag table.
pub type DescriptorValue = Vec<u8>;

/// Access type of a Read Device Identification request.
///
/// The three stream codes read every object from the cursor up to the end of
/// their category, `Individual` reads exactly the requested object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadDeviceIdCode {
    /// Objects 0x00-0x02 (vendor name, product code, revision)
    Basic = 0x01,
    /// Basic objects plus 0x03-0x7F
    Regular = 0x02,
    /// Regular objects plus the private range 0x80-0xFF
    Extended = 0x03,
    /// One specific object
    Individual = 0x04,
}

impl ReadDeviceIdCode {
    /// Highest object id reachable by a stream access with this code.
    pub fn last_object_id(self) -> ObjectId {
        match self {
            ReadDeviceIdCode::Basic => 0x02,
            ReadDeviceIdCode::Regular => 0x7F,
            ReadDeviceIdCode::Extended | ReadDeviceIdCode::Individual => 0xFF,
        }
    }
}

impl TryFrom<u8> for ReadDeviceIdCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ReadDeviceIdCode::Basic),
            0x02 => Ok(ReadDeviceIdCode::Regular),
            0x03 => Ok(ReadDeviceIdCode::Extended),
            0x04 => Ok(ReadDeviceIdCode::Individual),
            other => Err(other),
        }
    }
}

impl From<ReadDeviceIdCode> for u8 {
    fn from(code: ReadDeviceIdCode) -> Self {
        code as u8
    }
}

impl fmt::Display for ReadDeviceIdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadDeviceIdCode::Basic => "basic",
            ReadDeviceIdCode::Regular => "regular",
            ReadDeviceIdCode::Extended => "extended",
            ReadDeviceIdCode::Individual => "individual",
        };
        f.write_str(name)
    }
}

/// One "read device information" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfoRequest {
    /// Modbus unit (slave) id of the device
    pub unit_id: u8,
    /// Access type
    pub read_code: ReadDeviceIdCode,
    /// Cursor: first object to return
    pub object_id: ObjectId,
}

/// One page of descriptor objects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadResult {
    /// The device has more objects after this page
    pub more_follows: bool,
    /// Cursor for the next request, only meaningful when `more_follows` is set
    pub next_object_id: ObjectId,
    /// Objects carried by this page
    pub information: BTreeMap<ObjectId, DescriptorValue>,
    /// Identification level declared by the device
    pub conformity_level: u8,
}

impl ReadResult {
    /// Build a page from `(id, bytes)` pairs.
    pub fn page<I, V>(more_follows: bool, next_object_id: ObjectId, objects: I) -> Self
    where
        I: IntoIterator<Item = (ObjectId, V)>,
        V: Into<DescriptorValue>,
    {
        Self {
            more_follows,
            next_object_id,
            information: objects
                .into_iter()
                .map(|(id, value)| (id, value.into()))
                .collect(),
            conformity_level: 0,
        }
    }
}

/// The merged descriptors of one read session.
///
/// Built only by the reader; callers get an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DescriptorMap {
    objects: BTreeMap<ObjectId, DescriptorValue>,
}

impl DescriptorMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Merge one page, later values replacing earlier ones for a repeated id.
    pub(crate) fn merge(&mut self, information: BTreeMap<ObjectId, DescriptorValue>) {
        self.objects.extend(information);
    }

    pub fn get(&self, object_id: ObjectId) -> Option<&[u8]> {
        self.objects.get(&object_id).map(Vec::as_slice)
    }

    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.objects.contains_key(&object_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &[u8])> {
        self.objects.iter().map(|(id, value)| (*id, value.as_slice()))
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn into_inner(self) -> BTreeMap<ObjectId, DescriptorValue> {
        self.objects
    }
}

impl<V: Into<DescriptorValue>> FromIterator<(ObjectId, V)> for DescriptorMap {
    fn from_iter<T: IntoIterator<Item = (ObjectId, V)>>(iter: T) -> Self {
        Self {
            objects: iter
                .into_iter()
                .map(|(id, value)| (id, value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_last_write_wins() {
        let mut map = DescriptorMap::new();
        map.merge(ReadResult::page(true, 2, [(1, "a"), (2, "b")]).information);
        map.merge(ReadResult::page(false, 0, [(2, "c")]).information);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), Some(&b"a"[..]));
        assert_eq!(map.get(2), Some(&b"c"[..]));
    }

    #[test]
    fn test_read_code_round_trips_through_u8() {
        for code in [
            ReadDeviceIdCode::Basic,
            ReadDeviceIdCode::Regular,
            ReadDeviceIdCode::Extended,
            ReadDeviceIdCode::Individual,
        ] {
            assert_eq!(ReadDeviceIdCode::try_from(u8::from(code)), Ok(code));
        }
        assert_eq!(ReadDeviceIdCode::try_from(0x05), Err(0x05));
        assert_eq!(ReadDeviceIdCode::try_from(0x00), Err(0x00));
    }

    #[test]
    fn test_stream_limits() {
        assert_eq!(ReadDeviceIdCode::Basic.last_object_id(), 0x02);
        assert_eq!(ReadDeviceIdCode::Regular.last_object_id(), 0x7F);
        assert_eq!(ReadDeviceIdCode::Extended.last_object_id(), 0xFF);
    }
}
