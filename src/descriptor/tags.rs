// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Descriptor tag table
//!
//! The reader returns raw bytes. What an object id means, and how its bytes are
//! interpreted, is decided by the caller through a [`DescriptorTagTable`]:
//! a plain value mapping object ids to a field name and a decode function.
//!
//! | Object Id | Name | Decoder |
//! |-----------|------|---------|
//! | 0x00 | vendor_name | string |
//! | 0x01 | product_code | string |
//! | 0x02 | major_minor_revision | string |
//! | 0x03 | vendor_url | string |
//! | 0x04 | product_name | string |
//! | 0x05 | model_name | string |
//! | 0x06 | user_application_name | string |
//!
//! The table above is [`DescriptorTagTable::standard`]; device specific objects
//! (usually in the private range 0x80-0xFF) are added with
//! [`DescriptorTagTable::with_tag`]. Field names are unique within a table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DescriptorMap, ObjectId};
use crate::error::TagError;

/// Decoded value of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Text(String),
    Integer(u64),
    Bytes(Vec<u8>),
}

impl DecodedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Text(text) => f.write_str(text),
            DecodedValue::Integer(value) => write!(f, "{value}"),
            DecodedValue::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Decode function: raw bytes to value, or a reason.
pub type TagDecoder = fn(&[u8]) -> Result<DecodedValue, String>;

/// UTF-8 text; trailing NUL padding (C string buffers) is dropped.
pub fn parse_string(raw: &[u8]) -> Result<DecodedValue, String> {
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let text = std::str::from_utf8(&raw[..end]).map_err(|e| e.to_string())?;
    Ok(DecodedValue::Text(text.to_string()))
}

/// Big-endian unsigned integer of 1 to 8 bytes.
pub fn parse_integer(raw: &[u8]) -> Result<DecodedValue, String> {
    if raw.is_empty() || raw.len() > 8 {
        return Err(format!("expected 1 to 8 bytes, got {}", raw.len()));
    }
    let value = raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Ok(DecodedValue::Integer(value))
}

/// Bytes kept as they are.
pub fn parse_bytes(raw: &[u8]) -> Result<DecodedValue, String> {
    Ok(DecodedValue::Bytes(raw.to_vec()))
}

/// Built-in decoders, as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    String,
    Integer,
    Bytes,
}

impl TagKind {
    pub fn decoder(self) -> TagDecoder {
        match self {
            TagKind::String => parse_string,
            TagKind::Integer => parse_integer,
            TagKind::Bytes => parse_bytes,
        }
    }
}

/// Name and decoder of one object id.
#[derive(Clone)]
pub struct DescriptorTag {
    pub name: String,
    pub decoder: TagDecoder,
}

impl fmt::Debug for DescriptorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorTag").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Object id to (name, decoder) mapping supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTagTable {
    tags: HashMap<ObjectId, DescriptorTag>,
}

impl DescriptorTagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the standard Modbus identification objects.
    pub fn standard() -> Self {
        [
            (0x00, "vendor_name"),
            (0x01, "product_code"),
            (0x02, "major_minor_revision"),
            (0x03, "vendor_url"),
            (0x04, "product_name"),
            (0x05, "model_name"),
            (0x06, "user_application_name"),
        ]
        .into_iter()
        .fold(Self::new(), |table, (id, name)| table.tag(id, name, parse_string))
    }

    /// Add or replace the tag of `object_id`.
    ///
    /// Fails when `name` already belongs to another object id.
    pub fn with_tag(
        mut self,
        object_id: ObjectId,
        name: impl Into<String>,
        decoder: TagDecoder,
    ) -> Result<Self, TagError> {
        let name = name.into();
        self.check_name(object_id, &name)?;
        Ok(self.tag(object_id, name, decoder))
    }

    /// Add the tag of `object_id`, refusing to silently overwrite an existing one.
    pub fn insert(
        &mut self,
        object_id: ObjectId,
        name: impl Into<String>,
        decoder: TagDecoder,
    ) -> Result<(), TagError> {
        if let Some(existing) = self.tags.get(&object_id) {
            return Err(TagError::DuplicateTag {
                object_id,
                existing: existing.name.clone(),
            });
        }
        let name = name.into();
        self.check_name(object_id, &name)?;
        self.tags.insert(object_id, DescriptorTag { name, decoder });
        Ok(())
    }

    /// Unchecked insertion, for tables whose names are known to be unique.
    pub(crate) fn tag(mut self, object_id: ObjectId, name: impl Into<String>, decoder: TagDecoder) -> Self {
        self.tags.insert(
            object_id,
            DescriptorTag {
                name: name.into(),
                decoder,
            },
        );
        self
    }

    fn check_name(&self, object_id: ObjectId, name: &str) -> Result<(), TagError> {
        match self
            .tags
            .iter()
            .find(|(id, tag)| **id != object_id && tag.name == name)
        {
            Some((existing, _)) => Err(TagError::DuplicateName {
                name: name.to_string(),
                object_id,
                existing: *existing,
            }),
            None => Ok(()),
        }
    }

    pub fn get(&self, object_id: ObjectId) -> Option<&DescriptorTag> {
        self.tags.get(&object_id)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Decode every object of `descriptors`.
    ///
    /// Objects without a tag are kept raw under `object_<id>` (lowercase hex),
    /// so nothing read from the device is lost. A tag named like one of these
    /// keys is an error rather than a silent overwrite.
    pub fn decode(&self, descriptors: &DescriptorMap) -> Result<BTreeMap<String, DecodedValue>, TagError> {
        let mut fields = BTreeMap::new();
        let mut owners = HashMap::new();
        for (object_id, raw) in descriptors.iter() {
            let (name, value) = match self.tags.get(&object_id) {
                Some(tag) => {
                    let value = (tag.decoder)(raw).map_err(|reason| TagError::Decode {
                        object_id,
                        name: tag.name.clone(),
                        reason,
                    })?;
                    (tag.name.clone(), value)
                }
                None => (format!("object_{object_id:02x}"), DecodedValue::Bytes(raw.to_vec())),
            };
            if let Some(existing) = owners.insert(name.clone(), object_id) {
                return Err(TagError::DuplicateName {
                    name,
                    object_id,
                    existing,
                });
            }
            fields.insert(name, value);
        }
        Ok(fields)
    }
}
