// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Read Device Identification PDUs (function 0x2B, MEI type 0x0E)
//!
//! tokio-modbus carries these as custom requests: the bytes below are the PDU
//! data following the function code.
//!
//! ### Request
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | MEI type (0x0E) |
//! | 1 | Read device id code |
//! | 2 | Object id |
//!
//! ### Response
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | MEI type (0x0E) |
//! | 1 | Read device id code |
//! | 2 | Conformity level |
//! | 3 | More follows (0x00 / 0xFF) |
//! | 4 | Next object id |
//! | 5 | Number of objects |
//! | 6.. | Objects: id, length, value |

use std::collections::BTreeMap;

use tokio_modbus::ExceptionCode;

use crate::descriptor::{DeviceInfoRequest, ObjectId, ReadDeviceIdCode, ReadResult};
use crate::error::DescriptorError;

/// Encapsulated Interface Transport function code
pub const FUNCTION_CODE: u8 = 0x2B;

/// MEI type of Read Device Identification
pub const MEI_READ_DEVICE_ID: u8 = 0x0E;

/// Largest Modbus PDU, function code included
pub const MAX_PDU_LEN: usize = 253;

/// Response bytes before the first object, function code included
pub const RESPONSE_HEADER_LEN: usize = 7;

const MORE_FOLLOWS: u8 = 0xFF;
const NO_MORE_FOLLOWS: u8 = 0x00;

/// Request data for `request`.
pub fn encode_request(request: &DeviceInfoRequest) -> Vec<u8> {
    vec![MEI_READ_DEVICE_ID, request.read_code.into(), request.object_id]
}

/// Decode request data on the device side.
pub fn decode_request(data: &[u8]) -> Result<(ReadDeviceIdCode, ObjectId), ExceptionCode> {
    match data {
        [MEI_READ_DEVICE_ID, code, object_id] => ReadDeviceIdCode::try_from(*code)
            .map(|code| (code, *object_id))
            .map_err(|_| ExceptionCode::IllegalDataValue),
        [MEI_READ_DEVICE_ID, ..] => Err(ExceptionCode::IllegalDataValue),
        _ => Err(ExceptionCode::IllegalFunction),
    }
}

/// Length of the response data at the start of `data`.
///
/// Serial frames carry no length field, so the object headers are walked to
/// find where the response ends. `None` until enough bytes have arrived.
pub fn response_data_len(data: &[u8]) -> Option<usize> {
    let header_len = RESPONSE_HEADER_LEN - 1;
    let count = *data.get(header_len - 1)?;
    let mut len = header_len;
    for _ in 0..count {
        len += 2 + usize::from(*data.get(len + 1)?);
    }
    Some(len)
}

/// Response data for one page.
///
/// Fails when the page does not fit a single PDU.
pub fn encode_response(read_code: ReadDeviceIdCode, page: &ReadResult) -> Result<Vec<u8>, DescriptorError> {
    let count = u8::try_from(page.information.len())
        .map_err(|_| DescriptorError::protocol(format!("{} objects in one page", page.information.len())))?;
    let mut data = vec![
        MEI_READ_DEVICE_ID,
        read_code.into(),
        page.conformity_level,
        if page.more_follows {
            MORE_FOLLOWS
        } else {
            NO_MORE_FOLLOWS
        },
        page.next_object_id,
        count,
    ];
    for (object_id, value) in &page.information {
        let len = u8::try_from(value.len()).map_err(|_| {
            DescriptorError::protocol(format!(
                "object 0x{object_id:02X} is {} bytes long",
                value.len()
            ))
        })?;
        data.push(*object_id);
        data.push(len);
        data.extend_from_slice(value);
    }
    if data.len() > MAX_PDU_LEN - 1 {
        return Err(DescriptorError::protocol(format!(
            "page of {} bytes exceeds the PDU size",
            data.len() + 1
        )));
    }
    Ok(data)
}

/// Decode response data received for a request made with `read_code`.
pub fn decode_response(read_code: ReadDeviceIdCode, data: &[u8]) -> Result<ReadResult, DescriptorError> {
    let header = data.get(..RESPONSE_HEADER_LEN - 1).ok_or_else(|| {
        DescriptorError::protocol(format!(
            "response too short: {} byte(s), expected at least {}",
            data.len(),
            RESPONSE_HEADER_LEN - 1
        ))
    })?;

    if header[0] != MEI_READ_DEVICE_ID {
        return Err(DescriptorError::protocol(format!(
            "unexpected MEI type 0x{:02X}",
            header[0]
        )));
    }
    if header[1] != u8::from(read_code) {
        return Err(DescriptorError::protocol(format!(
            "read device id code 0x{:02X} does not match request ({})",
            header[1], read_code
        )));
    }
    let more_follows = match header[3] {
        MORE_FOLLOWS => true,
        NO_MORE_FOLLOWS => false,
        other => {
            return Err(DescriptorError::protocol(format!(
                "invalid more follows flag 0x{other:02X}"
            )))
        }
    };
    let count = usize::from(header[5]);

    let mut information = BTreeMap::new();
    let mut rest = &data[RESPONSE_HEADER_LEN - 1..];
    for index in 0..count {
        let (object_id, len) = match rest {
            [object_id, len, ..] => (*object_id, usize::from(*len)),
            _ => {
                return Err(DescriptorError::protocol(format!(
                    "object {} of {} is missing",
                    index + 1,
                    count
                )))
            }
        };
        let value = rest.get(2..2 + len).ok_or_else(|| {
            DescriptorError::protocol(format!(
                "object 0x{object_id:02X} announces {len} byte(s), {} available",
                rest.len() - 2
            ))
        })?;
        information.insert(object_id, value.to_vec());
        rest = &rest[2 + len..];
    }
    if !rest.is_empty() {
        return Err(DescriptorError::protocol(format!(
            "{} unexpected byte(s) after {} object(s)",
            rest.len(),
            count
        )));
    }

    Ok(ReadResult {
        more_follows,
        next_object_id: header[4],
        information,
        conformity_level: header[2],
    })
}
