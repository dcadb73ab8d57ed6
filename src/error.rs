// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types shared by the descriptor reader and its transports

use std::time::Duration;

use thiserror::Error;
use tokio_modbus::{ExceptionCode, ExceptionResponse, ProtocolError};

use crate::descriptor::ObjectId;

/// Errors raised while reading descriptors from a remote device.
///
/// None of these are recovered locally: a failing round trip aborts the whole
/// read session and no partial [`DescriptorMap`](crate::descriptor::DescriptorMap)
/// is handed out.
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// The connection could not be opened, or a send/receive failed.
    #[error("Transport failure: {source}")]
    Transport {
        #[from]
        source: std::io::Error,
    },

    /// The device answered, but the response is malformed or incomplete.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// No response arrived within the round trip bound.
    #[error("No response from unit {unit_id} for object 0x{object_id:02X} within {timeout:?}")]
    Timeout {
        unit_id: u8,
        object_id: ObjectId,
        timeout: Duration,
    },

    /// The device answered with a Modbus exception response.
    #[error("Device exception: {code}")]
    Exception { code: ExceptionCode },

    /// The device still reported `more_follows` after the page cap was reached.
    #[error("Device still reports more objects after {pages} pages (cursor at 0x{cursor:02X})")]
    PageLimit { pages: usize, cursor: ObjectId },
}

impl DescriptorError {
    /// Shorthand used by the codecs.
    pub fn protocol(reason: impl Into<String>) -> Self {
        DescriptorError::Protocol {
            reason: reason.into(),
        }
    }
}

impl From<tokio_modbus::Error> for DescriptorError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(source) => DescriptorError::Transport { source },
            // tokio-modbus does not know the function code of 0x2B exception
            // answers, so they surface as a mismatch carrying the exception.
            tokio_modbus::Error::Protocol(
                ProtocolError::FunctionCodeMismatch {
                    result: Err(ExceptionResponse { exception, .. }),
                    ..
                }
                | ProtocolError::HeaderMismatch {
                    result: Err(ExceptionResponse { exception, .. }),
                    ..
                },
            ) => DescriptorError::Exception { code: exception },
            other => DescriptorError::protocol(other.to_string()),
        }
    }
}

impl From<ExceptionCode> for DescriptorError {
    fn from(code: ExceptionCode) -> Self {
        DescriptorError::Exception { code }
    }
}

/// Errors raised while turning raw descriptor bytes into named fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("Descriptor '{name}' (object 0x{object_id:02X}) could not be decoded: {reason}")]
    Decode {
        object_id: ObjectId,
        name: String,
        reason: String,
    },

    #[error("Object 0x{object_id:02X} is already tagged as '{existing}'")]
    DuplicateTag { object_id: ObjectId, existing: String },

    #[error("Name '{name}' of object 0x{object_id:02X} is already used by object 0x{existing:02X}")]
    DuplicateName {
        name: String,
        object_id: ObjectId,
        existing: ObjectId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_transport_error_maps_to_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled");
        let err: DescriptorError = tokio_modbus::Error::Transport(io).into();
        assert!(matches!(err, DescriptorError::Transport { .. }));
    }

    #[test]
    fn test_exception_answer_to_custom_function_maps_to_exception() {
        let err: DescriptorError = tokio_modbus::Error::Protocol(ProtocolError::FunctionCodeMismatch {
            request: tokio_modbus::FunctionCode::EncapsulatedInterfaceTransport,
            result: Err(ExceptionResponse {
                function: tokio_modbus::FunctionCode::EncapsulatedInterfaceTransport,
                exception: ExceptionCode::IllegalDataAddress,
            }),
        })
        .into();
        assert!(matches!(
            err,
            DescriptorError::Exception {
                code: ExceptionCode::IllegalDataAddress
            }
        ));
    }

    #[test]
    fn test_mismatched_response_stays_a_protocol_error() {
        let err: DescriptorError = tokio_modbus::Error::Protocol(ProtocolError::HeaderMismatch {
            message: "unit id".to_string(),
            result: Ok(tokio_modbus::Response::WriteSingleRegister(15, 4)),
        })
        .into();
        assert!(matches!(err, DescriptorError::Protocol { .. }));
    }

    #[test]
    fn test_exception_code_maps_to_exception() {
        let err: DescriptorError = ExceptionCode::IllegalDataAddress.into();
        match err {
            DescriptorError::Exception { code } => {
                assert_eq!(code, ExceptionCode::IllegalDataAddress)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_message_names_unit_and_object() {
        let err = DescriptorError::Timeout {
            unit_id: 5,
            object_id: 0x8A,
            timeout: Duration::from_millis(250),
        };
        let message = err.to_string();
        assert!(message.contains("unit 5"));
        assert!(message.contains("0x8A"));
    }
}
