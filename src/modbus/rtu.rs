// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus RTU framing for Read Device Identification
//!
//! RTU frames carry no length field: the receiver has to know, from the
//! function code and the bytes received so far, where a PDU ends. The framer
//! shipped with tokio-modbus has no rule for function 0x2B, so this module
//! frames the link itself and plugs into [`client::Context`] through the
//! tokio-modbus [`Client`] trait.
//!
//! ### Frame
//!
//! | Field | Size |
//! |-------|------|
//! | Unit id | 1 |
//! | PDU (function code and data) | 1..=253 |
//! | CRC-16, low byte first | 2 |
//!
//! Besides 0x2B, the link understands the register functions needed by the
//! UUID test firmware (0x03, 0x06 and 0x10) and exception responses.

use std::borrow::Cow;
use std::fmt::Debug;
use std::io;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_modbus::prelude::*;
use tokio_modbus::server::Service;
use tokio_modbus::{ExceptionResponse, FunctionCode};
use tokio_util::codec::{Decoder, Encoder, Framed};

use super::mei;

/// Largest RTU frame: unit id, PDU and CRC
pub const MAX_FRAME_LEN: usize = 1 + mei::MAX_PDU_LEN + CRC_LEN;

const CRC_LEN: usize = 2;
const EXCEPTION_FLAG: u8 = 0x80;

const READ_HOLDING_REGISTERS: u8 = 0x03;
const WRITE_SINGLE_REGISTER: u8 = 0x06;
const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// CRC-16/MODBUS of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, byte| {
        (0..8).fold(crc ^ u16::from(*byte), |crc, _| {
            if crc & 0x0001 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            }
        })
    })
}

/// One RTU frame without its CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    pub unit_id: u8,
    pub pdu: Bytes,
}

/// Which side of the link the codec decodes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Decodes responses
    Client,
    /// Decodes requests
    Server,
}

/// Splits a serial byte stream into [`RtuFrame`]s.
///
/// Bytes that cannot start a valid frame (unknown function code, CRC
/// mismatch) are dropped one at a time until the stream lines up again.
#[derive(Debug)]
pub struct RtuCodec {
    side: Side,
    dropped: usize,
}

impl RtuCodec {
    /// Codec of the requesting side: decodes responses.
    pub fn client() -> Self {
        Self {
            side: Side::Client,
            dropped: 0,
        }
    }

    /// Codec of the device side: decodes requests.
    pub fn server() -> Self {
        Self {
            side: Side::Server,
            dropped: 0,
        }
    }

    fn pdu_len(&self, pdu: &[u8]) -> Result<Option<usize>, String> {
        let Some((&function, data)) = pdu.split_first() else {
            return Ok(None);
        };
        let len = match (self.side, function) {
            (Side::Client, mei::FUNCTION_CODE) => mei::response_data_len(data).map(|len| 1 + len),
            (Side::Client, READ_HOLDING_REGISTERS) => {
                data.first().map(|&byte_count| 2 + usize::from(byte_count))
            }
            (Side::Client, WRITE_SINGLE_REGISTER | WRITE_MULTIPLE_REGISTERS) => Some(5),
            (Side::Client, function) if function & EXCEPTION_FLAG != 0 => Some(2),
            (Side::Server, mei::FUNCTION_CODE) => Some(1 + 3),
            (Side::Server, 0x01..=0x06) => Some(5),
            (Side::Server, 0x0F | WRITE_MULTIPLE_REGISTERS) => {
                data.get(4).map(|&byte_count| 6 + usize::from(byte_count))
            }
            (_, function) => return Err(format!("unsupported function code 0x{function:02X}")),
        };
        Ok(len)
    }

    fn drop_byte(&mut self, buf: &mut BytesMut, reason: &str) {
        debug!("Dropping byte 0x{:02X}: {}", buf[0], reason);
        let _ = buf.split_to(1);
        self.dropped += 1;
    }
}

impl Decoder for RtuCodec {
    type Item = RtuFrame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<RtuFrame>> {
        loop {
            if buf.len() < 2 {
                return Ok(None);
            }
            let pdu_len = match self.pdu_len(&buf[1..]) {
                Ok(Some(len)) if len <= mei::MAX_PDU_LEN => len,
                Ok(Some(len)) => {
                    self.drop_byte(buf, &format!("announced PDU of {len} bytes"));
                    continue;
                }
                Ok(None) if buf.len() < MAX_FRAME_LEN => return Ok(None),
                Ok(None) => {
                    self.drop_byte(buf, "no frame boundary found");
                    continue;
                }
                Err(reason) => {
                    self.drop_byte(buf, &reason);
                    continue;
                }
            };

            let frame_len = 1 + pdu_len + CRC_LEN;
            if buf.len() < frame_len {
                return Ok(None);
            }
            let crc = u16::from_le_bytes([buf[frame_len - 2], buf[frame_len - 1]]);
            if crc != crc16(&buf[..frame_len - CRC_LEN]) {
                self.drop_byte(buf, "CRC mismatch");
                continue;
            }

            if self.dropped > 0 {
                warn!("Decoded RTU frame after dropping {} byte(s)", self.dropped);
                self.dropped = 0;
            }
            let frame = buf.split_to(frame_len).freeze();
            return Ok(Some(RtuFrame {
                unit_id: frame[0],
                pdu: frame.slice(1..1 + pdu_len),
            }));
        }
    }
}

impl Encoder<RtuFrame> for RtuCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: RtuFrame, buf: &mut BytesMut) -> io::Result<()> {
        if frame.pdu.is_empty() || frame.pdu.len() > mei::MAX_PDU_LEN {
            return Err(invalid_data(format!(
                "PDU of {} bytes does not fit an RTU frame",
                frame.pdu.len()
            )));
        }
        let start = buf.len();
        buf.reserve(1 + frame.pdu.len() + CRC_LEN);
        buf.put_u8(frame.unit_id);
        buf.put_slice(&frame.pdu);
        let crc = crc16(&buf[start..]);
        buf.put_slice(&crc.to_le_bytes());
        Ok(())
    }
}

fn invalid_data(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}

fn encode_request_pdu(request: &Request<'_>) -> io::Result<Bytes> {
    let mut pdu = BytesMut::new();
    match request {
        Request::Custom(function, data) => {
            pdu.put_u8(*function);
            pdu.put_slice(data);
        }
        Request::ReadHoldingRegisters(address, quantity) => {
            pdu.put_u8(READ_HOLDING_REGISTERS);
            pdu.put_u16(*address);
            pdu.put_u16(*quantity);
        }
        Request::WriteSingleRegister(address, value) => {
            pdu.put_u8(WRITE_SINGLE_REGISTER);
            pdu.put_u16(*address);
            pdu.put_u16(*value);
        }
        Request::WriteMultipleRegisters(address, values) => {
            let byte_count = u8::try_from(values.len() * 2)
                .map_err(|_| invalid_data(format!("{} registers in one write", values.len())))?;
            pdu.put_u8(WRITE_MULTIPLE_REGISTERS);
            pdu.put_u16(*address);
            pdu.put_u16(u16::from(byte_count / 2));
            pdu.put_u8(byte_count);
            for value in values.iter() {
                pdu.put_u16(*value);
            }
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{other:?} is not supported on this RTU link"),
            ))
        }
    }
    Ok(pdu.freeze())
}

fn decode_response_pdu(pdu: Bytes) -> io::Result<Result<Response, ExceptionResponse>> {
    let function = *pdu.first().ok_or_else(|| invalid_data("empty response"))?;
    let data = pdu.slice(1..);

    if function & EXCEPTION_FLAG != 0 {
        let code = *data
            .first()
            .ok_or_else(|| invalid_data("exception response without a code"))?;
        return Ok(Err(ExceptionResponse {
            function: FunctionCode::new(function & !EXCEPTION_FLAG),
            exception: ExceptionCode::new(code),
        }));
    }

    let response = match (function, data.as_ref()) {
        (READ_HOLDING_REGISTERS, [byte_count, words @ ..])
            if usize::from(*byte_count) == words.len() && words.len() % 2 == 0 =>
        {
            Response::ReadHoldingRegisters(
                words
                    .chunks_exact(2)
                    .map(|word| u16::from_be_bytes([word[0], word[1]]))
                    .collect(),
            )
        }
        (WRITE_SINGLE_REGISTER, [a_hi, a_lo, v_hi, v_lo]) => Response::WriteSingleRegister(
            u16::from_be_bytes([*a_hi, *a_lo]),
            u16::from_be_bytes([*v_hi, *v_lo]),
        ),
        (WRITE_MULTIPLE_REGISTERS, [a_hi, a_lo, q_hi, q_lo]) => Response::WriteMultipleRegisters(
            u16::from_be_bytes([*a_hi, *a_lo]),
            u16::from_be_bytes([*q_hi, *q_lo]),
        ),
        (READ_HOLDING_REGISTERS | WRITE_SINGLE_REGISTER | WRITE_MULTIPLE_REGISTERS, _) => {
            return Err(invalid_data(format!(
                "malformed response to function 0x{function:02X}: {:02X?}",
                data.as_ref()
            )))
        }
        (function, _) => Response::Custom(function, data.clone()),
    };
    Ok(Ok(response))
}

/// Modbus RTU client over any byte stream.
///
/// `T` is a serial port in production and an in-memory pipe in tests.
#[derive(Debug)]
pub struct RtuClient<T> {
    framed: Option<Framed<T, RtuCodec>>,
    slave: Slave,
}

impl<T> RtuClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: T, slave: Slave) -> Self {
        Self {
            framed: Some(Framed::new(transport, RtuCodec::client())),
            slave,
        }
    }
}

impl<T> SlaveContext for RtuClient<T> {
    fn set_slave(&mut self, slave: Slave) {
        self.slave = slave;
    }
}

#[async_trait]
impl<T> Client for RtuClient<T>
where
    T: AsyncRead + AsyncWrite + Debug + Send + Unpin,
{
    async fn call(&mut self, request: Request<'_>) -> tokio_modbus::Result<Response> {
        let framed = self
            .framed
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "RTU link is closed"))?;
        let pdu = encode_request_pdu(&request)?;
        let function = pdu[0];
        let unit_id = self.slave.0;

        framed.send(RtuFrame { unit_id, pdu }).await?;
        let frame = framed.next().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "RTU link closed before the response")
        })??;

        let result = decode_response_pdu(frame.pdu)?;
        if frame.unit_id != unit_id {
            return Err(ProtocolError::HeaderMismatch {
                message: format!("expected unit {unit_id}, got {}", frame.unit_id),
                result,
            }
            .into());
        }
        let response_function = match &result {
            Ok(response) => response.function_code().value(),
            Err(exception) => exception.function.value(),
        };
        if response_function != function {
            return Err(ProtocolError::FunctionCodeMismatch {
                request: FunctionCode::new(function),
                result,
            }
            .into());
        }
        Ok(result.map_err(|exception| exception.exception))
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        match self.framed.take() {
            Some(mut framed) => SinkExt::<RtuFrame>::close(&mut framed).await,
            None => Ok(()),
        }
    }
}

fn decode_request_pdu(pdu: &[u8]) -> Result<Request<'static>, ExceptionCode> {
    let (&function, data) = pdu.split_first().ok_or(ExceptionCode::IllegalFunction)?;
    let word = |offset: usize| u16::from_be_bytes([data[offset], data[offset + 1]]);

    let request = match function {
        READ_HOLDING_REGISTERS if data.len() == 4 => Request::ReadHoldingRegisters(word(0), word(2)),
        WRITE_SINGLE_REGISTER if data.len() == 4 => Request::WriteSingleRegister(word(0), word(2)),
        WRITE_MULTIPLE_REGISTERS if data.len() >= 5 => {
            let quantity = usize::from(word(2));
            let values = &data[5..];
            if usize::from(data[4]) != values.len() || values.len() != quantity * 2 {
                return Err(ExceptionCode::IllegalDataValue);
            }
            Request::WriteMultipleRegisters(
                word(0),
                Cow::Owned(
                    values
                        .chunks_exact(2)
                        .map(|value| u16::from_be_bytes([value[0], value[1]]))
                        .collect(),
                ),
            )
        }
        READ_HOLDING_REGISTERS | WRITE_SINGLE_REGISTER | WRITE_MULTIPLE_REGISTERS => {
            return Err(ExceptionCode::IllegalDataValue)
        }
        function => Request::Custom(function, Cow::Owned(data.to_vec())),
    };
    Ok(request)
}

fn encode_response_pdu(response: &Response) -> Result<Bytes, ExceptionCode> {
    let mut pdu = BytesMut::new();
    match response {
        Response::Custom(function, data) => {
            pdu.put_u8(*function);
            pdu.put_slice(data);
        }
        Response::ReadHoldingRegisters(values) => {
            let byte_count =
                u8::try_from(values.len() * 2).map_err(|_| ExceptionCode::IllegalDataValue)?;
            pdu.put_u8(READ_HOLDING_REGISTERS);
            pdu.put_u8(byte_count);
            for value in values {
                pdu.put_u16(*value);
            }
        }
        Response::WriteSingleRegister(address, value) => {
            pdu.put_u8(WRITE_SINGLE_REGISTER);
            pdu.put_u16(*address);
            pdu.put_u16(*value);
        }
        Response::WriteMultipleRegisters(address, quantity) => {
            pdu.put_u8(WRITE_MULTIPLE_REGISTERS);
            pdu.put_u16(*address);
            pdu.put_u16(*quantity);
        }
        other => {
            warn!("Cannot frame response {other:?}");
            return Err(ExceptionCode::ServerDeviceFailure);
        }
    }
    Ok(pdu.freeze())
}

/// Answer requests addressed to `unit_id` on `transport` until it closes.
///
/// Frames for other units are ignored, as on a shared serial bus.
pub async fn serve<T, S>(transport: T, unit_id: u8, service: S) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: Service<Request = Request<'static>, Response = Response>,
{
    let mut framed = Framed::new(transport, RtuCodec::server());
    while let Some(frame) = framed.next().await {
        let frame = frame?;
        if frame.unit_id != unit_id {
            debug!("Ignoring frame for unit {}", frame.unit_id);
            continue;
        }
        let function = frame.pdu[0];

        let result = match decode_request_pdu(&frame.pdu) {
            Ok(request) => service.call(request).await.map_err(Into::into),
            Err(exception) => Err(exception),
        };
        let pdu = result.and_then(|response| encode_response_pdu(&response));
        let pdu = pdu.unwrap_or_else(|exception| {
            Bytes::from(vec![function | EXCEPTION_FLAG, u8::from(exception)])
        });

        framed.send(RtuFrame { unit_id, pdu }).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_crc(frame: &[u8]) -> Vec<u8> {
        let mut bytes = frame.to_vec();
        bytes.extend_from_slice(&crc16(frame).to_le_bytes());
        bytes
    }

    #[test]
    fn test_crc16_reference_value() {
        // Read holding registers 0x006B..0x006D of unit 0x11
        assert_eq!(
            with_crc(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]),
            vec![0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]
        );
    }

    #[test]
    fn test_decode_device_identification_response() {
        let bytes = with_crc(&[
            0x05, 0x2B, 0x0E, 0x03, 0x83, 0x00, 0x00, 0x01, 0x00, 0x01, b'A',
        ]);
        let mut buf = BytesMut::new();
        let mut codec = RtuCodec::client();

        // Incomplete frames wait for more bytes
        for byte in &bytes[..bytes.len() - 1] {
            buf.put_u8(*byte);
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
        }
        buf.put_u8(bytes[bytes.len() - 1]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.unit_id, 0x05);
        assert_eq!(
            frame.pdu.as_ref(),
            &[0x2B, 0x0E, 0x03, 0x83, 0x00, 0x00, 0x01, 0x00, 0x01, b'A']
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_exception_response() {
        let mut buf = BytesMut::from(&with_crc(&[0x05, 0xAB, 0x02])[..]);
        let frame = RtuCodec::client().decode(&mut buf).unwrap().unwrap();

        let result = decode_response_pdu(frame.pdu).unwrap();
        assert_eq!(
            result.map_err(|e| e.exception),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_decoder_resyncs_after_noise() {
        let mut bytes = vec![0x00, 0x99];
        bytes.extend(with_crc(&[0x42, 0x2B, 0x0E, 0x01, 0x00]));
        let mut buf = BytesMut::from(&bytes[..]);

        let frame = RtuCodec::server().decode(&mut buf).unwrap().unwrap();

        assert_eq!(frame.unit_id, 0x42);
        assert_eq!(frame.pdu.as_ref(), &[0x2B, 0x0E, 0x01, 0x00]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decoder_rejects_bad_crc() {
        let mut bytes = with_crc(&[0x05, 0x06, 0x00, 0x0F, 0x00, 0x04]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(RtuCodec::client().decode(&mut buf).unwrap(), None);
        assert!(buf.len() < bytes.len());
    }

    #[test]
    fn test_encoder_appends_crc() {
        let mut buf = BytesMut::new();
        RtuCodec::client()
            .encode(
                RtuFrame {
                    unit_id: 0x11,
                    pdu: Bytes::from_static(&[0x03, 0x00, 0x6B, 0x00, 0x03]),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(buf.as_ref(), &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]);
    }

    #[test]
    fn test_write_multiple_registers_request() {
        let pdu = encode_request_pdu(&Request::WriteMultipleRegisters(10, Cow::Owned(vec![7, 8])))
            .unwrap();
        assert_eq!(pdu.as_ref(), &[0x10, 0x00, 0x0A, 0x00, 0x02, 0x04, 0x00, 0x07, 0x00, 0x08]);
        assert_eq!(
            decode_request_pdu(&pdu),
            Ok(Request::WriteMultipleRegisters(10, Cow::Owned(vec![7, 8])))
        );
        assert_eq!(
            decode_request_pdu(&pdu[..pdu.len() - 1]),
            Err(ExceptionCode::IllegalDataValue)
        );
    }
}
