// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cursor driven descriptor reader
//!
//! The device decides how many objects fit in a page and where the next page
//! starts. The reader keeps asking from the returned cursor until the device
//! clears `more_follows`, merging every page into one [`DescriptorMap`].
//!
//! Round trips are strictly sequential. A failing round trip ends the session
//! with the error and the accumulator is dropped.

use std::time::Duration;

use log::{debug, info, warn};

use super::{DescriptorMap, DeviceInfoRequest, ObjectId, ReadDeviceIdCode, ReadResult};
use crate::error::DescriptorError;
use crate::transport::DeviceInfoTransport;

/// Default page cap. A device advancing its cursor by at least one object per
/// page cannot need more pages than there are object ids.
pub const DEFAULT_MAX_PAGES: usize = 256;

/// Options of one read session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorReader {
    unit_id: u8,
    read_code: ReadDeviceIdCode,
    timeout: Option<Duration>,
    max_pages: usize,
}

impl Default for DescriptorReader {
    fn default() -> Self {
        Self {
            unit_id: 1,
            read_code: ReadDeviceIdCode::Extended,
            timeout: None,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl DescriptorReader {
    /// Reader for `unit_id` using extended stream access, no timeout.
    pub fn new(unit_id: u8) -> Self {
        Self {
            unit_id,
            ..Self::default()
        }
    }

    pub fn with_read_code(mut self, read_code: ReadDeviceIdCode) -> Self {
        self.read_code = read_code;
        self
    }

    /// Bound every round trip; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of round trips in one session. Values below 1 are raised to 1.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn read_code(&self) -> ReadDeviceIdCode {
        self.read_code
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Read every descriptor object starting at `start_id`.
    ///
    /// # Errors
    ///
    /// - [`DescriptorError::Transport`] / [`DescriptorError::Protocol`] /
    ///   [`DescriptorError::Exception`] as raised by the transport
    /// - [`DescriptorError::Timeout`] when a round trip exceeds the bound
    /// - [`DescriptorError::PageLimit`] when the device keeps reporting more
    ///   objects after `max_pages` round trips
    pub async fn read_all<T>(
        &self,
        transport: &mut T,
        start_id: ObjectId,
    ) -> Result<DescriptorMap, DescriptorError>
    where
        T: DeviceInfoTransport + ?Sized,
    {
        let mut descriptors = DescriptorMap::new();
        let mut cursor = start_id;

        for page in 1..=self.max_pages {
            let request = DeviceInfoRequest {
                unit_id: self.unit_id,
                read_code: self.read_code,
                object_id: cursor,
            };
            let result = self.round_trip(transport, request).await?;
            debug!(
                "Page {} from unit {}: {} object(s), more_follows={}, next=0x{:02X}",
                page,
                self.unit_id,
                result.information.len(),
                result.more_follows,
                result.next_object_id
            );

            descriptors.merge(result.information);
            if !result.more_follows {
                info!(
                    "Read {} descriptor object(s) from unit {} in {} page(s)",
                    descriptors.len(),
                    self.unit_id,
                    page
                );
                return Ok(descriptors);
            }
            if result.next_object_id == cursor {
                warn!(
                    "Unit {} repeated cursor 0x{:02X} while reporting more objects",
                    self.unit_id, cursor
                );
            }
            cursor = result.next_object_id;
        }

        Err(DescriptorError::PageLimit {
            pages: self.max_pages,
            cursor,
        })
    }

    async fn round_trip<T>(
        &self,
        transport: &mut T,
        request: DeviceInfoRequest,
    ) -> Result<ReadResult, DescriptorError>
    where
        T: DeviceInfoTransport + ?Sized,
    {
        match self.timeout {
            None => transport.execute(request).await,
            Some(timeout) => tokio::time::timeout(timeout, transport.execute(request))
                .await
                .map_err(|_| DescriptorError::Timeout {
                    unit_id: request.unit_id,
                    object_id: request.object_id,
                    timeout,
                })?,
        }
    }
}

/// Read every descriptor with default options (unit 1, extended access).
pub async fn read_all<T>(transport: &mut T, start_id: ObjectId) -> Result<DescriptorMap, DescriptorError>
where
    T: DeviceInfoTransport + ?Sized,
{
    DescriptorReader::default().read_all(transport, start_id).await
}
