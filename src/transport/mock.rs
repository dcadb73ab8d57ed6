// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-descriptors project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scripted transport
//!
//! Replays a fixed sequence of replies and records every request it receives,
//! so that tests can check both the merged result and the cursor sent on each
//! round trip.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use log::debug;

use super::{DeviceInfoTransport, RegisterWriter};
use crate::descriptor::{DeviceInfoRequest, ReadResult};
use crate::error::DescriptorError;

/// One scripted reply.
#[derive(Debug)]
pub enum MockReply {
    /// Answer with this page
    Page(ReadResult),
    /// Fail the round trip with this error
    Fail(DescriptorError),
    /// Never answer
    Stall,
}

/// Transport replaying [`MockReply`]s in order.
///
/// Once the script is exhausted every further request fails with an
/// `UnexpectedEof` transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: VecDeque<MockReply>,
    requests: Vec<DeviceInfoRequest>,
    writes: Vec<(u8, u16, u16)>,
}

impl MockTransport {
    pub fn new<I: IntoIterator<Item = MockReply>>(replies: I) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Script made only of pages.
    pub fn with_pages<I: IntoIterator<Item = ReadResult>>(pages: I) -> Self {
        Self::new(pages.into_iter().map(MockReply::Page))
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> &[DeviceInfoRequest] {
        &self.requests
    }

    /// Register writes received so far as `(unit_id, address, value)`.
    pub fn writes(&self) -> &[(u8, u16, u16)] {
        &self.writes
    }

    /// Queue more replies, e.g. between two sessions.
    pub fn push(&mut self, reply: MockReply) {
        self.replies.push_back(reply);
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

#[async_trait]
impl DeviceInfoTransport for MockTransport {
    async fn execute(&mut self, request: DeviceInfoRequest) -> Result<ReadResult, DescriptorError> {
        debug!("Mock transport received {:?}", request);
        self.requests.push(request);
        match self.replies.pop_front() {
            Some(MockReply::Page(page)) => Ok(page),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Stall) => std::future::pending().await,
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "mock script exhausted").into()),
        }
    }
}

#[async_trait]
impl RegisterWriter for MockTransport {
    async fn write_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), DescriptorError> {
        debug!("Mock transport write {value} to register {address} of unit {unit_id}");
        self.writes.push((unit_id, address, value));
        Ok(())
    }
}
