//! In-memory [`Transport`] for exercising the protocol engine without hardware.
//!
//! Replies are queued up front and handed out one per `receive()`. Every sent
//! datagram is recorded. Clones share state, so a test can keep a handle while the
//! facade owns the transport:
//!
//! ```
//! use z21_rs::mock::MockTransport;
//! use z21_rs::Z21;
//!
//! # async fn example() -> z21_rs::Result<()> {
//! let mock = MockTransport::new();
//! let z21 = Z21::new(mock.clone());
//! z21.set_track_power_on().await?;
//! assert_eq!(mock.sent_data()[0].as_ref(), &[0x07, 0x00, 0x40, 0x00, 0x21, 0x81, 0xA0]);
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Transport;

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<Bytes>,
    sent_log: Vec<Bytes>,
    closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a datagram for a later `receive()`.
    pub fn push_reply(&self, reply: &[u8]) {
        self.lock().replies.push_back(Bytes::copy_from_slice(reply));
    }

    /// Every datagram sent so far, oldest first.
    pub fn sent_data(&self) -> Vec<Bytes> {
        self.lock().sent_log.clone()
    }

    /// Drain the sent log.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut self.lock().sent_log)
    }

    pub fn remaining_replies(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the log from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MockTransport {
    async fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.sent_log.push(Bytes::copy_from_slice(datagram));
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize) -> Result<Bytes> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        match state.replies.pop_front() {
            Some(mut reply) => {
                reply.truncate(max_bytes);
                Ok(reply)
            }
            None => Err(Error::Timeout(Duration::ZERO)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.lock().closed
    }
}
