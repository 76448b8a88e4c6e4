//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use z21_rs::error::Error;
#[allow(unused_imports)]
pub use z21_rs::mock::MockTransport;
#[allow(unused_imports)]
pub use z21_rs::protocol::{Command, FunctionAction, SpeedSteps, xor_checksum};
#[allow(unused_imports)]
pub use z21_rs::{DecoderModel, Register, Transport, Z21};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data.replace(' ', "")).expect("Failed to decode hex"))
}

const CV_INDEX_LOW: u16 = 32;

#[derive(Debug, Default)]
struct StationState {
    /// Decoder memory keyed by (CV32 page, CV id); unpaged CVs live on page 0.
    cvs: HashMap<(u8, u16), u8>,
    nack_cvs: HashSet<u16>,
    pending: VecDeque<Bytes>,
    sent: Vec<Bytes>,
    track_power: bool,
    closed: bool,
}

impl StationState {
    fn page(&self) -> u8 {
        self.cvs.get(&(0, CV_INDEX_LOW)).copied().unwrap_or(0)
    }

    fn key(&self, cv: u16) -> (u8, u16) {
        if cv >= 257 { (self.page(), cv) } else { (0, cv) }
    }

    fn reply(&mut self, mut datagram: Vec<u8>) {
        datagram.push(xor_checksum(&datagram[4..]));
        self.pending.push_back(Bytes::from(datagram));
    }

    fn cv_result(&mut self, cv: u16, value: u8) {
        let [msb, lsb] = (cv - 1).to_be_bytes();
        self.reply(vec![0x0A, 0x00, 0x40, 0x00, 0x64, 0x14, msb, lsb, value]);
    }

    fn cv_nack(&mut self) {
        self.reply(vec![0x07, 0x00, 0x40, 0x00, 0x61, 0x13]);
    }

    fn handle(&mut self, request: &[u8]) {
        match request {
            [_, _, 0x40, 0x00, 0x23, 0x11, msb, lsb, _] => {
                let cv = u16::from_be_bytes([*msb, *lsb]) + 1;
                if self.nack_cvs.contains(&cv) {
                    self.cv_nack();
                } else {
                    let value = self.cvs.get(&self.key(cv)).copied().unwrap_or(0);
                    self.cv_result(cv, value);
                }
            }
            [_, _, 0x40, 0x00, 0x24, 0x12, msb, lsb, value, _] => {
                let cv = u16::from_be_bytes([*msb, *lsb]) + 1;
                if self.nack_cvs.contains(&cv) {
                    self.cv_nack();
                } else {
                    let key = self.key(cv);
                    self.cvs.insert(key, *value);
                    self.cv_result(cv, *value);
                }
            }
            [_, _, 0x40, 0x00, 0x21, 0x81, _] => self.track_power = true,
            [_, _, 0x40, 0x00, 0x21, 0x80, _] => self.track_power = false,
            [0x04, 0x00, 0x10, 0x00] => {
                self.pending
                    .push_back(Bytes::from_static(&[0x08, 0x00, 0x10, 0x00, 0x39, 0x30, 0x00, 0x00]));
            }
            _ => {}
        }
    }
}

/// A command station with a decoder on its programming track.
///
/// Answers CV reads and writes the way a Z21 does, including the CV31/CV32 index
/// register, and records every datagram it receives. Clones share state.
#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct SimulatedStation {
    state: Arc<Mutex<StationState>>,
}

#[allow(dead_code)]
impl SimulatedStation {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StationState> {
        self.state.lock().unwrap()
    }

    /// Current value of CV32.
    pub fn index_register(&self) -> u8 {
        self.lock().page()
    }

    pub fn cv(&self, page: u8, cv: u16) -> Option<u8> {
        self.lock().cvs.get(&(page, cv)).copied()
    }

    pub fn set_cv(&self, page: u8, cv: u16, value: u8) {
        self.lock().cvs.insert((page, cv), value);
    }

    /// Answer every access to `cv` with LAN_X_CV_NACK.
    pub fn nack(&self, cv: u16) {
        self.lock().nack_cvs.insert(cv);
    }

    pub fn track_power(&self) -> bool {
        self.lock().track_power
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.lock().sent.clone()
    }

    /// CV ids written, in order.
    pub fn cv_writes(&self) -> Vec<(u16, u8)> {
        self.lock()
            .sent
            .iter()
            .filter(|d| d.len() == 10 && d[4] == 0x24 && d[5] == 0x12)
            .map(|d| (u16::from_be_bytes([d[6], d[7]]) + 1, d[8]))
            .collect()
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().pending.len()
    }
}

impl Transport for SimulatedStation {
    async fn send(&mut self, datagram: &[u8]) -> z21_rs::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.sent.push(Bytes::copy_from_slice(datagram));
        state.handle(datagram);
        Ok(())
    }

    async fn receive(&mut self, _max_bytes: usize) -> z21_rs::Result<Bytes> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Closed);
        }
        state.pending.pop_front().ok_or(Error::Timeout(Duration::ZERO))
    }

    async fn close(&mut self) -> z21_rs::Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.lock().closed
    }
}
