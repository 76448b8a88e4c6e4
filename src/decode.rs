//! Reply decoding.
//!
//! Each decoder reads only the byte ranges its reply format guarantees and rejects
//! frames that are too short with [`Error::InsufficientData`]. [`Reply::parse`]
//! classifies an arbitrary datagram received from the command station.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use modular_bitfield::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{I16, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};
use crate::protocol::{
    BroadcastFlags, DIRECTION_FORWARD, E_STOP_SPEED, HEADER_LEN, LAN_BROADCASTFLAGS, LAN_CODE, LAN_HWINFO,
    LAN_LOCOMODE, LAN_SERIAL_NUMBER, LAN_SYSTEMSTATE_DATACHANGED, LAN_TURNOUTMODE, LAN_X, LocoAddress, SpeedSteps,
};

/// Offset of the value byte in LAN_X_CV_RESULT.
pub const CV_VALUE_OFFSET: usize = 8;
pub const HWINFO_LEN: usize = 12;
pub const SYSTEM_STATE_LEN: usize = 16;

// X-BUS headers and DB0 codes of the replies we classify.
const X_BC: u8 = 0x61;
const X_BC_TRACK_POWER_OFF: u8 = 0x00;
const X_BC_TRACK_POWER_ON: u8 = 0x01;
const X_BC_PROGRAMMING_MODE: u8 = 0x02;
const X_BC_TRACK_SHORT_CIRCUIT: u8 = 0x08;
const X_CV_NACK_SC: u8 = 0x12;
const X_CV_NACK: u8 = 0x13;
const X_UNKNOWN_COMMAND: u8 = 0x82;
const X_STATUS: u8 = 0x62;
const X_STATUS_CHANGED: u8 = 0x22;
const X_VERSION: u8 = 0x63;
const X_VERSION_DB0: u8 = 0x21;
const X_CV_RESULT: u8 = 0x64;
const X_CV_RESULT_DB0: u8 = 0x14;
const X_BC_STOPPED: u8 = 0x81;
const X_FIRMWARE_VERSION: u8 = 0xF3;
const X_FIRMWARE_VERSION_DB0: u8 = 0x0A;
const X_LOCO_INFO: u8 = 0xEF;
const X_TURNOUT_INFO: u8 = 0x43;

fn ensure_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::InsufficientData {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Skip the 4-byte header and read the rest (up to 8 bytes) as a little-endian integer.
pub fn int_le(reply: &[u8]) -> Result<u64> {
    ensure_len(reply, HEADER_LEN + 1)?;
    let payload = &reply[HEADER_LEN..];
    let width = payload.len().min(8);
    Ok(LittleEndian::read_uint(payload, width))
}

/// Value byte of a LAN_X_CV_RESULT reply.
pub fn cv_value(reply: &[u8]) -> Result<u8> {
    ensure_len(reply, CV_VALUE_OFFSET + 1)?;
    Ok(reply[CV_VALUE_OFFSET])
}

/// Packed BCD byte to its decimal value.
fn bcd(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

// --- Hardware info ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareInfo {
    pub hardware_type: u32,
    pub firmware_version: u32,
}

impl HardwareInfo {
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        ensure_len(reply, HWINFO_LEN)?;
        Ok(Self {
            hardware_type: BigEndian::read_u32(&reply[4..8]),
            firmware_version: BigEndian::read_u32(&reply[8..12]),
        })
    }
}

// --- System state ---

#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralState {
    pub emergency_stop: bool,
    pub track_voltage_off: bool,
    pub short_circuit: bool,
    #[skip]
    unused: B2,
    pub programming_mode: bool,
    #[skip]
    reserved: B2,
}

#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralStateEx {
    pub high_temperature: bool,
    pub power_lost: bool,
    pub short_circuit_external: bool,
    pub short_circuit_internal: bool,
    #[skip]
    unused: bool,
    pub rcn213: bool,
    #[skip]
    reserved: B2,
}

/// Capability flags, vendor revision with RailCom on bit 3.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub dcc: bool,
    pub mm: bool,
    #[skip]
    reserved: bool,
    pub railcom: bool,
    pub loco_cmds: bool,
    pub accessory_cmds: bool,
    pub detector_cmds: bool,
    pub needs_unlock_code: bool,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SystemStateRaw {
    pub main_current_ma: I16,
    pub prog_current_ma: I16,
    pub filtered_main_current_ma: I16,
    pub temperature_c: I16,
    pub supply_voltage_mv: U16,
    pub vcc_voltage_mv: U16,
    pub central_state: u8,
    pub central_state_ex: u8,
    pub reserved: u8,
    pub capabilities: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemState {
    pub main_current_ma: i16,
    pub prog_current_ma: i16,
    pub filtered_main_current_ma: i16,
    pub temperature_c: i16,
    pub supply_voltage_mv: u16,
    pub vcc_voltage_mv: u16,
    pub central_state: CentralState,
    pub central_state_ex: CentralStateEx,
    /// `None` when the command station reports 0 (older firmware).
    pub capabilities: Option<Capabilities>,
}

impl From<&SystemStateRaw> for SystemState {
    fn from(raw: &SystemStateRaw) -> Self {
        let capabilities = match raw.capabilities {
            0 => None,
            bits => Some(Capabilities::from_bytes([bits])),
        };
        SystemState {
            main_current_ma: raw.main_current_ma.get(),
            prog_current_ma: raw.prog_current_ma.get(),
            filtered_main_current_ma: raw.filtered_main_current_ma.get(),
            temperature_c: raw.temperature_c.get(),
            supply_voltage_mv: raw.supply_voltage_mv.get(),
            vcc_voltage_mv: raw.vcc_voltage_mv.get(),
            central_state: CentralState::from_bytes([raw.central_state]),
            central_state_ex: CentralStateEx::from_bytes([raw.central_state_ex]),
            capabilities,
        }
    }
}

impl SystemState {
    /// Decode the 16-byte data block that follows the header.
    pub fn from_data(data: &[u8]) -> Result<Self> {
        ensure_len(data, SYSTEM_STATE_LEN)?;
        let raw = SystemStateRaw::ref_from_bytes(&data[..SYSTEM_STATE_LEN]).map_err(|_| Error::InsufficientData {
            expected: SYSTEM_STATE_LEN,
            actual: data.len(),
        })?;
        Ok(Self::from(raw))
    }

    /// Decode a complete LAN_SYSTEMSTATE_DATACHANGED datagram.
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        ensure_len(reply, HEADER_LEN + SYSTEM_STATE_LEN)?;
        Self::from_data(&reply[HEADER_LEN..])
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "main {} mA (filtered {} mA), prog {} mA, {} C, supply {} mV, VCC {} mV",
            self.main_current_ma,
            self.filtered_main_current_ma,
            self.prog_current_ma,
            self.temperature_c,
            self.supply_voltage_mv,
            self.vcc_voltage_mv
        )?;
        let cs = self.central_state;
        if cs.emergency_stop() {
            write!(f, ", emergency stop")?;
        }
        if cs.track_voltage_off() {
            write!(f, ", track voltage off")?;
        }
        if cs.short_circuit() {
            write!(f, ", short circuit")?;
        }
        if cs.programming_mode() {
            write!(f, ", programming mode")?;
        }
        Ok(())
    }
}

// --- X-BUS replies ---

/// LAN_X_GET_VERSION reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XBusVersion {
    /// BCD, e.g. 0x30 for 3.0.
    pub xbus_version: u8,
    /// 0x12 for a Z21 family device.
    pub command_station_id: u8,
}

impl XBusVersion {
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        ensure_len(reply, 8)?;
        Ok(Self {
            xbus_version: reply[6],
            command_station_id: reply[7],
        })
    }
}

impl fmt::Display for XBusVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X-BUS V{}.{} (station 0x{:02X})",
            self.xbus_version >> 4,
            self.xbus_version & 0x0F,
            self.command_station_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        ensure_len(reply, 8)?;
        Ok(Self {
            major: bcd(reply[6]),
            minor: bcd(reply[7]),
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// LAN_X_LOCO_INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocoInfo {
    pub address: LocoAddress,
    /// Another client controls this loco.
    pub busy: bool,
    pub speed_steps: Option<SpeedSteps>,
    pub forward: bool,
    /// Raw `VVVVVVV` value, including the e-stop sentinel.
    pub speed_raw: u8,
    /// Bit n is function Fn.
    pub functions: u32,
}

impl LocoInfo {
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        // X-header, address, DB2..DB7 and the checksum
        ensure_len(reply, 14)?;
        let db2 = reply[7];
        let db3 = reply[8];
        let db4 = reply[9];
        let speed_steps = match db2 & 0x07 {
            0 => Some(SpeedSteps::Steps14),
            2 => Some(SpeedSteps::Steps28),
            4 => Some(SpeedSteps::Steps128),
            _ => None,
        };
        // DB4 = 0DSLFGHJ: L is F0, FGHJ is F4..F1
        let mut functions = u32::from((db4 >> 4) & 0x01) | (u32::from(db4 & 0x0F) << 1);
        functions |= u32::from(reply[10]) << 5;
        functions |= u32::from(reply[11]) << 13;
        functions |= u32::from(reply[12]) << 21;
        // DB8 (F29..F31) only on newer firmware
        if reply.len() >= 15 {
            functions |= u32::from(reply[13] & 0x07) << 29;
        }
        Ok(Self {
            address: LocoAddress::from_wire([reply[5], reply[6]]),
            busy: db2 & 0x08 != 0,
            speed_steps,
            forward: db3 & DIRECTION_FORWARD != 0,
            speed_raw: db3 & !DIRECTION_FORWARD,
            functions,
        })
    }

    /// Logical speed step with the e-stop shift removed.
    pub fn speed(&self) -> u8 {
        if self.speed_raw > E_STOP_SPEED {
            self.speed_raw - 1
        } else {
            0
        }
    }

    pub fn is_e_stopped(&self) -> bool {
        self.speed_raw == E_STOP_SPEED
    }

    pub fn function(&self, index: u8) -> bool {
        index < 32 && self.functions & (1 << index) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TurnoutState {
    #[strum(to_string = "not switched")]
    NotSwitched = 0,
    #[strum(to_string = "output 1")]
    Output1 = 1,
    #[strum(to_string = "output 2")]
    Output2 = 2,
    #[strum(to_string = "invalid")]
    Invalid = 3,
}

/// LAN_X_TURNOUT_INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnoutInfo {
    pub address: u16,
    pub state: TurnoutState,
}

impl TurnoutInfo {
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        ensure_len(reply, 8)?;
        let state = TurnoutState::try_from(reply[7] & 0x03).unwrap_or(TurnoutState::Invalid);
        Ok(Self {
            address: BigEndian::read_u16(&reply[5..7]),
            state,
        })
    }
}

/// Lock state reported by LAN_GET_CODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LockState {
    #[strum(to_string = "unlocked")]
    NoLock = 0x00,
    #[strum(to_string = "locked (start)")]
    StartLocked = 0x01,
    #[strum(to_string = "unlocked (start)")]
    StartUnlocked = 0x02,
}

impl LockState {
    /// `None` for a code this crate does not know.
    pub fn from_reply(reply: &[u8]) -> Result<Option<Self>> {
        ensure_len(reply, HEADER_LEN + 1)?;
        Ok(LockState::try_from(reply[HEADER_LEN]).ok())
    }
}

// --- Classification ---

/// Any datagram the command station sends, classified by header and X-header.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    CvResult { cv: u16, value: u8 },
    CvNack,
    CvNackShortCircuit,
    UnknownCommand,
    TrackPowerOff,
    TrackPowerOn,
    ProgrammingMode,
    TrackShortCircuit,
    Stopped,
    Status(CentralState),
    Version(XBusVersion),
    FirmwareVersion(FirmwareVersion),
    LocoInfo(LocoInfo),
    TurnoutInfo(TurnoutInfo),
    SerialNumber(u32),
    HardwareInfo(HardwareInfo),
    Code(Option<LockState>),
    SystemState(SystemState),
    LocoMode { address: u16, mode: u8 },
    TurnoutMode { address: u16, mode: u8 },
    BroadcastFlags(BroadcastFlags),
    Other(Bytes),
}

impl Reply {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, HEADER_LEN)?;
        let header = LittleEndian::read_u16(&bytes[2..4]);
        let reply = match header {
            LAN_X => return Self::parse_x(bytes),
            LAN_SERIAL_NUMBER => {
                ensure_len(bytes, HEADER_LEN + 4)?;
                Reply::SerialNumber(LittleEndian::read_u32(&bytes[4..8]))
            }
            LAN_HWINFO => Reply::HardwareInfo(HardwareInfo::from_reply(bytes)?),
            LAN_CODE => Reply::Code(LockState::from_reply(bytes)?),
            LAN_SYSTEMSTATE_DATACHANGED => Reply::SystemState(SystemState::from_reply(bytes)?),
            LAN_LOCOMODE | LAN_TURNOUTMODE => {
                ensure_len(bytes, 7)?;
                let address = BigEndian::read_u16(&bytes[4..6]);
                let mode = bytes[6];
                if header == LAN_LOCOMODE {
                    Reply::LocoMode { address, mode }
                } else {
                    Reply::TurnoutMode { address, mode }
                }
            }
            LAN_BROADCASTFLAGS => {
                ensure_len(bytes, HEADER_LEN + 4)?;
                Reply::BroadcastFlags(BroadcastFlags(LittleEndian::read_u32(&bytes[4..8])))
            }
            _ => Reply::Other(Bytes::copy_from_slice(bytes)),
        };
        Ok(reply)
    }

    fn parse_x(bytes: &[u8]) -> Result<Self> {
        ensure_len(bytes, HEADER_LEN + 1)?;
        let x_header = bytes[4];
        let db0 = bytes.get(5).copied();
        let reply = match (x_header, db0) {
            (X_CV_RESULT, Some(X_CV_RESULT_DB0)) => {
                ensure_len(bytes, CV_VALUE_OFFSET + 1)?;
                Reply::CvResult {
                    cv: BigEndian::read_u16(&bytes[6..8]) + 1,
                    value: bytes[CV_VALUE_OFFSET],
                }
            }
            (X_BC, Some(X_BC_TRACK_POWER_OFF)) => Reply::TrackPowerOff,
            (X_BC, Some(X_BC_TRACK_POWER_ON)) => Reply::TrackPowerOn,
            (X_BC, Some(X_BC_PROGRAMMING_MODE)) => Reply::ProgrammingMode,
            (X_BC, Some(X_BC_TRACK_SHORT_CIRCUIT)) => Reply::TrackShortCircuit,
            (X_BC, Some(X_CV_NACK_SC)) => Reply::CvNackShortCircuit,
            (X_BC, Some(X_CV_NACK)) => Reply::CvNack,
            (X_BC, Some(X_UNKNOWN_COMMAND)) => Reply::UnknownCommand,
            (X_BC_STOPPED, Some(0x00)) => Reply::Stopped,
            (X_STATUS, Some(X_STATUS_CHANGED)) => {
                ensure_len(bytes, 7)?;
                Reply::Status(CentralState::from_bytes([bytes[6]]))
            }
            (X_VERSION, Some(X_VERSION_DB0)) => Reply::Version(XBusVersion::from_reply(bytes)?),
            (X_FIRMWARE_VERSION, Some(X_FIRMWARE_VERSION_DB0)) => {
                Reply::FirmwareVersion(FirmwareVersion::from_reply(bytes)?)
            }
            (X_LOCO_INFO, _) => Reply::LocoInfo(LocoInfo::from_reply(bytes)?),
            (X_TURNOUT_INFO, _) => Reply::TurnoutInfo(TurnoutInfo::from_reply(bytes)?),
            _ => Reply::Other(Bytes::copy_from_slice(bytes)),
        };
        Ok(reply)
    }

    /// The negative outcome this reply reports for an access to `cv`, if any.
    pub fn cv_error(&self, cv: u16) -> Option<Error> {
        match self {
            Reply::CvNack => Some(Error::CvNack { cv }),
            Reply::CvNackShortCircuit => Some(Error::CvNackShortCircuit { cv }),
            Reply::UnknownCommand => Some(Error::UnknownCommand),
            _ => None,
        }
    }
}
