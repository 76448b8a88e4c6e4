//! # Z21 LAN Protocol: Command Catalog and Encoder
//!
//! Every request is a single UDP datagram with the same framing:
//!
//! ```text
//! DataLen (u16 LE) | Header (u16 LE) | Data ... | [XOR]
//! ```
//!
//! Commands tunnelled through the X-BUS header (`0x40`) end with an XOR byte over
//! everything after the 4-byte header. A few plain LAN commands carry no checksum.
//!
//! ### Core Types
//!
//! - **`Template`**: the immutable byte skeleton of one request, with a count of
//!   late-bound field bytes and an optional checksum placeholder.
//! - **`Command`**: the catalog. One variant per supported operation, each mapped to
//!   its `Template` by [`Command::template`].
//! - **`LocoAddress`**: 14-bit DCC address with the extended-address transform applied
//!   at encode time.

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;
use strum_macros::Display;

use crate::error::{Error, Result};

// --- Constants ---

/// UDP port documented by the vendor for the LAN interface.
pub const DEFAULT_PORT: u16 = 21105;

/// DataLen + Header.
pub const HEADER_LEN: usize = 4;

/// Default receive size when the reply length is not fixed.
pub const MAX_READ: usize = 1024;

pub const MAX_LOCO_ADDRESS: u16 = 9999;
pub const EXTENDED_ADDRESS_THRESHOLD: u16 = 128;
pub const EXTENDED_ADDRESS_FLAG: u8 = 0xC0;
pub const ADDRESS_MSB_MASK: u8 = 0x3F;

pub const MAX_FUNCTION_INDEX: u8 = 31;

pub const MAX_SPEED: u8 = 126;
/// Speed value 1 on the wire means emergency stop.
pub const E_STOP_SPEED: u8 = 1;
pub const DIRECTION_FORWARD: u8 = 0x80;

/// `10Q0A00P` with A=1, Q=0 (execute immediately), P=1.
pub const TURNOUT_ACTIVATE_OUTPUT_2: u8 = 0x89;
/// `10Q0A00P` with A=1, Q=0 (execute immediately), P=0.
pub const TURNOUT_ACTIVATE_OUTPUT_1: u8 = 0x88;

// Header ids of the replies this crate decodes.
pub const LAN_SERIAL_NUMBER: u16 = 0x10;
pub const LAN_HWINFO: u16 = 0x1A;
pub const LAN_CODE: u16 = 0x18;
pub const LAN_X: u16 = 0x40;
pub const LAN_BROADCASTFLAGS: u16 = 0x51;
pub const LAN_LOCOMODE: u16 = 0x60;
pub const LAN_TURNOUTMODE: u16 = 0x70;
pub const LAN_SYSTEMSTATE_DATACHANGED: u16 = 0x84;

// --- Encoder primitives ---

/// XOR parity over a byte slice.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// The byte skeleton of one request datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    name: &'static str,
    prefix: &'static [u8],
    fields: usize,
    checksum: bool,
}

impl Template {
    const fn new(name: &'static str, prefix: &'static [u8], fields: usize, checksum: bool) -> Self {
        Self {
            name,
            prefix,
            fields,
            checksum,
        }
    }

    /// Vendor name of the command, e.g. `LAN_X_CV_READ`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prefix(&self) -> &'static [u8] {
        self.prefix
    }

    /// Number of late-bound bytes appended before the checksum.
    pub fn field_len(&self) -> usize {
        self.fields
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum
    }

    /// Length announced in the DataLen field of the skeleton.
    pub fn declared_len(&self) -> usize {
        u16::from_le_bytes([self.prefix[0], self.prefix[1]]) as usize
    }

    /// Length of the datagram [`build_command`] produces.
    pub fn encoded_len(&self) -> usize {
        self.prefix.len() + self.fields + usize::from(self.checksum)
    }
}

/// Instantiate a template: skeleton, then the fields, then the XOR of everything
/// after the 4-byte header when the template carries a checksum placeholder.
///
/// Field values are range-checked by the callers; this function never fails.
pub fn build_command(template: &Template, fields: &[u8]) -> Bytes {
    debug_assert_eq!(
        fields.len(),
        template.fields,
        "{} takes {} field bytes",
        template.name,
        template.fields
    );
    let mut frame = BytesMut::with_capacity(template.encoded_len());
    frame.extend_from_slice(template.prefix);
    frame.extend_from_slice(fields);
    if template.checksum {
        let xor = xor_checksum(&frame[HEADER_LEN..]);
        frame.put_u8(xor);
    }
    frame.freeze()
}

// --- Command catalog ---

const GET_SERIAL_NUMBER: Template = Template::new("LAN_GET_SERIAL_NUMBER", &[0x04, 0x00, 0x10, 0x00], 0, false);
const LOGOFF: Template = Template::new("LAN_LOGOFF", &[0x04, 0x00, 0x30, 0x00], 0, false);
const GET_VERSION: Template = Template::new("LAN_X_GET_VERSION", &[0x07, 0x00, 0x40, 0x00, 0x21, 0x21], 0, true);
const GET_STATUS: Template = Template::new("LAN_X_GET_STATUS", &[0x07, 0x00, 0x40, 0x00, 0x21, 0x24], 0, true);
const SET_TRACK_POWER_OFF: Template =
    Template::new("LAN_X_SET_TRACK_POWER_OFF", &[0x07, 0x00, 0x40, 0x00, 0x21, 0x80], 0, true);
const SET_TRACK_POWER_ON: Template =
    Template::new("LAN_X_SET_TRACK_POWER_ON", &[0x07, 0x00, 0x40, 0x00, 0x21, 0x81], 0, true);
const SET_STOP: Template = Template::new("LAN_X_SET_STOP", &[0x06, 0x00, 0x40, 0x00, 0x80], 0, true);
const GET_FIRMWARE_VERSION: Template =
    Template::new("LAN_X_GET_FIRMWARE_VERSION", &[0x07, 0x00, 0x40, 0x00, 0xF1, 0x0A], 0, true);
const SET_BROADCASTFLAGS: Template = Template::new("LAN_SET_BROADCASTFLAGS", &[0x08, 0x00, 0x50, 0x00], 4, false);
const GET_BROADCASTFLAGS: Template = Template::new("LAN_GET_BROADCASTFLAGS", &[0x04, 0x00, 0x51, 0x00], 0, false);
const SYSTEMSTATE_GETDATA: Template = Template::new("LAN_SYSTEMSTATE_GETDATA", &[0x04, 0x00, 0x85, 0x00], 0, false);
const GET_HWINFO: Template = Template::new("LAN_GET_HWINFO", &[0x04, 0x00, 0x1A, 0x00], 0, false);
const GET_CODE: Template = Template::new("LAN_GET_CODE", &[0x04, 0x00, 0x18, 0x00], 0, false);
const GET_LOCOMODE: Template = Template::new("LAN_GET_LOCOMODE", &[0x06, 0x00, 0x60, 0x00], 2, false);
const SET_LOCOMODE: Template = Template::new("LAN_SET_LOCOMODE", &[0x07, 0x00, 0x61, 0x00], 3, false);
const GET_TURNOUTMODE: Template = Template::new("LAN_GET_TURNOUTMODE", &[0x06, 0x00, 0x70, 0x00], 2, false);
const SET_TURNOUTMODE: Template = Template::new("LAN_SET_TURNOUTMODE", &[0x07, 0x00, 0x71, 0x00], 3, false);
const GET_LOCO_INFO: Template = Template::new("LAN_X_GET_LOCO_INFO", &[0x09, 0x00, 0x40, 0x00, 0xE3, 0xF0], 2, true);
const SET_LOCO_DRIVE: Template = Template::new("LAN_X_SET_LOCO_DRIVE", &[0x0A, 0x00, 0x40, 0x00, 0xE4], 4, true);
const SET_LOCO_FUNCTION: Template =
    Template::new("LAN_X_SET_LOCO_FUNCTION", &[0x0A, 0x00, 0x40, 0x00, 0xE4, 0xF8], 3, true);
const GET_TURNOUT_INFO: Template = Template::new("LAN_X_GET_TURNOUT_INFO", &[0x08, 0x00, 0x40, 0x00, 0x43], 2, true);
const SET_TURNOUT: Template = Template::new("LAN_X_SET_TURNOUT", &[0x09, 0x00, 0x40, 0x00, 0x53], 3, true);
const CV_READ: Template = Template::new("LAN_X_CV_READ", &[0x09, 0x00, 0x40, 0x00, 0x23, 0x11], 2, true);
const CV_WRITE: Template = Template::new("LAN_X_CV_WRITE", &[0x0A, 0x00, 0x40, 0x00, 0x24, 0x12], 3, true);

/// One entry per supported request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Command {
    GetSerialNumber,
    Logoff,
    GetVersion,
    GetStatus,
    SetTrackPowerOff,
    SetTrackPowerOn,
    SetStop,
    GetFirmwareVersion,
    SetBroadcastFlags,
    GetBroadcastFlags,
    GetSystemState,
    GetHardwareInfo,
    GetCode,
    GetLocoMode,
    SetLocoMode,
    GetTurnoutMode,
    SetTurnoutMode,
    GetLocoInfo,
    SetLocoDrive,
    SetLocoFunction,
    GetTurnoutInfo,
    SetTurnout,
    CvRead,
    CvWrite,
}

impl Command {
    pub const ALL: [Command; 24] = [
        Command::GetSerialNumber,
        Command::Logoff,
        Command::GetVersion,
        Command::GetStatus,
        Command::SetTrackPowerOff,
        Command::SetTrackPowerOn,
        Command::SetStop,
        Command::GetFirmwareVersion,
        Command::SetBroadcastFlags,
        Command::GetBroadcastFlags,
        Command::GetSystemState,
        Command::GetHardwareInfo,
        Command::GetCode,
        Command::GetLocoMode,
        Command::SetLocoMode,
        Command::GetTurnoutMode,
        Command::SetTurnoutMode,
        Command::GetLocoInfo,
        Command::SetLocoDrive,
        Command::SetLocoFunction,
        Command::GetTurnoutInfo,
        Command::SetTurnout,
        Command::CvRead,
        Command::CvWrite,
    ];

    pub const fn template(self) -> &'static Template {
        match self {
            Command::GetSerialNumber => &GET_SERIAL_NUMBER,
            Command::Logoff => &LOGOFF,
            Command::GetVersion => &GET_VERSION,
            Command::GetStatus => &GET_STATUS,
            Command::SetTrackPowerOff => &SET_TRACK_POWER_OFF,
            Command::SetTrackPowerOn => &SET_TRACK_POWER_ON,
            Command::SetStop => &SET_STOP,
            Command::GetFirmwareVersion => &GET_FIRMWARE_VERSION,
            Command::SetBroadcastFlags => &SET_BROADCASTFLAGS,
            Command::GetBroadcastFlags => &GET_BROADCASTFLAGS,
            Command::GetSystemState => &SYSTEMSTATE_GETDATA,
            Command::GetHardwareInfo => &GET_HWINFO,
            Command::GetCode => &GET_CODE,
            Command::GetLocoMode => &GET_LOCOMODE,
            Command::SetLocoMode => &SET_LOCOMODE,
            Command::GetTurnoutMode => &GET_TURNOUTMODE,
            Command::SetTurnoutMode => &SET_TURNOUTMODE,
            Command::GetLocoInfo => &GET_LOCO_INFO,
            Command::SetLocoDrive => &SET_LOCO_DRIVE,
            Command::SetLocoFunction => &SET_LOCO_FUNCTION,
            Command::GetTurnoutInfo => &GET_TURNOUT_INFO,
            Command::SetTurnout => &SET_TURNOUT,
            Command::CvRead => &CV_READ,
            Command::CvWrite => &CV_WRITE,
        }
    }

    /// Shorthand for [`build_command`] on this command's template.
    pub fn build(self, fields: &[u8]) -> Bytes {
        build_command(self.template(), fields)
    }
}

// --- Field types ---

/// A DCC locomotive address, 1..=9999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocoAddress(u16);

impl LocoAddress {
    pub fn new(address: u16) -> Result<Self> {
        if !(1..=MAX_LOCO_ADDRESS).contains(&address) {
            return Err(Error::InvalidArgument(format!(
                "loco address {address} outside 1..={MAX_LOCO_ADDRESS}"
            )));
        }
        Ok(Self(address))
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    /// `Adr_MSB, Adr_LSB` with the two high bits of the MSB set for long addresses.
    pub fn to_wire(self) -> [u8; 2] {
        let [msb, lsb] = self.0.to_be_bytes();
        if self.0 >= EXTENDED_ADDRESS_THRESHOLD {
            [msb | EXTENDED_ADDRESS_FLAG, lsb]
        } else {
            [msb, lsb]
        }
    }

    /// Inverse of [`LocoAddress::to_wire`]: `(Adr_MSB & 0x3F) << 8 + Adr_LSB`.
    pub fn from_wire(bytes: [u8; 2]) -> Self {
        Self(u16::from(bytes[0] & ADDRESS_MSB_MASK) << 8 | u16::from(bytes[1]))
    }
}

impl TryFrom<u16> for LocoAddress {
    type Error = Error;

    fn try_from(address: u16) -> Result<Self> {
        Self::new(address)
    }
}

impl fmt::Display for LocoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Switch type `TT` of the `TTNNNNNN` function byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionAction {
    #[strum(to_string = "off")]
    Off = 0x00,
    #[strum(to_string = "on")]
    On = 0x40,
    #[strum(to_string = "toggle")]
    Toggle = 0x80,
}

impl From<bool> for FunctionAction {
    fn from(on: bool) -> Self {
        if on { FunctionAction::On } else { FunctionAction::Off }
    }
}

impl FromStr for FunctionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" | "false" => Ok(FunctionAction::Off),
            "on" | "1" | "true" => Ok(FunctionAction::On),
            "toggle" | "-1" => Ok(FunctionAction::Toggle),
            other => Err(Error::InvalidArgument(format!("unknown function action '{other}'"))),
        }
    }
}

/// `TTNNNNNN`: action code OR'd with the function index.
pub fn function_byte(index: u8, action: FunctionAction) -> Result<u8> {
    if index > MAX_FUNCTION_INDEX {
        return Err(Error::InvalidArgument(format!(
            "function index {index} outside 0..={MAX_FUNCTION_INDEX}"
        )));
    }
    Ok(u8::from(action) | index)
}

/// DCC speed step mode, encoded in the `DB0` byte of LAN_X_SET_LOCO_DRIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SpeedSteps {
    #[strum(to_string = "14 steps")]
    Steps14 = 0x10,
    #[strum(to_string = "28 steps")]
    Steps28 = 0x12,
    #[default]
    #[strum(to_string = "128 steps")]
    Steps128 = 0x13,
}

impl SpeedSteps {
    pub fn from_count(count: u16) -> Result<Self> {
        match count {
            14 => Ok(SpeedSteps::Steps14),
            28 => Ok(SpeedSteps::Steps28),
            128 => Ok(SpeedSteps::Steps128),
            other => Err(Error::InvalidArgument(format!(
                "speed steps must be 14, 28 or 128, got {other}"
            ))),
        }
    }

    pub fn count(self) -> u16 {
        match self {
            SpeedSteps::Steps14 => 14,
            SpeedSteps::Steps28 => 28,
            SpeedSteps::Steps128 => 128,
        }
    }
}

/// Build the `RVVVVVVV` byte for 128 speed steps.
///
/// A negative `speed` reverses `forward`. The magnitude is clamped to 0..=126 and
/// shifted by one above 1, because wire value 1 is the emergency stop.
pub fn encode_speed_128(speed: i32, forward: bool) -> u8 {
    let forward = if speed < 0 { !forward } else { forward };
    let mut magnitude = speed.unsigned_abs().min(u32::from(MAX_SPEED)) as u8;
    if magnitude > E_STOP_SPEED {
        magnitude += 1;
    }
    if forward {
        magnitude | DIRECTION_FORWARD
    } else {
        magnitude
    }
}

/// Whether an encoded speed byte makes the loco move (anything but stop and e-stop).
pub fn is_moving(speed_byte: u8) -> bool {
    !matches!(speed_byte & !DIRECTION_FORWARD, 0 | E_STOP_SPEED)
}

/// Accessory activation byte for LAN_X_SET_TURNOUT.
pub fn turnout_byte(output_2: bool) -> u8 {
    if output_2 {
        TURNOUT_ACTIVATE_OUTPUT_2
    } else {
        TURNOUT_ACTIVATE_OUTPUT_1
    }
}

/// Output format the command station stores per loco address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LocoMode {
    #[strum(to_string = "DCC")]
    Dcc = 0,
    #[strum(to_string = "MM")]
    Motorola = 1,
}

/// Output format the command station stores per accessory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TurnoutMode {
    #[strum(to_string = "DCC")]
    Dcc = 0,
    #[strum(to_string = "MM")]
    Motorola = 1,
}

/// Subscription mask for unsolicited broadcasts (LAN_SET_BROADCASTFLAGS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastFlags(pub u32);

impl BroadcastFlags {
    pub const NONE: BroadcastFlags = BroadcastFlags(0);
    /// Track power, loco info and turnout info broadcasts.
    pub const GENERAL: BroadcastFlags = BroadcastFlags(0x0000_0001);
    pub const RBUS: BroadcastFlags = BroadcastFlags(0x0000_0002);
    pub const RAILCOM: BroadcastFlags = BroadcastFlags(0x0000_0004);
    pub const SYSTEM_STATE: BroadcastFlags = BroadcastFlags(0x0000_0100);
    pub const ALL_LOCO_INFO: BroadcastFlags = BroadcastFlags(0x0001_0000);
    pub const LOCONET: BroadcastFlags = BroadcastFlags(0x0100_0000);

    pub fn contains(self, other: BroadcastFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BroadcastFlags {
    type Output = BroadcastFlags;

    fn bitor(self, rhs: BroadcastFlags) -> BroadcastFlags {
        BroadcastFlags(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_declares_its_own_length() {
        for command in Command::ALL {
            let template = command.template();
            assert_eq!(
                template.declared_len(),
                template.encoded_len(),
                "{} announces a length that does not match its layout",
                template.name()
            );
        }
    }

    #[test]
    fn checksum_is_xor_of_payload_for_every_template() {
        for command in Command::ALL {
            let template = command.template();
            let fields: Vec<u8> = (0..template.field_len()).map(|i| 0x5A ^ (i as u8 * 37)).collect();
            let frame = command.build(&fields);
            assert_eq!(frame.len(), template.encoded_len());
            if template.has_checksum() {
                let (body, last) = frame.split_at(frame.len() - 1);
                assert_eq!(last[0], xor_checksum(&body[HEADER_LEN..]), "{}", template.name());
            } else {
                assert_eq!(&frame[..template.prefix().len()], template.prefix());
            }
        }
    }

    #[test]
    fn fixed_commands_match_vendor_bytes() {
        assert_eq!(Command::SetTrackPowerOn.build(&[]).as_ref(), &[0x07, 0x00, 0x40, 0x00, 0x21, 0x81, 0xA0]);
        assert_eq!(Command::SetTrackPowerOff.build(&[]).as_ref(), &[0x07, 0x00, 0x40, 0x00, 0x21, 0x80, 0xA1]);
        assert_eq!(Command::GetStatus.build(&[]).as_ref(), &[0x07, 0x00, 0x40, 0x00, 0x21, 0x24, 0x05]);
        assert_eq!(Command::GetVersion.build(&[]).as_ref(), &[0x07, 0x00, 0x40, 0x00, 0x21, 0x21, 0x00]);
        assert_eq!(Command::GetFirmwareVersion.build(&[]).as_ref(), &[0x07, 0x00, 0x40, 0x00, 0xF1, 0x0A, 0xFB]);
        assert_eq!(Command::SetStop.build(&[]).as_ref(), &[0x06, 0x00, 0x40, 0x00, 0x80, 0x80]);
        assert_eq!(Command::GetSerialNumber.build(&[]).as_ref(), &[0x04, 0x00, 0x10, 0x00]);
    }

    #[test]
    fn loco_address_round_trips_through_the_extended_transform() {
        for address in 1..=MAX_LOCO_ADDRESS {
            let loco = LocoAddress::new(address).unwrap();
            let wire = loco.to_wire();
            if address >= EXTENDED_ADDRESS_THRESHOLD {
                assert_eq!(wire[0] & EXTENDED_ADDRESS_FLAG, EXTENDED_ADDRESS_FLAG);
            } else {
                assert_eq!(wire, address.to_be_bytes());
            }
            assert_eq!(LocoAddress::from_wire(wire), loco);
        }
    }

    #[test]
    fn loco_address_rejects_out_of_range() {
        assert!(LocoAddress::new(0).is_err());
        assert!(LocoAddress::new(10_000).is_err());
    }

    #[test]
    fn function_bytes_for_horn() {
        assert_eq!(function_byte(2, FunctionAction::On).unwrap(), 0x42);
        assert_eq!(function_byte(2, FunctionAction::Off).unwrap(), 0x02);
        assert_eq!(function_byte(2, FunctionAction::Toggle).unwrap(), 0x82);
        assert!(function_byte(32, FunctionAction::On).is_err());
    }

    #[test]
    fn function_action_parsing() {
        assert_eq!("ON".parse::<FunctionAction>().unwrap(), FunctionAction::On);
        assert_eq!("toggle".parse::<FunctionAction>().unwrap(), FunctionAction::Toggle);
        assert!("blink".parse::<FunctionAction>().is_err());
        assert!(FunctionAction::try_from(0xC0).is_err());
    }

    #[test]
    fn speed_encoding_reserves_one_for_emergency_stop() {
        assert_eq!(encode_speed_128(0, false), 0);
        assert_eq!(encode_speed_128(1, false), E_STOP_SPEED);
        assert_eq!(encode_speed_128(2, false), 3);
        assert_eq!(encode_speed_128(126, false), 127);
        assert_eq!(encode_speed_128(500, false), 127);
        assert_eq!(encode_speed_128(80, true), 0x80 | 81);
        // Negative speed flips direction.
        assert_eq!(encode_speed_128(-80, true), 81);
        assert_eq!(encode_speed_128(-80, false), 0x80 | 81);
    }

    #[test]
    fn moving_excludes_stop_and_emergency_stop() {
        assert!(!is_moving(encode_speed_128(0, true)));
        assert!(!is_moving(encode_speed_128(1, true)));
        assert!(is_moving(encode_speed_128(2, true)));
        assert!(is_moving(encode_speed_128(-126, true)));
    }

    #[test]
    fn speed_steps_codes() {
        assert_eq!(u8::from(SpeedSteps::Steps128), 0x13);
        assert_eq!(SpeedSteps::from_count(28).unwrap(), SpeedSteps::Steps28);
        assert!(SpeedSteps::from_count(27).is_err());
        assert_eq!(SpeedSteps::default().count(), 128);
    }

    #[test]
    fn turnout_activation_bytes() {
        assert_eq!(turnout_byte(true), 0x89);
        assert_eq!(turnout_byte(false), 0x88);
    }

    #[test]
    fn broadcast_flags_combine() {
        let flags = BroadcastFlags::GENERAL | BroadcastFlags::SYSTEM_STATE;
        assert_eq!(flags.0, 0x0101);
        assert!(flags.contains(BroadcastFlags::GENERAL));
        assert!(!flags.contains(BroadcastFlags::RBUS));
    }
}
