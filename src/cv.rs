//! # CV access on the programming track
//!
//! Decoder configuration variables are single bytes addressed by a 1-based id; the
//! wire carries `id - 1` as two big-endian bytes.
//!
//! CVs from 257 up are indexed: their meaning depends on the index register CV31/CV32.
//! An access with a non-zero page is bracketed like this:
//!
//! ```text
//! write CV31 = 16, write CV32 = page    (page select)
//! read or write the CV                   (primary access)
//! write CV32 = 0                         (restore, also after a failed primary access)
//! ```
//!
//! Every write is one send followed by one receive that drains the acknowledgement
//! the command station echoes back ([`drain_acknowledgement`]).

use std::fmt;
use strum_macros::Display;
use tracing::{debug, error, warn};

use crate::decode::Reply;
use crate::error::{Error, Result};
use crate::protocol::{Command, MAX_READ};
use crate::transport::Transport;

pub const MAX_CV: u16 = 1024;
pub const FIRST_PAGED_CV: u16 = 257;
pub const INDEX_REGISTER_HIGH: u16 = 31;
pub const INDEX_REGISTER_LOW: u16 = 32;
/// CV31 value while a page is selected.
pub const INDEX_HIGH_VALUE: u8 = 16;
pub const MAX_PAGE: u8 = 16;

/// Datagrams skipped while waiting for a CV result before giving up.
const MAX_UNRELATED_REPLIES: usize = 8;

/// A CV id, 1..=1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CvId(u16);

impl CvId {
    pub fn new(id: u16) -> Result<Self> {
        if !(1..=MAX_CV).contains(&id) {
            return Err(Error::InvalidArgument(format!("CV {id} outside 1..={MAX_CV}")));
        }
        Ok(Self(id))
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    /// `CVAdr_MSB, CVAdr_LSB` where 0 is CV1.
    pub fn to_wire(self) -> [u8; 2] {
        (self.0 - 1).to_be_bytes()
    }

    pub fn is_paged(self) -> bool {
        self.0 >= FIRST_PAGED_CV
    }
}

impl TryFrom<u16> for CvId {
    type Error = Error;

    fn try_from(id: u16) -> Result<Self> {
        Self::new(id)
    }
}

impl fmt::Display for CvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CV{}", self.0)
    }
}

fn check_page(page: u8) -> Result<()> {
    if page > MAX_PAGE {
        return Err(Error::InvalidArgument(format!("page {page} outside 0..={MAX_PAGE}")));
    }
    Ok(())
}

/// Read one CV, selecting `page` first when the CV is indexed.
pub async fn read_cv<T: Transport>(transport: &mut T, cv: CvId, page: u8) -> Result<u8> {
    check_page(page)?;
    let paged = select_page(transport, cv, page).await?;
    let result = read_unpaged(transport, cv).await;
    finish_paged(transport, cv, paged, result).await
}

/// Write one CV, selecting `page` first when the CV is indexed.
pub async fn write_cv<T: Transport>(transport: &mut T, cv: CvId, value: u8, page: u8) -> Result<()> {
    check_page(page)?;
    let paged = select_page(transport, cv, page).await?;
    let result = write_unpaged(transport, cv, value).await;
    finish_paged(transport, cv, paged, result).await
}

/// Returns whether a page was selected and must be restored.
async fn select_page<T: Transport>(transport: &mut T, cv: CvId, page: u8) -> Result<bool> {
    if !cv.is_paged() || page == 0 {
        return Ok(false);
    }
    debug!(cv = cv.get(), page, "Selecting CV page");
    write_unpaged(transport, CvId(INDEX_REGISTER_HIGH), INDEX_HIGH_VALUE).await?;
    if let Err(e) = write_unpaged(transport, CvId(INDEX_REGISTER_LOW), page).await {
        // CV32 may have been written before the failure
        if let Err(restore) = restore_page(transport).await {
            error!(cv = cv.get(), page, error = %restore, "Index register left in unknown state");
        }
        return Err(e);
    }
    Ok(true)
}

async fn restore_page<T: Transport>(transport: &mut T) -> Result<()> {
    write_unpaged(transport, CvId(INDEX_REGISTER_LOW), 0).await
}

async fn finish_paged<T: Transport, R>(transport: &mut T, cv: CvId, paged: bool, result: Result<R>) -> Result<R> {
    if !paged {
        return result;
    }
    match restore_page(transport).await {
        Ok(()) => result,
        Err(restore) => {
            error!(cv = cv.get(), error = %restore, "Failed to restore CV32 to 0, decoder stays paged");
            match result {
                Ok(_) => Err(restore),
                Err(primary) => Err(primary),
            }
        }
    }
}

async fn read_unpaged<T: Transport>(transport: &mut T, cv: CvId) -> Result<u8> {
    transport.send(&Command::CvRead.build(&cv.to_wire())).await?;
    for _ in 0..MAX_UNRELATED_REPLIES {
        let datagram = transport.receive(MAX_READ).await?;
        let reply = match Reply::parse(&datagram) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(cv = cv.get(), error = %e, rx = %hex::encode(&datagram), "Skipping undecodable datagram");
                continue;
            }
        };
        if let Some(e) = reply.cv_error(cv.get()) {
            warn!(cv = cv.get(), error = %e, "CV read rejected");
            return Err(e);
        }
        match reply {
            Reply::CvResult { cv: id, value } if id == cv.get() => {
                debug!(cv = id, value, "Read CV");
                return Ok(value);
            }
            // late echo of an earlier write
            Reply::CvResult { cv: id, value } => {
                debug!(cv = cv.get(), stale_cv = id, value, "Skipping result for another CV")
            }
            other => debug!(cv = cv.get(), reply = ?other, "Skipping unrelated datagram"),
        }
    }
    Err(Error::UnexpectedReply(format!("no CV result for {cv}")))
}

async fn write_unpaged<T: Transport>(transport: &mut T, cv: CvId, value: u8) -> Result<()> {
    let [msb, lsb] = cv.to_wire();
    transport.send(&Command::CvWrite.build(&[msb, lsb, value])).await?;
    debug!(cv = cv.get(), value, "Wrote CV");
    drain_acknowledgement(transport, cv).await
}

/// Consume the single datagram the command station sends after a CV write.
///
/// Its content is discarded unless it is a NACK, which is returned as the error.
pub async fn drain_acknowledgement<T: Transport>(transport: &mut T, cv: CvId) -> Result<()> {
    let datagram = transport.receive(MAX_READ).await?;
    match Reply::parse(&datagram) {
        Ok(reply) => match reply.cv_error(cv.get()) {
            Some(e) => {
                warn!(cv = cv.get(), error = %e, "CV write rejected");
                Err(e)
            }
            None => Ok(()),
        },
        Err(e) => {
            debug!(cv = cv.get(), error = %e, rx = %hex::encode(&datagram), "Discarding undecodable acknowledgement");
            Ok(())
        }
    }
}

// --- Register table ---

/// Whether a register may be written through [`Register`] accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Access {
    #[strum(to_string = "ro")]
    ReadOnly,
    #[strum(to_string = "rw")]
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub cv: u16,
    pub page: u8,
    pub min: u8,
    pub max: u8,
    pub access: Access,
}

impl RegisterSpec {
    const fn rw(cv: u16, min: u8, max: u8) -> Self {
        Self {
            cv,
            page: 0,
            min,
            max,
            access: Access::ReadWrite,
        }
    }

    const fn ro(cv: u16) -> Self {
        Self {
            cv,
            page: 0,
            min: 0,
            max: u8::MAX,
            access: Access::ReadOnly,
        }
    }

    const fn paged(cv: u16, page: u8, min: u8, max: u8) -> Self {
        Self {
            cv,
            page,
            min,
            max,
            access: Access::ReadWrite,
        }
    }
}

/// Named decoder registers (ESU LokPilot/LokSound 5 numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Register {
    LocoAddress,
    StartVoltage,
    Acceleration,
    Deceleration,
    MaximumSpeed,
    MediumSpeed,
    VersionNumber,
    ManufacturerId,
    MotorPwmFrequency,
    AnalogFunctionsF1F8,
    AnalogFunctionsF0F12,
    DecoderLock,
    LongAddressHigh,
    LongAddressLow,
    ConsistAddress,
    ConsistFunctionsF1F8,
    ConsistFunctionsF0F12,
    AccelerationAdjust,
    DecelerationAdjust,
    BrakeMode,
    RailcomConfiguration,
    ConfigurationRegister,
    IndexRegisterHigh,
    IndexRegisterLow,
    ProtocolSelection,
    ExtendedConfiguration,
    AnalogueModes,
    KSlowCutoff,
    KSlow,
    ControlReferenceVoltage,
    LoadControlK,
    LoadControlI,
    BemfInfluenceMinimum,
    SteamChuffSync1,
    SteamChuffSync2,
    MasterVolume,
    BrakeSoundOn,
    BrakeSoundOff,
    ForwardTrim,
    ReverseTrim,
    ShuntingModeTrim,
    BrakeExitDelay,
    UserCv1,
    UserCv2,
    GearboxBacklash,
    SlowSpeedBemfSampling,
    FullSpeedBemfSampling,
    AbcSensitivity,
    BrakeFunction1Maximum,
    BrakeFunction2Maximum,
    BrakeFunction3Maximum,
    ConstantBrakeMode,
    ConstantBrakeDistanceForward,
    ConstantBrakeDistanceReverse,
    BrakeVolume,
}

impl Register {
    pub const ALL: [Register; 55] = [
        Register::LocoAddress,
        Register::StartVoltage,
        Register::Acceleration,
        Register::Deceleration,
        Register::MaximumSpeed,
        Register::MediumSpeed,
        Register::VersionNumber,
        Register::ManufacturerId,
        Register::MotorPwmFrequency,
        Register::AnalogFunctionsF1F8,
        Register::AnalogFunctionsF0F12,
        Register::DecoderLock,
        Register::LongAddressHigh,
        Register::LongAddressLow,
        Register::ConsistAddress,
        Register::ConsistFunctionsF1F8,
        Register::ConsistFunctionsF0F12,
        Register::AccelerationAdjust,
        Register::DecelerationAdjust,
        Register::BrakeMode,
        Register::RailcomConfiguration,
        Register::ConfigurationRegister,
        Register::IndexRegisterHigh,
        Register::IndexRegisterLow,
        Register::ProtocolSelection,
        Register::ExtendedConfiguration,
        Register::AnalogueModes,
        Register::KSlowCutoff,
        Register::KSlow,
        Register::ControlReferenceVoltage,
        Register::LoadControlK,
        Register::LoadControlI,
        Register::BemfInfluenceMinimum,
        Register::SteamChuffSync1,
        Register::SteamChuffSync2,
        Register::MasterVolume,
        Register::BrakeSoundOn,
        Register::BrakeSoundOff,
        Register::ForwardTrim,
        Register::ReverseTrim,
        Register::ShuntingModeTrim,
        Register::BrakeExitDelay,
        Register::UserCv1,
        Register::UserCv2,
        Register::GearboxBacklash,
        Register::SlowSpeedBemfSampling,
        Register::FullSpeedBemfSampling,
        Register::AbcSensitivity,
        Register::BrakeFunction1Maximum,
        Register::BrakeFunction2Maximum,
        Register::BrakeFunction3Maximum,
        Register::ConstantBrakeMode,
        Register::ConstantBrakeDistanceForward,
        Register::ConstantBrakeDistanceReverse,
        Register::BrakeVolume,
    ];

    pub const fn spec(self) -> RegisterSpec {
        match self {
            Register::LocoAddress => RegisterSpec::rw(1, 1, 127),
            Register::StartVoltage => RegisterSpec::rw(2, 1, 127),
            Register::Acceleration => RegisterSpec::rw(3, 0, 255),
            Register::Deceleration => RegisterSpec::rw(4, 0, 255),
            Register::MaximumSpeed => RegisterSpec::rw(5, 0, 255),
            Register::MediumSpeed => RegisterSpec::rw(6, 0, 255),
            Register::VersionNumber => RegisterSpec::ro(7),
            Register::ManufacturerId => RegisterSpec::ro(8),
            Register::MotorPwmFrequency => RegisterSpec::rw(9, 10, 50),
            Register::AnalogFunctionsF1F8 => RegisterSpec::rw(13, 0, 255),
            Register::AnalogFunctionsF0F12 => RegisterSpec::rw(14, 0, 63),
            Register::DecoderLock => RegisterSpec::rw(15, 0, 255),
            Register::LongAddressHigh => RegisterSpec::rw(17, 192, 231),
            Register::LongAddressLow => RegisterSpec::rw(18, 0, 255),
            Register::ConsistAddress => RegisterSpec::rw(19, 0, 255),
            Register::ConsistFunctionsF1F8 => RegisterSpec::rw(21, 0, 255),
            Register::ConsistFunctionsF0F12 => RegisterSpec::rw(22, 0, 255),
            Register::AccelerationAdjust => RegisterSpec::rw(23, 0, 255),
            Register::DecelerationAdjust => RegisterSpec::rw(24, 0, 255),
            Register::BrakeMode => RegisterSpec::rw(27, 0, 255),
            Register::RailcomConfiguration => RegisterSpec::rw(28, 0, 255),
            Register::ConfigurationRegister => RegisterSpec::rw(29, 0, 255),
            // paging is managed by read_cv/write_cv
            Register::IndexRegisterHigh => RegisterSpec::ro(31),
            Register::IndexRegisterLow => RegisterSpec::ro(32),
            Register::ProtocolSelection => RegisterSpec::rw(47, 0, 255),
            Register::ExtendedConfiguration => RegisterSpec::rw(49, 0, 255),
            Register::AnalogueModes => RegisterSpec::rw(50, 0, 3),
            Register::KSlowCutoff => RegisterSpec::rw(51, 0, 255),
            Register::KSlow => RegisterSpec::rw(52, 0, 255),
            Register::ControlReferenceVoltage => RegisterSpec::rw(53, 0, 255),
            Register::LoadControlK => RegisterSpec::rw(54, 0, 255),
            Register::LoadControlI => RegisterSpec::rw(55, 0, 255),
            Register::BemfInfluenceMinimum => RegisterSpec::rw(56, 1, 255),
            Register::SteamChuffSync1 => RegisterSpec::rw(57, 1, 255),
            Register::SteamChuffSync2 => RegisterSpec::rw(58, 1, 255),
            Register::MasterVolume => RegisterSpec::rw(63, 0, 192),
            Register::BrakeSoundOn => RegisterSpec::rw(64, 0, 255),
            Register::BrakeSoundOff => RegisterSpec::rw(65, 0, 255),
            Register::ForwardTrim => RegisterSpec::rw(66, 0, 255),
            Register::ReverseTrim => RegisterSpec::rw(95, 0, 255),
            Register::ShuntingModeTrim => RegisterSpec::rw(101, 0, 128),
            Register::BrakeExitDelay => RegisterSpec::rw(102, 0, 255),
            Register::UserCv1 => RegisterSpec::rw(105, 0, 255),
            Register::UserCv2 => RegisterSpec::rw(106, 0, 255),
            Register::GearboxBacklash => RegisterSpec::rw(111, 0, 255),
            Register::SlowSpeedBemfSampling => RegisterSpec::rw(116, 50, 200),
            Register::FullSpeedBemfSampling => RegisterSpec::rw(117, 50, 200),
            Register::AbcSensitivity => RegisterSpec::rw(134, 4, 32),
            Register::BrakeFunction1Maximum => RegisterSpec::rw(182, 0, 126),
            Register::BrakeFunction2Maximum => RegisterSpec::rw(183, 0, 126),
            Register::BrakeFunction3Maximum => RegisterSpec::rw(184, 0, 126),
            Register::ConstantBrakeMode => RegisterSpec::rw(253, 0, 255),
            Register::ConstantBrakeDistanceForward => RegisterSpec::rw(254, 0, 255),
            Register::ConstantBrakeDistanceReverse => RegisterSpec::rw(255, 0, 255),
            Register::BrakeVolume => RegisterSpec::paged(259, 2, 0, 128),
        }
    }

    pub fn cv(self) -> CvId {
        CvId(self.spec().cv)
    }

    /// Look up a register by its snake_case name, e.g. `start_voltage`.
    pub fn from_name(name: &str) -> Option<Register> {
        let name = name.trim().replace('-', "_").to_ascii_lowercase();
        Register::ALL.into_iter().find(|r| r.to_string() == name)
    }

    /// Check that `value` may be written to this register.
    pub fn validate(self, value: u8) -> Result<()> {
        let spec = self.spec();
        if spec.access == Access::ReadOnly {
            return Err(Error::InvalidArgument(format!("{self} (CV{}) is read-only", spec.cv)));
        }
        if !(spec.min..=spec.max).contains(&value) {
            return Err(Error::InvalidArgument(format!(
                "{self} (CV{}) accepts {}..={}, got {value}",
                spec.cv, spec.min, spec.max
            )));
        }
        Ok(())
    }
}
