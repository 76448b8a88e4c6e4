// src/device.rs

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::cv::{self, CvId, Register};
use crate::decode::{
    CentralState, FirmwareVersion, HardwareInfo, LocoInfo, LockState, Reply, SystemState, TurnoutInfo, XBusVersion,
};
use crate::decoder::DecoderModel;
use crate::error::{Error, Result};
use crate::protocol::{
    BroadcastFlags, Command, FunctionAction, LocoAddress, LocoMode, MAX_READ, SpeedSteps, TurnoutMode,
    encode_speed_128, function_byte, is_moving, turnout_byte,
};
use crate::transport::{Transport, UdpTransport};

/// Function output of the head/rear light.
pub const F0_HEAD_REAR_LIGHT: u8 = 0;
pub const F1_LIGHTING: u8 = 1;
pub const F2_HORN: u8 = 2;

/// CV8 value that resets an ESU decoder to factory defaults.
const FACTORY_RESET_VALUE: u8 = 8;

/// Datagrams skipped while waiting for the reply to a query.
const MAX_UNRELATED_REPLIES: usize = 8;

/// Connection to a Z21 command station.
///
/// Every operation holds the transport lock from its first send to its last
/// receive, so paged CV sequences and query/reply pairs never interleave.
pub struct Z21<T: Transport = UdpTransport> {
    transport: Mutex<T>,
    decoder: DecoderModel,
}

impl Z21<UdpTransport> {
    pub async fn connect(config: &Config) -> Result<Self> {
        let transport = UdpTransport::connect(config).await?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> Z21<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            decoder: DecoderModel::Generic,
        }
    }

    /// Restrict register and function access to what `model` supports.
    pub fn with_decoder(mut self, model: DecoderModel) -> Self {
        self.decoder = model;
        self
    }

    pub fn decoder(&self) -> DecoderModel {
        self.decoder
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.lock().await.close().await
    }

    pub fn into_transport(self) -> T {
        self.transport.into_inner()
    }

    async fn send(&self, command: Command, fields: &[u8]) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.send(&command.build(fields)).await
    }

    /// Send `command` and return the first reply `pick` accepts.
    async fn query<R>(&self, command: Command, fields: &[u8], pick: impl Fn(Reply) -> Option<R>) -> Result<R> {
        let mut transport = self.transport.lock().await;
        transport.send(&command.build(fields)).await?;
        for _ in 0..MAX_UNRELATED_REPLIES {
            let datagram = transport.receive(MAX_READ).await?;
            let reply = match Reply::parse(&datagram) {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(command = %command, error = %e, rx = %hex::encode(&datagram), "Skipping undecodable datagram");
                    continue;
                }
            };
            if reply == Reply::UnknownCommand {
                warn!(command = %command, "Command station does not know the command");
                return Err(Error::UnknownCommand);
            }
            match pick(reply) {
                Some(value) => return Ok(value),
                None => debug!(command = %command, rx = %hex::encode(&datagram), "Skipping unrelated datagram"),
            }
        }
        Err(Error::UnexpectedReply(format!("no reply to {command}")))
    }

    // --- Power ---

    pub async fn set_track_power_on(&self) -> Result<()> {
        info!("Track power on");
        self.send(Command::SetTrackPowerOn, &[]).await
    }

    pub async fn set_track_power_off(&self) -> Result<()> {
        info!("Track power off");
        self.send(Command::SetTrackPowerOff, &[]).await
    }

    /// Emergency stop for every loco; track power stays on.
    pub async fn set_stop(&self) -> Result<()> {
        info!("Stopping all locos");
        self.send(Command::SetStop, &[]).await
    }

    pub async fn logoff(&self) -> Result<()> {
        info!("Logging off");
        self.send(Command::Logoff, &[]).await
    }

    // --- Driving ---

    /// Drive a loco. Only 128 speed steps are implemented; 14 and 28 send nothing.
    ///
    /// A moving speed also switches F0 (head/rear light) on first.
    pub async fn loco_drive(&self, address: u16, speed: i32, forward: bool, steps: SpeedSteps) -> Result<()> {
        let address = LocoAddress::new(address)?;
        if steps != SpeedSteps::Steps128 {
            warn!(loco = address.get(), steps = %steps, "Speed step mode not implemented, nothing sent");
            return Ok(());
        }
        let speed_byte = encode_speed_128(speed, forward);
        let [msb, lsb] = address.to_wire();

        let mut transport = self.transport.lock().await;
        if is_moving(speed_byte) {
            let light = function_byte(F0_HEAD_REAR_LIGHT, FunctionAction::On)?;
            transport.send(&Command::SetLocoFunction.build(&[msb, lsb, light])).await?;
        }
        transport
            .send(&Command::SetLocoDrive.build(&[u8::from(steps), msb, lsb, speed_byte]))
            .await?;
        debug!(loco = address.get(), speed, forward, wire = speed_byte, "Drive");
        Ok(())
    }

    /// Forward at `speed` (negative for reverse) with 128 speed steps.
    pub async fn drive(&self, address: u16, speed: i32) -> Result<()> {
        self.loco_drive(address, speed, true, SpeedSteps::Steps128).await
    }

    pub async fn stop(&self, address: u16) -> Result<()> {
        self.drive(address, 0).await
    }

    pub async fn e_stop(&self, address: u16) -> Result<()> {
        self.drive(address, 1).await
    }

    pub async fn loco_function(&self, address: u16, index: u8, action: FunctionAction) -> Result<()> {
        let address = LocoAddress::new(address)?;
        let function = function_byte(index, action)?;
        self.decoder.check_function(index)?;
        let [msb, lsb] = address.to_wire();
        debug!(loco = address.get(), function = index, action = %action, "Function");
        self.send(Command::SetLocoFunction, &[msb, lsb, function]).await
    }

    pub async fn set_head_rear_light(&self, address: u16, on: bool) -> Result<()> {
        self.loco_function(address, F0_HEAD_REAR_LIGHT, on.into()).await
    }

    pub async fn set_lighting(&self, address: u16, on: bool) -> Result<()> {
        self.loco_function(address, F1_LIGHTING, on.into()).await
    }

    pub async fn set_horn(&self, address: u16, on: bool) -> Result<()> {
        self.loco_function(address, F2_HORN, on.into()).await
    }

    pub async fn get_loco_info(&self, address: u16) -> Result<LocoInfo> {
        let address = LocoAddress::new(address)?;
        self.query(Command::GetLocoInfo, &address.to_wire(), |reply| match reply {
            Reply::LocoInfo(info) if info.address == address => Some(info),
            _ => None,
        })
        .await
    }

    pub async fn get_loco_mode(&self, address: u16) -> Result<LocoMode> {
        let address = LocoAddress::new(address)?;
        let mode = self
            .query(Command::GetLocoMode, &address.get().to_be_bytes(), |reply| match reply {
                Reply::LocoMode { address: a, mode } if a == address.get() => Some(mode),
                _ => None,
            })
            .await?;
        LocoMode::try_from(mode).map_err(|_| Error::UnexpectedReply(format!("loco mode {mode}")))
    }

    pub async fn set_loco_mode(&self, address: u16, mode: LocoMode) -> Result<()> {
        let address = LocoAddress::new(address)?;
        let [msb, lsb] = address.get().to_be_bytes();
        info!(loco = address.get(), mode = %mode, "Setting loco mode");
        self.send(Command::SetLocoMode, &[msb, lsb, mode.into()]).await
    }

    // --- Turnouts ---

    /// Activate output 2 (`true`) or output 1 of an accessory decoder.
    pub async fn set_turnout(&self, address: u16, output_2: bool) -> Result<()> {
        let [msb, lsb] = address.to_be_bytes();
        debug!(turnout = address, output_2, "Turnout");
        self.send(Command::SetTurnout, &[msb, lsb, turnout_byte(output_2)]).await
    }

    pub async fn get_turnout_info(&self, address: u16) -> Result<TurnoutInfo> {
        self.query(Command::GetTurnoutInfo, &address.to_be_bytes(), |reply| match reply {
            Reply::TurnoutInfo(info) if info.address == address => Some(info),
            _ => None,
        })
        .await
    }

    pub async fn get_turnout_mode(&self, address: u16) -> Result<TurnoutMode> {
        let mode = self
            .query(Command::GetTurnoutMode, &address.to_be_bytes(), |reply| match reply {
                Reply::TurnoutMode { address: a, mode } if a == address => Some(mode),
                _ => None,
            })
            .await?;
        TurnoutMode::try_from(mode).map_err(|_| Error::UnexpectedReply(format!("turnout mode {mode}")))
    }

    pub async fn set_turnout_mode(&self, address: u16, mode: TurnoutMode) -> Result<()> {
        let [msb, lsb] = address.to_be_bytes();
        info!(turnout = address, mode = %mode, "Setting turnout mode");
        self.send(Command::SetTurnoutMode, &[msb, lsb, mode.into()]).await
    }

    // --- Status ---

    pub async fn get_serial_number(&self) -> Result<u32> {
        self.query(Command::GetSerialNumber, &[], |reply| match reply {
            Reply::SerialNumber(serial) => Some(serial),
            _ => None,
        })
        .await
    }

    pub async fn get_version(&self) -> Result<XBusVersion> {
        self.query(Command::GetVersion, &[], |reply| match reply {
            Reply::Version(version) => Some(version),
            _ => None,
        })
        .await
    }

    pub async fn get_firmware_version(&self) -> Result<FirmwareVersion> {
        self.query(Command::GetFirmwareVersion, &[], |reply| match reply {
            Reply::FirmwareVersion(version) => Some(version),
            _ => None,
        })
        .await
    }

    pub async fn get_status(&self) -> Result<CentralState> {
        self.query(Command::GetStatus, &[], |reply| match reply {
            Reply::Status(status) => Some(status),
            _ => None,
        })
        .await
    }

    pub async fn get_system_state(&self) -> Result<SystemState> {
        self.query(Command::GetSystemState, &[], |reply| match reply {
            Reply::SystemState(state) => Some(state),
            _ => None,
        })
        .await
    }

    pub async fn get_hardware_info(&self) -> Result<HardwareInfo> {
        self.query(Command::GetHardwareInfo, &[], |reply| match reply {
            Reply::HardwareInfo(info) => Some(info),
            _ => None,
        })
        .await
    }

    /// Feature lock of a z21start; `None` for a code this crate does not know.
    pub async fn get_lan_code(&self) -> Result<Option<LockState>> {
        self.query(Command::GetCode, &[], |reply| match reply {
            Reply::Code(code) => Some(code),
            _ => None,
        })
        .await
    }

    pub async fn get_broadcast_flags(&self) -> Result<BroadcastFlags> {
        self.query(Command::GetBroadcastFlags, &[], |reply| match reply {
            Reply::BroadcastFlags(flags) => Some(flags),
            _ => None,
        })
        .await
    }

    pub async fn set_broadcast_flags(&self, flags: BroadcastFlags) -> Result<()> {
        info!(flags = %format!("{:#010x}", flags.0), "Setting broadcast flags");
        self.send(Command::SetBroadcastFlags, &flags.0.to_le_bytes()).await
    }

    // --- Programming track ---

    pub async fn read_cv(&self, id: u16, page: u8) -> Result<u8> {
        let cv = CvId::new(id)?;
        let mut transport = self.transport.lock().await;
        cv::read_cv(&mut *transport, cv, page).await
    }

    pub async fn write_cv(&self, id: u16, value: u8, page: u8) -> Result<()> {
        let cv = CvId::new(id)?;
        let mut transport = self.transport.lock().await;
        cv::write_cv(&mut *transport, cv, value, page).await
    }

    pub async fn read_register(&self, register: Register) -> Result<u8> {
        self.decoder.check_register(register)?;
        let spec = register.spec();
        let mut transport = self.transport.lock().await;
        cv::read_cv(&mut *transport, register.cv(), spec.page).await
    }

    /// Write a named register after checking its range; nothing is sent on failure.
    pub async fn write_register(&self, register: Register, value: u8) -> Result<()> {
        self.decoder.check_register(register)?;
        register.validate(value)?;
        let spec = register.spec();
        let mut transport = self.transport.lock().await;
        cv::write_cv(&mut *transport, register.cv(), value, spec.page).await
    }

    /// Reset the decoder on the programming track to factory defaults.
    pub async fn reset_decoder(&self) -> Result<()> {
        info!("Resetting decoder");
        let mut transport = self.transport.lock().await;
        cv::write_cv(&mut *transport, Register::ManufacturerId.cv(), FACTORY_RESET_VALUE, 0).await
    }

    /// Enable the brake sound: deceleration, brake sound thresholds and volume.
    pub async fn set_brake_sound_on(&self) -> Result<()> {
        const SETTINGS: [(Register, u8); 4] = [
            (Register::Deceleration, 21),
            (Register::BrakeSoundOn, 60),
            (Register::BrakeSoundOff, 10),
            (Register::BrakeVolume, 100),
        ];
        for (register, _) in SETTINGS {
            self.decoder.check_register(register)?;
        }
        let mut transport = self.transport.lock().await;
        for (register, value) in SETTINGS {
            cv::write_cv(&mut *transport, register.cv(), value, register.spec().page).await?;
        }
        Ok(())
    }

    /// Send a raw datagram and return the next one received.
    pub async fn transact_raw(&self, datagram: &[u8]) -> Result<Bytes> {
        let mut transport = self.transport.lock().await;
        transport.send(datagram).await?;
        transport.receive(MAX_READ).await
    }
}
