//! NXP FXAS21002 3-axis gyroscope, FIFO drained the same way as the FXOS8700 accel.

use log::{debug, info, warn};

use super::{
    drain_fifo, registers::registers, DriverState, FifoLayout, ReadStatus, SensorDriver,
    SensorHandle, DEFAULT_MAX_FIFO_PACKETS_PER_READ,
};
use crate::{
    bus::{RegisterWrite, SensorBus},
    context::{ChannelSet, FusionContext},
    error::SensorError,
};

pub const DEFAULT_ADDRESS: u8 = 0x21;
pub const WHO_AM_I_VALUE: u8 = 0xD7;

/// +/-2000 deg/s range, 62.5 mdps/LSB.
pub const COUNTS_PER_DPS: f32 = 16.0;

pub const F_STATUS_F_CNT_MASK: u8 = 0x3F;
pub const CTRL_REG1_ACTIVE: u8 = 0x02;

registers! {
    Reg {
        Status = 0x00,
        OutXMsb = 0x01,
        OutXLsb = 0x02,
        OutYMsb = 0x03,
        OutYLsb = 0x04,
        OutZMsb = 0x05,
        OutZLsb = 0x06,
        DrStatus = 0x07,
        FStatus = 0x08,
        FSetup = 0x09,
        FEvent = 0x0A,
        IntSrcFlag = 0x0B,
        WhoAmI = 0x0C,
        CtrlReg0 = 0x0D,
        RtCfg = 0x0E,
        RtSrc = 0x0F,
        RtThs = 0x10,
        RtCount = 0x11,
        Temp = 0x12,
        CtrlReg1 = 0x13,
        CtrlReg2 = 0x14,
        CtrlReg3 = 0x15,
    }
}

const FIFO: FifoLayout = FifoLayout {
    // STATUS mirrors F_STATUS while the FIFO is enabled
    status_reg: Reg::Status.addr(),
    count_mask: F_STATUS_F_CNT_MASK,
    data_reg: Reg::OutXMsb.addr(),
};

/// CTRL_REG1 (DR in bits 4:2, ACTIVE set) for the ODR band `hz` falls in. Bands end at
/// inclusive thresholds.
pub fn ctrl_reg1_for_odr(hz: u16) -> u8 {
    match hz {
        0..=12 => 0x1A,   // 12.5 Hz
        13..=25 => 0x16,  // 25 Hz
        26..=50 => 0x12,  // 50 Hz
        51..=100 => 0x0E, // 100 Hz
        101..=200 => 0x0A,
        201..=400 => 0x06,
        _ => 0x02, // 800 Hz
    }
}

#[derive(Debug, Clone)]
pub struct Fxas21002 {
    odr_hz: u16,
    max_packets_per_read: usize,
}

impl Default for Fxas21002 {
    fn default() -> Self {
        Self::new(200, DEFAULT_MAX_FIFO_PACKETS_PER_READ)
    }
}

impl Fxas21002 {
    pub fn new(odr_hz: u16, max_packets_per_read: usize) -> Self {
        Self {
            odr_hz,
            max_packets_per_read,
        }
    }

    fn init_sequence(&self) -> [(Reg, u8); 6] {
        [
            (Reg::CtrlReg1, 0x00),
            // circular FIFO
            (Reg::FSetup, 0x40),
            // +/-2000 deg/s, no high pass
            (Reg::CtrlReg0, 0x00),
            (Reg::CtrlReg2, 0x00),
            // WRAPTOONE: bursts wrap from OUT_Z_LSB back to OUT_X_MSB
            (Reg::CtrlReg3, 0x08),
            (Reg::CtrlReg1, ctrl_reg1_for_odr(self.odr_hz)),
        ]
    }
}

impl SensorDriver for Fxas21002 {
    fn name(&self) -> &'static str {
        "fxas21002"
    }

    fn channels(&self) -> ChannelSet {
        ChannelSet::GYRO
    }

    fn init(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        let who_am_i = bus.read_register(sensor.address, Reg::WhoAmI.addr())?;
        let channels = ctx.capabilities & self.channels();

        if channels.contains(ChannelSet::GYRO) {
            ctx.gyro.who_am_i = who_am_i;
            ctx.gyro.counts_per_unit = COUNTS_PER_DPS;
        }

        if who_am_i != WHO_AM_I_VALUE {
            warn!(
                "{} at {:#04x}: WHO_AM_I {:#04x}, expected {:#04x}",
                self.name(),
                sensor.address,
                who_am_i,
                WHO_AM_I_VALUE
            );
            return Err(SensorError::IdentityMismatch {
                expected: WHO_AM_I_VALUE,
                found: who_am_i,
            });
        }

        let writes = self.init_sequence().map(|(reg, value)| {
            debug!("{}: {} <- {:#04x}", self.name(), reg.name(), value);
            RegisterWrite::new(reg.addr(), value)
        });
        bus.write(sensor.address, &writes)?;

        sensor.initialized = channels;
        sensor.state = DriverState::Initialized;
        ctx.set_enabled(channels, true);
        info!("{} at {:#04x} initialized ({:?})", self.name(), sensor.address, channels);
        Ok(())
    }

    fn read(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError> {
        sensor.require(ChannelSet::GYRO)?;
        drain_fifo(
            bus,
            sensor.address,
            FIFO,
            self.max_packets_per_read,
            &mut ctx.gyro.fifo,
        )
    }

    fn idle(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        if sensor.state != DriverState::Initialized {
            return Err(SensorError::NotInitialized);
        }
        sensor.require(ChannelSet::GYRO)?;

        bus.write(
            sensor.address,
            &[RegisterWrite::masked(
                Reg::CtrlReg1.addr(),
                0x00,
                !CTRL_REG1_ACTIVE,
            )],
        )?;

        sensor.initialized = ChannelSet::empty();
        sensor.state = DriverState::Idle;
        ctx.set_enabled(self.channels(), false);
        info!("{} at {:#04x} in standby", self.name(), sensor.address);
        Ok(())
    }
}
