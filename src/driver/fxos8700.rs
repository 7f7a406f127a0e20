//! NXP FXOS8700 6-axis accelerometer + magnetometer.
//!
//! The accelerometer runs its 32-sample FIFO in circular mode and is drained in
//! bursts. The magnetometer and the die thermometer are plain register reads.
//! Accel and mag share one ADC in hybrid mode, so the realised ODR is half the
//! nominal one; the ladder in [`ctrl_reg1_for_odr`] is expressed in realised rates.

use log::{debug, info, warn};

use super::{
    drain_fifo, registers::registers, DriverState, FifoLayout, FirstFailure, ReadStatus,
    SensorDriver, SensorHandle, DEFAULT_MAX_FIFO_PACKETS_PER_READ,
};
use crate::{
    bus::{RegisterRead, RegisterWrite, SensorBus},
    context::{ChannelSet, FusionContext},
    error::SensorError,
    sample::{ChannelSample, PACKET_LEN},
};

/// Address on the Adafruit FXOS8700/FXAS21002 breakout.
pub const DEFAULT_ADDRESS: u8 = 0x1F;
pub const WHO_AM_I_VALUE: u8 = 0xC7;

/// +/-4 g range: 2048 counts/g, 8192 after the 2 bit left justification.
pub const COUNTS_PER_G: f32 = 8192.0;
pub const COUNTS_PER_UT: f32 = 10.0;

const TEMP_DEG_C_PER_LSB: f32 = 0.96;
const TEMP_BIAS_DEG_C: f32 = 0.0;

pub const F_STATUS_F_CNT_MASK: u8 = 0x3F;
pub const CTRL_REG1_ACTIVE: u8 = 0x01;

registers! {
    Reg {
        Status = 0x00,
        OutXMsb = 0x01,
        OutXLsb = 0x02,
        OutYMsb = 0x03,
        OutYLsb = 0x04,
        OutZMsb = 0x05,
        OutZLsb = 0x06,
        FSetup = 0x09,
        TrigCfg = 0x0A,
        Sysmod = 0x0B,
        IntSource = 0x0C,
        WhoAmI = 0x0D,
        XyzDataCfg = 0x0E,
        HpFilterCutoff = 0x0F,
        CtrlReg1 = 0x2A,
        CtrlReg2 = 0x2B,
        CtrlReg3 = 0x2C,
        CtrlReg4 = 0x2D,
        CtrlReg5 = 0x2E,
        OffX = 0x2F,
        OffY = 0x30,
        OffZ = 0x31,
        MDrStatus = 0x32,
        MOutXMsb = 0x33,
        MOutXLsb = 0x34,
        MOutYMsb = 0x35,
        MOutYLsb = 0x36,
        MOutZMsb = 0x37,
        MOutZLsb = 0x38,
        Temp = 0x51,
        MCtrlReg1 = 0x5B,
        MCtrlReg2 = 0x5C,
        MCtrlReg3 = 0x5D,
        MIntSrc = 0x5E,
    }
}

const FIFO: FifoLayout = FifoLayout {
    status_reg: Reg::Status.addr(),
    count_mask: F_STATUS_F_CNT_MASK,
    data_reg: Reg::OutXMsb.addr(),
};

/// CTRL_REG1 for the ODR band `hz` falls in: low noise, 16 bit reads, active.
///
/// Each band ends at an inclusive threshold, so a request can land on a slower rate
/// than asked for (26..=30 Hz runs at 25 Hz).
pub fn ctrl_reg1_for_odr(hz: u16) -> u8 {
    match hz {
        0..=1 => 0x3D,     // 0.78 Hz
        2..=3 => 0x35,     // 3.125 Hz
        4..=6 => 0x2D,     // 6.25 Hz
        7..=30 => 0x25,    // 25 Hz
        31..=50 => 0x1D,   // 50 Hz
        51..=100 => 0x15,  // 100 Hz
        101..=200 => 0x0D, // 200 Hz
        _ => 0x05,         // 400 Hz
    }
}

#[derive(Debug, Clone)]
pub struct Fxos8700 {
    odr_hz: u16,
    max_packets_per_read: usize,
}

impl Default for Fxos8700 {
    fn default() -> Self {
        Self::new(200, DEFAULT_MAX_FIFO_PACKETS_PER_READ)
    }
}

impl Fxos8700 {
    pub fn new(odr_hz: u16, max_packets_per_read: usize) -> Self {
        Self {
            odr_hz,
            max_packets_per_read,
        }
    }

    fn init_sequence(&self) -> [(Reg, u8); 7] {
        [
            // standby so the rest can be changed
            (Reg::CtrlReg1, 0x00),
            // FIFO circular mode, no watermark
            (Reg::FSetup, 0x40),
            // hybrid mode, 8x mag oversampling, no auto calibration
            (Reg::MCtrlReg1, 0x1F),
            // no auto-increment into mag registers, so a FIFO burst wraps to OUT_X_MSB
            (Reg::MCtrlReg2, 0x00),
            // +/-4 g
            (Reg::XyzDataCfg, 0x01),
            // high resolution oversampling
            (Reg::CtrlReg2, 0x02),
            (Reg::CtrlReg1, ctrl_reg1_for_odr(self.odr_hz)),
        ]
    }

    fn read_accel(
        &self,
        sensor: &SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError> {
        sensor.require(ChannelSet::ACCEL)?;
        drain_fifo(
            bus,
            sensor.address,
            FIFO,
            self.max_packets_per_read,
            &mut ctx.accel.fifo,
        )
    }

    fn read_mag(
        &self,
        sensor: &SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError> {
        sensor.require(ChannelSet::MAG)?;

        let mut packet = [0u8; PACKET_LEN];
        bus.read(
            sensor.address,
            &[RegisterRead::new(Reg::MOutXMsb.addr(), PACKET_LEN)],
            &mut packet,
        )?;
        ctx.mag.fifo.push(ChannelSample::from_be_packet(&packet));
        Ok(ReadStatus::Samples(1))
    }

    fn read_thermal(
        &self,
        sensor: &SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError> {
        sensor.require(ChannelSet::THERMAL)?;

        let raw = bus.read_register(sensor.address, Reg::Temp.addr())? as i8;
        ctx.thermal.celsius = Some(raw as f32 * TEMP_DEG_C_PER_LSB + TEMP_BIAS_DEG_C);
        Ok(ReadStatus::Samples(1))
    }
}

impl SensorDriver for Fxos8700 {
    fn name(&self) -> &'static str {
        "fxos8700"
    }

    fn channels(&self) -> ChannelSet {
        ChannelSet::ACCEL | ChannelSet::MAG | ChannelSet::THERMAL
    }

    fn init(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        let who_am_i = bus.read_register(sensor.address, Reg::WhoAmI.addr())?;
        let channels = ctx.capabilities & self.channels();

        // calibration is recorded before the identity check
        if channels.contains(ChannelSet::ACCEL) {
            ctx.accel.who_am_i = who_am_i;
            ctx.accel.counts_per_unit = COUNTS_PER_G;
        }
        if channels.contains(ChannelSet::MAG) {
            ctx.mag.who_am_i = who_am_i;
            ctx.mag.counts_per_unit = COUNTS_PER_UT;
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

        let sequence = self.init_sequence();
        let writes = sequence.map(|(reg, value)| {
            debug!("{}: {} <- {:#04x}", self.name(), reg.name(), value);
            RegisterWrite::new(reg.addr(), value)
        });
        bus.write(sensor.address, &writes)?;

        sensor.initialized = channels;
        sensor.state = DriverState::Initialized;
        ctx.set_enabled(channels, true);
        info!(
            "{} at {:#04x} initialized ({:?}, CTRL_REG1 {:#04x})",
            self.name(),
            sensor.address,
            channels,
            ctrl_reg1_for_odr(self.odr_hz)
        );
        Ok(())
    }

    fn read(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError> {
        let mut result = FirstFailure::new(self.name());
        if ctx.capabilities.contains(ChannelSet::ACCEL) {
            result.record("accel", self.read_accel(sensor, bus, ctx));
        }
        if ctx.capabilities.contains(ChannelSet::MAG) {
            result.record("mag", self.read_mag(sensor, bus, ctx));
        }
        if ctx.capabilities.contains(ChannelSet::THERMAL) {
            result.record("thermal", self.read_thermal(sensor, bus, ctx));
        }
        result.finish()
    }

    // all-or-nothing: accel-only or mag-only standby is not supported
    fn idle(
        &self,
        sensor: &mut SensorHandle,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        if sensor.state != DriverState::Initialized {
            return Err(SensorError::NotInitialized);
        }
        sensor.require(ChannelSet::ACCEL | ChannelSet::MAG)?;

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
