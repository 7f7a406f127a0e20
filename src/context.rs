use bitflags::bitflags;
use glam::{Quat, Vec3};

use crate::{
    fifo::{SampleFifo, ACCEL_FIFO_SIZE, GYRO_FIFO_SIZE, MAG_FIFO_SIZE},
    status::StatusSubsystem,
};

bitflags! {
    /// Logical channels a sensor can provide.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelSet: u8 {
        const ACCEL = 1 << 0;
        const MAG = 1 << 1;
        const GYRO = 1 << 2;
        const THERMAL = 1 << 3;
    }
}

/// Per-channel acquisition state: enable flag, calibration and sample FIFO.
#[derive(Debug, Clone)]
pub struct ChannelState<const N: usize> {
    pub enabled: bool,
    /// Identity byte of the device feeding this channel, zero until read.
    pub who_am_i: u8,
    pub counts_per_unit: f32,
    pub fifo: SampleFifo<N>,
}

impl<const N: usize> ChannelState<N> {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            who_am_i: 0,
            counts_per_unit: 0.0,
            fifo: SampleFifo::new(),
        }
    }

    pub fn units_per_count(&self) -> f32 {
        if self.counts_per_unit > 0.0 {
            self.counts_per_unit.recip()
        } else {
            0.0
        }
    }
}

impl<const N: usize> Default for ChannelState<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThermalState {
    pub enabled: bool,
    pub celsius: Option<f32>,
}

/// Output of the fusion engine, refreshed every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedState {
    pub orientation: Quat,
    /// Averaged acceleration in g.
    pub accel: Vec3,
    /// Averaged magnetic field in uT.
    pub mag: Vec3,
    /// Averaged angular rate in deg/s.
    pub gyro: Vec3,
    pub valid: bool,
}

impl Default for FusedState {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            accel: Vec3::ZERO,
            mag: Vec3::ZERO,
            gyro: Vec3::ZERO,
            valid: false,
        }
    }
}

/// Everything the pipeline shares, passed by `&mut` to every stage.
pub struct FusionContext {
    /// Channels this build runs with, resolved once from configuration.
    pub capabilities: ChannelSet,
    pub accel: ChannelState<ACCEL_FIFO_SIZE>,
    pub mag: ChannelState<MAG_FIFO_SIZE>,
    pub gyro: ChannelState<GYRO_FIFO_SIZE>,
    pub thermal: ThermalState,
    pub fused: FusedState,
    pub status: StatusSubsystem,
    pub loop_counter: u32,
    /// Rotation applied once by the next perturbation step.
    pub perturbation: Option<Quat>,
    pub reset_requested: bool,
}

impl FusionContext {
    pub fn new(capabilities: ChannelSet, status: StatusSubsystem) -> Self {
        Self {
            capabilities,
            accel: ChannelState::new(),
            mag: ChannelState::new(),
            gyro: ChannelState::new(),
            thermal: ThermalState::default(),
            fused: FusedState::default(),
            status,
            loop_counter: 0,
            perturbation: None,
            reset_requested: false,
        }
    }

    /// Channels whose enable flag is currently set.
    pub fn enabled(&self) -> ChannelSet {
        let mut set = ChannelSet::empty();
        set.set(ChannelSet::ACCEL, self.accel.enabled);
        set.set(ChannelSet::MAG, self.mag.enabled);
        set.set(ChannelSet::GYRO, self.gyro.enabled);
        set.set(ChannelSet::THERMAL, self.thermal.enabled);
        set
    }

    pub fn set_enabled(&mut self, channels: ChannelSet, enabled: bool) {
        if channels.contains(ChannelSet::ACCEL) {
            self.accel.enabled = enabled;
        }
        if channels.contains(ChannelSet::MAG) {
            self.mag.enabled = enabled;
        }
        if channels.contains(ChannelSet::GYRO) {
            self.gyro.enabled = enabled;
        }
        if channels.contains(ChannelSet::THERMAL) {
            self.thermal.enabled = enabled;
        }
    }
}
