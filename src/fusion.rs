//! Orientation estimation stage of the control loop.

use glam::{Quat, Vec3};
use log::{debug, info};

use crate::{
    ahrs::{ecompass, Ahrs},
    context::{ChannelSet, ChannelState, FusedState, FusionContext},
};

/// Consumer of the buffered samples. Called once per cycle, in this order:
/// `condition_samples`, `run_fusion`, `apply_perturbation`.
pub trait FusionEngine {
    fn initialize(&mut self, ctx: &mut FusionContext);

    fn condition_samples(&mut self, ctx: &mut FusionContext);

    fn run_fusion(&mut self, ctx: &mut FusionContext);

    fn apply_perturbation(&mut self, ctx: &mut FusionContext);
}

/// Averages each FIFO into physical units, then runs a Madgwick IMU update when a gyro
/// is enabled or falls back to a tilt-compensated compass.
pub struct AhrsEngine {
    fusion_hz: f32,
    ahrs: Ahrs,
}

impl AhrsEngine {
    pub fn new(fusion_hz: u16) -> Self {
        let fusion_hz = f32::from(fusion_hz.max(1));
        Self {
            fusion_hz,
            ahrs: Ahrs::new(fusion_hz),
        }
    }

    fn reset(&mut self, ctx: &mut FusionContext) {
        self.ahrs = Ahrs::new(self.fusion_hz);
        ctx.fused.orientation = Quat::IDENTITY;
        ctx.fused.valid = false;
        ctx.reset_requested = false;
    }
}

/// Mean of everything buffered since the last call, in physical units.
fn drain_mean<const N: usize>(channel: &mut ChannelState<N>) -> Option<Vec3> {
    let scale = channel.units_per_count();
    let (sum, count) = channel
        .fifo
        .drain()
        .fold((Vec3::ZERO, 0u32), |(sum, count), s| {
            (
                sum + Vec3::new(f32::from(s.x), f32::from(s.y), f32::from(s.z)),
                count + 1,
            )
        });
    (count > 0).then(|| sum / count as f32 * scale)
}

impl FusionEngine for AhrsEngine {
    fn initialize(&mut self, ctx: &mut FusionContext) {
        ctx.accel.fifo.clear();
        ctx.mag.fifo.clear();
        ctx.gyro.fifo.clear();
        ctx.fused = FusedState::default();
        self.reset(ctx);
        info!("fusion engine ready at {} Hz", self.fusion_hz);
    }

    fn condition_samples(&mut self, ctx: &mut FusionContext) {
        // an empty FIFO keeps the previous value
        if let Some(accel) = drain_mean(&mut ctx.accel) {
            ctx.fused.accel = accel;
        }
        if let Some(mag) = drain_mean(&mut ctx.mag) {
            ctx.fused.mag = mag;
        }
        if let Some(gyro) = drain_mean(&mut ctx.gyro) {
            ctx.fused.gyro = gyro;
        }
    }

    fn run_fusion(&mut self, ctx: &mut FusionContext) {
        if ctx.reset_requested {
            debug!("fusion reset");
            self.reset(ctx);
        }

        let enabled = ctx.enabled();
        if enabled.contains(ChannelSet::ACCEL | ChannelSet::GYRO) {
            self.ahrs.update_imu(ctx.fused.gyro, ctx.fused.accel);
            ctx.fused.orientation = self.ahrs.rotation();
            ctx.fused.valid = true;
        } else if enabled.contains(ChannelSet::ACCEL | ChannelSet::MAG) {
            match ecompass(ctx.fused.accel, ctx.fused.mag) {
                Some(q) => {
                    self.ahrs.set_rotation(q);
                    ctx.fused.orientation = q;
                    ctx.fused.valid = true;
                }
                None => ctx.fused.valid = false,
            }
        } else {
            ctx.fused.valid = false;
        }
    }

    fn apply_perturbation(&mut self, ctx: &mut FusionContext) {
        if let Some(rotation) = ctx.perturbation.take() {
            let q = (rotation * ctx.fused.orientation).normalize();
            debug!("perturbing orientation by {:?}", rotation);
            self.ahrs.set_rotation(q);
            ctx.fused.orientation = q;
        }
    }
}
