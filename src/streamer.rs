use std::time::{Duration, Instant};

use log::{info, trace, warn};

use crate::{
    bus::SensorBus,
    context::FusionContext,
    control::ControlPort,
    error::SensorError,
    fusion::FusionEngine,
    sensor::SensorRegistry,
    status::StatusLevel,
};

/// Status is refreshed on every 4th cycle.
pub const STATUS_UPDATE_CYCLES: u32 = 4;

/// Monotonic millisecond time source.
pub trait Clock {
    fn millis(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Fixed-period control loop: read, fuse, report, listen.
pub struct Streamer<B, C> {
    bus: B,
    clock: C,
    registry: SensorRegistry,
    engine: Box<dyn FusionEngine>,
    control: Box<dyn ControlPort>,
    ctx: FusionContext,
    interval_ms: u64,
    last_call: u64,
}

impl<B: SensorBus, C: Clock> Streamer<B, C> {
    pub fn new(
        bus: B,
        clock: C,
        registry: SensorRegistry,
        engine: Box<dyn FusionEngine>,
        control: Box<dyn ControlPort>,
        ctx: FusionContext,
        interval_ms: u64,
    ) -> Self {
        let last_call = clock.millis();
        Self {
            bus,
            clock,
            registry,
            engine,
            control,
            ctx,
            interval_ms: interval_ms.max(1),
            last_call,
        }
    }

    /// Brings the sensors and the engine up. Identity mismatches are fatal,
    /// any other failure leaves that sensor out of the loop.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.ctx.status.set(StatusLevel::Initializing);
        match self.registry.initialize(&mut self.bus, &mut self.ctx) {
            Err(err @ SensorError::IdentityMismatch { .. }) => {
                self.ctx.status.set(StatusLevel::HardFault);
                return Err(err);
            }
            Err(err) => warn!("continuing without a sensor: {}", err),
            Ok(()) => {}
        }
        self.engine.initialize(&mut self.ctx);
        self.ctx.status.set(StatusLevel::Normal);
        self.last_call = self.clock.millis();
        info!(
            "control loop every {} ms over {} sensors, channels {:?}",
            self.interval_ms,
            self.registry.len(),
            self.ctx.enabled()
        );
        Ok(())
    }

    pub fn context(&self) -> &FusionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut FusionContext {
        &mut self.ctx
    }

    /// Time the next cycle becomes due.
    pub fn next_deadline(&self) -> u64 {
        self.last_call + self.interval_ms
    }

    /// Runs one cycle if it is due.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.millis();
        if now.saturating_sub(self.last_call) <= self.interval_ms {
            return false;
        }
        // anchored to the schedule, not to `now`, so short overruns don't drift
        self.last_call += self.interval_ms;
        self.run_cycle();
        true
    }

    fn run_cycle(&mut self) {
        let report = self.registry.read_all(&mut self.bus, &mut self.ctx);
        if report.failures > 0 {
            self.ctx.status.queue(StatusLevel::SoftFault);
        }
        trace!("cycle {}: {:?}", self.ctx.loop_counter, report);

        self.engine.condition_samples(&mut self.ctx);
        self.engine.run_fusion(&mut self.ctx);
        self.engine.apply_perturbation(&mut self.ctx);

        self.ctx.loop_counter = self.ctx.loop_counter.wrapping_add(1);
        if self.ctx.loop_counter % STATUS_UPDATE_CYCLES == 0 {
            self.ctx.status.update();
        }
        self.ctx.status.queue(StatusLevel::Normal);

        self.control.stream(&self.ctx);
        if let Err(err) = self.control.write() {
            warn!("control port write failed: {}", err);
        }
        self.control.read_commands(&mut self.ctx);
    }

    pub fn run(mut self) -> ! {
        loop {
            if !self.poll() {
                let now = self.clock.millis();
                // due once strictly past the deadline
                let wait = (self.next_deadline() + 1).saturating_sub(now);
                self.clock.sleep_ms(wait.max(1));
            }
        }
    }
}
