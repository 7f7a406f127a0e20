use log::{debug, warn};

use crate::{
    bus::SensorBus,
    config::{Device, SensorModel},
    context::FusionContext,
    driver::{Fxas21002, Fxos8700, ReadStatus, SensorDriver, SensorHandle},
    error::{RegistryError, SensorError},
};

/// Most sensors one board carries.
pub const MAX_SENSORS: usize = 3;

/// A bus-attached device bound to the driver for its family.
pub struct PhysicalSensor {
    handle: SensorHandle,
    driver: Box<dyn SensorDriver>,
}

impl PhysicalSensor {
    pub fn new(address: u8, driver: Box<dyn SensorDriver>) -> Self {
        Self {
            handle: SensorHandle::new(address),
            driver,
        }
    }

    pub fn from_device(device: &Device, max_packets_per_read: usize) -> Self {
        let driver: Box<dyn SensorDriver> = match device.model {
            SensorModel::Fxos8700 => Box::new(Fxos8700::new(device.odr_hz, max_packets_per_read)),
            SensorModel::Fxas21002 => Box::new(Fxas21002::new(device.odr_hz, max_packets_per_read)),
        };
        Self::new(device.addr, driver)
    }

    pub fn handle(&self) -> &SensorHandle {
        &self.handle
    }

    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn init(
        &mut self,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        self.driver.init(&mut self.handle, bus, ctx)
    }

    pub fn read(
        &mut self,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<ReadStatus, SensorError> {
        self.driver.read(&mut self.handle, bus, ctx)
    }

    pub fn idle(
        &mut self,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        self.driver.idle(&mut self.handle, bus, ctx)
    }
}

/// Outcome of one pass over every installed sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReport {
    pub samples: usize,
    pub failures: usize,
}

/// Installed sensors, read in install order.
#[derive(Default)]
pub struct SensorRegistry {
    sensors: heapless::Vec<PhysicalSensor, MAX_SENSORS>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &mut self,
        address: u8,
        driver: Box<dyn SensorDriver>,
    ) -> Result<(), RegistryError> {
        self.install_sensor(PhysicalSensor::new(address, driver))
    }

    pub fn install_sensor(&mut self, sensor: PhysicalSensor) -> Result<(), RegistryError> {
        debug!("installing {} at {:#04x}", sensor.name(), sensor.handle.address);
        self.sensors
            .push(sensor)
            .map_err(|_| RegistryError::Full(MAX_SENSORS))
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &PhysicalSensor> {
        self.sensors.iter()
    }

    /// Initializes every sensor, even after an earlier one failed.
    ///
    /// An identity mismatch from any sensor wins over other failures, otherwise the
    /// first failure is returned.
    pub fn initialize(
        &mut self,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        let mut first = None;
        let mut mismatch = None;
        for sensor in self.sensors.iter_mut() {
            if let Err(err) = sensor.init(bus, ctx) {
                warn!(
                    "{} at {:#04x}: init failed: {}",
                    sensor.name(),
                    sensor.handle.address,
                    err
                );
                if matches!(err, SensorError::IdentityMismatch { .. }) {
                    mismatch.get_or_insert(err);
                }
                first.get_or_insert(err);
            }
        }
        mismatch.or(first).map_or(Ok(()), Err)
    }

    /// Reads every sensor once. Failures are logged, never fatal.
    pub fn read_all(&mut self, bus: &mut dyn SensorBus, ctx: &mut FusionContext) -> ReadReport {
        let mut report = ReadReport::default();
        for sensor in self.sensors.iter_mut() {
            match sensor.read(bus, ctx) {
                Ok(status) => report.samples += status.count(),
                Err(SensorError::NotInitialized) => {
                    report.failures += 1;
                    debug!(
                        "{} at {:#04x}: not initialized",
                        sensor.name(),
                        sensor.handle.address
                    );
                }
                Err(err) => {
                    report.failures += 1;
                    warn!(
                        "{} at {:#04x}: read failed: {}",
                        sensor.name(),
                        sensor.handle.address,
                        err
                    );
                }
            }
        }
        report
    }

    pub fn idle_all(
        &mut self,
        bus: &mut dyn SensorBus,
        ctx: &mut FusionContext,
    ) -> Result<(), SensorError> {
        let mut first = None;
        for sensor in self.sensors.iter_mut() {
            if let Err(err) = sensor.idle(bus, ctx) {
                debug!(
                    "{} at {:#04x}: idle failed: {}",
                    sensor.name(),
                    sensor.handle.address,
                    err
                );
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}


#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::{testing::ScriptedDriver, *};
    use crate::{
        bus::mock::MockBus,
        context::ChannelSet,
        driver::{fxas21002, fxos8700},
        error::BusError,
        status::StatusSubsystem,
    };

    fn ctx() -> FusionContext {
        FusionContext::new(ChannelSet::all(), StatusSubsystem::default())
    }

    #[test]
    fn install_is_bounded() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = SensorRegistry::new();
        for _ in 0..MAX_SENSORS {
            registry
                .install(0x10, Box::new(ScriptedDriver::ok("s", log.clone())))
                .unwrap();
        }
        assert_eq!(
            registry.install(0x10, Box::new(ScriptedDriver::ok("s", log))),
            Err(RegistryError::Full(MAX_SENSORS))
        );
        assert_eq!(registry.len(), MAX_SENSORS);
    }

    #[test]
    fn reads_follow_install_order_and_survive_failures() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut failing = ScriptedDriver::ok("b", log.clone());
        failing.read_result = Err(SensorError::Bus(BusError::Nack));

        let mut registry = SensorRegistry::new();
        registry
            .install(0x10, Box::new(ScriptedDriver::ok("a", log.clone())))
            .unwrap();
        registry.install(0x11, Box::new(failing)).unwrap();
        registry
            .install(0x12, Box::new(ScriptedDriver::ok("c", log.clone())))
            .unwrap();

        let report = registry.read_all(&mut MockBus::new(), &mut ctx());

        assert_eq!(
            report,
            ReadReport {
                samples: 2,
                failures: 1
            }
        );
        assert_eq!(*log.borrow(), vec!["read a", "read b", "read c"]);
    }

    #[test]
    fn initialize_escalates_first_failure_after_trying_all() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut wrong = ScriptedDriver::ok("a", log.clone());
        wrong.init_result = Err(SensorError::IdentityMismatch {
            expected: 0xC7,
            found: 0xFF,
        });
        let mut absent = ScriptedDriver::ok("b", log.clone());
        absent.init_result = Err(SensorError::Bus(BusError::Nack));

        let mut registry = SensorRegistry::new();
        registry.install(0x10, Box::new(wrong)).unwrap();
        registry.install(0x11, Box::new(absent)).unwrap();

        let result = registry.initialize(&mut MockBus::new(), &mut ctx());

        assert_eq!(
            result,
            Err(SensorError::IdentityMismatch {
                expected: 0xC7,
                found: 0xFF
            })
        );
        assert_eq!(*log.borrow(), vec!["init a", "init b"]);
    }

    #[test]
    fn initialize_prefers_a_later_identity_mismatch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut absent = ScriptedDriver::ok("absent", log.clone());
        absent.init_result = Err(SensorError::Bus(BusError::Nack));
        let mut wrong = ScriptedDriver::ok("wrong", log.clone());
        wrong.init_result = Err(SensorError::IdentityMismatch {
            expected: 0xD7,
            found: 0x6A,
        });

        let mut registry = SensorRegistry::new();
        registry.install(0x20, Box::new(absent)).unwrap();
        registry.install(0x21, Box::new(wrong)).unwrap();

        let result = registry.initialize(&mut MockBus::new(), &mut ctx());

        assert_eq!(
            result,
            Err(SensorError::IdentityMismatch {
                expected: 0xD7,
                found: 0x6A
            })
        );
        assert_eq!(*log.borrow(), vec!["init absent", "init wrong"]);
    }

    #[test]
    fn initialize_reports_first_bus_failure_without_mismatch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nack = ScriptedDriver::ok("a", log.clone());
        nack.init_result = Err(SensorError::Bus(BusError::Nack));
        let mut slow = ScriptedDriver::ok("b", log.clone());
        slow.init_result = Err(SensorError::Bus(BusError::Timeout));

        let mut registry = SensorRegistry::new();
        registry.install(0x20, Box::new(nack)).unwrap();
        registry.install(0x21, Box::new(slow)).unwrap();

        assert_eq!(
            registry.initialize(&mut MockBus::new(), &mut ctx()),
            Err(SensorError::Bus(BusError::Nack))
        );
    }

    #[test]
    fn sensors_from_configuration() {
        let mut bus = MockBus::new();
        bus.set_register(fxos8700::DEFAULT_ADDRESS, 0x0D, fxos8700::WHO_AM_I_VALUE);
        bus.set_register(fxas21002::DEFAULT_ADDRESS, 0x0C, fxas21002::WHO_AM_I_VALUE);
        let mut ctx = ctx();

        let mut registry = SensorRegistry::new();
        for device in [
            Device {
                model: SensorModel::Fxos8700,
                addr: fxos8700::DEFAULT_ADDRESS,
                odr_hz: 200,
            },
            Device {
                model: SensorModel::Fxas21002,
                addr: fxas21002::DEFAULT_ADDRESS,
                odr_hz: 200,
            },
        ] {
            registry
                .install_sensor(PhysicalSensor::from_device(&device, 15))
                .unwrap();
        }

        registry.initialize(&mut bus, &mut ctx).unwrap();
        assert_eq!(ctx.enabled(), ChannelSet::all());

        let names: Vec<_> = registry.sensors().map(|s| s.name()).collect();
        assert_eq!(names, vec!["fxos8700", "fxas21002"]);

        registry.idle_all(&mut bus, &mut ctx).unwrap();
        assert!(ctx.enabled().is_empty());
        assert!(registry.idle_all(&mut bus, &mut ctx).is_err());
    }
}
