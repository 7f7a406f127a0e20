use std::{fmt::Debug, io::ErrorKind};

use embedded_hal::blocking::i2c::{Write, WriteRead};
use linux_embedded_hal::{i2cdev::linux::LinuxI2CError, I2cdev};
use log::trace;

use super::{read_len, BusError, RegisterRead, RegisterWrite, SensorBus};

/// Maps a HAL specific I2C error onto the bus error kinds.
pub trait IntoBusError {
    fn into_bus_error(self) -> BusError;
}

impl IntoBusError for LinuxI2CError {
    fn into_bus_error(self) -> BusError {
        let err: std::io::Error = self.into();
        match err.kind() {
            ErrorKind::TimedOut => BusError::Timeout,
            _ => BusError::Nack,
        }
    }
}

/// `SensorBus` over any blocking embedded-hal I2C peripheral.
pub struct I2cBus<I2C> {
    i2c: I2C,
}

impl I2cBus<I2cdev> {
    pub fn open(bus: u8) -> Result<Self, LinuxI2CError> {
        Ok(Self::new(I2cdev::new(format!("/dev/i2c-{}", bus))?))
    }
}

impl<I2C> I2cBus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> SensorBus for I2cBus<I2C>
where
    I2C: WriteRead<Error = E> + Write<Error = E>,
    E: IntoBusError + Debug,
{
    fn read(
        &mut self,
        address: u8,
        list: &[RegisterRead],
        buffer: &mut [u8],
    ) -> Result<(), BusError> {
        if buffer.len() < read_len(list) {
            return Err(BusError::ShortRead);
        }

        let mut offset = 0;
        for entry in list {
            let dest = &mut buffer[offset..offset + entry.len];
            self.i2c
                .write_read(address, &[entry.reg], dest)
                .map_err(IntoBusError::into_bus_error)?;
            offset += entry.len;
        }
        Ok(())
    }

    fn write(&mut self, address: u8, list: &[RegisterWrite]) -> Result<(), BusError> {
        for entry in list {
            let value = if entry.needs_current() {
                let mut current = [0u8];
                self.i2c
                    .write_read(address, &[entry.reg], &mut current)
                    .map_err(IntoBusError::into_bus_error)?;
                entry.merge(current[0])
            } else {
                entry.value
            };

            trace!("write {:#04x}[{:#04x}] = {:#04x}", address, entry.reg, value);
            self.i2c
                .write(address, &[entry.reg, value])
                .map_err(IntoBusError::into_bus_error)?;
        }
        Ok(())
    }
}
