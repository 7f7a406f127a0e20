mod i2c;
#[cfg(test)]
pub mod mock;

pub use i2c::{I2cBus, IntoBusError};

pub use crate::error::BusError;

/// One entry of a read list: `len` bytes starting at `reg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRead {
    pub reg: u8,
    pub len: usize,
}

impl RegisterRead {
    pub const fn new(reg: u8, len: usize) -> Self {
        Self { reg, len }
    }

    /// Descriptor for a burst of `packets` records of `packet_len` bytes each.
    pub const fn burst(reg: u8, packets: usize, packet_len: usize) -> Self {
        Self::new(reg, packets * packet_len)
    }
}

/// One entry of a write list.
///
/// A zero `mask` writes `value` as is. A non-zero `mask` marks the bits that keep
/// their current content, the rest come from `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub reg: u8,
    pub value: u8,
    pub mask: u8,
}

impl RegisterWrite {
    pub const fn new(reg: u8, value: u8) -> Self {
        Self {
            reg,
            value,
            mask: 0,
        }
    }

    pub const fn masked(reg: u8, value: u8, mask: u8) -> Self {
        Self { reg, value, mask }
    }

    pub const fn needs_current(&self) -> bool {
        self.mask != 0
    }

    /// Byte to put on the bus given the register's current content.
    pub const fn merge(&self, current: u8) -> u8 {
        if self.mask == 0 {
            self.value
        } else {
            (current & self.mask) | (self.value & !self.mask)
        }
    }
}

/// Total number of bytes a read list produces.
pub fn read_len(list: &[RegisterRead]) -> usize {
    list.iter().map(|r| r.len).sum()
}

/// Register-oriented bus shared by every installed sensor.
pub trait SensorBus {
    /// Runs every descriptor in order, filling `buffer` back to back.
    fn read(
        &mut self,
        address: u8,
        list: &[RegisterRead],
        buffer: &mut [u8],
    ) -> Result<(), BusError>;

    fn write(&mut self, address: u8, list: &[RegisterWrite]) -> Result<(), BusError>;

    fn read_register(&mut self, address: u8, reg: u8) -> Result<u8, BusError> {
        let mut buf = [0u8];
        self.read(address, &[RegisterRead::new(reg, 1)], &mut buf)?;
        Ok(buf[0])
    }
}
