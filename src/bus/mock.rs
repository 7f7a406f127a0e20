//! Transaction-recording bus for tests.

use std::collections::{HashMap, VecDeque};

use super::{BusError, RegisterRead, RegisterWrite, SensorBus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusTransaction {
    Read { address: u8, reg: u8, len: usize },
    Write { address: u8, reg: u8, value: u8 },
}

/// Register file per address plus scripted byte streams.
///
/// A read of a register that has a stream queued consumes bytes from the stream
/// (short streams fail with `ShortRead`); otherwise it returns consecutive registers
/// from the register file, zero when unset.
#[derive(Debug, Default)]
pub struct MockBus {
    registers: HashMap<(u8, u8), u8>,
    streams: HashMap<(u8, u8), VecDeque<u8>>,
    faults: HashMap<(u8, u8), BusError>,
    transactions: Vec<BusTransaction>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_register(&mut self, address: u8, reg: u8, value: u8) {
        self.registers.insert((address, reg), value);
    }

    pub fn register(&self, address: u8, reg: u8) -> u8 {
        self.registers.get(&(address, reg)).copied().unwrap_or(0)
    }

    pub fn push_stream(&mut self, address: u8, reg: u8, bytes: &[u8]) {
        self.streams
            .entry((address, reg))
            .or_default()
            .extend(bytes.iter().copied());
    }

    /// The next transaction touching `reg` fails with `err`.
    pub fn fail_next(&mut self, address: u8, reg: u8, err: BusError) {
        self.faults.insert((address, reg), err);
    }

    pub fn transactions(&self) -> &[BusTransaction] {
        &self.transactions
    }

    pub fn reads(&self) -> Vec<(u8, usize)> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                BusTransaction::Read { reg, len, .. } => Some((*reg, *len)),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                BusTransaction::Write { reg, value, .. } => Some((*reg, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_transactions(&mut self) {
        self.transactions.clear();
    }

    fn check_fault(&mut self, address: u8, reg: u8) -> Result<(), BusError> {
        match self.faults.remove(&(address, reg)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl SensorBus for MockBus {
    fn read(
        &mut self,
        address: u8,
        list: &[RegisterRead],
        buffer: &mut [u8],
    ) -> Result<(), BusError> {
        let mut offset = 0;
        for entry in list {
            self.transactions.push(BusTransaction::Read {
                address,
                reg: entry.reg,
                len: entry.len,
            });
            self.check_fault(address, entry.reg)?;

            let dest = buffer
                .get_mut(offset..offset + entry.len)
                .ok_or(BusError::ShortRead)?;

            match self.streams.get_mut(&(address, entry.reg)) {
                Some(stream) if !stream.is_empty() => {
                    if stream.len() < entry.len {
                        stream.clear();
                        return Err(BusError::ShortRead);
                    }
                    for b in dest.iter_mut() {
                        *b = stream.pop_front().unwrap_or_default();
                    }
                }
                _ => {
                    for (i, b) in dest.iter_mut().enumerate() {
                        let reg = entry.reg.wrapping_add(i as u8);
                        *b = self.registers.get(&(address, reg)).copied().unwrap_or(0);
                    }
                }
            }
            offset += entry.len;
        }
        Ok(())
    }

    fn write(&mut self, address: u8, list: &[RegisterWrite]) -> Result<(), BusError> {
        for entry in list {
            self.check_fault(address, entry.reg)?;
            let value = entry.merge(self.register(address, entry.reg));
            self.transactions.push(BusTransaction::Write {
                address,
                reg: entry.reg,
                value,
            });
            self.set_register(address, entry.reg, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_takes_precedence_over_register_file() {
        let mut bus = MockBus::new();
        bus.set_register(0x1F, 0x00, 0x05);
        bus.push_stream(0x1F, 0x00, &[0x25]);

        assert_eq!(bus.read_register(0x1F, 0x00), Ok(0x25));
        assert_eq!(bus.read_register(0x1F, 0x00), Ok(0x05));
        assert_eq!(bus.reads(), vec![(0x00, 1), (0x00, 1)]);
    }

    #[test]
    fn fault_fires_once() {
        let mut bus = MockBus::new();
        bus.fail_next(0x1F, 0x0D, BusError::Timeout);
        assert_eq!(bus.read_register(0x1F, 0x0D), Err(BusError::Timeout));
        assert_eq!(bus.read_register(0x1F, 0x0D), Ok(0));
    }
}
