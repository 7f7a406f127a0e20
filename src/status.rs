use std::fmt;

use log::info;

/// Status levels, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusLevel {
    Off,
    Initializing,
    LowPower,
    Normal,
    ReceivingWired,
    ReceivingWireless,
    SoftFault,
    HardFault,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusLevel::Off => "off",
            StatusLevel::Initializing => "initializing",
            StatusLevel::LowPower => "low power",
            StatusLevel::Normal => "normal",
            StatusLevel::ReceivingWired => "receiving (wired)",
            StatusLevel::ReceivingWireless => "receiving (wireless)",
            StatusLevel::SoftFault => "soft fault",
            StatusLevel::HardFault => "hard fault",
        })
    }
}

/// Whatever shows the status to a human (an LED on a board).
pub trait StatusIndicator {
    fn render(&mut self, level: StatusLevel);
}

/// Indicator that reports transitions through the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn render(&mut self, level: StatusLevel) {
        info!("status: {}", level);
    }
}

pub struct StatusSubsystem {
    current: StatusLevel,
    pending: StatusLevel,
    indicator: Box<dyn StatusIndicator>,
}

impl StatusSubsystem {
    pub fn new(indicator: Box<dyn StatusIndicator>) -> Self {
        Self {
            current: StatusLevel::Off,
            pending: StatusLevel::Off,
            indicator,
        }
    }

    pub fn current(&self) -> StatusLevel {
        self.current
    }

    pub fn pending(&self) -> StatusLevel {
        self.pending
    }

    /// Queues `level` for the next [`update`](Self::update).
    pub fn queue(&mut self, level: StatusLevel) {
        self.pending = level;
    }

    /// Makes the pending level visible.
    pub fn update(&mut self) {
        if self.pending != self.current {
            self.current = self.pending;
            self.indicator.render(self.current);
        }
    }

    /// Shows `level` right away.
    pub fn set(&mut self, level: StatusLevel) {
        self.pending = level;
        self.current = level;
        self.indicator.render(level);
    }
}

impl Default for StatusSubsystem {
    fn default() -> Self {
        Self::new(Box::new(LogIndicator))
    }
}
