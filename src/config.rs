use std::{
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    context::ChannelSet,
    driver::{fxas21002, fxos8700, DEFAULT_MAX_FIFO_PACKETS_PER_READ, MAX_FIFO_PACKETS},
    sensor::MAX_SENSORS,
};

/// Highest 7-bit bus address.
pub const MAX_BUS_ADDRESS: u8 = 0x7F;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("fusion_hz must be within 1..=1000, got {0}")]
    FusionRate(u16),
    #[error("max_fifo_packets_per_read must be within 1..=32, got {0}")]
    BurstCap(usize),
    #[error("{0} devices configured, at most 3 are supported")]
    TooManyDevices(usize),
    #[error("device address {0:#04x} is not a 7-bit bus address")]
    InvalidAddress(u8),
    #[error("config contains no combination of port and ip addr that the streamer can bind to")]
    NoValidSocketAddrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorModel {
    Fxos8700,
    Fxas21002,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Accel,
    Mag,
    Gyro,
    Thermal,
}

impl From<Channel> for ChannelSet {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Accel => ChannelSet::ACCEL,
            Channel::Mag => ChannelSet::MAG,
            Channel::Gyro => ChannelSet::GYRO,
            Channel::Thermal => ChannelSet::THERMAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub model: SensorModel,
    pub addr: u8,
    #[serde(default = "default_odr_hz")]
    pub odr_hz: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Stream {
    pub port: u16,
    pub ip_addresses: Vec<IpAddr>,
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            port: 23,
            ip_addresses: vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub fusion_hz: u16,
    pub max_fifo_packets_per_read: usize,
    /// Linux I2C bus number, `/dev/i2c-{bus}`.
    pub bus: u8,
    pub channels: Vec<Channel>,
    pub devices: Vec<Device>,
    pub stream: Stream,
}

fn default_odr_hz() -> u16 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fusion_hz: 40,
            max_fifo_packets_per_read: DEFAULT_MAX_FIFO_PACKETS_PER_READ,
            bus: 1,
            channels: vec![Channel::Accel, Channel::Mag, Channel::Gyro, Channel::Thermal],
            devices: vec![
                Device {
                    model: SensorModel::Fxos8700,
                    addr: fxos8700::DEFAULT_ADDRESS,
                    odr_hz: default_odr_hz(),
                },
                Device {
                    model: SensorModel::Fxas21002,
                    addr: fxas21002::DEFAULT_ADDRESS,
                    odr_hz: default_odr_hz(),
                },
            ],
            stream: Stream::default(),
        }
    }
}

impl Config {
    /// `~/.config/sfstreamer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("sfstreamer")
                .join("config.toml"),
        )
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.fusion_hz) {
            return Err(ConfigError::FusionRate(self.fusion_hz));
        }
        if !(1..=MAX_FIFO_PACKETS).contains(&self.max_fifo_packets_per_read) {
            return Err(ConfigError::BurstCap(self.max_fifo_packets_per_read));
        }
        if self.devices.len() > MAX_SENSORS {
            return Err(ConfigError::TooManyDevices(self.devices.len()));
        }
        if let Some(device) = self.devices.iter().find(|d| d.addr > MAX_BUS_ADDRESS) {
            return Err(ConfigError::InvalidAddress(device.addr));
        }
        if self.stream.ip_addresses.is_empty() {
            return Err(ConfigError::NoValidSocketAddrs);
        }
        Ok(())
    }

    /// Channels the pipeline runs with.
    pub fn capabilities(&self) -> ChannelSet {
        self.channels
            .iter()
            .fold(ChannelSet::empty(), |set, &channel| set | channel.into())
    }

    pub fn interval_ms(&self) -> u64 {
        1000 / u64::from(self.fusion_hz.max(1))
    }

    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        self.stream
            .ip_addresses
            .iter()
            .map(|&ip| SocketAddr::new(ip, self.stream.port))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.interval_ms(), 25);
        assert_eq!(config.capabilities(), ChannelSet::all());
        assert_eq!(config.socket_addrs(), vec!["0.0.0.0:23".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn full_file() {
        let config = Config::parse(
            r#"
            fusion_hz = 100
            max_fifo_packets_per_read = 8
            bus = 3
            channels = ["accel", "mag"]

            [[devices]]
            model = "fxos8700"
            addr = 0x1E
            odr_hz = 400

            [stream]
            port = 9000
            ip_addresses = ["127.0.0.1", "::1"]
            "#,
        )
        .unwrap();

        assert_eq!(config.interval_ms(), 10);
        assert_eq!(config.bus, 3);
        assert_eq!(config.capabilities(), ChannelSet::ACCEL | ChannelSet::MAG);
        assert_eq!(
            config.devices,
            vec![Device {
                model: SensorModel::Fxos8700,
                addr: 0x1E,
                odr_hz: 400,
            }]
        );
        assert_eq!(config.socket_addrs().len(), 2);
        assert_eq!(config.socket_addrs()[0].port(), 9000);
    }

    #[test]
    fn odr_defaults_per_device() {
        let config = Config::parse(
            r#"
            [[devices]]
            model = "fxas21002"
            addr = 0x21
            "#,
        )
        .unwrap();
        assert_eq!(config.devices[0].odr_hz, 200);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            Config::parse("fusion_hz = 0"),
            Err(ConfigError::FusionRate(0))
        ));
        assert!(matches!(
            Config::parse("max_fifo_packets_per_read = 33"),
            Err(ConfigError::BurstCap(33))
        ));
        assert!(matches!(
            Config::parse("[stream]\nip_addresses = []"),
            Err(ConfigError::NoValidSocketAddrs)
        ));
    }

    #[test]
    fn rejects_addresses_past_seven_bits() {
        assert!(matches!(
            Config::parse("[[devices]]\nmodel = \"fxas21002\"\naddr = 0x80"),
            Err(ConfigError::InvalidAddress(0x80))
        ));
        Config::parse("[[devices]]\nmodel = \"fxas21002\"\naddr = 0x7F").unwrap();
    }

    #[test]
    fn rejects_too_many_devices() {
        let devices = "[[devices]]\nmodel = \"fxos8700\"\naddr = 0x1F\n".repeat(MAX_SENSORS + 1);
        assert!(matches!(
            Config::parse(&devices),
            Err(ConfigError::TooManyDevices(n)) if n == MAX_SENSORS + 1
        ));
    }

    #[test]
    fn rejects_unknown_models_and_keys() {
        assert!(matches!(
            Config::parse("[[devices]]\nmodel = \"mpu6050\"\naddr = 0x68"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(Config::parse("port = 23"), Err(ConfigError::Parse(_))));
    }
}
