use std::error::Error;

use log::{info, warn};

use sfstreamer::{
    bus::I2cBus,
    config::Config,
    context::FusionContext,
    control::TcpControlPort,
    fusion::AhrsEngine,
    sensor::{PhysicalSensor, SensorRegistry},
    status::StatusSubsystem,
    streamer::{Streamer, SystemClock},
};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // read ~/.config/sfstreamer/config.toml unless a path is given
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load(path)?,
        None => match Config::default_path() {
            Some(path) if path.exists() => {
                info!("loading {}", path.display());
                Config::load(path)?
            }
            _ => {
                warn!("no config file, using defaults");
                Config::default()
            }
        },
    };

    let mut registry = SensorRegistry::new();
    for device in &config.devices {
        registry.install_sensor(PhysicalSensor::from_device(
            device,
            config.max_fifo_packets_per_read,
        ))?;
    }

    let bus = I2cBus::open(config.bus)?;
    let control = TcpControlPort::bind(&config.socket_addrs())?;
    let ctx = FusionContext::new(config.capabilities(), StatusSubsystem::default());

    let mut streamer = Streamer::new(
        bus,
        SystemClock::new(),
        registry,
        Box::new(AhrsEngine::new(config.fusion_hz)),
        Box::new(control),
        ctx,
        config.interval_ms(),
    );
    streamer.init()?;
    streamer.run()
}
