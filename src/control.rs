//! Outbound telemetry and inbound commands.

use std::{fmt::Write as _, io, str::FromStr};

use glam::{EulerRot, Quat, Vec3};
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    config::ConfigError,
    connection_listener::{Connection, ConnectionListener},
    context::FusionContext,
    status::StatusLevel,
};

/// Transport the control loop talks through, once per cycle in this order.
pub trait ControlPort {
    /// Builds the outbound packet from the current state.
    fn stream(&mut self, ctx: &FusionContext);

    /// Sends whatever is queued.
    fn write(&mut self) -> io::Result<()>;

    /// Takes and applies pending commands.
    fn read_commands(&mut self, ctx: &mut FusionContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Reset,
    Perturb { axis: Axis, degrees: f32 },
    Status,
    Stream(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("bad argument `{0}`")]
    BadArgument(String),
    #[error("missing argument")]
    MissingArgument,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;
        let mut arg = || words.next().ok_or(CommandError::MissingArgument);

        let command = match name.to_ascii_lowercase().as_str() {
            "reset" => Command::Reset,
            "status" => Command::Status,
            "stream" => match arg()? {
                "on" => Command::Stream(true),
                "off" => Command::Stream(false),
                other => return Err(CommandError::BadArgument(other.to_owned())),
            },
            "perturb" => {
                let axis = match arg()? {
                    "x" | "X" => Axis::X,
                    "y" | "Y" => Axis::Y,
                    "z" | "Z" => Axis::Z,
                    other => return Err(CommandError::BadArgument(other.to_owned())),
                };
                let raw = arg()?;
                let degrees = raw
                    .parse::<f32>()
                    .ok()
                    .filter(|d| d.is_finite())
                    .ok_or_else(|| CommandError::BadArgument(raw.to_owned()))?;
                Command::Perturb { axis, degrees }
            }
            _ => return Err(CommandError::Unknown(name.to_owned())),
        };
        Ok(command)
    }
}

impl Command {
    /// Applies the part of the command that lives in the shared context.
    pub fn apply(&self, ctx: &mut FusionContext) {
        match *self {
            Command::Reset => ctx.reset_requested = true,
            Command::Perturb { axis, degrees } => {
                let angle = degrees.to_radians();
                let rotation = match axis {
                    Axis::X => Quat::from_rotation_x(angle),
                    Axis::Y => Quat::from_rotation_y(angle),
                    Axis::Z => Quat::from_rotation_z(angle),
                };
                // several kicks before the next cycle add up
                ctx.perturbation = Some(rotation * ctx.perturbation.unwrap_or(Quat::IDENTITY));
            }
            Command::Status | Command::Stream(_) => {}
        }
    }
}

/// Heading clockwise from north, pitch and roll, in degrees.
fn attitude(orientation: Quat) -> [f32; 3] {
    let (yaw, pitch, roll) = orientation.to_euler(EulerRot::ZYX);
    // world z is up, so turning clockwise is a negative yaw; `+ 0.0` folds -0.0
    [
        (-yaw.to_degrees()).rem_euclid(360.0) + 0.0,
        pitch.to_degrees() + 0.0,
        roll.to_degrees() + 0.0,
    ]
}

/// Dip of the field below the horizontal, in degrees. Zero without both vectors.
fn inclination(accel: Vec3, mag: Vec3) -> f32 {
    let field = mag.length();
    if field == 0.0 || accel.length_squared() == 0.0 {
        return 0.0;
    }
    let up = accel.normalize();
    (-mag.dot(up) / field).clamp(-1.0, 1.0).asin().to_degrees() + 0.0
}

/// One telemetry line: loop count, quaternion, heading/pitch/roll, averaged channels,
/// field strength and inclination, temperature, validity and system status.
pub fn format_packet(ctx: &FusionContext) -> String {
    let f = &ctx.fused;
    let [qx, qy, qz, qw] = f.orientation.to_array();
    let [heading, pitch, roll] = attitude(f.orientation);
    let mut line = format!(
        "{} q {:.5} {:.5} {:.5} {:.5} h {:.1} p {:.1} r {:.1} \
         a {:.4} {:.4} {:.4} m {:.2} {:.2} {:.2} b {:.2} i {:.1} g {:.3} {:.3} {:.3}",
        ctx.loop_counter,
        qw,
        qx,
        qy,
        qz,
        heading,
        pitch,
        roll,
        f.accel.x,
        f.accel.y,
        f.accel.z,
        f.mag.x,
        f.mag.y,
        f.mag.z,
        f.mag.length(),
        inclination(f.accel, f.mag),
        f.gyro.x,
        f.gyro.y,
        f.gyro.z,
    );
    match ctx.thermal.celsius {
        Some(c) if ctx.thermal.enabled => {
            let _ = write!(line, " t {:.2}", c);
        }
        _ => line.push_str(" t -"),
    }
    let _ = write!(
        line,
        " {} s {}",
        if f.valid { "ok" } else { "invalid" },
        ctx.status.current()
    );
    line
}

/// Text line stream for a single TCP client.
pub struct TcpControlPort {
    listener: ConnectionListener,
    client: Option<Connection>,
    streaming: bool,
    outbound: Vec<String>,
}

impl TcpControlPort {
    pub fn bind(addrs: &[std::net::SocketAddr]) -> Result<Self, ConfigError> {
        let listener = ConnectionListener::bind(addrs)?;
        if let Ok(addr) = listener.local_addr() {
            info!("control port listening on {}", addr);
        }
        Ok(Self {
            listener,
            client: None,
            streaming: true,
            outbound: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn accept_clients(&mut self) {
        for mut connection in self.listener.incoming() {
            if self.client.is_some() {
                let _ = connection.send_line("busy");
                debug!("refused {}, a client is already connected", connection.peer_addr());
                continue;
            }
            info!("client {} connected", connection.peer_addr());
            self.client = Some(connection);
        }
    }

    fn drop_client(&mut self, err: &io::Error) {
        if let Some(client) = self.client.take() {
            info!("client {} disconnected: {}", client.peer_addr(), err);
        }
        self.outbound.clear();
    }
}

impl ControlPort for TcpControlPort {
    fn stream(&mut self, ctx: &FusionContext) {
        if self.streaming && self.client.is_some() {
            self.outbound.push(format_packet(ctx));
        }
    }

    fn write(&mut self) -> io::Result<()> {
        self.accept_clients();

        let Some(client) = self.client.as_mut() else {
            self.outbound.clear();
            return Ok(());
        };

        // a full socket keeps the rest queued in the connection
        let result = self
            .outbound
            .drain(..)
            .try_for_each(|line| client.send_line(&line))
            .and_then(|()| client.flush());
        if let Err(err) = &result {
            self.drop_client(err);
        }
        result
    }

    fn read_commands(&mut self, ctx: &mut FusionContext) {
        let Some(client) = self.client.as_mut() else {
            return;
        };

        let lines = match client.read_lines() {
            Ok(lines) => lines,
            Err(err) => {
                self.drop_client(&err);
                return;
            }
        };

        for line in lines.iter().filter(|l| !l.is_empty()) {
            match line.parse::<Command>() {
                Ok(command) => {
                    debug!("command: {:?}", command);
                    ctx.status.queue(StatusLevel::ReceivingWireless);
                    command.apply(ctx);
                    match command {
                        Command::Status => self.outbound.push(format!(
                            "status {} channels {:?}",
                            ctx.status.current(),
                            ctx.enabled()
                        )),
                        Command::Stream(on) => self.streaming = on,
                        _ => {}
                    }
                }
                Err(err) => {
                    warn!("bad command {:?}: {}", line, err);
                    self.outbound.push(format!("error {}", err));
                }
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// Port that logs calls into a shared log and queues nothing.
    pub struct RecordingPort {
        pub log: Rc<RefCell<Vec<String>>>,
        pub fail_writes: bool,
    }

    impl ControlPort for RecordingPort {
        fn stream(&mut self, ctx: &FusionContext) {
            self.log.borrow_mut().push(format!("stream {}", ctx.loop_counter));
        }

        fn write(&mut self) -> io::Result<()> {
            self.log.borrow_mut().push("write".to_owned());
            if self.fail_writes {
                Err(io::ErrorKind::BrokenPipe.into())
            } else {
                Ok(())
            }
        }

        fn read_commands(&mut self, _: &mut FusionContext) {
            self.log.borrow_mut().push("read_commands".to_owned());
        }
    }
}
