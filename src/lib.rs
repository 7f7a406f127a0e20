pub mod ahrs;
pub mod bus;
pub mod config;
pub mod connection_listener;
pub mod context;
pub mod control;
pub mod driver;
pub mod error;
pub mod fifo;
pub mod fusion;
pub mod sample;
pub mod sensor;
pub mod status;
pub mod streamer;
