pub mod config;
pub mod gate;
pub mod input;
pub mod output;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod transport;
