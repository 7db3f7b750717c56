use std::{net::IpAddr, time::Duration};

pub use clap::Parser;
use thiserror::Error;

pub use crate::clock_format::TimestampFormat;
use crate::{probe::ProbeSettings, stats::OutputFormat};

/// Errors detected while validating the command line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Probe interval must be greater than zero")]
    ZeroInterval,
    #[error("Probe timeout must be greater than zero")]
    ZeroTimeout,
    #[error("Connect timeout must be greater than zero")]
    ZeroConnectTimeout,
    #[error("Remote port must not be zero")]
    ZeroRemotePort,
    #[error("{0} must not be empty")]
    EmptyMessage(&'static str),
    #[error("{0} must fit on a single line")]
    MultilineMessage(&'static str),
}

#[derive(Parser, Debug, Clone)]
#[command(author = "Piotr Olszewski", version, about, long_about = None)]
pub struct Configuration {
    /// Remote address of the reflector
    #[arg(short, long, default_value = "127.0.0.1")]
    pub remote_addr: IpAddr,
    /// TCP port of the reflector
    #[arg(short = 'p', long, default_value_t = 5000)]
    pub remote_port: u16,
    /// Local address to listen on in reflector mode
    #[arg(short, long, default_value = "0.0.0.0")]
    pub local_addr: IpAddr,
    /// TCP port to listen on in reflector mode
    #[arg(short = 'o', long, default_value_t = 5000)]
    pub local_port: u16,
    /// Run as reflector instead of client
    #[arg(short = 'i', long)]
    pub is_reflector: bool,
    /// Delay between a reply and the next probe in milliseconds
    #[arg(short = 'd', long, default_value_t = 1000)]
    pub interval: u64,
    /// Give up on an unanswered probe after this many milliseconds (waits forever if unset)
    #[arg(short, long)]
    pub timeout: Option<u64>,
    /// Stop after this many probes have been answered or timed out (0 runs until interrupted)
    #[arg(short, long, default_value_t = 0)]
    pub count: u32,
    /// Connection establishment timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub connect_timeout: u64,
    /// Probe payload sent by the client
    #[arg(long, default_value = "ping")]
    pub payload: String,
    /// Reply sent by the reflector for every received line
    #[arg(long, default_value = "pong")]
    pub reply: String,
    /// Output format for measurements and summaries
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
    /// Format of the wall-clock timestamp attached to each probe record
    #[arg(long, value_enum, default_value_t = TimestampFormat::Rfc3339)]
    pub timestamp_format: TimestampFormat,
    /// Print only the final summary
    #[arg(short, long)]
    pub quiet: bool,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.interval == 0 {
            return Err(ConfigurationError::ZeroInterval);
        }
        if self.timeout == Some(0) {
            return Err(ConfigurationError::ZeroTimeout);
        }
        if self.connect_timeout == 0 {
            return Err(ConfigurationError::ZeroConnectTimeout);
        }
        if !self.is_reflector && self.remote_port == 0 {
            return Err(ConfigurationError::ZeroRemotePort);
        }
        validate_message("Payload", &self.payload)?;
        validate_message("Reply", &self.reply)?;

        Ok(())
    }

    /// Probe tunables derived from the command line.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_millis(self.interval),
            timeout: self.timeout.map(Duration::from_millis),
            payload: self.payload.clone(),
        }
    }

    /// Probe budget, `None` meaning unlimited.
    pub fn probe_count(&self) -> Option<u32> {
        (self.count > 0).then_some(self.count)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            remote_addr: IpAddr::from([127, 0, 0, 1]),
            remote_port: 5000,
            local_addr: IpAddr::from([0, 0, 0, 0]),
            local_port: 5000,
            is_reflector: false,
            interval: 1000,
            timeout: None,
            count: 0,
            connect_timeout: 5000,
            payload: "ping".to_string(),
            reply: "pong".to_string(),
            output_format: OutputFormat::Text,
            timestamp_format: TimestampFormat::Rfc3339,
            quiet: false,
        }
    }
}

// Messages are newline framed on the wire.
fn validate_message(name: &'static str, message: &str) -> Result<(), ConfigurationError> {
    if message.is_empty() {
        return Err(ConfigurationError::EmptyMessage(name));
    }
    if message.contains(['\n', '\r']) {
        return Err(ConfigurationError::MultilineMessage(name));
    }
    Ok(())
}
