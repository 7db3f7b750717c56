//! RTT Probe - round-trip latency measurement over a persistent connection.
//!
//! The client sends a short payload, waits for the reply, reports the
//! round-trip latency and sends the next probe after a fixed interval. Only
//! one probe is ever outstanding. The reflector answers every line it
//! receives, so both ends ship in the same binary.
//!
//! # Usage
//!
//! Run as a client:
//! ```bash
//! rtt-probe --remote-addr 192.168.1.1 --remote-port 5000
//! ```
//!
//! Run as a reflector:
//! ```bash
//! rtt-probe -i --local-addr 0.0.0.0 --local-port 5000
//! ```

/// TCP client driving the probe.
pub mod client;
/// Timestamp format definitions.
pub mod clock_format;
/// Command-line configuration and validation.
pub mod configuration;
/// Round-trip probe state machine.
pub mod probe;
/// TCP reflector.
pub mod reflector;
/// Probe observer printing per-probe records.
pub mod report;
/// Reflector session bookkeeping.
pub mod session;
/// Latency statistics and summaries.
pub mod stats;
/// Clocks and timestamp generation.
pub mod time;
/// Outbound transport abstraction.
pub mod transport;
