//! Round-trip probe state machine.
//!
//! [`RoundTripProbe`] performs no I/O of its own. The host feeds it
//! connection lifecycle events and timer expirations; the probe reacts by
//! sending through its [`Transport`], asking its [`Scheduler`] for timers and
//! reporting measurements to its [`ProbeObserver`].
//!
//! At most one probe is outstanding at any time:
//!
//! ```text
//! open -> send -> (reply) -> report -> wait interval -> send -> ...
//! ```

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::{
    time::Clock,
    transport::{Transport, TransportError},
};

/// Payload sent when none is configured.
pub const DEFAULT_PAYLOAD: &str = "ping";

/// Delay between a reply and the next probe when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Identifies a timer handed out by a [`Scheduler`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Deferred wake-ups with cancellation.
///
/// When a scheduled timer expires the host must call
/// [`RoundTripProbe::on_timer_fired`] with its id. Cancelling an unknown or
/// already expired id must be a no-op.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId;
    fn cancel(&mut self, id: TimerId);
}

/// A completed round-trip measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyReport {
    /// Sequence number of the answered probe, starting at 1. After
    /// `u32::MAX` it wraps back to 1.
    pub seq: u32,
    /// Time between transmit and reply.
    pub latency: Duration,
}

/// Receives everything the probe measures or fails at.
pub trait ProbeObserver {
    /// A probe payload was handed to the transport.
    fn on_probe_sent(&mut self, _seq: u32) {}

    /// A reply matched the outstanding probe.
    fn on_latency(&mut self, report: &LatencyReport);

    /// The transport refused the probe payload. No retry follows.
    fn on_send_failure(&mut self, seq: u32, error: &TransportError);

    /// The outstanding probe was not answered within the configured timeout.
    fn on_timeout(&mut self, _seq: u32, _waited: Duration) {}
}

/// Externally visible state of a [`RoundTripProbe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProbeState {
    /// No probe outstanding: not yet opened, waiting out the interval, or
    /// stalled after a send failure.
    Idle,
    /// A probe was sent and its reply has not arrived.
    ProbeOutstanding,
    /// The connection is gone; nothing else will be sent.
    Closed,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProbeState::Idle => write!(f, "idle"),
            ProbeState::ProbeOutstanding => write!(f, "outstanding"),
            ProbeState::Closed => write!(f, "closed"),
        }
    }
}

/// Tunables of a [`RoundTripProbe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Delay between a reply (or timeout) and the next probe.
    pub interval: Duration,
    /// How long to wait for a reply. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Message body of each probe.
    pub payload: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            interval: DEFAULT_INTERVAL,
            timeout: None,
            payload: DEFAULT_PAYLOAD.to_string(),
        }
    }
}

/// Per-connection probe bookkeeping. Lives from open to close.
#[derive(Debug)]
struct Probe {
    /// Set at transmit, cleared when the reply is consumed.
    sent_at: Option<Instant>,
    interval: Duration,
    seq: u32,
}

impl Probe {
    fn new(interval: Duration) -> Self {
        Probe {
            sent_at: None,
            interval,
            seq: 0,
        }
    }

    fn is_active(&self) -> bool {
        self.sent_at.is_some()
    }
}

/// Measures round-trip latency with strict request/response alternation.
pub struct RoundTripProbe<T, C, S, O> {
    transport: T,
    clock: C,
    scheduler: S,
    observer: O,
    settings: ProbeSettings,
    probe: Option<Probe>,
    closed: bool,
    resend_timer: Option<TimerId>,
    timeout_timer: Option<TimerId>,
}

impl<T, C, S, O> RoundTripProbe<T, C, S, O>
where
    T: Transport,
    C: Clock,
    S: Scheduler,
    O: ProbeObserver,
{
    pub fn new(transport: T, clock: C, scheduler: S, observer: O, settings: ProbeSettings) -> Self {
        RoundTripProbe {
            transport,
            clock,
            scheduler,
            observer,
            settings,
            probe: None,
            closed: false,
            resend_timer: None,
            timeout_timer: None,
        }
    }

    pub fn state(&self) -> ProbeState {
        match &self.probe {
            _ if self.closed => ProbeState::Closed,
            Some(probe) if probe.is_active() => ProbeState::ProbeOutstanding,
            _ => ProbeState::Idle,
        }
    }

    /// Sequence number of the latest probe. Zero before open and after close.
    pub fn probes_sent(&self) -> u32 {
        self.probe.as_ref().map_or(0, |p| p.seq)
    }

    /// Returns true while a resend or timeout timer is waiting to fire.
    pub fn has_pending_timer(&self) -> bool {
        self.resend_timer.is_some() || self.timeout_timer.is_some()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Tears the probe down and hands the observer back.
    pub fn into_observer(mut self) -> O {
        self.on_connection_closed();
        self.observer
    }

    /// The transport became usable: create the probe and send the first one.
    pub fn on_connection_opened(&mut self) {
        if self.closed {
            log::warn!("Ignoring open notification on a closed probe");
            return;
        }
        if self.probe.is_some() {
            log::warn!("Ignoring duplicate open notification");
            return;
        }

        self.probe = Some(Probe::new(self.settings.interval));
        self.send_probe();
    }

    /// An inbound message arrived. Returns the measured latency, if any.
    pub fn on_message_received(&mut self) -> Option<Duration> {
        let now = self.clock.now();
        if self.closed {
            log::debug!("Ignoring message on a closed probe");
            return None;
        }
        let Some(probe) = self.probe.as_mut() else {
            log::debug!("Ignoring message before the connection opened");
            return None;
        };

        let Some(sent_at) = probe.sent_at.take() else {
            log::debug!("Ignoring stray message, no probe outstanding");
            return None;
        };

        let report = LatencyReport {
            seq: probe.seq,
            latency: now.saturating_duration_since(sent_at),
        };
        let interval = probe.interval;

        if let Some(id) = self.timeout_timer.take() {
            self.scheduler.cancel(id);
        }

        self.observer.on_latency(&report);
        self.resend_timer = Some(self.scheduler.schedule(interval));

        Some(report.latency)
    }

    /// The transport terminated. Safe to call any number of times.
    pub fn on_connection_closed(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(id) = self.resend_timer.take() {
            self.scheduler.cancel(id);
        }
        if let Some(id) = self.timeout_timer.take() {
            self.scheduler.cancel(id);
        }

        if let Some(probe) = self.probe.take() {
            log::debug!("Probe closed after {} probes", probe.seq);
        }
    }

    /// A timer handed out by the scheduler expired.
    ///
    /// Timers that were cancelled, superseded or outlived the connection are
    /// ignored.
    pub fn on_timer_fired(&mut self, id: TimerId) {
        if self.closed {
            return;
        }

        if self.resend_timer == Some(id) {
            self.resend_timer = None;
            self.send_probe();
        } else if self.timeout_timer == Some(id) {
            self.timeout_timer = None;
            self.expire_probe();
        } else {
            log::debug!("Ignoring stale timer {:?}", id);
        }
    }

    fn send_probe(&mut self) {
        let Some(probe) = self.probe.as_mut() else {
            return;
        };

        // Zero is reserved for "nothing sent yet".
        probe.seq = probe.seq.checked_add(1).unwrap_or(1);
        probe.sent_at = Some(self.clock.now());
        let seq = probe.seq;

        match self.transport.send(&self.settings.payload) {
            Ok(()) => {
                self.observer.on_probe_sent(seq);
                if let Some(timeout) = self.settings.timeout {
                    self.timeout_timer = Some(self.scheduler.schedule(timeout));
                }
            }
            Err(e) => {
                probe.sent_at = None;
                log::debug!("Probe {} not sent: {}", seq, e);
                self.observer.on_send_failure(seq, &e);
            }
        }
    }

    fn expire_probe(&mut self) {
        let now = self.clock.now();
        let Some(probe) = self.probe.as_mut() else {
            return;
        };
        let Some(sent_at) = probe.sent_at.take() else {
            return;
        };

        let seq = probe.seq;
        let interval = probe.interval;
        self.observer
            .on_timeout(seq, now.saturating_duration_since(sent_at));
        self.resend_timer = Some(self.scheduler.schedule(interval));
    }
}
