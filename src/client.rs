//! TCP client driving a [`RoundTripProbe`] over a newline-framed connection.
//!
//! The driver owns the socket and translates tokio events into probe
//! lifecycle calls:
//!
//! - connection established -> `on_connection_opened`
//! - newline-terminated message received -> `on_message_received`
//! - timer expired -> `on_timer_fired`
//! - EOF, read error, probe budget reached or shutdown -> `on_connection_closed`

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock_format::TimestampFormat,
    configuration::Configuration,
    probe::{ProbeSettings, RoundTripProbe, Scheduler, TimerId},
    report::Reporter,
    stats::{OutputFormat, StatsSnapshot},
    time::MonotonicClock,
    transport::ChannelTransport,
};

/// Errors that prevent the client from running a probe session.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot connect to address {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },
}

/// Everything the driver needs besides the socket.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub settings: ProbeSettings,
    /// Stop after this many answered or timed-out probes.
    pub count: Option<u32>,
    pub output_format: OutputFormat,
    pub timestamp_format: TimestampFormat,
    pub quiet: bool,
}

impl ClientOptions {
    pub fn from_configuration(conf: &Configuration) -> Self {
        ClientOptions {
            settings: conf.probe_settings(),
            count: conf.probe_count(),
            output_format: conf.output_format,
            timestamp_format: conf.timestamp_format,
            quiet: conf.quiet,
        }
    }
}

/// Timers backed by spawned tokio sleeps.
///
/// An expired timer posts its id on the channel handed to [`TokioScheduler::new`].
/// Dropping the scheduler aborts every timer still pending.
pub struct TokioScheduler {
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
    fired: UnboundedSender<TimerId>,
}

impl TokioScheduler {
    pub fn new(fired: UnboundedSender<TimerId>) -> Self {
        TokioScheduler {
            next_id: 0,
            timers: HashMap::new(),
            fired,
        }
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerId {
        self.timers.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let fired = self.fired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired.send(id);
        });
        self.timers.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

type TcpProbe = RoundTripProbe<ChannelTransport, MonotonicClock, TokioScheduler, Reporter>;

/// Connects to the configured reflector and probes until done.
pub async fn run_client(
    conf: &Configuration,
    shutdown: CancellationToken,
) -> Result<StatsSnapshot, ClientError> {
    let remote_addr: SocketAddr = (conf.remote_addr, conf.remote_port).into();
    let connect_timeout = Duration::from_millis(conf.connect_timeout);

    let stream = connect(remote_addr, connect_timeout).await?;
    log::info!("Connected to {}", remote_addr);
    if !conf.quiet && matches!(conf.output_format, OutputFormat::Text) {
        println!("connected to server {}", remote_addr);
    }

    let options = ClientOptions::from_configuration(conf);
    Ok(drive_connection(stream, &options, shutdown).await)
}

/// Opens a TCP connection within `timeout`.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, ClientError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                log::warn!("Cannot disable Nagle on {}: {}", addr, e);
            }
            Ok(stream)
        }
        Ok(Err(source)) => Err(ClientError::Connect { addr, source }),
        Err(_) => Err(ClientError::ConnectTimeout { addr, timeout }),
    }
}

/// Runs a probe session over an already connected stream.
///
/// Returns once the peer goes away, the probe budget is spent, a probe
/// cannot be sent, or `shutdown` is cancelled.
pub async fn drive_connection(
    stream: TcpStream,
    options: &ClientOptions,
    shutdown: CancellationToken,
) -> StatsSnapshot {
    let (reader, writer) = stream.into_split();
    // Replies are opaque; framing is on the newline byte only.
    let mut messages = BufReader::new(reader).split(b'\n');

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_lines(writer, out_rx));

    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();

    let mut probe: TcpProbe = RoundTripProbe::new(
        ChannelTransport::new(out_tx),
        MonotonicClock,
        TokioScheduler::new(timer_tx),
        Reporter::new(
            options.output_format,
            options.timestamp_format,
            options.quiet,
        ),
        options.settings.clone(),
    );

    probe.on_connection_opened();

    while !is_done(&probe, options.count) {
        tokio::select! {
            message = messages.next_segment() => {
                match message {
                    Ok(Some(_)) => {
                        probe.on_message_received();
                    }
                    Ok(None) => {
                        log::info!("Connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        eprintln!("Receive error: {}", e);
                        break;
                    }
                }
            }

            Some(id) = timer_rx.recv() => {
                probe.on_timer_fired(id);
            }

            _ = shutdown.cancelled() => {
                log::info!("Shutdown requested");
                break;
            }
        }
    }

    log::info!(
        "Stopped after {} probes, probe {}",
        probe.probes_sent(),
        probe.state()
    );
    let reporter = probe.into_observer();
    // The transport went away with the probe, which lets the writer finish.
    if let Err(e) = writer_task.await {
        log::warn!("Writer task failed: {}", e);
    }

    reporter.snapshot()
}

fn is_done(probe: &TcpProbe, count: Option<u32>) -> bool {
    let reporter = probe.observer();
    if reporter.send_failures() > 0 {
        return true;
    }
    count.is_some_and(|count| reporter.completed() >= count)
}

async fn write_lines(mut writer: OwnedWriteHalf, mut rx: UnboundedReceiver<String>) {
    while let Some(payload) = rx.recv().await {
        let mut line = payload.into_bytes();
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            log::warn!("Failed to write to connection: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_fires_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let id = scheduler.schedule(Duration::from_millis(5));
        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(fired, Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let id = scheduler.schedule(Duration::from_millis(20));
        scheduler.cancel(id);
        scheduler.cancel(id);
        assert_eq!(scheduler.pending(), 0);

        // Paused time jumps straight past the original deadline.
        let fired = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(fired.is_err(), "cancelled timer fired");
    }

    #[tokio::test]
    async fn test_scheduler_drop_aborts_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);
        scheduler.schedule(Duration::from_millis(20));
        scheduler.schedule(Duration::from_millis(30));
        assert_eq!(scheduler.pending(), 2);

        drop(scheduler);

        // All senders are gone once the aborted tasks are dropped.
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_scheduler_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);
        let a = scheduler.schedule(Duration::from_secs(10));
        let b = scheduler.schedule(Duration::from_secs(10));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(addr, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[test]
    fn test_options_from_configuration() {
        let conf = Configuration {
            count: 4,
            timeout: Some(250),
            quiet: true,
            ..Configuration::default()
        };
        let options = ClientOptions::from_configuration(&conf);
        assert_eq!(options.count, Some(4));
        assert_eq!(options.settings.timeout, Some(Duration::from_millis(250)));
        assert!(options.quiet);
    }
}
