//! Latency statistics and the end-of-run summaries.
//!
//! [`LatencyHistory`] accumulates measured round trips. Summaries of both
//! roles are flattened into a list of named fields and rendered as text,
//! JSON or CSV by one shared renderer.

use std::time::Duration;

use serde_json::{json, Map};

/// Output format for statistics reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for machine consumption.
    Json,
    /// CSV output for spreadsheet import.
    Csv,
}

// Smoothing divisor of the running jitter estimate (RFC 3550, 6.4.1).
const JITTER_GAIN: f64 = 16.0;

/// Round trips measured during one session.
///
/// Mean and variance are kept with Welford's update so long runs do not
/// accumulate a sum of squares. Samples are retained for percentiles.
#[derive(Debug, Default)]
pub struct LatencyHistory {
    samples: Vec<Duration>,
    min: Option<Duration>,
    max: Option<Duration>,
    mean_ms: f64,
    m2: f64,
    jitter_ms: f64,
    last: Option<Duration>,
}

impl LatencyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency: Duration) {
        self.min = Some(self.min.map_or(latency, |m| m.min(latency)));
        self.max = Some(self.max.map_or(latency, |m| m.max(latency)));

        let ms = millis(latency);
        self.samples.push(latency);
        let n = self.samples.len() as f64;
        let delta = ms - self.mean_ms;
        self.mean_ms += delta / n;
        self.m2 += delta * (ms - self.mean_ms);

        if let Some(prev) = self.last {
            let d = millis(latency.max(prev) - latency.min(prev));
            self.jitter_ms += (d - self.jitter_ms) / JITTER_GAIN;
        }
        self.last = Some(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.mean_ms)
    }

    /// Population standard deviation in milliseconds.
    pub fn std_dev(&self) -> Option<f64> {
        (self.samples.len() >= 2).then(|| (self.m2 / self.samples.len() as f64).sqrt())
    }

    /// Smoothed variation between consecutive round trips, in milliseconds.
    pub fn jitter(&self) -> Option<f64> {
        (self.samples.len() >= 2).then_some(self.jitter_ms)
    }

    /// Nearest-rank percentile, `p` in `0.0..=100.0`.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.clamp(1, sorted.len()) - 1])
    }

    pub fn snapshot(
        &self,
        probes_sent: u32,
        probes_timed_out: u32,
        send_failures: u32,
    ) -> StatsSnapshot {
        let loss_percent = if probes_sent == 0 {
            0.0
        } else {
            probes_timed_out as f64 / probes_sent as f64 * 100.0
        };

        StatsSnapshot {
            probes_sent,
            replies_received: self.samples.len() as u32,
            probes_timed_out,
            send_failures,
            loss_percent,
            min_rtt_ms: self.min.map(millis),
            max_rtt_ms: self.max.map(millis),
            avg_rtt_ms: self.mean(),
            median_rtt_ms: self.percentile(50.0).map(millis),
            p95_rtt_ms: self.percentile(95.0).map(millis),
            p99_rtt_ms: self.percentile(99.0).map(millis),
            jitter_ms: self.jitter(),
            std_dev_ms: self.std_dev(),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Probe statistics at the end of a client run.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub probes_sent: u32,
    pub replies_received: u32,
    pub probes_timed_out: u32,
    pub send_failures: u32,
    pub loss_percent: f64,
    pub min_rtt_ms: Option<f64>,
    pub max_rtt_ms: Option<f64>,
    pub avg_rtt_ms: Option<f64>,
    pub median_rtt_ms: Option<f64>,
    pub p95_rtt_ms: Option<f64>,
    pub p99_rtt_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub std_dev_ms: Option<f64>,
}

impl StatsSnapshot {
    pub fn print(&self, format: OutputFormat) {
        print!("{}", self.render(format));
    }

    pub fn render(&self, format: OutputFormat) -> String {
        render(
            "summary",
            "Round-Trip Statistics",
            &[
                ("probes_sent", "Probes sent", Value::Count(self.probes_sent.into())),
                (
                    "replies_received",
                    "Replies received",
                    Value::Count(self.replies_received.into()),
                ),
                (
                    "probes_timed_out",
                    "Probes timed out",
                    Value::Count(self.probes_timed_out.into()),
                ),
                (
                    "send_failures",
                    "Send failures",
                    Value::Count(self.send_failures.into()),
                ),
                ("loss_percent", "Loss", Value::Percent(self.loss_percent)),
                ("min_rtt_ms", "Min RTT", Value::Millis(self.min_rtt_ms)),
                ("max_rtt_ms", "Max RTT", Value::Millis(self.max_rtt_ms)),
                ("avg_rtt_ms", "Avg RTT", Value::Millis(self.avg_rtt_ms)),
                ("median_rtt_ms", "Median RTT", Value::Millis(self.median_rtt_ms)),
                ("p95_rtt_ms", "P95 RTT", Value::Millis(self.p95_rtt_ms)),
                ("p99_rtt_ms", "P99 RTT", Value::Millis(self.p99_rtt_ms)),
                ("jitter_ms", "Jitter", Value::Millis(self.jitter_ms)),
                ("std_dev_ms", "Std Dev", Value::Millis(self.std_dev_ms)),
            ],
            format,
        )
    }
}

/// Reflector totals printed at shutdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectorStats {
    pub total_messages_received: u64,
    pub total_replies_sent: u64,
    pub total_replies_dropped: u64,
    pub active_sessions: usize,
    pub sessions_served: u64,
    pub uptime_seconds: f64,
}

impl ReflectorStats {
    pub fn print(&self, format: OutputFormat) {
        print!("{}", self.render(format));
    }

    pub fn render(&self, format: OutputFormat) -> String {
        render(
            "reflector",
            "Reflector Statistics",
            &[
                ("uptime_seconds", "Uptime", Value::Seconds(self.uptime_seconds)),
                (
                    "total_messages_received",
                    "Messages received",
                    Value::Count(self.total_messages_received),
                ),
                (
                    "total_replies_sent",
                    "Replies sent",
                    Value::Count(self.total_replies_sent),
                ),
                (
                    "total_replies_dropped",
                    "Replies dropped",
                    Value::Count(self.total_replies_dropped),
                ),
                (
                    "active_sessions",
                    "Active sessions",
                    Value::Count(self.active_sessions as u64),
                ),
                (
                    "sessions_served",
                    "Sessions served",
                    Value::Count(self.sessions_served),
                ),
            ],
            format,
        )
    }
}

enum Value {
    Count(u64),
    Percent(f64),
    Millis(Option<f64>),
    Seconds(f64),
}

impl Value {
    fn text(&self) -> Option<String> {
        match self {
            Value::Count(n) => Some(n.to_string()),
            Value::Percent(p) => Some(format!("{:.1}%", p)),
            Value::Millis(ms) => ms.map(|ms| format!("{:.3} ms", ms)),
            Value::Seconds(s) => Some(format!("{:.1} s", s)),
        }
    }

    fn csv(&self) -> String {
        match self {
            Value::Count(n) => n.to_string(),
            Value::Percent(p) => format!("{:.2}", p),
            Value::Millis(ms) => ms.map_or_else(String::new, |ms| format!("{:.3}", ms)),
            Value::Seconds(s) => format!("{:.1}", s),
        }
    }

    fn json(&self) -> serde_json::Value {
        match self {
            Value::Count(n) => json!(n),
            Value::Percent(v) | Value::Seconds(v) => json!(v),
            Value::Millis(ms) => json!(ms),
        }
    }
}

type Field = (&'static str, &'static str, Value);

/// Renders `(key, label, value)` fields in the chosen layout.
///
/// Text skips absent measurements; CSV leaves them empty; JSON writes null.
fn render(kind: &str, title: &str, fields: &[Field], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!("\n--- {} ---\n", title);
            for (_, label, value) in fields {
                if let Some(v) = value.text() {
                    out.push_str(&format!("{}: {}\n", label, v));
                }
            }
            out
        }
        OutputFormat::Json => {
            let mut map = Map::new();
            map.insert("type".to_string(), json!(kind));
            for (key, _, value) in fields {
                map.insert(key.to_string(), value.json());
            }
            format!("{}\n", serde_json::Value::Object(map))
        }
        OutputFormat::Csv => {
            let header: Vec<&str> = fields.iter().map(|(key, _, _)| *key).collect();
            let row: Vec<String> = fields.iter().map(|(_, _, value)| value.csv()).collect();
            format!("{}\n{}\n", header.join(","), row.join(","))
        }
    }
}
