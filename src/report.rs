//! Probe observer that records measurements and prints one record per probe.

use std::time::Duration;

use crate::{
    clock_format::TimestampFormat,
    probe::{LatencyReport, ProbeObserver},
    stats::{LatencyHistory, OutputFormat, StatsSnapshot},
    time::generate_timestamp,
    transport::TransportError,
};

/// One printed per-probe record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeRecord {
    Reply {
        seq: u32,
        latency_ms: f64,
        timestamp: String,
    },
    Timeout {
        seq: u32,
        waited_ms: f64,
        timestamp: String,
    },
}

impl ProbeRecord {
    fn render(&self, format: OutputFormat) -> Option<String> {
        match (format, self) {
            (OutputFormat::Text, ProbeRecord::Reply { seq, latency_ms, .. }) => {
                Some(format!("seq={} latency is {:.2} ms", seq, latency_ms))
            }
            (OutputFormat::Text, ProbeRecord::Timeout { seq, waited_ms, .. }) => Some(format!(
                "seq={} timed out after {:.2} ms",
                seq, waited_ms
            )),
            (OutputFormat::Json, record) => serde_json::to_string(record).ok(),
            (
                OutputFormat::Csv,
                ProbeRecord::Reply {
                    seq,
                    latency_ms,
                    timestamp,
                },
            ) => Some(format!("reply,{},{:.3},{}", seq, latency_ms, timestamp)),
            (
                OutputFormat::Csv,
                ProbeRecord::Timeout {
                    seq,
                    waited_ms,
                    timestamp,
                },
            ) => Some(format!("timeout,{},{:.3},{}", seq, waited_ms, timestamp)),
        }
    }
}

/// Collects probe outcomes into statistics and optionally prints them.
pub struct Reporter {
    history: LatencyHistory,
    probes_sent: u32,
    probes_timed_out: u32,
    send_failures: u32,
    output_format: OutputFormat,
    timestamp_format: TimestampFormat,
    quiet: bool,
}

impl Reporter {
    pub fn new(output_format: OutputFormat, timestamp_format: TimestampFormat, quiet: bool) -> Self {
        Reporter {
            history: LatencyHistory::new(),
            probes_sent: 0,
            probes_timed_out: 0,
            send_failures: 0,
            output_format,
            timestamp_format,
            quiet,
        }
    }

    /// Probes that have reached a final outcome (answered or timed out).
    pub fn completed(&self) -> u32 {
        self.history.len() as u32 + self.probes_timed_out
    }

    pub fn send_failures(&self) -> u32 {
        self.send_failures
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.history
            .snapshot(self.probes_sent, self.probes_timed_out, self.send_failures)
    }

    fn emit(&self, record: ProbeRecord) {
        if self.quiet {
            return;
        }
        if let Some(line) = record.render(self.output_format) {
            println!("{}", line);
        }
    }
}

impl ProbeObserver for Reporter {
    fn on_probe_sent(&mut self, seq: u32) {
        self.probes_sent += 1;
        log::debug!("Probe {} sent", seq);
    }

    fn on_latency(&mut self, report: &LatencyReport) {
        self.history.record(report.latency);
        self.emit(ProbeRecord::Reply {
            seq: report.seq,
            latency_ms: duration_ms(report.latency),
            timestamp: generate_timestamp(self.timestamp_format),
        });
    }

    fn on_send_failure(&mut self, seq: u32, error: &TransportError) {
        self.send_failures += 1;
        eprintln!("Failed to send probe {}: {}", seq, error);
    }

    fn on_timeout(&mut self, seq: u32, waited: Duration) {
        self.probes_timed_out += 1;
        self.emit(ProbeRecord::Timeout {
            seq,
            waited_ms: duration_ms(waited),
            timestamp: generate_timestamp(self.timestamp_format),
        });
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_reporter() -> Reporter {
        Reporter::new(OutputFormat::Text, TimestampFormat::Unix, true)
    }

    #[test]
    fn test_reporter_counts_outcomes() {
        let mut reporter = quiet_reporter();
        reporter.on_probe_sent(1);
        reporter.on_latency(&LatencyReport {
            seq: 1,
            latency: Duration::from_millis(4),
        });
        reporter.on_probe_sent(2);
        reporter.on_timeout(2, Duration::from_millis(100));
        reporter.on_send_failure(3, &TransportError::Closed);

        assert_eq!(reporter.completed(), 2);
        assert_eq!(reporter.send_failures(), 1);

        let snap = reporter.snapshot();
        assert_eq!(snap.probes_sent, 2);
        assert_eq!(snap.replies_received, 1);
        assert_eq!(snap.probes_timed_out, 1);
        assert_eq!(snap.send_failures, 1);
        assert!((snap.min_rtt_ms.unwrap() - 4.0).abs() < 0.001);
        assert!((snap.loss_percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_reporter_latency_feeds_snapshot() {
        let mut reporter = quiet_reporter();
        for (seq, micros) in [(1, 5_250), (2, 3_000), (3, 4_000)] {
            reporter.on_probe_sent(seq);
            reporter.on_latency(&LatencyReport {
                seq,
                latency: Duration::from_micros(micros),
            });
        }

        let snap = reporter.snapshot();
        assert_eq!(snap.replies_received, 3);
        assert!((snap.min_rtt_ms.unwrap() - 3.0).abs() < 1e-9);
        assert!((snap.max_rtt_ms.unwrap() - 5.25).abs() < 1e-9);
        assert!((snap.median_rtt_ms.unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(snap.loss_percent, 0.0);
    }

    #[test]
    fn test_render_text() {
        let record = ProbeRecord::Reply {
            seq: 3,
            latency_ms: 5.0,
            timestamp: "0".to_string(),
        };
        assert_eq!(
            record.render(OutputFormat::Text).unwrap(),
            "seq=3 latency is 5.00 ms"
        );

        let record = ProbeRecord::Timeout {
            seq: 4,
            waited_ms: 100.0,
            timestamp: "0".to_string(),
        };
        assert_eq!(
            record.render(OutputFormat::Text).unwrap(),
            "seq=4 timed out after 100.00 ms"
        );
    }

    #[test]
    fn test_render_json() {
        let record = ProbeRecord::Reply {
            seq: 3,
            latency_ms: 5.5,
            timestamp: "1700000000000".to_string(),
        };
        let json = record.render(OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "reply");
        assert_eq!(value["seq"], 3);
        assert_eq!(value["latency_ms"], 5.5);
        assert_eq!(value["timestamp"], "1700000000000");
    }

    #[test]
    fn test_render_csv() {
        let record = ProbeRecord::Timeout {
            seq: 9,
            waited_ms: 50.0,
            timestamp: "42".to_string(),
        };
        assert_eq!(
            record.render(OutputFormat::Csv).unwrap(),
            "timeout,9,50.000,42"
        );
    }
}
