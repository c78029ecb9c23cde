//! Sync and batch progress reporting.
//!
//! Emitted on **stderr** so stdout stays parseable for scripts. Long runs
//! (a full bill sync is tens of thousands of records) report every
//! [`REPORT_EVERY`] records plus once at the end.

use std::io::Write;

/// Records between two `Processing` events.
pub const REPORT_EVERY: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// Paging through an upstream list. Total unknown.
    Fetching { endpoint: String },
    /// `n` of `total` records handled.
    Processing {
        endpoint: String,
        n: u64,
        total: u64,
    },
}

pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);

    /// Report `Processing` on the reporting interval and at the last record.
    fn tick(&self, endpoint: &str, n: u64, total: u64) {
        if n == total || n % REPORT_EVERY == 0 {
            self.report(SyncProgressEvent::Processing {
                endpoint: endpoint.to_string(),
                n,
                total,
            });
        }
    }
}

/// Human-friendly progress: "sync bill  processing  1,200 / 5,000 records".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Fetching { endpoint } => {
                format!("sync {}  fetching...\n", endpoint)
            }
            SyncProgressEvent::Processing { endpoint, n, total } => format!(
                "sync {}  processing  {} / {} records\n",
                endpoint,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Fetching { endpoint } => serde_json::json!({
                "event": "progress",
                "endpoint": endpoint,
                "phase": "fetching"
            }),
            SyncProgressEvent::Processing { endpoint, n, total } => serde_json::json!({
                "event": "progress",
                "endpoint": endpoint,
                "phase": "processing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
