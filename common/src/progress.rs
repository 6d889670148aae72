use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{Level, event, instrument};

/// Counter sharded per thread: writers only touch their own slot, readers sum all of them.
#[derive(Debug, Default)]
pub struct Counter {
    count: thread_local::ThreadLocal<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: u64) {
        self.count
            .get_or_default()
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .sum()
    }
}

#[derive(Debug, Default)]
pub struct ProgressCounter {
    started: Counter,
    finished: Counter,
}

pub struct ProgressGuard<'a> {
    progress: &'a ProgressCounter,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(progress: &'a ProgressCounter) -> Self {
        progress.started.inc();
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.finished.inc();
    }
}

pub struct Status {
    pub started: u64,
    pub finished: u64,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self) -> ProgressGuard<'_> {
        ProgressGuard::new(self)
    }

    #[instrument(skip(self))]
    pub fn get(&self) -> Status {
        // read finished first so that a concurrent start can't make us report an inversion
        let finished = self.finished.get();
        let mut status = Status {
            started: self.started.get(),
            finished,
        };
        if status.finished > status.started {
            event!(
                Level::DEBUG,
                "Progress inversion - started: {}, finished {}",
                status.started,
                status.finished
            );
            status.started = status.finished;
        }
        status
    }
}

pub struct Progress {
    /// Uploads in flight / done
    pub uploads: ProgressCounter,
    pub files_discovered: Counter,
    pub files_uploaded: Counter,
    pub bytes_uploaded: Counter,
    start_time: std::time::Instant,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            uploads: Default::default(),
            files_discovered: Default::default(),
            files_uploaded: Default::default(),
            bytes_uploaded: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_bytes: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_bytes: progress.bytes_uploaded.get(),
            last_update: std::time::Instant::now(),
        }
    }

    pub fn print(&mut self) -> String {
        let time_now = std::time::Instant::now();
        let total_duration_secs = self.progress.get_duration().as_secs_f64();
        let curr_duration_secs = (time_now - self.last_update).as_secs_f64();
        let bytes = self.progress.bytes_uploaded.get();
        let average_bytes_rate = bytes as f64 / total_duration_secs.max(f64::EPSILON);
        let current_bytes_rate =
            bytes.saturating_sub(self.last_bytes) as f64 / curr_duration_secs.max(f64::EPSILON);
        self.last_bytes = bytes;
        self.last_update = time_now;
        let uploads = self.progress.uploads.get();
        let discovered = self.progress.files_discovered.get();
        let uploaded = self.progress.files_uploaded.get();
        format!(
            "---------------------\n\
            FILES:\n\
            discovered: {:>10}\n\
            uploaded:   {:>10}\n\
            in flight:  {:>10}\n\
            pending:    {:>10}\n\
            -----------------------\n\
            UPLOADED:\n\
            average: {:>10}/s\n\
            current: {:>10}/s\n\
            total:   {:>10}",
            discovered,
            uploaded,
            uploads.started - uploads.finished,
            discovered.saturating_sub(uploads.started),
            bytesize::ByteSize(average_bytes_rate as u64),
            bytesize::ByteSize(current_bytes_rate as u64),
            bytesize::ByteSize(bytes),
        )
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Progress bar on a terminal, text updates otherwise
    #[default]
    #[value(alias = "Auto")]
    Auto,
    /// Animated progress bar
    #[value(alias = "ProgressBar")]
    ProgressBar,
    /// Periodic text updates, suitable for logs
    #[value(alias = "TextUpdates")]
    TextUpdates,
}

impl ProgressType {
    /// Resolves `Auto` depending on whether stderr is a terminal.
    pub fn resolve(self) -> Self {
        match self {
            ProgressType::Auto => {
                if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
                    ProgressType::ProgressBar
                } else {
                    ProgressType::TextUpdates
                }
            }
            other => other,
        }
    }

    pub fn default_delay(self) -> std::time::Duration {
        match self.resolve() {
            ProgressType::TextUpdates => std::time::Duration::from_secs(10),
            _ => std::time::Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Human readable delay between updates, e.g. "200ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    pub fn delay(&self) -> anyhow::Result<std::time::Duration> {
        match &self.progress_delay {
            Some(delay) => Ok(humantime::parse_duration(delay)?),
            None => Ok(self.progress_type.default_delay()),
        }
    }
}
