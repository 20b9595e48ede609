//! File recorders for samples and host resources.
//!
//! Each run starts a fresh file with a header. Write failures are logged
//! and never reach the load generator. Sample records are handed to a
//! writer thread over a bounded channel so producers never touch the file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use livegate_core::{ResourceSnapshot, Sample};
use livegate_export::{JtlWriter, ResourceCsvWriter};
use livegate_resources::SnapshotCallback;

use crate::listener::RunListener;

/// Samples buffered between producers and the writer thread.
const SAMPLE_QUEUE_CAPACITY: usize = 65_536;

/// Writes every sample of a run to a JTL file.
///
/// `on_sample` only enqueues; a full queue drops the record and counts it.
pub struct JtlRecorder {
    path: PathBuf,
    sender: ArcSwapOption<mpsc::Sender<Sample>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl JtlRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sender: ArcSwapOption::empty(),
            writer: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records dropped in the current run because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn spawn_writer(&self, file: File, mut rx: mpsc::Receiver<Sample>) -> std::io::Result<JoinHandle<()>> {
        let path = self.path.clone();
        std::thread::Builder::new()
            .name("livegate-jtl-writer".to_string())
            .spawn(move || {
                let mut writer = JtlWriter::new(BufWriter::new(file));
                let mut written = 0u64;
                while let Some(sample) = rx.blocking_recv() {
                    match writer.write_sample(&sample) {
                        Ok(()) => written += 1,
                        Err(e) => warn!(path = %path.display(), error = %e, "failed to record sample"),
                    }
                }
                if let Err(e) = writer.flush() {
                    warn!(path = %path.display(), error = %e, "failed to flush sample file");
                }
                debug!(path = %path.display(), written, "sample writer finished");
            })
    }

    /// Close the channel and wait for the writer to drain it.
    fn finish(&self) {
        self.sender.store(None);
        if let Some(handle) = self.writer.lock().take()
            && handle.join().is_err()
        {
            error!(path = %self.path.display(), "sample writer thread panicked");
        }
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!(path = %self.path.display(), dropped, "sample queue overflowed, records dropped");
        }
    }
}

impl RunListener for JtlRecorder {
    fn on_sample(&self, sample: &Sample) {
        let sender = self.sender.load();
        if let Some(tx) = &*sender
            && tx.try_send(sample.clone()).is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_run_start(&self) {
        self.finish();
        let file = match File::create(&self.path) {
            Ok(file) => file,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to create sample file");
                return;
            }
        };
        let (tx, rx) = mpsc::channel(SAMPLE_QUEUE_CAPACITY);
        match self.spawn_writer(file, rx) {
            Ok(handle) => {
                *self.writer.lock() = Some(handle);
                self.sender.store(Some(Arc::new(tx)));
                info!(path = %self.path.display(), "recording samples");
            }
            Err(e) => error!(path = %self.path.display(), error = %e, "failed to start sample writer"),
        }
    }

    fn on_run_end(&self) {
        self.finish();
    }
}

/// Writes fresh resource snapshots of a run to a CSV file.
///
/// Register [`callback`](Self::callback) with the gate service and the
/// recorder itself as a run listener.
pub struct ResourceRecorder {
    path: PathBuf,
    writer: Mutex<Option<ResourceCsvWriter<BufWriter<File>>>>,
}

impl ResourceRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, snapshot: &ResourceSnapshot) {
        let mut guard = self.writer.lock();
        if let Some(w) = guard.as_mut()
            && let Err(e) = w.write_snapshot(snapshot)
        {
            warn!(path = %self.path.display(), error = %e, "failed to record resources");
        }
    }

    /// Snapshot callback that appends to this recorder.
    pub fn callback(self: &Arc<Self>) -> SnapshotCallback {
        let recorder = Arc::clone(self);
        Arc::new(move |snapshot| recorder.record(&snapshot))
    }
}

impl RunListener for ResourceRecorder {
    fn on_sample(&self, _sample: &Sample) {}

    fn on_run_start(&self) {
        let opened = File::create(&self.path)
            .map_err(Into::into)
            .and_then(|f| ResourceCsvWriter::new(BufWriter::new(f)));
        match opened {
            Ok(w) => {
                *self.writer.lock() = Some(w);
                info!(path = %self.path.display(), "recording host resources");
            }
            Err(e) => error!(path = %self.path.display(), error = %e, "failed to create resource file"),
        }
    }

    fn on_run_end(&self) {
        if let Some(w) = self.writer.lock().take() {
            info!(path = %self.path.display(), rows = w.rows(), "resource recording closed");
        }
    }
}
