//! Background sampling task.
//!
//! A [`SamplerTask`] ticks a [`ResourceSampler`] on a tokio interval so the
//! resource history keeps filling while no client is polling. The task owns
//! the cadence: every tick is a real probe, unaffected by the on-demand
//! throttle. Probes run on the blocking pool since procfs reads are
//! synchronous.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use livegate_core::ResourceSnapshot;

use crate::sampler::ResourceSampler;

/// Invoked with every fresh snapshot the task takes.
pub type SnapshotCallback = Arc<dyn Fn(ResourceSnapshot) + Send + Sync>;

/// Handle to a running sampling loop. Dropping it stops the loop.
pub struct SamplerTask {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SamplerTask {
    /// Spawn a loop sampling every `period` on the current runtime.
    pub fn start(
        sampler: Arc<ResourceSampler>,
        period: Duration,
        on_snapshot: Option<SnapshotCallback>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(run_sampler_loop(sampler, period, on_snapshot, shutdown_rx));
        info!(period_ms = period.as_millis() as u64, "resource sampler task started");
        Self {
            handle: Some(handle),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "resource sampler task ended abnormally");
            }
        }
        info!("resource sampler task stopped");
    }
}

impl Drop for SamplerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown_tx.send(true);
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SamplerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerTask")
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_sampler_loop(
    sampler: Arc<ResourceSampler>,
    period: Duration,
    on_snapshot: Option<SnapshotCallback>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let s = Arc::clone(&sampler);
                match tokio::task::spawn_blocking(move || s.sample_now()).await {
                    Ok(snapshot) if snapshot.fresh => {
                        if let Some(cb) = &on_snapshot {
                            cb(snapshot);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "resource probe panicked"),
                }
            }
            _ = shutdown.changed() => {
                debug!("resource sampler loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{CpuTicks, HostProbe, MemoryInfo, ProbeResult};
    use crate::sampler::SamplerConfig;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Ticks advance by 100 (25 idle) on every read.
    #[derive(Default)]
    struct CountingProbe {
        reads: AtomicU64,
    }

    impl HostProbe for CountingProbe {
        fn cpu_ticks(&self) -> ProbeResult<CpuTicks> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CpuTicks {
                total: n * 100,
                idle: n * 25,
            })
        }

        fn memory(&self) -> ProbeResult<MemoryInfo> {
            Ok(MemoryInfo {
                total_bytes: 4096,
                available_bytes: 1024,
            })
        }
    }

    fn sampler(interval: Duration) -> Arc<ResourceSampler> {
        Arc::new(ResourceSampler::new(
            Arc::new(CountingProbe::default()),
            SamplerConfig {
                interval,
                first_sample_warmup: Duration::ZERO,
            },
        ))
    }

    #[tokio::test]
    async fn task_fills_history_until_stopped() {
        let sampler = sampler(Duration::ZERO);
        let task = SamplerTask::start(Arc::clone(&sampler), Duration::from_millis(5), None);
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        let history = sampler.history();
        assert!(history.memory.count >= 2, "{history:?}");
        assert_eq!(history.cpu.mean, 75.0);

        let after = sampler.history().memory.count;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sampler.history().memory.count, after);
    }

    #[tokio::test]
    async fn callback_sees_fresh_snapshots() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let callback: SnapshotCallback = Arc::new(move |snap| {
            assert!(snap.fresh);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let task = SamplerTask::start(sampler(Duration::ZERO), Duration::from_millis(5), Some(callback));
        tokio::time::sleep(Duration::from_millis(60)).await;
        task.stop().await;

        assert!(seen.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn every_tick_is_a_fresh_measurement() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let callback: SnapshotCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // The on-demand throttle is far longer than the test.
        let sampler = sampler(Duration::from_secs(3600));
        let task = SamplerTask::start(Arc::clone(&sampler), Duration::from_millis(10), Some(callback));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        let fresh = seen.load(Ordering::SeqCst);
        assert!(fresh >= 3, "only {fresh} fresh snapshots");
        // One history entry per tick, none skipped by the throttle.
        assert_eq!(sampler.history().memory.count, fresh);
        assert_eq!(sampler.history().cpu.count, fresh - 1);
    }

    #[tokio::test]
    async fn dropping_handle_stops_loop() {
        let sampler = sampler(Duration::ZERO);
        let task = SamplerTask::start(Arc::clone(&sampler), Duration::from_millis(5), None);
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(task);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let count = sampler.history().memory.count;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sampler.history().memory.count, count);
    }
}
