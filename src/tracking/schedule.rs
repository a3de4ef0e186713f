use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::observability::metrics::Metrics;

/// A cancellable repeating job with an in-flight guard.
///
/// `start` replaces any running loop, so two loops never coexist. A tick that
/// fires while the previous run is still outstanding is dropped. `stop`
/// cancels future ticks; a run already dispatched is left to finish.
pub struct PeriodicTask {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
    period: Mutex<Option<Duration>>,
    in_flight: Arc<AtomicBool>,
    metrics: Option<Metrics>,
}

/// Marks one outstanding run; the slot frees when the guard drops.
pub struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Self(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PeriodicTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
            period: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn start<F, Fut>(&self, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = self.name;
        let in_flight = self.in_flight.clone();
        let metrics = self.metrics.clone();

        let loop_handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(guard) = RunGuard::claim(&in_flight) else {
                    debug!(task = name, "previous run still in flight; skipping tick");
                    if let Some(metrics) = &metrics {
                        metrics.ticks_skipped_total.with_label_values(&[name]).inc();
                    }
                    continue;
                };

                let run = job();
                tokio::spawn(async move {
                    let _guard = guard;
                    run.await;
                });
            }
        });

        if let Ok(mut slot) = self.handle.lock() {
            if let Some(previous) = slot.replace(loop_handle) {
                previous.abort();
                debug!(task = name, "replaced running schedule");
            }
        }
        if let Ok(mut slot) = self.period.lock() {
            *slot = Some(period);
        }

        info!(task = name, period_ms = period.as_millis() as u64, "schedule started");
    }

    /// Returns whether a loop was running.
    pub fn stop(&self) -> bool {
        let previous = self.handle.lock().ok().and_then(|mut slot| slot.take());

        match previous {
            Some(handle) => {
                handle.abort();
                info!(task = self.name, "schedule stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Claims the run slot for a call made outside the timer. Returns `None`
    /// while a run (timed or manual) is outstanding.
    pub fn try_claim(&self) -> Option<RunGuard> {
        RunGuard::claim(&self.in_flight)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Period of the most recent `start`.
    pub fn period(&self) -> Option<Duration> {
        self.period.lock().ok().and_then(|slot| *slot)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::PeriodicTask;

    fn counting_job(
        counter: Arc<AtomicUsize>,
        work: Duration,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync
    {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(work).await;
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_on_cadence() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");

        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::ZERO));
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert!(task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_never_runs_two_loops() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");

        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::ZERO));
        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::ZERO));
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_dropped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");

        // each run takes 25s: ticks at 10s and 20s find it still in flight
        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::from_secs(25)));
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_ticks_and_is_idempotent() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");

        assert!(!task.stop());
        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::ZERO));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(task.stop());
        assert!(!task.stop());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!task.is_running());
        assert_eq!(task.period(), Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_claim_blocks_ticks_until_released() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");

        let manual = task.try_claim().unwrap();
        assert!(task.try_claim().is_none());
        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::ZERO));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        drop(manual);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_run_blocks_manual_claim() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");

        task.start(Duration::from_secs(10), counting_job(runs.clone(), Duration::from_secs(4)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(task.try_claim().is_none());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(task.try_claim().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatched_run_completes_after_stop() {
        let finished = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::new("test");
        let done = finished.clone();

        task.start(Duration::from_secs(10), move || {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        task.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!task.is_in_flight());
    }
}
