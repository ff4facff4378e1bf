//! Bounded execution of blocking extraction calls.
//!
//! Two stage pools (probe, download) cap how many engine calls of each kind
//! run at once; a third semaphore bounds the blocking worker pool itself so
//! heavy calls never pile up on unbounded `spawn_blocking` threads. Permits
//! are owned and move into the blocking closure, so a slot is released on
//! every exit path including panics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::extractor::ExtractError;

pub struct WorkLimiter {
    probe: Arc<Semaphore>,
    download: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    probes_in_flight: AtomicUsize,
    downloads_in_flight: AtomicUsize,
}

impl WorkLimiter {
    /// Build pools with the given slot counts, each clamped to at least 1.
    pub fn new(probe_slots: usize, download_slots: usize, worker_slots: usize) -> Self {
        Self {
            probe: Arc::new(Semaphore::new(probe_slots.max(1))),
            download: Arc::new(Semaphore::new(download_slots.max(1))),
            workers: Arc::new(Semaphore::new(worker_slots.max(1))),
            probes_in_flight: AtomicUsize::new(0),
            downloads_in_flight: AtomicUsize::new(0),
        }
    }

    /// Run a blocking probe call under the probe pool.
    pub async fn run_probe<T, F>(&self, work: F) -> Result<T, ExtractError>
    where
        F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
        T: Send + 'static,
    {
        self.run_bounded(&self.probe, &self.probes_in_flight, work)
            .await
    }

    /// Run a blocking download call under the download pool.
    pub async fn run_download<T, F>(&self, work: F) -> Result<T, ExtractError>
    where
        F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
        T: Send + 'static,
    {
        self.run_bounded(&self.download, &self.downloads_in_flight, work)
            .await
    }

    pub fn probes_in_flight(&self) -> usize {
        self.probes_in_flight.load(Ordering::SeqCst)
    }

    pub fn downloads_in_flight(&self) -> usize {
        self.downloads_in_flight.load(Ordering::SeqCst)
    }

    async fn run_bounded<T, F>(
        &self,
        pool: &Arc<Semaphore>,
        gauge: &AtomicUsize,
        work: F,
    ) -> Result<T, ExtractError>
    where
        F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
        T: Send + 'static,
    {
        // The semaphores live as long as the limiter and are never closed.
        let stage = pool
            .clone()
            .acquire_owned()
            .await
            .expect("stage semaphore closed");
        let worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .expect("worker semaphore closed");

        gauge.fetch_add(1, Ordering::SeqCst);
        let joined = tokio::task::spawn_blocking(move || {
            let _stage = stage;
            let _worker = worker;
            work()
        })
        .await;
        gauge.fetch_sub(1, Ordering::SeqCst);

        match joined {
            Ok(result) => result,
            Err(e) => Err(ExtractError::Worker(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn download_pool_caps_parallelism() {
        let limiter = Arc::new(WorkLimiter::new(4, 2, 8));
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                limiter
                    .run_download(move || {
                        let n = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(n, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(30));
                        live.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "more than 2 downloads ran at once");
        assert_eq!(limiter.downloads_in_flight(), 0);
    }

    #[tokio::test]
    async fn stage_pools_are_independent() {
        let limiter = Arc::new(WorkLimiter::new(1, 1, 4));
        // A slow probe must not block a download.
        let l = Arc::clone(&limiter);
        let probe = tokio::spawn(async move {
            l.run_probe(|| {
                std::thread::sleep(Duration::from_millis(60));
                Ok(1u32)
            })
            .await
        });
        let download = limiter.run_download(|| Ok(2u32)).await.unwrap();
        assert_eq!(download, 2);
        assert_eq!(probe.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_call_releases_its_slot() {
        let limiter = WorkLimiter::new(1, 1, 1);
        let err = limiter
            .run_probe::<u32, _>(|| Err(ExtractError::Probe("no".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Probe(_)));

        let ok = limiter.run_probe(|| Ok(7u32)).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn panicking_call_surfaces_worker_error_and_frees_slot() {
        let limiter = WorkLimiter::new(1, 1, 1);
        let err = limiter
            .run_probe::<u32, _>(|| panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Worker(_)));

        let ok = limiter.run_probe(|| Ok(9u32)).await.unwrap();
        assert_eq!(ok, 9);
    }
}
