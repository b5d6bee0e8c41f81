/*!
 * Worker pool: bounds how many backup drivers run at once
 *
 * A single scheduler thread ticks roughly thirty times per second. Each
 * tick drains the submission queue into a waiting queue, starts jobs up
 * to the configured bound, and joins whichever jobs have finished. On
 * shutdown it stops accepting work, then blocking-joins the rest.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Scheduler tick, ≈30 wakes per second.
const TICK: Duration = Duration::from_millis(33);

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    submit: Sender<Job>,
    stop: Arc<AtomicBool>,
    scheduler: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Pool that keeps at most `max_running` jobs alive at once; the
    /// submission queue itself is unbounded.
    pub fn new(max_running: usize) -> Self {
        let (submit, incoming) = unbounded::<Job>();
        let stop = Arc::new(AtomicBool::new(false));
        let scheduler = {
            let stop = stop.clone();
            thread::spawn(move || scheduler_loop(incoming, max_running.max(1), stop))
        };
        WorkerPool {
            submit,
            stop,
            scheduler: Some(scheduler),
        }
    }

    /// Queues a job; it starts once a running slot frees up. Jobs queued
    /// after shutdown began are dropped.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.submit.send(Box::new(job));
    }

    /// Stops accepting new jobs, joins the finished ones, then blocks on
    /// whatever is still running.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn scheduler_loop(incoming: Receiver<Job>, max_running: usize, stop: Arc<AtomicBool>) {
    let mut waiting: VecDeque<Job> = VecDeque::new();
    let mut running: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let stopping = stop.load(Ordering::Relaxed);

        if !stopping {
            while let Ok(job) = incoming.try_recv() {
                waiting.push_back(job);
            }
            while running.len() < max_running {
                let Some(job) = waiting.pop_front() else { break };
                running.push(thread::spawn(job));
            }
        }

        let mut alive = Vec::with_capacity(running.len());
        for handle in running.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                alive.push(handle);
            }
        }
        running = alive;

        if stopping {
            break;
        }
        thread::sleep(TICK);
    }

    debug!("scheduler stopping, {} jobs still running", running.len());
    for handle in running {
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn all_submitted_jobs_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(2);
        for _ in 0..8 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 8 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn concurrency_stays_within_the_bound() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(Mutex::new(0usize));

        let pool = WorkerPool::new(2);
        for _ in 0..6 {
            let current = current.clone();
            let peak = peak.clone();
            pool.submit(move || {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    let mut peak = peak.lock().unwrap();
                    if now > *peak {
                        *peak = now;
                    }
                }
                thread::sleep(Duration::from_millis(60));
                current.fetch_sub(1, Ordering::SeqCst);
            });
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while *peak.lock().unwrap() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        pool.shutdown();

        let peak = *peak.lock().unwrap();
        assert!(peak >= 1, "no job ever ran");
        assert!(peak <= 2, "bound exceeded: {peak} jobs ran at once");
    }

    #[test]
    fn shutdown_joins_running_jobs() {
        let finished = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(4);
        for _ in 0..4 {
            let finished = finished.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(80));
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        // give the scheduler a few ticks to start them
        thread::sleep(Duration::from_millis(300));
        pool.shutdown();
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn zero_bound_is_clamped_to_one() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(0);
        {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
