//! Fixed-interval trigger driving the poll loop.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

/// Callback invoked on every tick.
pub type Tick = Box<dyn FnMut() + Send + 'static>;

/// Ticker error.
#[derive(Debug, Error)]
pub enum TickerError {
    #[error("ticker is already running")]
    AlreadyRunning,
    #[error("failed to spawn ticker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Periodic trigger abstraction.
///
/// - `run` blocks the calling thread, invoking `tick` every `interval`
/// - `start` does the same on a background thread and returns immediately
/// - `stop` prevents further ticks and waits for an in-flight tick to finish
///
/// A tick always runs to completion before the next interval starts, so ticks
/// never overlap.
pub trait Ticker: Send + Sync {
    fn run(&self, interval: Duration, tick: Tick) -> Result<(), TickerError>;

    fn start(&self, interval: Duration, tick: Tick) -> Result<(), TickerError>;

    fn stop(&self);
}

#[derive(Debug, Default)]
struct TickerState {
    shutdown: Option<mpsc::Sender<()>>,
    /// Closed by the loop when it exits (blocking mode).
    done: Option<mpsc::Receiver<()>>,
    /// Background thread (non-blocking mode).
    join: Option<thread::JoinHandle<()>>,
    /// Thread running the blocking loop (blocking mode).
    runner: Option<thread::ThreadId>,
}

/// Thread-based [`Ticker`] with constant delay between ticks.
#[derive(Debug)]
pub struct IntervalTicker {
    name: String,
    state: Mutex<TickerState>,
}

impl IntervalTicker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TickerState::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().shutdown.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TickerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install fresh shutdown/done channels, failing if already running.
    fn arm(&self) -> Result<(mpsc::Receiver<()>, mpsc::Sender<()>), TickerError> {
        let mut state = self.lock();
        if state.shutdown.is_some() {
            return Err(TickerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        state.shutdown = Some(shutdown_tx);
        state.done = Some(done_rx);
        Ok((shutdown_rx, done_tx))
    }
}

impl Default for IntervalTicker {
    fn default() -> Self {
        Self::new("ticker")
    }
}

impl Ticker for IntervalTicker {
    fn run(&self, interval: Duration, mut tick: Tick) -> Result<(), TickerError> {
        let (shutdown_rx, done_tx) = self.arm()?;
        self.lock().runner = Some(thread::current().id());

        tick_loop(&self.name, interval, &shutdown_rx, &mut tick);
        drop(done_tx);

        // Clear state unless `stop` already did.
        let mut state = self.lock();
        state.shutdown = None;
        state.done = None;
        state.runner = None;
        Ok(())
    }

    fn start(&self, interval: Duration, mut tick: Tick) -> Result<(), TickerError> {
        let (shutdown_rx, done_tx) = self.arm()?;

        let name = self.name.clone();
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            tick_loop(&name, interval, &shutdown_rx, &mut tick);
            drop(done_tx);
        });

        let mut state = self.lock();
        match spawned {
            Ok(join) => {
                state.join = Some(join);
                Ok(())
            }
            Err(e) => {
                state.shutdown = None;
                state.done = None;
                Err(TickerError::Spawn(e))
            }
        }
    }

    fn stop(&self) {
        let (shutdown, done, join, runner) = {
            let mut state = self.lock();
            (
                state.shutdown.take(),
                state.done.take(),
                state.join.take(),
                state.runner.take(),
            )
        };
        // Stopping from inside a tick must not wait on itself.
        let on_loop_thread = |id: thread::ThreadId| id == thread::current().id();

        let Some(shutdown) = shutdown else {
            return;
        };
        let _ = shutdown.send(());

        if let Some(join) = join {
            if !on_loop_thread(join.thread().id()) {
                let _ = join.join();
            }
        } else if let Some(done) = done {
            if !runner.is_some_and(on_loop_thread) {
                // Returns once the blocking loop drops its sender.
                let _ = done.recv();
            }
        }
        debug!(ticker = %self.name, "ticker stopped");
    }
}

fn tick_loop(name: &str, interval: Duration, shutdown_rx: &mpsc::Receiver<()>, tick: &mut Tick) {
    info!(ticker = %name, interval_ms = interval.as_millis() as u64, "ticker started");

    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => tick(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(ticker = %name, "ticker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn counter() -> (Arc<AtomicUsize>, Tick) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let tick: Tick = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, tick)
    }

    #[test]
    fn background_ticks_until_stopped() {
        let ticker = IntervalTicker::new("test-ticker");
        let (count, tick) = counter();

        ticker.start(Duration::from_millis(10), tick).unwrap();
        assert!(ticker.is_running());
        thread::sleep(Duration::from_millis(100));
        ticker.stop();

        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, got {seen}");
        assert!(!ticker.is_running());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn second_start_is_rejected() {
        let ticker = IntervalTicker::default();
        let (_, a) = counter();
        let (_, b) = counter();

        ticker.start(Duration::from_millis(50), a).unwrap();
        assert!(matches!(
            ticker.start(Duration::from_millis(50), b),
            Err(TickerError::AlreadyRunning)
        ));
        ticker.stop();
    }

    #[test]
    fn blocking_run_returns_after_stop() {
        let ticker = Arc::new(IntervalTicker::new("blocking"));
        let (count, tick) = counter();

        let runner = {
            let ticker = ticker.clone();
            thread::spawn(move || ticker.run(Duration::from_millis(10), tick))
        };

        thread::sleep(Duration::from_millis(60));
        ticker.stop();
        runner.join().unwrap().unwrap();

        assert!(count.load(Ordering::SeqCst) >= 1);
        assert!(!ticker.is_running());
    }

    #[test]
    fn stop_waits_for_in_flight_tick() {
        let ticker = IntervalTicker::new("slow");
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();

        ticker
            .start(
                Duration::from_millis(5),
                Box::new(move || {
                    thread::sleep(Duration::from_millis(80));
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        // Let the first tick begin, then stop mid-tick.
        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        ticker.stop();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        IntervalTicker::default().stop();
    }
}
