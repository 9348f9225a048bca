use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::{Endpoint, TriggerSource};

/// BCM pin to endpoint, one entry per physical button.
pub const PIN_TABLE: [(u8, Endpoint); 3] = [
    (5, Endpoint::Ocr),
    (6, Endpoint::Traffic),
    (13, Endpoint::Search),
];

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

pub fn pin_endpoint(pin: u8) -> Option<Endpoint> {
    PIN_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == pin)
        .map(|(_, endpoint)| *endpoint)
}

/// Drops repeat events from one press. Each pin is tracked separately.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Mutex<HashMap<u8, Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// True when `pin` has not fired within the window before `now`.
    pub fn accept(&self, pin: u8, now: Instant) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match last.get(&pin) {
            Some(previous) if now.saturating_duration_since(*previous) < self.window => false,
            _ => {
                last.insert(pin, now);
                true
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinOutcome {
    /// A capture for the pin's endpoint was queued.
    Queued(Endpoint),
    Debounced,
    UnknownPin,
    /// The work queue was full; the event was dropped.
    QueueFull,
    /// No workers are left to run captures.
    Closed,
}

/// Turns pin events into queued capture work.
///
/// `notify` never blocks, so it is safe to call from an interrupt-style
/// callback. Each queued job names its pin, and the worker captures for that
/// pin's endpoint, so presses on different pins never overwrite each other.
pub struct InterruptDispatcher {
    debouncer: Debouncer,
    queue: SyncSender<TriggerSource>,
}

impl InterruptDispatcher {
    pub fn new(queue: SyncSender<TriggerSource>) -> Self {
        Self {
            debouncer: Debouncer::new(DEBOUNCE_WINDOW),
            queue,
        }
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::new(window);
        self
    }

    pub fn notify(&self, pin: u8) -> PinOutcome {
        self.notify_at(pin, Instant::now())
    }

    pub fn notify_at(&self, pin: u8, now: Instant) -> PinOutcome {
        let Some(endpoint) = pin_endpoint(pin) else {
            log::debug!("ignoring event on unmapped pin {}", pin);
            return PinOutcome::UnknownPin;
        };
        if !self.debouncer.accept(pin, now) {
            return PinOutcome::Debounced;
        }

        match self.queue.try_send(TriggerSource::Interrupt(pin)) {
            Ok(()) => {
                log::info!("pin {} pressed: capturing for {}", pin, endpoint.name());
                PinOutcome::Queued(endpoint)
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("pin {} event dropped: capture queue full", pin);
                PinOutcome::QueueFull
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("pin {} event dropped: no capture workers", pin);
                PinOutcome::Closed
            }
        }
    }
}

/// Fixed set of threads that run queued captures.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<F>(count: usize, jobs: Receiver<TriggerSource>, handler: F) -> Self
    where
        F: Fn(TriggerSource) + Send + Sync + 'static,
    {
        let jobs = Arc::new(Mutex::new(jobs));
        let handler = Arc::new(handler);
        let workers = (0..count.max(1))
            .map(|id| {
                let jobs = jobs.clone();
                let handler = handler.clone();
                std::thread::Builder::new()
                    .name(format!("capture-worker-{id}"))
                    .spawn(move || loop {
                        let job = jobs.lock().unwrap_or_else(PoisonError::into_inner).recv();
                        match job {
                            Ok(trigger) => handler(trigger),
                            Err(_) => break,
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(worker) => Some(worker),
                Err(err) => {
                    log::error!("failed to start capture worker: {}", err);
                    None
                }
            })
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker. Returns once all queue senders are gone.
    pub fn join(self) {
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// Parse one line from a pin event device: `5`, `GPIO5` or `gpio 5`.
pub fn parse_pin_line(line: &str) -> Option<u8> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let digits = match line.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("gpio") => line[4..].trim_start(),
        _ => line,
    };
    digits.parse().ok()
}

/// Feed pin numbers read line by line from `path` into `dispatcher`.
///
/// The path is typically a serial device or FIFO written by a
/// microcontroller watching the buttons.
pub fn spawn_pin_reader(
    path: &Path,
    dispatcher: Arc<InterruptDispatcher>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let file =
        File::open(path).with_context(|| format!("open pin event device {}", path.display()))?;
    let label = path.display().to_string();
    log::info!("reading pin events from {}", label);

    let handle = std::thread::Builder::new()
        .name("pin-reader".into())
        .spawn(move || {
            for line in BufReader::new(file).lines() {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match line {
                    Ok(line) => match parse_pin_line(&line) {
                        Some(pin) => {
                            dispatcher.notify(pin);
                        }
                        None if line.trim().is_empty() => {}
                        None => log::debug!("ignoring pin event line '{}'", line.trim()),
                    },
                    Err(err) => {
                        log::warn!("pin event device {} failed: {}", label, err);
                        break;
                    }
                }
            }
            log::info!("pin event device {} closed", label);
        })
        .context("spawn pin reader thread")?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn pin_table_is_one_to_one() {
        assert_eq!(pin_endpoint(5), Some(Endpoint::Ocr));
        assert_eq!(pin_endpoint(6), Some(Endpoint::Traffic));
        assert_eq!(pin_endpoint(13), Some(Endpoint::Search));
        assert_eq!(pin_endpoint(7), None);
    }

    #[test]
    fn debounce_is_per_pin() {
        let debouncer = Debouncer::new(DEBOUNCE_WINDOW);
        let t0 = Instant::now();
        assert!(debouncer.accept(5, t0));
        assert!(!debouncer.accept(5, t0 + Duration::from_millis(100)));
        assert!(debouncer.accept(6, t0 + Duration::from_millis(100)));
        assert!(debouncer.accept(5, t0 + Duration::from_millis(350)));
    }

    #[test]
    fn notify_queues_work_for_the_pin() {
        let (tx, rx) = mpsc::sync_channel(4);
        let dispatcher = InterruptDispatcher::new(tx);
        let t0 = Instant::now();

        assert_eq!(dispatcher.notify_at(6, t0), PinOutcome::Queued(Endpoint::Traffic));
        assert_eq!(rx.try_recv().unwrap(), TriggerSource::Interrupt(6));

        assert_eq!(
            dispatcher.notify_at(6, t0 + Duration::from_millis(50)),
            PinOutcome::Debounced
        );
        assert_eq!(dispatcher.notify_at(2, t0), PinOutcome::UnknownPin);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::sync_channel(1);
        let dispatcher = InterruptDispatcher::new(tx).with_debounce(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(dispatcher.notify_at(5, t0), PinOutcome::Queued(Endpoint::Ocr));
        assert_eq!(dispatcher.notify_at(5, t0), PinOutcome::QueueFull);
    }

    #[test]
    fn workers_drain_queue_until_senders_drop() {
        let (tx, rx) = mpsc::sync_channel(8);
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let pool = WorkerPool::spawn(3, rx, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(pool.len(), 3);
        for pin in [5, 6, 13, 5] {
            tx.send(TriggerSource::Interrupt(pin)).unwrap();
        }
        drop(tx);
        pool.join();
        assert_eq!(handled.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn pin_lines() {
        assert_eq!(parse_pin_line("5\n"), Some(5));
        assert_eq!(parse_pin_line("GPIO13"), Some(13));
        assert_eq!(parse_pin_line("gpio 6"), Some(6));
        assert_eq!(parse_pin_line("# comment"), None);
        assert_eq!(parse_pin_line("button"), None);
    }

    #[test]
    fn pin_reader_feeds_dispatcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins");
        std::fs::write(&path, "5\nnoise\n13\n").unwrap();

        let (tx, rx) = mpsc::sync_channel(8);
        let dispatcher = Arc::new(InterruptDispatcher::new(tx));
        let reader =
            spawn_pin_reader(&path, dispatcher, Arc::new(AtomicBool::new(false))).unwrap();
        reader.join().unwrap();

        let queued: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            queued,
            vec![TriggerSource::Interrupt(5), TriggerSource::Interrupt(13)]
        );
    }
}
