use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::session::{ClientSession, CycleOutcome, SessionError};

use super::interrupt::{InterruptDispatcher, WorkerPool};
use super::keyboard::{key_command, InputPoller, KeyCommand};
use super::TriggerSource;

/// Upper bound on one keyboard poll, so shutdown and worker errors are
/// noticed promptly even with long capture intervals.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Why the trigger loop returned without a fatal error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiplexerExit {
    Quit,
    Shutdown,
}

/// Drives capture cycles from the timer, keyboard and pin interrupts.
///
/// The timer and keyboard are serviced on the calling thread. Interrupt
/// captures run on a [`WorkerPool`]; their fatal errors are forwarded here
/// and end [`TriggerMultiplexer::run`].
pub struct TriggerMultiplexer {
    session: Arc<ClientSession>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    fatal_tx: Sender<SessionError>,
    fatal_rx: Receiver<SessionError>,
}

impl TriggerMultiplexer {
    pub fn new(session: Arc<ClientSession>, interval: Duration) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::channel();
        Self {
            session,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            fatal_tx,
            fatal_rx,
        }
    }

    /// Flag that stops [`run`](Self::run) when raised, e.g. from Ctrl-C.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    /// Start `workers` capture threads fed by a queue of `capacity` pin
    /// events, and return the dispatcher that feeds them.
    pub fn interrupt_handler(
        &self,
        workers: usize,
        capacity: usize,
    ) -> (Arc<InterruptDispatcher>, WorkerPool) {
        let (queue_tx, queue_rx) = mpsc::sync_channel(capacity);
        let dispatcher = Arc::new(InterruptDispatcher::new(queue_tx));

        let session = self.session.clone();
        let fatal = self.fatal_tx.clone();
        let shutdown = self.shutdown.clone();
        let pool = WorkerPool::spawn(workers, queue_rx, move |trigger| {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            match session.run_cycle(trigger) {
                Ok(outcome) => log_outcome(trigger, &outcome),
                Err(err) => {
                    let _ = fatal.send(err);
                }
            }
        });
        (dispatcher, pool)
    }

    /// Run until quit, shutdown, or a fatal upload error.
    ///
    /// The first timer capture happens immediately; later ones `interval`
    /// after the previous cycle finished.
    pub fn run(&self, input: &mut dyn InputPoller) -> Result<MultiplexerExit, SessionError> {
        let mut next_tick = Instant::now();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                log::info!("shutdown requested");
                return Ok(MultiplexerExit::Shutdown);
            }
            if let Ok(err) = self.fatal_rx.try_recv() {
                return Err(err);
            }

            let now = Instant::now();
            if now >= next_tick {
                let outcome = self.session.run_cycle(TriggerSource::Timer)?;
                log_outcome(TriggerSource::Timer, &outcome);
                next_tick = Instant::now() + self.interval;
                continue;
            }

            let wait = next_tick.saturating_duration_since(now).min(POLL_SLICE);
            let Some(key) = input.poll(wait) else {
                continue;
            };
            match key_command(key) {
                Some(KeyCommand::Select(endpoint)) => {
                    log::info!("next capture goes to {}", endpoint.name());
                    self.session.selector().select_next(endpoint);
                }
                Some(KeyCommand::Quit) => {
                    log::info!("quit requested from keyboard");
                    return Ok(MultiplexerExit::Quit);
                }
                None => log::debug!("ignoring key {:?}", key),
            }
        }
    }
}

fn log_outcome(trigger: TriggerSource, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Spoken { endpoint, speech, .. } => {
            log::debug!("{:?} cycle on {} -> {:?}", trigger, endpoint.name(), speech)
        }
        CycleOutcome::Silent { endpoint } => {
            log::debug!("{:?} cycle on {} -> silent", trigger, endpoint.name())
        }
        CycleOutcome::CaptureFailed(_) => {}
    }
}
