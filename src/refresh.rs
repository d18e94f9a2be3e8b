//! Background poll scheduler
//!
//! The scheduler stays `Idle` until the display's Init message arrives. It
//! then runs one cycle immediately and another every fetch interval. A
//! trigger that fires while a cycle is still in flight is skipped, so each
//! source has at most one outstanding request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, FetchSettings};
use crate::data::{Source, UnitSystem};
use crate::notify::{Dispatcher, Inbound, Outbound};

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the Init message
    Idle,
    /// Polling on the configured interval
    Running,
}

/// Marks a cycle as in flight; the mark is released when the token drops
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one cycle
#[derive(Debug)]
pub struct CycleToken {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    /// Claims the slot, or returns `None` if a cycle is already running
    pub fn try_begin(&self) -> Option<CycleToken> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(CycleToken {
            busy: Arc::clone(&self.busy),
        })
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for CycleToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Everything fixed by the Init message
struct Session {
    sources: Arc<Vec<Source>>,
    units: UnitSystem,
    aggregator: Arc<Aggregator>,
    ticker: Interval,
}

/// Handle for controlling the background scheduler
pub struct SchedulerHandle {
    inbound_tx: mpsc::Sender<Inbound>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Spawns the scheduler task
    ///
    /// `settings` supplies retry and timeout policy; cache lifetimes come from
    /// the Init message. Pushes are delivered on `outbound`.
    pub fn spawn(settings: FetchSettings, outbound: mpsc::Sender<Outbound>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let dispatcher = Dispatcher::new(outbound);

        let task = tokio::spawn(run(settings, dispatcher, inbound_rx, shutdown_rx));

        Self {
            inbound_tx,
            shutdown_tx,
            task,
        }
    }

    /// Delivers a message from the display
    pub async fn send(&self, message: Inbound) {
        if self.inbound_tx.send(message).await.is_err() {
            warn!("scheduler has stopped, dropping inbound message");
        }
    }

    /// Stops the scheduler and aborts any in-flight cycle
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                error!(error = %e, "scheduler task failed");
            }
        }
    }
}

async fn run(
    settings: FetchSettings,
    dispatcher: Dispatcher,
    mut inbound_rx: mpsc::Receiver<Inbound>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut state = SchedulerState::Idle;
    let mut session: Option<Session> = None;
    let in_flight = InFlight::default();
    let mut current: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            message = inbound_rx.recv() => {
                let Some(message) = message else {
                    debug!("inbound channel closed");
                    break;
                };
                match message {
                    Inbound::Init(config) => {
                        if state == SchedulerState::Running {
                            warn!("already initialized, ignoring Init");
                            continue;
                        }
                        let interval = match config.fetch_interval() {
                            Ok(interval) => interval,
                            Err(e) => {
                                error!(error = %e, "invalid Init");
                                continue;
                            }
                        };
                        let sources = match config.into_sources() {
                            Ok(sources) => sources,
                            Err(e) => {
                                error!(error = %e, "invalid Init");
                                continue;
                            }
                        };

                        let aggregator = Aggregator::new(FetchSettings {
                            ttls: config.cache_ttls(),
                            ..settings.clone()
                        });
                        info!(
                            sources = sources.len(),
                            units = ?config.units,
                            interval_ms = interval.as_millis() as u64,
                            "initialized, starting polling"
                        );

                        let new_session = Session {
                            sources: Arc::new(sources),
                            units: config.units,
                            aggregator: Arc::new(aggregator),
                            ticker: ticker(interval),
                        };
                        state = SchedulerState::Running;
                        trigger(&new_session, &in_flight, &dispatcher, &mut current);
                        session = Some(new_session);
                    }
                    Inbound::FetchNow => match &session {
                        Some(session) => trigger(session, &in_flight, &dispatcher, &mut current),
                        None => warn!("fetch requested before Init, ignoring"),
                    },
                }
            }
            _ = next_tick(&mut session) => {
                if let Some(session) = &session {
                    trigger(session, &in_flight, &dispatcher, &mut current);
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    if let Some(handle) = current {
        handle.abort();
    }
    info!("scheduler stopped");
}

/// First tick one interval from now; the immediate cycle is run by Init
fn ticker(interval: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn next_tick(session: &mut Option<Session>) {
    match session {
        Some(session) => {
            session.ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Starts a cycle unless one is already in flight
fn trigger(
    session: &Session,
    in_flight: &InFlight,
    dispatcher: &Dispatcher,
    current: &mut Option<JoinHandle<()>>,
) {
    let Some(token) = in_flight.try_begin() else {
        debug!("previous cycle still in flight, skipping trigger");
        return;
    };

    let sources = Arc::clone(&session.sources);
    let aggregator = Arc::clone(&session.aggregator);
    let units = session.units;
    let dispatcher = dispatcher.clone();

    *current = Some(tokio::spawn(async move {
        let _token = token;
        let result = aggregator.run_cycle(&sources, units).await;
        dispatcher.dispatch(&result).await;
    }));
}

/// Runs exactly one cycle for `sources` and dispatches it
pub async fn run_once(
    aggregator: &Aggregator,
    sources: &[Source],
    units: UnitSystem,
    outbound: mpsc::Sender<Outbound>,
) {
    let result = aggregator.run_cycle(sources, units).await;
    Dispatcher::new(outbound).dispatch(&result).await;
}
