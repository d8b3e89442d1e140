//! Promotion scheduler
//!
//! A single task owns the `Pipeline` and serializes everything that touches
//! it: periodic ticks and user commands arrive on one `select!` loop, and an
//! export is awaited to completion before the next message is taken. A dump
//! requested while an export is running simply waits in the channel.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::types::ExportManifest;
use crate::utils::current_timestamp_ms;

use super::error::{TierError, TierResult};
use super::export::ExportSink;
use super::pipeline::{EventOutcome, Pipeline, PipelineStats, TickOutcome};
use super::store::KeyValueStore;

/// Produces the value recorded on each tick
pub trait ValueSource: Send {
    fn sample(&mut self) -> f64;
}

impl<F> ValueSource for F
where
    F: FnMut() -> f64 + Send,
{
    fn sample(&mut self) -> f64 {
        self()
    }
}

/// Uniform random values in `[0, 1)`, a stand-in measurement
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueSource for RandomSource {
    fn sample(&mut self) -> f64 {
        self.rng.random()
    }
}

enum Command {
    LogEvent {
        value: String,
        reply: oneshot::Sender<TierResult<EventOutcome>>,
    },
    Dump {
        reply: oneshot::Sender<TierResult<ExportManifest>>,
    },
    Stats {
        reply: oneshot::Sender<TierResult<PipelineStats>>,
    },
    Shutdown,
}

/// Cloneable handle for sending user actions to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Store one event in the persistent tier
    pub async fn log_event(&self, value: impl Into<String>) -> TierResult<EventOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::LogEvent {
            value: value.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TierError::SchedulerStopped)?
    }

    /// Export and clear the persistent tier now, regardless of thresholds
    pub async fn dump_now(&self) -> TierResult<ExportManifest> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Dump { reply }).await?;
        rx.await.map_err(|_| TierError::SchedulerStopped)?
    }

    pub async fn stats(&self) -> TierResult<PipelineStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply }).await?;
        rx.await.map_err(|_| TierError::SchedulerStopped)?
    }

    /// Ask the scheduler to stop after the messages already queued
    pub async fn shutdown(&self) -> TierResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> TierResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TierError::SchedulerStopped)
    }
}

/// Drives the pipeline on a fixed interval
pub struct PromotionScheduler<S, E, V> {
    pipeline: Pipeline<S, E>,
    source: V,
    tick_interval: Duration,
}

impl<S, E, V> PromotionScheduler<S, E, V>
where
    S: KeyValueStore + 'static,
    E: ExportSink + 'static,
    V: ValueSource + 'static,
{
    pub fn new(pipeline: Pipeline<S, E>, source: V) -> Self {
        let tick_interval = pipeline.config().tick_interval();
        Self {
            pipeline,
            source,
            tick_interval,
        }
    }

    /// Start the scheduler on the current runtime
    ///
    /// The join handle yields the pipeline back once the scheduler stops,
    /// either on `shutdown` or when every handle is dropped.
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<Pipeline<S, E>>) {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(self.run(rx));
        (SchedulerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) -> Pipeline<S, E> {
        let mut timer = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.tick_interval.as_millis() as u64, "scheduler started");

        loop {
            tokio::select! {
                _ = timer.tick() => self.on_tick().await,

                command = rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                }
            }
        }

        // Keep buffered samples across restarts
        match self.pipeline.flush() {
            Ok(Some(index)) => tracing::info!(index, "flushed buffered samples on shutdown"),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "failed to flush buffered samples on shutdown"),
        }

        tracing::info!("scheduler stopped");
        self.pipeline
    }

    /// One tick; faults are logged here and never stop the loop
    async fn on_tick(&mut self) {
        let value = self.source.sample();
        let now = current_timestamp_ms();

        match self.pipeline.tick(now, value).await {
            Ok(TickOutcome::Buffered { buffered }) => tracing::trace!(buffered, "sample buffered"),
            Ok(TickOutcome::Exported(manifest)) => {
                tracing::info!(name = %manifest.file_name(), "automatic export completed")
            }
            Ok(outcome) => tracing::debug!(?outcome, "tick completed"),
            Err(e) => tracing::error!(error = %e, "tick failed"),
        }
    }

    async fn handle(&mut self, command: Command) {
        let now = current_timestamp_ms();

        // A dropped reply receiver only means the caller stopped waiting
        match command {
            Command::LogEvent { value, reply } => {
                let _ = reply.send(self.pipeline.log_event(now, value).await);
            }
            Command::Dump { reply } => {
                let _ = reply.send(self.pipeline.dump(now).await);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.pipeline.stats());
            }
            Command::Shutdown => {}
        }
    }
}
