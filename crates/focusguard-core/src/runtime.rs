//! Async driver for a [`SessionController`].
//!
//! The controller lives inside a single tokio task and is only ever touched
//! from there, so every command, visibility signal and tick is applied one
//! at a time. While a session is active two independent intervals tick the
//! shield and the clock; a one-shot timer covers the delayed grace-expiry
//! fail. Both intervals are dropped the moment the session ends, so nothing
//! fires afterwards.
//!
//! Reward resolution runs in spawned tasks. Persistence requests go through a
//! single worker in the order rewards were applied, so a stored totals row is
//! never overwritten by an older one. Failures in either are logged and never
//! delay the return to Idle.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::integrations::{PersistRequest, PersistenceGateway, RewardDeltas, RewardResolver};
use crate::session::{ActionKind, PlayerTotals, SessionController, SessionSnapshot, SessionSummary};
use crate::shield::Visibility;
use crate::timer::Clock;

const COMMAND_BUFFER: usize = 64;
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);
const MAX_TICK_PERIOD: Duration = Duration::from_secs(60);

enum Command {
    Start {
        action: ActionKind,
        duration_min: u32,
        reply: oneshot::Sender<Result<SessionSnapshot>>,
    },
    Stop {
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
    Visibility(Visibility),
    Snapshot {
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
    Totals {
        reply: oneshot::Sender<PlayerTotals>,
    },
    RewardResolved {
        summary: SessionSummary,
        deltas: RewardDeltas,
    },
}

/// Cloneable client for a running [`FocusRuntime`].
#[derive(Clone)]
pub struct FocusHandle {
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl FocusHandle {
    /// Start a session.
    ///
    /// # Errors
    /// Usage errors from the controller, or [`CoreError::RuntimeClosed`].
    pub async fn start(&self, action: ActionKind, duration_min: u32) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start {
            action,
            duration_min,
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoreError::RuntimeClosed)?
    }

    /// Manual stop. `None` when no session was active.
    ///
    /// # Errors
    /// [`CoreError::RuntimeClosed`] if the runtime has shut down.
    pub async fn stop(&self) -> Result<Option<SessionSummary>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| CoreError::RuntimeClosed)
    }

    /// Forward a platform foreground transition.
    ///
    /// # Errors
    /// [`CoreError::RuntimeClosed`] if the runtime has shut down.
    pub async fn signal(&self, visibility: Visibility) -> Result<()> {
        self.send(Command::Visibility(visibility)).await
    }

    pub async fn hidden(&self) -> Result<()> {
        self.signal(Visibility::Hidden).await
    }

    pub async fn visible(&self) -> Result<()> {
        self.signal(Visibility::Visible).await
    }

    /// # Errors
    /// [`CoreError::RuntimeClosed`] if the runtime has shut down.
    pub async fn snapshot(&self) -> Result<Option<SessionSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| CoreError::RuntimeClosed)
    }

    /// # Errors
    /// [`CoreError::RuntimeClosed`] if the runtime has shut down.
    pub async fn totals(&self) -> Result<PlayerTotals> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Totals { reply }).await?;
        rx.await.map_err(|_| CoreError::RuntimeClosed)
    }

    /// Ask the runtime to stop. An active session is dropped without an outcome.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CoreError::RuntimeClosed)
    }
}

/// A spawned controller task plus its persistence worker.
pub struct FocusRuntime {
    handle: FocusHandle,
    join: JoinHandle<()>,
    persist_join: JoinHandle<()>,
}

impl FocusRuntime {
    /// Spawn `controller` onto the current tokio runtime.
    pub fn spawn<C: Clock + 'static>(
        controller: SessionController<C>,
        resolver: Arc<dyn RewardResolver>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let actor = Actor {
            controller,
            rx,
            self_tx: tx.downgrade(),
            cancel: cancel.clone(),
            resolver,
            persist_tx,
            shield_ticker: None,
            clock_ticker: None,
        };
        let join = tokio::spawn(actor.run());
        let persist_join = tokio::spawn(persist_worker(gateway, persist_rx));
        Self {
            handle: FocusHandle { tx, cancel },
            join,
            persist_join,
        }
    }

    pub fn handle(&self) -> FocusHandle {
        self.handle.clone()
    }

    /// Cancel the actor, then wait for queued persistence to drain.
    pub async fn shutdown(self) {
        self.handle.shutdown();
        if let Err(err) = self.join.await {
            error!(error = %err, "focus runtime task panicked");
        }
        if let Err(err) = self.persist_join.await {
            error!(error = %err, "persistence worker panicked");
        }
    }
}

struct Actor<C: Clock> {
    controller: SessionController<C>,
    rx: mpsc::Receiver<Command>,
    self_tx: mpsc::WeakSender<Command>,
    cancel: CancellationToken,
    resolver: Arc<dyn RewardResolver>,
    persist_tx: mpsc::UnboundedSender<PersistRequest>,
    shield_ticker: Option<Interval>,
    clock_ticker: Option<Interval>,
}

impl<C: Clock + 'static> Actor<C> {
    async fn run(mut self) {
        info!("focus runtime started");
        loop {
            let deadline = self.fail_deadline();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = next_tick(&mut self.shield_ticker) => self.on_shield_tick(),
                _ = next_tick(&mut self.clock_ticker) => self.on_clock_tick(),
                _ = sleep_until_opt(deadline) => self.on_shield_tick(),
            }
            self.sync_tickers();
        }
        if let Some(snapshot) = self.controller.snapshot() {
            warn!(session_id = %snapshot.session_id, "focus runtime stopped with an active session");
        }
        info!("focus runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                action,
                duration_min,
                reply,
            } => {
                let result = self.controller.start(action, duration_min);
                if let Err(err) = &result {
                    debug!(error = %err, "start rejected");
                }
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let summary = self.controller.stop();
                if let Some(summary) = &summary {
                    self.dispatch_reward(summary.clone());
                }
                let _ = reply.send(summary);
            }
            Command::Visibility(visibility) => {
                if let Err(err) = self.controller.on_visibility(visibility) {
                    error!(error = %err, ?visibility, "visibility signal rejected");
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.controller.snapshot());
            }
            Command::Totals { reply } => {
                let _ = reply.send(self.controller.totals());
            }
            Command::RewardResolved { summary, deltas } => {
                let request = self.controller.apply_reward(&summary, deltas);
                if let Err(err) = self.persist_tx.send(request) {
                    warn!(
                        session_id = %err.0.session_id,
                        "persistence worker gone; keeping local totals"
                    );
                }
            }
        }
    }

    fn on_shield_tick(&mut self) {
        match self.controller.tick_shield() {
            Ok(Some(summary)) => self.dispatch_reward(summary),
            Ok(None) => {}
            Err(err) => error!(error = %err, "shield tick failed"),
        }
    }

    fn on_clock_tick(&mut self) {
        if let Some(summary) = self.controller.tick_clock() {
            self.dispatch_reward(summary);
        }
    }

    /// Resolve rewards for a completed session off the actor task.
    fn dispatch_reward(&self, summary: SessionSummary) {
        let Some(request) = summary.reward_request() else {
            return;
        };
        let resolver = self.resolver.clone();
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            match resolver.resolve(&request).await {
                Ok(deltas) => {
                    let Some(tx) = self_tx.upgrade() else {
                        warn!(session_id = %request.session_id, "runtime gone before reward could be applied");
                        return;
                    };
                    if tx
                        .send(Command::RewardResolved { summary, deltas })
                        .await
                        .is_err()
                    {
                        warn!(session_id = %request.session_id, "runtime gone before reward could be applied");
                    }
                }
                Err(err) => warn!(
                    session_id = %request.session_id,
                    error = %err,
                    "reward resolution failed"
                ),
            }
        });
    }

    /// Tickers exist exactly while a session is active.
    fn sync_tickers(&mut self) {
        if self.controller.is_active() {
            if self.shield_ticker.is_none() {
                let period = Duration::from_millis(self.controller.shield_config().tick_interval_ms);
                self.shield_ticker = Some(ticker(period));
            }
            if self.clock_ticker.is_none() {
                let period =
                    Duration::from_millis(self.controller.session_config().clock_tick_interval_ms);
                self.clock_ticker = Some(ticker(period));
            }
        } else {
            self.shield_ticker = None;
            self.clock_ticker = None;
        }
    }

    fn fail_deadline(&self) -> Option<Instant> {
        let due = self.controller.next_deadline_ms()?;
        let now = self.controller.clock().now_ms();
        // A deadline too far out to represent never fires.
        Instant::now().checked_add(Duration::from_millis(due.saturating_sub(now)))
    }
}

/// Persist requests one at a time, in arrival order.
async fn persist_worker(
    gateway: Arc<dyn PersistenceGateway>,
    mut rx: mpsc::UnboundedReceiver<PersistRequest>,
) {
    while let Some(request) = rx.recv().await {
        match gateway.persist(&request).await {
            Ok(()) => debug!(session_id = %request.session_id, "session persisted"),
            Err(err) => warn!(
                session_id = %request.session_id,
                error = %err,
                "persisting session failed; keeping local totals"
            ),
        }
    }
}

fn ticker(period: Duration) -> Interval {
    // `interval_at` panics on a zero period or an unrepresentable start.
    let period = period.clamp(MIN_TICK_PERIOD, MAX_TICK_PERIOD);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
