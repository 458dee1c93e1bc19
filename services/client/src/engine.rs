//! The status-synchronization engine.
//!
//! One task owns all mutable state ([`StatusFetcher`], [`NotificationMachine`],
//! the alert gate and the scheduler handle). Aligned ticks, bridge messages,
//! user commands and delayed refreshes are all queued onto channels and
//! handled one at a time by the `select!` loop in [`Engine::run`], so two
//! triggers arriving together become two sequential fetches.

use std::sync::Arc;

use qs_protocol::{BridgeMessage, NotificationId, RespondResponse, Verdict};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::alerts::AlertGate;
use crate::api::ApiClient;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::fetcher::{FetchOutcome, StatusFetcher, TriggerReason};
use crate::notification::{NotificationMachine, NotificationPhase, Transition};
use crate::scheduler::{AlignedScheduler, Tick};
use crate::sink::{AlertKind, PresentationSink, StatusSnapshot};

pub const CONNECTIVITY_ALERT: &str =
    "Connection problems: unable to reach the queue server. Retrying automatically.";

#[derive(Debug)]
pub enum EngineCommand {
    Respond {
        verdict: Verdict,
        reply: oneshot::Sender<Result<RespondResponse, ClientError>>,
    },
    Refresh {
        reason: TriggerReason,
    },
    State {
        reply: oneshot::Sender<EngineState>,
    },
    Shutdown,
}

/// Point-in-time view of the engine's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineState {
    pub active_notification_id: Option<NotificationId>,
    pub phase: NotificationPhase,
    pub shown_notification_count: usize,
    pub connected: bool,
    pub consecutive_failures: u32,
    pub fetches: u64,
    pub scheduler_running: bool,
    pub realignments: u64,
    /// Aligned ticks dropped because a fetch was still in progress.
    pub skipped_ticks: u64,
}

#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Answer the active notification.
    pub async fn respond(&self, verdict: Verdict) -> Result<RespondResponse, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Respond { verdict, reply })
            .map_err(|_| ClientError::EngineStopped)?;
        rx.await.map_err(|_| ClientError::EngineStopped)?
    }

    /// Queue an out-of-cadence fetch.
    pub fn refresh(&self, reason: TriggerReason) -> Result<(), ClientError> {
        self.tx
            .send(EngineCommand::Refresh { reason })
            .map_err(|_| ClientError::EngineStopped)
    }

    pub async fn state(&self) -> Result<EngineState, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::State { reply })
            .map_err(|_| ClientError::EngineStopped)?;
        rx.await.map_err(|_| ClientError::EngineStopped)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
    }
}

pub struct Engine<S: PresentationSink> {
    session: SessionConfig,
    clock: Arc<dyn Clock>,
    api: ApiClient,
    fetcher: StatusFetcher,
    machine: NotificationMachine,
    alerts: AlertGate,
    scheduler: AlignedScheduler,
    sink: S,
    bridge_rx: Option<mpsc::UnboundedReceiver<BridgeMessage>>,
    delayed_refresh: Option<JoinHandle<()>>,
}

impl<S: PresentationSink> Engine<S> {
    pub fn new(session: SessionConfig, clock: Arc<dyn Clock>, sink: S) -> Self {
        let api = ApiClient::new(&session);
        Self::with_api(session, clock, sink, api)
    }

    pub fn with_api(session: SessionConfig, clock: Arc<dyn Clock>, sink: S, api: ApiClient) -> Self {
        let scheduler =
            AlignedScheduler::new(Arc::clone(&clock), session.poll_interval, session.drift_margin);
        Self {
            fetcher: StatusFetcher::new(api.clone()),
            machine: NotificationMachine::new(session.notification_timeout),
            alerts: AlertGate::new(session.alert_dismiss),
            scheduler,
            api,
            clock,
            sink,
            session,
            bridge_rx: None,
            delayed_refresh: None,
        }
    }

    /// Receive `REFRESH_STATUS` messages from a push bridge.
    pub fn with_bridge(mut self, rx: mpsc::UnboundedReceiver<BridgeMessage>) -> Self {
        self.bridge_rx = Some(rx);
        self
    }

    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (EngineHandle { tx }, task)
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<EngineCommand>) {
        info!(entry_uuid = %self.session.entry_uuid, "engine starting");
        self.sink.show_connection(false);
        self.fetch_and_apply(TriggerReason::Initial).await;

        // Capacity 1: ticks that land while a fetch is in flight coalesce.
        let (tick_tx, mut ticks) = mpsc::channel::<Tick>(1);
        self.scheduler.start(tick_tx);
        let (refresh_tx, mut delayed) = mpsc::unbounded_channel::<TriggerReason>();

        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    None | Some(EngineCommand::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd, &refresh_tx).await,
                },
                Some(reason) = delayed.recv() => {
                    self.delayed_refresh = None;
                    self.fetch_and_apply(reason).await;
                }
                Some(msg) = next_bridge_message(&mut self.bridge_rx) => {
                    let BridgeMessage::RefreshStatus(refresh) = msg;
                    debug!(pushed_at = refresh.timestamp, "refresh requested by push bridge");
                    self.fetch_and_apply(TriggerReason::PushNotification).await;
                }
                Some(tick) = ticks.recv() => {
                    debug!(seq = tick.seq, at = %tick.at, "aligned tick");
                    self.fetch_and_apply(TriggerReason::Aligned).await;
                }
            }
        }

        self.stop();
    }

    fn stop(&mut self) {
        self.scheduler.stop();
        if let Some(task) = self.delayed_refresh.take() {
            task.abort();
        }
        info!("engine stopped");
    }

    async fn handle_command(
        &mut self,
        cmd: EngineCommand,
        refresh_tx: &mpsc::UnboundedSender<TriggerReason>,
    ) {
        match cmd {
            EngineCommand::Respond { verdict, reply } => {
                let result = self.respond(verdict, refresh_tx).await;
                let _ = reply.send(result);
            }
            EngineCommand::Refresh { reason } => self.fetch_and_apply(reason).await,
            EngineCommand::State { reply } => {
                let _ = reply.send(self.state());
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn state(&self) -> EngineState {
        let stats = self.scheduler.stats();
        EngineState {
            active_notification_id: self.machine.active_id().cloned(),
            phase: self.machine.phase(),
            shown_notification_count: self.machine.shown_count(),
            connected: self.fetcher.is_connected(),
            consecutive_failures: self.fetcher.consecutive_failures(),
            fetches: self.fetcher.fetches(),
            scheduler_running: self.scheduler.is_running(),
            realignments: stats.realignments(),
            skipped_ticks: stats.coalesced(),
        }
    }

    async fn fetch_and_apply(&mut self, reason: TriggerReason) {
        let was_connected = self.fetcher.is_connected();
        match self.fetcher.fetch(reason).await {
            FetchOutcome::Updated(resp) => {
                let transition = self.machine.observe(&resp);
                if !was_connected {
                    self.sink.show_connection(true);
                }
                self.sink
                    .show_status(&StatusSnapshot::from_response(&resp, self.clock.now()));
                self.apply_transition(transition);
            }
            FetchOutcome::Failed {
                consecutive_failures,
                ..
            } => {
                if was_connected {
                    self.sink.show_connection(false);
                }
                if consecutive_failures >= self.session.failure_alert_threshold
                    && self.alerts.try_raise(Instant::now())
                {
                    warn!(consecutive_failures, "raising connectivity alert");
                    self.sink.show_alert(AlertKind::Warning, CONNECTIVITY_ALERT);
                }
            }
        }
    }

    async fn respond(
        &mut self,
        verdict: Verdict,
        refresh_tx: &mpsc::UnboundedSender<TriggerReason>,
    ) -> Result<RespondResponse, ClientError> {
        let id = match self.machine.begin_response() {
            Ok(id) => id,
            Err(e) => {
                warn!(%verdict, error = %e, "response rejected locally");
                self.user_alert(AlertKind::Warning, local_rejection_message(&e));
                return Err(e);
            }
        };

        info!(notification_id = %id, %verdict, "sending response");
        match self.api.respond(&id, verdict).await {
            Ok(resp) => {
                let transition = self.machine.finish_response(true);
                self.apply_transition(transition);
                let message = resp.message.clone().unwrap_or_else(|| match verdict {
                    Verdict::Accepted => "Response accepted.".to_owned(),
                    Verdict::Declined => "Response declined.".to_owned(),
                });
                self.user_alert(AlertKind::Success, &message);
                self.schedule_refresh(refresh_tx);
                Ok(resp)
            }
            Err(e) => {
                self.machine.finish_response(false);
                warn!(notification_id = %id, error = %e, "response failed, notification kept");
                self.user_alert(AlertKind::Error, &format!("Could not send your response: {e}"));
                Err(e)
            }
        }
    }

    /// One fetch `refresh_delay` from now, outside the aligned cadence.
    fn schedule_refresh(&mut self, refresh_tx: &mpsc::UnboundedSender<TriggerReason>) {
        if let Some(task) = self.delayed_refresh.take() {
            task.abort();
        }
        let delay = self.session.refresh_delay;
        let tx = refresh_tx.clone();
        self.delayed_refresh = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TriggerReason::PostResponse);
        }));
    }

    fn user_alert(&mut self, kind: AlertKind, message: &str) {
        self.alerts.raise(Instant::now());
        self.sink.show_alert(kind, message);
    }

    fn apply_transition(&mut self, transition: Transition) {
        match transition {
            Transition::Surfaced(prompt) => {
                info!(id = %prompt.id, kind = ?prompt.kind, "notification surfaced");
                self.sink.show_notification(&prompt);
            }
            Transition::Cleared => self.sink.hide_notification(),
            Transition::Unchanged => {}
        }
    }
}

/// User-facing text for a response refused before any request is sent.
fn local_rejection_message(error: &ClientError) -> &'static str {
    match error {
        ClientError::ResponseInFlight => "Your previous response is still being sent.",
        _ => "There is no notification to respond to.",
    }
}

async fn next_bridge_message(
    rx: &mut Option<mpsc::UnboundedReceiver<BridgeMessage>>,
) -> Option<BridgeMessage> {
    let Some(inner) = rx.as_mut() else {
        return std::future::pending().await;
    };
    let msg = inner.recv().await;
    if msg.is_none() {
        debug!("push bridge channel closed");
        *rx = None;
    }
    msg
}
