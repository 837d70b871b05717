//! Queue scheduler: drives one item at a time through the pipeline,
//! synthesis and playback, and owns overlay timing.
//!
//! # Flow
//!
//! ```text
//! Command (mpsc) ──┐
//!                  ▼
//!        Scheduler::run()  ← single tokio task, owns QueueState + HistoryLog
//!                  │
//!   advance ───────┼─▶ spawn(run_stages + synthesize) ──▶ Internal::Processed
//!                  │
//!   Processed ─────┼─ blocked, manual ─▶ PendingModeration (slot freed)
//!                  ├─ blocked, auto   ─▶ refund + history + remove
//!                  ├─ failed          ─▶ refund + history + remove
//!                  └─ ready ─┬─ nothing lingering ─▶ show, Play
//!                            └─ A lingering ─▶ cancel timer, hide(A),
//!                                              remove A, settle ─▶ show, Play
//!
//!   playback_finished ─▶ history + Lingering + linger timer ─▶ hide, remove
//! ```
//!
//! Provider calls and timers run in spawned tasks that report back over an
//! internal channel, so the loop itself never waits on the network.  The
//! overlay is the only exclusive resource: a lingering item may overlap with
//! the next item's processing, never with its show.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::actions::{OverlayActuator, RefundActuator, RefundRequest};
use crate::config::AppConfig;
use crate::llm::Moderator;
use crate::tts::{SpeechSynthesizer, SynthesisError, SynthesizedAudio};

use super::history::{HistoryEntry, HistoryLog, HistoryStatus};
use super::item::{EnqueueRequest, InsertPosition, ItemSource, ItemStatus, RequestItem};
use super::stages::{run_stages, StageOutcome, StageRecord};
use super::state::{QueueSnapshot, QueueState};

const COMMAND_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Failures returned to the caller of a scheduler operation.  None of these
/// stop the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("item {0} is not awaiting moderation")]
    NotPendingModeration(Uuid),

    #[error("item {0} is already being processed and cannot be cancelled")]
    NotCancellable(Uuid),

    #[error("history entry not found: {0}")]
    HistoryNotFound(Uuid),

    #[error("history entry {0} was already refunded")]
    AlreadyRefunded(Uuid),

    #[error("history entry {0} has no redemption data")]
    NoRedemptionData(Uuid),

    #[error("history entry {0} has no provider audio to replay")]
    NoProviderHistory(Uuid),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("scheduler is not running")]
    Closed,
}

/// Published by the scheduler for whatever transport is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    QueueUpdated(QueueSnapshot),
    /// Audio for the playback consumer; it answers with `playback_finished`.
    Play { id: Uuid, audio: Vec<u8>, volume: u32 },
    HistoryAdded(HistoryEntry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Allow(InsertPosition),
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueAck {
    pub id: Uuid,
    /// 1-based position in the list at insertion time.
    pub position: usize,
}

/// External collaborators the scheduler drives.
#[derive(Clone)]
pub struct SchedulerDeps {
    /// `None` when no generative provider is configured.
    pub moderator: Option<Arc<Moderator>>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub overlay: Arc<dyn OverlayActuator>,
    pub refunds: Arc<dyn RefundActuator>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, SchedulerError>>;

enum Command {
    Enqueue {
        request: EnqueueRequest,
        reply: oneshot::Sender<EnqueueAck>,
    },
    PlaybackFinished {
        id: Uuid,
        duration_ms: Option<u64>,
    },
    Pause,
    Resume,
    Clear,
    Cancel {
        id: Uuid,
        reply: Reply<()>,
    },
    Moderate {
        id: Uuid,
        action: ModerationAction,
        reply: Reply<()>,
    },
    Replay {
        history_id: Uuid,
        position: InsertPosition,
        use_show_hide: bool,
        reply: Reply<Uuid>,
    },
    RefundHistory {
        history_id: Uuid,
        reply: Reply<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    History {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
}

enum Processed {
    Ready {
        record: StageRecord,
        final_text: String,
        audio: SynthesizedAudio,
    },
    Blocked {
        record: StageRecord,
        reason: String,
    },
    Failed {
        record: Option<StageRecord>,
        final_text: Option<String>,
        error: SynthesisError,
    },
}

struct ReplaySource {
    text: String,
    alias: String,
    username: Option<String>,
    position: InsertPosition,
    use_show_hide: bool,
}

enum Internal {
    Processed {
        id: Uuid,
        result: Processed,
    },
    LingerElapsed {
        id: Uuid,
    },
    SettleElapsed {
        ready: Uuid,
    },
    AllowReady {
        id: Uuid,
        position: InsertPosition,
        text: String,
        result: Result<SynthesizedAudio, SynthesisError>,
        reply: Reply<()>,
    },
    ReplayReady {
        source: ReplaySource,
        result: Result<Vec<u8>, SynthesisError>,
        reply: Reply<Uuid>,
    },
}

// ---------------------------------------------------------------------------
// SchedulerHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable front door to a running [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.tx.send(command).await.map_err(|_| SchedulerError::Closed)
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueAck, SchedulerError> {
        self.call(|reply| Command::Enqueue { request, reply }).await
    }

    /// The playback consumer finished item `id`.
    pub async fn playback_finished(
        &self,
        id: Uuid,
        duration_ms: Option<u64>,
    ) -> Result<(), SchedulerError> {
        self.send(Command::PlaybackFinished { id, duration_ms }).await
    }

    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.send(Command::Resume).await
    }

    /// Drop every queued and held item without refunding.
    pub async fn clear(&self) -> Result<(), SchedulerError> {
        self.send(Command::Clear).await
    }

    pub async fn cancel(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.call(|reply| Command::Cancel { id, reply }).await?
    }

    pub async fn moderate(&self, id: Uuid, action: ModerationAction) -> Result<(), SchedulerError> {
        self.call(|reply| Command::Moderate { id, action, reply })
            .await?
    }

    /// Re-play a history entry's audio; returns the new item's id.
    pub async fn replay(
        &self,
        history_id: Uuid,
        position: InsertPosition,
        use_show_hide: bool,
    ) -> Result<Uuid, SchedulerError> {
        self.call(|reply| Command::Replay {
            history_id,
            position,
            use_show_hide,
            reply,
        })
        .await?
    }

    /// Refund a past request.  `Ok(false)` means the actuator declined.
    pub async fn refund_history(&self, history_id: Uuid) -> Result<bool, SchedulerError> {
        self.call(|reply| Command::RefundHistory { history_id, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, SchedulerError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// History entries, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, SchedulerError> {
        self.call(|reply| Command::History { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the work list.  Build with [`Scheduler::new`], then [`spawn`](Self::spawn).
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use stream_tts::actions::{OverlayActuator, RefundActuator};
/// # use stream_tts::tts::SpeechSynthesizer;
/// # fn parts() -> (Arc<dyn SpeechSynthesizer>, Arc<dyn OverlayActuator>, Arc<dyn RefundActuator>) { unimplemented!() }
/// use stream_tts::config::AppConfig;
/// use stream_tts::pipeline::{EnqueueRequest, HistoryLog, Scheduler, SchedulerDeps};
///
/// # async fn example() {
/// let config = Arc::new(AppConfig::default());
/// let (synthesizer, overlay, refunds) = parts();
/// let deps = SchedulerDeps { moderator: None, synthesizer, overlay, refunds };
/// let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
///
/// let history = HistoryLog::from_config(&config.history);
/// let handle = Scheduler::new(config, deps, history, events_tx).spawn();
/// handle.enqueue(EnqueueRequest { text: "hello chat".into(), ..Default::default() }).await.unwrap();
/// while let Some(event) = events.recv().await { /* forward to clients */ }
/// # }
/// ```
pub struct Scheduler {
    config: Arc<AppConfig>,
    deps: SchedulerDeps,
    state: QueueState,
    history: HistoryLog,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    /// Item currently lingering and its timer.
    lingering: Option<(Uuid, JoinHandle<()>)>,
    /// Held items whose allow is waiting on synthesis.
    allowing: HashSet<Uuid>,
}

impl Scheduler {
    pub fn new(
        config: Arc<AppConfig>,
        deps: SchedulerDeps,
        history: HistoryLog,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            config,
            deps,
            state: QueueState::new(),
            history,
            events,
            internal_tx,
            internal_rx: Some(internal_rx),
            lingering: None,
            allowing: HashSet::new(),
        }
    }

    /// Start the scheduler task.  It stops once every handle is dropped.
    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(self.run(rx));
        SchedulerHandle { tx }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let Some(mut internal) = self.internal_rx.take() else {
            log::error!("scheduler: run called twice");
            return;
        };

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_internal(event).await,
            }
        }

        if let Some((_, timer)) = self.lingering.take() {
            timer.abort();
        }
        log::info!("scheduler: all handles dropped, shutting down");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { request, reply } => {
                let item = RequestItem::new(request, &self.config.default_alias());
                let id = item.id;
                log::info!("scheduler: queued {id} ({} chars)", item.text.chars().count());
                let position = self.state.push(item);
                let _ = reply.send(EnqueueAck { id, position });
                self.notify();
                self.advance();
            }
            Command::PlaybackFinished { id, duration_ms } => {
                self.playback_finished(id, duration_ms);
            }
            Command::Pause => {
                log::info!("scheduler: paused");
                self.state.set_paused(true);
                self.notify();
            }
            Command::Resume => {
                log::info!("scheduler: resumed");
                self.state.set_paused(false);
                self.notify();
                self.advance();
            }
            Command::Clear => self.clear(),
            Command::Cancel { id, reply } => {
                let result = self.cancel(id).await;
                let _ = reply.send(result);
            }
            Command::Moderate { id, action, reply } => self.moderate(id, action, reply).await,
            Command::Replay {
                history_id,
                position,
                use_show_hide,
                reply,
            } => self.replay(history_id, position, use_show_hide, reply),
            Command::RefundHistory { history_id, reply } => {
                let result = self.refund_history(history_id).await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::History { reply } => {
                let _ = reply.send(self.history.entries().cloned().collect());
            }
        }
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Processed { id, result } => {
                self.on_processed(id, result).await;
                self.advance();
            }
            Internal::LingerElapsed { id } => {
                if self.lingering.as_ref().is_some_and(|(l, _)| *l == id) {
                    self.lingering = None;
                    log::debug!("scheduler: linger elapsed for {id}");
                    self.deps.overlay.hide().await;
                    self.state.remove(id);
                    self.notify();
                }
            }
            Internal::SettleElapsed { ready } => {
                self.start_playing(ready).await;
            }
            Internal::AllowReady {
                id,
                position,
                text,
                result,
                reply,
            } => {
                self.allowing.remove(&id);
                let outcome = self.finish_allow(id, position, text, result);
                let _ = reply.send(outcome);
                self.notify();
                self.advance();
            }
            Internal::ReplayReady {
                source,
                result,
                reply,
            } => {
                let outcome = result.map_err(SchedulerError::from).map(|bytes| {
                    let mut item = RequestItem::replay(
                        source.text.clone(),
                        source.alias,
                        source.username,
                        SynthesizedAudio {
                            bytes,
                            history_item_id: None,
                        },
                        source.use_show_hide,
                    );
                    item.final_text = Some(source.text);
                    let id = item.id;
                    log::info!("scheduler: replay {id} queued ({:?})", source.position);
                    self.state.insert(item, source.position);
                    id
                });
                let _ = reply.send(outcome);
                self.notify();
                self.advance();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Advancing
    // -----------------------------------------------------------------------

    /// Start the next queued item if the slot is free and not paused.
    fn advance(&mut self) {
        if self.state.is_paused() || self.state.is_processing() {
            return;
        }
        let Some(id) = self.state.next_queued() else {
            return;
        };
        if !self.state.begin_processing(id) {
            return;
        }
        self.notify();

        let Some(item) = self.state.get(id) else {
            return;
        };

        if item.skips_pipeline() {
            log::debug!("scheduler: {id} ({:?}) skips the pipeline", item.source);
            let _ = self.internal_tx.send(Internal::Processed {
                id,
                result: Processed::Ready {
                    record: StageRecord::default(),
                    final_text: item.final_text.clone().unwrap_or_else(|| item.text.clone()),
                    audio: item.audio.clone().unwrap_or_default(),
                },
            });
            return;
        }

        log::debug!("scheduler: processing {id}");
        let text = item.text.clone();
        let alias = item.alias.clone();
        let config = Arc::clone(&self.config);
        let moderator = self.deps.moderator.clone();
        let synthesizer = Arc::clone(&self.deps.synthesizer);
        let tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = process(&config, moderator.as_deref(), synthesizer.as_ref(), &text, &alias).await;
            let _ = tx.send(Internal::Processed { id, result });
        });
    }

    async fn on_processed(&mut self, id: Uuid, result: Processed) {
        let manual = self.config.review.manual;
        let Some(item) = self.state.get_mut(id) else {
            log::warn!("scheduler: processed item {id} vanished");
            self.state.finish_processing(id);
            return;
        };

        match result {
            Processed::Ready {
                record,
                final_text,
                audio,
            } => {
                if item.source == ItemSource::Normal {
                    apply_record(item, record);
                }
                item.final_text = Some(final_text);
                item.audio = Some(audio);
                self.on_ready(id).await;
            }
            Processed::Blocked { record, reason } => {
                apply_record(item, record);
                item.block_reason = Some(reason.clone());
                self.state.finish_processing(id);

                if manual {
                    log::info!("scheduler: {id} held for review: {reason}");
                    if let Some(item) = self.state.get_mut(id) {
                        item.status = ItemStatus::PendingModeration;
                    }
                    self.notify();
                } else {
                    log::info!("scheduler: {id} blocked: {reason}");
                    self.dispose(
                        id,
                        ItemStatus::Blocked,
                        HistoryStatus::Blocked,
                        Some(format!("Content blocked: {reason}")),
                    )
                    .await;
                }
            }
            Processed::Failed {
                record,
                final_text,
                error,
            } => {
                if let Some(record) = record {
                    apply_record(item, record);
                }
                item.final_text = final_text;
                item.error = Some(error.to_string());
                self.state.finish_processing(id);
                log::error!("scheduler: synthesis failed for {id}: {error}");
                self.dispose(
                    id,
                    ItemStatus::Error,
                    HistoryStatus::Error,
                    Some(format!("TTS error: {error}")),
                )
                .await;
            }
        }
    }

    /// Audio is ready.  Interrupt a lingering item first, if any.
    async fn on_ready(&mut self, id: Uuid) {
        let Some((interrupted, timer)) = self.lingering.take() else {
            self.start_playing(id).await;
            return;
        };

        timer.abort();
        log::debug!("scheduler: {id} interrupts lingering {interrupted}");
        self.deps.overlay.hide().await;
        self.state.remove(interrupted);
        self.notify();

        let settle = Duration::from_millis(self.config.playback.animation_duration_ms);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            sleep(settle).await;
            let _ = tx.send(Internal::SettleElapsed { ready: id });
        });
    }

    async fn start_playing(&mut self, id: Uuid) {
        let global_volume = self.config.playback.global_volume;
        let config = Arc::clone(&self.config);
        let Some(item) = self.state.get_mut(id) else {
            self.state.finish_processing(id);
            return;
        };

        item.status = ItemStatus::Playing;
        let volume = config
            .voice(Some(&item.alias))
            .map(|v| v.volume_or(global_volume))
            .unwrap_or(global_volume);
        let audio = item.audio.as_ref().map(|a| a.bytes.clone()).unwrap_or_default();
        let show = item.drives_overlay().then(|| item.display_text().to_string());

        log::info!("scheduler: playing {id} at volume {volume}");
        if let Some(text) = show {
            self.deps.overlay.show(&text).await;
        }
        self.emit(SchedulerEvent::Play { id, audio, volume });
        self.notify();
    }

    fn playback_finished(&mut self, id: Uuid, duration_ms: Option<u64>) {
        let playing = self
            .state
            .get(id)
            .is_some_and(|i| i.status == ItemStatus::Playing);
        if !playing {
            log::warn!("scheduler: playback_finished for {id}, which is not playing");
            return;
        }

        self.state.finish_processing(id);
        self.write_history(id, HistoryStatus::Completed, duration_ms);

        let lingers = self.state.get(id).is_some_and(|i| i.drives_overlay());
        if lingers {
            if let Some(item) = self.state.get_mut(id) {
                item.status = ItemStatus::Lingering;
            }
            let linger = Duration::from_millis(self.config.playback.minimum_linger_ms);
            let tx = self.internal_tx.clone();
            let timer = tokio::spawn(async move {
                sleep(linger).await;
                let _ = tx.send(Internal::LingerElapsed { id });
            });
            self.lingering = Some((id, timer));
            log::debug!("scheduler: {id} lingering for {} ms", linger.as_millis());
        } else {
            self.state.remove(id);
        }

        self.notify();
        self.advance();
    }

    // -----------------------------------------------------------------------
    // Operator actions
    // -----------------------------------------------------------------------

    fn clear(&mut self) {
        let drained = self.state.drain_waiting();
        log::info!("scheduler: cleared {} waiting item(s)", drained.len());
        for mut item in drained {
            item.status = ItemStatus::Cancelled;
            self.record_item(&item, HistoryStatus::Cancelled, None);
        }
        self.notify();
    }

    async fn cancel(&mut self, id: Uuid) -> Result<(), SchedulerError> {
        let item = self.state.get(id).ok_or(SchedulerError::ItemNotFound(id))?;
        if !item.status.is_waiting() || self.allowing.contains(&id) {
            return Err(SchedulerError::NotCancellable(id));
        }
        log::info!("scheduler: {id} cancelled");
        self.dispose(
            id,
            ItemStatus::Cancelled,
            HistoryStatus::Cancelled,
            Some("Cancelled by streamer".into()),
        )
        .await;
        Ok(())
    }

    async fn moderate(&mut self, id: Uuid, action: ModerationAction, reply: Reply<()>) {
        let item = match self.state.get(id) {
            None => {
                let _ = reply.send(Err(SchedulerError::ItemNotFound(id)));
                return;
            }
            Some(item)
                if item.status != ItemStatus::PendingModeration
                    || self.allowing.contains(&id) =>
            {
                let _ = reply.send(Err(SchedulerError::NotPendingModeration(id)));
                return;
            }
            Some(item) => item,
        };

        match action {
            ModerationAction::Refund => {
                log::info!("scheduler: {id} refunded by moderator");
                self.dispose(
                    id,
                    ItemStatus::Blocked,
                    HistoryStatus::Blocked,
                    Some("Manually refunded by streamer".into()),
                )
                .await;
                let _ = reply.send(Ok(()));
            }
            ModerationAction::Allow(position) => {
                log::info!("scheduler: {id} allowed by moderator, synthesizing");
                let text = item.pre_moderation_text().to_string();
                let voice = self.config.voice(Some(&item.alias)).cloned();
                let alias = item.alias.clone();
                let synthesizer = Arc::clone(&self.deps.synthesizer);
                let tx = self.internal_tx.clone();
                self.allowing.insert(id);

                tokio::spawn(async move {
                    let result = match voice {
                        Some(voice) => synthesizer.synthesize(&text, &voice).await,
                        None => Err(SynthesisError::NoVoice(alias)),
                    };
                    let _ = tx.send(Internal::AllowReady {
                        id,
                        position,
                        text,
                        result,
                        reply,
                    });
                });
            }
        }
    }

    fn finish_allow(
        &mut self,
        id: Uuid,
        position: InsertPosition,
        text: String,
        result: Result<SynthesizedAudio, SynthesisError>,
    ) -> Result<(), SchedulerError> {
        let pending = self
            .state
            .get(id)
            .map(|i| i.status == ItemStatus::PendingModeration)
            .ok_or(SchedulerError::ItemNotFound(id))?;
        if !pending {
            return Err(SchedulerError::NotPendingModeration(id));
        }

        let audio = result.map_err(|e| {
            log::error!("scheduler: synthesis for allowed item {id} failed: {e}");
            e
        })?;

        let Some(mut item) = self.state.remove(id) else {
            return Err(SchedulerError::ItemNotFound(id));
        };
        item.status = ItemStatus::Queued;
        item.source = ItemSource::Moderated;
        item.moderation_override = true;
        item.final_text = Some(text);
        item.audio = Some(audio);
        self.state.insert(item, position);
        log::info!("scheduler: {id} re-queued ({position:?})");
        Ok(())
    }

    fn replay(
        &mut self,
        history_id: Uuid,
        position: InsertPosition,
        use_show_hide: bool,
        reply: Reply<Uuid>,
    ) {
        let Some(entry) = self.history.find(history_id) else {
            let _ = reply.send(Err(SchedulerError::HistoryNotFound(history_id)));
            return;
        };
        let Some(reference) = entry.history_item_id.clone() else {
            let _ = reply.send(Err(SchedulerError::NoProviderHistory(history_id)));
            return;
        };

        let source = ReplaySource {
            text: entry.display_text.clone(),
            alias: entry.voice_alias.clone(),
            username: entry.username.clone(),
            position,
            use_show_hide,
        };
        let synthesizer = Arc::clone(&self.deps.synthesizer);
        let tx = self.internal_tx.clone();

        log::debug!("scheduler: fetching audio {reference} for replay");
        tokio::spawn(async move {
            let result = synthesizer.fetch_history_audio(&reference).await;
            let _ = tx.send(Internal::ReplayReady {
                source,
                result,
                reply,
            });
        });
    }

    async fn refund_history(&mut self, history_id: Uuid) -> Result<bool, SchedulerError> {
        let entry = self
            .history
            .find(history_id)
            .ok_or(SchedulerError::HistoryNotFound(history_id))?;
        if entry.refunded {
            return Err(SchedulerError::AlreadyRefunded(history_id));
        }
        if !entry.has_redemption() {
            return Err(SchedulerError::NoRedemptionData(history_id));
        }

        let request = RefundRequest {
            redemption_id: entry.redemption_id.clone(),
            reward_id: entry.reward_id.clone(),
            username: entry.username.clone(),
            reason: "Manually refunded by streamer".into(),
        };
        let refunded = self.deps.refunds.refund(&request).await;
        if refunded {
            if let Some(entry) = self.history.find_mut(history_id) {
                entry.refunded = true;
            }
        }
        log::info!("scheduler: history {history_id} refund sent: {refunded}");
        Ok(refunded)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Terminal path for blocked, failed and cancelled items: refund when a
    /// reason is given, record history, remove.
    async fn dispose(
        &mut self,
        id: Uuid,
        status: ItemStatus,
        history: HistoryStatus,
        refund_reason: Option<String>,
    ) {
        let Some(mut item) = self.state.remove(id) else {
            return;
        };
        item.status = status;

        if let Some(reason) = refund_reason {
            if item.redemption_id.is_some() && item.reward_id.is_some() {
                let request = RefundRequest {
                    redemption_id: item.redemption_id.clone(),
                    reward_id: item.reward_id.clone(),
                    username: item.username.clone(),
                    reason,
                };
                item.refunded = self.deps.refunds.refund(&request).await;
            }
        }

        self.record_item(&item, history, None);
        self.notify();
    }

    fn write_history(&mut self, id: Uuid, status: HistoryStatus, duration_ms: Option<u64>) {
        if let Some(item) = self.state.get(id).cloned() {
            self.record_item(&item, status, duration_ms);
        }
    }

    fn record_item(&mut self, item: &RequestItem, status: HistoryStatus, duration_ms: Option<u64>) {
        if !item.records_history() {
            return;
        }
        let voice = self.config.voice(Some(&item.alias));
        let entry = HistoryEntry::from_item(item, voice, status, duration_ms);
        self.history.record(entry.clone());
        self.emit(SchedulerEvent::HistoryAdded(entry));
    }

    fn snapshot(&self) -> QueueSnapshot {
        self.state.snapshot(self.lingering.is_some())
    }

    fn notify(&self) {
        self.emit(SchedulerEvent::QueueUpdated(self.snapshot()));
    }

    fn emit(&self, event: SchedulerEvent) {
        if self.events.send(event).is_err() {
            log::debug!("scheduler: no event listener attached");
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Stages plus synthesis for one item, off the scheduler loop.
async fn process(
    config: &AppConfig,
    moderator: Option<&Moderator>,
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    alias: &str,
) -> Processed {
    let voice = config.voice(Some(alias));
    let (record, final_text) = match run_stages(text, config, voice, moderator).await {
        StageOutcome::Blocked { record, reason } => return Processed::Blocked { record, reason },
        StageOutcome::Ready { record, final_text } => (record, final_text),
    };

    let result = match voice {
        Some(voice) => synthesizer.synthesize(&final_text, voice).await,
        None => Err(SynthesisError::NoVoice(alias.to_string())),
    };
    match result {
        Ok(audio) => Processed::Ready {
            record,
            final_text,
            audio,
        },
        Err(error) => Processed::Failed {
            record: Some(record),
            final_text: Some(final_text),
            error,
        },
    }
}

fn apply_record(item: &mut RequestItem, record: StageRecord) {
    item.stages = record.snapshots;
    item.sanitization_applied = record.sanitization_applied;
    item.was_truncated = record.was_truncated;
    item.truncated_by = record.truncated_by;
    item.moderation = record.moderation;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
