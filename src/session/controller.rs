//! Session controller: runs the state machine and executes its effects
//!
//! The controller owns the event loop. Every transition goes through
//! `reduce()`; effects are executed on spawned tasks and report back as
//! events on the same channel. All collaborators (backend API, store,
//! playback) are injected at construction; nothing reaches for globals.
//!
//! Two channel rules keep the loop honest:
//! - the loop itself holds only a `WeakSender` for events, so `recv()`
//!   returns `None` once every external sender and effect task is done
//! - all narration flows through one speech queue task, so clips play
//!   strictly in order and never overlap

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::api::{ApiClient, ContentType, SessionEntry};
use crate::audio::{AudioCaptureManager, CaptureConfig, CaptureHandle};
use crate::playback::Playback;
use crate::settings::AppSettings;
use crate::store::StoreClient;
use crate::streaming::{
    resolve_stream_token, StreamingClient, StreamingEvent, TranscriptAggregator,
    STREAM_SAMPLE_RATE,
};

use super::questions::{self, narratives, QUESTION_SEQUENCE};
use super::state::{reduce, Effect, Event, State};
use super::strategy::{
    BatchStrategy, FinishedAttempt, StrategyPolicy, StreamingStrategy, TranscribeError,
    TranscriptionStrategy,
};

/// One answered question, as held in memory for the final session
/// analysis. The store receives the same data incrementally.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub question_index: usize,
    pub transcript: String,
    pub analysis: Option<String>,
    pub follow_up_transcript: Option<String>,
    pub follow_up_analysis: Option<String>,
}

/// What a finished session leaves behind.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub responses: Vec<ResponseRecord>,
}

/// Live streaming attachment for one recording attempt.
struct StreamingAttachment {
    client: Arc<Mutex<StreamingClient>>,
    aggregator: Arc<std::sync::Mutex<TranscriptAggregator>>,
    forward_task: tokio::task::JoinHandle<()>,
    events_task: tokio::task::JoinHandle<()>,
}

/// Per-attempt bookkeeping, keyed by attempt id.
#[derive(Default)]
struct AttemptSlot {
    handle: Option<CaptureHandle>,
    streaming: Option<StreamingAttachment>,
    finished: Option<FinishedAttempt>,
}

/// In-memory session records, shared with effect tasks.
#[derive(Default)]
struct SessionRecords {
    session_id: Option<Uuid>,
    /// prompt text -> question row id, loaded from the store
    question_ids: HashMap<String, Uuid>,
    responses: Vec<ResponseRecord>,
    display_name: Option<String>,
}

struct Ctx {
    api: ApiClient,
    store: Option<StoreClient>,
    playback: Arc<dyn Playback>,
    settings: AppSettings,
    guest_id: Uuid,
    assemblyai_api_key: Option<String>,
    capture: AudioCaptureManager,
    attempts: Mutex<HashMap<Uuid, AttemptSlot>>,
    policy: Mutex<StrategyPolicy>,
    records: Mutex<SessionRecords>,
}

/// One clip for the speech queue.
struct SpeechItem {
    text: String,
    content_type: ContentType,
    /// Pre-rendered audio path on the backend, when one exists
    tts_path: Option<String>,
    /// Send `PlaybackDone` after this clip (question prompts only)
    signals_ready: bool,
}

pub struct SessionController {
    state: State,
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    ctx: Arc<Ctx>,
}

impl SessionController {
    pub fn new(
        api: ApiClient,
        store: Option<StoreClient>,
        playback: Arc<dyn Playback>,
        settings: AppSettings,
        guest_id: Uuid,
        assemblyai_api_key: Option<String>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(32);

        let capture = AudioCaptureManager::new(CaptureConfig {
            target_sample_rate: STREAM_SAMPLE_RATE,
            frame_size: 1024,
            max_duration: Duration::from_secs(settings.max_recording_secs),
        });

        // The token endpoint works without a local key, so streaming is
        // attempted whenever it is enabled; connect failures demote to
        // batch at runtime
        let policy = StrategyPolicy::new(settings.streaming_enabled);

        let ctx = Arc::new(Ctx {
            api,
            store,
            playback,
            settings,
            guest_id,
            assemblyai_api_key,
            capture,
            attempts: Mutex::new(HashMap::new()),
            policy: Mutex::new(policy),
            records: Mutex::new(SessionRecords::default()),
        });

        Self {
            state: State::default(),
            tx,
            rx,
            ctx,
        }
    }

    /// Sender for user commands and external events.
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.tx.clone()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Create the store session row and load the question id map.
    /// Best effort: without a store the interview still runs.
    pub async fn init(&self) {
        if self.ctx.settings.pre_cache_narratives {
            if let Err(e) = self.ctx.api.pre_cache_narratives(self.ctx.settings.voice).await {
                log::warn!("Narrative pre-cache failed: {}", e);
            }
        }

        let store = match &self.ctx.store {
            Some(s) => s.clone(),
            None => {
                log::info!("No store configured; running without persistence");
                return;
            }
        };

        match store.create_session(self.ctx.guest_id).await {
            Ok(id) => {
                self.ctx.records.lock().await.session_id = Some(id);
            }
            Err(e) => log::warn!("Session row creation failed (continuing): {}", e),
        }

        match store.load_questions().await {
            Ok(rows) => {
                let mut records = self.ctx.records.lock().await;
                for row in rows {
                    records.question_ids.insert(row.prompt, row.id);
                }
                log::info!("Loaded {} question ids from store", records.question_ids.len());
            }
            Err(e) => log::warn!("Question load failed (continuing): {}", e),
        }
    }

    /// Run the event loop until the session completes or every sender is
    /// gone. The loop itself keeps only a weak sender, so dropping all
    /// external senders (and finishing all effect tasks) ends it.
    pub async fn run(self) -> SessionSummary {
        let SessionController {
            mut state,
            tx,
            mut rx,
            ctx,
        } = self;

        log::info!("Session loop started (guest {})", ctx.guest_id);

        let events = tx.downgrade();
        drop(tx);

        let (speech_tx, speech_rx) = mpsc::channel::<SpeechItem>(32);
        let speech_task = tokio::spawn(speech_loop(ctx.clone(), speech_rx, events.clone()));

        let mut runner = EffectRunner {
            ctx: ctx.clone(),
            events,
            speech_tx,
            finalize_task: None,
        };

        while let Some(event) = rx.recv().await {
            log::debug!("Event: {:?}", event);

            let old = std::mem::discriminant(&state);
            let (next, effects) = reduce(&state, event);
            if old != std::mem::discriminant(&next) {
                log::info!("State: {:?} -> {:?}", state, next);
            }
            state = next;

            runner.apply(&state, effects).await;

            if matches!(state, State::Completed) {
                break;
            }
        }

        // Close the speech queue and let it drain (the outro plays here),
        // then wait for finalization
        let EffectRunner {
            speech_tx,
            finalize_task,
            ..
        } = runner;
        drop(speech_tx);
        let _ = speech_task.await;
        if let Some(task) = finalize_task {
            let _ = task.await;
        }

        let records = ctx.records.lock().await;
        log::info!(
            "Session loop ended: {} responses recorded",
            records.responses.len()
        );
        SessionSummary {
            session_id: records.session_id,
            display_name: records.display_name.clone(),
            responses: records.responses.clone(),
        }
    }
}

/// Executes effects on spawned tasks. Holds only a weak event sender;
/// each task upgrades it for the duration of its own reporting, so the
/// channel closes once external senders and in-flight tasks are done.
struct EffectRunner {
    ctx: Arc<Ctx>,
    events: mpsc::WeakSender<Event>,
    speech_tx: mpsc::Sender<SpeechItem>,
    finalize_task: Option<tokio::task::JoinHandle<()>>,
}

impl EffectRunner {
    async fn apply(&mut self, state: &State, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SpeakIntro => {
                    self.queue_speech(narratives::INTRO, ContentType::Narrative, None, false)
                        .await;
                }
                Effect::SpeakQuestion { index } => {
                    self.queue_speech(
                        QUESTION_SEQUENCE[index].prompt,
                        ContentType::Question,
                        None,
                        true,
                    )
                    .await;
                }
                Effect::SpeakAcknowledgment { name } => {
                    let text = questions::identity_acknowledgment(&name);
                    self.queue_speech(&text, ContentType::Greeting, None, false)
                        .await;
                }
                Effect::PlayAnalysis { analysis, tts_path } => {
                    self.queue_speech(&analysis, ContentType::Narrative, tts_path, false)
                        .await;
                }
                Effect::SpeakOutro => {
                    self.queue_speech(narratives::OUTRO, ContentType::Outro, None, false)
                        .await;
                }

                Effect::EmitUi => log::debug!("UI state: {:?}", state),

                Effect::StartCapture { id } => self.spawn_start_capture(id),
                Effect::StopCapture { id } => self.spawn_stop_capture(id),
                Effect::StartRecordingTick { id } => self.spawn_recording_tick(id),
                Effect::Transcribe { id } => self.spawn_transcribe(id),
                Effect::Analyze {
                    id,
                    question_index,
                    transcript,
                    follow_up,
                } => self.spawn_analyze(id, question_index, transcript, follow_up),
                Effect::SaveDisplayName { name } => self.spawn_save_display_name(name),
                Effect::SaveResponse {
                    question_index,
                    transcript,
                    analysis,
                    follow_up,
                } => self.spawn_save_response(question_index, transcript, analysis, follow_up),
                Effect::NotifyNoSpeech { message } => {
                    log::warn!("No speech: {}", message);
                    self.queue_speech(narratives::NO_SPEECH, ContentType::Narrative, None, false)
                        .await;
                }
                Effect::NotifyError { message } => {
                    log::error!("{}", message);
                    self.queue_speech(narratives::ERROR, ContentType::Narrative, None, false)
                        .await;
                }
                Effect::FinalizeSession => self.spawn_finalize(),
            }
        }
    }

    async fn queue_speech(
        &self,
        text: &str,
        content_type: ContentType,
        tts_path: Option<String>,
        signals_ready: bool,
    ) {
        let item = SpeechItem {
            text: text.to_string(),
            content_type,
            tts_path,
            signals_ready,
        };
        if self.speech_tx.send(item).await.is_err() {
            log::debug!("Speech queue closed, dropping clip");
        }
    }

    /// Strong event sender for an effect task. Fails only while the loop
    /// is already winding down.
    fn event_sender(&self) -> Option<mpsc::Sender<Event>> {
        let tx = self.events.upgrade();
        if tx.is_none() {
            log::debug!("Event channel closed, skipping effect");
        }
        tx
    }

    fn spawn_start_capture(&self, id: Uuid) {
        let ctx = self.ctx.clone();
        let tx = match self.event_sender() {
            Some(tx) => tx,
            None => return,
        };

        tokio::spawn(async move {
            let (frames_tx, frames_rx) = mpsc::channel::<Vec<i16>>(100);

            // Streaming first: if it can't come up, this attempt (and the
            // rest of the session) runs batch
            let streaming = if ctx.policy.lock().await.is_streaming() {
                match connect_streaming(&ctx).await {
                    Ok(attachment) => Some(attachment),
                    Err(e) => {
                        log::warn!("Streaming setup failed: {}", e);
                        ctx.policy.lock().await.note_streaming_failure();
                        None
                    }
                }
            } else {
                None
            };

            let streaming = streaming.map(|parts| parts.into_attachment(frames_rx));

            // Device open blocks; keep it off the runtime workers
            let blocking_ctx = ctx.clone();
            let start_result = tokio::task::spawn_blocking(move || {
                blocking_ctx.capture.start(id, frames_tx)
            })
            .await
            .unwrap_or_else(|e| {
                Err(crate::audio::AudioError::StreamCreationFailed(
                    e.to_string(),
                ))
            });

            match start_result {
                Ok((handle, wav_path)) => {
                    log::info!("Recording started: {:?}", wav_path);
                    let mut attempts = ctx.attempts.lock().await;
                    attempts.insert(
                        id,
                        AttemptSlot {
                            handle: Some(handle),
                            streaming,
                            finished: None,
                        },
                    );
                    drop(attempts);
                    let _ = tx.send(Event::CaptureStarted { id }).await;
                }
                Err(err) => {
                    log::error!("Failed to start capture: {}", err);
                    if let Some(attachment) = streaming {
                        teardown_streaming(attachment).await;
                    }
                    let _ = tx
                        .send(Event::CaptureStartFailed {
                            id,
                            err: err.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    fn spawn_stop_capture(&self, id: Uuid) {
        let ctx = self.ctx.clone();
        let tx = match self.event_sender() {
            Some(tx) => tx,
            None => return,
        };

        tokio::spawn(async move {
            let (handle, streaming) = {
                let mut attempts = ctx.attempts.lock().await;
                match attempts.get_mut(&id) {
                    Some(slot) => (slot.handle.take(), slot.streaming.take()),
                    None => (None, None),
                }
            };

            // Drain the streaming side first so the aggregate reflects
            // everything the service already sent
            let streaming_transcript = match streaming {
                Some(attachment) => Some(teardown_streaming(attachment).await),
                None => None,
            };

            let wav_path = match handle {
                Some(handle) => {
                    match tokio::task::spawn_blocking(move || handle.stop()).await {
                        Ok(Ok(path)) => Some(path),
                        Ok(Err(e)) => {
                            log::error!("Capture stop failed: {}", e);
                            None
                        }
                        Err(e) => {
                            log::error!("Capture stop task failed: {}", e);
                            None
                        }
                    }
                }
                None => None,
            };

            if let Some(path) = wav_path {
                let mut attempts = ctx.attempts.lock().await;
                if let Some(slot) = attempts.get_mut(&id) {
                    slot.finished = Some(FinishedAttempt {
                        wav_path: path,
                        streaming_transcript,
                    });
                }
            }

            let _ = tx.send(Event::CaptureStopped { id }).await;
        });
    }

    fn spawn_recording_tick(&self, id: Uuid) {
        let ctx = self.ctx.clone();
        let tx = match self.event_sender() {
            Some(tx) => tx,
            None => return,
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                // Stop ticking once the attempt's capture handle is gone
                {
                    let attempts = ctx.attempts.lock().await;
                    match attempts.get(&id) {
                        Some(slot) if slot.handle.is_some() => {}
                        _ => break,
                    }
                }
                if tx.send(Event::RecordingTick { id }).await.is_err() {
                    break;
                }
            }
        });
    }

    fn spawn_transcribe(&self, id: Uuid) {
        let ctx = self.ctx.clone();
        let tx = match self.event_sender() {
            Some(tx) => tx,
            None => return,
        };

        tokio::spawn(async move {
            let finished = {
                let mut attempts = ctx.attempts.lock().await;
                attempts.remove(&id).and_then(|slot| slot.finished)
            };

            let finished = match finished {
                Some(f) => f,
                None => {
                    let _ = tx
                        .send(Event::TranscribeFailed {
                            id,
                            err: "recording was not captured".to_string(),
                        })
                        .await;
                    return;
                }
            };

            // An attempt that streamed uses its aggregate; anything else
            // (batch mode, or the attempt on which streaming setup died)
            // uploads the clip
            let strategy: Box<dyn TranscriptionStrategy> =
                if finished.streaming_transcript.is_some() {
                    Box::new(StreamingStrategy)
                } else {
                    Box::new(BatchStrategy::new(ctx.api.clone()))
                };

            log::info!("Transcribing attempt {} via {}", id, strategy.name());

            let result = strategy.transcribe(&finished).await;

            // Clips are transient; keep the cache small
            if let Err(e) = crate::audio::paths::cleanup_old_clips() {
                log::debug!("Clip cleanup failed: {}", e);
            }

            match result {
                Ok(text) => {
                    let _ = tx.send(Event::TranscriptReady { id, text }).await;
                }
                Err(TranscribeError::NoSpeech { message }) => {
                    let _ = tx.send(Event::NoSpeechDetected { id, message }).await;
                }
                Err(TranscribeError::Failed(err)) => {
                    let _ = tx.send(Event::TranscribeFailed { id, err }).await;
                }
            }
        });
    }

    fn spawn_analyze(&self, id: Uuid, question_index: usize, transcript: String, follow_up: bool) {
        let ctx = self.ctx.clone();
        let tx = match self.event_sender() {
            Some(tx) => tx,
            None => return,
        };

        tokio::spawn(async move {
            let prompt = QUESTION_SEQUENCE[question_index].prompt;
            let voice = ctx.settings.voice;

            let result = if follow_up {
                let original_answer = {
                    let records = ctx.records.lock().await;
                    records
                        .responses
                        .iter()
                        .rev()
                        .find(|r| r.question_index == question_index)
                        .map(|r| r.transcript.clone())
                        .unwrap_or_default()
                };
                ctx.api
                    .analyze_followup(prompt, &original_answer, &transcript, voice)
                    .await
            } else {
                ctx.api.analyze_and_tts(prompt, &transcript, voice).await
            };

            match result {
                Ok(response) => {
                    let _ = tx
                        .send(Event::AnalysisReady {
                            id,
                            analysis: response.analysis,
                            tts_path: response.tts_path,
                        })
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(Event::AnalysisFailed {
                            id,
                            err: e.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    fn spawn_save_display_name(&self, name: String) {
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            log::info!("Display name captured: {}", name);
            ctx.records.lock().await.display_name = Some(name.clone());

            if let Some(store) = &ctx.store {
                if let Err(e) = store.save_display_name(ctx.guest_id, &name).await {
                    log::warn!("Display name save failed (continuing): {}", e);
                }
            }
        });
    }

    fn spawn_save_response(
        &self,
        question_index: usize,
        transcript: String,
        analysis: Option<String>,
        follow_up: bool,
    ) {
        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            {
                let mut records = ctx.records.lock().await;
                if follow_up {
                    if let Some(record) = records
                        .responses
                        .iter_mut()
                        .rev()
                        .find(|r| r.question_index == question_index)
                    {
                        record.follow_up_transcript = Some(transcript.clone());
                        record.follow_up_analysis = analysis.clone();
                    }
                } else {
                    records.responses.push(ResponseRecord {
                        question_index,
                        transcript: transcript.clone(),
                        analysis: analysis.clone(),
                        follow_up_transcript: None,
                        follow_up_analysis: None,
                    });
                }
            }

            // Persistence is best effort; a store failure never blocks
            // the interview
            let store = match &ctx.store {
                Some(s) => s.clone(),
                None => return,
            };

            let (session_id, question_id) = {
                let records = ctx.records.lock().await;
                let prompt = QUESTION_SEQUENCE[question_index].prompt;
                (
                    records.session_id,
                    records.question_ids.get(prompt).copied(),
                )
            };

            let session_id = match session_id {
                Some(id) => id,
                None => {
                    log::warn!("No session row; answer not persisted");
                    return;
                }
            };
            let question_id = match question_id {
                Some(id) => id,
                None => {
                    log::warn!(
                        "Question {} not found in store; answer not persisted",
                        question_index
                    );
                    return;
                }
            };

            if let Err(e) = store.save_answer(session_id, question_id, &transcript).await {
                log::warn!("Answer save failed (continuing): {}", e);
                return;
            }

            if let Some(analysis) = analysis {
                if let Err(e) = store
                    .extract_nlp_data(session_id, &transcript, &analysis)
                    .await
                {
                    log::warn!("NLP extraction trigger failed (continuing): {}", e);
                }
            }
        });
    }

    fn spawn_finalize(&mut self) {
        let ctx = self.ctx.clone();

        // Runs independently of the interview flow; run() awaits it
        // before returning so the process doesn't cut it off
        let task = tokio::spawn(async move {
            let (session_id, entries) = {
                let records = ctx.records.lock().await;
                let entries: Vec<SessionEntry> = records
                    .responses
                    .iter()
                    .map(|r| SessionEntry {
                        question: QUESTION_SEQUENCE[r.question_index].prompt.to_string(),
                        answer: r.transcript.clone(),
                    })
                    .collect();
                (records.session_id, entries)
            };

            if !entries.is_empty() {
                match ctx.api.analyze_session(&entries).await {
                    Ok(_) => log::info!("Whole-session analysis complete"),
                    Err(e) => log::warn!("Whole-session analysis failed: {}", e),
                }
            }

            let store = match &ctx.store {
                Some(s) => s.clone(),
                None => return,
            };

            if let Some(session_id) = session_id {
                if let Err(e) = store.end_session(session_id).await {
                    log::warn!("Session end write failed: {}", e);
                }
            }

            if let Err(e) = store.recompute_profile(ctx.guest_id).await {
                log::warn!("Profile recomputation failed: {}", e);
            }

            log::info!("Session finalized");
        });
        self.finalize_task = Some(task);
    }
}

/// Single consumer of the speech queue: plays clips strictly in order,
/// and sends `PlaybackDone` after each clip that asked for it. Exits when
/// the queue closes and the remaining clips have played.
async fn speech_loop(
    ctx: Arc<Ctx>,
    mut rx: mpsc::Receiver<SpeechItem>,
    events: mpsc::WeakSender<Event>,
) {
    while let Some(item) = rx.recv().await {
        speak(&ctx, &item.text, item.content_type, item.tts_path.as_deref()).await;

        if item.signals_ready {
            if let Some(tx) = events.upgrade() {
                let _ = tx.send(Event::PlaybackDone).await;
            }
        }
    }
    log::debug!("Speech queue drained");
}

/// Synthesize (or fetch) and play one piece of narration. Failures are
/// logged and swallowed: losing a spoken line never stalls the interview.
async fn speak(ctx: &Arc<Ctx>, text: &str, content_type: ContentType, tts_path: Option<&str>) {
    let audio = match tts_path {
        Some(path) => ctx.api.fetch_audio(path).await,
        None => {
            ctx.api
                .text_to_speech(text, ctx.settings.voice, content_type)
                .await
        }
    };

    let audio = match audio {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("TTS unavailable ({}); continuing without audio", e);
            return;
        }
    };

    let playback = ctx.playback.clone();
    let result = tokio::task::spawn_blocking(move || playback.play(&audio)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Playback failed: {}", e),
        Err(e) => log::warn!("Playback task failed: {}", e),
    }
}

/// Connected streaming client waiting for its frame source.
struct StreamingParts {
    client: Arc<Mutex<StreamingClient>>,
    aggregator: Arc<std::sync::Mutex<TranscriptAggregator>>,
    events_task: tokio::task::JoinHandle<()>,
}

impl StreamingParts {
    /// Wire the capture frame channel to the socket. The forwarder exits
    /// on its own when the capture side drops the sender.
    fn into_attachment(self, mut frames_rx: mpsc::Receiver<Vec<i16>>) -> StreamingAttachment {
        let client = self.client.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                let mut client = client.lock().await;
                if let Err(e) = client.send_audio(&frame).await {
                    log::warn!("Frame send failed, stopping forwarder: {}", e);
                    break;
                }
            }
            log::debug!("Frame forwarder exiting");
        });

        StreamingAttachment {
            client: self.client,
            aggregator: self.aggregator,
            forward_task,
            events_task: self.events_task,
        }
    }
}

/// Connect the streaming client for one attempt and start its event
/// consumer. The aggregator accumulates transcripts as they arrive.
async fn connect_streaming(ctx: &Arc<Ctx>) -> Result<StreamingParts, String> {
    let token = resolve_stream_token(&ctx.api, ctx.assemblyai_api_key.as_deref())
        .await
        .map_err(|e| e.to_string())?;

    let (client, mut events_rx) = StreamingClient::connect(&token, STREAM_SAMPLE_RATE)
        .await
        .map_err(|e| e.to_string())?;

    let aggregator = Arc::new(std::sync::Mutex::new(TranscriptAggregator::new()));
    let task_aggregator = aggregator.clone();

    let events_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                StreamingEvent::Transcript(transcript) => {
                    if let Ok(mut agg) = task_aggregator.lock() {
                        let live = agg.process(&transcript);
                        log::debug!("Live transcript: {}", live);
                    }
                }
                StreamingEvent::Error(e) => {
                    // Terminal for this attempt's stream; the WAV backstop
                    // still captures the answer
                    log::warn!("Streaming error mid-recording: {}", e);
                }
                StreamingEvent::Closed => break,
            }
        }
    });

    Ok(StreamingParts {
        client: Arc::new(Mutex::new(client)),
        aggregator,
        events_task,
    })
}

/// Terminate the stream, close the socket, and return the final
/// aggregated transcript (completed turns only).
async fn teardown_streaming(attachment: StreamingAttachment) -> String {
    {
        let mut client = attachment.client.lock().await;
        client.end_stream().await;
    }

    // Give the last Turn a moment to arrive; anything later is treated as
    // superseded
    tokio::time::sleep(Duration::from_millis(500)).await;

    {
        let mut client = attachment.client.lock().await;
        client.close().await;
    }
    attachment.forward_task.abort();
    attachment.events_task.abort();

    let transcript = attachment
        .aggregator
        .lock()
        .map(|agg| agg.transcript().to_string())
        .unwrap_or_default();
    log::info!("Streaming transcript: {} chars", transcript.len());
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::NullPlayback;

    fn controller() -> SessionController {
        SessionController::new(
            ApiClient::new("http://127.0.0.1:1/api"),
            None,
            Arc::new(NullPlayback),
            AppSettings::default(),
            Uuid::new_v4(),
            None,
        )
    }

    fn test_ctx() -> Arc<Ctx> {
        Arc::new(Ctx {
            api: ApiClient::new("http://127.0.0.1:1/api"),
            store: None,
            playback: Arc::new(NullPlayback),
            settings: AppSettings::default(),
            guest_id: Uuid::new_v4(),
            assemblyai_api_key: None,
            capture: AudioCaptureManager::new(CaptureConfig::default()),
            attempts: Mutex::new(HashMap::new()),
            policy: Mutex::new(StrategyPolicy::new(false)),
            records: Mutex::new(SessionRecords::default()),
        })
    }

    #[tokio::test]
    async fn test_controller_starts_idle() {
        let controller = controller();
        assert!(matches!(controller.state(), State::Idle));
    }

    #[tokio::test]
    async fn test_run_exits_when_senders_drop() {
        // The loop holds only a weak sender, so dropping the last external
        // sender ends recv() and run() returns instead of pending forever.
        let controller = controller();
        let tx = controller.sender();
        drop(tx);
        let summary = controller.run().await;
        assert!(summary.responses.is_empty());
        assert!(summary.session_id.is_none());
    }

    #[tokio::test]
    async fn test_end_session_completes_and_returns_summary() {
        let controller = controller();
        let tx = controller.sender();

        let run = tokio::spawn(controller.run());
        tx.send(Event::StartSession).await.unwrap();
        tx.send(Event::EndSession).await.unwrap();

        let summary = run.await.unwrap();
        assert!(summary.responses.is_empty());
        assert!(summary.display_name.is_none());
    }

    #[tokio::test]
    async fn test_speech_queue_plays_in_order_and_signals_once() {
        // Clips are consumed by one task in queue order; PlaybackDone is
        // sent exactly once, after the question clip, never concurrently
        // with a later clip.
        let ctx = test_ctx();
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(8);
        let events = event_tx.downgrade();
        let (speech_tx, speech_rx) = mpsc::channel::<SpeechItem>(8);

        let task = tokio::spawn(speech_loop(ctx, speech_rx, events));

        for (text, signals_ready) in [("intro", false), ("question", true), ("trailer", false)] {
            speech_tx
                .send(SpeechItem {
                    text: text.to_string(),
                    content_type: ContentType::Narrative,
                    tts_path: None,
                    signals_ready,
                })
                .await
                .unwrap();
        }
        drop(speech_tx);
        task.await.unwrap();

        assert!(matches!(event_rx.try_recv(), Ok(Event::PlaybackDone)));
        assert!(event_rx.try_recv().is_err());
    }
}
