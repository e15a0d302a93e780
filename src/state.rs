use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver},
    Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{AnalyzeResponse, RemoteAnalyzer, RemoteError, SimulationTicker};
use crate::events::{EventBus, Notice, SessionEvent};
use crate::metrics::ConversationMetrics;
use crate::playback::{AudioDeck, ClipBytes, DeckEvent, PlaybackError};
use crate::settings::{CallsightSettings, SettingsError, SettingsStore};

const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;
const MAX_REQUEST_TIMEOUT_MS: u64 = 120_000;
const MIN_SIMULATION_STEP_MS: u64 = 20;
const MAX_SIMULATION_STEP_MS: u64 = 2_000;

const ANALYSIS_COMPLETE_TITLE: &str = "Analysis Complete";
const ANALYSIS_COMPLETE_BODY: &str =
    "The conversation analysis has been completed successfully.";
const ANALYSIS_FAILED_TITLE: &str = "Analysis Failed";
const ANALYSIS_FAILED_BODY: &str = "There was an error analyzing the audio file.";

fn clamp_request_timeout_ms(value: u64) -> u64 {
    value.clamp(MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS)
}

fn clamp_simulation_step_ms(value: u64) -> u64 {
    value.clamp(MIN_SIMULATION_STEP_MS, MAX_SIMULATION_STEP_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisPhase {
    #[default]
    Idle,
    Loaded,
    Analyzing,
    Complete,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("no audio source is loaded")]
    NoSource,
    #[error("an analysis is already in progress")]
    AlreadyInProgress,
    #[error("analysis fallback failed: {0}")]
    SimulationFault(String),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),
    #[error("{0}")]
    Runtime(String),
}

#[derive(Debug, Clone)]
pub struct SourceClip {
    pub name: String,
    pub mime: String,
    pub bytes: ClipBytes,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: AnalysisPhase,
    pub source_name: Option<String>,
    pub has_source: bool,
    pub is_analyzing: bool,
    pub is_analysis_complete: bool,
    pub is_playing: bool,
    pub metrics: ConversationMetrics,
}

#[derive(Default)]
struct SessionState {
    session_id: u64,
    phase: AnalysisPhase,
    source: Option<SourceClip>,
    is_playing: bool,
    metrics: ConversationMetrics,
}

// The analyzing/complete flags are projections of the phase, so a snapshot
// can never report both at once.
fn snapshot_of(state: &SessionState) -> SessionSnapshot {
    SessionSnapshot {
        phase: state.phase,
        source_name: state.source.as_ref().map(|clip| clip.name.clone()),
        has_source: state.source.is_some(),
        is_analyzing: state.phase == AnalysisPhase::Analyzing,
        is_analysis_complete: state.phase == AnalysisPhase::Complete,
        is_playing: state.is_playing,
        metrics: state.metrics.clone(),
    }
}

struct ActiveAnalysis {
    run_id: u64,
    token: CancellationToken,
}

enum AnalysisOutcome {
    Remote,
    Simulated,
    Cancelled,
}

enum SimulationOutcome {
    Completed,
    Cancelled,
}

pub struct CallsightController {
    analyzer: RemoteAnalyzer,
    deck: AudioDeck,
    events: EventBus,
    state: Arc<Mutex<SessionState>>,
    analysis_slot: Mutex<Option<ActiveAnalysis>>,
    session_counter: AtomicU64,
    run_counter: AtomicU64,
    simulation_step: Duration,
}

impl CallsightController {
    pub fn new(settings: &CallsightSettings) -> Result<Self, ControllerError> {
        let timeout = Duration::from_millis(clamp_request_timeout_ms(settings.request_timeout_ms));
        let analyzer = RemoteAnalyzer::new(&settings.api_base_url, timeout)
            .map_err(|err| ControllerError::Runtime(format!("http client init failed: {err}")))?;

        let events = EventBus::default();
        let state = Arc::new(Mutex::new(SessionState::default()));
        let (deck_tx, deck_rx) = unbounded_channel();
        let deck = AudioDeck::spawn(settings.playback, deck_tx);
        tokio::spawn(pump_deck_events(
            deck_rx,
            Arc::clone(&state),
            events.clone(),
        ));

        Ok(Self {
            analyzer,
            deck,
            events,
            state,
            analysis_slot: Mutex::new(None),
            session_counter: AtomicU64::new(0),
            run_counter: AtomicU64::new(0),
            simulation_step: Duration::from_millis(clamp_simulation_step_ms(
                settings.simulation_step_ms,
            )),
        })
    }

    pub fn from_default_store() -> Result<Self, ControllerError> {
        let store = SettingsStore::new()?;
        let mut settings = store.load()?;
        settings.apply_env_overrides();
        Self::new(&settings)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        snapshot_of(&*self.state.lock().await)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn analysis_active(&self) -> bool {
        self.analysis_slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.token.is_cancelled())
    }

    // Writers spawned for an older session check the id before touching
    // state; bumping it orphans everything keyed to the previous clip.
    async fn set_phase(&self, session_id: u64, phase: AnalysisPhase) -> bool {
        let mut state = self.state.lock().await;
        if state.session_id != session_id {
            return false;
        }
        state.phase = phase;
        true
    }

    pub async fn load_source(
        &self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ControllerError> {
        if self.analysis_active().await {
            return Err(ControllerError::AlreadyInProgress);
        }
        let clip = ClipBytes::new(bytes);
        let session_id = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut state = self.state.lock().await;
            state.session_id = session_id;
            state.phase = AnalysisPhase::Loaded;
            state.is_playing = false;
            state.metrics.reset();
            state.source = Some(SourceClip {
                name: name.to_string(),
                mime: mime.to_string(),
                bytes: clip.clone(),
            });
        }
        if let Err(err) = self.deck.load(session_id, clip) {
            warn!(error = %err, "playback deck rejected clip");
        }
        info!(source = name, "audio source loaded");
        self.events.emit(SessionEvent::SourceLoaded {
            name: name.to_string(),
        });
        self.events.emit(SessionEvent::PhaseChanged {
            phase: AnalysisPhase::Loaded,
        });
        self.events.emit(SessionEvent::MetricsUpdated);
        Ok(())
    }

    // Resolves once metrics are final: remote response applied, simulation
    // finished, or the run cancelled out from under us.
    pub async fn start_analysis(&self) -> Result<(), ControllerError> {
        let (session_id, clip) = {
            let state = self.state.lock().await;
            let source = state.source.as_ref().ok_or(ControllerError::NoSource)?;
            (state.session_id, source.clone())
        };

        let run_id = self.run_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let token = {
            let mut slot = self.analysis_slot.lock().await;
            if slot
                .as_ref()
                .is_some_and(|active| !active.token.is_cancelled())
            {
                return Err(ControllerError::AlreadyInProgress);
            }
            let token = CancellationToken::new();
            *slot = Some(ActiveAnalysis {
                run_id,
                token: token.clone(),
            });
            token
        };

        if !self.set_phase(session_id, AnalysisPhase::Analyzing).await {
            // A reset or reload superseded this session between the source
            // read and the slot install; drop the run before it starts.
            let mut slot = self.analysis_slot.lock().await;
            if slot.as_ref().is_some_and(|active| active.run_id == run_id) {
                *slot = None;
            }
            return Ok(());
        }
        self.events.emit(SessionEvent::PhaseChanged {
            phase: AnalysisPhase::Analyzing,
        });
        info!(source = clip.name.as_str(), "analysis started");

        let result = self.run_analysis(session_id, &clip, &token).await;

        // Only the run that owns the slot may clear it; a reset may already
        // have handed the slot to a newer run.
        {
            let mut slot = self.analysis_slot.lock().await;
            if slot.as_ref().is_some_and(|active| active.run_id == run_id) {
                *slot = None;
            }
        }

        match result {
            Ok(AnalysisOutcome::Remote) => {
                info!("analysis completed via remote service");
                Ok(())
            }
            Ok(AnalysisOutcome::Simulated) => {
                info!("analysis completed via local simulation");
                Ok(())
            }
            Ok(AnalysisOutcome::Cancelled) => {
                debug!("analysis run cancelled");
                Ok(())
            }
            Err(err) => {
                if self.set_phase(session_id, AnalysisPhase::Loaded).await {
                    self.events.emit(SessionEvent::PhaseChanged {
                        phase: AnalysisPhase::Loaded,
                    });
                }
                self.events.emit(SessionEvent::Notice(Notice::error(
                    ANALYSIS_FAILED_TITLE,
                    ANALYSIS_FAILED_BODY,
                )));
                Err(err)
            }
        }
    }

    async fn run_analysis(
        &self,
        session_id: u64,
        clip: &SourceClip,
        token: &CancellationToken,
    ) -> Result<AnalysisOutcome, ControllerError> {
        match self
            .analyzer
            .analyze(&clip.name, &clip.mime, clip.bytes.to_vec(), token)
            .await
        {
            Ok(response) => {
                if self.apply_remote_response(session_id, response).await {
                    Ok(AnalysisOutcome::Remote)
                } else {
                    Ok(AnalysisOutcome::Cancelled)
                }
            }
            Err(RemoteError::Cancelled) => Ok(AnalysisOutcome::Cancelled),
            Err(err) => {
                warn!(error = %err, "remote analysis unavailable, falling back to local simulation");
                self.run_simulation(session_id, token).await
            }
        }
    }

    async fn apply_remote_response(&self, session_id: u64, response: AnalyzeResponse) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.session_id != session_id {
                return false;
            }
            let metrics = &mut state.metrics;
            metrics.sentiment = response.sentiment.clamped();
            metrics.tone_analysis = response.tone_analysis;
            metrics.agent_metrics = response.agent_metrics.clamped();
            metrics.transcript = response.transcript;
            metrics.summary = response.summary;
            metrics.conversation_type = response.conversation_type;
            metrics.emotion_traits = response.emotion_traits.map(|traits| traits.clamped());
            if let Some(duration) = response.duration {
                metrics.duration = duration;
            }
            state.phase = AnalysisPhase::Complete;
        }
        self.events.emit(SessionEvent::PhaseChanged {
            phase: AnalysisPhase::Complete,
        });
        self.events.emit(SessionEvent::MetricsUpdated);
        self.events.emit(SessionEvent::Notice(Notice::info(
            ANALYSIS_COMPLETE_TITLE,
            ANALYSIS_COMPLETE_BODY,
        )));
        true
    }

    async fn run_simulation(
        &self,
        session_id: u64,
        token: &CancellationToken,
    ) -> Result<AnalysisOutcome, ControllerError> {
        let handle = tokio::spawn(drive_simulation(
            Arc::clone(&self.state),
            self.events.clone(),
            session_id,
            self.simulation_step,
            token.clone(),
        ));
        match handle.await {
            Ok(SimulationOutcome::Completed) => Ok(AnalysisOutcome::Simulated),
            Ok(SimulationOutcome::Cancelled) => Ok(AnalysisOutcome::Cancelled),
            Err(err) => Err(ControllerError::SimulationFault(format!(
                "simulation task failed: {err}"
            ))),
        }
    }

    pub async fn reset(&self) {
        let active = self.analysis_slot.lock().await.take();
        if let Some(active) = active {
            active.token.cancel();
        }
        if let Err(err) = self.deck.release() {
            debug!(error = %err, "deck release skipped");
        }
        let session_id = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut state = self.state.lock().await;
            state.session_id = session_id;
            state.phase = AnalysisPhase::Idle;
            state.source = None;
            state.is_playing = false;
            state.metrics.reset();
        }
        info!("session reset");
        self.events.emit(SessionEvent::PhaseChanged {
            phase: AnalysisPhase::Idle,
        });
        self.events.emit(SessionEvent::MetricsUpdated);
    }

    pub async fn play_audio(&self) -> Result<(), ControllerError> {
        {
            let mut state = self.state.lock().await;
            if state.source.is_none() {
                return Err(ControllerError::NoSource);
            }
            state.is_playing = true;
        }
        if let Err(err) = self.deck.play() {
            warn!(error = %err, "playback start failed");
            self.state.lock().await.is_playing = false;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn pause_audio(&self) -> Result<(), ControllerError> {
        self.state.lock().await.is_playing = false;
        self.deck.pause()?;
        Ok(())
    }

    pub async fn seek_to(&self, seconds: f64) -> Result<(), ControllerError> {
        let target = {
            let mut state = self.state.lock().await;
            if state.source.is_none() {
                return Err(ControllerError::NoSource);
            }
            let duration = state.metrics.duration;
            let target = if seconds.is_finite() {
                seconds.clamp(0.0, duration.max(0.0))
            } else {
                0.0
            };
            state.metrics.current_time = target;
            target
        };
        self.deck.seek(target)?;
        Ok(())
    }
}

async fn drive_simulation(
    state: Arc<Mutex<SessionState>>,
    events: EventBus,
    session_id: u64,
    step: Duration,
    token: CancellationToken,
) -> SimulationOutcome {
    let mut ticker = SimulationTicker::new();
    let mut interval = tokio::time::interval(step);
    loop {
        tokio::select! {
            _ = token.cancelled() => return SimulationOutcome::Cancelled,
            _ = interval.tick() => {}
        }
        let tick = ticker.advance(&mut rand::thread_rng());
        let finished = tick.finale.is_some();
        {
            let mut guard = state.lock().await;
            if guard.session_id != session_id {
                return SimulationOutcome::Cancelled;
            }
            tick.apply(&mut guard.metrics);
            if finished {
                guard.phase = AnalysisPhase::Complete;
            }
        }
        events.emit(SessionEvent::MetricsUpdated);
        if let Some(line) = tick.transcript_line {
            events.emit(SessionEvent::TranscriptLine { line });
        }
        if finished {
            events.emit(SessionEvent::PhaseChanged {
                phase: AnalysisPhase::Complete,
            });
            events.emit(SessionEvent::Notice(Notice::info(
                ANALYSIS_COMPLETE_TITLE,
                ANALYSIS_COMPLETE_BODY,
            )));
            return SimulationOutcome::Completed;
        }
    }
}

// Transport events are keyed by the session that loaded the clip, so a late
// event from a released deck cannot touch the next session.
async fn pump_deck_events(
    mut rx: UnboundedReceiver<DeckEvent>,
    state: Arc<Mutex<SessionState>>,
    events: EventBus,
) {
    while let Some(event) = rx.recv().await {
        match event {
            DeckEvent::Loaded {
                clip,
                duration_secs,
            } => {
                let mut guard = state.lock().await;
                if guard.session_id != clip {
                    continue;
                }
                if let Some(duration) = duration_secs {
                    guard.metrics.duration = duration;
                }
                guard.metrics.current_time = 0.0;
                let duration = guard.metrics.duration;
                drop(guard);
                events.emit(SessionEvent::PlaybackPosition {
                    position: 0.0,
                    duration,
                });
            }
            DeckEvent::Position {
                clip,
                position_secs,
            } => {
                let mut guard = state.lock().await;
                if guard.session_id != clip {
                    continue;
                }
                guard.metrics.current_time = position_secs;
                let duration = guard.metrics.duration;
                drop(guard);
                events.emit(SessionEvent::PlaybackPosition {
                    position: position_secs,
                    duration,
                });
            }
            DeckEvent::Ended { clip } => {
                let mut guard = state.lock().await;
                if guard.session_id != clip {
                    continue;
                }
                guard.is_playing = false;
                drop(guard);
                events.emit(SessionEvent::PlaybackEnded);
            }
            DeckEvent::Failed { clip, reason } => {
                warn!(clip, reason = reason.as_str(), "playback transport failed");
                let mut guard = state.lock().await;
                if guard.session_id != clip {
                    continue;
                }
                guard.is_playing = false;
            }
        }
    }
    debug!("deck event pump stopped");
}
