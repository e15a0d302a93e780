pub mod analysis;
pub mod audio_mime;
pub mod events;
pub mod metrics;
pub mod playback;
pub mod settings;
pub mod state;

pub use analysis::{AnalyzeResponse, RemoteAnalyzer, RemoteError};
pub use events::{EventBus, Notice, NoticeSeverity, SessionEvent};
pub use metrics::{
    AgentMetrics, ConversationMetrics, ConversationType, EmotionTraits, SentimentScores, Speaker,
    ToneSeries,
};
pub use playback::{probe_duration, AudioDeck, ClipBytes, DeckEvent, PlaybackError};
pub use settings::{
    CallsightSettings, PlaybackMode, SettingsError, SettingsStore, DEFAULT_API_BASE_URL,
};
pub use state::{
    AnalysisPhase, CallsightController, ControllerError, SessionSnapshot, SourceClip,
};
