#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use tokio::{net::TcpListener, sync::oneshot};

use callsight::{CallsightSettings, PlaybackMode};

/// Settings for a test controller: virtual transport (no audio device in CI),
/// fast simulation cadence, short remote timeout.
pub fn test_settings(api_base_url: &str) -> CallsightSettings {
    CallsightSettings {
        api_base_url: api_base_url.to_string(),
        request_timeout_ms: 2_000,
        simulation_step_ms: 20,
        playback: PlaybackMode::Virtual,
    }
}

/// An unroutable base URL so the remote path fails immediately.
pub const OFFLINE_API_URL: &str = "http://127.0.0.1:1";

/// A small mono 16kHz sine-tone WAV clip of the requested length.
pub fn wav_fixture(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).expect("fixture writer should open");
        let total = (seconds * 16_000.0) as usize;
        for n in 0..total {
            let t = n as f64 / 16_000.0;
            let sample = (t * 440.0 * std::f64::consts::TAU).sin();
            writer
                .write_sample((sample * i16::MAX as f64 * 0.2) as i16)
                .expect("fixture sample should write");
        }
        writer.finalize().expect("fixture should finalize");
    }
    cursor.into_inner()
}

/// A complete, valid `/analyze` response body.
pub fn sample_analyze_payload() -> serde_json::Value {
    serde_json::json!({
        "sentiment": { "positive": 62.5, "neutral": 25.0, "negative": 12.5 },
        "toneAnalysis": { "scores": [0.2, 0.8, 0.4], "timestamps": [0.0, 2.0, 4.0] },
        "agentMetrics": {
            "responseTime": 3.4,
            "talkingRatio": 55.0,
            "interruptions": 2,
            "cussWords": 0,
            "escalationRate": 10.0,
            "resolutionRate": 88.0
        },
        "transcript": [
            "Agent: Hello, how can I help you today?",
            "Customer: My order is late.",
            "Agent: Let me look into that for you."
        ],
        "summary": "The agent resolved a late delivery question.",
        "conversationType": "true-positive",
        "emotionTraits": { "joy": 40.0, "sadness": 10.0, "anger": 5.0, "fear": 2.0, "surprise": 12.0 },
        "duration": 42.5
    })
}

/// How the mock `/analyze` endpoint answers each request.
#[derive(Debug, Clone)]
pub enum AnalyzeReply {
    Json(serde_json::Value),
    Status(u16),
    /// Never answers; the caller's timeout or cancellation must fire first.
    Hang,
}

#[derive(Clone)]
struct MockState {
    reply: AnalyzeReply,
    hits: Arc<AtomicUsize>,
    content_types: Arc<Mutex<Vec<String>>>,
    body_sizes: Arc<Mutex<Vec<usize>>>,
}

/// In-process HTTP server standing in for the analysis backend. Binds an
/// ephemeral port and shuts down when dropped.
pub struct MockAnalyzeServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    content_types: Arc<Mutex<Vec<String>>>,
    body_sizes: Arc<Mutex<Vec<usize>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockAnalyzeServer {
    pub async fn start(reply: AnalyzeReply) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let content_types = Arc::new(Mutex::new(Vec::new()));
        let body_sizes = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            hits: Arc::clone(&hits),
            content_types: Arc::clone(&content_types),
            body_sizes: Arc::clone(&body_sizes),
        };

        let router = Router::new()
            .route("/analyze", post(handle_analyze))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock server should bind an ephemeral port");
        let addr = listener
            .local_addr()
            .expect("bound listener should report its address");

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .expect("mock server should run until shutdown");
        });

        Self {
            addr,
            hits,
            content_types,
            body_sizes,
            shutdown: Some(tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn content_types(&self) -> Vec<String> {
        self.content_types
            .lock()
            .expect("content-type log should not be poisoned")
            .clone()
    }

    pub fn body_sizes(&self) -> Vec<usize> {
        self.body_sizes
            .lock()
            .expect("body-size log should not be poisoned")
            .clone()
    }
}

impl Drop for MockAnalyzeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_analyze(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(content_type) = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
    {
        state
            .content_types
            .lock()
            .expect("content-type log should not be poisoned")
            .push(content_type.to_string());
    }
    state
        .body_sizes
        .lock()
        .expect("body-size log should not be poisoned")
        .push(body.len());

    match &state.reply {
        AnalyzeReply::Json(value) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            value.to_string(),
        )
            .into_response(),
        AnalyzeReply::Status(code) => StatusCode::from_u16(*code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        AnalyzeReply::Hang => {
            tokio::time::sleep(std::time::Duration::from_secs(300)).await;
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
