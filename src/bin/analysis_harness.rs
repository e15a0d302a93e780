use std::{fs, path::Path, time::Duration};

use callsight::{audio_mime, CallsightController, CallsightSettings, PlaybackMode, SettingsStore};

// Unroutable on purpose: forces the remote path to fail fast so the run
// exercises the fallback simulation.
const OFFLINE_API_URL: &str = "http://127.0.0.1:1";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("analysis harness failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    let clip_path = match args.get(1) {
        Some(arg) if !arg.starts_with("--") => arg.clone(),
        _ => return Err(usage()),
    };

    let mut settings = load_settings()?;
    if let Some(url) = parse_arg_value(&args, "--api") {
        settings.api_base_url = url.to_string();
    }
    if let Some(step) = parse_arg_value(&args, "--step-ms") {
        settings.simulation_step_ms = step
            .parse::<u64>()
            .map_err(|_| format!("--step-ms expects milliseconds, got '{step}'"))?;
    }
    if args.iter().any(|arg| arg == "--offline") {
        settings.api_base_url = OFFLINE_API_URL.to_string();
    }
    if args.iter().any(|arg| arg == "--no-audio") {
        settings.playback = PlaybackMode::Virtual;
    }

    let path = Path::new(&clip_path);
    let bytes = fs::read(path).map_err(|err| format!("failed reading {clip_path}: {err}"))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("clip")
        .to_string();
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(audio_mime::mime_for_extension)
        .ok_or_else(|| format!("'{name}' is not a supported audio file"))?;

    let controller = CallsightController::new(&settings)
        .map_err(|err| format!("controller init failed: {err}"))?;

    let mut events = controller.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("event encode failed: {err}"),
            }
        }
    });

    controller
        .load_source(&name, mime, bytes)
        .await
        .map_err(|err| format!("load failed: {err}"))?;
    controller
        .start_analysis()
        .await
        .map_err(|err| format!("analysis failed: {err}"))?;

    // Let the printer drain the completion notice before the final report.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    let snapshot = controller.snapshot().await;
    let report = serde_json::to_string_pretty(&snapshot)
        .map_err(|err| format!("failed serializing snapshot: {err}"))?;
    println!("{report}");
    Ok(())
}

fn load_settings() -> Result<CallsightSettings, String> {
    let store = SettingsStore::new().map_err(|err| format!("settings unavailable: {err}"))?;
    let mut settings = store
        .load()
        .map_err(|err| format!("settings unreadable: {err}"))?;
    settings.apply_env_overrides();
    Ok(settings)
}

fn parse_arg_value<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == key)
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}

fn usage() -> String {
    "usage: analysis_harness <audio-file> [--api URL] [--offline] [--step-ms N] [--no-audio]"
        .to_string()
}
