// Audio container checks for the intake boundary. The controller itself never
// validates MIME; upload collaborators gate files with these before loading.

pub fn is_audio_mime(content_type: &str) -> bool {
    normalize(content_type).starts_with("audio/")
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.trim().to_ascii_lowercase().as_str() {
        "wav" | "wave" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "ogg" | "oga" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        "webm" => Some("audio/webm"),
        "aac" => Some("audio/aac"),
        _ => None,
    }
}

fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}
