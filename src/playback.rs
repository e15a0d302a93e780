use std::{
    io::Cursor,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use rodio::{Decoder, OutputStream, Sink, Source};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::settings::PlaybackMode;

const POSITION_POLL_MS: u64 = 50;
const POSITION_EMIT_DELTA_SECS: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("failed to decode audio clip: {0}")]
    Decode(String),
    #[error("playback worker is not running")]
    ChannelClosed,
}

// Clip bytes shared between the session, the upload path and the deck thread.
#[derive(Debug, Clone)]
pub struct ClipBytes(Arc<Vec<u8>>);

impl ClipBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.as_ref().clone()
    }
}

impl AsRef<[u8]> for ClipBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeckEvent {
    Loaded {
        clip: u64,
        duration_secs: Option<f64>,
    },
    Position {
        clip: u64,
        position_secs: f64,
    },
    Ended {
        clip: u64,
    },
    Failed {
        clip: u64,
        reason: String,
    },
}

enum DeckCommand {
    Load { clip: u64, bytes: ClipBytes },
    Play,
    Pause,
    Seek { position_secs: f64 },
    Release,
}

pub struct AudioDeck {
    commands: Mutex<Option<Sender<DeckCommand>>>,
}

impl AudioDeck {
    // The worker thread owns the non-Send rodio objects; commands cross over
    // an mpsc channel and transport events come back on `events`.
    pub fn spawn(mode: PlaybackMode, events: UnboundedSender<DeckEvent>) -> Self {
        let (tx, rx) = mpsc::channel::<DeckCommand>();
        let spawned = thread::Builder::new()
            .name("callsight-deck".to_string())
            .spawn(move || deck_worker(mode, rx, events));
        match spawned {
            Ok(_) => Self {
                commands: Mutex::new(Some(tx)),
            },
            Err(err) => {
                warn!(error = %err, "failed to spawn playback worker");
                Self {
                    commands: Mutex::new(None),
                }
            }
        }
    }

    fn send(&self, command: DeckCommand) -> Result<(), PlaybackError> {
        let guard = self
            .commands
            .lock()
            .map_err(|_| PlaybackError::ChannelClosed)?;
        match guard.as_ref() {
            Some(tx) => tx.send(command).map_err(|_| PlaybackError::ChannelClosed),
            None => Err(PlaybackError::ChannelClosed),
        }
    }

    pub fn load(&self, clip: u64, bytes: ClipBytes) -> Result<(), PlaybackError> {
        self.send(DeckCommand::Load { clip, bytes })
    }

    pub fn play(&self) -> Result<(), PlaybackError> {
        self.send(DeckCommand::Play)
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        self.send(DeckCommand::Pause)
    }

    pub fn seek(&self, position_secs: f64) -> Result<(), PlaybackError> {
        self.send(DeckCommand::Seek { position_secs })
    }

    pub fn release(&self) -> Result<(), PlaybackError> {
        self.send(DeckCommand::Release)
    }
}

pub fn probe_duration(bytes: &ClipBytes) -> Result<Option<Duration>, PlaybackError> {
    Ok(decode_clip(bytes)?.total_duration())
}

fn decode_clip(bytes: &ClipBytes) -> Result<Decoder<Cursor<ClipBytes>>, PlaybackError> {
    Decoder::new(Cursor::new(bytes.clone())).map_err(|err| PlaybackError::Decode(err.to_string()))
}

enum Transport {
    Device {
        _stream: OutputStream,
        sink: Sink,
    },
    Clock {
        base_secs: f64,
        started_at: Option<Instant>,
    },
}

struct LoadedClip {
    id: u64,
    bytes: ClipBytes,
    duration_secs: Option<f64>,
    transport: Transport,
    playing: bool,
    last_emitted_secs: f64,
}

fn deck_worker(mode: PlaybackMode, rx: Receiver<DeckCommand>, events: UnboundedSender<DeckEvent>) {
    let mut current: Option<LoadedClip> = None;
    let mut failed_clip: Option<u64> = None;
    let poll = Duration::from_millis(POSITION_POLL_MS);

    loop {
        match rx.recv_timeout(poll) {
            Ok(command) => handle_command(mode, &mut current, &mut failed_clip, command, &events),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        pump_position(&mut current, &events);
    }
    debug!("playback worker stopped");
}

fn handle_command(
    mode: PlaybackMode,
    current: &mut Option<LoadedClip>,
    failed_clip: &mut Option<u64>,
    command: DeckCommand,
    events: &UnboundedSender<DeckEvent>,
) {
    match command {
        DeckCommand::Load { clip, bytes } => {
            // Detach the previous transport before attaching the new clip.
            *current = None;
            *failed_clip = None;
            let decoder = match decode_clip(&bytes) {
                Ok(decoder) => decoder,
                Err(err) => {
                    warn!(clip, error = %err, "clip is not playable");
                    *failed_clip = Some(clip);
                    let _ = events.send(DeckEvent::Failed {
                        clip,
                        reason: err.to_string(),
                    });
                    return;
                }
            };
            let duration_secs = decoder.total_duration().map(|d| d.as_secs_f64());
            let transport = match mode {
                PlaybackMode::Device => attach_device(decoder),
                PlaybackMode::Virtual => idle_clock(),
            };
            *current = Some(LoadedClip {
                id: clip,
                bytes,
                duration_secs,
                transport,
                playing: false,
                last_emitted_secs: 0.0,
            });
            debug!(clip, duration_secs, "clip attached to playback transport");
            let _ = events.send(DeckEvent::Loaded {
                clip,
                duration_secs,
            });
        }
        DeckCommand::Play => {
            let Some(clip) = current.as_mut() else {
                if let Some(failed) = *failed_clip {
                    let _ = events.send(DeckEvent::Failed {
                        clip: failed,
                        reason: "no playable clip is attached".to_string(),
                    });
                } else {
                    debug!("play ignored, nothing loaded");
                }
                return;
            };
            clip.playing = true;
            match &mut clip.transport {
                Transport::Device { sink, .. } => {
                    if sink.empty() && !restock_sink(sink, &clip.bytes, true) {
                        clip.playing = false;
                        let _ = events.send(DeckEvent::Failed {
                            clip: clip.id,
                            reason: "clip could not be re-opened".to_string(),
                        });
                        return;
                    }
                    sink.play();
                }
                Transport::Clock {
                    base_secs,
                    started_at,
                } => {
                    if clip.duration_secs.is_some_and(|d| *base_secs >= d) {
                        *base_secs = 0.0;
                    }
                    *started_at = Some(Instant::now());
                }
            }
        }
        DeckCommand::Pause => {
            let Some(clip) = current.as_mut() else {
                return;
            };
            let position = position_secs(clip);
            clip.playing = false;
            match &mut clip.transport {
                Transport::Device { sink, .. } => sink.pause(),
                Transport::Clock {
                    base_secs,
                    started_at,
                } => {
                    *base_secs = position;
                    *started_at = None;
                }
            }
        }
        DeckCommand::Seek { position_secs: target } => {
            let Some(clip) = current.as_mut() else {
                return;
            };
            let mut target = target.max(0.0);
            if let Some(duration) = clip.duration_secs {
                target = target.min(duration);
            }
            match &mut clip.transport {
                Transport::Device { sink, .. } => {
                    if sink.empty() && !restock_sink(sink, &clip.bytes, clip.playing) {
                        let _ = events.send(DeckEvent::Failed {
                            clip: clip.id,
                            reason: "clip could not be re-opened".to_string(),
                        });
                        return;
                    }
                    if let Err(err) = sink.try_seek(Duration::from_secs_f64(target)) {
                        warn!(error = %err, "transport rejected seek");
                        return;
                    }
                }
                Transport::Clock {
                    base_secs,
                    started_at,
                } => {
                    *base_secs = target;
                    *started_at = clip.playing.then(Instant::now);
                }
            }
            clip.last_emitted_secs = target;
            let _ = events.send(DeckEvent::Position {
                clip: clip.id,
                position_secs: target,
            });
        }
        DeckCommand::Release => {
            *current = None;
            *failed_clip = None;
        }
    }
}

// Attach to the default output device, dropping to the clock transport when
// no device is available so the session keeps identical semantics headless.
fn attach_device(decoder: Decoder<Cursor<ClipBytes>>) -> Transport {
    match OutputStream::try_default() {
        Ok((stream, handle)) => match Sink::try_new(&handle) {
            Ok(sink) => {
                sink.pause();
                sink.append(decoder);
                Transport::Device {
                    _stream: stream,
                    sink,
                }
            }
            Err(err) => {
                warn!(error = %err, "audio sink unavailable, using clock transport");
                idle_clock()
            }
        },
        Err(err) => {
            warn!(error = %err, "audio output unavailable, using clock transport");
            idle_clock()
        }
    }
}

fn idle_clock() -> Transport {
    Transport::Clock {
        base_secs: 0.0,
        started_at: None,
    }
}

// A drained sink has consumed its source; feed it the decoded clip again and
// rewind so replays and late seeks behave like a fresh attach.
fn restock_sink(sink: &Sink, bytes: &ClipBytes, keep_playing: bool) -> bool {
    let decoder = match decode_clip(bytes) {
        Ok(decoder) => decoder,
        Err(err) => {
            warn!(error = %err, "clip re-decode failed");
            return false;
        }
    };
    if !keep_playing {
        sink.pause();
    }
    sink.append(decoder);
    if let Err(err) = sink.try_seek(Duration::ZERO) {
        debug!(error = %err, "rewind after restock skipped");
    }
    true
}

fn position_secs(clip: &LoadedClip) -> f64 {
    match &clip.transport {
        Transport::Device { sink, .. } => sink.get_pos().as_secs_f64(),
        Transport::Clock {
            base_secs,
            started_at,
        } => {
            let mut position = *base_secs;
            if let Some(started) = started_at {
                position += started.elapsed().as_secs_f64();
            }
            if let Some(duration) = clip.duration_secs {
                position = position.min(duration);
            }
            position
        }
    }
}

fn pump_position(current: &mut Option<LoadedClip>, events: &UnboundedSender<DeckEvent>) {
    let Some(clip) = current.as_mut() else {
        return;
    };
    if !clip.playing {
        return;
    }
    let position = position_secs(clip);

    let ended = match &clip.transport {
        Transport::Device { sink, .. } => sink.empty(),
        Transport::Clock { .. } => clip.duration_secs.is_some_and(|d| position >= d),
    };
    if ended {
        clip.playing = false;
        let final_position = clip.duration_secs.unwrap_or(position);
        if let Transport::Clock {
            base_secs,
            started_at,
        } = &mut clip.transport
        {
            *base_secs = final_position;
            *started_at = None;
        }
        clip.last_emitted_secs = final_position;
        let _ = events.send(DeckEvent::Position {
            clip: clip.id,
            position_secs: final_position,
        });
        let _ = events.send(DeckEvent::Ended { clip: clip.id });
        return;
    }

    if (position - clip.last_emitted_secs).abs() >= POSITION_EMIT_DELTA_SECS {
        clip.last_emitted_secs = position;
        let _ = events.send(DeckEvent::Position {
            clip: clip.id,
            position_secs: position,
        });
    }
}
