use std::{
    io::Cursor,
    process::Command,
    sync::{
        mpsc::{self, RecvTimeoutError, Sender},
        Mutex, PoisonError,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::mpsc::UnboundedSender;

use super::{
    engine::{NarrationEngine, NarrationEvent, Utterance, UtteranceId},
    VoiceProfile,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const ESPEAK_BIN: &str = "espeak-ng";
/// espeak-ng's default speaking rate in words per minute.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const BASE_PITCH: f32 = 50.0;
const PLAYBACK_POLL: Duration = Duration::from_millis(100);

enum SpeechCommand {
    Speak {
        utterance: Utterance,
        events: UnboundedSender<NarrationEvent>,
    },
    Cancel,
}

/// Narration through the `espeak-ng` synthesizer, played on a dedicated audio thread.
pub struct EspeakEngine {
    tx: Mutex<Option<Sender<SpeechCommand>>>,
    voices: Vec<VoiceProfile>,
}

impl EspeakEngine {
    /// Returns `None` when `espeak-ng` is not installed.
    pub fn detect() -> Option<Self> {
        let voices = match list_voices() {
            Ok(voices) => voices,
            Err(err) => {
                log_warn!("espeak-ng unavailable: {err:#}");
                return None;
            }
        };
        log_info!("espeak-ng ready with {} voices", voices.len());
        Some(Self {
            tx: Mutex::new(None),
            voices,
        })
    }

    fn ensure_thread(&self) -> Result<Sender<SpeechCommand>> {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<SpeechCommand>();

        // Audio objects are not Send, so they live on their own thread
        thread::Builder::new()
            .name("narration-engine".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut playing: Option<(Sink, UtteranceId, UnboundedSender<NarrationEvent>)> =
                    None;

                loop {
                    match rx.recv_timeout(PLAYBACK_POLL) {
                        Ok(SpeechCommand::Speak { utterance, events }) => {
                            if let Some((sink, id, events)) = playing.take() {
                                sink.stop();
                                let _ = events.send(NarrationEvent::Cancelled { id });
                            }
                            let id = utterance.id;
                            match play(&mut output, &utterance) {
                                Ok(sink) => {
                                    let _ = events.send(NarrationEvent::Started { id });
                                    playing = Some((sink, id, events));
                                }
                                Err(err) => {
                                    log_error!("Speech synthesis error: {err:#}");
                                    let _ = events.send(NarrationEvent::Failed {
                                        id,
                                        reason: format!("{err:#}"),
                                    });
                                }
                            }
                        }
                        Ok(SpeechCommand::Cancel) => {
                            if let Some((sink, id, events)) = playing.take() {
                                sink.stop();
                                let _ = events.send(NarrationEvent::Cancelled { id });
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if playing.as_ref().is_some_and(|(sink, _, _)| sink.empty()) {
                                if let Some((_, id, events)) = playing.take() {
                                    let _ = events.send(NarrationEvent::Ended { id });
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("failed to spawn narration thread")?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl NarrationEngine for EspeakEngine {
    fn voices(&self) -> Vec<VoiceProfile> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance, events: UnboundedSender<NarrationEvent>) -> Result<()> {
        let tx = self.ensure_thread()?;
        tx.send(SpeechCommand::Speak { utterance, events })
            .map_err(|_| anyhow!("narration thread stopped"))
    }

    fn cancel(&self) {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(SpeechCommand::Cancel);
        }
    }
}

fn play(output: &mut Option<(OutputStream, OutputStreamHandle)>, utterance: &Utterance) -> Result<Sink> {
    let wav = synthesize(utterance)?;

    if output.is_none() {
        *output = Some(OutputStream::try_default().context("Failed to create audio output stream")?);
    }
    let Some((_, handle)) = output.as_ref() else {
        bail!("audio output unavailable");
    };

    let sink = Sink::try_new(handle).context("Failed to create audio sink")?;
    let source = Decoder::new(Cursor::new(wav)).context("espeak-ng produced unreadable audio")?;
    sink.append(source);
    Ok(sink)
}

/// Synthesizes with the resolved voice, or the requested language when none matched.
/// A language espeak cannot load is retried with its default voice.
fn synthesize(utterance: &Utterance) -> Result<Vec<u8>> {
    let voice = espeak_voice(utterance);
    match run_espeak(&espeak_args(utterance, Some(voice))) {
        Ok(wav) => Ok(wav),
        Err(err) if utterance.voice.is_none() => {
            log_warn!("{ESPEAK_BIN} has no voice for {voice} ({err:#}); using its default voice");
            run_espeak(&espeak_args(utterance, None))
        }
        Err(err) => Err(err),
    }
}

fn espeak_voice(utterance: &Utterance) -> &str {
    utterance
        .voice
        .as_ref()
        .map_or(utterance.language_tag.as_str(), |voice| voice.language_tag.as_str())
}

fn espeak_args(utterance: &Utterance, voice: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--stdout".to_string(),
        "-s".to_string(),
        words_per_minute(utterance.rate).to_string(),
        "-p".to_string(),
        espeak_pitch(utterance.pitch).to_string(),
    ];
    if let Some(voice) = voice {
        args.push("-v".to_string());
        args.push(voice.to_string());
    }
    args.push("--".to_string());
    args.push(utterance.text.clone());
    args
}

fn run_espeak(args: &[String]) -> Result<Vec<u8>> {
    let output = Command::new(ESPEAK_BIN)
        .args(args)
        .output()
        .with_context(|| format!("failed to run {ESPEAK_BIN}"))?;
    if !output.status.success() {
        bail!(
            "{ESPEAK_BIN} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.stdout)
}

fn words_per_minute(rate: f32) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate.clamp(0.1, 10.0)).round() as u32
}

/// Maps a 0.0-2.0 pitch multiplier onto espeak's 0-99 scale.
fn espeak_pitch(pitch: f32) -> u32 {
    (BASE_PITCH * pitch.clamp(0.0, 2.0)).round().min(99.0) as u32
}

fn list_voices() -> Result<Vec<VoiceProfile>> {
    let output = Command::new(ESPEAK_BIN)
        .arg("--voices")
        .output()
        .with_context(|| format!("failed to run {ESPEAK_BIN} --voices"))?;
    if !output.status.success() {
        bail!("{ESPEAK_BIN} --voices exited with {}", output.status);
    }
    Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses the table printed by `espeak-ng --voices`:
/// `Pty Language Age/Gender VoiceName File Other Languages`.
fn parse_voice_list(listing: &str) -> Vec<VoiceProfile> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let _age_gender = columns.next()?;
            let name = columns.next()?;
            Some(VoiceProfile::new(language, name))
        })
        .collect()
}
