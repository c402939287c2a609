//! Speech through the `espeak-ng` command-line synthesizer.
//!
//! Each utterance is one `espeak-ng --stdin` child process.  The paragraph is
//! written to the child's stdin and a watcher thread waits for it to exit,
//! turning the exit status into a [`SpeechEvent`]:
//!
//! | Exit                 | Event         |
//! |----------------------|---------------|
//! | status 0             | `Ended`       |
//! | killed by a signal   | `Interrupted` |
//! | non-zero status      | `Failed`      |
//!
//! Pause and resume are `SIGSTOP` / `SIGCONT` on the child, so audio picks up
//! exactly where it stopped.  Cancel is `SIGKILL`.
//!
//! ## Requirements
//! | Platform           | Requirement                                 |
//! |--------------------|---------------------------------------------|
//! | Alpine / Linux     | `apk add espeak-ng` / `apt install espeak-ng` |
//! | macOS (Homebrew)   | `brew install espeak-ng`                    |

use std::{
    io::Write,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
};

use anyhow::{bail, Context, Result};
use log::{debug, trace, warn};
use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
    unistd::Pid,
};

use crate::{
    backend::{EventSink, SpeechBackend, SpeechError, SpeechEvent, Utterance, UtteranceId},
    voice::Voice,
};

/// Synthesizer looked up on `$PATH` by [`EspeakBackend::detect`].
pub const DEFAULT_PROGRAM: &str = "espeak-ng";

/// espeak-ng's normal speaking rate, words per minute (`-s`).
const BASE_WPM: f32 = 175.0;
/// Rates espeak-ng accepts.
const WPM_RANGE: (f32, f32) = (80.0, 450.0);

/// espeak-ng's normal pitch (`-p`, 0–99).
const BASE_PITCH: f32 = 50.0;

type Sinks = Arc<Mutex<Vec<EventSink>>>;

fn emit(sinks: &Sinks, event: SpeechEvent) {
    let sinks = sinks.lock().unwrap_or_else(|p| p.into_inner());
    for sink in sinks.iter() {
        sink(event.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice list
// ─────────────────────────────────────────────────────────────────────────────

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  pt             --/M      Portuguese_(Portugal) roa/pt               (pt-pt 5)
///  5  pt-br          --/M      Portuguese_(Brazil) roa/pt-BR
/// ```
///
/// The language column doubles as the voice id (`-v pt-br`).
pub fn parse_voice_list(table: &str) -> Vec<Voice> {
    table
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            let lang = cols[1];
            let name = cols[3].replace('_', " ");
            Some(Voice::new(lang, name, lang))
        })
        .collect()
}

fn probe_voices(program: &Path) -> Result<Vec<Voice>> {
    let out = Command::new(program)
        .arg("--voices")
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Cannot run {}", program.display()))?;
    if !out.status.success() {
        bail!("{} --voices exited with {}", program.display(), out.status);
    }
    Ok(parse_voice_list(&String::from_utf8_lossy(&out.stdout)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Command-line arguments for one utterance (text goes to stdin).
pub fn command_args(utterance: &Utterance) -> Vec<String> {
    let voice = utterance
        .voice
        .clone()
        .unwrap_or_else(|| utterance.lang.to_lowercase());
    let wpm = (BASE_WPM * utterance.rate).round().clamp(WPM_RANGE.0, WPM_RANGE.1) as u32;
    let pitch = (BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32;
    vec![
        "-s".to_string(),
        wpm.to_string(),
        "-p".to_string(),
        pitch.to_string(),
        "-v".to_string(),
        voice,
        "--stdin".to_string(),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// EspeakBackend
// ─────────────────────────────────────────────────────────────────────────────

struct Running {
    id: UtteranceId,
    pid: Pid,
    /// Set by the watcher once the child has been reaped; the pid may be
    /// reused after that and must not be signalled.
    exited: Arc<AtomicBool>,
}

impl Running {
    fn signal(&self, signal: Signal) -> Result<(), SpeechError> {
        if self.exited.load(Ordering::Acquire) {
            return Ok(());
        }
        match kill(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(SpeechError::Signal { id: self.id, message: e.to_string() }),
        }
    }
}

/// Speaks through an `espeak-ng` child process per utterance.
pub struct EspeakBackend {
    program: PathBuf,
    supported: bool,
    voices: Vec<Voice>,
    sinks: Sinks,
    running: Option<Running>,
}

impl EspeakBackend {
    /// Use `program` as the synthesizer.  If it cannot list its voices the
    /// backend reports itself unsupported.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let (supported, voices) = match probe_voices(&program) {
            Ok(voices) => {
                debug!("{}: {} voices", program.display(), voices.len());
                (true, voices)
            }
            Err(e) => {
                warn!("espeak-ng unavailable: {e:#}");
                (false, Vec::new())
            }
        };
        Self {
            program,
            supported,
            voices,
            sinks: Arc::new(Mutex::new(Vec::new())),
            running: None,
        }
    }

    /// Use `espeak-ng` from `$PATH`.
    pub fn detect() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl SpeechBackend for EspeakBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn list_voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.sinks.lock().unwrap_or_else(|p| p.into_inner()).push(sink);
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        if !self.supported {
            return Err(SpeechError::Unsupported);
        }
        self.cancel();

        let mut child = Command::new(&self.program)
            .args(command_args(utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let id = utterance.id;
        let exited = Arc::new(AtomicBool::new(false));
        self.running = Some(Running {
            id,
            pid: Pid::from_raw(child.id() as i32),
            exited: Arc::clone(&exited),
        });
        emit(&self.sinks, SpeechEvent::Started { id });

        let sinks = Arc::clone(&self.sinks);
        let text = utterance.text.clone();
        thread::spawn(move || {
            // Written here, not in `speak`: a long paragraph can fill the pipe
            // and block until espeak-ng has spoken part of it.
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()) {
                    trace!("utterance {id}: stdin closed early: {e}");
                }
            }
            let event = match child.wait() {
                Ok(status) if status.success() => SpeechEvent::Ended { id },
                Ok(status) if status.signal().is_some() => SpeechEvent::Interrupted { id },
                Ok(status) => SpeechEvent::Failed { id, message: format!("espeak-ng exited with {status}") },
                Err(e) => SpeechEvent::Failed { id, message: format!("waiting for espeak-ng: {e}") },
            };
            exited.store(true, Ordering::Release);
            emit(&sinks, event);
        });
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SpeechError> {
        match &self.running {
            Some(running) => running.signal(Signal::SIGSTOP),
            None => Ok(()),
        }
    }

    fn resume(&mut self) -> Result<(), SpeechError> {
        match &self.running {
            Some(running) => running.signal(Signal::SIGCONT),
            None => Ok(()),
        }
    }

    fn cancel(&mut self) {
        let Some(running) = self.running.take() else { return };
        // SIGKILL also reaps a stopped child; no SIGCONT needed first.
        if let Err(e) = running.signal(Signal::SIGKILL) {
            warn!("cancel: {e}");
        }
    }
}

impl Drop for EspeakBackend {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
