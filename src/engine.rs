//! Narration engine — reads a story aloud, one paragraph per utterance.
//!
//! The engine is an explicit state machine over `{Stopped, Playing, Paused}`
//! driven by two inputs: commands from the reader (play, pause, seek, …) and
//! [`SpeechEvent`]s from the backend.  Auto-advance is not a callback chain:
//! every utterance carries an [`UtteranceId`], the engine remembers the one it
//! is waiting on, and an `Ended` event for any other id is stale and dropped.
//! That single comparison is what makes `stop()`, seeks and teardown cancel the
//! "speak the next paragraph" continuation.
//!
//! | From           | Event                          | To      |
//! |----------------|--------------------------------|---------|
//! | Stopped        | `play()`                       | Playing |
//! | Playing        | `pause()`                      | Paused  |
//! | Paused         | `resume()`                     | Playing |
//! | Playing        | utterance ended, more remain   | Playing |
//! | Playing        | utterance ended, none remain   | Stopped |
//! | Playing/Paused | `stop()`                       | Stopped |
//! | Playing/Paused | utterance failed / interrupted | Stopped |
//! | any            | seek (`go_to_*`)               | same    |

use std::sync::mpsc::Receiver;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    backend::{SpeechBackend, SpeechEvent, Utterance, UtteranceId},
    config::NarrationConfig,
    voice::{select_voice, Voice, VoiceGender},
};

/// Playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Read-only snapshot of an engine, e.g. for a view layer or the C ABI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub current_paragraph: usize,
    pub total_paragraphs: usize,
    pub speed: f32,
    pub voice_gender: VoiceGender,
    pub is_supported: bool,
}

/// Observer of a session's progress.
///
/// Any `FnMut(usize)` closure is a listener that only cares about paragraph
/// changes.
pub trait NarrationListener {
    /// The current paragraph became `index`.  Called synchronously, once per
    /// change, never for a command that leaves the index where it was.
    fn paragraph_changed(&mut self, index: usize);

    /// Playback of paragraph `index` was abandoned because speech failed.
    fn playback_failed(&mut self, _index: usize, _message: &str) {}
}

impl<F: FnMut(usize)> NarrationListener for F {
    fn paragraph_changed(&mut self, index: usize) {
        self(index)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NarrationEngine
// ─────────────────────────────────────────────────────────────────────────────

/// One narration session over a fixed list of paragraphs.
///
/// Dropping the engine cancels its in-flight utterance.
pub struct NarrationEngine<B: SpeechBackend> {
    paragraphs: Vec<String>,
    backend: B,
    config: NarrationConfig,
    listener: Option<Box<dyn NarrationListener>>,
    voices: Vec<Voice>,
    supported: bool,
    state: PlayState,
    current: usize,
    speed: f32,
    gender: VoiceGender,
    /// The utterance whose events we act on.  `None` while nothing of ours is
    /// in flight, including while paused after a seek.
    active: Option<UtteranceId>,
}

impl<B: SpeechBackend> NarrationEngine<B> {
    /// Start a session.  `backend.is_supported()` is sampled once, here.
    pub fn new(paragraphs: Vec<String>, backend: B, config: NarrationConfig) -> Self {
        let supported = backend.is_supported();
        let voices = if supported { backend.list_voices() } else { Vec::new() };
        debug!(
            "narration session: {} paragraphs, supported={}, {} voices",
            paragraphs.len(),
            supported,
            voices.len()
        );
        Self {
            paragraphs,
            backend,
            speed: config.default_speed,
            config,
            listener: None,
            voices,
            supported,
            state: PlayState::Stopped,
            current: 0,
            gender: VoiceGender::default(),
            active: None,
        }
    }

    /// Attach a progress listener (builder style).
    pub fn with_listener(mut self, listener: impl NarrationListener + 'static) -> Self {
        self.set_listener(listener);
        self
    }

    pub fn set_listener(&mut self, listener: impl NarrationListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    // ── State ─────────────────────────────────────────────────────────────────

    /// `true` while a playback run is in progress, paused or not.
    pub fn is_playing(&self) -> bool {
        self.state != PlayState::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlayState::Paused
    }

    pub fn play_state(&self) -> PlayState {
        self.state
    }

    pub fn current_paragraph(&self) -> usize {
        self.current
    }

    pub fn total_paragraphs(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn voice_gender(&self) -> VoiceGender {
        self.gender
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Voices known from the backend's last report.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> NarrationState {
        NarrationState {
            is_playing: self.is_playing(),
            is_paused: self.is_paused(),
            current_paragraph: self.current,
            total_paragraphs: self.paragraphs.len(),
            speed: self.speed,
            voice_gender: self.gender,
            is_supported: self.supported,
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Speak from the current paragraph.  From Playing or Paused this restarts
    /// the current paragraph.
    pub fn play(&mut self) {
        if !self.supported || self.paragraphs.is_empty() {
            return;
        }
        debug!("play from paragraph {}", self.current);
        self.state = PlayState::Playing;
        self.speak_current();
    }

    /// Suspend the utterance in flight.  Only acts while Playing.
    pub fn pause(&mut self) {
        if !self.supported || self.state != PlayState::Playing {
            return;
        }
        if self.active.is_some() {
            if let Err(e) = self.backend.pause() {
                warn!("pause failed, still playing: {e}");
                return;
            }
        }
        debug!("paused at paragraph {}", self.current);
        self.state = PlayState::Paused;
    }

    /// Continue after [`pause`](Self::pause).  If the suspended utterance is
    /// gone (a seek discarded it, or it finished), the current paragraph is
    /// spoken afresh.
    pub fn resume(&mut self) {
        if !self.supported || self.state != PlayState::Paused {
            return;
        }
        self.state = PlayState::Playing;
        if self.active.is_none() {
            debug!("resume: restarting paragraph {}", self.current);
            self.speak_current();
            return;
        }
        if let Err(e) = self.backend.resume() {
            // The suspended utterance must not outlive the run.
            self.discard_active();
            self.abandon(&e.to_string());
            return;
        }
        debug!("resumed at paragraph {}", self.current);
    }

    /// Cancel speech and rewind to the first paragraph, from any state.
    pub fn stop(&mut self) {
        if !self.supported {
            return;
        }
        self.discard_active();
        if self.state != PlayState::Stopped {
            debug!("stopped at paragraph {}", self.current);
        }
        self.state = PlayState::Stopped;
        self.set_current(0);
    }

    /// Store the rate for the next utterance.  Not validated; UIs clamp.
    pub fn set_speed(&mut self, rate: f32) {
        if !self.supported {
            return;
        }
        self.speed = rate;
    }

    /// Store the voice preference for the next utterance.
    pub fn set_voice_gender(&mut self, gender: VoiceGender) {
        if !self.supported {
            return;
        }
        self.gender = gender;
    }

    pub fn go_to_next(&mut self) {
        if self.current + 1 < self.paragraphs.len() {
            self.go_to_paragraph(self.current + 1);
        }
    }

    pub fn go_to_previous(&mut self) {
        if self.current > 0 {
            self.go_to_paragraph(self.current - 1);
        }
    }

    /// Move to paragraph `index`; out-of-range indices are ignored.
    ///
    /// Playing: the current utterance is cut off and `index` is spoken.
    /// Paused: the suspended utterance is dropped; `resume` speaks `index`.
    /// Stopped: only the resume position moves.
    pub fn go_to_paragraph(&mut self, index: usize) {
        if !self.supported || index >= self.paragraphs.len() {
            return;
        }
        self.set_current(index);
        match self.state {
            PlayState::Playing => self.speak_current(),
            PlayState::Paused => self.discard_active(),
            PlayState::Stopped => {}
        }
    }

    // ── Backend events ────────────────────────────────────────────────────────

    /// Apply one backend event.  Events for utterances other than the active
    /// one are ignored.
    pub fn handle_event(&mut self, event: SpeechEvent) {
        if !self.supported {
            return;
        }
        if let SpeechEvent::VoicesChanged = event {
            self.voices = self.backend.list_voices();
            debug!("voice list changed: {} voices", self.voices.len());
            return;
        }
        let Some(id) = event.utterance() else { return };
        if self.active != Some(id) {
            trace!("ignoring stale event for utterance {id}: {event:?}");
            return;
        }

        match event {
            SpeechEvent::Started { .. } => trace!("utterance {id} started"),
            SpeechEvent::Ended { .. } => {
                self.active = None;
                self.advance();
            }
            SpeechEvent::Interrupted { .. } => {
                self.active = None;
                debug!("utterance {id} interrupted by another session; playback ended");
                self.state = PlayState::Stopped;
            }
            SpeechEvent::Failed { message, .. } => {
                self.active = None;
                self.abandon(&message);
            }
            SpeechEvent::VoicesChanged => {}
        }
    }

    /// Apply every event already waiting in `rx`.  Returns how many there were.
    pub fn drain_events(&mut self, rx: &Receiver<SpeechEvent>) -> usize {
        let mut n = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event);
            n += 1;
        }
        n
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn set_current(&mut self, index: usize) {
        if index == self.current {
            return;
        }
        self.current = index;
        if let Some(listener) = self.listener.as_mut() {
            listener.paragraph_changed(index);
        }
    }

    /// The active utterance finished naturally.
    fn advance(&mut self) {
        let next = self.current + 1;
        if next < self.paragraphs.len() {
            self.set_current(next);
            // Paused: the next paragraph waits for `resume`.
            if self.state == PlayState::Playing {
                self.speak_current();
            }
        } else {
            debug!("story finished");
            self.state = PlayState::Stopped;
            self.set_current(0);
        }
    }

    /// Cancel our in-flight utterance, if there is one.
    fn discard_active(&mut self) {
        if let Some(id) = self.active.take() {
            trace!("cancelling utterance {id}");
            self.backend.cancel();
        }
    }

    /// Build and start the utterance for the current paragraph.
    fn speak_current(&mut self) {
        let Some(text) = self.paragraphs.get(self.current) else {
            self.state = PlayState::Stopped;
            return;
        };

        // One speaker: whatever is playing goes first, ours or not.
        self.active = None;
        self.backend.cancel();

        let voice = select_voice(
            &self.voices,
            &self.config.locale_prefix,
            self.gender,
            &self.config.keywords,
        );
        let utterance = Utterance {
            id: UtteranceId::next(),
            text: text.clone(),
            lang: self.config.language.clone(),
            rate: self.speed,
            pitch: self.config.pitch_for(self.gender),
            voice: voice.map(|v| v.id.clone()),
        };

        debug!(
            "speaking paragraph {} as {} (rate {}, voice {:?})",
            self.current, utterance.id, utterance.rate, utterance.voice
        );
        match self.backend.speak(&utterance) {
            Ok(()) => self.active = Some(utterance.id),
            Err(e) => self.abandon(&e.to_string()),
        }
    }

    /// End the playback run after a speech failure.  The position is kept so
    /// `play` picks up at the same paragraph.
    fn abandon(&mut self, message: &str) {
        warn!("narration stopped at paragraph {}: {}", self.current, message);
        self.state = PlayState::Stopped;
        if let Some(listener) = self.listener.as_mut() {
            listener.playback_failed(self.current, message);
        }
    }
}

impl<B: SpeechBackend> Drop for NarrationEngine<B> {
    fn drop(&mut self) {
        self.discard_active();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
