//! In-memory speech backend driven by hand.
//!
//! [`ScriptedBackend`] records every command it receives and only finishes an
//! utterance when told to, which makes playback deterministic.  Clones share
//! one speaker, so several engines built on clones of the same backend contend
//! for it exactly like sessions on a real device.
//!
//! ```
//! use std::sync::mpsc;
//! use bedtime_narrator::{channel_sink, NarrationEngine, NarrationConfig, ScriptedBackend, SpeechBackend};
//!
//! let speaker = ScriptedBackend::new();
//! let (tx, rx) = mpsc::channel();
//! let mut backend = speaker.clone();
//! backend.subscribe(channel_sink(tx));
//!
//! let mut engine = NarrationEngine::new(
//!     vec!["Era uma vez.".into(), "Fim.".into()],
//!     backend,
//!     NarrationConfig::default(),
//! );
//! engine.play();
//! speaker.finish_current();
//! engine.drain_events(&rx);
//! assert_eq!(engine.current_paragraph(), 1);
//! ```

use std::{cell::RefCell, rc::Rc};

use crate::{
    backend::{EventSink, SpeechBackend, SpeechError, SpeechEvent, Utterance, UtteranceId},
    voice::Voice,
};

/// A command as seen by the speaker.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeakerCall {
    Speak(Utterance),
    Pause,
    Resume,
    Cancel,
}

#[derive(Default)]
struct Speaker {
    supported: bool,
    voices: Vec<Voice>,
    sinks: Vec<EventSink>,
    calls: Vec<SpeakerCall>,
    active: Option<UtteranceId>,
    paused: bool,
    refuse_next: Option<String>,
    refuse_resume: Option<String>,
}

impl Speaker {
    fn emit(&self, event: SpeechEvent) {
        for sink in &self.sinks {
            sink(event.clone());
        }
    }

    /// Drop the active utterance, telling subscribers it was interrupted.
    fn displace(&mut self) {
        if let Some(id) = self.active.take() {
            self.paused = false;
            self.emit(SpeechEvent::Interrupted { id });
        }
    }
}

/// Deterministic backend for tests and simulations.
#[derive(Clone)]
pub struct ScriptedBackend {
    speaker: Rc<RefCell<Speaker>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// A supported speaker with no voices loaded yet.
    pub fn new() -> Self {
        Self::with_voices(Vec::new())
    }

    pub fn with_voices(voices: Vec<Voice>) -> Self {
        let speaker = Speaker { supported: true, voices, ..Speaker::default() };
        Self { speaker: Rc::new(RefCell::new(speaker)) }
    }

    /// A platform without speech synthesis.
    pub fn unsupported() -> Self {
        let backend = Self::new();
        backend.speaker.borrow_mut().supported = false;
        backend
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// Every command received so far, oldest first.
    pub fn calls(&self) -> Vec<SpeakerCall> {
        self.speaker.borrow().calls.clone()
    }

    /// Utterances passed to `speak`, oldest first.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.speaker
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                SpeakerCall::Speak(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }

    /// Texts passed to `speak`, oldest first.
    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }

    /// The most recent utterance passed to `speak`.
    pub fn last_spoken(&self) -> Option<Utterance> {
        self.spoken().pop()
    }

    pub fn active(&self) -> Option<UtteranceId> {
        self.speaker.borrow().active
    }

    pub fn is_paused(&self) -> bool {
        self.speaker.borrow().paused
    }

    pub fn clear_calls(&self) {
        self.speaker.borrow_mut().calls.clear();
    }

    // ── Simulation ────────────────────────────────────────────────────────────

    /// Finish the active utterance normally.  Returns its id.
    pub fn finish_current(&self) -> Option<UtteranceId> {
        let mut s = self.speaker.borrow_mut();
        let id = s.active.take()?;
        s.paused = false;
        s.emit(SpeechEvent::Ended { id });
        Some(id)
    }

    /// Fail the active utterance with `message`.  Returns its id.
    pub fn fail_current(&self, message: &str) -> Option<UtteranceId> {
        let mut s = self.speaker.borrow_mut();
        let id = s.active.take()?;
        s.paused = false;
        s.emit(SpeechEvent::Failed { id, message: message.to_string() });
        Some(id)
    }

    /// Deliver an arbitrary event, e.g. a late completion for an old id.
    pub fn emit(&self, event: SpeechEvent) {
        self.speaker.borrow().emit(event);
    }

    /// Replace the voice list and announce the change.
    pub fn set_voices(&self, voices: Vec<Voice>) {
        let mut s = self.speaker.borrow_mut();
        s.voices = voices;
        s.emit(SpeechEvent::VoicesChanged);
    }

    /// Make the next `speak` call fail synchronously with `message`.
    pub fn refuse_next_speak(&self, message: &str) {
        self.speaker.borrow_mut().refuse_next = Some(message.to_string());
    }

    /// Make the next `resume` call fail with `message`; the utterance stays
    /// suspended.
    pub fn refuse_next_resume(&self, message: &str) {
        self.speaker.borrow_mut().refuse_resume = Some(message.to_string());
    }
}

impl SpeechBackend for ScriptedBackend {
    fn is_supported(&self) -> bool {
        self.speaker.borrow().supported
    }

    fn list_voices(&self) -> Vec<Voice> {
        self.speaker.borrow().voices.clone()
    }

    fn subscribe(&mut self, sink: EventSink) {
        self.speaker.borrow_mut().sinks.push(sink);
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        let mut s = self.speaker.borrow_mut();
        s.calls.push(SpeakerCall::Speak(utterance.clone()));
        if !s.supported {
            return Err(SpeechError::Unsupported);
        }
        if let Some(message) = s.refuse_next.take() {
            return Err(SpeechError::Host(message));
        }
        s.displace();
        s.active = Some(utterance.id);
        s.emit(SpeechEvent::Started { id: utterance.id });
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SpeechError> {
        let mut s = self.speaker.borrow_mut();
        s.calls.push(SpeakerCall::Pause);
        if s.active.is_some() {
            s.paused = true;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SpeechError> {
        let mut s = self.speaker.borrow_mut();
        s.calls.push(SpeakerCall::Resume);
        if let Some(message) = s.refuse_resume.take() {
            return Err(SpeechError::Host(message));
        }
        s.paused = false;
        Ok(())
    }

    fn cancel(&mut self) {
        let mut s = self.speaker.borrow_mut();
        s.calls.push(SpeakerCall::Cancel);
        s.displace();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
