//! Speech backend capability — the seam between the narration engine and
//! whatever actually produces sound.
//!
//! A backend is a handle to the platform speaker.  The speaker is a shared,
//! process-wide resource: one utterance plays at a time, and starting a new one
//! anywhere displaces the previous.  Backends report progress asynchronously
//! through a subscribed [`EventSink`]; the owner of the engine forwards those
//! events to [`NarrationEngine::handle_event`](crate::NarrationEngine::handle_event)
//! on its own thread.
//!
//! | Backend                                   | Where                       |
//! |-------------------------------------------|-----------------------------|
//! | [`ScriptedBackend`](crate::ScriptedBackend) | tests, simulations         |
//! | `espeak::EspeakBackend`                   | desktop, feature `espeak`   |
//! | `ffi` host callbacks                      | iOS / Android host apps     |

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::Sender,
    },
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::voice::Voice;

// ─────────────────────────────────────────────────────────────────────────────
// Utterances
// ─────────────────────────────────────────────────────────────────────────────

/// Identifies one utterance.  Unique across every engine in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceId(pub u64);

static NEXT_UTTERANCE: AtomicU64 = AtomicU64::new(1);

impl UtteranceId {
    /// Allocate a fresh id from the process-wide counter.
    pub fn next() -> Self {
        Self(NEXT_UTTERANCE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One paragraph's worth of speech, fully parameterised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// BCP-47 language tag, e.g. `"pt-BR"`.
    pub lang: String,
    /// Rate multiplier (1.0 = platform normal).
    pub rate: f32,
    /// Pitch multiplier (1.0 = platform normal).
    pub pitch: f32,
    /// Voice to use; `None` leaves the choice to the platform default.
    pub voice: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Asynchronous notification from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpeechEvent {
    /// Audio output for the utterance began.
    Started { id: UtteranceId },
    /// The utterance played to completion.
    Ended { id: UtteranceId },
    /// The utterance was cancelled or displaced by another one.
    Interrupted { id: UtteranceId },
    /// The platform failed while speaking the utterance.
    Failed { id: UtteranceId, message: String },
    /// The set returned by [`SpeechBackend::list_voices`] changed.
    VoicesChanged,
}

impl SpeechEvent {
    /// The utterance this event concerns, if any.
    pub fn utterance(&self) -> Option<UtteranceId> {
        match self {
            Self::Started { id }
            | Self::Ended { id }
            | Self::Interrupted { id }
            | Self::Failed { id, .. } => Some(*id),
            Self::VoicesChanged => None,
        }
    }
}

/// Receiver side of a backend subscription.  May be called from any thread.
pub type EventSink = Box<dyn Fn(SpeechEvent) + Send>;

/// Wrap an mpsc sender as an [`EventSink`].  Send errors (receiver gone) are
/// ignored: nobody is listening any more.
pub fn channel_sink(tx: Sender<SpeechEvent>) -> EventSink {
    Box::new(move |event| {
        let _ = tx.send(event);
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures a backend can report synchronously from a command.
#[derive(Error, Debug)]
pub enum SpeechError {
    /// The host has no speech synthesis capability.
    #[error("speech synthesis is not available on this platform")]
    Unsupported,

    /// The synthesizer could not be started.
    #[error("failed to start synthesizer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Suspending, continuing or stopping the synthesizer failed.
    #[error("failed to signal utterance {id}: {message}")]
    Signal { id: UtteranceId, message: String },

    /// Host-side failure reported through the C ABI.
    #[error("host speech error: {0}")]
    Host(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability trait
// ─────────────────────────────────────────────────────────────────────────────

/// Platform speech synthesis, as seen by the narration engine.
pub trait SpeechBackend {
    /// Whether the platform can speak at all.  Sampled once per session.
    fn is_supported(&self) -> bool {
        true
    }

    /// Voices currently known to the platform.  May be empty until the
    /// platform has loaded them (a [`SpeechEvent::VoicesChanged`] follows).
    fn list_voices(&self) -> Vec<Voice>;

    /// Register a receiver for this backend's events.
    fn subscribe(&mut self, sink: EventSink);

    /// Start speaking `utterance`, displacing any active utterance.
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError>;

    /// Suspend the active utterance without losing its position.
    fn pause(&mut self) -> Result<(), SpeechError>;

    /// Continue a suspended utterance from where it stopped.
    fn resume(&mut self) -> Result<(), SpeechError>;

    /// Stop and discard the active utterance, if any.
    fn cancel(&mut self);
}

impl<B: SpeechBackend + ?Sized> SpeechBackend for Box<B> {
    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    fn list_voices(&self) -> Vec<Voice> {
        (**self).list_voices()
    }

    fn subscribe(&mut self, sink: EventSink) {
        (**self).subscribe(sink)
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        (**self).speak(utterance)
    }

    fn pause(&mut self) -> Result<(), SpeechError> {
        (**self).pause()
    }

    fn resume(&mut self) -> Result<(), SpeechError> {
        (**self).resume()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_utterance_ids_are_unique() {
        let a = UtteranceId::next();
        let b = UtteranceId::next();
        assert!(b > a);
    }

    #[test]
    fn test_event_utterance() {
        let id = UtteranceId(7);
        assert_eq!(SpeechEvent::Ended { id }.utterance(), Some(id));
        assert_eq!(
            SpeechEvent::Failed { id, message: "x".into() }.utterance(),
            Some(id)
        );
        assert_eq!(SpeechEvent::VoicesChanged.utterance(), None);
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, rx) = mpsc::channel();
        let sink = channel_sink(tx);
        sink(SpeechEvent::Started { id: UtteranceId(3) });
        assert_eq!(rx.try_recv().unwrap(), SpeechEvent::Started { id: UtteranceId(3) });
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let sink = channel_sink(tx);
        drop(rx);
        sink(SpeechEvent::VoicesChanged);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&SpeechEvent::Ended { id: UtteranceId(5) }).unwrap();
        assert_eq!(json, r#"{"type":"ended","id":5}"#);
    }
}
