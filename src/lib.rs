//! # bedtime-narrator
//!
//! Reads a bedtime story aloud one paragraph at a time, with a play / pause /
//! seek / speed / voice control strip, over whatever speech synthesizer the
//! platform provides.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::mpsc;
//! use bedtime_narrator::{channel_sink, split_paragraphs, NarrationConfig, NarrationEngine};
//! # use bedtime_narrator::ScriptedBackend as MyBackend;
//! # use bedtime_narrator::SpeechBackend;
//!
//! let story = "Era uma vez um gato.\n\nO gato dormiu.";
//! let mut backend = MyBackend::new();
//!
//! // Speech events flow back to the engine through a channel.
//! let (tx, rx) = mpsc::channel();
//! backend.subscribe(channel_sink(tx));
//!
//! let mut engine = NarrationEngine::new(split_paragraphs(story), backend, NarrationConfig::default())
//!     .with_listener(|i: usize| println!("now reading paragraph {i}"));
//! engine.play();
//!
//! // In the host's event loop:
//! engine.drain_events(&rx);
//! ```
//!
//! ## Backends
//! | Backend                          | Where                                       |
//! |----------------------------------|---------------------------------------------|
//! | [`ScriptedBackend`]              | Tests and demos; you decide when speech ends |
//! | `espeak::EspeakBackend`          | Desktop Unix, `espeak` feature              |
//! | [`ffi::NarrationHost`] callbacks | iOS / Android platform synthesizers         |
//!
//! ## Pieces
//! 1. **Story** — [`split_paragraphs`] turns story text into paragraphs.
//! 2. **Engine** — [`NarrationEngine`] owns position, speed, voice and play state.
//! 3. **Voice** — [`select_voice`] picks a locale voice matching the gender.
//! 4. **Controls** — [`ControlsView`] renders engine state; [`ControlIntent`]
//!    turns presses back into commands.

pub mod backend;
pub mod config;
pub mod controls;
pub mod engine;
pub mod scripted;
pub mod story;
pub mod voice;

// Child-process synthesizer; pause/resume rely on SIGSTOP/SIGCONT.
#[cfg(all(feature = "espeak", unix))]
pub mod espeak;

// C FFI for iOS / Android — the host app supplies speech through callbacks.
pub mod ffi;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use backend::{channel_sink, EventSink, SpeechBackend, SpeechError, SpeechEvent, Utterance, UtteranceId};
pub use config::NarrationConfig;
pub use controls::{ControlIntent, ControlsView};
pub use engine::{NarrationEngine, NarrationListener, NarrationState, PlayState};
pub use scripted::ScriptedBackend;
pub use story::split_paragraphs;
pub use voice::{select_voice, Voice, VoiceGender, VoiceKeywords};
