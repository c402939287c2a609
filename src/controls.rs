//! Playback controls view model.
//!
//! [`ControlsView`] is a pure function of engine state: what the control strip
//! should show.  [`ControlIntent`] is what the user did to it; applying an
//! intent issues the matching engine command.  Nothing here holds state of its
//! own.

use std::fmt;

use serde::Serialize;

use crate::{backend::SpeechBackend, engine::NarrationEngine, voice::VoiceGender};

/// Slowest speed the slider offers.
pub const MIN_SPEED: f32 = 0.5;
/// Fastest speed the slider offers.
pub const MAX_SPEED: f32 = 1.5;
/// Slider granularity.
pub const SPEED_STEP: f32 = 0.1;

/// Icon on the play/pause toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleIcon {
    Play,
    Pause,
}

/// One per-paragraph seek indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeekDot {
    pub index: usize,
    pub current: bool,
}

/// Speed slider bounds and position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedSlider {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub value: f32,
}

impl SpeedSlider {
    /// `"0.9x"`
    pub fn label(&self) -> String {
        format!("{:.1}x", self.value)
    }
}

/// Everything the control strip renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlsView {
    pub toggle: ToggleIcon,
    pub previous_enabled: bool,
    pub next_enabled: bool,
    pub dots: Vec<SeekDot>,
    pub speed: SpeedSlider,
    pub voice: VoiceGender,
    /// One-based position, e.g. `"2 / 5"`.
    pub progress: String,
}

impl ControlsView {
    /// Render controls for `engine`, or `None` when the platform cannot speak
    /// and narration should not be offered at all.
    pub fn render<B: SpeechBackend>(engine: &NarrationEngine<B>) -> Option<Self> {
        if !engine.is_supported() {
            return None;
        }
        let current = engine.current_paragraph();
        let total = engine.total_paragraphs();
        let toggle = if engine.is_playing() && !engine.is_paused() {
            ToggleIcon::Pause
        } else {
            ToggleIcon::Play
        };

        Some(Self {
            toggle,
            previous_enabled: current > 0,
            next_enabled: current + 1 < total,
            dots: (0..total).map(|index| SeekDot { index, current: index == current }).collect(),
            speed: SpeedSlider {
                min: MIN_SPEED,
                max: MAX_SPEED,
                step: SPEED_STEP,
                value: engine.speed(),
            },
            voice: engine.voice_gender(),
            progress: if total == 0 {
                "0 / 0".to_string()
            } else {
                format!("{} / {}", current + 1, total)
            },
        })
    }
}

/// Text strip for terminals:
/// `|◀ ▶ ▶| ■  ○●○  2 / 3  0.9x  female`
impl fmt::Display for ControlsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prev = if self.previous_enabled { "|◀" } else { "  " };
        let next = if self.next_enabled { "▶|" } else { "  " };
        let toggle = match self.toggle {
            ToggleIcon::Play => "▶",
            ToggleIcon::Pause => "⏸",
        };
        let dots: String = self.dots.iter().map(|d| if d.current { '●' } else { '○' }).collect();
        write!(
            f,
            "{prev} {toggle} {next} ■  {dots}  {}  {}  {}",
            self.progress,
            self.speed.label(),
            self.voice
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Intents
// ─────────────────────────────────────────────────────────────────────────────

/// A user interaction with the controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlIntent {
    /// The play/pause toggle was pressed.
    TogglePlay,
    Stop,
    Previous,
    Next,
    /// A seek dot was pressed.
    Seek(usize),
    /// The slider moved to this raw value.
    SetSpeed(f32),
    SetVoice(VoiceGender),
}

impl ControlIntent {
    /// Issue the engine command for this intent.
    pub fn apply<B: SpeechBackend>(self, engine: &mut NarrationEngine<B>) {
        match self {
            Self::TogglePlay => {
                if !engine.is_playing() {
                    engine.play();
                } else if engine.is_paused() {
                    engine.resume();
                } else {
                    engine.pause();
                }
            }
            Self::Stop => engine.stop(),
            Self::Previous => engine.go_to_previous(),
            Self::Next => engine.go_to_next(),
            Self::Seek(index) => engine.go_to_paragraph(index),
            Self::SetSpeed(raw) => engine.set_speed(snap_speed(raw)),
            Self::SetVoice(gender) => engine.set_voice_gender(gender),
        }
    }
}

/// Clamp a raw slider value to the slider range and snap it to the step.
pub fn snap_speed(raw: f32) -> f32 {
    if raw.is_nan() {
        return crate::config::DEFAULT_SPEED;
    }
    let clamped = raw.clamp(MIN_SPEED, MAX_SPEED);
    let steps = ((clamped - MIN_SPEED) / SPEED_STEP).round();
    // Round to one decimal so 0.5 + 4 * 0.1 reads back as 0.9, not 0.90000004.
    ((MIN_SPEED + steps * SPEED_STEP) * 10.0).round() / 10.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::NarrationConfig, scripted::ScriptedBackend};

    fn session(n: usize) -> (NarrationEngine<ScriptedBackend>, ScriptedBackend) {
        let speaker = ScriptedBackend::new();
        let paragraphs = (0..n).map(|i| format!("paragraph {i}")).collect();
        let engine = NarrationEngine::new(paragraphs, speaker.clone(), NarrationConfig::default());
        (engine, speaker)
    }

    #[test]
    fn test_unsupported_renders_nothing() {
        let engine = NarrationEngine::new(
            vec!["a".into()],
            ScriptedBackend::unsupported(),
            NarrationConfig::default(),
        );
        assert!(ControlsView::render(&engine).is_none());
    }

    #[test]
    fn test_initial_view() {
        let (engine, _) = session(3);
        let view = ControlsView::render(&engine).unwrap();
        assert_eq!(view.toggle, ToggleIcon::Play);
        assert!(!view.previous_enabled);
        assert!(view.next_enabled);
        assert_eq!(view.dots.len(), 3);
        assert!(view.dots[0].current);
        assert_eq!(view.progress, "1 / 3");
        assert_eq!(view.speed.label(), "0.9x");
        assert_eq!(view.voice, VoiceGender::Female);
    }

    #[test]
    fn test_boundaries_disable_buttons() {
        let (mut engine, _) = session(3);
        engine.go_to_paragraph(2);
        let view = ControlsView::render(&engine).unwrap();
        assert!(view.previous_enabled);
        assert!(!view.next_enabled);
        assert_eq!(view.dots.iter().filter(|d| d.current).count(), 1);
        assert!(view.dots[2].current);

        let (single, _) = session(1);
        let view = ControlsView::render(&single).unwrap();
        assert!(!view.previous_enabled && !view.next_enabled);
    }

    #[test]
    fn test_empty_story_progress() {
        let (engine, _) = session(0);
        let view = ControlsView::render(&engine).unwrap();
        assert_eq!(view.progress, "0 / 0");
        assert!(view.dots.is_empty());
        assert!(!view.previous_enabled && !view.next_enabled);
    }

    #[test]
    fn test_toggle_cycles_play_pause_resume() {
        let (mut engine, speaker) = session(2);

        ControlIntent::TogglePlay.apply(&mut engine);
        assert!(engine.is_playing());
        assert_eq!(ControlsView::render(&engine).unwrap().toggle, ToggleIcon::Pause);

        ControlIntent::TogglePlay.apply(&mut engine);
        assert!(engine.is_paused());
        assert_eq!(ControlsView::render(&engine).unwrap().toggle, ToggleIcon::Play);

        ControlIntent::TogglePlay.apply(&mut engine);
        assert!(engine.is_playing() && !engine.is_paused());
        assert_eq!(speaker.spoken().len(), 1, "resume must not restart");
    }

    #[test]
    fn test_intents_reach_the_engine() {
        let (mut engine, _) = session(4);
        ControlIntent::Seek(3).apply(&mut engine);
        assert_eq!(engine.current_paragraph(), 3);
        ControlIntent::Previous.apply(&mut engine);
        assert_eq!(engine.current_paragraph(), 2);
        ControlIntent::Next.apply(&mut engine);
        assert_eq!(engine.current_paragraph(), 3);
        ControlIntent::SetVoice(VoiceGender::Male).apply(&mut engine);
        assert_eq!(engine.voice_gender(), VoiceGender::Male);
        ControlIntent::Stop.apply(&mut engine);
        assert_eq!(engine.current_paragraph(), 0);
    }

    #[test]
    fn test_slider_clamps_and_snaps() {
        assert_eq!(snap_speed(0.9), 0.9);
        assert_eq!(snap_speed(0.94), 0.9);
        assert_eq!(snap_speed(0.96), 1.0);
        assert_eq!(snap_speed(0.1), 0.5);
        assert_eq!(snap_speed(9.0), 1.5);
        assert_eq!(snap_speed(f32::NAN), 0.9);

        let (mut engine, _) = session(1);
        ControlIntent::SetSpeed(3.0).apply(&mut engine);
        assert_eq!(engine.speed(), 1.5);
    }

    #[test]
    fn test_display_strip() {
        let (mut engine, _) = session(3);
        engine.go_to_paragraph(1);
        let line = ControlsView::render(&engine).unwrap().to_string();
        assert!(line.contains("○●○"), "got: {line}");
        assert!(line.contains("2 / 3"), "got: {line}");
        assert!(line.contains("0.9x"), "got: {line}");
        assert!(line.contains("female"), "got: {line}");
    }
}
