//! Terminal narrator — reads a story file aloud through espeak-ng.
//!
//! Usage:
//!   narrate story.txt
//!   narrate story.txt --voice male --speed 1.1 --start 3
//!   RUST_LOG=debug narrate story.txt --config narration.json
//!
//! Type a command and press Enter:
//!
//! | Key   | Action                 |
//! |-------|------------------------|
//! | `p`   | play / pause / resume  |
//! | `s`   | stop                   |
//! | `n`   | next paragraph         |
//! | `b`   | previous paragraph     |
//! | `g N` | go to paragraph N      |
//! | `+`   | faster                 |
//! | `-`   | slower                 |
//! | `v`   | switch voice           |
//! | `q`   | quit                   |

use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::mpsc,
    thread,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use bedtime_narrator::{
    controls::SPEED_STEP,
    espeak::{EspeakBackend, DEFAULT_PROGRAM},
    split_paragraphs,
    story::reading_time_minutes,
    ControlIntent, ControlsView, NarrationConfig, NarrationEngine, NarrationListener, SpeechBackend,
    SpeechEvent, VoiceGender,
};

#[derive(Parser, Debug)]
#[command(name = "narrate", version, about = "Read a bedtime story aloud, one paragraph at a time")]
struct Args {
    /// Story text file; paragraphs are separated by blank lines
    file: PathBuf,

    /// Narration config JSON (language, pitches, voice keywords)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial speaking rate (1.0 = normal)
    #[arg(long)]
    speed: Option<f32>,

    /// Narrator voice: female or male
    #[arg(long, default_value_t = VoiceGender::Female)]
    voice: VoiceGender,

    /// Paragraph to start from (1-based)
    #[arg(long, default_value_t = 1)]
    start: usize,

    /// espeak-ng executable
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    program: PathBuf,
}

/// Everything the main loop waits on.
enum Input {
    Speech(SpeechEvent),
    Line(String),
    Eof,
}

/// Prints each paragraph as narration reaches it.
struct Printer {
    paragraphs: Vec<String>,
}

impl NarrationListener for Printer {
    fn paragraph_changed(&mut self, index: usize) {
        if let Some(text) = self.paragraphs.get(index) {
            println!("\n[{}] {}", index + 1, text);
        }
    }

    fn playback_failed(&mut self, index: usize, message: &str) {
        eprintln!("narration stopped at paragraph {}: {}", index + 1, message);
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let cmd = match words.next()? {
        "p" => Command::Intent(ControlIntent::TogglePlay),
        "s" => Command::Intent(ControlIntent::Stop),
        "n" => Command::Intent(ControlIntent::Next),
        "b" => Command::Intent(ControlIntent::Previous),
        "g" => {
            let n: usize = words.next()?.parse().ok()?;
            Command::Intent(ControlIntent::Seek(n.checked_sub(1)?))
        }
        "+" => Command::Faster,
        "-" => Command::Slower,
        "v" => Command::SwitchVoice,
        "q" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

enum Command {
    Intent(ControlIntent),
    Faster,
    Slower,
    SwitchVoice,
    Quit,
}

fn show<B: SpeechBackend>(engine: &NarrationEngine<B>) {
    if let Some(view) = ControlsView::render(engine) {
        println!("{view}");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Cannot read story: {}", args.file.display()))?;
    let paragraphs = split_paragraphs(&text);
    if paragraphs.is_empty() {
        bail!("{} has no paragraphs", args.file.display());
    }
    let config = match &args.config {
        Some(path) => NarrationConfig::from_json_file(path)?,
        None => NarrationConfig::default(),
    };

    let mut backend = EspeakBackend::new(args.program.clone());
    if !backend.is_supported() {
        bail!(
            "{} is not usable.\n\
             Install with:  apk add espeak-ng  (Alpine)\n\
             Or:            apt install espeak-ng  (Debian/Ubuntu)\n\
             Or:            brew install espeak-ng  (macOS)",
            args.program.display()
        );
    }

    let (tx, rx) = mpsc::channel();
    let speech_tx = tx.clone();
    backend.subscribe(Box::new(move |event| {
        let _ = speech_tx.send(Input::Speech(event));
    }));
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Eof);
    });

    println!(
        "{}: {} paragraphs, about {} min",
        args.file.display(),
        paragraphs.len(),
        reading_time_minutes(&text)
    );

    let printer = Printer { paragraphs: paragraphs.clone() };
    let mut engine = NarrationEngine::new(paragraphs, backend, config).with_listener(printer);
    info!("{} voices from {}", engine.voices().len(), args.program.display());

    if let Some(speed) = args.speed {
        engine.set_speed(speed);
    }
    engine.set_voice_gender(args.voice);
    // Seeking away from the first paragraph prints through the listener.
    engine.go_to_paragraph(args.start.saturating_sub(1));
    if engine.current_paragraph() == 0 {
        println!("[1] {}", engine.paragraphs()[0]);
    }
    engine.play();
    show(&engine);

    let mut stdin_open = true;
    for input in rx.iter() {
        match input {
            Input::Speech(event) => {
                let was_playing = engine.is_playing();
                engine.handle_event(event);
                if was_playing && !engine.is_playing() {
                    show(&engine);
                }
            }
            Input::Line(line) => {
                match parse_command(&line) {
                    Some(Command::Intent(intent)) => intent.apply(&mut engine),
                    Some(Command::Faster) => {
                        ControlIntent::SetSpeed(engine.speed() + SPEED_STEP).apply(&mut engine)
                    }
                    Some(Command::Slower) => {
                        ControlIntent::SetSpeed(engine.speed() - SPEED_STEP).apply(&mut engine)
                    }
                    Some(Command::SwitchVoice) => {
                        ControlIntent::SetVoice(engine.voice_gender().other()).apply(&mut engine)
                    }
                    Some(Command::Quit) => break,
                    None => eprintln!("unknown command {line:?} (p s n b g N + - v q)"),
                }
                show(&engine);
            }
            Input::Eof => stdin_open = false,
        }
        if !stdin_open && !engine.is_playing() {
            break;
        }
    }

    engine.stop();
    Ok(())
}
