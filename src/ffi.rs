//! C FFI — lets an iOS / Android host drive a [`NarrationEngine`] over its own
//! platform speech synthesizer (`AVSpeechSynthesizer`, `TextToSpeech`, …).
//!
//! The host fills in a [`NarrationHost`] with callbacks that speak, pause,
//! resume and cancel, and reports speech progress back with the
//! `narration_utterance_*` functions.  All calls for one session must come from
//! one thread, and callbacks must not call back into the session: queue the
//! event and report it after the callback returns.
//!
//! ## Memory contract
//!
//! | Function                       | Caller frees with            |
//! |--------------------------------|------------------------------|
//! | [`narration_session_new`]      | [`narration_session_free`]   |
//! | [`narration_state_json`]       | [`narration_free_string`]    |
//! | [`narration_split_story`]      | [`narration_free_string`]    |
//!
//! All strings crossing the boundary are NUL-terminated UTF-8.  Strings passed
//! *to* host callbacks are only valid for the duration of the call.

use std::{
    cell::RefCell,
    ffi::{c_char, c_void, CStr, CString},
    rc::Rc,
};

use anyhow::{anyhow, Context, Result};
use log::warn;

use crate::{
    backend::{EventSink, SpeechBackend, SpeechError, SpeechEvent, Utterance, UtteranceId},
    config::NarrationConfig,
    engine::{NarrationEngine, NarrationListener},
    story::split_paragraphs,
    voice::{Voice, VoiceGender},
};

// ─────────────────────────────────────────────────────────────────────────────
// Host callbacks
// ─────────────────────────────────────────────────────────────────────────────

/// Platform speech capability supplied by the host.
///
/// `speak`, `pause`, `resume` and `cancel` are required.  The notification
/// callbacks may be null.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NarrationHost {
    /// Opaque pointer handed back to every callback.
    pub user_data: *mut c_void,

    /// `false` if the device has no speech synthesis; the session then
    /// ignores every command.
    pub supported: bool,

    /// Start speaking, replacing anything in flight.  `voice_id` may be null
    /// (use the platform default).  Return 0 on success.
    pub speak: Option<
        unsafe extern "C" fn(
            user_data: *mut c_void,
            utterance_id: u64,
            text: *const c_char,
            lang: *const c_char,
            rate: f32,
            pitch: f32,
            voice_id: *const c_char,
        ) -> i32,
    >,
    pub pause: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    pub resume: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    pub cancel: Option<unsafe extern "C" fn(user_data: *mut c_void)>,

    /// The current paragraph changed (scroll it into view).
    pub paragraph_changed: Option<unsafe extern "C" fn(user_data: *mut c_void, index: usize)>,

    /// Playback stopped because speech failed.
    pub playback_failed:
        Option<unsafe extern "C" fn(user_data: *mut c_void, index: usize, message: *const c_char)>,
}

fn to_c_string(s: &str) -> CString {
    // Interior NULs cannot cross the boundary; drop them.
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

struct HostBackend {
    host: NarrationHost,
    voices: Rc<RefCell<Vec<Voice>>>,
}

impl SpeechBackend for HostBackend {
    fn is_supported(&self) -> bool {
        self.host.supported
    }

    fn list_voices(&self) -> Vec<Voice> {
        self.voices.borrow().clone()
    }

    fn subscribe(&mut self, _sink: EventSink) {
        // Events arrive through the narration_utterance_* entry points.
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        let Some(speak) = self.host.speak else {
            return Err(SpeechError::Unsupported);
        };
        let text = to_c_string(&utterance.text);
        let lang = to_c_string(&utterance.lang);
        let voice = utterance.voice.as_deref().map(to_c_string);
        let voice_ptr = voice.as_ref().map_or(std::ptr::null(), |v| v.as_ptr());

        let rc = unsafe {
            speak(
                self.host.user_data,
                utterance.id.0,
                text.as_ptr(),
                lang.as_ptr(),
                utterance.rate,
                utterance.pitch,
                voice_ptr,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(SpeechError::Host(format!("speak returned {rc}")))
        }
    }

    fn pause(&mut self) -> Result<(), SpeechError> {
        if let Some(pause) = self.host.pause {
            unsafe { pause(self.host.user_data) };
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SpeechError> {
        if let Some(resume) = self.host.resume {
            unsafe { resume(self.host.user_data) };
        }
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.host.cancel {
            unsafe { cancel(self.host.user_data) };
        }
    }
}

struct HostListener(NarrationHost);

impl NarrationListener for HostListener {
    fn paragraph_changed(&mut self, index: usize) {
        if let Some(cb) = self.0.paragraph_changed {
            unsafe { cb(self.0.user_data, index) };
        }
    }

    fn playback_failed(&mut self, index: usize, message: &str) {
        if let Some(cb) = self.0.playback_failed {
            let message = to_c_string(message);
            unsafe { cb(self.0.user_data, index, message.as_ptr()) };
        }
    }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Opaque handle to one narration session.
pub struct NarrationHandle {
    engine: NarrationEngine<HostBackend>,
    voices: Rc<RefCell<Vec<Voice>>>,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Borrow a C string as `&str`.  `None` for null; `Err` for invalid UTF-8.
unsafe fn cstr<'a>(ptr: *const c_char) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(Some)
        .map_err(|_| anyhow!("argument is not valid UTF-8"))
}

fn parse_voices(json: Option<&str>) -> Result<Vec<Voice>> {
    json.map_or(Ok(Vec::new()), |j| serde_json::from_str(j).context("Invalid voices JSON"))
}

fn build_session(
    paragraphs_json: Option<&str>,
    config_json: Option<&str>,
    voices_json: Option<&str>,
    host: NarrationHost,
) -> Result<NarrationHandle> {
    let paragraphs: Vec<String> = serde_json::from_str(
        paragraphs_json.ok_or_else(|| anyhow!("paragraphs_json is null"))?,
    )
    .context("Invalid paragraphs JSON (expected an array of strings)")?;

    let config = match config_json {
        Some(json) => NarrationConfig::from_json_str(json)?,
        None => NarrationConfig::default(),
    };
    if host.speak.is_none() || host.pause.is_none() || host.resume.is_none() || host.cancel.is_none() {
        return Err(anyhow!("speak, pause, resume and cancel callbacks are required"));
    }

    let voices = Rc::new(RefCell::new(parse_voices(voices_json)?));
    let backend = HostBackend { host, voices: Rc::clone(&voices) };
    let engine = NarrationEngine::new(paragraphs, backend, config).with_listener(HostListener(host));
    Ok(NarrationHandle { engine, voices })
}

/// Heap-allocate an owned C string.  Returns null on interior nul bytes.
fn into_raw_c_str(s: &str) -> *const c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

macro_rules! with_session {
    ($handle:expr, |$engine:ident| $body:expr) => {{
        if $handle.is_null() {
            return;
        }
        let $engine = unsafe { &mut (*$handle).engine };
        $body;
    }};
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Create a narration session.
///
/// @param paragraphs_json  JSON array of paragraph strings.
/// @param config_json      Narration config JSON, or `NULL` for defaults.
/// @param voices_json      JSON array of `{"id","name","lang"}`, or `NULL`
///                         if the platform has not loaded voices yet.
/// @param host             Callbacks; copied, need not outlive the call.
/// @return                 Session handle, or `NULL` on invalid input (details
///                         logged).  Free with [`narration_session_free`].
#[no_mangle]
pub unsafe extern "C" fn narration_session_new(
    paragraphs_json: *const c_char,
    config_json: *const c_char,
    voices_json: *const c_char,
    host: *const NarrationHost,
) -> *mut NarrationHandle {
    if host.is_null() {
        warn!("narration_session_new: null host");
        return std::ptr::null_mut();
    }
    let host = unsafe { *host };
    let result = (|| {
        let paragraphs = unsafe { cstr(paragraphs_json) }?;
        let config = unsafe { cstr(config_json) }?;
        let voices = unsafe { cstr(voices_json) }?;
        build_session(paragraphs, config, voices, host)
    })();
    match result {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            warn!("narration_session_new: {e:#}");
            std::ptr::null_mut()
        }
    }
}

/// Destroy a session, cancelling any speech in flight.
#[no_mangle]
pub unsafe extern "C" fn narration_session_free(session: *mut NarrationHandle) {
    if !session.is_null() {
        drop(unsafe { Box::from_raw(session) });
    }
}

#[no_mangle]
pub unsafe extern "C" fn narration_play(session: *mut NarrationHandle) {
    with_session!(session, |engine| engine.play())
}

#[no_mangle]
pub unsafe extern "C" fn narration_pause(session: *mut NarrationHandle) {
    with_session!(session, |engine| engine.pause())
}

#[no_mangle]
pub unsafe extern "C" fn narration_resume(session: *mut NarrationHandle) {
    with_session!(session, |engine| engine.resume())
}

#[no_mangle]
pub unsafe extern "C" fn narration_stop(session: *mut NarrationHandle) {
    with_session!(session, |engine| engine.stop())
}

#[no_mangle]
pub unsafe extern "C" fn narration_next(session: *mut NarrationHandle) {
    with_session!(session, |engine| engine.go_to_next())
}

#[no_mangle]
pub unsafe extern "C" fn narration_previous(session: *mut NarrationHandle) {
    with_session!(session, |engine| engine.go_to_previous())
}

#[no_mangle]
pub unsafe extern "C" fn narration_go_to(session: *mut NarrationHandle, index: usize) {
    with_session!(session, |engine| engine.go_to_paragraph(index))
}

#[no_mangle]
pub unsafe extern "C" fn narration_set_speed(session: *mut NarrationHandle, rate: f32) {
    with_session!(session, |engine| engine.set_speed(rate))
}

/// @param gender  0 = female, anything else = male.
#[no_mangle]
pub unsafe extern "C" fn narration_set_voice_gender(session: *mut NarrationHandle, gender: u32) {
    let gender = if gender == 0 { VoiceGender::Female } else { VoiceGender::Male };
    with_session!(session, |engine| engine.set_voice_gender(gender))
}

#[no_mangle]
pub unsafe extern "C" fn narration_utterance_started(session: *mut NarrationHandle, utterance_id: u64) {
    let id = UtteranceId(utterance_id);
    with_session!(session, |engine| engine.handle_event(SpeechEvent::Started { id }))
}

#[no_mangle]
pub unsafe extern "C" fn narration_utterance_ended(session: *mut NarrationHandle, utterance_id: u64) {
    let id = UtteranceId(utterance_id);
    with_session!(session, |engine| engine.handle_event(SpeechEvent::Ended { id }))
}

#[no_mangle]
pub unsafe extern "C" fn narration_utterance_interrupted(session: *mut NarrationHandle, utterance_id: u64) {
    let id = UtteranceId(utterance_id);
    with_session!(session, |engine| engine.handle_event(SpeechEvent::Interrupted { id }))
}

/// @param message  Platform error description; may be null.
#[no_mangle]
pub unsafe extern "C" fn narration_utterance_failed(
    session: *mut NarrationHandle,
    utterance_id: u64,
    message: *const c_char,
) {
    let message = match unsafe { cstr(message) } {
        Ok(Some(m)) => m.to_string(),
        _ => "speech synthesis error".to_string(),
    };
    let id = UtteranceId(utterance_id);
    with_session!(session, |engine| engine.handle_event(SpeechEvent::Failed { id, message }))
}

/// Replace the session's voice list.
///
/// @param voices_json  JSON array of `{"id","name","lang"}`.
/// @return             0 on success, -1 on null or invalid input.
#[no_mangle]
pub unsafe extern "C" fn narration_voices_changed(
    session: *mut NarrationHandle,
    voices_json: *const c_char,
) -> i32 {
    if session.is_null() {
        return -1;
    }
    let voices = match unsafe { cstr(voices_json) }.and_then(|j| {
        let j = j.ok_or_else(|| anyhow!("voices_json is null"))?;
        parse_voices(Some(j))
    }) {
        Ok(v) => v,
        Err(e) => {
            warn!("narration_voices_changed: {e:#}");
            return -1;
        }
    };
    let h = unsafe { &mut *session };
    *h.voices.borrow_mut() = voices;
    h.engine.handle_event(SpeechEvent::VoicesChanged);
    0
}

/// Snapshot of the session as JSON:
/// `{"is_playing":…,"is_paused":…,"current_paragraph":…,"total_paragraphs":…,
///   "speed":…,"voice_gender":"female","is_supported":…}`
///
/// @return  Heap-allocated string, or `NULL` on error.
///          Free with [`narration_free_string`].
#[no_mangle]
pub unsafe extern "C" fn narration_state_json(session: *const NarrationHandle) -> *const c_char {
    if session.is_null() {
        return std::ptr::null();
    }
    let h = unsafe { &*session };
    match serde_json::to_string(&h.engine.state()) {
        Ok(json) => into_raw_c_str(&json),
        Err(_) => std::ptr::null(),
    }
}

/// Split story text into a JSON array of paragraphs, ready for
/// [`narration_session_new`].
#[no_mangle]
pub unsafe extern "C" fn narration_split_story(text: *const c_char) -> *const c_char {
    let Ok(Some(text)) = (unsafe { cstr(text) }) else {
        return std::ptr::null();
    };
    match serde_json::to_string(&split_paragraphs(text)) {
        Ok(json) => into_raw_c_str(&json),
        Err(_) => std::ptr::null(),
    }
}

/// Free a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn narration_free_string(s: *const c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s as *mut c_char) });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// What the fake host saw, reachable through `user_data`.
    #[derive(Default)]
    struct Log {
        spoken: Vec<(u64, String, Option<String>)>,
        cancels: usize,
        pauses: usize,
        changes: Vec<usize>,
        failures: Vec<(usize, String)>,
    }

    unsafe fn log<'a>(user_data: *mut c_void) -> &'a mut Log {
        unsafe { &mut *(user_data as *mut Log) }
    }

    unsafe extern "C" fn speak(
        user_data: *mut c_void,
        id: u64,
        text: *const c_char,
        _lang: *const c_char,
        _rate: f32,
        _pitch: f32,
        voice: *const c_char,
    ) -> i32 {
        let text = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
        let voice = (!voice.is_null())
            .then(|| unsafe { CStr::from_ptr(voice) }.to_string_lossy().into_owned());
        unsafe { log(user_data) }.spoken.push((id, text, voice));
        0
    }

    unsafe extern "C" fn pause(user_data: *mut c_void) {
        unsafe { log(user_data) }.pauses += 1;
    }

    unsafe extern "C" fn resume(_user_data: *mut c_void) {}

    unsafe extern "C" fn cancel(user_data: *mut c_void) {
        unsafe { log(user_data) }.cancels += 1;
    }

    unsafe extern "C" fn changed(user_data: *mut c_void, index: usize) {
        unsafe { log(user_data) }.changes.push(index);
    }

    unsafe extern "C" fn failed(user_data: *mut c_void, index: usize, message: *const c_char) {
        let message = unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned();
        unsafe { log(user_data) }.failures.push((index, message));
    }

    fn host(log: &mut Log) -> NarrationHost {
        NarrationHost {
            user_data: log as *mut Log as *mut c_void,
            supported: true,
            speak: Some(speak),
            pause: Some(pause),
            resume: Some(resume),
            cancel: Some(cancel),
            paragraph_changed: Some(changed),
            playback_failed: Some(failed),
        }
    }

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe fn state(session: *const NarrationHandle) -> serde_json::Value {
        let raw = unsafe { narration_state_json(session) };
        assert!(!raw.is_null());
        let json = unsafe { CStr::from_ptr(raw) }.to_str().unwrap().to_owned();
        unsafe { narration_free_string(raw) };
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_session_round_trip() {
        let mut log = Log::default();
        let host = host(&mut log);
        let paragraphs = c(r#"["Era uma vez.", "Fim."]"#);
        let voices = c(r#"[{"id":"v1","name":"Maria","lang":"pt-BR"}]"#);

        unsafe {
            let s = narration_session_new(paragraphs.as_ptr(), std::ptr::null(), voices.as_ptr(), &host);
            assert!(!s.is_null());

            narration_play(s);
            let first = log.spoken.last().unwrap().clone();
            assert_eq!(first.1, "Era uma vez.");
            assert_eq!(first.2.as_deref(), Some("v1"));

            narration_utterance_started(s, first.0);
            narration_utterance_ended(s, first.0);
            assert_eq!(log.spoken.last().unwrap().1, "Fim.");
            assert_eq!(log.changes, vec![1]);

            narration_pause(s);
            assert_eq!(log.pauses, 1);
            let st = state(s);
            assert_eq!(st["is_paused"], true);
            assert_eq!(st["current_paragraph"], 1);

            narration_session_free(s);
        }
        assert!(log.cancels >= 1, "free cancels speech in flight");
    }

    #[test]
    fn test_failure_reaches_host() {
        let mut log = Log::default();
        let host = host(&mut log);
        let paragraphs = c(r#"["A", "B"]"#);
        let message = c("audio-busy");
        unsafe {
            let s = narration_session_new(paragraphs.as_ptr(), std::ptr::null(), std::ptr::null(), &host);
            narration_play(s);
            let id = log.spoken[0].0;
            narration_utterance_failed(s, id, message.as_ptr());
            assert_eq!(state(s)["is_playing"], false);
            narration_session_free(s);
        }
        assert_eq!(log.failures, vec![(0, "audio-busy".to_string())]);
    }

    #[test]
    fn test_late_voices() {
        let mut log = Log::default();
        let host = host(&mut log);
        let paragraphs = c(r#"["A", "B"]"#);
        let voices = c(r#"[{"id":"m","name":"Daniel","lang":"pt-BR"},{"id":"f","name":"Ana","lang":"pt-BR"}]"#);
        unsafe {
            let s = narration_session_new(paragraphs.as_ptr(), std::ptr::null(), std::ptr::null(), &host);
            narration_set_voice_gender(s, 1);
            narration_play(s);
            assert_eq!(log.spoken[0].2, None);
            assert_eq!(narration_voices_changed(s, voices.as_ptr()), 0);
            narration_next(s);
            assert_eq!(log.spoken.last().unwrap().2.as_deref(), Some("m"));
            assert_eq!(narration_voices_changed(s, c("nope").as_ptr()), -1);
            narration_session_free(s);
        }
    }

    #[test]
    fn test_new_rejects_bad_input() {
        let mut log = Log::default();
        let mut host = host(&mut log);
        let bad = c("{ not an array");
        let good = c(r#"["A"]"#);
        unsafe {
            assert!(narration_session_new(bad.as_ptr(), std::ptr::null(), std::ptr::null(), &host).is_null());
            assert!(narration_session_new(std::ptr::null(), std::ptr::null(), std::ptr::null(), &host).is_null());
            assert!(narration_session_new(good.as_ptr(), std::ptr::null(), std::ptr::null(), std::ptr::null()).is_null());
            host.speak = None;
            assert!(narration_session_new(good.as_ptr(), std::ptr::null(), std::ptr::null(), &host).is_null());
        }
    }

    #[test]
    fn test_null_session_is_ignored() {
        unsafe {
            narration_play(std::ptr::null_mut());
            narration_utterance_ended(std::ptr::null_mut(), 1);
            assert!(narration_state_json(std::ptr::null()).is_null());
            assert_eq!(narration_voices_changed(std::ptr::null_mut(), std::ptr::null()), -1);
            narration_session_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_split_story() {
        let text = c("Um.\n\nDois.");
        unsafe {
            let raw = narration_split_story(text.as_ptr());
            let json = CStr::from_ptr(raw).to_str().unwrap().to_owned();
            narration_free_string(raw);
            assert_eq!(json, r#"["Um.","Dois."]"#);
        }
    }
}
