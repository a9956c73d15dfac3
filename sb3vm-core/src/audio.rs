//! Sound bookkeeping. Actual playback goes through the [`AudioSink`] port;
//! the engine only tracks which handles exist, which threads wait on them,
//! and when they complete. Completion comes either from the sink host
//! calling [`AudioEngine::mark_done`] or from the frame clock passing the
//! sound's known duration.

use crate::project::SoundDecl;
use crate::target::SoundEffects;
use crate::types::{SoundHandle, TargetId};
use std::collections::BTreeMap;

/// Playback port. Implementations mix and output audio; the engine never
/// touches samples.
pub trait AudioSink {
    fn start(
        &mut self,
        handle: SoundHandle,
        sound: &SoundDecl,
        volume: f64,
        effects: SoundEffects,
    );
    fn stop_all(&mut self);
}

/// Default sink: swallows playback. Sounds still complete on schedule via
/// their declared duration.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start(&mut self, _: SoundHandle, _: &SoundDecl, _: f64, _: SoundEffects) {}
    fn stop_all(&mut self) {}
}

/// Speech synthesis port for the text-to-speech extension. Returns the
/// utterance duration when playback started, `None` when the host cannot
/// speak (the wait then completes immediately).
pub trait SpeechSynth {
    fn speak(&mut self, text: &str, voice: &str, language: &str) -> Option<f64>;
    fn stop_all(&mut self) {}
}

#[derive(Debug, Default)]
pub struct NullSpeech;

impl SpeechSynth for NullSpeech {
    fn speak(&mut self, _: &str, _: &str, _: &str) -> Option<f64> {
        None
    }
}

#[derive(Clone, Debug)]
struct PlayingSound {
    target: TargetId,
    name: String,
    /// Absolute frame-clock deadline; `None` for unknown durations, which
    /// complete only via `mark_done` or stop-all.
    ends_at: Option<f64>,
    done: bool,
    waited_on: bool,
}

/// Global sound registry: one entry per live playback across all targets.
pub struct AudioEngine {
    sink: Box<dyn AudioSink>,
    playing: BTreeMap<SoundHandle, PlayingSound>,
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("playing", &self.playing)
            .finish_non_exhaustive()
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(Box::new(NullSink))
    }
}

impl AudioEngine {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            playing: BTreeMap::new(),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.sink = sink;
    }

    /// Start one playback and return its handle.
    pub fn play(
        &mut self,
        now: f64,
        target: TargetId,
        sound: &SoundDecl,
        volume: f64,
        effects: SoundEffects,
        waited_on: bool,
    ) -> SoundHandle {
        let handle = SoundHandle::fresh();
        self.sink.start(handle, sound, volume, effects);
        let ends_at = (sound.duration_secs > 0.0).then(|| now + sound.duration_secs);
        self.playing.insert(
            handle,
            PlayingSound {
                target,
                name: sound.name.clone(),
                ends_at,
                done: sound.duration_secs <= 0.0,
                waited_on,
            },
        );
        handle
    }

    /// Host notification that a playback reached end-of-stream.
    pub fn mark_done(&mut self, handle: SoundHandle) {
        if let Some(sound) = self.playing.get_mut(&handle) {
            sound.done = true;
        }
    }

    /// Advance deadline-based completion and drop finished, unwatched
    /// entries. Watched entries stay until the waiting thread observes them.
    pub fn poll(&mut self, now: f64) {
        for sound in self.playing.values_mut() {
            if !sound.done && matches!(sound.ends_at, Some(t) if now >= t) {
                sound.done = true;
            }
        }
        self.playing.retain(|_, s| !s.done || s.waited_on);
    }

    /// Wait predicate for `play until done`. A vanished handle counts as
    /// done so stop-all and reloads cannot strand a thread.
    pub fn is_done(&self, handle: SoundHandle) -> bool {
        self.playing.get(&handle).map(|s| s.done).unwrap_or(true)
    }

    /// Called once the waiting thread has seen completion.
    pub fn release(&mut self, handle: SoundHandle) {
        self.playing.remove(&handle);
    }

    pub fn stop_all(&mut self) {
        self.sink.stop_all();
        self.playing.clear();
    }

    pub fn stop_target(&mut self, target: TargetId) {
        self.playing.retain(|_, s| s.target != target);
    }

    pub fn playing_count(&self, target: TargetId) -> usize {
        self.playing
            .values()
            .filter(|s| s.target == target && !s.done)
            .count()
    }

    /// Whether any thread on this target is still parked on a sound.
    pub fn has_waiting_sounds(&self, target: TargetId) -> bool {
        self.playing
            .values()
            .any(|s| s.target == target && s.waited_on && !s.done)
    }

    pub fn playing_names(&self, target: TargetId) -> Vec<&str> {
        self.playing
            .values()
            .filter(|s| s.target == target && !s.done)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Sound selection: string arguments prefer an exact name match, then fall
/// back to a 1-based wrapped index if numeric; plain numeric arguments index
/// directly. Returns an index into `sounds`.
pub fn select_sound(sounds: &[SoundDecl], arg: &crate::value::Value) -> Option<usize> {
    use crate::value::{parse_number, Value};
    if sounds.is_empty() {
        return None;
    }
    match arg {
        Value::Text(s) => {
            if let Some(i) = sounds.iter().position(|snd| snd.name == *s) {
                return Some(i);
            }
            if s.trim().is_empty() {
                return None;
            }
            parse_number(s)
                .filter(|n| n.is_finite())
                .map(|n| wrap_index(n, sounds.len()))
        }
        Value::Number(n) if n.is_finite() => Some(wrap_index(*n, sounds.len())),
        _ => None,
    }
}

/// 1-based index with wrap in both directions.
fn wrap_index(n: f64, len: usize) -> usize {
    let idx = n.round() as i64 - 1;
    idx.rem_euclid(len as i64) as usize
}
