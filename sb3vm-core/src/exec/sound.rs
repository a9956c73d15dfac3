use crate::audio::select_sound;
use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::events::RuntimeEvent;
use crate::project::BlockDecl;
use crate::thread::{Thread, ThreadStatus, WaitState};
use tracing::warn;

/// `play sound` / `play sound until done`. A missing sound is a no-op and a
/// waited play of it completes immediately.
pub(crate) fn play(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    until_done: bool,
) {
    let arg = rt.arg_value(th, graph, block, "SOUND_MENU");
    let Some(target) = rt.target(th.target) else {
        return;
    };
    let Some(index) = select_sound(&target.sounds, &arg) else {
        warn!(target = %target.name, sound = %arg.to_display(), "sound not found");
        return;
    };
    let sound = target.sounds[index].clone();
    let volume = target.volume();
    let effects = target.sound_effects;
    let now = rt.clock.now();
    let handle = rt
        .audio
        .play(now, th.target, &sound, volume, effects, until_done);
    rt.push_event(RuntimeEvent::SoundStarted {
        target: th.target,
        name: sound.name,
    });
    if until_done && !rt.audio.is_done(handle) {
        th.status = ThreadStatus::Waiting(WaitState::Sound { handle });
    }
}

pub(crate) fn stop_all_sounds(rt: &mut Runtime) {
    rt.audio.stop_all();
    rt.push_event(RuntimeEvent::AllSoundsStopped);
}

pub(crate) fn change_volume(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let delta = rt.arg_num(th, graph, block, "VOLUME");
    if let Some(target) = rt.target_mut(th.target) {
        let volume = target.volume() + delta;
        target.set_volume(volume);
    }
}

pub(crate) fn set_volume(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let volume = rt.arg_num(th, graph, block, "VOLUME");
    if let Some(target) = rt.target_mut(th.target) {
        target.set_volume(volume);
    }
}

pub(crate) fn change_effect(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let delta = rt.arg_num(th, graph, block, "VALUE");
    let effect = block.field_text("EFFECT").unwrap_or("").to_string();
    if let Some(target) = rt.target_mut(th.target) {
        let current = target.sound_effects.get(&effect);
        target.sound_effects.set(&effect, current + delta);
    }
}

pub(crate) fn set_effect(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let value = rt.arg_num(th, graph, block, "VALUE");
    let effect = block.field_text("EFFECT").unwrap_or("").to_string();
    if let Some(target) = rt.target_mut(th.target) {
        target.sound_effects.set(&effect, value);
    }
}

pub(crate) fn clear_effects(rt: &mut Runtime, th: &mut Thread) {
    if let Some(target) = rt.target_mut(th.target) {
        target.sound_effects = Default::default();
    }
}

// ─── Text-to-speech extension ─────────────────────────────────

/// Speak through the synthesis port. A host that cannot speak returns no
/// duration and the wait completes immediately.
pub(crate) fn speak_and_wait(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let words = rt.arg_str(th, graph, block, "WORDS");
    let Some(target) = rt.target(th.target) else {
        return;
    };
    let (voice, language) = (
        target.text2speech.voice.clone(),
        target.text2speech.language.clone(),
    );
    match rt.speech.speak(&words, &voice, &language) {
        Some(duration) if duration > 0.0 => {
            th.status = ThreadStatus::Waiting(WaitState::Timer {
                until: rt.clock.now() + duration,
            });
        }
        _ => {}
    }
}

pub(crate) fn set_voice(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let voice = rt.arg_str(th, graph, block, "VOICE");
    if let Some(target) = rt.target_mut(th.target) {
        target.text2speech.voice = voice;
    }
}

pub(crate) fn set_language(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let language = rt.arg_str(th, graph, block, "LANGUAGE");
    if let Some(target) = rt.target_mut(th.target) {
        target.text2speech.language = language;
    }
}
