//! The runtime façade: owns all targets, threads and global state, and
//! advances the whole project one logical frame per `update(dt)` call.
//! Single-threaded and cooperative — callers must not invoke mutating
//! methods concurrently with `update`.

use crate::audio::{AudioEngine, AudioSink, NullSpeech, SpeechSynth};
use crate::blocks::{self, canonical_broadcast, BlockGraph};
use crate::broadcast::EdgeHatState;
use crate::clock::FrameClock;
use crate::error::ProjectError;
use crate::events::RuntimeEvent;
use crate::project::{BlockDecl, Opcode, Project, RotationStyle};
use crate::target::{GraphicEffects, List, SayKind, Target};
use crate::thread::{Thread, ThreadStatus, WaitState};
use crate::types::{
    BlockId, RuntimeOptions, TargetId, ThreadId, SCRATCH_MAX_X, SCRATCH_MAX_Y, SCRATCH_MIN_X,
    SCRATCH_MIN_Y,
};
use crate::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

/// Host input, queued between frames and drained at the start of `update`.
#[derive(Clone, Debug)]
enum HostEvent {
    GreenFlag,
    KeyDown(String),
    KeyUp(String),
    Click(TargetId),
    MouseMove { x: f64, y: f64, down: bool },
}

#[derive(Debug)]
pub(crate) struct InputState {
    pub mouse_x: f64,
    pub mouse_y: f64,
    pub mouse_down: bool,
    pub loudness: f64,
    keys: BTreeSet<String>,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            mouse_x: 0.0,
            mouse_y: 0.0,
            mouse_down: false,
            // No microphone attached.
            loudness: -1.0,
            keys: BTreeSet::new(),
        }
    }
}

impl InputState {
    pub(crate) fn key_pressed(&self, key: &str) -> bool {
        if key == "any" {
            !self.keys.is_empty()
        } else {
            self.keys.contains(key)
        }
    }
}

/// Canonical key name for matching hats and `key pressed?`: lower-cased,
/// with the legacy key codes mapped to their names.
pub(crate) fn canonical_key(value: &Value) -> String {
    if let Value::Number(n) = value {
        match *n as i64 {
            32 => return "space".to_string(),
            37 => return "left arrow".to_string(),
            38 => return "up arrow".to_string(),
            39 => return "right arrow".to_string(),
            40 => return "down arrow".to_string(),
            _ => {}
        }
    }
    value.to_display().to_lowercase()
}

/// A hat ready to fire.
struct HatFire {
    target: TargetId,
    hat: BlockId,
    body: Option<BlockId>,
    restart: bool,
}

/// Read-only visual state of one target, for renderers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub name: String,
    pub is_stage: bool,
    pub is_clone: bool,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub size: f64,
    pub visible: bool,
    pub rotation_style: RotationStyle,
    pub costume: String,
    pub costume_index: usize,
    pub effects: GraphicEffects,
    pub volume: f64,
    /// Position in draw order; the stage is always layer 0.
    pub layer: usize,
    pub say: Option<(SayKind, String)>,
}

pub struct Runtime {
    pub(crate) options: RuntimeOptions,
    /// Draw order: stage at index 0, then sprites and clones back to front.
    pub(crate) targets: Vec<Target>,
    /// Insertion order is scheduling order within a frame.
    pub(crate) threads: Vec<Thread>,
    pub(crate) clock: FrameClock,
    counter: i64,
    pub(crate) audio: AudioEngine,
    pub(crate) speech: Box<dyn SpeechSynth>,
    rng: StdRng,
    pub(crate) input: InputState,
    pending: VecDeque<HostEvent>,
    pending_clones: Vec<TargetId>,
    doomed: Vec<TargetId>,
    edge_hats: EdgeHatState,
    frame_events: Vec<RuntimeEvent>,
    pub(crate) redraw_requested: bool,
    fingerprint: [u8; 32],
}

impl Runtime {
    pub fn new(project: &Project) -> Result<Self, ProjectError> {
        Self::with_options(project, RuntimeOptions::default())
    }

    /// Convenience for hosts holding the model as JSON.
    pub fn from_json(json: &str) -> Result<Self, ProjectError> {
        let project = Project::from_json(json)?;
        Self::new(&project)
    }

    pub fn with_options(project: &Project, options: RuntimeOptions) -> Result<Self, ProjectError> {
        if project.targets.is_empty() {
            return Err(ProjectError::Empty);
        }
        let stages = project.targets.iter().filter(|t| t.is_stage).count();
        if stages == 0 {
            return Err(ProjectError::MissingStage);
        }
        if stages > 1 {
            return Err(ProjectError::MultipleStages(stages));
        }

        let fingerprint = fingerprint_project(project);

        let mut targets = Vec::with_capacity(project.targets.len());
        for decl in project
            .targets
            .iter()
            .filter(|t| t.is_stage)
            .chain(project.targets.iter().filter(|t| !t.is_stage))
        {
            let graph = Arc::new(BlockGraph::build(decl.blocks.clone()));
            for fault in blocks::verify(&graph) {
                warn!(target = %decl.name, %fault, "block graph fault");
            }
            targets.push(Target::from_decl(decl, graph));
        }

        info!(
            targets = targets.len(),
            extensions = project.extensions.len(),
            "project loaded"
        );
        let mut runtime = Self {
            options,
            targets,
            threads: Vec::new(),
            clock: FrameClock::default(),
            counter: 0,
            audio: AudioEngine::default(),
            speech: Box::new(NullSpeech),
            rng: StdRng::from_entropy(),
            input: InputState::default(),
            pending: VecDeque::new(),
            pending_clones: Vec::new(),
            doomed: Vec::new(),
            edge_hats: EdgeHatState::default(),
            frame_events: Vec::new(),
            redraw_requested: false,
            fingerprint,
        };
        runtime.push_event(RuntimeEvent::ProjectLoaded {
            fingerprint,
            targets: runtime.targets.len(),
        });
        Ok(runtime)
    }

    // ─── Host input API ───────────────────────────────────────

    pub fn green_flag(&mut self) {
        self.pending.push_back(HostEvent::GreenFlag);
    }

    pub fn key_down(&mut self, key: &str) {
        let key = canonical_key(&Value::Text(key.to_string()));
        self.pending.push_back(HostEvent::KeyDown(key));
    }

    pub fn key_up(&mut self, key: &str) {
        let key = canonical_key(&Value::Text(key.to_string()));
        self.pending.push_back(HostEvent::KeyUp(key));
    }

    pub fn sprite_click(&mut self, target: TargetId) {
        self.pending.push_back(HostEvent::Click(target));
    }

    pub fn set_mouse(&mut self, x: f64, y: f64, down: bool) {
        self.pending.push_back(HostEvent::MouseMove { x, y, down });
    }

    pub fn set_loudness(&mut self, loudness: f64) {
        self.input.loudness = loudness;
    }

    pub fn reset_timer(&mut self) {
        self.clock.reset_timer();
        self.push_event(RuntimeEvent::TimerReset);
    }

    /// Global stop: every thread is killed, clones are removed at frame end
    /// and all audio stops.
    pub fn stop_all(&mut self) {
        for thread in &mut self.threads {
            thread.kill();
        }
        let clones: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|t| t.is_clone)
            .map(|t| t.id)
            .collect();
        self.doomed.extend(clones);
        self.audio.stop_all();
        self.speech.stop_all();
        self.push_event(RuntimeEvent::StopAll);
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.audio.set_sink(sink);
    }

    pub fn set_speech_synth(&mut self, synth: Box<dyn SpeechSynth>) {
        self.speech = synth;
    }

    /// Fixed seed for reproducible `pick random` sequences.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    // ─── The frame ────────────────────────────────────────────

    /// Advance one logical frame. `dt` is in seconds.
    pub fn update(&mut self, dt: f64) {
        self.clock.advance(dt);
        self.redraw_requested = false;

        // Reap threads that finished last frame; they stayed in the list one
        // extra frame so joins and restarts could still observe them.
        self.threads.retain(|t| t.is_live());
        for thread in &mut self.threads {
            thread.redrawn = false;
            if matches!(thread.status, ThreadStatus::YieldedTick) {
                thread.status = ThreadStatus::Running;
            }
        }

        self.drain_host_events();
        self.audio.poll(self.clock.now());

        // Repeated passes: each runnable thread advances to its next yield,
        // and yielded threads keep getting turns until the step budget runs
        // dry. A thread that performed a visual side-effect sits out the rest
        // of the frame; the others are unaffected.
        let mut steps_used = 0usize;
        for _ in 0..self.options.frame_pass_budget {
            let mut ran_any = false;
            for i in 0..self.threads.len() {
                if self.threads[i].redrawn {
                    continue;
                }
                self.poll_wait(i);
                if !matches!(
                    self.threads[i].status,
                    ThreadStatus::Running | ThreadStatus::YieldedFrame
                ) {
                    continue;
                }
                let mut thread = std::mem::take(&mut self.threads[i]);
                thread.status = ThreadStatus::Running;
                self.step_thread(&mut thread, &mut steps_used);
                if matches!(thread.status, ThreadStatus::Done) {
                    self.push_event(RuntimeEvent::ThreadDone { thread_id: thread.id });
                }
                self.threads[i] = thread;
                ran_any = true;
            }
            if !ran_any || steps_used >= self.options.frame_step_budget {
                break;
            }
        }

        self.evaluate_edge_hats();
        self.apply_clone_requests();
        self.apply_doomed_targets();
    }

    /// Check a Waiting thread's predicate, resuming it when satisfied.
    fn poll_wait(&mut self, i: usize) {
        let wait = match &self.threads[i].status {
            ThreadStatus::Waiting(wait) => wait.clone(),
            _ => return,
        };
        let now = self.clock.now();
        let resume = match wait {
            WaitState::Timer { until } => now >= until,
            WaitState::SayTimer { until, epoch } => {
                if now < until {
                    false
                } else {
                    let target = self.threads[i].target;
                    if let Some(target) = self.target_mut(target) {
                        if target.say_epoch == epoch {
                            target.say = None;
                        }
                    }
                    true
                }
            }
            WaitState::Glide {
                start,
                duration,
                from,
                to,
            } => {
                let progress = ((now - start) / duration).clamp(0.0, 1.0);
                let x = from.0 + (to.0 - from.0) * progress;
                let y = from.1 + (to.1 - from.1) * progress;
                let target = self.threads[i].target;
                self.set_sprite_position(target, x, y);
                progress >= 1.0
            }
            WaitState::Sound { handle } => {
                if self.audio.is_done(handle) {
                    self.audio.release(handle);
                    true
                } else {
                    false
                }
            }
            WaitState::Broadcast { threads } => {
                threads.iter().all(|id| self.thread_finished(*id))
            }
        };
        if resume {
            self.threads[i].status = ThreadStatus::Running;
        }
    }

    /// A vanished thread id counts as finished: restarts mint new ids, and
    /// the old handle's work is over either way.
    fn thread_finished(&self, id: ThreadId) -> bool {
        self.threads
            .iter()
            .find(|t| t.id == id)
            .map(|t| !t.is_live())
            .unwrap_or(true)
    }

    fn drain_host_events(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            match event {
                HostEvent::GreenFlag => {
                    self.push_event(RuntimeEvent::GreenFlag);
                    let fires =
                        self.collect_hat_fires(|_, b| b.opcode == Opcode::EventWhenFlagClicked);
                    self.spawn_fires(fires, None);
                }
                HostEvent::KeyDown(key) => {
                    self.input.keys.insert(key.clone());
                    let fires = self.collect_hat_fires(|_, b| {
                        b.opcode == Opcode::EventWhenKeyPressed
                            && b.field_text("KEY_OPTION").map(|opt| {
                                opt == "any" || opt.to_lowercase() == key
                            }) == Some(true)
                    });
                    self.spawn_fires(fires, None);
                }
                HostEvent::KeyUp(key) => {
                    self.input.keys.remove(&key);
                }
                HostEvent::Click(id) => {
                    let fires = self.collect_hat_fires(|t, b| {
                        t.id == id
                            && b.opcode
                                == if t.is_stage {
                                    Opcode::EventWhenStageClicked
                                } else {
                                    Opcode::EventWhenThisSpriteClicked
                                }
                    });
                    self.spawn_fires(fires, None);
                }
                HostEvent::MouseMove { x, y, down } => {
                    self.input.mouse_x = x;
                    self.input.mouse_y = y;
                    self.input.mouse_down = down;
                }
            }
        }
    }

    /// `when [loudness/timer] > n`: fires once per rising edge, after block
    /// execution so scripts see this frame's state.
    fn evaluate_edge_hats(&mut self) {
        let hats: Vec<(TargetId, BlockId)> = self
            .targets
            .iter()
            .flat_map(|t| {
                t.graph
                    .hats()
                    .iter()
                    .filter(|hat| {
                        t.graph.block(hat).map(|b| b.opcode) == Some(Opcode::EventWhenGreaterThan)
                    })
                    .map(|hat| (t.id, hat.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (target_id, hat_id) in hats {
            let Some(target) = self.target(target_id) else {
                continue;
            };
            let graph = target.graph.clone();
            let Some(block) = graph.block(&hat_id) else {
                continue;
            };
            let value = match block
                .field_text("WHENGREATERTHANMENU")
                .unwrap_or("")
                .to_uppercase()
                .as_str()
            {
                "TIMER" => self.clock.timer(),
                "LOUDNESS" => self.input.loudness,
                _ => continue,
            };
            // Threshold inputs are reporters in the general case; evaluate
            // them in a detached context.
            let probe = Thread::new(target_id, hat_id.clone(), None, false);
            let threshold = self.arg_num(&probe, &graph, block, "VALUE");
            if self.edge_hats.observe(target_id, &hat_id, value > threshold) {
                self.push_event(RuntimeEvent::EdgeHatFired {
                    target: target_id,
                    block: hat_id.clone(),
                });
                let fires = vec![HatFire {
                    target: target_id,
                    hat: hat_id,
                    body: block.next.clone(),
                    restart: false,
                }];
                self.spawn_fires(fires, None);
            }
        }
    }

    fn apply_clone_requests(&mut self) {
        let requests = std::mem::take(&mut self.pending_clones);
        for source in requests {
            let clone_count = self.targets.iter().filter(|t| t.is_clone).count();
            if clone_count >= self.options.clone_cap {
                warn!(cap = self.options.clone_cap, "clone cap reached, request dropped");
                continue;
            }
            let Some(index) = self.target_index(source) else {
                continue;
            };
            let clone = self.targets[index].spawn_clone();
            let clone_id = clone.id;
            self.push_event(RuntimeEvent::CloneCreated {
                source,
                clone: clone_id,
            });
            self.targets.push(clone);
            let fires = self.collect_hat_fires(|t, b| {
                t.id == clone_id && b.opcode == Opcode::ControlStartAsClone
            });
            self.spawn_fires(fires, None);
        }
    }

    fn apply_doomed_targets(&mut self) {
        let doomed = std::mem::take(&mut self.doomed);
        for id in doomed {
            for thread in &mut self.threads {
                if thread.target == id {
                    thread.kill();
                }
            }
            self.audio.stop_target(id);
            self.edge_hats.forget_target(id);
            if let Some(index) = self.target_index(id) {
                if self.targets[index].is_clone {
                    self.targets.remove(index);
                    self.push_event(RuntimeEvent::CloneDeleted { target: id });
                }
            }
        }
    }

    // ─── Hat firing ───────────────────────────────────────────

    fn collect_hat_fires(
        &self,
        filter: impl Fn(&Target, &BlockDecl) -> bool,
    ) -> Vec<HatFire> {
        let mut fires = Vec::new();
        for target in &self.targets {
            for hat_id in target.graph.hats() {
                let Some(block) = target.graph.block(hat_id) else {
                    continue;
                };
                if filter(target, block) {
                    fires.push(HatFire {
                        target: target.id,
                        hat: hat_id.clone(),
                        body: block.next.clone(),
                        restart: block.opcode.restarts_existing_threads(),
                    });
                }
            }
        }
        fires
    }

    /// Start threads for a set of hat fires. One live thread exists per
    /// (target, hat) pair: restartable hats replace it in its slot with a
    /// fresh handle, others leave it running. `current` is the thread being
    /// stepped right now, which lives outside the list.
    fn spawn_fires(
        &mut self,
        fires: Vec<HatFire>,
        mut current: Option<&mut Thread>,
    ) -> Vec<ThreadId> {
        let mut started = Vec::new();
        for fire in fires {
            if let Some(cur) = current.as_deref_mut() {
                if cur.target == fire.target && cur.top_block == fire.hat {
                    if cur.is_live() && !fire.restart {
                        continue;
                    }
                    let fresh =
                        Thread::new(fire.target, fire.hat.clone(), fire.body.clone(), fire.restart);
                    self.push_event(RuntimeEvent::ThreadRestarted {
                        old: cur.id,
                        new: fresh.id,
                    });
                    started.push(fresh.id);
                    cur.kill();
                    self.threads.push(fresh);
                    continue;
                }
            }
            let slot = self
                .threads
                .iter()
                .position(|t| t.target == fire.target && t.top_block == fire.hat);
            match slot {
                Some(i) => {
                    if self.threads[i].is_live() && !fire.restart {
                        continue;
                    }
                    let fresh =
                        Thread::new(fire.target, fire.hat, fire.body, fire.restart);
                    if self.threads[i].is_live() {
                        self.push_event(RuntimeEvent::ThreadRestarted {
                            old: self.threads[i].id,
                            new: fresh.id,
                        });
                    } else {
                        self.push_event(RuntimeEvent::ThreadStarted {
                            thread_id: fresh.id,
                            target: fresh.target,
                            top_block: fresh.top_block.clone(),
                        });
                    }
                    started.push(fresh.id);
                    self.threads[i] = fresh;
                }
                None => {
                    let fresh =
                        Thread::new(fire.target, fire.hat, fire.body, fire.restart);
                    self.push_event(RuntimeEvent::ThreadStarted {
                        thread_id: fresh.id,
                        target: fresh.target,
                        top_block: fresh.top_block.clone(),
                    });
                    started.push(fresh.id);
                    self.threads.push(fresh);
                }
            }
        }
        started
    }

    /// Schedule every receiver of a broadcast; receivers run this frame,
    /// after the threads already in the list.
    pub(crate) fn start_broadcast(
        &mut self,
        name: &str,
        current: Option<&mut Thread>,
    ) -> Vec<ThreadId> {
        let canonical = canonical_broadcast(name);
        let mut fires = Vec::new();
        for target in &self.targets {
            for hat_id in target.graph.broadcast_receivers(&canonical) {
                let Some(block) = target.graph.block(hat_id) else {
                    continue;
                };
                fires.push(HatFire {
                    target: target.id,
                    hat: hat_id.clone(),
                    body: block.next.clone(),
                    restart: true,
                });
            }
        }
        self.push_event(RuntimeEvent::BroadcastFired {
            name: name.to_string(),
            receivers: fires.len(),
        });
        self.spawn_fires(fires, current)
    }

    // ─── Target access ────────────────────────────────────────

    pub(crate) fn target_index(&self, id: TargetId) -> Option<usize> {
        self.targets.iter().position(|t| t.id == id)
    }

    pub(crate) fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub(crate) fn target_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn stage(&self) -> &Target {
        &self.targets[0]
    }

    pub(crate) fn stage_mut(&mut self) -> &mut Target {
        &mut self.targets[0]
    }

    /// Original (non-clone) sprite lookup, the scope `create clone of` and
    /// `go to` menus use.
    pub(crate) fn sprite_id_by_name(&self, name: &str) -> Option<TargetId> {
        self.targets
            .iter()
            .find(|t| !t.is_stage && !t.is_clone && t.name == name)
            .map(|t| t.id)
    }

    /// Destination for `go to` / `glide to` / `point towards` menus.
    pub(crate) fn named_point(&mut self, menu: &str) -> Option<(f64, f64)> {
        match menu {
            "_mouse_" => Some((self.input.mouse_x, self.input.mouse_y)),
            "_random_" => {
                let x = self.random_float(SCRATCH_MIN_X, SCRATCH_MAX_X);
                let y = self.random_float(SCRATCH_MIN_Y, SCRATCH_MAX_Y);
                Some((x, y))
            }
            name => self
                .targets
                .iter()
                .find(|t| !t.is_stage && !t.is_clone && t.name == name)
                .map(|t| (t.x, t.y)),
        }
    }

    /// Position setter for sprites; applies the fence unless disabled.
    pub(crate) fn set_sprite_position(&mut self, id: TargetId, x: f64, y: f64) {
        let fencing = self.options.fencing;
        let Some(target) = self.target_mut(id) else {
            return;
        };
        if target.is_stage {
            return;
        }
        let (x, y) = if fencing {
            let (w, h) = target.bounds_extent();
            crate::fence::clamp_position(x, y, w, h)
        } else {
            (x, y)
        };
        target.x = x;
        target.y = y;
    }

    pub(crate) fn request_clone(&mut self, source: TargetId) {
        self.pending_clones.push(source);
    }

    pub(crate) fn doom_target(&mut self, id: TargetId) {
        if !self.doomed.contains(&id) {
            self.doomed.push(id);
        }
    }

    pub(crate) fn kill_sibling_threads(&mut self, target: TargetId, keep: ThreadId) {
        for thread in &mut self.threads {
            if thread.target == target && thread.id != keep {
                thread.kill();
            }
        }
    }

    // ─── Layers ───────────────────────────────────────────────

    pub(crate) fn move_to_layer_extreme(&mut self, id: TargetId, front: bool) {
        let Some(index) = self.target_index(id) else {
            return;
        };
        if index == 0 {
            return;
        }
        let target = self.targets.remove(index);
        if front {
            self.targets.push(target);
        } else {
            self.targets.insert(1, target);
        }
    }

    pub(crate) fn shift_layer(&mut self, id: TargetId, delta: i64) {
        let Some(index) = self.target_index(id) else {
            return;
        };
        if index == 0 {
            return;
        }
        let new_index = (index as i64 + delta).clamp(1, self.targets.len() as i64 - 1) as usize;
        let target = self.targets.remove(index);
        self.targets.insert(new_index, target);
    }

    // ─── Variables & lists ────────────────────────────────────

    /// Resolution order: id in the target, id on the stage, name in the
    /// target, name on the stage.
    fn resolve_variable_slot(
        &self,
        target: TargetId,
        id: &str,
        name: &str,
    ) -> Option<(usize, String)> {
        let ti = self.target_index(target)?;
        if !id.is_empty() && self.targets[ti].variables.contains_key(id) {
            return Some((ti, id.to_string()));
        }
        if ti != 0 && !id.is_empty() && self.targets[0].variables.contains_key(id) {
            return Some((0, id.to_string()));
        }
        if let Some(v) = self.targets[ti].variable_by_name(name) {
            return Some((ti, v.id.clone()));
        }
        if ti != 0 {
            if let Some(v) = self.targets[0].variable_by_name(name) {
                return Some((0, v.id.clone()));
            }
        }
        None
    }

    pub(crate) fn variable_value(&self, target: TargetId, id: &str, name: &str) -> Value {
        match self.resolve_variable_slot(target, id, name) {
            Some((ti, key)) => self.targets[ti].variables[&key].value.clone(),
            None => {
                warn!(variable = name, "read of missing variable");
                Value::Number(0.0)
            }
        }
    }

    pub(crate) fn set_variable(&mut self, target: TargetId, id: &str, name: &str, value: Value) {
        match self.resolve_variable_slot(target, id, name) {
            Some((ti, key)) => {
                self.targets[ti].variables.get_mut(&key).expect("resolved").value = value;
            }
            None => warn!(variable = name, "write to missing variable"),
        }
    }

    pub(crate) fn set_variable_monitor(
        &mut self,
        target: TargetId,
        id: &str,
        name: &str,
        visible: bool,
    ) {
        if let Some((ti, key)) = self.resolve_variable_slot(target, id, name) {
            self.targets[ti].variables.get_mut(&key).expect("resolved").visible = visible;
        }
    }

    fn resolve_list_slot(&self, target: TargetId, id: &str, name: &str) -> Option<(usize, String)> {
        let ti = self.target_index(target)?;
        if !id.is_empty() && self.targets[ti].lists.contains_key(id) {
            return Some((ti, id.to_string()));
        }
        if ti != 0 && !id.is_empty() && self.targets[0].lists.contains_key(id) {
            return Some((0, id.to_string()));
        }
        if let Some(l) = self.targets[ti].list_by_name(name) {
            return Some((ti, l.id.clone()));
        }
        if ti != 0 {
            if let Some(l) = self.targets[0].list_by_name(name) {
                return Some((0, l.id.clone()));
            }
        }
        None
    }

    pub(crate) fn with_list(
        &mut self,
        target: TargetId,
        id: &str,
        name: &str,
        f: impl FnOnce(&mut List),
    ) {
        match self.resolve_list_slot(target, id, name) {
            Some((ti, key)) => f(self.targets[ti].lists.get_mut(&key).expect("resolved")),
            None => warn!(list = name, "write to missing list"),
        }
    }

    fn list_ref(&self, target: TargetId, id: &str, name: &str) -> Option<&List> {
        let (ti, key) = self.resolve_list_slot(target, id, name)?;
        self.targets[ti].lists.get(&key)
    }

    pub(crate) fn list_len(&self, target: TargetId, id: &str, name: &str) -> usize {
        self.list_ref(target, id, name).map(|l| l.values.len()).unwrap_or(0)
    }

    /// 1-based item read.
    pub(crate) fn list_item(
        &self,
        target: TargetId,
        id: &str,
        name: &str,
        index: usize,
    ) -> Option<Value> {
        self.list_ref(target, id, name)
            .and_then(|l| l.values.get(index - 1).cloned())
    }

    /// 1-based position of the first item matching the predicate.
    pub(crate) fn list_find(
        &self,
        target: TargetId,
        id: &str,
        name: &str,
        pred: impl Fn(&Value) -> bool,
    ) -> Option<usize> {
        self.list_ref(target, id, name)
            .and_then(|l| l.values.iter().position(pred))
            .map(|i| i + 1)
    }

    /// Display form: single characters join bare, anything else with spaces.
    pub(crate) fn list_contents(&self, target: TargetId, id: &str, name: &str) -> String {
        let Some(list) = self.list_ref(target, id, name) else {
            return String::new();
        };
        let rendered: Vec<String> = list.values.iter().map(Value::to_display).collect();
        let all_single = !rendered.is_empty() && rendered.iter().all(|s| s.chars().count() == 1);
        if all_single {
            rendered.concat()
        } else {
            rendered.join(" ")
        }
    }

    pub(crate) fn set_list_monitor(&mut self, target: TargetId, id: &str, name: &str, visible: bool) {
        if let Some((ti, key)) = self.resolve_list_slot(target, id, name) {
            self.targets[ti].lists.get_mut(&key).expect("resolved").visible = visible;
        }
    }

    // ─── Globals ──────────────────────────────────────────────

    pub(crate) fn counter_incr(&mut self) {
        self.counter += 1;
    }

    pub(crate) fn counter_clear(&mut self) {
        self.counter = 0;
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn timer(&self) -> f64 {
        self.clock.timer()
    }

    pub(crate) fn random_int(&mut self, lo: i64, hi: i64) -> i64 {
        self.rng.gen_range(lo..=hi)
    }

    pub(crate) fn random_float(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.rng.gen::<f64>() * (hi - lo)
    }

    pub(crate) fn push_event(&mut self, event: RuntimeEvent) {
        self.frame_events.push(event);
    }

    // ─── Observation surface ──────────────────────────────────

    pub fn take_frame_events(&mut self) -> Vec<RuntimeEvent> {
        std::mem::take(&mut self.frame_events)
    }

    /// Whether the last frame ran any visual side-effect. Renderers can skip
    /// repainting when this is false.
    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }

    pub fn active_thread_count(&self) -> usize {
        self.threads.iter().filter(|t| t.is_live()).count()
    }

    /// Handles of every live thread, in scheduling order.
    pub fn active_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.is_live())
            .map(|t| t.id)
            .collect()
    }

    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    pub fn target_id_by_name(&self, name: &str) -> Option<TargetId> {
        self.targets.iter().find(|t| t.name == name).map(|t| t.id)
    }

    pub fn clone_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_clone).count()
    }

    /// Peek a variable by target and name, searching the stage as fallback
    /// the way scripts do.
    pub fn variable(&self, target_name: &str, variable_name: &str) -> Option<Value> {
        let target = self.targets.iter().find(|t| t.name == target_name)?;
        let slot = self.resolve_variable_slot(target.id, "", variable_name)?;
        Some(self.targets[slot.0].variables[&slot.1].value.clone())
    }

    pub fn list_values(&self, target_name: &str, list_name: &str) -> Option<Vec<Value>> {
        let target = self.targets.iter().find(|t| t.name == target_name)?;
        self.list_ref(target.id, "", list_name)
            .map(|l| l.values.clone())
    }

    pub fn position(&self, target_name: &str) -> Option<(f64, f64)> {
        self.targets
            .iter()
            .find(|t| t.name == target_name)
            .map(|t| (t.x, t.y))
    }

    pub fn direction(&self, target_name: &str) -> Option<f64> {
        self.targets
            .iter()
            .find(|t| t.name == target_name)
            .map(|t| t.direction)
    }

    pub fn has_waiting_sounds(&self, target_name: &str) -> bool {
        self.targets
            .iter()
            .filter(|t| t.name == target_name)
            .any(|t| self.audio.has_waiting_sounds(t.id))
    }

    /// Notify the engine that a sink-side playback finished early.
    pub fn sound_finished(&mut self, handle: crate::types::SoundHandle) {
        self.audio.mark_done(handle);
    }

    pub fn visual_snapshot(&self) -> Vec<TargetSnapshot> {
        self.targets
            .iter()
            .enumerate()
            .map(|(layer, t)| TargetSnapshot {
                id: t.id,
                name: t.name.clone(),
                is_stage: t.is_stage,
                is_clone: t.is_clone,
                x: t.x,
                y: t.y,
                direction: t.direction,
                size: t.size,
                visible: t.visible,
                rotation_style: t.rotation_style,
                costume: t.current_costume_name().to_string(),
                costume_index: t.current_costume,
                effects: t.effects,
                volume: t.volume(),
                layer,
                say: t.say.clone(),
            })
            .collect()
    }
}

/// Stable content hash of the loaded project, recorded in the event log.
fn fingerprint_project(project: &Project) -> [u8; 32] {
    let bytes = serde_json::to_vec(project).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{CostumeDecl, Field, Input, TargetDecl, VariableDecl};
    use std::collections::BTreeMap;

    const DT: f64 = 1.0 / 60.0;

    fn block(opcode: Opcode) -> BlockDecl {
        BlockDecl {
            opcode,
            inputs: Vec::new(),
            fields: BTreeMap::new(),
            next: None,
            parent: None,
            top_level: false,
            shadow: false,
            mutation: None,
        }
    }

    fn flag_hat(next: &str) -> BlockDecl {
        let mut hat = block(Opcode::EventWhenFlagClicked);
        hat.top_level = true;
        hat.next = Some(next.to_string());
        hat
    }

    fn change_var(name: &str, delta: f64) -> BlockDecl {
        let mut b = block(Opcode::DataChangeVariableBy);
        b.inputs.push((
            "VALUE".to_string(),
            Input::Literal {
                value: Value::Number(delta),
            },
        ));
        b.fields.insert(
            "VARIABLE".to_string(),
            Field {
                value: name.to_string(),
                id: Some(name.to_string()),
            },
        );
        b
    }

    fn make_project(
        vars: &[&str],
        sprite_blocks: BTreeMap<String, BlockDecl>,
    ) -> Project {
        let stage = TargetDecl {
            name: "Stage".into(),
            is_stage: true,
            variables: vars
                .iter()
                .map(|v| VariableDecl {
                    id: v.to_string(),
                    name: v.to_string(),
                    value: Value::Number(0.0),
                })
                .collect(),
            lists: Vec::new(),
            broadcasts: Vec::new(),
            blocks: BTreeMap::new(),
            costumes: Vec::new(),
            sounds: Vec::new(),
            current_costume: 0,
            x: 0.0,
            y: 0.0,
            direction: 90.0,
            size: 100.0,
            visible: true,
            volume: 100.0,
            rotation_style: RotationStyle::AllAround,
        };
        let mut sprite = stage.clone();
        sprite.name = "Sprite1".into();
        sprite.is_stage = false;
        sprite.variables = Vec::new();
        sprite.blocks = sprite_blocks;
        sprite.costumes = vec![CostumeDecl {
            name: "costume1".into(),
            width: 40.0,
            height: 40.0,
        }];
        Project {
            targets: vec![stage, sprite],
            extensions: Vec::new(),
        }
    }

    fn var_num(rt: &Runtime, name: &str) -> f64 {
        rt.variable("Stage", name).unwrap().to_number()
    }

    #[test]
    fn rejects_projects_without_a_stage() {
        let project = Project {
            targets: vec![],
            extensions: vec![],
        };
        assert!(matches!(Runtime::new(&project), Err(ProjectError::Empty)));

        let mut no_stage = make_project(&[], BTreeMap::new());
        no_stage.targets.remove(0);
        assert!(matches!(
            Runtime::new(&no_stage),
            Err(ProjectError::MissingStage)
        ));
    }

    #[test]
    fn wait_zero_parks_until_next_frame() {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".to_string(), flag_hat("a"));
        let mut a = change_var("n", 1.0);
        a.next = Some("w".to_string());
        blocks.insert("a".to_string(), a);
        let mut w = block(Opcode::ControlWait);
        w.inputs.push((
            "DURATION".to_string(),
            Input::Literal {
                value: Value::Number(0.0),
            },
        ));
        w.next = Some("b".to_string());
        blocks.insert("w".to_string(), w);
        blocks.insert("b".to_string(), change_var("n", 1.0));

        let mut rt = Runtime::new(&make_project(&["n"], blocks)).unwrap();
        rt.green_flag();
        rt.update(DT);
        assert_eq!(var_num(&rt, "n"), 1.0);
        rt.update(DT);
        assert_eq!(var_num(&rt, "n"), 2.0);
        assert_eq!(rt.active_thread_count(), 0);
    }

    #[test]
    fn broadcast_receivers_run_in_the_same_frame() {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".to_string(), flag_hat("b"));
        let mut b = block(Opcode::EventBroadcast);
        b.inputs.push((
            "BROADCAST_INPUT".to_string(),
            Input::Broadcast {
                id: "m".to_string(),
                name: "ping".to_string(),
            },
        ));
        blocks.insert("b".to_string(), b);

        let mut receiver = block(Opcode::EventWhenBroadcastReceived);
        receiver.top_level = true;
        receiver
            .fields
            .insert("BROADCAST_OPTION".to_string(), Field::plain("ping"));
        receiver.next = Some("chg".to_string());
        blocks.insert("rhat".to_string(), receiver);
        blocks.insert("chg".to_string(), change_var("n", 1.0));

        let mut rt = Runtime::new(&make_project(&["n"], blocks)).unwrap();
        rt.green_flag();
        rt.update(DT);
        // Receiver was appended mid-frame and still ran before frame end.
        assert_eq!(var_num(&rt, "n"), 1.0);
    }

    #[test]
    fn done_threads_linger_one_frame_for_joins() {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".to_string(), flag_hat("chg"));
        blocks.insert("chg".to_string(), change_var("n", 1.0));

        let mut rt = Runtime::new(&make_project(&["n"], blocks)).unwrap();
        rt.green_flag();
        rt.update(DT);
        assert_eq!(rt.active_thread_count(), 0);
        // The Done thread is still present until the next frame reaps it.
        assert_eq!(rt.threads.len(), 1);
        assert!(matches!(rt.threads[0].status, ThreadStatus::Done));
        rt.update(DT);
        assert!(rt.threads.is_empty());
    }

    #[test]
    fn all_at_once_suppresses_the_redraw_yield() {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".to_string(), flag_hat("aao"));
        let mut aao = block(Opcode::ControlAllAtOnce);
        aao.inputs.push((
            "SUBSTACK".to_string(),
            Input::Substack {
                id: Some("say".to_string()),
            },
        ));
        blocks.insert("aao".to_string(), aao);
        let mut say = block(Opcode::LooksSay);
        say.inputs.push((
            "MESSAGE".to_string(),
            Input::Literal {
                value: Value::Text("hi".to_string()),
            },
        ));
        say.next = Some("chg".to_string());
        blocks.insert("say".to_string(), say);
        blocks.insert("chg".to_string(), change_var("n", 1.0));

        let mut rt = Runtime::new(&make_project(&["n"], blocks)).unwrap();
        rt.green_flag();
        rt.update(DT);
        // The say requested a redraw but did not suspend the substack.
        assert_eq!(var_num(&rt, "n"), 1.0);
        assert_eq!(rt.active_thread_count(), 0);
    }

    #[test]
    fn step_budget_forces_a_yield_instead_of_killing() {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".to_string(), flag_hat("fv"));
        let mut fv = block(Opcode::ControlForever);
        fv.inputs.push((
            "SUBSTACK".to_string(),
            Input::Substack {
                id: Some("chg".to_string()),
            },
        ));
        blocks.insert("fv".to_string(), fv);
        blocks.insert("chg".to_string(), change_var("n", 1.0));

        let mut options = RuntimeOptions::default();
        options.frame_step_budget = 50;
        options.frame_pass_budget = 1000;
        let mut rt = Runtime::with_options(&make_project(&["n"], blocks), options).unwrap();
        rt.green_flag();
        rt.update(DT);
        let after_first = var_num(&rt, "n");
        assert!(after_first <= 50.0);
        // Still alive and making progress next frame.
        rt.update(DT);
        assert!(var_num(&rt, "n") > after_first);
        assert_eq!(rt.active_thread_count(), 1);
    }

    #[test]
    fn restart_keeps_the_thread_slot_but_mints_a_new_id() {
        let mut blocks = BTreeMap::new();
        blocks.insert("hat".to_string(), flag_hat("w"));
        let mut w = block(Opcode::ControlWait);
        w.inputs.push((
            "DURATION".to_string(),
            Input::Literal {
                value: Value::Number(10.0),
            },
        ));
        blocks.insert("w".to_string(), w);

        let mut rt = Runtime::new(&make_project(&[], blocks)).unwrap();
        rt.green_flag();
        rt.update(DT);
        let first_id = rt.threads[0].id;
        rt.green_flag();
        rt.update(DT);
        assert_eq!(rt.threads.len(), 1);
        assert_ne!(rt.threads[0].id, first_id);
        assert_eq!(rt.threads[0].top_block, "hat");
    }
}
