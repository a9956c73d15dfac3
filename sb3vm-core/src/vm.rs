//! The stepper: runs one thread until it yields, parks or finishes, one
//! block at a time. Control-flow effects (frame push/pop, loop wrap, parks)
//! mutate the thread in place; the scheduler in `engine.rs` owns ordering
//! across threads.

use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::events::RuntimeEvent;
use crate::exec;
use crate::project::{BlockDecl, Input, Opcode};
use crate::thread::{FrameKind, Thread, ThreadStatus};
use crate::types::BlockId;
use crate::value::Value;
use tracing::warn;

impl Runtime {
    /// Advance one thread until it stops running: yield, park, done, or the
    /// frame's step budget runs dry.
    pub(crate) fn step_thread(&mut self, thread: &mut Thread, steps_used: &mut usize) {
        loop {
            if !matches!(thread.status, ThreadStatus::Running) {
                return;
            }
            if *steps_used >= self.options.frame_step_budget {
                warn!(thread = ?thread.id, "frame step budget exhausted, forcing yield");
                self.push_event(RuntimeEvent::StepBudgetExhausted { thread_id: thread.id });
                thread.status = ThreadStatus::YieldedFrame;
                return;
            }
            let Some(frame) = thread.current_frame() else {
                thread.finish();
                return;
            };
            match frame.cursor.clone() {
                Some(block_id) => {
                    *steps_used += 1;
                    self.execute_block(thread, &block_id);
                }
                None => self.advance_past_frame(thread),
            }
        }
    }

    /// Execute one block: pre-advance the cursor so pushes and parks resume
    /// after it, dispatch the opcode, then apply the redraw yield policy.
    fn execute_block(&mut self, thread: &mut Thread, block_id: &BlockId) {
        let graph = match self.target(thread.target) {
            Some(t) => t.graph.clone(),
            None => {
                // Owning target was deleted mid-frame.
                thread.kill();
                return;
            }
        };
        let Some(block) = graph.block(block_id) else {
            warn!(block = %block_id, "cursor points at a missing block");
            if let Some(frame) = thread.current_frame_mut() {
                frame.cursor = None;
            }
            return;
        };
        if let Some(frame) = thread.current_frame_mut() {
            frame.cursor = block.next.clone();
        }

        self.dispatch(thread, &graph, block_id, block);

        if block.opcode.requests_redraw() {
            self.redraw_requested = true;
            let in_all_at_once = matches!(
                thread.current_frame().map(|f| &f.kind),
                Some(FrameKind::AllAtOnce)
            );
            if thread.warp_depth == 0
                && !in_all_at_once
                && matches!(thread.status, ThreadStatus::Running)
            {
                // Only this thread is done for the frame; others keep their
                // remaining passes.
                thread.status = ThreadStatus::YieldedFrame;
                thread.redrawn = true;
            }
        }
    }

    /// The current frame's body is exhausted: loop frames wrap (re-checking
    /// their condition where they have one), everything else pops. The
    /// parent's cursor was pre-advanced when the frame was pushed.
    fn advance_past_frame(&mut self, thread: &mut Thread) {
        enum Continuation {
            Finish,
            Pop,
            PopCall { warp: bool },
            Wrap,
            WrapRepeat,
            WrapIfCondition { until: bool },
        }

        let continuation = match &thread.frames.last().expect("non-empty frame stack").kind {
            FrameKind::Script => Continuation::Finish,
            FrameKind::Branch | FrameKind::AllAtOnce => Continuation::Pop,
            FrameKind::Call { warp, .. } => Continuation::PopCall { warp: *warp },
            FrameKind::Forever => Continuation::Wrap,
            FrameKind::Repeat { .. } => Continuation::WrapRepeat,
            FrameKind::RepeatUntil => Continuation::WrapIfCondition { until: true },
            FrameKind::While => Continuation::WrapIfCondition { until: false },
        };

        match continuation {
            Continuation::Finish => thread.finish(),
            Continuation::Pop => {
                thread.frames.pop();
            }
            Continuation::PopCall { warp } => {
                thread.frames.pop();
                if warp {
                    thread.warp_depth = thread.warp_depth.saturating_sub(1);
                }
            }
            Continuation::Wrap => self.wrap_loop(thread),
            Continuation::WrapRepeat => {
                let frame = thread.frames.last_mut().expect("frame");
                if let FrameKind::Repeat { remaining } = &mut frame.kind {
                    *remaining -= 1.0;
                    if *remaining > 0.0 {
                        self.wrap_loop(thread);
                    } else {
                        thread.frames.pop();
                    }
                }
            }
            Continuation::WrapIfCondition { until } => {
                let owner = thread.frames.last().and_then(|f| f.owner.clone());
                let exit = match self.loop_condition(thread, owner.as_deref()) {
                    Some(cond) => {
                        if until {
                            cond
                        } else {
                            !cond
                        }
                    }
                    // Owner vanished from under us; bail out of the loop.
                    None => true,
                };
                if exit {
                    thread.frames.pop();
                } else {
                    self.wrap_loop(thread);
                }
            }
        }
    }

    /// Re-enter a loop body; one iteration has finished, which is a yield
    /// point outside warp.
    fn wrap_loop(&mut self, thread: &mut Thread) {
        let frame = thread.frames.last_mut().expect("frame");
        frame.cursor = frame.start.clone();
        if thread.warp_depth == 0 {
            thread.status = ThreadStatus::YieldedFrame;
        }
    }

    /// Late evaluation of a loop block's CONDITION input.
    fn loop_condition(&mut self, thread: &Thread, owner: Option<&str>) -> Option<bool> {
        let graph = self.target(thread.target)?.graph.clone();
        let block = graph.block(owner?)?;
        Some(self.arg_bool(thread, &graph, block, "CONDITION"))
    }

    // ─── Opcode dispatch ──────────────────────────────────────

    fn dispatch(&mut self, th: &mut Thread, graph: &BlockGraph, id: &BlockId, block: &BlockDecl) {
        use Opcode::*;
        match block.opcode {
            // Motion
            MotionMoveSteps => exec::motion::move_steps(self, th, graph, block),
            MotionTurnRight => exec::motion::turn(self, th, graph, block, 1.0),
            MotionTurnLeft => exec::motion::turn(self, th, graph, block, -1.0),
            MotionGoTo => exec::motion::go_to(self, th, graph, block),
            MotionGoToXY => exec::motion::go_to_xy(self, th, graph, block),
            MotionGlideSecsToXY => exec::motion::glide_secs_to_xy(self, th, graph, block),
            MotionGlideTo => exec::motion::glide_to(self, th, graph, block),
            MotionPointInDirection => exec::motion::point_in_direction(self, th, graph, block),
            MotionPointTowards => exec::motion::point_towards(self, th, graph, block),
            MotionChangeXBy => exec::motion::change_x_by(self, th, graph, block),
            MotionSetX => exec::motion::set_x(self, th, graph, block),
            MotionChangeYBy => exec::motion::change_y_by(self, th, graph, block),
            MotionSetY => exec::motion::set_y(self, th, graph, block),
            MotionIfOnEdgeBounce => exec::motion::if_on_edge_bounce(self, th),
            MotionSetRotationStyle => exec::motion::set_rotation_style(self, th, block),

            // Looks
            LooksSay => exec::looks::say(self, th, graph, block, false),
            LooksThink => exec::looks::say(self, th, graph, block, true),
            LooksSayForSecs => exec::looks::say_for_secs(self, th, graph, block, false),
            LooksThinkForSecs => exec::looks::say_for_secs(self, th, graph, block, true),
            LooksShow => exec::looks::set_visible(self, th, true),
            LooksHide => exec::looks::set_visible(self, th, false),
            LooksSwitchCostumeTo => exec::looks::switch_costume(self, th, graph, block),
            LooksNextCostume => exec::looks::next_costume(self, th),
            LooksSwitchBackdropTo => exec::looks::switch_backdrop(self, th, graph, block),
            LooksNextBackdrop => exec::looks::next_backdrop(self),
            LooksChangeSizeBy => exec::looks::change_size(self, th, graph, block),
            LooksSetSizeTo => exec::looks::set_size(self, th, graph, block),
            LooksChangeEffectBy => exec::looks::change_effect(self, th, graph, block),
            LooksSetEffectTo => exec::looks::set_effect(self, th, graph, block),
            LooksClearGraphicEffects => exec::looks::clear_effects(self, th),
            LooksGoToFrontBack => exec::looks::go_to_front_back(self, th, block),
            LooksGoForwardBackwardLayers => exec::looks::go_layers(self, th, graph, block),

            // Sound
            SoundPlay => exec::sound::play(self, th, graph, block, false),
            SoundPlayUntilDone => exec::sound::play(self, th, graph, block, true),
            SoundStopAllSounds => exec::sound::stop_all_sounds(self),
            SoundChangeEffectBy => exec::sound::change_effect(self, th, graph, block),
            SoundSetEffectTo => exec::sound::set_effect(self, th, graph, block),
            SoundClearEffects => exec::sound::clear_effects(self, th),
            SoundChangeVolumeBy => exec::sound::change_volume(self, th, graph, block),
            SoundSetVolumeTo => exec::sound::set_volume(self, th, graph, block),

            // Events
            EventBroadcast => exec::event_blocks::broadcast(self, th, graph, block),
            EventBroadcastAndWait => exec::event_blocks::broadcast_and_wait(self, th, graph, block),

            // Control
            ControlWait => exec::control::wait(self, th, graph, block),
            ControlRepeat => exec::control::repeat(self, th, graph, id, block),
            ControlForever => exec::control::forever(th, id, block),
            ControlIf => exec::control::if_then(self, th, graph, id, block),
            ControlIfElse => exec::control::if_else(self, th, graph, id, block),
            ControlWaitUntil => exec::control::wait_until(self, th, graph, id, block),
            ControlRepeatUntil => exec::control::repeat_until(self, th, graph, id, block, true),
            ControlWhile => exec::control::repeat_until(self, th, graph, id, block, false),
            ControlStop => exec::control::stop(self, th, block),
            ControlCreateCloneOf => exec::control::create_clone_of(self, th, graph, block),
            ControlDeleteThisClone => exec::control::delete_this_clone(self, th),
            ControlAllAtOnce => exec::control::all_at_once(th, id, block),
            ControlIncrCounter => self.counter_incr(),
            ControlClearCounter => self.counter_clear(),

            // Sensing
            SensingResetTimer => {
                self.clock.reset_timer();
                self.push_event(RuntimeEvent::TimerReset);
            }

            // Data
            DataSetVariableTo => exec::data::set_variable(self, th, graph, block),
            DataChangeVariableBy => exec::data::change_variable(self, th, graph, block),
            DataShowVariable => exec::data::set_variable_visible(self, th, block, true),
            DataHideVariable => exec::data::set_variable_visible(self, th, block, false),
            DataAddToList => exec::data::add_to_list(self, th, graph, block),
            DataDeleteOfList => exec::data::delete_of_list(self, th, graph, block),
            DataDeleteAllOfList => exec::data::delete_all_of_list(self, th, block),
            DataInsertAtList => exec::data::insert_at_list(self, th, graph, block),
            DataReplaceItemOfList => exec::data::replace_item_of_list(self, th, graph, block),
            DataShowList => exec::data::set_list_visible(self, th, block, true),
            DataHideList => exec::data::set_list_visible(self, th, block, false),

            // Procedures
            ProceduresCall => exec::procedures::call(self, th, graph, block),
            ProceduresDefinition | ProceduresPrototype => {}

            // Text-to-speech
            Text2SpeechSpeakAndWait => exec::sound::speak_and_wait(self, th, graph, block),
            Text2SpeechSetVoice => exec::sound::set_voice(self, th, graph, block),
            Text2SpeechSetLanguage => exec::sound::set_language(self, th, graph, block),

            // Hats never execute as body blocks; reporters in stack position
            // and unknown opcodes are no-ops.
            _ => {}
        }
    }

    // ─── Reporter evaluation ──────────────────────────────────

    /// Evaluate a reporter block. Reporters are re-evaluated at every use —
    /// a variable reporter held as an input sees the value at the moment its
    /// parent executes. A visited set guards against reference cycles.
    pub(crate) fn eval_reporter(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        id: &str,
        visited: &mut Vec<BlockId>,
    ) -> Value {
        if visited.iter().any(|seen| seen == id) {
            warn!(block = %id, "reporter reference cycle, yielding 0");
            return Value::Number(0.0);
        }
        let Some(block) = graph.block(id) else {
            return Value::Number(0.0);
        };
        visited.push(id.to_string());
        let value = self.dispatch_reporter(th, graph, block, visited);
        visited.pop();
        value
    }

    fn dispatch_reporter(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        block: &BlockDecl,
        visited: &mut Vec<BlockId>,
    ) -> Value {
        use Opcode::*;
        if block.opcode.is_menu() {
            // Menus report their single dropdown field.
            return block
                .fields
                .values()
                .next()
                .map(|f| Value::Text(f.value.clone()))
                .unwrap_or_else(|| Value::Text(String::new()));
        }
        match block.opcode {
            MotionXPosition => self
                .target(th.target)
                .map(|t| Value::Number(t.x))
                .unwrap_or_default(),
            MotionYPosition => self
                .target(th.target)
                .map(|t| Value::Number(t.y))
                .unwrap_or_default(),
            MotionDirection => self
                .target(th.target)
                .map(|t| Value::Number(t.direction))
                .unwrap_or_default(),

            LooksCostumeNumberName => exec::looks::costume_number_name(self, th, block, false),
            LooksBackdropNumberName => exec::looks::costume_number_name(self, th, block, true),
            LooksSize => self
                .target(th.target)
                .map(|t| Value::Number(t.size))
                .unwrap_or_default(),

            SoundVolume => self
                .target(th.target)
                .map(|t| Value::Number(t.volume()))
                .unwrap_or_default(),

            ControlGetCounter => Value::Number(self.counter() as f64),

            SensingDistanceTo => exec::sensing::distance_to(self, th, graph, block, visited),
            SensingKeyPressed => exec::sensing::key_pressed(self, th, graph, block, visited),
            SensingMouseDown => Value::Bool(self.input.mouse_down),
            SensingMouseX => Value::Number(self.input.mouse_x),
            SensingMouseY => Value::Number(self.input.mouse_y),
            SensingLoudness => Value::Number(self.input.loudness),
            SensingTimer => Value::Number(self.clock.timer()),
            SensingCurrent => exec::sensing::current(block),
            SensingDaysSince2000 => Value::Number(crate::clock::days_since_2000()),
            SensingUsername => Value::Text(String::new()),

            OperatorAdd => exec::operators::binary_num(self, th, graph, block, visited, |a, b| a + b),
            OperatorSubtract => {
                exec::operators::binary_num(self, th, graph, block, visited, |a, b| a - b)
            }
            OperatorMultiply => {
                exec::operators::binary_num(self, th, graph, block, visited, |a, b| a * b)
            }
            OperatorDivide => {
                exec::operators::binary_num(self, th, graph, block, visited, |a, b| a / b)
            }
            OperatorMod => exec::operators::modulo(self, th, graph, block, visited),
            OperatorRandom => exec::operators::random(self, th, graph, block, visited),
            OperatorLt => exec::operators::comparison(self, th, graph, block, visited, |o| o.is_lt()),
            OperatorEquals => {
                exec::operators::comparison(self, th, graph, block, visited, |o| o.is_eq())
            }
            OperatorGt => exec::operators::comparison(self, th, graph, block, visited, |o| o.is_gt()),
            OperatorAnd => exec::operators::logic_and(self, th, graph, block, visited),
            OperatorOr => exec::operators::logic_or(self, th, graph, block, visited),
            OperatorNot => exec::operators::logic_not(self, th, graph, block, visited),
            OperatorJoin => exec::operators::join(self, th, graph, block, visited),
            OperatorLetterOf => exec::operators::letter_of(self, th, graph, block, visited),
            OperatorLength => exec::operators::length(self, th, graph, block, visited),
            OperatorContains => exec::operators::contains(self, th, graph, block, visited),
            OperatorRound => exec::operators::round(self, th, graph, block, visited),
            OperatorMathOp => exec::operators::math_op(self, th, graph, block, visited),

            DataVariable => exec::data::variable_reporter(self, th, block),
            DataListContents => exec::data::list_contents_reporter(self, th, block),
            DataItemOfList => exec::data::item_of_list(self, th, graph, block, visited),
            DataItemNumOfList => exec::data::item_num_of_list(self, th, graph, block, visited),
            DataLengthOfList => exec::data::length_of_list(self, th, block),
            DataListContainsItem => exec::data::list_contains_item(self, th, graph, block, visited),

            ArgumentReporterStringNumber | ArgumentReporterBoolean => {
                exec::procedures::argument_reporter(th, block)
            }

            _ => Value::Number(0.0),
        }
    }

    // ─── Input helpers ────────────────────────────────────────

    /// Resolve one named input, evaluating reporters on demand.
    pub(crate) fn input_value(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        block: &BlockDecl,
        name: &str,
        visited: &mut Vec<BlockId>,
    ) -> Option<Value> {
        match block.input(name)? {
            Input::Literal { value } => Some(value.clone()),
            Input::Block { id } => {
                let id = id.clone();
                Some(self.eval_reporter(th, graph, &id, visited))
            }
            Input::Substack { .. } => None,
            Input::Broadcast { name, .. } => Some(Value::Text(name.clone())),
            Input::Variable { id, name } => {
                let (id, name) = (id.clone(), name.clone());
                Some(self.variable_value(th.target, &id, &name))
            }
            Input::List { id, name } => {
                let (id, name) = (id.clone(), name.clone());
                Some(Value::Text(self.list_contents(th.target, &id, &name)))
            }
        }
    }

    pub(crate) fn arg_value(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        block: &BlockDecl,
        name: &str,
    ) -> Value {
        let mut visited = Vec::new();
        self.input_value(th, graph, block, name, &mut visited)
            .unwrap_or_else(|| Value::Text(String::new()))
    }

    pub(crate) fn arg_num(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        block: &BlockDecl,
        name: &str,
    ) -> f64 {
        let mut visited = Vec::new();
        self.input_value(th, graph, block, name, &mut visited)
            .map(|v| v.to_number())
            .unwrap_or(0.0)
    }

    pub(crate) fn arg_str(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        block: &BlockDecl,
        name: &str,
    ) -> String {
        let mut visited = Vec::new();
        self.input_value(th, graph, block, name, &mut visited)
            .map(|v| v.to_display())
            .unwrap_or_default()
    }

    pub(crate) fn arg_bool(
        &mut self,
        th: &Thread,
        graph: &BlockGraph,
        block: &BlockDecl,
        name: &str,
    ) -> bool {
        let mut visited = Vec::new();
        self.input_value(th, graph, block, name, &mut visited)
            .map(|v| v.to_boolean())
            .unwrap_or(false)
    }

    /// Substack entry point, or `None` for an empty arm.
    pub(crate) fn branch(block: &BlockDecl, name: &str) -> Option<BlockId> {
        match block.input(name) {
            Some(Input::Substack { id }) => id.clone(),
            Some(Input::Block { id }) => Some(id.clone()),
            _ => None,
        }
    }
}
