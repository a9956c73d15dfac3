use crate::blocks::BlockGraph;
use crate::project::{CostumeDecl, RotationStyle, SoundDecl, TargetDecl};
use crate::types::TargetId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub value: Value,
    /// Monitor visibility.
    pub visible: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct List {
    pub id: String,
    pub name: String,
    pub values: Vec<Value>,
    pub visible: bool,
}

/// Graphic effects. Ghost and brightness clamp on write, the rest are free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphicEffects {
    pub color: f64,
    pub fisheye: f64,
    pub whirl: f64,
    pub pixelate: f64,
    pub mosaic: f64,
    pub brightness: f64,
    pub ghost: f64,
}

impl GraphicEffects {
    pub fn set(&mut self, effect: &str, value: f64) {
        match effect.to_lowercase().as_str() {
            "color" => self.color = value,
            "fisheye" => self.fisheye = value,
            "whirl" => self.whirl = value,
            "pixelate" => self.pixelate = value,
            "mosaic" => self.mosaic = value,
            "brightness" => self.brightness = value.clamp(-100.0, 100.0),
            "ghost" => self.ghost = value.clamp(0.0, 100.0),
            _ => {}
        }
    }

    pub fn get(&self, effect: &str) -> f64 {
        match effect.to_lowercase().as_str() {
            "color" => self.color,
            "fisheye" => self.fisheye,
            "whirl" => self.whirl,
            "pixelate" => self.pixelate,
            "mosaic" => self.mosaic,
            "brightness" => self.brightness,
            "ghost" => self.ghost,
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Sound effects, clamped on write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundEffects {
    pub pitch: f64,
    pub pan: f64,
}

impl SoundEffects {
    pub fn set(&mut self, effect: &str, value: f64) {
        match effect.to_lowercase().as_str() {
            "pitch" => self.pitch = value.clamp(-360.0, 360.0),
            "pan" => self.pan = value.clamp(-100.0, 100.0),
            _ => {}
        }
    }

    pub fn get(&self, effect: &str) -> f64 {
        match effect.to_lowercase().as_str() {
            "pitch" => self.pitch,
            "pan" => self.pan,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SayKind {
    Say,
    Think,
}

/// Per-target text-to-speech extension state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Text2SpeechState {
    pub voice: String,
    pub language: String,
}

impl Default for Text2SpeechState {
    fn default() -> Self {
        Self {
            voice: "ALTO".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Runtime state of one stage, sprite or clone. Clones share their sprite's
/// block graph but own deep copies of all mutable state.
#[derive(Clone, Debug)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub is_stage: bool,
    pub is_clone: bool,
    pub graph: Arc<BlockGraph>,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub size: f64,
    pub visible: bool,
    pub rotation_style: RotationStyle,
    pub costumes: Vec<CostumeDecl>,
    pub current_costume: usize,
    pub sounds: Vec<SoundDecl>,
    volume: f64,
    pub sound_effects: SoundEffects,
    pub effects: GraphicEffects,
    /// Keyed by variable id.
    pub variables: BTreeMap<String, Variable>,
    pub lists: BTreeMap<String, List>,
    pub say: Option<(SayKind, String)>,
    /// Bumped on every bubble change so a timed say only clears its own.
    pub say_epoch: u64,
    pub text2speech: Text2SpeechState,
}

impl Target {
    pub fn from_decl(decl: &TargetDecl, graph: Arc<BlockGraph>) -> Self {
        let variables = decl
            .variables
            .iter()
            .map(|v| {
                (
                    v.id.clone(),
                    Variable {
                        id: v.id.clone(),
                        name: v.name.clone(),
                        value: v.value.clone(),
                        visible: false,
                    },
                )
            })
            .collect();
        let lists = decl
            .lists
            .iter()
            .map(|l| {
                (
                    l.id.clone(),
                    List {
                        id: l.id.clone(),
                        name: l.name.clone(),
                        values: l.values.clone(),
                        visible: false,
                    },
                )
            })
            .collect();
        Self {
            id: TargetId::fresh(),
            name: decl.name.clone(),
            is_stage: decl.is_stage,
            is_clone: false,
            graph,
            x: decl.x,
            y: decl.y,
            direction: decl.direction,
            size: decl.size,
            visible: decl.visible,
            rotation_style: decl.rotation_style,
            costumes: decl.costumes.clone(),
            current_costume: decl.current_costume.min(decl.costumes.len().saturating_sub(1)),
            sounds: decl.sounds.clone(),
            volume: decl.volume.clamp(0.0, 100.0),
            sound_effects: SoundEffects::default(),
            effects: GraphicEffects::default(),
            variables,
            lists,
            say: None,
            say_epoch: 0,
            text2speech: Text2SpeechState::default(),
        }
    }

    /// Deep state copy for `create clone of`. Subsequent variable writes
    /// diverge from the original.
    pub fn spawn_clone(&self) -> Target {
        let mut clone = self.clone();
        clone.id = TargetId::fresh();
        clone.is_clone = true;
        clone.say = None;
        clone.say_epoch = 0;
        clone
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 100.0);
    }

    pub fn set_say(&mut self, bubble: Option<(SayKind, String)>) -> u64 {
        self.say = bubble;
        self.say_epoch += 1;
        self.say_epoch
    }

    /// Extent of the current costume scaled by sprite size, for fencing.
    pub fn bounds_extent(&self) -> (f64, f64) {
        let scale = self.size / 100.0;
        match self.costumes.get(self.current_costume) {
            Some(c) => (c.width * scale, c.height * scale),
            None => (0.0, 0.0),
        }
    }

    pub fn current_costume_name(&self) -> &str {
        self.costumes
            .get(self.current_costume)
            .map(|c| c.name.as_str())
            .unwrap_or("")
    }

    pub fn costume_index_by_name(&self, name: &str) -> Option<usize> {
        self.costumes.iter().position(|c| c.name == name)
    }

    /// Set the costume to a 0-based index, wrapping in both directions.
    pub fn set_costume_wrapped(&mut self, index: i64) {
        let len = self.costumes.len() as i64;
        if len == 0 {
            return;
        }
        self.current_costume = index.rem_euclid(len) as usize;
    }

    pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.variables.values().find(|v| v.name == name)
    }

    pub fn list_by_name(&self, name: &str) -> Option<&List> {
        self.lists.values().find(|l| l.name == name)
    }
}
