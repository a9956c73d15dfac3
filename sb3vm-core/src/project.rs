//! The parsed-project input model. The engine does not read `.sb3` archives;
//! a loader hands over this model (typically deserialized from JSON) with
//! literals already coerced, input order preserved, and asset metadata
//! (costume extents, sound durations) precomputed.

use crate::types::{BlockId, ProcCode};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub targets: Vec<TargetDecl>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Project {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn default_direction() -> f64 {
    90.0
}

fn default_hundred() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetDecl {
    pub name: String,
    #[serde(default)]
    pub is_stage: bool,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    #[serde(default)]
    pub lists: Vec<ListDecl>,
    /// Declared broadcast names (stage only in well-formed projects).
    #[serde(default)]
    pub broadcasts: Vec<BroadcastDecl>,
    /// Ordered by id for deterministic hat scheduling.
    #[serde(default)]
    pub blocks: BTreeMap<BlockId, BlockDecl>,
    #[serde(default)]
    pub costumes: Vec<CostumeDecl>,
    #[serde(default)]
    pub sounds: Vec<SoundDecl>,
    #[serde(default)]
    pub current_costume: usize,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_direction")]
    pub direction: f64,
    #[serde(default = "default_hundred")]
    pub size: f64,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_hundred")]
    pub volume: f64,
    #[serde(default)]
    pub rotation_style: RotationStyle,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariableDecl {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListDecl {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastDecl {
    pub id: String,
    pub name: String,
}

/// Costume metadata; extents are in stage units with bitmap resolution
/// already applied by the loader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CostumeDecl {
    pub name: String,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

/// Sound metadata; duration precomputed from sample count and rate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoundDecl {
    pub name: String,
    #[serde(default)]
    pub duration_secs: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationStyle {
    #[default]
    #[serde(rename = "all around")]
    AllAround,
    #[serde(rename = "left-right")]
    LeftRight,
    #[serde(rename = "don't rotate")]
    DontRotate,
}

impl RotationStyle {
    pub fn from_menu(text: &str) -> Option<Self> {
        match text {
            "all around" => Some(Self::AllAround),
            "left-right" => Some(Self::LeftRight),
            "don't rotate" => Some(Self::DontRotate),
            _ => None,
        }
    }
}

// ─── Blocks ───────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockDecl {
    pub opcode: Opcode,
    /// Order is significant: call arguments and short-circuit operands are
    /// evaluated in declaration order.
    #[serde(default)]
    pub inputs: Vec<(String, Input)>,
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
    #[serde(default)]
    pub next: Option<BlockId>,
    #[serde(default)]
    pub parent: Option<BlockId>,
    #[serde(default)]
    pub top_level: bool,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub mutation: Option<Mutation>,
}

impl BlockDecl {
    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|(n, _)| n == name).map(|(_, i)| i)
    }

    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    pub value: String,
    /// Reference id for variable/list/broadcast fields.
    #[serde(default)]
    pub id: Option<String>,
}

impl Field {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            id: None,
        }
    }
}

/// One slot of a block. Literals arrive already coerced by the loader;
/// block references are evaluated lazily at the parent's execution time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Input {
    Literal { value: Value },
    Block { id: BlockId },
    Substack { id: Option<BlockId> },
    Broadcast { id: String, name: String },
    Variable { id: String, name: String },
    List { id: String, name: String },
}

/// Procedure metadata carried on prototype and call blocks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mutation {
    pub proccode: ProcCode,
    #[serde(default)]
    pub argument_ids: Vec<String>,
    #[serde(default)]
    pub argument_names: Vec<String>,
    #[serde(default)]
    pub warp: bool,
}

// ─── Opcodes ──────────────────────────────────────────────────

/// The opcode vocabulary, as a sum type rather than interned strings so
/// reporter/hat/redraw classification is static. Serde names are the sb3
/// wire strings; anything else maps to `Unknown` and executes as a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Motion
    #[serde(rename = "motion_movesteps")]
    MotionMoveSteps,
    #[serde(rename = "motion_turnright")]
    MotionTurnRight,
    #[serde(rename = "motion_turnleft")]
    MotionTurnLeft,
    #[serde(rename = "motion_goto")]
    MotionGoTo,
    #[serde(rename = "motion_goto_menu")]
    MotionGoToMenu,
    #[serde(rename = "motion_gotoxy")]
    MotionGoToXY,
    #[serde(rename = "motion_glidesecstoxy")]
    MotionGlideSecsToXY,
    #[serde(rename = "motion_glideto")]
    MotionGlideTo,
    #[serde(rename = "motion_glideto_menu")]
    MotionGlideToMenu,
    #[serde(rename = "motion_pointindirection")]
    MotionPointInDirection,
    #[serde(rename = "motion_pointtowards")]
    MotionPointTowards,
    #[serde(rename = "motion_pointtowards_menu")]
    MotionPointTowardsMenu,
    #[serde(rename = "motion_changexby")]
    MotionChangeXBy,
    #[serde(rename = "motion_setx")]
    MotionSetX,
    #[serde(rename = "motion_changeyby")]
    MotionChangeYBy,
    #[serde(rename = "motion_sety")]
    MotionSetY,
    #[serde(rename = "motion_ifonedgebounce")]
    MotionIfOnEdgeBounce,
    #[serde(rename = "motion_setrotationstyle")]
    MotionSetRotationStyle,
    #[serde(rename = "motion_xposition")]
    MotionXPosition,
    #[serde(rename = "motion_yposition")]
    MotionYPosition,
    #[serde(rename = "motion_direction")]
    MotionDirection,

    // Looks
    #[serde(rename = "looks_say")]
    LooksSay,
    #[serde(rename = "looks_sayforsecs")]
    LooksSayForSecs,
    #[serde(rename = "looks_think")]
    LooksThink,
    #[serde(rename = "looks_thinkforsecs")]
    LooksThinkForSecs,
    #[serde(rename = "looks_show")]
    LooksShow,
    #[serde(rename = "looks_hide")]
    LooksHide,
    #[serde(rename = "looks_switchcostumeto")]
    LooksSwitchCostumeTo,
    #[serde(rename = "looks_costume")]
    LooksCostumeMenu,
    #[serde(rename = "looks_nextcostume")]
    LooksNextCostume,
    #[serde(rename = "looks_switchbackdropto")]
    LooksSwitchBackdropTo,
    #[serde(rename = "looks_backdrops")]
    LooksBackdropsMenu,
    #[serde(rename = "looks_nextbackdrop")]
    LooksNextBackdrop,
    #[serde(rename = "looks_changesizeby")]
    LooksChangeSizeBy,
    #[serde(rename = "looks_setsizeto")]
    LooksSetSizeTo,
    #[serde(rename = "looks_changeeffectby")]
    LooksChangeEffectBy,
    #[serde(rename = "looks_seteffectto")]
    LooksSetEffectTo,
    #[serde(rename = "looks_cleargraphiceffects")]
    LooksClearGraphicEffects,
    #[serde(rename = "looks_gotofrontback")]
    LooksGoToFrontBack,
    #[serde(rename = "looks_goforwardbackwardlayers")]
    LooksGoForwardBackwardLayers,
    #[serde(rename = "looks_costumenumbername")]
    LooksCostumeNumberName,
    #[serde(rename = "looks_backdropnumbername")]
    LooksBackdropNumberName,
    #[serde(rename = "looks_size")]
    LooksSize,

    // Sound
    #[serde(rename = "sound_playuntildone")]
    SoundPlayUntilDone,
    #[serde(rename = "sound_play")]
    SoundPlay,
    #[serde(rename = "sound_sounds_menu")]
    SoundSoundsMenu,
    #[serde(rename = "sound_stopallsounds")]
    SoundStopAllSounds,
    #[serde(rename = "sound_changeeffectby")]
    SoundChangeEffectBy,
    #[serde(rename = "sound_seteffectto")]
    SoundSetEffectTo,
    #[serde(rename = "sound_cleareffects")]
    SoundClearEffects,
    #[serde(rename = "sound_changevolumeby")]
    SoundChangeVolumeBy,
    #[serde(rename = "sound_setvolumeto")]
    SoundSetVolumeTo,
    #[serde(rename = "sound_volume")]
    SoundVolume,

    // Events
    #[serde(rename = "event_whenflagclicked")]
    EventWhenFlagClicked,
    #[serde(rename = "event_whenkeypressed")]
    EventWhenKeyPressed,
    #[serde(rename = "event_whenthisspriteclicked")]
    EventWhenThisSpriteClicked,
    #[serde(rename = "event_whenstageclicked")]
    EventWhenStageClicked,
    #[serde(rename = "event_whenbroadcastreceived")]
    EventWhenBroadcastReceived,
    #[serde(rename = "event_whengreaterthan")]
    EventWhenGreaterThan,
    #[serde(rename = "event_broadcast")]
    EventBroadcast,
    #[serde(rename = "event_broadcastandwait")]
    EventBroadcastAndWait,

    // Control
    #[serde(rename = "control_wait")]
    ControlWait,
    #[serde(rename = "control_repeat")]
    ControlRepeat,
    #[serde(rename = "control_if")]
    ControlIf,
    #[serde(rename = "control_if_else")]
    ControlIfElse,
    #[serde(rename = "control_wait_until")]
    ControlWaitUntil,
    #[serde(rename = "control_repeat_until")]
    ControlRepeatUntil,
    #[serde(rename = "control_while")]
    ControlWhile,
    #[serde(rename = "control_forever")]
    ControlForever,
    #[serde(rename = "control_stop")]
    ControlStop,
    #[serde(rename = "control_start_as_clone")]
    ControlStartAsClone,
    #[serde(rename = "control_create_clone_of")]
    ControlCreateCloneOf,
    #[serde(rename = "control_create_clone_of_menu")]
    ControlCreateCloneOfMenu,
    #[serde(rename = "control_delete_this_clone")]
    ControlDeleteThisClone,
    #[serde(rename = "control_allatonce")]
    ControlAllAtOnce,
    #[serde(rename = "control_incr_counter")]
    ControlIncrCounter,
    #[serde(rename = "control_get_counter")]
    ControlGetCounter,
    #[serde(rename = "control_clear_counter")]
    ControlClearCounter,

    // Sensing
    #[serde(rename = "sensing_distanceto")]
    SensingDistanceTo,
    #[serde(rename = "sensing_distancetomenu")]
    SensingDistanceToMenu,
    #[serde(rename = "sensing_keypressed")]
    SensingKeyPressed,
    #[serde(rename = "sensing_keyoptions")]
    SensingKeyOptions,
    #[serde(rename = "sensing_mousedown")]
    SensingMouseDown,
    #[serde(rename = "sensing_mousex")]
    SensingMouseX,
    #[serde(rename = "sensing_mousey")]
    SensingMouseY,
    #[serde(rename = "sensing_loudness")]
    SensingLoudness,
    #[serde(rename = "sensing_timer")]
    SensingTimer,
    #[serde(rename = "sensing_resettimer")]
    SensingResetTimer,
    #[serde(rename = "sensing_current")]
    SensingCurrent,
    #[serde(rename = "sensing_dayssince2000")]
    SensingDaysSince2000,
    #[serde(rename = "sensing_username")]
    SensingUsername,

    // Operators
    #[serde(rename = "operator_add")]
    OperatorAdd,
    #[serde(rename = "operator_subtract")]
    OperatorSubtract,
    #[serde(rename = "operator_multiply")]
    OperatorMultiply,
    #[serde(rename = "operator_divide")]
    OperatorDivide,
    #[serde(rename = "operator_random")]
    OperatorRandom,
    #[serde(rename = "operator_gt")]
    OperatorGt,
    #[serde(rename = "operator_lt")]
    OperatorLt,
    #[serde(rename = "operator_equals")]
    OperatorEquals,
    #[serde(rename = "operator_and")]
    OperatorAnd,
    #[serde(rename = "operator_or")]
    OperatorOr,
    #[serde(rename = "operator_not")]
    OperatorNot,
    #[serde(rename = "operator_join")]
    OperatorJoin,
    #[serde(rename = "operator_letter_of")]
    OperatorLetterOf,
    #[serde(rename = "operator_length")]
    OperatorLength,
    #[serde(rename = "operator_contains")]
    OperatorContains,
    #[serde(rename = "operator_mod")]
    OperatorMod,
    #[serde(rename = "operator_round")]
    OperatorRound,
    #[serde(rename = "operator_mathop")]
    OperatorMathOp,

    // Data
    #[serde(rename = "data_variable")]
    DataVariable,
    #[serde(rename = "data_setvariableto")]
    DataSetVariableTo,
    #[serde(rename = "data_changevariableby")]
    DataChangeVariableBy,
    #[serde(rename = "data_showvariable")]
    DataShowVariable,
    #[serde(rename = "data_hidevariable")]
    DataHideVariable,
    #[serde(rename = "data_listcontents")]
    DataListContents,
    #[serde(rename = "data_addtolist")]
    DataAddToList,
    #[serde(rename = "data_deleteoflist")]
    DataDeleteOfList,
    #[serde(rename = "data_deletealloflist")]
    DataDeleteAllOfList,
    #[serde(rename = "data_insertatlist")]
    DataInsertAtList,
    #[serde(rename = "data_replaceitemoflist")]
    DataReplaceItemOfList,
    #[serde(rename = "data_itemoflist")]
    DataItemOfList,
    #[serde(rename = "data_itemnumoflist")]
    DataItemNumOfList,
    #[serde(rename = "data_lengthoflist")]
    DataLengthOfList,
    #[serde(rename = "data_listcontainsitem")]
    DataListContainsItem,
    #[serde(rename = "data_showlist")]
    DataShowList,
    #[serde(rename = "data_hidelist")]
    DataHideList,

    // Procedures
    #[serde(rename = "procedures_definition")]
    ProceduresDefinition,
    #[serde(rename = "procedures_prototype")]
    ProceduresPrototype,
    #[serde(rename = "procedures_call")]
    ProceduresCall,
    #[serde(rename = "argument_reporter_string_number")]
    ArgumentReporterStringNumber,
    #[serde(rename = "argument_reporter_boolean")]
    ArgumentReporterBoolean,

    // Text-to-speech extension
    #[serde(rename = "text2speech_speakAndWait")]
    Text2SpeechSpeakAndWait,
    #[serde(rename = "text2speech_setVoice")]
    Text2SpeechSetVoice,
    #[serde(rename = "text2speech_setLanguage")]
    Text2SpeechSetLanguage,

    #[serde(other)]
    Unknown,
}

impl Opcode {
    /// Top-of-script trigger blocks.
    pub fn is_hat(self) -> bool {
        matches!(
            self,
            Opcode::EventWhenFlagClicked
                | Opcode::EventWhenKeyPressed
                | Opcode::EventWhenThisSpriteClicked
                | Opcode::EventWhenStageClicked
                | Opcode::EventWhenBroadcastReceived
                | Opcode::EventWhenGreaterThan
                | Opcode::ControlStartAsClone
        )
    }

    /// A live thread anchored at this hat is restarted in place when the
    /// hat fires again. Edge, key and clone hats leave running threads
    /// alone instead.
    pub fn restarts_existing_threads(self) -> bool {
        matches!(
            self,
            Opcode::EventWhenFlagClicked
                | Opcode::EventWhenThisSpriteClicked
                | Opcode::EventWhenStageClicked
                | Opcode::EventWhenBroadcastReceived
        )
    }

    pub fn is_reporter(self) -> bool {
        matches!(
            self,
            Opcode::MotionXPosition
                | Opcode::MotionYPosition
                | Opcode::MotionDirection
                | Opcode::LooksCostumeNumberName
                | Opcode::LooksBackdropNumberName
                | Opcode::LooksSize
                | Opcode::SoundVolume
                | Opcode::ControlGetCounter
                | Opcode::SensingDistanceTo
                | Opcode::SensingKeyPressed
                | Opcode::SensingMouseDown
                | Opcode::SensingMouseX
                | Opcode::SensingMouseY
                | Opcode::SensingLoudness
                | Opcode::SensingTimer
                | Opcode::SensingCurrent
                | Opcode::SensingDaysSince2000
                | Opcode::SensingUsername
                | Opcode::OperatorAdd
                | Opcode::OperatorSubtract
                | Opcode::OperatorMultiply
                | Opcode::OperatorDivide
                | Opcode::OperatorRandom
                | Opcode::OperatorGt
                | Opcode::OperatorLt
                | Opcode::OperatorEquals
                | Opcode::OperatorAnd
                | Opcode::OperatorOr
                | Opcode::OperatorNot
                | Opcode::OperatorJoin
                | Opcode::OperatorLetterOf
                | Opcode::OperatorLength
                | Opcode::OperatorContains
                | Opcode::OperatorMod
                | Opcode::OperatorRound
                | Opcode::OperatorMathOp
                | Opcode::DataVariable
                | Opcode::DataListContents
                | Opcode::DataItemOfList
                | Opcode::DataItemNumOfList
                | Opcode::DataLengthOfList
                | Opcode::DataListContainsItem
                | Opcode::ArgumentReporterStringNumber
                | Opcode::ArgumentReporterBoolean
        ) || self.is_menu()
    }

    /// Dropdown shadow blocks that report their single field.
    pub fn is_menu(self) -> bool {
        matches!(
            self,
            Opcode::MotionGoToMenu
                | Opcode::MotionGlideToMenu
                | Opcode::MotionPointTowardsMenu
                | Opcode::LooksCostumeMenu
                | Opcode::LooksBackdropsMenu
                | Opcode::SoundSoundsMenu
                | Opcode::ControlCreateCloneOfMenu
                | Opcode::SensingDistanceToMenu
                | Opcode::SensingKeyOptions
        )
    }

    /// Blocks with a visual side-effect. Executing one ends the frame's
    /// stepping for non-warp threads.
    pub fn requests_redraw(self) -> bool {
        matches!(
            self,
            Opcode::MotionMoveSteps
                | Opcode::MotionTurnRight
                | Opcode::MotionTurnLeft
                | Opcode::MotionGoTo
                | Opcode::MotionGoToXY
                | Opcode::MotionGlideSecsToXY
                | Opcode::MotionGlideTo
                | Opcode::MotionPointInDirection
                | Opcode::MotionPointTowards
                | Opcode::MotionChangeXBy
                | Opcode::MotionSetX
                | Opcode::MotionChangeYBy
                | Opcode::MotionSetY
                | Opcode::MotionIfOnEdgeBounce
                | Opcode::MotionSetRotationStyle
                | Opcode::LooksSay
                | Opcode::LooksSayForSecs
                | Opcode::LooksThink
                | Opcode::LooksThinkForSecs
                | Opcode::LooksShow
                | Opcode::LooksHide
                | Opcode::LooksSwitchCostumeTo
                | Opcode::LooksNextCostume
                | Opcode::LooksSwitchBackdropTo
                | Opcode::LooksNextBackdrop
                | Opcode::LooksChangeSizeBy
                | Opcode::LooksSetSizeTo
                | Opcode::LooksChangeEffectBy
                | Opcode::LooksSetEffectTo
                | Opcode::LooksClearGraphicEffects
                | Opcode::LooksGoToFrontBack
                | Opcode::LooksGoForwardBackwardLayers
                | Opcode::SoundPlay
                | Opcode::SoundPlayUntilDone
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_wire_names_round_trip() {
        let op: Opcode = serde_json::from_str("\"motion_movesteps\"").unwrap();
        assert_eq!(op, Opcode::MotionMoveSteps);
        assert_eq!(serde_json::to_string(&op).unwrap(), "\"motion_movesteps\"");
    }

    #[test]
    fn unknown_opcode_is_tolerated() {
        let op: Opcode = serde_json::from_str("\"music_playDrumForBeats\"").unwrap();
        assert_eq!(op, Opcode::Unknown);
        assert!(!op.is_hat());
        assert!(!op.is_reporter());
    }

    #[test]
    fn project_deserializes_from_model_json() {
        let json = r#"{
            "targets": [
                {"name": "Stage", "is_stage": true},
                {"name": "Cat", "x": 10.0, "blocks": {
                    "b1": {"opcode": "event_whenflagclicked", "top_level": true}
                }}
            ]
        }"#;
        let project = Project::from_json(json).unwrap();
        assert_eq!(project.targets.len(), 2);
        assert!(project.targets[0].is_stage);
        assert!(!project.targets[1].is_stage);
        assert_eq!(project.targets[1].x, 10.0);
        // Omitted fields take the sb3 defaults.
        assert_eq!(project.targets[1].direction, 90.0);
        assert_eq!(project.targets[1].size, 100.0);
        assert!(project.targets[1].visible);
        let b1 = &project.targets[1].blocks["b1"];
        assert_eq!(b1.opcode, Opcode::EventWhenFlagClicked);
        assert!(b1.top_level);
    }

    #[test]
    fn literal_inputs_deserialize_from_plain_json() {
        let json = r#"{"kind":"literal","value":3.5}"#;
        let input: Input = serde_json::from_str(json).unwrap();
        match input {
            Input::Literal { value } => assert_eq!(value, Value::Number(3.5)),
            other => panic!("unexpected input: {other:?}"),
        }
    }
}
