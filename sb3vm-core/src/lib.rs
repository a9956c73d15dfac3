//! A runtime virtual machine for Scratch 3.0 projects: a parsed block graph
//! goes in, discrete logical frames advance many cooperative threads, and
//! renderers/hosts observe target state through snapshots and a change-log.
//!
//! The crate is the execution core only. Project-file parsing, asset
//! decoding, rendering and audio output live behind the input model and the
//! [`audio::AudioSink`] / [`audio::SpeechSynth`] ports.

pub mod audio;
pub mod blocks;
pub mod broadcast;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
mod exec;
pub mod fence;
pub mod project;
pub mod target;
pub mod thread;
pub mod types;
pub mod value;
mod vm;

pub use engine::{Runtime, TargetSnapshot};
pub use error::ProjectError;
pub use events::RuntimeEvent;
pub use project::{Opcode, Project};
pub use types::{RuntimeOptions, SoundHandle, TargetId, ThreadId};
pub use value::Value;
