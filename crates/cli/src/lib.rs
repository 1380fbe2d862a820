//! `fleetstock` command-line front end: replays JSON operation scripts
//! against an in-memory engine.

pub mod script;

pub use script::{Operation, Script, ScriptError, ScriptRunner, StepOutcome};
