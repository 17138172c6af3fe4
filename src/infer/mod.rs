//! Inference engines.
//!
//! An engine maps a raw capture buffer to a scalar measurement field. Engines
//! are registered by name in an `EngineRegistry`; the session pipeline runs
//! the selected engine on an `InferenceLane` so a stuck model cannot hold a
//! pipeline worker forever.

mod backend;
mod backends;
mod lane;
mod registry;

pub use backend::InferenceEngine;
pub use backends::{LuminanceEngine, StubEngine};
pub use lane::{InferenceLane, InferenceOutcome};
pub use registry::EngineRegistry;
