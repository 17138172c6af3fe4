use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::InferenceEngine;

/// Registry of inference engines keyed by name.
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn InferenceEngine>>,
    default_name: Option<String>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every built-in engine. `stub` is the default.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(super::StubEngine::new());
        registry.register(super::LuminanceEngine::new());
        registry
    }

    /// Register an engine. The first registered engine becomes the default.
    pub fn register<E: InferenceEngine + 'static>(&mut self, engine: E) {
        let name = engine.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.engines.insert(name, Arc::new(engine));
    }

    /// Set default engine by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(anyhow!("inference engine '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InferenceEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn default_engine(&self) -> Option<Arc<dyn InferenceEngine>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Look up `name`, failing with the list of known engines.
    pub fn select(&self, name: &str) -> Result<Arc<dyn InferenceEngine>> {
        self.get(name).ok_or_else(|| {
            let mut known = self.list();
            known.sort();
            anyhow!(
                "inference engine '{}' not registered (known: {})",
                name,
                known.join(", ")
            )
        })
    }

    pub fn list(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::{LuminanceEngine, StubEngine};

    #[test]
    fn first_registered_engine_is_default() {
        let mut registry = EngineRegistry::new();
        assert!(registry.default_engine().is_none());
        registry.register(LuminanceEngine::new());
        registry.register(StubEngine::new());
        assert_eq!(registry.default_engine().unwrap().name(), "luminance");

        registry.set_default("stub").unwrap();
        assert_eq!(registry.default_engine().unwrap().name(), "stub");
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let mut registry = EngineRegistry::with_builtin();
        assert!(registry.set_default("onnx").is_err());
        let err = registry.select("onnx").err().unwrap().to_string();
        assert!(err.contains("luminance"));
        assert!(err.contains("stub"));
    }
}
