//! Name -> factory table for the models a builder can resolve by name.
//!
//! Each backend has its own namespace, so the same name may be registered once
//! for PyTorch and once for tf.keras. The process-wide table returned by
//! [`ModelRegistry::global`] is created on first use with the built-in models
//! and can be extended at any time through [`ModelRegistry::register`].

use log::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{Backend, ModelConfig};
use crate::error::{ModelBuilderError, Result};
use crate::models::keras::KerasModel;
use crate::models::linear::{linear_model_creator, mse_loss_creator, sgd_optimizer_creator};
use crate::models::model_trait::ModelWrapper;
use crate::models::pytorch::PytorchModel;

/// Constructs a built model wrapper from a config.
pub type ModelFactory =
    Arc<dyn Fn(&ModelConfig) -> Result<Box<dyn ModelWrapper>> + Send + Sync>;

static GLOBAL_REGISTRY: Lazy<Arc<ModelRegistry>> =
    Lazy::new(|| Arc::new(ModelRegistry::with_builtins()));

#[derive(Default)]
pub struct ModelRegistry {
    entries: RwLock<HashMap<Backend, BTreeMap<String, ModelFactory>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bundled `Linear` model for both backends.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Backend::PyTorch, "Linear", |config: &ModelConfig| {
            let mut model =
                PytorchModel::new(linear_model_creator, sgd_optimizer_creator, mse_loss_creator)
                    .with_name("Linear");
            model.build(config)?;
            Ok(Box::new(model) as Box<dyn ModelWrapper>)
        });
        registry.register(Backend::Keras, "Linear", |config: &ModelConfig| {
            let mut model = KerasModel::new(linear_model_creator).with_name("Linear");
            model.build(config)?;
            Ok(Box::new(model) as Box<dyn ModelWrapper>)
        });
        registry
    }

    pub fn global() -> Arc<ModelRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Register `factory` as `name` for `backend`. Returns `true` when an
    /// existing entry was replaced.
    pub fn register<F>(&self, backend: Backend, name: &str, factory: F) -> bool
    where
        F: Fn(&ModelConfig) -> Result<Box<dyn ModelWrapper>> + Send + Sync + 'static,
    {
        self.register_factory(backend, name, Arc::new(factory))
    }

    pub fn register_factory(&self, backend: Backend, name: &str, factory: ModelFactory) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = entries
            .entry(backend)
            .or_default()
            .insert(name.to_string(), factory)
            .is_some();
        if replaced {
            warn!("Replaced registered {} model `{}`", backend, name);
        } else {
            debug!("Registered {} model `{}`", backend, name);
        }
        replaced
    }

    pub fn resolve(&self, name: &str, backend: Backend) -> Result<ModelFactory> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let models = entries.get(&backend);
        match models.and_then(|m| m.get(name)) {
            Some(factory) => Ok(Arc::clone(factory)),
            None => Err(ModelBuilderError::UnknownModel {
                name: name.to_string(),
                backend,
                available: models.map(|m| m.keys().cloned().collect()).unwrap_or_default(),
            }),
        }
    }

    pub fn contains(&self, name: &str, backend: Backend) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&backend).is_some_and(|m| m.contains_key(name))
    }

    /// Registered names for `backend`, sorted.
    pub fn names(&self, backend: Backend) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&backend)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_both_backends() {
        let registry = ModelRegistry::with_builtins();
        for backend in Backend::ALL {
            assert!(registry.contains("Linear", backend));
            assert!(!registry.contains("Foo", backend));
            assert_eq!(registry.names(backend), vec!["Linear".to_string()]);
        }
    }

    #[test]
    fn test_resolve_unknown_lists_available_names() {
        let registry = ModelRegistry::with_builtins();
        let err = match registry.resolve("Foo", Backend::PyTorch) {
            Err(err) => err,
            Ok(_) => panic!("Foo should not resolve"),
        };
        match &err {
            ModelBuilderError::UnknownModel {
                name,
                backend,
                available,
            } => {
                assert_eq!(name, "Foo");
                assert_eq!(*backend, Backend::PyTorch);
                assert_eq!(available, &vec!["Linear".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
        let message = err.to_string();
        assert!(message.contains("Foo"));
        assert!(message.contains("Linear"));
    }

    #[test]
    fn test_empty_registry_has_no_names() {
        let registry = ModelRegistry::new();
        assert!(registry.names(Backend::Keras).is_empty());
        assert!(!registry.contains("Linear", Backend::Keras));
        assert!(matches!(
            registry.resolve("Linear", Backend::Keras),
            Err(ModelBuilderError::UnknownModel { available, .. }) if available.is_empty()
        ));
    }

    #[test]
    fn test_register_replaces_existing_entry() {
        let registry = ModelRegistry::with_builtins();
        let replaced = registry.register(Backend::Keras, "Linear", |config: &ModelConfig| {
            let mut model = KerasModel::new(linear_model_creator).with_name("Custom");
            model.build(config)?;
            Ok(Box::new(model) as Box<dyn ModelWrapper>)
        });
        assert!(replaced);

        let factory = registry.resolve("Linear", Backend::Keras).unwrap();
        let model = factory(&ModelConfig::new()).unwrap();
        assert_eq!(model.name(), "Custom");
        assert_eq!(model.backend(), Backend::Keras);
    }
}
