use log::{debug, info};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, ModelConfig};
use crate::error::{ModelBuilderError, Result};
use crate::models::keras::KerasModel;
use crate::models::model_trait::{
    Loss, LossCreator, ModelCreator, ModelWrapper, Network, Optimizer, OptimizerCreator,
};
use crate::models::pytorch::PytorchModel;
use crate::registry::{ModelFactory, ModelRegistry};

/// Creators stored by the backend entry points.
#[derive(Clone)]
enum BackendCreators {
    PyTorch {
        model_creator: ModelCreator,
        optimizer_creator: OptimizerCreator,
        loss_creator: LossCreator,
    },
    Keras {
        model_creator: ModelCreator,
    },
}

impl BackendCreators {
    fn backend(&self) -> Backend {
        match self {
            BackendCreators::PyTorch { .. } => Backend::PyTorch,
            BackendCreators::Keras { .. } => Backend::Keras,
        }
    }

    /// Fresh, unbuilt wrapper sharing the stored creators.
    fn wrapper(&self) -> Box<dyn ModelWrapper> {
        match self {
            BackendCreators::PyTorch {
                model_creator,
                optimizer_creator,
                loss_creator,
            } => Box::new(PytorchModel::from_creators(
                Arc::clone(model_creator),
                Arc::clone(optimizer_creator),
                Arc::clone(loss_creator),
            )),
            BackendCreators::Keras { model_creator } => {
                Box::new(KerasModel::from_creator(Arc::clone(model_creator)))
            }
        }
    }
}

/// What a builder constructs on `build`.
#[derive(Clone)]
enum BuildTarget {
    Backend(BackendCreators),
    Factory(ModelFactory),
    /// Resolved from `config.model` / `config.dev_option` at build time.
    ByName,
}

/// Creates model wrappers for a backend, an explicit factory or a registered
/// model name. Every `build` returns a new, independent wrapper.
#[derive(Clone)]
pub struct ModelBuilder {
    target: BuildTarget,
    registry: Arc<ModelRegistry>,
}

impl ModelBuilder {
    pub fn from_pytorch<M, O, L>(model_creator: M, optimizer_creator: O, loss_creator: L) -> Self
    where
        M: Fn(&ModelConfig) -> anyhow::Result<Box<dyn Network>> + Send + Sync + 'static,
        O: Fn(&dyn Network, &ModelConfig) -> anyhow::Result<Box<dyn Optimizer>>
            + Send
            + Sync
            + 'static,
        L: Fn(&ModelConfig) -> anyhow::Result<Box<dyn Loss>> + Send + Sync + 'static,
    {
        Self::with_target(BuildTarget::Backend(BackendCreators::PyTorch {
            model_creator: Arc::new(model_creator),
            optimizer_creator: Arc::new(optimizer_creator),
            loss_creator: Arc::new(loss_creator),
        }))
    }

    pub fn from_tfkeras<M>(model_creator: M) -> Self
    where
        M: Fn(&ModelConfig) -> anyhow::Result<Box<dyn Network>> + Send + Sync + 'static,
    {
        Self::with_target(BuildTarget::Backend(BackendCreators::Keras {
            model_creator: Arc::new(model_creator),
        }))
    }

    /// Look `name` up among the models registered for `backend` in the
    /// process-wide registry.
    pub fn from_name(name: &str, backend: Backend) -> Result<Self> {
        Self::from_name_in(&ModelRegistry::global(), name, backend)
    }

    /// `from_name` against the default backend, [`Backend::PyTorch`].
    pub fn from_name_default(name: &str) -> Result<Self> {
        Self::from_name(name, Backend::default())
    }

    pub fn from_name_in(registry: &Arc<ModelRegistry>, name: &str, backend: Backend) -> Result<Self> {
        let factory = registry.resolve(name, backend)?;
        debug!("Resolved {} model `{}`", backend, name);
        Ok(Self {
            target: BuildTarget::Factory(factory),
            registry: Arc::clone(registry),
        })
    }

    pub fn from_factory<F>(factory: F) -> Self
    where
        F: Fn(&ModelConfig) -> Result<Box<dyn ModelWrapper>> + Send + Sync + 'static,
    {
        Self::with_target(BuildTarget::Factory(Arc::new(factory)))
    }

    /// Builder that picks the model from the `model` and `dev_option` keys of
    /// the config passed to `build`.
    pub fn by_config_name() -> Self {
        Self::with_target(BuildTarget::ByName)
    }

    /// Use `registry` instead of the process-wide one for by-name builds.
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    fn with_target(target: BuildTarget) -> Self {
        Self {
            target,
            registry: ModelRegistry::global(),
        }
    }

    pub fn backend(&self) -> Option<Backend> {
        match &self.target {
            BuildTarget::Backend(creators) => Some(creators.backend()),
            BuildTarget::Factory(_) | BuildTarget::ByName => None,
        }
    }

    /// Build a new model from `config`.
    pub fn build(&self, config: &ModelConfig) -> Result<Box<dyn ModelWrapper>> {
        let factory = match &self.target {
            BuildTarget::Backend(creators) => {
                let mut model = creators.wrapper();
                model.build(config)?;
                info!("Built {} model {}", model.backend(), model.name());
                return Ok(model);
            }
            BuildTarget::Factory(factory) => Arc::clone(factory),
            BuildTarget::ByName => {
                let name = config
                    .model
                    .as_deref()
                    .ok_or(ModelBuilderError::MissingConfigKey("model"))?;
                let backend = config
                    .dev_option
                    .ok_or(ModelBuilderError::MissingConfigKey("dev_option"))?;
                debug!("Building {} model `{}` from config", backend, name);
                self.registry.resolve(name, backend)?
            }
        };
        factory(config)
    }

    /// Restore a saved model. Only builders created for a backend know which
    /// wrapper to restore into; the others fail with `CheckpointUnsupported`.
    pub fn build_from_ckpt<P: AsRef<Path>>(&self, checkpoint_path: P) -> Result<Box<dyn ModelWrapper>> {
        let mut model = match &self.target {
            BuildTarget::Backend(creators) => creators.wrapper(),
            BuildTarget::Factory(_) | BuildTarget::ByName => {
                return Err(ModelBuilderError::CheckpointUnsupported)
            }
        };
        model.restore(checkpoint_path.as_ref())?;
        info!("Restored {} model from {:?}", model.backend(), checkpoint_path.as_ref());
        Ok(model)
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::by_config_name()
    }
}

impl fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let target = match &self.target {
            BuildTarget::Backend(creators) => creators.backend().as_str(),
            BuildTarget::Factory(_) => "factory",
            BuildTarget::ByName => "by-name",
        };
        f.debug_struct("ModelBuilder").field("target", &target).finish()
    }
}
