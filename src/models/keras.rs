use log::{debug, info};
use ndarray::Array2;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, ModelConfig};
use crate::error::{ModelBuilderError, Result};
use crate::models::checkpoint::Checkpoint;
use crate::models::model_trait::{ModelCreator, ModelWrapper, Network};

/// Wrapper for tf.keras-style models. The creator returns an already compiled
/// model, so there is no separate optimizer or loss to track.
pub struct KerasModel {
    name: String,
    model_creator: ModelCreator,
    network: Option<Box<dyn Network>>,
    config: Option<ModelConfig>,
}

impl KerasModel {
    pub fn new<M>(model_creator: M) -> Self
    where
        M: Fn(&ModelConfig) -> anyhow::Result<Box<dyn Network>> + Send + Sync + 'static,
    {
        Self::from_creator(Arc::new(model_creator))
    }

    pub fn from_creator(model_creator: ModelCreator) -> Self {
        KerasModel {
            name: "KerasModel".to_string(),
            model_creator,
            network: None,
            config: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn network(&self) -> Option<&dyn Network> {
        self.network.as_deref()
    }

    fn built_network(&self) -> Result<&dyn Network> {
        self.network
            .as_deref()
            .ok_or_else(|| ModelBuilderError::NotBuilt(self.name.clone()))
    }
}

impl ModelWrapper for KerasModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> Backend {
        Backend::Keras
    }

    fn build(&mut self, config: &ModelConfig) -> Result<()> {
        let network = (self.model_creator)(config)?;
        debug!("Built {} with {} parameters", self.name, network.num_parameters());
        self.network = Some(network);
        self.config = Some(config.clone());
        Ok(())
    }

    fn is_built(&self) -> bool {
        self.network.is_some()
    }

    fn config(&self) -> Option<&ModelConfig> {
        self.config.as_ref()
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        Ok(self.built_network()?.forward(x)?)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let network = self.built_network()?;
        let config = self
            .config
            .clone()
            .ok_or_else(|| ModelBuilderError::NotBuilt(self.name.clone()))?;
        Checkpoint {
            backend: Backend::Keras,
            config,
            model_state: network.state_dict(),
            optimizer_state: None,
        }
        .write(path)?;
        info!("Saved {} checkpoint to {:?}", self.name, path);
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint::read(path)?;
        checkpoint.ensure_backend(Backend::Keras)?;

        let mut network = (self.model_creator)(&checkpoint.config)?;
        network.load_state_dict(&checkpoint.model_state)?;
        self.network = Some(network);
        self.config = Some(checkpoint.config);
        info!("Restored {} from {:?}", self.name, path);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
