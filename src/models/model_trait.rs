use ndarray::Array2;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, ModelConfig};
use crate::error::Result;

/// Named, flattened parameter tensors.
pub type StateDict = BTreeMap<String, Vec<f32>>;

/// Creates the network for a config. Shared by both wrapper families.
pub type ModelCreator =
    Arc<dyn Fn(&ModelConfig) -> anyhow::Result<Box<dyn Network>> + Send + Sync>;

/// Creates the optimizer for an already created network.
pub type OptimizerCreator =
    Arc<dyn Fn(&dyn Network, &ModelConfig) -> anyhow::Result<Box<dyn Optimizer>> + Send + Sync>;

pub type LossCreator = Arc<dyn Fn(&ModelConfig) -> anyhow::Result<Box<dyn Loss>> + Send + Sync>;

/// A framework model as returned by a model creator.
pub trait Network: Send + Sync {
    fn forward(&self, x: &Array2<f32>) -> anyhow::Result<Array2<f32>>;

    fn state_dict(&self) -> StateDict;

    fn load_state_dict(&mut self, state: &StateDict) -> anyhow::Result<()>;

    fn num_parameters(&self) -> usize {
        self.state_dict().values().map(Vec::len).sum()
    }
}

pub trait Optimizer: Send + Sync {
    fn name(&self) -> &str;

    fn learning_rate(&self) -> f64;

    fn state_dict(&self) -> StateDict;

    fn load_state_dict(&mut self, state: &StateDict) -> anyhow::Result<()>;
}

pub trait Loss: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, prediction: &Array2<f32>, target: &Array2<f32>) -> anyhow::Result<f32>;
}

/// Uniform build/restore surface over a framework-specific model.
///
/// Every wrapper the builder hands out implements this, whether it comes from
/// stored creators, an explicit factory or the registry.
pub trait ModelWrapper: Send + Sync {
    /// Human readable name, the registry name for registered models.
    fn name(&self) -> &str;

    fn backend(&self) -> Backend;

    /// Create the underlying network (and optimizer/loss where applicable)
    /// from `config`, replacing any previous state.
    fn build(&mut self, config: &ModelConfig) -> Result<()>;

    fn is_built(&self) -> bool;

    /// Config of the last successful build or restore.
    fn config(&self) -> Option<&ModelConfig>;

    fn predict(&self, x: &Array2<f32>) -> Result<Array2<f32>>;

    fn save(&self, path: &Path) -> Result<()>;

    /// Rebuild from the config stored in the checkpoint and load its state.
    fn restore(&mut self, path: &Path) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}
