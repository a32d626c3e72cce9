use log::{debug, info};
use ndarray::Array2;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, ModelConfig};
use crate::error::{ModelBuilderError, Result};
use crate::models::checkpoint::Checkpoint;
use crate::models::model_trait::{
    Loss, LossCreator, ModelCreator, ModelWrapper, Network, Optimizer, OptimizerCreator,
};

/// Wrapper for PyTorch-style models assembled from a model, an optimizer and
/// a loss creator.
pub struct PytorchModel {
    name: String,
    model_creator: ModelCreator,
    optimizer_creator: OptimizerCreator,
    loss_creator: LossCreator,
    network: Option<Box<dyn Network>>,
    optimizer: Option<Box<dyn Optimizer>>,
    loss: Option<Box<dyn Loss>>,
    config: Option<ModelConfig>,
}

impl PytorchModel {
    pub fn new<M, O, L>(model_creator: M, optimizer_creator: O, loss_creator: L) -> Self
    where
        M: Fn(&ModelConfig) -> anyhow::Result<Box<dyn Network>> + Send + Sync + 'static,
        O: Fn(&dyn Network, &ModelConfig) -> anyhow::Result<Box<dyn Optimizer>>
            + Send
            + Sync
            + 'static,
        L: Fn(&ModelConfig) -> anyhow::Result<Box<dyn Loss>> + Send + Sync + 'static,
    {
        Self::from_creators(
            Arc::new(model_creator),
            Arc::new(optimizer_creator),
            Arc::new(loss_creator),
        )
    }

    pub fn from_creators(
        model_creator: ModelCreator,
        optimizer_creator: OptimizerCreator,
        loss_creator: LossCreator,
    ) -> Self {
        PytorchModel {
            name: "PytorchModel".to_string(),
            model_creator,
            optimizer_creator,
            loss_creator,
            network: None,
            optimizer: None,
            loss: None,
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

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }

    pub fn loss(&self) -> Option<&dyn Loss> {
        self.loss.as_deref()
    }

    /// Loss of the current predictions for `x` against `y`.
    pub fn evaluate(&self, x: &Array2<f32>, y: &Array2<f32>) -> Result<f32> {
        let prediction = self.predict(x)?;
        let loss = self
            .loss
            .as_ref()
            .ok_or_else(|| ModelBuilderError::NotBuilt(self.name.clone()))?;
        Ok(loss.compute(&prediction, y)?)
    }

    /// Run the three creators without touching `self`.
    fn create(
        &self,
        config: &ModelConfig,
    ) -> Result<(Box<dyn Network>, Box<dyn Optimizer>, Box<dyn Loss>)> {
        let network = (self.model_creator)(config)?;
        let optimizer = (self.optimizer_creator)(network.as_ref(), config)?;
        let loss = (self.loss_creator)(config)?;
        debug!(
            "Built {} with {} parameters, optimizer {}, loss {}",
            self.name,
            network.num_parameters(),
            optimizer.name(),
            loss.name()
        );
        Ok((network, optimizer, loss))
    }

    fn built_network(&self) -> Result<&dyn Network> {
        self.network
            .as_deref()
            .ok_or_else(|| ModelBuilderError::NotBuilt(self.name.clone()))
    }
}

impl ModelWrapper for PytorchModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> Backend {
        Backend::PyTorch
    }

    fn build(&mut self, config: &ModelConfig) -> Result<()> {
        let (network, optimizer, loss) = self.create(config)?;
        self.network = Some(network);
        self.optimizer = Some(optimizer);
        self.loss = Some(loss);
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
        let checkpoint = Checkpoint {
            backend: Backend::PyTorch,
            config,
            model_state: network.state_dict(),
            optimizer_state: self.optimizer.as_ref().map(|o| o.state_dict()),
        };
        checkpoint.write(path)?;
        info!("Saved {} checkpoint to {:?}", self.name, path);
        Ok(())
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint::read(path)?;
        checkpoint.ensure_backend(Backend::PyTorch)?;

        // Nothing is assigned until every state dict has loaded.
        let (mut network, mut optimizer, loss) = self.create(&checkpoint.config)?;
        network.load_state_dict(&checkpoint.model_state)?;
        if let Some(state) = checkpoint.optimizer_state.as_ref() {
            optimizer.load_state_dict(state)?;
        }

        self.network = Some(network);
        self.optimizer = Some(optimizer);
        self.loss = Some(loss);
        self.config = Some(checkpoint.config);
        info!("Restored {} from {:?}", self.name, path);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::linear::{linear_model_creator, mse_loss_creator, sgd_optimizer_creator};
    use ndarray::array;

    fn linear_model() -> PytorchModel {
        PytorchModel::new(linear_model_creator, sgd_optimizer_creator, mse_loss_creator)
    }

    #[test]
    fn test_unbuilt_model_refuses_work() {
        let dir = tempfile::tempdir().unwrap();
        let model = linear_model();
        assert!(!model.is_built());
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(ModelBuilderError::NotBuilt(_))
        ));
        assert!(matches!(
            model.save(&dir.path().join("m.ckpt")),
            Err(ModelBuilderError::NotBuilt(_))
        ));
    }

    #[test]
    fn test_build_creates_network_optimizer_and_loss() {
        let mut model = linear_model().with_name("Linear");
        let config = ModelConfig::new().with_param("input_dim", 2).with_param("lr", 0.1);
        model.build(&config).unwrap();

        assert!(model.is_built());
        assert_eq!(model.name(), "Linear");
        assert_eq!(model.config(), Some(&config));
        assert_eq!(model.optimizer().map(|o| o.learning_rate()), Some(0.1));
        assert_eq!(model.loss().map(|l| l.name()), Some("mse"));

        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = model.predict(&x).unwrap();
        assert_eq!(y.dim(), (2, 1));
        assert_eq!(model.evaluate(&x, &y).unwrap(), 0.0);
    }

    #[test]
    fn test_save_then_restore_reproduces_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear.ckpt");

        let config = ModelConfig::new()
            .with_param("input_dim", 3)
            .with_param("seed", 11)
            .with_param("lr", 0.25);
        let mut model = linear_model();
        model.build(&config).unwrap();
        model.save(&path).unwrap();

        let mut restored = linear_model();
        restored.restore(&path).unwrap();

        let x = array![[0.5, -1.0, 2.0]];
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
        assert_eq!(restored.config(), Some(&config));
        assert_eq!(
            restored.optimizer().map(|o| o.state_dict()),
            model.optimizer().map(|o| o.state_dict())
        );
        assert_eq!(restored.optimizer().map(|o| o.learning_rate()), Some(0.25));
    }

    #[test]
    fn test_failed_restore_keeps_previous_model() {
        use crate::models::model_trait::StateDict;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ckpt");

        let mut model_state = StateDict::new();
        model_state.insert("weight".to_string(), vec![1.0; 3]);
        model_state.insert("bias".to_string(), vec![0.0]);
        Checkpoint {
            backend: Backend::PyTorch,
            config: ModelConfig::new().with_param("input_dim", 9),
            model_state,
            optimizer_state: None,
        }
        .write(&path)
        .unwrap();

        let config = ModelConfig::new().with_param("input_dim", 2).with_param("seed", 4);
        let mut model = linear_model();
        model.build(&config).unwrap();
        let x = array![[1.0, -2.0]];
        let before = model.predict(&x).unwrap();

        assert!(matches!(
            model.restore(&path),
            Err(ModelBuilderError::Collaborator(_))
        ));
        assert!(model.is_built());
        assert_eq!(model.config(), Some(&config));
        assert_eq!(model.predict(&x).unwrap(), before);
    }
}
