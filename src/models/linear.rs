use anyhow::{anyhow, bail, Context};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ModelConfig;
use crate::models::model_trait::{Loss, Network, Optimizer, StateDict};

const DEFAULT_LR: f64 = 0.001;

/// Single dense layer, `y = x W + b`.
#[derive(Debug, Clone)]
pub struct LinearNetwork {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearNetwork {
    /// Sizes come from `input_dim`/`output_dim`, weights are drawn uniformly
    /// from `[-1/sqrt(input_dim), 1/sqrt(input_dim))` with the config `seed`.
    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        let input_dim = config.get_usize("input_dim", 1);
        let output_dim = config.get_usize("output_dim", 1);
        if input_dim == 0 || output_dim == 0 {
            bail!(
                "Linear model needs positive dimensions, got input_dim={} output_dim={}",
                input_dim,
                output_dim
            );
        }

        let mut rng = StdRng::seed_from_u64(config.get_u64("seed", 0));
        let bound = 1.0 / (input_dim as f32).sqrt();
        let weight = Array2::from_shape_fn((input_dim, output_dim), |_| rng.gen_range(-bound..bound));
        let bias = Array1::from_shape_fn(output_dim, |_| rng.gen_range(-bound..bound));

        Ok(Self { weight, bias })
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }
}

fn load_tensor(state: &StateDict, key: &str, expected_len: usize) -> anyhow::Result<Vec<f32>> {
    let values = state
        .get(key)
        .ok_or_else(|| anyhow!("State dict has no entry `{}`", key))?;
    if values.len() != expected_len {
        bail!(
            "State dict entry `{}` has {} values, expected {}",
            key,
            values.len(),
            expected_len
        );
    }
    Ok(values.clone())
}

impl Network for LinearNetwork {
    fn forward(&self, x: &Array2<f32>) -> anyhow::Result<Array2<f32>> {
        if x.ncols() != self.input_dim() {
            bail!(
                "Input has {} features, model expects {}",
                x.ncols(),
                self.input_dim()
            );
        }
        let mut out = x.dot(&self.weight);
        out += &self.bias;
        Ok(out)
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("weight".to_string(), self.weight.iter().copied().collect());
        state.insert("bias".to_string(), self.bias.to_vec());
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> anyhow::Result<()> {
        let shape = self.weight.dim();
        let weight = load_tensor(state, "weight", shape.0 * shape.1)?;
        let bias = load_tensor(state, "bias", self.bias.len())?;
        self.weight = Array2::from_shape_vec(shape, weight).context("Failed to reshape weight")?;
        self.bias = Array1::from_vec(bias);
        Ok(())
    }
}

/// Plain SGD with optional momentum. Only its state is tracked here.
///
/// `lr` and `momentum` are hyper-parameters taken from the config; the state
/// dict carries the velocity buffers only.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    velocity: StateDict,
}

impl Sgd {
    pub fn new(network: &dyn Network, lr: f64, momentum: f64) -> Self {
        let velocity = network
            .state_dict()
            .into_iter()
            .map(|(name, values)| (name, vec![0.0; values.len()]))
            .collect();
        Self {
            lr,
            momentum,
            velocity,
        }
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn velocity(&self) -> &StateDict {
        &self.velocity
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &str {
        "sgd"
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn state_dict(&self) -> StateDict {
        self.velocity
            .iter()
            .map(|(name, values)| (format!("velocity.{}", name), values.clone()))
            .collect()
    }

    fn load_state_dict(&mut self, state: &StateDict) -> anyhow::Result<()> {
        let velocity = self
            .velocity
            .iter()
            .map(|(name, values)| {
                load_tensor(state, &format!("velocity.{}", name), values.len())
                    .map(|loaded| (name.clone(), loaded))
            })
            .collect::<anyhow::Result<StateDict>>()?;
        self.velocity = velocity;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl Loss for MseLoss {
    fn name(&self) -> &str {
        "mse"
    }

    fn compute(&self, prediction: &Array2<f32>, target: &Array2<f32>) -> anyhow::Result<f32> {
        if prediction.dim() != target.dim() {
            bail!(
                "Prediction shape {:?} does not match target shape {:?}",
                prediction.dim(),
                target.dim()
            );
        }
        let diff = prediction - target;
        Ok(diff.mapv(|d| d * d).mean().unwrap_or(0.0))
    }
}

pub fn linear_model_creator(config: &ModelConfig) -> anyhow::Result<Box<dyn Network>> {
    Ok(Box::new(LinearNetwork::from_config(config)?))
}

pub fn sgd_optimizer_creator(
    network: &dyn Network,
    config: &ModelConfig,
) -> anyhow::Result<Box<dyn Optimizer>> {
    let lr = config.get_f64("lr", DEFAULT_LR);
    let momentum = config.get_f64("momentum", 0.0);
    Ok(Box::new(Sgd::new(network, lr, momentum)))
}

pub fn mse_loss_creator(_config: &ModelConfig) -> anyhow::Result<Box<dyn Loss>> {
    Ok(Box::new(MseLoss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_forward_shape() {
        let config = ModelConfig::new()
            .with_param("input_dim", 3)
            .with_param("output_dim", 2);
        let network = LinearNetwork::from_config(&config).unwrap();

        let x = Array2::<f32>::ones((4, 3));
        let y = network.forward(&x).unwrap();
        assert_eq!(y.dim(), (4, 2));
        assert_eq!(network.num_parameters(), 3 * 2 + 2);

        let wrong = Array2::<f32>::ones((4, 5));
        assert!(network.forward(&wrong).is_err());
    }

    #[test]
    fn test_linear_seed_is_deterministic() {
        let config = ModelConfig::new().with_param("input_dim", 4).with_param("seed", 42);
        let a = LinearNetwork::from_config(&config).unwrap();
        let b = LinearNetwork::from_config(&config).unwrap();
        assert_eq!(a.state_dict(), b.state_dict());

        let other = LinearNetwork::from_config(&config.clone().with_param("seed", 43)).unwrap();
        assert_ne!(a.state_dict(), other.state_dict());
    }

    #[test]
    fn test_linear_load_state_dict_checks_sizes() {
        let config = ModelConfig::new().with_param("input_dim", 2);
        let mut network = LinearNetwork::from_config(&config).unwrap();

        let mut state = StateDict::new();
        state.insert("weight".to_string(), vec![2.0, 3.0]);
        state.insert("bias".to_string(), vec![1.0]);
        network.load_state_dict(&state).unwrap();
        let y = network.forward(&array![[1.0, 1.0]]).unwrap();
        assert_eq!(y, array![[6.0]]);

        state.insert("bias".to_string(), vec![1.0, 1.0]);
        assert!(network.load_state_dict(&state).is_err());
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        let config = ModelConfig::new().with_param("output_dim", 0);
        assert!(LinearNetwork::from_config(&config).is_err());
    }

    #[test]
    fn test_sgd_state_round_trip() {
        let config = ModelConfig::new().with_param("lr", 0.5).with_param("momentum", 0.9);
        let network = LinearNetwork::from_config(&config).unwrap();
        let optimizer = sgd_optimizer_creator(&network, &config).unwrap();
        assert_eq!(optimizer.learning_rate(), 0.5);

        let mut state = optimizer.state_dict();
        assert_eq!(
            state.keys().collect::<Vec<_>>(),
            vec!["velocity.bias", "velocity.weight"]
        );
        state.insert("velocity.bias".to_string(), vec![0.25]);

        let mut fresh = Sgd::new(&network, 0.1, 0.9);
        fresh.load_state_dict(&state).unwrap();
        assert_eq!(fresh.velocity()["bias"], vec![0.25]);
        assert_eq!(fresh.learning_rate(), 0.1);
        assert_eq!(fresh.momentum(), 0.9);

        state.remove("velocity.weight");
        assert!(fresh.load_state_dict(&state).is_err());
    }

    #[test]
    fn test_mse_loss() {
        let loss = MseLoss;
        let value = loss
            .compute(&array![[1.0, 2.0]], &array![[1.0, 4.0]])
            .unwrap();
        assert_eq!(value, 2.0);
        assert!(loss.compute(&array![[1.0]], &array![[1.0, 2.0]]).is_err());
    }
}
