//! automl-model-builder: backend-aware construction of AutoML model wrappers.
//!
//! A [`builder::ModelBuilder`] picks a wrapper family (PyTorch-style or
//! tf.keras-style), an explicit factory, or a model registered by name, and
//! builds a fresh wrapper from a [`config::ModelConfig`] or restores one from a
//! checkpoint file.
pub mod builder;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod registry;

pub use builder::ModelBuilder;
pub use config::{Backend, ModelConfig};
pub use error::{ModelBuilderError, Result};
pub use models::model_trait::ModelWrapper;
pub use registry::{ModelFactory, ModelRegistry};
