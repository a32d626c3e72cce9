use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ModelBuilderError, Result};

/// Deep-learning framework families a model wrapper can target.
///
/// Deserialization goes through `FromStr`, so JSON accepts the same
/// case-insensitive tags and aliases as `str::parse`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "String")]
pub enum Backend {
    #[default]
    #[serde(rename = "pytorch")]
    PyTorch,
    #[serde(rename = "tf.keras")]
    Keras,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::PyTorch, Backend::Keras];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::PyTorch => "pytorch",
            Backend::Keras => "tf.keras",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ModelBuilderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pytorch" | "torch" => Ok(Backend::PyTorch),
            "tf.keras" | "keras" => Ok(Backend::Keras),
            _ => Err(ModelBuilderError::UnknownBackend(s.to_string())),
        }
    }
}

impl TryFrom<String> for Backend {
    type Error = ModelBuilderError;

    fn try_from(tag: String) -> std::result::Result<Self, Self::Error> {
        tag.parse()
    }
}

/// Configuration handed to `build`.
///
/// `model` and `dev_option` are only consulted when the builder resolves the
/// model by name; every other key is a hyper-parameter read by the creators.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_option: Option<Backend>,

    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config that names a registered model.
    pub fn for_model(model: &str, dev_option: Backend) -> Self {
        Self {
            model: Some(model.to_string()),
            dev_option: Some(dev_option),
            params: HashMap::new(),
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Parse a JSON config. A `dev_option` string that names no backend is
    /// reported as `UnknownBackend` rather than a serialization error.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        if let Some(tag) = value.get("dev_option").and_then(Value::as_str) {
            tag.parse::<Backend>()?;
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Set one config entry. `model` and `dev_option` go to their own fields
    /// and are validated; every other key is a hyper-parameter.
    pub fn set_param<V: Into<Value>>(&mut self, key: &str, value: V) -> Result<()> {
        let value = value.into();
        match key {
            "model" => match value {
                Value::String(name) => self.model = Some(name),
                Value::Null => self.model = None,
                other => {
                    return Err(ModelBuilderError::InvalidConfigValue {
                        key: key.to_string(),
                        reason: format!("expected a model name, got {}", other),
                    })
                }
            },
            "dev_option" => match value {
                Value::String(tag) => self.dev_option = Some(tag.parse()?),
                Value::Null => self.dev_option = None,
                other => {
                    return Err(ModelBuilderError::InvalidConfigValue {
                        key: key.to_string(),
                        reason: format!("expected a backend tag, got {}", other),
                    })
                }
            },
            _ => {
                self.params.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Builder-style `set_param`; an invalid `model`/`dev_option` value is
    /// logged and skipped.
    pub fn with_param<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        if let Err(e) = self.set_param(key, value) {
            warn!("Ignoring config entry `{}`: {}", key, e);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }
}
