use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::{Backend, ModelConfig};
use crate::error::{ModelBuilderError, Result};
use crate::models::model_trait::StateDict;

/// On-disk snapshot of a built wrapper.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub backend: Backend,
    pub config: ModelConfig,
    pub model_state: StateDict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer_state: Option<StateDict>,
}

impl Checkpoint {
    /// JSON has no encoding for NaN or infinity, so such state is rejected
    /// before anything is written.
    pub fn write(&self, path: &Path) -> Result<()> {
        self.ensure_finite()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        debug!("Wrote {} checkpoint to {:?}", self.backend, path);
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
        debug!("Read {} checkpoint from {:?}", checkpoint.backend, path);
        Ok(checkpoint)
    }

    fn ensure_finite(&self) -> Result<()> {
        let model = self.model_state.iter().map(|(k, v)| (k.clone(), v));
        let optimizer = self
            .optimizer_state
            .iter()
            .flatten()
            .map(|(k, v)| (format!("optimizer.{}", k), v));
        for (key, values) in model.chain(optimizer) {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ModelBuilderError::NonFiniteState(key));
            }
        }
        Ok(())
    }

    pub fn ensure_backend(&self, expected: Backend) -> Result<()> {
        if self.backend != expected {
            return Err(ModelBuilderError::BackendMismatch {
                expected,
                found: self.backend,
            });
        }
        Ok(())
    }
}
