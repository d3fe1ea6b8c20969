use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::SIGNAL_LEN;
use crate::error::{Result, VaeError};

/// Architecture of the encoder/decoder pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Sequence length the model accepts.
    pub timesteps: usize,
    /// Dimensionality of the latent space.
    pub latent_dim: usize,
    /// Hidden size of each recurrent direction.
    pub intermediate_dim: usize,
    /// Per-timestep width of the decoder expansion.
    pub expand_channels: usize,
    /// Dropout probability applied after the recurrent summary (encoder)
    /// and after the expansion reshape (decoder).
    pub dropout_rate: f64,
    /// L2 penalty weight on the two bottleneck-adjacent dense kernels.
    pub regularizer_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            timesteps: SIGNAL_LEN,
            latent_dim: 5,
            intermediate_dim: 140,
            expand_channels: 256,
            dropout_rate: 0.2,
            regularizer_rate: 0.004,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timesteps == 0
            || self.latent_dim == 0
            || self.intermediate_dim == 0
            || self.expand_channels == 0
        {
            return Err(VaeError::Config(
                "model dimensions must be non-zero".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(VaeError::Config(format!(
                "dropout_rate {} outside [0, 1)",
                self.dropout_rate
            )));
        }
        if self.regularizer_rate < 0.0 {
            return Err(VaeError::Config(format!(
                "regularizer_rate {} is negative",
                self.regularizer_rate
            )));
        }
        Ok(())
    }

    pub fn with_dropout_rate(mut self, dropout_rate: f64) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    pub fn with_regularizer_rate(mut self, regularizer_rate: f64) -> Self {
        self.regularizer_rate = regularizer_rate;
        self
    }
}

/// Gradient-descent flavour used for the parameter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl OptimizerKind {
    /// Optimizer names stay strings up to this point so that a bad name
    /// surfaces as a per-trial failure rather than a type error.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            _ => Err(VaeError::UnknownOptimizer(name.to_string())),
        }
    }
}

/// Optimization schedule for one `Trainer::fit` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub optimizer: String,
    pub learn_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            optimizer: "adam".into(),
            learn_rate: 0.001,
            batch_size: 16,
            epochs: 100,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        OptimizerKind::parse(&self.optimizer)?;
        if self.batch_size == 0 {
            return Err(VaeError::Config("batch_size must be non-zero".into()));
        }
        if self.epochs == 0 {
            return Err(VaeError::Config("epochs must be non-zero".into()));
        }
        if !self.learn_rate.is_finite() || self.learn_rate <= 0.0 {
            return Err(VaeError::Config(format!(
                "learn_rate {} must be positive",
                self.learn_rate
            )));
        }
        Ok(())
    }
}

/// Explicit run-wide state: the seed every RNG derives from and the
/// directory all artifacts land in. Nothing here leaks across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub seed: u64,
    pub output_dir: PathBuf,
}

impl RunContext {
    pub fn new(seed: u64, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            seed,
            output_dir: output_dir.into(),
        }
    }

    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| VaeError::Io {
            path: self.output_dir.clone(),
            source,
        })
    }

    pub fn artifact(&self, name: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_config_is_valid() {
        ModelConfig::default().validate().unwrap();
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn dropout_outside_unit_interval_is_rejected() {
        let config = ModelConfig::default().with_dropout_rate(1.5);
        assert!(matches!(config.validate(), Err(VaeError::Config(_))));
    }

    #[test]
    fn optimizer_names_parse_case_insensitively() {
        assert_eq!(OptimizerKind::parse("SGD").unwrap(), OptimizerKind::Sgd);
        assert_eq!(OptimizerKind::parse("adam").unwrap(), OptimizerKind::Adam);
        assert!(matches!(
            OptimizerKind::parse("nadam"),
            Err(VaeError::UnknownOptimizer(_))
        ));
    }
}
