use std::cmp::Ordering;
use std::collections::HashSet;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ModelConfig, TrainConfig};
use crate::data::EcgDataset;
use crate::error::{Result, VaeError};
use crate::model::Vae;
use crate::trainer::{reconstruction_mse, Trainer};

/// The sampled hyperparameter axes. Optimizer names stay strings so an
/// unsupported name fails its trial instead of being unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    pub optimizers: Vec<String>,
    pub batch_sizes: Vec<usize>,
    pub dropout_rates: Vec<f64>,
    pub regularizer_rates: Vec<f64>,
    pub learn_rates: Vec<f64>,
}

impl Default for SearchSpace {
    /// Powers of two for the batch size, evenly spaced dropout rates, and
    /// log-spaced regularizer and learning rates.
    fn default() -> Self {
        Self {
            optimizers: vec!["adam".into(), "sgd".into()],
            batch_sizes: Array1::<f64>::logspace(2.0, 0.0, 6.0, 7)
                .iter()
                .map(|v| v.round() as usize)
                .collect(),
            dropout_rates: Array1::linspace(0.0, 1.0, 50).to_vec(),
            regularizer_rates: Array1::logspace(10.0, -6.0, -1.0, 6).to_vec(),
            learn_rates: Array1::logspace(10.0, 0.005f64.log10(), 0.5f64.log10(), 100).to_vec(),
        }
    }
}

impl SearchSpace {
    pub fn combinations(&self) -> usize {
        self.optimizers.len()
            * self.batch_sizes.len()
            * self.dropout_rates.len()
            * self.regularizer_rates.len()
            * self.learn_rates.len()
    }
}

/// One sampled configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub optimizer: String,
    pub batch_size: usize,
    pub dropout_rate: f64,
    pub regularizer_rate: f64,
    pub learn_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of configurations to sample.
    pub n_iter: usize,
    /// Cross-validation folds per configuration.
    pub folds: usize,
    /// Epoch budget of each fold fit.
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 10,
            folds: 5,
            epochs: 10,
            seed: 1,
        }
    }
}

/// Outcome of one configuration: fold scores and their mean, or the error
/// that failed the trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub candidate: Candidate,
    pub fold_scores: Vec<f64>,
    pub mean_score: Option<f64>,
    pub error: Option<String>,
}

pub struct BestFit<B: AutodiffBackend> {
    pub candidate: Candidate,
    pub model: Vae<B>,
}

/// Trials ranked by ascending mean score, failures last, plus the best
/// configuration refit on the full training set.
pub struct SearchOutcome<B: AutodiffBackend> {
    pub trials: Vec<TrialResult>,
    pub best: Option<BestFit<B>>,
}

/// Draws `n_iter` distinct combinations from the space, seeded. A request
/// larger than the space is clamped to exhaustive.
fn sample_candidates(space: &SearchSpace, n_iter: usize, rng: &mut StdRng) -> Vec<Candidate> {
    let total = space.combinations();
    let n = if n_iter > total {
        warn!("requested {n_iter} trials from a space of {total} combinations, clamping");
        total
    } else {
        n_iter
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(n);
    while candidates.len() < n {
        let pick = (
            rng.gen_range(0..space.optimizers.len()),
            rng.gen_range(0..space.batch_sizes.len()),
            rng.gen_range(0..space.dropout_rates.len()),
            rng.gen_range(0..space.regularizer_rates.len()),
            rng.gen_range(0..space.learn_rates.len()),
        );
        if !seen.insert(pick) {
            continue;
        }
        candidates.push(Candidate {
            optimizer: space.optimizers[pick.0].clone(),
            batch_size: space.batch_sizes[pick.1],
            dropout_rate: space.dropout_rates[pick.2],
            regularizer_rate: space.regularizer_rates[pick.3],
            learn_rate: space.learn_rates[pick.4],
        });
    }
    candidates
}

fn trial_configs(
    base: &ModelConfig,
    candidate: &Candidate,
    config: &SearchConfig,
) -> (ModelConfig, TrainConfig) {
    let model_config = base
        .clone()
        .with_dropout_rate(candidate.dropout_rate)
        .with_regularizer_rate(candidate.regularizer_rate);
    let train_config = TrainConfig {
        optimizer: candidate.optimizer.clone(),
        learn_rate: candidate.learn_rate,
        batch_size: candidate.batch_size,
        epochs: config.epochs,
    };
    (model_config, train_config)
}

/// Trains a fresh model per fold and scores mean squared reconstruction
/// error on the held-out fold.
fn run_trial<B: AutodiffBackend>(
    data: &EcgDataset,
    base: &ModelConfig,
    candidate: &Candidate,
    config: &SearchConfig,
    device: &B::Device,
) -> Result<Vec<f64>> {
    let (model_config, train_config) = trial_configs(base, candidate, config);
    let mut scores = Vec::with_capacity(config.folds);
    for (fold, (train, held)) in data.kfold(config.folds)?.into_iter().enumerate() {
        let trainer = Trainer::<B>::new(
            model_config.clone(),
            train_config.clone(),
            config.seed,
            device.clone(),
        );
        let outcome = trainer.fit(&train, None)?;
        let score = reconstruction_mse(
            &outcome.model.valid(),
            &held,
            candidate.batch_size,
            device,
        )?;
        if !score.is_finite() {
            return Err(VaeError::NonFiniteScore { fold });
        }
        scores.push(score);
    }
    Ok(scores)
}

/// Randomized hyperparameter search with k-fold cross-validation. Trials
/// are sequential and independent: each fold fit gets a freshly initialized
/// model and its own data partition, and a failing configuration is
/// recorded without aborting the remaining trials.
pub fn random_search<B: AutodiffBackend>(
    data: &EcgDataset,
    base: &ModelConfig,
    space: &SearchSpace,
    config: &SearchConfig,
    device: &B::Device,
) -> Result<SearchOutcome<B>> {
    if config.n_iter == 0 {
        return Err(VaeError::Config("n_iter must be non-zero".into()));
    }
    if space.combinations() == 0 {
        return Err(VaeError::Config("empty hyperparameter space".into()));
    }
    // Surface an unusable fold count before burning any trials on it.
    data.kfold(config.folds)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let candidates = sample_candidates(space, config.n_iter, &mut rng);
    let total = candidates.len();

    let mut trials = Vec::with_capacity(total);
    for (idx, candidate) in candidates.into_iter().enumerate() {
        info!(
            "trial {}/{}: optimizer={} batch_size={} dropout={:.3} regularizer={:.1e} lr={:.4}",
            idx + 1,
            total,
            candidate.optimizer,
            candidate.batch_size,
            candidate.dropout_rate,
            candidate.regularizer_rate,
            candidate.learn_rate
        );
        match run_trial::<B>(data, base, &candidate, config, device) {
            Ok(fold_scores) => {
                let mean = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                info!("trial {}: mean mse {mean:.6}", idx + 1);
                trials.push(TrialResult {
                    candidate,
                    fold_scores,
                    mean_score: Some(mean),
                    error: None,
                });
            }
            Err(err) => {
                warn!("trial {} failed: {err}", idx + 1);
                trials.push(TrialResult {
                    candidate,
                    fold_scores: Vec::new(),
                    mean_score: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    trials.sort_by(|a, b| match (a.mean_score, b.mean_score) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let best = match trials.first() {
        Some(trial) if trial.mean_score.is_some() => {
            let candidate = trial.candidate.clone();
            info!(
                "refitting best configuration on the full training set: {candidate:?}"
            );
            let (model_config, train_config) = trial_configs(base, &candidate, config);
            let trainer =
                Trainer::<B>::new(model_config, train_config, config.seed, device.clone());
            let outcome = trainer.fit(data, None)?;
            Some(BestFit {
                candidate,
                model: outcome.model,
            })
        }
        _ => None,
    };

    Ok(SearchOutcome { trials, best })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_space_matches_reference_grids() {
        let space = SearchSpace::default();
        assert_eq!(space.batch_sizes, vec![1, 2, 4, 8, 16, 32, 64]);
        assert_eq!(space.dropout_rates.len(), 50);
        assert_eq!(space.regularizer_rates.len(), 6);
        assert!((space.regularizer_rates[0] - 1e-6).abs() < 1e-12);
        assert!((space.regularizer_rates[5] - 1e-1).abs() < 1e-8);
        assert_eq!(space.learn_rates.len(), 100);
        assert!((space.learn_rates[0] - 0.005).abs() < 1e-9);
        assert!((space.learn_rates[99] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sampling_is_seeded_and_without_replacement() {
        let space = SearchSpace::default();
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(1);
        let a = sample_candidates(&space, 8, &mut rng_a);
        let b = sample_candidates(&space, 8, &mut rng_b);
        assert_eq!(a, b);
        for (i, left) in a.iter().enumerate() {
            for right in &a[i + 1..] {
                assert_ne!(left, right);
            }
        }
    }

    #[test]
    fn oversized_request_is_clamped_to_the_space() {
        let space = SearchSpace {
            optimizers: vec!["adam".into()],
            batch_sizes: vec![2, 4],
            dropout_rates: vec![0.1],
            regularizer_rates: vec![1e-3],
            learn_rates: vec![0.01],
        };
        let mut rng = StdRng::seed_from_u64(3);
        let candidates = sample_candidates(&space, 10, &mut rng);
        assert_eq!(candidates.len(), 2);
    }
}
