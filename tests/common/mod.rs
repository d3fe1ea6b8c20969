#![allow(dead_code)]

use ecg_vae::{EcgDataset, ModelConfig, SIGNAL_LEN};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A model small enough for fast test fits, same topology as the default.
pub fn tiny_model_config() -> ModelConfig {
    ModelConfig {
        timesteps: SIGNAL_LEN,
        latent_dim: 3,
        intermediate_dim: 12,
        expand_channels: 4,
        dropout_rate: 0.1,
        regularizer_rate: 1e-4,
    }
}

/// Noisy offset sine waves, one of three phases per row, labels cycling
/// through the five observed classes.
pub fn synthetic_dataset(rows: usize, seed: u64) -> EcgDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<i64> = (0..rows).map(|i| (i % 5) as i64 + 1).collect();
    let signals: Vec<Vec<f32>> = (0..rows)
        .map(|i| {
            let phase = (i % 3) as f32 * 0.7;
            (0..SIGNAL_LEN)
                .map(|t| {
                    let angle = 2.0 * std::f32::consts::PI * t as f32 / SIGNAL_LEN as f32;
                    0.5 + 0.8 * (angle + phase).sin() + rng.gen_range(-0.05..0.05)
                })
                .collect()
        })
        .collect();
    EcgDataset::from_rows(labels, signals).expect("synthetic rows have the right arity")
}
