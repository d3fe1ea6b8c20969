use std::path::PathBuf;

use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

use crate::config::ModelConfig;
use crate::error::{Result, VaeError};
use crate::rnn::BiLstm;

/// Draws `z = mean + exp(0.5 * log_var) * eps` with fresh standard-normal
/// noise on every call. The noise is a constant for gradient purposes, so
/// the draw stays differentiable in `mean` and `log_var`.
pub fn reparameterize<B: Backend>(mean: Tensor<B, 2>, log_var: Tensor<B, 2>) -> Tensor<B, 2> {
    let std = (log_var * 0.5).exp();
    let noise = Tensor::random_like(&std, Distribution::Normal(0.0, 1.0));
    mean + noise * std
}

/// Closed-form KL divergence of `Normal(mean, exp(log_var))` against a
/// standard normal prior, averaged over batch and latent dimensions.
pub fn kl_divergence<B: Backend>(mean: Tensor<B, 2>, log_var: Tensor<B, 2>) -> Tensor<B, 1> {
    (Tensor::ones_like(&log_var) + log_var.clone() - mean.powf_scalar(2.0) - log_var.exp())
        .mean()
        .mul_scalar(-0.5)
}

/// Mean squared error over batch and timesteps, scaled by the sequence
/// length. The scaling upweights reconstruction fidelity against the KL
/// term and is part of the training objective, not an implementation detail.
pub fn reconstruction_loss<B: Backend>(
    input: Tensor<B, 3>,
    reconstruction: Tensor<B, 3>,
) -> Tensor<B, 1> {
    let timesteps = input.dims()[1];
    let input_flat: Tensor<B, 2> = input.flatten(1, 2);
    let reconstruction_flat: Tensor<B, 2> = reconstruction.flatten(1, 2);
    MseLoss::new()
        .forward(reconstruction_flat, input_flat, Reduction::Mean)
        .mul_scalar(timesteps as f64)
}

fn check_shape(expected: Vec<usize>, found: Vec<usize>) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(VaeError::ShapeMismatch { expected, found })
    }
}

/// Maps a `[n, timesteps, 1]` sequence to a latent pair.
///
/// A bidirectional LSTM summarizes the sequence into the concatenated final
/// hidden states of both directions, dropout regularizes the summary, and a
/// tanh bottleneck feeds two parallel softplus heads for mean and
/// log-variance. The softplus constrains the log-variance to be
/// non-negative; that is reproduced as-is rather than replaced with the
/// conventional unconstrained head.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    recurrent: BiLstm<B>,
    dropout: Dropout,
    bottleneck: Linear<B>,
    z_mean: Linear<B>,
    z_log_var: Linear<B>,
    timesteps: usize,
    latent_dim: usize,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        Self {
            recurrent: BiLstm::new(1, config.intermediate_dim, device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            bottleneck: LinearConfig::new(2 * config.intermediate_dim, config.latent_dim)
                .init(device),
            z_mean: LinearConfig::new(config.latent_dim, config.latent_dim).init(device),
            z_log_var: LinearConfig::new(config.latent_dim, config.latent_dim).init(device),
            timesteps: config.timesteps,
            latent_dim: config.latent_dim,
        }
    }

    /// Returns `(mean, log_var)`, each `[n, latent_dim]`. Fails fast on
    /// anything but a `[n, timesteps, 1]` input.
    pub fn forward(&self, input: Tensor<B, 3>) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let [n, timesteps, channels] = input.dims();
        check_shape(vec![n, self.timesteps, 1], vec![n, timesteps, channels])?;

        let summary = self.recurrent.summary(input);
        let summary = self.dropout.forward(summary);
        let encoded = activation::tanh(self.bottleneck.forward(summary));

        let mean = activation::softplus(self.z_mean.forward(encoded.clone()), 1.0);
        let log_var = activation::softplus(self.z_log_var.forward(encoded), 1.0);
        Ok((mean, log_var))
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}

/// Reconstructs a `[n, timesteps, 1]` sequence from a latent vector.
///
/// A dense expansion widens the latent vector to one feature row per
/// timestep, a bidirectional LSTM runs over the expanded sequence returning
/// all hidden states, and a per-timestep dense projection with shared
/// weights maps each state down to one unbounded output value.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    expand: Linear<B>,
    dropout: Dropout,
    recurrent: BiLstm<B>,
    output: Linear<B>,
    timesteps: usize,
    expand_channels: usize,
    latent_dim: usize,
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        Self {
            expand: LinearConfig::new(
                config.latent_dim,
                config.timesteps * config.expand_channels,
            )
            .init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            recurrent: BiLstm::new(config.expand_channels, config.intermediate_dim, device),
            output: LinearConfig::new(2 * config.intermediate_dim, 1).init(device),
            timesteps: config.timesteps,
            expand_channels: config.expand_channels,
            latent_dim: config.latent_dim,
        }
    }

    /// Fails fast when the latent dimensionality does not match.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Result<Tensor<B, 3>> {
        let [n, latent_dim] = latent.dims();
        check_shape(vec![n, self.latent_dim], vec![n, latent_dim])?;

        let expanded = activation::tanh(self.expand.forward(latent));
        let expanded = expanded.reshape([n, self.timesteps, self.expand_channels]);
        let expanded = self.dropout.forward(expanded);
        let sequence = self.recurrent.forward(expanded);
        Ok(self.output.forward(sequence))
    }
}

/// One forward pass through the full model.
#[derive(Debug, Clone)]
pub struct VaeOutput<B: Backend> {
    pub reconstruction: Tensor<B, 3>,
    pub mean: Tensor<B, 2>,
    pub log_var: Tensor<B, 2>,
    pub z: Tensor<B, 2>,
}

/// The three scalar loss terms of one batch.
#[derive(Debug, Clone)]
pub struct VaeLosses<B: Backend> {
    pub total: Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
    pub kl: Tensor<B, 1>,
}

/// Encoder and decoder composed end to end.
#[derive(Module, Debug)]
pub struct Vae<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

impl<B: Backend> Vae<B> {
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        Self {
            encoder: Encoder::new(config, device),
            decoder: Decoder::new(config, device),
        }
    }

    /// Returns `(mean, log_var, z)` with a fresh latent draw.
    pub fn encode(
        &self,
        input: Tensor<B, 3>,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>)> {
        let (mean, log_var) = self.encoder.forward(input)?;
        let z = reparameterize(mean.clone(), log_var.clone());
        Ok((mean, log_var, z))
    }

    pub fn forward(&self, input: Tensor<B, 3>) -> Result<VaeOutput<B>> {
        let (mean, log_var, z) = self.encode(input)?;
        let reconstruction = self.decoder.forward(z.clone())?;
        Ok(VaeOutput {
            reconstruction,
            mean,
            log_var,
            z,
        })
    }

    /// Loss decomposition for one batch: length-scaled reconstruction error
    /// plus the KL divergence against the standard normal prior.
    pub fn losses(input: Tensor<B, 3>, output: &VaeOutput<B>) -> VaeLosses<B> {
        let reconstruction = reconstruction_loss(input, output.reconstruction.clone());
        let kl = kl_divergence(output.mean.clone(), output.log_var.clone());
        let total = reconstruction.clone() + kl.clone();
        VaeLosses {
            total,
            reconstruction,
            kl,
        }
    }

    /// L2 penalty on the two bottleneck-adjacent dense kernels, scaled by
    /// the regularizer rate. Added to the optimized objective only; the
    /// reported loss terms stay unpenalized.
    pub fn weight_penalty(&self, rate: f64) -> Tensor<B, 1> {
        let bottleneck = self.encoder.bottleneck.weight.val().powf_scalar(2.0).sum();
        let expand = self.decoder.expand.weight.val().powf_scalar(2.0).sum();
        (bottleneck + expand).mul_scalar(rate)
    }
}

pub fn save_model<B: Backend>(model: &Vae<B>, path: impl Into<PathBuf>) -> Result<()> {
    let recorder = CompactRecorder::new();
    recorder.record(model.clone().into_record(), path.into())?;
    Ok(())
}

pub fn load_model<B: Backend>(
    config: &ModelConfig,
    path: impl Into<PathBuf>,
    device: &B::Device,
) -> Result<Vae<B>> {
    let recorder = CompactRecorder::new();
    let record = recorder.load(path.into(), device)?;
    Ok(Vae::new(config, device).load_record(record))
}
