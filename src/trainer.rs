use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ModelConfig, OptimizerKind, TrainConfig};
use crate::data::EcgDataset;
use crate::error::{Result, VaeError};
use crate::model::{Vae, VaeOutput};

/// Scalar loss terms of one epoch. `val_loss` is present when a held-out
/// set was supplied to `fit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub loss: f32,
    pub reconstruction_loss: f32,
    pub kl_loss: f32,
    pub val_loss: Option<f32>,
}

/// Forward-only loss terms over a dataset.
#[derive(Debug, Clone, Copy)]
pub struct LossSummary {
    pub loss: f32,
    pub reconstruction_loss: f32,
    pub kl_loss: f32,
}

#[derive(Debug)]
pub struct FitOutcome<B: AutodiffBackend> {
    pub model: Vae<B>,
    pub history: Vec<EpochRecord>,
}

/// Runs gradient-based optimization of a fresh model over mini-batches for
/// a fixed epoch budget. Mini-batch order is one seeded permutation drawn
/// per `fit` call; parameters are mutated only by the optimizer step.
pub struct Trainer<B: AutodiffBackend> {
    model_config: ModelConfig,
    train_config: TrainConfig,
    seed: u64,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        model_config: ModelConfig,
        train_config: TrainConfig,
        seed: u64,
        device: B::Device,
    ) -> Self {
        Self {
            model_config,
            train_config,
            seed,
            device,
        }
    }

    pub fn fit(&self, train: &EcgDataset, val: Option<&EcgDataset>) -> Result<FitOutcome<B>> {
        self.model_config.validate()?;
        self.train_config.validate()?;
        if train.is_empty() {
            return Err(VaeError::Config("training set is empty".into()));
        }

        B::seed(self.seed);
        let model = Vae::new(&self.model_config, &self.device);

        match OptimizerKind::parse(&self.train_config.optimizer)? {
            OptimizerKind::Adam => self.run(model, AdamConfig::new().init(), train, val),
            OptimizerKind::Sgd => self.run(model, SgdConfig::new().init(), train, val),
        }
    }

    fn run<O>(
        &self,
        mut model: Vae<B>,
        mut optimizer: O,
        train: &EcgDataset,
        val: Option<&EcgDataset>,
    ) -> Result<FitOutcome<B>>
    where
        O: Optimizer<Vae<B>, B>,
    {
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);
        let batches: Vec<&[usize]> = order.chunks(self.train_config.batch_size).collect();

        let mut history = Vec::with_capacity(self.train_config.epochs);
        for epoch in 1..=self.train_config.epochs {
            let mut loss_sum = 0.0f64;
            let mut reconstruction_sum = 0.0f64;
            let mut kl_sum = 0.0f64;
            let mut seen = 0usize;

            for (batch_idx, rows) in batches.iter().enumerate() {
                let input = train.batch::<B>(rows, &self.device);
                let output = model.forward(input.clone())?;
                let losses = Vae::losses(input, &output);
                let objective = losses.total.clone()
                    + model.weight_penalty(self.model_config.regularizer_rate);

                let loss = losses.total.into_scalar().elem::<f32>();
                let reconstruction = losses.reconstruction.into_scalar().elem::<f32>();
                let kl = losses.kl.into_scalar().elem::<f32>();
                if !loss.is_finite() {
                    return Err(VaeError::NonFiniteLoss {
                        epoch,
                        batch: batch_idx,
                    });
                }

                let grads = objective.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.train_config.learn_rate, model, grads);

                let weight = rows.len() as f64;
                loss_sum += loss as f64 * weight;
                reconstruction_sum += reconstruction as f64 * weight;
                kl_sum += kl as f64 * weight;
                seen += rows.len();

                debug!(
                    "epoch {epoch} batch {}/{}: loss={loss:.4} recon={reconstruction:.4} kl={kl:.4}",
                    batch_idx + 1,
                    batches.len()
                );
            }

            let scale = seen as f64;
            let val_loss = match val {
                Some(val) => Some(
                    evaluate(
                        &model.valid(),
                        val,
                        self.train_config.batch_size,
                        &self.device,
                    )?
                    .loss,
                ),
                None => None,
            };
            let record = EpochRecord {
                loss: (loss_sum / scale) as f32,
                reconstruction_loss: (reconstruction_sum / scale) as f32,
                kl_loss: (kl_sum / scale) as f32,
                val_loss,
            };
            match record.val_loss {
                Some(val_loss) => info!(
                    "epoch {epoch}/{}: loss={:.4} recon={:.4} kl={:.4} val={val_loss:.4}",
                    self.train_config.epochs,
                    record.loss,
                    record.reconstruction_loss,
                    record.kl_loss
                ),
                None => info!(
                    "epoch {epoch}/{}: loss={:.4} recon={:.4} kl={:.4}",
                    self.train_config.epochs,
                    record.loss,
                    record.reconstruction_loss,
                    record.kl_loss
                ),
            }
            history.push(record);
        }

        Ok(FitOutcome { model, history })
    }
}

/// Forward passes over `data` without parameter updates, averaging the loss
/// terms weighted by batch size.
pub fn evaluate<B: Backend>(
    model: &Vae<B>,
    data: &EcgDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<LossSummary> {
    if data.is_empty() {
        return Err(VaeError::Config("evaluation set is empty".into()));
    }
    let rows: Vec<usize> = (0..data.len()).collect();
    let mut loss_sum = 0.0f64;
    let mut reconstruction_sum = 0.0f64;
    let mut kl_sum = 0.0f64;

    for batch in rows.chunks(batch_size) {
        let input = data.batch::<B>(batch, device);
        let output = model.forward(input.clone())?;
        let losses = Vae::losses(input, &output);
        let weight = batch.len() as f64;
        loss_sum += losses.total.into_scalar().elem::<f32>() as f64 * weight;
        reconstruction_sum +=
            losses.reconstruction.into_scalar().elem::<f32>() as f64 * weight;
        kl_sum += losses.kl.into_scalar().elem::<f32>() as f64 * weight;
    }

    let scale = data.len() as f64;
    Ok(LossSummary {
        loss: (loss_sum / scale) as f32,
        reconstruction_loss: (reconstruction_sum / scale) as f32,
        kl_loss: (kl_sum / scale) as f32,
    })
}

/// Plain mean squared reconstruction error over a dataset, unscaled. This
/// is the cross-validation score of the hyperparameter search.
pub fn reconstruction_mse<B: Backend>(
    model: &Vae<B>,
    data: &EcgDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<f64> {
    if data.is_empty() {
        return Err(VaeError::Config("scoring set is empty".into()));
    }
    let rows: Vec<usize> = (0..data.len()).collect();
    let mut sum = 0.0f64;
    for batch in rows.chunks(batch_size) {
        let input = data.batch::<B>(batch, device);
        let output = model.forward(input.clone())?;
        let mse = (output.reconstruction - input)
            .powf_scalar(2.0)
            .mean()
            .into_scalar()
            .elem::<f32>();
        sum += mse as f64 * batch.len() as f64;
    }
    Ok(sum / data.len() as f64)
}

/// Latent codes and reconstructions of every row, for export.
pub struct EncodedSet {
    pub latents: Vec<Vec<f32>>,
    pub reconstructions: Vec<Vec<f32>>,
}

pub fn encode_dataset<B: Backend>(
    model: &Vae<B>,
    data: &EcgDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<EncodedSet> {
    let latent_dim = model.encoder.latent_dim();
    let rows: Vec<usize> = (0..data.len()).collect();
    let mut latents = Vec::with_capacity(data.len());
    let mut reconstructions = Vec::with_capacity(data.len());

    for batch in rows.chunks(batch_size) {
        let input = data.batch::<B>(batch, device);
        let VaeOutput {
            reconstruction, z, ..
        } = model.forward(input)?;

        let z_values = z
            .to_data()
            .to_vec::<f32>()
            .map_err(|err| VaeError::Data(format!("{err:?}")))?;
        for row in z_values.chunks(latent_dim) {
            latents.push(row.to_vec());
        }

        let timesteps = reconstruction.dims()[1];
        let reconstruction_values = reconstruction
            .to_data()
            .to_vec::<f32>()
            .map_err(|err| VaeError::Data(format!("{err:?}")))?;
        for row in reconstruction_values.chunks(timesteps) {
            reconstructions.push(row.to_vec());
        }
    }

    Ok(EncodedSet {
        latents,
        reconstructions,
    })
}
