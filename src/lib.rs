//! Variational autoencoder for fixed-length ECG time series.
//!
//! A bidirectional-LSTM encoder compresses each 140-sample heartbeat into a
//! low-dimensional latent pair (mean, log-variance), a stochastic
//! reparameterized draw feeds a recurrent decoder that reconstructs the
//! sequence, and a randomized hyperparameter search scores configurations by
//! cross-validated reconstruction error. Training runs on the `burn`
//! framework's ndarray backend with autodiff.

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod report;
pub mod rnn;
pub mod search;
pub mod trainer;

pub use config::{ModelConfig, OptimizerKind, RunContext, TrainConfig};
pub use data::{EcgDataset, RECORD_COLUMNS, SIGNAL_LEN};
pub use error::{Result, VaeError};
pub use model::{
    kl_divergence, load_model, reconstruction_loss, reparameterize, save_model, Decoder, Encoder,
    Vae, VaeLosses, VaeOutput,
};
pub use search::{
    random_search, BestFit, Candidate, SearchConfig, SearchOutcome, SearchSpace, TrialResult,
};
pub use trainer::{
    encode_dataset, evaluate, reconstruction_mse, EncodedSet, EpochRecord, FitOutcome,
    LossSummary, Trainer,
};
