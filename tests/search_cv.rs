mod common;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use ecg_vae::{random_search, reconstruction_mse, SearchConfig, SearchSpace};

type TB = Autodiff<NdArray>;

fn singleton_space(optimizer: &str) -> SearchSpace {
    SearchSpace {
        optimizers: vec![optimizer.into()],
        batch_sizes: vec![4],
        dropout_rates: vec![0.1],
        regularizer_rates: vec![1e-4],
        learn_rates: vec![0.01],
    }
}

fn quick_config(n_iter: usize) -> SearchConfig {
    SearchConfig {
        n_iter,
        folds: 2,
        epochs: 1,
        seed: 1,
    }
}

#[test]
fn single_trial_two_fold_search_returns_one_ranked_row() {
    let device = NdArrayDevice::default();
    let data = common::synthetic_dataset(12, 1);
    let space = singleton_space("adam");

    let outcome = random_search::<TB>(
        &data,
        &common::tiny_model_config(),
        &space,
        &quick_config(1),
        &device,
    )
    .unwrap();

    assert_eq!(outcome.trials.len(), 1);
    let trial = &outcome.trials[0];
    assert_eq!(trial.fold_scores.len(), 2);
    let mean = trial.mean_score.expect("successful trial has a score");
    assert!(mean.is_finite());
    assert!(trial.error.is_none());

    let best = outcome.best.expect("best configuration is available");
    assert_eq!(best.candidate, trial.candidate);
    let score = reconstruction_mse(&best.model.valid(), &data, 4, &device).unwrap();
    assert!(score.is_finite());
}

#[test]
fn unsupported_optimizer_fails_the_trial_not_the_search() {
    let device = NdArrayDevice::default();
    let data = common::synthetic_dataset(12, 1);
    let space = singleton_space("nadam");

    let outcome = random_search::<TB>(
        &data,
        &common::tiny_model_config(),
        &space,
        &quick_config(1),
        &device,
    )
    .unwrap();

    assert_eq!(outcome.trials.len(), 1);
    let trial = &outcome.trials[0];
    assert!(trial.mean_score.is_none());
    let error = trial.error.as_deref().expect("failure is recorded");
    assert!(error.contains("unknown optimizer"), "error was {error:?}");
    assert!(outcome.best.is_none());
}

#[test]
fn search_continues_past_failing_configurations() {
    let device = NdArrayDevice::default();
    let data = common::synthetic_dataset(12, 1);
    let space = SearchSpace {
        optimizers: vec!["nadam".into(), "adam".into()],
        ..singleton_space("adam")
    };

    let outcome = random_search::<TB>(
        &data,
        &common::tiny_model_config(),
        &space,
        &quick_config(2),
        &device,
    )
    .unwrap();

    assert_eq!(outcome.trials.len(), 2);
    // Ranked output puts the successful trial first, the failure last.
    assert!(outcome.trials[0].mean_score.is_some());
    assert_eq!(outcome.trials[0].candidate.optimizer, "adam");
    assert!(outcome.trials[1].error.is_some());

    let best = outcome.best.expect("the surviving trial is refit");
    assert_eq!(best.candidate.optimizer, "adam");
}
