mod common;

use ecg_vae::report;
use ecg_vae::EpochRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn history() -> Vec<EpochRecord> {
    (0..5)
        .map(|epoch| EpochRecord {
            loss: 10.0 / (epoch + 1) as f32,
            reconstruction_loss: 9.0 / (epoch + 1) as f32,
            kl_loss: 1.0 / (epoch + 1) as f32,
            val_loss: Some(11.0 / (epoch + 1) as f32),
        })
        .collect()
}

fn assert_written(path: &std::path::Path) {
    let metadata = std::fs::metadata(path).unwrap_or_else(|_| panic!("{path:?} missing"));
    assert!(metadata.len() > 0, "{path:?} is empty");
}

#[test]
fn loss_charts_render_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let history = history();

    let loss = dir.path().join("loss.png");
    report::plot_losses(&loss, &history).unwrap();
    assert_written(&loss);

    let val = dir.path().join("val_loss.png");
    report::plot_validation(&val, &history).unwrap();
    assert_written(&val);
}

#[test]
fn latent_exports_and_pca_scatter_render() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    // Two loose clusters in a 4-dimensional latent space.
    let mut latents = Vec::new();
    let mut labels = Vec::new();
    for i in 0..30 {
        let center = if i % 2 == 0 { 1.5f32 } else { -1.5 };
        latents.push(
            (0..4)
                .map(|_| center + rng.gen_range(-0.3..0.3))
                .collect::<Vec<f32>>(),
        );
        labels.push((i % 2) as i64 + 1);
    }

    let csv = dir.path().join("latent_codes.csv");
    report::export_latents(&csv, &latents).unwrap();
    let contents = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(contents.lines().count(), 30);
    assert_eq!(contents.lines().next().unwrap().split(',').count(), 4);

    let pca = dir.path().join("latent_pca.png");
    let ratio = report::plot_latent_pca(&pca, &latents, &labels).unwrap();
    assert_written(&pca);
    assert_eq!(ratio.len(), 2);
    // The leading component carries the cluster separation.
    assert!(ratio[0] > 0.5, "explained variance ratios {ratio:?}");
}

#[test]
fn overlay_grid_renders_from_signal_rows() {
    let dir = tempfile::tempdir().unwrap();
    let data = common::synthetic_dataset(10, 9);
    let originals: Vec<Vec<f32>> = (0..data.len()).map(|i| data.signal(i).to_vec()).collect();
    // A deliberately imperfect "reconstruction": the same rows, damped.
    let decoded: Vec<Vec<f32>> = originals
        .iter()
        .map(|row| row.iter().map(|v| v * 0.8).collect())
        .collect();

    let path = dir.path().join("reconstruction_overlays.png");
    report::plot_overlays(&path, &originals, &decoded).unwrap();
    assert_written(&path);
}
