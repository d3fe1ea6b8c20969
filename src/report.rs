use std::fmt::Display;
use std::fs::File;
use std::path::Path;

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_reduction::Pca;
use ndarray::Array2;
use plotters::prelude::*;
use tracing::info;

use crate::error::{Result, VaeError};
use crate::search::TrialResult;
use crate::trainer::EpochRecord;

fn chart_err(err: impl Display) -> VaeError {
    VaeError::Chart(err.to_string())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> VaeError + '_ {
    move |source| VaeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes one row per sample, one column per value, no header.
fn write_rows_csv(path: &Path, rows: &[Vec<f32>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

pub fn export_latents(path: impl AsRef<Path>, latents: &[Vec<f32>]) -> Result<()> {
    write_rows_csv(path.as_ref(), latents)
}

pub fn export_reconstructions(path: impl AsRef<Path>, reconstructions: &[Vec<f32>]) -> Result<()> {
    write_rows_csv(path.as_ref(), reconstructions)
}

pub fn write_history(path: impl AsRef<Path>, history: &[EpochRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_err(path))?;
    serde_json::to_writer_pretty(file, history)?;
    Ok(())
}

pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<EpochRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_err(path))?;
    Ok(serde_json::from_reader(file)?)
}

fn series_bounds(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for value in values {
        min = min.min(value);
        max = max.max(value);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min).abs() * 0.05).max(1e-3);
    (min - pad, max + pad)
}

/// Total vs reconstruction vs KL loss over epochs.
pub fn plot_losses(path: impl AsRef<Path>, history: &[EpochRecord]) -> Result<()> {
    let path = path.as_ref();
    let (low, high) = series_bounds(
        history
            .iter()
            .flat_map(|r| [r.loss, r.reconstruction_loss, r.kl_loss]),
    );

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss vs. Reconstruction Loss vs. KL Divergence", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..history.len().max(1) as i32, low..high)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Epoch")
        .draw()
        .map_err(chart_err)?;

    let curves: [(&str, &RGBColor, fn(&EpochRecord) -> f32); 3] = [
        ("Loss", &RED, |r| r.loss),
        ("Reconstruction Loss", &BLUE, |r| r.reconstruction_loss),
        ("KL Divergence", &GREEN, |r| r.kl_loss),
    ];
    for (label, color, pick) in curves {
        chart
            .draw_series(LineSeries::new(
                history.iter().enumerate().map(|(i, r)| (i as i32, pick(r))),
                color,
            ))
            .map_err(chart_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;
    Ok(())
}

/// Training loss against the held-out loss.
pub fn plot_validation(path: impl AsRef<Path>, history: &[EpochRecord]) -> Result<()> {
    let path = path.as_ref();
    let (low, high) = series_bounds(
        history
            .iter()
            .flat_map(|r| [Some(r.loss), r.val_loss])
            .flatten(),
    );

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss vs. Validation Loss", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..history.len().max(1) as i32, low..high)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Epoch")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            history.iter().enumerate().map(|(i, r)| (i as i32, r.loss)),
            &RED,
        ))
        .map_err(chart_err)?
        .label("Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(
            history
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.val_loss.map(|v| (i as i32, v))),
            &BLUE,
        ))
        .map_err(chart_err)?
        .label("Validation Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;
    Ok(())
}

/// Standardizes the latent codes, projects them onto the two leading
/// principal components, and scatters them colored by class label. Returns
/// the explained-variance ratios of the two components.
pub fn plot_latent_pca(
    path: impl AsRef<Path>,
    latents: &[Vec<f32>],
    labels: &[i64],
) -> Result<Vec<f64>> {
    let path = path.as_ref();
    if latents.len() != labels.len() {
        return Err(VaeError::Projection(format!(
            "{} latent rows for {} labels",
            latents.len(),
            labels.len()
        )));
    }
    let n = latents.len();
    let d = latents.first().map(Vec::len).unwrap_or(0);
    if n < 2 || d < 2 {
        return Err(VaeError::Projection(format!(
            "need at least 2 samples and 2 latent dimensions, got {n}x{d}"
        )));
    }

    let mut matrix = Array2::<f64>::zeros((n, d));
    for (i, row) in latents.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            matrix[[i, j]] = value as f64;
        }
    }
    // Standardize columns before projecting.
    for j in 0..d {
        let mut column = matrix.column_mut(j);
        let mean = column.mean().unwrap_or(0.0);
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = if var > 0.0 { var.sqrt() } else { 1.0 };
        column.mapv_inplace(|v| (v - mean) / std);
    }

    let dataset = DatasetBase::from(matrix.clone());
    let pca = Pca::params(2)
        .fit(&dataset)
        .map_err(|err| VaeError::Projection(err.to_string()))?;
    let ratio = pca.explained_variance_ratio().to_vec();
    let projected: Array2<f64> = pca.predict(&matrix);

    let (x_low, x_high) = series_bounds(projected.column(0).iter().map(|&v| v as f32));
    let (y_low, y_high) = series_bounds(projected.column(1).iter().map(|&v| v as f32));

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Principal Component Analysis of Latent Space",
            ("sans-serif", 20),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_low..x_high, y_low..y_high)
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Principal Component 1")
        .y_desc("Principal Component 2")
        .draw()
        .map_err(chart_err)?;

    let mut classes: Vec<i64> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    for (class_idx, &class) in classes.iter().enumerate() {
        let color = Palette99::pick(class_idx).mix(0.7);
        chart
            .draw_series(
                labels
                    .iter()
                    .zip(projected.rows())
                    .filter(|(&label, _)| label == class)
                    .map(|(_, row)| Circle::new((row[0] as f32, row[1] as f32), 3, color.filled())),
            )
            .map_err(chart_err)?
            .label(format!("class {class}"))
            .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;

    info!(
        "latent PCA explained variance ratios: {:?}",
        ratio
    );
    Ok(ratio)
}

/// 2x3 grid of input-vs-reconstruction overlays over samples spread evenly
/// through the set.
pub fn plot_overlays(
    path: impl AsRef<Path>,
    originals: &[Vec<f32>],
    decoded: &[Vec<f32>],
) -> Result<()> {
    let path = path.as_ref();
    if originals.is_empty() || originals.len() != decoded.len() {
        return Err(VaeError::Chart(format!(
            "{} originals for {} reconstructions",
            originals.len(),
            decoded.len()
        )));
    }

    let root = BitMapBackend::new(path, (1300, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let panels = root.split_evenly((2, 3));

    for (panel_idx, panel) in panels.iter().enumerate() {
        let sample = panel_idx * originals.len() / panels.len();
        let original = &originals[sample];
        let reconstruction = &decoded[sample];
        let (low, high) = series_bounds(
            original
                .iter()
                .chain(reconstruction.iter())
                .copied(),
        );

        let mut chart = ChartBuilder::on(panel)
            .caption(format!("Sample {sample}"), ("sans-serif", 15))
            .margin(8)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(0..original.len() as i32, low..high)
            .map_err(chart_err)?;
        chart
            .configure_mesh()
            .x_desc("Time Steps")
            .draw()
            .map_err(chart_err)?;
        chart
            .draw_series(LineSeries::new(
                original.iter().enumerate().map(|(i, &v)| (i as i32, v)),
                &RED,
            ))
            .map_err(chart_err)?
            .label("original")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
        chart
            .draw_series(LineSeries::new(
                reconstruction
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| (i as i32, v)),
                &BLUE,
            ))
            .map_err(chart_err)?
            .label("decoded")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;
    }
    root.present().map_err(chart_err)?;
    Ok(())
}

/// Bar chart of mean cross-validation scores, one bar per ranked trial.
/// Failed trials have no bar.
pub fn plot_search_scores(path: impl AsRef<Path>, trials: &[TrialResult]) -> Result<()> {
    let path = path.as_ref();
    let max_score = trials
        .iter()
        .filter_map(|t| t.mean_score)
        .fold(0.0f64, f64::max);

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Score of each parameter combination", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            -0.5f64..trials.len() as f64 - 0.5,
            0.0f64..(max_score * 1.1).max(1e-6),
        )
        .map_err(chart_err)?;
    chart
        .configure_mesh()
        .x_desc("Candidate")
        .y_desc("Mean MSE")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(trials.iter().enumerate().filter_map(|(i, trial)| {
            trial.mean_score.map(|score| {
                Rectangle::new(
                    [(i as f64 - 0.4, 0.0), (i as f64 + 0.4, score)],
                    BLUE.mix(0.6).filled(),
                )
            })
        }))
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;
    Ok(())
}

fn escape_latex(text: &str) -> String {
    text.replace('_', "\\_")
}

/// Ranked search results as a LaTeX table.
pub fn latex_table(trials: &[TrialResult], folds: usize) -> String {
    let mut out = String::new();
    out.push_str("\\begin{table}\n\\centering\n");
    out.push_str(&format!(
        "\\caption[Randomized Search Results]{{Results of {} candidates using a cross-validation of {}}}\n",
        trials.len(),
        folds
    ));
    out.push_str("\\label{table:1}\n");
    out.push_str("\\begin{tabular}{lrrrrr}\n\\toprule\n");
    out.push_str(
        "score & optimizer & batch\\_size & dropout\\_rate & regularizer\\_rate & learn\\_rate \\\\\n",
    );
    out.push_str("\\midrule\n");
    for trial in trials {
        let score = match trial.mean_score {
            Some(score) => format!("{score:.6}"),
            None => "--".to_string(),
        };
        out.push_str(&format!(
            "{} & {} & {} & {:.4} & {:.1e} & {:.4} \\\\\n",
            score,
            escape_latex(&trial.candidate.optimizer),
            trial.candidate.batch_size,
            trial.candidate.dropout_rate,
            trial.candidate.regularizer_rate,
            trial.candidate.learn_rate
        ));
    }
    out.push_str("\\bottomrule\n\\end{tabular}\n\\end{table}\n");
    out
}

pub fn write_search_table(
    path: impl AsRef<Path>,
    trials: &[TrialResult],
    folds: usize,
) -> Result<()> {
    let path: &Path = path.as_ref();
    std::fs::write(path, latex_table(trials, folds)).map_err(io_err(path))
}

/// Serializes the ranked trials for machine consumption alongside the
/// LaTeX table.
pub fn write_search_json(path: impl AsRef<Path>, trials: &[TrialResult]) -> Result<()> {
    let path: &Path = path.as_ref();
    let file = File::create(path).map_err(io_err(path))?;
    serde_json::to_writer_pretty(file, trials)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Candidate;

    fn trial(score: Option<f64>) -> TrialResult {
        TrialResult {
            candidate: Candidate {
                optimizer: "adam".into(),
                batch_size: 16,
                dropout_rate: 0.2,
                regularizer_rate: 0.004,
                learn_rate: 0.01,
            },
            fold_scores: score.map(|s| vec![s]).unwrap_or_default(),
            mean_score: score,
            error: score.is_none().then(|| "unknown optimizer".to_string()),
        }
    }

    #[test]
    fn latex_table_lists_every_trial() {
        let table = latex_table(&[trial(Some(0.25)), trial(None)], 5);
        assert!(table.contains("\\begin{tabular}"));
        assert!(table.contains("cross-validation of 5"));
        assert!(table.contains("0.250000"));
        assert!(table.contains("--"));
        assert!(table.contains("batch\\_size"));
    }

    #[test]
    fn history_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = vec![EpochRecord {
            loss: 1.5,
            reconstruction_loss: 1.25,
            kl_loss: 0.25,
            val_loss: Some(1.75),
        }];
        write_history(&path, &history).unwrap();
        let restored = read_history(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert!((restored[0].loss - 1.5).abs() < 1e-6);
        assert_eq!(restored[0].val_loss, Some(1.75));
    }
}
