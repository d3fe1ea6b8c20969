use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Result, VaeError};

/// Samples per recording.
pub const SIGNAL_LEN: usize = 140;
/// Label column plus signal columns.
pub const RECORD_COLUMNS: usize = SIGNAL_LEN + 1;

/// In-memory ECG5000-style dataset: one class label and one fixed-length
/// signal per row. Signals are stored row-major in a single buffer.
#[derive(Debug, Clone)]
pub struct EcgDataset {
    labels: Vec<i64>,
    signals: Vec<f32>,
}

impl EcgDataset {
    /// Reads a whitespace-delimited text table with no header. Every row
    /// must carry exactly one label column and [`SIGNAL_LEN`] signal values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| VaeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut labels = Vec::new();
        let mut signals = Vec::new();
        for (idx, row) in raw.lines().enumerate() {
            if row.trim().is_empty() {
                continue;
            }
            let line = idx + 1;
            let fields: Vec<&str> = row.split_whitespace().collect();
            if fields.len() != RECORD_COLUMNS {
                return Err(VaeError::MalformedRecord {
                    line,
                    expected: RECORD_COLUMNS,
                    found: fields.len(),
                });
            }
            let parse = |field: &str| {
                field.parse::<f64>().map_err(|_| VaeError::InvalidField {
                    line,
                    field: field.to_string(),
                })
            };
            // The label column is numeric text like "1.0000000e+00".
            labels.push(parse(fields[0])? as i64);
            for field in &fields[1..] {
                signals.push(parse(field)? as f32);
            }
        }
        Ok(Self { labels, signals })
    }

    /// Builds a dataset from already-parsed rows, checking signal arity.
    pub fn from_rows(labels: Vec<i64>, rows: Vec<Vec<f32>>) -> Result<Self> {
        if labels.len() != rows.len() {
            return Err(VaeError::Config(format!(
                "{} labels for {} signal rows",
                labels.len(),
                rows.len()
            )));
        }
        let mut signals = Vec::with_capacity(rows.len() * SIGNAL_LEN);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != SIGNAL_LEN {
                return Err(VaeError::MalformedRecord {
                    line: idx + 1,
                    expected: SIGNAL_LEN,
                    found: row.len(),
                });
            }
            signals.extend_from_slice(row);
        }
        Ok(Self { labels, signals })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn signal(&self, row: usize) -> &[f32] {
        &self.signals[row * SIGNAL_LEN..(row + 1) * SIGNAL_LEN]
    }

    /// Rows gathered into a new dataset, in the given order.
    pub fn subset(&self, rows: &[usize]) -> Self {
        let mut labels = Vec::with_capacity(rows.len());
        let mut signals = Vec::with_capacity(rows.len() * SIGNAL_LEN);
        for &row in rows {
            labels.push(self.labels[row]);
            signals.extend_from_slice(self.signal(row));
        }
        Self { labels, signals }
    }

    /// Seeded shuffled split into train and held-out subsets.
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
            return Err(VaeError::Config(format!(
                "test_fraction {test_fraction} outside (0, 1)"
            )));
        }
        if self.len() < 2 {
            return Err(VaeError::Config("cannot split fewer than 2 rows".into()));
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let n_test = ((self.len() as f64) * test_fraction).ceil() as usize;
        let n_test = n_test.clamp(1, self.len() - 1);
        let (test_rows, train_rows) = order.split_at(n_test);
        Ok((self.subset(train_rows), self.subset(test_rows)))
    }

    /// Consecutive k-fold partitions: each element is (train, held-out).
    pub fn kfold(&self, k: usize) -> Result<Vec<(Self, Self)>> {
        if k < 2 {
            return Err(VaeError::Config(format!("k-fold needs k >= 2, got {k}")));
        }
        if k > self.len() {
            return Err(VaeError::Config(format!(
                "k-fold with k={k} on {} rows",
                self.len()
            )));
        }
        let rows: Vec<usize> = (0..self.len()).collect();
        let base = self.len() / k;
        let extra = self.len() % k;

        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for fold in 0..k {
            let size = base + usize::from(fold < extra);
            let held: Vec<usize> = rows[start..start + size].to_vec();
            let train: Vec<usize> = rows[..start]
                .iter()
                .chain(rows[start + size..].iter())
                .copied()
                .collect();
            folds.push((self.subset(&train), self.subset(&held)));
            start += size;
        }
        Ok(folds)
    }

    /// Rows stacked into a `[n, timesteps, 1]` batch on the given device.
    pub fn batch<B: Backend>(&self, rows: &[usize], device: &B::Device) -> Tensor<B, 3> {
        let mut flat = Vec::with_capacity(rows.len() * SIGNAL_LEN);
        for &row in rows {
            flat.extend_from_slice(self.signal(row));
        }
        Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([
            rows.len(),
            SIGNAL_LEN,
            1,
        ])
    }

    /// The whole dataset as one `[n, timesteps, 1]` tensor.
    pub fn tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        Tensor::<B, 1>::from_floats(self.signals.as_slice(), device).reshape([
            self.len(),
            SIGNAL_LEN,
            1,
        ])
    }

    /// Count of rows per class label, ascending by label.
    pub fn class_counts(&self) -> Vec<(i64, usize)> {
        let mut counts = std::collections::BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_insert(0usize) += 1;
        }
        counts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_rows(rows: &[Vec<f64>]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for row in rows {
            let line: Vec<String> = row.iter().map(|v| format!("{v:.7e}")).collect();
            writeln!(file, "{}", line.join(" ")).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn synthetic_row(label: f64, fill: f64) -> Vec<f64> {
        let mut row = vec![label];
        row.extend(std::iter::repeat(fill).take(SIGNAL_LEN));
        row
    }

    #[test]
    fn loads_well_formed_rows() {
        let file = write_rows(&[synthetic_row(1.0, 0.25), synthetic_row(2.0, -0.5)]);
        let data = EcgDataset::from_file(file.path()).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.labels(), &[1, 2]);
        assert!((data.signal(1)[0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_arity() {
        let mut short = synthetic_row(1.0, 0.0);
        short.pop();
        let file = write_rows(&[short]);
        let err = EcgDataset::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            VaeError::MalformedRecord {
                line: 1,
                expected: RECORD_COLUMNS,
                found
            } if found == RECORD_COLUMNS - 1
        ));
    }

    #[test]
    fn rejects_non_numeric_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut fields = vec!["1.0".to_string()];
        fields.extend(std::iter::repeat("0.5".to_string()).take(SIGNAL_LEN - 1));
        fields.push("heartbeat".to_string());
        writeln!(file, "{}", fields.join(" ")).unwrap();
        file.flush().unwrap();

        let err = EcgDataset::from_file(file.path()).unwrap_err();
        assert!(matches!(err, VaeError::InvalidField { line: 1, .. }));
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32; SIGNAL_LEN]).collect();
        let data = EcgDataset::from_rows((0..10).collect(), rows).unwrap();

        let (train_a, test_a) = data.split(0.2, 1).unwrap();
        let (train_b, test_b) = data.split(0.2, 1).unwrap();
        assert_eq!(train_a.labels(), train_b.labels());
        assert_eq!(test_a.labels(), test_b.labels());
        assert_eq!(train_a.len() + test_a.len(), data.len());
        assert_eq!(test_a.len(), 2);
        for label in test_a.labels() {
            assert!(!train_a.labels().contains(label));
        }
    }

    #[test]
    fn kfold_partitions_cover_every_row_once() {
        let rows: Vec<Vec<f32>> = (0..7).map(|i| vec![i as f32; SIGNAL_LEN]).collect();
        let data = EcgDataset::from_rows((0..7).collect(), rows).unwrap();

        let folds = data.kfold(3).unwrap();
        assert_eq!(folds.len(), 3);
        let mut held: Vec<i64> = folds
            .iter()
            .flat_map(|(_, test)| test.labels().to_vec())
            .collect();
        held.sort_unstable();
        assert_eq!(held, (0..7).collect::<Vec<_>>());
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), data.len());
        }
    }
}
