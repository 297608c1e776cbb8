use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};

use super::super::linear::LinearModel;
use super::super::ClassifierError;
use crate::config::ClassifierSettings;
use crate::vectorizer::FeatureMatrix;

/// Training options for batch logistic regression.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f32,
    pub l2: f32,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions::from(&ClassifierSettings::default())
    }
}

impl From<&ClassifierSettings> for TrainOptions {
    fn from(settings: &ClassifierSettings) -> Self {
        Self {
            epochs: settings.logreg_epochs,
            learning_rate: settings.logreg_learning_rate,
            l2: settings.logreg_l2,
            batch_size: settings.logreg_batch_size,
            seed: settings.seed,
        }
    }
}

/// Fit a fresh model over the whole training set.
///
/// Rows are shuffled per epoch with a seeded RNG, so identical inputs and
/// options always produce identical weights.
pub fn train_logreg(
    classes: &[String],
    x: &FeatureMatrix,
    y: &[usize],
    options: &TrainOptions,
) -> Result<LinearModel, ClassifierError> {
    if x.n_rows() == 0 || y.is_empty() {
        return Err(ClassifierError::EmptyTrainingSet);
    }
    let mut model = LinearModel::zeros(classes, x.n_features())?;
    let binary = model.is_binary();
    let n_rows = model.weights.nrows();
    let rows: Vec<_> = x.rows().collect();

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let l2 = options.l2.max(0.0);
    let mut grad_w = Array2::<f32>::zeros(model.weights.raw_dim());
    let mut grad_b = Array1::<f32>::zeros(n_rows);

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            grad_w.fill(0.0);
            grad_b.fill(0.0);
            for &idx in chunk {
                let row = &rows[idx];
                let label = y[idx];
                let diffs: Vec<f32> = if binary {
                    let target = if label == 1 { 1.0 } else { 0.0 };
                    vec![sigmoid(model.score(0, row)) - target]
                } else {
                    softmax(&model.scores(row))
                        .into_iter()
                        .enumerate()
                        .map(|(k, p)| p - if k == label { 1.0 } else { 0.0 })
                        .collect()
                };
                for (k, diff) in diffs.into_iter().enumerate() {
                    let mut grad_row = grad_w.row_mut(k);
                    for (col, value) in row.iter() {
                        grad_row[col] += diff * value;
                    }
                    grad_b[k] += diff;
                }
            }
            let inv = 1.0 / chunk.len() as f32;
            model
                .weights
                .zip_mut_with(&grad_w, |w, g| *w -= lr * (g * inv + l2 * *w));
            model
                .intercept
                .zip_mut_with(&grad_b, |b, g| *b -= lr * g * inv);
        }
    }
    Ok(model)
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
