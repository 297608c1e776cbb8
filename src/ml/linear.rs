use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sprs::CsVecView;

use super::ClassifierError;
use crate::vectorizer::{FeatureMatrix, sparse_dot};

/// Numeric parameters of a linear classifier, the only persisted form.
///
/// Binary models carry one coefficient row whose positive side is
/// `classes[1]`; models with more classes carry one row per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub classes: Vec<String>,
    pub n_features: usize,
    pub coef: Vec<Vec<f32>>,
    pub intercept: Vec<f32>,
}

/// Dense weights plus class list; shared by all classifier kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    classes: Vec<String>,
    pub(super) weights: Array2<f32>,
    pub(super) intercept: Array1<f32>,
}

impl LinearModel {
    /// Zero-initialized model for `classes` over `n_features` columns.
    pub fn zeros(classes: &[String], n_features: usize) -> Result<Self, ClassifierError> {
        if classes.len() < 2 {
            return Err(ClassifierError::TooFewClasses(classes.len()));
        }
        let rows = weight_rows(classes.len());
        Ok(Self {
            classes: classes.to_vec(),
            weights: Array2::zeros((rows, n_features)),
            intercept: Array1::zeros(rows),
        })
    }

    pub fn from_params(params: LinearParams) -> Result<Self, ClassifierError> {
        if params.classes.len() < 2 {
            return Err(ClassifierError::TooFewClasses(params.classes.len()));
        }
        let rows = weight_rows(params.classes.len());
        if params.coef.len() != rows || params.intercept.len() != rows {
            return Err(ClassifierError::InvalidParams(format!(
                "expected {rows} coefficient rows for {} classes",
                params.classes.len()
            )));
        }
        if params.coef.iter().any(|row| row.len() != params.n_features) {
            return Err(ClassifierError::InvalidParams(
                "coefficient row length mismatch".to_string(),
            ));
        }
        let flat: Vec<f32> = params.coef.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, params.n_features), flat)
            .map_err(|err| ClassifierError::InvalidParams(err.to_string()))?;
        Ok(Self {
            classes: params.classes,
            weights,
            intercept: Array1::from_vec(params.intercept),
        })
    }

    pub fn to_params(&self) -> LinearParams {
        LinearParams {
            classes: self.classes.clone(),
            n_features: self.n_features(),
            coef: self.weights.outer_iter().map(|row| row.to_vec()).collect(),
            intercept: self.intercept.to_vec(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    pub fn is_binary(&self) -> bool {
        self.classes.len() == 2
    }

    pub(super) fn check_width(&self, x: &FeatureMatrix) -> Result<(), ClassifierError> {
        if x.n_features() != self.n_features() {
            return Err(ClassifierError::Shape {
                expected: self.n_features(),
                actual: x.n_features(),
            });
        }
        Ok(())
    }

    /// Raw score of weight row `k` for one sample.
    pub(super) fn score(&self, k: usize, row: &CsVecView<'_, f32>) -> f32 {
        let weights = self.weights.row(k);
        sparse_dot(row, |col| weights.get(col).copied()) + self.intercept[k]
    }

    pub(super) fn scores(&self, row: &CsVecView<'_, f32>) -> Vec<f32> {
        (0..self.weights.nrows()).map(|k| self.score(k, row)).collect()
    }

    /// `weights[k] += step * row`, `intercept[k] += step`.
    pub(super) fn add_scaled(&mut self, k: usize, row: &CsVecView<'_, f32>, step: f32) {
        let mut weights = self.weights.row_mut(k);
        for (col, value) in row.iter() {
            if let Some(weight) = weights.get_mut(col) {
                *weight += step * value;
            }
        }
        self.intercept[k] += step;
    }

    pub fn decision_function(&self, x: &FeatureMatrix) -> Result<Vec<f32>, ClassifierError> {
        if !self.is_binary() {
            return Err(ClassifierError::InvalidParams(
                "decision scores are only defined for binary models".to_string(),
            ));
        }
        self.check_width(x)?;
        Ok(x.rows().map(|row| self.score(0, &row)).collect())
    }

    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<usize>, ClassifierError> {
        self.check_width(x)?;
        Ok(x.rows()
            .map(|row| {
                if self.is_binary() {
                    usize::from(self.score(0, &row) > 0.0)
                } else {
                    argmax(&self.scores(&row))
                }
            })
            .collect())
    }
}

fn weight_rows(n_classes: usize) -> usize {
    if n_classes == 2 { 1 } else { n_classes }
}

pub(super) fn argmax(values: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &value) in values.iter().enumerate() {
        if value > best_val {
            best_val = value;
            best = idx;
        }
    }
    best
}
