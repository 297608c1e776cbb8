use super::{
    ClassifierError, ClassifierKind, LinearClassifier, LinearModel, LinearParams, check_labels,
};
use crate::vectorizer::{FeatureMatrix, squared_norm};

/// Passes over the data made by a from-scratch [`PassiveAggressive::fit`].
const FIT_EPOCHS: usize = 5;

/// Passive-aggressive (PA-I, hinge loss) classifier with one-vs-rest rows.
///
/// Each sample moves the weights just far enough to reach a unit margin,
/// capped by `c`. Updates are order-sensitive, so repeating a fit over the
/// same data generally changes the weights again.
#[derive(Debug, Clone)]
pub struct PassiveAggressive {
    classes: Vec<String>,
    c: f32,
    model: Option<LinearModel>,
}

impl PassiveAggressive {
    pub fn new(classes: Vec<String>, c: f32) -> Self {
        Self {
            classes,
            c,
            model: None,
        }
    }

    fn update(&mut self, x: &FeatureMatrix, y: &[usize]) -> Result<(), ClassifierError> {
        check_labels(x, y, self.classes.len())?;
        let model = match self.model.take() {
            Some(model) => model,
            None => LinearModel::zeros(&self.classes, x.n_features())?,
        };
        if let Err(err) = model.check_width(x) {
            self.model = Some(model);
            return Err(err);
        }
        let mut model = model;
        let binary = model.is_binary();
        for (row, &label) in x.rows().zip(y) {
            let norm = squared_norm(&row) + 1.0;
            let n_rows = if binary { 1 } else { self.classes.len() };
            for k in 0..n_rows {
                let positive = if binary { label == 1 } else { label == k };
                let target = if positive { 1.0 } else { -1.0 };
                let loss = (1.0 - target * model.score(k, &row)).max(0.0);
                if loss > 0.0 {
                    let tau = (loss / norm).min(self.c);
                    model.add_scaled(k, &row, tau * target);
                }
            }
        }
        self.model = Some(model);
        Ok(())
    }
}

impl LinearClassifier for PassiveAggressive {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::PassiveAggressive
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[usize]) -> Result<(), ClassifierError> {
        if x.n_rows() == 0 {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        self.model = None;
        for _ in 0..FIT_EPOCHS {
            self.update(x, y)?;
        }
        Ok(())
    }

    fn partial_fit(&mut self, x: &FeatureMatrix, y: &[usize]) -> Result<(), ClassifierError> {
        if x.n_rows() == 0 {
            return Ok(());
        }
        self.update(x, y)
    }

    fn clear(&mut self) {
        self.model = None;
    }

    fn model(&self) -> Option<&LinearModel> {
        self.model.as_ref()
    }

    fn load_params(&mut self, params: LinearParams) -> Result<(), ClassifierError> {
        if params.classes != self.classes {
            return Err(ClassifierError::ClassMismatch {
                stored: params.classes,
                expected: self.classes.clone(),
            });
        }
        self.model = Some(LinearModel::from_params(params)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::binary_classes;
    use std::collections::BTreeMap;

    fn one_hot(n_features: usize, rows: &[&[usize]]) -> FeatureMatrix {
        let rows: Vec<BTreeMap<usize, f32>> = rows
            .iter()
            .map(|cols| cols.iter().map(|&c| (c, 1.0)).collect())
            .collect();
        FeatureMatrix::from_rows(n_features, &rows)
    }

    #[test]
    fn single_positive_update_crosses_boundary() {
        let mut pa = PassiveAggressive::new(binary_classes(), 1.0);
        let x = one_hot(4, &[&[0, 2]]);
        pa.partial_fit(&x, &[1]).unwrap();
        let scores = pa.decision_function(&x).unwrap();
        assert!(scores[0] > 0.0);
        assert_eq!(pa.predict(&x).unwrap(), vec![1]);
    }

    #[test]
    fn incremental_updates_accumulate() {
        let mut pa = PassiveAggressive::new(binary_classes(), 1.0);
        let pos = one_hot(4, &[&[0]]);
        let neg = one_hot(4, &[&[3]]);
        pa.partial_fit(&pos, &[1]).unwrap();
        pa.partial_fit(&neg, &[0]).unwrap();
        assert_eq!(pa.predict(&pos).unwrap(), vec![1]);
        assert_eq!(pa.predict(&neg).unwrap(), vec![0]);
    }

    #[test]
    fn fit_replaces_previous_state() {
        let mut pa = PassiveAggressive::new(binary_classes(), 1.0);
        let x = one_hot(3, &[&[1]]);
        pa.partial_fit(&x, &[1]).unwrap();
        pa.fit(&x, &[0]).unwrap();
        assert_eq!(pa.predict(&x).unwrap(), vec![0]);
    }

    #[test]
    fn multiclass_rows_learn_each_class() {
        let classes = vec!["low".to_string(), "mid".into(), "high".into()];
        let mut pa = PassiveAggressive::new(classes, 1.0);
        let x = one_hot(3, &[&[0], &[1], &[2]]);
        pa.fit(&x, &[0, 1, 2]).unwrap();
        assert_eq!(pa.predict(&x).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn width_change_keeps_existing_model() {
        let mut pa = PassiveAggressive::new(binary_classes(), 1.0);
        pa.partial_fit(&one_hot(3, &[&[0]]), &[1]).unwrap();
        let before = pa.params();
        assert!(matches!(
            pa.partial_fit(&one_hot(5, &[&[0]]), &[1]),
            Err(ClassifierError::Shape { .. })
        ));
        assert_eq!(pa.params(), before);
    }

    #[test]
    fn params_for_other_classes_are_rejected() {
        let mut pa = PassiveAggressive::new(binary_classes(), 1.0);
        let other = LinearModel::zeros(&["x".to_string(), "y".to_string()], 2)
            .unwrap()
            .to_params();
        assert!(matches!(
            pa.load_params(other),
            Err(ClassifierError::ClassMismatch { .. })
        ));
    }
}
