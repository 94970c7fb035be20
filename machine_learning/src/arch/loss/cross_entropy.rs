use ndarray::{Array2, ArrayView2, Axis, Zip};

use super::LossFn;
use crate::{MlErr, Result};

/// Softmax followed by the negative log likelihood, averaged over the batch.
///
/// `y_pred` holds raw scores (logits) and `y` one-hot encoded targets.
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Row-wise softmax, shifting each row by its maximum for stability.
    pub fn softmax(y_pred: ArrayView2<f32>) -> Array2<f32> {
        let mut out = y_pred.to_owned();

        for mut row in out.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
            row.mapv_inplace(|x| (x - max).exp());
            let sum = row.sum();
            row /= sum;
        }

        out
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.nrows().max(1) as f32;

        let total: f32 = Zip::from(y_pred.rows())
            .and(y.rows())
            .map_collect(|logits, target| {
                let max = logits.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
                let log_sum_exp = logits.mapv(|x| (x - max).exp()).sum().ln() + max;
                log_sum_exp * target.sum() - logits.dot(&target)
            })
            .sum();

        total / n
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.nrows().max(1) as f32;
        (Self::softmax(y_pred) - y) / n
    }
}

/// One-hot encodes `labels` into a `(labels.len(), classes)` matrix.
///
/// # Returns
/// An error if any label is not lower than `classes`.
pub fn one_hot(labels: &[usize], classes: usize) -> Result<Array2<f32>> {
    let mut out = Array2::zeros((labels.len(), classes));

    for (mut row, &label) in out.axis_iter_mut(Axis(0)).zip(labels) {
        if label >= classes {
            return Err(MlErr::LabelOutOfRange { label, classes });
        }

        row[label] = 1.;
    }

    Ok(out)
}
