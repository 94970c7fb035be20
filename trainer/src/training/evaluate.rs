use machine_learning::arch::{
    Model,
    loss::{LossFn, one_hot},
};
use ndarray::{ArrayView2, Axis};

use crate::{
    Result, TrainErr,
    data::{DataLoader, Dataset},
};

/// The outcome of scoring a model over a whole loader.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
    /// Mean loss over the batches.
    pub loss: f32,
}

impl Evaluation {
    /// Returns the top-1 accuracy as a percentage.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.;
        }

        100. * self.correct as f64 / self.total as f64
    }
}

/// Returns the index of the highest score of each row, the first one on ties.
pub fn argmax(scores: ArrayView2<f32>) -> Vec<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, max), (i, &x)| {
                    if x > max { (i, x) } else { (best, max) }
                })
                .0
        })
        .collect()
}

/// Scores `model` over every batch of `loader` without touching its parameters.
///
/// # Arguments
/// * `model` - The model to evaluate.
/// * `params` - The model's parameters.
/// * `loader` - The samples to score, walked from the start.
/// * `loss_fn` - The loss reported alongside the accuracy.
/// * `num_classes` - The amount of classes the model scores.
///
/// # Returns
/// The evaluation, or `EmptySplit` if the loader has no samples.
pub fn evaluate<M, L, D>(
    model: &mut M,
    params: &[f32],
    loader: &mut DataLoader<'_, D>,
    loss_fn: &L,
    num_classes: usize,
) -> Result<Evaluation>
where
    M: Model,
    L: LossFn,
    D: Dataset + ?Sized,
{
    loader.reset();

    let mut evaluation = Evaluation::default();
    let mut loss_sum = 0.;
    let mut batches = 0;

    while let Some(batch) = loader.next_batch()? {
        let scores = model.forward(params, batch.images.view())?;
        let y = one_hot(&batch.labels, num_classes)?;

        loss_sum += loss_fn.loss(scores.view(), y.view());
        batches += 1;

        evaluation.total += batch.len();
        evaluation.correct += argmax(scores.view())
            .into_iter()
            .zip(&batch.labels)
            .filter(|(predicted, label)| predicted == *label)
            .count();
    }

    loader.reset();

    if evaluation.total == 0 {
        return Err(TrainErr::EmptySplit("validation"));
    }

    evaluation.loss = loss_sum / batches as f32;
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn argmax_picks_the_first_maximum() {
        let scores = array![[0.1, 0.7, 0.7], [3., -1., 2.], [0., 0., 0.]];
        assert_eq!(argmax(scores.view()), [1, 0, 0]);
    }

    #[test]
    fn accuracy_is_a_percentage() {
        for (correct, total) in [(0, 7), (3, 7), (7, 7)] {
            let evaluation = Evaluation {
                correct,
                total,
                loss: 0.,
            };

            let accuracy = evaluation.accuracy();
            assert!((0. ..=100.).contains(&accuracy));
        }

        let half = Evaluation {
            correct: 5,
            total: 10,
            loss: 0.,
        };
        assert_eq!(half.accuracy(), 50.);
    }
}
