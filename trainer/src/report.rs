use std::{fmt, time::Duration};

/// The summary of an experiment's iterations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    /// The validation accuracy of the best checkpoint of every iteration.
    pub accuracies: Vec<f64>,
    /// Training time summed over every epoch of every iteration.
    pub total_train_time: Duration,
    pub epochs_run: usize,
    pub end_to_end: Duration,
}

impl Report {
    /// Records the outcome of one iteration.
    pub fn record(&mut self, accuracy: f64, train_time: Duration, epochs_run: usize) {
        self.accuracies.push(accuracy);
        self.total_train_time += train_time;
        self.epochs_run += epochs_run;
    }

    /// The mean accuracy, NaN without iterations.
    pub fn mean(&self) -> f64 {
        self.accuracies.iter().sum::<f64>() / self.accuracies.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.accuracies.iter().copied().fold(f64::NAN, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.accuracies.iter().copied().fold(f64::NAN, f64::max)
    }

    /// The largest distance from the mean to either extreme.
    pub fn variation(&self) -> f64 {
        let mean = self.mean();
        (self.max() - mean).max(mean - self.min())
    }

    pub fn average_epoch_time(&self) -> Duration {
        match u32::try_from(self.epochs_run) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(epochs) => self.total_train_time / epochs,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n************************")?;
        writeln!(f, "Test SatCNN model with EuroSAT dataset")?;
        writeln!(f, "train and test finished")?;

        for (i, accuracy) in self.accuracies.iter().enumerate() {
            writeln!(f, "Iteration: {i}, Accuracy: {accuracy}%")?;
        }

        writeln!(
            f,
            "\nMean Accuracy: {}, Variation of Accuracy: {}",
            self.mean(),
            self.variation()
        )?;

        write!(
            f,
            "Total time: {} seconds, Average epoch time: {} seconds, End-to-end time: {} seconds",
            self.total_train_time.as_secs_f64(),
            self.average_epoch_time().as_secs_f64(),
            self.end_to_end.as_secs_f64()
        )
    }
}
