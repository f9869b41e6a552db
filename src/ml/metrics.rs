//! Training history and evaluation metrics for the classifier.

use serde::{Deserialize, Serialize};

/// Metrics reported at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub loss: f32,
    pub val_loss: f32,
    /// Fraction of correctly classified training examples.
    pub accuracy: f32,
    /// Fraction of correctly classified held-out examples.
    pub val_accuracy: f32,
}

impl EpochMetrics {
    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Loss => self.loss,
            Metric::ValLoss => self.val_loss,
            Metric::Accuracy => self.accuracy,
            Metric::ValAccuracy => self.val_accuracy,
        }
    }
}

/// Names of the per-epoch series, as shown in charts and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Loss,
    ValLoss,
    Accuracy,
    ValAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Loss,
        Metric::ValLoss,
        Metric::Accuracy,
        Metric::ValAccuracy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Loss => "loss",
            Metric::ValLoss => "val_loss",
            Metric::Accuracy => "accuracy",
            Metric::ValAccuracy => "val_accuracy",
        }
    }
}

/// Per-epoch metric series of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Values of one metric across epochs, oldest first.
    pub fn series(&self, metric: Metric) -> Vec<f32> {
        self.epochs.iter().map(|epoch| epoch.get(metric)).collect()
    }
}

#[derive(Debug, Clone)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&v| v as u64).sum()
    }
}

#[derive(Debug, Clone)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    (0..k)
        .map(|class_idx| {
            let tp = cm.get(class_idx, class_idx) as f32;
            let support: u32 = (0..k).map(|j| cm.get(class_idx, j)).sum();
            let predicted: u32 = (0..k).map(|i| cm.get(i, class_idx)).sum();
            let fn_ = support as f32 - tp;
            let fp = predicted as f32 - tp;
            PerClassStats {
                precision: if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) },
                recall: if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) },
                support,
            }
        })
        .collect()
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct: u64 = (0..cm.n_classes).map(|c| cm.get(c, c) as u64).sum();
    correct as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_and_recall_from_counts() {
        let mut cm = ConfusionMatrix::new(3);
        for _ in 0..4 {
            cm.add(0, 0);
        }
        cm.add(0, 1);
        cm.add(1, 1);
        cm.add(2, 1);
        cm.add(7, 0);

        let stats = precision_recall_by_class(&cm);
        assert_eq!(stats[0].support, 5);
        assert!((stats[0].precision - 1.0).abs() < 1e-6);
        assert!((stats[0].recall - 0.8).abs() < 1e-6);
        assert!((stats[1].precision - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(stats[2].recall, 0.0);
        assert!((accuracy(&cm) - 5.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn empty_matrix_has_zero_accuracy() {
        assert_eq!(accuracy(&ConfusionMatrix::new(10)), 0.0);
    }

    #[test]
    fn history_series_follow_epoch_order() {
        let mut history = TrainingHistory::default();
        for epoch in 1..=3 {
            history.push(EpochMetrics {
                epoch,
                loss: 1.0 / epoch as f32,
                val_loss: 2.0 / epoch as f32,
                accuracy: 0.1 * epoch as f32,
                val_accuracy: 0.05 * epoch as f32,
            });
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.series(Metric::Loss), vec![1.0, 0.5, 1.0 / 3.0]);
        assert_eq!(history.last().map(|m| m.epoch), Some(3));
        let names: Vec<_> = Metric::ALL.iter().map(Metric::name).collect();
        assert_eq!(names, ["loss", "val_loss", "accuracy", "val_accuracy"]);
    }
}
