//! Model definition, training and inference.
//!
//! The network, its training loop and the single-image predictor are generic
//! over the `burn` backend; [`backend`] names the concrete CPU and GPU choices.

pub mod backend;
pub mod metrics;
pub mod model;
pub mod predict;
pub mod train;

pub use metrics::{
    ConfusionMatrix, EpochMetrics, Metric, PerClassStats, TrainingHistory, accuracy,
    precision_recall_by_class,
};
pub use model::{ConstructionError, FashionCnn, ModelConfig, build_default_model};
pub use predict::{CLASS_NAMES, FashionClass, PredictError, Prediction, predict, predict_pixels};
pub use train::{
    BatchProgress, CancelToken, LogListener, Trainer, TrainingConfig, TrainingError,
    TrainingListener, TrainingOutcome, evaluate, predict_classes,
};
