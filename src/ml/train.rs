//! Mini-batch training loop for [`FashionCnn`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use burn::{
    config::Config,
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{Int, Tensor, TensorData, backend::AutodiffBackend, backend::Backend},
};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;

use super::metrics::{EpochMetrics, TrainingHistory};
use super::model::FashionCnn;
use crate::dataset::{DataShapeError, DatasetError, DatasetProvider, TensorBatch};

/// Hyperparameters of a training run.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 10)]
    pub epochs: usize,
    #[config(default = 512)]
    pub batch_size: usize,
    /// Training examples requested from the provider.
    #[config(default = 6000)]
    pub train_size: usize,
    /// Held-out examples requested from the provider.
    #[config(default = 1000)]
    pub test_size: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Seed of the per-epoch example shuffle.
    #[config(default = 42)]
    pub seed: u64,
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Malformed training data: {0}")]
    DataShape(DataShapeError),
    #[error("Failed to load training data: {0}")]
    Dataset(DatasetError),
    #[error("Training cancelled after {completed_epochs} epochs")]
    Cancelled { completed_epochs: usize },
    #[error("Failed to read tensor data: {0}")]
    Tensor(String),
}

impl From<DataShapeError> for TrainingError {
    fn from(err: DataShapeError) -> Self {
        Self::DataShape(err)
    }
}

impl From<DatasetError> for TrainingError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Shape(err) => Self::DataShape(err),
            other => Self::Dataset(other),
        }
    }
}

/// Progress within the running epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    /// 1-based epoch number.
    pub epoch: usize,
    pub epochs: usize,
    /// 1-based mini-batch number within the epoch.
    pub batch: usize,
    pub batches: usize,
    pub loss: f32,
}

impl BatchProgress {
    /// Fraction of the whole run completed, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.epochs == 0 || self.batches == 0 {
            return 0.0;
        }
        let done = (self.epoch - 1) * self.batches + self.batch;
        done as f32 / (self.epochs * self.batches) as f32
    }
}

/// Observer of a training run.
pub trait TrainingListener: Send {
    fn on_batch_end(&mut self, _progress: &BatchProgress) {}
    fn on_epoch_end(&mut self, metrics: &EpochMetrics);
}

/// Writes epoch metrics to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl TrainingListener for LogListener {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics) {
        tracing::info!(
            "Epoch {}: loss {:.4}, val_loss {:.4}, accuracy {:.3}, val_accuracy {:.3}",
            metrics.epoch,
            metrics.loss,
            metrics.val_loss,
            metrics.accuracy,
            metrics.val_accuracy
        );
    }
}

/// Shared flag that stops a running trainer between mini-batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Trained weights and the metrics recorded along the way.
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: FashionCnn<B>,
    pub history: TrainingHistory,
}

pub struct Trainer<B: AutodiffBackend> {
    model: FashionCnn<B>,
    config: TrainingConfig,
    device: B::Device,
    listeners: Vec<Box<dyn TrainingListener>>,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: FashionCnn<B>, config: TrainingConfig, device: B::Device) -> Self {
        Self {
            model,
            config,
            device,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: impl TrainingListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn TrainingListener>) {
        self.listeners.push(listener);
    }

    /// Fetch one training and one held-out batch and fit the model for the
    /// configured number of epochs.
    pub fn train(
        mut self,
        provider: &mut dyn DatasetProvider,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome<B>, TrainingError> {
        let config = &self.config;
        let batch_size = config.batch_size.max(1);
        let train: TensorBatch<B> = {
            let batch = provider.next_train_batch(config.train_size)?;
            batch.expect_rows(config.train_size)?;
            batch.into_tensors(&self.device)
        };
        let valid: TensorBatch<B::InnerBackend> = {
            let batch = provider.next_test_batch(config.test_size)?;
            batch.expect_rows(config.test_size)?;
            batch.into_tensors(&self.device)
        };
        tracing::info!(
            "Training on {} examples ({} held out) for {} epochs, batch size {}",
            train.len(),
            valid.len(),
            config.epochs,
            batch_size
        );

        let mut optim: OptimizerAdaptor<Adam, FashionCnn<B>, B> = AdamConfig::new().init();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let batches = order.len().div_ceil(batch_size);
        let mut model = self.model;
        let mut history = TrainingHistory::default();

        for epoch in 1..=config.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0f64;
            let mut correct = 0.0f64;
            for (batch_idx, chunk) in order.chunks(batch_size).enumerate() {
                if cancel.is_cancelled() {
                    tracing::info!("Training cancelled during epoch {epoch}");
                    return Err(TrainingError::Cancelled {
                        completed_epochs: epoch - 1,
                    });
                }
                let indices = index_tensor::<B>(chunk, &self.device);
                let images = train.images.clone().select(0, indices.clone());
                let targets = train.targets.clone().select(0, indices);

                let logits = model.forward_logits(images);
                let loss = model.loss(logits.clone(), targets.clone());
                let batch_loss = read_scalar(loss.clone())?;
                let batch_correct = read_scalar(count_correct(logits, targets))?;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(config.learning_rate, model, grads);

                loss_sum += batch_loss as f64 * chunk.len() as f64;
                correct += batch_correct as f64;
                let progress = BatchProgress {
                    epoch,
                    epochs: config.epochs,
                    batch: batch_idx + 1,
                    batches,
                    loss: batch_loss,
                };
                for listener in self.listeners.iter_mut() {
                    listener.on_batch_end(&progress);
                }
            }

            let (val_loss, val_accuracy) = evaluate(&model.valid(), &valid, batch_size)?;
            let seen = order.len().max(1) as f64;
            let metrics = EpochMetrics {
                epoch,
                loss: (loss_sum / seen) as f32,
                val_loss,
                accuracy: (correct / seen) as f32,
                val_accuracy,
            };
            history.push(metrics);
            for listener in self.listeners.iter_mut() {
                listener.on_epoch_end(&metrics);
            }
        }

        Ok(TrainingOutcome { model, history })
    }
}

/// Mean loss and accuracy of `model` over `batch`, evaluated in chunks.
pub fn evaluate<B: Backend>(
    model: &FashionCnn<B>,
    batch: &TensorBatch<B>,
    chunk: usize,
) -> Result<(f32, f32), TrainingError> {
    let total = batch.len();
    if total == 0 {
        return Ok((0.0, 0.0));
    }
    let chunk = chunk.max(1);
    let mut loss_sum = 0.0f64;
    let mut correct = 0.0f64;
    let mut start = 0;
    while start < total {
        let len = chunk.min(total - start);
        let images = batch.images.clone().narrow(0, start, len);
        let targets = batch.targets.clone().narrow(0, start, len);
        let logits = model.forward_logits(images);
        loss_sum += read_scalar(model.loss(logits.clone(), targets.clone()))? as f64 * len as f64;
        correct += read_scalar(count_correct(logits, targets))? as f64;
        start += len;
    }
    Ok(((loss_sum / total as f64) as f32, (correct / total as f64) as f32))
}

/// Class predictions of `model` for every row of `batch`.
pub fn predict_classes<B: Backend>(
    model: &FashionCnn<B>,
    batch: &TensorBatch<B>,
    chunk: usize,
) -> Result<Vec<usize>, TrainingError> {
    let total = batch.len();
    let chunk = chunk.max(1);
    let mut classes = Vec::with_capacity(total);
    let mut start = 0;
    while start < total {
        let len = chunk.min(total - start);
        let logits = model.forward_logits(batch.images.clone().narrow(0, start, len));
        let ids = logits
            .argmax(1)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|err| TrainingError::Tensor(format!("{err:?}")))?;
        classes.extend(ids.into_iter().map(|id| id.max(0) as usize));
        start += len;
    }
    Ok(classes)
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    logits
        .argmax(1)
        .equal(targets.argmax(1))
        .int()
        .sum()
        .float()
}

fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let ids: Vec<i64> = indices.iter().map(|&idx| idx as i64).collect();
    Tensor::from_data(TensorData::new(ids, [indices.len()]), device)
}

fn read_scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32, TrainingError> {
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| TrainingError::Tensor(format!("{err:?}")))?;
    values
        .first()
        .copied()
        .ok_or_else(|| TrainingError::Tensor("empty scalar tensor".to_string()))
}
