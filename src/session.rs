//! Owns the canvas and the model lifecycle.
//!
//! The model moves through `Unready -> Training -> Ready`. Training runs on a
//! worker thread that reports back over a channel; [`Session::poll`] drains it
//! from the UI thread. Only a `Ready` session can classify the canvas.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use burn::tensor::backend::AutodiffBackend;
use burn::module::AutodiffModule;
use thiserror::Error;

use crate::canvas::Canvas;
use crate::dataset::DatasetProvider;
use crate::ml::{
    BatchProgress, CancelToken, ConstructionError, EpochMetrics, FashionCnn, LogListener,
    ModelConfig, PredictError, Prediction, Trainer, TrainingConfig, TrainingError,
    TrainingHistory, TrainingListener, predict,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Precondition(&'static str),
    #[error("Training is already running")]
    TrainingInProgress,
    #[error("Failed to build the model: {0}")]
    Construction(#[from] ConstructionError),
    #[error("Prediction failed: {0}")]
    Predict(#[from] PredictError),
    #[error("Failed to start the training worker: {0}")]
    Spawn(std::io::Error),
}

/// Readiness of the session's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unready,
    Training,
    Ready,
}

pub enum ModelState<B: AutodiffBackend> {
    Unready,
    Training {
        progress: Option<BatchProgress>,
        history: TrainingHistory,
        /// Ready model restored if this run is cancelled or fails.
        previous: Option<(FashionCnn<B::InnerBackend>, TrainingHistory)>,
    },
    Ready {
        model: FashionCnn<B::InnerBackend>,
        history: TrainingHistory,
    },
}

enum TrainingMessage<B: AutodiffBackend> {
    Batch(BatchProgress),
    Epoch(EpochMetrics),
    Finished(Result<FashionCnn<B::InnerBackend>, TrainingError>),
}

struct ChannelListener<B: AutodiffBackend> {
    tx: Sender<TrainingMessage<B>>,
}

impl<B: AutodiffBackend> TrainingListener for ChannelListener<B> {
    fn on_batch_end(&mut self, progress: &BatchProgress) {
        let _ = self.tx.send(TrainingMessage::Batch(*progress));
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics) {
        let _ = self.tx.send(TrainingMessage::Epoch(*metrics));
    }
}

struct Worker<B: AutodiffBackend> {
    rx: Receiver<TrainingMessage<B>>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

pub struct Session<B: AutodiffBackend> {
    device: B::Device,
    model_config: ModelConfig,
    training_config: TrainingConfig,
    canvas: Canvas,
    state: ModelState<B>,
    worker: Option<Worker<B>>,
    last_error: Option<String>,
}

impl<B: AutodiffBackend> Session<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            model_config: ModelConfig::new(),
            training_config: TrainingConfig::new(),
            canvas: Canvas::new(),
            state: ModelState::Unready,
            worker: None,
            last_error: None,
        }
    }

    pub fn with_training_config(mut self, config: TrainingConfig) -> Self {
        self.training_config = config;
        self
    }

    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }

    /// Settings used by the next call to [`Session::start_training`].
    pub fn set_training_config(&mut self, config: TrainingConfig) {
        self.training_config = config;
    }

    pub fn training_config(&self) -> &TrainingConfig {
        &self.training_config
    }

    pub fn status(&self) -> Status {
        match self.state {
            ModelState::Unready => Status::Unready,
            ModelState::Training { .. } => Status::Training,
            ModelState::Ready { .. } => Status::Ready,
        }
    }

    pub fn state(&self) -> &ModelState<B> {
        &self.state
    }

    pub fn is_training(&self) -> bool {
        self.status() == Status::Training
    }

    pub fn is_ready(&self) -> bool {
        self.status() == Status::Ready
    }

    /// Metrics of the running or most recent successful training run.
    pub fn history(&self) -> Option<&TrainingHistory> {
        match &self.state {
            ModelState::Unready => None,
            ModelState::Training { history, .. } | ModelState::Ready { history, .. } => {
                Some(history)
            }
        }
    }

    pub fn progress(&self) -> Option<BatchProgress> {
        match &self.state {
            ModelState::Training { progress, .. } => *progress,
            _ => None,
        }
    }

    /// Trained inference model, once ready.
    pub fn model(&self) -> Option<&FashionCnn<B::InnerBackend>> {
        match &self.state {
            ModelState::Ready { model, .. } => Some(model),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    /// Build a fresh model and train it on a worker thread.
    ///
    /// Allowed while unready or ready; a ready model is replaced once the new
    /// run finishes successfully and is kept if the run is cancelled or fails.
    pub fn start_training(
        &mut self,
        mut provider: Box<dyn DatasetProvider + Send>,
    ) -> Result<(), SessionError> {
        if self.is_training() {
            return Err(SessionError::TrainingInProgress);
        }
        let model = self.model_config.build::<B>(&self.device)?;
        let (tx, rx) = mpsc::channel::<TrainingMessage<B>>();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let config = self.training_config.clone();
        let device = self.device.clone();
        let handle = thread::Builder::new()
            .name("fashionpad-training".to_string())
            .spawn(move || {
                let trainer = Trainer::new(model, config, device)
                    .with_listener(LogListener)
                    .with_listener(ChannelListener { tx: tx.clone() });
                let result = trainer
                    .train(&mut *provider, &worker_cancel)
                    .map(|outcome| outcome.model.valid());
                let _ = tx.send(TrainingMessage::Finished(result));
            })
            .map_err(SessionError::Spawn)?;

        tracing::info!("Training started");
        self.worker = Some(Worker {
            rx,
            cancel,
            handle: Some(handle),
        });
        let previous = match std::mem::replace(&mut self.state, ModelState::Unready) {
            ModelState::Ready { model, history } => Some((model, history)),
            _ => None,
        };
        self.state = ModelState::Training {
            progress: None,
            history: TrainingHistory::default(),
            previous,
        };
        self.last_error = None;
        Ok(())
    }

    /// Ask the running worker to stop after its current mini-batch.
    pub fn cancel_training(&mut self) -> bool {
        match &self.worker {
            Some(worker) => {
                worker.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Apply pending worker messages. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            let Some(worker) = self.worker.as_ref() else {
                return changed;
            };
            match worker.rx.try_recv() {
                Ok(message) => {
                    self.apply(message);
                    changed = true;
                }
                Err(TryRecvError::Empty) => return changed,
                Err(TryRecvError::Disconnected) => {
                    self.worker_lost();
                    return true;
                }
            }
        }
    }

    /// Block until the running worker finishes.
    pub fn wait_for_training(&mut self) {
        while let Some(worker) = self.worker.as_ref() {
            match worker.rx.recv() {
                Ok(message) => self.apply(message),
                Err(_) => self.worker_lost(),
            }
        }
    }

    /// Classify the current canvas with the trained model.
    pub fn predict(&self) -> Result<Prediction, SessionError> {
        match &self.state {
            ModelState::Ready { model, .. } => {
                let prediction = predict(model, self.canvas.bitmap(), &self.device)?;
                tracing::info!(
                    "Canvas classified as {} ({:.1}%)",
                    prediction.label(),
                    prediction.confidence() * 100.0
                );
                Ok(prediction)
            }
            ModelState::Training { .. } => Err(SessionError::Precondition(
                "The model is still training",
            )),
            ModelState::Unready => Err(SessionError::Precondition(
                "Train the model before predicting",
            )),
        }
    }

    fn apply(&mut self, message: TrainingMessage<B>) {
        match message {
            TrainingMessage::Batch(batch) => {
                if let ModelState::Training { progress, .. } = &mut self.state {
                    *progress = Some(batch);
                }
            }
            TrainingMessage::Epoch(metrics) => {
                if let ModelState::Training { history, .. } = &mut self.state {
                    history.push(metrics);
                }
            }
            TrainingMessage::Finished(result) => {
                self.finish_worker();
                let (history, previous) =
                    match std::mem::replace(&mut self.state, ModelState::Unready) {
                        ModelState::Training {
                            history, previous, ..
                        } => (history, previous),
                        _ => (TrainingHistory::default(), None),
                    };
                match result {
                    Ok(model) => {
                        tracing::info!("Training finished after {} epochs", history.len());
                        self.state = ModelState::Ready { model, history };
                    }
                    Err(err) => {
                        match &err {
                            TrainingError::Cancelled { .. } => tracing::info!("{err}"),
                            _ => tracing::error!("Training failed: {err}"),
                        }
                        self.last_error = Some(err.to_string());
                        self.restore(previous);
                    }
                }
            }
        }
    }

    fn worker_lost(&mut self) {
        self.finish_worker();
        let previous = match std::mem::replace(&mut self.state, ModelState::Unready) {
            ModelState::Training { previous, .. } => previous,
            _ => None,
        };
        self.restore(previous);
        self.last_error = Some("Training worker stopped unexpectedly".to_string());
        tracing::error!("Training worker stopped without reporting a result");
    }

    fn restore(&mut self, previous: Option<(FashionCnn<B::InnerBackend>, TrainingHistory)>) {
        if let Some((model, history)) = previous {
            tracing::info!("Keeping the previously trained model");
            self.state = ModelState::Ready { model, history };
        }
    }

    fn finish_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl<B: AutodiffBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.cancel();
        }
        self.finish_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;
    use crate::dataset::SyntheticProvider;
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    fn tiny_session() -> Session<B> {
        Session::new(Default::default())
            .with_model_config(ModelConfig::new().with_filters(4).with_hidden(vec![16]))
            .with_training_config(
                TrainingConfig::new()
                    .with_epochs(2)
                    .with_batch_size(16)
                    .with_train_size(32)
                    .with_test_size(16),
            )
    }

    #[test]
    fn predict_requires_a_trained_model() {
        let session = tiny_session();
        assert_eq!(session.status(), Status::Unready);
        assert!(matches!(
            session.predict(),
            Err(SessionError::Precondition(_))
        ));
    }

    #[test]
    fn training_reaches_ready_and_enables_prediction() {
        let mut session = tiny_session();
        session
            .start_training(Box::new(SyntheticProvider::new(1)))
            .unwrap();
        assert_eq!(session.status(), Status::Training);
        assert!(matches!(
            session.predict(),
            Err(SessionError::Precondition(_))
        ));
        assert!(matches!(
            session.start_training(Box::new(SyntheticProvider::new(2))),
            Err(SessionError::TrainingInProgress)
        ));

        session.wait_for_training();
        assert_eq!(session.status(), Status::Ready);
        assert_eq!(session.history().map(TrainingHistory::len), Some(2));
        assert!(session.last_error().is_none());

        session.canvas_mut().set_position(Point::new(60.0, 140.0));
        session.canvas_mut().stroke_to(Point::new(220.0, 140.0), true);
        let prediction = session.predict().unwrap();
        assert!(prediction.index() < 10);
        assert!(!prediction.label().is_empty());
    }

    #[test]
    fn cancelling_returns_to_unready() {
        let mut session = tiny_session().with_training_config(
            TrainingConfig::new()
                .with_epochs(500)
                .with_batch_size(8)
                .with_train_size(32)
                .with_test_size(8),
        );
        session
            .start_training(Box::new(SyntheticProvider::new(1)))
            .unwrap();
        assert!(session.cancel_training());
        session.wait_for_training();
        assert_eq!(session.status(), Status::Unready);
        assert!(session.last_error().is_some_and(|err| err.contains("cancelled")));
        assert!(!session.cancel_training());
    }

    #[test]
    fn cancelled_retrain_keeps_the_ready_model() {
        let mut session = tiny_session();
        session
            .start_training(Box::new(SyntheticProvider::new(1)))
            .unwrap();
        session.wait_for_training();
        assert_eq!(session.status(), Status::Ready);
        let before = session.predict().unwrap();

        session.set_training_config(
            TrainingConfig::new()
                .with_epochs(500)
                .with_batch_size(8)
                .with_train_size(32)
                .with_test_size(8),
        );
        session
            .start_training(Box::new(SyntheticProvider::new(2)))
            .unwrap();
        assert_eq!(session.status(), Status::Training);
        assert!(session.model().is_none());
        assert!(session.cancel_training());
        session.wait_for_training();

        assert_eq!(session.status(), Status::Ready);
        assert!(session.last_error().is_some_and(|err| err.contains("cancelled")));
        assert_eq!(session.history().map(TrainingHistory::len), Some(2));
        assert_eq!(session.predict().unwrap(), before);
    }

    #[test]
    fn invalid_architecture_keeps_the_session_unready() {
        let mut session =
            tiny_session().with_model_config(ModelConfig::new().with_filters(0));
        assert!(matches!(
            session.start_training(Box::new(SyntheticProvider::new(1))),
            Err(SessionError::Construction(_))
        ));
        assert_eq!(session.status(), Status::Unready);
    }

    #[test]
    fn canvas_is_usable_in_every_state() {
        let mut session = tiny_session();
        session.canvas_mut().set_position(Point::new(10.0, 10.0));
        assert!(session.canvas_mut().stroke_to(Point::new(40.0, 40.0), true));
        assert!(!session.canvas().is_blank());
        session.canvas_mut().begin_erase();
        assert!(session.canvas().is_blank());
        assert!(!session.poll());
    }
}
