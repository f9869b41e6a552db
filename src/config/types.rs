use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ml::TrainingConfig;

/// Environment variable that overrides [`BackendChoice`].
pub const BACKEND_ENV: &str = "FASHIONPAD_BACKEND";

/// Root of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub dataset: DatasetSettings,
    #[serde(default)]
    pub backend: BackendChoice,
}

impl Settings {
    /// Clamp values that would make training impossible.
    pub fn normalized(mut self) -> Self {
        let t = &mut self.training;
        t.epochs = t.epochs.max(1);
        t.batch_size = t.batch_size.max(1);
        t.train_size = t.train_size.max(1);
        t.test_size = t.test_size.max(1);
        if !t.learning_rate.is_finite() || t.learning_rate <= 0.0 {
            t.learning_rate = TrainingSettings::default().learning_rate;
        }
        self
    }

    /// Backend to use, honoring the `FASHIONPAD_BACKEND` override.
    pub fn effective_backend(&self) -> BackendChoice {
        std::env::var(BACKEND_ENV)
            .ok()
            .and_then(|value| BackendChoice::parse(&value))
            .unwrap_or(self.backend)
    }
}

/// Hyperparameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        TrainingSettings::from(&TrainingConfig::new())
    }
}

impl From<&TrainingConfig> for TrainingSettings {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.batch_size,
            train_size: config.train_size,
            test_size: config.test_size,
            learning_rate: config.learning_rate,
            seed: config.seed,
        }
    }
}

impl TrainingSettings {
    pub fn to_config(&self) -> TrainingConfig {
        TrainingConfig::new()
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_train_size(self.train_size)
            .with_test_size(self.test_size)
            .with_learning_rate(self.learning_rate)
            .with_seed(self.seed)
    }
}

/// Where training images come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub source: DatasetSourceKind,
    /// Directory holding the dataset files; unused for `synthetic`.
    pub path: Option<PathBuf>,
    /// Images at the end of a sprite sheet reserved for evaluation.
    pub sprite_test_elements: usize,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            source: DatasetSourceKind::Synthetic,
            path: None,
            sprite_test_elements: crate::dataset::sprite::DEFAULT_TEST_ELEMENTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSourceKind {
    #[default]
    Synthetic,
    /// PNG sprite sheet plus a one-hot `uint8` label file.
    Sprite,
    /// Canonical Fashion-MNIST IDX files.
    Idx,
}

impl DatasetSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Sprite => "sprite",
            Self::Idx => "idx",
        }
    }
}

/// Tensor backend used for training and inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    Cpu,
    Wgpu,
}

impl BackendChoice {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" | "ndarray" => Some(Self::Cpu),
            "wgpu" | "gpu" | "vulkan" | "metal" => Some(Self::Wgpu),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
        }
    }
}
