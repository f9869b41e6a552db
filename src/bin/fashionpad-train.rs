//! Headless trainer: fits the classifier, reports test metrics and optionally
//! classifies an image file.

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use fashionpad::config::{self, BackendChoice, DatasetSourceKind, Settings};
use fashionpad::dataset::{self, DatasetProvider, NUM_CLASSES};
use fashionpad::logging;
use fashionpad::ml::backend::{CpuBackend, GpuBackend, cpu_device, gpu_device};
use fashionpad::ml::{
    CLASS_NAMES, CancelToken, ConfusionMatrix, EpochMetrics, LogListener, ModelConfig, Trainer,
    TrainingListener, accuracy, precision_recall_by_class, predict, predict_classes,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    let mut settings = config::load_or_default().map_err(|err| err.to_string())?;
    options.apply(&mut settings);
    let settings = settings.normalized();
    let backend = options.backend.unwrap_or_else(|| settings.effective_backend());
    println!(
        "Training on {} data with the {} backend",
        settings.dataset.source.as_str(),
        backend.as_str()
    );
    match backend {
        BackendChoice::Cpu => train_and_report::<CpuBackend>(&options, &settings, cpu_device()),
        BackendChoice::Wgpu => train_and_report::<GpuBackend>(&options, &settings, gpu_device()),
    }
}

struct ConsoleListener;

impl TrainingListener for ConsoleListener {
    fn on_epoch_end(&mut self, metrics: &EpochMetrics) {
        println!(
            "epoch {:>3}  loss={:.4}  val_loss={:.4}  accuracy={:.4}  val_accuracy={:.4}",
            metrics.epoch, metrics.loss, metrics.val_loss, metrics.accuracy, metrics.val_accuracy
        );
    }
}

fn train_and_report<B: AutodiffBackend>(
    options: &CliOptions,
    settings: &Settings,
    device: B::Device,
) -> Result<(), String> {
    let training = settings.training.to_config();
    let mut provider = dataset::open_provider(&settings.dataset, training.seed)
        .map_err(|err| err.to_string())?;
    let model = ModelConfig::new()
        .build::<B>(&device)
        .map_err(|err| err.to_string())?;
    let outcome = Trainer::new(model, training.clone(), device.clone())
        .with_listener(LogListener)
        .with_listener(ConsoleListener)
        .train(&mut *provider, &CancelToken::new())
        .map_err(|err| err.to_string())?;
    let model = outcome.model.valid();

    let test = provider
        .next_test_batch(training.test_size)
        .map_err(|err| err.to_string())?;
    let truths: Vec<usize> = (0..test.len()).map(|row| test.class_of(row)).collect();
    let tensors = test.into_tensors::<B::InnerBackend>(&device);
    let predicted =
        predict_classes(&model, &tensors, training.batch_size).map_err(|err| err.to_string())?;
    let mut cm = ConfusionMatrix::new(NUM_CLASSES);
    for (&truth, &pred) in truths.iter().zip(&predicted) {
        cm.add(truth, pred);
    }
    println!("test accuracy: {:.4}", accuracy(&cm));
    for (idx, stats) in precision_recall_by_class(&cm).iter().enumerate() {
        println!(
            "class {:>2} {:<12}  precision={:.3}  recall={:.3}  support={}",
            idx, CLASS_NAMES[idx], stats.precision, stats.recall, stats.support
        );
    }
    println!("confusion matrix (rows=true, cols=pred):");
    for truth in 0..cm.n_classes {
        let mut row = String::new();
        for pred in 0..cm.n_classes {
            row.push_str(&format!("{:6}", cm.get(truth, pred)));
        }
        println!("{row}");
    }

    if let Some(path) = &options.history_out {
        let json = serde_json::to_string_pretty(&outcome.history).map_err(|err| err.to_string())?;
        std::fs::write(path, json)
            .map_err(|err| format!("Failed to write {}: {err}", path.display()))?;
        println!("Wrote training history to {}", path.display());
    }

    if let Some(path) = &options.predict {
        let bitmap = image::open(path)
            .map_err(|err| format!("Failed to open {}: {err}", path.display()))?
            .to_luma8();
        let prediction = predict(&model, &bitmap, &device).map_err(|err| err.to_string())?;
        println!(
            "{}: {} ({:.1}%)",
            path.display(),
            prediction.label(),
            prediction.confidence() * 100.0
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    dataset: Option<(DatasetSourceKind, Option<PathBuf>)>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    train_size: Option<usize>,
    test_size: Option<usize>,
    learning_rate: Option<f64>,
    seed: Option<u64>,
    backend: Option<BackendChoice>,
    history_out: Option<PathBuf>,
    predict: Option<PathBuf>,
}

impl CliOptions {
    /// Override the loaded settings with the values given on the command line.
    fn apply(&self, settings: &mut Settings) {
        if let Some((source, path)) = &self.dataset {
            settings.dataset.source = *source;
            if path.is_some() {
                settings.dataset.path = path.clone();
            }
        }
        let training = &mut settings.training;
        if let Some(epochs) = self.epochs {
            training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            training.batch_size = batch_size;
        }
        if let Some(train_size) = self.train_size {
            training.train_size = train_size;
        }
        if let Some(test_size) = self.test_size {
            training.test_size = test_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            training.learning_rate = learning_rate;
        }
        if let Some(seed) = self.seed {
            training.seed = seed;
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--dataset" => {
                idx += 1;
                options.dataset = Some(parse_dataset(value_of(&args, idx, flag)?)?);
            }
            "--epochs" => {
                idx += 1;
                options.epochs = Some(parse_number(value_of(&args, idx, flag)?, flag)?);
            }
            "--batch" => {
                idx += 1;
                options.batch_size = Some(parse_number(value_of(&args, idx, flag)?, flag)?);
            }
            "--train-size" => {
                idx += 1;
                options.train_size = Some(parse_number(value_of(&args, idx, flag)?, flag)?);
            }
            "--test-size" => {
                idx += 1;
                options.test_size = Some(parse_number(value_of(&args, idx, flag)?, flag)?);
            }
            "--learning-rate" => {
                idx += 1;
                options.learning_rate = Some(parse_number(value_of(&args, idx, flag)?, flag)?);
            }
            "--seed" => {
                idx += 1;
                options.seed = Some(parse_number(value_of(&args, idx, flag)?, flag)?);
            }
            "--backend" => {
                idx += 1;
                let value = value_of(&args, idx, flag)?;
                options.backend = Some(
                    BackendChoice::parse(value)
                        .ok_or_else(|| format!("Invalid --backend value: {value}"))?,
                );
            }
            "--history-out" => {
                idx += 1;
                options.history_out = Some(PathBuf::from(value_of(&args, idx, flag)?));
            }
            "--predict" => {
                idx += 1;
                options.predict = Some(PathBuf::from(value_of(&args, idx, flag)?));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn value_of<'a>(args: &'a [String], idx: usize, flag: &str) -> Result<&'a str, String> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

/// `synthetic`, `sprite:<dir>`, `idx:<dir>`, or a bare directory whose format is detected.
fn parse_dataset(value: &str) -> Result<(DatasetSourceKind, Option<PathBuf>), String> {
    if value == "synthetic" {
        return Ok((DatasetSourceKind::Synthetic, None));
    }
    if let Some(dir) = value.strip_prefix("sprite:") {
        return Ok((DatasetSourceKind::Sprite, Some(PathBuf::from(dir))));
    }
    if let Some(dir) = value.strip_prefix("idx:") {
        return Ok((DatasetSourceKind::Idx, Some(PathBuf::from(dir))));
    }
    let dir = PathBuf::from(value);
    let kind = dataset::detect_source(&dir)
        .ok_or_else(|| format!("No Fashion-MNIST files found in {}", dir.display()))?;
    Ok((kind, Some(dir)))
}

fn help_text() -> String {
    [
        "fashionpad-train",
        "",
        "Trains the Fashion-MNIST classifier and reports test metrics.",
        "",
        "Usage:",
        "  fashionpad-train [--dataset synthetic|sprite:<dir>|idx:<dir>] [options]",
        "",
        "Options:",
        "  --dataset <source>    Dataset source; a bare directory is auto-detected (default: config)",
        "  --epochs <n>          Training epochs (default 10)",
        "  --batch <n>           Mini-batch size (default 512)",
        "  --train-size <n>      Training examples (default 6000)",
        "  --test-size <n>       Held-out examples (default 1000)",
        "  --learning-rate <f>   Adam learning rate (default 0.001)",
        "  --seed <n>            Shuffle seed (default 42)",
        "  --backend <cpu|wgpu>  Tensor backend (default: config or FASHIONPAD_BACKEND)",
        "  --history-out <file>  Write per-epoch metrics as JSON",
        "  --predict <image>     Classify an image file after training",
    ]
    .join("\n")
}
