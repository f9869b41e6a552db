//! Desktop front end: drawing canvas, training controls and metric charts.

mod canvas_view;
mod metrics_view;
mod prediction_modal;
mod style;

use std::time::Duration;

use burn::tensor::backend::AutodiffBackend;
use eframe::egui::{self, Color32, RichText};

use crate::config::{self, DatasetSourceKind, Settings};
use crate::dataset::{detect_source, open_provider};
use crate::ml::Prediction;
use crate::session::{Session, Status};
use canvas_view::CanvasView;

/// Minimum window size that fits the canvas next to the charts.
pub const MIN_VIEWPORT_SIZE: egui::Vec2 = egui::vec2(760.0, 520.0);

const TRAINING_REPAINT: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StatusTone {
    Info,
    Busy,
    Error,
}

struct StatusLine {
    text: String,
    tone: StatusTone,
}

/// The application window.
pub struct FashionApp<B: AutodiffBackend> {
    session: Session<B>,
    settings: Settings,
    canvas_view: CanvasView,
    prediction: Option<Prediction>,
    status: StatusLine,
    last_status: Status,
    visuals_set: bool,
}

impl<B: AutodiffBackend> FashionApp<B> {
    pub fn new(session: Session<B>, settings: Settings) -> Self {
        let mut session = session;
        session.set_training_config(settings.training.to_config());
        let last_status = session.status();
        Self {
            session,
            settings,
            canvas_view: CanvasView::new(),
            prediction: None,
            status: StatusLine {
                text: "Train the model, then draw a garment and press Predict".to_string(),
                tone: StatusTone::Info,
            },
            last_status,
            visuals_set: false,
        }
    }

    fn set_status(&mut self, text: impl Into<String>, tone: StatusTone) {
        self.status = StatusLine {
            text: text.into(),
            tone,
        };
    }

    fn apply_visuals(&mut self, ctx: &egui::Context) {
        if self.visuals_set {
            return;
        }
        let mut visuals = egui::Visuals::dark();
        style::apply_visuals(&mut visuals);
        ctx.set_visuals(visuals);
        self.visuals_set = true;
    }

    fn poll_session(&mut self) {
        self.session.poll();
        let status = self.session.status();
        if status == self.last_status {
            return;
        }
        match status {
            Status::Ready => {
                let summary = self
                    .session
                    .history()
                    .and_then(|history| history.last())
                    .map(|last| format!(", validation accuracy {:.1}%", last.val_accuracy * 100.0))
                    .unwrap_or_default();
                self.set_status(format!("Model ready{summary}"), StatusTone::Info);
            }
            Status::Unready => {
                let message = self
                    .session
                    .last_error()
                    .unwrap_or("Training stopped")
                    .to_string();
                self.set_status(message, StatusTone::Error);
            }
            Status::Training => {}
        }
        self.last_status = status;
    }

    fn start_training(&mut self) {
        let settings = self.settings.clone().normalized();
        self.session
            .set_training_config(settings.training.to_config());
        let provider = match open_provider(&settings.dataset, settings.training.seed) {
            Ok(provider) => provider,
            Err(err) => {
                tracing::error!("Failed to open dataset: {err}");
                self.set_status(format!("Failed to open dataset: {err}"), StatusTone::Error);
                return;
            }
        };
        match self.session.start_training(provider) {
            Ok(()) => {
                self.prediction = None;
                self.last_status = Status::Training;
                self.set_status(
                    format!("Training on {} data…", settings.dataset.source.as_str()),
                    StatusTone::Busy,
                );
            }
            Err(err) => self.set_status(err.to_string(), StatusTone::Error),
        }
    }

    fn predict(&mut self) {
        match self.session.predict() {
            Ok(prediction) => {
                self.set_status(format!("Prediction: {}", prediction.label()), StatusTone::Info);
                self.prediction = Some(prediction);
            }
            Err(err) => self.set_status(err.to_string(), StatusTone::Error),
        }
    }

    fn choose_dataset_folder(&mut self) {
        let Some(dir) = rfd::FileDialog::new()
            .set_title("Choose dataset folder")
            .pick_folder()
        else {
            return;
        };
        match detect_source(&dir) {
            Some(kind) => {
                self.set_status(
                    format!("Using {} dataset at {}", kind.as_str(), dir.display()),
                    StatusTone::Info,
                );
                self.settings.dataset.source = kind;
                self.settings.dataset.path = Some(dir);
                self.persist_settings();
            }
            None => self.set_status(
                format!("No Fashion-MNIST files found in {}", dir.display()),
                StatusTone::Error,
            ),
        }
    }

    fn persist_settings(&mut self) {
        if let Err(err) = config::save(&self.settings) {
            tracing::warn!("Failed to save settings: {err}");
            self.set_status(format!("Failed to save settings: {err}"), StatusTone::Error);
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let status = self.session.status();
        ui.horizontal(|ui| {
            if ui.button("Clear").clicked() {
                self.session.canvas_mut().begin_erase();
            }
            if ui
                .add_enabled(status == Status::Ready, egui::Button::new("Predict"))
                .clicked()
            {
                self.predict();
            }
            ui.separator();
            if ui
                .add_enabled(status != Status::Training, egui::Button::new("Train"))
                .clicked()
            {
                self.start_training();
            }
            if ui
                .add_enabled(status == Status::Training, egui::Button::new("Cancel"))
                .clicked()
                && self.session.cancel_training()
            {
                self.set_status("Cancelling after the current batch…", StatusTone::Busy);
            }
        });
        ui.add_space(6.0);
        ui.add_enabled_ui(status != Status::Training, |ui| {
            ui.horizontal(|ui| {
                ui.label("Epochs");
                let epochs = ui.add(
                    egui::DragValue::new(&mut self.settings.training.epochs).range(1..=200),
                );
                if epochs.drag_stopped() || epochs.lost_focus() {
                    self.persist_settings();
                }
            });
            ui.horizontal(|ui| {
                let dataset = &self.settings.dataset;
                let location = match (&dataset.source, &dataset.path) {
                    (DatasetSourceKind::Synthetic, _) | (_, None) => String::new(),
                    (_, Some(path)) => format!(" ({})", path.display()),
                };
                ui.label(format!("Dataset: {}{location}", dataset.source.as_str()));
            });
            ui.horizontal(|ui| {
                if ui.button("Choose dataset folder…").clicked() {
                    self.choose_dataset_folder();
                }
                if ui.button("Use synthetic data").clicked() {
                    self.settings.dataset.source = DatasetSourceKind::Synthetic;
                    self.persist_settings();
                }
            });
        });
    }

    fn render_status(&self, ctx: &egui::Context) {
        let palette = style::palette();
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            let color = match self.status.tone {
                StatusTone::Info => palette.text_primary,
                StatusTone::Busy => palette.accent_ice,
                StatusTone::Error => palette.warning,
            };
            ui.horizontal(|ui| {
                if self.status.tone == StatusTone::Busy {
                    ui.spinner();
                }
                ui.label(RichText::new(&self.status.text).color(color));
            });
        });
    }
}

impl<B: AutodiffBackend> eframe::App for FashionApp<B> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_visuals(ctx);
        self.poll_session();
        if self.session.is_training() {
            ctx.request_repaint_after(TRAINING_REPAINT);
        }

        self.render_status(ctx);
        egui::SidePanel::right("metrics_panel")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                metrics_view::render(ui, self.session.history(), self.session.progress());
            });
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(RichText::new("Draw a garment").color(Color32::WHITE));
            ui.add_space(8.0);
            self.canvas_view.show(ui, self.session.canvas_mut());
            ui.add_space(8.0);
            self.render_controls(ui);
        });
        prediction_modal::render(ctx, &mut self.prediction);
    }
}
