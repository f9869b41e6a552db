//! Entry point for the fashionpad desktop app.
#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]
use eframe::egui;
use fashionpad::config::{self, BackendChoice};
use fashionpad::egui_app::{FashionApp, MIN_VIEWPORT_SIZE};
use fashionpad::logging;
use fashionpad::ml::backend::{CpuBackend, GpuBackend, cpu_device, gpu_device};
use fashionpad::session::Session;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let settings = config::load_or_default().map(|settings| settings.normalized());
    let viewport = egui::ViewportBuilder::default()
        .with_min_inner_size(MIN_VIEWPORT_SIZE)
        .with_inner_size([980.0, 640.0]);
    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Fashionpad",
        native_options,
        Box::new(move |_cc| {
            let settings = match settings {
                Ok(settings) => settings,
                Err(err) => {
                    tracing::error!("Failed to load config: {err}");
                    return Ok(Box::new(LaunchError {
                        message: format!("Failed to load config: {err}"),
                    }));
                }
            };
            let backend = settings.effective_backend();
            tracing::info!("Starting with the {} backend", backend.as_str());
            let app: Box<dyn eframe::App> = match backend {
                BackendChoice::Cpu => Box::new(FashionApp::new(
                    Session::<CpuBackend>::new(cpu_device()),
                    settings,
                )),
                BackendChoice::Wgpu => Box::new(FashionApp::new(
                    Session::<GpuBackend>::new(gpu_device()),
                    settings,
                )),
            };
            Ok(app)
        }),
    )?;
    Ok(())
}

/// Minimal fallback app to display initialization errors.
struct LaunchError {
    message: String,
}

impl eframe::App for LaunchError {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("Failed to start fashionpad");
                ui.label(&self.message);
            });
        });
    }
}
