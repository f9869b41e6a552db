//! Library exports for reuse in the binaries, benchmarks and tests.
/// Application directory resolution.
pub mod app_dirs;
/// Freehand drawing surface.
pub mod canvas;
/// Persisted settings.
pub mod config;
/// Labeled image sources.
pub mod dataset;
/// Desktop UI.
pub mod egui_app;
/// Log file setup.
pub mod logging;
/// Model, training and inference.
pub mod ml;
/// Model lifecycle around a single canvas.
pub mod session;
