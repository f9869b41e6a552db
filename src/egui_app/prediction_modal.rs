use eframe::egui::{self, Align2, ProgressBar, RichText};

use super::style;
use crate::ml::Prediction;

const TOP_CLASSES: usize = 3;

/// Modal notification for the latest prediction; clears it when dismissed.
pub(super) fn render(ctx: &egui::Context, prediction: &mut Option<Prediction>) {
    let Some(current) = prediction.as_ref() else {
        return;
    };
    let palette = style::palette();
    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Background,
        egui::Id::new("prediction_backdrop"),
    ));
    painter.rect_filled(ctx.viewport_rect(), 0.0, style::modal_backdrop());

    let mut open = true;
    let mut dismissed = false;
    egui::Window::new("Prediction")
        .anchor(Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
        .order(egui::Order::Foreground)
        .collapsible(false)
        .resizable(false)
        .default_width(300.0)
        .open(&mut open)
        .show(ctx, |ui| {
            ui.heading(RichText::new(current.label()).color(palette.accent_mint));
            ui.label(
                RichText::new(format!("{:.1}% confident", current.confidence() * 100.0))
                    .color(palette.text_muted),
            );
            ui.separator();
            for (class, probability) in current.top(TOP_CLASSES) {
                ui.horizontal(|ui| {
                    ui.label(class.label());
                    ui.add(
                        ProgressBar::new(probability)
                            .desired_width(160.0)
                            .text(format!("{:.1}%", probability * 100.0)),
                    );
                });
            }
            ui.add_space(6.0);
            if ui.button("OK").clicked() {
                dismissed = true;
            }
        });
    if !open || dismissed {
        *prediction = None;
    }
}
