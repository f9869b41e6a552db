//! Per-epoch line charts of a training run.

use eframe::egui::{
    self, Align2, Color32, FontId, Pos2, ProgressBar, Rect, RichText, Sense, Shape, Stroke,
    StrokeKind, Ui,
};

use super::style;
use crate::ml::{BatchProgress, Metric, TrainingHistory};

const CHART_HEIGHT: f32 = 150.0;

pub(super) fn render(
    ui: &mut Ui,
    history: Option<&TrainingHistory>,
    progress: Option<BatchProgress>,
) {
    let palette = style::palette();
    ui.heading("Model Training");
    ui.add_space(6.0);

    if let Some(progress) = progress {
        let bar = ProgressBar::new(progress.fraction())
            .desired_width(ui.available_width())
            .text(format!(
                "Epoch {}/{} · batch {}/{} · loss {:.3}",
                progress.epoch, progress.epochs, progress.batch, progress.batches, progress.loss
            ));
        ui.add(bar);
        ui.add_space(6.0);
    }

    let empty = TrainingHistory::default();
    let history = history.unwrap_or(&empty);
    chart(
        ui,
        "Loss",
        history,
        &[(Metric::Loss, palette.accent_ice), (Metric::ValLoss, palette.accent_copper)],
    );
    ui.add_space(10.0);
    chart(
        ui,
        "Accuracy",
        history,
        &[
            (Metric::Accuracy, palette.accent_mint),
            (Metric::ValAccuracy, palette.success),
        ],
    );

    if let Some(last) = history.last() {
        ui.add_space(10.0);
        egui::Grid::new("latest_epoch_metrics")
            .num_columns(2)
            .striped(true)
            .show(ui, |ui| {
                ui.label(RichText::new("epoch").color(palette.text_muted));
                ui.label(last.epoch.to_string());
                ui.end_row();
                for metric in Metric::ALL {
                    ui.label(RichText::new(metric.name()).color(palette.text_muted));
                    ui.label(format!("{:.4}", last.get(metric)));
                    ui.end_row();
                }
            });
    }
}

fn chart(ui: &mut Ui, title: &str, history: &TrainingHistory, series: &[(Metric, Color32)]) {
    let palette = style::palette();
    ui.label(RichText::new(title).strong());
    let width = ui.available_width().max(120.0);
    let (rect, _) = ui.allocate_exact_size(egui::vec2(width, CHART_HEIGHT), Sense::hover());
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 0.0, palette.bg_primary);
    for step in 1..4 {
        let y = rect.top() + rect.height() * step as f32 / 4.0;
        painter.line_segment(
            [egui::pos2(rect.left(), y), egui::pos2(rect.right(), y)],
            Stroke::new(1.0, palette.grid_soft),
        );
    }
    painter.rect_stroke(
        rect,
        0.0,
        Stroke::new(1.0, palette.panel_outline),
        StrokeKind::Inside,
    );

    let values: Vec<Vec<f32>> = series
        .iter()
        .map(|(metric, _)| history.series(*metric))
        .collect();
    let max = axis_max(values.iter().flatten().copied());
    painter.text(
        rect.left_top() + egui::vec2(4.0, 2.0),
        Align2::LEFT_TOP,
        format!("{max:.2}"),
        FontId::monospace(10.0),
        palette.text_muted,
    );
    if history.is_empty() {
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            "No epochs yet",
            FontId::proportional(12.0),
            palette.text_muted,
        );
    }
    for ((_, color), values) in series.iter().zip(&values) {
        let points = chart_points(values, max, rect);
        if points.len() == 1 {
            painter.circle_filled(points[0], 3.0, *color);
        } else if points.len() > 1 {
            painter.add(Shape::line(points, Stroke::new(2.0, *color)));
        }
    }

    ui.horizontal(|ui| {
        for (metric, color) in series {
            ui.label(RichText::new(format!("● {}", metric.name())).color(*color));
        }
        if !history.is_empty() {
            ui.label(RichText::new("per epoch").color(palette.text_muted));
        }
    });
}

/// Upper bound of the value axis; the axis always starts at zero.
fn axis_max(values: impl Iterator<Item = f32>) -> f32 {
    let max = values.filter(|v| v.is_finite()).fold(0.0f32, f32::max);
    if max <= 0.0 { 1.0 } else { max }
}

/// Screen positions of a series spread evenly across `rect`.
fn chart_points(values: &[f32], max: f32, rect: Rect) -> Vec<Pos2> {
    let count = values.len();
    values
        .iter()
        .enumerate()
        .map(|(idx, &value)| {
            let x = if count <= 1 {
                rect.center().x
            } else {
                rect.left() + rect.width() * idx as f32 / (count - 1) as f32
            };
            let y = rect.bottom() - rect.height() * (value / max).clamp(0.0, 1.0);
            egui::pos2(x, y)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_defaults_to_unit_range() {
        assert_eq!(axis_max(std::iter::empty()), 1.0);
        assert_eq!(axis_max([0.0, f32::NAN].into_iter()), 1.0);
        assert_eq!(axis_max([0.5, 2.5, 1.0].into_iter()), 2.5);
    }

    #[test]
    fn points_span_the_chart() {
        let rect = Rect::from_min_size(Pos2::ZERO, egui::vec2(100.0, 50.0));
        let points = chart_points(&[0.0, 1.0, 2.0], 2.0, rect);
        assert_eq!(points[0], egui::pos2(0.0, 50.0));
        assert_eq!(points[1], egui::pos2(50.0, 25.0));
        assert_eq!(points[2], egui::pos2(100.0, 0.0));
        assert_eq!(chart_points(&[1.0], 2.0, rect), vec![egui::pos2(50.0, 25.0)]);
    }
}
