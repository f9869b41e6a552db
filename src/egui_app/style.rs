//! Dark rectilinear theme shared by the canvas, the metrics panel and the
//! prediction modal.

use eframe::egui::{
    Color32, Stroke, Visuals,
    epaint::{CornerRadius, Shadow},
    style::WidgetVisuals,
};

/// Colors the widgets reach for when painting by hand.
#[derive(Clone, Copy)]
pub(super) struct Palette {
    pub bg_primary: Color32,
    pub panel_outline: Color32,
    pub grid_soft: Color32,
    pub text_primary: Color32,
    pub text_muted: Color32,
    pub accent_mint: Color32,
    pub accent_ice: Color32,
    pub accent_copper: Color32,
    pub warning: Color32,
    pub success: Color32,
}

const PANEL_FILL: Color32 = Color32::from_rgb(26, 28, 30);
const WIDGET_FILL: Color32 = Color32::from_rgb(42, 44, 48);

pub(super) fn palette() -> Palette {
    Palette {
        bg_primary: Color32::from_rgb(10, 10, 12),
        panel_outline: Color32::from_rgb(38, 42, 48),
        grid_soft: Color32::from_rgb(30, 32, 36),
        text_primary: Color32::from_rgb(185, 192, 200),
        text_muted: Color32::from_rgb(140, 146, 155),
        accent_mint: Color32::from_rgb(127, 255, 212),
        accent_ice: Color32::from_rgb(167, 217, 255),
        accent_copper: Color32::from_rgb(195, 165, 122),
        warning: Color32::from_rgb(200, 128, 96),
        success: Color32::from_rgb(102, 176, 136),
    }
}

pub(super) fn apply_visuals(visuals: &mut Visuals) {
    let palette = palette();
    visuals.window_fill = palette.bg_primary;
    visuals.panel_fill = PANEL_FILL;
    visuals.override_text_color = Some(palette.text_primary);
    visuals.extreme_bg_color = palette.bg_primary;
    visuals.faint_bg_color = PANEL_FILL;
    visuals.error_fg_color = palette.warning;
    visuals.warn_fg_color = palette.warning;
    visuals.selection.bg_fill = palette.grid_soft;
    visuals.selection.stroke = Stroke::new(1.0, palette.accent_ice);
    visuals.widgets.noninteractive.bg_fill = PANEL_FILL;
    visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, palette.text_primary);
    for widget in [
        &mut visuals.widgets.inactive,
        &mut visuals.widgets.hovered,
        &mut visuals.widgets.active,
    ] {
        square_widget(widget, &palette);
    }
    visuals.window_corner_radius = CornerRadius::ZERO;
    visuals.popup_shadow = Shadow::NONE;
}

fn square_widget(widget: &mut WidgetVisuals, palette: &Palette) {
    widget.corner_radius = CornerRadius::ZERO;
    widget.bg_fill = WIDGET_FILL;
    widget.weak_bg_fill = palette.grid_soft;
    widget.bg_stroke = Stroke::new(1.0, palette.panel_outline);
    widget.fg_stroke = Stroke::new(1.0, palette.text_primary);
}

/// Frame drawn around the drawing surface.
pub(super) fn outer_border() -> Stroke {
    Stroke::new(2.0, palette().panel_outline)
}

pub(super) fn modal_backdrop() -> Color32 {
    Color32::from_rgba_premultiplied(0, 0, 0, 160)
}
