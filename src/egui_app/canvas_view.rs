//! Drawing surface widget backed by [`Canvas`].

use eframe::egui::{
    self, Color32, ColorImage, Pos2, Rect, StrokeKind, TextureHandle, TextureId, TextureOptions,
    Ui,
};

use super::style;
use crate::canvas::{Canvas, Point};

/// GPU copy of the canvas bitmap, refreshed when the canvas changes.
pub(super) struct CanvasView {
    texture: Option<TextureHandle>,
    revision: Option<u64>,
}

impl CanvasView {
    pub(super) fn new() -> Self {
        Self {
            texture: None,
            revision: None,
        }
    }

    /// Show the canvas at its native size and feed pointer drags into it.
    pub(super) fn show(&mut self, ui: &mut Ui, canvas: &mut Canvas) {
        let side = canvas.side() as f32;
        let (rect, response) = ui.allocate_exact_size(egui::vec2(side, side), egui::Sense::drag());

        if response.dragged() {
            let origin = if response.drag_started() {
                ui.input(|input| input.pointer.press_origin())
                    .or_else(|| response.interact_pointer_pos())
            } else {
                None
            };
            apply_drag(
                canvas,
                response.dragged_by(egui::PointerButton::Primary),
                origin.map(|pos| to_canvas(pos, rect, side)),
                response
                    .interact_pointer_pos()
                    .map(|pos| to_canvas(pos, rect, side)),
            );
        }

        let texture = self.sync(ui.ctx(), canvas);
        let uv = Rect::from_min_max(Pos2::ZERO, egui::pos2(1.0, 1.0));
        ui.painter().image(texture, rect, uv, Color32::WHITE);
        ui.painter()
            .rect_stroke(rect, 0.0, style::outer_border(), StrokeKind::Outside);
    }

    fn sync(&mut self, ctx: &egui::Context, canvas: &Canvas) -> TextureId {
        let current = Some(canvas.revision());
        if let Some(handle) = &self.texture {
            if self.revision == current {
                return handle.id();
            }
        }
        let bitmap = canvas.bitmap();
        let image = ColorImage::from_gray(
            [bitmap.width() as usize, bitmap.height() as usize],
            bitmap.as_raw(),
        );
        self.revision = current;
        match &mut self.texture {
            Some(handle) => {
                handle.set(image, TextureOptions::NEAREST);
                handle.id()
            }
            None => {
                let handle = ctx.load_texture("fashionpad_canvas", image, TextureOptions::NEAREST);
                let id = handle.id();
                self.texture = Some(handle);
                id
            }
        }
    }
}

/// Feed one frame of a drag into the canvas. Only the primary button draws.
fn apply_drag(
    canvas: &mut Canvas,
    primary: bool,
    origin: Option<Point>,
    pos: Option<Point>,
) -> bool {
    if !primary {
        return false;
    }
    if let Some(origin) = origin {
        canvas.set_position(origin);
    }
    pos.is_some_and(|pos| canvas.stroke_to(pos, true))
}

/// Map a screen position inside `rect` to canvas pixel coordinates.
fn to_canvas(pos: Pos2, rect: Rect, side: f32) -> Point {
    let scale = side / rect.width().max(1.0);
    Point::new((pos.x - rect.min.x) * scale, (pos.y - rect.min.y) * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_positions_are_relative_to_the_widget() {
        let rect = Rect::from_min_size(egui::pos2(100.0, 40.0), egui::vec2(280.0, 280.0));
        assert_eq!(
            to_canvas(egui::pos2(100.0, 40.0), rect, 280.0),
            Point::new(0.0, 0.0)
        );
        assert_eq!(
            to_canvas(egui::pos2(240.0, 180.0), rect, 280.0),
            Point::new(140.0, 140.0)
        );
        let half = Rect::from_min_size(Pos2::ZERO, egui::vec2(140.0, 140.0));
        assert_eq!(
            to_canvas(egui::pos2(70.0, 35.0), half, 280.0),
            Point::new(140.0, 70.0)
        );
    }

    #[test]
    fn only_primary_drags_draw() {
        let mut canvas = Canvas::new();
        let start = Some(Point::new(40.0, 40.0));
        assert!(!apply_drag(&mut canvas, false, start, Some(Point::new(200.0, 200.0))));
        assert!(canvas.is_blank());
        assert_eq!(canvas.last_position(), Point::new(0.0, 0.0));

        assert!(apply_drag(&mut canvas, true, start, Some(Point::new(120.0, 40.0))));
        assert!(!canvas.is_blank());
        assert!(apply_drag(&mut canvas, true, None, Some(Point::new(120.0, 120.0))));
        assert_eq!(canvas.last_position(), Point::new(120.0, 120.0));
    }
}
