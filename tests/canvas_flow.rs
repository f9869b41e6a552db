use fashionpad::canvas::{CANVAS_SIDE, Canvas, INK, Point};
use fashionpad::ml::predict::downsample;

#[test]
fn gesture_then_clear_matches_a_fresh_canvas() {
    let mut canvas = Canvas::new();
    let fresh = canvas.bitmap().clone();

    canvas.set_position(Point::new(30.0, 30.0));
    for step in 1..=20 {
        let t = step as f32 * 10.0;
        canvas.stroke_to(Point::new(30.0 + t, 30.0 + t), true);
    }
    canvas.stroke_to(Point::new(10.0, 260.0), false);
    assert_eq!(canvas.last_position(), Point::new(230.0, 230.0));
    assert_eq!(canvas.bitmap().get_pixel(130, 130).0[0], INK);

    canvas.begin_erase();
    assert_eq!(canvas.bitmap(), &fresh);
}

#[test]
fn drawn_strokes_survive_downsampling() {
    let mut canvas = Canvas::new();
    canvas.set_position(Point::new(0.0, 140.0));
    canvas.stroke_to(Point::new(CANVAS_SIDE as f32, 140.0), true);

    let pixels = downsample(canvas.bitmap()).expect("downsample");
    assert_eq!(pixels.len(), 28 * 28);
    let row_14: f32 = pixels[14 * 28..15 * 28].iter().sum();
    let row_2: f32 = pixels[2 * 28..3 * 28].iter().sum();
    assert!(row_14 > 20.0, "stroke row mass {row_14}");
    assert_eq!(row_2, 0.0);
    assert!(pixels.iter().all(|p| (0.0..=1.0).contains(p)));
}
