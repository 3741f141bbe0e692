use std::time::Instant;

use anyhow::bail;
use image::RgbaImage;

use crate::{
    config::{Config, Mode},
    gesture::{Hand, Recognizer, Step},
    math::{vec2, Vec2f},
    pointer::{PointerAdapter, PointerEvent},
    raster::Raster,
    render::Renderer,
    smooth::Smoothing,
    stroke::{Brush, Color, Store, Tool},
    toolbar::{Action, ToolbarLayout},
};

/// Owns all drawing state. Gesture frames and pointer events are fed in from the outside, and the
/// canvas is re-rendered right after every change to the stroke list.
pub struct Board {
    store: Store,
    brush: Brush,
    mode: Mode,
    recognizer: Recognizer,
    camera_smoothing: Smoothing,
    release_on_tracking_loss: bool,
    pointer: PointerAdapter,
    renderer: Renderer,
    canvas: Raster,
    rendered_revision: Option<u64>,
    save_requested: bool,
}

impl Board {
    pub fn new(config: &Config) -> Self {
        let mut board = Self {
            store: Store::new(config.history.redo),
            brush: config.brush,
            mode: config.mode,
            recognizer: Recognizer::new(config.gesture.pinch_threshold, config.gesture.debounce()),
            camera_smoothing: Smoothing::new(config.gesture.smoothing_window),
            release_on_tracking_loss: config.gesture.release_on_tracking_loss,
            pointer: PointerAdapter::new(
                config.pointer.min_distance,
                config.pointer.seed_points,
                Smoothing::new(config.pointer.smoothing_window),
            ),
            renderer: Renderer {
                neon_blur: config.render.neon_blur,
            },
            canvas: Raster::new(config.width, config.height),
            rendered_revision: None,
            save_requested: false,
        };
        board.refresh();
        board
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn canvas(&self) -> &Raster {
        &self.canvas
    }

    /// Canvas size in pixels; gesture coordinates are mapped onto this.
    pub fn viewport(&self) -> Vec2f {
        vec2(self.canvas.width() as f32, self.canvas.height() as f32)
    }

    /// Toolbar button under the hand, for highlighting.
    pub fn hovered_tool(&self) -> Option<Action> {
        self.recognizer.hovered()
    }

    pub fn gesture_cursor(&self) -> Option<Vec2f> {
        self.recognizer.cursor()
    }

    pub fn is_pinching(&self) -> bool {
        self.recognizer.is_pinching()
    }

    /// Revision of the stroke list the canvas currently shows.
    pub fn rendered_revision(&self) -> Option<u64> {
        self.rendered_revision
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if self.brush.tool != tool {
            log::info!("switching to {tool:?}");
            self.brush.tool = tool;
        }
    }

    /// Sets the color of the next stroke from a `#rrggbb` string.
    pub fn set_color(&mut self, value: &str) -> anyhow::Result<()> {
        self.brush.color = value.parse::<Color>()?;
        Ok(())
    }

    pub fn set_thickness(&mut self, value: f32) -> anyhow::Result<()> {
        if !Brush::THICKNESS.contains(&value) {
            bail!(
                "thickness must be between {} and {} (got {value})",
                Brush::THICKNESS.start(),
                Brush::THICKNESS.end()
            );
        }
        self.brush.thickness = value;
        Ok(())
    }

    pub fn undo(&mut self) {
        self.store.undo();
        self.refresh();
    }

    pub fn redo(&mut self) {
        self.store.redo();
        self.refresh();
    }

    pub fn clear(&mut self) {
        log::info!("clearing canvas");
        self.store.clear();
        self.refresh();
    }

    pub fn request_save(&mut self) {
        self.save_requested = true;
    }

    /// Returns the canvas pixels if a save was requested since the last call.
    pub fn take_save_request(&mut self) -> Option<RgbaImage> {
        if std::mem::take(&mut self.save_requested) {
            Some(self.canvas.snapshot())
        } else {
            None
        }
    }

    /// Switches input source. A stroke in progress is ended, as if the pointer was released.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        log::info!("switching input mode to {mode:?}");
        self.store.end_stroke();
        self.recognizer.reset();
        self.mode = mode;
    }

    pub fn apply(&mut self, action: Action) {
        log::debug!("action: {action}");
        match action {
            Action::Undo => self.undo(),
            Action::Redo => self.redo(),
            Action::Clear => self.clear(),
            Action::Save => self.request_save(),
            Action::Mode => self.set_mode(self.mode.toggled()),
            Action::Pen | Action::Neon | Action::Eraser => {
                if let Some(tool) = action.tool() {
                    self.set_tool(tool);
                }
            }
        }
    }

    /// Handles one landmark frame. Ignored unless the board is in camera mode.
    pub fn on_landmarks(&mut self, hand: Option<&Hand>, layout: &dyn ToolbarLayout, now: Instant) {
        if self.mode != Mode::Camera {
            return;
        }

        let viewport = self.viewport();
        match self.recognizer.process(hand, viewport, layout, now) {
            Step::Lost => {
                if self.release_on_tracking_loss {
                    self.store.end_stroke();
                }
            }
            Step::Hover(_) => {}
            Step::Select(action) => self.apply(action),
            Step::Draw(point) => {
                if self.store.is_drawing() {
                    self.store.extend_active_stroke(point, self.camera_smoothing);
                } else {
                    let Brush {
                        tool,
                        color,
                        thickness,
                    } = self.brush;
                    self.store.begin_stroke(color, thickness, tool, point, 1);
                }
            }
            Step::Lift => self.store.end_stroke(),
        }
        self.refresh();
    }

    /// Forgets the hand once the landmark stream is gone, ending any gesture stroke.
    pub fn on_tracking_stopped(&mut self) {
        if self.mode == Mode::Camera {
            self.store.end_stroke();
        }
        self.recognizer.reset();
        self.refresh();
    }

    /// Handles one pointer event. Ignored unless the board is in mouse mode.
    pub fn on_pointer(&mut self, event: &PointerEvent) {
        if self.mode != Mode::Mouse {
            return;
        }
        self.pointer.handle(event, &mut self.store, &self.brush);
        self.refresh();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        log::debug!("resizing canvas to {width}x{height}");
        self.canvas.resize(width, height);
        self.rendered_revision = None;
        self.refresh();
    }

    /// Re-renders the canvas if the stroke list changed since the last render.
    fn refresh(&mut self) {
        let revision = self.store.revision();
        if self.rendered_revision == Some(revision) {
            return;
        }
        self.renderer.render(self.store.strokes(), &mut self.canvas);
        self.rendered_revision = Some(revision);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        gesture::tests::hand,
        pointer::{Device, PointerKind, PRIMARY_BUTTON},
        toolbar::{tests::Fixed, Button, Rect, Toolbar},
    };

    fn config(mode: Mode) -> Config {
        Config {
            mode,
            width: 200,
            height: 100,
            ..Config::default()
        }
    }

    /// Canvas point → normalized landmark position, undoing the mirrored mapping.
    fn normalized(board: &Board, p: Vec2f) -> Vec2f {
        let size = board.viewport();
        vec2(p.x() / size.x(), p.y() / size.y())
    }

    fn pinch_at(board: &mut Board, layout: &dyn ToolbarLayout, p: Vec2f, now: Instant) {
        let h = hand(normalized(board, p), 0.03);
        board.on_landmarks(Some(&h), layout, now);
    }

    fn release_at(board: &mut Board, layout: &dyn ToolbarLayout, p: Vec2f, now: Instant) {
        let h = hand(normalized(board, p), 0.3);
        board.on_landmarks(Some(&h), layout, now);
    }

    fn mouse(kind: PointerKind, x: f32, y: f32) -> PointerEvent {
        PointerEvent {
            kind,
            device: Device::Mouse,
            button: 0,
            buttons: PRIMARY_BUTTON,
            position: vec2(x, y),
        }
    }

    fn button(action: Action, rect: Rect) -> Fixed {
        Fixed(vec![Button { action, rect }])
    }

    fn alpha_at(board: &Board, x: u32, y: u32) -> u8 {
        board.canvas().image().get_pixel(x, y)[3]
    }

    #[test]
    fn pinch_begins_stroke_at_cursor() {
        let mut board = Board::new(&config(Mode::Camera));
        let no_toolbar = Fixed(Vec::new());
        pinch_at(&mut board, &no_toolbar, vec2(50.0, 40.0), Instant::now());

        assert!(board.store().is_drawing());
        let stroke = &board.store().strokes()[0];
        assert_eq!(stroke.points.len(), 1);
        assert_abs_diff_eq!(stroke.points[0].x(), 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(stroke.points[0].y(), 40.0, epsilon = 1e-3);
        assert_eq!(stroke.tool, Tool::Pen);
        assert!(alpha_at(&board, 50, 40) > 0);
    }

    #[test]
    fn gesture_draw_cycle() {
        let mut board = Board::new(&config(Mode::Camera));
        let layout = Fixed(Vec::new());
        let now = Instant::now();
        for i in 0..8 {
            pinch_at(&mut board, &layout, vec2(20.0 + i as f32 * 10.0, 50.0), now);
        }
        release_at(&mut board, &layout, vec2(100.0, 50.0), now);

        assert!(!board.store().is_drawing());
        assert_eq!(board.store().strokes().len(), 1);
        let points = &board.store().strokes()[0].points;
        assert_eq!(points.len(), 8);
        assert_abs_diff_eq!(points[7].x(), 90.0, epsilon = 1e-3);

        pinch_at(&mut board, &layout, vec2(10.0, 10.0), now);
        release_at(&mut board, &layout, vec2(10.0, 10.0), now);
        assert_eq!(board.store().strokes().len(), 2);
    }

    #[test]
    fn gesture_points_are_kept_as_tracked() {
        let zigzag: Vec<Vec2f> = (0..8)
            .map(|i| vec2(20.0 + i as f32 * 20.0, if i % 2 == 0 { 30.0 } else { 70.0 }))
            .collect();
        let layout = Fixed(Vec::new());
        let now = Instant::now();

        let mut board = Board::new(&config(Mode::Camera));
        for &p in &zigzag {
            pinch_at(&mut board, &layout, p, now);
        }
        let points = &board.store().strokes()[0].points;
        assert_eq!(points.len(), zigzag.len());
        for (got, want) in points.iter().zip(&zigzag) {
            assert_abs_diff_eq!(got.x(), want.x(), epsilon = 1e-3);
            assert_abs_diff_eq!(got.y(), want.y(), epsilon = 1e-3);
        }

        let mut config = config(Mode::Camera);
        config.gesture.smoothing_window = 5;
        let mut board = Board::new(&config);
        for &p in &zigzag {
            pinch_at(&mut board, &layout, p, now);
        }
        let points = &board.store().strokes()[0].points;
        assert!(points[1..7].iter().all(|p| p.y() > 31.0 && p.y() < 69.0));
    }

    #[test]
    fn pinch_on_clear_button_clears_without_drawing() {
        let mut board = Board::new(&config(Mode::Camera));
        let free = Fixed(Vec::new());
        let now = Instant::now();
        pinch_at(&mut board, &free, vec2(20.0, 20.0), now);
        release_at(&mut board, &free, vec2(20.0, 20.0), now);
        pinch_at(&mut board, &free, vec2(60.0, 20.0), now);
        release_at(&mut board, &free, vec2(60.0, 20.0), now);
        board.undo();
        assert_eq!(board.store().redo_buffer().len(), 1);

        let clear = button(
            Action::Clear,
            Rect::from_origin_size(vec2(150.0, 70.0), vec2(40.0, 20.0)),
        );
        pinch_at(&mut board, &clear, vec2(170.0, 80.0), now);

        assert!(board.store().strokes().is_empty());
        assert!(board.store().redo_buffer().is_empty());
        assert!(!board.store().is_drawing());
        assert_eq!(board.hovered_tool(), Some(Action::Clear));
        assert!(board.canvas().image().pixels().all(|px| px[3] == 0));
    }

    #[test]
    fn gesture_selects_tools_and_debounces() {
        let mut board = Board::new(&config(Mode::Camera));
        let undo = button(
            Action::Undo,
            Rect::from_origin_size(vec2(0.0, 0.0), vec2(40.0, 40.0)),
        );
        let eraser = button(
            Action::Eraser,
            Rect::from_origin_size(vec2(0.0, 0.0), vec2(40.0, 40.0)),
        );
        let free = Fixed(Vec::new());
        let t0 = Instant::now();

        for x in [60.0, 100.0, 140.0] {
            pinch_at(&mut board, &free, vec2(x, 50.0), t0);
            release_at(&mut board, &free, vec2(x, 50.0), t0);
        }
        assert_eq!(board.store().strokes().len(), 3);

        // Holding the pinch over undo only fires once per debounce window.
        for ms in [0, 100, 400, 799] {
            pinch_at(&mut board, &undo, vec2(20.0, 20.0), t0 + Duration::from_millis(ms));
        }
        assert_eq!(board.store().strokes().len(), 2);
        pinch_at(&mut board, &undo, vec2(20.0, 20.0), t0 + Duration::from_millis(800));
        assert_eq!(board.store().strokes().len(), 1);

        pinch_at(&mut board, &eraser, vec2(20.0, 20.0), t0 + Duration::from_millis(900));
        assert_eq!(board.brush().tool, Tool::Eraser);
        assert_eq!(board.store().strokes().len(), 1);
    }

    #[test]
    fn hover_without_pinch_does_nothing() {
        let mut board = Board::new(&config(Mode::Camera));
        let clear = button(
            Action::Clear,
            Rect::from_origin_size(vec2(0.0, 0.0), vec2(200.0, 100.0)),
        );
        release_at(&mut board, &clear, vec2(50.0, 50.0), Instant::now());
        assert_eq!(board.hovered_tool(), Some(Action::Clear));
        assert!(board.store().strokes().is_empty());
    }

    #[test]
    fn lost_hand_keeps_stroke_open_by_default() {
        let mut board = Board::new(&config(Mode::Camera));
        let free = Fixed(Vec::new());
        let now = Instant::now();
        pinch_at(&mut board, &free, vec2(20.0, 20.0), now);
        board.on_landmarks(None, &free, now);
        assert!(board.store().is_drawing());
        assert_eq!(board.hovered_tool(), None);

        pinch_at(&mut board, &free, vec2(40.0, 20.0), now);
        assert_eq!(board.store().strokes().len(), 1);
        assert_eq!(board.store().strokes()[0].points.len(), 2);
    }

    #[test]
    fn lost_hand_can_release() {
        let mut config = config(Mode::Camera);
        config.gesture.release_on_tracking_loss = true;
        let mut board = Board::new(&config);
        let free = Fixed(Vec::new());
        let now = Instant::now();
        pinch_at(&mut board, &free, vec2(20.0, 20.0), now);
        board.on_landmarks(None, &free, now);
        assert!(!board.store().is_drawing());
    }

    #[test]
    fn stopped_tracking_ends_gesture_stroke() {
        let mut board = Board::new(&config(Mode::Camera));
        let clear = button(
            Action::Clear,
            Rect::from_origin_size(vec2(0.0, 0.0), vec2(40.0, 40.0)),
        );
        let now = Instant::now();
        release_at(&mut board, &clear, vec2(20.0, 20.0), now);
        pinch_at(&mut board, &clear, vec2(100.0, 50.0), now);
        assert!(board.store().is_drawing());
        assert!(board.gesture_cursor().is_some());

        board.on_tracking_stopped();
        assert!(!board.store().is_drawing());
        assert_eq!(board.hovered_tool(), None);
        assert_eq!(board.gesture_cursor(), None);
        assert_eq!(board.store().strokes().len(), 1);

        let mut board = Board::new(&config(Mode::Mouse));
        board.on_pointer(&mouse(PointerKind::Down, 10.0, 10.0));
        board.on_tracking_stopped();
        assert!(board.store().is_drawing());
    }

    #[test]
    fn input_is_routed_by_mode() {
        let mut board = Board::new(&config(Mode::Camera));
        board.on_pointer(&mouse(PointerKind::Down, 10.0, 10.0));
        assert!(board.store().strokes().is_empty());

        board.set_mode(Mode::Mouse);
        pinch_at(&mut board, &Fixed(Vec::new()), vec2(20.0, 20.0), Instant::now());
        assert!(board.store().strokes().is_empty());

        board.on_pointer(&mouse(PointerKind::Down, 10.0, 10.0));
        assert_eq!(board.store().strokes()[0].points.len(), 3);
    }

    #[test]
    fn mode_switch_ends_active_stroke() {
        let mut board = Board::new(&config(Mode::Mouse));
        board.on_pointer(&mouse(PointerKind::Down, 10.0, 10.0));
        assert!(board.store().is_drawing());
        board.apply(Action::Mode);
        assert_eq!(board.mode(), Mode::Camera);
        assert!(!board.store().is_drawing());

        let mut board = Board::new(&config(Mode::Camera));
        pinch_at(&mut board, &Fixed(Vec::new()), vec2(20.0, 20.0), Instant::now());
        board.set_mode(Mode::Mouse);
        assert!(!board.store().is_drawing());
        assert_eq!(board.gesture_cursor(), None);
    }

    #[test]
    fn pointer_jitter_is_dropped() {
        let mut board = Board::new(&config(Mode::Mouse));
        board.on_pointer(&mouse(PointerKind::Down, 10.0, 10.0));
        board.on_pointer(&mouse(PointerKind::Move, 10.0, 10.0));
        assert_eq!(board.store().strokes()[0].points.len(), 3);
    }

    #[test]
    fn canvas_follows_history() {
        let mut board = Board::new(&config(Mode::Mouse));
        board.on_pointer(&mouse(PointerKind::Down, 20.0, 50.0));
        board.on_pointer(&mouse(PointerKind::Move, 80.0, 50.0));
        board.on_pointer(&mouse(PointerKind::Up, 80.0, 50.0));
        assert_eq!(alpha_at(&board, 50, 50), 255);

        board.undo();
        assert_eq!(alpha_at(&board, 50, 50), 0);
        board.redo();
        assert_eq!(alpha_at(&board, 50, 50), 255);

        board.set_tool(Tool::Eraser);
        board.set_thickness(20.0).unwrap();
        board.on_pointer(&mouse(PointerKind::Down, 50.0, 20.0));
        board.on_pointer(&mouse(PointerKind::Move, 50.0, 80.0));
        board.on_pointer(&mouse(PointerKind::Up, 50.0, 80.0));
        assert_eq!(alpha_at(&board, 50, 50), 0);
        assert_eq!(alpha_at(&board, 25, 50), 255);
        assert_eq!(board.rendered_revision(), Some(board.store().revision()));
    }

    #[test]
    fn rejects_bad_brush_settings() {
        let mut board = Board::new(&config(Mode::Mouse));
        let before = *board.brush();
        assert!(board.set_color("purple").is_err());
        assert!(board.set_thickness(0.0).is_err());
        assert!(board.set_thickness(f32::NAN).is_err());
        assert!(board.set_thickness(100_000.0).is_err());
        assert!(board.set_thickness(0.5).is_err());
        assert_eq!(*board.brush(), before);

        board.set_color("#ff0000").unwrap();
        assert_eq!(board.brush().color, Color([255, 0, 0]));
    }

    #[test]
    fn save_hands_out_snapshot_once() {
        let mut board = Board::new(&config(Mode::Mouse));
        assert!(board.take_save_request().is_none());
        board.apply(Action::Save);
        let image = board.take_save_request().unwrap();
        assert_eq!(image.dimensions(), (200, 100));
        assert!(board.take_save_request().is_none());
    }

    #[test]
    fn resize_keeps_strokes() {
        let mut board = Board::new(&config(Mode::Mouse));
        board.on_pointer(&mouse(PointerKind::Down, 20.0, 50.0));
        board.on_pointer(&mouse(PointerKind::Move, 80.0, 50.0));
        board.on_pointer(&mouse(PointerKind::Up, 80.0, 50.0));
        board.resize(300, 200);
        assert_eq!(board.viewport(), vec2(300.0, 200.0));
        assert_eq!(alpha_at(&board, 50, 50), 255);
    }

    #[test]
    fn works_with_live_toolbar_layout() {
        let mut board = Board::new(&Config {
            width: 800,
            height: 600,
            ..Config::default()
        });
        let toolbar = Toolbar::new(board.viewport());
        let neon = toolbar.buttons()[1].rect;
        let center = neon.origin() + neon.size() / 2.0;
        pinch_at(&mut board, &toolbar, center, Instant::now());
        assert_eq!(board.brush().tool, Tool::Neon);
        assert!(board.store().strokes().is_empty());
    }
}
