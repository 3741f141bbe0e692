use crate::{
    math::{distance, Vec2f},
    smooth::Smoothing,
    stroke::{Brush, Store},
};

/// Bit of [`PointerEvent::buttons`] that is set while the primary button is held.
pub const PRIMARY_BUTTON: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Mouse,
    Pen,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub device: Device,
    /// Button that changed state; `0` is the primary button.
    pub button: u16,
    /// Buttons held down while the event fired.
    pub buttons: u32,
    /// Position relative to the viewport.
    pub position: Vec2f,
}

/// Turns pointer events into strokes.
#[derive(Debug)]
pub struct PointerAdapter {
    /// Moves closer than this to the previous point are dropped.
    min_distance: f32,
    /// Number of copies of the first point a stroke starts with, giving the smoother context.
    seed_points: usize,
    smoothing: Smoothing,
    /// Top-left corner of the canvas, in viewport coordinates.
    pub canvas_origin: Vec2f,
}

impl PointerAdapter {
    pub fn new(min_distance: f32, seed_points: usize, smoothing: Smoothing) -> Self {
        Self {
            min_distance,
            seed_points,
            smoothing,
            canvas_origin: Vec2f::zero(),
        }
    }

    pub fn handle(&self, event: &PointerEvent, store: &mut Store, brush: &Brush) {
        match event.kind {
            PointerKind::Down | PointerKind::Up
                if event.device == Device::Mouse && event.button != 0 => {}
            PointerKind::Down => {
                store.begin_stroke(
                    brush.color,
                    brush.thickness,
                    brush.tool,
                    self.to_canvas(event.position),
                    self.seed_points,
                );
            }
            PointerKind::Move => {
                if !store.is_drawing() {
                    return;
                }
                // The up event can get lost (e.g. released outside the window).
                if event.device == Device::Mouse && event.buttons & PRIMARY_BUTTON == 0 {
                    store.end_stroke();
                    return;
                }

                let point = self.to_canvas(event.position);
                let last = store
                    .active_stroke()
                    .and_then(|stroke| stroke.points.last().copied());
                if let Some(last) = last {
                    if distance(last, point) < self.min_distance {
                        return;
                    }
                }
                store.extend_active_stroke(point, self.smoothing);
            }
            PointerKind::Up | PointerKind::Leave => store.end_stroke(),
        }
    }

    fn to_canvas(&self, position: Vec2f) -> Vec2f {
        position - self.canvas_origin
    }
}
