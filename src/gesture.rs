use std::time::{Duration, Instant};

use crate::{
    math::{distance, map_to_canvas, vec2, Vec2f},
    toolbar::{self, Action, ToolbarLayout},
};

pub const LANDMARK_COUNT: usize = 21;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;

/// The landmarks of one tracked hand, each normalized to `[0, 1]²` in camera space.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [Vec2f; LANDMARK_COUNT],
}

impl Hand {
    pub fn new(landmarks: [Vec2f; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    /// Returns `None` unless exactly [`LANDMARK_COUNT`] landmarks are given.
    pub fn from_slice(landmarks: &[Vec2f]) -> Option<Self> {
        Some(Self::new(landmarks.try_into().ok()?))
    }

    pub fn landmarks(&self) -> &[Vec2f; LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn thumb_tip(&self) -> Vec2f {
        self.landmarks[THUMB_TIP]
    }

    pub fn index_tip(&self) -> Vec2f {
        self.landmarks[INDEX_TIP]
    }

    /// Canvas position of landmark `i`, in the same orientation as the mirrored preview.
    pub fn canvas_position(&self, i: usize, viewport: Vec2f) -> Vec2f {
        let p = self.landmarks[i];
        map_to_canvas(vec2(1.0 - p.x(), p.y()), viewport.x(), viewport.y())
    }
}

/// What a landmark frame asks the board to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// No hand in this frame.
    Lost,
    /// The cursor is over a toolbar button; nothing is drawn.
    Hover(Action),
    /// A pinch over a toolbar button that passed the debounce.
    Select(Action),
    /// Pinching away from the toolbar: draw at this canvas point.
    Draw(Vec2f),
    /// Neither pinching nor over the toolbar.
    Lift,
}

#[derive(Debug)]
pub struct Recognizer {
    pinch_threshold: f32,
    debounce: Duration,
    pinching: bool,
    hovered: Option<Action>,
    cursor: Option<Vec2f>,
    last_selection: Option<(Action, Instant)>,
}

impl Recognizer {
    pub fn new(pinch_threshold: f32, debounce: Duration) -> Self {
        Self {
            pinch_threshold,
            debounce,
            pinching: false,
            hovered: None,
            cursor: None,
            last_selection: None,
        }
    }

    pub fn is_pinching(&self) -> bool {
        self.pinching
    }

    /// The toolbar button under the gesture cursor, for highlighting.
    pub fn hovered(&self) -> Option<Action> {
        self.hovered
    }

    /// Canvas position of the index fingertip in the last frame with a hand.
    pub fn cursor(&self) -> Option<Vec2f> {
        self.cursor
    }

    /// Forgets the current gesture, e.g. when camera input is switched off.
    pub fn reset(&mut self) {
        self.pinching = false;
        self.hovered = None;
        self.cursor = None;
    }

    /// Processes one landmark frame.
    ///
    /// Toolbar buttons take priority over drawing: pinching over a button selects it and never
    /// draws underneath it.
    pub fn process(
        &mut self,
        hand: Option<&Hand>,
        viewport: Vec2f,
        layout: &dyn ToolbarLayout,
        now: Instant,
    ) -> Step {
        let Some(hand) = hand else {
            self.reset();
            return Step::Lost;
        };

        self.pinching = distance(hand.index_tip(), hand.thumb_tip()) < self.pinch_threshold;

        let cursor = hand.canvas_position(INDEX_TIP, viewport);
        self.cursor = Some(cursor);
        self.hovered = toolbar::hit_test(layout, cursor);

        match (self.hovered, self.pinching) {
            (Some(action), true) => {
                let debounced = matches!(
                    self.last_selection,
                    Some((last, at)) if last == action && now.saturating_duration_since(at) < self.debounce
                );
                if debounced {
                    Step::Hover(action)
                } else {
                    self.last_selection = Some((action, now));
                    Step::Select(action)
                }
            }
            (Some(action), false) => Step::Hover(action),
            (None, true) => Step::Draw(cursor),
            (None, false) => Step::Lift,
        }
    }
}
