use std::{fmt, str::FromStr};

use anyhow::bail;
use serde::Deserialize;

use crate::{
    math::{vec2, Vec2f},
    stroke::Tool,
};

/// Something a toolbar button (or a key binding) does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Pen,
    Neon,
    Eraser,
    Undo,
    Redo,
    Clear,
    Save,
    /// Toggles between camera and mouse input.
    Mode,
}

impl Action {
    /// Toolbar order, left to right.
    pub const ALL: [Action; 8] = [
        Action::Pen,
        Action::Neon,
        Action::Eraser,
        Action::Undo,
        Action::Redo,
        Action::Clear,
        Action::Save,
        Action::Mode,
    ];

    /// The drawing tool this action selects, if it is a tool button.
    pub fn tool(self) -> Option<Tool> {
        match self {
            Action::Pen => Some(Tool::Pen),
            Action::Neon => Some(Tool::Neon),
            Action::Eraser => Some(Tool::Eraser),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Action::Pen => "pen",
            Action::Neon => "neon",
            Action::Eraser => "eraser",
            Action::Undo => "undo",
            Action::Redo => "redo",
            Action::Clear => "clear",
            Action::Save => "save",
            Action::Mode => "mode",
        }
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Action::ALL.into_iter().find(|action| action.key() == s) {
            Some(action) => Ok(action),
            None => bail!("unknown toolbar action '{s}'"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn from_origin_size(origin: Vec2f, size: Vec2f) -> Self {
        Self {
            left: origin.x(),
            top: origin.y(),
            right: origin.x() + size.x(),
            bottom: origin.y() + size.y(),
        }
    }

    /// Edges count as inside.
    pub fn contains(&self, p: Vec2f) -> bool {
        p.x() >= self.left && p.x() <= self.right && p.y() >= self.top && p.y() <= self.bottom
    }

    pub fn origin(&self) -> Vec2f {
        vec2(self.left, self.top)
    }

    pub fn size(&self) -> Vec2f {
        vec2(self.right - self.left, self.bottom - self.top)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Button {
    pub action: Action,
    pub rect: Rect,
}

/// Live source of toolbar button geometry.
///
/// Queried on every hit-test, since the layout can change between frames.
pub trait ToolbarLayout {
    fn buttons(&self) -> Vec<Button>;
}

/// Returns the action of the first button containing `point`.
pub fn hit_test(layout: &dyn ToolbarLayout, point: Vec2f) -> Option<Action> {
    layout
        .buttons()
        .into_iter()
        .find(|button| button.rect.contains(point))
        .map(|button| button.action)
}

const BUTTON_SIZE: f32 = 40.0;
const BUTTON_GAP: f32 = 8.0;
const BOTTOM_MARGIN: f32 = 16.0;

/// The bottom-centered toolbar row: a collapse toggle followed by every [`Action`].
#[derive(Debug, Clone, Copy)]
pub struct Toolbar {
    pub viewport: Vec2f,
    pub expanded: bool,
}

impl Toolbar {
    pub fn new(viewport: Vec2f) -> Self {
        Self {
            viewport,
            expanded: true,
        }
    }

    /// The expand/collapse toggle; it is not an action and never hit-tested.
    pub fn toggle_rect(&self) -> Rect {
        Rect::from_origin_size(self.slot_origin(0), vec2(BUTTON_SIZE, BUTTON_SIZE))
    }

    fn slot_count(&self) -> usize {
        if self.expanded {
            1 + Action::ALL.len()
        } else {
            1
        }
    }

    fn slot_origin(&self, slot: usize) -> Vec2f {
        let n = self.slot_count() as f32;
        let row_width = n * BUTTON_SIZE + (n - 1.0) * BUTTON_GAP;
        let left = (self.viewport.x() - row_width) / 2.0;
        vec2(
            left + slot as f32 * (BUTTON_SIZE + BUTTON_GAP),
            self.viewport.y() - BOTTOM_MARGIN - BUTTON_SIZE,
        )
    }
}

impl ToolbarLayout for Toolbar {
    fn buttons(&self) -> Vec<Button> {
        if !self.expanded {
            return Vec::new();
        }
        Action::ALL
            .into_iter()
            .enumerate()
            .map(|(i, action)| Button {
                action,
                rect: Rect::from_origin_size(self.slot_origin(i + 1), vec2(BUTTON_SIZE, BUTTON_SIZE)),
            })
            .collect()
    }
}
