use std::{fmt, mem, ops::RangeInclusive, str::FromStr};

use anyhow::bail;
use serde::{de::Visitor, Deserialize};

use crate::{math::Vec2f, smooth::Smoothing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    /// Pen stroke with a blurred glow in the stroke color.
    Neon,
    /// Removes whatever was painted below the stroke.
    Eraser,
}

/// Opaque RGB stroke color, written as `#rrggbb` or `#rgb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);
}

impl Default for Color {
    fn default() -> Self {
        Color([0x22, 0xd3, 0xee])
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(hex) = s.trim().strip_prefix('#') else {
            bail!("color '{s}' does not start with '#'");
        };
        if !hex.is_ascii() {
            bail!("invalid color '{s}'");
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16);
        let rgb = match hex.len() {
            6 => [channel(&hex[0..2]), channel(&hex[2..4]), channel(&hex[4..6])],
            3 => [
                channel(&hex[0..1]).map(|c| c * 0x11),
                channel(&hex[1..2]).map(|c| c * 0x11),
                channel(&hex[2..3]).map(|c| c * 0x11),
            ],
            _ => bail!("color '{s}' must have 3 or 6 hex digits"),
        };
        match rgb {
            [Ok(r), Ok(g), Ok(b)] => Ok(Color([r, g, b])),
            _ => bail!("invalid hex digits in color '{s}'"),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl<'a> Deserialize<'a> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        struct FromStrVisitor;

        impl<'de> Visitor<'de> for FromStrVisitor {
            type Value = Color;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("hex color like \"#22d3ee\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(|e| E::custom(format_args!("{e}")))
            }
        }

        deserializer.deserialize_str(FromStrVisitor)
    }
}

/// One continuous line drawn with a single tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub tool: Tool,
    /// Only meaningful for [`Tool::Pen`] and [`Tool::Neon`].
    pub color: Color,
    pub thickness: f32,
    pub points: Vec<Vec2f>,
}

/// Tool settings applied to the next stroke.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Brush {
    pub tool: Tool,
    pub color: Color,
    pub thickness: f32,
}

impl Brush {
    /// Stroke widths, in pixels, that a brush accepts.
    pub const THICKNESS: RangeInclusive<f32> = 1.0..=64.0;
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            color: Color::default(),
            thickness: 4.0,
        }
    }
}

/// What happens to undone strokes once a new stroke is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedoPolicy {
    /// Beginning a stroke discards everything that could have been redone.
    #[default]
    ClearOnEdit,
    /// Undone strokes stay redoable forever (until `clear`), even across new strokes.
    Retain,
}

/// Owns every stroke on the board plus the undo/redo history.
///
/// Only the last stroke can be mutated, and only while a draw is in progress.
#[derive(Debug, Default)]
pub struct Store {
    strokes: Vec<Stroke>,
    /// Undone strokes; the most recently undone one is at the end.
    redo: Vec<Stroke>,
    drawing: bool,
    policy: RedoPolicy,
    /// Bumped on every change to `strokes`, so consumers know when to redraw.
    revision: u64,
}

impl Store {
    pub fn new(policy: RedoPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn redo_buffer(&self) -> &[Stroke] {
        &self.redo
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the stroke currently being drawn.
    pub fn active_stroke(&self) -> Option<&Stroke> {
        if self.drawing {
            self.strokes.last()
        } else {
            None
        }
    }

    /// Starts a new stroke seeded with `seed` copies of `first` (at least one).
    pub fn begin_stroke(
        &mut self,
        color: Color,
        thickness: f32,
        tool: Tool,
        first: Vec2f,
        seed: usize,
    ) {
        if self.policy == RedoPolicy::ClearOnEdit && !self.redo.is_empty() {
            log::debug!("discarding {} redoable stroke(s)", self.redo.len());
            self.redo.clear();
        }

        self.strokes.push(Stroke {
            tool,
            color,
            thickness,
            points: vec![first; seed.max(1)],
        });
        self.drawing = true;
        self.revision += 1;
        log::debug!(
            "began stroke #{} ({tool:?}, {color}, {thickness}px)",
            self.strokes.len()
        );
    }

    /// Appends `point` to the active stroke, then lets `smoothing` rewrite its points.
    ///
    /// Does nothing when no stroke is being drawn.
    pub fn extend_active_stroke(&mut self, point: Vec2f, smoothing: Smoothing) {
        if !self.drawing {
            return;
        }
        let Some(stroke) = self.strokes.last_mut() else {
            return;
        };
        stroke.points.push(point);
        smoothing.apply(&mut stroke.points);
        self.revision += 1;
    }

    pub fn end_stroke(&mut self) {
        if mem::take(&mut self.drawing) {
            if let Some(stroke) = self.strokes.last() {
                log::debug!("ended stroke with {} points", stroke.points.len());
            }
        }
    }

    pub fn undo(&mut self) {
        self.end_stroke();
        if let Some(stroke) = self.strokes.pop() {
            self.redo.push(stroke);
            self.revision += 1;
        }
    }

    pub fn redo(&mut self) {
        self.end_stroke();
        if let Some(stroke) = self.redo.pop() {
            self.strokes.push(stroke);
            self.revision += 1;
        }
    }

    pub fn clear(&mut self) {
        self.end_stroke();
        self.strokes.clear();
        self.redo.clear();
        self.revision += 1;
    }
}
