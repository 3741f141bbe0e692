use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::bail;
use serde::Deserialize;

use crate::{stroke::Brush, stroke::RedoPolicy, toolbar::Action};

const MAX_NEON_BLUR: f32 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pinch gestures from the hand tracker draw.
    #[default]
    Camera,
    /// Mouse, pen and touch draw.
    Mouse,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Camera => Mode::Mouse,
            Mode::Mouse => Mode::Camera,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub width: u32,
    pub height: u32,
    pub brush: Brush,
    pub gesture: Gesture,
    pub pointer: Pointer,
    pub history: History,
    pub render: Render,
    pub detector: Option<Detector>,
    /// Keyboard characters bound to toolbar actions.
    pub bind: HashMap<String, Action>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            width: 1280,
            height: 720,
            brush: Brush::default(),
            gesture: Gesture::default(),
            pointer: Pointer::default(),
            history: History::default(),
            render: Render::default(),
            detector: None,
            bind: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.gesture.pinch_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            bail!("`gesture.pinch_threshold` must be between 0 and 1 (got {threshold})");
        }
        if !Brush::THICKNESS.contains(&self.brush.thickness) {
            bail!(
                "`brush.thickness` must be between {} and {} (got {})",
                Brush::THICKNESS.start(),
                Brush::THICKNESS.end(),
                self.brush.thickness
            );
        }
        let blur = self.render.neon_blur;
        if !(0.0..=MAX_NEON_BLUR).contains(&blur) {
            bail!("`render.neon_blur` must be between 0 and {MAX_NEON_BLUR} (got {blur})");
        }
        if !(self.pointer.min_distance >= 0.0) {
            bail!(
                "`pointer.min_distance` must not be negative (got {})",
                self.pointer.min_distance
            );
        }
        if self.pointer.seed_points == 0 {
            bail!("`pointer.seed_points` must be at least 1");
        }
        if self.width == 0 || self.height == 0 {
            bail!("canvas size must not be zero ({}x{})", self.width, self.height);
        }
        if let Some(detector) = &self.detector {
            match (&detector.command, &detector.replay) {
                (Some(command), None) if command.is_empty() => {
                    bail!("`detector.command` must not be empty")
                }
                (Some(_), None) | (None, Some(_)) => {}
                _ => bail!("[detector] needs exactly one of `command` or `replay`"),
            }
            if !(detector.fps > 0.0) {
                bail!("`detector.fps` must be positive (got {})", detector.fps);
            }
        }
        for key in self.bind.keys() {
            if key.chars().count() != 1 {
                bail!("[bind] keys must be single characters (found '{key}')");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Gesture {
    /// Thumb-to-index distance, in normalized camera units, below which the hand is pinching.
    pub pinch_threshold: f32,
    /// Minimum time before the same toolbar button can be selected again.
    pub debounce_ms: u64,
    /// Smoothing window for gesture strokes. 0 keeps the tracked points as they are.
    pub smoothing_window: usize,
    /// End the stroke being drawn when the hand disappears from the camera.
    pub release_on_tracking_loss: bool,
}

impl Gesture {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for Gesture {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.07,
            debounce_ms: 800,
            smoothing_window: 0,
            release_on_tracking_loss: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pointer {
    /// Moves shorter than this (in pixels) are dropped.
    pub min_distance: f32,
    pub seed_points: usize,
    pub smoothing_window: usize,
}

impl Default for Pointer {
    fn default() -> Self {
        Self {
            min_distance: 2.0,
            seed_points: 3,
            smoothing_window: 7,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct History {
    pub redo: RedoPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Render {
    pub neon_blur: f32,
}

impl Default for Render {
    fn default() -> Self {
        Self { neon_blur: 12.0 }
    }
}

/// Where hand landmark frames come from.
#[derive(Debug, Clone, Deserialize)]
pub struct Detector {
    /// Program (and arguments) that prints one frame per line on stdout.
    pub command: Option<Vec<String>>,
    /// File of recorded frames, one per line.
    pub replay: Option<PathBuf>,
    /// Playback rate of `replay`. Live trackers set their own pace.
    #[serde(default = "default_fps")]
    pub fps: f32,
}

fn default_fps() -> f32 {
    30.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{Color, Tool};

    #[test]
    fn parses_example_config() {
        let config = Config::load("config.example.toml").unwrap();
        assert_eq!(config.bind.get("z"), Some(&Action::Undo));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.mode, Mode::Camera);
        assert_eq!(config.brush.tool, Tool::Pen);
        assert_eq!(config.brush.color, Color([0x22, 0xd3, 0xee]));
        assert_eq!(config.brush.thickness, 4.0);
        assert_eq!(config.gesture.pinch_threshold, 0.07);
        assert_eq!(config.gesture.debounce(), Duration::from_millis(800));
        assert_eq!(config.gesture.smoothing_window, 0);
        assert_eq!(config.pointer.min_distance, 2.0);
        assert_eq!(config.pointer.seed_points, 3);
        assert_eq!(config.history.redo, RedoPolicy::ClearOnEdit);
        assert!(config.detector.is_none());
    }

    #[test]
    fn parses_sections() {
        let config: Config = toml::from_str(
            r##"
            mode = "mouse"

            [brush]
            tool = "neon"
            color = "#ff00aa"

            [history]
            redo = "retain"

            [detector]
            replay = "frames.jsonl"

            [bind]
            "e" = "eraser"
            "##,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.mode, Mode::Mouse);
        assert_eq!(config.brush.tool, Tool::Neon);
        assert_eq!(config.brush.color, Color([0xff, 0x00, 0xaa]));
        assert_eq!(config.brush.thickness, 4.0);
        assert_eq!(config.history.redo, RedoPolicy::Retain);
        assert_eq!(
            config.detector.unwrap().replay,
            Some(PathBuf::from("frames.jsonl"))
        );
        assert_eq!(config.bind["e"], Action::Eraser);
    }

    #[test]
    fn rejects_invalid_values() {
        let invalid = [
            "[gesture]\npinch_threshold = 0.0",
            "[gesture]\npinch_threshold = 1.5",
            "[brush]\nthickness = -1.0",
            "[brush]\nthickness = 100000.0",
            "[render]\nneon_blur = -1.0",
            "[render]\nneon_blur = 1e6",
            "[render]\nneon_blur = nan",
            "[pointer]\nmin_distance = -2.0",
            "[pointer]\nseed_points = 0",
            "[detector]\n",
            "[detector]\ncommand = []",
            "[detector]\ncommand = [\"hands\"]\nreplay = \"x\"",
            "[detector]\nreplay = \"x\"\nfps = 0.0",
            "[bind]\n\"ctrl-z\" = \"undo\"",
        ];
        for src in invalid {
            let config: Config = toml::from_str(src).unwrap();
            assert!(config.validate().is_err(), "accepted: {src}");
        }
        assert!(toml::from_str::<Config>("[brush]\ncolor = \"teal\"").is_err());
        assert!(toml::from_str::<Config>("[bind]\n\"x\" = \"explode\"").is_err());
    }
}
