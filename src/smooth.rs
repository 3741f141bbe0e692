use crate::math::Vec2f;

/// Strokes need more than this many points before they get smoothed.
const MIN_POINTS: usize = 4;

/// Smooths `points` and returns a sequence of the same length.
///
/// Two passes are applied: a moving average whose weights fall off linearly from the center of
/// the window (indices past either end are clamped to the nearest valid point), then a
/// `(prev + 2 * cur + next) / 4` pass over the interior points. The second pass runs in place, so
/// every point sees its already-smoothed predecessor.
///
/// The first and last input points are copied to the output unchanged, so the stroke keeps its
/// exact start and end.
pub fn smooth(points: &[Vec2f], window: usize) -> Vec<Vec2f> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let last = points.len() - 1;
    let half = window.min(points.len()) / 2;

    let mut smoothed: Vec<Vec2f> = (0..points.len())
        .map(|i| {
            let mut sum = Vec2f::zero();
            let mut weight_sum = 0.0;
            for j in -(half as isize)..=half as isize {
                let idx = (i as isize + j).clamp(0, last as isize) as usize;
                let weight = 1.0 - j.unsigned_abs() as f32 / (half + 1) as f32;
                sum += points[idx] * weight;
                weight_sum += weight;
            }
            sum / weight_sum
        })
        .collect();

    for i in 1..last {
        smoothed[i] = (smoothed[i - 1] + smoothed[i] * 2.0 + smoothed[i + 1]) / 4.0;
    }

    smoothed[0] = points[0];
    smoothed[last] = points[last];
    smoothed
}

/// When and how strongly an input path smooths the stroke it is drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smoothing {
    /// Largest window to use; the actual window never exceeds the stroke length.
    /// A window of 0 turns smoothing off.
    pub window: usize,
}

impl Smoothing {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Re-smooths the whole point list in place once it is long enough.
    pub fn apply(&self, points: &mut Vec<Vec2f>) {
        if self.window == 0 || points.len() <= MIN_POINTS {
            return;
        }
        let window = self.window.min(points.len());
        *points = smooth(points, window);
    }
}
