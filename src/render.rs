use crate::{
    math::Vec2f,
    stroke::{Color, Stroke, Tool},
};

/// How the pixels of a stroke combine with what is already on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Paint over existing pixels.
    SourceOver,
    /// Remove existing pixels where the stroke covers them.
    DestinationOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
    /// Like `Butt`, extended by half the line width.
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Round,
    Bevel,
}

/// Blurred copy of the stroke painted underneath it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub color: Color,
    pub blur: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub composite: Composite,
    pub shadow: Option<Shadow>,
}

/// Minimal 2D drawing surface: one path at a time, stroked with a style.
pub trait Surface {
    /// Erases the whole surface to transparent.
    fn clear(&mut self);
    /// Discards the current path.
    fn begin_path(&mut self);
    fn move_to(&mut self, p: Vec2f);
    fn line_to(&mut self, p: Vec2f);
    /// Paints the current path.
    fn stroke(&mut self, style: &StrokeStyle);
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    /// Shadow blur radius of neon strokes.
    pub neon_blur: f32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self { neon_blur: 12.0 }
    }
}

impl Renderer {
    /// Clears `surface` and draws every stroke in order, later strokes on top.
    pub fn render(&self, strokes: &[Stroke], surface: &mut dyn Surface) {
        surface.clear();
        for stroke in strokes {
            let Some((first, rest)) = stroke.points.split_first() else {
                continue;
            };
            surface.begin_path();
            surface.move_to(*first);
            for &p in rest {
                surface.line_to(p);
            }
            surface.stroke(&self.style(stroke));
        }
    }

    pub fn style(&self, stroke: &Stroke) -> StrokeStyle {
        let base = StrokeStyle {
            color: stroke.color,
            width: stroke.thickness,
            cap: LineCap::Round,
            join: LineJoin::Round,
            composite: Composite::SourceOver,
            shadow: None,
        };
        match stroke.tool {
            Tool::Pen => base,
            Tool::Neon => StrokeStyle {
                width: stroke.thickness + 2.0,
                shadow: Some(Shadow {
                    color: stroke.color,
                    blur: self.neon_blur,
                }),
                ..base
            },
            Tool::Eraser => StrokeStyle {
                color: Color::BLACK,
                composite: Composite::DestinationOut,
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vec2;

    #[derive(Debug, PartialEq)]
    enum Op {
        Clear,
        BeginPath,
        MoveTo(Vec2f),
        LineTo(Vec2f),
        Stroke(StrokeStyle),
    }

    #[derive(Default)]
    struct Recorder(Vec<Op>);

    impl Surface for Recorder {
        fn clear(&mut self) {
            self.0.push(Op::Clear);
        }

        fn begin_path(&mut self) {
            self.0.push(Op::BeginPath);
        }

        fn move_to(&mut self, p: Vec2f) {
            self.0.push(Op::MoveTo(p));
        }

        fn line_to(&mut self, p: Vec2f) {
            self.0.push(Op::LineTo(p));
        }

        fn stroke(&mut self, style: &StrokeStyle) {
            self.0.push(Op::Stroke(*style));
        }
    }

    fn stroke(tool: Tool, points: &[Vec2f]) -> Stroke {
        Stroke {
            tool,
            color: Color([255, 0, 0]),
            thickness: 6.0,
            points: points.to_vec(),
        }
    }

    #[test]
    fn empty_board_only_clears() {
        let mut rec = Recorder::default();
        Renderer::default().render(&[], &mut rec);
        assert_eq!(rec.0, [Op::Clear]);
    }

    #[test]
    fn strokes_are_drawn_in_order_as_polylines() {
        let a = [vec2(0.0, 0.0), vec2(5.0, 5.0), vec2(10.0, 0.0)];
        let b = [vec2(1.0, 1.0)];
        let renderer = Renderer::default();
        let strokes = [stroke(Tool::Pen, &a), stroke(Tool::Eraser, &b)];
        let mut rec = Recorder::default();
        renderer.render(&strokes, &mut rec);

        assert_eq!(
            rec.0,
            [
                Op::Clear,
                Op::BeginPath,
                Op::MoveTo(a[0]),
                Op::LineTo(a[1]),
                Op::LineTo(a[2]),
                Op::Stroke(renderer.style(&strokes[0])),
                Op::BeginPath,
                Op::MoveTo(b[0]),
                Op::Stroke(renderer.style(&strokes[1])),
            ]
        );
    }

    #[test]
    fn pointless_strokes_are_skipped() {
        let mut rec = Recorder::default();
        Renderer::default().render(&[stroke(Tool::Pen, &[])], &mut rec);
        assert_eq!(rec.0, [Op::Clear]);
    }

    #[test]
    fn per_tool_styles() {
        let renderer = Renderer { neon_blur: 9.0 };
        let points = [vec2(0.0, 0.0)];

        let pen = renderer.style(&stroke(Tool::Pen, &points));
        assert_eq!(pen.width, 6.0);
        assert_eq!(pen.color, Color([255, 0, 0]));
        assert_eq!(pen.composite, Composite::SourceOver);
        assert_eq!((pen.cap, pen.join), (LineCap::Round, LineJoin::Round));
        assert_eq!(pen.shadow, None);

        let neon = renderer.style(&stroke(Tool::Neon, &points));
        assert_eq!(neon.width, 8.0);
        assert_eq!(
            neon.shadow,
            Some(Shadow {
                color: Color([255, 0, 0]),
                blur: 9.0
            })
        );
        assert_eq!(neon.composite, Composite::SourceOver);

        let eraser = renderer.style(&stroke(Tool::Eraser, &points));
        assert_eq!(eraser.width, 6.0);
        assert_eq!(eraser.color, Color::BLACK);
        assert_eq!(eraser.composite, Composite::DestinationOut);
        assert_eq!(eraser.shadow, None);
    }
}
