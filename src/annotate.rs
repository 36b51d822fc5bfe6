//! Per-frame annotation of camera frames with face landmarks.
//!
//! An [`Annotator`] paints a video frame onto a [`Surface`], and then overlays the landmark mesh
//! of the first detected face on top of it, one [`Layer`] at a time.

use std::{fmt, str::FromStr};

use anyhow::bail;
use itertools::Itertools;

use crate::{
    face::topology::{self, Topology},
    image::{draw, Color, Image, Resolution},
    landmark::Landmarks,
    timer::Timer,
};

/// A 2D drawing target for annotated frames.
///
/// All coordinates are in pixels of the surface.
pub trait Surface {
    /// Returns the current size of the surface, or [`None`] if it is not attached to any backing
    /// storage yet.
    fn resolution(&self) -> Option<Resolution>;

    /// Clears the entire surface.
    fn clear(&mut self);

    /// Draws `frame` stretched over the whole surface.
    fn draw_image(&mut self, frame: &Image);

    fn draw_line(&mut self, start: [f32; 2], end: [f32; 2], color: Color, width: u32);

    /// Draws a filled circle.
    fn draw_point(&mut self, center: [f32; 2], color: Color, radius: u32);
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn resolution(&self) -> Option<Resolution> {
        (**self).resolution()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn draw_image(&mut self, frame: &Image) {
        (**self).draw_image(frame)
    }

    fn draw_line(&mut self, start: [f32; 2], end: [f32; 2], color: Color, width: u32) {
        (**self).draw_line(start, end, color, width)
    }

    fn draw_point(&mut self, center: [f32; 2], color: Color, radius: u32) {
        (**self).draw_point(center, color, radius)
    }
}

/// A [`Surface`] backed by an in-memory [`Image`].
///
/// A canvas can be *detached*, in which case it has no backing image and annotating it does
/// nothing.
#[derive(Clone, Default)]
pub struct Canvas {
    image: Option<Image>,
}

impl Canvas {
    /// Creates a canvas without a backing image.
    pub fn detached() -> Self {
        Self { image: None }
    }

    /// Creates a canvas backed by a transparent image of the given resolution.
    pub fn new(res: impl Into<Resolution>) -> Self {
        let res = res.into();
        Self {
            image: Some(Image::new(res.width(), res.height())),
        }
    }

    /// Attaches a new transparent backing image of the given resolution, replacing any previous
    /// one.
    pub fn attach(&mut self, res: impl Into<Resolution>) {
        *self = Self::new(res);
    }

    /// Detaches the backing image, returning it.
    pub fn detach(&mut self) -> Option<Image> {
        self.image.take()
    }

    pub fn is_attached(&self) -> bool {
        self.image.is_some()
    }

    /// Returns the backing image, if any.
    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }
}

impl Surface for Canvas {
    fn resolution(&self) -> Option<Resolution> {
        self.image
            .as_ref()
            .map(Image::resolution)
            .filter(|res| !res.is_empty())
    }

    fn clear(&mut self) {
        if let Some(image) = &mut self.image {
            image.clear(Color::NONE);
        }
    }

    fn draw_image(&mut self, frame: &Image) {
        if let Some(image) = &mut self.image {
            image.draw_scaled(frame);
        }
    }

    fn draw_line(&mut self, start: [f32; 2], end: [f32; 2], color: Color, width: u32) {
        if let Some(image) = &mut self.image {
            draw::line(image, start[0], start[1], end[0], end[1])
                .color(color)
                .stroke_width(width);
        }
    }

    fn draw_point(&mut self, center: [f32; 2], color: Color, radius: u32) {
        if let Some(image) = &mut self.image {
            draw::point(image, center[0], center[1])
                .color(color)
                .radius(radius);
        }
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.image {
            Some(image) => write!(f, "Canvas({})", image.resolution()),
            None => f.write_str("Canvas(detached)"),
        }
    }
}

/// Visual style of an annotation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    color: Color,
    line_width: u32,
    point_radius: u32,
}

impl Style {
    pub const fn new(color: Color) -> Self {
        Self {
            color,
            line_width: 1,
            point_radius: 2,
        }
    }

    pub const fn line_width(self, line_width: u32) -> Self {
        Self { line_width, ..self }
    }

    pub const fn point_radius(self, point_radius: u32) -> Self {
        Self {
            point_radius,
            ..self
        }
    }

    pub const fn color(self, color: Color) -> Self {
        Self { color, ..self }
    }

    #[inline]
    pub fn stroke_color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn stroke_width(&self) -> u32 {
        self.line_width
    }

    #[inline]
    pub fn radius(&self) -> u32 {
        self.point_radius
    }
}

const RIGHT_COLOR: Color = Color::from_rgb8(0xff, 0x30, 0x30);
const LEFT_COLOR: Color = Color::from_rgb8(0x30, 0xff, 0x30);
const NEUTRAL_COLOR: Color = Color::from_rgb8(0xe0, 0xe0, 0xe0);

const NUM_LAYERS: usize = 10;

/// One overlay drawn by the [`Annotator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Tessellation,
    RightEye,
    LeftEye,
    RightEyebrow,
    LeftEyebrow,
    Lips,
    FaceOval,
    /// A dot on every landmark.
    Points,
    RightIris,
    LeftIris,
}

impl Layer {
    /// All layers, in the order they are drawn in.
    pub const ALL: [Layer; NUM_LAYERS] = [
        Layer::Tessellation,
        Layer::RightEye,
        Layer::LeftEye,
        Layer::RightEyebrow,
        Layer::LeftEyebrow,
        Layer::Lips,
        Layer::FaceOval,
        Layer::Points,
        Layer::RightIris,
        Layer::LeftIris,
    ];

    /// Returns the connections drawn by this layer, or [`None`] for [`Layer::Points`].
    pub fn topology(self) -> Option<&'static Topology> {
        Some(match self {
            Layer::Tessellation => &topology::TESSELATION,
            Layer::RightEye => &topology::RIGHT_EYE,
            Layer::LeftEye => &topology::LEFT_EYE,
            Layer::RightEyebrow => &topology::RIGHT_EYEBROW,
            Layer::LeftEyebrow => &topology::LEFT_EYEBROW,
            Layer::Lips => &topology::LIPS,
            Layer::FaceOval => &topology::FACE_OVAL,
            Layer::Points => return None,
            Layer::RightIris => &topology::RIGHT_IRIS,
            Layer::LeftIris => &topology::LEFT_IRIS,
        })
    }

    pub fn default_style(self) -> Style {
        match self {
            Layer::Tessellation => Style::new(Color::GREEN).line_width(1),
            Layer::RightEye | Layer::RightEyebrow | Layer::RightIris => {
                Style::new(RIGHT_COLOR).line_width(2)
            }
            Layer::LeftEye | Layer::LeftEyebrow | Layer::LeftIris => {
                Style::new(LEFT_COLOR).line_width(2)
            }
            Layer::Lips | Layer::FaceOval => Style::new(NEUTRAL_COLOR).line_width(2),
            Layer::Points => Style::new(Color::RED).point_radius(2),
        }
    }

    fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|&layer| layer == self)
            .unwrap_or_default()
    }

    /// Returns the human-readable name of the layer, like `"left eyebrow"`.
    pub fn name(self) -> &'static str {
        match self.topology() {
            Some(topology) => topology.name(),
            None => "points",
        }
    }
}

/// Parses a layer from its [name][Layer::name]. Words may also be separated by `-` or `_`.
impl FromStr for Layer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match Layer::ALL.into_iter().find(|layer| layer.name() == name) {
            Some(layer) => Ok(layer),
            None => bail!(
                "unknown layer '{s}' (expected one of: {})",
                Layer::ALL.iter().map(|layer| layer.name()).join(", ")
            ),
        }
    }
}

/// Draws frames and face landmark overlays onto a [`Surface`].
///
/// The annotator keeps no state between frames: calling [`Annotator::annotate`] twice with the
/// same inputs produces the same surface contents.
#[derive(Clone)]
pub struct Annotator {
    styles: [Style; NUM_LAYERS],
    t_annotate: Timer,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// Creates an annotator using the default style of every [`Layer`].
    pub fn new() -> Self {
        Self {
            styles: Layer::ALL.map(Layer::default_style),
            t_annotate: Timer::new("annotate"),
        }
    }

    /// Overrides the style used for `layer`.
    pub fn with_style(mut self, layer: Layer, style: Style) -> Self {
        self.styles[layer.position()] = style;
        self
    }

    /// Returns the layers in drawing order, together with their style.
    pub fn layers(&self) -> impl Iterator<Item = (Layer, Style)> + '_ {
        Layer::ALL.into_iter().zip(self.styles)
    }

    pub fn style(&self, layer: Layer) -> Style {
        self.styles[layer.position()]
    }

    /// Returns the timer measuring [`Annotator::annotate`].
    pub fn timer(&self) -> &Timer {
        &self.t_annotate
    }

    /// Draws `frame` onto `surface` and overlays the landmarks of the first face in `faces`.
    ///
    /// Returns the number of landmarks of the annotated face, or 0 if no face was annotated. If
    /// `surface` has no resolution or an empty one, nothing is drawn.
    ///
    /// Landmark sets without iris refinement are drawn without the iris layers.
    pub fn annotate<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame: &Image,
        faces: &[Landmarks],
    ) -> usize {
        let Some(res) = surface.resolution().filter(|res| !res.is_empty()) else {
            log::trace!("surface not attached, skipping frame");
            return 0;
        };

        let _guard = self.t_annotate.start();
        surface.clear();
        surface.draw_image(frame);

        let Some(face) = faces.first() else {
            return 0;
        };

        for (layer, style) in self.layers() {
            match layer.topology() {
                Some(topology) => draw_topology(surface, res, topology, face, layer, style),
                None => {
                    for landmark in face.iter() {
                        surface.draw_point(landmark.to_pixel(res), style.color, style.point_radius);
                    }
                }
            }
        }

        face.len()
    }
}

fn draw_topology<S: Surface + ?Sized>(
    surface: &mut S,
    res: Resolution,
    topology: &Topology,
    face: &Landmarks,
    layer: Layer,
    style: Style,
) {
    let mut skipped = 0;
    for conn in topology.connections() {
        match (face.try_get(conn.start()), face.try_get(conn.end())) {
            (Some(start), Some(end)) => surface.draw_line(
                start.to_pixel(res),
                end.to_pixel(res),
                style.color,
                style.line_width,
            ),
            _ => skipped += 1,
        }
    }

    if skipped != 0 {
        log::debug!(
            "{}: skipped {skipped} connection(s), only {} landmarks available",
            layer.name(),
            face.len(),
        );
    }
}

impl fmt::Debug for Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.layers()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::face::mesh::{NUM_LANDMARKS, NUM_LANDMARKS_WITH_IRISES};
    use crate::landmark::Landmark;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Clear,
        Image(Resolution),
        Line([f32; 2], [f32; 2], Color, u32),
        Point([f32; 2], Color, u32),
    }

    /// Records every draw call.
    #[derive(Default)]
    struct Recorder {
        res: Option<Resolution>,
        ops: Vec<Op>,
    }

    impl Recorder {
        fn new(res: Resolution) -> Self {
            Self {
                res: Some(res),
                ops: Vec::new(),
            }
        }

        fn lines_with(&self, color: Color) -> usize {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Line(_, _, c, _) if *c == color))
                .count()
        }
    }

    impl Surface for Recorder {
        fn resolution(&self) -> Option<Resolution> {
            self.res
        }

        fn clear(&mut self) {
            self.ops.push(Op::Clear);
        }

        fn draw_image(&mut self, frame: &Image) {
            self.ops.push(Op::Image(frame.resolution()));
        }

        fn draw_line(&mut self, start: [f32; 2], end: [f32; 2], color: Color, width: u32) {
            self.ops.push(Op::Line(start, end, color, width));
        }

        fn draw_point(&mut self, center: [f32; 2], color: Color, radius: u32) {
            self.ops.push(Op::Point(center, color, radius));
        }
    }

    fn random_face(len: usize) -> Landmarks {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let positions = (0..len)
            .map(|_| [rng.f32(), rng.f32(), rng.f32() - 0.5])
            .collect::<Vec<_>>();
        Landmarks::from_positions(positions)
    }

    fn frame() -> Image {
        Image::filled(Resolution::new(64, 48), Color::BLUE)
    }

    #[test]
    fn detached_surface_is_untouched() {
        let mut rec = Recorder::default();
        let count = Annotator::new().annotate(&mut rec, &frame(), &[random_face(478)]);
        assert_eq!(count, 0);
        assert!(rec.ops.is_empty());

        let mut canvas = Canvas::detached();
        assert_eq!(Annotator::new().annotate(&mut canvas, &frame(), &[]), 0);
        assert!(canvas.image().is_none());
    }

    #[test]
    fn no_faces_draws_only_frame() {
        let mut rec = Recorder::new(Resolution::RES_VGA);
        let count = Annotator::new().annotate(&mut rec, &frame(), &[]);
        assert_eq!(count, 0);
        assert_eq!(rec.ops, [Op::Clear, Op::Image(Resolution::new(64, 48))]);
    }

    #[test]
    fn returns_landmark_count() {
        let annotator = Annotator::new();
        for len in [NUM_LANDMARKS, NUM_LANDMARKS_WITH_IRISES] {
            let mut rec = Recorder::new(Resolution::RES_VGA);
            assert_eq!(annotator.annotate(&mut rec, &frame(), &[random_face(len)]), len);
        }
    }

    #[test]
    fn only_first_face_is_drawn() {
        let annotator = Annotator::new();
        let mut rec = Recorder::new(Resolution::RES_VGA);
        let count = annotator.annotate(
            &mut rec,
            &frame(),
            &[random_face(NUM_LANDMARKS), random_face(NUM_LANDMARKS_WITH_IRISES)],
        );
        assert_eq!(count, NUM_LANDMARKS);
        let points = rec
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Point(..)))
            .count();
        assert_eq!(points, NUM_LANDMARKS);
    }

    #[test]
    fn draw_order() {
        let mut rec = Recorder::new(Resolution::RES_VGA);
        Annotator::new().annotate(&mut rec, &frame(), &[random_face(478)]);

        assert_eq!(rec.ops[0], Op::Clear);
        assert!(matches!(rec.ops[1], Op::Image(_)));

        let tess = topology::TESSELATION.len();
        assert!(rec.ops[2..2 + tess]
            .iter()
            .all(|op| matches!(op, Op::Line(_, _, c, 1) if *c == Color::GREEN)));

        // Iris rings come last, after the landmark points.
        let iris = topology::RIGHT_IRIS.len() + topology::LEFT_IRIS.len();
        let (rest, irises) = rec.ops.split_at(rec.ops.len() - iris);
        assert!(matches!(rest.last(), Some(Op::Point(_, c, 2)) if *c == Color::RED));
        assert!(irises.iter().all(|op| matches!(op, Op::Line(_, _, _, 2))));
        assert_eq!(irises[0], {
            let face = random_face(478);
            let conn = topology::RIGHT_IRIS.connections()[0];
            Op::Line(
                face.get(conn.start()).to_pixel(Resolution::RES_VGA),
                face.get(conn.end()).to_pixel(Resolution::RES_VGA),
                RIGHT_COLOR,
                2,
            )
        });
    }

    #[test]
    fn iris_layers_skipped_without_refinement() {
        let annotator = Annotator::new();
        let mut plain = Recorder::new(Resolution::RES_VGA);
        annotator.annotate(&mut plain, &frame(), &[random_face(NUM_LANDMARKS)]);
        let mut refined = Recorder::new(Resolution::RES_VGA);
        annotator.annotate(&mut refined, &frame(), &[random_face(NUM_LANDMARKS_WITH_IRISES)]);

        let iris = topology::RIGHT_IRIS.len() + topology::LEFT_IRIS.len();
        let extra_points = NUM_LANDMARKS_WITH_IRISES - NUM_LANDMARKS;
        assert_eq!(refined.ops.len() - plain.ops.len(), iris + extra_points);
        assert!(matches!(plain.ops.last(), Some(Op::Point(..))));
    }

    #[test]
    fn layer_line_counts() {
        let mut rec = Recorder::new(Resolution::RES_VGA);
        Annotator::new().annotate(&mut rec, &frame(), &[random_face(478)]);

        assert_eq!(rec.lines_with(Color::GREEN), topology::TESSELATION.len());
        assert_eq!(
            rec.lines_with(RIGHT_COLOR),
            topology::RIGHT_EYE.len() + topology::RIGHT_EYEBROW.len() + topology::RIGHT_IRIS.len()
        );
        assert_eq!(
            rec.lines_with(NEUTRAL_COLOR),
            topology::LIPS.len() + topology::FACE_OVAL.len()
        );
    }

    #[test]
    fn segment_is_denormalized() {
        static SEGMENT: Topology = Topology::new("segment", &[topology::Connection::new(0, 1)]);

        let mut face = Landmarks::new(2);
        face.set(0, Landmark::new([0.5, 0.5, 0.0]));
        face.set(1, Landmark::new([0.6, 0.5, 0.0]));

        let mut rec = Recorder::new(Resolution::RES_VGA);
        draw_topology(
            &mut rec,
            Resolution::RES_VGA,
            &SEGMENT,
            &face,
            Layer::Lips,
            Layer::Lips.default_style(),
        );
        let [Op::Line(start, end, color, 2)] = &rec.ops[..] else {
            panic!("unexpected ops: {:?}", rec.ops);
        };
        assert_eq!(*color, NEUTRAL_COLOR);
        approx::assert_relative_eq!(start[0], 320.0);
        approx::assert_relative_eq!(start[1], 240.0);
        approx::assert_relative_eq!(end[0], 384.0);
        approx::assert_relative_eq!(end[1], 240.0);
    }

    #[test]
    fn annotated_segment_is_denormalized() {
        let conn = topology::TESSELATION
            .connections()
            .iter()
            .copied()
            .find(|conn| (conn.start(), conn.end()) == (326, 2))
            .unwrap();
        let mut face = Landmarks::new(NUM_LANDMARKS);
        face.set(conn.start(), Landmark::new([0.5, 0.5, 0.0]));
        face.set(conn.end(), Landmark::new([0.6, 0.5, 0.0]));

        let mut rec = Recorder::new(Resolution::RES_VGA);
        let count = Annotator::new().annotate(&mut rec, &frame(), &[face]);
        assert_eq!(count, NUM_LANDMARKS);

        let segment = rec
            .ops
            .iter()
            .find_map(|op| match op {
                Op::Line(start, end, Color::GREEN, 1) if start[0] > 0.0 && end[0] > 0.0 => {
                    Some((*start, *end))
                }
                _ => None,
            })
            .unwrap();
        approx::assert_relative_eq!(segment.0[0], 320.0);
        approx::assert_relative_eq!(segment.0[1], 240.0);
        approx::assert_relative_eq!(segment.1[0], 384.0);
        approx::assert_relative_eq!(segment.1[1], 240.0);
    }

    #[test]
    fn empty_surface_is_untouched() {
        let mut rec = Recorder::new(Resolution::new(0, 0));
        let count = Annotator::new().annotate(&mut rec, &frame(), &[random_face(478)]);
        assert_eq!(count, 0);
        assert!(rec.ops.is_empty());

        for res in [(0, 0), (64, 0)] {
            let mut canvas = Canvas::new(res);
            assert_eq!(canvas.resolution(), None);
            assert_eq!(Annotator::new().annotate(&mut canvas, &frame(), &[random_face(478)]), 0);
        }
    }

    #[test]
    fn idempotent() {
        let annotator = Annotator::new();
        let faces = [random_face(NUM_LANDMARKS_WITH_IRISES)];
        let mut canvas = Canvas::new((64, 48));

        annotator.annotate(&mut canvas, &frame(), &faces);
        let first = canvas.image().cloned();
        annotator.annotate(&mut canvas, &frame(), &faces);
        assert!(first.is_some());
        assert!(first.as_ref() == canvas.image());
    }

    #[test]
    fn canvas_shows_frame_and_overlay() {
        let mut canvas = Canvas::new((64, 48));
        let mut face = Landmarks::new(NUM_LANDMARKS);
        face.set(0, Landmark::new([0.5, 0.5, 0.0]));

        Annotator::new().annotate(&mut canvas, &frame(), &[face]);
        let image = canvas.image().unwrap();
        // Landmark 0 sits in the middle of the frame, every other landmark in the top left corner.
        assert_eq!(image.get(32, 24), Color::RED);
        assert_eq!(image.get(63, 47), Color::BLUE);
    }

    #[test]
    fn style_override() {
        let style = Style::new(Color::YELLOW).line_width(3);
        let annotator = Annotator::new().with_style(Layer::Lips, style);
        assert_eq!(annotator.style(Layer::Lips), style);
        assert_eq!(annotator.style(Layer::FaceOval), Layer::FaceOval.default_style());

        let mut rec = Recorder::new(Resolution::RES_VGA);
        annotator.annotate(&mut rec, &frame(), &[random_face(NUM_LANDMARKS)]);
        assert_eq!(rec.lines_with(Color::YELLOW), topology::LIPS.len());
    }

    #[test]
    fn layer_order() {
        let layers = Annotator::new()
            .layers()
            .map(|(layer, _)| layer)
            .collect::<Vec<_>>();
        assert_eq!(layers, Layer::ALL);
        assert_eq!(Layer::ALL[7], Layer::Points);
        assert_eq!(Layer::Points.topology().map(Topology::name), None);
        assert_eq!(Layer::RightIris.default_style().stroke_color(), RIGHT_COLOR);
    }

    #[test]
    fn parse_layer() {
        assert_eq!("lips".parse::<Layer>().unwrap(), Layer::Lips);
        assert_eq!("Left-Eyebrow".parse::<Layer>().unwrap(), Layer::LeftEyebrow);
        assert_eq!("face_oval".parse::<Layer>().unwrap(), Layer::FaceOval);
        assert_eq!("points".parse::<Layer>().unwrap(), Layer::Points);
        assert_eq!("tessellation".parse::<Layer>().unwrap(), Layer::Tessellation);
        let err = "nose".parse::<Layer>().unwrap_err();
        assert!(err.to_string().starts_with("unknown layer 'nose'"));
    }

    #[test]
    fn canvas_attach_detach() {
        let mut canvas = Canvas::detached();
        assert_eq!(canvas.resolution(), None);
        canvas.attach(Resolution::RES_VGA);
        assert_eq!(canvas.resolution(), Some(Resolution::RES_VGA));
        assert!(canvas.is_attached());
        let image = canvas.detach().unwrap();
        assert_eq!(image.resolution(), Resolution::RES_VGA);
        assert!(!canvas.is_attached());
    }
}
