//! Drawing API for [`Image`]s.
//!
//! All functions return a *guard object* that allows optional customization of the shape and
//! performs the draw operation when dropped.
//!
//! All drawing operations *overwrite* the target pixel with the shape color. They do not perform
//! blending. Parts of a shape that fall outside of the image are clipped.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
};

use crate::image::{Color, Image};

/// Guard returned by [`line`][line()]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    image: &'a mut Image,
    start: [f32; 2],
    end: [f32; 2],
    color: Color,
    stroke_width: u32,
}

impl<'a> DrawLine<'a> {
    /// Sets the line's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl<'a> Drop for DrawLine<'a> {
    fn drop(&mut self) {
        match Line::new(to_point(self.start), to_point(self.end))
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width))
            .draw(&mut Target(&mut *self.image))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`point`][point()]; draws a filled dot when dropped.
pub struct DrawPoint<'a> {
    image: &'a mut Image,
    center: [f32; 2],
    color: Color,
    radius: u32,
}

impl<'a> DrawPoint<'a> {
    /// Sets the dot's color.
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the dot's radius in pixels.
    ///
    /// The default radius is 2. A radius of 0 draws a single pixel.
    pub fn radius(&mut self, radius: u32) -> &mut Self {
        self.radius = radius;
        self
    }
}

impl<'a> Drop for DrawPoint<'a> {
    fn drop(&mut self) {
        let center = to_point(self.center);
        match Circle::with_center(center, self.radius * 2 + 1)
            .into_styled(PrimitiveStyle::with_fill(self.color))
            .draw(&mut Target(&mut *self.image))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a line onto an image.
///
/// Coordinates are in pixels and get rounded to the nearest pixel.
pub fn line(
    image: &mut Image,
    start_x: f32,
    start_y: f32,
    end_x: f32,
    end_y: f32,
) -> DrawLine<'_> {
    DrawLine {
        image,
        start: [start_x, start_y],
        end: [end_x, end_y],
        color: Color::from_rgb8(0, 0, 255),
        stroke_width: 1,
    }
}

/// Draws a filled dot centered at `(x, y)`.
///
/// This is used to visualize individual landmarks.
pub fn point(image: &mut Image, x: f32, y: f32) -> DrawPoint<'_> {
    DrawPoint {
        image,
        center: [x, y],
        color: Color::RED,
        radius: 2,
    }
}

fn to_point([x, y]: [f32; 2]) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            self.0.set_clipped(pos.x, pos.y, color);
        }

        Ok(())
    }
}
