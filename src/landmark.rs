//! Landmark sets produced by a face landmark model.
//!
//! Landmark positions are *normalized*: X and Y are relative to the width and height of the image
//! the landmarks were estimated on (so that `(0.0, 0.0)` is the top left corner and `(1.0, 1.0)`
//! the bottom right corner), and Z is a relative depth with roughly the same scale as X. Use
//! [`Landmark::to_pixel`] to map a landmark onto an image or drawing surface.

use crate::image::Resolution;

type Position = [f32; 3];

/// The landmarks of a single face.
#[derive(Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Position]>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` preallocated landmarks.
    ///
    /// All landmarks will start with all coordinates at `0.0`.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0, 0.0]; len].into_boxed_slice(),
        }
    }

    pub fn from_positions(positions: impl Into<Box<[Position]>>) -> Self {
        Self {
            positions: positions.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        self.positions.iter().map(|&pos| Landmark::new(pos))
    }

    /// Returns the landmark at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> Landmark {
        Landmark::new(self.positions[index])
    }

    /// Returns the landmark at `index`, or [`None`] if the set has fewer landmarks.
    #[inline]
    pub fn try_get(&self, index: usize) -> Option<Landmark> {
        self.positions.get(index).copied().map(Landmark::new)
    }

    pub fn set(&mut self, index: usize, landmark: Landmark) {
        self.positions[index] = landmark.pos;
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Shortens the set to the first `len` landmarks.
    ///
    /// Has no effect if the set is already `len` or shorter.
    pub fn truncate(&mut self, len: usize) {
        if len < self.positions.len() {
            self.positions = self.positions[..len].into();
        }
    }
}

impl std::fmt::Debug for Landmarks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Landmarks({} points)", self.len())
    }
}

/// A landmark in normalized 3D space.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: [f32; 3],
}

impl Landmark {
    pub fn new(position: [f32; 3]) -> Self {
        Self { pos: position }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Maps this landmark to pixel coordinates on an image of resolution `res`.
    ///
    /// The depth coordinate is discarded.
    #[inline]
    pub fn to_pixel(&self, res: Resolution) -> [f32; 2] {
        res.denormalize(self.x(), self.y())
    }
}
