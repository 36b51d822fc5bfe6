//! Layout of the landmark sets produced by MediaPipe's [Face Mesh] model.
//!
//! The model outputs [`NUM_LANDMARKS`] landmarks covering the face. With iris refinement enabled,
//! it appends 5 landmarks per iris, for a total of [`NUM_LANDMARKS_WITH_IRISES`].
//!
//! [Face Mesh]: https://google.github.io/mediapipe/solutions/face_mesh.html

use std::fmt;

use crate::landmark::Landmarks;

/// Number of landmarks of the face mesh, without the iris landmarks.
pub const NUM_LANDMARKS: usize = 468;

/// Number of landmarks produced when iris refinement is enabled.
pub const NUM_LANDMARKS_WITH_IRISES: usize = 478;

/// A single face's landmarks in Face Mesh layout.
#[derive(Clone)]
pub struct FaceMesh {
    landmarks: Landmarks,
}

impl FaceMesh {
    /// Wraps a landmark set, checking that it has one of the two Face Mesh layouts.
    pub fn new(landmarks: Landmarks) -> Result<Self, InvalidLayout> {
        match landmarks.len() {
            NUM_LANDMARKS | NUM_LANDMARKS_WITH_IRISES => Ok(Self { landmarks }),
            len => Err(InvalidLayout { len }),
        }
    }

    #[inline]
    pub fn into_landmarks(self) -> Landmarks {
        self.landmarks
    }
}

impl fmt::Debug for FaceMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FaceMesh")
            .field(&self.landmarks.len())
            .finish()
    }
}

/// Error returned by [`FaceMesh::new`] when the landmark count matches no Face Mesh layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLayout {
    len: usize,
}

impl fmt::Display for InvalidLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {NUM_LANDMARKS} or {NUM_LANDMARKS_WITH_IRISES} face landmarks, got {}",
            self.len
        )
    }
}

impl std::error::Error for InvalidLayout {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts() {
        for len in [NUM_LANDMARKS, NUM_LANDMARKS_WITH_IRISES] {
            let mesh = FaceMesh::new(Landmarks::new(len)).unwrap();
            assert_eq!(mesh.into_landmarks().len(), len);
        }

        let err = FaceMesh::new(Landmarks::new(100)).unwrap_err();
        assert_eq!(err.to_string(), "expected 468 or 478 face landmarks, got 100");
        assert!(FaceMesh::new(Landmarks::new(0)).is_err());
    }
}
