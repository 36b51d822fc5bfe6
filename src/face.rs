//! Face Mesh landmark layout and the connections between its landmarks.

pub mod mesh;
pub mod topology;
