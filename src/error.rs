use std::{error::Error as StdError, fmt};

/// Errors reported to the user of a [`Session`][crate::session::Session].
#[derive(Debug)]
pub enum Error {
    /// The face landmark model could not be initialized.
    ModelInit(anyhow::Error),
    /// The camera was started before a face landmark model was initialized.
    NotInitialized,
    /// The video source could not be opened.
    Camera(anyhow::Error),
    /// The face landmark model failed to process a frame.
    Model(anyhow::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ModelInit(err) => write!(f, "failed to initialize face mesh: {:#}", err),
            Error::NotInitialized => f.write_str("face mesh is not initialized"),
            Error::Camera(err) => write!(f, "failed to access camera: {:#}", err),
            Error::Model(err) => write!(f, "face mesh failed to process frame: {:#}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::ModelInit(err) | Error::Camera(err) | Error::Model(err) => Some(&**err),
            Error::NotInitialized => None,
        }
    }
}
