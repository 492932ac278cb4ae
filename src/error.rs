use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("An I/O error occurred: {0}")]
    Io(#[from] io::Error),

    #[error("A network error occurred while talking to the analysis backend: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The analysis backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Could not decode a frame or heatmap image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Invalid base64 image payload: {0}")]
    Base64(#[from] data_encoding::DecodeError),

    #[error("Malformed frame data: {0}")]
    MalformedFrame(String),

    #[error("Background task completed")]
    BackgroundTaskCompleted,
}
