use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to allocate {width}x{height} pixmap")]
    Allocation { width: u32, height: u32 },

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("PNG encode error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, RasterError>;
