use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitscutError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Invalid cutout for channel {channel}: {reason}")]
    InvalidCutout { channel: usize, reason: String },

    #[error("Cutout does not overlap any input image")]
    NoOverlap,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Alignment error: {0}")]
    Alignment(String),
}

pub type Result<T> = std::result::Result<T, FitscutError>;
