pub mod autoscale;
pub mod range;
pub mod transform;

use std::borrow::Cow;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::image::CutoutImage;

pub use autoscale::{autoscale_image, scan_min_max};
pub use range::display_range;

/// Pixel value transform applied before display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    #[default]
    Linear,
    Log,
    Sqrt,
    HistEq,
    Asinh,
    /// Multiply by the configured per-channel factor.
    Factor,
    /// Divide by the EXPTIME header value.
    Rate,
}

impl std::fmt::Display for ScaleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "Linear"),
            Self::Log => write!(f, "Log"),
            Self::Sqrt => write!(f, "Sqrt"),
            Self::HistEq => write!(f, "Histogram equalization"),
            Self::Asinh => write!(f, "Asinh"),
            Self::Factor => write!(f, "Factor"),
            Self::Rate => write!(f, "Rate"),
        }
    }
}

/// How the display range is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Data minimum and maximum.
    #[default]
    MinMax,
    /// Percentile autoscale over the cutout.
    Auto,
    /// Percentile autoscale over a row sample of the whole source image.
    Full,
    /// User-supplied bounds.
    User,
}

impl ScaleMode {
    pub fn is_autoscale(&self) -> bool {
        matches!(self, Self::Auto | Self::Full)
    }
}

impl std::fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinMax => write!(f, "Min/Max"),
            Self::Auto => write!(f, "Auto"),
            Self::Full => write!(f, "Full"),
            Self::User => write!(f, "User"),
        }
    }
}

/// Scan ranges, apply `scale_type`, then autoscale when `mode` asks for it.
pub fn scale_image(image: &mut CutoutImage, scale_type: ScaleType, mode: ScaleMode) -> Result<()> {
    scan_min_max(image);
    scale_scanned_image(image, scale_type, mode)
}

/// [`scale_image`] for channels whose data range is already scanned.
pub fn scale_scanned_image(
    image: &mut CutoutImage,
    scale_type: ScaleType,
    mode: ScaleMode,
) -> Result<()> {
    debug!(%scale_type, %mode, "Scaling image");
    match scale_type {
        ScaleType::Linear => {}
        ScaleType::Log => transform::log_image(image),
        ScaleType::Sqrt => transform::sqrt_image(image),
        ScaleType::HistEq => transform::histeq_image(image),
        ScaleType::Asinh => transform::asinh_image(image, mode)?,
        ScaleType::Factor => transform::mult_image(image),
        ScaleType::Rate => transform::rate_image(image),
    }

    if mode.is_autoscale() {
        autoscale_image(image, mode)?;
    }
    Ok(())
}

/// Row-major pixel values, borrowed when the buffer is contiguous.
pub(crate) fn pixel_values(data: &Array2<f32>) -> Cow<'_, [f32]> {
    match data.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(data.iter().copied().collect()),
    }
}
