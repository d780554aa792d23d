use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::extract::CutoutRegion;
use crate::io::fits::ExtensionId;
use crate::io::header::Header;
use crate::quality::BadPixelPolicy;
use crate::rebin::ZoomPlan;
use crate::wcs::Wcs;

/// True for pixels that carry data: finite and not the bad-data sentinel.
///
/// A NaN sentinel never compares equal, so only the finiteness test applies.
#[inline]
pub fn is_good(value: f32, bad_data_value: f32) -> bool {
    value.is_finite() && value != bad_data_value
}

/// Per-channel bad-pixel settings, as configured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadPixelConfig {
    /// Sentinel marking bad data in the source (NaN = none).
    pub bad_data_value: f32,
    /// Honour GOODMIN/GOODMAX/BADPIX header keywords.
    pub use_badpix: bool,
    /// Quality extension holding per-pixel flags.
    pub quality_extension: Option<ExtensionId>,
    /// Quality value meaning "bad"; any plane differing from it keeps the pixel.
    pub quality_bad_value: f32,
}

impl Default for BadPixelConfig {
    fn default() -> Self {
        Self {
            bad_data_value: f32::NAN,
            use_badpix: false,
            quality_extension: None,
            quality_bad_value: 0.0,
        }
    }
}

/// Value statistics and display bounds of one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelStats {
    pub data_min: f64,
    pub data_max: f64,
    pub autoscale_min: f64,
    pub autoscale_max: f64,
    pub user_min: f64,
    pub user_max: f64,
    /// Lower autoscale percentile (0–100).
    pub autoscale_percent_low: f64,
    /// Upper autoscale percentile (0–100).
    pub autoscale_percent_high: f64,
    pub scale_factor: f64,
    /// Approximate median from the last autoscale histogram.
    pub median: Option<f64>,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            data_min: 0.0,
            data_max: 0.0,
            autoscale_min: 0.0,
            autoscale_max: 0.0,
            user_min: 0.0,
            user_max: 0.0,
            autoscale_percent_low: 0.0,
            autoscale_percent_high: 100.0,
            scale_factor: 1.0,
            median: None,
        }
    }
}

/// One band of a cutout.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Position in band order.
    pub index: usize,
    /// Source file; `None` for an absent channel.
    pub input: Option<PathBuf>,
    /// Pixel buffer, shape = (nrows, ncols). NaN means no data.
    pub data: Option<Array2<f32>>,
    /// Requested cutout in the source frame, before zoom.
    pub region: CutoutRegion,
    /// Source raster dimensions (cols, rows).
    pub source_dims: (usize, usize),
    pub zoom: ZoomPlan,
    /// Net geometric zoom applied to the buffer.
    pub zoom_factor: f64,
    pub bad_pixels: BadPixelConfig,
    /// Policy resolved against the source header.
    pub policy: BadPixelPolicy,
    pub wcs: Option<Wcs>,
    pub header: Header,
    pub stats: ChannelStats,
    /// Pixels newly flagged by the bad-pixel policy.
    pub bad_count: usize,
    pub overlaps_source: bool,
}

impl Channel {
    pub fn new(index: usize, input: Option<PathBuf>) -> Self {
        Self {
            index,
            input,
            data: None,
            region: CutoutRegion::default(),
            source_dims: (0, 0),
            zoom: ZoomPlan::identity(0, 0),
            zoom_factor: 1.0,
            bad_pixels: BadPixelConfig::default(),
            policy: BadPixelPolicy::None,
            wcs: None,
            header: Header::new(),
            stats: ChannelStats::default(),
            bad_count: 0,
            overlaps_source: false,
        }
    }

    pub fn ncols(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.ncols())
    }

    pub fn nrows(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.nrows())
    }

    pub fn bad_data_value(&self) -> f32 {
        self.bad_pixels.bad_data_value
    }

    /// Good pixel values in row-major order.
    pub fn good_values(&self) -> impl Iterator<Item = f32> + '_ {
        let bad = self.bad_data_value();
        self.data
            .iter()
            .flat_map(|d| d.iter().copied())
            .filter(move |&v| is_good(v, bad))
    }
}

/// The frame every aligned channel is brought onto.
#[derive(Clone, Debug, Default)]
pub struct Reference {
    pub input: PathBuf,
    /// Band index the reference was taken from.
    pub channel: usize,
    /// Source raster dimensions (cols, rows).
    pub source_dims: (usize, usize),
    /// Cutout in the reference source frame, before zoom.
    pub region: CutoutRegion,
    /// Final pixel dimensions of aligned channels.
    pub ncols: usize,
    pub nrows: usize,
    pub zoom: f64,
    /// Transform of the whole reference source raster.
    pub source_wcs: Option<Wcs>,
    /// Transform of the zoomed cutout.
    pub wcs: Option<Wcs>,
}

/// Multi-band cutout produced by the pipeline.
#[derive(Clone, Debug, Default)]
pub struct CutoutImage {
    pub channels: Vec<Channel>,
    pub reference: Reference,
    pub autoscale_performed: bool,
    pub user_min_set: bool,
    pub user_max_set: bool,
}

impl CutoutImage {
    /// Channels that hold pixel data.
    pub fn present(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.data.is_some())
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_good() {
        assert!(is_good(1.0, f32::NAN));
        assert!(!is_good(f32::NAN, f32::NAN));
        assert!(!is_good(f32::INFINITY, f32::NAN));
        assert!(!is_good(-999.0, -999.0));
        assert!(is_good(0.0, -999.0));
    }
}
