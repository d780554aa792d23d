use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BLOCK_BUDGET_BYTES, MAX_CHANNELS};
use crate::error::{FitscutError, Result};
use crate::image::BadPixelConfig;
use crate::scale::{ScaleMode, ScaleType};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CutoutConfig {
    /// Input bands in order (red, green, blue).
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub zoom: ZoomConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    /// Bad-pixel defaults for channels without their own settings.
    #[serde(default)]
    pub bad_pixels: BadPixelConfig,
    /// Working-buffer budget for one block of source rows.
    #[serde(default = "default_block_budget")]
    pub block_budget_bytes: usize,
}

fn default_block_budget() -> usize {
    DEFAULT_BLOCK_BUDGET_BYTES
}

impl CutoutConfig {
    /// Single-channel config with all defaults.
    pub fn single(input: impl Into<PathBuf>) -> Self {
        Self {
            channels: vec![ChannelConfig::new(input)],
            region: RegionConfig::default(),
            zoom: ZoomConfig::default(),
            scaling: ScalingConfig::default(),
            alignment: AlignmentConfig::default(),
            bad_pixels: BadPixelConfig::default(),
            block_budget_bytes: DEFAULT_BLOCK_BUDGET_BYTES,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FitscutError::InvalidConfig(e.to_string()))
    }

    /// Region of channel `k`, falling back to the shared region.
    pub fn region_for(&self, k: usize) -> &RegionConfig {
        self.channels
            .get(k)
            .and_then(|c| c.region.as_ref())
            .unwrap_or(&self.region)
    }

    /// Bad-pixel settings of channel `k`, falling back to the shared ones.
    pub fn bad_pixels_for(&self, k: usize) -> &BadPixelConfig {
        self.channels
            .get(k)
            .and_then(|c| c.bad_pixels.as_ref())
            .unwrap_or(&self.bad_pixels)
    }

    /// Reject inconsistent settings before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(FitscutError::InvalidConfig("no input channels".into()));
        }
        if self.channels.len() > MAX_CHANNELS {
            return Err(FitscutError::InvalidConfig(format!(
                "{} channels given, at most {MAX_CHANNELS} supported",
                self.channels.len()
            )));
        }
        if self.channels.iter().all(|c| c.input.is_none()) {
            return Err(FitscutError::InvalidConfig("every channel is empty".into()));
        }

        for (k, channel) in self.channels.iter().enumerate() {
            if channel.input.is_none() {
                continue;
            }
            if let CutoutSize::Pixels { width, height } = self.region_for(k).size {
                if width <= 0 || height <= 0 {
                    return Err(FitscutError::InvalidCutout {
                        channel: k,
                        reason: format!("size {width}x{height} must be positive"),
                    });
                }
            }
            if let Some(f) = channel.scale_factor {
                check_factor(f)?;
            }
            check_percentiles(
                channel.percent_low.unwrap_or(self.scaling.percent_low),
                channel.percent_high.unwrap_or(self.scaling.percent_high),
            )?;
        }

        let reference = self.alignment.reference_channel;
        if self
            .channels
            .get(reference)
            .is_none_or(|c| c.input.is_none())
        {
            return Err(FitscutError::InvalidConfig(format!(
                "reference channel {reference} has no input"
            )));
        }

        if !self.zoom.factor.is_finite() || self.zoom.factor < 0.0 {
            return Err(FitscutError::InvalidConfig(format!(
                "zoom factor {} must be positive (0 disables zoom)",
                self.zoom.factor
            )));
        }
        if self.zoom.output_size == Some(0) {
            return Err(FitscutError::InvalidConfig("output size must be positive".into()));
        }
        check_factor(self.scaling.scale_factor)?;
        if self.block_budget_bytes == 0 {
            return Err(FitscutError::InvalidConfig("block budget must be positive".into()));
        }
        Ok(())
    }
}

fn check_factor(f: f64) -> Result<()> {
    if f.is_finite() {
        Ok(())
    } else {
        Err(FitscutError::InvalidConfig(format!("scale factor {f} is not finite")))
    }
}

fn check_percentiles(low: f64, high: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low > high {
        return Err(FitscutError::InvalidConfig(format!(
            "autoscale percentiles {low}..{high} must satisfy 0 <= low <= high <= 100"
        )));
    }
    Ok(())
}

/// One input band with optional per-channel overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// `None` leaves the band empty.
    pub input: Option<PathBuf>,
    pub region: Option<RegionConfig>,
    pub bad_pixels: Option<BadPixelConfig>,
    pub user_min: Option<f64>,
    pub user_max: Option<f64>,
    pub scale_factor: Option<f64>,
    pub percent_low: Option<f64>,
    pub percent_high: Option<f64>,
}

impl ChannelConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::default()
        }
    }
}

/// Cutout size in source pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CutoutSize {
    /// The whole source raster.
    #[default]
    Full,
    Pixels { width: i64, height: i64 },
}

impl std::fmt::Display for CutoutSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::Pixels { width, height } => write!(f, "{width}x{height}"),
        }
    }
}

/// Where the cutout sits, in 0-based source pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    /// Centered on the source raster.
    #[default]
    ImageCenter,
    Center { x: f64, y: f64 },
    Corner { x: i64, y: i64 },
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImageCenter => write!(f, "Image center"),
            Self::Center { x, y } => write!(f, "Center ({x}, {y})"),
            Self::Corner { x, y } => write!(f, "Corner ({x}, {y})"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub size: CutoutSize,
    pub anchor: Anchor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    /// Geometric zoom; 0 or 1 disables integral rebinning.
    pub factor: f64,
    /// Longest output side; overrides `factor`.
    pub output_size: Option<usize>,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            factor: 0.0,
            output_size: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub scale_type: ScaleType,
    pub mode: ScaleMode,
    /// Lower autoscale percentile (0–100).
    pub percent_low: f64,
    /// Upper autoscale percentile (0–100).
    pub percent_high: f64,
    pub user_min: Option<f64>,
    pub user_max: Option<f64>,
    pub scale_factor: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_type: ScaleType::default(),
            mode: ScaleMode::default(),
            percent_low: 0.5,
            percent_high: 99.5,
            user_min: None,
            user_max: None,
            scale_factor: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignMode {
    /// Channels keep their own geometry.
    #[default]
    None,
    /// Channels are resampled onto the reference channel's grid.
    Reference,
}

impl std::fmt::Display for AlignMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Reference => write!(f, "Reference"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub mode: AlignMode,
    pub reference_channel: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_fallback() {
        let mut config = CutoutConfig::single("a.fits");
        config.channels.push(ChannelConfig {
            region: Some(RegionConfig {
                size: CutoutSize::Pixels {
                    width: 4,
                    height: 4,
                },
                anchor: Anchor::Corner { x: 0, y: 0 },
            }),
            ..ChannelConfig::new("b.fits")
        });
        assert_eq!(config.region_for(0).size, CutoutSize::Full);
        assert_eq!(
            config.region_for(1).size,
            CutoutSize::Pixels {
                width: 4,
                height: 4
            }
        );
    }
}
