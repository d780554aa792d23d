use std::fs::File;
use std::path::{Path, PathBuf};

use fitsio_pure::hdu::{parse_fits, Hdu as RawHdu, HduInfo};
use fitsio_pure::image::{extract_blank, extract_bscale_bzero, read_image_section, ImageData};
use memmap2::Mmap;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{FitscutError, Result};
use crate::io::header::Header;

/// Identifies a secondary HDU either by its position or by EXTNAME.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionId {
    Number(usize),
    Name(String),
}

impl std::fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "#{n}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// One header/data unit of a FITS file.
#[derive(Clone, Debug)]
pub struct Hdu {
    pub index: usize,
    pub header: Header,
    pub bitpix: i64,
    /// NAXISn values, fastest-varying axis first.
    pub naxes: Vec<usize>,
    pub bscale: f64,
    pub bzero: f64,
    pub blank: Option<i64>,
    raw: RawHdu,
}

impl Hdu {
    fn from_raw(index: usize, raw: RawHdu) -> Self {
        let (bitpix, naxes) = match &raw.info {
            HduInfo::Primary { bitpix, naxes } | HduInfo::Image { bitpix, naxes } => {
                (*bitpix, naxes.clone())
            }
            _ => (0, Vec::new()),
        };
        let (bscale, bzero) = extract_bscale_bzero(&raw.cards);
        Self {
            index,
            header: Header::from_cards(&raw.cards),
            bitpix,
            naxes,
            bscale,
            bzero,
            blank: extract_blank(&raw.cards),
            raw,
        }
    }

    pub fn width(&self) -> usize {
        self.naxes.first().copied().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.naxes.get(1).copied().unwrap_or(0)
    }

    /// Number of 2-D planes stacked along the trailing axes.
    pub fn planes(&self) -> usize {
        self.naxes.iter().skip(2).product::<usize>().max(1)
    }

    /// True for primary or IMAGE HDUs carrying a non-empty 2-D (or deeper)
    /// array. Tables and tile-compressed images are skipped.
    pub fn is_image(&self) -> bool {
        matches!(self.raw.info, HduInfo::Primary { .. } | HduInfo::Image { .. })
            && self.naxes.len() >= 2
            && self.width() > 0
            && self.height() > 0
    }

    pub fn extname(&self) -> Option<String> {
        self.header.get_str("EXTNAME")
    }

    fn integer_sample<T>(&self, raw: T) -> f32
    where
        T: AsPrimitive<f64> + AsPrimitive<i64>,
    {
        let as_int: i64 = <T as AsPrimitive<i64>>::as_(raw);
        if self.blank == Some(as_int) {
            return f32::NAN;
        }
        let as_float: f64 = <T as AsPrimitive<f64>>::as_(raw);
        (self.bzero + self.bscale * as_float) as f32
    }

    fn float_sample<T: AsPrimitive<f64>>(&self, raw: T) -> f32 {
        (self.bzero + self.bscale * raw.as_()) as f32
    }

    /// Append physical values of every `step`-th decoded sample.
    fn push_physical(&self, data: &ImageData, step: usize, out: &mut Vec<f32>) {
        match data {
            ImageData::U8(v) => out.extend(v.iter().step_by(step).map(|&p| self.integer_sample(p))),
            ImageData::I16(v) => out.extend(v.iter().step_by(step).map(|&p| self.integer_sample(p))),
            ImageData::I32(v) => out.extend(v.iter().step_by(step).map(|&p| self.integer_sample(p))),
            ImageData::I64(v) => out.extend(v.iter().step_by(step).map(|&p| self.integer_sample(p))),
            ImageData::F32(v) => out.extend(v.iter().step_by(step).map(|&p| self.float_sample(p))),
            ImageData::F64(v) => out.extend(v.iter().step_by(step).map(|&p| self.float_sample(p))),
        }
    }
}

/// A rectangular, optionally decimated, window of one image plane.
///
/// Coordinates are 0-based; `x_inc`/`y_inc` select every n-th column/row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRegion {
    pub x0: usize,
    pub y0: usize,
    pub cols: usize,
    pub rows: usize,
    pub x_inc: usize,
    pub y_inc: usize,
    pub plane: usize,
}

impl PixelRegion {
    pub fn new(x0: usize, y0: usize, cols: usize, rows: usize) -> Self {
        Self {
            x0,
            y0,
            cols,
            rows,
            x_inc: 1,
            y_inc: 1,
            plane: 0,
        }
    }

    pub fn with_row_step(mut self, y_inc: usize) -> Self {
        self.y_inc = y_inc.max(1);
        self
    }

    pub fn on_plane(mut self, plane: usize) -> Self {
        self.plane = plane;
        self
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn last_col(&self) -> usize {
        self.x0 + self.cols.saturating_sub(1) * self.x_inc
    }

    fn last_row(&self) -> usize {
        self.y0 + self.rows.saturating_sub(1) * self.y_inc
    }
}

/// Memory-mapped FITS file; HDU structure is parsed by `fitsio_pure`.
pub struct FitsFile {
    mmap: Mmap,
    path: PathBuf,
    hdus: Vec<Hdu>,
}

impl FitsFile {
    /// Open a FITS file and index all of its HDUs.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let parsed = parse_fits(&mmap)
            .map_err(|e| FitscutError::InvalidFits(format!("{}: {e}", path.display())))?;
        let hdus: Vec<Hdu> = parsed
            .hdus
            .into_iter()
            .enumerate()
            .map(|(index, raw)| Hdu::from_raw(index, raw))
            .collect();

        debug!(path = %path.display(), hdus = hdus.len(), "Opened FITS file");
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            hdus,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    pub fn hdu(&self, index: usize) -> Result<&Hdu> {
        self.hdus.get(index).ok_or_else(|| {
            FitscutError::ExtensionNotFound(format!("{}: HDU #{index}", self.path.display()))
        })
    }

    /// First HDU holding image data; the primary array may be empty.
    pub fn image_hdu(&self) -> Result<&Hdu> {
        self.hdus.iter().find(|h| h.is_image()).ok_or_else(|| {
            FitscutError::InvalidFits(format!("{}: no image HDU found", self.path.display()))
        })
    }

    /// Look up an extension by number or (case-insensitive) EXTNAME.
    pub fn find_extension(&self, id: &ExtensionId) -> Option<&Hdu> {
        match id {
            ExtensionId::Number(n) => self.hdus.get(*n).filter(|h| h.index > 0),
            ExtensionId::Name(name) => self.hdus.iter().skip(1).find(|h| {
                h.extname()
                    .is_some_and(|ext| ext.trim().eq_ignore_ascii_case(name.trim()))
            }),
        }
    }

    /// Read a window of one plane as `f32` physical values (BSCALE/BZERO
    /// applied, BLANK mapped to NaN), row-major.
    pub fn read_region(&self, hdu: &Hdu, region: &PixelRegion) -> Result<Vec<f32>> {
        if region.is_empty() {
            return Ok(Vec::new());
        }
        if !hdu.is_image()
            || region.last_col() >= hdu.width()
            || region.last_row() >= hdu.height()
            || region.plane >= hdu.planes()
        {
            return Err(FitscutError::InvalidFits(format!(
                "{}: region {:?} outside {}x{}x{} image",
                self.path.display(),
                region,
                hdu.width(),
                hdu.height(),
                hdu.planes()
            )));
        }

        trace!(?region, bitpix = hdu.bitpix, "Reading FITS region");

        let plane_start = region.plane * hdu.width() * hdu.height();
        let span = region.last_col() - region.x0 + 1;
        let mut out = Vec::with_capacity(region.len());
        for r in 0..region.rows {
            let y = region.y0 + r * region.y_inc;
            let start = plane_start + y * hdu.width() + region.x0;
            let row = read_image_section(&self.mmap, &hdu.raw, start, span).map_err(|e| {
                FitscutError::InvalidFits(format!("{}: row {y}: {e}", self.path.display()))
            })?;
            hdu.push_physical(&row, region.x_inc, &mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds() {
        let region = PixelRegion::new(2, 3, 4, 5).with_row_step(2);
        assert_eq!(region.last_col(), 5);
        assert_eq!(region.last_row(), 11);
        assert_eq!(region.len(), 20);
    }

    #[test]
    fn test_extension_id_display() {
        assert_eq!(ExtensionId::Number(2).to_string(), "#2");
        assert_eq!(ExtensionId::Name("QUALITY".into()).to_string(), "QUALITY");
    }
}
