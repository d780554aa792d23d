pub mod align;

use std::sync::Arc;

use tracing::{debug, warn};
use ::wcs::{ImgXY, LonLat, WCSParams, WCS};

use crate::io::header::Header;

/// Pixel (1-based) to world (degrees) transform of a 2-D raster.
///
/// The linear part is kept here so cropping and zooming can derive new
/// transforms through [`Wcs::with_update`]; celestial projections are
/// evaluated by the `wcs` crate. Axes whose CTYPE names no projection are
/// treated as plain linear axes.
#[derive(Clone, Debug)]
pub struct Wcs {
    naxis: [usize; 2],
    crpix: [f64; 2],
    crval: [f64; 2],
    /// `cd[i][j]` = CD(i+1)_(j+1).
    cd: [[f64; 2]; 2],
    ctype: [String; 2],
    sky: SkyParams,
    projection: Option<Arc<WCS>>,
}

/// Projection keywords carried through crops and zooms unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
struct SkyParams {
    lonpole: Option<f64>,
    latpole: Option<f64>,
    equinox: Option<f64>,
    radesys: Option<String>,
    pv2: [Option<f64>; 4],
}

impl SkyParams {
    fn from_header(header: &Header) -> Self {
        Self {
            lonpole: header.get_f64("LONPOLE"),
            latpole: header.get_f64("LATPOLE"),
            equinox: header.get_f64("EQUINOX"),
            radesys: header.get_str("RADESYS"),
            pv2: [0, 1, 2, 3].map(|m| header.get_f64(&format!("PV2_{m}"))),
        }
    }
}

impl Wcs {
    /// Build from header keywords. Accepts a CD matrix, or CDELT with an
    /// optional PC matrix or CROTA2 rotation. `None` when the keywords are
    /// absent, the matrix is singular or the projection is not supported.
    pub fn from_header(header: &Header) -> Option<Self> {
        let ctype = [
            header.get_str("CTYPE1").unwrap_or_default(),
            header.get_str("CTYPE2").unwrap_or_default(),
        ];
        let wcs = Self {
            naxis: [
                header.get_i64("NAXIS1").unwrap_or(0).max(0) as usize,
                header.get_i64("NAXIS2").unwrap_or(0).max(0) as usize,
            ],
            crpix: [header.get_f64("CRPIX1")?, header.get_f64("CRPIX2")?],
            crval: [header.get_f64("CRVAL1")?, header.get_f64("CRVAL2")?],
            cd: cd_matrix(header)?,
            ctype: ctype.map(|c| celestial_ctype(&c).unwrap_or(c)),
            sky: SkyParams::from_header(header),
            projection: None,
        };
        wcs.build()
    }

    /// Plain linear axes: `world = crval + cd · (pixel - crpix)`.
    pub fn linear(naxis: [usize; 2], crpix: [f64; 2], crval: [f64; 2], cd: [[f64; 2]; 2]) -> Self {
        Self {
            naxis,
            crpix,
            crval,
            cd,
            ctype: [String::new(), String::new()],
            sky: SkyParams::default(),
            projection: None,
        }
    }

    fn build(mut self) -> Option<Self> {
        if cd_inverse(&self.cd).is_none() {
            debug!("Singular CD matrix, ignoring transform");
            return None;
        }
        if self.is_celestial() {
            match WCS::new(&self.params()) {
                Ok(projection) => self.projection = Some(Arc::new(projection)),
                Err(e) => {
                    warn!(ctype = %self.ctype[0], error = ?e, "Unsupported WCS projection, ignoring transform");
                    return None;
                }
            }
        }
        Some(self)
    }

    fn params(&self) -> WCSParams {
        WCSParams {
            naxis: 2,
            naxis1: Some(self.naxis[0] as i64),
            naxis2: Some(self.naxis[1] as i64),
            ctype1: self.ctype[0].clone(),
            ctype2: Some(self.ctype[1].clone()),
            crpix1: Some(self.crpix[0]),
            crpix2: Some(self.crpix[1]),
            crval1: Some(self.crval[0]),
            crval2: Some(self.crval[1]),
            cd1_1: Some(self.cd[0][0]),
            cd1_2: Some(self.cd[0][1]),
            cd2_1: Some(self.cd[1][0]),
            cd2_2: Some(self.cd[1][1]),
            lonpole: self.sky.lonpole,
            latpole: self.sky.latpole,
            equinox: self.sky.equinox,
            radesys: self.sky.radesys.clone(),
            pv2_0: self.sky.pv2[0],
            pv2_1: self.sky.pv2[1],
            pv2_2: self.sky.pv2[2],
            pv2_3: self.sky.pv2[3],
            // `WCSParams` has no `Default` impl; every remaining field is unset.
            naxis3: None, naxis4: None, znaxis1: None, znaxis2: None, znaxis3: None,
            znaxis4: None, crpix3: None, crval3: None, cd1_3: None, cd2_3: None, cd3_1: None,
            cd3_2: None, cd3_3: None, pc1_1: None, pc1_2: None, pc1_3: None, pc2_1: None,
            pc2_2: None, pc2_3: None, pc3_1: None, pc3_2: None, pc3_3: None, cdelt1: None,
            cdelt2: None, cdelt3: None, crota1: None, crota2: None, crota3: None, ctype3: None,
            pv1_0: None, pv1_1: None, pv1_2: None, pv2_4: None, pv2_5: None, pv2_6: None,
            pv2_7: None, pv2_8: None, pv2_9: None, pv2_10: None, pv2_11: None, pv2_12: None,
            pv2_13: None, pv2_14: None, pv2_15: None, pv2_16: None, pv2_17: None, pv2_18: None,
            pv2_19: None, pv2_20: None, epoch: None, a_order: None, a_0_0: None, a_0_1: None,
            a_0_2: None, a_0_3: None, a_0_4: None, a_0_5: None, a_0_6: None, a_1_0: None,
            a_1_1: None, a_1_2: None, a_1_3: None, a_1_4: None, a_1_5: None, a_2_0: None,
            a_2_1: None, a_2_2: None, a_2_3: None, a_2_4: None, a_3_0: None, a_3_1: None,
            a_3_2: None, a_3_3: None, a_4_0: None, a_4_1: None, a_4_2: None, a_5_0: None,
            a_5_1: None, a_6_0: None, b_order: None, b_0_0: None, b_0_1: None, b_0_2: None,
            b_0_3: None, b_0_4: None, b_0_5: None, b_0_6: None, b_1_0: None, b_1_1: None,
            b_1_2: None, b_1_3: None, b_1_4: None, b_1_5: None, b_2_0: None, b_2_1: None,
            b_2_2: None, b_2_3: None, b_2_4: None, b_3_0: None, b_3_1: None, b_3_2: None,
            b_3_3: None, b_4_0: None, b_4_1: None, b_4_2: None, b_5_0: None, b_5_1: None,
            b_6_0: None, ap_order: None, ap_0_0: None, ap_0_1: None, ap_0_2: None, ap_0_3: None,
            ap_0_4: None, ap_0_5: None, ap_0_6: None, ap_1_0: None, ap_1_1: None, ap_1_2: None,
            ap_1_3: None, ap_1_4: None, ap_1_5: None, ap_2_0: None, ap_2_1: None, ap_2_2: None,
            ap_2_3: None, ap_2_4: None, ap_3_0: None, ap_3_1: None, ap_3_2: None, ap_3_3: None,
            ap_4_0: None, ap_4_1: None, ap_4_2: None, ap_5_0: None, ap_5_1: None, ap_6_0: None,
            bp_order: None, bp_0_0: None, bp_0_1: None, bp_0_2: None, bp_0_3: None,
            bp_0_4: None, bp_0_5: None, bp_0_6: None, bp_1_0: None, bp_1_1: None, bp_1_2: None,
            bp_1_3: None, bp_1_4: None, bp_1_5: None, bp_2_0: None, bp_2_1: None, bp_2_2: None,
            bp_2_3: None, bp_2_4: None, bp_3_0: None, bp_3_1: None, bp_3_2: None, bp_3_3: None,
            bp_4_0: None, bp_4_1: None, bp_4_2: None, bp_5_0: None, bp_5_1: None, bp_6_0: None,
        }
    }

    pub fn naxis(&self) -> [usize; 2] {
        self.naxis
    }

    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    pub fn crval(&self) -> [f64; 2] {
        self.crval
    }

    pub fn cd(&self) -> [[f64; 2]; 2] {
        self.cd
    }

    pub fn ctype(&self) -> &[String; 2] {
        &self.ctype
    }

    /// True when both axes name a sky projection (`RA---TAN`, `GLAT-CAR`, ...).
    pub fn is_celestial(&self) -> bool {
        self.ctype.iter().all(|c| celestial_ctype(c).is_some())
    }

    /// World coordinates (degrees) of a 1-based pixel position; `None`
    /// outside the projection's domain.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match &self.projection {
            Some(projection) => {
                let lonlat = projection.unproj(&ImgXY::new(x, y))?;
                Some((
                    lonlat.lon().to_degrees().rem_euclid(360.0),
                    lonlat.lat().to_degrees(),
                ))
            }
            None => {
                let dx = x - self.crpix[0];
                let dy = y - self.crpix[1];
                Some((
                    self.crval[0] + self.cd[0][0] * dx + self.cd[0][1] * dy,
                    self.crval[1] + self.cd[1][0] * dx + self.cd[1][1] * dy,
                ))
            }
        }
    }

    /// 1-based pixel position of a world coordinate; `None` when it cannot be
    /// projected.
    pub fn world_to_pixel(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match &self.projection {
            Some(projection) => {
                let xy = projection.proj(&LonLat::new(lon.to_radians(), lat.to_radians()))?;
                Some((xy.x(), xy.y()))
            }
            None => {
                let inv = cd_inverse(&self.cd)?;
                let u = lon - self.crval[0];
                let v = lat - self.crval[1];
                Some((
                    self.crpix[0] + inv[0][0] * u + inv[0][1] * v,
                    self.crpix[1] + inv[1][0] * u + inv[1][1] * v,
                ))
            }
        }
    }

    /// Transform of the cutout starting at 0-based corner `(x0, y0)` and
    /// rebinned by `zoom`, sized `ncols × nrows`.
    ///
    /// `crpix' = zoom * (crpix - offset) - 0.5 * (zoom - 1)` and the CD
    /// matrix is divided by `zoom`.
    pub fn with_update(
        &self,
        x0: f64,
        y0: f64,
        zoom: f64,
        ncols: usize,
        nrows: usize,
    ) -> Option<Self> {
        let mut updated = self.clone();
        updated.naxis = [ncols, nrows];
        if x0 != 0.0 || y0 != 0.0 || zoom != 1.0 {
            let shift = 0.5 * (zoom - 1.0);
            updated.crpix = [
                zoom * (self.crpix[0] - x0) - shift,
                zoom * (self.crpix[1] - y0) - shift,
            ];
            for row in updated.cd.iter_mut() {
                for v in row.iter_mut() {
                    *v /= zoom;
                }
            }
        }
        updated.projection = None;
        updated.build()
    }

    /// Bit-for-bit equality of every defining parameter.
    pub fn same_frame(&self, other: &Wcs) -> bool {
        let bits = |w: &Wcs| {
            [
                w.crpix[0], w.crpix[1], w.crval[0], w.crval[1], w.cd[0][0], w.cd[0][1], w.cd[1][0],
                w.cd[1][1],
            ]
            .map(f64::to_bits)
        };
        self.naxis == other.naxis
            && self.ctype == other.ctype
            && self.sky == other.sky
            && bits(self) == bits(other)
    }
}

/// Celestial CTYPE trimmed to its 8-character `AXIS-PRJ` form, or `None`
/// for linear axes. Distortion suffixes (`-SIP`) are dropped and TPV is
/// evaluated as its underlying TAN projection.
fn celestial_ctype(ctype: &str) -> Option<String> {
    let ctype = ctype.trim();
    let bytes = ctype.as_bytes();
    if bytes.len() < 8 || bytes[4] != b'-' || !ctype.is_char_boundary(8) {
        return None;
    }
    let base = &ctype[..8];
    if base[5..].trim_matches('-').is_empty() {
        return None;
    }
    if ctype.len() > 8 {
        debug!(ctype, "Ignoring WCS distortion terms");
    }
    Some(match &base[5..] {
        "TPV" => format!("{}TAN", &base[..5]),
        _ => base.to_string(),
    })
}

fn cd_matrix(header: &Header) -> Option<[[f64; 2]; 2]> {
    let cd_keys = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"];
    if cd_keys.iter().any(|k| header.contains(k)) {
        let get = |k: &str| header.get_f64(k).unwrap_or(0.0);
        return Some([
            [get("CD1_1"), get("CD1_2")],
            [get("CD2_1"), get("CD2_2")],
        ]);
    }

    let cdelt = [header.get_f64("CDELT1")?, header.get_f64("CDELT2")?];
    if header.contains("PC1_1") || header.contains("PC2_2") {
        let pc = |k: &str, default: f64| header.get_f64(k).unwrap_or(default);
        return Some([
            [cdelt[0] * pc("PC1_1", 1.0), cdelt[0] * pc("PC1_2", 0.0)],
            [cdelt[1] * pc("PC2_1", 0.0), cdelt[1] * pc("PC2_2", 1.0)],
        ]);
    }

    let rot = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
    let (sin, cos) = rot.sin_cos();
    Some([
        [cdelt[0] * cos, -cdelt[1] * sin],
        [cdelt[0] * sin, cdelt[1] * cos],
    ])
}

fn cd_inverse(cd: &[[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
    if det.abs() < 1e-30 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [cd[1][1] * inv_det, -cd[0][1] * inv_det],
        [-cd[1][0] * inv_det, cd[0][0] * inv_det],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celestial_ctype() {
        assert_eq!(celestial_ctype("RA---TAN").as_deref(), Some("RA---TAN"));
        assert_eq!(celestial_ctype("DEC--TAN-SIP").as_deref(), Some("DEC--TAN"));
        assert_eq!(celestial_ctype("RA---TPV").as_deref(), Some("RA---TAN"));
        assert_eq!(celestial_ctype("GLON-CAR").as_deref(), Some("GLON-CAR"));
        assert!(celestial_ctype("X").is_none());
        assert!(celestial_ctype("").is_none());
        assert!(celestial_ctype("LINEAR").is_none());
    }

    #[test]
    fn test_linear_round_trip() {
        let wcs = Wcs::linear([10, 10], [5.0, 5.0], [100.0, -3.0], [[2.0, 0.0], [0.0, 0.5]]);
        assert!(!wcs.is_celestial());
        let (u, v) = wcs.pixel_to_world(7.0, 1.0).unwrap();
        assert_eq!((u, v), (104.0, -5.0));
        assert_eq!(wcs.world_to_pixel(u, v), Some((7.0, 1.0)));
    }

    #[test]
    fn test_singular_linear_axes_do_not_invert() {
        let wcs = Wcs::linear([4, 4], [1.0, 1.0], [0.0, 0.0], [[1.0, 1.0], [1.0, 1.0]]);
        assert!(wcs.world_to_pixel(0.0, 0.0).is_none());
    }
}
