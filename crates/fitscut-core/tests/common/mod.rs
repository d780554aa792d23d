#![allow(dead_code)]

use fitsio_pure::{BLOCK_SIZE, CARD_SIZE};

/// Format one header card, `KEYWORD = value`. Strings start in column 11,
/// other values are right-justified to column 30.
pub fn card(keyword: &str, value: &str) -> String {
    let card = if value.starts_with('\'') {
        format!("{keyword:<8}= {value}")
    } else {
        format!("{keyword:<8}= {value:>20}")
    };
    format!("{card:<width$}", width = CARD_SIZE)
}

/// Quoted FITS string value.
pub fn text(value: &str) -> String {
    format!("'{value:<8}'")
}

fn pad(buf: &mut Vec<u8>, fill: u8) {
    let len = buf.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    buf.resize(len, fill);
}

fn push_header(buf: &mut Vec<u8>, cards: &[String]) {
    for c in cards {
        buf.extend_from_slice(c.as_bytes());
    }
    buf.extend_from_slice(format!("{:<80}", "END").as_bytes());
    pad(buf, b' ');
}

fn axis_cards(bitpix: i64, naxes: &[usize]) -> Vec<String> {
    let mut cards = vec![
        card("BITPIX", &bitpix.to_string()),
        card("NAXIS", &naxes.len().to_string()),
    ];
    for (i, n) in naxes.iter().enumerate() {
        cards.push(card(&format!("NAXIS{}", i + 1), &n.to_string()));
    }
    cards
}

fn extra_cards(extra: &[(&str, String)]) -> Vec<String> {
    extra.iter().map(|(k, v)| card(k, v)).collect()
}

/// Primary HDU with a BITPIX -32 image and extra header cards.
pub fn build_fits_f32(width: usize, height: usize, values: &[f32], extra: &[(&str, String)]) -> Vec<u8> {
    assert_eq!(values.len(), width * height);
    let mut cards = vec![card("SIMPLE", "T")];
    cards.extend(axis_cards(-32, &[width, height]));
    cards.extend(extra_cards(extra));

    let mut buf = Vec::new();
    push_header(&mut buf, &cards);
    for v in values {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    pad(&mut buf, 0);
    buf
}

/// Primary HDU with a BITPIX 16 image and extra header cards.
pub fn build_fits_i16(width: usize, height: usize, values: &[i16], extra: &[(&str, String)]) -> Vec<u8> {
    assert_eq!(values.len(), width * height);
    let mut cards = vec![card("SIMPLE", "T")];
    cards.extend(axis_cards(16, &[width, height]));
    cards.extend(extra_cards(extra));

    let mut buf = Vec::new();
    push_header(&mut buf, &cards);
    for v in values {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    pad(&mut buf, 0);
    buf
}

/// Empty primary HDU, for files whose image lives in an extension.
pub fn build_empty_primary() -> Vec<u8> {
    let mut cards = vec![card("SIMPLE", "T")];
    cards.extend(axis_cards(8, &[]));
    cards.push(card("EXTEND", "T"));
    let mut buf = Vec::new();
    push_header(&mut buf, &cards);
    buf
}

/// Append a BITPIX -32 IMAGE extension with `planes` stacked planes.
pub fn append_image_extension(
    buf: &mut Vec<u8>,
    extname: &str,
    width: usize,
    height: usize,
    planes: usize,
    values: &[f32],
) {
    assert_eq!(values.len(), width * height * planes);
    let naxes: Vec<usize> = if planes > 1 {
        vec![width, height, planes]
    } else {
        vec![width, height]
    };
    let mut cards = vec![card("XTENSION", &text("IMAGE"))];
    cards.extend(axis_cards(-32, &naxes));
    cards.push(card("PCOUNT", "0"));
    cards.push(card("GCOUNT", "1"));
    cards.push(card("EXTNAME", &text(extname)));

    push_header(buf, &cards);
    for v in values {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    pad(buf, 0);
}

/// Linear WCS with unit pixels: world = pixel - crpix + crval.
pub fn linear_wcs_cards(crpix: (f64, f64), crval: (f64, f64)) -> Vec<(&'static str, String)> {
    vec![
        ("CTYPE1", text("X")),
        ("CTYPE2", text("Y")),
        ("CRPIX1", format!("{:.1}", crpix.0)),
        ("CRPIX2", format!("{:.1}", crpix.1)),
        ("CRVAL1", format!("{:.1}", crval.0)),
        ("CRVAL2", format!("{:.1}", crval.1)),
        ("CDELT1", "1.0".to_string()),
        ("CDELT2", "1.0".to_string()),
    ]
}

/// Gnomonic WCS with `scale` degrees per pixel.
pub fn tan_wcs_cards(crpix: (f64, f64), crval: (f64, f64), scale: f64) -> Vec<(&'static str, String)> {
    vec![
        ("CTYPE1", text("RA---TAN")),
        ("CTYPE2", text("DEC--TAN")),
        ("RADESYS", text("ICRS")),
        ("CRPIX1", format!("{:.3}", crpix.0)),
        ("CRPIX2", format!("{:.3}", crpix.1)),
        ("CRVAL1", format!("{:.6}", crval.0)),
        ("CRVAL2", format!("{:.6}", crval.1)),
        ("CD1_1", format!("{:.8E}", -scale)),
        ("CD1_2", "0.0".to_string()),
        ("CD2_1", "0.0".to_string()),
        ("CD2_2", format!("{:.8E}", scale)),
    ]
}

/// `width × height` ramp, value = y * width + x.
pub fn ramp(width: usize, height: usize) -> Vec<f32> {
    (0..width * height).map(|i| i as f32).collect()
}

/// Write a FITS buffer to a temporary file and return the temp file handle.
///
/// The file stays alive as long as the returned `NamedTempFile` is not dropped.
pub fn write_test_fits(data: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(data).expect("write FITS data");
    f.flush().expect("flush");
    f
}
