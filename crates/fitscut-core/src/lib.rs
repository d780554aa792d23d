pub mod consts;
pub mod error;
pub mod extract;
pub mod histogram;
pub mod image;
pub mod io;
pub mod pipeline;
pub mod quality;
pub mod rebin;
pub mod scale;
pub mod wcs;
