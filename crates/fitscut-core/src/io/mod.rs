pub mod fits;
pub mod header;
