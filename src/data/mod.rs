//! Conversion between font sources and UFO files (norad)

pub mod conversions;
pub mod ufo;
