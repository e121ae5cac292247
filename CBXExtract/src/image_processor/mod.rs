//! Image post-processing for extracted pages and covers

pub mod decoder;
pub mod optimize;

pub use decoder::{decode_image, DecodedImage};
pub use optimize::{fit_within, ImageOptimizer, NoopOptimizer, ResizingOptimizer};
