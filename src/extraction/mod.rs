//! Extraction of transaction candidates from free text and receipt photos.
//!
//! Nothing produced here is saved. The endpoints return the candidate to the
//! client as a draft for review, see [crate::review].

mod analyze_endpoint;
mod engine;
mod image;

pub use analyze_endpoint::{analyze_image_endpoint, analyze_text_endpoint};
pub use engine::TransactionExtractor;
pub use image::ImageMediaType;
