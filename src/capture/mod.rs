//! Frame acquisition boundary.
//!
//! The polling loop only needs "give me the current frame"; everything behind
//! that (camera negotiation, device permissions) belongs to the source
//! implementation. Shipped sources cycle image files from disk or synthesize
//! a moving test pattern.

mod encode;
mod source;

pub use encode::{encode_frame, DEFAULT_JPEG_QUALITY};
pub use source::{CaptureError, FrameSource, ImageDirSource, TestPatternSource};
