//! Media types shared by the worker protocol and the comparison view
//!
//! - `Raster`: RGBA8 pixel buffer
//! - `AudioClip`: mono f32 samples decoded on the host before a run

mod audio;
mod raster;

pub use audio::{decode_wav, AudioClip, FileMediaLoader, MediaLoader, SPEECH_SAMPLE_RATE};
pub use raster::Raster;
