//! Periodic MPEG-TS decode for the channel monitor's sampled video/audio
//! analysis (spec §4.G step 3).

pub mod decoder;
pub mod error;

pub use decoder::{AudioChunk, DecodedSample, TsDecoder};
pub use error::{DecodeError, Result};
