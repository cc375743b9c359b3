//! Errors surfaced by the periodic decode step (spec §4.G step 3).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to write buffered TS bytes to scratch file: {0}")]
    ScratchFile(#[source] std::io::Error),

    #[error("ffmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("no audio stream found")]
    NoAudioStream,

    #[error("decoder produced no frame before end of buffered data")]
    NoFrame,
}

pub type Result<T> = std::result::Result<T, DecodeError>;
