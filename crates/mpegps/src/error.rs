use thiserror::Error;

/// Errors of the program stream demuxer.
#[derive(Error, Debug)]
pub enum PsError {
    /// The input could not be opened.
    #[error("cannot open {0}")]
    Open(String),
    /// Source read/seek failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No recognizable pack or PES structure was found.
    #[error("no MPEG program stream content found")]
    NoStreams,
    /// The requested stream number does not exist.
    #[error("stream {0} not present")]
    BadStream(u32),
}
