/// Errors that can occur while encoding or decoding a message frame.
///
/// These are scoped to a single message and never imply anything about the
/// health of the connection the frame travelled over.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame contains no type separator.
    #[error("malformed frame: no type separator found")]
    Malformed,

    /// A type tag would make the frame ambiguous.
    #[error("type tag {0:?} contains the frame separator")]
    SeparatorInTypeTag(String),

    /// The bytes before the separator are not valid UTF-8.
    #[error("type tag is not valid UTF-8: {0}")]
    NonUtf8TypeTag(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
