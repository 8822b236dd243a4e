use thiserror::Error;

/// Result type for bulb operations
pub type Result<T> = std::result::Result<T, BulbError>;

/// Errors that can occur when talking to a bulb
#[derive(Error, Debug)]
pub enum BulbError {
    /// Missing or invalid endpoint configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level I/O error (connect failure, broken socket)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound payload was valid JSON but not a recognizable message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The bulb answered a request with an error object
    #[error("Device error {code}: {message}")]
    Device {
        /// Error code reported by the bulb
        code: i64,
        /// Error message reported by the bulb
        message: String,
    },

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// A session for this address is already managed
    #[error("A bulb at {0} is already managed")]
    DuplicateAddress(String),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
