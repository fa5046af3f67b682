use crate::bc;
use err_derive::Error;

/// This is the primary error type of the library
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// Underlying IO errors
    #[error(display = "IO error")]
    Io(#[error(source)] std::sync::Arc<std::io::Error>),

    /// Raised when a receive waited for the full timeout without data
    #[error(display = "Timeout")]
    Timeout,

    /// Raised during serialisation
    #[error(display = "Serialisation error")]
    Serialization(#[error(source)] bc::ser::Error),

    /// Raised when the wire bytes could not be understood
    #[error(display = "Protocol error: {}", _0)]
    Protocol(String),

    /// Raised when a required xml document could not be produced or
    /// understood
    #[error(display = "XML error: {}", _0)]
    Xml(String),

    /// Raised when no reply arrived to a login step after retries
    #[error(display = "No response from camera: {}", _0)]
    NoResponse(&'static str),

    /// Raised when the encryption negotiation reply could not be
    /// understood
    #[error(display = "Malformed encryption negotiation: {}", _0)]
    NegotiationMalformed(&'static str),

    /// Raised when the camera rejected the supplied credentials; carries
    /// the camera's response code
    #[error(display = "Invalid credentials (camera response code {})", _0)]
    InvalidCredentials(u16),

    /// Raised when the login reply was not usable despite a success code
    #[error(display = "Login failed: {}", _0)]
    LoginFailed(&'static str),

    /// Raised when the camera answers a request with a status other than
    /// 200
    #[error(display = "Camera rejected the request with code {}", _0)]
    Rejected(u16),

    /// Raised when an operation needs a connected socket
    #[error(display = "Not connected")]
    NotConnected,
}

impl From<std::io::Error> for Error {
    fn from(k: std::io::Error) -> Self {
        Error::Io(std::sync::Arc::new(k))
    }
}

impl From<bc::de::Error> for Error {
    fn from(k: bc::de::Error) -> Self {
        Error::Protocol(k.to_string())
    }
}
