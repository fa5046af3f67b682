//! High level interfaces for the camera
//!
//! [`Connection`] owns the socket, the cipher and the framing;
//! [`Authenticator`] runs the three-step login over a borrowed
//! connection; [`VideoStream`] requests a live stream and delivers
//! decoded [`BcMediaFrame`](crate::bcmedia::model::BcMediaFrame)s to a
//! callback.

mod auth;
mod connection;
mod errors;
mod stream;

pub use auth::{Authenticator, LoginResult, MaxEncryption, NegotiatedEncryption};
pub use connection::Connection;
pub use errors::Error;
pub use stream::{Stream, StreamConfig, VideoStream};

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// The camera's default TCP port
pub const DEFAULT_PORT: u16 = 9000;

/// Hash `input` and render the digest as uppercase hex, truncated to 31
/// characters
///
/// The Baichuan library caps these strings at 32 bytes with a null
/// terminator, so only 31 characters of the digest survive the copy into
/// the xml. Cameras reject the full 32-character digest, so the
/// truncation must be reproduced exactly.
pub fn md5_string(input: &str) -> String {
    let mut md5 = format!("{:X}", md5::compute(input));
    md5.truncate(31);
    md5
}

/// Make an AES key from the login password and the nonce negotiated
/// during login
///
/// The key phrase `"{nonce}-{password}"` is MD5'd, the digest rendered as
/// lowercase hex, and the key is the ASCII of the first 16 hex
/// characters, not the raw digest bytes.
pub fn make_aes_key(nonce: &str, password: &str) -> [u8; 16] {
    let key_phrase = format!("{}-{}", nonce, password);
    let key_phrase_hash = format!("{:x}", md5::compute(key_phrase)).into_bytes();
    key_phrase_hash[0..16]
        .try_into()
        .expect("md5 hex is always at least 16 bytes")
}
