#![warn(missing_docs)]
//! # Baichuan-Core
//!
//! Baichuan-core is a rust client library for the proprietary TCP
//! protocol spoken by Baichuan/Reolink family IP cameras: byte-level
//! framing, encryption negotiation, login, and the media stream format.
//!
//! A session starts with a connection and a login:
//!
//! ```no_run
//! use baichuan_core::bc_protocol::{Authenticator, Connection, MaxEncryption};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), baichuan_core::Error> {
//! let connection = Connection::connect("192.168.1.10:9000", Duration::from_secs(10))?;
//! let auth = Authenticator::new(&connection);
//! let login = auth.login("admin", "password", MaxEncryption::Aes)?;
//! println!("Camera resolution: {:?}", login.device_info.resolution);
//! # Ok(())
//! # }
//! ```
//!
//! After that a live stream delivers decoded frames to a callback:
//!
//! ```no_run
//! use baichuan_core::bc_protocol::{Connection, Stream, StreamConfig, VideoStream};
//! use std::sync::Arc;
//! # fn main() -> Result<(), baichuan_core::Error> {
//! # let connection = Connection::connect("192.168.1.10:9000", std::time::Duration::from_secs(10))?;
//! let mut stream = VideoStream::new(Arc::new(connection));
//! stream.on_frame(|frame| println!("{:?}", frame));
//! stream.start(StreamConfig { channel_id: 0, stream: Stream::Main })?;
//! # Ok(())
//! # }
//! ```

/// Contains low level BC structures and formats
pub mod bc;
/// Contains high level interfaces for the camera
pub mod bc_protocol;
/// Contains low level structures and formats for the media substream
pub mod bcmedia;

/// This is the top level error structure of the library
///
/// Most commands will either return their `Ok(result)` or this `Err(Error)`
pub use bc_protocol::Error;
