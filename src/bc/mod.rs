//! The Baichuan message format is a 20 or 24 byte header followed by the
//! message body.
//!
//! The header declares a message class; the 24-byte classes carry an extra
//! trailing word, the `payload_offset`, which splits the body into an
//! Extension region (XML metadata) and a Payload region (XML or binary
//! media data). Message IDs start out as XML, but can be statefully
//! switched to binary with a special XML "Extension" message.
//!
//! Bodies are "encrypted" with one of the ciphers in [`crypto`]: a simple
//! XOR routine, or AES-128-CFB negotiated during login.

/// Contains the structure of the messages such as headers and payloads
pub mod model;

/// Contains the ciphers and the AES key derivation
pub mod crypto;
/// Contains code related to the deserialisation of the bc packets
pub mod de;
/// Contains code related to the serialisation of the bc packets
pub mod ser;
/// Contains the structs for the known xmls of payloads and extension
pub mod xml;
