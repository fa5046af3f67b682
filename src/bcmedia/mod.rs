//! BcMedia is the format inside the payload of video messages
//!
//! A stream is a bare concatenation of self-delimited records: stream
//! info, I-frames, P-frames and two flavours of audio, each introduced by
//! a four byte ASCII magic. Cameras occasionally emit stray bytes between
//! records, so the parser resynchronizes rather than failing.

/// Contains the frame types and their magics
pub mod model;

/// Contains the record parsers and the resynchronizing stream parser
pub mod de;
