use super::model::*;
use cookie_factory::bytes::*;
use cookie_factory::sequence::tuple;
use cookie_factory::{combinator::*, gen};
use cookie_factory::{GenError, SerializeFn, WriteContext};
use err_derive::Error;
use std::io::Write;

/// The error types used during serialisation
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// A cookie factory GenError, usually an undersized buffer
    #[error(display = "Cookie GenError")]
    GenError(#[error(source)] std::sync::Arc<GenError>),
}

impl From<GenError> for Error {
    fn from(k: GenError) -> Self {
        Error::GenError(std::sync::Arc::new(k))
    }
}

impl BcMessage {
    /// Serialize this message to the writer, in cleartext
    ///
    /// The body region is written exactly as stored; encrypting it for
    /// the wire is the transport's job since the cipher offset is
    /// connection state.
    pub fn serialize<W: Write>(&self, buf: W) -> Result<W, Error> {
        let (buf, _n) = gen(
            tuple((
                bc_header(&self.header),
                slice(&self.extension),
                slice(&self.payload),
            )),
            buf,
        )?;
        Ok(buf)
    }
}

fn bc_header<W: Write>(header: &BcHeader) -> impl SerializeFn<W> {
    tuple((
        le_u32(MAGIC_HEADER),
        le_u32(header.msg_id),
        le_u32(header.body_len),
        le_u8(header.channel_id),
        le_u8(header.stream_type),
        le_u16(header.msg_num),
        le_u16(header.response_code),
        le_u16(header.class),
        opt(header.payload_offset, le_u32),
    ))
}

/// Applies the supplied serializer with the Option's interior data if present
fn opt<W, T, F>(opt: Option<T>, ser: impl Fn(T) -> F) -> impl SerializeFn<W>
where
    F: SerializeFn<W>,
    T: Copy,
    W: Write,
{
    move |buf: WriteContext<W>| {
        if let Some(val) = opt {
            ser(val)(buf)
        } else {
            do_nothing()(buf)
        }
    }
}

/// A serializer combinator that does nothing with its input
fn do_nothing<W>() -> impl SerializeFn<W> {
    Ok
}
