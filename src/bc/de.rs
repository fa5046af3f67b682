use super::model::*;
use err_derive::Error;
use nom::{
    bytes::streaming::take, combinator::*, error::context as error_context,
    number::streaming::*, sequence::tuple,
};

type IResult<I, O, E = nom::error::VerboseError<I>> = Result<(I, O), nom::Err<E>>;
type NomErrorType<'a> = nom::error::VerboseError<&'a [u8]>;

/// The error types used during deserialisation
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// A nom parsing error, usually a malformed packet
    #[error(display = "Parsing error: {}", _0)]
    NomError(String),
    /// More bytes are needed before the message can be parsed
    #[error(display = "Parsing incomplete, {} more bytes needed", _0)]
    Incomplete(usize),
}

impl<'a> From<nom::Err<NomErrorType<'a>>> for Error {
    fn from(k: nom::Err<NomErrorType<'a>>) -> Self {
        match k {
            nom::Err::Error(e) => Error::NomError(format!("Nom Error: {:x?}", e)),
            nom::Err::Failure(e) => Error::NomError(format!("Nom Failure: {:x?}", e)),
            nom::Err::Incomplete(nom::Needed::Size(amount)) => Error::Incomplete(amount.get()),
            nom::Err::Incomplete(nom::Needed::Unknown) => Error::Incomplete(1),
        }
    }
}

impl BcMessage {
    /// Parse one message from the front of `buf`
    ///
    /// Returns the message and the number of bytes it occupied. The body
    /// is split into extension and payload but not decrypted; selective
    /// decryption is connection state and happens in the transport.
    ///
    /// [`Error::Incomplete`] means the buffer holds only a prefix of a
    /// message and more bytes must be read.
    pub fn deserialize(buf: &[u8]) -> Result<(BcMessage, usize), Error> {
        let (rest, msg) = bc_message(buf)?;
        Ok((msg, buf.len() - rest.len()))
    }
}

fn bc_message(buf: &[u8]) -> IResult<&[u8], BcMessage> {
    let (buf, header) = bc_header(buf)?;
    let (buf, body) = take(header.body_len)(buf)?;

    // Split the body at the payload offset. An offset beyond the body is
    // not emitted by any known firmware; treat the whole body as payload.
    let (extension, payload) = match header.payload_offset {
        Some(offset) if offset > 0 && (offset as usize) <= body.len() => {
            let (ext, pay) = body.split_at(offset as usize);
            (ext.to_vec(), pay.to_vec())
        }
        _ => (Vec::new(), body.to_vec()),
    };

    Ok((
        buf,
        BcMessage {
            header,
            extension,
            payload,
        },
    ))
}

pub(crate) fn bc_header(buf: &[u8]) -> IResult<&[u8], BcHeader> {
    let (buf, _magic) = error_context(
        "Magic invalid",
        verify(le_u32, |x| *x == MAGIC_HEADER || *x == MAGIC_HEADER_REV),
    )(buf)?;
    let (buf, msg_id) = error_context("MsgID missing", le_u32)(buf)?;
    let (buf, body_len) = error_context("BodyLen missing", le_u32)(buf)?;
    let (buf, channel_id) = error_context("ChannelID missing", le_u8)(buf)?;
    let (buf, stream_type) = error_context("StreamType missing", le_u8)(buf)?;
    let (buf, msg_num) = error_context("MsgNum missing", le_u16)(buf)?;
    let (buf, (response_code, class)) =
        error_context("ResponseCode missing", tuple((le_u16, le_u16)))(buf)?;

    let (buf, payload_offset) = error_context(
        "Payload offset is missing",
        cond(has_payload_offset(class), le_u32),
    )(buf)?;

    Ok((
        buf,
        BcHeader {
            msg_id,
            body_len,
            channel_id,
            stream_type,
            msg_num,
            response_code,
            class,
            payload_offset,
        },
    ))
}
