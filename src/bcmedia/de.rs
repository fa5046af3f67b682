use super::model::*;
use log::*;
use nom::{
    bytes::streaming::take, combinator::*, error::context, number::streaming::*,
};

type IResult<I, O, E = nom::error::VerboseError<I>> = Result<(I, O), nom::Err<E>>;

// Media packets use 8 byte padding
const PAD_SIZE: u32 = 8;

/// A resynchronizing parser over a BcMedia byte stream
///
/// Payload bytes of successive video messages are [`append`]ed and
/// complete records are pulled out with [`next_frame`]. The input is
/// treated as an endless concatenation of records: any prefix that does
/// not start with a known magic is discarded one byte at a time until a
/// record parses, so stray bytes in a feed cost a resync rather than the
/// session.
///
/// [`append`]: BcMediaParser::append
/// [`next_frame`]: BcMediaParser::next_frame
#[derive(Debug, Default)]
pub struct BcMediaParser {
    buffer: Vec<u8>,
}

impl BcMediaParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Default::default()
    }

    /// Feed more stream bytes to the parser
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pull the next complete record out of the buffer
    ///
    /// `None` means more data is needed; the buffered bytes are kept and
    /// parsing resumes exactly where it left off after the next
    /// [`append`](BcMediaParser::append).
    pub fn next_frame(&mut self) -> Option<BcMediaFrame> {
        let mut skipped = 0usize;
        loop {
            let window = &self.buffer[skipped..];
            if window.len() < 4 {
                // Keep the unchecked tail, it may be the start of a magic
                break;
            }
            let magic = u32::from_le_bytes(window[0..4].try_into().unwrap());
            if !is_bcmedia_magic(magic) {
                if skipped == 0 {
                    warn!("Unknown media magic 0x{:08x}, resynchronizing", magic);
                }
                skipped += 1;
                continue;
            }
            match bcmedia(window) {
                Ok((rest, frame)) => {
                    let consumed = window.len() - rest.len();
                    if skipped > 0 {
                        debug!("Resynchronized after {} bytes", skipped);
                    }
                    self.buffer.drain(..skipped + consumed);
                    return Some(frame);
                }
                Err(nom::Err::Incomplete(_)) => {
                    break;
                }
                Err(e) => {
                    warn!("Malformed media record ({}), resynchronizing", e);
                    skipped += 1;
                }
            }
        }
        self.buffer.drain(..skipped);
        None
    }
}

fn bcmedia(buf: &[u8]) -> IResult<&[u8], BcMediaFrame> {
    let (buf, magic) = context(
        "Failed to match any known bcmedia",
        verify(le_u32, |x| is_bcmedia_magic(*x)),
    )(buf)?;

    match magic {
        MAGIC_BCMEDIA_INFO_V1 | MAGIC_BCMEDIA_INFO_V2 => {
            let (buf, payload) = bcmedia_info(buf)?;
            Ok((buf, BcMediaFrame::Info(payload)))
        }
        MAGIC_BCMEDIA_IFRAME..=MAGIC_BCMEDIA_IFRAME_LAST => {
            let (buf, payload) = bcmedia_iframe(buf)?;
            Ok((buf, BcMediaFrame::IFrame(payload)))
        }
        MAGIC_BCMEDIA_PFRAME..=MAGIC_BCMEDIA_PFRAME_LAST => {
            let (buf, payload) = bcmedia_pframe(buf)?;
            Ok((buf, BcMediaFrame::PFrame(payload)))
        }
        MAGIC_BCMEDIA_AAC => {
            let (buf, payload) = bcmedia_aac(buf)?;
            Ok((buf, BcMediaFrame::Aac(payload)))
        }
        MAGIC_BCMEDIA_ADPCM => {
            let (buf, payload) = bcmedia_adpcm(buf)?;
            Ok((buf, BcMediaFrame::Adpcm(payload)))
        }
        _ => unreachable!(),
    }
}

fn pad_size(payload_size: u32) -> u32 {
    match payload_size % PAD_SIZE {
        0 => 0,
        n => PAD_SIZE - n,
    }
}

fn bcmedia_info(buf: &[u8]) -> IResult<&[u8], BcMediaInfo> {
    let (buf, header_size) = le_u32(buf)?;
    if header_size != 32 {
        warn!("Unexpected info header size: {}", header_size);
    }
    let (buf, video_width) = le_u32(buf)?;
    let (buf, video_height) = le_u32(buf)?;
    let (buf, _unknown) = le_u8(buf)?;
    let (buf, fps) = le_u8(buf)?;
    let (buf, start_year) = le_u8(buf)?;
    let (buf, start_month) = le_u8(buf)?;
    let (buf, start_day) = le_u8(buf)?;
    let (buf, start_hour) = le_u8(buf)?;
    let (buf, start_min) = le_u8(buf)?;
    let (buf, start_seconds) = le_u8(buf)?;
    let (buf, end_year) = le_u8(buf)?;
    let (buf, end_month) = le_u8(buf)?;
    let (buf, end_day) = le_u8(buf)?;
    let (buf, end_hour) = le_u8(buf)?;
    let (buf, end_min) = le_u8(buf)?;
    let (buf, end_seconds) = le_u8(buf)?;
    let (buf, _unknown_b) = le_u16(buf)?;
    // The record is 32 bytes beyond the magic; the remainder is unknown
    let (buf, _unknown_c) = take(4usize)(buf)?;

    Ok((
        buf,
        BcMediaInfo {
            video_width,
            video_height,
            fps,
            start_year,
            start_month,
            start_day,
            start_hour,
            start_min,
            start_seconds,
            end_year,
            end_month,
            end_day,
            end_hour,
            end_min,
            end_seconds,
        },
    ))
}

fn take4(buf: &[u8]) -> IResult<&[u8], &str> {
    map_res(take(4usize), std::str::from_utf8)(buf)
}

fn video_type(buf: &[u8]) -> IResult<&[u8], VideoCodec> {
    let (buf, video_type_str) = context(
        "Video type is unrecognised",
        verify(take4, |x| matches!(x, "H264" | "H265")),
    )(buf)?;
    let video_type = match video_type_str {
        "H264" => VideoCodec::H264,
        "H265" => VideoCodec::H265,
        _ => unreachable!(),
    };
    Ok((buf, video_type))
}

fn bcmedia_iframe(buf: &[u8]) -> IResult<&[u8], BcMediaIFrame> {
    let (buf, video_type) = video_type(buf)?;
    let (buf, payload_size) = le_u32(buf)?;
    let (buf, additional_header_size) = le_u32(buf)?;
    let (buf, microseconds) = le_u32(buf)?;
    let (buf, _unknown) = le_u32(buf)?;
    let (buf, time) = if additional_header_size >= 4 {
        let (buf, time_value) = le_u32(buf)?;
        (buf, Some(time_value))
    } else {
        (buf, None)
    };
    let (buf, _unknown_remainder) = if additional_header_size > 4 {
        take(additional_header_size - 4)(buf)?
    } else {
        (buf, &[][..])
    };

    let (buf, data_slice) = take(payload_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size))(buf)?;

    Ok((
        buf,
        BcMediaIFrame {
            video_type,
            microseconds,
            time,
            data: data_slice.to_vec(),
        },
    ))
}

fn bcmedia_pframe(buf: &[u8]) -> IResult<&[u8], BcMediaPFrame> {
    let (buf, video_type) = video_type(buf)?;
    let (buf, payload_size) = le_u32(buf)?;
    let (buf, additional_header_size) = le_u32(buf)?;
    let (buf, microseconds) = le_u32(buf)?;
    let (buf, _unknown) = le_u32(buf)?;
    // No POSIX time here, even when the additional header is present
    let (buf, _additional_header) = take(additional_header_size)(buf)?;
    let (buf, data_slice) = take(payload_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size))(buf)?;

    Ok((
        buf,
        BcMediaPFrame {
            video_type,
            microseconds,
            data: data_slice.to_vec(),
        },
    ))
}

fn bcmedia_aac(buf: &[u8]) -> IResult<&[u8], BcMediaAac> {
    let (buf, payload_size) = le_u16(buf)?;
    let (buf, payload_size_b) = le_u16(buf)?;
    if payload_size_b != payload_size {
        warn!(
            "AAC duplicate size mismatch: {} vs {}",
            payload_size, payload_size_b
        );
    }
    let (buf, data_slice) = take(payload_size)(buf)?;
    let (buf, _padding) = take(pad_size(payload_size as u32))(buf)?;

    Ok((
        buf,
        BcMediaAac {
            data: data_slice.to_vec(),
        },
    ))
}

fn bcmedia_adpcm(buf: &[u8]) -> IResult<&[u8], BcMediaAdpcm> {
    const SUB_HEADER_SIZE: u16 = 4;

    let (buf, payload_size) = le_u16(buf)?;
    let (buf, payload_size_b) = le_u16(buf)?;
    if payload_size_b != payload_size {
        warn!(
            "ADPCM duplicate size mismatch: {} vs {}",
            payload_size, payload_size_b
        );
    }
    let (buf, more_magic) = le_u16(buf)?;
    if more_magic != MAGIC_BCMEDIA_ADPCM_DATA {
        warn!("ADPCM data magic is 0x{:04x}", more_magic);
    }
    // On some cameras this is just 2, on others half the block size
    let (buf, _half_block_size) = le_u16(buf)?;
    let block_size = payload_size.saturating_sub(SUB_HEADER_SIZE);
    let (buf, data_slice) = take(block_size)(buf)?;

    Ok((
        buf,
        BcMediaAdpcm {
            data: data_slice.to_vec(),
        },
    ))
}
