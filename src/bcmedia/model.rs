// Record magics. Each is the little endian u32 at the start of a record;
// the value's bytes, most significant first, spell the record type in
// ASCII: "1001"/"2001" info, "cd00".."cd09" iframe, "cd10".."cd19"
// pframe, "bw50" aac, "bw10" adpcm.
pub(super) const MAGIC_BCMEDIA_INFO_V1: u32 = 0x31303031;
pub(super) const MAGIC_BCMEDIA_INFO_V2: u32 = 0x32303031;
// IFrame and PFrame magics include the channel number in them
pub(super) const MAGIC_BCMEDIA_IFRAME: u32 = 0x63643030;
pub(super) const MAGIC_BCMEDIA_IFRAME_LAST: u32 = 0x63643039;
pub(super) const MAGIC_BCMEDIA_PFRAME: u32 = 0x63643130;
pub(super) const MAGIC_BCMEDIA_PFRAME_LAST: u32 = 0x63643139;
pub(super) const MAGIC_BCMEDIA_AAC: u32 = 0x62773530;
pub(super) const MAGIC_BCMEDIA_ADPCM: u32 = 0x62773130;

pub(super) const MAGIC_BCMEDIA_ADPCM_DATA: u16 = 0x0100;

/// Video streams encapsulate a stream of BcMedia records
#[derive(Debug, Clone)]
pub enum BcMediaFrame {
    /// Holds info on the stream
    Info(BcMediaInfo),
    /// Holds an IFrame, either H264 or H265
    IFrame(BcMediaIFrame),
    /// Holds a PFrame, either H264 or H265
    PFrame(BcMediaPFrame),
    /// Holds AAC audio
    Aac(BcMediaAac),
    /// Holds ADPCM audio
    Adpcm(BcMediaAdpcm),
}

/// Video codecs carried in I and P frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H264 video data
    H264,
    /// H265 video data
    H265,
}

/// The start of a BcMedia stream contains this record which describes
/// the data to follow
#[derive(Debug, Clone)]
pub struct BcMediaInfo {
    /// Width of the video
    pub video_width: u32,
    /// Height of the video
    pub video_height: u32,
    /// Frames per second. On older cameras this seems to be an index of
    /// the FPS on a lookup table
    pub fps: u8,
    /// Start year of the stream
    pub start_year: u8,
    /// Start month of the stream
    pub start_month: u8,
    /// Start day of the stream
    pub start_day: u8,
    /// Start hour of the stream
    pub start_hour: u8,
    /// Start minute of the stream
    pub start_min: u8,
    /// Start seconds of the stream
    pub start_seconds: u8,
    /// End year, only useful for files recorded on the SD card
    pub end_year: u8,
    /// End month, only useful for files recorded on the SD card
    pub end_month: u8,
    /// End day, only useful for files recorded on the SD card
    pub end_day: u8,
    /// End hour, only useful for files recorded on the SD card
    pub end_hour: u8,
    /// End minute, only useful for files recorded on the SD card
    pub end_min: u8,
    /// End seconds, only useful for files recorded on the SD card
    pub end_seconds: u8,
}

/// A BcMedia video IFrame
#[derive(Clone)]
pub struct BcMediaIFrame {
    /// "H264" or "H265"
    pub video_type: VideoCodec,
    /// Timestamp in microseconds
    pub microseconds: u32,
    /// POSIX time (seconds since 00:00:00 Jan 1 1970)
    pub time: Option<u32>,
    /// Raw IFrame data
    pub data: Vec<u8>,
}

impl std::fmt::Debug for BcMediaIFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcMediaIFrame")
            .field("video_type", &self.video_type)
            .field("microseconds", &self.microseconds)
            .field("time", &self.time)
            .field("data.len()", &self.data.len())
            .finish()
    }
}

/// A BcMedia video PFrame
#[derive(Clone)]
pub struct BcMediaPFrame {
    /// "H264" or "H265"
    pub video_type: VideoCodec,
    /// Timestamp in microseconds
    pub microseconds: u32,
    /// Raw PFrame data
    pub data: Vec<u8>,
}

impl std::fmt::Debug for BcMediaPFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcMediaPFrame")
            .field("video_type", &self.video_type)
            .field("microseconds", &self.microseconds)
            .field("data.len()", &self.data.len())
            .finish()
    }
}

/// BcMedia audio data in AAC format
#[derive(Debug, Clone)]
pub struct BcMediaAac {
    /// Raw ADTS AAC data
    pub data: Vec<u8>,
}

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

impl BcMediaAac {
    /// Duration of this frame in microseconds, derived from the ADTS
    /// header's sample-frequency index and frame count
    ///
    /// Returns `None` when the data does not start with an ADTS syncword.
    pub fn duration(&self) -> Option<u32> {
        if self.data.len() < 8 {
            return None;
        }
        if self.data[0] != 0xFF || (self.data[1] & 0xF0) != 0xF0 {
            return None;
        }
        let freq_index = ((self.data[2] & 0x3C) >> 2) as usize;
        let sample_rate = *ADTS_SAMPLE_RATES.get(freq_index)?;
        // Frame count field is "number of frames minus one"; each AAC
        // frame is 1024 samples
        let frames = (self.data[6] & 0x03) as u32 + 1;
        let samples = frames * 1024;
        Some(samples * 1_000_000 / sample_rate)
    }
}

/// BcMedia audio data in ADPCM format
#[derive(Debug, Clone)]
pub struct BcMediaAdpcm {
    /// The raw adpcm data in DVI-4 layout: 4 bytes of predictor state
    /// then one block of samples
    pub data: Vec<u8>,
}

impl BcMediaAdpcm {
    /// The sample block size in bytes, excluding the 4 byte predictor
    /// state
    pub fn block_size(&self) -> u32 {
        self.data.len().saturating_sub(4) as u32
    }

    /// Duration of this block in microseconds at the protocol's fixed
    /// 8000 Hz sample rate
    pub fn duration(&self) -> u32 {
        const SAMPLE_RATE: u32 = 8000;
        // Two 4-bit samples per byte
        let samples = self.block_size() * 2;
        samples * 1_000_000 / SAMPLE_RATE
    }
}

/// True when `magic` introduces a known BcMedia record
pub fn is_bcmedia_magic(magic: u32) -> bool {
    matches!(
        magic,
        MAGIC_BCMEDIA_INFO_V1
            | MAGIC_BCMEDIA_INFO_V2
            | MAGIC_BCMEDIA_IFRAME..=MAGIC_BCMEDIA_IFRAME_LAST
            | MAGIC_BCMEDIA_PFRAME..=MAGIC_BCMEDIA_PFRAME_LAST
            | MAGIC_BCMEDIA_AAC
            | MAGIC_BCMEDIA_ADPCM
    )
}
