pub(super) const MAGIC_HEADER: u32 = 0x0abcdef0;
// Some firmwares emit the magic with its nibbles mirrored. Accepted on
// ingest, never produced.
pub(super) const MAGIC_HEADER_REV: u32 = 0x0fedcba0;

/// Login messages have this ID
pub const MSG_ID_LOGIN: u32 = 1;
/// Logout messages have this ID
pub const MSG_ID_LOGOUT: u32 = 2;
/// Video and audio stream messages have this ID
pub const MSG_ID_VIDEO: u32 = 3;
/// ID used to stop the video stream
pub const MSG_ID_VIDEO_STOP: u32 = 4;
/// TalkAbility messages have this ID
pub const MSG_ID_TALKABILITY: u32 = 10;
/// TalkReset messages have this ID
pub const MSG_ID_TALKRESET: u32 = 11;
/// PtzControl messages have this ID
pub const MSG_ID_PTZ_CONTROL: u32 = 18;
/// Reboot messages have this ID
pub const MSG_ID_REBOOT: u32 = 23;
/// Request motion detection messages
pub const MSG_ID_MOTION_REQUEST: u32 = 31;
/// Motion detection messages
pub const MSG_ID_MOTION: u32 = 33;
/// Version messages have this ID
pub const MSG_ID_VERSION: u32 = 80;
/// Ping messages have this ID
pub const MSG_ID_PING: u32 = 93;
/// General system info messages have this ID
pub const MSG_ID_GET_GENERAL: u32 = 104;
/// Snapshot requests have this ID
pub const MSG_ID_SNAP: u32 = 109;
/// UID queries have this ID
pub const MSG_ID_UID: u32 = 114;
/// Stream configuration queries have this ID
pub const MSG_ID_STREAM_INFO_LIST: u32 = 146;
/// User capability queries have this ID
pub const MSG_ID_ABILITY_INFO: u32 = 151;
/// Support xml queries have this ID
pub const MSG_ID_GET_SUPPORT: u32 = 199;

/// Legacy messages with a 20 byte header. Only used for the first login
pub const MSG_CLASS_LEGACY: u16 = 0x6514;
/// Modern messages with a 20 byte header, such as the reply to the
/// legacy login
pub const MSG_CLASS_MODERN_20: u16 = 0x6614;
/// Modern messages with a 24 byte header carrying a payload offset
pub const MSG_CLASS_MODERN_24: u16 = 0x6414;
/// Alternative class for 24 byte headers, used by most camera replies
pub const MSG_CLASS_MODERN_24_ALT: u16 = 0x0000;

/// The camera accepted the request
pub const RESPONSE_CODE_OK: u16 = 200;
/// The camera rejected the request
pub const RESPONSE_CODE_BAD_REQUEST: u16 = 400;

/// Request no encryption during the login negotiation
pub const ENC_REQ_NONE: u16 = 0xdc00;
/// Request the BC XOR cipher during the login negotiation
pub const ENC_REQ_BC: u16 = 0xdc01;
/// Request AES during the login negotiation
pub const ENC_REQ_AES: u16 = 0xdc12;

/// Negotiation reply: no encryption
pub const ENC_RESP_NONE: u16 = 0xdd00;
/// Negotiation reply: BC XOR cipher
pub const ENC_RESP_BC: u16 = 0xdd01;
/// Negotiation reply: AES on XML only
pub const ENC_RESP_AES: u16 = 0xdd02;
/// Negotiation reply: AES on XML and binary media
pub const ENC_RESP_FULL_AES: u16 = 0xdd12;

/// Stream handle used with `mainStream`
pub const STREAM_HANDLE_MAIN: u32 = 0;
/// Stream handle used with `subStream`
pub const STREAM_HANDLE_SUB: u32 = 256;
/// Stream handle used with `externStream`
pub const STREAM_HANDLE_EXTERN: u32 = 1024;

/// The wire header of a [`BcMessage`]
///
/// All integers are little-endian. `payload_offset` is only present on the
/// wire for the 24-byte classes; see [`has_payload_offset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcHeader {
    /// Message ID dictates the major content of the message
    pub msg_id: u32,
    /// Length of the body (extension plus payload) in bytes
    pub body_len: u32,
    /// In most cases 0 but can be other values for NVRs
    pub channel_id: u8,
    /// Stream index; only meaningful during [`MSG_ID_VIDEO`] streams
    pub stream_type: u8,
    /// Sequence number chosen by the client; the camera parrots it back
    /// in every reply, and it identifies a running video stream
    pub msg_num: u16,
    /// For requests this carries the encryption negotiation code during
    /// the initial login. For replies it is an HTTP-like status (200 OK,
    /// 400 rejected) or a negotiation result code
    pub response_code: u16,
    /// The message class, which dictates the size of the header
    ///
    /// - 0x6514: "legacy", 20 bytes
    /// - 0x6614: "modern", 20 bytes
    /// - 0x6414: "modern", 24 bytes
    /// - 0x0000: "modern", 24 bytes
    pub class: u16,
    /// Where the extension ends and the payload begins. Present only for
    /// the 24-byte classes
    pub payload_offset: Option<u32>,
}

/// True for the classes whose header carries the trailing payload offset
pub fn has_payload_offset(class: u16) -> bool {
    class == MSG_CLASS_MODERN_24 || class == MSG_CLASS_MODERN_24_ALT
}

impl BcHeader {
    /// Size of this header on the wire, 20 or 24 bytes depending on class
    pub fn header_size(&self) -> usize {
        if has_payload_offset(self.class) {
            24
        } else {
            20
        }
    }
}

/// Top level BC message
///
/// The body region is `extension` followed by `payload`. The extension is
/// always XML metadata; the payload is either XML or a BcMedia byte
/// stream. Messages received from a [`Connection`] have already had the
/// appropriate regions decrypted.
///
/// [`Connection`]: crate::bc_protocol::Connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcMessage {
    /// Header part of the message
    pub header: BcHeader,
    /// Extension region, bytes `[0, payload_offset)` of the body
    pub extension: Vec<u8>,
    /// Payload region, bytes `[payload_offset, body_len)` of the body
    pub payload: Vec<u8>,
}

impl BcMessage {
    /// Construct a header-only message, used to acknowledge or negotiate
    pub fn new_header_only(msg_id: u32, msg_num: u16, class: u16) -> BcMessage {
        BcMessage {
            header: BcHeader {
                msg_id,
                body_len: 0,
                channel_id: 0,
                stream_type: 0,
                msg_num,
                response_code: 0,
                class,
                payload_offset: if has_payload_offset(class) {
                    Some(0)
                } else {
                    None
                },
            },
            extension: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Construct a message whose whole body is an xml payload
    pub fn new_with_payload(msg_id: u32, msg_num: u16, payload: Vec<u8>, class: u16) -> BcMessage {
        BcMessage {
            header: BcHeader {
                msg_id,
                body_len: payload.len() as u32,
                channel_id: 0,
                stream_type: 0,
                msg_num,
                response_code: 0,
                class,
                payload_offset: if has_payload_offset(class) {
                    Some(0)
                } else {
                    None
                },
            },
            extension: Vec::new(),
            payload,
        }
    }

    /// Construct a message with an xml extension describing the payload
    ///
    /// `payload_offset` becomes the length of the extension.
    pub fn new_with_extension(
        msg_id: u32,
        msg_num: u16,
        extension: Vec<u8>,
        payload: Vec<u8>,
        class: u16,
    ) -> BcMessage {
        BcMessage {
            header: BcHeader {
                msg_id,
                body_len: (extension.len() + payload.len()) as u32,
                channel_id: 0,
                stream_type: 0,
                msg_num,
                response_code: 0,
                class,
                payload_offset: if has_payload_offset(class) {
                    Some(extension.len() as u32)
                } else {
                    None
                },
            },
            extension,
            payload,
        }
    }
}

/// Descriptive name for a message ID, for log readability
pub fn msg_id_name(msg_id: u32) -> &'static str {
    match msg_id {
        MSG_ID_LOGIN => "Login",
        MSG_ID_LOGOUT => "Logout",
        MSG_ID_VIDEO => "Video",
        MSG_ID_VIDEO_STOP => "VideoStop",
        MSG_ID_TALKABILITY => "TalkAbility",
        MSG_ID_TALKRESET => "TalkReset",
        MSG_ID_PTZ_CONTROL => "PtzControl",
        MSG_ID_REBOOT => "Reboot",
        MSG_ID_MOTION_REQUEST => "MotionRequest",
        MSG_ID_MOTION => "Motion",
        MSG_ID_VERSION => "Version",
        MSG_ID_PING => "Ping",
        MSG_ID_GET_GENERAL => "GetGeneral",
        MSG_ID_SNAP => "Snap",
        MSG_ID_UID => "Uid",
        MSG_ID_STREAM_INFO_LIST => "StreamInfoList",
        MSG_ID_ABILITY_INFO => "AbilityInfo",
        MSG_ID_GET_SUPPORT => "GetSupport",
        _ => "Unknown",
    }
}
