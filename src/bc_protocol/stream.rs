use crate::bc::model::*;
use crate::bc::xml::*;
use crate::bcmedia::de::BcMediaParser;
use crate::bcmedia::model::{BcMediaFrame, BcMediaInfo};
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{Connection, Error, Result};

/// How long to wait for the reply to a stream start request
const START_TIMEOUT: Duration = Duration::from_secs(5);
/// The receive loop wakes at least this often to check the stop flag
const RX_TIMEOUT: Duration = Duration::from_secs(1);

/// The stream names supported by BC
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stream {
    /// This is the HD stream
    Main,
    /// This is the SD stream
    Sub,
    /// This stream represents a balance between SD and HD
    ///
    /// It is only available on some cameras. If the camera doesn't
    /// support it the stream will be the same as the SD stream
    Extern,
}

impl Stream {
    // These are the numbers used with the official client
    fn handle(&self) -> u32 {
        match self {
            Stream::Main => STREAM_HANDLE_MAIN,
            Stream::Sub => STREAM_HANDLE_SUB,
            Stream::Extern => STREAM_HANDLE_EXTERN,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Stream::Main => "mainStream",
            Stream::Sub => "subStream",
            Stream::Extern => "externStream",
        }
    }

    // On an E1 and swann cameras mainStream is 0 and subStream is 1;
    // externStream reuses 0
    fn code(&self) -> u8 {
        match self {
            Stream::Main => 0,
            Stream::Sub => 1,
            Stream::Extern => 0,
        }
    }
}

/// Which stream of which channel to request
#[derive(Debug, Copy, Clone)]
pub struct StreamConfig {
    /// Channel id is usually zero unless using an NVR
    pub channel_id: u8,
    /// Which of the camera's streams to pull
    pub stream: Stream,
}

type FrameCallback = Box<dyn Fn(&BcMediaFrame) + Send>;
type InfoCallback = Box<dyn Fn(&BcMediaInfo) + Send>;

#[derive(Debug, Default)]
struct Stats {
    frames: u64,
    bytes: u64,
    i_frames: u64,
    p_frames: u64,
}

/// A live video session over a borrowed connection
///
/// [`start`] sends the preview request and spawns a receive thread that
/// pumps video messages through a [`BcMediaParser`], handing each decoded
/// frame to the registered callbacks. Callbacks run on the receive
/// thread, so their sinks must be thread safe.
///
/// [`start`]: VideoStream::start
pub struct VideoStream {
    connection: Arc<Connection>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    msg_num: Option<u16>,
    config: Option<StreamConfig>,
    frame_callback: Option<FrameCallback>,
    info_callback: Option<InfoCallback>,
}

impl VideoStream {
    /// Create a stream session over this connection
    pub fn new(connection: Arc<Connection>) -> Self {
        VideoStream {
            connection,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            msg_num: None,
            config: None,
            frame_callback: None,
            info_callback: None,
        }
    }

    /// Register the callback that receives every decoded frame
    ///
    /// Must be called before [`start`](VideoStream::start).
    pub fn on_frame(&mut self, callback: impl Fn(&BcMediaFrame) + Send + 'static) {
        self.frame_callback = Some(Box::new(callback));
    }

    /// Register the callback that receives stream info records
    ///
    /// Must be called before [`start`](VideoStream::start).
    pub fn on_stream_info(&mut self, callback: impl Fn(&BcMediaInfo) + Send + 'static) {
        self.info_callback = Some(Box::new(callback));
    }

    /// Request the stream and spawn the receive thread
    pub fn start(&mut self, config: StreamConfig) -> Result<()> {
        if self.handle.is_some() {
            warn!("Stream already running");
            return Ok(());
        }

        let msg_num = self.connection.next_msg_num();
        info!(
            "Starting video stream: channel={}, type={}",
            config.channel_id,
            config.stream.name()
        );

        self.send_preview(MSG_ID_VIDEO, msg_num, &config)?;

        let response = match self.connection.receive_message(START_TIMEOUT) {
            Ok(msg) => msg,
            Err(Error::Timeout) => return Err(Error::NoResponse("stream start")),
            Err(e) => return Err(e),
        };
        if response.header.response_code != RESPONSE_CODE_OK {
            return Err(Error::Rejected(response.header.response_code));
        }

        // The transport tracks binary mode on its own; duplicate the
        // check here in case the flag arrives with this very reply
        if !response.extension.is_empty() {
            if let Ok(Extension {
                binary_data: Some(1),
                ..
            }) = Extension::try_parse(response.extension.as_slice())
            {
                self.connection.binary_mode_on(response.header.msg_num);
                debug!("Binary mode enabled for msg_num {}", response.header.msg_num);
            }
        }

        self.msg_num = Some(msg_num);
        self.config = Some(config);
        self.running.store(true, Ordering::Relaxed);

        let connection = self.connection.clone();
        let running = self.running.clone();
        let frame_callback = self.frame_callback.take();
        let info_callback = self.info_callback.take();

        // The acknowledgment can already carry the first media bytes
        let mut parser = BcMediaParser::new();
        let initial = if response.header.msg_id == MSG_ID_VIDEO {
            response.payload
        } else {
            Vec::new()
        };

        self.handle = Some(std::thread::spawn(move || {
            let mut stats = Stats::default();
            parser.append(&initial);
            drain_parser(&mut parser, &mut stats, &frame_callback, &info_callback);

            while running.load(Ordering::Relaxed) {
                let msg = match connection.receive_message(RX_TIMEOUT) {
                    Ok(msg) => msg,
                    // Timeouts just mean no data this second
                    Err(Error::Timeout) => continue,
                    Err(e) => {
                        if running.load(Ordering::Relaxed) {
                            warn!("Stream receive failed: {}", e);
                        }
                        break;
                    }
                };

                if msg.header.msg_id != MSG_ID_VIDEO {
                    debug!(
                        "Ignoring non-video message: {}",
                        msg_id_name(msg.header.msg_id)
                    );
                    continue;
                }

                if !msg.extension.is_empty() {
                    if let Ok(Extension {
                        binary_data: Some(1),
                        ..
                    }) = Extension::try_parse(msg.extension.as_slice())
                    {
                        connection.binary_mode_on(msg.header.msg_num);
                    }
                }

                stats.bytes += msg.payload.len() as u64;
                parser.append(&msg.payload);
                drain_parser(&mut parser, &mut stats, &frame_callback, &info_callback);
            }

            info!(
                "Stream ended after {} frames ({} I, {} P, {} bytes)",
                stats.frames, stats.i_frames, stats.p_frames, stats.bytes
            );
        }));

        info!("Video stream started");
        Ok(())
    }

    /// Stop the stream
    ///
    /// Flips the stop flag, tells the camera on a best-effort basis, and
    /// joins the receive thread. The thread notices the flag within one
    /// receive timeout.
    pub fn stop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        info!("Stopping video stream");
        self.running.store(false, Ordering::Relaxed);

        if let Some(config) = self.config {
            let msg_num = self.connection.next_msg_num();
            if let Err(e) = self.send_preview(MSG_ID_VIDEO_STOP, msg_num, &config) {
                warn!("Could not send stream stop, ignoring: {}", e);
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Stream receive thread panicked");
            }
        }

        if let Some(msg_num) = self.msg_num.take() {
            self.connection.binary_mode_off(msg_num);
        }

        info!("Video stream stopped");
    }

    fn send_preview(&self, msg_id: u32, msg_num: u16, config: &StreamConfig) -> Result<()> {
        let xml = BcXml {
            preview: Some(Preview {
                version: xml_ver(),
                channel_id: config.channel_id,
                handle: config.stream.handle(),
                stream_type: Some(config.stream.name().to_string()),
            }),
            ..Default::default()
        };
        let payload = xml.serialize(vec![]).map_err(Error::Xml)?;

        let mut msg =
            BcMessage::new_with_payload(msg_id, msg_num, payload, MSG_CLASS_MODERN_24);
        msg.header.channel_id = config.channel_id;
        msg.header.stream_type = config.stream.code();
        self.connection.send_message(&msg)
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain_parser(
    parser: &mut BcMediaParser,
    stats: &mut Stats,
    frame_callback: &Option<FrameCallback>,
    info_callback: &Option<InfoCallback>,
) {
    while let Some(frame) = parser.next_frame() {
        stats.frames += 1;
        match &frame {
            BcMediaFrame::Info(info) => {
                info!(
                    "Stream info: {}x{} @ {} fps",
                    info.video_width, info.video_height, info.fps
                );
                if let Some(callback) = info_callback {
                    callback(info);
                }
            }
            BcMediaFrame::IFrame(iframe) => {
                stats.i_frames += 1;
                trace!("IFrame received: {} bytes", iframe.data.len());
            }
            BcMediaFrame::PFrame(pframe) => {
                stats.p_frames += 1;
                trace!("PFrame received: {} bytes", pframe.data.len());
            }
            BcMediaFrame::Aac(_) | BcMediaFrame::Adpcm(_) => {}
        }
        if let Some(callback) = frame_callback {
            callback(&frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcmedia::model::VideoCodec;
    use assert_matches::assert_matches;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc::channel;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn read_msg(sock: &mut TcpStream) -> BcMessage {
        let mut buffer = Vec::new();
        loop {
            match BcMessage::deserialize(&buffer) {
                Ok((msg, _)) => return msg,
                Err(crate::bc::de::Error::Incomplete(_)) => {
                    let mut chunk = [0u8; 4096];
                    let n = sock.read(&mut chunk).unwrap();
                    assert_ne!(n, 0, "camera side saw eof");
                    buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e) => panic!("camera side parse error: {}", e),
            }
        }
    }

    fn send_msg(sock: &mut TcpStream, msg: &BcMessage) {
        let buf = msg.serialize(vec![]).unwrap();
        sock.write_all(&buf).unwrap();
    }

    fn info_record() -> Vec<u8> {
        let mut buf = 0x31303031u32.to_le_bytes().to_vec(); // "1001"
        buf.extend_from_slice(&32u32.to_le_bytes());
        buf.extend_from_slice(&1920u32.to_le_bytes());
        buf.extend_from_slice(&1080u32.to_le_bytes());
        buf.push(0);
        buf.push(30); // fps
        buf.extend_from_slice(&[0; 12]); // start and end time
        buf.extend_from_slice(&[0; 2]);
        buf.extend_from_slice(&[0; 4]);
        buf
    }

    fn iframe_record(payload: &[u8]) -> Vec<u8> {
        let mut buf = 0x63643030u32.to_le_bytes().to_vec(); // "cd00"
        buf.extend_from_slice(b"H264");
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&500u32.to_le_bytes());
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(payload);
        let pad = (8 - payload.len() % 8) % 8;
        buf.extend_from_slice(&vec![0; pad]);
        buf
    }

    #[test]
    fn test_stream_session() {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let camera = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();

            // The preview request arrives in cleartext on an
            // unencrypted session
            let request = read_msg(&mut sock);
            assert_eq!(request.header.msg_id, MSG_ID_VIDEO);
            let xml = BcXml::try_parse(request.payload.as_slice()).unwrap();
            let preview = xml.preview.unwrap();
            assert_eq!(preview.handle, STREAM_HANDLE_SUB);
            assert_eq!(preview.stream_type.as_deref(), Some("subStream"));
            let msg_num = request.header.msg_num;

            // Accept with a binaryData extension and the first media
            // bytes in the same message
            let ext = Extension {
                binary_data: Some(1),
                channel_id: Some(0),
                ..Default::default()
            }
            .serialize(vec![])
            .unwrap();
            let mut accept = BcMessage::new_with_extension(
                MSG_ID_VIDEO,
                msg_num,
                ext,
                info_record(),
                MSG_CLASS_MODERN_24_ALT,
            );
            accept.header.response_code = RESPONSE_CODE_OK;
            send_msg(&mut sock, &accept);

            // An iframe split across two video messages
            let media = iframe_record(&[0x42; 100]);
            let (first, second) = media.split_at(30);
            send_msg(
                &mut sock,
                &BcMessage::new_with_payload(
                    MSG_ID_VIDEO,
                    msg_num,
                    first.to_vec(),
                    MSG_CLASS_MODERN_24_ALT,
                ),
            );
            // A non-video message in between must be ignored
            send_msg(
                &mut sock,
                &BcMessage::new_header_only(MSG_ID_MOTION, 800, MSG_CLASS_MODERN_24_ALT),
            );
            send_msg(
                &mut sock,
                &BcMessage::new_with_payload(
                    MSG_ID_VIDEO,
                    msg_num,
                    second.to_vec(),
                    MSG_CLASS_MODERN_24_ALT,
                ),
            );

            // Wait for the stop request then hang up
            let stop = read_msg(&mut sock);
            assert_eq!(stop.header.msg_id, MSG_ID_VIDEO_STOP);
        });

        let connection =
            Arc::new(Connection::connect(addr, Duration::from_secs(2)).unwrap());
        let mut stream = VideoStream::new(connection);

        let (frame_tx, frame_rx) = channel();
        let (info_tx, info_rx) = channel();
        stream.on_frame(move |frame| {
            let _ = frame_tx.send(frame.clone());
        });
        stream.on_stream_info(move |info| {
            let _ = info_tx.send(info.clone());
        });

        stream
            .start(StreamConfig {
                channel_id: 0,
                stream: Stream::Sub,
            })
            .unwrap();

        let info = info_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(info.video_width, 1920);
        assert_eq!(info.video_height, 1080);

        // First frame is the info record, second the reassembled iframe
        let first = frame_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_matches!(first, BcMediaFrame::Info(_));
        let second = frame_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        match second {
            BcMediaFrame::IFrame(iframe) => {
                assert_eq!(iframe.video_type, VideoCodec::H264);
                assert_eq!(iframe.data, vec![0x42; 100]);
            }
            other => panic!("{:?}", other),
        }

        stream.stop();
        camera.join().unwrap();
    }

    #[test]
    fn test_stream_start_rejected() {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let camera = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let request = read_msg(&mut sock);
            let mut reject = BcMessage::new_header_only(
                MSG_ID_VIDEO,
                request.header.msg_num,
                MSG_CLASS_MODERN_24_ALT,
            );
            reject.header.response_code = RESPONSE_CODE_BAD_REQUEST;
            send_msg(&mut sock, &reject);
        });

        let connection =
            Arc::new(Connection::connect(addr, Duration::from_secs(2)).unwrap());
        let mut stream = VideoStream::new(connection);
        let err = stream
            .start(StreamConfig {
                channel_id: 0,
                stream: Stream::Main,
            })
            .unwrap_err();
        assert_matches!(err, Error::Rejected(400));
        camera.join().unwrap();
    }
}
