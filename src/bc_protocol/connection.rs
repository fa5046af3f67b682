use crate::bc::crypto::EncryptionProtocol;
use crate::bc::model::*;
use crate::bc::{de, xml};
use log::*;
use socket2::{Domain, Socket, Type};
use std::collections::HashSet;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Error, Result};

const RECV_BUFFER_SIZE: usize = 256 * 1024;

struct SendHalf {
    stream: TcpStream,
    offset: u32,
}

struct RecvHalf {
    stream: TcpStream,
    buffer: Vec<u8>,
    offset: u32,
    binary_mode: HashSet<u16>,
}

/// A connection to a camera: the socket, the framing and the cipher
///
/// Writes are serialized by a send lock and reads by a receive lock, so
/// one thread can pump [`receive_message`] while another sends. The
/// cipher is owned here and replaced by the [`Authenticator`] during
/// login.
///
/// [`receive_message`]: Connection::receive_message
/// [`Authenticator`]: super::Authenticator
pub struct Connection {
    stream: TcpStream,
    send: Mutex<SendHalf>,
    recv: Mutex<RecvHalf>,
    encryption: Mutex<EncryptionProtocol>,
    msg_num: AtomicU16,
}

impl Connection {
    /// Connect to a camera
    ///
    /// The usual port is [`DEFAULT_PORT`](super::DEFAULT_PORT). `timeout`
    /// bounds the TCP connect only; receives carry their own timeout.
    pub fn connect<T: ToSocketAddrs>(addr: T, timeout: Duration) -> Result<Connection> {
        let mut last_err = Error::NotConnected;
        for addr in addr.to_socket_addrs()? {
            debug!("Trying address {}", addr);
            match connect_to(addr, timeout) {
                Ok(stream) => {
                    info!("Connected to {}", addr);
                    return Connection::from_stream(stream);
                }
                Err(e) => {
                    warn!("Could not connect to {}: {}", addr, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn from_stream(stream: TcpStream) -> Result<Connection> {
        stream.set_nodelay(true)?;
        let send = SendHalf {
            stream: stream.try_clone()?,
            offset: 0,
        };
        let recv = RecvHalf {
            stream: stream.try_clone()?,
            buffer: Vec::with_capacity(4096),
            offset: 0,
            binary_mode: HashSet::new(),
        };
        Ok(Connection {
            stream,
            send: Mutex::new(send),
            recv: Mutex::new(recv),
            encryption: Mutex::new(EncryptionProtocol::Unencrypted),
            msg_num: AtomicU16::new(0),
        })
    }

    /// Close the socket
    ///
    /// Any receive blocked on the socket returns with an error.
    pub fn disconnect(&self) {
        debug!("Disconnecting");
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Get a fresh sequence number for a new request
    pub fn next_msg_num(&self) -> u16 {
        self.msg_num.fetch_add(1, Ordering::Relaxed)
    }

    /// Replace the cipher, done by the authenticator during login
    pub fn set_encryption(&self, protocol: EncryptionProtocol) {
        *self.encryption.lock().unwrap() = protocol;
    }

    /// Zero the send and receive cipher offsets
    ///
    /// The authenticator does this right after installing a cipher and
    /// again after promoting to AES.
    pub fn reset_encryption_offsets(&self) {
        self.send.lock().unwrap().offset = 0;
        self.recv.lock().unwrap().offset = 0;
    }

    /// Mark a sequence number as carrying binary payloads
    ///
    /// The receive path does this on its own when it sees a
    /// `binaryData` extension; stream sessions also set it defensively.
    pub fn binary_mode_on(&self, msg_num: u16) {
        self.recv.lock().unwrap().binary_mode.insert(msg_num);
    }

    /// Clear the binary flag for a sequence number
    pub fn binary_mode_off(&self, msg_num: u16) {
        self.recv.lock().unwrap().binary_mode.remove(&msg_num);
    }

    /// Serialize, encrypt and send one message
    pub fn send_message(&self, msg: &BcMessage) -> Result<()> {
        let mut send = self.send.lock().unwrap();

        let mut data = msg.serialize(Vec::with_capacity(
            msg.header.header_size() + msg.header.body_len as usize,
        ))?;

        // The header is never encrypted; the body (extension and payload
        // as one region) is, under the current cipher and send offset
        let header_size = msg.header.header_size();
        let body_len = data.len() - header_size;
        if body_len > 0 {
            let encryption = self.encryption.lock().unwrap().clone();
            if encryption != EncryptionProtocol::Unencrypted {
                trace!("Encrypting {} bytes at offset {}", body_len, send.offset);
                let encrypted = encryption.encrypt(send.offset, &data[header_size..]);
                data[header_size..].copy_from_slice(&encrypted);
            }
        }

        debug!(
            "Sending {} message, {} bytes, msg_num={}",
            msg_id_name(msg.header.msg_id),
            data.len(),
            msg.header.msg_num
        );

        use std::io::Write;
        send.stream.write_all(&data)?;
        send.offset = send.offset.wrapping_add(body_len as u32);
        Ok(())
    }

    /// Receive one message, waiting up to `timeout` for each read
    ///
    /// A zero timeout blocks until data arrives. On [`Error::Timeout`]
    /// any partially received bytes stay buffered and the next call
    /// resumes where this one stopped.
    ///
    /// The extension region and, depending on cipher and binary mode, the
    /// payload region are decrypted before the message is returned.
    pub fn receive_message(&self, timeout: Duration) -> Result<BcMessage> {
        let mut recv = self.recv.lock().unwrap();

        let (mut msg, consumed) = loop {
            match BcMessage::deserialize(&recv.buffer) {
                Ok(parsed) => break parsed,
                Err(de::Error::Incomplete(_)) => fill(&mut recv, timeout)?,
                Err(e) => return Err(e.into()),
            }
        };
        recv.buffer.drain(..consumed);

        let encryption = self.encryption.lock().unwrap().clone();
        let offset = recv.offset;
        process_body(&encryption, offset, &mut recv.binary_mode, &mut msg);
        recv.offset = recv.offset.wrapping_add(msg.header.body_len);

        debug!(
            "Received {} message, {} bytes, response={}, msg_num={}",
            msg_id_name(msg.header.msg_id),
            consumed,
            msg.header.response_code,
            msg.header.msg_num
        );

        Ok(msg)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Read at least one more chunk from the socket into the buffer
fn fill(recv: &mut RecvHalf, timeout: Duration) -> Result<()> {
    // A zero timeout means block until data arrives
    let read_timeout = if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    };
    recv.stream.set_read_timeout(read_timeout)?;

    let mut chunk = [0u8; 4096];
    loop {
        match recv.stream.read(&mut chunk) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed by peer",
                )
                .into())
            }
            Ok(n) => {
                recv.buffer.extend_from_slice(&chunk[..n]);
                return Ok(());
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(Error::Timeout)
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

/// Apply the selective decryption rules to a freshly framed message
///
/// The extension is always XML and always decrypted. Whether the payload
/// is decrypted depends on the cipher and on whether this sequence number
/// carries binary data: binary media is cleartext except under full AES,
/// where only the `encryptLen` prefix announced in the extension is
/// ciphered.
fn process_body(
    encryption: &EncryptionProtocol,
    offset: u32,
    binary_mode: &mut HashSet<u16>,
    msg: &mut BcMessage,
) {
    if !msg.extension.is_empty() {
        if *encryption != EncryptionProtocol::Unencrypted {
            msg.extension = encryption.decrypt(offset, &msg.extension);
        }

        let ext_text = String::from_utf8_lossy(&msg.extension).into_owned();
        let binary_here = matches!(
            xml::extract_tag(&ext_text, "binaryData"),
            Some(v) if v.trim() == "1"
        );
        let encrypt_len = xml::extract_tag(&ext_text, "encryptLen")
            .and_then(|v| v.trim().parse::<u32>().ok());

        // Binary mode is sticky: once set for a sequence number it holds
        // for every later message with that number
        if binary_here {
            binary_mode.insert(msg.header.msg_num);
        }
        let is_binary = binary_here || binary_mode.contains(&msg.header.msg_num);

        if msg.payload.is_empty() {
            return;
        }
        if is_binary {
            // Binary media is cleartext except under full AES, where the
            // extension announces how much of it is ciphered
            if encryption.encrypts_video() {
                match encrypt_len {
                    Some(n) if n > 0 && (n as usize) < msg.payload.len() => {
                        // Only the announced prefix is ciphered; running
                        // the stream cipher over the cleartext tail would
                        // turn it to garbage
                        let mut payload = encryption.decrypt(offset, &msg.payload[..n as usize]);
                        payload.extend_from_slice(&msg.payload[n as usize..]);
                        msg.payload = payload;
                    }
                    Some(n) if n > 0 => {
                        msg.payload = encryption.decrypt(offset, &msg.payload);
                    }
                    // encryptLen of zero or missing: raw passthrough
                    _ => {}
                }
            }
        } else if *encryption != EncryptionProtocol::Unencrypted {
            // XML payloads are always ciphered
            msg.payload = encryption.decrypt(offset, &msg.payload);
        }
    } else {
        // No extension, the whole body is payload. Without fresh
        // extension metadata only the sticky flag and the message id tell
        // binary from XML
        let is_binary = binary_mode.contains(&msg.header.msg_num)
            || matches!(msg.header.msg_id, MSG_ID_VIDEO | MSG_ID_VIDEO_STOP);
        if *encryption != EncryptionProtocol::Unencrypted
            && !is_binary
            && !msg.payload.is_empty()
        {
            msg.payload = encryption.decrypt(offset, &msg.payload);
        }
    }
}

/// Helper to create a TcpStream with a connect timeout
fn connect_to(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let socket = match addr {
        SocketAddr::V4(_) => Socket::new(Domain::IPV4, Type::STREAM, None)?,
        SocketAddr::V6(_) => {
            let s = Socket::new(Domain::IPV6, Type::STREAM, None)?;
            s.set_only_v6(false)?;
            s
        }
    };

    socket.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    socket.connect_timeout(&addr.into(), timeout)?;

    Ok(socket.into())
}
