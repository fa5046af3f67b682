use crate::bc::crypto::EncryptionProtocol;
use crate::bc::model::*;
use crate::bc::xml::*;
use log::*;
use std::time::Duration;

use super::{make_aes_key, md5_string, Connection, Error, Result};

/// How long to wait for each login reply
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Cameras sometimes interleave asynchronous events with login replies;
/// skip up to this many of them
const MAX_SKIPPED_MESSAGES: usize = 5;

/// The strongest encryption the caller is willing to negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxEncryption {
    /// Only talk to cameras that need no encryption
    Unencrypted,
    /// Allow up to the BC XOR cipher
    BcEncrypt,
    /// Allow up to AES (including full AES)
    Aes,
}

/// The encryption mode the camera selected during negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedEncryption {
    /// No encryption at all
    Unencrypted,
    /// The BC XOR cipher
    BcXor,
    /// AES on XML regions only
    Aes,
    /// AES on XML and binary media
    FullAes,
}

/// The outcome of a successful login
#[derive(Debug)]
pub struct LoginResult {
    /// Device details the camera sent back, resolution included
    pub device_info: DeviceInfo,
    /// The encryption mode that ended up negotiated
    pub negotiated: NegotiatedEncryption,
}

/// Runs the three-step negotiate-and-login protocol over a borrowed
/// connection
///
/// The whole handshake uses a single sequence number. On success the
/// negotiated cipher has been installed into the connection and all
/// subsequent traffic, sent and received, uses it.
pub struct Authenticator<'a> {
    connection: &'a Connection,
}

impl<'a> Authenticator<'a> {
    /// Create an authenticator over this connection
    pub fn new(connection: &'a Connection) -> Self {
        Authenticator { connection }
    }

    /// Log in to the camera
    ///
    /// Login flow is: send a legacy login message carrying our preferred
    /// encryption in its response code; get back the negotiated mode and
    /// the nonce; re-send the login as a modern message with nonce-hashed
    /// credentials; get back a DeviceInfo congratulating us on logging
    /// in. When AES was negotiated the login message itself still goes
    /// out under the XOR cipher, and the AES key is only installed once
    /// the camera accepts the credentials.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        max_encryption: MaxEncryption,
    ) -> Result<LoginResult> {
        let msg_num = self.connection.next_msg_num();
        info!("Logging in as {}", username);

        self.send_legacy_login(msg_num, max_encryption)?;

        let (negotiated, nonce) = self.receive_negotiation()?;
        debug!("Negotiated encryption {:?}, nonce {:?}", negotiated, nonce);

        // During login the protocol uses the XOR cipher even when AES was
        // negotiated; the key derived here is only applied after the
        // camera accepts the credentials
        let promoted = match negotiated {
            NegotiatedEncryption::Unencrypted => None,
            NegotiatedEncryption::BcXor => {
                self.connection.set_encryption(EncryptionProtocol::BcXor);
                None
            }
            NegotiatedEncryption::Aes => {
                self.connection.set_encryption(EncryptionProtocol::BcXor);
                Some(EncryptionProtocol::Aes(make_aes_key(&nonce, password)))
            }
            NegotiatedEncryption::FullAes => {
                self.connection.set_encryption(EncryptionProtocol::BcXor);
                Some(EncryptionProtocol::FullAes(make_aes_key(&nonce, password)))
            }
        };
        self.connection.reset_encryption_offsets();

        self.send_modern_login(msg_num, username, password, &nonce)?;

        let device_info = self.receive_login_response()?;

        if let Some(protocol) = promoted {
            debug!("Switching to {:?} for subsequent messages", negotiated);
            self.connection.set_encryption(protocol);
            self.connection.reset_encryption_offsets();
        }

        info!("Login successful");
        Ok(LoginResult {
            device_info,
            negotiated,
        })
    }

    fn send_legacy_login(&self, msg_num: u16, max_encryption: MaxEncryption) -> Result<()> {
        let mut legacy_login =
            BcMessage::new_header_only(MSG_ID_LOGIN, msg_num, MSG_CLASS_LEGACY);
        legacy_login.header.response_code = match max_encryption {
            MaxEncryption::Unencrypted => ENC_REQ_NONE,
            MaxEncryption::BcEncrypt => ENC_REQ_BC,
            MaxEncryption::Aes => ENC_REQ_AES,
        };
        self.connection.send_message(&legacy_login)
    }

    /// Wait for the login reply carrying the negotiation result and the
    /// nonce, skipping unsolicited messages
    fn receive_negotiation(&self) -> Result<(NegotiatedEncryption, String)> {
        let msg = self.receive_login_reply("encryption negotiation")?;

        let response_code = msg.header.response_code;
        if response_code >> 8 != 0xdd {
            return Err(Error::NegotiationMalformed(
                "Reply carries no negotiation code",
            ));
        }
        let negotiated = match response_code & 0xff {
            0x00 => NegotiatedEncryption::Unencrypted,
            0x01 => NegotiatedEncryption::BcXor,
            0x02 => NegotiatedEncryption::Aes,
            0x12 => NegotiatedEncryption::FullAes,
            other => {
                // The modern login will then be rejected cleanly
                warn!(
                    "Unknown negotiation code 0x{:02x}, proceeding unencrypted",
                    other
                );
                NegotiatedEncryption::Unencrypted
            }
        };

        // The nonce payload is always XOR encrypted, whatever was
        // negotiated: the session has no AES key yet
        let payload = match negotiated {
            NegotiatedEncryption::Unencrypted => msg.payload,
            _ => EncryptionProtocol::BcXor.decrypt(0, &msg.payload),
        };

        let xml = BcXml::try_parse(payload.as_slice())
            .map_err(|_| Error::NegotiationMalformed("Encryption xml did not parse"))?;
        let nonce = match xml.encryption {
            Some(Encryption { nonce, .. }) => nonce,
            None => {
                return Err(Error::NegotiationMalformed(
                    "Expected an Encryption xml in the reply",
                ))
            }
        };

        Ok((negotiated, nonce))
    }

    fn send_modern_login(
        &self,
        msg_num: u16,
        username: &str,
        password: &str,
        nonce: &str,
    ) -> Result<()> {
        // Credentials are concat'd with the camera's nonce, MD5'd, and
        // the truncated hex of the digest is what actually logs in. The
        // nonce stops replay, not rainbow tables, so use a strong
        // password
        let md5_username = md5_string(&format!("{}{}", username, nonce));
        let md5_password = md5_string(&format!("{}{}", password, nonce));

        let xml = BcXml {
            login_user: Some(LoginUser {
                version: xml_ver(),
                user_name: md5_username,
                password: md5_password,
                user_ver: 1,
            }),
            login_net: Some(LoginNet::default()),
            ..Default::default()
        };
        let payload = xml.serialize(vec![]).map_err(Error::Xml)?;

        let modern_login =
            BcMessage::new_with_payload(MSG_ID_LOGIN, msg_num, payload, MSG_CLASS_MODERN_24);
        self.connection.send_message(&modern_login)
    }

    fn receive_login_response(&self) -> Result<DeviceInfo> {
        let msg = self.receive_login_reply("login response")?;

        if msg.header.response_code != RESPONSE_CODE_OK {
            return Err(Error::InvalidCredentials(msg.header.response_code));
        }

        if msg.payload.is_empty() {
            // Some cameras acknowledge without any device details
            return Ok(DeviceInfo::default());
        }
        let xml = BcXml::try_parse(msg.payload.as_slice())
            .map_err(|_| Error::LoginFailed("Login reply xml did not parse"))?;
        xml.device_info
            .ok_or(Error::LoginFailed("Expected a DeviceInfo xml in the reply"))
    }

    fn receive_login_reply(&self, what: &'static str) -> Result<BcMessage> {
        for _ in 0..MAX_SKIPPED_MESSAGES {
            let msg = match self.connection.receive_message(LOGIN_TIMEOUT) {
                Ok(msg) => msg,
                Err(Error::Timeout) => return Err(Error::NoResponse(what)),
                Err(e) => return Err(e),
            };
            if msg.header.msg_id == MSG_ID_LOGIN {
                return Ok(msg);
            }
            debug!(
                "Skipping unexpected {} message during login",
                msg_id_name(msg.header.msg_id)
            );
        }
        Err(Error::NoResponse(what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const NONCE: &str = "ABCDEF";
    const PASSWORD: &str = "password123";

    fn encryption_xml() -> Vec<u8> {
        let xml = BcXml {
            encryption: Some(Encryption {
                version: xml_ver(),
                type_: "md5".to_string(),
                nonce: NONCE.to_string(),
            }),
            ..Default::default()
        };
        xml.serialize(vec![]).unwrap()
    }

    fn device_info_xml() -> Vec<u8> {
        let xml = BcXml {
            device_info: Some(DeviceInfo {
                version: xml_ver(),
                resolution: Some(Resolution {
                    name: "2560*1440".to_string(),
                    width: 2560,
                    height: 1440,
                }),
            }),
            ..Default::default()
        };
        xml.serialize(vec![]).unwrap()
    }

    fn send_msg(sock: &mut TcpStream, msg: &BcMessage) {
        let buf = msg.serialize(vec![]).unwrap();
        sock.write_all(&buf).unwrap();
    }

    /// A scripted camera: negotiates AES, then accepts the login
    fn scripted_camera(listener: TcpListener, interleave_motion: bool) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();

            // Step 1: the legacy login arrives
            let legacy = read_msg(&mut sock);
            assert_eq!(legacy.header.msg_id, MSG_ID_LOGIN);
            assert_eq!(legacy.header.class, MSG_CLASS_LEGACY);
            assert_eq!(legacy.header.response_code, ENC_REQ_AES);
            assert_eq!(legacy.header.body_len, 0);
            let msg_num = legacy.header.msg_num;

            // Step 2: reply with the negotiation result; the nonce
            // payload is XOR encrypted because there is no key yet
            let payload = EncryptionProtocol::BcXor.encrypt(0, &encryption_xml());
            let mut nego =
                BcMessage::new_with_payload(MSG_ID_LOGIN, msg_num, payload, MSG_CLASS_MODERN_20);
            nego.header.response_code = ENC_RESP_AES;
            send_msg(&mut sock, &nego);

            // Step 3: the modern login arrives, XOR encrypted at offset 0
            let modern = read_msg(&mut sock);
            assert_eq!(modern.header.msg_id, MSG_ID_LOGIN);
            assert_eq!(modern.header.class, MSG_CLASS_MODERN_24);
            assert_eq!(modern.header.msg_num, msg_num);
            let login_xml =
                EncryptionProtocol::BcXor.decrypt(0, &modern.payload);
            let parsed = BcXml::try_parse(login_xml.as_slice()).unwrap();
            let login_user = parsed.login_user.unwrap();
            assert_eq!(login_user.user_name.len(), 31);
            assert_eq!(
                login_user.password,
                md5_string(&format!("{}{}", PASSWORD, NONCE))
            );

            if interleave_motion {
                // An unsolicited event before the login response; the
                // authenticator must skip it
                let motion =
                    BcMessage::new_header_only(MSG_ID_MOTION, 900, MSG_CLASS_MODERN_24_ALT);
                send_msg(&mut sock, &motion);
            }

            // Step 4: accept, still under XOR at offset 0
            let payload = EncryptionProtocol::BcXor.encrypt(0, &device_info_xml());
            let mut accept = BcMessage::new_with_payload(
                MSG_ID_LOGIN,
                msg_num,
                payload,
                MSG_CLASS_MODERN_24_ALT,
            );
            accept.header.response_code = RESPONSE_CODE_OK;
            send_msg(&mut sock, &accept);

            // Step 5: the session is now on AES; check we can read what
            // the client sends with the derived key
            let key = make_aes_key(NONCE, PASSWORD);
            let ping = read_msg(&mut sock);
            assert_eq!(ping.header.msg_id, MSG_ID_PING);
            let aes = EncryptionProtocol::Aes(key);
            let body = aes.decrypt(0, &ping.payload);
            assert_eq!(body, b"<body></body>");
        })
    }

    /// Read one raw message off the socket without any decryption
    fn read_msg(sock: &mut TcpStream) -> BcMessage {
        use std::io::Read;
        let mut buffer = Vec::new();
        loop {
            match BcMessage::deserialize(&buffer) {
                Ok((msg, consumed)) => {
                    assert_eq!(consumed, buffer.len(), "test reads one message at a time");
                    return msg;
                }
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

    fn run_login(interleave_motion: bool) {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let camera = scripted_camera(listener, interleave_motion);

        let conn = Connection::connect(addr, Duration::from_secs(2)).unwrap();
        let auth = Authenticator::new(&conn);
        let result = auth.login("admin", PASSWORD, MaxEncryption::Aes).unwrap();

        assert_eq!(result.negotiated, NegotiatedEncryption::Aes);
        assert_matches!(
            result.device_info.resolution,
            Some(Resolution { width: 2560, height: 1440, .. })
        );

        // The connection is now on AES; send something so the camera
        // side can verify the key
        let ping = BcMessage::new_with_payload(
            MSG_ID_PING,
            conn.next_msg_num(),
            b"<body></body>".to_vec(),
            MSG_CLASS_MODERN_24,
        );
        conn.send_message(&ping).unwrap();

        camera.join().unwrap();
    }

    #[test]
    fn test_login_aes_negotiated() {
        run_login(false);
    }

    #[test]
    fn test_login_skips_interleaved_motion() {
        run_login(true);
    }

    #[test]
    fn test_login_rejected() {
        init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let camera = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let legacy = read_msg(&mut sock);
            let msg_num = legacy.header.msg_num;

            let payload = EncryptionProtocol::BcXor.encrypt(0, &encryption_xml());
            let mut nego =
                BcMessage::new_with_payload(MSG_ID_LOGIN, msg_num, payload, MSG_CLASS_MODERN_20);
            nego.header.response_code = ENC_RESP_BC;
            send_msg(&mut sock, &nego);

            let _modern = read_msg(&mut sock);
            let mut reject =
                BcMessage::new_header_only(MSG_ID_LOGIN, msg_num, MSG_CLASS_MODERN_24_ALT);
            reject.header.response_code = RESPONSE_CODE_BAD_REQUEST;
            send_msg(&mut sock, &reject);
        });

        let conn = Connection::connect(addr, Duration::from_secs(2)).unwrap();
        let auth = Authenticator::new(&conn);
        let err = auth
            .login("admin", "wrong", MaxEncryption::Aes)
            .unwrap_err();
        assert_matches!(err, Error::InvalidCredentials(400));
        camera.join().unwrap();
    }
}
