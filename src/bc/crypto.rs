use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};

type Aes128CfbEnc = Encryptor<aes::Aes128>;
type Aes128CfbDec = Decryptor<aes::Aes128>;

const XML_KEY: [u8; 8] = [0x1F, 0x2D, 0x3C, 0x4B, 0x5A, 0x69, 0x78, 0xFF];
const IV: &[u8] = b"0123456789abcdef";

/// The encryption modes supported by the camera
///
/// The mode is negotiated during login. The AES modes derive their key
/// from the camera's password and the negotiated nonce, see
/// [`make_aes_key`](crate::bc_protocol::make_aes_key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionProtocol {
    /// Older cameras use no encryption
    Unencrypted,
    /// Cameras/firmwares before 2021 use a simple XOr with a fixed key
    BcXor,
    /// AES-128-CFB over XML regions only; binary media stays cleartext
    Aes([u8; 16]),
    /// AES-128-CFB over XML and over the announced prefix of binary
    /// media payloads
    FullAes([u8; 16]),
}

impl EncryptionProtocol {
    /// Decrypt a whole region of a message body
    ///
    /// `offset` is the cipher offset of the region's first byte. It is
    /// fixed for the duration of the call: the XOr key index advances per
    /// byte but the offset byte itself does not. The AES modes reset to
    /// the fixed IV on every call and ignore `offset`.
    pub fn decrypt(&self, offset: u32, buf: &[u8]) -> Vec<u8> {
        match self {
            EncryptionProtocol::Unencrypted => buf.to_vec(),
            EncryptionProtocol::BcXor => {
                let key_iter = XML_KEY.iter().cycle().skip(offset as usize % 8);
                key_iter
                    .zip(buf)
                    .map(|(key, i)| *i ^ key ^ (offset as u8))
                    .collect()
            }
            EncryptionProtocol::Aes(aeskey) | EncryptionProtocol::FullAes(aeskey) => {
                let mut decrypted = buf.to_vec();
                Aes128CfbDec::new(aeskey.into(), IV.into()).decrypt(&mut decrypted);
                decrypted
            }
        }
    }

    /// Encrypt a whole region of a message body
    pub fn encrypt(&self, offset: u32, buf: &[u8]) -> Vec<u8> {
        match self {
            EncryptionProtocol::Unencrypted | EncryptionProtocol::BcXor => {
                // XOr is symmetric
                self.decrypt(offset, buf)
            }
            EncryptionProtocol::Aes(aeskey) | EncryptionProtocol::FullAes(aeskey) => {
                let mut encrypted = buf.to_vec();
                Aes128CfbEnc::new(aeskey.into(), IV.into()).encrypt(&mut encrypted);
                encrypted
            }
        }
    }

    /// True when binary media payloads are (partially) encrypted too
    pub fn encrypts_video(&self) -> bool {
        matches!(self, EncryptionProtocol::FullAes(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcxor_known_bytes() {
        // At offset zero the keystream is just the fixed key
        let zeros = [0u8; 8];
        let crypted = EncryptionProtocol::BcXor.encrypt(0, &zeros);
        assert_eq!(crypted, XML_KEY.to_vec());
    }

    #[test]
    fn test_bcxor_roundtrip() {
        let data: Vec<u8> = (0u8..=255).collect();
        for offset in [0u32, 1, 7, 8, 1000, 0xFFFF_FFFF] {
            let crypted = EncryptionProtocol::BcXor.encrypt(offset, &data);
            let decrypted = EncryptionProtocol::BcXor.decrypt(offset, &crypted);
            assert_eq!(decrypted, data, "offset {}", offset);
        }
    }

    #[test]
    fn test_bcxor_offset_is_not_advanced() {
        // The offset byte folded into every output byte is the call's
        // offset, not offset + i
        let offset = 0x0305;
        let data = [0xAAu8; 16];
        let crypted = EncryptionProtocol::BcXor.encrypt(offset, &data);
        for (i, byte) in crypted.iter().enumerate() {
            let expected =
                0xAA ^ XML_KEY[(offset as usize + i) % 8] ^ (offset as u8);
            assert_eq!(*byte, expected, "byte {}", i);
        }
    }

    #[test]
    fn test_aes_roundtrip_unaligned() {
        let key = *b"0123456789ABCDEF";
        let protocol = EncryptionProtocol::Aes(key);
        // Deliberately not a multiple of the block size
        let plaintext: Vec<u8> = (0u8..=210).collect();
        let crypted = protocol.encrypt(0, &plaintext);
        assert_eq!(crypted.len(), plaintext.len());
        assert_ne!(crypted, plaintext);
        let decrypted = protocol.decrypt(0, &crypted);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_aes_resets_per_message() {
        // Two encrypts of the same bytes must produce the same bytes:
        // the CFB state does not persist across messages
        let key = *b"0123456789ABCDEF";
        let protocol = EncryptionProtocol::FullAes(key);
        let plaintext = b"some xml or other".to_vec();
        let first = protocol.encrypt(0, &plaintext);
        let second = protocol.encrypt(0, &plaintext);
        assert_eq!(first, second);
    }

    #[test]
    fn test_encrypts_video() {
        let key = [0u8; 16];
        assert!(!EncryptionProtocol::Unencrypted.encrypts_video());
        assert!(!EncryptionProtocol::BcXor.encrypts_video());
        assert!(!EncryptionProtocol::Aes(key).encrypts_video());
        assert!(EncryptionProtocol::FullAes(key).encrypts_video());
    }
}
