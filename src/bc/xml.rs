// YaSerde currently macro-expands names like __type__value from type_
#![allow(non_snake_case)]

use std::io::{Read, Write};
// YaSerde is currently naming the traits and the derive macros identically
use yaserde::ser::Config;
use yaserde_derive::{YaDeserialize, YaSerialize};

#[cfg(test)]
use indoc::indoc;

/// The declaration the cameras emit and expect, with a space before `?>`.
/// yaserde's own declaration differs, so it is written verbatim and
/// yaserde runs with `write_document_declaration` off.
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>"#;

fn ser_config() -> Config {
    Config {
        write_document_declaration: false,
        ..Default::default()
    }
}

/// The top level body xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
#[yaserde(rename = "body")]
pub struct BcXml {
    /// Encryption xml is received during login and contains the nonce
    #[yaserde(rename = "Encryption")]
    pub encryption: Option<Encryption>,
    /// LoginUser xml is used during modern login
    #[yaserde(rename = "LoginUser")]
    pub login_user: Option<LoginUser>,
    /// LoginNet xml is used during modern login
    #[yaserde(rename = "LoginNet")]
    pub login_net: Option<LoginNet>,
    /// The final part of a login sequence will return DeviceInfo xml
    #[yaserde(rename = "DeviceInfo")]
    pub device_info: Option<DeviceInfo>,
    /// Preview xml is used as part of the stream request to set the
    /// stream quality and channel
    #[yaserde(rename = "Preview")]
    pub preview: Option<Preview>,
}

impl BcXml {
    pub(crate) fn try_parse(s: impl Read) -> Result<Self, String> {
        yaserde::de::from_reader(s)
    }
    pub(crate) fn serialize<W: Write>(&self, mut w: W) -> Result<W, String> {
        w.write_all(XML_DECLARATION.as_bytes())
            .map_err(|e| e.to_string())?;
        yaserde::ser::serialize_with_writer(self, w, &ser_config())
    }
}

impl Extension {
    pub(crate) fn try_parse(s: impl Read) -> Result<Self, String> {
        yaserde::de::from_reader(s)
    }
    pub(crate) fn serialize<W: Write>(&self, mut w: W) -> Result<W, String> {
        w.write_all(XML_DECLARATION.as_bytes())
            .map_err(|e| e.to_string())?;
        yaserde::ser::serialize_with_writer(self, w, &ser_config())
    }
}

/// Encryption xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct Encryption {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    #[yaserde(rename = "type")]
    /// The hashing algorithm used. Only observed the value of "md5"
    pub type_: String,
    /// The nonce used to negotiate the login and to generate the AES key
    pub nonce: String,
}

/// LoginUser xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct LoginUser {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Username to login as, hashed with the nonce
    #[yaserde(rename = "userName")]
    pub user_name: String,
    /// Password for login, hashed with the nonce
    pub password: String,
    /// Unknown, always `1`
    #[yaserde(rename = "userVer")]
    pub user_ver: u32,
}

/// LoginNet xml
#[derive(PartialEq, Eq, Debug, YaDeserialize, YaSerialize)]
pub struct LoginNet {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Type of connection, usually LAN (even on wifi)
    #[yaserde(rename = "type")]
    pub type_: String,
    /// The port for udp. Will be `0` for tcp
    #[yaserde(rename = "udpPort")]
    pub udp_port: u16,
}

impl Default for LoginNet {
    fn default() -> Self {
        LoginNet {
            version: xml_ver(),
            type_: "LAN".to_string(),
            udp_port: 0,
        }
    }
}

/// DeviceInfo xml
///
/// There is more to this xml but we don't deserialize it all
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct DeviceInfo {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// The resolution xml block
    pub resolution: Option<Resolution>,
}

/// Resolution xml
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct Resolution {
    /// Resolution name is in the format "width*height" i.e. "2304*1296"
    #[yaserde(rename = "resolutionName")]
    pub name: String,
    /// Width of the stream in pixels
    pub width: u32,
    /// Height of the stream in pixels
    pub height: u32,
}

/// Preview xml
///
/// This xml is used to request a stream to start
#[derive(PartialEq, Eq, Default, Debug, YaDeserialize, YaSerialize)]
pub struct Preview {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// Channel id is usually zero unless using a NVR
    #[yaserde(rename = "channelId")]
    pub channel_id: u8,
    /// Handle is `0` for mainStream, `256` for subStream and `1024` for
    /// externStream
    pub handle: u32,
    /// `"mainStream"`, `"subStream"` or `"externStream"`
    #[yaserde(rename = "streamType")]
    pub stream_type: Option<String>,
}

/// Extension xml
///
/// This is used to describe the payload region beyond the
/// `payload_offset`
#[derive(PartialEq, Eq, Debug, YaDeserialize, YaSerialize)]
pub struct Extension {
    /// XML Version
    #[yaserde(attribute)]
    pub version: String,
    /// If the subsequent payload is binary this will be set to 1.
    /// Otherwise it is omitted
    #[yaserde(rename = "binaryData")]
    pub binary_data: Option<u32>,
    /// Certain requests require to know which user they are for
    #[yaserde(rename = "userName")]
    pub user_name: Option<String>,
    /// Comma separated list of ability categories for requests such as
    /// `AbilitySupport`
    pub token: Option<String>,
    /// The channel ID. This is usually `0` unless using an NVR
    #[yaserde(rename = "channelId")]
    pub channel_id: Option<u8>,
    /// Under full AES this many bytes at the start of a binary payload
    /// are encrypted; the tail is cleartext
    #[yaserde(rename = "encryptLen")]
    pub encrypt_len: Option<u32>,
}

impl Default for Extension {
    fn default() -> Extension {
        Extension {
            version: xml_ver(),
            binary_data: None,
            user_name: None,
            token: None,
            channel_id: None,
            encrypt_len: None,
        }
    }
}

/// Convenience function to return the xml version used throughout the
/// library
pub fn xml_ver() -> String {
    "1.1".to_string()
}

/// Scan `text` for `<tag>value</tag>` and return the value
///
/// The transport uses this on freshly decrypted extension text, which on
/// a bad decrypt is arbitrary bytes; a scan cannot fail the way a full
/// parse would.
pub(crate) fn extract_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <body>
            <Encryption version="1.1">
            <type>md5</type>
            <nonce>9E6D1FCB9E69846D</nonce>
            </Encryption>
            </body>"#
        );
        let b: BcXml = yaserde::de::from_str(sample).unwrap();
        let enc = b.encryption.as_ref().unwrap();

        assert_eq!(enc.version, "1.1");
        assert_eq!(enc.nonce, "9E6D1FCB9E69846D");
        assert_eq!(enc.type_, "md5");

        let t = BcXml::try_parse(sample.as_bytes()).unwrap();
        match t {
            top_b if top_b == b => {}
            _ => panic!(),
        }
    }

    #[test]
    fn test_login_ser() {
        let b = BcXml {
            login_user: Some(LoginUser {
                version: xml_ver(),
                user_name: "9F07915E819A076E2E14169830769D6".to_string(),
                password: "8EFECD610524A98390F118D2789BE3B".to_string(),
                user_ver: 1,
            }),
            login_net: Some(LoginNet::default()),
            ..BcXml::default()
        };

        let buf = b.serialize(vec![]).unwrap();
        let expected = concat!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>"#,
            r#"<body>"#,
            r#"<LoginUser version="1.1">"#,
            r#"<userName>9F07915E819A076E2E14169830769D6</userName>"#,
            r#"<password>8EFECD610524A98390F118D2789BE3B</password>"#,
            r#"<userVer>1</userVer>"#,
            r#"</LoginUser>"#,
            r#"<LoginNet version="1.1">"#,
            r#"<type>LAN</type>"#,
            r#"<udpPort>0</udpPort>"#,
            r#"</LoginNet>"#,
            r#"</body>"#,
        );
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[test]
    fn test_login_roundtrip() {
        let b = BcXml {
            login_user: Some(LoginUser {
                version: xml_ver(),
                user_name: "9F07915E819A076E2E14169830769D6".to_string(),
                password: "8EFECD610524A98390F118D2789BE3B".to_string(),
                user_ver: 1,
            }),
            login_net: Some(LoginNet::default()),
            ..BcXml::default()
        };
        let b2 = BcXml::try_parse(b.serialize(vec![]).unwrap().as_slice()).unwrap();
        assert_eq!(b, b2);
    }

    #[test]
    fn test_preview_ser() {
        let b = BcXml {
            preview: Some(Preview {
                version: xml_ver(),
                channel_id: 0,
                handle: 1024,
                stream_type: Some("externStream".to_string()),
            }),
            ..BcXml::default()
        };
        let buf = b.serialize(vec![]).unwrap();
        let expected = concat!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>"#,
            r#"<body>"#,
            r#"<Preview version="1.1">"#,
            r#"<channelId>0</channelId>"#,
            r#"<handle>1024</handle>"#,
            r#"<streamType>externStream</streamType>"#,
            r#"</Preview>"#,
            r#"</body>"#,
        );
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[test]
    fn test_deviceinfo_partial_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <body>
            <DeviceInfo version="1.1">
            <ipChannel>0</ipChannel>
            <analogChnNum>1</analogChnNum>
            <resolution>
            <resolutionName>3840*2160</resolutionName>
            <width>3840</width>
            <height>2160</height>
            </resolution>
            <language>English</language>
            <sdCard>0</sdCard>
            <ptzMode>none</ptzMode>
            <typeInfo>IPC</typeInfo>
            <softVer>33554880</softVer>
            <B485>0</B485>
            <supportAutoUpdate>0</supportAutoUpdate>
            <userVer>1</userVer>
            </DeviceInfo>
            </body>"#
        );

        // Needs to ignore all the other stuff that we don't care about
        let b = BcXml::try_parse(sample.as_bytes()).unwrap();
        match b {
            BcXml {
                device_info:
                    Some(DeviceInfo {
                        resolution:
                            Some(Resolution {
                                width: 3840,
                                height: 2160,
                                ..
                            }),
                        ..
                    }),
                ..
            } => {}
            _ => panic!(),
        }
    }

    #[test]
    fn test_extension_binary_deser() {
        let sample = indoc!(
            r#"
            <?xml version="1.0" encoding="UTF-8" ?>
            <Extension version="1.1">
            <binaryData>1</binaryData>
            </Extension>
        "#
        );
        let b = Extension::try_parse(sample.as_bytes()).unwrap();
        match b {
            Extension {
                binary_data: Some(1),
                ..
            } => {}
            _ => panic!(),
        }
    }

    #[test]
    fn test_extension_encrypt_len_ser() {
        let ext = Extension {
            binary_data: Some(1),
            channel_id: Some(0),
            encrypt_len: Some(1024),
            ..Default::default()
        };
        let buf = ext.serialize(vec![]).unwrap();
        let expected = concat!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>"#,
            r#"<Extension version="1.1">"#,
            r#"<binaryData>1</binaryData>"#,
            r#"<channelId>0</channelId>"#,
            r#"<encryptLen>1024</encryptLen>"#,
            r#"</Extension>"#,
        );
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
    }

    #[test]
    fn test_extract_tag() {
        let text = r#"<Extension version="1.1"><binaryData>1</binaryData><encryptLen>1024</encryptLen></Extension>"#;
        assert_eq!(extract_tag(text, "binaryData"), Some("1"));
        assert_eq!(extract_tag(text, "encryptLen"), Some("1024"));
        assert_eq!(extract_tag(text, "channelId"), None);
        assert_eq!(extract_tag("<a><b></a>", "b"), None);
    }
}
