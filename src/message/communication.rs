//! Session control messages: start, stop, acknowledges and keep-alive.

use tracing::warn;

use super::{mid, MessageCategory, MessageSpec, OpenProtocolMessage};
use crate::error::{OpenProtocolError, Result};
use crate::parser::{parse_frame, FieldSpec, FieldTarget, Value};
use crate::protocol::Frame;

/// MID 1. Opens the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunicationStart {
    pub revision: u16,
}

impl CommunicationStart {
    /// Revision requested when none is given; asks for the richest MID 2 reply.
    pub const DEFAULT_REVISION: u16 = 3;

    pub fn with_revision(revision: u16) -> Self {
        Self { revision }
    }
}

impl Default for CommunicationStart {
    fn default() -> Self {
        Self::with_revision(Self::DEFAULT_REVISION)
    }
}

impl OpenProtocolMessage for CommunicationStart {
    const SPEC: MessageSpec = MessageSpec::new(mid::COMMUNICATION_START, MessageCategory::Request)
        .with_responses(&[mid::COMMUNICATION_START_ACK]);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        Ok(String::new())
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self::with_revision(frame.revision()))
    }
}

/// MID 2. Controller identity returned by the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunicationStartAck {
    pub revision: u16,
    pub cell_id: u16,
    pub channel_id: u8,
    pub controller_name: String,
    pub supplier_code: String,
    /// Revision 2 and later.
    pub open_protocol_version: Option<String>,
    /// Revision 3 and later.
    pub controller_software_version: Option<String>,
    /// Revision 3 and later.
    pub tool_software_version: Option<String>,
}

/// Tag positions; controllers in the field are not strict about these.
const START_ACK_TAGS: &[(usize, &str)] = &[
    (0, "01"),
    (6, "02"),
    (10, "03"),
    (37, "04"),
    (42, "05"),
    (63, "06"),
    (84, "07"),
];

const START_ACK_FIELDS: &[FieldSpec] = &[
    FieldSpec::integer("cell_id", 2, 6).with_default(Value::Integer(0)),
    FieldSpec::integer("channel_id", 8, 10).with_default(Value::Integer(0)),
    FieldSpec::text("controller_name", 12, 37),
    FieldSpec::text("supplier_code", 39, 42),
];

const START_ACK_FIELDS_REV2: &[FieldSpec] = &[FieldSpec::text("open_protocol_version", 44, 63)];

const START_ACK_FIELDS_REV3: &[FieldSpec] = &[
    FieldSpec::text("controller_software_version", 65, 84),
    FieldSpec::text("tool_software_version", 86, 105),
];

impl FieldTarget for CommunicationStartAck {
    fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()> {
        match name {
            "cell_id" => self.cell_id = value.to_int(name)?,
            "channel_id" => self.channel_id = value.to_int(name)?,
            "controller_name" => self.controller_name = value.to_text(name)?,
            "supplier_code" => self.supplier_code = value.to_text(name)?,
            "open_protocol_version" => self.open_protocol_version = Some(value.to_text(name)?),
            "controller_software_version" => {
                self.controller_software_version = Some(value.to_text(name)?)
            }
            "tool_software_version" => self.tool_software_version = Some(value.to_text(name)?),
            _ => return Err(OpenProtocolError::field_parse(name, "unknown field")),
        }
        Ok(())
    }
}

impl OpenProtocolMessage for CommunicationStartAck {
    const SPEC: MessageSpec =
        MessageSpec::new(mid::COMMUNICATION_START_ACK, MessageCategory::RequestReply);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        let mut out = format!(
            "01{:04}02{:02}03{:<25.25}04{:<3.3}",
            self.cell_id, self.channel_id, self.controller_name, self.supplier_code
        );
        if self.revision >= 2 {
            let version = self.open_protocol_version.as_deref().unwrap_or_default();
            out.push_str(&format!("05{:<19.19}", version));
        }
        if self.revision >= 3 {
            let controller = self.controller_software_version.as_deref().unwrap_or_default();
            let tool = self.tool_software_version.as_deref().unwrap_or_default();
            out.push_str(&format!("06{:<19.19}07{:<19.19}", controller, tool));
        }
        Ok(out)
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        let payload = frame.payload();
        for &(offset, tag) in START_ACK_TAGS {
            match payload.get(offset..offset + 2) {
                Some(found) if found != tag => {
                    warn!("MID 2 field tag at {} is {:?}, expected {:?}", offset, found, tag)
                }
                _ => {}
            }
        }

        let mut ack = Self {
            revision: frame.revision(),
            ..Self::default()
        };
        parse_frame(frame, START_ACK_FIELDS, &mut ack)?;
        if ack.revision >= 2 {
            parse_frame(frame, START_ACK_FIELDS_REV2, &mut ack)?;
        }
        if ack.revision >= 3 {
            parse_frame(frame, START_ACK_FIELDS_REV3, &mut ack)?;
        }
        Ok(ack)
    }
}

/// MID 3. Closes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunicationStop {
    pub revision: u16,
}

impl Default for CommunicationStop {
    fn default() -> Self {
        Self { revision: 1 }
    }
}

impl OpenProtocolMessage for CommunicationStop {
    const SPEC: MessageSpec = MessageSpec::new(mid::COMMUNICATION_STOP, MessageCategory::Request)
        .with_responses(&[mid::POSITIVE_ACK]);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        Ok(String::new())
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self {
            revision: frame.revision(),
        })
    }
}

/// MID 4. The controller refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativeAck {
    pub revision: u16,
    /// MID of the refused request.
    pub failed_mid: u16,
    pub error_code: u16,
}

impl NegativeAck {
    pub fn new(failed_mid: u16, error_code: u16) -> Self {
        Self {
            revision: 1,
            failed_mid,
            error_code,
        }
    }

    /// Convert into the error surfaced to callers.
    pub fn into_error(self) -> OpenProtocolError {
        OpenProtocolError::NegativeAck {
            mid: self.failed_mid,
            error_code: self.error_code,
        }
    }
}

const NEGATIVE_ACK_FIELDS_REV1: &[FieldSpec] = &[
    FieldSpec::integer("failed_mid", 0, 4),
    FieldSpec::integer("error_code", 4, 6),
];

const NEGATIVE_ACK_FIELDS: &[FieldSpec] = &[
    FieldSpec::integer("failed_mid", 0, 4),
    FieldSpec::integer("error_code", 4, 7),
];

impl FieldTarget for NegativeAck {
    fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()> {
        match name {
            "failed_mid" => self.failed_mid = value.to_int(name)?,
            "error_code" => self.error_code = value.to_int(name)?,
            _ => return Err(OpenProtocolError::field_parse(name, "unknown field")),
        }
        Ok(())
    }
}

impl OpenProtocolMessage for NegativeAck {
    const SPEC: MessageSpec = MessageSpec::new(mid::NEGATIVE_ACK, MessageCategory::RequestReply);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        Ok(if self.revision == 1 {
            format!("{:04}{:02}", self.failed_mid, self.error_code)
        } else {
            format!("{:04}{:03}", self.failed_mid, self.error_code)
        })
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        let mut nack = Self {
            revision: frame.revision(),
            failed_mid: 0,
            error_code: 0,
        };
        let fields = if nack.revision == 1 {
            NEGATIVE_ACK_FIELDS_REV1
        } else {
            NEGATIVE_ACK_FIELDS
        };
        parse_frame(frame, fields, &mut nack)?;
        Ok(nack)
    }
}

/// MID 5. The controller accepted a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositiveAck {
    pub revision: u16,
    /// MID of the accepted request.
    pub acknowledged_mid: u16,
}

impl PositiveAck {
    pub fn new(acknowledged_mid: u16) -> Self {
        Self {
            revision: 1,
            acknowledged_mid,
        }
    }
}

const POSITIVE_ACK_FIELDS: &[FieldSpec] = &[FieldSpec::integer("acknowledged_mid", 0, 4)];

impl FieldTarget for PositiveAck {
    fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()> {
        match name {
            "acknowledged_mid" => self.acknowledged_mid = value.to_int(name)?,
            _ => return Err(OpenProtocolError::field_parse(name, "unknown field")),
        }
        Ok(())
    }
}

impl OpenProtocolMessage for PositiveAck {
    const SPEC: MessageSpec = MessageSpec::new(mid::POSITIVE_ACK, MessageCategory::RequestReply);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        Ok(format!("{:04}", self.acknowledged_mid))
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        let mut ack = Self {
            revision: frame.revision(),
            acknowledged_mid: 0,
        };
        parse_frame(frame, POSITIVE_ACK_FIELDS, &mut ack)?;
        Ok(ack)
    }
}

/// MID 9999. Sent periodically; the controller echoes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub revision: u16,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self { revision: 1 }
    }
}

impl OpenProtocolMessage for KeepAlive {
    const SPEC: MessageSpec = MessageSpec::new(mid::KEEP_ALIVE, MessageCategory::Request)
        .with_responses(&[mid::KEEP_ALIVE]);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        Ok(String::new())
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        Ok(Self {
            revision: frame.revision(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;

    fn frame(mid: u16, revision: u16, payload: &str) -> Frame {
        Frame::new(Header::new(mid, revision), payload).unwrap()
    }

    #[test]
    fn test_start_encodes_empty_payload() {
        let frame = CommunicationStart::default().to_frame().unwrap();
        assert_eq!(frame.as_str(), "00200001003         ");
    }

    #[test]
    fn test_start_ack_rev1() {
        let payload = "010001020103Test controller          04ACT";
        let ack = CommunicationStartAck::from_frame(&frame(2, 1, payload)).unwrap();

        assert_eq!(ack.cell_id, 1);
        assert_eq!(ack.channel_id, 1);
        assert_eq!(ack.controller_name, "Test controller");
        assert_eq!(ack.supplier_code, "ACT");
        assert_eq!(ack.open_protocol_version, None);
    }

    #[test]
    fn test_start_ack_rev3_roundtrip() {
        let ack = CommunicationStartAck {
            revision: 3,
            cell_id: 12,
            channel_id: 4,
            controller_name: "STa 6000".into(),
            supplier_code: "ACT".into(),
            open_protocol_version: Some("2.8.0".into()),
            controller_software_version: Some("A1.2".into()),
            tool_software_version: Some("T3.4".into()),
        };
        let frame = ack.to_frame().unwrap();
        assert_eq!(frame.payload_len(), 105);

        let decoded = CommunicationStartAck::from_frame(&frame).unwrap();
        assert_eq!(decoded, ack);
    }

    #[test]
    fn test_start_ack_tolerates_bad_tags() {
        let payload = "990001020103Controller               04ACT";
        let ack = CommunicationStartAck::from_frame(&frame(2, 1, payload)).unwrap();
        assert_eq!(ack.controller_name, "Controller");
    }

    #[test]
    fn test_negative_ack_code_width_depends_on_revision() {
        let nack = NegativeAck::from_frame(&frame(4, 1, "001897")).unwrap();
        assert_eq!((nack.failed_mid, nack.error_code), (18, 97));

        let nack = NegativeAck::from_frame(&frame(4, 2, "0018097")).unwrap();
        assert_eq!((nack.failed_mid, nack.error_code), (18, 97));

        assert!(matches!(
            nack.into_error(),
            OpenProtocolError::NegativeAck { mid: 18, error_code: 97 }
        ));
    }

    #[test]
    fn test_positive_ack() {
        let ack = PositiveAck::from_frame(&frame(5, 1, "0060")).unwrap();
        assert_eq!(ack.acknowledged_mid, 60);
        assert_eq!(PositiveAck::new(60).encode_payload().unwrap(), "0060");
    }

    #[test]
    fn test_keep_alive_expects_echo() {
        let spec = KeepAlive::SPEC;
        assert!(spec.expected_responses().contains(&mid::KEEP_ALIVE));
        assert_eq!(
            KeepAlive::default().to_frame().unwrap().as_str(),
            "00209999001         "
        );
    }
}
