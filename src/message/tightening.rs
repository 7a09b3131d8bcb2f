//! Tightening result subscription and events.
//!
//! Revision 1 and revisions 2 through 998 of MID 61 lay out the same logical
//! fields at different offsets, so each gets its own field table. Later
//! revisions only append fields, which the parser skips when they are not
//! modelled.

use std::fmt;

use super::{mid, MessageCategory, MessageSpec, OpenProtocolMessage};
use crate::error::{OpenProtocolError, Result};
use crate::parser::{parse_frame, FieldSpec, FieldTarget, Value};
use crate::protocol::Frame;

/// Unit of the torque values in a tightening result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TorqueValueUnit {
    #[default]
    Nm,
    LbfFt,
    LbfIn,
    Kpm,
    KgfCm,
    OzfIn,
    Percent,
    Ncm,
}

impl TorqueValueUnit {
    /// Wire code (1 to 8).
    pub fn code(self) -> u8 {
        match self {
            TorqueValueUnit::Nm => 1,
            TorqueValueUnit::LbfFt => 2,
            TorqueValueUnit::LbfIn => 3,
            TorqueValueUnit::Kpm => 4,
            TorqueValueUnit::KgfCm => 5,
            TorqueValueUnit::OzfIn => 6,
            TorqueValueUnit::Percent => 7,
            TorqueValueUnit::Ncm => 8,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TorqueValueUnit::Nm => "Nm",
            TorqueValueUnit::LbfFt => "Lbf.ft",
            TorqueValueUnit::LbfIn => "Lbf.in",
            TorqueValueUnit::Kpm => "Kpm",
            TorqueValueUnit::KgfCm => "Kgf.cm",
            TorqueValueUnit::OzfIn => "ozf.in",
            TorqueValueUnit::Percent => "%",
            TorqueValueUnit::Ncm => "Ncm",
        }
    }
}

impl TryFrom<i64> for TorqueValueUnit {
    type Error = OpenProtocolError;

    fn try_from(code: i64) -> Result<Self> {
        Ok(match code {
            1 => TorqueValueUnit::Nm,
            2 => TorqueValueUnit::LbfFt,
            3 => TorqueValueUnit::LbfIn,
            4 => TorqueValueUnit::Kpm,
            5 => TorqueValueUnit::KgfCm,
            6 => TorqueValueUnit::OzfIn,
            7 => TorqueValueUnit::Percent,
            8 => TorqueValueUnit::Ncm,
            other => {
                return Err(OpenProtocolError::field_parse(
                    "torque_value_unit",
                    format!("unknown unit code {}", other),
                ))
            }
        })
    }
}

impl fmt::Display for TorqueValueUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// MID 60. Starts delivery of MID 61.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TighteningResultSubscribe {
    /// Revision of MID 61 the controller should send.
    pub revision: u16,
}

impl TighteningResultSubscribe {
    pub fn with_revision(revision: u16) -> Self {
        Self { revision }
    }
}

impl Default for TighteningResultSubscribe {
    fn default() -> Self {
        Self::with_revision(1)
    }
}

impl OpenProtocolMessage for TighteningResultSubscribe {
    const SPEC: MessageSpec = MessageSpec::new(
        mid::TIGHTENING_RESULT_SUBSCRIBE,
        MessageCategory::EventSubscribe,
    )
    .with_event_mid(mid::TIGHTENING_RESULT);

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

/// MID 61. One completed tightening.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TighteningResult {
    pub revision: u16,
    pub cell_id: u16,
    pub channel_id: u8,
    pub torque_controller_name: String,
    pub pset_number: u16,
    /// 1 for OK, 0 for NOK.
    pub tightening_status: u8,
    pub torque_status: u8,
    pub angle_status: u8,
    pub torque: f64,
    /// Revision 2 and later.
    pub angle: u32,
    /// Revision 2 and later.
    pub tool_serial_number: String,
    pub timestamp: String,
    /// Revision 2 and later.
    pub pset_name: String,
    /// Revision 2 and later; blank means Nm.
    pub torque_value_unit: TorqueValueUnit,
}

const COMMON_FIELDS: &[FieldSpec] = &[
    FieldSpec::marker(0, 2, "01"),
    FieldSpec::integer("cell_id", 2, 6),
    FieldSpec::marker(6, 8, "02"),
    FieldSpec::integer("channel_id", 8, 10),
    FieldSpec::marker(10, 12, "03"),
    FieldSpec::text("torque_controller_name", 12, 37),
];

const REV1_FIELDS: &[FieldSpec] = &[
    FieldSpec::integer("pset_number", 70, 73),
    FieldSpec::marker(85, 87, "09"),
    FieldSpec::bounded("tightening_status", 87, 88, 0, 1),
    FieldSpec::marker(88, 90, "10"),
    FieldSpec::bounded("torque_status", 90, 91, 0, 2),
    FieldSpec::bounded("angle_status", 93, 94, 0, 2),
    FieldSpec::hundredths("torque", 120, 126),
    FieldSpec::text("timestamp", 156, 175),
];

const REV2_FIELDS: &[FieldSpec] = &[
    FieldSpec::integer("pset_number", 72, 75),
    FieldSpec::marker(98, 100, "11"),
    FieldSpec::bounded("tightening_status", 100, 101, 0, 1),
    FieldSpec::marker(104, 106, "13"),
    FieldSpec::bounded("torque_status", 106, 107, 0, 2),
    FieldSpec::bounded("angle_status", 109, 110, 0, 2),
    FieldSpec::hundredths("torque", 163, 169),
    FieldSpec::integer("angle", 192, 197),
    FieldSpec::text("tool_serial_number", 309, 323),
    FieldSpec::marker(323, 325, "45"),
    FieldSpec::text("timestamp", 325, 344),
    FieldSpec::marker(365, 367, "47"),
    FieldSpec::text("pset_name", 367, 392),
    FieldSpec::marker(392, 394, "48"),
    FieldSpec::bounded("torque_value_unit", 394, 395, 1, 8).with_default(Value::Integer(1)),
];

impl TighteningResult {
    /// Highest revision the revision 2 layout covers.
    pub const MAX_REVISION: u16 = 998;

    pub fn is_ok(&self) -> bool {
        self.tightening_status == 1
    }
}

impl FieldTarget for TighteningResult {
    fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()> {
        match name {
            "cell_id" => self.cell_id = value.to_int(name)?,
            "channel_id" => self.channel_id = value.to_int(name)?,
            "torque_controller_name" => self.torque_controller_name = value.to_text(name)?,
            "pset_number" => self.pset_number = value.to_int(name)?,
            "tightening_status" => self.tightening_status = value.to_int(name)?,
            "torque_status" => self.torque_status = value.to_int(name)?,
            "angle_status" => self.angle_status = value.to_int(name)?,
            "torque" => self.torque = value.to_f64(name)?,
            "angle" => self.angle = value.to_int(name)?,
            "tool_serial_number" => self.tool_serial_number = value.to_text(name)?,
            "timestamp" => self.timestamp = value.to_text(name)?,
            "pset_name" => self.pset_name = value.to_text(name)?,
            "torque_value_unit" => {
                self.torque_value_unit = TorqueValueUnit::try_from(value.to_int::<i64>(name)?)?
            }
            _ => return Err(OpenProtocolError::field_parse(name, "unknown field")),
        }
        Ok(())
    }
}

impl OpenProtocolMessage for TighteningResult {
    const SPEC: MessageSpec = MessageSpec::new(mid::TIGHTENING_RESULT, MessageCategory::Event);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        Err(OpenProtocolError::Encode(
            "MID 61 is sent by the controller only".to_string(),
        ))
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        let revision = frame.revision();
        let fields = match revision {
            1 => REV1_FIELDS,
            2..=Self::MAX_REVISION => REV2_FIELDS,
            _ => {
                return Err(OpenProtocolError::UnsupportedRevision {
                    mid: mid::TIGHTENING_RESULT,
                    revision,
                })
            }
        };

        let mut result = Self {
            revision,
            ..Self::default()
        };
        parse_frame(frame, COMMON_FIELDS, &mut result)?;
        parse_frame(frame, fields, &mut result)?;
        Ok(result)
    }
}

/// MID 62. Acknowledges one MID 61.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TighteningResultAck {
    pub revision: u16,
}

impl Default for TighteningResultAck {
    fn default() -> Self {
        Self { revision: 1 }
    }
}

impl OpenProtocolMessage for TighteningResultAck {
    const SPEC: MessageSpec =
        MessageSpec::new(mid::TIGHTENING_RESULT_ACK, MessageCategory::EventAck);

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

/// MID 63. Stops delivery of MID 61.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TighteningResultUnsubscribe {
    pub revision: u16,
}

impl Default for TighteningResultUnsubscribe {
    fn default() -> Self {
        Self { revision: 1 }
    }
}

impl OpenProtocolMessage for TighteningResultUnsubscribe {
    const SPEC: MessageSpec = MessageSpec::new(
        mid::TIGHTENING_RESULT_UNSUBSCRIBE,
        MessageCategory::EventUnsubscribe,
    )
    .with_event_mid(mid::TIGHTENING_RESULT);

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
pub(crate) mod tests {
    use super::*;
    use crate::protocol::Header;

    pub(crate) const REV5_FRAME: &[u8] = concat!(
        "050600610051        010000020003STa 6000                 04                         ",
        "0500000600507180800000090000100000110122130141151161171181191200000000000210007502200750023000000240000002500000260999927000002800000290000030000003100000320003300034000350000003600000037000000380000003900000040000000410000000532420000043000004442250888      ",
        "452023-05-15:21:35:0546                   47QuickPset 5              481490150                         51                         52                         530000\0",
    )
    .as_bytes();

    /// Revision 1 payload with status OK, pset 1 and torque 1.20.
    pub(crate) fn rev1_payload() -> String {
        let mut payload = vec![b' '; 175];
        let mut put = |at: usize, text: &str| {
            payload[at..at + text.len()].copy_from_slice(text.as_bytes());
        };
        put(0, "010001");
        put(6, "0201");
        put(10, "03");
        put(12, "Test controller");
        put(70, "001");
        put(85, "091");
        put(88, "101");
        put(93, "1");
        put(120, "000120");
        put(156, "2024-01-02:03:04:05");
        String::from_utf8(payload).unwrap()
    }

    #[test]
    fn test_rev1_fixture() {
        let frame = Frame::new(Header::new(61, 1), &rev1_payload()).unwrap();
        let result = TighteningResult::from_frame(&frame).unwrap();

        assert_eq!(result.tightening_status, 1);
        assert!(result.is_ok());
        assert_eq!(result.pset_number, 1);
        assert_eq!(result.torque, 1.2);
        assert_eq!(result.angle_status, 1);
        assert_eq!(result.torque_controller_name, "Test controller");
        assert_eq!(result.timestamp, "2024-01-02:03:04:05");
        assert_eq!(result.torque_value_unit, TorqueValueUnit::Nm);
    }

    #[test]
    fn test_rev5_fixture() {
        let frame = Frame::decode(REV5_FRAME).unwrap();
        assert_eq!(frame.revision(), 5);
        assert!(frame.is_no_ack());

        let result = TighteningResult::from_frame(&frame).unwrap();
        assert_eq!(result.pset_number, 5);
        assert_eq!(result.tightening_status, 0);
        assert_eq!(result.torque_status, 0);
        assert_eq!(result.angle_status, 1);
        assert_eq!(result.torque, 0.0);
        assert_eq!(result.angle, 0);
        assert_eq!(result.torque_controller_name, "STa 6000");
        assert_eq!(result.pset_name, "QuickPset 5");
        assert_eq!(result.tool_serial_number, "42250888");
        assert!(result.timestamp.starts_with("2023-05-15"));
        assert_eq!(result.torque_value_unit, TorqueValueUnit::Nm);
    }

    #[test]
    fn test_wrong_status_tag_is_rejected() {
        let mut payload = rev1_payload();
        payload.replace_range(85..87, "08");
        let frame = Frame::new(Header::new(61, 1), &payload).unwrap();

        let err = TighteningResult::from_frame(&frame).unwrap_err();
        assert!(matches!(err, OpenProtocolError::Validation { .. }));
    }

    #[test]
    fn test_short_rev1_keeps_defaults() {
        let payload = &rev1_payload()[..100];
        let frame = Frame::new(Header::new(61, 1), payload).unwrap();

        let result = TighteningResult::from_frame(&frame).unwrap();
        assert_eq!(result.tightening_status, 1);
        assert_eq!(result.torque, 0.0);
        assert_eq!(result.timestamp, "");
    }

    #[test]
    fn test_unsupported_revisions() {
        for revision in [0, 999] {
            let frame = Frame::new(Header::new(61, revision), &rev1_payload()).unwrap();
            let err = TighteningResult::from_frame(&frame).unwrap_err();
            assert!(matches!(
                err,
                OpenProtocolError::UnsupportedRevision { mid: 61, revision: r } if r == revision
            ));
        }
    }

    #[test]
    fn test_unit_codes() {
        assert_eq!(TorqueValueUnit::try_from(8).unwrap(), TorqueValueUnit::Ncm);
        assert_eq!(TorqueValueUnit::LbfFt.code(), 2);
        assert_eq!(TorqueValueUnit::Percent.to_string(), "%");
        assert!(TorqueValueUnit::try_from(9).is_err());
    }

    #[test]
    fn test_subscription_specs_name_event() {
        assert_eq!(TighteningResultSubscribe::SPEC.event_mid, Some(61));
        assert_eq!(TighteningResultUnsubscribe::SPEC.event_mid, Some(61));
        assert_eq!(
            TighteningResultAck::default().to_frame().unwrap().as_str(),
            "00200062001         "
        );
    }
}
