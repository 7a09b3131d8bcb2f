//! Parameter set selection.

use super::{mid, MessageCategory, MessageSpec, OpenProtocolMessage};
use crate::error::{OpenProtocolError, Result};
use crate::parser::{parse_frame, FieldSpec, FieldTarget, Value};
use crate::protocol::Frame;

/// Highest parameter set number the 3-digit field can carry.
pub const MAX_PARAMETER_SET: u16 = 999;

/// MID 18. Selects the parameter set used for the next tightening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectParameterSet {
    pub revision: u16,
    pub parameter_set: u16,
}

impl SelectParameterSet {
    pub fn new(parameter_set: u16) -> Self {
        Self {
            revision: 1,
            parameter_set,
        }
    }
}

const FIELDS: &[FieldSpec] = &[FieldSpec::integer("parameter_set", 0, 3)];

impl FieldTarget for SelectParameterSet {
    fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()> {
        match name {
            "parameter_set" => self.parameter_set = value.to_int(name)?,
            _ => return Err(OpenProtocolError::field_parse(name, "unknown field")),
        }
        Ok(())
    }
}

impl OpenProtocolMessage for SelectParameterSet {
    const SPEC: MessageSpec =
        MessageSpec::new(mid::SELECT_PARAMETER_SET, MessageCategory::Command);

    fn revision(&self) -> u16 {
        self.revision
    }

    fn encode_payload(&self) -> Result<String> {
        if self.parameter_set > MAX_PARAMETER_SET {
            return Err(OpenProtocolError::Encode(format!(
                "Parameter set {} does not fit in 3 digits",
                self.parameter_set
            )));
        }
        Ok(format!("{:03}", self.parameter_set))
    }

    fn from_frame(frame: &Frame) -> Result<Self> {
        let mut message = Self {
            revision: frame.revision(),
            parameter_set: 0,
        };
        parse_frame(frame, FIELDS, &mut message)?;
        Ok(message)
    }
}
