//! Typed Open Protocol messages.
//!
//! Every message type carries a static [`MessageSpec`] (its MID, category,
//! declared replies and, for subscriptions, the event it controls) and
//! implements [`OpenProtocolMessage`] for payload encoding and decoding.
//! The [`Message`] enum is the closed set of types the client routes, plus
//! [`GenericMessage`] for MIDs registered at runtime.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::protocol::{Frame, Header};

pub mod communication;
pub mod parameter_set;
pub mod registry;
pub mod tightening;

pub use communication::{
    CommunicationStart, CommunicationStartAck, CommunicationStop, KeepAlive, NegativeAck,
    PositiveAck,
};
pub use parameter_set::SelectParameterSet;
pub use registry::{Decoder, MessageRegistry, RevisionRange};
pub use tightening::{
    TighteningResult, TighteningResultAck, TighteningResultSubscribe,
    TighteningResultUnsubscribe, TorqueValueUnit,
};

/// Well-known MIDs.
pub mod mid {
    pub const COMMUNICATION_START: u16 = 1;
    pub const COMMUNICATION_START_ACK: u16 = 2;
    pub const COMMUNICATION_STOP: u16 = 3;
    pub const NEGATIVE_ACK: u16 = 4;
    pub const POSITIVE_ACK: u16 = 5;
    pub const SELECT_PARAMETER_SET: u16 = 18;
    pub const TIGHTENING_RESULT_SUBSCRIBE: u16 = 60;
    pub const TIGHTENING_RESULT: u16 = 61;
    pub const TIGHTENING_RESULT_ACK: u16 = 62;
    pub const TIGHTENING_RESULT_UNSUBSCRIBE: u16 = 63;
    pub const KEEP_ALIVE: u16 = 9999;
}

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// Integrator request answered by a data message or a negative acknowledge.
    Request,
    /// Controller reply to a request.
    RequestReply,
    /// Starts delivery of an event MID.
    EventSubscribe,
    /// Stops delivery of an event MID.
    EventUnsubscribe,
    /// Controller-initiated data.
    Event,
    /// Integrator acknowledge of an event.
    EventAck,
    /// Integrator command answered by a positive or negative acknowledge.
    Command,
}

impl MessageCategory {
    /// Replies every message of this category may legitimately receive.
    pub const fn base_responses(self) -> &'static [u16] {
        match self {
            MessageCategory::Request => &[mid::NEGATIVE_ACK],
            MessageCategory::EventSubscribe
            | MessageCategory::EventUnsubscribe
            | MessageCategory::Command => &[mid::NEGATIVE_ACK, mid::POSITIVE_ACK],
            MessageCategory::RequestReply | MessageCategory::Event | MessageCategory::EventAck => {
                &[]
            }
        }
    }

    /// Categories that resolve a pending request when they arrive.
    pub const fn is_reply(self) -> bool {
        matches!(self, MessageCategory::RequestReply | MessageCategory::Command)
    }
}

/// Static description of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpec {
    pub mid: u16,
    pub category: MessageCategory,
    /// Replies declared by the type itself, on top of the category's.
    pub responses: &'static [u16],
    /// Event MID controlled by a subscribe or unsubscribe message.
    pub event_mid: Option<u16>,
}

impl MessageSpec {
    pub const fn new(mid: u16, category: MessageCategory) -> Self {
        Self {
            mid,
            category,
            responses: &[],
            event_mid: None,
        }
    }

    pub const fn with_responses(mut self, responses: &'static [u16]) -> Self {
        self.responses = responses;
        self
    }

    pub const fn with_event_mid(mut self, event_mid: u16) -> Self {
        self.event_mid = Some(event_mid);
        self
    }

    /// Declared replies united with the category's base set.
    pub fn expected_responses(&self) -> BTreeSet<u16> {
        self.category
            .base_responses()
            .iter()
            .chain(self.responses)
            .copied()
            .collect()
    }
}

/// A typed message with a fixed MID.
pub trait OpenProtocolMessage: Sized + Into<Message> {
    /// MID, category and reply set.
    const SPEC: MessageSpec;

    /// Revision written to the header.
    fn revision(&self) -> u16;

    /// Render the payload (everything after the header).
    fn encode_payload(&self) -> Result<String>;

    /// Decode from a frame whose MID is `SPEC.mid`.
    fn from_frame(frame: &Frame) -> Result<Self>;

    /// Render the complete frame.
    fn to_frame(&self) -> Result<Frame> {
        Frame::new(Header::new(Self::SPEC.mid, self.revision()), &self.encode_payload()?)
    }
}

/// A message whose layout is not modelled; the payload is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericMessage {
    pub spec: MessageSpec,
    pub revision: u16,
    pub payload: String,
}

impl GenericMessage {
    pub fn new(spec: MessageSpec, revision: u16, payload: impl Into<String>) -> Self {
        Self {
            spec,
            revision,
            payload: payload.into(),
        }
    }

    /// Wrap a decoded frame.
    pub fn from_frame(spec: MessageSpec, frame: &Frame) -> Self {
        Self::new(spec, frame.revision(), frame.payload())
    }
}

macro_rules! messages {
    ($($(#[$meta:meta])* $variant:ident($ty:ty),)*) => {
        /// Any message the client can send or receive.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $($(#[$meta])* $variant($ty),)*
            /// Runtime-registered message with a raw payload.
            Generic(GenericMessage),
        }

        impl Message {
            /// Static description of this message.
            pub fn spec(&self) -> MessageSpec {
                match self {
                    $(Message::$variant(_) => <$ty as OpenProtocolMessage>::SPEC,)*
                    Message::Generic(m) => m.spec,
                }
            }

            pub fn revision(&self) -> u16 {
                match self {
                    $(Message::$variant(m) => m.revision(),)*
                    Message::Generic(m) => m.revision,
                }
            }

            /// Render the payload.
            pub fn encode_payload(&self) -> Result<String> {
                match self {
                    $(Message::$variant(m) => m.encode_payload(),)*
                    Message::Generic(m) => Ok(m.payload.clone()),
                }
            }
        }

        $(
            impl From<$ty> for Message {
                fn from(message: $ty) -> Self {
                    Message::$variant(message)
                }
            }
        )*
    };
}

messages! {
    /// MID 1.
    CommunicationStart(CommunicationStart),
    /// MID 2.
    CommunicationStartAck(CommunicationStartAck),
    /// MID 3.
    CommunicationStop(CommunicationStop),
    /// MID 4.
    NegativeAck(NegativeAck),
    /// MID 5.
    PositiveAck(PositiveAck),
    /// MID 18.
    SelectParameterSet(SelectParameterSet),
    /// MID 60.
    TighteningResultSubscribe(TighteningResultSubscribe),
    /// MID 61.
    TighteningResult(TighteningResult),
    /// MID 62.
    TighteningResultAck(TighteningResultAck),
    /// MID 63.
    TighteningResultUnsubscribe(TighteningResultUnsubscribe),
    /// MID 9999.
    KeepAlive(KeepAlive),
}

impl From<GenericMessage> for Message {
    fn from(message: GenericMessage) -> Self {
        Message::Generic(message)
    }
}

impl Message {
    #[inline]
    pub fn mid(&self) -> u16 {
        self.spec().mid
    }

    #[inline]
    pub fn category(&self) -> MessageCategory {
        self.spec().category
    }

    #[inline]
    pub fn event_mid(&self) -> Option<u16> {
        self.spec().event_mid
    }

    /// MIDs that may legitimately answer this message.
    pub fn expected_responses(&self) -> BTreeSet<u16> {
        self.spec().expected_responses()
    }

    /// Header for this message with every optional field at its default.
    pub fn header(&self) -> Header {
        Header::new(self.mid(), self.revision())
    }

    /// Render the complete frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::new(self.header(), &self.encode_payload()?)
    }
}
