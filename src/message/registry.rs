//! Message registry for dispatching frames by MID and revision.
//!
//! Each entry maps a MID and an inclusive [`RevisionRange`] to a decoder.
//! Ranges for the same MID may not overlap. The registry also holds the
//! acknowledge table used to answer pushed events.
//!
//! # Example
//!
//! ```
//! use openprotocol_client::message::{Message, MessageRegistry, SelectParameterSet};
//!
//! let registry = MessageRegistry::with_defaults();
//!
//! let bytes = registry.encode_message(&SelectParameterSet::new(5).into()).unwrap();
//! assert_eq!(bytes, b"00230018001         005");
//!
//! match registry.decode_message(&bytes).unwrap() {
//!     Message::SelectParameterSet(m) => assert_eq!(m.parameter_set, 5),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{
    mid, CommunicationStart, CommunicationStartAck, CommunicationStop, GenericMessage, KeepAlive,
    Message, MessageSpec, NegativeAck, OpenProtocolMessage, PositiveAck, SelectParameterSet,
    TighteningResult, TighteningResultAck, TighteningResultSubscribe,
    TighteningResultUnsubscribe,
};
use crate::error::{OpenProtocolError, Result};
use crate::protocol::{Frame, MAX_REVISION};

/// Turns a frame into a typed message.
pub type Decoder = Arc<dyn Fn(&Frame) -> Result<Message> + Send + Sync>;

/// Builds the acknowledge for an inbound event.
pub type AckBuilder = Arc<dyn Fn(&Message) -> Message + Send + Sync>;

/// Inclusive range of revisions covered by one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionRange {
    pub min: u16,
    pub max: u16,
}

impl RevisionRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// A single revision.
    pub const fn exact(revision: u16) -> Self {
        Self::new(revision, revision)
    }

    /// Every revision the header can carry.
    pub const fn any() -> Self {
        Self::new(0, MAX_REVISION)
    }

    pub fn contains(&self, revision: u16) -> bool {
        (self.min..=self.max).contains(&revision)
    }

    pub fn overlaps(&self, other: &RevisionRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}..={}", self.min, self.max)
        }
    }
}

struct Entry {
    revisions: RevisionRange,
    decoder: Decoder,
}

/// Registry of decoders and event acknowledges.
pub struct MessageRegistry {
    /// Decoders by MID.
    decoders: HashMap<u16, Vec<Entry>>,
    /// Acknowledge builders by event MID.
    acks: HashMap<u16, AckBuilder>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            acks: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in message type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let result = registry.register_defaults();
        debug_assert!(result.is_ok(), "built-in catalog: {:?}", result);
        if let Err(e) = result {
            tracing::error!("Built-in catalog is inconsistent: {}", e);
        }
        registry
    }

    fn register_defaults(&mut self) -> Result<()> {
        let any = RevisionRange::any();
        self.register_message::<CommunicationStart>(any)?;
        self.register_message::<CommunicationStartAck>(any)?;
        self.register_message::<CommunicationStop>(any)?;
        self.register_message::<NegativeAck>(any)?;
        self.register_message::<PositiveAck>(any)?;
        self.register_message::<SelectParameterSet>(any)?;
        self.register_message::<TighteningResultSubscribe>(any)?;
        self.register_message::<TighteningResult>(any)?;
        self.register_message::<TighteningResultAck>(any)?;
        self.register_message::<TighteningResultUnsubscribe>(any)?;
        self.register_message::<KeepAlive>(any)?;

        self.register_ack(mid::TIGHTENING_RESULT, |_| {
            TighteningResultAck::default().into()
        });
        Ok(())
    }

    /// Register a decoder for `mid` over `revisions`.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateRegistration` if an existing entry for the MID
    /// covers any of the same revisions.
    pub fn register<F>(&mut self, mid: u16, revisions: RevisionRange, decoder: F) -> Result<()>
    where
        F: Fn(&Frame) -> Result<Message> + Send + Sync + 'static,
    {
        let entries = self.decoders.entry(mid).or_default();
        if let Some(existing) = entries.iter().find(|e| e.revisions.overlaps(&revisions)) {
            return Err(OpenProtocolError::DuplicateRegistration {
                mid,
                revision: existing.revisions.min.max(revisions.min),
            });
        }

        tracing::debug!("Registered decoder for MID {} revision {}", mid, revisions);
        entries.push(Entry {
            revisions,
            decoder: Arc::new(decoder),
        });
        Ok(())
    }

    /// Register a typed message under its own MID.
    pub fn register_message<T>(&mut self, revisions: RevisionRange) -> Result<()>
    where
        T: OpenProtocolMessage + 'static,
    {
        self.register(T::SPEC.mid, revisions, |frame| {
            T::from_frame(frame).map(Into::into)
        })
    }

    /// Register a runtime-described message decoded as [`GenericMessage`].
    pub fn register_generic(&mut self, spec: MessageSpec, revisions: RevisionRange) -> Result<()> {
        self.register(spec.mid, revisions, move |frame| {
            Ok(GenericMessage::from_frame(spec, frame).into())
        })
    }

    /// Set the acknowledge sent back for `event_mid`. Replaces any previous one.
    pub fn register_ack<F>(&mut self, event_mid: u16, build: F)
    where
        F: Fn(&Message) -> Message + Send + Sync + 'static,
    {
        self.acks.insert(event_mid, Arc::new(build));
    }

    /// Check whether a decoder covers `mid` at `revision`.
    pub fn contains(&self, mid: u16, revision: u16) -> bool {
        self.lookup(mid, revision).is_some()
    }

    fn lookup(&self, mid: u16, revision: u16) -> Option<&Decoder> {
        self.decoders
            .get(&mid)?
            .iter()
            .find(|e| e.revisions.contains(revision))
            .map(|e| &e.decoder)
    }

    /// Decode raw bytes into a typed message.
    pub fn decode_message(&self, bytes: &[u8]) -> Result<Message> {
        let frame = Frame::decode(bytes)?;
        self.decode_frame(&frame)
    }

    /// Decode an already framed message.
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedMessage` when nothing is registered for the
    /// frame's MID and revision, or with the decoder's own error.
    pub fn decode_frame(&self, frame: &Frame) -> Result<Message> {
        let decoder = self.lookup(frame.mid(), frame.revision()).ok_or(
            OpenProtocolError::UnsupportedMessage {
                mid: frame.mid(),
                revision: frame.revision(),
            },
        )?;
        decoder(frame)
    }

    /// Encode a message into wire bytes.
    pub fn encode_message(&self, message: &Message) -> Result<Vec<u8>> {
        message.to_frame().map(Frame::into_bytes)
    }

    /// Acknowledge to send for an inbound event, if the protocol defines one.
    pub fn ack_for(&self, message: &Message) -> Option<Message> {
        self.acks.get(&message.mid()).map(|build| build(message))
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mids: Vec<_> = self.decoders.keys().copied().collect();
        mids.sort_unstable();
        let mut acks: Vec<_> = self.acks.keys().copied().collect();
        acks.sort_unstable();
        f.debug_struct("MessageRegistry")
            .field("mids", &mids)
            .field("acks", &acks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tightening::tests::REV5_FRAME;
    use crate::message::MessageCategory;
    use crate::protocol::{build_frame, Header};

    #[test]
    fn test_decode_rev5_tightening() {
        let registry = MessageRegistry::with_defaults();
        match registry.decode_message(REV5_FRAME).unwrap() {
            Message::TighteningResult(result) => {
                assert_eq!(result.revision, 5);
                assert_eq!(result.pset_number, 5);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_builtin_catalog_registers_each_mid_once() {
        let mut registry = MessageRegistry::new();
        registry.register_defaults().unwrap();
        for mid in [1, 2, 3, 4, 5, 18, 60, 61, 62, 63, 9999] {
            assert!(registry.contains(mid, 1), "MID {mid} missing");
        }

        let err = registry.register_defaults().unwrap_err();
        assert!(matches!(
            err,
            OpenProtocolError::DuplicateRegistration { mid: 1, .. }
        ));
    }

    #[test]
    fn test_unknown_mid_is_unsupported() {
        let registry = MessageRegistry::with_defaults();
        let bytes = build_frame(&Header::new(70, 1), "").unwrap();

        let err = registry.decode_message(&bytes).unwrap_err();
        assert!(matches!(
            err,
            OpenProtocolError::UnsupportedMessage { mid: 70, revision: 1 }
        ));
        assert!(err.is_frame_error());
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let mut registry = MessageRegistry::new();
        let spec = MessageSpec::new(900, MessageCategory::Event);

        registry
            .register_generic(spec, RevisionRange::new(1, 3))
            .unwrap();
        registry
            .register_generic(spec, RevisionRange::new(4, 6))
            .unwrap();

        let err = registry
            .register_generic(spec, RevisionRange::exact(3))
            .unwrap_err();
        assert!(matches!(
            err,
            OpenProtocolError::DuplicateRegistration { mid: 900, revision: 3 }
        ));
    }

    #[test]
    fn test_lookup_by_revision() {
        let mut registry = MessageRegistry::new();
        let spec = MessageSpec::new(900, MessageCategory::Event);
        registry
            .register_generic(spec, RevisionRange::exact(2))
            .unwrap();

        assert!(registry.contains(900, 2));
        assert!(!registry.contains(900, 1));

        let frame = Frame::new(Header::new(900, 2), "DATA").unwrap();
        match registry.decode_frame(&frame).unwrap() {
            Message::Generic(m) => assert_eq!(m.payload, "DATA"),
            other => panic!("unexpected message {other:?}"),
        }

        let frame = Frame::new(Header::new(900, 1), "DATA").unwrap();
        assert!(registry.decode_frame(&frame).is_err());
    }

    #[test]
    fn test_ack_for_tightening_only() {
        let registry = MessageRegistry::with_defaults();
        let event = Message::from(TighteningResult::default());
        let ack = registry.ack_for(&event).unwrap();
        assert_eq!(ack.mid(), 62);

        assert!(registry
            .ack_for(&Message::from(PositiveAck::new(60)))
            .is_none());
    }

    #[test]
    fn test_encode_message() {
        let registry = MessageRegistry::with_defaults();
        let bytes = registry
            .encode_message(&CommunicationStop::default().into())
            .unwrap();
        assert_eq!(bytes, b"00200003001         ");
    }
}
