//! Decoding raw deferred messages into work items.
//!
//! The transport hands over opaque bytes; an [`EnvelopeDecoder`] turns them
//! into a [`WorkItem`]. Decoding happens once, before any send, and a decode
//! failure is never retried.

use crate::error::DecodeError;
use crate::target::WorkItem;

/// Turns a raw message into a work item.
pub trait EnvelopeDecoder<Req>: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<WorkItem<Req>, DecodeError>;
}

impl<Req, F> EnvelopeDecoder<Req> for F
where
    F: Fn(&[u8]) -> Result<WorkItem<Req>, DecodeError> + Send + Sync,
{
    fn decode(&self, raw: &[u8]) -> Result<WorkItem<Req>, DecodeError> {
        self(raw)
    }
}

#[cfg(feature = "json")]
pub use json::JsonEnvelopeDecoder;

#[cfg(feature = "json")]
mod json {
    use super::EnvelopeDecoder;
    use crate::error::DecodeError;
    use crate::target::{ResponseKind, WorkItem};
    use serde::de::DeserializeOwned;
    use serde::Deserialize;
    use std::marker::PhantomData;

    /// Decodes `{"expects_response": bool, "label": string?, "request": <Req>}`.
    ///
    /// `expects_response` defaults to `false` and `label` is optional.
    #[derive(Debug)]
    pub struct JsonEnvelopeDecoder<Req> {
        _request: PhantomData<fn() -> Req>,
    }

    impl<Req> JsonEnvelopeDecoder<Req> {
        pub fn new() -> Self {
            Self { _request: PhantomData }
        }
    }

    impl<Req> Default for JsonEnvelopeDecoder<Req> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<Req> Clone for JsonEnvelopeDecoder<Req> {
        fn clone(&self) -> Self {
            Self::new()
        }
    }

    #[derive(Deserialize)]
    struct Envelope<Req> {
        #[serde(default)]
        expects_response: bool,
        #[serde(default)]
        label: Option<String>,
        request: Req,
    }

    impl<Req: DeserializeOwned> EnvelopeDecoder<Req> for JsonEnvelopeDecoder<Req> {
        fn decode(&self, raw: &[u8]) -> Result<WorkItem<Req>, DecodeError> {
            if raw.iter().all(u8::is_ascii_whitespace) {
                return Err(DecodeError::Malformed("empty envelope".into()));
            }
            let envelope: Envelope<Req> = serde_json::from_slice(raw)?;
            let kind =
                if envelope.expects_response { ResponseKind::Response } else { ResponseKind::Void };
            let item = WorkItem::new(envelope.request, kind);
            Ok(match envelope.label {
                Some(label) => item.with_label(label),
                None => item,
            })
        }
    }
}
