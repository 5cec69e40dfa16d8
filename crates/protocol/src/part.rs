//! Part - a single message
//!
//! A part couples a byte payload with ordered metadata, an optional parsed
//! JSON view of the payload, and an opaque context for ambient state. The JSON
//! view is cached and invalidated whenever the payload is replaced, so
//! repeated structured access does not re-parse.

use bytes::Bytes;
use serde_json::Value;

use crate::context::Context;
use crate::error::Error;
use crate::metadata::Metadata;
use crate::Result;

/// Reserved metadata key marking a part as failed by a processor.
///
/// Both presence and value are meaningful: the value is the failure
/// description. Clearing requires explicit action.
pub const FAIL_FLAG_KEY: &str = "weir_processing_failed";

/// A single message part
#[derive(Debug, Clone, Default)]
pub struct Part {
    data: Bytes,
    metadata: Metadata,
    json_cache: Option<Value>,
    context: Context,
}

impl Part {
    /// Create a part from raw bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: Metadata::new(),
            json_cache: None,
            context: Context::new(),
        }
    }

    /// Create an empty part
    pub fn empty() -> Self {
        Self::default()
    }

    /// The raw payload bytes
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Replace the payload, invalidating the parsed JSON view
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
        self.json_cache = None;
    }

    /// The parsed JSON view of the payload
    ///
    /// Parses on first access and caches the result; the cache stays valid
    /// until the payload is replaced.
    pub fn json(&mut self) -> Result<&Value> {
        let parsed = match self.json_cache.take() {
            Some(cached) => cached,
            None => serde_json::from_slice(&self.data)?,
        };
        Ok(self.json_cache.insert(parsed))
    }

    /// Replace the payload with a JSON document
    ///
    /// The document is serialised into the byte payload and retained as the
    /// parsed view, so a subsequent `json()` is free.
    pub fn set_json(&mut self, value: Value) -> Result<()> {
        let encoded = serde_json::to_vec(&value)?;
        self.data = Bytes::from(encoded);
        self.json_cache = Some(value);
        Ok(())
    }

    /// Part metadata
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable part metadata
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Ambient state attached to this part
    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable ambient state
    #[inline]
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Mark this part as failed with a descriptive reason
    pub fn set_failed(&mut self, reason: impl Into<String>) {
        self.metadata.set(FAIL_FLAG_KEY, reason);
    }

    /// The failure reason, when a processor has flagged this part
    pub fn failed(&self) -> Option<&str> {
        self.metadata.get(FAIL_FLAG_KEY)
    }

    /// Clear the fail flag
    pub fn clear_failed(&mut self) {
        self.metadata.delete(FAIL_FLAG_KEY);
    }

    /// Copy this part so the copy can be mutated independently
    ///
    /// The payload bytes are copied out of any shared buffer; metadata and
    /// the JSON cache are cloned. Ambient context is carried over (the
    /// attached values themselves are shared by design).
    pub fn deep_copy(&self) -> Self {
        Self {
            data: Bytes::copy_from_slice(&self.data),
            metadata: self.metadata.deep_copy(),
            json_cache: self.json_cache.clone(),
            context: self.context.clone(),
        }
    }

    /// Whether the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<&str> for Part {
    fn from(s: &str) -> Self {
        Part::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Part {
    fn from(v: Vec<u8>) -> Self {
        Part::new(Bytes::from(v))
    }
}

impl TryFrom<Value> for Part {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let mut part = Part::empty();
        part.set_json(value)?;
        Ok(part)
    }
}
