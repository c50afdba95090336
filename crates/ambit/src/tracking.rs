//! Call-chain tracking carried in the ambient context.
//!
//! A [`TrackingContext`] identifies one logical call chain: an id minted where
//! the chain starts, the UTC time it started, and free-form headers. It lives
//! in an ambient slot, so every task forked from the originating branch sees
//! the same context without it being passed around.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::ambient::{self, AmbientError, AmbientValue};
use crate::convert::{self, ConversionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingContext {
    call_chain_id: Ulid,
    originator_utc_timestamp: SystemTime,
    extra_headers: BTreeMap<String, String>,
}

impl AmbientValue for TrackingContext {}

impl TrackingContext {
    pub fn new(
        call_chain_id: Ulid,
        originator_utc_timestamp: SystemTime,
        extra_headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            call_chain_id,
            originator_utc_timestamp,
            extra_headers,
        }
    }

    /// A new chain starting now.
    pub fn originate(extra_headers: BTreeMap<String, String>) -> Self {
        Self::new(Ulid::new(), SystemTime::now(), extra_headers)
    }

    pub fn call_chain_id(&self) -> Ulid {
        self.call_chain_id
    }

    pub fn originator_utc_timestamp(&self) -> SystemTime {
        self.originator_utc_timestamp
    }

    /// Origination time as round-trippable ISO 8601.
    pub fn originator_iso8601(&self) -> String {
        convert::time_to_iso8601_string(self.originator_utc_timestamp)
    }

    pub fn originator_utc_display(&self) -> String {
        convert::time_to_utc_display_string(self.originator_utc_timestamp)
    }

    pub fn extra_headers(&self) -> &BTreeMap<String, String> {
        &self.extra_headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.extra_headers.get(key).map(String::as_str)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ConversionError> {
        convert::object_to_bytes(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ConversionError> {
        convert::bytes_to_object(bytes)
    }

    // --- Current context ---

    /// The context of the current branch, if one was set.
    pub fn current() -> Result<Option<Self>, AmbientError> {
        ambient::get::<Self>()
    }

    /// Make this the current branch's context.
    pub fn set_as_current(&self) -> Result<(), AmbientError> {
        ambient::set(self)
    }

    /// Replace the current context with a fresh chain.
    pub fn new_current() -> Result<Self, AmbientError> {
        Self::new_current_with(BTreeMap::new())
    }

    pub fn new_current_with(extra_headers: BTreeMap<String, String>) -> Result<Self, AmbientError> {
        let context = Self::originate(extra_headers);
        context.set_as_current()?;
        log::debug!("started call chain {}", context.call_chain_id);
        Ok(context)
    }

    /// Start a fresh chain only if the current branch has none; returns the
    /// context that is current afterwards.
    pub fn new_current_if_empty() -> Result<Self, AmbientError> {
        Self::new_current_if_empty_with(BTreeMap::new())
    }

    pub fn new_current_if_empty_with(extra_headers: BTreeMap<String, String>) -> Result<Self, AmbientError> {
        match Self::current()? {
            Some(context) => Ok(context),
            None => Self::new_current_with(extra_headers),
        }
    }

    /// Drop the current branch's context. Ancestors and siblings keep theirs.
    pub fn clear_current() -> Result<(), AmbientError> {
        ambient::clear::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambient::Snapshot;
    use std::time::Duration;

    fn headers() -> BTreeMap<String, String> {
        [("AAA", "1"), ("BBB", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn serialize_round_trip_keeps_every_field() {
        let timestamp = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let original = TrackingContext::new(Ulid::new(), timestamp, headers());

        let bytes = original.serialize().unwrap();
        assert!(!bytes.is_empty());
        let restored = TrackingContext::deserialize(&bytes).unwrap();

        assert_eq!(restored.call_chain_id(), original.call_chain_id());
        assert_eq!(restored.originator_utc_timestamp(), timestamp);
        assert_eq!(restored.extra_headers(), original.extra_headers());
        assert_eq!(restored.header("BBB"), Some("2"));
    }

    #[test]
    fn origination_time_renders_in_utc() {
        let timestamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let context = TrackingContext::new(Ulid::new(), timestamp, BTreeMap::new());
        assert_eq!(context.originator_iso8601(), "2023-11-14T22:13:20.000000000Z");
        assert_eq!(context.originator_utc_display(), "2023-11-14 22:13:20Z");
    }

    #[test]
    fn new_current_if_empty_keeps_existing() {
        Snapshot::empty().enter(|| {
            assert_eq!(TrackingContext::current().unwrap(), None);
            let first = TrackingContext::new_current_if_empty_with(headers()).unwrap();
            let second = TrackingContext::new_current_if_empty().unwrap();
            assert_eq!(first, second);
            assert_eq!(TrackingContext::current().unwrap(), Some(first.clone()));

            let replaced = TrackingContext::new_current().unwrap();
            assert_ne!(replaced.call_chain_id(), first.call_chain_id());
            assert!(replaced.extra_headers().is_empty());

            TrackingContext::clear_current().unwrap();
            assert_eq!(TrackingContext::current().unwrap(), None);
        });
    }
}
