//! Replication options.

use ciborium::Value;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Well-known property keys.
pub mod keys {
    /// Array of document IDs; only these documents are replicated.
    pub const DOC_IDS: &str = "docIDs";
    /// Array of channel names to pull from.
    pub const CHANNELS: &str = "channels";
    /// Name of a server-side filter function.
    pub const FILTER: &str = "filter";
    /// Map of parameters for the server-side filter.
    pub const FILTER_PARAMS: &str = "filterParams";
    /// Boolean; don't push deletions of documents the peer never saw.
    pub const SKIP_DELETED: &str = "skipDeleted";
    /// Map describing authentication credentials.
    pub const AUTH: &str = "auth";
    /// Map of extra HTTP headers for the connection request.
    pub const HEADERS: &str = "headers";
}

/// Property map. Keys are unique; values are arbitrary CBOR.
pub type Properties = BTreeMap<String, Value>;

/// Opaque value handed back to every callback.
pub type CallbackContext = Arc<dyn Any + Send + Sync>;

/// Direction-specific replication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ReplicatorMode {
    /// Don't replicate in this direction.
    #[default]
    Disabled,
    /// Replicate until caught up, then stop.
    OneShot,
    /// Replicate until caught up, then keep watching for changes.
    Continuous,
}

impl ReplicatorMode {
    /// Returns true unless the direction is disabled.
    pub fn is_enabled(self) -> bool {
        self != ReplicatorMode::Disabled
    }
}

/// Options of one replicator.
///
/// These are fixed for the lifetime of a replicator except for the
/// properties, which [`crate::Replicator::set_properties`] can replace.
#[derive(Clone, Default)]
pub struct ReplicatorOptions {
    /// Push mode.
    pub push: ReplicatorMode,
    /// Pull mode.
    pub pull: ReplicatorMode,
    /// Arbitrary properties, see [`keys`].
    pub properties: Properties,
    /// Value passed to every callback.
    pub callback_context: Option<CallbackContext>,
}

impl ReplicatorOptions {
    /// Creates options with the given push and pull modes.
    pub fn new(push: ReplicatorMode, pull: ReplicatorMode) -> Self {
        Self {
            push,
            pull,
            ..Self::default()
        }
    }

    /// Creates push-only options.
    pub fn pushing(mode: ReplicatorMode) -> Self {
        Self::new(mode, ReplicatorMode::Disabled)
    }

    /// Creates pull-only options.
    pub fn pulling(mode: ReplicatorMode) -> Self {
        Self::new(ReplicatorMode::Disabled, mode)
    }

    /// Sets a property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Restricts replication to the given document IDs.
    pub fn with_doc_ids<I, S>(self, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = doc_ids
            .into_iter()
            .map(|id| Value::Text(id.into()))
            .collect();
        self.with_property(keys::DOC_IDS, Value::Array(ids))
    }

    /// Sets the skip-deleted flag.
    pub fn with_skip_deleted(self, skip: bool) -> Self {
        self.with_property(keys::SKIP_DELETED, Value::Bool(skip))
    }

    /// Sets the value handed to callbacks.
    pub fn with_callback_context(mut self, context: CallbackContext) -> Self {
        self.callback_context = Some(context);
        self
    }

    /// Returns true if either direction is continuous.
    pub fn continuous(&self) -> bool {
        self.push == ReplicatorMode::Continuous || self.pull == ReplicatorMode::Continuous
    }

    /// Returns a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns the document ID filter, if one is set.
    ///
    /// Non-string array entries are ignored.
    pub fn doc_ids(&self) -> Option<Vec<String>> {
        let items = self.property(keys::DOC_IDS)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_text().map(str::to_owned))
                .collect(),
        )
    }

    /// Returns the channel list, if one is set.
    pub fn channels(&self) -> Option<Vec<String>> {
        let items = self.property(keys::CHANNELS)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_text().map(str::to_owned))
                .collect(),
        )
    }

    /// Returns the server-side filter name.
    pub fn filter(&self) -> Option<&str> {
        self.property(keys::FILTER)?.as_text()
    }

    /// Returns true if deletions unknown to the peer are skipped.
    pub fn skip_deleted(&self) -> bool {
        self.property(keys::SKIP_DELETED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns true if `doc_id` passes the document ID filter.
    pub fn is_doc_allowed(&self, doc_id: &str) -> bool {
        match self.doc_ids() {
            Some(ids) => ids.iter().any(|id| id == doc_id),
            None => true,
        }
    }
}

impl fmt::Debug for ReplicatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatorOptions")
            .field("push", &self.push)
            .field("pull", &self.pull)
            .field("properties", &self.properties)
            .field("callback_context", &self.callback_context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let options = ReplicatorOptions::new(ReplicatorMode::Continuous, ReplicatorMode::OneShot)
            .with_doc_ids(["a", "b"])
            .with_skip_deleted(true)
            .with_property(keys::FILTER, Value::Text("by_owner".into()));

        assert!(options.continuous());
        assert_eq!(options.doc_ids(), Some(vec!["a".to_string(), "b".to_string()]));
        assert!(options.skip_deleted());
        assert_eq!(options.filter(), Some("by_owner"));
        assert!(options.channels().is_none());
    }

    #[test]
    fn doc_filter() {
        let open = ReplicatorOptions::pushing(ReplicatorMode::OneShot);
        assert!(open.is_doc_allowed("anything"));
        assert!(!open.continuous());

        let filtered = open.with_doc_ids(["only"]);
        assert!(filtered.is_doc_allowed("only"));
        assert!(!filtered.is_doc_allowed("other"));
    }

    #[test]
    fn properties_keys_are_unique() {
        let options = ReplicatorOptions::pulling(ReplicatorMode::OneShot)
            .with_skip_deleted(false)
            .with_skip_deleted(true);
        assert_eq!(options.properties.len(), 1);
        assert!(options.skip_deleted());
    }

    #[test]
    fn debug_hides_context() {
        let options = ReplicatorOptions::default().with_callback_context(Arc::new(42u32));
        let text = format!("{options:?}");
        assert!(text.contains("callback_context: true"));
        assert!(!ReplicatorMode::Disabled.is_enabled());
    }
}
