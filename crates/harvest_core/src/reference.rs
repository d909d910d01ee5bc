use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use url::Url;

/// Opaque locator identifying one discoverable item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemReference(String);

impl ItemReference {
    /// Canonical form used for deduplication: trimmed, no query string or
    /// fragment, lower-case scheme/host, no trailing slash.
    ///
    /// Returns `None` for blank input.
    pub fn canonical(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let canonical = match Url::parse(trimmed) {
            Ok(mut url) => {
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => trimmed
                .split(['?', '#'])
                .next()
                .unwrap_or(trimmed)
                .to_string(),
        };

        let canonical = canonical.trim_end_matches('/');
        if canonical.is_empty() {
            return None;
        }
        Some(Self(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    seen: HashSet<ItemReference>,
    order: Vec<ItemReference>,
}

/// Deduplicating, insertion-ordered set of references.
///
/// All operations take `&self`; the store may be shared between a discovery
/// task and extraction workers.
#[derive(Debug, Default)]
pub struct ReferenceStore {
    inner: Mutex<StoreInner>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `reference`; returns `true` if it was not already present.
    pub fn add(&self, reference: ItemReference) -> bool {
        let mut inner = self.lock();
        if inner.seen.contains(&reference) {
            return false;
        }
        inner.seen.insert(reference.clone());
        inner.order.push(reference);
        true
    }

    pub fn contains(&self, reference: &ItemReference) -> bool {
        self.lock().seen.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the references in insertion order.
    pub fn to_vec(&self) -> Vec<ItemReference> {
        self.lock().order.clone()
    }

    // A panic while holding the lock cannot leave the set and the order
    // vector disagreeing (push happens after insert), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
