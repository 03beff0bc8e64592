//! Per-user clipboard history with content sniffing.
//!
//! History is kept in a [`ClipboardStore`] supplied by the caller, so the
//! storage backend (in-process map, database, cache) is a deployment choice.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Carrier;
use crate::error::{ClaimDeskError, Result};

/// Default number of entries kept per user.
pub const DEFAULT_CLIPBOARD_CAPACITY: usize = 20;

static UPS_TRACKING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^1Z[0-9A-Z]{16}$").ok());
static USPS_TRACKING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^9[2-5]\d{20}$").ok());
static FEDEX_TRACKING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d{12}|\d{15})$").ok());
static DHL_TRACKING: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d{10}$").ok());
static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());
static URL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^https?://\S+$").ok());
static PHONE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\+?1?[\s.-]?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$").ok()
});
static AMOUNT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^-?\$\s?\d{1,3}(?:,?\d{3})*(?:\.\d{1,2})?$").ok());

fn is_match(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern
        .as_ref()
        .map(|regex| regex.is_match(text))
        .unwrap_or(false)
}

/// Kind of content detected in a clipboard entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A carrier tracking number.
    TrackingNumber,
    /// An e-mail address.
    Email,
    /// A web address.
    Url,
    /// A phone number.
    Phone,
    /// A dollar amount.
    Amount,
    /// Anything else.
    Text,
}

/// Carrier implied by a tracking number's shape, if any.
pub fn detect_tracking_carrier(text: &str) -> Option<Carrier> {
    let compact: String = text
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if is_match(&UPS_TRACKING, &compact) {
        Some(Carrier::Ups)
    } else if is_match(&USPS_TRACKING, &compact) {
        Some(Carrier::Usps)
    } else if is_match(&FEDEX_TRACKING, &compact) {
        Some(Carrier::Fedex)
    } else if is_match(&DHL_TRACKING, &compact) {
        Some(Carrier::Dhl)
    } else {
        None
    }
}

/// Classify clipboard text. Tracking numbers win over other shapes.
pub fn detect_content_kind(text: &str) -> ContentKind {
    let trimmed = text.trim();
    if detect_tracking_carrier(trimmed).is_some() {
        ContentKind::TrackingNumber
    } else if is_match(&EMAIL, trimmed) {
        ContentKind::Email
    } else if is_match(&URL, trimmed) {
        ContentKind::Url
    } else if is_match(&PHONE, trimmed) {
        ContentKind::Phone
    } else if is_match(&AMOUNT, trimmed) {
        ContentKind::Amount
    } else {
        ContentKind::Text
    }
}

/// A single clipboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardEntry {
    /// Entry identifier, unique per manager.
    pub id: u64,
    /// Copied text.
    pub content: String,
    /// Detected content kind.
    pub kind: ContentKind,
    /// Carrier for tracking numbers.
    pub carrier: Option<Carrier>,
    /// When the entry was copied.
    #[schema(value_type = String, format = DateTime)]
    pub copied_at: DateTime<Utc>,
}

/// Storage backend for clipboard history.
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardStore {
    /// Append an entry, evicting the oldest ones beyond `capacity`.
    fn push(&self, user: &str, entry: ClipboardEntry, capacity: usize) -> Result<()>;
    /// Entries for a user, newest first.
    fn list(&self, user: &str) -> Result<Vec<ClipboardEntry>>;
    /// Remove all entries for a user, returning how many were removed.
    fn clear(&self, user: &str) -> Result<usize>;
}

/// In-process clipboard store.
#[derive(Debug, Default)]
pub struct InMemoryClipboardStore {
    entries: RwLock<HashMap<String, VecDeque<ClipboardEntry>>>,
}

impl InMemoryClipboardStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ClaimDeskError {
    ClaimDeskError::Other("clipboard store lock poisoned".to_string())
}

impl ClipboardStore for InMemoryClipboardStore {
    fn push(&self, user: &str, entry: ClipboardEntry, capacity: usize) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let history = entries.entry(user.to_string()).or_default();
        history.push_front(entry);
        history.truncate(capacity.max(1));
        Ok(())
    }

    fn list(&self, user: &str) -> Result<Vec<ClipboardEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(user)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn clear(&self, user: &str) -> Result<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(user).map(|history| history.len()).unwrap_or(0))
    }
}

/// Clipboard history for many users over an injected store.
#[derive(Debug)]
pub struct ClipboardManager<S: ClipboardStore> {
    store: S,
    capacity: usize,
    next_id: AtomicU64,
}

impl<S: ClipboardStore> ClipboardManager<S> {
    /// Create a manager keeping at most `capacity` entries per user.
    pub fn new(store: S, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Maximum entries kept per user.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record copied text for a user.
    pub fn copy(&self, user: &str, content: &str) -> Result<ClipboardEntry> {
        if content.trim().is_empty() {
            return Err(ClaimDeskError::Other(
                "clipboard content is empty".to_string(),
            ));
        }
        let kind = detect_content_kind(content);
        let carrier = match kind {
            ContentKind::TrackingNumber => detect_tracking_carrier(content.trim()),
            _ => None,
        };
        let entry = ClipboardEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            content: content.to_string(),
            kind,
            carrier,
            copied_at: Utc::now(),
        };
        self.store.push(user, entry.clone(), self.capacity)?;
        Ok(entry)
    }

    /// History for a user, newest first.
    pub fn history(&self, user: &str) -> Result<Vec<ClipboardEntry>> {
        self.store.list(user)
    }

    /// Most recent entry for a user.
    pub fn latest(&self, user: &str) -> Result<Option<ClipboardEntry>> {
        Ok(self.store.list(user)?.into_iter().next())
    }

    /// Forget a user's history.
    pub fn clear(&self, user: &str) -> Result<usize> {
        self.store.clear(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tracking_numbers_by_carrier() {
        assert_eq!(
            detect_tracking_carrier("1Z999AA10123456784"),
            Some(Carrier::Ups)
        );
        assert_eq!(
            detect_tracking_carrier("9400 1000 0000 0000 0000 00"),
            Some(Carrier::Usps)
        );
        assert_eq!(detect_tracking_carrier("123456789012"), Some(Carrier::Fedex));
        assert_eq!(
            detect_tracking_carrier("123456789012345"),
            Some(Carrier::Fedex)
        );
        assert_eq!(detect_tracking_carrier("1234567890"), Some(Carrier::Dhl));
        assert_eq!(detect_tracking_carrier("12345"), None);
    }

    #[test]
    fn detects_other_content_kinds() {
        assert_eq!(detect_content_kind("claims@carrier.com"), ContentKind::Email);
        assert_eq!(
            detect_content_kind("https://www.ups.com/track?tracknum=1Z"),
            ContentKind::Url
        );
        assert_eq!(detect_content_kind("(555) 123-4567"), ContentKind::Phone);
        assert_eq!(detect_content_kind("+1 555-123-4567"), ContentKind::Phone);
        assert_eq!(detect_content_kind("$1,234.56"), ContentKind::Amount);
        assert_eq!(detect_content_kind("$45"), ContentKind::Amount);
        assert_eq!(
            detect_content_kind("call the dock about pallet 4"),
            ContentKind::Text
        );
    }

    #[test]
    fn manager_keeps_newest_first_and_evicts_oldest() {
        let manager = ClipboardManager::new(InMemoryClipboardStore::new(), 2);

        manager.copy("ana", "first").expect("copy");
        manager.copy("ana", "second").expect("copy");
        manager.copy("ana", "1Z999AA10123456784").expect("copy");

        let history = manager.history("ana").expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "1Z999AA10123456784");
        assert_eq!(history[0].kind, ContentKind::TrackingNumber);
        assert_eq!(history[0].carrier, Some(Carrier::Ups));
        assert_eq!(history[1].content, "second");
        assert!(history[0].id > history[1].id);
    }

    #[test]
    fn users_are_isolated() {
        let manager = ClipboardManager::new(InMemoryClipboardStore::new(), 5);
        manager.copy("ana", "hello").expect("copy");

        assert!(manager.history("ben").expect("history").is_empty());
        assert_eq!(manager.latest("ben").expect("latest"), None);
        assert_eq!(
            manager.latest("ana").expect("latest").map(|entry| entry.content),
            Some("hello".to_string())
        );
        assert_eq!(manager.clear("ana").expect("clear"), 1);
        assert_eq!(manager.clear("ana").expect("clear"), 0);
    }

    #[test]
    fn empty_content_is_rejected() {
        let manager = ClipboardManager::new(InMemoryClipboardStore::new(), 5);
        assert!(manager.copy("ana", "   ").is_err());
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let manager = ClipboardManager::new(InMemoryClipboardStore::new(), 0);
        assert_eq!(manager.capacity(), 1);
        manager.copy("ana", "a").expect("copy");
        manager.copy("ana", "b").expect("copy");
        assert_eq!(manager.history("ana").expect("history").len(), 1);
    }

    #[test]
    fn manager_uses_injected_store() {
        let mut store = MockClipboardStore::new();
        store
            .expect_push()
            .withf(|user, entry, capacity| {
                user.to_string() == "ops" && entry.kind == ContentKind::Email && *capacity == 3
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_list().returning(|_| {
            Err(ClaimDeskError::Other("backend offline".to_string()))
        });

        let manager = ClipboardManager::new(store, 3);

        let entry = manager.copy("ops", "ops@example.com").expect("copy");
        assert_eq!(entry.kind, ContentKind::Email);
        assert!(manager.history("ops").is_err());
    }
}
