use bon::Builder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default status assigned to entries that carry none.
pub const DEFAULT_STATUS: &str = "active";

/// A single identity record in the allowlist.
///
/// Identity is keyed by phone and/or mail; at least one must be non-empty
/// for the entry to be admitted to the cache (see [`AllowListEntry::is_valid`]).
/// Mail addresses are compared case-insensitively, so normalization lowercases
/// them. When no `user_id` is supplied, one is derived deterministically from
/// the dedup key via a one-way hash, so the same identity always maps to the
/// same id regardless of which source it arrived from.
///
/// # Dedup key
///
/// Two entries describe "the same identity" when their dedup keys match:
/// the phone when present, otherwise the lower-cased trimmed mail.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct AllowListEntry {
    /// Phone number in the source's own format. May be empty.
    #[serde(default)]
    #[builder(default)]
    pub phone: String,

    /// Mail address, compared case-insensitively. May be empty.
    #[serde(default)]
    #[builder(default)]
    pub mail: String,

    /// Stable user identifier. Derived from phone-or-mail when absent.
    #[serde(default)]
    #[builder(default)]
    pub user_id: String,

    /// Entry status. Defaults to "active" when absent.
    #[serde(default)]
    #[builder(default)]
    pub status: String,

    /// Ordered set of capability strings. Defaults to empty.
    #[serde(default)]
    #[builder(default)]
    pub scope: Vec<String>,

    /// Free-form role string.
    #[serde(default)]
    #[builder(default)]
    pub role: String,
}

impl AllowListEntry {
    /// Normalize identity fields in place.
    ///
    /// Trims phone and mail, lowercases mail, applies the default status,
    /// deduplicates scope entries preserving first occurrence, and derives
    /// `user_id` from the dedup key when absent. Must run before an entry is
    /// placed in a merge result or the cache.
    pub fn normalize(&mut self) {
        self.phone = self.phone.trim().to_string();
        self.mail = self.mail.trim().to_lowercase();
        self.user_id = self.user_id.trim().to_string();

        if self.status.is_empty() {
            self.status = DEFAULT_STATUS.to_string();
        }

        let mut seen = std::collections::HashSet::new();
        self.scope.retain(|s| seen.insert(s.clone()));

        if self.user_id.is_empty() && self.is_valid() {
            self.user_id = derive_user_id(&self.dedup_key());
        }
    }

    /// Returns a normalized copy of this entry.
    pub fn normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.normalize();
        copy
    }

    /// The identity invariant: at least one of phone/mail is non-empty.
    ///
    /// Entries violating this are rejected before entering the cache.
    pub fn is_valid(&self) -> bool {
        !self.phone.trim().is_empty() || !self.mail.trim().is_empty()
    }

    /// The field identifying "the same identity" across sources:
    /// phone when present, otherwise lower-cased trimmed mail.
    pub fn dedup_key(&self) -> String {
        let phone = self.phone.trim();
        if !phone.is_empty() {
            phone.to_string()
        } else {
            self.mail.trim().to_lowercase()
        }
    }
}

/// Derive a stable user id from a dedup key via SHA-256.
///
/// One-way: the id cannot be reversed into the phone or mail it was
/// derived from.
pub fn derive_user_id(dedup_key: &str) -> String {
    let digest = Sha256::digest(dedup_key.as_bytes());
    hex::encode(digest)
}
