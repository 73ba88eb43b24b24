//! Identity key classification and profile payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by locally-generated anonymous keys.
pub const LOCAL_KEY_PREFIX: &str = "u_";

/// The two identity classes a key can belong to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdentityClass {
    /// Verified by the host environment; key is all decimal digits.
    Authenticated,
    /// Generated client- or server-side for an anonymous session.
    Local,
}

impl IdentityClass {
    pub fn of(key: &str) -> IdentityClass {
        if is_authenticated_key(key) {
            IdentityClass::Authenticated
        } else {
            IdentityClass::Local
        }
    }
}

/// An authenticated key is a non-empty string of decimal digits.
pub fn is_authenticated_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// A local key carries the anonymous-session prefix. Only local keys are
/// eligible to be merged away when their session is claimed.
pub fn is_local_key(key: &str) -> bool {
    key.starts_with(LOCAL_KEY_PREFIX)
}

/// Mint a fresh local key for an anonymous session.
pub fn generate_local_key() -> String {
    format!("{}{}", LOCAL_KEY_PREFIX, Uuid::new_v4().simple())
}

/// Optional profile metadata attached to an authenticated identity.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Profile {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.avatar_url.is_none()
            && self.bio.is_none()
            && self.location.is_none()
    }
}
