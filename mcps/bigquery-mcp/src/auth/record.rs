//! The persisted interactive-flow credential

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Token record written to the token store after every interactive login or
/// refresh. Field names match the authorized-user token files Google's client libraries
/// writes, so existing `token.json` files load unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer access token
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token endpoint used for refresh grants
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub client_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub client_secret: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scopes: Vec<String>,
    /// Absent for records written by tools that do not track expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// True if the record carries an expiry that has passed (or is about to)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= now + Duration::seconds(EXPIRY_SKEW_SECS))
    }

    /// A usable record has an access token that has not expired
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("token", &redact(&self.token))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
