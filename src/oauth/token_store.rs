//! Storage for the most recent successful code exchange
//!
//! The store keeps a single record with last-write-wins semantics. Only the
//! sanitized [`TokenView`] ever leaves the gateway.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::oauth::exchange::TokenResponse;

// ---------------------------------------------------------------------------
// TokenRecord
// ---------------------------------------------------------------------------

/// The result of a successful code exchange.
#[derive(Clone, PartialEq)]
pub struct TokenRecord {
    /// Access token for the provider API
    pub access_token: String,
    /// Workspace the grant belongs to
    pub workspace_id: Option<String>,
    /// Human readable workspace name
    pub workspace_name: Option<String>,
    /// Granted scope
    pub scope: Option<String>,
    /// When the exchange completed
    pub created_at: DateTime<Utc>,
    /// The complete provider response
    pub raw: Value,
}

impl TokenRecord {
    /// Builds a record from a token response, stamped with `created_at`
    pub fn from_response(response: TokenResponse, created_at: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            workspace_id: response.workspace_id,
            workspace_name: response.workspace_name,
            scope: response.scope,
            created_at,
            raw: response.raw,
        }
    }

    /// The externally visible form of this record
    pub fn view(&self) -> TokenView {
        TokenView {
            workspace_id: self.workspace_id.clone(),
            workspace_name: self.workspace_name.clone(),
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::Micros, false),
            scope: self.scope.clone(),
        }
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("workspace_id", &self.workspace_id)
            .field("workspace_name", &self.workspace_name)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A [`TokenRecord`] without `access_token` and `raw`, with `created_at` as
/// an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenView {
    /// Workspace the grant belongs to
    pub workspace_id: Option<String>,
    /// Display name of that workspace
    pub workspace_name: Option<String>,
    /// Save time, RFC 3339 with microseconds
    pub created_at: String,
    /// Granted scope, when the provider reports one
    pub scope: Option<String>,
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Holds at most one record: the latest saved.
#[derive(Debug, Default)]
pub struct TokenStore {
    latest: RwLock<Option<Arc<TokenRecord>>>,
}

impl TokenStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current record
    pub fn save(&self, record: TokenRecord) -> Arc<TokenRecord> {
        let record = Arc::new(record);
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *latest = Some(Arc::clone(&record));
        record
    }

    /// The current record, if any exchange has succeeded
    pub fn latest(&self) -> Option<Arc<TokenRecord>> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
