//! Principal registry
//!
//! Maps a verified `(issuer, subject)` pair to a stable internal principal.
//! Entries live for the life of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Internal identifier, stable for the life of the registry
    pub id: Uuid,
    /// Token issuer
    pub issuer: String,
    /// Subject within the issuer
    pub subject: String,
    /// When the registry first saw this identity
    pub created_at: DateTime<Utc>,
}

impl Principal {
    /// The `iss|sub` form used when a principal is forwarded downstream
    pub fn key(&self) -> String {
        format!("{}|{}", self.issuer, self.subject)
    }
}

/// In-memory get-or-create store of principals.
///
/// The whole check-then-insert runs under one mutex, so concurrent first
/// sightings of the same pair create exactly one principal.
#[derive(Debug, Default)]
pub struct PrincipalRegistry {
    principals: Mutex<HashMap<(String, String), Arc<Principal>>>,
}

impl PrincipalRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the principal for `(issuer, subject)`, creating it on first
    /// sight. Repeated calls return the same `Arc`.
    pub fn get_or_create(&self, issuer: &str, subject: &str) -> Arc<Principal> {
        let mut principals = self.principals.lock().unwrap_or_else(|e| e.into_inner());

        let entry = principals
            .entry((issuer.to_string(), subject.to_string()))
            .or_insert_with(|| {
                tracing::info!(issuer = %issuer, subject = %subject, "Registered new principal");
                Arc::new(Principal {
                    id: Uuid::new_v4(),
                    issuer: issuer.to_string(),
                    subject: subject.to_string(),
                    created_at: Utc::now(),
                })
            });

        Arc::clone(entry)
    }

    /// Number of principals seen so far
    pub fn len(&self) -> usize {
        self.principals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Returns `true` if no principal has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
