//! Single-use OAuth state values
//!
//! Every authorization attempt gets a random, URL-safe `state` value with a
//! deadline. The callback must present it before the deadline, and only the
//! first presentation succeeds. Entries are never purged; expired or used
//! ones simply stop matching.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore as _;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ConsumeError;
use crate::identity::Principal;

/// Default lifetime of an issued state value
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Random bytes behind each state value (256 bits)
const STATE_BYTES: usize = 32;

/// One pending authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthState {
    /// The opaque value sent to the provider
    pub state: String,
    /// When the value was issued
    pub created_at: DateTime<Utc>,
    /// Consumption at or after this instant fails
    pub expires_at: DateTime<Utc>,
    /// Set once, by the first successful consume
    pub consumed_at: Option<DateTime<Utc>>,
    /// Principal that started the flow, if the start request was
    /// authenticated
    pub principal_id: Option<Uuid>,
}

impl OAuthState {
    /// Returns `true` once the state has been used
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Returns `true` if `now` is at or past the deadline
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Issues and consumes state values.
#[derive(Debug)]
pub struct OAuthStateMachine {
    default_ttl: Duration,
    states: Mutex<HashMap<String, OAuthState>>,
}

impl Default for OAuthStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

impl OAuthStateMachine {
    /// Creates a machine whose states live for `default_ttl` unless a start
    /// call supplies its own TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a new state value.
    ///
    /// # Examples
    ///
    /// ```
    /// use authgate::oauth::OAuthStateMachine;
    ///
    /// let machine = OAuthStateMachine::default();
    /// let issued = machine.start(None, None);
    /// let consumed = machine.consume(&issued.state).unwrap();
    /// assert!(consumed.consumed_at.is_some());
    /// assert!(machine.consume(&issued.state).is_err());
    /// ```
    pub fn start(&self, ttl: Option<Duration>, principal: Option<&Principal>) -> OAuthState {
        self.start_at(Utc::now(), ttl, principal)
    }

    /// Issues a new state value as if the current time were `now`.
    pub fn start_at(
        &self,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
        principal: Option<&Principal>,
    ) -> OAuthState {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());

        let mut value = generate_state();
        while states.contains_key(&value) {
            value = generate_state();
        }

        let record = OAuthState {
            state: value.clone(),
            created_at: now,
            expires_at,
            consumed_at: None,
            principal_id: principal.map(|p| p.id),
        };
        states.insert(value, record.clone());

        tracing::debug!(expires_at = %record.expires_at, bound = record.principal_id.is_some(), "Issued OAuth state");
        record
    }

    /// Consumes `value`, marking it used.
    ///
    /// # Errors
    ///
    /// Checks run in order: [`ConsumeError::StateNotFound`] for a value
    /// never issued, [`ConsumeError::StateAlreadyConsumed`] for a value used
    /// before, [`ConsumeError::StateExpired`] for a value past its deadline.
    /// A failed consume leaves the record untouched.
    pub fn consume(&self, value: &str) -> Result<OAuthState, ConsumeError> {
        self.consume_at(value, Utc::now())
    }

    /// Consumes `value` as if the current time were `now`.
    pub fn consume_at(&self, value: &str, now: DateTime<Utc>) -> Result<OAuthState, ConsumeError> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());

        let record = states.get_mut(value).ok_or(ConsumeError::StateNotFound)?;

        if record.is_consumed() {
            return Err(ConsumeError::StateAlreadyConsumed);
        }

        if record.is_expired_at(now) {
            return Err(ConsumeError::StateExpired);
        }

        record.consumed_at = Some(now);
        Ok(record.clone())
    }

    /// Number of state values issued, used or not
    pub fn len(&self) -> usize {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if no state has been issued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 256 random bits, base64url without padding
fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
