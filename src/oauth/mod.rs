//! OAuth2 authorization-code integration
//!
//! The gateway drives one backend integration through the provider's
//! authorization-code flow:
//!
//! 1. [`OAuthStateMachine::start`] issues a single-use `state`.
//! 2. The caller is redirected to [`OAuthExchangeClient::authorize_url`].
//! 3. The provider redirects back with `code` and `state`; the state is
//!    consumed, the code exchanged, and the result kept in [`TokenStore`].

pub mod exchange;
pub mod state;
pub mod token_store;

pub use exchange::{OAuthExchangeClient, ProbeResult, TokenResponse};
pub use state::{OAuthState, OAuthStateMachine, DEFAULT_STATE_TTL};
pub use token_store::{TokenRecord, TokenStore, TokenView};
