//! Accounts
//!
//! Users log in with a username and password and receive an opaque token. Accounts are
//! created by administrators (or bootstrapped from configuration); presets are saved
//! instruction sets owned by a user.

pub mod passwords;
pub mod presets;
pub mod service;
pub mod tokens;

pub use service::{AccountService, NewUser};
pub use tokens::{token_from_headers, SESSION_COOKIE};
