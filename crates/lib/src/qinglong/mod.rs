//! QingLong open API client.
//!
//! Bearer-token session management (login, expiry, single-flight refresh) and typed
//! environment-variable operations. Every response envelope goes through one validation routine.

mod client;
mod error;
mod session;

pub use client::{EnvId, EnvironmentVariable, QingLongClient};
pub use error::QingLongError;
pub use session::{Clock, Credentials, Session, SessionManager, SystemClock, STALENESS_SKEW_MS};
