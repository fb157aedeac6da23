//! Secret handling utilities.
//!
//! Re-exports secrecy types used for the queue store URL and proxy
//! credentials.

pub use secrecy::{ExposeSecret, SecretString};
