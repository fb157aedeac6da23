//! The verification step: an opaque, possibly slow, possibly failing check.
//!
//! A verifier answers `true` (accept) or `false` (reject), or fails with a
//! [`VerifyError`]. The pool treats a failure exactly like `false` but logs
//! the reason.

pub mod mx;
pub mod smtp;

pub use mx::{DnsResolver, Exchanger, MxResolver};
pub use smtp::{SmtpConfig, SmtpVerifier};

use crate::error::VerifyError;
use crate::model::Item;
use async_trait::async_trait;

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, item: &Item) -> Result<bool, VerifyError>;
}
