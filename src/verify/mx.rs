//! Mail exchanger lookup.
//!
//! Exchangers are returned best first. An empty list means the domain has
//! no MX records, in which case mail goes to the domain itself (RFC 5321
//! §5.1). A lone null MX (`.`, RFC 7505) is kept so the caller can see the
//! domain refuses mail.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::error::ResolveErrorKind;

use crate::error::{Error, Result, VerifyError};

/// One MX answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchanger {
    pub preference: u16,
    /// Host name without the trailing dot; empty for a null MX.
    pub host: String,
}

impl Exchanger {
    pub fn new(preference: u16, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            preference,
            host: host.trim_end_matches('.').to_string(),
        }
    }

    /// RFC 7505 "no service" record.
    pub fn is_null(&self) -> bool {
        self.host.is_empty()
    }
}

#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Exchangers for `domain`, best (lowest preference) first.
    async fn exchangers(&self, domain: &str) -> std::result::Result<Vec<Exchanger>, VerifyError>;
}

/// Sort by preference, keeping answer order among equal preferences.
pub fn by_preference(mut exchangers: Vec<Exchanger>) -> Vec<Exchanger> {
    exchangers.sort_by_key(|mx| mx.preference);
    exchangers
}

/// Resolver backed by the system DNS configuration.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| Error::Config(format!("cannot read system resolver configuration: {e}")))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl MxResolver for DnsResolver {
    async fn exchangers(&self, domain: &str) -> std::result::Result<Vec<Exchanger>, VerifyError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(by_preference(
                lookup
                    .iter()
                    .map(|mx| Exchanger::new(mx.preference(), mx.exchange().to_utf8()))
                    .collect(),
            )),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(VerifyError::Dns(format!("{domain}: {e}"))),
        }
    }
}
