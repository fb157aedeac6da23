//! Connection opening for the verifier.
//!
//! The verifier never dials sockets itself; it is handed a [`Connector`] at
//! construction. [`ProxyConnector`] consults its [`ProxySelector`] once per
//! connection attempt and tunnels through the chosen endpoint.

pub mod handshake;

use crate::error::VerifyError;
use crate::proxy::{Endpoint, ProxyKind, ProxySelector};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

/// Opens a byte stream to `host:port`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, VerifyError>;
}

/// Plain TCP, no proxy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectConnector;

#[async_trait]
impl Connector for DirectConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, VerifyError> {
        Ok(TcpStream::connect((host, port)).await?)
    }
}

/// Tunnels each connection through the endpoint its selector picks.
///
/// Falls back to a direct connection when the selector has no endpoints.
#[derive(Debug, Clone)]
pub struct ProxyConnector {
    selector: Arc<ProxySelector>,
}

impl ProxyConnector {
    pub fn new(selector: Arc<ProxySelector>) -> Self {
        Self { selector }
    }

    async fn connect_via(
        &self,
        proxy: &Endpoint,
        host: &str,
        port: u16,
    ) -> Result<TcpStream, VerifyError> {
        let mut stream = TcpStream::connect((proxy.host(), proxy.port()))
            .await
            .map_err(|e| VerifyError::Proxy(format!("cannot reach {proxy}: {e}")))?;
        match proxy.kind() {
            ProxyKind::Socks5 => {
                handshake::socks5_connect(&mut stream, host, port, proxy.credentials()).await?
            }
            ProxyKind::Http => {
                handshake::http_connect(&mut stream, host, port, proxy.credentials()).await?
            }
        }
        Ok(stream)
    }
}

#[async_trait]
impl Connector for ProxyConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, VerifyError> {
        match self.selector.next() {
            Some(proxy) => {
                debug!(target_host = host, target_port = port, proxy = %proxy, "connecting via proxy");
                self.connect_via(proxy, host, port).await
            }
            None => DirectConnector.connect(host, port).await,
        }
    }
}
