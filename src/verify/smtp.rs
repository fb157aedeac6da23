//! Mailbox probing over SMTP.
//!
//! Looks up the domain's mail exchangers, opens a session with the best
//! reachable one on port 25, walks `EHLO`/`MAIL FROM`/`RCPT TO`, and reads
//! the verdict off the `RCPT` reply. No message is ever sent. Domains
//! without MX records are dialed directly; a null MX rejects outright.

use crate::error::VerifyError;
use crate::ingest::is_plausible_address;
use crate::model::Item;
use crate::transport::Connector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use super::Verifier;
use super::mx::{Exchanger, MxResolver};

/// Longest multi-line reply we accept before giving up on a server.
const MAX_REPLY_LINES: usize = 64;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Envelope sender used for `MAIL FROM`.
    pub from_address: String,
    /// Name announced in `EHLO`/`HELO`.
    pub helo_name: String,
    /// Upper bound for a whole mailbox check, connect included.
    pub timeout: Duration,
    pub port: u16,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            from_address: "verifier@example.com".to_string(),
            helo_name: "localhost".to_string(),
            timeout: Duration::from_secs(15),
            port: 25,
        }
    }
}

pub struct SmtpVerifier {
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn MxResolver>,
    config: SmtpConfig,
}

impl SmtpVerifier {
    pub fn new(
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn MxResolver>,
        config: SmtpConfig,
    ) -> Self {
        Self {
            connector,
            resolver,
            config,
        }
    }

    async fn check_mailbox(&self, domain: &str, address: &str) -> Result<bool, VerifyError> {
        let exchangers = self.resolver.exchangers(domain).await?;
        if !exchangers.is_empty() && exchangers.iter().all(Exchanger::is_null) {
            debug!(domain, "null MX, domain accepts no mail");
            return Ok(false);
        }

        let hosts: Vec<String> = if exchangers.is_empty() {
            vec![domain.to_string()]
        } else {
            exchangers
                .into_iter()
                .filter(|mx| !mx.is_null())
                .map(|mx| mx.host)
                .collect()
        };

        let mut last_error = None;
        for host in &hosts {
            match self.connector.connect(host, self.config.port).await {
                Ok(stream) => {
                    debug!(domain, exchanger = %host, "connected to exchanger");
                    return self.session(stream, address).await;
                }
                Err(e) => {
                    debug!(domain, exchanger = %host, error = %e, "exchanger unreachable");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| VerifyError::Dns(format!("{domain}: no usable exchanger"))))
    }

    async fn session(&self, stream: TcpStream, address: &str) -> Result<bool, VerifyError> {
        let (read, mut write) = stream.into_split();
        let mut session = Session {
            reader: BufReader::new(read),
        };

        let (code, text) = session.reply().await?;
        if !is_positive(code) {
            return Err(VerifyError::Protocol(format!("greeting {code} {text}")));
        }

        let (code, _) = session
            .command(&mut write, &format!("EHLO {}", self.config.helo_name))
            .await?;
        if !is_positive(code) {
            let (code, text) = session
                .command(&mut write, &format!("HELO {}", self.config.helo_name))
                .await?;
            if !is_positive(code) {
                return Err(VerifyError::Protocol(format!("HELO {code} {text}")));
            }
        }

        let (code, text) = session
            .command(&mut write, &format!("MAIL FROM:<{}>", self.config.from_address))
            .await?;
        if !is_positive(code) {
            return Err(VerifyError::Protocol(format!("MAIL FROM {code} {text}")));
        }

        let (code, text) = session
            .command(&mut write, &format!("RCPT TO:<{address}>"))
            .await?;
        debug!(address, code, reply = %text, "rcpt reply");

        // Politeness only; the verdict is already known.
        let _ = session.command(&mut write, "QUIT").await;

        match code / 100 {
            2 => Ok(true),
            5 => Ok(false),
            _ => Err(VerifyError::Protocol(format!("RCPT TO {code} {text}"))),
        }
    }
}

#[async_trait]
impl Verifier for SmtpVerifier {
    async fn verify(&self, item: &Item) -> Result<bool, VerifyError> {
        let address = item.as_str();
        let Some((_, domain)) = address.rsplit_once('@') else {
            return Err(VerifyError::InvalidItem(format!("no domain in {address:?}")));
        };
        if !is_plausible_address(address) {
            return Ok(false);
        }

        let limit = self.config.timeout;
        tokio::time::timeout(limit, self.check_mailbox(domain, address))
            .await
            .map_err(|_| VerifyError::Timeout(limit.as_millis() as u64))?
    }
}

fn is_positive(code: u16) -> bool {
    (200..400).contains(&code)
}

/// Line-oriented reader for SMTP replies.
struct Session<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> Session<R> {
    async fn command<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        line: &str,
    ) -> Result<(u16, String), VerifyError> {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        self.reply().await
    }

    /// Read one reply, folding `250-` continuation lines.
    async fn reply(&mut self) -> Result<(u16, String), VerifyError> {
        let mut text = String::new();
        for _ in 0..MAX_REPLY_LINES {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(VerifyError::Protocol("connection closed mid-reply".to_string()));
            }
            let line = line.trim_end();
            let code: u16 = line
                .get(..3)
                .and_then(|digits| digits.parse().ok())
                .ok_or_else(|| VerifyError::Protocol(format!("bad reply line {line:?}")))?;
            let rest = line.get(4..).unwrap_or_default();
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(rest);
            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok((code, text));
            }
        }
        Err(VerifyError::Protocol("reply too long".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::mx::Exchanger;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    /// Sends every connection to one local address, whatever the host.
    struct Redirect(SocketAddr);

    #[async_trait]
    impl Connector for Redirect {
        async fn connect(&self, _host: &str, _port: u16) -> Result<TcpStream, VerifyError> {
            Ok(TcpStream::connect(self.0).await?)
        }
    }

    /// Routes known host names to local addresses; anything else is refused.
    struct Routes(HashMap<String, SocketAddr>);

    #[async_trait]
    impl Connector for Routes {
        async fn connect(&self, host: &str, _port: u16) -> Result<TcpStream, VerifyError> {
            match self.0.get(host) {
                Some(addr) => Ok(TcpStream::connect(*addr).await?),
                None => Err(VerifyError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("no route to {host}"),
                ))),
            }
        }
    }

    /// Fixed MX answer for every domain.
    struct StaticMx(Vec<Exchanger>);

    #[async_trait]
    impl MxResolver for StaticMx {
        async fn exchangers(&self, _domain: &str) -> Result<Vec<Exchanger>, VerifyError> {
            Ok(self.0.clone())
        }
    }

    struct FailingMx;

    #[async_trait]
    impl MxResolver for FailingMx {
        async fn exchangers(&self, domain: &str) -> Result<Vec<Exchanger>, VerifyError> {
            Err(VerifyError::Dns(format!("{domain}: SERVFAIL")))
        }
    }

    fn no_mx() -> Arc<dyn MxResolver> {
        Arc::new(StaticMx(Vec::new()))
    }

    /// Minimal SMTP server answering RCPT with `rcpt_reply`.
    async fn fake_server(rcpt_reply: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let (read, mut write) = sock.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                let reply: &[u8] = if line.starts_with("EHLO") {
                    b"250-mx.test\r\n250-PIPELINING\r\n250 8BITMIME\r\n"
                } else if line.starts_with("MAIL FROM") {
                    b"250 ok\r\n"
                } else if line.starts_with("RCPT TO") {
                    rcpt_reply.as_bytes()
                } else if line.starts_with("QUIT") {
                    write.write_all(b"221 bye\r\n").await.unwrap();
                    break;
                } else {
                    b"500 what\r\n"
                };
                write.write_all(reply).await.unwrap();
            }
        });
        addr
    }

    fn verifier(addr: SocketAddr) -> SmtpVerifier {
        SmtpVerifier::new(Arc::new(Redirect(addr)), no_mx(), SmtpConfig::default())
    }

    fn routed(routes: &[(&str, SocketAddr)], mx: Vec<Exchanger>) -> SmtpVerifier {
        let routes = routes
            .iter()
            .map(|(host, addr)| (host.to_string(), *addr))
            .collect();
        SmtpVerifier::new(
            Arc::new(Routes(routes)),
            Arc::new(StaticMx(mx)),
            SmtpConfig::default(),
        )
    }

    #[tokio::test]
    async fn accepted_recipient_verifies_true() {
        let addr = fake_server("250 2.1.5 ok\r\n").await;
        let ok = verifier(addr).verify(&Item::from("a@x.com")).await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn unknown_recipient_verifies_false() {
        let addr = fake_server("550 5.1.1 no such user\r\n").await;
        let ok = verifier(addr).verify(&Item::from("b@x.com")).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn greylisting_is_an_error() {
        let addr = fake_server("451 4.7.1 try later\r\n").await;
        let err = verifier(addr)
            .verify(&Item::from("c@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn best_exchanger_is_asked_first() {
        let primary = fake_server("250 ok\r\n").await;
        let backup = fake_server("550 no\r\n").await;
        let v = routed(
            &[("mx1.x.com", primary), ("mx2.x.com", backup)],
            vec![Exchanger::new(10, "mx1.x.com."), Exchanger::new(20, "mx2.x.com.")],
        );
        assert!(v.verify(&Item::from("a@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_exchanger_falls_through_to_next() {
        let backup = fake_server("250 ok\r\n").await;
        let v = routed(
            &[("mx2.x.com", backup)],
            vec![Exchanger::new(10, "mx1.x.com"), Exchanger::new(20, "mx2.x.com")],
        );
        assert!(v.verify(&Item::from("a@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn domain_without_mx_is_dialed_directly() {
        let addr = fake_server("250 ok\r\n").await;
        let v = routed(&[("x.com", addr)], Vec::new());
        assert!(v.verify(&Item::from("a@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn all_exchangers_unreachable_is_an_error() {
        let v = routed(&[], vec![Exchanger::new(10, "mx1.x.com")]);
        let err = v.verify(&Item::from("a@x.com")).await.unwrap_err();
        assert!(matches!(err, VerifyError::Io(_)), "{err:?}");
    }

    #[tokio::test]
    async fn null_mx_rejects_without_connecting() {
        let v = routed(&[], vec![Exchanger::new(0, ".")]);
        assert!(!v.verify(&Item::from("a@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn dns_failure_is_an_error() {
        let v = SmtpVerifier::new(
            Arc::new(Routes(HashMap::new())),
            Arc::new(FailingMx),
            SmtpConfig::default(),
        );
        let err = v.verify(&Item::from("a@x.com")).await.unwrap_err();
        assert!(matches!(err, VerifyError::Dns(_)));
        assert_eq!(err.kind(), "dns");
    }

    #[tokio::test]
    async fn implausible_address_is_rejected_without_io() {
        // Nothing listens here; a connection attempt would error instead.
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let ok = verifier(addr)
            .verify(&Item::from("x@@nope"))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn missing_domain_is_invalid() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let err = verifier(addr)
            .verify(&Item::from("not-an-address"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidItem(_)));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            // Hold the connection open without ever greeting.
            let _ = sock.read(&mut buf).await;
        });

        let config = SmtpConfig {
            timeout: Duration::from_millis(100),
            ..SmtpConfig::default()
        };
        let v = SmtpVerifier::new(Arc::new(Redirect(addr)), no_mx(), config);
        let err = v.verify(&Item::from("d@x.com")).await.unwrap_err();
        assert!(matches!(err, VerifyError::Timeout(100)));
    }
}
