//! Proxy tunnel negotiation: SOCKS5 (RFC 1928 / RFC 1929) and HTTP CONNECT.
//!
//! Both functions leave `stream` positioned at the start of the tunnelled
//! byte stream on success.

use crate::error::VerifyError;
use crate::proxy::endpoint::Credentials;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::ExposeSecret;
use std::net::IpAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USER_PASS: u8 = 0x02;
const METHOD_NONE_ACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Longest HTTP CONNECT response header we are willing to buffer.
const MAX_HTTP_HEADER: usize = 8 * 1024;

fn proxy_err(msg: impl Into<String>) -> VerifyError {
    VerifyError::Proxy(msg.into())
}

/// Negotiate a SOCKS5 CONNECT to `host:port`.
pub async fn socks5_connect<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    credentials: Option<&Credentials>,
) -> Result<(), VerifyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Method negotiation
    let greeting: &[u8] = if credentials.is_some() {
        &[SOCKS_VERSION, 2, METHOD_NO_AUTH, METHOD_USER_PASS]
    } else {
        &[SOCKS_VERSION, 1, METHOD_NO_AUTH]
    };
    stream.write_all(greeting).await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS_VERSION {
        return Err(proxy_err(format!("unexpected socks version {}", choice[0])));
    }
    match (choice[1], credentials) {
        (METHOD_NO_AUTH, _) => {}
        (METHOD_USER_PASS, Some(creds)) => socks5_authenticate(stream, creds).await?,
        (METHOD_NONE_ACCEPTABLE, _) => return Err(proxy_err("no acceptable auth method")),
        (other, _) => return Err(proxy_err(format!("unsupported auth method {other:#04x}"))),
    }

    // Connect request
    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let name = host.as_bytes();
            let len = u8::try_from(name.len())
                .map_err(|_| proxy_err(format!("host name too long: {host}")))?;
            request.push(ATYP_DOMAIN);
            request.push(len);
            request.extend_from_slice(name);
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    // Reply: VER REP RSV ATYP BND.ADDR BND.PORT
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(proxy_err(format!("unexpected socks version {}", head[0])));
    }
    if head[1] != 0x00 {
        return Err(proxy_err(format!(
            "connect to {host}:{port} refused: {}",
            socks5_reply_reason(head[1])
        )));
    }
    let addr_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => return Err(proxy_err(format!("bad address type {other:#04x}"))),
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

async fn socks5_authenticate<S>(stream: &mut S, creds: &Credentials) -> Result<(), VerifyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let user = creds.username.as_bytes();
    let pass = creds.password.expose_secret().as_bytes();
    let ulen = u8::try_from(user.len()).map_err(|_| proxy_err("username too long"))?;
    let plen = u8::try_from(pass.len()).map_err(|_| proxy_err("password too long"))?;

    let mut msg = Vec::with_capacity(3 + user.len() + pass.len());
    msg.push(0x01);
    msg.push(ulen);
    msg.extend_from_slice(user);
    msg.push(plen);
    msg.extend_from_slice(pass);
    stream.write_all(&msg).await?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(proxy_err("proxy rejected credentials"));
    }
    Ok(())
}

fn socks5_reply_reason(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "ttl expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

/// Open an HTTP CONNECT tunnel to `host:port`.
pub async fn http_connect<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    credentials: Option<&Credentials>,
) -> Result<(), VerifyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(creds) = credentials {
        let token = BASE64.encode(format!(
            "{}:{}",
            creds.username,
            creds.password.expose_secret()
        ));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read byte-wise so nothing past the header is consumed.
    let mut header = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !header.ends_with(b"\r\n\r\n") {
        if header.len() >= MAX_HTTP_HEADER {
            return Err(proxy_err("CONNECT response header too large"));
        }
        stream.read_exact(&mut byte).await?;
        header.push(byte[0]);
    }

    let text = String::from_utf8_lossy(&header);
    let status_line = text.lines().next().unwrap_or_default();
    let code = status_line.split_whitespace().nth(1).unwrap_or_default();
    if code.starts_with('2') {
        Ok(())
    } else {
        Err(proxy_err(format!("CONNECT {authority} failed: {status_line}")))
    }
}
