use std::collections::HashMap;
use std::time::Duration;

use listclean_rs::config::Config;
use listclean_rs::config::secrets::ExposeSecret;
use listclean_rs::error::Error;
use listclean_rs::proxy::{ProxyKind, ProxyPolicy};

fn load(vars: &[(&str, &str)]) -> listclean_rs::error::Result<Config> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn config_loads_required_fields_with_defaults() {
    let config = load(&[("REDIS_URL", "redis://:pw@localhost:6379/2")]).unwrap();

    assert_eq!(config.redis_url.expose_secret(), "redis://:pw@localhost:6379/2");
    assert_eq!(config.namespace, "email_cleaner");
    assert!(config.proxies.is_empty());
    assert_eq!(config.proxy_policy, ProxyPolicy::Random);
    assert_eq!(config.pacing, Duration::ZERO);
    assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    assert_eq!(config.smtp.port, 25);
    assert_eq!(config.log_level, "info");
    assert!(config.otel_endpoint.is_none());
}

#[test]
fn config_fails_without_redis_url() {
    assert!(matches!(load(&[]), Err(Error::Config(_))));
    assert!(matches!(load(&[("REDIS_URL", "  ")]), Err(Error::Config(_))));
}

#[test]
fn config_reads_proxies_and_tuning() {
    let config = load(&[
        ("REDIS_URL", "redis://localhost"),
        ("LISTCLEAN_NAMESPACE", "staging"),
        ("LISTCLEAN_PROXIES", "socks5://10.0.0.1:1080, http://u:p@10.0.0.2:3128,"),
        ("LISTCLEAN_PROXY_POLICY", "round-robin"),
        ("LISTCLEAN_PACING_MS", "250"),
        ("LISTCLEAN_SHUTDOWN_GRACE_MS", "5000"),
        ("LISTCLEAN_FROM_ADDRESS", "verify@example.org"),
        ("LISTCLEAN_HELO", "mx.example.org"),
        ("LISTCLEAN_VERIFY_TIMEOUT_MS", "3000"),
        ("OTEL_ENDPOINT", "http://localhost:4317"),
        ("LOG_LEVEL", "debug"),
    ])
    .unwrap();

    assert_eq!(config.namespace, "staging");
    assert_eq!(config.proxies.len(), 2);
    assert_eq!(config.proxies[0].kind(), ProxyKind::Socks5);
    assert_eq!(config.proxies[1].kind(), ProxyKind::Http);
    assert!(config.proxies[1].credentials().is_some());
    assert_eq!(config.proxy_policy, ProxyPolicy::RoundRobin);
    assert_eq!(config.pacing, Duration::from_millis(250));
    assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    assert_eq!(config.smtp.from_address, "verify@example.org");
    assert_eq!(config.smtp.helo_name, "mx.example.org");
    assert_eq!(config.smtp.timeout, Duration::from_secs(3));
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "debug");
}

#[test]
fn config_rejects_malformed_values() {
    let base = ("REDIS_URL", "redis://localhost");
    assert!(matches!(
        load(&[base, ("LISTCLEAN_PACING_MS", "fast")]),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        load(&[base, ("LISTCLEAN_PROXY_POLICY", "weighted")]),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        load(&[base, ("LISTCLEAN_PROXIES", "ftp://10.0.0.1:21")]),
        Err(Error::InvalidEndpoint(_))
    ));
}

#[test]
fn config_appends_proxy_file_after_env_list() {
    let dir = std::env::temp_dir().join(format!("listclean-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("proxies.toml");
    std::fs::write(
        &path,
        "[[proxy]]\nurl = \"http://10.0.0.9:8080\"\n\n[[proxy]]\nurl = \"socks5://10.0.0.10:1080\"\n",
    )
    .unwrap();

    let config = load(&[
        ("REDIS_URL", "redis://localhost"),
        ("LISTCLEAN_PROXIES", "socks5://10.0.0.1:1080"),
        ("LISTCLEAN_PROXY_FILE", path.to_str().unwrap()),
    ])
    .unwrap();

    let hosts: Vec<&str> = config.proxies.iter().map(|p| p.host()).collect();
    assert_eq!(hosts, ["10.0.0.1", "10.0.0.9", "10.0.0.10"]);

    std::fs::remove_dir_all(&dir).ok();
}
