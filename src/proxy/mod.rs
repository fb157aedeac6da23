//! Outbound proxy endpoints and the per-connection selection policy.
//!
//! The list is fixed for the duration of a run. An empty list is valid and
//! means every connection is made directly.

pub mod endpoint;

pub use endpoint::{Endpoint, ProxyKind, load_proxy_file};

use crate::error::{Error, Result};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use rand::Rng;
use std::sync::Mutex;

/// How the next endpoint is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyPolicy {
    /// Uniform sample per call. No shared mutable state.
    #[default]
    Random,
    /// Walk the list in order, wrapping.
    RoundRobin,
}

impl ProxyPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyPolicy::Random => "random",
            ProxyPolicy::RoundRobin => "round-robin",
        }
    }
}

impl std::fmt::Display for ProxyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProxyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(ProxyPolicy::Random),
            "round-robin" | "roundrobin" | "round_robin" | "rr" => Ok(ProxyPolicy::RoundRobin),
            other => Err(Error::Config(format!("unknown proxy policy: {other}"))),
        }
    }
}

/// Chooses the endpoint for each outbound connection attempt.
///
/// Never blocks beyond the cursor lock and never dials.
#[derive(Debug)]
pub struct ProxySelector {
    endpoints: Vec<Endpoint>,
    policy: ProxyPolicy,
    /// Round-robin cursor, always in `[0, endpoints.len())`.
    cursor: Mutex<usize>,
}

impl ProxySelector {
    pub fn new(endpoints: Vec<Endpoint>, policy: ProxyPolicy) -> Self {
        Self {
            endpoints,
            policy,
            cursor: Mutex::new(0),
        }
    }

    /// A selector with no endpoints: every connection is direct.
    pub fn direct() -> Self {
        Self::new(Vec::new(), ProxyPolicy::default())
    }

    pub fn policy(&self) -> ProxyPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Endpoint for the next connection, or `None` for a direct connection.
    pub fn next(&self) -> Option<&Endpoint> {
        self.next_with_rng(&mut rand::thread_rng())
    }

    /// Same as [`next`](Self::next), drawing random choices from `rng`.
    pub fn next_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        let index = match self.policy {
            ProxyPolicy::Random => rng.gen_range(0..self.endpoints.len()),
            ProxyPolicy::RoundRobin => self.advance(),
        };
        metrics::proxy_selections().add(1, &[KeyValue::new("policy", self.policy.as_str())]);
        self.endpoints.get(index)
    }

    /// Read the cursor and advance it in one critical section.
    fn advance(&self) -> usize {
        // The cursor is a plain integer; a poisoned lock still holds a valid value.
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let current = *cursor;
        *cursor = (current + 1) % self.endpoints.len();
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn endpoints(n: usize) -> Vec<Endpoint> {
        (0..n)
            .map(|i| format!("socks5://10.0.0.{i}:1080").parse().unwrap())
            .collect()
    }

    fn host_of(e: Option<&Endpoint>) -> String {
        e.map(|e| e.host().to_string()).unwrap_or_default()
    }

    #[test]
    fn empty_list_means_direct_connection() {
        let selector = ProxySelector::new(Vec::new(), ProxyPolicy::RoundRobin);
        assert!(selector.next().is_none());
        let selector = ProxySelector::direct();
        assert!(selector.next().is_none());
    }

    #[test]
    fn round_robin_walks_the_list_in_order() {
        let selector = ProxySelector::new(endpoints(3), ProxyPolicy::RoundRobin);
        let picked: Vec<String> = (0..6).map(|_| host_of(selector.next())).collect();
        assert_eq!(
            picked,
            vec!["10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.0", "10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn round_robin_is_fair_under_concurrency() {
        let selector = Arc::new(ProxySelector::new(endpoints(4), ProxyPolicy::RoundRobin));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = Arc::clone(&selector);
                std::thread::spawn(move || {
                    (0..125).map(|_| host_of(selector.next())).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for host in handle.join().unwrap() {
                *counts.entry(host).or_default() += 1;
            }
        }
        // 1000 calls over 4 endpoints: exactly 250 each.
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 250), "{counts:?}");
    }

    #[test]
    fn round_robin_counts_differ_by_at_most_one() {
        let selector = ProxySelector::new(endpoints(3), ProxyPolicy::RoundRobin);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..10 {
            *counts.entry(host_of(selector.next())).or_default() += 1;
        }
        assert_eq!(counts["10.0.0.0"], 4);
        assert_eq!(counts["10.0.0.1"], 3);
        assert_eq!(counts["10.0.0.2"], 3);
    }

    #[test]
    fn random_policy_reaches_every_endpoint() {
        let selector = ProxySelector::new(endpoints(5), ProxyPolicy::Random);
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..1000 {
            *counts.entry(host_of(selector.next_with_rng(&mut rng))).or_default() += 1;
        }
        assert_eq!(counts.len(), 5);
        assert!(counts.values().all(|&c| c > 100), "{counts:?}");
    }

    #[test]
    fn policy_parses_aliases() {
        assert_eq!("random".parse::<ProxyPolicy>().unwrap(), ProxyPolicy::Random);
        assert_eq!("Round-Robin".parse::<ProxyPolicy>().unwrap(), ProxyPolicy::RoundRobin);
        assert_eq!("rr".parse::<ProxyPolicy>().unwrap(), ProxyPolicy::RoundRobin);
        assert!("sticky".parse::<ProxyPolicy>().is_err());
    }
}
