// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSRF guards for attachment downloads.
//!
//! Attachment URLs come from the ticketing backend and are untrusted. A URL
//! may only use http(s), a literal IP host must be public, and hostnames go
//! through [`SsrfSafeResolver`], which drops private addresses before a
//! connection is attempted. Configured private IPs (an internal CDN, say)
//! are exempt.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::{info, warn};
use url::Url;

/// Loopback, RFC 1918, link-local, CGNAT, broadcast, unspecified and the
/// cloud metadata address, plus IPv6 loopback, unique-local and link-local.
/// IPv4-mapped IPv6 addresses are judged by their IPv4 part.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64) // 100.64.0.0/10
                || *v4 == Ipv4Addr::new(169, 254, 169, 254)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Parse the allowlist, skipping entries that are not IP addresses.
pub fn parse_allowlist(entries: &[String]) -> Vec<IpAddr> {
    entries.iter().filter_map(|s| s.parse().ok()).collect()
}

/// Static checks on a URL: scheme and literal IP host.
///
/// Hostnames pass here; they are checked at resolution time.
pub fn check_url(url: &Url, allowed: &[IpAddr]) -> Result<(), String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("scheme {} is not allowed", url.scheme()));
    }
    let ip = match url.host() {
        None => return Err("URL has no host".to_string()),
        Some(url::Host::Domain(_)) => return Ok(()),
        Some(url::Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(url::Host::Ipv6(v6)) => IpAddr::V6(v6),
    };
    if is_private_ip(&ip) && !allowed.contains(&ip) {
        warn!(%ip, %url, "SSRF blocked: URL targets private IP");
        return Err(format!("URL targets private IP {ip}"));
    }
    Ok(())
}

/// Every address a host resolved to was private and not allowlisted.
#[derive(Debug, thiserror::Error)]
#[error("SSRF blocked: {host} resolves only to private IPs")]
pub struct SsrfBlocked {
    pub host: String,
}

/// DNS resolver that never hands out non-allowlisted private addresses.
pub struct SsrfSafeResolver {
    allowed_private_ips: Vec<IpAddr>,
}

impl SsrfSafeResolver {
    pub fn new(allowed_private_ips: Vec<IpAddr>) -> Self {
        Self {
            allowed_private_ips,
        }
    }
}

impl Resolve for SsrfSafeResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let allowed = self.allowed_private_ips.clone();
        let hostname = name.as_str().to_string();

        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host(format!("{hostname}:0"))
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?
                .collect();

            let permitted: Vec<SocketAddr> = addrs
                .into_iter()
                .filter(|addr| {
                    let ip = addr.ip();
                    if !is_private_ip(&ip) {
                        return true;
                    }
                    if allowed.contains(&ip) {
                        info!(%ip, host = %hostname, "allowing configured private IP");
                        true
                    } else {
                        warn!(%ip, host = %hostname, "SSRF blocked: resolved to private IP");
                        false
                    }
                })
                .collect();

            if permitted.is_empty() {
                let err: Box<dyn std::error::Error + Send + Sync> =
                    Box::new(SsrfBlocked { host: hostname });
                return Err(err);
            }
            let addrs: Addrs = Box::new(permitted.into_iter());
            Ok(addrs)
        })
    }
}
