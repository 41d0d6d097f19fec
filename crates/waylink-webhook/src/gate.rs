// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The webhook authentication gate.
//!
//! Authorization requires the network-origin check AND any one of the
//! credential checks: per-account secret, shared secret, or body
//! signature. The credential checks short-circuit on first success.
//! When the client address cannot be determined, the gate fails closed.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};
use waylink_config::model::WebhookConfig;
use waylink_core::WaylinkError;

type HmacSha256 = Hmac<Sha256>;

/// Forwarding headers honored for client-address resolution, in order.
/// The first present header wins, and within `x-forwarded-for` the first
/// hop wins.
const FORWARD_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Signature header variants accepted, in order.
const SIGNATURE_HEADERS: [&str; 3] = ["x-webhook-signature", "x-hub-signature-256", "x-signature"];

/// Resolved gate configuration.
#[derive(Clone)]
pub struct GateConfig {
    allowed_origins: Vec<IpAddr>,
    allow_localhost: bool,
    allow_private_networks: bool,
    shared_secret: Option<String>,
    signing_secret: Option<String>,
}

impl std::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConfig")
            .field("allowed_origins", &self.allowed_origins)
            .field("allow_localhost", &self.allow_localhost)
            .field("allow_private_networks", &self.allow_private_networks)
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl GateConfig {
    /// Build the gate configuration from the webhook config section.
    /// Invalid allow-list entries were rejected at config validation.
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self {
            allowed_origins: config
                .allowed_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
            allow_localhost: config.allow_localhost,
            allow_private_networks: config.allow_private_networks,
            shared_secret: config.shared_secret.clone(),
            signing_secret: config.signing_secret.clone(),
        }
    }
}

/// Which check authorized a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizedBy {
    AccountSecret,
    SharedSecret,
    Signature,
}

/// Per-request inputs to the gate.
#[derive(Debug)]
pub struct RequestAuth<'a> {
    /// Resolved client address; `None` fails closed.
    pub client_addr: Option<IpAddr>,
    /// Raw request body, for signature recomputation.
    pub body: &'a [u8],
    /// Credential field from the event body.
    pub apikey: Option<&'a str>,
    /// Signature header value, if any variant was present.
    pub signature: Option<&'a str>,
    /// The named account's stored secret, when the event names one.
    pub account_secret: Option<&'a str>,
    /// Account name for log context.
    pub instance: Option<&'a str>,
}

/// Resolve the client address from forwarding headers, falling back to the
/// socket address. A present-but-unparseable forwarding header resolves to
/// `None` (fail closed), never to the socket address behind it.
pub fn resolve_client_addr(headers: &HeaderMap, socket_addr: Option<IpAddr>) -> Option<IpAddr> {
    for name in FORWARD_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let first_hop = value.split(',').next().unwrap_or("").trim();
            return first_hop.parse().ok();
        }
    }
    socket_addr
}

/// Extract the first present signature header variant.
pub fn signature_header(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

/// Constant-time byte comparison. Length mismatch returns early; the
/// length of a secret is not considered sensitive here.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Fixed-length secret prefix for log context. Never log secrets whole.
fn secret_prefix(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}…")
}

fn origin_allowed(config: &GateConfig, addr: IpAddr) -> bool {
    if config.allowed_origins.contains(&addr) {
        return true;
    }
    if config.allow_localhost && addr.is_loopback() {
        return true;
    }
    if config.allow_private_networks {
        match addr {
            IpAddr::V4(v4) => {
                if is_private_v4(v4) {
                    return true;
                }
            }
            IpAddr::V6(v6) => {
                if is_unique_local_v6(v6) {
                    return true;
                }
            }
        }
    }
    false
}

fn is_private_v4(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
}

fn is_unique_local_v6(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

/// Verify an HMAC-SHA256 signature over the raw body.
///
/// Accepts an optional `sha256=` algorithm prefix and hex encoding.
fn signature_matches(signing_secret: &str, body: &[u8], provided: &str) -> bool {
    let hex_digest = provided
        .strip_prefix("sha256=")
        .unwrap_or(provided)
        .trim();
    let Ok(provided_bytes) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    // verify_slice is constant-time.
    mac.verify_slice(&provided_bytes).is_ok()
}

/// Run the gate. Returns which check authorized the request, or
/// `WaylinkError::Unauthorized` with enough context logged to diagnose
/// misconfiguration.
pub fn authorize(config: &GateConfig, auth: &RequestAuth<'_>) -> Result<AuthorizedBy, WaylinkError> {
    // Check 1: network origin. Mandatory, independent of the rest.
    let Some(addr) = auth.client_addr else {
        warn!(
            instance = auth.instance.unwrap_or("<unknown>"),
            "webhook rejected: client address could not be determined"
        );
        return Err(WaylinkError::Unauthorized {
            reason: "client address could not be determined".to_string(),
        });
    };
    if !origin_allowed(config, addr) {
        warn!(
            instance = auth.instance.unwrap_or("<unknown>"),
            client_addr = %addr,
            "webhook rejected: origin not in allow-list"
        );
        return Err(WaylinkError::Unauthorized {
            reason: format!("origin {addr} not allowed"),
        });
    }

    let mut attempted: Vec<&str> = Vec::new();

    // Check 2: per-account credential.
    if let (Some(apikey), Some(secret)) = (auth.apikey, auth.account_secret) {
        attempted.push("account_secret");
        if constant_time_eq(apikey.as_bytes(), secret.as_bytes()) {
            debug!(
                instance = auth.instance.unwrap_or("<unknown>"),
                "webhook authorized by account secret"
            );
            return Ok(AuthorizedBy::AccountSecret);
        }
    }

    // Check 3: shared credential.
    if let (Some(apikey), Some(shared)) = (auth.apikey, config.shared_secret.as_deref()) {
        attempted.push("shared_secret");
        if constant_time_eq(apikey.as_bytes(), shared.as_bytes()) {
            debug!(
                instance = auth.instance.unwrap_or("<unknown>"),
                "webhook authorized by shared secret"
            );
            return Ok(AuthorizedBy::SharedSecret);
        }
    }

    // Check 4: body signature.
    if let (Some(signature), Some(signing_secret)) =
        (auth.signature, config.signing_secret.as_deref())
    {
        attempted.push("signature");
        if signature_matches(signing_secret, auth.body, signature) {
            debug!(
                instance = auth.instance.unwrap_or("<unknown>"),
                "webhook authorized by signature"
            );
            return Ok(AuthorizedBy::Signature);
        }
    }

    warn!(
        instance = auth.instance.unwrap_or("<unknown>"),
        client_addr = %addr,
        attempted = %attempted.join(","),
        apikey_prefix = %auth.apikey.map(secret_prefix).unwrap_or_default(),
        "webhook rejected: no credential check passed"
    );
    Err(WaylinkError::Unauthorized {
        reason: format!(
            "no credential check passed (attempted: {})",
            if attempted.is_empty() {
                "none".to_string()
            } else {
                attempted.join(", ")
            }
        ),
    })
}
