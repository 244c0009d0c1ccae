//! Validated value types shared across the Chimera fleet control plane.
//!
//! Everything here is freely copyable or cheaply cloned; none of it owns
//! a connection, a file handle, or any other live resource.

#![forbid(unsafe_code)]

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure constructing a value type from untrusted input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

// ─── Node ─────────────────────────────────────────────────────────────────────

/// A remote fleet node, addressed like an SSH target.
///
/// Constructed from a connection string `[user@]host[:port]`. IPv6 hosts
/// must be bracketed (`[::1]`) both on parse and on display, since an
/// unbracketed IPv6 address is ambiguous with the trailing `:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    host: String,
    user: String,
    port: u16,
}

impl Node {
    pub fn new(host: impl Into<String>, user: impl Into<String>, port: u16) -> Result<Self, ValidationError> {
        let host = host.into();
        let user = user.into();
        validate_host(&host)?;
        if user.is_empty() {
            return Err(ValidationError::new("user must not be empty"));
        }
        if port == 0 {
            return Err(ValidationError::new("port must be in 1..=65535"));
        }
        Ok(Self { host, user, port })
    }

    /// Parse a connection string of the form `[user@]host[:port]`.
    pub fn parse(connection_string: &str) -> Result<Self, ValidationError> {
        let mut rest = connection_string;
        let mut user = "root".to_string();

        if let Some(at) = rest.find('@') {
            user = rest[..at].to_string();
            rest = &rest[at + 1..];
        }

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped
                .find(']')
                .ok_or_else(|| ValidationError::new("unterminated IPv6 bracket in host"))?;
            let host = stripped[..close].to_string();
            let remainder = &stripped[close + 1..];
            let port = if let Some(p) = remainder.strip_prefix(':') {
                parse_port(p)?
            } else if remainder.is_empty() {
                22
            } else {
                return Err(ValidationError::new("trailing characters after ']'"));
            };
            (host, port)
        } else if let Some(colon) = rest.rfind(':') {
            (rest[..colon].to_string(), parse_port(&rest[colon + 1..])?)
        } else {
            (rest.to_string(), 22)
        };

        Self::new(host, user, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// First label used for blast-radius host-prefix grouping: the
    /// pre-first-dot segment for qualified names, with trailing digits
    /// and hyphens stripped either way.
    pub fn host_prefix(&self) -> String {
        let label = self.host.split('.').next().unwrap_or(&self.host);
        label.trim_end_matches(|c: char| c.is_ascii_digit() || c == '-').to_string()
    }
}

fn parse_port(s: &str) -> Result<u16, ValidationError> {
    let port: u32 = s
        .parse()
        .map_err(|_| ValidationError::new(format!("invalid port: {s}")))?;
    if port == 0 || port > 65535 {
        return Err(ValidationError::new(format!("port out of range: {port}")));
    }
    Ok(port as u16)
}

fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::new("host must not be empty"));
    }
    if Ipv4Addr::from_str(host).is_ok() || Ipv6Addr::from_str(host).is_ok() {
        return Ok(());
    }
    validate_dns_name(host)
}

fn validate_dns_name(host: &str) -> Result<(), ValidationError> {
    if host.len() > 253 {
        return Err(ValidationError::new("hostname exceeds 253 characters"));
    }
    for label in host.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ValidationError::new(format!("invalid DNS label: '{label}'")));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ValidationError::new(format!("label must not start/end with '-': '{label}'")));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ValidationError::new(format!("invalid character in DNS label: '{label}'")));
        }
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

// ─── Fingerprint ──────────────────────────────────────────────────────────────

/// A 32-character lower-alphanumeric identifier of a built configuration
/// artifact (the generic name for a Nix store hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if value.len() != 32 || !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(ValidationError::new(format!("invalid fingerprint format: {value}")));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this fingerprint is the all-zeros placeholder sentinel.
    pub fn is_zero_sentinel(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(f: Fingerprint) -> Self {
        f.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── SessionId ────────────────────────────────────────────────────────────────

/// A non-empty opaque identifier naming a remote execution session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::new("session id must not be empty"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(s: SessionId) -> Self {
        s.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Drift severity, shared by every component that classifies or ranks
/// drift events. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

// ─── CongruenceReport ─────────────────────────────────────────────────────────

/// Outcome of comparing a node's actual configuration against the expected
/// one. `actual` is absent when the node could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongruenceReport {
    pub node: Node,
    pub expected: Fingerprint,
    pub actual: Option<Fingerprint>,
    pub is_congruent: bool,
    pub details: String,
}

impl CongruenceReport {
    pub fn congruent(node: Node, fingerprint: Fingerprint) -> Self {
        Self {
            node,
            actual: Some(fingerprint.clone()),
            expected: fingerprint,
            is_congruent: true,
            details: "system state matches expected configuration".to_string(),
        }
    }

    pub fn drifted(node: Node, expected: Fingerprint, actual: Option<Fingerprint>, details: impl Into<String>) -> Self {
        Self {
            node,
            expected,
            actual,
            is_congruent: false,
            details: details.into(),
        }
    }
}
