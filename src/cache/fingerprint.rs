//! Request fingerprints
//!
//! A fingerprint is the SHA-256 of everything that can change the bytes of
//! a response: the pipeline path, every query argument, the content
//! negotiation headers and the caller's identity. Requests with equal
//! fingerprints share a cache entry.

use std::fmt;

use sha2::{Digest, Sha256};

/// Who is asking; empty for anonymous requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub groups: Vec<String>,
    pub roles: Vec<String>,
}

/// Hex-encoded SHA-256 cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects the inputs of a fingerprint in any order
#[derive(Debug, Clone, Default)]
pub struct FingerprintBuilder {
    path: String,
    arguments: Vec<(String, String)>,
    accept: Option<String>,
    accept_encoding: Option<String>,
    identity: Identity,
}

impl FingerprintBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn arguments<'a, I>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.arguments
            .extend(arguments.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    pub fn accept(mut self, accept: Option<&str>) -> Self {
        self.accept = accept.map(str::to_string);
        self
    }

    pub fn accept_encoding(mut self, accept_encoding: Option<&str>) -> Self {
        self.accept_encoding = accept_encoding.map(str::to_string);
        self
    }

    pub fn identity(mut self, identity: &Identity) -> Self {
        self.identity = identity.clone();
        self
    }

    pub fn finish(mut self) -> Fingerprint {
        self.arguments.sort();
        let mut groups = self.identity.groups;
        groups.sort();
        let mut roles = self.identity.roles;
        roles.sort();

        let mut hasher = Sha256::new();
        // Each component is length-prefixed so adjacent values cannot merge
        let mut field = |name: &str, value: &str| {
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };
        field("path", &self.path);
        for (name, value) in &self.arguments {
            field("arg", name);
            field("val", value);
        }
        field("accept", self.accept.as_deref().unwrap_or(""));
        field("encoding", self.accept_encoding.as_deref().unwrap_or(""));
        field("issuer", self.identity.issuer.as_deref().unwrap_or(""));
        field("subject", self.identity.subject.as_deref().unwrap_or(""));
        for group in &groups {
            field("group", group);
        }
        for role in &roles {
            field("role", role);
        }

        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}
