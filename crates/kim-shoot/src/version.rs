//! Kubernetes version parsing and ordering
//!
//! Accepts `1.30`, `1.30.4` and `v1.30.4`. A missing patch level orders
//! below any explicit patch of the same minor.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use kim_common::Error;

/// A Kubernetes `major.minor[.patch]` version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KubernetesVersion {
    major: u32,
    minor: u32,
    patch: Option<u32>,
    raw: String,
}

impl KubernetesVersion {
    /// The version as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for KubernetesVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::validation(format!("invalid kubernetes version: {s}"));
        let trimmed = s.trim().trim_start_matches('v');
        let mut parts = trimmed.split('.');
        let number = |part: Option<&str>| -> Result<Option<u32>, Error> {
            part.map(|p| p.parse::<u32>().map_err(|_| invalid()))
                .transpose()
        };
        let major = number(parts.next())?.ok_or_else(invalid)?;
        let minor = number(parts.next())?.ok_or_else(invalid)?;
        let patch = number(parts.next())?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            major,
            minor,
            patch,
            raw: s.trim().to_string(),
        })
    }
}

impl Ord for KubernetesVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for KubernetesVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
