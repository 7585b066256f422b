use std::fmt;
use std::str::FromStr;

use crate::errors::ReferenceError;

const LATEST: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Version(u32),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => f.write_str(LATEST),
            VersionSelector::Version(version) => write!(f, "v{version}"),
        }
    }
}

/// A versioned artifact name such as `sample.csv`, `sample.csv:latest` or `sample.csv:v3`.
///
/// A bare name selects the latest committed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    name: String,
    version: VersionSelector,
}

impl ArtifactRef {
    pub fn parse(raw: &str) -> Result<Self, ReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name, selector) = match raw.split_once(':') {
            Some((name, selector)) => (name, selector),
            None => (raw, LATEST),
        };

        validate_name(name)?;

        let version = if selector == LATEST {
            VersionSelector::Latest
        } else {
            parse_version_tag(selector)
                .map(VersionSelector::Version)
                .ok_or_else(|| ReferenceError::InvalidVersion(selector.to_string()))?
        };

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    pub fn latest(name: &str) -> Result<Self, ReferenceError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            version: VersionSelector::Latest,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> VersionSelector {
        self.version
    }
}

impl FromStr for ArtifactRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Artifact names double as directory names in the filesystem registry.
pub fn validate_name(name: &str) -> Result<(), ReferenceError> {
    if name.is_empty() {
        return Err(ReferenceError::Empty);
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if name.starts_with('.') || !name.chars().all(allowed) {
        return Err(ReferenceError::InvalidName(name.to_string()));
    }

    Ok(())
}

/// Version number of a `v<N>` tag; `N` must be plain ASCII digits.
pub(crate) fn parse_version_tag(tag: &str) -> Option<u32> {
    let digits = tag.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
