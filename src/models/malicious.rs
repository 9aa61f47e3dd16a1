use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::models::ecosystem::Ecosystem;

/// A single known-malicious-package record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaliciousEntry {
    pub name: String,
    /// `"*"` matches any version.
    pub version: String,
    pub reason: String,
}

impl MaliciousEntry {
    fn new(name: &str, version: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Process-wide immutable table of known-malicious packages, keyed by ecosystem. Loaded once
/// at startup; one of the two module-level state exceptions this crate permits (the other
/// being the Ecosystem Analyzer registry).
static KNOWN_MALICIOUS: OnceLock<Vec<(Ecosystem, MaliciousEntry)>> = OnceLock::new();

fn table() -> &'static Vec<(Ecosystem, MaliciousEntry)> {
    KNOWN_MALICIOUS.get_or_init(|| {
        vec![
            (
                Ecosystem::Pypi,
                MaliciousEntry::new("ctx", "*", "Typosquat of 'ctx' hijacked to exfiltrate environment variables (2022)"),
            ),
            (
                Ecosystem::Pypi,
                MaliciousEntry::new("colourama", "*", "Typosquat of 'colorama' distributing a clipboard-hijacking payload"),
            ),
            (
                Ecosystem::Pypi,
                MaliciousEntry::new("python3-dateutil", "*", "Typosquat of 'python-dateutil' with a credential-stealing install script"),
            ),
            (
                Ecosystem::Npm,
                MaliciousEntry::new("event-stream", ">=3.3.6", "Maintainer-handoff compromise injecting a targeted Copay wallet-stealing payload (2018)"),
            ),
            (
                Ecosystem::Npm,
                MaliciousEntry::new("flatmap-stream", "*", "Malicious dependency injected by the event-stream compromise"),
            ),
            (
                Ecosystem::Npm,
                MaliciousEntry::new("eslint-scope", "3.7.2", "Compromised npm account published a version harvesting npm credentials"),
            ),
        ]
    })
}

/// Looks up `(name, version)` within `ecosystem`'s known-malicious table.
///
/// `version == "*"` in either the entry or the query matches any version; otherwise an exact
/// match is required, with a fallback accepting `>=X` entries when the queried version sorts
/// not below `X` under the ecosystem's (simplified) version ordering.
pub fn lookup(ecosystem: Ecosystem, name: &str, version: &str) -> Option<MaliciousEntry> {
    let parser = ecosystem.version_parser();
    table().iter().find_map(|(eco, entry)| {
        if *eco != ecosystem || !entry.name.eq_ignore_ascii_case(name) {
            return None;
        }
        if entry.version == "*" || version == "*" {
            return Some(entry.clone());
        }
        if let Some(bound) = entry.version.strip_prefix(">=") {
            if parser.compare_versions(version, bound).map(|o| o >= 0).unwrap_or(false) {
                return Some(entry.clone());
            }
            return None;
        }
        if entry.version == version {
            return Some(entry.clone());
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let entry = lookup(Ecosystem::Pypi, "ctx", "0.1.2");
        assert!(entry.is_some());
    }

    #[test]
    fn test_case_insensitive_name() {
        let entry = lookup(Ecosystem::Pypi, "CTX", "1.0.0");
        assert!(entry.is_some());
    }

    #[test]
    fn test_unknown_package_not_found() {
        assert!(lookup(Ecosystem::Pypi, "requests", "2.31.0").is_none());
    }

    #[test]
    fn test_version_range_fallback() {
        assert!(lookup(Ecosystem::Npm, "event-stream", "3.3.6").is_some());
        assert!(lookup(Ecosystem::Npm, "event-stream", "3.4.0").is_some());
        assert!(lookup(Ecosystem::Npm, "event-stream", "3.3.5").is_none());
    }

    #[test]
    fn test_exact_version_entry() {
        assert!(lookup(Ecosystem::Npm, "eslint-scope", "3.7.2").is_some());
        assert!(lookup(Ecosystem::Npm, "eslint-scope", "3.7.1").is_none());
    }

    #[test]
    fn test_ecosystem_scoping() {
        // ctx is a PyPI entry; must not match under npm
        assert!(lookup(Ecosystem::Npm, "ctx", "0.1.2").is_none());
    }
}
