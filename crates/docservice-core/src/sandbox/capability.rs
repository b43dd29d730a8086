//! Capabilities: the fixed set of facilities pre-loaded into a script's namespace.
//!
//! The set is injected into the harness prelude rather than being ambient, so
//! a stricter or looser set can be configured without touching execution
//! control flow. It is not an adversarial boundary: `DataFiles` deliberately
//! allows reading files under the data root.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One group of standard facilities made available to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `json`, `csv`
    StructuredData,
    /// `os`, `glob`, `pathlib.Path`, `DATA_ROOT`
    DataFiles,
    /// `re`
    Regex,
    /// `math`, `statistics`
    Numeric,
    /// `collections`, `Counter`, `defaultdict`, `OrderedDict`, `deque`
    Collections,
    /// `datetime`, `date`, `timedelta`
    DateTime,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::StructuredData,
        Capability::DataFiles,
        Capability::Regex,
        Capability::Numeric,
        Capability::Collections,
        Capability::DateTime,
    ];

    /// Statements executed inside the script namespace before the script runs.
    pub(crate) fn prelude(&self) -> &'static [&'static str] {
        match self {
            Capability::StructuredData => &["import json", "import csv"],
            Capability::DataFiles => &[
                "import os",
                "import glob",
                "import pathlib",
                "from pathlib import Path",
                "DATA_ROOT = Path.cwd()",
            ],
            Capability::Regex => &["import re"],
            Capability::Numeric => &["import math", "import statistics"],
            Capability::Collections => &[
                "import collections",
                "from collections import Counter, defaultdict, OrderedDict, deque",
            ],
            Capability::DateTime => &["import datetime", "from datetime import date, timedelta"],
        }
    }

    /// Names a script can use directly, for prompt vocabulary.
    pub fn names(&self) -> &'static str {
        match self {
            Capability::StructuredData => "json, csv",
            Capability::DataFiles => "os, glob, pathlib, Path, DATA_ROOT",
            Capability::Regex => "re",
            Capability::Numeric => "math, statistics",
            Capability::Collections => "collections, Counter, defaultdict, OrderedDict, deque",
            Capability::DateTime => "datetime, date, timedelta",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::StructuredData => write!(f, "structured_data"),
            Capability::DataFiles => write!(f, "data_files"),
            Capability::Regex => write!(f, "regex"),
            Capability::Numeric => write!(f, "numeric"),
            Capability::Collections => write!(f, "collections"),
            Capability::DateTime => write!(f, "date_time"),
        }
    }
}

/// An ordered, de-duplicated set of capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::standard()
    }
}

impl CapabilitySet {
    /// Every capability: the set the computational handler is built around.
    pub fn standard() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Prelude source injected ahead of the script.
    pub fn prelude_source(&self) -> String {
        self.iter()
            .flat_map(|c| c.prelude().iter().copied())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Comma-separated list of names available to scripts.
    pub fn vocabulary(&self) -> String {
        self.iter().map(|c| c.names()).collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_set_covers_all() {
        let set = CapabilitySet::standard();
        for cap in Capability::ALL {
            assert!(set.contains(cap), "missing {cap}");
        }
    }

    #[test]
    fn test_prelude_only_includes_selected() {
        let set = CapabilitySet::empty().with(Capability::Regex);
        assert_eq!(set.prelude_source(), "import re");
        assert_eq!(set.vocabulary(), "re");
    }

    #[test]
    fn test_data_files_prelude_pins_data_root() {
        let set = CapabilitySet::empty().with(Capability::DataFiles);
        assert!(set.prelude_source().contains("DATA_ROOT = Path.cwd()"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let set = CapabilitySet::empty()
            .with(Capability::Numeric)
            .with(Capability::StructuredData);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[\"structured_data\",\"numeric\"]");
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);
    }
}
