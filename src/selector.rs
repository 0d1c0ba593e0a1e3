//! Label selectors of the form `key` or `key=value`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// `key` alone matches any value; `key=value` requires an exact match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    key: String,
    value: Option<String>,
}

impl LabelSelector {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value: value.filter(|v| !v.is_empty()),
        }
    }

    pub fn matches(&self, labels: Option<&HashMap<String, String>>) -> bool {
        let Some(got) = labels.and_then(|l| l.get(&self.key)) else {
            return false;
        };
        match &self.value {
            Some(want) => got == want,
            None => true,
        }
    }
}

impl FromStr for LabelSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (key, value) = match s.split_once('=') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (s, None),
        };
        if key.is_empty() {
            return Err(ConfigError::InvalidSelector(s.to_string()));
        }
        Ok(Self::new(key, value))
    }
}

/// Renders in the engine's label-filter syntax.
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.key, v),
            None => f.write_str(&self.key),
        }
    }
}
