use serde::Serialize;
use std::fmt;

/// How raw SKUs are canonicalized before matching.
///
/// A single policy is chosen per run. The catalog index owns it, so supplier
/// SKUs and catalog SKUs always pass through the same function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationPolicy {
    /// Trim surrounding whitespace, uppercase.
    #[default]
    Upper,
    /// Trim surrounding whitespace, lowercase.
    Lower,
    /// Drop all whitespace (including internal), uppercase.
    Compact,
    /// Trim surrounding whitespace only.
    Exact,
}

impl NormalizationPolicy {
    pub fn from_raw(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "upper" | "uppercase" => Some(Self::Upper),
            "lower" | "lowercase" => Some(Self::Lower),
            "compact" => Some(Self::Compact),
            "exact" | "none" => Some(Self::Exact),
            _ => None,
        }
    }

    /// Returns `None` when nothing is left after normalization.
    pub fn normalize(&self, raw: &str) -> Option<NormalizedSku> {
        let trimmed = raw.trim();
        let value = match self {
            Self::Upper => trimmed.to_uppercase(),
            Self::Lower => trimmed.to_lowercase(),
            Self::Compact => trimmed
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase(),
            Self::Exact => trimmed.to_string(),
        };
        if value.is_empty() {
            None
        } else {
            Some(NormalizedSku(value))
        }
    }
}

/// A SKU in canonical form. Only [`NormalizationPolicy::normalize`] builds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedSku(String);

impl NormalizedSku {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedSku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
