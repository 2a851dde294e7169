use serde::{Deserialize, Serialize};

pub const UNKNOWN_DOMAIN: &str = "unknown_domain";

/// Outcome of mapping a download to the site that served it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    Resolved(String),
    Unresolved,
}

impl Domain {
    /// Folder and log value. `Unresolved` maps to the sentinel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Resolved(label) => label,
            Self::Unresolved => UNKNOWN_DOMAIN,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOrigin {
    pub domain: Domain,
    pub raw_url: Option<String>,
}

impl ResolvedOrigin {
    pub fn unresolved() -> Self {
        Self {
            domain: Domain::Unresolved,
            raw_url: None,
        }
    }
}
