use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ScanId = Uuid;
pub type AssetId = Uuid;
pub type JobId = Uuid;

/// A module's registry name, e.g. `"subdomain_enumerator"`.
///
/// Newtype over `String` rather than a bare string everywhere so a call site
/// can't accidentally pass a container name or image ref where a module name
/// is expected — the confusion this is meant to prevent is named directly in
/// the registry's design rationale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(pub String);

impl ModuleName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModuleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Short, stable prefix of a scan id, used to tie together log lines and
/// stream keys for one scan without spelling out the full UUID everywhere.
pub fn short_correlation_id(scan_id: ScanId) -> String {
    scan_id.simple().to_string()[..8].to_string()
}
