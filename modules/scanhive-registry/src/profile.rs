use std::collections::HashSet;

use scanhive_common::ModuleName;
use serde::{Deserialize, Serialize};

/// One rung of a module's resource ladder: the smallest tier whose
/// `threshold` is greater than or equal to the batch size is selected by
/// the launcher (§4.4); ties and overflow fall through to the largest tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTier {
    pub threshold: i64,
    pub cpu_units: i64,
    pub memory_mib: i64,
}

/// A row of the Module Registry: everything the pipeline and launcher need
/// to know about one scanner module, independent of any particular scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleProfile {
    pub name: ModuleName,
    pub image_ref: String,
    pub container_name: String,
    pub dependencies: HashSet<ModuleName>,
    /// Ordered ascending by `threshold`.
    pub resource_tiers: Vec<ResourceTier>,
    pub estimated_seconds_per_unit: i64,
    pub max_batch_size: i64,
    pub optimization_hints: serde_json::Value,
    pub enabled: bool,
}

impl ModuleProfile {
    /// Resource tier selection per §4.4: the smallest tier whose threshold
    /// is `>= batch_size`; if none qualifies, the largest tier.
    pub fn resource_tier_for(&self, batch_size: i64) -> Option<&ResourceTier> {
        select_resource_tier(&self.resource_tiers, batch_size)
    }
}

/// Standalone form of the same selection rule, reused by the Worker
/// Launcher (which only has the tier list and a batch size, not a full
/// `ModuleProfile`) so the rule lives in exactly one place.
pub fn select_resource_tier(tiers: &[ResourceTier], batch_size: i64) -> Option<&ResourceTier> {
    tiers
        .iter()
        .find(|tier| tier.threshold >= batch_size)
        .or_else(|| tiers.last())
}

#[derive(sqlx::FromRow)]
pub(crate) struct ModuleProfileRow {
    pub name: String,
    pub image_ref: String,
    pub container_name: String,
    pub dependencies: Vec<String>,
    pub resource_tiers: serde_json::Value,
    pub estimated_seconds_per_unit: i64,
    pub max_batch_size: i64,
    pub optimization_hints: serde_json::Value,
    pub enabled: bool,
}

impl TryFrom<ModuleProfileRow> for ModuleProfile {
    type Error = serde_json::Error;

    fn try_from(row: ModuleProfileRow) -> Result<Self, Self::Error> {
        let resource_tiers: Vec<ResourceTier> = serde_json::from_value(row.resource_tiers)?;
        Ok(ModuleProfile {
            name: ModuleName::from(row.name),
            image_ref: row.image_ref,
            container_name: row.container_name,
            dependencies: row.dependencies.into_iter().map(ModuleName::from).collect(),
            resource_tiers,
            estimated_seconds_per_unit: row.estimated_seconds_per_unit,
            max_batch_size: row.max_batch_size,
            optimization_hints: row.optimization_hints,
            enabled: row.enabled,
        })
    }
}
