//! Module Registry and config loader (§4.1): the single source of truth
//! for module names, dependency order, container identifiers, and resource
//! tiers. No code path outside this crate is allowed to hard-code any of
//! those — everything is a row read through here.

pub mod error;
pub mod profile;
pub mod validate;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use scanhive_common::ModuleName;
use sqlx::PgPool;
use tracing::{error, info};

pub use error::RegistryError;
pub use profile::{ModuleProfile, ResourceTier};

use profile::ModuleProfileRow;

/// Point-in-time, immutable view of all enabled module profiles.
struct Catalog {
    profiles: HashMap<ModuleName, ModuleProfile>,
}

impl Catalog {
    fn dependency_map(&self) -> HashMap<ModuleName, HashSet<ModuleName>> {
        self.profiles
            .iter()
            .map(|(name, profile)| (name.clone(), profile.dependencies.clone()))
            .collect()
    }
}

/// Concurrency-safe, process-wide view of the Module Registry table. Reads
/// are lock-free (`ArcSwap::load_full`); `reload()` atomically replaces the
/// whole snapshot so no reader ever observes a half-updated catalog.
pub struct ModuleRegistry {
    pool: PgPool,
    snapshot: ArcSwap<Catalog>,
    reloading: AtomicBool,
}

impl ModuleRegistry {
    /// Loads the catalog for the first time. Per §4.1 this must abort
    /// process startup on failure rather than serve with an empty view —
    /// callers should propagate this error straight out of `main`.
    pub async fn load_all(pool: PgPool) -> Result<Arc<Self>, RegistryError> {
        let catalog = fetch_catalog(&pool).await?;
        validate::validate_catalog(&catalog.dependency_map())?;

        info!(modules = catalog.profiles.len(), "module registry loaded");

        Ok(Arc::new(Self {
            pool,
            snapshot: ArcSwap::new(Arc::new(catalog)),
            reloading: AtomicBool::new(false),
        }))
    }

    /// Re-reads the catalog from storage. On failure the old snapshot stays
    /// active and the error is returned to the caller; startup is the only
    /// place a load failure is fatal.
    pub async fn reload(&self) -> Result<(), RegistryError> {
        if self
            .reloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("module registry reload already in progress, skipping");
            return Ok(());
        }

        let result = async {
            let catalog = fetch_catalog(&self.pool).await?;
            validate::validate_catalog(&catalog.dependency_map())?;
            Ok::<Catalog, RegistryError>(catalog)
        }
        .await;

        self.reloading.store(false, Ordering::SeqCst);

        match result {
            Ok(catalog) => {
                info!(modules = catalog.profiles.len(), "module registry reloaded");
                self.snapshot.store(Arc::new(catalog));
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "module registry reload failed, keeping stale snapshot");
                Err(err)
            }
        }
    }

    pub fn profile(&self, name: &ModuleName) -> Result<ModuleProfile, RegistryError> {
        let snapshot = self.snapshot.load();
        snapshot
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownModule(name.clone()))
    }

    pub fn dependencies(&self, name: &ModuleName) -> Result<HashSet<ModuleName>, RegistryError> {
        Ok(self.profile(name)?.dependencies)
    }

    pub fn container_name(&self, name: &ModuleName) -> Result<String, RegistryError> {
        Ok(self.profile(name)?.container_name)
    }

    pub fn all_enabled(&self) -> Vec<ModuleName> {
        let snapshot = self.snapshot.load();
        let mut names: Vec<ModuleName> = snapshot.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of the dependency map, for the pipeline's per-request
    /// resolution (§4.5.1) to run against without holding any lock.
    pub fn dependency_map(&self) -> HashMap<ModuleName, HashSet<ModuleName>> {
        self.snapshot.load().dependency_map()
    }

    pub fn is_enabled(&self, name: &ModuleName) -> bool {
        self.snapshot.load().profiles.contains_key(name)
    }
}

async fn fetch_catalog(pool: &PgPool) -> Result<Catalog, RegistryError> {
    let rows: Vec<ModuleProfileRow> = sqlx::query_as(
        r#"
        SELECT name, image_ref, container_name, dependencies,
               resource_tiers, estimated_seconds_per_unit, max_batch_size,
               optimization_hints, enabled
        FROM module_profiles
        WHERE enabled = true
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| RegistryError::ConfigLoad(e.to_string()))?;

    let mut profiles = HashMap::with_capacity(rows.len());
    for row in rows {
        let profile: ModuleProfile = row
            .try_into()
            .map_err(|e: serde_json::Error| RegistryError::ConfigLoad(e.to_string()))?;
        profiles.insert(profile.name.clone(), profile);
    }

    Ok(Catalog { profiles })
}
