/// Runtime configuration for a synchronization engine instance.
///
/// Read once when the engine is constructed. Nothing re-reads the
/// environment per primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Force every curves representation onto the smooth (refined) path.
    ///
    /// Environment: `STRATA_ENABLE_REFINED_CURVES`.
    pub force_refined_curves: bool,
    /// Re-check equality whenever a shared resource is found by hash, so a
    /// collision is logged instead of aliasing unrelated data.
    ///
    /// Environment: `STRATA_SAFE_MODE`. Defaults to on in debug builds.
    pub verify_topology_hashes: bool,
    /// Number of vertex-attribute slots the geometry backend provides for
    /// tessellated primvar interpolation.
    pub max_vertex_attribute_slots: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            force_refined_curves: false,
            verify_topology_hashes: cfg!(debug_assertions),
            max_vertex_attribute_slots: 16,
        }
    }
}

impl SyncConfig {
    pub const ENV_REFINED_CURVES: &'static str = "STRATA_ENABLE_REFINED_CURVES";
    pub const ENV_SAFE_MODE: &'static str = "STRATA_SAFE_MODE";

    /// Defaults overridden by any recognised environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(Self::ENV_REFINED_CURVES) {
            config.force_refined_curves = parse_flag(&value);
        }
        if let Some(value) = lookup(Self::ENV_SAFE_MODE) {
            config.verify_topology_hashes = parse_flag(&value);
        }
        tracing::debug!(?config, "Loaded sync configuration");
        config
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
