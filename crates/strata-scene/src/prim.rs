use std::fmt;
use std::sync::Arc;

/// Stable, path-like identity of a scene primitive (e.g. `/World/Mesh_0`).
///
/// Cheap to clone; the string is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimId(Arc<str>);

impl PrimId {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for PrimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrimId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for PrimId {
    fn from(path: String) -> Self {
        Self(Arc::from(path))
    }
}
