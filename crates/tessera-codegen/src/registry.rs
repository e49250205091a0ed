//! Process-wide backend registry.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tracing::info;

use crate::backend::{Backend, CompilationError};
use crate::spark::SparkBackend;
use crate::sql::SqlBackend;

static REGISTRY: LazyLock<DashMap<String, Arc<dyn Backend>>> = LazyLock::new(|| {
    let registry: DashMap<String, Arc<dyn Backend>> = DashMap::new();
    let builtins: [Arc<dyn Backend>; 2] = [Arc::new(SqlBackend::new()), Arc::new(SparkBackend::new())];
    for backend in builtins {
        registry.insert(backend.name().to_string(), backend);
    }
    registry
});

/// Register a backend under its name, replacing any backend already there.
pub fn register_backend(backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
    let name = backend.name().to_string();
    let previous = REGISTRY.insert(name.clone(), backend);
    info!(backend = %name, replaced = previous.is_some(), "registered backend");
    previous
}

/// Look up a backend by name.
pub fn backend(name: &str) -> Result<Arc<dyn Backend>, CompilationError> {
    REGISTRY
        .get(name)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| CompilationError::UnknownBackend(name.to_string()))
}

/// Names of all registered backends, sorted.
pub fn backend_names() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY.iter().map(|entry| entry.key().clone()).collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let names = backend_names();
        assert!(names.contains(&"duckdb".to_string()));
        assert!(names.contains(&"pyspark".to_string()));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_unknown_backend() {
        assert!(matches!(
            backend("nope"),
            Err(CompilationError::UnknownBackend(ref n)) if n == "nope"
        ));
    }

    #[test]
    fn test_register_replaces() {
        let first = register_backend(Arc::new(SqlBackend::named("registry_test")));
        assert!(first.is_none());
        let second = register_backend(Arc::new(SqlBackend::named("registry_test")));
        assert!(second.is_some());
        assert_eq!(backend("registry_test").unwrap().name(), "registry_test");
    }
}
