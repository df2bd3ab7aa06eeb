//! Adapter registry: maps the symbolic name given to
//! [`crate::config::ClusterClientBuilder::connection_adapter`] onto a
//! constructor for a concrete [`ConnectionAdapter`]. An open,
//! caller-extensible table rather than a closed `match` over adapter
//! names, so embedding code can register its own wire-protocol adapter
//! without forking this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::adapter::ConnectionAdapter;
use crate::error::ClusterError;
#[cfg(any(test, feature = "test-util"))]
use crate::memory_adapter::MemoryAdapter;

type Factory = Box<dyn Fn() -> Arc<dyn ConnectionAdapter> + Send + Sync>;

static REGISTRY: Lazy<Mutex<HashMap<String, Factory>>> = Lazy::new(|| {
    #[allow(unused_mut)]
    let mut map: HashMap<String, Factory> = HashMap::new();
    #[cfg(any(test, feature = "test-util"))]
    map.insert(
        "memory".to_string(),
        Box::new(|| MemoryAdapter::new() as Arc<dyn ConnectionAdapter>),
    );
    Mutex::new(map)
});

/// Registers `factory` under `name`, overwriting any previous
/// registration. Intended for callers embedding their own wire-protocol
/// adapter; the crate itself only pre-registers `"memory"`.
pub fn register_adapter(
    name: impl Into<String>,
    factory: impl Fn() -> Arc<dyn ConnectionAdapter> + Send + Sync + 'static,
) {
    REGISTRY
        .lock()
        .unwrap()
        .insert(name.into(), Box::new(factory));
}

/// Builds a fresh adapter instance for `name`.
pub fn build_adapter(name: &str) -> Result<Arc<dyn ConnectionAdapter>, ClusterError> {
    let registry = REGISTRY.lock().unwrap();
    let factory = registry.get(name).ok_or_else(|| {
        ClusterError::configuration(format!("no connection adapter registered under {name:?}"))
    })?;
    Ok(factory())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_adapter_is_preregistered() {
        assert!(build_adapter("memory").is_ok());
    }

    #[test]
    fn unknown_adapter_name_is_a_configuration_error() {
        let err = match build_adapter("no-such-adapter") {
            Err(e) => e,
            Ok(_) => panic!("expected build_adapter to return an error"),
        };
        assert_eq!(err.kind(), crate::error::ClusterErrorKind::Configuration);
    }

    #[test]
    fn custom_adapter_can_be_registered_and_built() {
        register_adapter("memory-alias", || {
            MemoryAdapter::new() as Arc<dyn ConnectionAdapter>
        });
        assert!(build_adapter("memory-alias").is_ok());
    }
}
