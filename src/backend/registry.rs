//! Category → factory strategy table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::descriptor::{AdapterCapabilities, BackendFactory};

/// A registered factory together with its declared capabilities.
#[derive(Clone)]
pub struct RegisteredFactory {
    pub factory: Arc<dyn BackendFactory>,
    pub capabilities: AdapterCapabilities,
}

impl std::fmt::Debug for RegisteredFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFactory")
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Maps a backend `category` to the factory that constructs it.
#[derive(Debug, Default, Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, RegisteredFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `category`, replacing any previous one.
    pub fn register(&mut self, category: impl Into<String>, factory: Arc<dyn BackendFactory>) {
        let category = category.into();
        let capabilities = factory.capabilities();
        tracing::debug!(category = %category, ?capabilities, "Registered backend factory");
        self.factories.insert(
            category,
            RegisteredFactory {
                factory,
                capabilities,
            },
        );
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, category: impl Into<String>, factory: Arc<dyn BackendFactory>) -> Self {
        self.register(category, factory);
        self
    }

    pub fn resolve(&self, category: &str) -> Option<&RegisteredFactory> {
        self.factories.get(category)
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        all.sort_unstable();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::descriptor::{Backend, BackendDescriptor};
    use crate::error::Result;
    use crate::pool::BackendConnection;
    use async_trait::async_trait;

    struct NoProbeFactory;

    #[async_trait]
    impl BackendFactory for NoProbeFactory {
        fn capabilities(&self) -> AdapterCapabilities {
            AdapterCapabilities {
                health_probe: false,
                reusable: true,
            }
        }

        async fn create(
            &self,
            descriptor: &BackendDescriptor,
            _connection: Arc<BackendConnection>,
        ) -> Result<Arc<dyn Backend>> {
            Err(crate::error::OrchestratorError::backend(&descriptor.name, "unused"))
        }
    }

    #[test]
    fn resolves_by_category() {
        let registry = BackendRegistry::new().with("local", Arc::new(NoProbeFactory));
        let registered = registry.resolve("local").unwrap();
        assert!(!registered.capabilities.health_probe);
        assert!(registry.resolve("remote").is_none());
        assert_eq!(registry.categories(), vec!["local"]);
    }
}
