use std::fmt;
use std::sync::Arc;

use pql_common::CompilerConfig;

use crate::ir::IrGraph;
use crate::registry::{FunctionRegistry, SchemaProvider, StaticRegistry};

/// Everything one compile threads through handler calls.
///
/// Owns the IR graph. Concurrent compiles each build their own state.
pub struct CompilerState {
    pub graph: IrGraph,
    registry: Arc<dyn FunctionRegistry>,
    schemas: Arc<dyn SchemaProvider>,
    config: CompilerConfig,
}

impl fmt::Debug for CompilerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerState")
            .field("nodes", &self.graph.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CompilerState {
    pub fn new(
        registry: Arc<dyn FunctionRegistry>,
        schemas: Arc<dyn SchemaProvider>,
        config: CompilerConfig,
    ) -> Self {
        Self {
            graph: IrGraph::new(),
            registry,
            schemas,
            config,
        }
    }

    /// State backed by one [`StaticRegistry`] for both tables and functions.
    pub fn with_static_registry(registry: StaticRegistry, config: CompilerConfig) -> Self {
        let registry = Arc::new(registry);
        Self::new(registry.clone(), registry, config)
    }

    pub fn registry(&self) -> &dyn FunctionRegistry {
        self.registry.as_ref()
    }

    pub fn schemas(&self) -> &dyn SchemaProvider {
        self.schemas.as_ref()
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Graph plus read-only collaborators, borrowed together.
    pub(crate) fn split_mut(
        &mut self,
    ) -> (&mut IrGraph, &dyn FunctionRegistry, &dyn SchemaProvider) {
        (&mut self.graph, self.registry.as_ref(), self.schemas.as_ref())
    }
}
