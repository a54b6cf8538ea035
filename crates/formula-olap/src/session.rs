use crate::cache::PlanCache;
use crate::cell::{CellReader, FactCellReader};
use crate::config::NativeSettings;
use crate::context::Evaluator;
use crate::native::NativeRegistry;
use crate::schema::{Role, Schema};
use crate::sql::{MemoryExecutor, SqlExecutor};
use std::sync::Arc;

/// Everything a query evaluates against: schema, access role, settings, cell reader, SQL
/// executor, native plan cache and the native gates.
///
/// A session is immutable and shared; each query gets its own [`Evaluator`].
#[derive(Debug)]
pub struct Session {
    schema: Arc<Schema>,
    role: Option<Arc<Role>>,
    settings: NativeSettings,
    cells: Arc<dyn CellReader>,
    executor: Arc<dyn SqlExecutor>,
    cache: Arc<PlanCache>,
    native: NativeRegistry,
}

impl Session {
    pub fn builder(schema: Arc<Schema>) -> SessionBuilder {
        SessionBuilder {
            schema,
            role: None,
            settings: NativeSettings::default(),
            cells: None,
            executor: None,
            cache: None,
            native: None,
        }
    }

    /// A session with default settings, an in-memory executor and a private cache.
    pub fn new(schema: Arc<Schema>) -> Arc<Self> {
        Self::builder(schema).build()
    }

    pub fn evaluator(self: &Arc<Self>) -> Evaluator {
        Evaluator::new(Arc::clone(self))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_deref()
    }

    pub fn settings(&self) -> &NativeSettings {
        &self.settings
    }

    pub fn cells(&self) -> &dyn CellReader {
        self.cells.as_ref()
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor.as_ref()
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    pub fn native(&self) -> &NativeRegistry {
        &self.native
    }
}

pub struct SessionBuilder {
    schema: Arc<Schema>,
    role: Option<Arc<Role>>,
    settings: NativeSettings,
    cells: Option<Arc<dyn CellReader>>,
    executor: Option<Arc<dyn SqlExecutor>>,
    cache: Option<Arc<PlanCache>>,
    native: Option<NativeRegistry>,
}

impl SessionBuilder {
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(Arc::new(role));
        self
    }

    pub fn settings(mut self, settings: NativeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cell_reader(mut self, cells: Arc<dyn CellReader>) -> Self {
        self.cells = Some(cells);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Share a plan cache with other sessions over the same schema.
    pub fn cache(mut self, cache: Arc<PlanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn native(mut self, native: NativeRegistry) -> Self {
        self.native = Some(native);
        self
    }

    pub fn build(self) -> Arc<Session> {
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(MemoryExecutor::new(Arc::clone(&self.schema))));
        Arc::new(Session {
            role: self.role,
            settings: self.settings,
            cells: self.cells.unwrap_or_else(|| Arc::new(FactCellReader)),
            executor,
            cache: self.cache.unwrap_or_default(),
            native: self.native.unwrap_or_default(),
            schema: self.schema,
        })
    }
}
