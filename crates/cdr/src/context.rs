//! Request-scoped context.
//!
//! One `RequestContext` is built per caller (a CGI request, a CLI
//! invocation, a worker). It owns the database handle, the caller's
//! session and the configured timeouts, and hands out the components
//! bound to that session.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, JobsConfig, Timeouts};
use crate::db::Database;
use crate::docs::{DocumentStore, SchemaValidator};
use crate::error::Result;
use crate::filters::{ExpansionCache, FilterRegistry};
use crate::jobs::{JobController, NotificationSink};
use crate::nomap::NomapPatterns;
use crate::pipeline::{FilterEngine, FilterPipeline};
use crate::publishing::{LedgerWriter, PublicationLedger};
use crate::session::Session;

#[derive(Clone)]
pub struct RequestContext {
    db: Database,
    session: Session,
    timeouts: Timeouts,
    jobs: JobsConfig,
    cache: ExpansionCache,
}

impl RequestContext {
    pub fn new(db: Database, session: Session, timeouts: Timeouts) -> Self {
        Self {
            db,
            session,
            timeouts,
            jobs: JobsConfig::default(),
            cache: ExpansionCache::new(),
        }
    }

    /// Opens the configured database with its busy timeout.
    pub fn from_config(config: &Config, session: Session) -> Result<Self> {
        let timeouts = config.timeouts();
        let path = config.database_path().ok_or_else(|| {
            crate::error::CdrError::InvalidInput("no database path configured".to_string())
        })?;
        let db = Database::open_with_timeout(&path, timeouts.database)?;
        Ok(Self::new(db, session, timeouts).with_jobs_config(config.jobs.clone()))
    }

    pub fn with_jobs_config(mut self, jobs: JobsConfig) -> Self {
        self.jobs = jobs;
        self
    }

    /// Shares an expansion cache with other contexts of the same process.
    pub fn with_cache(mut self, cache: ExpansionCache) -> Self {
        self.cache = cache;
        self
    }

    /// The same context acting for another caller.
    pub fn for_session(&self, session: Session) -> Self {
        Self {
            session,
            ..self.clone()
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn documents(&self) -> DocumentStore {
        DocumentStore::new(self.db.clone(), self.session.clone())
    }

    pub fn filters(&self) -> FilterRegistry {
        FilterRegistry::with_cache(self.db.clone(), self.session.clone(), self.cache.clone())
    }

    pub fn pipeline(
        &self,
        engine: Arc<dyn FilterEngine>,
        validator: Arc<dyn SchemaValidator>,
    ) -> FilterPipeline {
        let store = self.documents().with_validator(Arc::clone(&validator));
        FilterPipeline::new(store, self.filters(), engine, validator)
    }

    pub fn ledger(&self) -> PublicationLedger {
        PublicationLedger::new(self.db.clone(), self.session.clone())
    }

    pub fn ledger_writer(&self) -> LedgerWriter {
        LedgerWriter::new(self.db.clone())
    }

    pub fn jobs(&self, notifier: Arc<dyn NotificationSink>) -> JobController {
        JobController::new(self.db.clone(), self.session.clone(), notifier)
            .with_status_url(self.jobs.status_url.clone())
            .with_stale_after(Duration::from_secs(self.jobs.stale_after_secs))
    }

    pub fn nomap(&self) -> NomapPatterns {
        NomapPatterns::new(self.db.clone(), self.session.clone())
    }
}
