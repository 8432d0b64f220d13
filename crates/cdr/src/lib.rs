pub mod audio;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod db;
pub mod docs;
pub mod error;
pub mod filters;
pub mod forms;
pub mod ids;
pub mod jobs;
pub mod nomap;
pub mod pipeline;
pub mod publishing;
pub mod sanitize;
pub mod secrets;
pub mod services;
pub mod session;
pub mod time;
pub mod wildcard;
pub mod xml;

pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use config::{load_config, Config, Timeouts};
pub use context::RequestContext;
pub use db::{Database, DatabaseError};
pub use docs::{DocumentStore, SchemaValidator, WellFormedValidator};
pub use error::{CdrError, ConfigError, Result, Severity, ValidationMessage};
pub use filters::{FilterRegistry, FilterSetSpec};
pub use ids::{canonical, CdrId, DocId, FilterRef, VersionSelector};
pub use jobs::{BatchStatus, HandlerRegistry, JobController, JobHandler, WorkerPool};
pub use nomap::NomapPatterns;
pub use pipeline::{FilterEngine, FilterPipeline, ProcessEngine};
pub use publishing::{LedgerWriter, PublicationLedger};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use session::{Action, Session};
pub use wildcard::Wildcard;
