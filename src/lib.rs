pub mod audit;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod inventory;
pub mod matcher;
pub mod model;
pub mod platform;
pub mod report;
pub mod scanner;
pub mod version;

pub use audit::{audit, collect_and_audit, AuditOptions};
pub use cache::CorpusCache;
pub use config::Config;
pub use corpus::{CorpusSnapshot, CorpusStore, IngestReport};
pub use error::AuditError;
pub use inventory::{Inventory, InventorySummary};
pub use matcher::{match_inventory, MatchOutcome, MatchStats};
pub use model::{MatchResult, PackageRecord, ProductRange, RepositoryKind, Severity, VulnerabilityRecord};
pub use platform::Platform;
pub use report::{AuditReport, OutputFormat, ReportEntry, Verbosity};
pub use scanner::Adapter;
pub use version::{compare, in_range, Scheme};
