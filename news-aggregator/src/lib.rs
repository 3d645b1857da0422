pub mod aggregator;
pub mod config;
pub mod curator;
pub mod fetcher;
pub mod media;
pub mod publisher;
pub mod scheduler;
pub mod sources;
pub mod status;
pub mod store;
pub mod types;

pub use aggregator::{CycleOutcome, NewsAggregator};
pub use config::AppConfig;
pub use curator::{Curated, Curator, GeminiCurator, MockCurator, Verdict};
pub use fetcher::{Fetcher, HttpConfig};
pub use publisher::PostRunner;
pub use scheduler::Scheduler;
pub use sources::{enabled_sources, NewsSource, SourceQuery};
pub use status::SystemStatus;
pub use store::Store;
pub use types::*;
