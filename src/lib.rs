pub mod cache;
pub mod config;
pub mod dates;
pub mod extract;
pub mod likes;
pub mod llm;
pub mod logging;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod schedule;
pub mod scraping;
pub mod store;
pub mod utils;

pub use cache::{CacheError, EventCache};
pub use config::AppConfig;
pub use extract::{Extraction, Extractor};
pub use models::{Event, RawFragment, Venue, Vibe};
pub use pipeline::{EventSource, Pipeline, PipelineError, RunReport};
pub use store::EventStore;
