pub mod category;
pub mod collection;
pub mod error;
pub mod first_fetch;
pub mod record;
pub mod state;
pub mod timestamp;

pub use category::{LogCategory, parse_categories};
pub use collection::{CategoryFailure, CategoryStats, CollectionResult};
pub use error::ConfigError;
pub use first_fetch::{DEFAULT_FIRST_FETCH, FirstFetch, first_fetch_lower_bound};
pub use record::{RawRecord, RecordError, TaggedRecord};
pub use state::{LastRun, ResumptionState};
pub use timestamp::{TIMESTAMP_FORMAT, TimestampError, format_timestamp, parse_timestamp};
