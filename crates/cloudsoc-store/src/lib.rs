//! Persistence boundary: the last-run map lives in a JSON file between cycles.

mod error;
mod state_file;

pub use error::StoreError;
pub use state_file::StateStore;
