pub mod context;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod transform;

pub use context::{CleaningArgs, RunContext, JOB_TYPE};
pub use error::{CleaningError, DatasetError, RunError};
pub use pipeline::{run_cleaning, RunOptions, RunSummary, OUTPUT_FILE_NAME};
pub use transform::{clean_listings, CleanedDataset, CleaningSummary, PriceBounds};
