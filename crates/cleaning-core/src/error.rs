// crates/cleaning-core/src/error.rs

use std::io;
use std::path::{Path, PathBuf};

use cleaning_artifacts::{FetchError, PublishError};
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("required column '{column}' is missing from the dataset")]
    MissingColumn { column: &'static str },

    #[error("Polars operation failed")]
    Polars(#[from] PolarsError),
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read dataset {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("failed to write dataset {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("file I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to fetch input artifact")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("cleaning failed")]
    Cleaning(#[from] CleaningError),

    #[error("failed to create temporary output directory")]
    TempDir(#[source] io::Error),

    #[error("failed to publish output artifact ({})", recovery_note(.recovered.as_deref()))]
    Publish {
        #[source]
        source: PublishError,
        recovered: Option<PathBuf>,
    },
}

fn recovery_note(recovered: Option<&Path>) -> String {
    match recovered {
        Some(path) => format!("cleaned output preserved at {}", path.display()),
        None => "cleaned output could not be preserved".to_string(),
    }
}
