use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::DatasetError;

/// Load a comma-separated file with a header row.
///
/// Column types are inferred from every row, so a malformed value late in the file widens
/// its column to a string instead of failing the read. Date-like columns are left as
/// strings; typing them is the transform's job.
pub fn load_dataset(path: &Path) -> Result<DataFrame, DatasetError> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `df` as CSV with a header and no index column. Dates use `YYYY-MM-DD`, nulls are
/// empty fields.
pub fn write_dataset(df: &mut DataFrame, path: &Path) -> Result<(), DatasetError> {
    let mut file = File::create(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|source| DatasetError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    file.sync_all().map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}
