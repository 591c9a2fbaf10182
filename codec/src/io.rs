//! Opening tables from files and streams.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::OpenError;
use crate::options::ReadOptions;
use crate::read::read_table;
use crate::record::RecordSet;

/// Reads and decodes the table at `path`.
pub fn open_table(path: impl AsRef<Path>, options: &ReadOptions) -> Result<RecordSet, OpenError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "opening table");
    Ok(read_table(bytes, options)?)
}

/// Reads `reader` to the end and decodes the table.
pub fn read_table_from<R: Read>(
    mut reader: R,
    options: &ReadOptions,
) -> Result<RecordSet, OpenError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(read_table(bytes, options)?)
}
