//! JSON files for runs and comparisons

use crate::result::CodediffResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read a value written by [`save_json`]
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> CodediffResult<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write `value` as pretty-printed JSON, replacing any existing file
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> CodediffResult<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
