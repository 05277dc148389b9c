//! CSV writing shared by the projection and partition stages.
//!
//! Values are written exactly as read: no quoting is added and every record
//! ends with a bare `\n`.

use anyhow::{Context, Result};
use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::reading::{OUTPUT_HEADER, SpeedReading};

/// Creates (or truncates) `path` and writes the fixed output header.
pub fn create_reading_writer(path: &Path) -> Result<Writer<File>> {
    debug!(path = %path.display(), "Creating CSV output");

    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(false) // header is written explicitly so empty outputs still get one
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file);

    writer
        .write_record(OUTPUT_HEADER)
        .with_context(|| format!("failed to write header to {}", path.display()))?;

    Ok(writer)
}

/// Appends one reading to an open writer.
pub fn write_reading(writer: &mut Writer<File>, reading: &SpeedReading) -> Result<()> {
    writer.serialize(reading)?;
    Ok(())
}

/// Flushes and closes a writer, surfacing any buffered I/O error.
pub fn finish(mut writer: Writer<File>, path: &Path) -> Result<()> {
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("speed_extract_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_header_only_when_no_rows() {
        let path = temp_path("output_header_only.csv");
        let _ = fs::remove_file(&path);

        let writer = create_reading_writer(&path).unwrap();
        finish(writer, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "tmc,tstamp,speed,cvalue\n");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rows_written_verbatim() {
        let path = temp_path("output_verbatim.csv");
        let _ = fs::remove_file(&path);

        let reading = SpeedReading {
            tmc: "129+04100".to_string(),
            tstamp: "2020-07-01 00:00:00".to_string(),
            speed: "60.00".to_string(),
            cvalue: "30".to_string(),
        };
        let mut writer = create_reading_writer(&path).unwrap();
        write_reading(&mut writer, &reading).unwrap();
        finish(writer, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "tmc,tstamp,speed,cvalue\n129+04100,2020-07-01 00:00:00,60.00,30\n"
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_existing_file_is_truncated() {
        let path = temp_path("output_truncate.csv");
        fs::write(&path, "stale content that should disappear\n").unwrap();

        let writer = create_reading_writer(&path).unwrap();
        finish(writer, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "tmc,tstamp,speed,cvalue\n");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unwritable_destination_errors() {
        let path = temp_path("no_such_dir").join("out.csv");
        let err = create_reading_writer(&path).unwrap_err();
        assert!(err.to_string().contains("failed to create"));
    }
}
