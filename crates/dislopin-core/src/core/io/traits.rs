use crate::core::models::configuration::AtomicConfiguration;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing atomic configuration formats.
///
/// Implementors handle format-specific parsing and serialization; the path-based helpers
/// add buffering on top.
pub trait ConfigurationFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads a configuration from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the reader fails.
    fn read_from(reader: &mut impl BufRead) -> Result<AtomicConfiguration, Self::Error>;

    /// Writes a configuration to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(config: &AtomicConfiguration, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a configuration from a file path.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<AtomicConfiguration, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a configuration to a file path, flushing before returning.
    fn write_to_path<P: AsRef<Path>>(
        config: &AtomicConfiguration,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(config, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
