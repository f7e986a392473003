//! Writers for materialized output.

use std::io::Write;

use crate::error::Result;
use crate::value::Value;

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes one JSON document per line. A top-level list is split so each
/// element gets its own line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a value, one line per list element.
    pub fn write(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::List(items) => {
                for item in items {
                    self.write_line(item)?;
                }
                Ok(())
            }
            other => self.write_line(other),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn write_line(&mut self, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }
}

/// JSON array writer
///
/// Streams values into a single JSON array.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a new JSON array writer and write the opening bracket
    pub fn new(mut writer: W) -> Result<Self> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
        })
    }

    /// Append one element.
    pub fn write(&mut self, value: &Value) -> Result<()> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        serde_json::to_writer(&mut self.writer, value)?;
        Ok(())
    }

    /// Append every element of a list, or the value itself otherwise.
    pub fn write_all(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::List(items) => items.iter().try_for_each(|item| self.write(item)),
            other => self.write(other),
        }
    }

    /// Finish writing the array and close the bracket
    pub fn finish(mut self) -> Result<()> {
        write!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}
