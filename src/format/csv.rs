//! CSV output formatter

use super::{records, WindowFormatter};
use crate::{DisasmError, Window};

const HEADER: [&str; 9] = [
    "address", "size", "bytes", "mnemonic", "operands", "next", "target", "split", "current",
];

impl WindowFormatter for super::CsvFormatter {
    fn format(&self, window: &Window) -> Result<String, DisasmError> {
        // Headers are written by hand so an empty window still has them.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        writer.write_record(HEADER)?;
        for record in records(window) {
            writer.serialize(record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| DisasmError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| DisasmError::Generic(e.to_string()))
    }
}
