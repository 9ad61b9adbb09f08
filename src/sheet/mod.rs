//! Spreadsheet input and CSV output.

pub mod dataset;
pub mod export;
pub mod parser;

#[cfg(test)]
pub(crate) mod testing;

pub use dataset::{cell_text, Dataset, Page, Record, Sheet, Workbook};
pub use export::write_dataset;
pub use parser::{parse_csv_text, parse_file};
