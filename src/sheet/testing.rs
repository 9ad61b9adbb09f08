//! Workbook fixtures written with rust_xlsxwriter.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWorkbook, XlsxError};

/// Writes `sales.xlsx` into `dir` with three sheets:
///
/// * `Cover`: blank.
/// * `Sales`: `Week, Date, Channel, Spend, Active` and `rows` data rows.
///   Week is a whole number, Date a formatted date (row 1 is 2024-01-01),
///   Spend a fraction.
/// * `Regions`: `Region, Manager` and three rows.
pub fn write_sales_workbook(dir: &Path, rows: u32) -> PathBuf {
    let path = dir.join("sales.xlsx");
    build_sales_workbook(&path, rows).unwrap();
    path
}

fn build_sales_workbook(path: &Path, rows: u32) -> Result<(), XlsxError> {
    let mut workbook = XlsxWorkbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    workbook.add_worksheet().set_name("Cover")?;

    let sales = workbook.add_worksheet();
    sales.set_name("Sales")?;
    for (col, title) in ["Week", "Date", "Channel", "Spend", "Active"].iter().enumerate() {
        sales.write_string(0, col as u16, *title)?;
    }
    for i in 0..rows {
        let row = i + 1;
        let day = ExcelDateTime::from_ymd(2024, (i % 12) as u8 + 1, (i % 28) as u8 + 1)?;
        sales.write_number(row, 0, f64::from(row))?;
        sales.write_datetime_with_format(row, 1, &day, &date_format)?;
        sales.write_string(row, 2, if i % 2 == 0 { "Search" } else { "Social" })?;
        sales.write_number(row, 3, 100.5 + f64::from(i))?;
        sales.write_boolean(row, 4, i % 3 != 0)?;
    }

    let regions = workbook.add_worksheet();
    regions.set_name("Regions")?;
    regions.write_string(0, 0, "Region")?;
    regions.write_string(0, 1, "Manager")?;
    for (row, (region, manager)) in [("North", "Ana"), ("South", "Ben"), ("West", "Chi")]
        .iter()
        .enumerate()
    {
        regions.write_string(row as u32 + 1, 0, *region)?;
        regions.write_string(row as u32 + 1, 1, *manager)?;
    }

    workbook.save(path)
}
