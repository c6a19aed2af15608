use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use stmtflow_core::{Cell, Row};

use super::ReadError;

/// Read the first sheet of an xlsx/xls/xlsb/ods workbook. Cells keep their
/// raw values: numbers stay numbers (dates as serial numbers), empty
/// cells become empty strings.
pub fn read_workbook(data: &[u8]) -> Result<Vec<Row>, ReadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|e| ReadError::Workbook(e.to_string()))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ReadError::NoSheets)?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| ReadError::Workbook(e.to_string()))?;

    // Ranges start at the first used cell; pad so column indexes match the sheet.
    let leading_columns = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    Ok(range
        .rows()
        .map(|row| {
            std::iter::repeat_with(Cell::empty)
                .take(leading_columns)
                .chain(row.iter().map(to_cell))
                .collect()
        })
        .collect())
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::empty(),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_map_to_cells() {
        assert_eq!(to_cell(&Data::Empty), Cell::empty());
        assert_eq!(to_cell(&Data::Int(42)), Cell::Number(42.0));
        assert_eq!(to_cell(&Data::Float(12.5)), Cell::Number(12.5));
        assert_eq!(to_cell(&Data::String("NEFT".into())), Cell::from("NEFT"));
        assert_eq!(to_cell(&Data::Bool(true)), Cell::Bool(true));
    }

    #[test]
    fn zip_without_workbook_is_rejected() {
        // An empty zip archive: valid container, no workbook parts.
        let empty_zip = [
            0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert!(read_workbook(&empty_zip).is_err());
    }

    #[test]
    fn text_is_not_a_workbook() {
        assert!(matches!(
            read_workbook(b"Date,Amount\n2024-01-01,10\n"),
            Err(ReadError::Workbook(_))
        ));
    }
}
