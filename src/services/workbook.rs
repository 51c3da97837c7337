use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Cursor;

/// A cell as the import sees it: the text a user would see, and whether the
/// underlying value was a string.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetCell {
    pub display: String,
    pub is_text: bool,
}

/// A picture anchored to the grid. `from_row`/`from_col` are zero-based.
#[derive(Debug, Clone)]
pub struct AnchoredPicture {
    pub from_row: u32,
    pub from_col: u32,
    pub data: Vec<u8>,
}

/// Owned copy of the first worksheet of an uploaded workbook. Rows and
/// columns are 1-based like spreadsheet coordinates.
#[derive(Debug, Clone, Default)]
pub struct SheetSnapshot {
    row_count: u32,
    cells: HashMap<(u32, u32), SheetCell>,
    pictures: Vec<AnchoredPicture>,
}

impl SheetSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the first worksheet out of xlsx bytes.
    pub fn from_xlsx(bytes: &[u8]) -> Result<Self> {
        let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes.to_vec()), true)
            .map_err(|e| Error::Spreadsheet(format!("Failed to read workbook: {}", e)))?;

        let sheet = book
            .get_sheet_collection()
            .first()
            .ok_or_else(|| Error::Spreadsheet("Workbook contains no worksheets".to_string()))?;

        let mut snapshot = SheetSnapshot::new();
        let (max_col, max_row) = sheet.get_highest_column_and_row();
        snapshot.row_count = max_row;

        for row in 1..=max_row {
            for col in 1..=max_col {
                if let Some(cell) = sheet.get_cell((col, row)) {
                    let is_text = matches!(cell.get_data_type(), "s" | "str" | "inlineStr");
                    snapshot.cells.insert(
                        (row, col),
                        SheetCell {
                            display: cell.get_formatted_value(),
                            is_text,
                        },
                    );
                }
            }
        }

        for picture in sheet.get_image_collection() {
            snapshot.pictures.push(AnchoredPicture {
                from_row: picture.get_row().to_owned(),
                from_col: picture.get_col().to_owned(),
                data: picture.get_image_data().to_vec(),
            });
        }

        tracing::debug!(
            rows = snapshot.row_count,
            pictures = snapshot.pictures.len(),
            "Workbook parsed"
        );

        Ok(snapshot)
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&SheetCell> {
        self.cells.get(&(row, col))
    }

    /// Displayed text of a cell, empty when the cell is absent.
    pub fn display_text(&self, row: u32, col: u32) -> &str {
        self.cell(row, col).map(|c| c.display.as_str()).unwrap_or("")
    }

    /// The picture drawn over the 1-based cell (`row`, `col`); drawings anchor
    /// at the zero-based coordinate one less in each axis.
    pub fn picture_at(&self, row: u32, col: u32) -> Option<&AnchoredPicture> {
        if row == 0 || col == 0 {
            return None;
        }
        self.pictures
            .iter()
            .find(|p| p.from_row == row - 1 && p.from_col == col - 1)
    }

    pub fn pictures(&self) -> &[AnchoredPicture] {
        &self.pictures
    }

    pub fn with_text(mut self, row: u32, col: u32, text: &str) -> Self {
        self.put(row, col, text.to_string(), true);
        self
    }

    pub fn with_value(mut self, row: u32, col: u32, display: &str) -> Self {
        self.put(row, col, display.to_string(), false);
        self
    }

    pub fn with_picture(mut self, row: u32, col: u32, data: Vec<u8>) -> Self {
        self.pictures.push(AnchoredPicture {
            from_row: row.saturating_sub(1),
            from_col: col.saturating_sub(1),
            data,
        });
        self.row_count = self.row_count.max(row);
        self
    }

    fn put(&mut self, row: u32, col: u32, display: String, is_text: bool) {
        self.cells.insert((row, col), SheetCell { display, is_text });
        self.row_count = self.row_count.max(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{Image, Workbook};

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn picture_lookup_uses_zero_based_anchor() {
        let sheet = SheetSnapshot::new().with_picture(3, 4, vec![1, 2, 3]);
        assert_eq!(sheet.pictures()[0].from_row, 2);
        assert_eq!(sheet.pictures()[0].from_col, 3);
        assert!(sheet.picture_at(3, 4).is_some());
        assert!(sheet.picture_at(2, 3).is_none());
        assert!(sheet.picture_at(0, 0).is_none());
    }

    #[test]
    fn reads_cells_and_pictures_from_xlsx() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "Subject").unwrap();
        worksheet.write_string(1, 0, "Physics").unwrap();
        worksheet.write_number(1, 1, 7).unwrap();
        let image = Image::new_from_buffer(&tiny_png()).unwrap();
        worksheet.insert_image(2, 3, &image).unwrap();
        worksheet.write_string(2, 0, "Chemistry").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = SheetSnapshot::from_xlsx(&bytes).unwrap();
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.display_text(2, 1), "Physics");
        assert!(sheet.cell(2, 1).unwrap().is_text);
        assert!(!sheet.cell(2, 2).unwrap().is_text);
        assert_eq!(sheet.display_text(2, 2), "7");
        assert!(sheet.picture_at(3, 4).is_some());
    }

    #[test]
    fn first_worksheet_is_deserialized() {
        let mut workbook = Workbook::new();
        workbook
            .add_worksheet()
            .write_string(1, 0, "first sheet")
            .unwrap();
        workbook
            .add_worksheet()
            .write_string(4, 0, "second sheet")
            .unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = SheetSnapshot::from_xlsx(&bytes).unwrap();
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.display_text(2, 1), "first sheet");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = SheetSnapshot::from_xlsx(b"not a workbook").unwrap_err();
        assert!(matches!(err, Error::Spreadsheet(_)));
    }
}
