//! In-memory sheet model and the placement rules for overlays.
//!
//! The card is described as plain data (cells, merged ranges, sizes) before
//! anything is rendered, so anchor search and image fitting are pure
//! functions that can be tested without a spreadsheet writer.
use std::collections::BTreeMap;

/// 0-based row of the signature labels (编制人, 审核人, ...).
pub const SIGNATURE_LABEL_ROW: u32 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellPos {
    pub row: u32,
    pub col: u16,
}

impl CellPos {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }
}

/// Inclusive rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u16,
    pub last_row: u32,
    pub last_col: u16,
}

impl CellRange {
    pub fn new(first_row: u32, first_col: u16, last_row: u32, last_col: u16) -> Self {
        Self {
            first_row,
            first_col,
            last_row,
            last_col,
        }
    }

    pub fn cell(pos: CellPos) -> Self {
        Self::new(pos.row, pos.col, pos.row, pos.col)
    }

    pub fn top_left(&self) -> CellPos {
        CellPos::new(self.first_row, self.first_col)
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        (self.first_row..=self.last_row).contains(&pos.row)
            && (self.first_col..=self.last_col).contains(&pos.col)
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_col <= other.last_col
            && other.first_col <= self.last_col
    }

    pub fn is_single_cell(&self) -> bool {
        self.first_row == self.last_row && self.first_col == self.last_col
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellStyle {
    Title,
    Header,
    Label,
    Data,
    /// Left aligned wrapped text.
    Text,
    /// Narrow bold caption, characters stacked top to bottom.
    Vertical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetCell {
    pub text: String,
    pub style: CellStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    name: String,
    rows: u32,
    cols: u16,
    cells: BTreeMap<CellPos, SheetCell>,
    merges: Vec<CellRange>,
    column_widths: Vec<f64>,
    row_heights: Vec<f64>,
}

impl SheetLayout {
    pub fn new(name: &str, rows: u32, cols: u16, column_width: f64, row_height: f64) -> Self {
        Self {
            name: name.to_string(),
            rows,
            cols,
            cells: BTreeMap::new(),
            merges: vec![],
            column_widths: vec![column_width; cols as usize],
            row_heights: vec![row_height; rows as usize],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        if let Some(w) = self.column_widths.get_mut(col as usize) {
            *w = width;
        }
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        if let Some(h) = self.row_heights.get_mut(row as usize) {
            *h = height;
        }
    }

    pub fn column_widths(&self) -> &[f64] {
        &self.column_widths
    }

    pub fn row_heights(&self) -> &[f64] {
        &self.row_heights
    }

    pub fn put(&mut self, row: u32, col: u16, text: impl Into<String>, style: CellStyle) {
        self.cells.insert(
            CellPos::new(row, col),
            SheetCell {
                text: text.into(),
                style,
            },
        );
    }

    /// Merges `range` and writes `text` to its top-left cell. Ranges that
    /// overlap an existing merge are ignored.
    pub fn merge(&mut self, range: CellRange, text: impl Into<String>, style: CellStyle) {
        if range.is_single_cell() {
            self.put(range.first_row, range.first_col, text, style);
            return;
        }
        if self.merges.iter().any(|m| m.overlaps(&range)) {
            return;
        }
        self.merges.push(range);
        self.put(range.first_row, range.first_col, text, style);
    }

    pub fn cell(&self, pos: CellPos) -> Option<&SheetCell> {
        self.cells.get(&pos)
    }

    pub fn text_at(&self, pos: CellPos) -> Option<&str> {
        self.cells.get(&pos).map(|c| c.text.as_str())
    }

    pub fn merges(&self) -> &[CellRange] {
        &self.merges
    }

    /// The merged range containing `pos`, or the cell itself.
    pub fn region_at(&self, pos: CellPos) -> CellRange {
        self.merges
            .iter()
            .find(|m| m.contains(pos))
            .copied()
            .unwrap_or_else(|| CellRange::cell(pos))
    }

    /// True for cells hidden under a merge, i.e. inside but not top-left.
    pub fn is_covered(&self, pos: CellPos) -> bool {
        self.merges
            .iter()
            .any(|m| m.contains(pos) && m.top_left() != pos)
    }

    fn cells_in_row(&self, row: u32) -> impl Iterator<Item = (&CellPos, &SheetCell)> {
        self.cells
            .range(CellPos::new(row, 0)..=CellPos::new(row, u16::MAX))
    }

    /// Pixel size of a range, `(width, height)`.
    pub fn region_size_px(&self, range: CellRange) -> (f64, f64) {
        let width: f64 = (range.first_col..=range.last_col)
            .filter_map(|c| self.column_widths.get(c as usize))
            .map(|w| column_width_px(*w))
            .sum();
        let height: f64 = (range.first_row..=range.last_row)
            .filter_map(|r| self.row_heights.get(r as usize))
            .map(|h| row_height_px(*h))
            .sum();
        (width, height)
    }
}

/// Excel column width in characters to pixels, for the default font.
pub fn column_width_px(chars: f64) -> f64 {
    if chars < 1.0 {
        (chars * 12.0).round()
    } else {
        (chars * 7.0).round() + 5.0
    }
}

/// Row height in points to pixels at 96 dpi.
pub fn row_height_px(points: f64) -> f64 {
    (points * 4.0 / 3.0).round()
}

/// Where an overlay for a label goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub label: CellPos,
    /// Region directly below the label.
    pub target: CellRange,
}

/// Finds `label` (exact, trimmed) on the signature row first, then anywhere.
pub fn find_anchor(sheet: &SheetLayout, label: &str) -> Option<Anchor> {
    let matches = |cell: &SheetCell| cell.text.trim() == label;
    let label_pos = sheet
        .cells_in_row(SIGNATURE_LABEL_ROW)
        .find(|(_, cell)| matches(*cell))
        .or_else(|| sheet.cells.iter().find(|(_, cell)| matches(*cell)))
        .map(|(pos, _)| *pos)?;
    let label_region = sheet.region_at(label_pos);
    let below = CellPos::new(label_region.last_row + 1, label_pos.col);
    if below.row >= sheet.rows {
        return None;
    }
    Some(Anchor {
        label: label_pos,
        target: sheet.region_at(below),
    })
}

/// Scale and offsets placing an image inside a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f64,
    pub offset_x: u32,
    pub offset_y: u32,
}

pub const MAX_WIDTH_SHARE: f64 = 0.9;
pub const MAX_HEIGHT_SHARE: f64 = 0.85;
pub const MIN_SCALE: f64 = 0.1;

/// Fits an image into 90% width and 85% height of the region, never
/// enlarging and never below 10%, centred.
pub fn fit_image(image: (u32, u32), region: (f64, f64)) -> Placement {
    let (w, h) = (f64::from(image.0.max(1)), f64::from(image.1.max(1)));
    let (rw, rh) = region;
    let scale = (rw * MAX_WIDTH_SHARE / w)
        .min(rh * MAX_HEIGHT_SHARE / h)
        .min(1.0)
        .max(MIN_SCALE);
    let offset = |room: f64, size: f64| ((room - size * scale) / 2.0).max(0.0).round() as u32;
    Placement {
        scale,
        offset_x: offset(rw, w),
        offset_y: offset(rh, h),
    }
}
