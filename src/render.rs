//! Turns a [`SheetLayout`] plus image overlays into an xlsx container.
use crate::error::Result;
use crate::sheet::{CellPos, CellStyle, Placement, SheetLayout};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Image, Workbook, Worksheet};

/// An image anchored at a cell with a pixel offset.
#[derive(Debug, Clone)]
pub struct ImageOverlay {
    pub cell: CellPos,
    pub placement: Placement,
    pub png: Vec<u8>,
}

/// Excel's stacked text orientation, one character per line.
const STACKED: i16 = 270;

struct Formats {
    title: Format,
    header: Format,
    label: Format,
    data: Format,
    text: Format,
    vertical: Format,
}

impl Formats {
    fn new() -> Self {
        let base = Format::new()
            .set_font_name("宋体")
            .set_font_size(10)
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap();
        Self {
            title: base.clone().set_font_size(16).set_bold(),
            header: base.clone().set_bold(),
            label: base.clone().set_bold(),
            data: base.clone(),
            text: base.clone().set_align(FormatAlign::Left),
            vertical: base.set_bold().set_rotation(STACKED),
        }
    }

    fn get(&self, style: CellStyle) -> &Format {
        match style {
            CellStyle::Title => &self.title,
            CellStyle::Header => &self.header,
            CellStyle::Label => &self.label,
            CellStyle::Data => &self.data,
            CellStyle::Text => &self.text,
            CellStyle::Vertical => &self.vertical,
        }
    }
}

pub fn render_workbook(layout: &SheetLayout, overlays: &[ImageOverlay]) -> Result<Vec<u8>> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(layout.name())?;

    for (col, width) in layout.column_widths().iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    for (row, height) in layout.row_heights().iter().enumerate() {
        sheet.set_row_height(row as u32, *height)?;
    }

    write_cells(sheet, layout, &formats)?;

    for overlay in overlays {
        let image = Image::new_from_buffer(&overlay.png)?
            .set_scale_width(overlay.placement.scale)
            .set_scale_height(overlay.placement.scale);
        sheet.insert_image_with_offset(
            overlay.cell.row,
            overlay.cell.col,
            &image,
            overlay.placement.offset_x,
            overlay.placement.offset_y,
        )?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cells(sheet: &mut Worksheet, layout: &SheetLayout, formats: &Formats) -> Result<()> {
    for range in layout.merges() {
        let cell = layout.cell(range.top_left());
        let text = cell.map(|c| c.text.as_str()).unwrap_or_default();
        let format = formats.get(cell.map(|c| c.style).unwrap_or(CellStyle::Data));
        sheet.merge_range(
            range.first_row,
            range.first_col,
            range.last_row,
            range.last_col,
            text,
            format,
        )?;
    }

    for row in 0..layout.rows() {
        for col in 0..layout.cols() {
            let pos = CellPos::new(row, col);
            if layout.is_covered(pos) || layout.merges().iter().any(|m| m.top_left() == pos) {
                continue;
            }
            match layout.cell(pos) {
                Some(cell) if !cell.text.is_empty() => {
                    sheet.write_string_with_format(row, col, &cell.text, formats.get(cell.style))?;
                }
                Some(cell) => {
                    sheet.write_blank(row, col, formats.get(cell.style))?;
                }
                None => {
                    sheet.write_blank(row, col, &formats.data)?;
                }
            }
        }
    }
    Ok(())
}
