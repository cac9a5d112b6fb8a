use std::io::BufWriter;

use chrono::NaiveDateTime;
use printpdf::*;

use crate::error::{ChequeError, Result};
use crate::export::ReportTable;

// A4 dimensions (mm)
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 20.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_RIGHT: f32 = 15.0;
const CONTENT_W: f32 = PAGE_W - MARGIN_LEFT - MARGIN_RIGHT;
const ROW_H: f32 = 5.0;
const FONT_SIZE: f32 = 8.5;
const TITLE_SIZE: f32 = 16.0;
const SUBTITLE_SIZE: f32 = 10.0;
const CELL_PAD: f32 = 1.5;

fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.18
}

/// Cut `text` so it fits in `width`, marking the cut with "..".
fn fit(text: &str, width: f32, size: f32) -> String {
    if approx_text_width(text, size) <= width {
        return text.to_string();
    }
    let max_chars = ((width / (size * 0.18)) as usize).saturating_sub(2);
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("..");
    cut
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

struct Col {
    width: f32,
    align: Align,
}

/// Share the page width between columns in proportion to their widest cell.
fn layout(table: &ReportTable) -> Vec<Col> {
    let widest: Vec<usize> = (0..table.headers.len())
        .map(|i| {
            let cells = table.rows.iter().chain(table.footer.iter()).filter_map(|r| r.get(i));
            cells
                .map(|c| c.chars().count())
                .chain(std::iter::once(table.headers[i].chars().count()))
                .max()
                .unwrap_or(1)
                .clamp(4, 40)
        })
        .collect();
    let total: usize = widest.iter().sum::<usize>().max(1);
    widest
        .iter()
        .zip(&table.numeric)
        .map(|(w, numeric)| Col {
            width: CONTENT_W * *w as f32 / total as f32,
            align: if *numeric { Align::Right } else { Align::Left },
        })
        .collect()
}

struct PdfWriter {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    font_bold: IndirectFontRef,
    current_page: PdfPageIndex,
    current_layer: PdfLayerIndex,
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ChequeError::Pdf(format!("{e:?}")))?;
        let font_bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ChequeError::Pdf(format!("{e:?}")))?;
        Ok(Self {
            doc,
            font,
            font_bold,
            current_page: page,
            current_layer: layer,
            y: MARGIN_TOP,
        })
    }

    fn pdf_y(&self) -> f32 {
        PAGE_H - self.y
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer");
        self.current_page = page;
        self.current_layer = layer;
        self.y = MARGIN_TOP;
    }

    /// Start a new page when `needed` does not fit. Returns whether it did.
    fn ensure_space(&mut self, needed: f32) -> bool {
        if self.y + needed > PAGE_H - MARGIN_BOTTOM {
            self.new_page();
            return true;
        }
        false
    }

    fn text(&self, s: &str, x: f32, size: f32, bold: bool) {
        let font = if bold { self.font_bold.clone() } else { self.font.clone() };
        let layer = self.doc.get_page(self.current_page).get_layer(self.current_layer);
        layer.use_text(s, size, Mm(x), Mm(self.pdf_y()), &font);
    }

    fn hline(&self) {
        let layer = self.doc.get_page(self.current_page).get_layer(self.current_layer);
        layer.set_outline_thickness(0.5);
        let line = Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT), Mm(self.pdf_y())), false),
                (Point::new(Mm(PAGE_W - MARGIN_RIGHT), Mm(self.pdf_y())), false),
            ],
            is_closed: false,
        };
        layer.add_line(line);
    }

    fn header(&mut self, title: &str, company: &str, subtitle: &str, generated_at: NaiveDateTime) {
        self.text(title, MARGIN_LEFT, TITLE_SIZE, true);
        self.y += 7.0;
        if !company.is_empty() {
            self.text(company, MARGIN_LEFT, SUBTITLE_SIZE, false);
            self.y += 5.0;
        }
        self.text(subtitle, MARGIN_LEFT, SUBTITLE_SIZE, false);
        self.y += 5.0;
        let ts = generated_at.format("Généré le %Y-%m-%d %H:%M").to_string();
        self.text(&ts, MARGIN_LEFT, 8.0, false);
        self.y += 5.0;
        self.hline();
        self.y += 5.0;
    }

    fn row(&mut self, cols: &[Col], values: &[&str], bold: bool) {
        let mut x = MARGIN_LEFT;
        for (col, value) in cols.iter().zip(values) {
            let cell = fit(value, col.width - CELL_PAD, FONT_SIZE);
            match col.align {
                Align::Left => self.text(&cell, x, FONT_SIZE, bold),
                Align::Right => {
                    let tw = approx_text_width(&cell, FONT_SIZE);
                    self.text(&cell, x + col.width - CELL_PAD - tw, FONT_SIZE, bold);
                }
            }
            x += col.width;
        }
        self.y += ROW_H;
    }

    fn table_header(&mut self, cols: &[Col], headers: &[&str]) {
        self.ensure_space(ROW_H * 2.0);
        self.row(cols, headers, true);
        self.hline();
        self.y += 2.0;
    }

    fn to_bytes(self) -> Result<Vec<u8>> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ChequeError::Pdf(format!("{e:?}")))?;
        buf.into_inner().map_err(|e| ChequeError::Pdf(e.to_string()))
    }
}

/// Render a report table, repeating the column headers on each new page.
pub fn render_table(table: &ReportTable, company: &str, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
    let mut pdf = PdfWriter::new(&table.title)?;
    let subtitle = format!("{} enregistrement(s)", table.record_count());
    pdf.header(&table.title, company, &subtitle, generated_at);

    let cols = layout(table);
    pdf.table_header(&cols, &table.headers);
    if table.rows.is_empty() {
        pdf.text("Aucune donnée", MARGIN_LEFT, FONT_SIZE, false);
        pdf.y += ROW_H;
    }
    for row in &table.rows {
        if pdf.ensure_space(ROW_H) {
            pdf.table_header(&cols, &table.headers);
        }
        let values: Vec<&str> = row.iter().map(String::as_str).collect();
        pdf.row(&cols, &values, false);
    }
    if let Some(footer) = &table.footer {
        pdf.ensure_space(ROW_H * 2.0);
        pdf.hline();
        pdf.y += 2.0;
        let values: Vec<&str> = footer.iter().map(String::as_str).collect();
        pdf.row(&cols, &values, true);
    }
    pdf.to_bytes()
}
