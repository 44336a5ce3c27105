use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use super::layout::{paginate, Line, LineStyle};
use crate::AppResult;

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_TOP: f32 = 20.0;
const LINE_STEP: f32 = 5.2;
const LAYER: &str = "Layer 1";

fn font_size(style: LineStyle) -> f32 {
    match style {
        LineStyle::Title => 16.0,
        LineStyle::Heading => 12.0,
        LineStyle::Body | LineStyle::Blank => 10.0,
    }
}

fn draw_page(layer: &PdfLayerReference, lines: &[Line], regular: &IndirectFontRef, bold: &IndirectFontRef) {
    let mut y = PAGE_HEIGHT.0 - MARGIN_TOP;
    for line in lines {
        if line.style != LineStyle::Blank && !line.text.is_empty() {
            let font = match line.style {
                LineStyle::Title | LineStyle::Heading => bold,
                _ => regular,
            };
            layer.use_text(line.text.clone(), font_size(line.style), Mm(MARGIN_LEFT), Mm(y), font);
        }
        y -= LINE_STEP;
    }
}

/// Render laid-out lines to PDF bytes, one A4 page per chunk.
pub fn render(title: &str, lines: &[Line]) -> AppResult<Vec<u8>> {
    let (doc, first_page, first_layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, LAYER);
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    for (index, page) in paginate(lines).into_iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_idx, layer_idx) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, LAYER);
            doc.get_page(page_idx).get_layer(layer_idx)
        };
        draw_page(&layer, page, &regular, &bold);
    }

    Ok(doc.save_to_bytes()?)
}
