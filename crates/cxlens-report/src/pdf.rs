//! Pagination and PDF encoding.
//!
//! Output is a PDF 1.4 file using the base-14 Helvetica fonts, uncompressed
//! content streams and no creation date or document ID, so the same
//! document always encodes to the same bytes.

use crate::RenderError;
use crate::layout::{LineStyle, ReportDocument};

pub const MAX_PAGES: usize = 10_000;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN_LEFT: u32 = 72;
const DETAIL_INDENT: u32 = 96;
const FIRST_BASELINE: u32 = 720;
const BOTTOM_LIMIT: u32 = 72;
const FOOTER_BASELINE: u32 = 40;
const FOOTER_SIZE: u32 = 9;

// Fixed object numbers; pages start after these.
const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const REGULAR_FONT_ID: usize = 3;
const BOLD_FONT_ID: usize = 4;
const INFO_ID: usize = 5;
const FIRST_PAGE_ID: usize = 6;

#[derive(Debug, Clone, Copy)]
struct StyleMetrics {
    bold: bool,
    size: u32,
    advance: u32,
    indent: u32,
    columns: usize,
}

fn metrics(style: LineStyle) -> StyleMetrics {
    match style {
        LineStyle::Title => StyleMetrics {
            bold: true,
            size: 22,
            advance: 36,
            indent: MARGIN_LEFT,
            columns: 38,
        },
        LineStyle::Heading => StyleMetrics {
            bold: true,
            size: 14,
            advance: 26,
            indent: MARGIN_LEFT,
            columns: 60,
        },
        LineStyle::Body => StyleMetrics {
            bold: false,
            size: 11,
            advance: 16,
            indent: MARGIN_LEFT,
            columns: 84,
        },
        LineStyle::Detail => StyleMetrics {
            bold: false,
            size: 10,
            advance: 14,
            indent: DETAIL_INDENT,
            columns: 84,
        },
    }
}

/// One positioned run of text on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlacedLine {
    pub bold: bool,
    pub size: u32,
    pub x: u32,
    pub y: u32,
    pub text: String,
}

/// Wrap and flow the document onto pages.
pub(crate) fn paginate(doc: &ReportDocument) -> Result<Vec<Vec<PlacedLine>>, RenderError> {
    let mut pages: Vec<Vec<PlacedLine>> = vec![Vec::new()];
    let mut cursor = FIRST_BASELINE;
    let lines = doc.lines();

    for (idx, line) in lines.iter().enumerate() {
        let m = metrics(line.style);
        let wrapped = wrap(&sanitize(&line.text), m.columns);

        // Keep a heading on the same page as the line that follows it.
        let needed = match (line.style, lines.get(idx + 1)) {
            (LineStyle::Heading, Some(next)) => m.advance + metrics(next.style).advance,
            _ => m.advance,
        };
        if needs_break(cursor, needed, pages.last()) {
            pages.push(Vec::new());
            cursor = FIRST_BASELINE;
        }

        for segment in wrapped {
            if needs_break(cursor, m.advance, pages.last()) {
                pages.push(Vec::new());
                cursor = FIRST_BASELINE;
            }
            if pages.len() > MAX_PAGES {
                return Err(RenderError::TooManyPages { limit: MAX_PAGES });
            }
            if let Some(page) = pages.last_mut() {
                page.push(PlacedLine {
                    bold: m.bold,
                    size: m.size,
                    x: m.indent,
                    y: cursor,
                    text: segment,
                });
            }
            cursor -= m.advance;
        }
    }

    Ok(pages)
}

fn needs_break(cursor: u32, needed: u32, page: Option<&Vec<PlacedLine>>) -> bool {
    let page_has_content = page.is_some_and(|p| !p.is_empty());
    page_has_content && cursor < BOTTOM_LIMIT + needed
}

/// Encode paginated lines as a complete PDF file.
pub(crate) fn encode(pages: &[Vec<PlacedLine>], title: &str) -> Vec<u8> {
    let page_count = pages.len();
    let mut objects: Vec<String> = Vec::with_capacity(FIRST_PAGE_ID - 1 + page_count * 2);

    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", page_object_id(i)))
        .collect::<Vec<_>>()
        .join(" ");

    objects.push(format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>"));
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push(font_object("Helvetica"));
    objects.push(font_object("Helvetica-Bold"));
    objects.push(format!(
        "<< /Title ({}) /Producer (cxlens) >>",
        escape(&sanitize(title))
    ));

    for (i, page) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 {REGULAR_FONT_ID} 0 R /F2 {BOLD_FONT_ID} 0 R >> >> \
             /Contents {} 0 R >>",
            page_object_id(i) + 1
        ));
        let stream = content_stream(page, i + 1, page_count);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_offset = out.len();
    let size = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {size} /Root {CATALOG_ID} 0 R /Info {INFO_ID} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        )
        .as_bytes(),
    );
    out
}

fn page_object_id(page_index: usize) -> usize {
    FIRST_PAGE_ID + page_index * 2
}

fn font_object(base: &str) -> String {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>")
}

fn content_stream(page: &[PlacedLine], number: usize, total: usize) -> String {
    let mut stream = String::new();
    for line in page {
        let font = if line.bold { "F2" } else { "F1" };
        stream.push_str(&format!(
            "BT /{font} {} Tf {} {} Td ({}) Tj ET\n",
            line.size,
            line.x,
            line.y,
            escape(&line.text)
        ));
    }
    stream.push_str(&format!(
        "BT /F1 {FOOTER_SIZE} Tf {} {FOOTER_BASELINE} Td (Page {number} of {total}) Tj ET\n",
        PAGE_WIDTH / 2 - 30
    ));
    stream
}

/// Replace anything the base-14 fonts cannot show with `?`.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' => ' ',
            ' '..='~' => c,
            _ => '?',
        })
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Break `text` into segments of at most `columns` characters, preferring
/// whitespace boundaries.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= columns {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= columns {
            segments.push(chars[start..].iter().collect());
            break;
        }
        // A space right after a full-width segment is still a valid cut.
        let window = &chars[start..=start + columns];
        let cut = match window.iter().rposition(|c| *c == ' ') {
            Some(pos) if pos > 0 => pos,
            _ => columns,
        };
        segments.push(chars[start..start + cut].iter().collect::<String>());
        start += cut;
        while start < chars.len() && chars[start] == ' ' {
            start += 1;
        }
    }
    segments
}
