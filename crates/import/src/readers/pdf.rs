use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use stmtflow_core::{PdfLine, PdfPage, PdfToken};
use tracing::debug;

use super::ReadError;

/// US Letter, used when a page carries no readable MediaBox of its own.
const DEFAULT_PAGE_HEIGHT: f64 = 792.0;
/// Coordinates are compared at this precision when grouping lines.
const Y_PRECISION: f64 = 100.0;
/// Glyph width in thousandths of an em when a font does not say.
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
/// Default width of a CID font without `/DW`.
const DEFAULT_CID_WIDTH: f64 = 1000.0;
/// Runs on one baseline closer than this many ems belong to the same cell.
const COLUMN_GAP_EM: f64 = 1.0;
/// Runs further apart than this many ems are joined with a space.
const WORD_GAP_EM: f64 = 0.15;

/// Extract positioned text from every page. Each page is a list of lines
/// ordered top to bottom; tokens within a line are ordered by `x`.
pub fn read_pdf(data: &[u8]) -> Result<Vec<PdfPage>, ReadError> {
    let doc = Document::load_mem(data).map_err(|e| ReadError::Pdf(e.to_string()))?;

    let mut pages = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let height = page_height(&doc, page_id);
        let bytes = doc
            .get_page_content(page_id)
            .map_err(|e| ReadError::Pdf(e.to_string()))?;
        let content = Content::decode(&bytes).map_err(|e| ReadError::Pdf(e.to_string()))?;

        let fonts = doc
            .get_page_fonts(page_id)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, font)| (name, FontInfo::load(&doc, font)))
            .collect();

        let mut walker = TextWalker::new(height, fonts);
        for op in &content.operations {
            walker.apply(op);
        }
        pages.push(group_lines(walker.tokens));
    }

    Ok(pages)
}

fn page_height(doc: &Document, page_id: ObjectId) -> f64 {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"MediaBox").ok())
        .and_then(|obj| obj.as_array().ok())
        .and_then(|rect| Some(number(rect.get(3)?)? - number(rect.get(1)?)?))
        .unwrap_or(DEFAULT_PAGE_HEIGHT)
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Bucket tokens by vertical position, then order each bucket by `x`.
fn group_lines(tokens: Vec<PdfToken>) -> PdfPage {
    let mut lines: BTreeMap<i64, PdfLine> = BTreeMap::new();
    for token in tokens {
        let key = (token.y * Y_PRECISION).round() as i64;
        lines.entry(key).or_default().push(token);
    }

    lines
        .into_values()
        .map(|mut line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            line
        })
        .collect()
}

/// What the walker needs from a page font: how to turn shown bytes into
/// text, and how far they advance the pen.
struct FontInfo<'a> {
    encoding: Option<Encoding<'a>>,
    /// Type0 fonts show two-byte codes.
    composite: bool,
    first_char: i64,
    widths: Vec<f64>,
    default_width: f64,
}

impl<'a> FontInfo<'a> {
    fn load(doc: &'a Document, font: &'a Dictionary) -> Self {
        let encoding = if font.type_is(b"Font") {
            font.get_font_encoding(doc)
                .map_err(|e| debug!(error = %e, "Font encoding unavailable"))
                .ok()
        } else {
            None
        };
        let composite = font.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Type0"[..]);

        let default_width = if composite {
            font.get_deref(b"DescendantFonts", doc)
                .and_then(Object::as_array)
                .ok()
                .and_then(|fonts| fonts.first())
                .and_then(|first| doc.dereference(first).ok())
                .and_then(|(_, obj)| obj.as_dict().ok())
                .and_then(|cid_font| cid_font.get(b"DW").ok())
                .and_then(number)
                .unwrap_or(DEFAULT_CID_WIDTH)
        } else {
            DEFAULT_GLYPH_WIDTH
        };

        let widths = font
            .get_deref(b"Widths", doc)
            .and_then(Object::as_array)
            .map(|ws| ws.iter().map(|w| number(w).unwrap_or(default_width)).collect())
            .unwrap_or_default();

        Self {
            encoding,
            composite,
            first_char: font.get(b"FirstChar").and_then(Object::as_i64).unwrap_or(0),
            widths,
            default_width,
        }
    }

    fn decode(&self, obj: &Object, bytes: &[u8]) -> Option<String> {
        self.encoding
            .as_ref()
            .and_then(|enc| Document::decode_text(enc, bytes).ok())
            .or_else(|| lopdf::decode_text_string(obj).ok())
    }

    /// Horizontal advance of `bytes` in thousandths of an em. Per-glyph
    /// `/W` arrays of CID fonts are not read; their default width is used.
    fn advance(&self, bytes: &[u8]) -> f64 {
        if self.composite {
            return (bytes.len() / 2) as f64 * self.default_width;
        }
        bytes
            .iter()
            .map(|&code| {
                usize::try_from(code as i64 - self.first_char)
                    .ok()
                    .and_then(|i| self.widths.get(i).copied())
                    .unwrap_or(self.default_width)
            })
            .sum()
    }
}

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(m: &Matrix, tx: f64, ty: f64) -> Matrix {
    multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], m)
}

/// Text-state interpreter: tracks the CTM, the text and line matrices, the
/// current font and the pen advance, and turns shown strings into tokens.
/// Runs that touch on a baseline become one token; a gap of a column or
/// more starts a new one.
struct TextWalker<'a> {
    page_height: f64,
    fonts: BTreeMap<Vec<u8>, FontInfo<'a>>,
    font: Option<Vec<u8>>,
    font_size: f64,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f64,
    tokens: Vec<PdfToken>,
    /// User-space x where the last token ends.
    last_end: f64,
}

impl<'a> TextWalker<'a> {
    fn new(page_height: f64, fonts: BTreeMap<Vec<u8>, FontInfo<'a>>) -> Self {
        Self {
            page_height,
            fonts,
            font: None,
            font_size: 1.0,
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            leading: 0.0,
            tokens: Vec::new(),
            last_end: 0.0,
        }
    }

    fn apply(&mut self, op: &Operation) {
        let nums: Vec<f64> = op.operands.iter().filter_map(number).collect();
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" if nums.len() == 6 => {
                let m = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                self.ctm = multiply(&m, &self.ctm);
            }
            "BT" => {
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "Tf" => {
                self.font = op
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .map(<[u8]>::to_vec);
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.font_size = size;
                }
            }
            "Tm" if nums.len() == 6 => {
                self.tlm = [nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]];
                self.tm = self.tlm;
            }
            "Td" if nums.len() == 2 => self.next_line(nums[0], nums[1]),
            "TD" if nums.len() == 2 => {
                self.leading = -nums[1];
                self.next_line(nums[0], nums[1]);
            }
            "TL" if nums.len() == 1 => self.leading = nums[0],
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => {
                if let Some(text) = op.operands.first() {
                    self.show(text);
                }
            }
            "'" => {
                self.next_line(0.0, -self.leading);
                if let Some(text) = op.operands.first() {
                    self.show(text);
                }
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                if let Some(text) = op.operands.get(2) {
                    self.show(text);
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = op.operands.first() {
                    for part in parts {
                        match number(part) {
                            Some(adjust) => self.advance(-adjust),
                            None => self.show(part),
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = translate(&self.tlm, tx, ty);
        self.tm = self.tlm;
    }

    /// Move the pen along the baseline by `width` thousandths of an em.
    fn advance(&mut self, width: f64) {
        self.tm = translate(&self.tm, width / 1000.0 * self.font_size, 0.0);
    }

    fn show(&mut self, obj: &Object) {
        let Object::String(bytes, _) = obj else {
            return;
        };
        let font = self.font.as_ref().and_then(|name| self.fonts.get(name));
        let text = match font {
            Some(font) => font.decode(obj, bytes),
            None => lopdf::decode_text_string(obj).ok(),
        };
        let width = font.map_or(DEFAULT_GLYPH_WIDTH * bytes.len() as f64, |f| f.advance(bytes));

        let start = multiply(&self.tm, &self.ctm);
        self.advance(width);
        let end = multiply(&self.tm, &self.ctm);

        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            self.emit(text, &start, &end);
        }
    }

    fn emit(&mut self, text: String, start: &Matrix, end: &Matrix) {
        let x = round2(start[4]);
        let y = round2(self.page_height - start[5]);
        let em = match (self.font_size * start[0]).abs() {
            s if s > 0.0 => s,
            _ => self.font_size.abs().max(1.0),
        };

        if let Some(last) = self.tokens.last_mut() {
            let gap = x - self.last_end;
            if last.y == y && gap > -0.1 * em && gap < COLUMN_GAP_EM * em {
                if gap > WORD_GAP_EM * em && !last.value.ends_with(' ') {
                    last.value.push(' ');
                }
                last.value.push_str(&text);
                self.last_end = round2(end[4]);
                return;
            }
        }

        self.tokens.push(PdfToken { value: text, x, y });
        self.last_end = round2(end[4]);
    }
}

fn round2(v: f64) -> f64 {
    (v * Y_PRECISION).round() / Y_PRECISION
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Content;
    use lopdf::{dictionary, Stream, StringFormat};

    const TO_UNICODE: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
/Ordering (UCS)
/Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
3 beginbfchar
<0024> <0041>
<0025> <0042>
<0026> <0043>
endbfchar
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

    fn text_op(x: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    fn build_pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let cmap_id = doc.add_object(Stream::new(dictionary! {}, TO_UNICODE.as_bytes().to_vec()));
        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "BankSans",
            "DW" => 600,
        });
        let type0_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "BankSans",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![cid_font_id.into()],
            "ToUnicode" => cmap_id,
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id, "F2" => type0_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 600.into(), 800.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn values(line: &PdfLine) -> Vec<&str> {
        line.iter().map(|t| t.value.as_str()).collect()
    }

    #[test]
    fn groups_tokens_into_lines_top_to_bottom_and_left_to_right() {
        let mut ops = Vec::new();
        // Lower line first in the stream, and right column before left.
        ops.extend(text_op(300, 600, "250.00"));
        ops.extend(text_op(50, 600, "02/01/2024"));
        ops.extend(text_op(50, 700, "Statement of Account"));

        let pages = read_pdf(&build_pdf(ops)).unwrap();
        assert_eq!(pages.len(), 1);

        let lines = &pages[0];
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][0].value, "Statement of Account");
        assert_eq!(lines[0][0].y, 100.0);

        assert_eq!(values(&lines[1]), ["02/01/2024", "250.00"]);
        assert_eq!(lines[1][0].x, 50.0);
        assert_eq!(lines[1][1].y, 200.0);
    }

    #[test]
    fn identity_h_text_is_decoded_through_to_unicode() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F2".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    vec![0x00, 0x24, 0x00, 0x25, 0x00, 0x26],
                    StringFormat::Hexadecimal,
                )],
            ),
            Operation::new("ET", vec![]),
        ];

        let pages = read_pdf(&build_pdf(ops)).unwrap();
        assert_eq!(pages[0].len(), 1);
        assert_eq!(values(&pages[0][0]), ["ABC"]);
    }

    #[test]
    fn consecutive_runs_split_at_column_gaps() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("02/01")]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::Integer(-3000),
                    Object::string_literal("CASH"),
                    Object::Integer(-400),
                    Object::string_literal("DEP"),
                    Object::Integer(-20),
                    Object::string_literal("OSIT"),
                    Object::Integer(-3000),
                    Object::string_literal("500.00"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];

        let pages = read_pdf(&build_pdf(ops)).unwrap();
        let line = &pages[0][0];
        assert_eq!(values(line), ["02/01", "CASH DEPOSIT", "500.00"]);
        // 5 glyphs at half an em, then a 3 em gap, at 10pt.
        assert_eq!(line[1].x, 105.0);
    }

    #[test]
    fn touching_runs_form_one_token() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("SAL")]),
            Operation::new("Tj", vec![Object::string_literal("ARY")]),
            Operation::new("ET", vec![]),
        ];

        let pages = read_pdf(&build_pdf(ops)).unwrap();
        assert_eq!(values(&pages[0][0]), ["SALARY"]);
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        assert!(matches!(read_pdf(b"%PDF-nope"), Err(ReadError::Pdf(_))));
    }
}
