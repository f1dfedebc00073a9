//! Single-page PDF writer: the composed page as a DCT image, plus an
//! invisible text layer so the certificate text stays searchable.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use crate::error::RenderError;
use crate::models::Canvas;

/// Canvas pixels are CSS pixels (96 per inch)
pub const PT_PER_PX: f32 = 0.75;

/// Average Helvetica advance, in em
const HELVETICA_EM: f32 = 0.5;

const WIN_ANSI_HIGH: [(char, u8); 27] = [
    ('€', 0x80), ('‚', 0x82), ('ƒ', 0x83), ('„', 0x84), ('…', 0x85), ('†', 0x86),
    ('‡', 0x87), ('ˆ', 0x88), ('‰', 0x89), ('Š', 0x8A), ('‹', 0x8B), ('Œ', 0x8C),
    ('Ž', 0x8E), ('‘', 0x91), ('’', 0x92), ('“', 0x93), ('”', 0x94), ('•', 0x95),
    ('–', 0x96), ('—', 0x97), ('˜', 0x98), ('™', 0x99), ('š', 0x9A), ('›', 0x9B),
    ('œ', 0x9C), ('ž', 0x9E), ('Ÿ', 0x9F),
];

/// One line of the text layer, positioned in canvas pixels
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub content: String,
    /// Left edge
    pub x: f32,
    pub baseline: f32,
    /// Rendered width; the run is stretched to cover it
    pub width: f32,
    pub font_size: f32,
    pub bold: bool,
}

/// Build a one-page PDF sized exactly to `canvas`. `page_jpeg` covers the
/// whole page.
pub fn write_page(
    canvas: Canvas,
    page_jpeg: &[u8],
    runs: &[TextRun],
) -> Result<Vec<u8>, RenderError> {
    let page_w = canvas.width as f32 * PT_PER_PX;
    let page_h = canvas.height as f32 * PT_PER_PX;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(standard_font("Helvetica"));
    let bold_id = doc.add_object(standard_font("Helvetica-Bold"));

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => canvas.width as i64,
            "Height" => canvas.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        page_jpeg.to_vec(),
    );
    let image_id = doc.add_object(image);

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![page_w.into(), 0.into(), 0.into(), page_h.into(), 0.into(), 0.into()],
        ),
        Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
        Operation::new("Q", vec![]),
    ];

    if !runs.is_empty() {
        ops.push(Operation::new("BT", vec![]));
        // render mode 3: neither fill nor stroke
        ops.push(Operation::new("Tr", vec![3.into()]));
        for run in runs {
            ops.extend(text_run_ops(run, page_h));
        }
        ops.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations: ops }
        .encode()
        .map_err(|e| RenderError::PdfEncode(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page_w.into(), page_h.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => regular_id, "F2" => bold_id },
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::String(b"certforge".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::PdfEncode(e.to_string()))?;
    Ok(out)
}

fn standard_font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn text_run_ops(run: &TextRun, page_h: f32) -> Vec<Operation> {
    let font = if run.bold { "F2" } else { "F1" };
    let size_pt = run.font_size * PT_PER_PX;
    let natural = run.content.chars().count() as f32 * size_pt * HELVETICA_EM;
    let scale = if natural > 0.0 {
        (run.width * PT_PER_PX / natural * 100.0).clamp(10.0, 400.0)
    } else {
        100.0
    };

    vec![
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size_pt.into()]),
        Operation::new("Tz", vec![scale.into()]),
        Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                (run.x * PT_PER_PX).into(),
                (page_h - run.baseline * PT_PER_PX).into(),
            ],
        ),
        Operation::new(
            "Tj",
            vec![Object::String(to_win_ansi(&run.content), StringFormat::Literal)],
        ),
    ]
}

fn to_win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => WIN_ANSI_HIGH
                .iter()
                .find(|(ch, _)| *ch == c)
                .map(|(_, b)| *b)
                .unwrap_or(b'?'),
        })
        .collect()
}

fn from_win_ansi(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => WIN_ANSI_HIGH
                .iter()
                .find(|(_, code)| *code == b)
                .map(|(ch, _)| *ch)
                .unwrap_or('?'),
            _ => b as char,
        })
        .collect()
}

/// Text layer strings of every page, in content order
pub fn extract_text(pdf: &[u8]) -> Result<Vec<String>, RenderError> {
    let doc = Document::load_mem(pdf).map_err(|e| RenderError::PdfEncode(e.to_string()))?;
    let mut lines = Vec::new();

    for page_id in doc.get_pages().into_values() {
        let raw = doc
            .get_page_content(page_id)
            .map_err(|e| RenderError::PdfEncode(e.to_string()))?;
        let content =
            Content::decode(&raw).map_err(|e| RenderError::PdfEncode(e.to_string()))?;

        for op in content.operations.iter().filter(|op| op.operator == "Tj") {
            if let Some(Object::String(bytes, _)) = op.operands.first() {
                lines.push(from_win_ansi(bytes));
            }
        }
    }

    Ok(lines)
}
