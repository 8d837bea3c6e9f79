//! Output serialization
//!
//! Replays rendered pages into a multi-page PDF with lopdf, or writes
//! extracted text lines to a stream.

use crate::error::{Error, Result};
use crate::fonts::{EmbeddedFont, FontFace};
use crate::geometry::Rect;
use crate::image_source::{ImageFilter, PageImage};
use crate::model::ElementKind;
use crate::render::{box_color, text_color, DrawCommand, RenderedPage};
use log::{debug, info};
use lopdf::{
    content::{Content, Operation},
    Dictionary, Document, Object, ObjectId, Stream,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const FONT_RESOURCE: &str = "F1";
const IMAGE_RESOURCE: &str = "Im0";

/// Bounding box outline width, in PDF points.
const BOX_LINE_WIDTH: f32 = 0.1;

/// Text render mode 3: neither fill nor stroke.
const INVISIBLE_TEXT: i64 = 3;

/// Builds a PDF one page at a time.
pub struct PdfSerializer {
    document: Document,
    font: FontFace,
    font_id: ObjectId,
    pages_id: ObjectId,
    /// Image XObjects already written, so a repeated image is stored once.
    images: HashMap<PathBuf, ObjectId>,
    page_count: usize,
}

impl PdfSerializer {
    pub fn new(font: FontFace) -> Result<Self> {
        let mut document = Document::with_version("1.5");

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Kids", Object::Array(vec![]));
        pages_dict.set("Count", Object::Integer(0));
        let pages_id = document.add_object(Object::Dictionary(pages_dict));

        let mut info_dict = Dictionary::new();
        info_dict.set("Producer", Object::string_literal("hocr-pdf"));
        info_dict.set("Creator", Object::string_literal("hocr-converter"));
        let info_id = document.add_object(Object::Dictionary(info_dict));

        let mut catalog_dict = Dictionary::new();
        catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog_dict.set("Pages", Object::Reference(pages_id));
        let catalog_id = document.add_object(Object::Dictionary(catalog_dict));

        document.trailer.set("Root", Object::Reference(catalog_id));
        document.trailer.set("Info", Object::Reference(info_id));

        let font_id = match &font {
            FontFace::Builtin { base_font } => add_builtin_font(&mut document, base_font),
            FontFace::Embedded(embedded) => add_embedded_font(&mut document, embedded),
        };

        Ok(Self {
            document,
            font,
            font_id,
            pages_id,
            images: HashMap::new(),
            page_count: 0,
        })
    }

    /// Append one page, replaying its commands in order.
    pub fn add_page(&mut self, page: &RenderedPage) -> Result<()> {
        let (sx, sy) = page.scale;
        let mut content = Content { operations: Vec::new() };

        content.operations.push(Operation::new("q", vec![]));
        content.operations.push(Operation::new(
            "cm",
            vec![
                Object::Real(sx),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(sy),
                Object::Real(0.0),
                Object::Real(0.0),
            ],
        ));

        // Line width is given in points; the content is drawn in hOCR units.
        let line_width = BOX_LINE_WIDTH / sx.max(f32::EPSILON);
        let mut has_image = false;
        for command in &page.commands {
            match command {
                DrawCommand::Image { rect } => {
                    if page.image.is_none() {
                        continue;
                    }
                    has_image = true;
                    content.operations.push(Operation::new("q", vec![]));
                    content.operations.push(Operation::new(
                        "cm",
                        vec![
                            Object::Real(rect.width),
                            Object::Real(0.0),
                            Object::Real(0.0),
                            Object::Real(rect.height),
                            Object::Real(rect.x),
                            Object::Real(rect.y),
                        ],
                    ));
                    content.operations.push(Operation::new(
                        "Do",
                        vec![Object::Name(IMAGE_RESOURCE.as_bytes().to_vec())],
                    ));
                    content.operations.push(Operation::new("Q", vec![]));
                }
                DrawCommand::Rectangle { rect, kind } => {
                    let (r, g, b) = box_color(*kind);
                    content.operations.push(Operation::new("q", vec![]));
                    content
                        .operations
                        .push(Operation::new("w", vec![Object::Real(line_width)]));
                    content.operations.push(Operation::new(
                        "RG",
                        vec![Object::Real(r), Object::Real(g), Object::Real(b)],
                    ));
                    content.operations.push(Operation::new(
                        "re",
                        vec![
                            Object::Real(rect.x),
                            Object::Real(rect.y),
                            Object::Real(rect.width),
                            Object::Real(rect.height),
                        ],
                    ));
                    content.operations.push(Operation::new("S", vec![]));
                    content.operations.push(Operation::new("Q", vec![]));
                }
                DrawCommand::Text {
                    rect,
                    text,
                    font_size,
                    visible,
                    kind,
                } => {
                    self.add_text_run(&mut content, rect, text, *font_size, *visible, *kind);
                }
            }
        }

        content.operations.push(Operation::new("Q", vec![]));

        let page_id = self.document.new_object_id();
        let (media_w, media_h) = page.media_box();

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(self.pages_id));
        let image = if has_image { page.image.as_ref() } else { None };
        let resources = self.create_resources_dict(image);
        page_dict.set("Resources", resources);
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(media_w),
                Object::Real(media_h),
            ]),
        );

        let content_stream = Stream::new(Dictionary::new(), content.encode()?);
        let content_id = self.document.add_object(content_stream);
        page_dict.set("Contents", Object::Reference(content_id));

        self.document
            .objects
            .insert(page_id, Object::Dictionary(page_dict));
        self.add_page_to_tree(page_id)?;
        self.page_count += 1;

        debug!(
            "page {} added: {:.1}x{:.1} pt, {} operation(s)",
            page.number,
            media_w,
            media_h,
            page.commands.len()
        );
        Ok(())
    }

    fn add_text_run(
        &self,
        content: &mut Content,
        rect: &Rect,
        text: &str,
        font_size: f32,
        visible: bool,
        kind: ElementKind,
    ) {
        let size = if font_size > 0.0 { font_size } else { 1.0 };
        let measured = self.font.measure(text, size);
        let horizontal_scale = if measured > 0.0 && rect.width > 0.0 {
            rect.width / measured * 100.0
        } else {
            100.0
        };

        content.operations.push(Operation::new("BT", vec![]));
        content.operations.push(Operation::new(
            "Tf",
            vec![
                Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                Object::Real(size),
            ],
        ));
        if visible {
            let (r, g, b) = text_color(kind);
            content.operations.push(Operation::new(
                "rg",
                vec![Object::Real(r), Object::Real(g), Object::Real(b)],
            ));
        } else {
            content
                .operations
                .push(Operation::new("Tr", vec![Object::Integer(INVISIBLE_TEXT)]));
        }
        content
            .operations
            .push(Operation::new("Tz", vec![Object::Real(horizontal_scale)]));
        content.operations.push(Operation::new(
            "Tm",
            vec![
                Object::Real(1.0),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(1.0),
                Object::Real(rect.x),
                Object::Real(rect.y),
            ],
        ));
        content
            .operations
            .push(Operation::new("Tj", vec![self.font.encode(text)]));
        content.operations.push(Operation::new("ET", vec![]));
    }

    fn create_resources_dict(&mut self, image: Option<&PageImage>) -> Object {
        let mut resources = Dictionary::new();

        let mut font_dict = Dictionary::new();
        font_dict.set(FONT_RESOURCE, Object::Reference(self.font_id));
        resources.set("Font", Object::Dictionary(font_dict));

        if let Some(image) = image {
            let image_id = match self.images.get(&image.path).copied() {
                Some(id) => id,
                None => {
                    let id = self.document.add_object(image_xobject(image));
                    self.images.insert(image.path.clone(), id);
                    id
                }
            };
            let mut xobjects = Dictionary::new();
            xobjects.set(IMAGE_RESOURCE, Object::Reference(image_id));
            resources.set("XObject", Object::Dictionary(xobjects));
        }

        Object::Dictionary(resources)
    }

    fn add_page_to_tree(&mut self, page_id: ObjectId) -> Result<()> {
        let pages_obj = self.document.get_object_mut(self.pages_id)?;
        if let Object::Dictionary(ref mut pages_dict) = pages_obj {
            let kids = pages_dict.get_mut(b"Kids")?.as_array_mut()?;
            kids.push(Object::Reference(page_id));
            let count = kids.len() as i64;
            pages_dict.set("Count", Object::Integer(count));
            Ok(())
        } else {
            Err(Error::Pdf("Pages object is not a dictionary".to_string()))
        }
    }

    /// Finalize and write the document. Fails when no page was added.
    pub fn finish<W: Write>(mut self, writer: &mut W) -> Result<()> {
        if self.page_count == 0 {
            return Err(Error::EmptyDocument);
        }
        self.document.compress();
        self.document.save_to(writer)?;
        info!("wrote PDF with {} page(s)", self.page_count);
        Ok(())
    }

    /// Finalize into memory, then write `path`. The file is only created on success.
    pub fn save(self, path: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        self.finish(&mut bytes)?;
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }
}

fn add_builtin_font(document: &mut Document, base_font: &str) -> ObjectId {
    let mut font_dict = Dictionary::new();
    font_dict.set("Type", Object::Name(b"Font".to_vec()));
    font_dict.set("Subtype", Object::Name(b"Type1".to_vec()));
    font_dict.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    font_dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    document.add_object(Object::Dictionary(font_dict))
}

/// Type0 font with a CIDFontType2 descendant, Identity-H encoded.
fn add_embedded_font(document: &mut Document, embedded: &EmbeddedFont) -> ObjectId {
    let base_font_name = embedded.name.clone();

    let mut font_stream_dict = Dictionary::new();
    font_stream_dict.set("Length1", Object::Integer(embedded.data.len() as i64));
    let font_stream_id =
        document.add_object(Stream::new(font_stream_dict, embedded.data.clone()));

    let metrics = embedded.pdf_metrics();
    let mut font_descriptor = Dictionary::new();
    font_descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
    font_descriptor.set("FontName", Object::Name(base_font_name.clone().into_bytes()));
    font_descriptor.set("Flags", Object::Integer(4));
    font_descriptor.set(
        "FontBBox",
        Object::Array(metrics.bbox.iter().map(|v| Object::Real(*v)).collect()),
    );
    font_descriptor.set("ItalicAngle", Object::Integer(0));
    font_descriptor.set("Ascent", Object::Real(metrics.ascent));
    font_descriptor.set("Descent", Object::Real(metrics.descent));
    font_descriptor.set("CapHeight", Object::Real(metrics.cap_height));
    font_descriptor.set("StemV", Object::Integer(80));
    font_descriptor.set("FontFile2", Object::Reference(font_stream_id));
    let font_descriptor_id = document.add_object(Object::Dictionary(font_descriptor));

    let cid_to_gid_map_id = document.add_object(cid_to_gid_map_stream(embedded));

    let mut system_info = Dictionary::new();
    system_info.set("Registry", Object::string_literal("Adobe"));
    system_info.set("Ordering", Object::string_literal("Identity"));
    system_info.set("Supplement", Object::Integer(0));

    let mut cidfont = Dictionary::new();
    cidfont.set("Type", Object::Name(b"Font".to_vec()));
    cidfont.set("Subtype", Object::Name(b"CIDFontType2".to_vec()));
    cidfont.set("BaseFont", Object::Name(base_font_name.clone().into_bytes()));
    cidfont.set("CIDSystemInfo", Object::Dictionary(system_info));
    cidfont.set("FontDescriptor", Object::Reference(font_descriptor_id));
    cidfont.set("DW", Object::Real(metrics.default_width));
    cidfont.set("W", widths_array(&metrics.widths));
    cidfont.set("CIDToGIDMap", Object::Reference(cid_to_gid_map_id));
    let cidfont_id = document.add_object(Object::Dictionary(cidfont));

    let tounicode_id = document.add_object(identity_tounicode_cmap_stream());

    let mut type0 = Dictionary::new();
    type0.set("Type", Object::Name(b"Font".to_vec()));
    type0.set("Subtype", Object::Name(b"Type0".to_vec()));
    type0.set("BaseFont", Object::Name(base_font_name.into_bytes()));
    type0.set("Encoding", Object::Name(b"Identity-H".to_vec()));
    type0.set(
        "DescendantFonts",
        Object::Array(vec![Object::Reference(cidfont_id)]),
    );
    type0.set("ToUnicode", Object::Reference(tounicode_id));
    document.add_object(Object::Dictionary(type0))
}

/// `/W` array grouping consecutive CIDs: `[c [w1 w2 ...] c' [...] ...]`.
fn widths_array(widths: &[(u16, f32)]) -> Object {
    let mut array = Vec::new();
    let mut run: Vec<Object> = Vec::new();
    let mut run_start: Option<u16> = None;
    let mut previous = 0u16;

    for &(cid, width) in widths {
        match run_start {
            Some(_) if previous.checked_add(1) == Some(cid) => {}
            Some(start) => {
                array.push(Object::Integer(start as i64));
                array.push(Object::Array(std::mem::take(&mut run)));
                run_start = Some(cid);
            }
            None => run_start = Some(cid),
        }
        run.push(Object::Real(width));
        previous = cid;
    }
    if let Some(start) = run_start {
        array.push(Object::Integer(start as i64));
        array.push(Object::Array(run));
    }
    Object::Array(array)
}

/// CID (BMP code point) to glyph index, two bytes per CID.
fn cid_to_gid_map_stream(embedded: &EmbeddedFont) -> Stream {
    let mut map = vec![0u8; 65536 * 2];
    for cid in 0u32..=0xFFFF {
        if let Some(ch) = char::from_u32(cid) {
            let gid = embedded.font.lookup_glyph_index(ch);
            let offset = (cid as usize) * 2;
            map[offset] = (gid >> 8) as u8;
            map[offset + 1] = (gid & 0xFF) as u8;
        }
    }
    Stream::new(Dictionary::new(), map)
}

fn identity_tounicode_cmap_stream() -> Stream {
    let cmap = b"/CIDInit /ProcSet findresource begin
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
1 beginbfrange
<0000> <FFFF> <0000>
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end"
    .to_vec();
    Stream::new(Dictionary::new(), cmap)
}

fn image_xobject(image: &PageImage) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(image.width as i64));
    dict.set("Height", Object::Integer(image.height as i64));
    dict.set(
        "ColorSpace",
        Object::Name(image.color_space.pdf_name().to_vec()),
    );
    dict.set("BitsPerComponent", Object::Integer(8));
    let filter: &[u8] = match image.filter {
        ImageFilter::Dct => b"DCTDecode",
        ImageFilter::Flate => b"FlateDecode",
    };
    dict.set("Filter", Object::Name(filter.to_vec()));
    // Already encoded; keep lopdf from compressing it again.
    Stream::new(dict, image.data.clone()).with_compression(false)
}

/// Serialize rendered pages as one PDF, in the given order.
pub fn serialize_pdf<W: Write>(pages: &[RenderedPage], font: FontFace, writer: &mut W) -> Result<()> {
    if pages.is_empty() {
        return Err(Error::EmptyDocument);
    }
    let mut serializer = PdfSerializer::new(font)?;
    for page in pages {
        serializer.add_page(page)?;
    }
    serializer.finish(writer)
}

/// Write text lines to `writer` in order.
pub fn serialize_text<I, W>(lines: I, writer: &mut W) -> Result<()>
where
    I: IntoIterator<Item = String>,
    W: Write,
{
    let mut count = 0usize;
    for line in lines {
        writer.write_all(line.as_bytes())?;
        count += 1;
    }
    writer.flush()?;
    info!("wrote {} text line(s)", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PageSizeSource;

    fn page(number: u32, text: &str) -> RenderedPage {
        RenderedPage {
            number,
            width: 1000.0,
            height: 1500.0,
            size_source: PageSizeSource::Declared,
            scale: (0.24, 0.24),
            image: None,
            commands: vec![
                DrawCommand::Rectangle {
                    rect: Rect::new(10.0, 1460.0, 50.0, 20.0),
                    kind: ElementKind::Word,
                },
                DrawCommand::Text {
                    rect: Rect::new(10.0, 1460.0, 50.0, 20.0),
                    text: text.to_string(),
                    font_size: 20.0,
                    visible: false,
                    kind: ElementKind::Word,
                },
            ],
        }
    }

    fn page_operators(doc: &Document, page_id: ObjectId) -> Vec<String> {
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content)
            .unwrap()
            .operations
            .into_iter()
            .map(|op| op.operator)
            .collect()
    }

    #[test]
    fn test_pages_in_order() {
        let pages = vec![page(1, "first"), page(2, "second"), page(3, "third")];
        let mut bytes = Vec::new();
        serialize_pdf(&pages, FontFace::courier(), &mut bytes).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 3);

        for (page_id, expected) in page_ids.iter().zip(["first", "second", "third"]) {
            let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
            let shown: Vec<Vec<u8>> = content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| op.operands.first()?.as_str().ok().map(|s| s.to_vec()))
                .collect();
            assert_eq!(shown, vec![expected.as_bytes().to_vec()]);
        }
    }

    #[test]
    fn test_invisible_text_and_box() {
        let mut bytes = Vec::new();
        serialize_pdf(&[page(1, "Hello")], FontFace::courier(), &mut bytes).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();

        let ops = page_operators(&doc, page_id);
        assert_eq!(
            ops,
            vec![
                "q", "cm", "q", "w", "RG", "re", "S", "Q", "BT", "Tf", "Tr", "Tz", "Tm", "Tj",
                "ET", "Q"
            ]
        );

        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let tr = content.operations.iter().find(|op| op.operator == "Tr").unwrap();
        assert_eq!(tr.operands[0].as_i64().unwrap(), INVISIBLE_TEXT);
    }

    #[test]
    fn test_visible_text_has_fill_colour() {
        let mut rendered = page(1, "Hello");
        if let DrawCommand::Text { visible, .. } = &mut rendered.commands[1] {
            *visible = true;
        }
        let mut bytes = Vec::new();
        serialize_pdf(&[rendered], FontFace::courier(), &mut bytes).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let ops = page_operators(&doc, page_id);
        assert!(ops.contains(&"rg".to_string()));
        assert!(!ops.contains(&"Tr".to_string()));
    }

    #[test]
    fn test_zero_pages_fail() {
        let mut bytes = Vec::new();
        let err = serialize_pdf(&[], FontFace::courier(), &mut bytes).unwrap_err();
        assert!(matches!(err, Error::EmptyDocument));
        assert!(bytes.is_empty());

        let serializer = PdfSerializer::new(FontFace::courier()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        assert!(matches!(serializer.save(&path), Err(Error::EmptyDocument)));
        assert!(!path.exists());
    }

    #[test]
    fn test_degenerate_text_run() {
        let mut rendered = page(1, "x");
        rendered.commands = vec![DrawCommand::Text {
            rect: Rect::new(5.0, 5.0, 0.0, 0.0),
            text: "x".to_string(),
            font_size: 0.0,
            visible: false,
            kind: ElementKind::Word,
        }];
        let mut bytes = Vec::new();
        serialize_pdf(&[rendered], FontFace::courier(), &mut bytes).unwrap();
        assert!(Document::load_mem(&bytes).is_ok());
    }

    #[test]
    fn test_widths_array_groups_consecutive_cids() {
        let widths = [(32u16, 250.0), (33, 300.0), (65, 600.0), (66, 610.0), (67, 620.0)];
        let expected = Object::Array(vec![
            Object::Integer(32),
            Object::Array(vec![Object::Real(250.0), Object::Real(300.0)]),
            Object::Integer(65),
            Object::Array(vec![
                Object::Real(600.0),
                Object::Real(610.0),
                Object::Real(620.0),
            ]),
        ]);
        assert_eq!(widths_array(&widths), expected);
        assert_eq!(widths_array(&[]), Object::Array(vec![]));
    }

    #[test]
    fn test_repeated_image_is_stored_once() {
        use crate::image_source::ImageColorSpace;

        let scan = PageImage {
            path: "scan.png".into(),
            width: 1,
            height: 1,
            dpi: None,
            color_space: ImageColorSpace::Gray,
            filter: ImageFilter::Flate,
            data: vec![0x78, 0x9c, 0x63, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01],
        };
        let pages: Vec<RenderedPage> = (1..=3)
            .map(|n| {
                let mut rendered = page(n, "scan");
                rendered.image = Some(scan.clone());
                rendered.commands.insert(
                    0,
                    DrawCommand::Image {
                        rect: Rect::new(0.0, 0.0, 1000.0, 1500.0),
                    },
                );
                rendered
            })
            .collect();

        let mut bytes = Vec::new();
        serialize_pdf(&pages, FontFace::courier(), &mut bytes).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let image_refs: Vec<ObjectId> = doc
            .get_pages()
            .values()
            .map(|page_id| {
                let page = doc.get_object(*page_id).unwrap().as_dict().unwrap();
                let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
                let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
                xobjects.get(b"Im0").unwrap().as_reference().unwrap()
            })
            .collect();
        assert_eq!(image_refs.len(), 3);
        assert!(image_refs.iter().all(|id| *id == image_refs[0]));
    }

    #[test]
    fn test_serialize_text() {
        let mut out = Vec::new();
        serialize_text(vec!["a b\n".to_string(), "c\n".to_string()], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a b\nc\n");
    }
}
