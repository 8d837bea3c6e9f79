//! hOCR markup parsing
//!
//! Builds the [`Document`] tree from XHTML hOCR with `quick-xml`. Only the
//! `class` and `title` attributes matter; everything else is kept as plain
//! structure so nested text is still reachable.

use crate::error::{Error, Result};
use crate::model::{BBox, Document, Element, ElementKind, Node, Page};
use log::{debug, trace};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;

/// Elements HTML allows without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Properties read from an hOCR `title` attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleProperties {
    pub bbox: Option<BBox>,
    pub image: Option<String>,
}

fn bbox_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\bbbox\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)")
            .expect("bbox pattern is valid")
    })
}

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\b(?:image|file)\s+(?:"([^"]*)"|'([^']*)'|([^\s;"']+))"#)
            .expect("image pattern is valid")
    })
}

/// Parse the `;` separated property list of an hOCR `title`.
pub fn parse_title(title: &str) -> TitleProperties {
    let bbox = bbox_pattern().captures(title).and_then(|caps| {
        let coord = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f32>().ok());
        Some(BBox::new(coord(1)?, coord(2)?, coord(3)?, coord(4)?))
    });

    let image = image_pattern()
        .captures(title)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|path| !path.is_empty());

    TitleProperties { bbox, image }
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    let resolved = match entity {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "ensp" => "\u{2002}",
        "emsp" => "\u{2003}",
        "thinsp" => "\u{2009}",
        "shy" => "\u{ad}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "hellip" => "\u{2026}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        _ => return None,
    };
    Some(resolved)
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_ascii_lowercase()
}

fn element_from_start(start: &BytesStart<'_>, position: usize) -> Result<Element> {
    let mut element = Element::new(ElementKind::Unknown, local_name(start));

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::parse(position, e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::parse(position, e.to_string()))?;
        match attr.key.local_name().as_ref() {
            b"class" => element.kind = ElementKind::from_class_attr(&value),
            b"title" => {
                let props = parse_title(&value);
                element.bbox = props.bbox;
                element.image = props.image;
            }
            _ => {}
        }
    }

    trace!("open <{}> {:?} {:?}", element.tag, element.kind, element.bbox);
    Ok(element)
}

/// Parse hOCR markup into a [`Document`].
///
/// Fails with [`Error::Parse`] when the markup is not well formed. A well
/// formed file without `ocr_page` elements yields an empty document.
pub fn parse_document(input: &[u8]) -> Result<Document> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(false);
    reader.expand_empty_elements(true);
    // End tags are matched below so that unclosed HTML void elements are tolerated.
    reader.check_end_names(false);

    let mut stack: Vec<Element> = vec![Element::new(ElementKind::Unknown, "#document")];
    let mut saw_element = false;
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::parse(position, e.to_string()))?;

        match event {
            Event::Start(start) => {
                saw_element = true;
                let element = element_from_start(&start, position)?;
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    push_child(&mut stack, Node::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.local_name().as_ref()).to_ascii_lowercase();
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    continue;
                }
                if stack.len() < 2 {
                    return Err(Error::parse(position, format!("unexpected </{}>", name)));
                }
                let open = stack.last().map(|e| e.tag.clone()).unwrap_or_default();
                if open != name {
                    return Err(Error::parse(
                        position,
                        format!("expected </{}>, found </{}>", open, name),
                    ));
                }
                if let Some(element) = stack.pop() {
                    push_child(&mut stack, Node::Element(element));
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape_with(resolve_entity)
                    .map_err(|e| Error::parse(position, e.to_string()))?;
                if stack.len() > 1 {
                    push_child(&mut stack, Node::Text(text.into_owned()));
                } else if !text.trim().is_empty() {
                    return Err(Error::parse(position, "text outside of the root element"));
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|e| Error::parse(position, e.to_string()))?;
                push_child(&mut stack, Node::Text(text));
            }
            Event::Eof => break,
            Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) | Event::Empty(_) => {}
        }
        buf.clear();
    }

    if stack.len() > 1 {
        let open = stack.last().map(|e| e.tag.clone()).unwrap_or_default();
        return Err(Error::parse(
            reader.buffer_position(),
            format!("unexpected end of input, <{}> is not closed", open),
        ));
    }
    if !saw_element {
        return Err(Error::parse(0, "no markup found"));
    }

    let root = stack.pop().unwrap_or_else(|| Element::new(ElementKind::Unknown, "#document"));
    let mut pages = Vec::new();
    collect_pages(root, &mut pages);
    debug!("parsed {} hOCR page(s)", pages.len());
    Ok(Document::new(pages))
}

fn push_child(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

/// Move every outermost `ocr_page` element out of the tree, in document order.
fn collect_pages(root: Element, pages: &mut Vec<Page>) {
    let mut stack = vec![root];
    while let Some(mut element) = stack.pop() {
        if element.kind == ElementKind::Page {
            let number = pages.len() as u32 + 1;
            pages.push(Page::new(number, element));
            continue;
        }
        let children = std::mem::take(&mut element.children);
        stack.extend(children.into_iter().rev().filter_map(|node| match node {
            Node::Element(child) => Some(child),
            Node::Text(_) => None,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
 <head>
  <title></title>
  <meta http-equiv="Content-Type" content="text/html;charset=utf-8" />
  <meta name='ocr-system' content='tesseract' />
 </head>
 <body>
  <div class='ocr_page' id='page_1' title='image "scan 1.png"; bbox 0 0 1000 1500; ppageno 0'>
   <div class='ocr_carea' id='block_1_1' title="bbox 10 20 130 40">
    <p class='ocr_par' id='par_1_1' lang='eng' title="bbox 10 20 130 40">
     <span class='ocr_line' id='line_1_1' title="bbox 10 20 130 40; baseline 0 -5; x_size 20">
      <span class='ocrx_word' id='word_1_1' title='bbox 10 20 60 40; x_wconf 95'>Hello</span>
      <span class='ocrx_word' id='word_1_2' title='bbox 70 20 130 40; x_wconf 96'>World</span>
     </span>
    </p>
   </div>
  </div>
 </body>
</html>"#;

    #[test]
    fn test_parse_title() {
        let props = parse_title(r#"image "/tmp/my scan.png"; bbox 0 0 2480 3508; ppageno 0"#);
        assert_eq!(props.bbox, Some(BBox::new(0.0, 0.0, 2480.0, 3508.0)));
        assert_eq!(props.image.as_deref(), Some("/tmp/my scan.png"));

        let props = parse_title("bbox 1 2 3 4; file page.tif");
        assert_eq!(props.bbox, Some(BBox::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(props.image.as_deref(), Some("page.tif"));

        let props = parse_title("image 'scan.jpg'");
        assert_eq!(props.bbox, None);
        assert_eq!(props.image.as_deref(), Some("scan.jpg"));

        let props = parse_title("x_wconf 90");
        assert_eq!(props, TitleProperties::default());
    }

    #[test]
    fn test_parse_sample() {
        let doc = parse_document(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.page_count(), 1);

        let page = &doc.pages[0];
        assert_eq!(page.number, 1);
        assert_eq!(page.declared_size(), Some((1000.0, 1500.0)));
        assert_eq!(page.image(), Some("scan 1.png"));

        let words: Vec<_> = page
            .elements()
            .filter(|e| e.kind == ElementKind::Word)
            .map(|e| (e.text(), e.bbox))
            .collect();
        assert_eq!(
            words,
            vec![
                ("Hello".to_string(), Some(BBox::new(10.0, 20.0, 60.0, 40.0))),
                ("World".to_string(), Some(BBox::new(70.0, 20.0, 130.0, 40.0))),
            ]
        );

        let kinds: Vec<_> = page.elements().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ElementKind::Page,
                ElementKind::Block,
                ElementKind::Paragraph,
                ElementKind::Line,
                ElementKind::Word,
                ElementKind::Word,
            ]
        );
    }

    #[test]
    fn test_multiple_pages_in_order() {
        let html = r#"<html><body>
            <div class="ocr_page" title="bbox 0 0 10 10"><span class="ocr_line">one</span></div>
            <div class="ocr_page" title="bbox 0 0 20 20"><span class="ocr_line">two</span></div>
            <div class="ocr_page" title="bbox 0 0 30 30"><span class="ocr_line">three</span></div>
        </body></html>"#;
        let doc = parse_document(html.as_bytes()).unwrap();
        let pages: Vec<_> = doc
            .pages
            .iter()
            .map(|p| (p.number, p.root.normalized_text()))
            .collect();
        assert_eq!(
            pages,
            vec![
                (1, "one".to_string()),
                (2, "two".to_string()),
                (3, "three".to_string())
            ]
        );
    }

    #[test]
    fn test_entities_and_nested_markup() {
        let html = r#"<html><body><div class="ocr_page">
            <span class="ocrx_word">A&amp;B&nbsp;&#233;<em><strong>!</strong></em></span>
        </div></body></html>"#;
        let doc = parse_document(html.as_bytes()).unwrap();
        let word = doc.pages[0]
            .elements()
            .find(|e| e.kind == ElementKind::Word)
            .unwrap();
        assert_eq!(word.text(), "A&B\u{a0}\u{e9}!");
    }

    #[test]
    fn test_unclosed_void_elements_are_tolerated() {
        let html = r#"<html><head><meta charset="utf-8"><link rel="x"></head>
            <body><div class="ocr_page" title="bbox 0 0 5 5">x<br>y</div></body></html>"#;
        let doc = parse_document(html.as_bytes()).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].root.text(), "xy");
    }

    #[test]
    fn test_no_pages_is_empty_document() {
        let doc = parse_document(b"<html><body><p>nothing here</p></body></html>").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_malformed_input() {
        let cases: [&[u8]; 5] = [
            b"<html><body><div class='ocr_page'></span></body></html>",
            b"<html><body><div class='ocr_page'>",
            b"</div>",
            b"",
            b"just some text",
        ];
        for input in cases {
            let err = parse_document(input).unwrap_err();
            assert!(matches!(err, Error::Parse { .. }), "{:?}", err);
        }
    }
}
