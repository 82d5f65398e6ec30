//! Feed document <-> XML
//!
//! ```xml
//! <productFeed version="0.1.0" timestamp="1700000000">
//!   <products count="1">
//!     <product id="42" hash="9f86d0...">
//!       <name>Desk lamp</name>
//!       <description><![CDATA[<p>Warm light</p>]]></description>
//!     </product>
//!   </products>
//! </productFeed>
//! ```

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use tracing::warn;

use crate::errors::FeedError;
use crate::models::{FeedDocument, FeedField, FeedNode};
use crate::utils::text::strip_invalid_xml_chars;

pub const ROOT_ELEMENT: &str = "productFeed";
pub const PRODUCTS_ELEMENT: &str = "products";
pub const PRODUCT_ELEMENT: &str = "product";

/// Serialize the document; the `count` attribute always reflects the nodes written
pub fn to_xml(doc: &FeedDocument) -> Result<String, FeedError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write_event(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let timestamp = doc.timestamp.to_string();
    let mut root = BytesStart::new(ROOT_ELEMENT);
    root.push_attribute(("version", doc.version.as_str()));
    root.push_attribute(("timestamp", timestamp.as_str()));
    write_event(&mut writer, Event::Start(root))?;

    let count = doc.nodes.len().to_string();
    let mut products = BytesStart::new(PRODUCTS_ELEMENT);
    products.push_attribute(("count", count.as_str()));
    write_event(&mut writer, Event::Start(products))?;

    for node in &doc.nodes {
        write_node(&mut writer, node)?;
    }

    write_event(&mut writer, Event::End(BytesEnd::new(PRODUCTS_ELEMENT)))?;
    write_event(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| FeedError::serialize(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &FeedNode) -> Result<(), FeedError> {
    let id = strip_invalid_xml_chars(&node.id);
    let mut product = BytesStart::new(PRODUCT_ELEMENT);
    product.push_attribute(("id", id.as_ref()));
    product.push_attribute(("hash", node.hash.as_str()));
    write_event(writer, Event::Start(product))?;

    for field in &node.fields {
        if field.value.is_empty() {
            write_event(writer, Event::Empty(BytesStart::new(field.name.as_str())))?;
            continue;
        }

        let value = strip_invalid_xml_chars(&field.value);
        write_event(writer, Event::Start(BytesStart::new(field.name.as_str())))?;
        if field.cdata {
            for section in cdata_sections(&value) {
                write_event(writer, Event::CData(BytesCData::new(section)))?;
            }
        } else {
            write_event(writer, Event::Text(BytesText::new(&value)))?;
        }
        write_event(writer, Event::End(BytesEnd::new(field.name.as_str())))?;
    }

    write_event(writer, Event::End(BytesEnd::new(PRODUCT_ELEMENT)))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), FeedError> {
    writer
        .write_event(event)
        .map_err(|e| FeedError::serialize(e.to_string()))
}

/// A CDATA section cannot contain `]]>`, so such values are split over
/// adjacent sections that concatenate back to the original text
fn cdata_sections(value: &str) -> Vec<String> {
    let pieces: Vec<&str> = value.split("]]>").collect();
    let last = pieces.len() - 1;
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let mut section = String::with_capacity(piece.len() + 3);
            if i > 0 {
                section.push('>');
            }
            section.push_str(piece);
            if i < last {
                section.push_str("]]");
            }
            section
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Document,
    Root,
    Products,
    Product,
    Field,
    Closed,
}

/// Parse a serialized feed; anything structurally off is an error
pub fn from_xml(xml: &str) -> Result<FeedDocument, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut level = Level::Document;
    let mut doc = FeedDocument {
        version: String::new(),
        timestamp: 0,
        nodes: Vec::new(),
    };
    let mut declared_count: Option<usize> = None;
    let mut current_node: Option<FeedNode> = None;
    let mut current_field: Option<FeedField> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FeedError::parse(format!("at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = element_name(e)?;

                match (level, name.as_str()) {
                    (Level::Document, ROOT_ELEMENT) => {
                        for (key, value) in attributes(e)? {
                            match key.as_str() {
                                "version" => doc.version = value,
                                "timestamp" => doc.timestamp = value.parse().unwrap_or(0),
                                _ => {}
                            }
                        }
                        level = if is_empty { Level::Closed } else { Level::Root };
                    }
                    (Level::Root, PRODUCTS_ELEMENT) => {
                        declared_count = attributes(e)?
                            .into_iter()
                            .find(|(key, _)| key == "count")
                            .and_then(|(_, value)| value.parse().ok());
                        if !is_empty {
                            level = Level::Products;
                        }
                    }
                    (Level::Products, PRODUCT_ELEMENT) => {
                        let mut id = None;
                        let mut hash = None;
                        for (key, value) in attributes(e)? {
                            match key.as_str() {
                                "id" => id = Some(value),
                                "hash" => hash = Some(value),
                                _ => {}
                            }
                        }
                        let (Some(id), Some(hash)) = (id, hash) else {
                            return Err(FeedError::parse("product element without id or hash"));
                        };
                        let node = FeedNode {
                            id,
                            hash,
                            fields: Vec::new(),
                        };
                        if is_empty {
                            doc.nodes.push(node);
                        } else {
                            current_node = Some(node);
                            level = Level::Product;
                        }
                    }
                    (Level::Product, _) => {
                        let field = FeedField {
                            name,
                            value: String::new(),
                            cdata: false,
                        };
                        match current_node.as_mut() {
                            Some(node) if is_empty => node.fields.push(field),
                            Some(_) => {
                                current_field = Some(field);
                                level = Level::Field;
                            }
                            None => return Err(FeedError::parse("field outside of product")),
                        }
                    }
                    (level, name) => {
                        return Err(FeedError::parse(format!(
                            "unexpected element <{name}> at {level:?}"
                        )));
                    }
                }
            }

            Event::Text(e) => {
                if let (Level::Field, Some(field)) = (level, current_field.as_mut()) {
                    let text = e
                        .unescape()
                        .map_err(|e| FeedError::parse(format!("invalid text: {e}")))?;
                    field.value.push_str(&text);
                }
            }

            Event::CData(e) => {
                if let (Level::Field, Some(field)) = (level, current_field.as_mut()) {
                    let text = std::str::from_utf8(&e)
                        .map_err(|e| FeedError::parse(format!("invalid UTF-8 in CDATA: {e}")))?;
                    field.value.push_str(text);
                    field.cdata = true;
                }
            }

            Event::End(_) => {
                level = match level {
                    Level::Field => {
                        if let (Some(node), Some(field)) = (current_node.as_mut(), current_field.take())
                        {
                            node.fields.push(field);
                        }
                        Level::Product
                    }
                    Level::Product => {
                        if let Some(node) = current_node.take() {
                            doc.nodes.push(node);
                        }
                        Level::Products
                    }
                    Level::Products => Level::Root,
                    Level::Root => Level::Closed,
                    Level::Document | Level::Closed => {
                        return Err(FeedError::parse("unbalanced closing element"));
                    }
                };
            }

            Event::Eof => break,

            _ => {} // Declarations, comments and processing instructions
        }
    }

    if level != Level::Closed {
        return Err(FeedError::parse(format!(
            "document ended inside {level:?}, file is truncated"
        )));
    }

    if let Some(count) = declared_count.filter(|count| *count != doc.nodes.len()) {
        warn!(
            "Feed declares {} products but contains {}, using the actual count",
            count,
            doc.nodes.len()
        );
    }

    Ok(doc)
}

fn element_name(element: &BytesStart<'_>) -> Result<String, FeedError> {
    std::str::from_utf8(element.name().as_ref())
        .map(str::to_string)
        .map_err(|e| FeedError::parse(format!("invalid UTF-8 in element name: {e}")))
}

fn attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>, FeedError> {
    let mut attrs = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| FeedError::parse(format!("invalid attribute: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| FeedError::parse(format!("invalid UTF-8 in attribute name: {e}")))?
            .to_string();
        let value: Cow<'_, str> = attr
            .unescape_value()
            .map_err(|e| FeedError::parse(format!("invalid attribute value: {e}")))?;
        attrs.push((key, value.into_owned()));
    }
    Ok(attrs)
}
