//! Streaming access to a single scalar element of an XML document.
//!
//! The document is read event by event and written straight back out, so declarations,
//! comments, whitespace, attribute quoting and a leading byte-order mark survive a rewrite
//! untouched. Only the text content of the first matching element is replaced.
use quick_xml::escape::unescape;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::StoreError;

/// Root element every `vpos_state.cfg` must have.
pub const ROOT_ELEMENT: &str = "Config";

const BOM: char = '\u{feff}';

struct Pass {
    /// Unescaped text of the first `field` element, if there was one.
    found: Option<String>,
    output: Vec<u8>,
}

/// Text content of `field`, provided the document root is [`ROOT_ELEMENT`].
pub fn field_text(xml: &str, field: &str) -> Result<String, StoreError> {
    stream(xml, field, None)?
        .found
        .ok_or_else(|| StoreError::MissingField { field: field.to_string() })
}

/// Rewrite `xml` with the text of `field` replaced by `value`.
///
/// Returns the new document and the previous text of the field.
pub fn replace_field(xml: &str, field: &str, value: &str) -> Result<(String, String), StoreError> {
    let pass = stream(xml, field, Some(value))?;
    let old = pass
        .found
        .ok_or_else(|| StoreError::MissingField { field: field.to_string() })?;
    let doc = String::from_utf8(pass.output)
        .map_err(|e| StoreError::Malformed(format!("rewritten document is not UTF-8: {e}")))?;
    Ok((doc, old))
}

fn stream(xml: &str, field: &str, replacement: Option<&str>) -> Result<Pass, StoreError> {
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 16));
    let body = match xml.strip_prefix(BOM) {
        Some(rest) => {
            let mut buf = [0u8; 4];
            writer.get_mut().extend_from_slice(BOM.encode_utf8(&mut buf).as_bytes());
            rest
        }
        None => xml,
    };

    let mut reader = Reader::from_str(body);
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut found: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    enter_root(e.name().as_ref(), &mut root_seen)?;
                }
                let is_target = found.is_none() && e.name().as_ref() == field.as_bytes();
                if !is_target {
                    depth += 1;
                    writer.write_event(Event::Start(e))?;
                    continue;
                }
                let end = e.to_end().into_owned();
                writer.write_event(Event::Start(e))?;
                let (text, inner) = element_content(&mut reader, field)?;
                found = Some(text);
                match replacement {
                    // The whole inner content gives way to the new text.
                    Some(v) => writer.write_event(Event::Text(BytesText::new(v)))?,
                    None => {
                        for event in inner {
                            writer.write_event(event)?;
                        }
                    }
                }
                writer.write_event(Event::End(end))?;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    enter_root(e.name().as_ref(), &mut root_seen)?;
                }
                let is_target = found.is_none() && e.name().as_ref() == field.as_bytes();
                match (is_target, replacement) {
                    (true, Some(v)) => {
                        found = Some(String::new());
                        let end = e.to_end().into_owned();
                        writer.write_event(Event::Start(e))?;
                        writer.write_event(Event::Text(BytesText::new(v)))?;
                        writer.write_event(Event::End(end))?;
                    }
                    (true, None) => {
                        found = Some(String::new());
                        writer.write_event(Event::Empty(e))?;
                    }
                    (false, _) => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| StoreError::Malformed("unexpected closing tag".into()))?;
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    if depth != 0 {
        return Err(StoreError::Malformed("document ends inside an element".into()));
    }
    if !root_seen {
        return Err(StoreError::Malformed("no root element".into()));
    }

    Ok(Pass { found, output: writer.into_inner() })
}

/// Consume the children of a just-opened element up to and including its end tag.
///
/// Returns the element's text content (text and CDATA of all descendants, comments and
/// processing instructions skipped) along with the consumed events, end tag excluded.
fn element_content<'a>(
    reader: &mut Reader<&'a [u8]>,
    field: &str,
) -> Result<(String, Vec<Event<'a>>), StoreError> {
    let mut text = String::new();
    let mut events = Vec::new();
    let mut nested = 0usize;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Text(t) => {
                let raw = std::str::from_utf8(t)
                    .map_err(|err| StoreError::Malformed(format!("{field} is not UTF-8: {err}")))?;
                let unescaped = unescape(raw)
                    .map_err(|err| StoreError::Malformed(format!("bad escape in {field}: {err}")))?;
                text.push_str(&unescaped);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(c)),
            Event::Start(_) => nested += 1,
            Event::End(_) if nested == 0 => break,
            Event::End(_) => nested -= 1,
            Event::Eof => {
                return Err(StoreError::Malformed(format!("document ends inside <{field}>")));
            }
            _ => {}
        }
        events.push(event);
    }

    Ok((text, events))
}

fn enter_root(name: &[u8], root_seen: &mut bool) -> Result<(), StoreError> {
    if *root_seen {
        return Err(StoreError::Malformed("more than one root element".into()));
    }
    if name != ROOT_ELEMENT.as_bytes() {
        return Err(StoreError::Malformed(format!(
            "root element is <{}>, expected <{ROOT_ELEMENT}>",
            String::from_utf8_lossy(name)
        )));
    }
    *root_seen = true;
    Ok(())
}
