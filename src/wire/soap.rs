//! Minimal SOAP 1.1 envelope handling and response scraping.
//!
//! Provider responses disagree on prefixes and nesting, so scraping works
//! on local element names rather than full paths.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::core::CertError;

/// Wrap a body fragment in a SOAP 1.1 envelope. Namespaces specific to
/// one service belong on the body element itself.
pub fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <soapenv:Header/><soapenv:Body>{body}</soapenv:Body></soapenv:Envelope>"
    )
}

/// Text content of the first element whose local name matches `tag`,
/// regardless of namespace prefix. Escaped text and CDATA both resolve
/// to their raw content.
pub fn scrape_tag(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    let mut value = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if local_name(e.name().as_ref()) == tag {
                    inside = true;
                    value.clear();
                }
            }
            Ok(Event::Empty(ref e)) if !inside => {
                if local_name(e.name().as_ref()) == tag {
                    return Some(String::new());
                }
            }
            Ok(Event::Text(ref e)) if inside => {
                value.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::CData(ref e)) if inside => {
                value.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::End(ref e)) => {
                if inside && local_name(e.name().as_ref()) == tag {
                    return Some(value);
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Like [`scrape_tag`], but empty or whitespace-only content counts as
/// absent.
pub fn scrape_tag_nonempty(xml: &str, tag: &str) -> Option<String> {
    scrape_tag(xml, tag).filter(|v| !v.trim().is_empty())
}

/// Collect every element named `tag` into a structured error entry.
///
/// Detail fields ride as attributes (`fuente`, `categoria`, `numeral`,
/// `validacion`); the element text is the message.
pub fn scrape_error_blocks(xml: &str, tag: &str) -> Vec<CertError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut errors = Vec::new();
    let mut current: Option<CertError> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == tag => {
                current = Some(error_from_attrs(e));
            }
            Ok(Event::Empty(ref e)) if local_name(e.name().as_ref()) == tag => {
                errors.push(error_from_attrs(e));
            }
            Ok(Event::Text(ref e)) => {
                if let Some(err) = current.as_mut() {
                    err.message.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(err) = current.as_mut() {
                    err.message.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == tag => {
                if let Some(err) = current.take() {
                    errors.push(err);
                }
            }
            Ok(Event::Eof) | Err(_) => return errors,
            _ => {}
        }
    }
}

fn error_from_attrs(e: &BytesStart<'_>) -> CertError {
    let mut error = CertError::new("");
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().unwrap_or_default().into_owned();
        match local_name(attr.key.as_ref()) {
            "fuente" => error.source = value,
            "categoria" => error.category = value,
            "numeral" => error.numeral = value,
            "validacion" => error.validation = value,
            _ => {}
        }
    }
    error
}

fn local_name(qname: &[u8]) -> &str {
    let name = std::str::from_utf8(qname).unwrap_or("");
    name.rsplit(':').next().unwrap_or(name)
}
