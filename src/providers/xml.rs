use quick_xml::Writer;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::io::Cursor;

use crate::core::{FelError, format_amount};

fn xml_io(e: std::io::Error) -> FelError {
    FelError::Xml(format!("XML write error: {e}"))
}

/// Compact XML writer shared by the provider serializers.
///
/// Text and attribute values go out verbatim: normalized documents are
/// already escaped (see [`crate::core::escape_value`]), and re-escaping
/// here would double the numeric references.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    /// Writer opening with a plain UTF-8 declaration.
    pub fn new() -> Result<Self, FelError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(Self { writer })
    }

    /// Writer opening with `standalone="no"`, as the eForcon template uses.
    pub fn standalone() -> Result<Self, FelError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))
            .map_err(xml_io)?;
        Ok(Self { writer })
    }

    pub fn into_string(self) -> Result<String, FelError> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| FelError::Xml(format!("XML UTF-8 error: {e}")))
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, FelError> {
        let elem = BytesStart::new(name);
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, FelError> {
        self.writer
            .write_event(Event::Start(raw_attrs(BytesStart::new(name), attrs)))
            .map_err(xml_io)?;
        Ok(self)
    }

    /// Self-closing element, used for the attribute-only SAT blocks.
    pub fn empty_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, FelError> {
        self.writer
            .write_event(Event::Empty(raw_attrs(BytesStart::new(name), attrs)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, FelError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, FelError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Write a decimal amount truncated and padded to the given precision.
    pub fn amount_element(
        &mut self,
        name: &str,
        amount: Decimal,
        precision: u32,
    ) -> Result<&mut Self, FelError> {
        self.text_element(name, &format_amount(amount, precision))
    }
}

/// Attach attributes without re-escaping their values.
fn raw_attrs<'a>(mut elem: BytesStart<'a>, attrs: &'a [(&str, &str)]) -> BytesStart<'a> {
    for (k, v) in attrs {
        elem.push_attribute(Attribute {
            key: QName(k.as_bytes()),
            value: Cow::Borrowed(v.as_bytes()),
        });
    }
    elem
}
