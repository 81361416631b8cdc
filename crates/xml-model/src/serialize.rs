//! Writing structured content events back out as XML

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Error, Result};
use crate::name::{Element, QName};

/// One unit of output content
#[derive(Debug, Clone, Copy)]
pub enum ContentEvent<'a> {
    StartElement(&'a Element),
    EndElement(&'a QName),
    Text(&'a str),
}

/// Serializes [`ContentEvent`]s to XML text.
///
/// A start tag is held back until the next event arrives, so an element with
/// no content is always written as `<x/>` no matter how it was read.
pub struct XmlSerializer {
    writer: Writer<Vec<u8>>,
    pending: Option<BytesStart<'static>>,
}

impl XmlSerializer {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            pending: None,
        }
    }

    /// Write one content event
    pub fn write(&mut self, event: &ContentEvent<'_>) -> Result<()> {
        match event {
            ContentEvent::StartElement(element) => {
                self.flush_pending()?;
                let mut start = BytesStart::new(element.name.qualified());
                for attr in &element.attributes {
                    let key = attr.name.qualified();
                    start.push_attribute((key.as_str(), attr.value.as_str()));
                }
                self.pending = Some(start);
            }
            ContentEvent::EndElement(name) => match self.pending.take() {
                Some(start) => self.emit(Event::Empty(start))?,
                None => self.emit(Event::End(BytesEnd::new(name.qualified())))?,
            },
            ContentEvent::Text(text) => {
                if !text.is_empty() {
                    self.flush_pending()?;
                    self.emit(Event::Text(BytesText::new(text)))?;
                }
            }
        }
        Ok(())
    }

    /// Close a start tag that is still waiting for content
    pub fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.emit(Event::Start(start))?;
        }
        Ok(())
    }

    /// Bytes written so far, excluding a pending start tag
    pub fn as_bytes(&self) -> &[u8] {
        self.writer.get_ref()
    }

    /// Finish and return the serialized text
    pub fn into_string(mut self) -> Result<String> {
        self.flush_pending()?;
        String::from_utf8(self.writer.into_inner()).map_err(|e| Error::serialize(e.to_string()))
    }

    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::serialize(e.to_string()))
    }
}

impl Default for XmlSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for XmlSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSerializer")
            .field("written", &self.as_bytes().len())
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Attribute;

    #[test]
    fn empty_elements_are_self_closed() {
        let a = Element::new(QName::local("a"));
        let mut b = Element::new(QName::local("b"));
        b.attributes.push(Attribute::new(QName::local("x"), "1 < 2"));

        let mut serializer = XmlSerializer::new();
        serializer.write(&ContentEvent::StartElement(&a)).unwrap();
        serializer.write(&ContentEvent::StartElement(&b)).unwrap();
        serializer.write(&ContentEvent::EndElement(&b.name)).unwrap();
        serializer.write(&ContentEvent::Text("t&t")).unwrap();
        serializer.write(&ContentEvent::EndElement(&a.name)).unwrap();

        assert_eq!(
            serializer.into_string().unwrap(),
            r#"<a><b x="1 &lt; 2"/>t&amp;t</a>"#
        );
    }
}
