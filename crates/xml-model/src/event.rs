//! Forward-only element/attribute/text events over XML input

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::{Error, Result};
use crate::name::{Attribute, Element, QName, XMLNS_NAMESPACE};

/// One normalized input event.
///
/// Self-closing tags are reported as a start event immediately followed by the
/// matching end event, so consumers never need to distinguish the two forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Start of an element, with its attributes already resolved
    StartElement(Element),
    /// End of the most recently started element
    EndElement(QName),
    /// Character data (text and CDATA sections, entities already expanded)
    Text(String),
}

/// Pull reader turning XML text into [`SourceEvent`]s.
///
/// Comments, processing instructions, the XML declaration and DOCTYPE are
/// skipped.
pub struct EventReader<'a> {
    reader: NsReader<&'a [u8]>,
    open: Vec<QName>,
    pending_end: Option<QName>,
    finished: bool,
}

impl<'a> EventReader<'a> {
    /// Create a reader over an XML string
    pub fn from_str(xml: &'a str) -> Self {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            open: Vec::new(),
            pending_end: None,
            finished: false,
        }
    }

    /// Current element nesting depth
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Read the next event, `None` once the document is exhausted
    pub fn next_event(&mut self) -> Result<Option<SourceEvent>> {
        if let Some(name) = self.pending_end.take() {
            self.open.pop();
            return Ok(Some(SourceEvent::EndElement(name)));
        }
        if self.finished {
            return Ok(None);
        }

        loop {
            let (resolved, event) = self
                .reader
                .read_resolved_event()
                .map_err(|e| Error::xml_parse(e.to_string()))?;
            let namespace = resolve_namespace(resolved, "element")?;

            match event {
                Event::Start(start) => {
                    let element = self.element(namespace, &start)?;
                    self.open.push(element.name.clone());
                    return Ok(Some(SourceEvent::StartElement(element)));
                }
                Event::Empty(start) => {
                    let element = self.element(namespace, &start)?;
                    self.open.push(element.name.clone());
                    self.pending_end = Some(element.name.clone());
                    return Ok(Some(SourceEvent::StartElement(element)));
                }
                Event::End(_) => {
                    let name = self
                        .open
                        .pop()
                        .ok_or_else(|| Error::xml_parse("end tag without a matching start tag"))?;
                    return Ok(Some(SourceEvent::EndElement(name)));
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| Error::xml_parse(e.to_string()))?;
                    if !text.is_empty() {
                        return Ok(Some(SourceEvent::Text(text.into_owned())));
                    }
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(&cdata).into_owned();
                    if !text.is_empty() {
                        return Ok(Some(SourceEvent::Text(text)));
                    }
                }
                Event::Eof => {
                    self.finished = true;
                    if let Some(unclosed) = self.open.last() {
                        return Err(Error::xml_parse(format!(
                            "unexpected end of input inside <{}>",
                            unclosed.qualified()
                        )));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    fn element(&self, namespace: Option<String>, start: &BytesStart<'_>) -> Result<Element> {
        let name = start.name();
        let prefix = name.prefix().map(|p| utf8(p.as_ref())).transpose()?;
        let local = utf8(start.local_name().as_ref())?;

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::xml_parse(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| Error::xml_parse(e.to_string()))?
                .into_owned();
            let raw = utf8(attr.key.as_ref())?;

            let attr_name = if raw == "xmlns" {
                QName::namespaced(XMLNS_NAMESPACE, "xmlns", None)
            } else if let Some(declared) = raw.strip_prefix("xmlns:") {
                QName::namespaced(XMLNS_NAMESPACE, declared, Some("xmlns".to_string()))
            } else {
                let (resolved, attr_local) = self.reader.resolve_attribute(attr.key);
                let attr_ns = resolve_namespace(resolved, "attribute")?;
                let attr_prefix = attr.key.prefix().map(|p| utf8(p.as_ref())).transpose()?;
                QName {
                    namespace: attr_ns,
                    local: utf8(attr_local.as_ref())?,
                    prefix: attr_prefix,
                }
            };
            attributes.push(Attribute::new(attr_name, value));
        }

        Ok(Element {
            name: QName {
                namespace,
                local,
                prefix,
            },
            attributes,
        })
    }
}

impl Iterator for EventReader<'_> {
    type Item = Result<SourceEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn resolve_namespace(resolved: ResolveResult<'_>, what: &str) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref())?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::UnboundPrefix(format!(
            "{} (on {})",
            String::from_utf8_lossy(&prefix),
            what
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::xml_parse(e.to_string()))
}
