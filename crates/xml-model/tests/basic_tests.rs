//! Basic tests for xml-model

use pretty_assertions::assert_eq;
use xml_model::{Document, EventReader, NodeType, SourceEvent, TreeBuilder};

#[test]
fn test_document_parse_xml() {
    let doc = Document::parse("<root><item>test</item></root>").unwrap();

    // Get document element
    let root = doc.document_element().unwrap();
    assert_eq!(doc.element(root).unwrap().local_name(), "root");

    // Get children
    let children = doc.children(root);
    assert_eq!(children.len(), 1);
    assert_eq!(doc.node_type(children[0]), NodeType::Element);
    assert_eq!(doc.text_content(children[0]), "test");
}

#[test]
fn test_document_serialize() {
    let doc = Document::parse(r#"<root a="1"><item>test</item><empty></empty></root>"#).unwrap();
    assert_eq!(
        doc.serialize_document().unwrap(),
        r#"<root a="1"><item>test</item><empty/></root>"#
    );
}

#[test]
fn test_tree_builder_matches_event_stream() {
    let xml = r#"<a xmlns:c="http://c"><c:b x="1">t</c:b><b/></a>"#;
    let mut builder = TreeBuilder::new();
    let mut starts = 0;
    for event in EventReader::from_str(xml) {
        let event = event.unwrap();
        if matches!(event, SourceEvent::StartElement(_)) {
            starts += 1;
        }
        builder.push(event).unwrap();
    }
    let doc = builder.finish().unwrap();
    assert_eq!(starts, 3);

    let a = doc.document_element().unwrap();
    let b = doc.children(a)[0];
    assert_eq!(doc.element(b).unwrap().namespace(), Some("http://c"));
    assert_eq!(doc.serialize_document().unwrap(), xml);
}

#[test]
fn test_set_text_content() {
    let mut doc = Document::parse("<a><b>old<c/></b></a>").unwrap();
    let a = doc.document_element().unwrap();
    let b = doc.children(a)[0];
    doc.set_text_content(b, "new").unwrap();
    assert_eq!(doc.serialize(a).unwrap(), "<a><b>new</b></a>");
}

#[test]
fn test_malformed_input_is_rejected() {
    assert!(Document::parse("<a><b></a>").is_err());
    assert!(Document::parse("<c:a/>").is_err());
}
