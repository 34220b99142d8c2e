use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, XmlError};
use crate::node::{Attrs, Node};

/// Parses one complete stanza into a [`Node`] tree. Leading whitespace and
/// declarations are skipped; anything after the root element closes is ignored.
pub fn unmarshal(data: &[u8]) -> Result<Node> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Node> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        match event {
            Event::Start(start) => stack.push(open_node(&start)?),
            Event::Empty(start) => {
                let node = open_node(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.push_child(node),
                    None => return Ok(node),
                }
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| {
                    XmlError::Malformed("closing tag without matching open".into())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.push_child(node),
                    None => return Ok(node),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    current.push_text(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.push_text(std::str::from_utf8(&data)?);
                }
            }
            Event::Eof => {
                return Err(if stack.is_empty() {
                    XmlError::EmptyDocument
                } else {
                    XmlError::UnexpectedEof
                });
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }
}

/// Parses only the first start tag of `data`, returning it as a childless node.
/// Used for the stream-open `<k ...>` which is never closed.
pub fn unmarshal_open_tag(data: &[u8]) -> Result<Node> {
    let mut reader = Reader::from_reader(data);
    loop {
        match reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
        {
            Event::Start(start) | Event::Empty(start) => return open_node(&start),
            Event::Eof => return Err(XmlError::EmptyDocument),
            _ => {}
        }
    }
}

fn open_node(start: &BytesStart<'_>) -> Result<Node> {
    let tag = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut attrs = Attrs::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        attrs.push(key, value.into_owned());
    }
    Ok(Node {
        tag,
        attrs,
        content: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::marshal;

    #[test]
    fn parses_receipt_stanza() {
        let xml = br#"<message type="receipt" id="r1" from="bob_x@talk.kik.com/CAN1">
            <receipt xmlns="kik:message:receipt" type="delivered"><msgid id="m-1"/></receipt>
        </message>"#;
        let node = unmarshal(xml).unwrap();
        assert_eq!(node.tag, "message");
        assert_eq!(node.get_attr("type"), Some("receipt"));
        let receipt = node.get_optional_child("receipt").unwrap();
        assert_eq!(receipt.get_attr("type"), Some("delivered"));
        assert_eq!(
            receipt.get_optional_child("msgid").and_then(|m| m.get_attr("id")),
            Some("m-1")
        );
    }

    #[test]
    fn unescapes_text_and_attributes() {
        let node = unmarshal(br#"<body x="&quot;q&quot;">1 &lt; 2</body>"#).unwrap();
        assert_eq!(node.get_attr("x"), Some("\"q\""));
        assert_eq!(node.text(), Some("1 < 2"));
    }

    #[test]
    fn marshal_then_parse_is_stable() {
        let xml = br#"<iq type="set" id="1"><query xmlns="kik:iq:QoS"><msg-acks/><history attach="true"/></query></iq>"#;
        let node = unmarshal(xml).unwrap();
        assert_eq!(marshal(&node).as_bytes(), &xml[..]);
    }

    #[test]
    fn reports_truncated_and_empty_input() {
        assert_eq!(unmarshal(b"<iq><query>"), Err(XmlError::UnexpectedEof));
        assert_eq!(unmarshal(b"   "), Err(XmlError::EmptyDocument));
        assert!(matches!(unmarshal(b"<a></b>"), Err(XmlError::Malformed(_))));
    }

    #[test]
    fn open_tag_ignores_missing_close() {
        let node = unmarshal_open_tag(br#"<k ok="1" ts="1700000000000">"#).unwrap();
        assert_eq!(node.tag, "k");
        assert_eq!(node.get_attr("ok"), Some("1"));
        assert_eq!(node.get_attr("ts"), Some("1700000000000"));
    }
}
