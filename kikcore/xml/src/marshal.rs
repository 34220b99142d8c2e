use quick_xml::escape::escape;

use crate::node::{Node, NodeContent};

/// Name of the stream root element.
pub const STREAM_ROOT: &str = "k";
/// Client-side stream termination.
pub const STREAM_CLOSE: &str = "</k>";

/// Serializes a node as compact XML with attributes in insertion order.
pub fn marshal(node: &Node) -> String {
    let mut out = String::with_capacity(128);
    marshal_to(node, &mut out);
    out
}

pub fn marshal_to(node: &Node, out: &mut String) {
    out.push('<');
    out.push_str(&node.tag);
    write_attrs(node.attrs.iter(), out);
    match &node.content {
        None => out.push_str("/>"),
        Some(NodeContent::Nodes(children)) if children.is_empty() => out.push_str("/>"),
        Some(NodeContent::Text(text)) if text.is_empty() => out.push_str("/>"),
        Some(content) => {
            out.push('>');
            match content {
                NodeContent::Text(text) => out.push_str(&escape(text.as_str())),
                NodeContent::Nodes(children) => {
                    for child in children {
                        marshal_to(child, out);
                    }
                }
            }
            out.push_str("</");
            out.push_str(&node.tag);
            out.push('>');
        }
    }
}

/// Renders the unclosed `<k ...>` tag that opens a stream. Attribute order
/// is kept exactly as given; the server checks it.
pub fn stream_open<'a, I>(attrs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::with_capacity(256);
    out.push('<');
    out.push_str(STREAM_ROOT);
    write_attrs(attrs, &mut out);
    out.push('>');
    out
}

fn write_attrs<'a, I>(attrs: I, out: &mut String)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
}
