//! A small namespace-aware element tree built on `quick_xml::NsReader`.
//!
//! Both document parsers need "find the first child named X" style lookups
//! rather than a streaming pass, so the document is materialised once and
//! queried by `(namespace, local name)`.

use crate::error::ParseError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local name, without any prefix.
    pub name: String,
    /// Resolved namespace URI, `None` when the element is not in a namespace.
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    /// Character data directly under this element, untrimmed.
    pub text: String,
    pub children: Vec<XmlNode>,
}

pub fn parse_document(source: &str) -> Result<XmlNode, ParseError> {
    let mut reader = NsReader::from_str(source);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_resolved_event()? {
            (resolved, Event::Start(element)) => {
                stack.push(open_node(resolved, &element)?);
            }
            (resolved, Event::Empty(element)) => {
                let node = open_node(resolved, &element)?;
                attach(&mut stack, &mut root, node);
            }
            (_, Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            (_, Event::Text(text)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape()?);
                }
            }
            (_, Event::CData(data)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::UnclosedElement(open.name));
    }

    root.ok_or(ParseError::EmptyDocument)
}

fn open_node(resolved: ResolveResult<'_>, element: &BytesStart<'_>) -> Result<XmlNode, ParseError> {
    let namespace = match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in element.attributes().flatten() {
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlNode {
        name: String::from_utf8_lossy(element.local_name().as_ref()).into_owned(),
        namespace,
        attributes,
        ..XmlNode::default()
    })
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

impl XmlNode {
    pub fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == namespace
    }

    pub fn child(&self, namespace: Option<&str>, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|node| node.is(namespace, name))
    }

    pub fn children<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children
            .iter()
            .filter(move |node| node.is(namespace, name))
    }

    /// All matching elements below this one, in document order.
    pub fn descendants(&self, namespace: Option<&str>, name: &str) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        collect_descendants(self, namespace, name, None, &mut found);
        found
    }

    /// Like [`XmlNode::descendants`], but never looks inside elements named
    /// `prune` (in the same namespace).
    pub fn descendants_outside(
        &self,
        namespace: Option<&str>,
        name: &str,
        prune: &str,
    ) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        collect_descendants(self, namespace, name, Some(prune), &mut found);
        found
    }

    pub fn find(&self, namespace: Option<&str>, name: &str) -> Option<&XmlNode> {
        self.descendants(namespace, name).into_iter().next()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attr_or_empty(&self, name: &str) -> String {
        self.attr(name).unwrap_or_default().to_string()
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Trimmed text of the first matching child, empty when there is none.
    pub fn child_text(&self, namespace: Option<&str>, name: &str) -> String {
        self.child(namespace, name)
            .map(|node| node.trimmed_text().to_string())
            .unwrap_or_default()
    }
}

fn collect_descendants<'a>(
    node: &'a XmlNode,
    namespace: Option<&str>,
    name: &str,
    prune: Option<&str>,
    found: &mut Vec<&'a XmlNode>,
) {
    for child in &node.children {
        if child.is(namespace, name) {
            found.push(child);
        }
        if prune.is_some_and(|pruned| child.is(namespace, pruned)) {
            continue;
        }
        collect_descendants(child, namespace, name, prune, found);
    }
}
