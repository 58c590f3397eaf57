//! Syndication feed iteration
//!
//! `FeedItems` walks a feed document with a namespace-aware pull parser and
//! yields one `FeedNode` per entry element. The sequence is lazy, finite and
//! cannot be restarted: once an entry has been yielded the reader has moved
//! past it.

use crate::config::FeedFieldConfig;
use crate::extract::record::{clean_value, Record};
use quick_xml::events::Event;
use quick_xml::name::{QName, ResolveResult};
use quick_xml::NsReader;
use std::borrow::Cow;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while walking a feed document
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed feed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Feed ended inside an unclosed <{0}> element")]
    UnexpectedEof(String),
}

/// One direct child of a feed entry
#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedChild {
    qname: String,
    namespace: Option<String>,
    local: String,
    text: String,
}

/// The direct children of one feed entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedNode {
    children: Vec<FeedChild>,
}

impl FeedNode {
    /// Text of the first child with this qualified name, e.g. `dc:creator`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|child| child.qname == name)
            .map(|child| child.text.as_str())
    }

    /// Text of the first child in `namespace` with this local name
    pub fn child_text_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|child| child.namespace.as_deref() == Some(namespace) && child.local == local)
            .map(|child| child.text.as_str())
    }
}

/// Lazy iterator over the entry elements of a feed document
pub struct FeedItems<'a> {
    reader: NsReader<&'a [u8]>,
    item_tag: Vec<u8>,
    done: bool,
}

impl<'a> FeedItems<'a> {
    pub fn new(xml: &'a str, item_tag: &str) -> Self {
        Self {
            reader: NsReader::from_str(xml),
            item_tag: item_tag.as_bytes().to_vec(),
            done: false,
        }
    }

    /// Starts a child entry, resolving its namespace in the current scope
    fn open_child(&self, name: QName) -> FeedChild {
        let (resolved, local) = self.reader.resolve_element(name);
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
            _ => None,
        };

        FeedChild {
            qname: String::from_utf8_lossy(name.as_ref()).into_owned(),
            namespace,
            local: String::from_utf8_lossy(local.as_ref()).into_owned(),
            text: String::new(),
        }
    }

    /// Reads the inside of one entry; the reader sits just past its start tag
    fn read_node(&mut self) -> Result<FeedNode, FeedError> {
        let mut node = FeedNode::default();
        let mut depth = 0usize;
        let mut current: Option<FeedChild> = None;

        loop {
            match self.reader.read_event()? {
                Event::Start(start) => {
                    depth += 1;
                    if depth == 1 {
                        current = Some(self.open_child(start.name()));
                    }
                }
                Event::Empty(empty) => {
                    if depth == 0 {
                        node.children.push(self.open_child(empty.name()));
                    }
                }
                Event::Text(text) => {
                    if let Some(child) = current.as_mut() {
                        let decoded = match text.unescape() {
                            Ok(value) => value,
                            Err(_) => Cow::Owned(String::from_utf8_lossy(&text).into_owned()),
                        };
                        child.text.push_str(&decoded);
                    }
                }
                Event::CData(cdata) => {
                    if let Some(child) = current.as_mut() {
                        child.text.push_str(&String::from_utf8_lossy(&cdata));
                    }
                }
                Event::End(_) => {
                    if depth == 0 {
                        return Ok(node);
                    }
                    if depth == 1 {
                        if let Some(child) = current.take() {
                            node.children.push(child);
                        }
                    }
                    depth -= 1;
                }
                Event::Eof => {
                    return Err(FeedError::UnexpectedEof(
                        String::from_utf8_lossy(&self.item_tag).into_owned(),
                    ))
                }
                _ => {}
            }
        }
    }
}

impl Iterator for FeedItems<'_> {
    type Item = Result<FeedNode, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            match event {
                Event::Start(start) if start.name().as_ref() == self.item_tag.as_slice() => {
                    let node = self.read_node();
                    if node.is_err() {
                        self.done = true;
                    }
                    return Some(node);
                }
                Event::Empty(empty) if empty.name().as_ref() == self.item_tag.as_slice() => {
                    return Some(Ok(FeedNode::default()));
                }
                Event::Eof => {
                    self.done = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

/// Where a field's value lives inside an entry
#[derive(Debug, Clone)]
enum FieldPath {
    /// Child matched by its literal name
    Name(String),
    /// Child matched by namespace URI and local name, whatever its prefix
    Namespaced {
        namespace: String,
        local: String,
        qname: String,
    },
}

impl FieldPath {
    fn compile(path: &str, namespaces: &BTreeMap<String, String>) -> Self {
        match path
            .split_once(':')
            .and_then(|(prefix, local)| namespaces.get(prefix).map(|uri| (uri, local)))
        {
            Some((uri, local)) => Self::Namespaced {
                namespace: uri.clone(),
                local: local.to_string(),
                qname: path.to_string(),
            },
            None => Self::Name(path.to_string()),
        }
    }

    fn lookup<'n>(&self, node: &'n FeedNode) -> Option<&'n str> {
        match self {
            Self::Name(name) => node.child_text(name),
            // Feeds that use the prefix without declaring it still match by name
            Self::Namespaced {
                namespace,
                local,
                qname,
            } => node
                .child_text_ns(namespace, local)
                .or_else(|| node.child_text(qname)),
        }
    }
}

#[derive(Debug, Clone)]
struct FeedFieldRule {
    name: String,
    path: FieldPath,
}

/// Field rules mapping each feed entry to one record
#[derive(Debug, Clone)]
pub struct FeedRuleSet {
    item_tag: String,
    fields: Vec<FeedFieldRule>,
}

impl FeedRuleSet {
    /// Builds the rule set; `namespaces` binds field path prefixes to URIs
    pub fn new(
        item_tag: &str,
        fields: &[FeedFieldConfig],
        namespaces: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            item_tag: item_tag.to_string(),
            fields: fields
                .iter()
                .map(|field| FeedFieldRule {
                    name: field.name.clone(),
                    path: FieldPath::compile(&field.path, namespaces),
                })
                .collect(),
        }
    }

    /// Maps one entry to a record, or `None` when its `url` field is absent
    pub fn extract_node(&self, node: &FeedNode) -> Option<Record> {
        let url = self
            .fields
            .iter()
            .find(|field| field.name == "url")
            .and_then(|field| field.path.lookup(node))
            .and_then(clean_value)?;

        let mut record = Record::new(url);
        for field in self.fields.iter().filter(|field| field.name != "url") {
            record.set(&field.name, field.path.lookup(node).and_then(clean_value));
        }
        Some(record)
    }

    /// Lazily extracts records from a feed document, in document order
    ///
    /// Entries without a `url` are skipped with a warning. A malformed
    /// document yields one error and then ends the sequence.
    pub fn records<'a>(
        &'a self,
        xml: &'a str,
    ) -> impl Iterator<Item = Result<Record, FeedError>> + 'a {
        FeedItems::new(xml, &self.item_tag).filter_map(move |node| match node {
            Ok(node) => {
                let record = self.extract_node(&node);
                if record.is_none() {
                    tracing::warn!("Skipping <{}> entry without a url", self.item_tag);
                }
                record.map(Ok)
            }
            Err(e) => Some(Err(e)),
        })
    }
}
