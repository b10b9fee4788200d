//! Owned element tree for the title registry (`titledb.xml`).
//!
//! The registry is a `lockss-config` document made of nested `property`
//! elements. The root holds two top-level `property` groups: the first for
//! general configuration, the second for AU entries. Declaration, doctype and
//! comments (including those after the root element) survive a
//! parse/serialize round trip; insignificant whitespace does not, since
//! output is re-indented.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use mdpn_core::{AuParam, RegistryEntry, RegistryError};

const PROPERTY: &str = "property";
const ATTR_NAME: &str = "name";
const ATTR_VALUE: &str = "value";

const FIELD_PUBLISHER: &str = "attributes.publisher";
const FIELD_JOURNAL_TITLE: &str = "journalTitle";
const FIELD_TITLE: &str = "title";
const FIELD_TYPE: &str = "type";
const FIELD_PLUGIN: &str = "plugin";
const PARAM_PREFIX: &str = "param.";

fn xml_err(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Xml(e.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// `<property name=".." value=".."/>`
    pub fn property(name: &str, value: Option<&str>) -> Self {
        let mut el = Self::new(PROPERTY).with_attr(ATTR_NAME, name);
        if let Some(value) = value {
            el = el.with_attr(ATTR_VALUE, value);
        }
        el
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    fn is_property(&self) -> bool {
        self.name == PROPERTY
    }

    /// Direct child `property` with the given `name` attribute.
    pub fn child_property(&self, name: &str) -> Option<&Element> {
        self.elements()
            .find(|e| e.is_property() && e.attr(ATTR_NAME) == Some(name))
    }

    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child_property(name).and_then(|e| e.attr(ATTR_VALUE))
    }

    /// An AU entry is a named property with a `plugin` child.
    fn is_au_entry(&self) -> bool {
        self.is_property()
            && self.attr(ATTR_NAME).is_some()
            && self.child_property(FIELD_PLUGIN).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Prolog {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    DocType(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDocument {
    prolog: Vec<Prolog>,
    pub root: Element,
    /// Comments following the root element.
    trailer: Vec<String>,
}

impl RegistryDocument {
    pub fn parse(xml: &str) -> Result<Self, RegistryError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut prolog = Vec::new();
        let mut trailer = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Decl(d) => {
                    let version = String::from_utf8_lossy(&d.version().map_err(xml_err)?).into_owned();
                    let encoding = d
                        .encoding()
                        .transpose()
                        .map_err(xml_err)?
                        .map(|e| String::from_utf8_lossy(&e).into_owned());
                    let standalone = d
                        .standalone()
                        .transpose()
                        .map_err(xml_err)?
                        .map(|s| String::from_utf8_lossy(&s).into_owned());
                    prolog.push(Prolog::Decl {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::DocType(t) => {
                    prolog.push(Prolog::DocType(String::from_utf8_lossy(&t).trim().to_string()));
                }
                Event::Comment(c) => {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Comment(text)),
                        None if root.is_none() => prolog.push(Prolog::Comment(text)),
                        None => trailer.push(text),
                    }
                }
                Event::Start(e) => stack.push(element_from(&e)?),
                Event::Empty(e) => attach(&mut stack, &mut root, element_from(&e)?)?,
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| xml_err("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = t.unescape().map_err(xml_err)?.into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Text(String::from_utf8_lossy(&c).into_owned()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(xml_err("unexpected end of document"));
        }
        let root = root.ok_or(RegistryError::EmptyDocument)?;
        Ok(Self {
            prolog,
            root,
            trailer,
        })
    }

    /// Serialize with two-space indentation and a trailing newline.
    pub fn to_xml(&self) -> Result<String, RegistryError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        for item in &self.prolog {
            let event = match item {
                Prolog::Decl {
                    version,
                    encoding,
                    standalone,
                } => Event::Decl(BytesDecl::new(
                    version,
                    encoding.as_deref(),
                    standalone.as_deref(),
                )),
                Prolog::DocType(raw) => Event::DocType(BytesText::from_escaped(raw.as_str())),
                Prolog::Comment(raw) => Event::Comment(BytesText::from_escaped(raw.as_str())),
            };
            writer.write_event(event).map_err(xml_err)?;
        }
        write_element(&mut writer, &self.root)?;
        for raw in &self.trailer {
            writer
                .write_event(Event::Comment(BytesText::from_escaped(raw.as_str())))
                .map_err(xml_err)?;
        }

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(xml_err)
    }

    /// Top-level `property` groups directly under the root.
    fn groups(&self) -> impl Iterator<Item = &Element> {
        self.root.elements().filter(|e| e.is_property())
    }

    fn au_group_mut(&mut self) -> Result<&mut Element, RegistryError> {
        let found = self.groups().count();
        self.root
            .children
            .iter_mut()
            .filter_map(|n| match n {
                Node::Element(e) if e.is_property() => Some(e),
                _ => None,
            })
            .nth(1)
            .ok_or(RegistryError::MissingAuGroup { found })
    }

    /// Append an AU entry to the second top-level group.
    pub fn append_entry(&mut self, entry: &RegistryEntry) -> Result<(), RegistryError> {
        let group = self.au_group_mut()?;
        group.children.push(Node::Element(entry_element(entry)));
        Ok(())
    }

    pub fn contains_au(&self, au_name: &str) -> bool {
        let mut found = false;
        visit(&self.root, &mut |el| {
            if el.is_au_entry() && el.attr(ATTR_NAME) == Some(au_name) {
                found = true;
            }
        });
        found
    }

    /// Every AU entry anywhere in the document, in document order.
    pub fn au_entries(&self) -> Vec<RegistryEntry> {
        let mut entries = Vec::new();
        visit(&self.root, &mut |el| {
            if el.is_au_entry() {
                entries.push(entry_from_element(el));
            }
        });
        entries
    }

    /// First `property` named `name` at any depth, whether or not it is a
    /// complete AU entry.
    pub fn find_property(&self, name: &str) -> Option<&Element> {
        find(&self.root, &|el| el.is_property() && el.attr(ATTR_NAME) == Some(name))
    }
}

fn visit<'a>(el: &'a Element, f: &mut dyn FnMut(&'a Element)) {
    f(el);
    for child in el.elements() {
        visit(child, f);
    }
}

fn find<'a>(el: &'a Element, pred: &dyn Fn(&Element) -> bool) -> Option<&'a Element> {
    if pred(el) {
        return Some(el);
    }
    el.elements().find_map(|child| find(child, pred))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), RegistryError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(xml_err("multiple root elements")),
    }
    Ok(())
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, RegistryError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), RegistryError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if el.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(xml_err);
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(xml_err)?,
            Node::Comment(c) => writer
                .write_event(Event::Comment(BytesText::from_escaped(c.as_str())))
                .map_err(xml_err)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(xml_err)
}

/// Fields in fixed order: publisher, journal title, title, type, plugin, params.
fn entry_element(entry: &RegistryEntry) -> Element {
    let mut el = Element::property(&entry.au_name, None)
        .with_child(Element::property(FIELD_PUBLISHER, Some(&entry.publisher)))
        .with_child(Element::property(
            FIELD_JOURNAL_TITLE,
            Some(&entry.journal_title),
        ))
        .with_child(Element::property(FIELD_TITLE, Some(&entry.title)))
        .with_child(Element::property(FIELD_TYPE, Some(&entry.entry_type)))
        .with_child(Element::property(FIELD_PLUGIN, Some(&entry.plugin)));

    for (i, param) in entry.params.iter().enumerate() {
        el = el.with_child(
            Element::property(&format!("{PARAM_PREFIX}{}", i + 1), None)
                .with_child(Element::property("key", Some(&param.key)))
                .with_child(Element::property("value", Some(&param.value))),
        );
    }
    el
}

fn entry_from_element(el: &Element) -> RegistryEntry {
    let value = |name: &str| el.child_value(name).unwrap_or_default().to_string();

    let params = el
        .elements()
        .filter(|e| {
            e.is_property()
                && e.attr(ATTR_NAME)
                    .is_some_and(|n| n.starts_with(PARAM_PREFIX))
        })
        .map(|p| {
            AuParam::new(
                p.child_value("key").unwrap_or_default(),
                p.child_value("value").unwrap_or_default(),
            )
        })
        .collect();

    RegistryEntry {
        au_name: el.attr(ATTR_NAME).unwrap_or_default().to_string(),
        publisher: value(FIELD_PUBLISHER),
        journal_title: value(FIELD_JOURNAL_TITLE),
        title: value(FIELD_TITLE),
        entry_type: value(FIELD_TYPE),
        plugin: value(FIELD_PLUGIN),
        params,
    }
}
