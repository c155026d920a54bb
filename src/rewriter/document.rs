//! Parsed page with an edit overlay.
//!
//! `scraper` trees are read-only once parsed. Edits (removals, attribute
//! changes, raw replacements) are recorded against node ids and applied when
//! the document is serialized.

use std::collections::{HashMap, HashSet};

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node, Selector};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

pub struct PageDocument {
    html: Html,
    is_fragment: bool,
    removed: HashSet<NodeId>,
    replaced: HashMap<NodeId, String>,
    attrs: HashMap<NodeId, Vec<(String, String)>>,
}

impl PageDocument {
    /// Parse a full page.
    pub fn document(source: &str) -> Self {
        Self::new(Html::parse_document(source), false)
    }

    /// Parse a content fragment (parsed in `<body>` context).
    pub fn fragment(source: &str) -> Self {
        Self::new(Html::parse_fragment(source), true)
    }

    fn new(html: Html, is_fragment: bool) -> Self {
        Self {
            html,
            is_fragment,
            removed: HashSet::new(),
            replaced: HashMap::new(),
            attrs: HashMap::new(),
        }
    }

    /// Whether parsing produced any element beyond the document shell.
    pub fn has_content_elements(&self) -> bool {
        self.html.tree.root().descendants().any(|node| match node.value() {
            Node::Element(e) => !matches!(e.name(), "html" | "head" | "body"),
            _ => false,
        })
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.node(id).and_then(ElementRef::wrap)
    }

    /// Whether the node, or one of its ancestors, was removed or replaced.
    pub fn is_detached(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return true;
        };
        std::iter::once(node)
            .chain(node.ancestors())
            .any(|n| self.removed.contains(&n.id()) || self.replaced.contains_key(&n.id()))
    }

    /// Attached elements matching `selector`, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.html
            .select(selector)
            .map(|e| e.id())
            .filter(|id| !self.is_detached(*id))
            .collect()
    }

    /// Attached descendants of `id` matching `selector`.
    pub fn select_within(&self, id: NodeId, selector: &Selector) -> Vec<NodeId> {
        match self.element(id) {
            Some(element) => element
                .select(selector)
                .map(|e| e.id())
                .filter(|id| !self.is_detached(*id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        self.select(selector).into_iter().next()
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.value().name())
    }

    /// Effective attributes after edits.
    pub fn attrs(&self, id: NodeId) -> Vec<(String, String)> {
        if let Some(attrs) = self.attrs.get(&id) {
            return attrs.clone();
        }
        self.element(id)
            .map(|e| {
                e.value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        if let Some(attrs) = self.attrs.get(&id) {
            return attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
        }
        self.element(id)
            .and_then(|e| e.value().attr(name))
            .map(str::to_string)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    fn attrs_mut(&mut self, id: NodeId) -> &mut Vec<(String, String)> {
        if !self.attrs.contains_key(&id) {
            let current = self.attrs(id);
            self.attrs.insert(id, current);
        }
        self.attrs.entry(id).or_default()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let attrs = self.attrs_mut(id);
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if self.has_attr(id, name) {
            self.attrs_mut(id).retain(|(k, _)| k != name);
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let classes = self.attr(id, "class").unwrap_or_default();
        if classes.split_whitespace().any(|c| c == class) {
            return;
        }
        let value = if classes.trim().is_empty() {
            class.to_string()
        } else {
            format!("{} {}", classes.trim(), class)
        };
        self.set_attr(id, "class", &value);
    }

    /// Drop a node and its subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.removed.insert(id);
    }

    /// Replace a node (and its subtree) with raw markup.
    pub fn replace_with_html(&mut self, id: NodeId, markup: String) {
        self.replaced.insert(id, markup);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent().map(|p| p.id())
    }

    /// Previous sibling node (element, text or comment) still attached.
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.node(id)?.prev_sibling();
        while let Some(node) = current {
            if !self.removed.contains(&node.id()) {
                return Some(node.id());
            }
            current = node.prev_sibling();
        }
        None
    }

    /// Attached child elements.
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        match self.node(id) {
            Some(node) => node
                .children()
                .filter(|c| c.value().is_element() && !self.removed.contains(&c.id()))
                .map(|c| c.id())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Nearest ancestor element with one of the given tag names.
    pub fn ancestor_tagged(&self, id: NodeId, names: &[&str]) -> Option<NodeId> {
        self.node(id)?
            .ancestors()
            .find(|a| matches!(a.value(), Node::Element(e) if names.contains(&e.name())))
            .map(|a| a.id())
    }

    /// Whether the node sits inside `<code>` or `<pre>`.
    pub fn is_in_code(&self, id: NodeId) -> bool {
        self.ancestor_tagged(id, &["code", "pre"]).is_some()
    }

    /// Concatenated text of a node's attached descendants.
    pub fn text(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        node.descendants()
            .filter(|d| !self.is_detached(d.id()))
            .filter_map(|d| match d.value() {
                Node::Text(t) => Some(&**t),
                _ => None,
            })
            .collect()
    }

    /// Serialized children of a node.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.node(id) {
            for child in node.children() {
                self.write_node(child, &mut out);
            }
        }
        out
    }

    /// Serialize the whole document. Fragments come back without the
    /// `<html>` wrapper added by the parser.
    pub fn html(&self) -> String {
        let root = self.html.tree.root();
        if self.is_fragment {
            if let Some(wrapper) = root.children().find(|c| c.value().is_element()) {
                return self.inner_html(wrapper.id());
            }
        }
        let mut out = String::new();
        for child in root.children() {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeRef<'_, Node>, out: &mut String) {
        let id = node.id();
        if self.removed.contains(&id) {
            return;
        }
        if let Some(markup) = self.replaced.get(&id) {
            out.push_str(markup);
            return;
        }

        match node.value() {
            Node::Text(text) => {
                let raw_parent = node.parent().is_some_and(|p| {
                    matches!(p.value(), Node::Element(e) if RAW_TEXT_ELEMENTS.contains(&e.name()))
                });
                if raw_parent {
                    out.push_str(text);
                } else {
                    escape(text, false, out);
                }
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Doctype(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.name());
                out.push('>');
            }
            Node::Element(element) => {
                let name = element.name();
                out.push('<');
                out.push_str(name);
                for (key, value) in self.attrs(id) {
                    out.push(' ');
                    out.push_str(&key);
                    out.push_str("=\"");
                    escape(&value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&name) {
                    return;
                }
                for child in node.children() {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            Node::Document | Node::Fragment => {
                for child in node.children() {
                    self.write_node(child, out);
                }
            }
            _ => {}
        }
    }
}

fn escape(value: &str, attribute: bool, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

/// Parse a selector from a static string.
pub fn selector(css: &str) -> Selector {
    match Selector::parse(css) {
        Ok(selector) => selector,
        Err(e) => panic!("invalid built-in selector `{css}`: {e:?}"),
    }
}
