//! Arena-owned detached subtree ("partial").
//!
//! Each top-level child of the document root is materialized into its own
//! [`Partial`]: a flat `Vec` of nodes addressed by [`NodeId`]. The arena is
//! owned by exactly one pass at a time. Handing a mutated feature to the
//! writer happens through [`Partial::into_subtree`], which moves the nodes
//! into a fresh arena instead of sharing them.

use std::fmt;

use crate::namespace::NsBinding;
use crate::qname::QName;

/// Index eines Knotens im Arena-`Vec`. `Copy`-Type, kein Heap.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Attribute with resolved name and unescaped value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Element payload: name, attributes (without `xmlns`) and the namespace
/// declarations written on this element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<NsBinding>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    /// Attributwert ueber URI + local-name.
    pub fn attribute(&self, uri: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(uri, local_name))
            .map(|a| a.value.as_str())
    }

    /// Setzt oder ersetzt ein Attribut (Position bleibt erhalten).
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }
}

/// Content of one arena slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A detached, fully materialized subtree.
///
/// Removed nodes stay in the arena as orphans until the partial is dropped
/// or compacted by [`into_subtree`](Self::into_subtree).
#[derive(Debug, Clone)]
pub struct Partial {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Partial {
    /// Creates a partial consisting of just `root`.
    pub fn new(root: Element) -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Element(root),
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of arena slots (orphans included).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.index()].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Local name of an element node, `None` for other kinds.
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| &*e.name.local_name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Element children of `id` in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| matches!(self.kind(*c), NodeKind::Element(_)))
    }

    pub fn first_child_element(&self, id: NodeId) -> Option<NodeId> {
        self.child_elements(id).next()
    }

    /// All descendants of `id` in document order (pre-order), `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Element descendants of `id` in document order, `id` excluded.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut all = self.descendants(id);
        all.retain(|d| matches!(self.kind(*d), NodeKind::Element(_)));
        all
    }

    /// Concatenated character data of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text(t) | NodeKind::CData(t) => out.push_str(t),
            NodeKind::Element(_) => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
            NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => {}
        }
    }

    /// Ersetzt alle Kinder durch einen einzelnen Textknoten (DOM `textContent = ...`).
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        let old = std::mem::take(&mut self.nodes[id.index()].children);
        for child in old {
            self.nodes[child.index()].parent = None;
        }
        let text = text.into();
        if !text.is_empty() {
            self.append(id, NodeKind::Text(text));
        }
    }

    /// Attribute lookup on an element node.
    pub fn attribute(&self, id: NodeId, uri: &str, local_name: &str) -> Option<&str> {
        self.element(id)?.attribute(uri, local_name)
    }

    /// Sets an attribute on an element node; no-op for other node kinds.
    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: impl Into<String>) {
        if let Some(element) = self.element_mut(id) {
            element.set_attribute(name, value);
        }
    }

    /// Creates a new node as last child of `parent`.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.create(kind);
        self.append_child(parent, id);
        id
    }

    /// Creates a detached node (no parent) inside this arena.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Haengt einen (losgeloesten) Knoten als letztes Kind an.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Inserts `child` immediately before `reference`, a child of `parent`.
    /// Falls back to appending if `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        self.nodes[child.index()].parent = Some(parent);
        let siblings = &mut self.nodes[parent.index()].children;
        match siblings.iter().position(|c| *c == reference) {
            Some(pos) => siblings.insert(pos, child),
            None => siblings.push(child),
        }
    }

    /// Loest `child` von seinem Parent. Der Teilbaum bleibt als Waise in der Arena.
    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|c| *c != child);
        }
    }

    /// Moves the subtree rooted at `id` into a new, compact arena.
    ///
    /// Consumes `self`: the nodes are taken, not cloned, and everything
    /// outside the subtree is dropped with the old arena.
    pub fn into_subtree(mut self, id: NodeId) -> Partial {
        let mut nodes: Vec<Node> = Vec::with_capacity(self.nodes.len());
        // (alte Id, neue Parent-Id)
        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(id, None)];
        while let Some((old, new_parent)) = stack.pop() {
            let new_id = NodeId(nodes.len() as u32);
            let slot = &mut self.nodes[old.index()];
            let kind = std::mem::replace(&mut slot.kind, NodeKind::Text(String::new()));
            let children = std::mem::take(&mut slot.children);
            nodes.push(Node {
                kind,
                parent: new_parent,
                children: Vec::with_capacity(children.len()),
            });
            if let Some(p) = new_parent {
                nodes[p.index()].children.push(new_id);
            }
            // Rueckwaerts pushen, damit die Kinder in Dokumentreihenfolge ankommen.
            for child in children.into_iter().rev() {
                stack.push((child, Some(new_id)));
            }
        }
        Partial {
            nodes,
            root: NodeId(0),
        }
    }
}

/// Incremental builder used by the assembler: keeps the chain of open elements.
#[derive(Debug)]
pub(crate) struct PartialBuilder {
    partial: Partial,
    open: Vec<NodeId>,
}

impl PartialBuilder {
    pub(crate) fn new(root: Element) -> Self {
        let partial = Partial::new(root);
        let root = partial.root();
        Self {
            partial,
            open: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        // Root bleibt bis finish() offen.
        *self.open.last().unwrap_or(&self.partial.root)
    }

    pub(crate) fn start_element(&mut self, element: Element) {
        let parent = self.current();
        let id = self.partial.append(parent, NodeKind::Element(element));
        self.open.push(id);
    }

    pub(crate) fn end_element(&mut self) {
        if self.open.len() > 1 {
            self.open.pop();
        }
    }

    /// Appends character data, merging with a preceding text node.
    pub(crate) fn text(&mut self, text: &str) {
        let parent = self.current();
        if let Some(last) = self.partial.children(parent).last().copied()
            && let NodeKind::Text(existing) = &mut self.partial.nodes[last.index()].kind
        {
            existing.push_str(text);
            return;
        }
        self.partial.append(parent, NodeKind::Text(text.to_string()));
    }

    pub(crate) fn node(&mut self, kind: NodeKind) {
        let parent = self.current();
        self.partial.append(parent, kind);
    }

    pub(crate) fn finish(self) -> Partial {
        self.partial
    }
}
