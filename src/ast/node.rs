use crate::ast::{AttrKind, Ctor, Declaration, Expression, Item, Node, NodeKind, Statement};
use crate::diagnostics::internal_error;
use crate::{Context, Meta, NodeId};
use ptree::TreeItem;
use std::fmt::{Display, Formatter};

impl Node {
    /// Stable identity of the node for the duration of one compilation.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Child at `index`. An out-of-range index is a programmer bug.
    pub fn child(&self, index: usize) -> &Node {
        match self.children.get(index) {
            Some(child) => child,
            None => internal_error!(
                "child index {} out of range for node {} with {} children",
                index,
                self.label(),
                self.children.len()
            ),
        }
    }

    pub fn child_mut(&mut self, index: usize) -> &mut Node {
        let label = self.label();
        let len = self.children.len();
        match self.children.get_mut(index) {
            Some(child) => child,
            None => internal_error!(
                "child index {} out of range for node {} with {} children",
                index,
                label,
                len
            ),
        }
    }

    /// Replace the child at `index`, returning the previous node.
    pub fn replace_child(&mut self, index: usize, node: Node) -> Node {
        if index >= self.children.len() {
            internal_error!(
                "child index {} out of range for node {} with {} children",
                index,
                self.label(),
                self.children.len()
            );
        }
        std::mem::replace(&mut self.children[index], node)
    }

    /// Structural comparison disregarding identity and metadata.
    pub fn structurally_equal(&self, other: &Node) -> bool {
        self.kind == other.kind
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structurally_equal(b))
    }

    /// Deep copy with fresh identities throughout.
    pub fn deep_clone(&self, ctx: &mut Context) -> Node {
        Node {
            id: ctx.next_id(),
            meta: self.meta.clone(),
            kind: self.kind.clone(),
            children: self.children.iter().map(|c| c.deep_clone(ctx)).collect(),
        }
    }

    pub fn expr(&self) -> &Expression {
        match &self.kind {
            NodeKind::Expr(e) => e,
            _ => internal_error!("node {} is not an expression", self.label()),
        }
    }

    pub fn expr_mut(&mut self) -> &mut Expression {
        match &mut self.kind {
            NodeKind::Expr(e) => e,
            kind => internal_error!("node {:?} is not an expression", kind),
        }
    }

    pub fn as_expr(&self) -> Option<&Expression> {
        match &self.kind {
            NodeKind::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn decl(&self) -> &Declaration {
        match &self.kind {
            NodeKind::Decl(d) => d,
            _ => internal_error!("node {} is not a declaration", self.label()),
        }
    }

    pub fn as_decl(&self) -> Option<&Declaration> {
        match &self.kind {
            NodeKind::Decl(d) => Some(d),
            _ => None,
        }
    }

    pub fn item(&self) -> &Item {
        match &self.kind {
            NodeKind::Item(i) => i,
            _ => internal_error!("node {} is not a unit item", self.label()),
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match &self.kind {
            NodeKind::Item(i) => Some(i),
            _ => None,
        }
    }

    pub fn ctor(&self) -> &Ctor {
        match &self.kind {
            NodeKind::Ctor(c) => c,
            _ => internal_error!("node {} is not a ctor", self.label()),
        }
    }

    pub fn as_ctor(&self) -> Option<&Ctor> {
        match &self.kind {
            NodeKind::Ctor(c) => Some(c),
            _ => None,
        }
    }

    pub fn stmt(&self) -> &Statement {
        match &self.kind {
            NodeKind::Stmt(s) => s,
            _ => internal_error!("node {} is not a statement", self.label()),
        }
    }

    /// Leading ctor children of a field node.
    pub fn field_ctors(&self) -> impl Iterator<Item = &Node> {
        self.children
            .iter()
            .take_while(|c| matches!(c.kind, NodeKind::Ctor(_)))
    }

    /// Attribute nodes of a field, variable, or unit item.
    pub fn attrs(&self) -> impl Iterator<Item = (AttrKind, &Node)> {
        self.children.iter().filter_map(|c| match &c.kind {
            NodeKind::Item(Item::Attr { kind }) => Some((*kind, c)),
            _ => None,
        })
    }

    pub fn attr(&self, kind: AttrKind) -> Option<&Node> {
        self.attrs().find(|(k, _)| *k == kind).map(|(_, n)| n)
    }

    /// The value expression of an attribute of the given kind, if present.
    pub fn attr_value(&self, kind: AttrKind) -> Option<&Node> {
        self.attr(kind).and_then(|a| a.children.first())
    }

    pub fn has_attr(&self, kind: AttrKind) -> bool {
        self.attr(kind).is_some()
    }

    /// A short human-readable label for diagnostics.
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Decl(d) => format!("declaration '{}'", d.id()),
            NodeKind::Expr(e) => match &e.kind {
                crate::ast::ExprKind::Name { id, .. } => format!("name '{}'", id),
                crate::ast::ExprKind::Member { id } => format!("member '{}'", id),
                kind => format!("expression {:?}", std::mem::discriminant(kind)),
            },
            NodeKind::Stmt(s) => format!("statement {:?}", std::mem::discriminant(s)),
            NodeKind::Ctor(c) => format!("ctor {}", c.brief()),
            NodeKind::Item(i) => match i {
                Item::Field { id, .. } | Item::UnresolvedField { id, .. } => {
                    format!("field '{}'", id.as_deref().unwrap_or("<anon>"))
                }
                Item::Variable { id, .. } => format!("variable '{}'", id),
                Item::Sink { id, .. } => format!("sink '{}'", id),
                Item::Switch { .. } => "switch".into(),
                Item::SwitchCase { .. } => "switch case".into(),
                Item::Hook { kind, .. } => format!("hook {}", kind.label()),
                Item::Property { id } => format!("property {}", id),
                Item::Attr { kind } => format!("attribute {}", kind.name()),
            },
        }
    }
}

impl Ctor {
    /// Compact rendering of the literal, also used when naming look-ahead
    /// tokens in diagnostics.
    pub fn brief(&self) -> String {
        match self {
            Ctor::Bool(b) => format!("{}", b),
            Ctor::UInt { width, value } => format!("uint{}({})", width, value),
            Ctor::SInt { width, value } => format!("int{}({})", width, value),
            Ctor::Real(r) => format!("{}", r),
            Ctor::Bytes(b) => format!("b\"{}\"", escape_bytes(b)),
            Ctor::Str(s) => format!("\"{}\"", s),
            Ctor::Regexp(p) => format!("/{}/", p),
            Ctor::Null => "null".into(),
            Ctor::Bitfield { width, .. } => format!("bitfield({})", width),
            Ctor::Vector => "vector".into(),
            Ctor::List => "list".into(),
            Ctor::Tuple => "tuple".into(),
            Ctor::Optional { .. } => "optional".into(),
        }
    }
}

/// The type of the value a ctor node constructs.
pub fn ctor_value_type(node: &Node) -> crate::types::Type {
    use crate::types::Type;
    match node.ctor() {
        Ctor::Bool(_) => Type::Bool,
        Ctor::UInt { width, .. } => Type::UInt(*width),
        Ctor::SInt { width, .. } => Type::SInt(*width),
        Ctor::Real(_) => Type::Real,
        Ctor::Bytes(_) => Type::Bytes,
        Ctor::Str(_) => Type::Str,
        Ctor::Regexp(_) => Type::Regexp,
        Ctor::Null => Type::Null,
        Ctor::Bitfield { width, bits } => Type::Bitfield {
            width: *width,
            bits: bits.iter().map(|b| (b.id.clone(), b.low, b.high)).collect(),
        },
        Ctor::Vector | Ctor::List => {
            let element = node
                .children
                .first()
                .map(ctor_value_type)
                .unwrap_or(Type::Unknown);
            match node.ctor() {
                Ctor::Vector => Type::Vector(Box::new(element)),
                _ => Type::List(Box::new(element)),
            }
        }
        Ctor::Tuple => Type::Tuple(node.children.iter().map(ctor_value_type).collect()),
        Ctor::Optional { has_value } => {
            let inner = if *has_value {
                ctor_value_type(node.child(0))
            } else {
                Type::Unknown
            };
            Type::Optional(Box::new(inner))
        }
    }
}

pub(crate) fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for b in bytes {
        match b {
            b' '..=b'~' if *b != b'\\' && *b != b'"' => out.push(*b as char),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl TreeItem for Node {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{} #{}", self.label(), self.id.0)
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(&self.children)
    }
}

impl Node {
    /// Print the subtree to stdout for debugging.
    pub fn print(&self) -> Result<(), std::io::Error> {
        ptree::print_tree(self)
    }
}
