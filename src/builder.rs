//! Factory for constructing the intermediate AST.
//!
//! The external surface parser is out of scope for this crate, so hosts
//! (and the test suite) assemble modules through this builder. Every method
//! returns a fresh [Node] with its identity drawn from the context.

use crate::ast::{
    AttrKind, BitRange, Ctor, Declaration, ExprKind, Expression, FieldForm, HookKind, Item, Node,
    NodeKind, SinkPolicy, Statement,
};
use crate::operators::Operator;
use crate::types::{QualifiedType, Type};
use crate::{Context, Location, Meta};

pub struct Builder<'c> {
    ctx: &'c mut Context,
}

impl<'c> Builder<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Self { ctx }
    }

    fn make(&mut self, kind: NodeKind, children: Vec<Node>) -> Node {
        self.ctx.make(kind, children)
    }

    /// Attach a source location to a finished node.
    pub fn at(&mut self, mut node: Node, location: Location) -> Node {
        node.meta = Meta::at(location);
        node
    }

    /// Attach a documentation string to a declaration node.
    pub fn doc(&mut self, mut node: Node, text: &str) -> Node {
        node.meta = node.meta.clone().with_doc(text);
        node
    }

    // Declarations.

    pub fn module(&mut self, id: &str, declarations: Vec<Node>) -> Node {
        self.make(
            NodeKind::Decl(Declaration::Module { id: id.into() }),
            declarations,
        )
    }

    pub fn import(&mut self, module: &str, alias: Option<&str>) -> Node {
        self.make(
            NodeKind::Decl(Declaration::Import {
                module: module.into(),
                alias: alias.map(String::from),
            }),
            vec![],
        )
    }

    pub fn type_alias(&mut self, id: &str, ty: Type) -> Node {
        self.make(
            NodeKind::Decl(Declaration::TypeAlias {
                id: id.into(),
                ty: QualifiedType::rvalue(ty),
            }),
            vec![],
        )
    }

    pub fn enum_decl(&mut self, id: &str, labels: Vec<(&str, i64)>) -> Node {
        self.make(
            NodeKind::Decl(Declaration::Enum {
                id: id.into(),
                labels: labels.into_iter().map(|(l, v)| (l.into(), v)).collect(),
            }),
            vec![],
        )
    }

    pub fn unit(&mut self, id: &str, items: Vec<Node>) -> Node {
        self.unit_with_params(id, vec![], items)
    }

    pub fn unit_with_params(
        &mut self,
        id: &str,
        params: Vec<(&str, Type)>,
        items: Vec<Node>,
    ) -> Node {
        self.make(
            NodeKind::Decl(Declaration::Unit {
                id: id.into(),
                params: params
                    .into_iter()
                    .map(|(p, t)| (p.into(), QualifiedType::rvalue(t)))
                    .collect(),
            }),
            items,
        )
    }

    pub fn global(&mut self, id: &str, ty: Type, init: Option<Node>) -> Node {
        self.make(
            NodeKind::Decl(Declaration::Global {
                id: id.into(),
                ty: QualifiedType::lvalue(ty),
            }),
            init.into_iter().collect(),
        )
    }

    // Unit items.

    /// A field parsed through its declared type.
    pub fn field(&mut self, id: Option<&str>, ty: Type) -> Node {
        self.field_with(id, ty, vec![])
    }

    pub fn field_with(&mut self, id: Option<&str>, ty: Type, attrs: Vec<Node>) -> Node {
        self.make(
            NodeKind::Item(Item::Field {
                id: id.map(String::from),
                form: FieldForm::Typed(QualifiedType::rvalue(ty)),
                skip: false,
            }),
            attrs,
        )
    }

    /// A field matched against one literal ctor.
    pub fn literal_field(&mut self, id: Option<&str>, ctor: Node, attrs: Vec<Node>) -> Node {
        let mut children = vec![ctor];
        children.extend(attrs);
        self.make(
            NodeKind::Item(Item::Field {
                id: id.map(String::from),
                form: FieldForm::Literal,
                skip: false,
            }),
            children,
        )
    }

    /// A field matched against literal alternatives selected by look-ahead.
    pub fn alternatives_field(&mut self, id: Option<&str>, ctors: Vec<Node>) -> Node {
        self.make(
            NodeKind::Item(Item::Field {
                id: id.map(String::from),
                form: FieldForm::Alternatives,
                skip: false,
            }),
            ctors,
        )
    }

    /// A field whose bytes are skipped without binding.
    pub fn skip_field(&mut self, ty: Type, attrs: Vec<Node>) -> Node {
        self.make(
            NodeKind::Item(Item::Field {
                id: None,
                form: FieldForm::Typed(QualifiedType::rvalue(ty)),
                skip: true,
            }),
            attrs,
        )
    }

    pub fn unresolved_field(&mut self, id: Option<&str>, ty: Option<Type>) -> Node {
        self.make(
            NodeKind::Item(Item::UnresolvedField {
                id: id.map(String::from),
                ty: ty.map(QualifiedType::rvalue),
            }),
            vec![],
        )
    }

    pub fn variable(&mut self, id: &str, ty: Type, default: Option<Node>) -> Node {
        self.make(
            NodeKind::Item(Item::Variable {
                id: id.into(),
                ty: QualifiedType::lvalue(ty),
            }),
            default.into_iter().collect(),
        )
    }

    pub fn sink(&mut self, id: &str, policy: SinkPolicy) -> Node {
        self.make(
            NodeKind::Item(Item::Sink {
                id: id.into(),
                policy,
                auto_trim: true,
            }),
            vec![],
        )
    }

    pub fn switch(&mut self, discriminant: Option<Node>, cases: Vec<Node>) -> Node {
        let has_discriminant = discriminant.is_some();
        let mut children: Vec<Node> = discriminant.into_iter().collect();
        children.extend(cases);
        self.make(
            NodeKind::Item(Item::Switch { has_discriminant }),
            children,
        )
    }

    pub fn switch_case(&mut self, labels: Vec<Node>, items: Vec<Node>) -> Node {
        let label_count = labels.len();
        let mut children = labels;
        children.extend(items);
        self.make(
            NodeKind::Item(Item::SwitchCase {
                is_default: false,
                labels: label_count,
            }),
            children,
        )
    }

    pub fn default_case(&mut self, items: Vec<Node>) -> Node {
        self.make(
            NodeKind::Item(Item::SwitchCase {
                is_default: true,
                labels: 0,
            }),
            items,
        )
    }

    pub fn hook(&mut self, kind: HookKind, priority: i64, body: Vec<Node>) -> Node {
        let block = self.block(body);
        self.make(NodeKind::Item(Item::Hook { kind, priority }), vec![block])
    }

    pub fn property(&mut self, id: &str, value: Option<Node>) -> Node {
        self.make(
            NodeKind::Item(Item::Property { id: id.into() }),
            value.into_iter().collect(),
        )
    }

    /// A valueless attribute such as `&eod`.
    pub fn attr(&mut self, kind: AttrKind) -> Node {
        self.make(NodeKind::Item(Item::Attr { kind }), vec![])
    }

    pub fn attr_expr(&mut self, kind: AttrKind, value: Node) -> Node {
        self.make(NodeKind::Item(Item::Attr { kind }), vec![value])
    }

    // Ctors.

    pub fn bytes(&mut self, value: &[u8]) -> Node {
        self.make(NodeKind::Ctor(Ctor::Bytes(value.to_vec())), vec![])
    }

    pub fn string(&mut self, value: &str) -> Node {
        self.make(NodeKind::Ctor(Ctor::Str(value.into())), vec![])
    }

    pub fn regexp(&mut self, pattern: &str) -> Node {
        self.make(NodeKind::Ctor(Ctor::Regexp(pattern.into())), vec![])
    }

    pub fn uint(&mut self, width: u8, value: u64) -> Node {
        self.make(NodeKind::Ctor(Ctor::UInt { width, value }), vec![])
    }

    pub fn sint(&mut self, width: u8, value: i64) -> Node {
        self.make(NodeKind::Ctor(Ctor::SInt { width, value }), vec![])
    }

    pub fn bool_ctor(&mut self, value: bool) -> Node {
        self.make(NodeKind::Ctor(Ctor::Bool(value)), vec![])
    }

    pub fn bitfield(&mut self, width: u8, bits: Vec<BitRange>) -> Node {
        self.make(NodeKind::Ctor(Ctor::Bitfield { width, bits }), vec![])
    }

    // Expressions.

    fn expr(&mut self, kind: ExprKind, children: Vec<Node>) -> Node {
        self.make(
            NodeKind::Expr(Expression {
                kind,
                ty: QualifiedType::auto(),
            }),
            children,
        )
    }

    pub fn name(&mut self, id: &str) -> Node {
        self.expr(
            ExprKind::Name {
                id: id.into(),
                resolved: None,
            },
            vec![],
        )
    }

    pub fn self_ref(&mut self) -> Node {
        self.expr(ExprKind::SelfRef, vec![])
    }

    pub fn dollar(&mut self) -> Node {
        self.expr(ExprKind::Dollar, vec![])
    }

    pub fn member(&mut self, base: Node, id: &str) -> Node {
        self.expr(ExprKind::Member { id: id.into() }, vec![base])
    }

    /// `self.<field>` as an expression.
    pub fn self_field(&mut self, id: &str) -> Node {
        let base = self.self_ref();
        self.member(base, id)
    }

    pub fn ctor_expr(&mut self, ctor: Node) -> Node {
        self.expr(ExprKind::Ctor, vec![ctor])
    }

    pub fn uint_expr(&mut self, width: u8, value: u64) -> Node {
        let ctor = self.uint(width, value);
        self.ctor_expr(ctor)
    }

    pub fn bytes_expr(&mut self, value: &[u8]) -> Node {
        let ctor = self.bytes(value);
        self.ctor_expr(ctor)
    }

    pub fn op(&mut self, op: Operator, lhs: Node, rhs: Node) -> Node {
        self.expr(ExprKind::UnresolvedOperator { op }, vec![lhs, rhs])
    }

    // Statements.

    pub fn block(&mut self, statements: Vec<Node>) -> Node {
        self.make(NodeKind::Stmt(Statement::Block), statements)
    }

    pub fn expr_stmt(&mut self, expr: Node) -> Node {
        self.make(NodeKind::Stmt(Statement::Expr), vec![expr])
    }

    pub fn print(&mut self, exprs: Vec<Node>) -> Node {
        self.make(NodeKind::Stmt(Statement::Print), exprs)
    }

    pub fn stop(&mut self) -> Node {
        self.make(NodeKind::Stmt(Statement::Stop), vec![])
    }

    pub fn reject(&mut self) -> Node {
        self.make(NodeKind::Stmt(Statement::Reject), vec![])
    }

    pub fn confirm(&mut self) -> Node {
        self.make(NodeKind::Stmt(Statement::Confirm), vec![])
    }
}
