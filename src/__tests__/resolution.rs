//! Resolver behavior: binding, coercion insertion, idempotence, and the
//! diagnostics for what stays unresolved.

use crate::ast::{AttrKind, ExprKind, Item, Node, NodeKind};
use crate::builder::Builder;
use crate::diagnostics::DiagnosticKind;
use crate::scope::build_scopes;
use crate::types::Type;
use crate::Context;

fn counted_module(ctx: &mut Context) {
    let mut b = Builder::new(ctx);
    let n = b.field(Some("n"), Type::UInt(8));
    let count = b.self_field("n");
    let attr = b.attr_expr(AttrKind::Count, count);
    let data = b.field_with(Some("data"), Type::UInt(16), vec![attr]);
    let unit = b.unit("Counted", vec![n, data]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
}

fn resolve(ctx: &mut Context) {
    let scopes = build_scopes(&ctx.modules);
    crate::resolver::resolve(ctx, &scopes);
}

fn find_attr_value(ctx: &Context, kind: AttrKind) -> Node {
    let mut found = None;
    for module in &ctx.modules {
        crate::ast::walk_pre(module, &mut |node| {
            if let NodeKind::Item(Item::Attr { kind: k }) = &node.kind {
                if *k == kind && found.is_none() {
                    found = node.children.first().cloned();
                }
            }
        });
    }
    found.expect("attribute present")
}

#[test]
fn count_expression_resolves_and_coerces() {
    let mut ctx = Context::new();
    counted_module(&mut ctx);
    resolve(&mut ctx);
    assert!(!ctx.sink.has_errors(), "{}", ctx.sink);

    // The count expression is wrapped to the loop-counter type.
    let value = find_attr_value(&ctx, AttrKind::Count);
    let expr = value.expr();
    assert_eq!(expr.kind, ExprKind::Coerced);
    assert_eq!(expr.ty.ty, Type::UInt(64));
    let inner = value.child(0);
    assert!(matches!(inner.expr().kind, ExprKind::Member { .. }));
    assert_eq!(inner.expr().ty.ty, Type::UInt(8));
}

#[test]
fn resolution_is_idempotent() {
    let mut ctx = Context::new();
    counted_module(&mut ctx);
    resolve(&mut ctx);
    assert!(!ctx.sink.has_errors());

    let before: Vec<Node> = ctx.modules.clone();
    resolve(&mut ctx);
    assert!(!ctx.sink.has_errors());
    assert_eq!(before.len(), ctx.modules.len());
    for (a, b) in before.iter().zip(&ctx.modules) {
        assert!(a.structurally_equal(b), "resolver mutated a resolved tree");
    }
}

#[test]
fn unknown_type_reports_unresolved_id() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let field = b.field(Some("x"), Type::UnresolvedId("NoSuchType".into()));
    let unit = b.unit("Broken", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = crate::pipeline::compile(&mut ctx)
        .err()
        .expect("unknown type cannot compile");
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnresolvedId));
}

#[test]
fn unknown_name_reports_unresolved_id() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let count = b.name("missing");
    let attr = b.attr_expr(AttrKind::Count, count);
    let data = b.field_with(Some("data"), Type::UInt(8), vec![attr]);
    let unit = b.unit("Broken", vec![data]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    resolve(&mut ctx);
    assert!(ctx.sink.contains(DiagnosticKind::UnresolvedId));
}

#[test]
fn unresolved_field_becomes_typed_field() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let alias = b.type_alias("Byte", Type::UInt(8));
    let pending = b.unresolved_field(Some("x"), Some(Type::UnresolvedId("Byte".into())));
    let unit = b.unit("Lazy", vec![pending]);
    let module = b.module("M", vec![alias, unit]);
    ctx.add_module(module);

    resolve(&mut ctx);
    assert!(!ctx.sink.has_errors(), "{}", ctx.sink);

    let unit_node = ctx.modules[0]
        .children
        .iter()
        .find(|d| matches!(d.decl(), crate::ast::Declaration::Unit { .. }))
        .unwrap();
    let item = unit_node.children[0].item();
    match item {
        Item::Field { id, .. } => assert_eq!(id.as_deref(), Some("x")),
        other => panic!("unresolved field not replaced: {:?}", other),
    }
}

#[test]
fn enum_labels_resolve_through_module_scope() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let colors = b.enum_decl("Color", vec![("Red", 1), ("Blue", 2)]);
    let tag = b.field(Some("tag"), Type::UInt(8));
    let label = b.name("Color::Red");
    let var = b.variable("seen", Type::UnresolvedId("Color".into()), Some(label));
    let unit = b.unit("Tagged", vec![tag, var]);
    let module = b.module("M", vec![colors, unit]);
    ctx.add_module(module);

    resolve(&mut ctx);
    assert!(!ctx.sink.has_errors(), "{}", ctx.sink);

    let mut resolved_label = None;
    for module in &ctx.modules {
        crate::ast::walk_pre(module, &mut |node| {
            if let Some(expr) = node.as_expr() {
                if let ExprKind::Name { id, resolved } = &expr.kind {
                    if id == "Color::Red" {
                        resolved_label = resolved.clone();
                    }
                }
            }
        });
    }
    assert_eq!(resolved_label.as_deref(), Some("M::Color::Red"));
}

#[test]
fn deep_clone_renews_identities() {
    let mut ctx = Context::new();
    counted_module(&mut ctx);
    let original = ctx.modules[0].clone();
    let copy = original.deep_clone(&mut ctx);
    assert!(original.structurally_equal(&copy));
    assert_ne!(original.id(), copy.id());

    let mut original_ids = Vec::new();
    crate::ast::walk_pre(&original, &mut |n| original_ids.push(n.id()));
    crate::ast::walk_pre(&copy, &mut |n| {
        assert!(!original_ids.contains(&n.id()), "identity was reused");
    });
}
