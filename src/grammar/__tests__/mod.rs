use crate::ast::AttrKind;
use crate::builder::Builder;
use crate::diagnostics::DiagnosticKind;
use crate::grammar::{analyze, build_grammar, ProductionKind, EOD};
use crate::scope::{build_scopes, DeclTable};
use crate::types::Type;
use crate::Context;

fn resolve(ctx: &mut Context) {
    let scopes = build_scopes(&ctx.modules);
    crate::resolver::resolve(ctx, &scopes);
    assert!(
        !ctx.sink.has_errors(),
        "unexpected resolution errors: {}",
        ctx.sink
    );
}

fn build_first_unit(ctx: &mut Context) -> Option<crate::grammar::Grammar> {
    resolve(ctx);
    let decls = DeclTable::collect(&ctx.modules);
    let modules = std::mem::take(&mut ctx.modules);
    let unit_node = modules[0]
        .children
        .iter()
        .find(|d| matches!(d.decl(), crate::ast::Declaration::Unit { .. }))
        .expect("module declares a unit");
    let qualified = format!(
        "{}::{}",
        modules[0].decl().id(),
        unit_node.decl().id()
    );
    let grammar = build_grammar(ctx, unit_node, &qualified, &decls);
    ctx.modules = modules;
    grammar
}

#[test]
fn counted_field_lowers_to_counter() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let n = b.field(Some("n"), Type::UInt(8));
    let count = b.self_field("n");
    let attr = b.attr_expr(AttrKind::Count, count);
    let data = b.field_with(Some("data"), Type::UInt(16), vec![attr]);
    let unit = b.unit("Counted", vec![n, data]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("grammar builds");
    assert!(analyze(&mut grammar, &mut ctx.sink));
    assert!(!ctx.sink.has_errors());

    let counters: Vec<_> = grammar
        .productions()
        .filter(|p| matches!(p.kind, ProductionKind::Counter { .. }))
        .collect();
    assert_eq!(counters.len(), 1);
    // A counted repetition derives the empty string when the count is zero.
    assert!(grammar.is_nullable(&counters[0].symbol));
}

#[test]
fn look_ahead_sets_are_disjoint_and_literal_only() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let a = b.regexp("a");
    let c = b.regexp("b");
    let field = b.alternatives_field(Some("x"), vec![a, c]);
    let unit = b.unit("Alt", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("grammar builds");
    assert!(analyze(&mut grammar, &mut ctx.sink));

    let la = grammar
        .productions()
        .find_map(|p| match &p.kind {
            ProductionKind::LookAhead { lahs_a, lahs_b, .. } => {
                Some((lahs_a.clone(), lahs_b.clone()))
            }
            _ => None,
        })
        .expect("alternatives lower to a look-ahead");
    assert_eq!(la.0.len(), 1);
    assert_eq!(la.1.len(), 1);
    assert!(la.0.is_disjoint(&la.1));
    // Token IDs are hashes; only 0 is reserved for EOD.
    assert!(!la.0.contains(&EOD));
    assert!(!la.1.contains(&EOD));
}

#[test]
fn duplicated_alternative_is_ambiguous() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let a1 = b.regexp("a");
    let a2 = b.regexp("a");
    let field = b.alternatives_field(None, vec![a1, a2]);
    let unit = b.unit("Dup", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("lowering still succeeds");
    assert!(!analyze(&mut grammar, &mut ctx.sink));
    assert!(ctx.sink.contains(DiagnosticKind::GrammarAmbiguity));
    let rendered = ctx.sink.to_string();
    assert!(
        rendered.contains("regexp(/a/)"),
        "diagnostic names the colliding token: {}",
        rendered
    );
}

#[test]
fn identical_literals_share_one_token_id() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let first = b.bytes(b"GET");
    let f1 = b.literal_field(Some("a"), first, vec![]);
    let second = b.bytes(b"GET");
    let f2 = b.literal_field(Some("b"), second, vec![]);
    let third = b.bytes(b"PUT");
    let f3 = b.literal_field(Some("c"), third, vec![]);
    let unit = b.unit("Seq", vec![f1, f2, f3]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("grammar builds");
    assert!(analyze(&mut grammar, &mut ctx.sink));
    assert_eq!(grammar.tokens().count(), 2);
}

#[test]
fn sequence_first_set_reaches_past_nullable_prefix() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    // A counted (possibly empty) literal repetition followed by a literal:
    // the sequence's FIRST set must include both literals.
    let lit = b.bytes(b"x");
    let zero = b.uint_expr(64, 0);
    let count = b.attr_expr(AttrKind::Count, zero);
    let repeated = b.literal_field(Some("xs"), lit, vec![count]);
    let tail_lit = b.bytes(b"y");
    let tail = b.literal_field(Some("tail"), tail_lit, vec![]);
    let unit = b.unit("NullablePrefix", vec![repeated, tail]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("grammar builds");
    assert!(analyze(&mut grammar, &mut ctx.sink));
    let root_first = grammar.first(grammar.root());
    assert_eq!(root_first.len(), 2);
    // EOD flows into the follow set of the trailing literal.
    let tail_symbol = grammar
        .productions()
        .find(|p| matches!(&p.kind, ProductionKind::Ctor { field: Some(f), .. } if f.id.as_deref() == Some("tail")))
        .map(|p| p.symbol.clone())
        .expect("tail production exists");
    assert!(grammar.follow(&tail_symbol).contains(&EOD));
}

#[test]
fn look_ahead_switch_patches_deferreds() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let get = b.bytes(b"GET");
    let get_field = b.literal_field(Some("get"), get, vec![]);
    let put = b.bytes(b"PUT");
    let put_field = b.literal_field(Some("put"), put, vec![]);
    let case_a = b.switch_case(vec![], vec![get_field]);
    let case_b = b.switch_case(vec![], vec![put_field]);
    let switch = b.switch(None, vec![case_a, case_b]);
    let unit = b.unit("Pick", vec![switch]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("grammar builds");
    // Every deferred allocated for the case bodies must be patched.
    for production in grammar.productions() {
        if let ProductionKind::Deferred { resolved } = &production.kind {
            assert!(resolved.is_some(), "unpatched deferred {}", production.symbol);
        }
    }
    assert!(analyze(&mut grammar, &mut ctx.sink));
    assert!(grammar.uses_look_ahead());
}

#[test]
fn grammar_renders_reachable_rules() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let version = b.regexp("HTTP/[0-9]+");
    let field = b.literal_field(Some("version"), version, vec![]);
    let unit = b.unit("Render", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let mut grammar = build_first_unit(&mut ctx).expect("grammar builds");
    assert!(analyze(&mut grammar, &mut ctx.sink));
    let rendered = grammar.render().unwrap();
    assert!(rendered.contains("grammar M::Render"));
    assert!(rendered.contains("Render_version"));
    assert!(!grammar.render_tokens().is_empty());
}
