//! Validator diagnostics, pre- and post-resolution.

use crate::ast::AttrKind;
use crate::builder::Builder;
use crate::diagnostics::DiagnosticKind;
use crate::types::Type;
use crate::Context;

fn diagnostics_of(ctx: &mut Context) -> Vec<crate::Diagnostic> {
    match crate::pipeline::compile(ctx) {
        Ok(_) => Vec::new(),
        Err(diagnostics) => diagnostics,
    }
}

#[test]
fn duplicate_unit_items_are_rejected() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let a = b.field(Some("x"), Type::UInt(8));
    let dup = b.field(Some("x"), Type::UInt(16));
    let unit = b.unit("Dup", vec![a, dup]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SyntaxError && d.message.contains("duplicate")));
}

#[test]
fn reserved_ids_are_rejected() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let field = b.field(Some("self"), Type::UInt(8));
    let unit = b.unit("Reserved", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SyntaxError && d.message.contains("reserved")));
}

#[test]
fn conflicting_bounds_are_rejected() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let size = {
        let n = b.uint_expr(64, 4);
        b.attr_expr(AttrKind::Size, n)
    };
    let eod = b.attr(AttrKind::Eod);
    let field = b.field_with(Some("x"), Type::Bytes, vec![size, eod]);
    let unit = b.unit("Bounds", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::InvalidAttribute
            && d.message.contains("at most one")));
}

#[test]
fn eod_field_must_be_last() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let rest = {
        let eod = b.attr(AttrKind::Eod);
        b.field_with(Some("rest"), Type::Bytes, vec![eod])
    };
    let tail = b.field(Some("tail"), Type::UInt(8));
    let unit = b.unit("Greedy", vec![rest, tail]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::InvalidAttribute
            && d.message.contains("end of data")));
}

#[test]
fn hook_must_name_an_existing_field() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let field = b.field(Some("x"), Type::UInt(8));
    let hook = b.hook(crate::ast::HookKind::Field("nope".into()), 0, vec![]);
    let unit = b.unit("Hooked", vec![field, hook]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SyntaxError && d.message.contains("unknown field")));
}

#[test]
fn out_of_range_literal_is_rejected() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let lit = b.uint(8, 300);
    let field = b.literal_field(Some("x"), lit, vec![]);
    let unit = b.unit("Range", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SyntaxError && d.message.contains("does not fit")));
}

#[test]
fn invalid_regexp_is_rejected() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let lit = b.regexp("[unclosed");
    let field = b.literal_field(Some("x"), lit, vec![]);
    let unit = b.unit("Re", vec![field]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SyntaxError
            && d.message.contains("regular expression")));
}

#[test]
fn recursive_unit_field_needs_reference_wrapper() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let inner = b.field(Some("next"), Type::UnresolvedId("Chain".into()));
    let unit = b.unit("Chain", vec![inner]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::TypeMismatch && d.message.contains("recursive")));
}

#[test]
fn sinks_cannot_nest_in_switch_cases() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let tag = b.field(Some("tag"), Type::UInt(8));
    let sink = b.sink("data", crate::ast::SinkPolicy::Sequential);
    let label = b.uint_expr(8, 1);
    let case = b.switch_case(vec![label], vec![sink]);
    let fallback = b.default_case(vec![]);
    let discriminant = b.self_field("tag");
    let switch = b.switch(Some(discriminant), vec![case, fallback]);
    let unit = b.unit("Nested", vec![tag, switch]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::InvalidAttribute && d.message.contains("nested")));
}

#[test]
fn switch_over_bool_without_default_must_cover_both() {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let flag = b.field(Some("flag"), Type::UInt(8));
    let lhs = b.self_field("flag");
    let rhs = b.uint_expr(8, 0);
    let cond = b.op(crate::operators::Operator::Neq, lhs, rhs);
    let body = b.field(Some("present"), Type::UInt(8));
    let true_ctor = b.bool_ctor(true);
    let truthy = b.ctor_expr(true_ctor);
    let case = b.switch_case(vec![truthy], vec![body]);
    let switch = b.switch(Some(cond), vec![case]);
    let unit = b.unit("Partial", vec![flag, switch]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);

    let diagnostics = diagnostics_of(&mut ctx);
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::TypeMismatch && d.message.contains("default")));
}
