//! Well-formedness checks, run before and after resolution. Every failed
//! check records a diagnostic and validation continues, so a single run
//! reports as many problems as it can find.

use crate::ast::{
    AttrKind, BitRange, Ctor, Declaration, ExprKind, FieldForm, HookKind, Item, Node, NodeKind,
};
use crate::diagnostics::DiagnosticKind;
use crate::scope::{DeclInfoKind, DeclTable};
use crate::types::Type;
use crate::Context;
use std::collections::{HashMap, HashSet};

const RESERVED_IDS: [&str; 2] = ["self", "$$"];

/// Surface checks that do not need resolved types.
pub fn validate_pre(ctx: &mut Context) {
    let modules = std::mem::take(&mut ctx.modules);
    for module in &modules {
        check_duplicate_decls(ctx, module);
        for decl_node in &module.children {
            if let Some(Declaration::Unit { .. }) = decl_node.as_decl() {
                check_unit_pre(ctx, decl_node);
            }
            crate::ast::walk_pre(decl_node, &mut |node| {
                if let NodeKind::Ctor(ctor) = &node.kind {
                    check_literal_range(ctx, node, ctor);
                }
            });
        }
    }
    ctx.modules = modules;
}

/// Type- and unit-level checks that need resolution to have finished.
pub fn validate_post(ctx: &mut Context) {
    let decls = DeclTable::collect(&ctx.modules);
    let modules = std::mem::take(&mut ctx.modules);
    for module in &modules {
        let module_id = match module.decl() {
            Declaration::Module { id } => id.clone(),
            _ => continue,
        };
        for decl_node in &module.children {
            if let Some(Declaration::Unit { id, .. }) = decl_node.as_decl() {
                let qualified = format!("{}::{}", module_id, id);
                check_unit_post(ctx, decl_node, &qualified, &decls);
            }
            crate::ast::walk_pre(decl_node, &mut |node| {
                if let Some(expr) = node.as_expr() {
                    if let ExprKind::Operator { op, .. } = &expr.kind {
                        for operand in &node.children {
                            if operand.as_expr().map_or(false, |e| e.ty.is_auto()) {
                                ctx.sink.error(
                                    DiagnosticKind::TypeMismatch,
                                    format!(
                                        "operand of operator '{}' has no resolved type",
                                        op.symbol()
                                    ),
                                    node.meta.location().cloned(),
                                );
                            }
                        }
                    }
                }
            });
        }
    }
    ctx.modules = modules;
}

fn check_duplicate_decls(ctx: &mut Context, module: &Node) {
    let mut seen: HashSet<&str> = HashSet::new();
    for decl_node in &module.children {
        if let Some(decl) = decl_node.as_decl() {
            let id = decl.id();
            check_reserved(ctx, decl_node, id);
            if !seen.insert(id) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("duplicate declaration of '{}'", id),
                    decl_node.meta.location().cloned(),
                );
            }
        }
    }
}

fn check_reserved(ctx: &mut Context, node: &Node, id: &str) {
    if RESERVED_IDS.contains(&id) {
        ctx.sink.error(
            DiagnosticKind::SyntaxError,
            format!("'{}' is a reserved ID", id),
            node.meta.location().cloned(),
        );
    }
}

fn check_unit_pre(ctx: &mut Context, unit_node: &Node) {
    let mut item_ids: HashSet<String> = HashSet::new();
    let mut field_ids: HashSet<String> = HashSet::new();

    for item_node in &unit_node.children {
        let item = match item_node.as_item() {
            Some(i) => i,
            None => continue,
        };
        let id = match item {
            Item::Field { id, .. } | Item::UnresolvedField { id, .. } => id.clone(),
            Item::Variable { id, .. } | Item::Sink { id, .. } => Some(id.clone()),
            _ => None,
        };
        if let Some(id) = id {
            check_reserved(ctx, item_node, &id);
            if !item_ids.insert(id.clone()) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("duplicate unit item '{}'", id),
                    item_node.meta.location().cloned(),
                );
            }
            if matches!(item, Item::Field { .. } | Item::UnresolvedField { .. }) {
                field_ids.insert(id);
            }
        }
        if matches!(item, Item::Field { .. } | Item::UnresolvedField { .. }) {
            check_field_attrs(ctx, item_node);
        }
    }

    // Hooks must name fields that exist.
    for item_node in &unit_node.children {
        if let Some(Item::Hook { kind, .. }) = item_node.as_item() {
            if let HookKind::Field(id) | HookKind::ForEach(id) = kind {
                if !field_ids.contains(id) {
                    ctx.sink.error(
                        DiagnosticKind::SyntaxError,
                        format!("hook refers to unknown field '{}'", id),
                        item_node.meta.location().cloned(),
                    );
                }
            }
        }
    }
}

/// `&size`, `&until`, and `&eod` each bound how many bytes a field may
/// consume; at most one of them may appear.
fn check_field_attrs(ctx: &mut Context, field_node: &Node) {
    let mut seen: HashMap<AttrKind, usize> = HashMap::new();
    for (kind, _) in field_node.attrs() {
        *seen.entry(kind).or_insert(0) += 1;
    }
    for (kind, count) in &seen {
        if *count > 1 {
            ctx.sink.error(
                DiagnosticKind::InvalidAttribute,
                format!("attribute {} given more than once", kind.name()),
                field_node.meta.location().cloned(),
            );
        }
    }
    let bounds = [AttrKind::Size, AttrKind::Until, AttrKind::Eod]
        .iter()
        .filter(|k| seen.contains_key(k))
        .count();
    if bounds > 1 {
        ctx.sink.error(
            DiagnosticKind::InvalidAttribute,
            "at most one of &size, &until, and &eod may apply to a field".into(),
            field_node.meta.location().cloned(),
        );
    }
    if seen.contains_key(&AttrKind::Chunked) {
        let is_bytes = matches!(
            field_node.as_item(),
            Some(Item::Field {
                form: FieldForm::Typed(qt),
                ..
            }) if matches!(qt.ty, Type::Bytes)
        );
        if !is_bytes {
            ctx.sink.error(
                DiagnosticKind::InvalidAttribute,
                "&chunked applies only to bytes fields".into(),
                field_node.meta.location().cloned(),
            );
        }
    }
}

fn check_literal_range(ctx: &mut Context, node: &Node, ctor: &Ctor) {
    let location = node.meta.location().cloned();
    match ctor {
        Ctor::UInt { width, value } => {
            if !matches!(width, 8 | 16 | 32 | 64) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("invalid integer width {}", width),
                    location,
                );
            } else if *width < 64 && *value >= (1u64 << width) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("literal {} does not fit into uint{}", value, width),
                    location,
                );
            }
        }
        Ctor::SInt { width, value } => {
            if !matches!(width, 8 | 16 | 32 | 64) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("invalid integer width {}", width),
                    location,
                );
            } else if *width < 64 {
                let bound = 1i64 << (width - 1);
                if *value >= bound || *value < -bound {
                    ctx.sink.error(
                        DiagnosticKind::SyntaxError,
                        format!("literal {} does not fit into int{}", value, width),
                        location,
                    );
                }
            }
        }
        Ctor::Regexp(pattern) => {
            if let Err(err) = regex::bytes::Regex::new(&format!("^(?:{})", pattern)) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("invalid regular expression /{}/: {}", pattern, err),
                    location,
                );
            }
        }
        Ctor::Bitfield { width, bits } => {
            if !matches!(width, 8 | 16 | 32 | 64) {
                ctx.sink.error(
                    DiagnosticKind::SyntaxError,
                    format!("invalid bitfield width {}", width),
                    location,
                );
                return;
            }
            for BitRange { id, low, high, .. } in bits {
                if low > high || *high >= *width {
                    ctx.sink.error(
                        DiagnosticKind::SyntaxError,
                        format!("bit range '{}' ({}..{}) exceeds width {}", id, low, high, width),
                        location.clone(),
                    );
                }
            }
        }
        _ => {}
    }
}

fn check_unit_post(ctx: &mut Context, unit_node: &Node, qualified: &str, decls: &DeclTable) {
    // An unbounded &eod field swallows the rest of the stream; nothing may
    // parse after it.
    let parsing_items: Vec<&Node> = unit_node
        .children
        .iter()
        .filter(|n| {
            matches!(
                n.as_item(),
                Some(Item::Field { .. } | Item::Switch { .. })
            )
        })
        .collect();
    for (index, item_node) in parsing_items.iter().enumerate() {
        if item_node.has_attr(AttrKind::Eod) && index + 1 != parsing_items.len() {
            ctx.sink.error(
                DiagnosticKind::InvalidAttribute,
                format!(
                    "{} consumes to the end of data but is followed by further fields",
                    item_node.label()
                ),
                item_node.meta.location().cloned(),
            );
        }
    }

    // Sinks may only be direct unit items.
    for item_node in &unit_node.children {
        if let Some(Item::Switch { .. }) = item_node.as_item() {
            crate::ast::walk_pre(item_node, &mut |nested| {
                if matches!(nested.as_item(), Some(Item::Sink { .. })) {
                    ctx.sink.error(
                        DiagnosticKind::InvalidAttribute,
                        "sinks cannot be nested inside switch cases".into(),
                        nested.meta.location().cloned(),
                    );
                }
            });
            check_switch_exhaustive(ctx, item_node, decls);
        }
    }

    check_recursion_wrapped(ctx, unit_node, qualified, decls);
}

/// A unit that (transitively) contains itself as a field must break the
/// cycle with a reference wrapper somewhere along the path.
fn check_recursion_wrapped(
    ctx: &mut Context,
    unit_node: &Node,
    qualified: &str,
    decls: &DeclTable,
) {
    for item_node in &unit_node.children {
        let qt = match item_node.as_item() {
            Some(Item::Field {
                form: FieldForm::Typed(qt),
                ..
            }) => qt,
            _ => continue,
        };
        if let Type::Name(target) = &qt.ty {
            if reaches_unit(target, qualified, decls, &mut HashSet::new()) {
                ctx.sink.error(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "{} makes unit {} recursive; wrap the field type in a reference",
                        item_node.label(),
                        qualified
                    ),
                    item_node.meta.location().cloned(),
                );
            }
        }
    }
}

fn reaches_unit(
    from: &str,
    target: &str,
    decls: &DeclTable,
    visited: &mut HashSet<String>,
) -> bool {
    if from == target {
        return true;
    }
    if !visited.insert(from.to_string()) {
        return false;
    }
    let items = match decls.get(from).map(|i| &i.kind) {
        Some(DeclInfoKind::Unit { items, .. }) => items,
        _ => return false,
    };
    for (_, qt) in items {
        // A reference wrapper (any flavor) breaks the ownership cycle.
        match &qt.ty {
            Type::Name(next) => {
                if reaches_unit(next, target, decls, visited) {
                    return true;
                }
            }
            Type::Vector(inner) | Type::List(inner) => {
                if let Type::Name(next) = &**inner {
                    if reaches_unit(next, target, decls, visited) {
                        return true;
                    }
                }
            }
            // A reference wrapper of any flavor breaks the ownership cycle.
            Type::Reference { .. } => {}
            _ => {}
        }
    }
    false
}

/// An expression-discriminated switch over a closed domain must either
/// cover it or carry a default arm.
fn check_switch_exhaustive(ctx: &mut Context, switch_node: &Node, decls: &DeclTable) {
    let has_discriminant = match switch_node.as_item() {
        Some(Item::Switch { has_discriminant }) => *has_discriminant,
        _ => return,
    };
    if !has_discriminant {
        return;
    }
    let has_default = switch_node.children.iter().any(|c| {
        matches!(
            c.as_item(),
            Some(Item::SwitchCase {
                is_default: true,
                ..
            })
        )
    });
    if has_default {
        return;
    }

    let discr_ty = &switch_node.child(0).expr().ty.ty;
    let label_count: usize = switch_node
        .children
        .iter()
        .filter_map(|c| match c.as_item() {
            Some(Item::SwitchCase {
                is_default: false,
                labels,
            }) => Some(*labels),
            _ => None,
        })
        .sum();

    let domain = match discr_ty {
        Type::Bool => Some(2),
        Type::Name(qualified) => match decls.get(qualified).map(|i| &i.kind) {
            Some(DeclInfoKind::Enum { labels }) => Some(labels.len()),
            _ => None,
        },
        _ => None,
    };
    if let Some(domain) = domain {
        if label_count < domain {
            ctx.sink.error(
                DiagnosticKind::TypeMismatch,
                format!(
                    "switch over {} covers {} of {} values and has no default arm",
                    discr_ty, label_count, domain
                ),
                switch_node.meta.location().cloned(),
            );
        }
    }
}
