//! The fixpoint resolver.
//!
//! Resolution repeats a sweep over all module trees until one sweep makes no
//! change: binding identifiers and type references through the scopes,
//! instantiating unresolved operators against the registry, inserting
//! coercion wrappers where an expression's type differs from the required
//! type, replacing unresolved unit items with their concrete form, and
//! finalizing pending coercions whose target resolved. After the fixpoint a
//! reporting sweep records a diagnostic for everything still unresolved, so
//! that every node either resolves or has a diagnostic. Hitting
//! [FIXPOINT_CAP] with changes still occurring is a compiler error naming
//! one node that kept mutating.

use crate::ast::{
    ctor_value_type, AttrKind, Ctor, Declaration, ExprKind, FieldForm, HookKind, Item, Node,
    NodeKind, Statement,
};
use crate::diagnostics::DiagnosticKind;
use crate::operators::Registry;
use crate::scope::{DeclInfoKind, DeclTable, Lookup, ScopeSet};
use crate::types::{Coercer, CoercionStyle, QualifiedType, Type};
use crate::util::debug_log;
use crate::Context;

/// Upper bound on resolver sweeps before resolution is declared divergent.
pub const FIXPOINT_CAP: usize = 32;

/// Resolve all modules of the context in place. Diagnostics land in the
/// context's sink; the caller decides whether to continue compilation.
pub fn resolve(ctx: &mut Context, scopes: &ScopeSet) {
    let registry = Registry::standard();
    let mut iterations = 0;
    loop {
        let decls = DeclTable::collect(&ctx.modules);
        let mut modules = std::mem::take(&mut ctx.modules);
        let mut sweep = Sweep {
            decls: &decls,
            scopes,
            registry: &registry,
            report: false,
            changed: false,
            last_changed: None,
        };
        for module in &mut modules {
            sweep.module(ctx, module);
        }
        ctx.modules = modules;
        iterations += 1;
        debug_log(
            "resolver",
            &format!("sweep {} changed={}", iterations, sweep.changed),
        );

        if !sweep.changed {
            break;
        }
        if iterations >= FIXPOINT_CAP {
            ctx.sink.error(
                DiagnosticKind::FixpointDivergence,
                format!(
                    "resolution did not settle after {} sweeps; still rewriting {}",
                    FIXPOINT_CAP,
                    sweep.last_changed.as_deref().unwrap_or("<unknown node>")
                ),
                None,
            );
            return;
        }
    }

    // Reporting sweep: everything still unresolved becomes a diagnostic.
    let decls = DeclTable::collect(&ctx.modules);
    let mut modules = std::mem::take(&mut ctx.modules);
    let mut sweep = Sweep {
        decls: &decls,
        scopes,
        registry: &registry,
        report: true,
        changed: false,
        last_changed: None,
    };
    for module in &mut modules {
        sweep.module(ctx, module);
    }
    ctx.modules = modules;
}

struct Sweep<'a> {
    decls: &'a DeclTable,
    scopes: &'a ScopeSet,
    registry: &'a Registry,
    report: bool,
    changed: bool,
    last_changed: Option<String>,
}

#[derive(Clone)]
struct Env {
    scope: usize,
    unit: Option<String>,
    dollar: Option<Type>,
}

impl<'a> Sweep<'a> {
    fn mark(&mut self, node_label: String) {
        self.changed = true;
        self.last_changed = Some(node_label);
    }

    fn module(&mut self, ctx: &mut Context, module: &mut Node) {
        let module_id = match module.decl() {
            Declaration::Module { id } => id.clone(),
            _ => return,
        };
        let scope = match self.scopes.scope_of(module.id()) {
            Some(s) => s,
            None => return,
        };
        let env = Env {
            scope,
            unit: None,
            dollar: None,
        };
        for decl_node in &mut module.children {
            let decl = match decl_node.as_decl() {
                Some(d) => d.clone(),
                None => continue,
            };
            let qualified = format!("{}::{}", module_id, decl.id());
            match decl {
                Declaration::TypeAlias { .. } => {
                    let label = decl_node_label(&qualified);
                    if let NodeKind::Decl(Declaration::TypeAlias { ty, .. }) = &mut decl_node.kind
                    {
                        self.resolve_type(&mut ty.ty, scope, label);
                    }
                }
                Declaration::Unit { .. } => self.unit(ctx, decl_node, &qualified, scope),
                Declaration::Function { .. } => {
                    let fn_scope = self.scopes.scope_of(decl_node.id()).unwrap_or(scope);
                    self.decl_types(decl_node, fn_scope, &qualified);
                    let env = Env {
                        scope: fn_scope,
                        unit: None,
                        dollar: None,
                    };
                    for child in &mut decl_node.children {
                        self.stmt(ctx, child, &env);
                    }
                }
                Declaration::Global { .. } | Declaration::Local { .. } => {
                    self.decl_types(decl_node, scope, &qualified);
                    let target = match decl_node.decl() {
                        Declaration::Global { ty, .. } | Declaration::Local { ty, .. } => {
                            QualifiedType::rvalue(ty.ty.clone())
                        }
                        _ => QualifiedType::auto(),
                    };
                    if !decl_node.children.is_empty() {
                        self.expr(ctx, decl_node.child_mut(0), &env);
                        self.coerce_child(ctx, decl_node, 0, &target, &env);
                    }
                }
                _ => {}
            }
        }
    }

    fn decl_types(&mut self, decl_node: &mut Node, scope: usize, qualified: &str) {
        let label = decl_node_label(qualified);
        match &mut decl_node.kind {
            NodeKind::Decl(Declaration::Function { params, result, .. }) => {
                let mut types: Vec<&mut QualifiedType> =
                    params.iter_mut().map(|(_, t)| t).collect();
                types.push(result);
                for t in types {
                    self.resolve_type_inner(&mut t.ty, scope, &label);
                }
            }
            NodeKind::Decl(
                Declaration::Global { ty, .. } | Declaration::Local { ty, .. },
            ) => {
                self.resolve_type_inner(&mut ty.ty, scope, &label);
            }
            _ => {}
        }
    }

    fn unit(&mut self, ctx: &mut Context, unit_node: &mut Node, qualified: &str, outer: usize) {
        let scope = self.scopes.scope_of(unit_node.id()).unwrap_or(outer);
        if let NodeKind::Decl(Declaration::Unit { params, .. }) = &mut unit_node.kind {
            for (_, param) in params.iter_mut() {
                self.resolve_type_inner(&mut param.ty, scope, qualified);
            }
        }
        let env = Env {
            scope,
            unit: Some(qualified.to_string()),
            dollar: None,
        };
        let mut children = std::mem::take(&mut unit_node.children);
        for item_node in &mut children {
            self.item(ctx, item_node, &env);
        }
        unit_node.children = children;
    }

    fn item(&mut self, ctx: &mut Context, item_node: &mut Node, env: &Env) {
        self.replace_unresolved_field(item_node, env);

        let item = match item_node.as_item() {
            Some(i) => i.clone(),
            None => return,
        };
        match item {
            Item::Field { form, .. } => {
                if let NodeKind::Item(Item::Field {
                    form: FieldForm::Typed(ty),
                    ..
                }) = &mut item_node.kind
                {
                    self.resolve_type_inner(&mut ty.ty, env.scope, "field type");
                }
                let dollar = self.field_dollar_type(item_node, &form);
                let attr_env = Env {
                    dollar,
                    ..env.clone()
                };
                self.field_attrs(ctx, item_node, &attr_env);
            }
            Item::Variable { .. } => {
                if let NodeKind::Item(Item::Variable { ty, .. }) = &mut item_node.kind {
                    self.resolve_type_inner(&mut ty.ty, env.scope, "variable type");
                }
                let target = match item_node.item() {
                    Item::Variable { ty, .. } => QualifiedType::rvalue(ty.ty.clone()),
                    _ => QualifiedType::auto(),
                };
                if !item_node.children.is_empty() {
                    self.expr(ctx, item_node.child_mut(0), env);
                    self.coerce_child(ctx, item_node, 0, &target, env);
                }
            }
            Item::Switch { has_discriminant } => {
                let mut discr_ty = None;
                if has_discriminant {
                    self.expr(ctx, item_node.child_mut(0), env);
                    discr_ty = Some(item_node.child(0).expr().ty.clone());
                }
                let mut children = std::mem::take(&mut item_node.children);
                for case in children
                    .iter_mut()
                    .filter(|c| matches!(c.kind, NodeKind::Item(Item::SwitchCase { .. })))
                {
                    self.switch_case(ctx, case, env, discr_ty.as_ref());
                }
                item_node.children = children;
            }
            Item::Hook { kind, .. } => {
                let dollar = self.hook_dollar_type(env, &kind);
                let hook_env = Env {
                    dollar,
                    ..env.clone()
                };
                for child in &mut item_node.children {
                    self.stmt(ctx, child, &hook_env);
                }
            }
            Item::Property { .. } => {
                if !item_node.children.is_empty() {
                    self.expr(ctx, item_node.child_mut(0), env);
                }
            }
            Item::Sink { .. } | Item::Attr { .. } | Item::SwitchCase { .. } => {}
            Item::UnresolvedField { .. } => {
                if self.report {
                    crate::pipeline::report(
                        ctx,
                        DiagnosticKind::UnresolvedId,
                        format!("unit item {} could not be resolved", item_node.label()),
                        item_node.meta.location().cloned(),
                    );
                }
            }
        }
    }

    fn switch_case(
        &mut self,
        ctx: &mut Context,
        case: &mut Node,
        env: &Env,
        discr_ty: Option<&QualifiedType>,
    ) {
        let labels = match case.item() {
            Item::SwitchCase { labels, .. } => *labels,
            _ => return,
        };
        for index in 0..labels {
            self.expr(ctx, case.child_mut(index), env);
            if let Some(to) = discr_ty {
                if !to.is_auto() {
                    self.coerce_child(ctx, case, index, to, env);
                }
            }
        }
        let mut children = std::mem::take(&mut case.children);
        for item in children.iter_mut().skip(labels) {
            self.item(ctx, item, env);
        }
        case.children = children;
    }

    /// Sweep 4: turn an `UnresolvedField` into its concrete item once the
    /// declared form is known.
    fn replace_unresolved_field(&mut self, item_node: &mut Node, env: &Env) {
        let (id, ty) = match item_node.as_item() {
            Some(Item::UnresolvedField { id, ty }) => (id.clone(), ty.clone()),
            _ => return,
        };

        let has_case = item_node
            .children
            .iter()
            .any(|c| matches!(c.kind, NodeKind::Item(Item::SwitchCase { .. })));
        let ctors = item_node.field_ctors().count();

        let decided = if has_case {
            let has_discriminant = matches!(
                item_node.children.first().map(|c| &c.kind),
                Some(NodeKind::Expr(_))
            );
            Some(Item::Switch { has_discriminant })
        } else if ctors == 1 {
            Some(Item::Field {
                id,
                form: FieldForm::Literal,
                skip: false,
            })
        } else if ctors > 1 {
            Some(Item::Field {
                id,
                form: FieldForm::Alternatives,
                skip: false,
            })
        } else if let Some(mut qt) = ty {
            self.resolve_type_inner(&mut qt.ty, env.scope, "unresolved field");
            if qt.ty.is_resolved() {
                if matches!(qt.ty, Type::Sink) {
                    Some(Item::Sink {
                        id: id.unwrap_or_default(),
                        policy: crate::ast::SinkPolicy::Sequential,
                        auto_trim: true,
                    })
                } else {
                    Some(Item::Field {
                        id,
                        form: FieldForm::Typed(qt),
                        skip: false,
                    })
                }
            } else {
                // Keep the partially resolved type for the next sweep.
                if let NodeKind::Item(Item::UnresolvedField { ty, .. }) = &mut item_node.kind {
                    *ty = Some(qt);
                }
                None
            }
        } else {
            None
        };

        if let Some(item) = decided {
            let label = item_node.label();
            item_node.kind = NodeKind::Item(item);
            self.mark(label);
        }
    }

    fn field_dollar_type(&self, field: &Node, form: &FieldForm) -> Option<Type> {
        // `$$` inside per-element attributes is the element value, which for
        // a counted/terminated container is the declared element type.
        match form {
            FieldForm::Typed(qt) => Some(qt.ty.clone()),
            FieldForm::Literal | FieldForm::Alternatives => {
                let first = field.field_ctors().next()?;
                Some(match first.ctor() {
                    Ctor::Regexp(_) | Ctor::Bytes(_) => Type::Bytes,
                    _ => ctor_value_type(first),
                })
            }
        }
    }

    fn hook_dollar_type(&self, env: &Env, kind: &HookKind) -> Option<Type> {
        let unit = env.unit.as_deref()?;
        match kind {
            HookKind::Field(id) => self
                .decls
                .unit_item_type(unit, id)
                .map(|qt| qt.ty.clone()),
            HookKind::ForEach(id) => match self.decls.unit_item_type(unit, id).map(|qt| &qt.ty) {
                Some(Type::Vector(element) | Type::List(element)) => {
                    Some((**element).clone())
                }
                other => other.cloned(),
            },
            _ => None,
        }
    }

    fn field_attrs(&mut self, ctx: &mut Context, field: &mut Node, env: &Env) {
        let uint64 = QualifiedType::rvalue(Type::UInt(64));
        let boolean = QualifiedType::rvalue(Type::Bool);
        let mut children = std::mem::take(&mut field.children);
        for attr_node in &mut children {
            let kind = match attr_node.as_item() {
                Some(Item::Attr { kind }) => *kind,
                _ => continue,
            };
            if attr_node.children.is_empty() {
                continue;
            }
            self.expr(ctx, attr_node.child_mut(0), env);
            match kind {
                AttrKind::Count | AttrKind::Size => {
                    self.coerce_child(ctx, attr_node, 0, &uint64, env)
                }
                AttrKind::Requires => self.coerce_child(ctx, attr_node, 0, &boolean, env),
                _ => {}
            }
        }
        field.children = children;
    }

    fn stmt(&mut self, ctx: &mut Context, node: &mut Node, env: &Env) {
        let boolean = QualifiedType::rvalue(Type::Bool);
        match &node.kind {
            NodeKind::Stmt(stmt) => match stmt.clone() {
                Statement::Block => {
                    let scope = self.scopes.scope_of(node.id()).unwrap_or(env.scope);
                    let inner = Env {
                        scope,
                        ..env.clone()
                    };
                    let mut children = std::mem::take(&mut node.children);
                    for child in &mut children {
                        self.stmt(ctx, child, &inner);
                    }
                    node.children = children;
                }
                Statement::Expr | Statement::Print | Statement::Return { has_value: true } => {
                    let mut children = std::mem::take(&mut node.children);
                    for child in &mut children {
                        self.expr(ctx, child, env);
                    }
                    node.children = children;
                }
                Statement::Assign => {
                    let mut children = std::mem::take(&mut node.children);
                    for child in &mut children {
                        self.expr(ctx, child, env);
                    }
                    node.children = children;
                    let target_ty = node.child(0).expr().ty.clone();
                    if !target_ty.is_auto() {
                        let value_ty = QualifiedType::rvalue(target_ty.ty);
                        self.coerce_child(ctx, node, 1, &value_ty, env);
                    }
                }
                Statement::If { .. } => {
                    self.expr(ctx, node.child_mut(0), env);
                    self.coerce_child(ctx, node, 0, &boolean, env);
                    let mut children = std::mem::take(&mut node.children);
                    for child in children.iter_mut().skip(1) {
                        self.stmt(ctx, child, env);
                    }
                    node.children = children;
                }
                _ => {}
            },
            NodeKind::Decl(Declaration::Local { ty, .. }) => {
                let target = QualifiedType::rvalue(ty.ty.clone());
                if let NodeKind::Decl(Declaration::Local { ty, .. }) = &mut node.kind {
                    self.resolve_type_inner(&mut ty.ty, env.scope, "local type");
                }
                if !node.children.is_empty() {
                    self.expr(ctx, node.child_mut(0), env);
                    self.coerce_child(ctx, node, 0, &target, env);
                }
            }
            _ => {}
        }
    }

    /// Sweeps 1-3 and 5 for one expression subtree, post-order.
    fn expr(&mut self, ctx: &mut Context, node: &mut Node, env: &Env) {
        let mut children = std::mem::take(&mut node.children);
        for child in &mut children {
            if matches!(child.kind, NodeKind::Expr(_)) {
                self.expr(ctx, child, env);
            }
        }
        node.children = children;

        let location = node.meta.location().cloned();
        let kind = match node.as_expr() {
            Some(e) => e.kind.clone(),
            None => return,
        };

        match kind {
            ExprKind::Name { id, resolved } => {
                let mut resolved = resolved;
                if resolved.is_none() {
                    match self.scopes.lookup(env.scope, &id) {
                        Lookup::Found(qualified) if self.decls.get(&qualified).is_some() => {
                            resolved = Some(qualified.clone());
                            node.expr_mut().kind = ExprKind::Name {
                                id: id.clone(),
                                resolved: resolved.clone(),
                            };
                            self.mark(format!("name '{}'", id));
                        }
                        Lookup::Ambiguous(candidates) if self.report => {
                            crate::pipeline::report(
                                ctx,
                                DiagnosticKind::UnresolvedId,
                                format!("'{}' is ambiguous between {}", id, candidates.join(" and ")),
                                location.clone(),
                            );
                        }
                        _ if self.report => {
                            crate::pipeline::report(
                                ctx,
                                DiagnosticKind::UnresolvedId,
                                format!("unknown ID '{}'", id),
                                location.clone(),
                            );
                        }
                        _ => {}
                    }
                }
                if node.expr().ty.is_auto() {
                    if let Some(qualified) = resolved {
                        if let Some(ty) = self.binding_type(&qualified) {
                            node.expr_mut().ty = ty;
                            self.mark(format!("name '{}'", qualified));
                        }
                    }
                }
            }
            ExprKind::SelfRef => {
                if node.expr().ty.is_auto() {
                    if let Some(unit) = &env.unit {
                        node.expr_mut().ty = QualifiedType::lvalue(Type::Name(unit.clone()));
                        self.mark("self".into());
                    }
                }
            }
            ExprKind::Dollar => {
                if node.expr().ty.is_auto() {
                    if let Some(dollar) = &env.dollar {
                        node.expr_mut().ty = QualifiedType::rvalue(dollar.clone());
                        self.mark("$$".into());
                    } else if self.report {
                        crate::pipeline::report(
                            ctx,
                            DiagnosticKind::UnresolvedId,
                            "'$$' is not available in this context".into(),
                            location.clone(),
                        );
                    }
                }
            }
            ExprKind::Ctor => {
                if node.expr().ty.is_auto() {
                    let ty = ctor_value_type(node.child(0));
                    node.expr_mut().ty = QualifiedType::rvalue(ty);
                    self.mark("ctor expression".into());
                }
            }
            ExprKind::Member { id } => {
                let base_ty = node.child(0).expr().ty.clone();
                if node.expr().ty.is_auto() && !base_ty.is_auto() {
                    match self.member_type(&base_ty.ty, &id) {
                        Some(ty) => {
                            node.expr_mut().ty = ty;
                            self.mark(format!("member '{}'", id));
                        }
                        None if self.report => {
                            crate::pipeline::report(
                                ctx,
                                DiagnosticKind::UnresolvedId,
                                format!("type {} has no member '{}'", base_ty.ty, id),
                                location.clone(),
                            );
                        }
                        None => {}
                    }
                }
            }
            ExprKind::UnresolvedOperator { op } => {
                self.instantiate_operator(ctx, node, op, env, location);
            }
            ExprKind::PendingCoerced => {
                if node.expr().ty.is_resolved() {
                    node.expr_mut().kind = ExprKind::Coerced;
                    self.mark("pending coercion".into());
                }
            }
            ExprKind::Operator { .. } | ExprKind::Coerced => {}
        }
    }

    fn instantiate_operator(
        &mut self,
        ctx: &mut Context,
        node: &mut Node,
        op: crate::operators::Operator,
        _env: &Env,
        location: Option<crate::Location>,
    ) {
        let operand_types: Vec<QualifiedType> = node
            .children
            .iter()
            .map(|c| c.expr().ty.clone())
            .collect();
        if operand_types.iter().any(|t| t.is_auto()) {
            return;
        }

        let coercer = Coercer::new(self.decls);
        let mut matches = self.registry.select(op, &operand_types, &coercer);
        match matches.len() {
            1 => {
                let chosen = matches.remove(0);
                let children = std::mem::take(&mut node.children);
                let mut new_children = Vec::with_capacity(children.len());
                let mut all_ok = true;
                for (child, target) in children.into_iter().zip(&chosen.operand_types) {
                    match coercer.coerce_expr(ctx, child, target, CoercionStyle::EXPLICIT) {
                        Ok(c) => new_children.push(c),
                        Err((original, failure)) => {
                            if self.report {
                                crate::pipeline::report(
                                    ctx,
                                    DiagnosticKind::InvalidCoercion,
                                    failure.reason,
                                    location.clone(),
                                );
                            }
                            all_ok = false;
                            new_children.push(original);
                        }
                    }
                }
                node.children = new_children;
                if all_ok {
                    let expr = node.expr_mut();
                    expr.kind = ExprKind::Operator {
                        op,
                        signature: chosen.signature,
                    };
                    expr.ty = chosen.result;
                    self.mark(format!("operator '{}'", op.symbol()));
                }
            }
            0 if self.report => {
                let rendered: Vec<String> =
                    operand_types.iter().map(|t| t.ty.to_string()).collect();
                crate::pipeline::report(
                    ctx,
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "no candidate for operator '{}' over ({})",
                        op.symbol(),
                        rendered.join(", ")
                    ),
                    location,
                );
            }
            n if n > 1 && self.report => {
                crate::pipeline::report(
                    ctx,
                    DiagnosticKind::AmbiguousOverload,
                    format!(
                        "{} equally good candidates for operator '{}'",
                        n,
                        op.symbol()
                    ),
                    location,
                );
            }
            _ => {}
        }
    }

    fn binding_type(&self, qualified: &str) -> Option<QualifiedType> {
        match &self.decls.get(qualified)?.kind {
            DeclInfoKind::Value { ty } => Some(ty.clone()),
            DeclInfoKind::EnumLabel { enum_name, .. } => {
                Some(QualifiedType::rvalue(Type::Name(enum_name.clone())))
            }
            DeclInfoKind::Unit { .. } | DeclInfoKind::Enum { .. } | DeclInfoKind::Alias { .. } => {
                Some(QualifiedType::rvalue(Type::TypeOf(Box::new(Type::Name(
                    qualified.to_string(),
                )))))
            }
            // Member access on the unit provides item types; a bare unit
            // field name only resolves inside its own unit's hooks.
            DeclInfoKind::Function { .. } | DeclInfoKind::Module => None,
        }
    }

    fn member_type(&self, base: &Type, id: &str) -> Option<QualifiedType> {
        let (stripped, _) = base.deref_chain();
        match stripped {
            Type::Name(qualified) => match &self.decls.get(qualified)?.kind {
                DeclInfoKind::Unit { .. } => {
                    self.decls.unit_item_type(qualified, id).cloned()
                }
                DeclInfoKind::Enum { .. } => None,
                DeclInfoKind::Alias { ty } => self.member_type(&ty.ty.clone(), id),
                _ => None,
            },
            Type::Struct(fields) | Type::Union(fields) => fields
                .iter()
                .find(|(f, _)| f == id)
                .map(|(_, t)| QualifiedType::rvalue(t.clone())),
            Type::Bitfield { bits, .. } => bits
                .iter()
                .find(|(f, _, _)| f == id)
                .map(|_| QualifiedType::rvalue(Type::UInt(64))),
            _ => None,
        }
    }

    fn coerce_child(
        &mut self,
        ctx: &mut Context,
        parent: &mut Node,
        index: usize,
        to: &QualifiedType,
        _env: &Env,
    ) {
        let from = parent.child(index).expr().ty.clone();
        if from.is_auto() || to.is_auto() {
            return;
        }
        let coercer = Coercer::new(self.decls);
        let location = parent.child(index).meta.location().cloned();
        let mut children = std::mem::take(&mut parent.children);
        let child = children.remove(index);
        let was_wrapped = matches!(
            child.as_expr().map(|e| &e.kind),
            Some(ExprKind::Coerced | ExprKind::PendingCoerced)
        );
        match coercer.coerce_expr(ctx, child, to, CoercionStyle::IMPLICIT) {
            Ok(coerced) => {
                let wrapped_now = matches!(
                    coerced.as_expr().map(|e| &e.kind),
                    Some(ExprKind::Coerced | ExprKind::PendingCoerced)
                );
                if wrapped_now && !was_wrapped {
                    self.mark("coercion".into());
                }
                children.insert(index, coerced);
            }
            Err((original, failure)) => {
                if self.report {
                    crate::pipeline::report(
                        ctx,
                        DiagnosticKind::InvalidCoercion,
                        failure.reason,
                        location,
                    );
                }
                children.insert(index, original);
            }
        }
        parent.children = children;
    }

    fn resolve_type(&mut self, ty: &mut Type, scope: usize, label: String) {
        self.resolve_type_inner(ty, scope, &label);
    }

    /// Sweep 1 for types: bind every `unresolved-id` reachable in `ty`.
    fn resolve_type_inner(&mut self, ty: &mut Type, scope: usize, label: &str) {
        match ty {
            Type::UnresolvedId(id) => {
                if let Lookup::Found(qualified) = self.scopes.lookup(scope, id) {
                    if self.decls.get(&qualified).is_some() {
                        *ty = Type::Name(qualified);
                        self.mark(label.to_string());
                    }
                }
            }
            Type::Optional(t)
            | Type::Result(t)
            | Type::Set(t)
            | Type::List(t)
            | Type::Vector(t)
            | Type::TypeOf(t)
            | Type::Reference { inner: t, .. } => self.resolve_type_inner(t, scope, label),
            Type::Map(k, v) => {
                self.resolve_type_inner(k, scope, label);
                self.resolve_type_inner(v, scope, label);
            }
            Type::Tuple(ts) => {
                for t in ts {
                    self.resolve_type_inner(t, scope, label);
                }
            }
            Type::Struct(fields) | Type::Union(fields) => {
                for (_, t) in fields {
                    self.resolve_type_inner(t, scope, label);
                }
            }
            _ => {}
        }
    }
}

fn decl_node_label(qualified: &str) -> String {
    format!("declaration '{}'", qualified)
}
