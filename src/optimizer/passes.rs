use crate::codegen::{IrExpr, IrOp, IrStmt, ParserModule};
use crate::operators::Operator;
use crate::optimizer::{FeatureSet, Pass};
use std::collections::HashSet;

/// Post-order traversal over every statement of a function body.
fn visit_stmts_mut(stmt: &mut IrStmt, f: &mut impl FnMut(&mut IrStmt)) {
    match &mut stmt.op {
        IrOp::Block(stmts) => {
            for s in stmts {
                visit_stmts_mut(s, f);
            }
        }
        IrOp::If {
            then_branch,
            else_branch,
            ..
        } => {
            visit_stmts_mut(then_branch, f);
            if let Some(e) = else_branch {
                visit_stmts_mut(e, f);
            }
        }
        IrOp::Loop { body }
        | IrOp::LimitView { body, .. }
        | IrOp::FeatureGated { body, .. } => visit_stmts_mut(body, f),
        IrOp::PeekDispatch { arms, otherwise } => {
            for (_, s) in arms {
                visit_stmts_mut(s, f);
            }
            visit_stmts_mut(otherwise, f);
        }
        IrOp::SwitchDispatch { arms, default, .. } => {
            for (_, s) in arms {
                visit_stmts_mut(s, f);
            }
            if let Some(d) = default {
                visit_stmts_mut(d, f);
            }
        }
        IrOp::Attempt { body, handler } => {
            visit_stmts_mut(body, f);
            visit_stmts_mut(handler, f);
        }
        _ => {}
    }
    f(stmt);
}

fn visit_expr_mut(expr: &mut IrExpr, f: &mut impl FnMut(&mut IrExpr)) {
    match expr {
        IrExpr::Binary { lhs, rhs, .. } => {
            visit_expr_mut(lhs, f);
            visit_expr_mut(rhs, f);
        }
        IrExpr::Size(inner) | IrExpr::Convert { inner, .. } => visit_expr_mut(inner, f),
        IrExpr::Field { base, .. } => visit_expr_mut(base, f),
        _ => {}
    }
    f(expr);
}

/// Apply `f` to every expression appearing directly in one statement.
fn visit_stmt_exprs_mut(stmt: &mut IrStmt, f: &mut impl FnMut(&mut IrExpr)) {
    match &mut stmt.op {
        IrOp::Let { init: Some(e), .. }
        | IrOp::Advance { bytes: e }
        | IrOp::WaitFor { bytes: e }
        | IrOp::LimitView { bytes: e, .. }
        | IrOp::SetField { value: e, .. }
        | IrOp::Append { value: e, .. }
        | IrOp::If { cond: e, .. }
        | IrOp::Eval(e)
        | IrOp::Return { value: Some(e) } => visit_expr_mut(e, f),
        IrOp::Assign { target, value } => {
            visit_expr_mut(target, f);
            visit_expr_mut(value, f);
        }
        IrOp::SwitchDispatch {
            discriminant, arms, ..
        } => {
            visit_expr_mut(discriminant, f);
            for (labels, _) in arms {
                for label in labels {
                    visit_expr_mut(label, f);
                }
            }
        }
        IrOp::Print(exprs) => {
            for e in exprs {
                visit_expr_mut(e, f);
            }
        }
        _ => {}
    }
}

/// Direct control-flow terminators.
fn is_terminator(stmt: &IrStmt) -> bool {
    matches!(
        stmt.op,
        IrOp::Raise { .. }
            | IrOp::Rethrow
            | IrOp::Return { .. }
            | IrOp::TailCall { .. }
            | IrOp::Break
            | IrOp::Stop
    )
}

/// Whether control never continues past the statement, looking through
/// nested structure.
fn diverges(stmt: &IrStmt) -> bool {
    match &stmt.op {
        IrOp::Block(stmts) => stmts.iter().any(diverges),
        IrOp::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => diverges(then_branch) && diverges(else_branch),
        _ => is_terminator(stmt),
    }
}

/// Resolve feature-gated blocks against the capabilities the grammar
/// actually needs.
pub struct FeatureRequirements;

impl Pass for FeatureRequirements {
    fn name(&self) -> &'static str {
        "feature-requirements"
    }

    fn run(&mut self, module: &mut ParserModule, features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                if let IrOp::FeatureGated { feature, body } = &mut stmt.op {
                    let op = if features.contains(*feature) {
                        std::mem::replace(&mut body.op, IrOp::Nop)
                    } else {
                        IrOp::Nop
                    };
                    stmt.op = op;
                    changed = true;
                }
            });
        }
        changed
    }
}

/// Fold constant conditions and drop statements that follow a terminator
/// within one block.
pub struct DeadCodeStatic;

impl Pass for DeadCodeStatic {
    fn name(&self) -> &'static str {
        "dead-code-static"
    }

    fn run(&mut self, module: &mut ParserModule, _features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                match &mut stmt.op {
                    IrOp::If {
                        cond: IrExpr::ConstBool(value),
                        then_branch,
                        else_branch,
                    } => {
                        let replacement = if *value {
                            std::mem::replace(&mut then_branch.op, IrOp::Nop)
                        } else {
                            match else_branch {
                                Some(e) => std::mem::replace(&mut e.op, IrOp::Nop),
                                None => IrOp::Nop,
                            }
                        };
                        stmt.op = replacement;
                        changed = true;
                    }
                    IrOp::Block(stmts) => {
                        if let Some(cut) = stmts.iter().position(is_terminator) {
                            if cut + 1 < stmts.len() {
                                stmts.truncate(cut + 1);
                                changed = true;
                            }
                        }
                    }
                    _ => {}
                }
            });
        }
        changed
    }
}

/// Local simplifications: constant folding, zero-byte advances, effect-free
/// statements.
pub struct Peephole;

impl Pass for Peephole {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn run(&mut self, module: &mut ParserModule, _features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                visit_stmt_exprs_mut(stmt, &mut |expr| {
                    if let Some(folded) = fold(expr) {
                        *expr = folded;
                        changed = true;
                    }
                });
                let replace = match &stmt.op {
                    IrOp::Advance {
                        bytes: IrExpr::ConstUInt(0),
                    }
                    | IrOp::WaitFor {
                        bytes: IrExpr::ConstUInt(0),
                    } => true,
                    IrOp::Eval(e) => e.is_pure(),
                    IrOp::If {
                        cond,
                        then_branch,
                        else_branch,
                    } => {
                        cond.is_pure()
                            && matches!(then_branch.op, IrOp::Nop)
                            && else_branch.as_ref().map_or(true, |e| matches!(e.op, IrOp::Nop))
                    }
                    _ => false,
                };
                if replace {
                    stmt.op = IrOp::Nop;
                    changed = true;
                }
            });
        }
        changed
    }
}

fn fold(expr: &IrExpr) -> Option<IrExpr> {
    let IrExpr::Binary { op, lhs, rhs } = expr else {
        return None;
    };
    match (&**lhs, &**rhs) {
        (IrExpr::ConstUInt(a), IrExpr::ConstUInt(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                Operator::Add => IrExpr::ConstUInt(a.checked_add(b)?),
                Operator::Sub => IrExpr::ConstUInt(a.checked_sub(b)?),
                Operator::Mul => IrExpr::ConstUInt(a.checked_mul(b)?),
                Operator::Eq => IrExpr::ConstBool(a == b),
                Operator::Neq => IrExpr::ConstBool(a != b),
                Operator::Lt => IrExpr::ConstBool(a < b),
                Operator::Gt => IrExpr::ConstBool(a > b),
                Operator::Leq => IrExpr::ConstBool(a <= b),
                Operator::Geq => IrExpr::ConstBool(a >= b),
                _ => return None,
            })
        }
        (IrExpr::ConstBool(a), IrExpr::ConstBool(b)) => Some(match op {
            Operator::And => IrExpr::ConstBool(*a && *b),
            Operator::Or => IrExpr::ConstBool(*a || *b),
            Operator::Eq => IrExpr::ConstBool(a == b),
            Operator::Neq => IrExpr::ConstBool(a != b),
            _ => return None,
        }),
        // `x + 0` and `0 + x` keep x's value for unsigned arithmetic.
        (other, IrExpr::ConstUInt(0)) if matches!(op, Operator::Add | Operator::Sub) => {
            Some(other.clone())
        }
        (IrExpr::ConstUInt(0), other) if matches!(op, Operator::Add) => Some(other.clone()),
        _ => None,
    }
}

/// Splice nested blocks and drop no-ops.
pub struct FlattenBlocks;

impl Pass for FlattenBlocks {
    fn name(&self) -> &'static str {
        "flatten-blocks"
    }

    fn run(&mut self, module: &mut ParserModule, _features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                if let IrOp::Block(stmts) = &mut stmt.op {
                    let needs_work = stmts
                        .iter()
                        .any(|s| matches!(s.op, IrOp::Block(_) | IrOp::Nop));
                    if needs_work {
                        let mut flat = Vec::with_capacity(stmts.len());
                        for s in stmts.drain(..) {
                            match s.op {
                                IrOp::Nop => {}
                                IrOp::Block(inner) => flat.extend(inner),
                                _ => flat.push(s),
                            }
                        }
                        *stmts = flat;
                        changed = true;
                    }
                }
            });
        }
        changed
    }
}

/// Remove code made unreachable by divergence nested deeper than one
/// block level.
pub struct DeadCodeCfg;

impl Pass for DeadCodeCfg {
    fn name(&self) -> &'static str {
        "dead-code-cfg"
    }

    fn run(&mut self, module: &mut ParserModule, _features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                if let IrOp::Block(stmts) = &mut stmt.op {
                    if let Some(cut) = stmts.iter().position(diverges) {
                        if cut + 1 < stmts.len() {
                            stmts.truncate(cut + 1);
                            changed = true;
                        }
                    }
                }
            });
        }
        changed
    }
}

/// Propagate constants bound by `let` into later uses within the same
/// function, and drop the binding once nothing reads it.
pub struct ConstantPropagation;

impl Pass for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn run(&mut self, module: &mut ParserModule, _features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            // Locals that are ever reassigned or appended to are not
            // propagation candidates.
            let mut mutated: HashSet<String> = HashSet::new();
            visit_stmts_mut(&mut function.body, &mut |stmt| match &stmt.op {
                IrOp::Assign {
                    target: IrExpr::Local(id),
                    ..
                } => {
                    mutated.insert(id.clone());
                }
                IrOp::Append { target, .. } => {
                    mutated.insert(target.clone());
                }
                IrOp::MatchLiteral { dest: Some(d), .. }
                | IrOp::ReadBuiltin { dest: Some(d), .. }
                | IrOp::CallParser { dest: Some(d), .. } => {
                    mutated.insert(d.clone());
                }
                _ => {}
            });

            let mut constants: Vec<(String, IrExpr)> = Vec::new();
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                if let IrOp::Let {
                    id,
                    init: Some(init),
                } = &stmt.op
                {
                    if init.is_const() && !mutated.contains(id) {
                        constants.push((id.clone(), init.clone()));
                    }
                }
            });
            if constants.is_empty() {
                continue;
            }

            let mut used: HashSet<String> = HashSet::new();
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                visit_stmt_exprs_mut(stmt, &mut |expr| {
                    if let IrExpr::Local(id) = expr {
                        if let Some((_, value)) =
                            constants.iter().find(|(cid, _)| cid == id)
                        {
                            *expr = value.clone();
                            changed = true;
                        } else {
                            used.insert(id.clone());
                        }
                    }
                });
            });

            // The bindings are now unread; remove them.
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                if let IrOp::Let { id, init: Some(_) } = &stmt.op {
                    if constants.iter().any(|(cid, _)| cid == id) && !used.contains(id) {
                        stmt.op = IrOp::Nop;
                        changed = true;
                    }
                }
            });
        }
        changed
    }
}

/// Drop parameters no internal function reads. The exported entry shapes
/// keep their frozen signatures.
pub struct RemoveUnusedParameters;

impl Pass for RemoveUnusedParameters {
    fn name(&self) -> &'static str {
        "remove-unused-parameters"
    }

    fn run(&mut self, module: &mut ParserModule, _features: &FeatureSet) -> bool {
        let mut changed = false;
        for function in &mut module.functions {
            if function.exported || function.params.is_empty() {
                continue;
            }
            let mut used: HashSet<String> = HashSet::new();
            visit_stmts_mut(&mut function.body, &mut |stmt| {
                visit_stmt_exprs_mut(stmt, &mut |expr| match expr {
                    IrExpr::Param(id) | IrExpr::Local(id) => {
                        used.insert(id.clone());
                    }
                    IrExpr::SelfField(_) | IrExpr::Dollar => {
                        used.insert("self".into());
                        used.insert("dd".into());
                    }
                    _ => {}
                });
                // Parse primitives implicitly consume the stream and view.
                match &stmt.op {
                    IrOp::MatchLiteral { .. }
                    | IrOp::ReadBuiltin { .. }
                    | IrOp::PeekDispatch { .. }
                    | IrOp::Advance { .. }
                    | IrOp::WaitFor { .. }
                    | IrOp::LimitView { .. }
                    | IrOp::CallParser { .. }
                    | IrOp::TailCall { .. }
                    | IrOp::Synchronize => {
                        used.insert("stream".into());
                        used.insert("view".into());
                        used.insert("self".into());
                        used.insert("ctx".into());
                    }
                    IrOp::HookRun { context, .. } => {
                        used.insert("self".into());
                        if context.is_some() {
                            used.insert("ctx".into());
                        }
                    }
                    IrOp::SetField { .. } | IrOp::SinkSetup { .. } => {
                        used.insert("self".into());
                    }
                    _ => {}
                }
            });
            let before = function.params.len();
            function.params.retain(|p| used.contains(p));
            if function.params.len() != before {
                changed = true;
            }
        }
        changed
    }
}
