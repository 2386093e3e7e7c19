use crate::ast::{AttrKind, HookKind};
use crate::builder::Builder;
use crate::codegen::{IrExpr, IrOp, IrStmt, ParserModule};
use crate::optimizer::{optimize, FeatureSet};
use crate::pipeline::compile;
use crate::types::Type;
use crate::Context;

fn compile_counted() -> crate::pipeline::CompiledModule {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let n = b.field(Some("n"), Type::UInt(8));
    let count = b.self_field("n");
    let attr = b.attr_expr(AttrKind::Count, count);
    let data = b.field_with(Some("data"), Type::UInt(16), vec![attr]);
    let done = b.hook(HookKind::Done, 0, vec![]);
    let unit = b.unit("Counted", vec![n, data, done]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    compile(&mut ctx).expect("counted unit compiles")
}

/// The order of parse effects is the observable contract the optimizer must
/// keep.
fn observable_ops(stmt: &IrStmt, out: &mut Vec<String>) {
    match &stmt.op {
        IrOp::Block(stmts) => {
            for s in stmts {
                observable_ops(s, out);
            }
        }
        IrOp::If {
            then_branch,
            else_branch,
            ..
        } => {
            observable_ops(then_branch, out);
            if let Some(e) = else_branch {
                observable_ops(e, out);
            }
        }
        IrOp::Loop { body }
        | IrOp::LimitView { body, .. }
        | IrOp::FeatureGated { body, .. } => observable_ops(body, out),
        IrOp::PeekDispatch { arms, otherwise } => {
            for (_, s) in arms {
                observable_ops(s, out);
            }
            observable_ops(otherwise, out);
        }
        IrOp::SwitchDispatch { arms, default, .. } => {
            for (_, s) in arms {
                observable_ops(s, out);
            }
            if let Some(d) = default {
                observable_ops(d, out);
            }
        }
        IrOp::Attempt { body, handler } => {
            observable_ops(body, out);
            observable_ops(handler, out);
        }
        IrOp::MatchLiteral { token, .. } => out.push(format!("match {}", token)),
        IrOp::ReadBuiltin { spec, .. } => out.push(format!("read {}", spec)),
        IrOp::CallParser { unit, .. } => out.push(format!("call {}", unit)),
        IrOp::HookRun { event, .. } => out.push(format!("hook {}", event)),
        IrOp::SetField { field, .. } => out.push(format!("set {}", field)),
        IrOp::Raise { error, .. } => out.push(format!("raise {}", error)),
        IrOp::Rethrow => out.push("rethrow".into()),
        _ => {}
    }
}

fn module_observables(module: &ParserModule) -> Vec<String> {
    let mut out = Vec::new();
    for function in &module.functions {
        out.push(format!("fn {}", function.name));
        observable_ops(&function.body, &mut out);
    }
    out
}

fn compile_session() -> crate::pipeline::CompiledModule {
    let mut ctx = Context::new();
    let mut b = Builder::new(&mut ctx);
    let context = {
        let name = b.string("ConnState");
        let value = b.ctor_expr(name);
        b.property("%context", Some(value))
    };
    let random_access = b.property("%random-access", None);
    let kind = b.field(Some("kind"), Type::UInt(8));
    let done = b.hook(HookKind::Done, 0, vec![]);
    let unit = b.unit("Session", vec![context, random_access, kind, done]);
    let module = b.module("M", vec![unit]);
    ctx.add_module(module);
    compile(&mut ctx).expect("session unit compiles")
}

#[test]
fn entry_shapes_and_registration() {
    let compiled = compile_counted();
    let parser = compiled.parser("M::Counted").expect("parser generated");
    assert_eq!(parser.registration.name, "M::Counted");

    let exported: Vec<&str> = parser
        .functions
        .iter()
        .filter(|f| f.exported)
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(exported.len(), 3);
    assert!(exported.contains(&parser.registration.parse1.as_str()));
    assert!(exported.contains(&parser.registration.parse2.as_str()));
    assert!(exported.contains(&parser.registration.parse3.as_str()));
}

#[test]
fn unit_wraps_body_in_hook_dispatch() {
    let compiled = compile_counted();
    let parser = compiled.parser("M::Counted").unwrap();
    let ops = module_observables(parser);
    let done_at = ops
        .iter()
        .position(|o| o == "hook %done")
        .expect("%done dispatch emitted");
    let last_read = ops
        .iter()
        .rposition(|o| o.starts_with("read"))
        .expect("field reads emitted");
    assert!(last_read < done_at, "%done runs after the body: {:?}", ops);
}

#[test]
fn optimizer_preserves_observable_order() {
    let compiled = compile_counted();
    let grammar = compiled.grammars.get("M::Counted").unwrap();
    let mut module = crate::codegen::generate(grammar, &compiled.decls);
    let before = module_observables(&module);
    let features = FeatureSet::of_grammar(grammar);
    optimize(&mut module, &features);
    let after = module_observables(&module);
    assert_eq!(before, after);
}

#[test]
fn optimizer_drops_unused_feature_gates() {
    let compiled = compile_counted();
    let parser = compiled.parser("M::Counted").unwrap();
    for function in &parser.functions {
        let mut found = false;
        let mut stack = vec![&function.body];
        while let Some(stmt) = stack.pop() {
            if let IrOp::FeatureGated { .. } = stmt.op {
                found = true;
            }
            if let IrOp::Block(stmts) = &stmt.op {
                stack.extend(stmts.iter());
            }
        }
        assert!(!found, "feature gates survive in {}", function.name);
    }
}

#[test]
fn context_units_register_a_factory() {
    let compiled = compile_session();
    let parser = compiled.parser("M::Session").expect("parser generated");
    let factory = parser
        .registration
        .context_factory
        .as_deref()
        .expect("%context unit registers a factory");
    assert_eq!(factory, "m_session_context_new");

    let function = parser
        .functions
        .iter()
        .find(|f| f.name == factory)
        .expect("factory function emitted");
    assert!(function.exported);
    assert!(function.render().contains("new-context<ConnState>"));

    let parse = parser
        .functions
        .iter()
        .find(|f| f.name.starts_with("__parse_"))
        .expect("parse function emitted");
    let rendered = parse.render();
    // The context is bound at unit entry and forwarded to every hook.
    assert!(rendered.contains("let __ctx = %ctx"), "{}", rendered);
    assert!(rendered.contains("with __ctx"), "{}", rendered);
    // %random-access keeps consumed input addressable.
    assert!(rendered.contains("retain-input"), "{}", rendered);
}

#[test]
fn context_free_units_register_no_factory() {
    let compiled = compile_counted();
    let parser = compiled.parser("M::Counted").unwrap();
    assert!(parser.registration.context_factory.is_none());
    for function in &parser.functions {
        let rendered = function.render();
        assert!(
            !rendered.contains("__ctx") && !rendered.contains("retain-input"),
            "capability setup leaked into {}",
            function.name
        );
    }
}

#[test]
fn constant_conditions_fold_away() {
    let mut module = ParserModule {
        unit: "T".into(),
        functions: vec![crate::codegen::IrFunction {
            name: "f".into(),
            params: vec![],
            exported: false,
            body: IrStmt::new(IrOp::Block(vec![
                IrStmt::new(IrOp::Let {
                    id: "flag".into(),
                    init: Some(IrExpr::ConstBool(false)),
                }),
                IrStmt::new(IrOp::If {
                    cond: IrExpr::Local("flag".into()),
                    then_branch: Box::new(IrStmt::new(IrOp::Raise {
                        error: crate::runtime::RuntimeErrorKind::ParseError,
                        message: "unreachable".into(),
                    })),
                    else_branch: None,
                }),
                IrStmt::new(IrOp::Return { value: None }),
            ])),
        }],
        registration: crate::codegen::Registration {
            name: "T".into(),
            description: None,
            mime_types: vec![],
            parse1: "p1".into(),
            parse2: "p2".into(),
            parse3: "p3".into(),
            context_factory: None,
        },
    };
    optimize(&mut module, &FeatureSet::default());
    let ops = module_observables(&module);
    assert!(
        !ops.iter().any(|o| o.starts_with("raise")),
        "constant-false branch removed: {:?}",
        ops
    );
}
