//! The compilation driver: unify and resolve, validate, build grammars,
//! generate parser IR, optimize, and hand the result to the backend.

use crate::ast::Declaration;
use crate::codegen::{generate, ParserModule};
use crate::diagnostics::DiagnosticKind;
use crate::grammar::{analyze, build_grammar, GrammarSet};
use crate::optimizer::{optimize, FeatureSet};
use crate::scope::{build_scopes, DeclTable};
use crate::{Context, Diagnostic, Location};

/// Everything the backend needs for one compiled set of modules.
pub struct CompiledModule {
    pub grammars: GrammarSet,
    pub decls: DeclTable,
    pub parsers: Vec<ParserModule>,
}

impl CompiledModule {
    pub fn parser(&self, unit: &str) -> Option<&ParserModule> {
        self.parsers.iter().find(|p| p.unit == unit)
    }
}

pub(crate) fn report(
    ctx: &mut Context,
    kind: DiagnosticKind,
    message: String,
    location: Option<Location>,
) {
    ctx.sink.error(kind, message, location);
}

/// Run the full pipeline over the context's modules.
///
/// The compiler recovers from everything except internal errors: each phase
/// runs to completion collecting diagnostics, and compilation stops at the
/// first phase boundary with errors recorded.
pub fn compile(ctx: &mut Context) -> Result<CompiledModule, Vec<Diagnostic>> {
    crate::validator::validate_pre(ctx);
    if ctx.sink.has_errors() {
        return Err(ctx.sink.take());
    }

    let scopes = build_scopes(&ctx.modules);
    crate::resolver::resolve(ctx, &scopes);
    crate::validator::validate_post(ctx);
    if ctx.sink.has_errors() {
        return Err(ctx.sink.take());
    }

    let decls = DeclTable::collect(&ctx.modules);
    let mut grammars = GrammarSet::default();
    let modules = std::mem::take(&mut ctx.modules);
    for module in &modules {
        let module_id = match module.decl() {
            Declaration::Module { id } => id.clone(),
            _ => continue,
        };
        for decl_node in &module.children {
            if let Some(Declaration::Unit { id, .. }) = decl_node.as_decl() {
                let qualified = format!("{}::{}", module_id, id);
                if let Some(mut grammar) = build_grammar(ctx, decl_node, &qualified, &decls) {
                    if analyze(&mut grammar, &mut ctx.sink) {
                        grammars.insert(grammar);
                    }
                }
            }
        }
    }
    ctx.modules = modules;
    if ctx.sink.has_errors() {
        return Err(ctx.sink.take());
    }

    let parsers = grammars
        .iter()
        .map(|grammar| {
            let mut module = generate(grammar, &decls);
            let features = FeatureSet::of_grammar(grammar);
            optimize(&mut module, &features);
            module
        })
        .collect();

    Ok(CompiledModule {
        grammars,
        decls,
        parsers,
    })
}
