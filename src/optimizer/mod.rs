//! Local rewrites over the parser IR.
//!
//! Passes run in a fixed order and the driver repeats whole rounds until
//! one round changes nothing. Every pass preserves observable parsing
//! behavior: success/error outcomes, unit contents, and hook invocation
//! order are identical before and after.
mod passes;

use crate::codegen::{Feature, ParserModule};
use crate::grammar::Grammar;
use crate::util::debug_log;
use std::collections::HashSet;

/// Upper bound on optimization rounds.
pub const OPTIMIZER_CAP: usize = 8;

#[derive(Debug, Default, Clone)]
/// The runtime capabilities one generated parser actually needs, computed
/// from its grammar. Feature-gated IR blocks for anything absent here are
/// dead.
pub struct FeatureSet {
    features: HashSet<Feature>,
}

impl FeatureSet {
    pub fn of_grammar(grammar: &Grammar) -> Self {
        let mut features = HashSet::new();
        if grammar.declares_sink() {
            features.insert(Feature::Sinks);
        }
        if grammar.props().random_access {
            features.insert(Feature::RandomAccess);
        }
        if grammar.props().context.is_some() {
            features.insert(Feature::Context);
        }
        Self { features }
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// One rewrite pass. `run` reports whether it changed the module.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&mut self, module: &mut ParserModule, features: &FeatureSet) -> bool;
}

/// Run all passes to a fixpoint (bounded by [OPTIMIZER_CAP]).
pub fn optimize(module: &mut ParserModule, features: &FeatureSet) {
    let mut all: Vec<Box<dyn Pass>> = vec![
        Box::new(passes::FeatureRequirements),
        Box::new(passes::DeadCodeStatic),
        Box::new(passes::Peephole),
        Box::new(passes::FlattenBlocks),
        Box::new(passes::DeadCodeCfg),
        Box::new(passes::ConstantPropagation),
        Box::new(passes::RemoveUnusedParameters),
    ];
    for round in 0..OPTIMIZER_CAP {
        let mut changed = false;
        for pass in &mut all {
            let pass_changed = pass.run(module, features);
            if pass_changed {
                debug_log(
                    "parser-ir",
                    &format!("optimizer round {}: {} changed {}", round, pass.name(), module.unit),
                );
            }
            changed |= pass_changed;
        }
        if !changed {
            break;
        }
    }
}
