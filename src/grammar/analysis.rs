use crate::diagnostics::{internal_error, DiagnosticKind, DiagnosticSink};
use crate::grammar::production::literal_repr;
use crate::grammar::{Grammar, ProductionKind, Symbol, TokenId, TokenLit, EOD};
use crate::util::debug_log;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

/// Run the grammar analysis: verify the table is closed, assign token IDs,
/// compute the nullable/FIRST/FOLLOW fixpoint, and fill in the look-ahead
/// sets with their disjointness check. Returns whether the grammar was
/// accepted; rejections are recorded in the sink.
pub fn analyze(grammar: &mut Grammar, sink: &mut DiagnosticSink) -> bool {
    let mut ok = true;
    for production in grammar.table.values() {
        if let ProductionKind::Deferred { resolved: None } = &production.kind {
            internal_error!(
                "unpatched deferred production '{}' in grammar '{}'",
                production.symbol,
                grammar.name
            );
        }
        for child in production.children() {
            if !grammar.table.contains_key(child) {
                sink.error(
                    DiagnosticKind::UnresolvedId,
                    format!(
                        "grammar symbol '{}' referenced from '{}' does not exist in unit {}",
                        child, production.symbol, grammar.name
                    ),
                    production.location.clone(),
                );
                ok = false;
            }
        }
    }
    if !ok {
        return false;
    }

    assign_tokens(grammar);
    compute_nullable(grammar);
    compute_first(grammar);
    compute_follow(grammar);
    let accepted = compute_look_ahead(grammar, sink);
    debug_log(
        "grammar",
        &format!(
            "analysis of {}: {} symbols, {} tokens, accepted={}",
            grammar.name,
            grammar.table.len(),
            grammar.tokens.len(),
            accepted
        ),
    );
    accepted
}

/// Token IDs come from hashing the literal's unified representation; a
/// collision between distinct literals re-hashes with an incrementing salt.
/// Identical literals share one ID, which is what makes duplicated
/// alternatives collide in their look-ahead sets later.
fn assign_tokens(grammar: &mut Grammar) {
    let mut by_repr: HashMap<String, TokenId> = HashMap::new();
    let symbols: Vec<Symbol> = grammar.table.keys().cloned().collect();
    for symbol in symbols {
        let ctor = match &grammar.table[&symbol].kind {
            ProductionKind::Ctor { ctor, .. } => ctor.clone(),
            _ => continue,
        };
        let repr = literal_repr(ctor.ctor());
        let id = match by_repr.get(&repr) {
            Some(id) => *id,
            None => {
                let mut salt: u64 = 0;
                let id = loop {
                    let mut hasher = DefaultHasher::new();
                    repr.hash(&mut hasher);
                    salt.hash(&mut hasher);
                    let candidate = TokenId(hasher.finish());
                    let taken = candidate == EOD
                        || grammar
                            .tokens
                            .get(&candidate)
                            .map_or(false, |t| t.repr != repr);
                    if !taken {
                        break candidate;
                    }
                    salt += 1;
                };
                by_repr.insert(repr.clone(), id);
                grammar.tokens.insert(
                    id,
                    TokenLit {
                        id,
                        repr: repr.clone(),
                        ctor,
                    },
                );
                id
            }
        };
        grammar.token_by_symbol.insert(symbol, id);
    }
}

fn compute_nullable(grammar: &mut Grammar) {
    let mut nullable: HashMap<Symbol, bool> = grammar
        .table
        .keys()
        .map(|s| (s.clone(), false))
        .collect();
    loop {
        let mut changed = false;
        for (symbol, production) in &grammar.table {
            let value = match &production.kind {
                ProductionKind::Epsilon => true,
                ProductionKind::Ctor { .. }
                | ProductionKind::TypeLiteral { .. }
                | ProductionKind::Variable { .. }
                | ProductionKind::Skip { .. } => false,
                ProductionKind::Reference { to } => nullable[to],
                ProductionKind::Sequence { elements }
                | ProductionKind::Block { items: elements } => {
                    elements.iter().all(|e| nullable[e])
                }
                ProductionKind::LookAhead { alt_a, alt_b, .. } => {
                    nullable[alt_a] || nullable[alt_b]
                }
                ProductionKind::Switch { cases, default, .. } => {
                    cases.iter().any(|(_, s)| nullable[s])
                        || default.as_ref().map_or(false, |d| nullable[d])
                }
                // A count of zero, a failing condition, or an immediate stop
                // all derive the empty string.
                ProductionKind::Counter { .. }
                | ProductionKind::While { .. }
                | ProductionKind::ForEach { .. } => true,
                ProductionKind::Unit { body, .. } => nullable[body],
                ProductionKind::Deferred { resolved } => {
                    resolved.as_ref().map_or(false, |s| nullable[s])
                }
            };
            if value && !nullable[symbol] {
                *nullable.get_mut(symbol).unwrap() = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    grammar.nullable = nullable;
}

fn compute_first(grammar: &mut Grammar) {
    let mut first: HashMap<Symbol, BTreeSet<TokenId>> = grammar
        .table
        .keys()
        .map(|s| (s.clone(), BTreeSet::new()))
        .collect();
    loop {
        let mut changed = false;
        for (symbol, production) in &grammar.table {
            let mut value: BTreeSet<TokenId> = BTreeSet::new();
            match &production.kind {
                ProductionKind::Ctor { .. } => {
                    if let Some(id) = grammar.token_by_symbol.get(symbol) {
                        value.insert(*id);
                    }
                }
                // Only literals contribute to look-ahead; everything a
                // `Variable` or nested unit consumes is opaque.
                ProductionKind::Epsilon
                | ProductionKind::TypeLiteral { .. }
                | ProductionKind::Variable { .. }
                | ProductionKind::Skip { .. } => {}
                ProductionKind::Reference { to } => value.extend(first[to].iter()),
                ProductionKind::Sequence { elements }
                | ProductionKind::Block { items: elements } => {
                    for element in elements {
                        value.extend(first[element].iter());
                        if !grammar.nullable[element] {
                            break;
                        }
                    }
                }
                ProductionKind::LookAhead { alt_a, alt_b, .. } => {
                    value.extend(first[alt_a].iter());
                    value.extend(first[alt_b].iter());
                }
                ProductionKind::Switch { cases, default, .. } => {
                    for (_, case) in cases {
                        value.extend(first[case].iter());
                    }
                    if let Some(d) = default {
                        value.extend(first[d].iter());
                    }
                }
                ProductionKind::Counter { body, .. }
                | ProductionKind::While { body, .. }
                | ProductionKind::ForEach { body, .. }
                | ProductionKind::Unit { body, .. } => value.extend(first[body].iter()),
                ProductionKind::Deferred { resolved } => {
                    if let Some(s) = resolved {
                        value.extend(first[s].iter());
                    }
                }
            }
            let current = first.get_mut(symbol).unwrap();
            let before = current.len();
            current.extend(value);
            if current.len() != before {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    grammar.first = first;
}

fn compute_follow(grammar: &mut Grammar) {
    let mut follow: HashMap<Symbol, BTreeSet<TokenId>> = grammar
        .table
        .keys()
        .map(|s| (s.clone(), BTreeSet::new()))
        .collect();
    follow.get_mut(&grammar.root).unwrap().insert(EOD);

    loop {
        let mut changed = false;
        let add = |map: &mut HashMap<Symbol, BTreeSet<TokenId>>,
                       target: &Symbol,
                       tokens: BTreeSet<TokenId>| {
            let set = map.get_mut(target).unwrap();
            let before = set.len();
            set.extend(tokens);
            set.len() != before
        };

        for (symbol, production) in &grammar.table {
            let inherited = follow[symbol].clone();
            match &production.kind {
                ProductionKind::Sequence { elements }
                | ProductionKind::Block { items: elements } => {
                    for (index, element) in elements.iter().enumerate() {
                        let mut tokens = BTreeSet::new();
                        let mut tail_nullable = true;
                        for later in &elements[index + 1..] {
                            tokens.extend(grammar.first[later].iter());
                            if !grammar.nullable[later] {
                                tail_nullable = false;
                                break;
                            }
                        }
                        if tail_nullable {
                            tokens.extend(inherited.iter());
                        }
                        changed |= add(&mut follow, element, tokens);
                    }
                }
                ProductionKind::Reference { to } => {
                    changed |= add(&mut follow, to, inherited.clone());
                }
                ProductionKind::LookAhead { alt_a, alt_b, .. } => {
                    changed |= add(&mut follow, alt_a, inherited.clone());
                    changed |= add(&mut follow, alt_b, inherited.clone());
                }
                ProductionKind::Switch { cases, default, .. } => {
                    for (_, case) in cases {
                        changed |= add(&mut follow, case, inherited.clone());
                    }
                    if let Some(d) = default {
                        changed |= add(&mut follow, d, inherited.clone());
                    }
                }
                ProductionKind::Counter { body, .. }
                | ProductionKind::While { body, .. }
                | ProductionKind::ForEach { body, .. } => {
                    // A repeated body may be followed by itself or by
                    // whatever follows the loop.
                    let mut tokens = grammar.first[body].clone();
                    tokens.extend(inherited.iter());
                    changed |= add(&mut follow, body, tokens);
                }
                ProductionKind::Unit { body, .. } => {
                    changed |= add(&mut follow, body, inherited.clone());
                }
                ProductionKind::Deferred { resolved } => {
                    if let Some(s) = resolved {
                        changed |= add(&mut follow, s, inherited.clone());
                    }
                }
                _ => {}
            }
        }
        if !changed {
            break;
        }
    }
    grammar.follow = follow;
}

/// Phase 3: fill every look-ahead production's sets and reject the grammar
/// when alternatives are not disjoint.
fn compute_look_ahead(grammar: &mut Grammar, sink: &mut DiagnosticSink) -> bool {
    let mut accepted = true;
    let mut updates: Vec<(Symbol, BTreeSet<TokenId>, BTreeSet<TokenId>)> = Vec::new();

    for (symbol, production) in &grammar.table {
        let (alt_a, alt_b) = match &production.kind {
            ProductionKind::LookAhead { alt_a, alt_b, .. } => (alt_a.clone(), alt_b.clone()),
            _ => continue,
        };
        let lahs = |alt: &Symbol| -> BTreeSet<TokenId> {
            let mut set = grammar.first[alt].clone();
            if grammar.nullable[alt] {
                set.extend(grammar.follow[alt].iter());
            }
            set
        };
        let lahs_a = lahs(&alt_a);
        let lahs_b = lahs(&alt_b);

        if grammar.nullable[&alt_a] && grammar.nullable[&alt_b] {
            sink.error(
                DiagnosticKind::GrammarAmbiguity,
                format!(
                    "alternatives '{}' and '{}' in unit {} can both match empty input",
                    alt_a, alt_b, grammar.name
                ),
                production.location.clone(),
            );
            accepted = false;
        }

        let colliding: Vec<TokenId> = lahs_a.intersection(&lahs_b).copied().collect();
        if !colliding.is_empty() {
            let names: Vec<String> = colliding
                .iter()
                .map(|id| match grammar.tokens.get(id) {
                    Some(lit) => lit.repr.clone(),
                    None if *id == EOD => "<eod>".into(),
                    None => format!("token {}", id.0),
                })
                .collect();
            sink.error(
                DiagnosticKind::GrammarAmbiguity,
                format!(
                    "look-ahead cannot distinguish alternatives '{}' and '{}' in unit {}: both can start with {}",
                    alt_a,
                    alt_b,
                    grammar.name,
                    names.join(", ")
                ),
                production.location.clone(),
            );
            accepted = false;
        }

        for (alt, set) in [(&alt_a, &lahs_a), (&alt_b, &lahs_b)] {
            if set.is_empty() && !grammar.nullable[alt] {
                sink.error(
                    DiagnosticKind::UnreachableAlternative,
                    format!(
                        "alternative '{}' in unit {} starts with no literal and can never be selected by look-ahead",
                        alt, grammar.name
                    ),
                    production.location.clone(),
                );
                accepted = false;
            }
        }

        updates.push((symbol.clone(), lahs_a, lahs_b));
    }

    for (symbol, lahs_a, lahs_b) in updates {
        if let Some(production) = grammar.table.get_mut(&symbol) {
            if let ProductionKind::LookAhead {
                lahs_a: a,
                lahs_b: b,
                ..
            } = &mut production.kind
            {
                *a = lahs_a;
                *b = lahs_b;
            }
        }
    }
    accepted
}
