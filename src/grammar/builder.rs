use crate::ast::{property, AttrKind, Ctor, FieldForm, HookKind, Item, Node};
use crate::diagnostics::DiagnosticKind;
use crate::grammar::{
    ByteOrder, FieldRef, Grammar, HookRef, Production, ProductionKind, Symbol, UnitProps,
    VarShape, WhileKind, field_value_type,
};
use crate::scope::{DeclInfoKind, DeclTable};
use crate::types::{QualifiedType, Type};
use crate::util::debug_log;
use crate::{Context, Location};
use std::collections::BTreeMap;

/// Lower one resolved unit declaration into its grammar. Returns [None]
/// when lowering recorded diagnostics that make the grammar unusable; the
/// caller still continues with the remaining units.
pub fn build_grammar(
    ctx: &mut Context,
    unit_node: &Node,
    qualified: &str,
    decls: &DeclTable,
) -> Option<Grammar> {
    let short = qualified.rsplit("::").next().unwrap_or(qualified).to_string();
    let mut builder = Builder {
        ctx,
        decls,
        unit: qualified.to_string(),
        short: short.clone(),
        table: BTreeMap::new(),
        anon: 0,
        patches: Vec::new(),
        failed: false,
    };

    let mut props = UnitProps::default();
    let mut byte_order = ByteOrder::Big;
    let mut hooks = Vec::new();
    let mut sinks = Vec::new();

    // Hooks and properties first: field lowering consults them.
    for item_node in &unit_node.children {
        match item_node.as_item() {
            Some(Item::Hook { kind, priority }) => hooks.push(HookRef {
                kind: kind.clone(),
                priority: *priority,
                body: item_node.child(0).clone(),
            }),
            Some(Item::Property { id }) => {
                builder.property(item_node, id, &mut props, &mut byte_order)
            }
            Some(Item::Sink {
                id,
                policy,
                auto_trim,
            }) => sinks.push((id.clone(), *policy, *auto_trim)),
            _ => {}
        }
    }

    let mut elements = Vec::new();
    for item_node in &unit_node.children {
        match item_node.as_item() {
            Some(Item::Field { .. }) => {
                if let Some(symbol) = builder.lower_field(item_node, &hooks) {
                    elements.push(symbol);
                }
            }
            Some(Item::Switch { .. }) => {
                if let Some(symbol) = builder.lower_switch(item_node, &hooks) {
                    elements.push(symbol);
                }
            }
            Some(Item::UnresolvedField { .. }) => {
                builder.error(
                    DiagnosticKind::UnresolvedId,
                    format!("{} survived resolution", item_node.label()),
                    item_node.meta.location().cloned(),
                );
            }
            _ => {}
        }
    }

    // Phase end: patch every deferred forward reference.
    let patches = std::mem::take(&mut builder.patches);
    for (deferred, target) in patches {
        match builder.table.get_mut(&deferred) {
            Some(Production {
                kind: ProductionKind::Deferred { resolved },
                ..
            }) => *resolved = Some(target),
            _ => crate::diagnostics::internal_error!(
                "patch target '{}' is not a deferred production",
                deferred
            ),
        }
    }

    let body = builder.insert(
        Symbol(format!("{}_body", short)),
        ProductionKind::Sequence { elements },
        unit_node.meta.location().cloned(),
    );
    let root = builder.insert(
        Symbol(short),
        ProductionKind::Unit {
            unit: qualified.to_string(),
            body,
        },
        unit_node.meta.location().cloned(),
    );

    if builder.failed {
        return None;
    }

    let grammar = Grammar {
        name: qualified.to_string(),
        root,
        table: builder.table,
        tokens: BTreeMap::new(),
        token_by_symbol: Default::default(),
        nullable: Default::default(),
        first: Default::default(),
        follow: Default::default(),
        byte_order,
        props,
        hooks,
        sinks,
        location: unit_node.meta.location().cloned(),
    };
    debug_log("grammar", &format!("built grammar for {}", qualified));
    Some(grammar)
}

struct Builder<'a, 'c> {
    ctx: &'c mut Context,
    decls: &'a DeclTable,
    unit: String,
    short: String,
    table: BTreeMap<Symbol, Production>,
    anon: usize,
    /// Deferred symbol to its resolved target, applied at phase end.
    patches: Vec<(Symbol, Symbol)>,
    failed: bool,
}

impl<'a, 'c> Builder<'a, 'c> {
    fn error(&mut self, kind: DiagnosticKind, message: String, location: Option<Location>) {
        self.ctx.sink.error(
            kind,
            format!("{} (in unit {})", message, self.unit),
            location,
        );
        self.failed = true;
    }

    fn fresh(&mut self, hint: &str) -> Symbol {
        let base = format!("{}_{}", self.short, hint);
        if !self.table.contains_key(&Symbol(base.clone())) {
            return Symbol(base);
        }
        loop {
            self.anon += 1;
            let candidate = Symbol(format!("{}_{}", base, self.anon));
            if !self.table.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn insert(
        &mut self,
        symbol: Symbol,
        kind: ProductionKind,
        location: Option<Location>,
    ) -> Symbol {
        let previous = self.table.insert(
            symbol.clone(),
            Production {
                symbol: symbol.clone(),
                location,
                kind,
            },
        );
        if previous.is_some() {
            crate::diagnostics::internal_error!("duplicate grammar symbol '{}'", symbol);
        }
        symbol
    }

    fn defer(&mut self, hint: &str) -> Symbol {
        let symbol = self.fresh(hint);
        self.insert(symbol.clone(), ProductionKind::Deferred { resolved: None }, None)
    }

    fn patch(&mut self, deferred: Symbol, target: Symbol) {
        self.patches.push((deferred, target));
    }

    fn property(
        &mut self,
        node: &Node,
        id: &str,
        props: &mut UnitProps,
        byte_order: &mut ByteOrder,
    ) {
        let string_value = node
            .children
            .first()
            .and_then(|v| v.children.first().or(Some(v)))
            .and_then(|v| v.as_ctor())
            .and_then(|c| match c {
                Ctor::Str(s) => Some(s.clone()),
                Ctor::Bytes(b) => String::from_utf8(b.clone()).ok(),
                _ => None,
            });
        match id {
            property::BYTE_ORDER => match string_value.as_deref() {
                Some("big") => *byte_order = ByteOrder::Big,
                Some("little") => *byte_order = ByteOrder::Little,
                other => self.error(
                    DiagnosticKind::InvalidAttribute,
                    format!(
                        "%byte-order must be \"big\" or \"little\", not {:?}",
                        other
                    ),
                    node.meta.location().cloned(),
                ),
            },
            property::MIME_TYPE => match string_value {
                Some(s) => props.mime_types.push(s),
                None => self.error(
                    DiagnosticKind::InvalidAttribute,
                    "%mime-type needs a string value".into(),
                    node.meta.location().cloned(),
                ),
            },
            property::DESCRIPTION => props.description = string_value,
            property::RANDOM_ACCESS => props.random_access = true,
            property::SYNCHRONIZE_AT => {
                props.synchronize_at = node.children.first().cloned()
            }
            property::CONTEXT => match string_value {
                Some(s) => props.context = Some(s),
                None => self.error(
                    DiagnosticKind::InvalidAttribute,
                    "%context needs the context type's name".into(),
                    node.meta.location().cloned(),
                ),
            },
            _ => {}
        }
    }

    fn field_ref(&self, field_node: &Node, id: &Option<String>, skip: bool) -> Option<FieldRef> {
        if skip {
            return None;
        }
        Some(FieldRef {
            id: id.clone(),
            value_ty: field_value_type(field_node),
            convert: field_node.attr_value(AttrKind::Convert).cloned(),
            requires: field_node.attr_value(AttrKind::Requires).cloned(),
        })
    }

    fn lower_field(&mut self, field_node: &Node, hooks: &[HookRef]) -> Option<Symbol> {
        let (id, form, skip) = match field_node.item() {
            Item::Field { id, form, skip } => (id.clone(), form.clone(), *skip),
            _ => return None,
        };
        let location = field_node.meta.location().cloned();
        let hint = id.clone().unwrap_or_else(|| {
            self.anon += 1;
            format!("anon_{}", self.anon)
        });
        let field = self.field_ref(field_node, &id, skip);

        match form {
            FieldForm::Literal => {
                let ctor = field_node.field_ctors().next()?.clone();
                // A counted literal repeats the token itself.
                if let Some(expr) = field_node.attr_value(AttrKind::Count).cloned() {
                    let body_symbol = self.fresh(&format!("{}_elem", hint));
                    let body = self.insert(
                        body_symbol,
                        ProductionKind::Ctor { ctor, field: None },
                        location.clone(),
                    );
                    let symbol = self.fresh(&hint);
                    return Some(self.insert(
                        symbol,
                        ProductionKind::Counter { expr, body, field },
                        location,
                    ));
                }
                let symbol = self.fresh(&hint);
                Some(self.insert(symbol, ProductionKind::Ctor { ctor, field }, location))
            }
            FieldForm::Alternatives => {
                let ctors: Vec<Node> = field_node.field_ctors().cloned().collect();
                let mut alternatives = Vec::new();
                for (index, ctor_node) in ctors.into_iter().enumerate() {
                    let symbol = self.fresh(&format!("{}_alt{}", hint, index + 1));
                    alternatives.push(self.insert(
                        symbol,
                        ProductionKind::Ctor {
                            ctor: ctor_node,
                            field: field.clone(),
                        },
                        location.clone(),
                    ));
                }
                self.fold_alternatives(&hint, alternatives, location)
            }
            FieldForm::Typed(qt) => self.lower_typed_field(
                field_node, &hint, qt, field, skip, hooks, location,
            ),
        }
    }

    fn lower_typed_field(
        &mut self,
        field_node: &Node,
        hint: &str,
        qt: QualifiedType,
        field: Option<FieldRef>,
        skip: bool,
        hooks: &[HookRef],
        location: Option<Location>,
    ) -> Option<Symbol> {
        let concrete = self.concrete_type(&qt.ty);
        let count = field_node.attr_value(AttrKind::Count).cloned();
        let until = field_node.attr_value(AttrKind::Until).cloned();
        let size = field_node.attr_value(AttrKind::Size).cloned();
        let eod = field_node.has_attr(AttrKind::Eod);
        let chunked = field_node.has_attr(AttrKind::Chunked);

        // Bytes fields read through the built-in bytes parser, bounded by
        // their terminator attributes.
        if matches!(concrete, Type::Bytes) {
            if skip {
                if let Some(bytes) = size {
                    let symbol = self.fresh(hint);
                    return Some(self.insert(
                        symbol,
                        ProductionKind::Skip { bytes },
                        location,
                    ));
                }
            }
            let symbol = self.fresh(hint);
            return Some(self.insert(
                symbol,
                ProductionKind::Variable {
                    ty: QualifiedType::rvalue(Type::Bytes),
                    shape: VarShape::Bytes {
                        size,
                        until,
                        eod,
                        chunked,
                    },
                    field,
                },
                location,
            ));
        }

        let (element_ty, is_container) = match &concrete {
            Type::Vector(e) | Type::List(e) => ((**e).clone(), true),
            other => (other.clone(), false),
        };
        let repeated = is_container || count.is_some() || until.is_some() || eod;

        if !repeated {
            let symbol = self.fresh(hint);
            let kind = self.scalar_production(&concrete, field, field_node);
            return Some(self.insert(symbol, kind, location));
        }

        let body_hint = format!("{}_elem", hint);
        let body = {
            let symbol = self.fresh(&body_hint);
            let element_concrete = self.concrete_type(&element_ty);
            let kind = self.scalar_production(&element_concrete, None, field_node);
            self.insert(symbol, kind, location.clone())
        };

        let symbol = self.fresh(hint);
        let kind = if let Some(expr) = count {
            ProductionKind::Counter { expr, body, field }
        } else if let Some(expr) = until {
            ProductionKind::While {
                kind: WhileKind::Until(expr),
                body,
                field,
            }
        } else if let Some(expr) = size {
            ProductionKind::While {
                kind: WhileKind::Size(expr),
                body,
                field,
            }
        } else {
            let has_foreach = field
                .as_ref()
                .and_then(|f| f.id.as_ref())
                .map(|id| {
                    hooks
                        .iter()
                        .any(|h| matches!(&h.kind, HookKind::ForEach(f) if f == id))
                })
                .unwrap_or(false);
            if has_foreach {
                ProductionKind::ForEach {
                    body,
                    eod_ok: true,
                    field,
                }
            } else if eod {
                ProductionKind::While {
                    kind: WhileKind::Eod,
                    body,
                    field,
                }
            } else {
                self.error(
                    DiagnosticKind::InvalidAttribute,
                    format!(
                        "container field '{}' needs &count, &until, &size, &eod, or a foreach hook",
                        hint
                    ),
                    location.clone(),
                );
                ProductionKind::While {
                    kind: WhileKind::Eod,
                    body,
                    field,
                }
            }
        };
        Some(self.insert(symbol, kind, location))
    }

    fn scalar_production(
        &mut self,
        concrete: &Type,
        field: Option<FieldRef>,
        field_node: &Node,
    ) -> ProductionKind {
        match concrete {
            Type::UInt(width) => ProductionKind::Variable {
                ty: QualifiedType::rvalue(concrete.clone()),
                shape: VarShape::Numeric {
                    width: *width,
                    signed: false,
                },
                field,
            },
            Type::SInt(width) => ProductionKind::Variable {
                ty: QualifiedType::rvalue(concrete.clone()),
                shape: VarShape::Numeric {
                    width: *width,
                    signed: true,
                },
                field,
            },
            Type::Bitfield { width, .. } => ProductionKind::Variable {
                ty: QualifiedType::rvalue(concrete.clone()),
                shape: VarShape::Bitfield { width: *width },
                field,
            },
            Type::Bytes => ProductionKind::Variable {
                ty: QualifiedType::rvalue(Type::Bytes),
                shape: VarShape::Bytes {
                    size: None,
                    until: None,
                    eod: false,
                    chunked: false,
                },
                field,
            },
            Type::Name(qualified) => match self.decls.get(qualified).map(|i| &i.kind) {
                Some(DeclInfoKind::Unit { .. }) => ProductionKind::TypeLiteral {
                    unit: qualified.clone(),
                    field,
                },
                _ => {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        format!("type {} has no built-in parser", qualified),
                        field_node.meta.location().cloned(),
                    );
                    ProductionKind::Variable {
                        ty: QualifiedType::rvalue(concrete.clone()),
                        shape: VarShape::Opaque,
                        field,
                    }
                }
            },
            Type::Reference { inner, .. } => {
                // Recursive unit fields are reference-wrapped; parsing sees
                // through the wrapper.
                let concrete = self.concrete_type(inner);
                self.scalar_production(&concrete, field, field_node)
            }
            other => {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    format!("type {} has no built-in parser", other),
                    field_node.meta.location().cloned(),
                );
                ProductionKind::Variable {
                    ty: QualifiedType::rvalue(other.clone()),
                    shape: VarShape::Opaque,
                    field,
                }
            }
        }
    }

    /// Resolve through alias declarations to the underlying type.
    fn concrete_type(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        let mut guard = 0;
        while let Type::Name(qualified) = &current {
            match self.decls.get(qualified).map(|i| &i.kind) {
                Some(DeclInfoKind::Alias { ty }) if guard < 32 => {
                    current = ty.ty.clone();
                    guard += 1;
                }
                _ => break,
            }
        }
        current
    }

    /// Fold alternatives right-to-left into a chain of binary look-ahead
    /// productions. Each alternative is entered through a deferred symbol
    /// allocated up front, so the chain can be constructed before the
    /// alternatives exist; the deferreds are patched at phase end.
    fn fold_alternatives(
        &mut self,
        hint: &str,
        alternatives: Vec<Symbol>,
        location: Option<Location>,
    ) -> Option<Symbol> {
        match alternatives.len() {
            0 => None,
            1 => Some(alternatives.into_iter().next().unwrap()),
            _ => {
                let mut iter = alternatives.into_iter().rev();
                let mut chain = iter.next().unwrap();
                for (index, alternative) in iter.enumerate() {
                    let symbol = self.fresh(&format!("{}_la{}", hint, index + 1));
                    chain = self.insert(
                        symbol,
                        ProductionKind::LookAhead {
                            alt_a: alternative,
                            alt_b: chain,
                            lahs_a: Default::default(),
                            lahs_b: Default::default(),
                        },
                        location.clone(),
                    );
                }
                Some(chain)
            }
        }
    }

    fn lower_switch(&mut self, switch_node: &Node, hooks: &[HookRef]) -> Option<Symbol> {
        let has_discriminant = match switch_node.item() {
            Item::Switch { has_discriminant } => *has_discriminant,
            _ => return None,
        };
        let location = switch_node.meta.location().cloned();

        let mut cases: Vec<(Vec<Node>, Symbol)> = Vec::new();
        let mut default: Option<Symbol> = None;
        let mut alternatives: Vec<Symbol> = Vec::new();

        for case_node in &switch_node.children {
            let (is_default, labels) = match case_node.as_item() {
                Some(Item::SwitchCase { is_default, labels }) => (*is_default, *labels),
                _ => continue,
            };
            // Forward reference: the case body is entered through a
            // deferred symbol and lowered afterwards.
            let deferred = self.defer("case");
            let mut items = Vec::new();
            for item_node in case_node.children.iter().skip(labels) {
                match item_node.as_item() {
                    Some(Item::Field { .. }) => {
                        if let Some(s) = self.lower_field(item_node, hooks) {
                            items.push(s);
                        }
                    }
                    Some(Item::Switch { .. }) => {
                        if let Some(s) = self.lower_switch(item_node, hooks) {
                            items.push(s);
                        }
                    }
                    _ => {}
                }
            }
            let block_symbol = self.fresh("case_block");
            let block = self.insert(
                block_symbol,
                ProductionKind::Block { items },
                case_node.meta.location().cloned(),
            );
            self.patch(deferred.clone(), block);

            if is_default {
                default = Some(deferred.clone());
            } else {
                let label_exprs: Vec<Node> =
                    case_node.children.iter().take(labels).cloned().collect();
                cases.push((label_exprs, deferred.clone()));
            }
            alternatives.push(deferred);
        }

        if has_discriminant {
            let expr = switch_node.child(0).clone();
            let symbol = self.fresh("switch");
            Some(self.insert(
                symbol,
                ProductionKind::Switch {
                    expr,
                    cases,
                    default,
                },
                location,
            ))
        } else {
            // A switch without a discriminant selects its case by
            // look-ahead.
            self.fold_alternatives("switch", alternatives, location)
        }
    }
}
