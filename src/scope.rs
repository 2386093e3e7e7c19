//! Lexical scopes and the declaration table.
//!
//! The scope builder runs one pre-order pass over the module trees, pushing
//! a scope for each module, unit, function, and block, and registering every
//! declaration under both its unqualified id and its fully qualified path.
//! Scopes are bound once and read-only afterwards; the declaration *table*,
//! which snapshots the current type of each declaration, is rebuilt by the
//! resolver between sweeps because resolution narrows those types.

use crate::ast::{Declaration, Item, Node, NodeKind, Statement};
use crate::types::{QualifiedType, Type};
use crate::NodeId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum DeclInfoKind {
    Module,
    Unit {
        params: Vec<(String, QualifiedType)>,
        items: Vec<(String, QualifiedType)>,
    },
    Enum {
        labels: Vec<(String, i64)>,
    },
    EnumLabel {
        enum_name: String,
        value: i64,
    },
    Alias {
        ty: QualifiedType,
    },
    Function {
        params: Vec<(String, QualifiedType)>,
        result: QualifiedType,
    },
    Value {
        ty: QualifiedType,
    },
}

#[derive(Debug, Clone)]
pub struct DeclInfo {
    pub node: NodeId,
    pub qualified: String,
    pub kind: DeclInfoKind,
}

#[derive(Debug, Default)]
/// Snapshot of every declaration reachable from the compiled modules, keyed
/// by fully qualified path.
pub struct DeclTable {
    map: HashMap<String, DeclInfo>,
}

impl DeclTable {
    pub fn get(&self, qualified: &str) -> Option<&DeclInfo> {
        self.map.get(qualified)
    }

    pub fn insert(&mut self, info: DeclInfo) {
        self.map.insert(info.qualified.clone(), info);
    }

    pub fn unit_item_type(&self, unit: &str, item: &str) -> Option<&QualifiedType> {
        match self.get(unit).map(|i| &i.kind) {
            Some(DeclInfoKind::Unit { items, params }) => items
                .iter()
                .chain(params.iter())
                .find(|(id, _)| id == item)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }

    /// Collect declaration snapshots from the module trees. Run between
    /// resolver sweeps so the table reflects freshly narrowed types.
    pub fn collect(modules: &[Node]) -> DeclTable {
        let mut table = DeclTable::default();
        for module in modules {
            let module_id = match module.decl() {
                Declaration::Module { id } => id.clone(),
                decl => {
                    crate::diagnostics::internal_error!(
                        "top-level node is not a module: {}",
                        decl.id()
                    )
                }
            };
            table.insert(DeclInfo {
                node: module.id(),
                qualified: module_id.clone(),
                kind: DeclInfoKind::Module,
            });
            for decl_node in &module.children {
                let decl = match decl_node.as_decl() {
                    Some(d) => d,
                    None => continue,
                };
                let qualified = format!("{}::{}", module_id, decl.id());
                let decl_path = qualified.clone();
                match decl {
                    Declaration::TypeAlias { ty, .. } => table.insert(DeclInfo {
                        node: decl_node.id(),
                        qualified,
                        kind: DeclInfoKind::Alias { ty: ty.clone() },
                    }),
                    Declaration::Enum { labels, .. } => {
                        for (label, value) in labels {
                            table.insert(DeclInfo {
                                node: decl_node.id(),
                                qualified: format!("{}::{}", qualified, label),
                                kind: DeclInfoKind::EnumLabel {
                                    enum_name: qualified.clone(),
                                    value: *value,
                                },
                            });
                        }
                        table.insert(DeclInfo {
                            node: decl_node.id(),
                            qualified,
                            kind: DeclInfoKind::Enum {
                                labels: labels.clone(),
                            },
                        })
                    }
                    Declaration::Unit { params, .. } => {
                        let mut items = Vec::new();
                        for item_node in &decl_node.children {
                            match item_node.as_item() {
                                Some(Item::Field { id: Some(id), .. }) => items.push((
                                    id.clone(),
                                    crate::grammar::field_value_type(item_node),
                                )),
                                Some(Item::Variable { id, ty }) => {
                                    items.push((id.clone(), ty.clone()))
                                }
                                Some(Item::Sink { id, .. }) => items
                                    .push((id.clone(), QualifiedType::lvalue(Type::Sink))),
                                _ => {}
                            }
                        }
                        // Items and parameters are also addressable by
                        // their own qualified paths.
                        for (id, ty) in items.iter().chain(params.iter()) {
                            table.insert(DeclInfo {
                                node: decl_node.id(),
                                qualified: format!("{}::{}", qualified, id),
                                kind: DeclInfoKind::Value { ty: ty.clone() },
                            });
                        }
                        table.insert(DeclInfo {
                            node: decl_node.id(),
                            qualified,
                            kind: DeclInfoKind::Unit {
                                params: params.clone(),
                                items,
                            },
                        })
                    }
                    Declaration::Function { params, result, .. } => table.insert(DeclInfo {
                        node: decl_node.id(),
                        qualified,
                        kind: DeclInfoKind::Function {
                            params: params.clone(),
                            result: result.clone(),
                        },
                    }),
                    Declaration::Global { ty, .. } | Declaration::Local { ty, .. } => {
                        table.insert(DeclInfo {
                            node: decl_node.id(),
                            qualified,
                            kind: DeclInfoKind::Value { ty: ty.clone() },
                        })
                    }
                    Declaration::Module { .. } | Declaration::Import { .. } => {}
                }
                // Locals declared in nested blocks (hook and function
                // bodies) resolve under the enclosing declaration's path.
                let top = decl_node.id();
                crate::ast::walk_pre(decl_node, &mut |node| {
                    if node.id() == top {
                        return;
                    }
                    if let NodeKind::Decl(Declaration::Local { id, ty }) = &node.kind {
                        table.insert(DeclInfo {
                            node: node.id(),
                            qualified: format!("{}::{}", decl_path, id),
                            kind: DeclInfoKind::Value { ty: ty.clone() },
                        });
                    }
                });
            }
        }
        table
    }
}

#[derive(Debug)]
pub struct Scope {
    parent: Option<usize>,
    /// Unqualified id to fully qualified path.
    entries: HashMap<String, String>,
    /// Import alias to module name.
    imports: HashMap<String, String>,
}

#[derive(Debug, Default)]
/// All scopes of one compilation, indexed by the node that introduced them.
pub struct ScopeSet {
    scopes: Vec<Scope>,
    by_node: HashMap<NodeId, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Unique binding to a fully qualified path.
    Found(String),
    Missing,
    /// The same unqualified id is visible through more than one import.
    Ambiguous(Vec<String>),
}

impl ScopeSet {
    pub fn scope_of(&self, node: NodeId) -> Option<usize> {
        self.by_node.get(&node).copied()
    }

    /// Resolve `id` starting from `scope`, walking outwards. `id` may be a
    /// qualified path; its first segment is then matched against import
    /// aliases and visible declarations.
    pub fn lookup(&self, scope: usize, id: &str) -> Lookup {
        match id.split_once("::") {
            None => self.lookup_plain(scope, id),
            Some((head, rest)) => match self.lookup_plain(scope, head) {
                Lookup::Found(qualified) => Lookup::Found(format!("{}::{}", qualified, rest)),
                Lookup::Missing => {
                    // The head may name an imported module directly.
                    match self.lookup_import(scope, head) {
                        Some(module) => Lookup::Found(format!("{}::{}", module, rest)),
                        None => Lookup::Missing,
                    }
                }
                ambiguous => ambiguous,
            },
        }
    }

    fn lookup_plain(&self, scope: usize, id: &str) -> Lookup {
        let mut current = Some(scope);
        while let Some(index) = current {
            let s = &self.scopes[index];
            match (s.entries.get(id), s.imports.get(id)) {
                (Some(entry), Some(import)) if entry != import => {
                    return Lookup::Ambiguous(vec![entry.clone(), import.clone()]);
                }
                (Some(entry), _) => return Lookup::Found(entry.clone()),
                (None, Some(import)) => return Lookup::Found(import.clone()),
                (None, None) => {}
            }
            current = s.parent;
        }
        Lookup::Missing
    }

    fn lookup_import(&self, scope: usize, alias: &str) -> Option<String> {
        let mut current = Some(scope);
        while let Some(index) = current {
            if let Some(module) = self.scopes[index].imports.get(alias) {
                return Some(module.clone());
            }
            current = self.scopes[index].parent;
        }
        None
    }

    fn push(&mut self, parent: Option<usize>, node: NodeId) -> usize {
        let index = self.scopes.len();
        self.scopes.push(Scope {
            parent,
            entries: HashMap::new(),
            imports: HashMap::new(),
        });
        self.by_node.insert(node, index);
        index
    }

    fn bind(&mut self, scope: usize, id: &str, qualified: String) -> bool {
        self.scopes[scope]
            .entries
            .insert(id.to_string(), qualified)
            .is_none()
    }
}

/// Build the scope tree for a set of module roots.
pub fn build_scopes(modules: &[Node]) -> ScopeSet {
    let mut set = ScopeSet::default();
    for module in modules {
        let module_id = match module.decl() {
            Declaration::Module { id } => id.clone(),
            _ => continue,
        };
        let scope = set.push(None, module.id());
        set.bind(scope, &module_id, module_id.clone());
        for decl_node in &module.children {
            if let Some(decl) = decl_node.as_decl() {
                match decl {
                    Declaration::Import { module, alias } => {
                        let local = alias.as_deref().unwrap_or(module);
                        set.scopes[scope]
                            .imports
                            .insert(local.to_string(), module.clone());
                    }
                    _ => {
                        let qualified = format!("{}::{}", module_id, decl.id());
                        set.bind(scope, decl.id(), qualified.clone());
                        build_decl_scope(&mut set, scope, decl_node, &qualified);
                    }
                }
            }
        }
    }
    set
}

fn build_decl_scope(set: &mut ScopeSet, parent: usize, decl_node: &Node, qualified: &str) {
    match decl_node.decl() {
        Declaration::Unit { params, .. } => {
            let scope = set.push(Some(parent), decl_node.id());
            for (id, _) in params {
                set.bind(scope, id, format!("{}::{}", qualified, id));
            }
            for item_node in &decl_node.children {
                if let Some(item) = item_node.as_item() {
                    match item {
                        Item::Field { id: Some(id), .. }
                        | Item::Variable { id, .. }
                        | Item::Sink { id, .. }
                        | Item::UnresolvedField { id: Some(id), .. } => {
                            set.bind(scope, id, format!("{}::{}", qualified, id));
                        }
                        _ => {}
                    }
                }
                // Hook bodies get their own block scopes.
                for child in &item_node.children {
                    build_block_scopes(set, scope, child, qualified);
                }
            }
        }
        Declaration::Function { params, .. } => {
            let scope = set.push(Some(parent), decl_node.id());
            for (id, _) in params {
                set.bind(scope, id, format!("{}::{}", qualified, id));
            }
            for child in &decl_node.children {
                build_block_scopes(set, scope, child, qualified);
            }
        }
        _ => {}
    }
}

fn build_block_scopes(set: &mut ScopeSet, parent: usize, node: &Node, qualified: &str) {
    let parent = match &node.kind {
        NodeKind::Stmt(Statement::Block) => {
            let scope = set.push(Some(parent), node.id());
            for stmt in &node.children {
                if let NodeKind::Decl(Declaration::Local { id, .. }) = &stmt.kind {
                    set.bind(scope, id, format!("{}::{}", qualified, id));
                }
            }
            scope
        }
        _ => parent,
    };
    for child in &node.children {
        build_block_scopes(set, parent, child, qualified);
    }
}
