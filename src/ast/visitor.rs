use crate::ast::{Ctor, Declaration, Expression, Item, Node, NodeKind, Statement};

/// Pre-order traversal: the parent is visited before its children.
pub fn walk_pre<F: FnMut(&Node)>(node: &Node, f: &mut F) {
    f(node);
    for child in &node.children {
        walk_pre(child, f);
    }
}

/// Post-order traversal: children are visited before their parent.
pub fn walk_post<F: FnMut(&Node)>(node: &Node, f: &mut F) {
    for child in &node.children {
        walk_post(child, f);
    }
    f(node);
}

/// Mutating pre-order traversal. The callback may rewrite the node in place,
/// including replacing children; newly inserted children are themselves
/// visited afterwards.
pub fn walk_pre_mut<F: FnMut(&mut Node)>(node: &mut Node, f: &mut F) {
    f(node);
    for child in &mut node.children {
        walk_pre_mut(child, f);
    }
}

/// Mutating post-order traversal.
pub fn walk_post_mut<F: FnMut(&mut Node)>(node: &mut Node, f: &mut F) {
    for child in &mut node.children {
        walk_post_mut(child, f);
    }
    f(node);
}

/// A closed dispatcher over the node categories. Implementations override
/// the hooks for the categories they care about; dispatch is a closed match,
/// so adding a category is a compile error until every dispatcher handles it.
pub trait Dispatcher {
    fn on_decl(&mut self, _node: &Node, _decl: &Declaration) {}
    fn on_expr(&mut self, _node: &Node, _expr: &Expression) {}
    fn on_stmt(&mut self, _node: &Node, _stmt: &Statement) {}
    fn on_ctor(&mut self, _node: &Node, _ctor: &Ctor) {}
    fn on_item(&mut self, _node: &Node, _item: &Item) {}
}

fn dispatch_one<D: Dispatcher>(node: &Node, dispatcher: &mut D) {
    match &node.kind {
        NodeKind::Decl(d) => dispatcher.on_decl(node, d),
        NodeKind::Expr(e) => dispatcher.on_expr(node, e),
        NodeKind::Stmt(s) => dispatcher.on_stmt(node, s),
        NodeKind::Ctor(c) => dispatcher.on_ctor(node, c),
        NodeKind::Item(i) => dispatcher.on_item(node, i),
    }
}

/// Dispatch the subtree in pre-order.
pub fn dispatch_pre<D: Dispatcher>(node: &Node, dispatcher: &mut D) {
    dispatch_one(node, dispatcher);
    for child in &node.children {
        dispatch_pre(child, dispatcher);
    }
}

/// Dispatch the subtree in post-order.
pub fn dispatch_post<D: Dispatcher>(node: &Node, dispatcher: &mut D) {
    for child in &node.children {
        dispatch_post(child, dispatcher);
    }
    dispatch_one(node, dispatcher);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ctor, NodeKind};
    use crate::Context;

    #[test]
    fn order_guarantees() {
        let mut ctx = Context::new();
        let leaf_a = ctx.make(NodeKind::Ctor(Ctor::UInt { width: 8, value: 1 }), vec![]);
        let leaf_b = ctx.make(NodeKind::Ctor(Ctor::UInt { width: 8, value: 2 }), vec![]);
        let root = ctx.make(NodeKind::Ctor(Ctor::Tuple), vec![leaf_a, leaf_b]);

        let mut pre = Vec::new();
        walk_pre(&root, &mut |n| pre.push(n.id()));
        assert_eq!(pre[0], root.id());

        let mut post = Vec::new();
        walk_post(&root, &mut |n| post.push(n.id()));
        assert_eq!(*post.last().unwrap(), root.id());
        assert_eq!(post.len(), 3);
    }
}
