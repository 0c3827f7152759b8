//! Depth-first syntax tree traversal with early exit.
//!
//! Each analysis defines its own visitor type; no traversal state is shared
//! between passes.

use tree_sitter::Node;

/// What the walker should do after entering a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    /// Descend into the node's children
    Continue,
    /// Do not visit this node's children, continue with its siblings
    SkipChildren,
    /// Abort the whole traversal
    Stop,
}

pub trait Visitor<'t> {
    fn enter(&mut self, node: Node<'t>) -> VisitControl;

    /// Called after all children of a node entered with `Continue` were visited
    fn leave(&mut self, _node: Node<'t>) {}
}

/// Walk `root` and its descendants in source order.
///
/// Returns `Stop` when a visitor aborted the traversal.
pub fn walk<'t, V: Visitor<'t> + ?Sized>(root: Node<'t>, visitor: &mut V) -> VisitControl {
    let mut cursor = root.walk();
    let mut depth = 0usize;

    loop {
        let node = cursor.node();
        match visitor.enter(node) {
            VisitControl::Stop => return VisitControl::Stop,
            VisitControl::Continue if cursor.goto_first_child() => {
                depth += 1;
                continue;
            }
            VisitControl::Continue => visitor.leave(node),
            VisitControl::SkipChildren => {}
        }

        // Move to the next sibling, climbing up while there is none.
        loop {
            if depth == 0 {
                return VisitControl::Continue;
            }
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return VisitControl::Continue;
            }
            depth -= 1;
            visitor.leave(cursor.node());
        }
    }
}

/// Collect every node for which `predicate` holds, in source order
pub fn collect<'t>(root: Node<'t>, predicate: impl Fn(Node<'t>) -> bool) -> Vec<Node<'t>> {
    struct Collector<'t, F> {
        predicate: F,
        found: Vec<Node<'t>>,
    }

    impl<'t, F: Fn(Node<'t>) -> bool> Visitor<'t> for Collector<'t, F> {
        fn enter(&mut self, node: Node<'t>) -> VisitControl {
            if (self.predicate)(node) {
                self.found.push(node);
            }
            VisitControl::Continue
        }
    }

    let mut collector = Collector {
        predicate,
        found: Vec::new(),
    };
    walk(root, &mut collector);
    collector.found
}

/// First node in source order satisfying `predicate`
pub fn find_first<'t>(root: Node<'t>, predicate: impl Fn(Node<'t>) -> bool) -> Option<Node<'t>> {
    struct Finder<'t, F> {
        predicate: F,
        found: Option<Node<'t>>,
    }

    impl<'t, F: Fn(Node<'t>) -> bool> Visitor<'t> for Finder<'t, F> {
        fn enter(&mut self, node: Node<'t>) -> VisitControl {
            if (self.predicate)(node) {
                self.found = Some(node);
                return VisitControl::Stop;
            }
            VisitControl::Continue
        }
    }

    let mut finder = Finder {
        predicate,
        found: None,
    };
    walk(root, &mut finder);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_go;
    use pretty_assertions::assert_eq;

    struct KindCounter {
        kind: &'static str,
        count: usize,
        stop_after: usize,
        entered: usize,
        left: usize,
    }

    impl<'t> Visitor<'t> for KindCounter {
        fn enter(&mut self, node: Node<'t>) -> VisitControl {
            self.entered += 1;
            if node.kind() == self.kind {
                self.count += 1;
                if self.count == self.stop_after {
                    return VisitControl::Stop;
                }
            }
            VisitControl::Continue
        }

        fn leave(&mut self, _node: Node<'t>) {
            self.left += 1;
        }
    }

    #[test]
    fn test_walk_visits_all_and_balances_leave() {
        let source = "package p\nfunc a() { b(); c() }\nfunc b() {}\nfunc c() {}\n";
        let tree = parse_go(source).unwrap();
        let mut counter = KindCounter {
            kind: "function_declaration",
            count: 0,
            stop_after: usize::MAX,
            entered: 0,
            left: 0,
        };
        assert_eq!(walk(tree.root_node(), &mut counter), VisitControl::Continue);
        assert_eq!(counter.count, 3);
        assert_eq!(counter.entered, counter.left);
    }

    #[test]
    fn test_walk_stops_early() {
        let source = "package p\nfunc a() {}\nfunc b() {}\nfunc c() {}\n";
        let tree = parse_go(source).unwrap();
        let mut counter = KindCounter {
            kind: "function_declaration",
            count: 0,
            stop_after: 2,
            entered: 0,
            left: 0,
        };
        assert_eq!(walk(tree.root_node(), &mut counter), VisitControl::Stop);
        assert_eq!(counter.count, 2);
    }

    #[test]
    fn test_collect_and_find_first() {
        let source = "package p\nfunc a() { x := 1; y := x }\n";
        let tree = parse_go(source).unwrap();
        let idents = collect(tree.root_node(), |n| n.kind() == "identifier");
        let names: Vec<&str> = idents
            .iter()
            .map(|n| n.utf8_text(source.as_bytes()).unwrap())
            .collect();
        assert_eq!(names, vec!["a", "x", "y", "x"]);

        let first_short = find_first(tree.root_node(), |n| n.kind() == "short_var_declaration");
        assert!(first_short.is_some());
    }
}
