//! tree-sitter-go parsing

use crate::error::{AstError, AstResult};
use crate::visitor::{walk, VisitControl, Visitor};
use tracing::trace;
use tree_sitter::{Node, Parser, Tree};

/// Parse Go source into a syntax tree.
///
/// A tree is returned even when the source has syntax errors; use
/// [`syntax_errors`] to collect them.
pub fn parse_go(source: &str) -> AstResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| AstError::parse(format!("Failed to set Go language: {:?}", e)))?;

    parser
        .parse(source, None)
        .ok_or_else(|| AstError::parse("Failed to parse Go source code"))
}

/// A syntax error located by byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

struct ErrorCollector<'s> {
    source: &'s str,
    errors: Vec<SyntaxError>,
}

impl<'t> Visitor<'t> for ErrorCollector<'_> {
    fn enter(&mut self, node: Node<'t>) -> VisitControl {
        if !node.has_error() {
            return VisitControl::SkipChildren;
        }
        if node.is_missing() {
            self.errors.push(SyntaxError {
                start: node.start_byte(),
                end: node.end_byte(),
                message: format!("missing {}", node.kind()),
            });
            return VisitControl::SkipChildren;
        }
        if node.is_error() {
            let snippet: String = self.source[node.start_byte()..node.end_byte()]
                .chars()
                .take(24)
                .collect();
            self.errors.push(SyntaxError {
                start: node.start_byte(),
                end: node.end_byte(),
                message: format!("unexpected '{}'", snippet.trim()),
            });
            return VisitControl::SkipChildren;
        }
        VisitControl::Continue
    }
}

/// Collect syntax errors from a parsed tree
pub fn syntax_errors(tree: &Tree, source: &str) -> Vec<SyntaxError> {
    let mut collector = ErrorCollector {
        source,
        errors: Vec::new(),
    };
    walk(tree.root_node(), &mut collector);
    if !collector.errors.is_empty() {
        trace!(count = collector.errors.len(), "Syntax errors found");
    }
    collector.errors
}

/// Parse and report whether the source is free of syntax errors
pub fn is_well_formed(source: &str) -> AstResult<bool> {
    let tree = parse_go(source)?;
    Ok(!tree.root_node().has_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_valid_source() {
        let source = "package p\n\nfunc Add(a, b int) int { return a + b }\n";
        let tree = parse_go(source).unwrap();
        assert_eq!(tree.root_node().kind(), "source_file");
        assert!(syntax_errors(&tree, source).is_empty());
        assert!(is_well_formed(source).unwrap());
    }

    #[test]
    fn test_syntax_errors_reported() {
        let source = "package p\n\nfunc Add(a, b int) int { return a + }\n";
        let tree = parse_go(source).unwrap();
        let errors = syntax_errors(&tree, source);
        assert!(!errors.is_empty());
        assert!(!is_well_formed(source).unwrap());
    }
}
