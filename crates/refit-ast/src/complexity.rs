//! Cyclomatic complexity per function declaration.

use crate::syntax::{receiver_type_name, text};
use crate::visitor::{walk, VisitControl, Visitor};
use serde::Serialize;
use tree_sitter::{Node, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionComplexity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// 1-based line of the declaration
    pub line: u32,
    pub complexity: u32,
}

struct DecisionCounter<'s> {
    source: &'s str,
    decisions: u32,
}

impl<'t> Visitor<'t> for DecisionCounter<'_> {
    fn enter(&mut self, node: Node<'t>) -> VisitControl {
        match node.kind() {
            "if_statement" | "for_statement" | "expression_case" | "type_case"
            | "communication_case" => self.decisions += 1,
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|op| text(op, self.source))
                    .unwrap_or("");
                if op == "&&" || op == "||" {
                    self.decisions += 1;
                }
            }
            _ => {}
        }
        VisitControl::Continue
    }
}

/// Complexity of every function and method in a file, in source order
pub fn file_complexity(tree: &Tree, source: &str) -> Vec<FunctionComplexity> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    let mut out = Vec::new();
    for decl in root.named_children(&mut cursor) {
        if !matches!(decl.kind(), "function_declaration" | "method_declaration") {
            continue;
        }
        let Some(name) = decl.child_by_field_name("name") else {
            continue;
        };
        let receiver = if decl.kind() == "method_declaration" {
            receiver_type_name(decl, source)
        } else {
            None
        };
        let mut counter = DecisionCounter {
            source,
            decisions: 0,
        };
        if let Some(body) = decl.child_by_field_name("body") {
            walk(body, &mut counter);
        }
        out.push(FunctionComplexity {
            name: text(name, source).to_string(),
            receiver,
            line: decl.start_position().row as u32 + 1,
            complexity: counter.decisions + 1,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_go;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_complexity_counts_decisions() {
        let source = r#"package p

func Simple() int { return 1 }

func (s *Server) Handle(x int) int {
	if x > 0 && x < 10 {
		return 1
	}
	for i := 0; i < x; i++ {
		switch i {
		case 1:
		case 2:
		default:
		}
	}
	return 0
}
"#;
        let tree = parse_go(source).unwrap();
        let report = file_complexity(&tree, source);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].complexity, 1);
        assert_eq!(report[1].name, "Handle");
        assert_eq!(report[1].receiver.as_deref(), Some("Server"));
        // if, &&, for, two cases
        assert_eq!(report[1].complexity, 6);
        assert_eq!(report[1].line, 5);
    }
}
