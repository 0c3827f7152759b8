use super::scope::Binder;
use super::{LocalKind, Target, UseRole};
use crate::types::TypeRef;
use refit_ast::syntax::{span, statements};
use refit_ast::Node;

impl Binder<'_> {
    /// Statements of a function body, bound in the function's own scope
    pub(super) fn body(&mut self, block: Node<'_>) {
        for statement in statements(block) {
            self.stmt(statement);
        }
    }

    pub(super) fn stmt(&mut self, node: Node<'_>) {
        match node.kind() {
            "block" => {
                self.push_scope(node.end_byte());
                self.body(node);
                self.pop_scope();
            }
            "expression_statement" | "go_statement" | "defer_statement" => {
                if let Some(expr) = node.named_child(0) {
                    self.expr(expr);
                }
            }
            "send_statement" => self.children_exprs(node),
            "return_statement" => {
                if let Some(list) = node.named_child(0) {
                    self.children_exprs(list);
                }
            }
            "inc_statement" | "dec_statement" => {
                if let Some(operand) = node.named_child(0) {
                    self.lvalue(operand);
                }
            }
            "assignment_statement" => self.assignment(node),
            "short_var_declaration" => self.short_var_declaration(node),
            "var_declaration" => self.local_vars(node),
            "const_declaration" => self.local_consts(node),
            "type_declaration" => self.local_types(node),
            "if_statement" => self.if_statement(node),
            "for_statement" => self.for_statement(node),
            "expression_switch_statement" => self.expression_switch(node),
            "type_switch_statement" => self.type_switch(node),
            "select_statement" => self.select(node),
            "labeled_statement" => {
                if let Some(label) = node.child_by_field_name("label") {
                    self.label(label, UseRole::Declaration);
                }
                let mut cursor = node.walk();
                let inner: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() != "label_name")
                    .collect();
                for statement in inner {
                    self.stmt(statement);
                }
            }
            "break_statement" | "continue_statement" | "goto_statement" => {
                let mut cursor = node.walk();
                let label = node
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "label_name");
                if let Some(label) = label {
                    self.label(label, UseRole::Read);
                }
            }
            "fallthrough_statement" | "empty_statement" | "comment" => {}
            "statement_list" => self.body(node),
            _ => {
                self.expr(node);
            }
        }
    }

    fn children_exprs(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            if child.kind() != "comment" {
                self.expr(child);
            }
        }
    }

    /// Assignment target: bare identifiers are writes, anything else is read
    pub(super) fn lvalue(&mut self, node: Node<'_>) {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                if name == "_" {
                    return;
                }
                let target = self.resolve_name(name);
                if target == Target::Unresolved {
                    self.diagnose(span(node), format!("undefined: {}", name));
                }
                self.record(node, target, UseRole::Write, None);
            }
            "parenthesized_expression" => {
                if let Some(inner) = node.named_child(0) {
                    self.lvalue(inner);
                }
            }
            _ => {
                self.expr(node);
            }
        }
    }

    fn expression_list(node: Option<Node<'_>>) -> Vec<Node<'_>> {
        let Some(list) = node else {
            return Vec::new();
        };
        if list.kind() != "expression_list" {
            return vec![list];
        }
        let mut cursor = list.walk();
        let items: Vec<Node<'_>> = list
            .named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect();
        items
    }

    /// Types of the right-hand side of an assignment to `count` targets
    fn values(&mut self, list: Option<Node<'_>>, count: usize) -> Vec<Option<TypeRef>> {
        let exprs = Self::expression_list(list);
        if exprs.len() == 1 && count > 1 {
            let value = exprs[0];
            let mut types = self.expr_values(value);
            if types.len() < count {
                let comma_ok = match value.kind() {
                    "index_expression" | "type_assertion_expression" => true,
                    "unary_expression" => value
                        .child_by_field_name("operator")
                        .map(|op| self.text(op) == "<-")
                        .unwrap_or(false),
                    _ => false,
                };
                types.truncate(1);
                if comma_ok {
                    types.push(Some(TypeRef::basic("bool")));
                }
            }
            types.resize(count, None);
            return types;
        }
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn assignment(&mut self, node: Node<'_>) {
        let left = Self::expression_list(node.child_by_field_name("left"));
        self.values(node.child_by_field_name("right"), left.len());
        for target in left {
            self.lvalue(target);
        }
    }

    fn short_var_declaration(&mut self, node: Node<'_>) {
        let left = Self::expression_list(node.child_by_field_name("left"));
        let types = self.values(node.child_by_field_name("right"), left.len());
        self.define(node, &left, types);
    }

    /// `:=` semantics: redeclare at least one new name, assign the rest
    fn define(&mut self, node: Node<'_>, left: &[Node<'_>], types: Vec<Option<TypeRef>>) {
        let visible_from = node.end_byte();
        let mut fresh = 0;
        let mut blanks = 0;
        for (i, name) in left.iter().enumerate() {
            let text = self.text(*name);
            if text == "_" {
                blanks += 1;
                continue;
            }
            if name.kind() != "identifier" {
                self.expr(*name);
                continue;
            }
            if let Some(existing) = self.in_current_scope(text) {
                self.record(*name, Target::Local(existing), UseRole::Write, None);
                continue;
            }
            fresh += 1;
            let type_ref = types.get(i).cloned().flatten();
            self.declare(*name, LocalKind::Var, type_ref, visible_from, false);
        }
        if fresh == 0 && blanks < left.len() {
            self.diagnose(span(node), "no new variables on left side of :=");
        }
    }

    fn local_vars(&mut self, decl: Node<'_>) {
        for spec in crate::symbols::specs(decl, "var_spec") {
            let mut names_cursor = spec.walk();
            let names: Vec<Node<'_>> = spec
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            let declared = spec.child_by_field_name("type").map(|t| self.ty(t));
            let values = self.values(spec.child_by_field_name("value"), names.len());
            for (i, name) in names.iter().enumerate() {
                let type_ref = declared
                    .clone()
                    .or_else(|| values.get(i).cloned().flatten());
                self.declare(*name, LocalKind::Var, type_ref, spec.end_byte(), true);
            }
        }
    }

    fn local_consts(&mut self, decl: Node<'_>) {
        let mut inherited: Option<TypeRef> = None;
        for spec in crate::symbols::specs(decl, "const_spec") {
            let mut names_cursor = spec.walk();
            let names: Vec<Node<'_>> = spec
                .children_by_field_name("name", &mut names_cursor)
                .collect();
            let declared = spec.child_by_field_name("type").map(|t| self.ty(t));
            let has_values = spec.child_by_field_name("value").is_some();
            let values = self.values(spec.child_by_field_name("value"), names.len());
            if has_values {
                inherited = declared.clone().or_else(|| values.first().cloned().flatten());
            }
            for (i, name) in names.iter().enumerate() {
                let type_ref = declared
                    .clone()
                    .or_else(|| values.get(i).cloned().flatten())
                    .or_else(|| inherited.clone());
                self.declare(*name, LocalKind::Const, type_ref, spec.end_byte(), true);
            }
        }
    }

    fn local_types(&mut self, decl: Node<'_>) {
        let mut cursor = decl.walk();
        let specs: Vec<Node<'_>> = decl.named_children(&mut cursor).collect();
        for spec in specs {
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            self.declare(name, LocalKind::Type, None, spec.start_byte(), true);
            if let Some(ty) = spec.child_by_field_name("type") {
                self.ty(ty);
            }
        }
    }

    fn if_statement(&mut self, node: Node<'_>) {
        self.push_scope(node.end_byte());
        if let Some(init) = node.child_by_field_name("initializer") {
            self.stmt(init);
        }
        if let Some(condition) = node.child_by_field_name("condition") {
            self.expr(condition);
        }
        if let Some(consequence) = node.child_by_field_name("consequence") {
            self.stmt(consequence);
        }
        if let Some(alternative) = node.child_by_field_name("alternative") {
            self.stmt(alternative);
        }
        self.pop_scope();
    }

    fn for_statement(&mut self, node: Node<'_>) {
        self.push_scope(node.end_byte());
        let body = node.child_by_field_name("body");
        let mut cursor = node.walk();
        let parts: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|c| Some(*c) != body)
            .collect();
        for part in parts {
            match part.kind() {
                "for_clause" => {
                    if let Some(init) = part.child_by_field_name("initializer") {
                        self.stmt(init);
                    }
                    if let Some(condition) = part.child_by_field_name("condition") {
                        self.expr(condition);
                    }
                    if let Some(update) = part.child_by_field_name("update") {
                        self.stmt(update);
                    }
                }
                "range_clause" => self.range_clause(part),
                "comment" => {}
                _ => {
                    self.expr(part);
                }
            }
        }
        if let Some(body) = body {
            self.stmt(body);
        }
        self.pop_scope();
    }

    fn range_clause(&mut self, clause: Node<'_>) {
        let ranged = clause
            .child_by_field_name("right")
            .and_then(|r| self.expr(r))
            .map(|t| self.underlying(&t));
        let left = Self::expression_list(clause.child_by_field_name("left"));
        let mut cursor = clause.walk();
        let defines = clause.children(&mut cursor).any(|c| c.kind() == ":=");
        if !defines {
            for target in left {
                self.lvalue(target);
            }
            return;
        }
        let types = vec![
            ranged.as_ref().and_then(TypeRef::range_key),
            ranged.as_ref().and_then(TypeRef::range_value),
        ];
        let visible_from = clause.end_byte();
        for (i, name) in left.iter().enumerate() {
            let type_ref = types.get(i).cloned().flatten();
            self.declare(*name, LocalKind::Var, type_ref, visible_from, false);
        }
    }

    fn case_clauses(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let clauses: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|c| {
                matches!(
                    c.kind(),
                    "expression_case" | "default_case" | "type_case" | "communication_case"
                )
            })
            .collect();
        for clause in clauses {
            self.push_scope(clause.end_byte());
            match clause.kind() {
                "expression_case" => {
                    if let Some(values) = clause.child_by_field_name("value") {
                        self.children_exprs(values);
                    }
                }
                "type_case" => {
                    let mut c = clause.walk();
                    let types: Vec<Node<'_>> =
                        clause.children_by_field_name("type", &mut c).collect();
                    for ty in types {
                        self.ty(ty);
                    }
                }
                "communication_case" => {
                    if let Some(comm) = clause.child_by_field_name("communication") {
                        self.communication(comm);
                    }
                }
                _ => {}
            }
            self.body(clause);
            self.pop_scope();
        }
    }

    fn expression_switch(&mut self, node: Node<'_>) {
        self.push_scope(node.end_byte());
        if let Some(init) = node.child_by_field_name("initializer") {
            self.stmt(init);
        }
        if let Some(value) = node.child_by_field_name("value") {
            self.expr(value);
        }
        self.case_clauses(node);
        self.pop_scope();
    }

    fn type_switch(&mut self, node: Node<'_>) {
        self.push_scope(node.end_byte());
        if let Some(init) = node.child_by_field_name("initializer") {
            self.stmt(init);
        }
        let value_type = node
            .child_by_field_name("value")
            .and_then(|v| self.expr(v));
        // One local for the alias: a use in any clause counts as a use.
        if let Some(name) = Self::expression_list(node.child_by_field_name("alias"))
            .into_iter()
            .next()
        {
            self.declare(name, LocalKind::Var, value_type, name.end_byte(), false);
        }
        self.case_clauses(node);
        self.pop_scope();
    }

    fn select(&mut self, node: Node<'_>) {
        self.case_clauses(node);
    }

    fn communication(&mut self, comm: Node<'_>) {
        match comm.kind() {
            "receive_statement" => {
                let right = comm.child_by_field_name("right");
                let left = Self::expression_list(comm.child_by_field_name("left"));
                let mut cursor = comm.walk();
                let defines = comm.children(&mut cursor).any(|c| c.kind() == ":=");
                let types = self.values(right, left.len().max(1));
                if defines {
                    self.define(comm, &left, types);
                } else {
                    for target in left {
                        self.lvalue(target);
                    }
                }
            }
            _ => self.stmt(comm),
        }
    }
}
