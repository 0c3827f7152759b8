//! Identifier checks and fresh-name generation.

use refit_ast::syntax::{is_identifier, is_keyword};
use refit_foundation::{RefitError, RefitResult};
use refit_workspace::SourceFile;
use std::collections::BTreeSet;
use std::ops::Range;

/// Reject names that are not Go identifiers
pub fn check_identifier(name: &str) -> RefitResult<()> {
    if is_keyword(name) {
        return Err(RefitError::usage(format!("'{}' is a keyword", name)));
    }
    if name == "_" || !is_identifier(name) {
        return Err(RefitError::usage(format!("'{}' is not a valid identifier", name)));
    }
    Ok(())
}

/// `base`, or `base2`, `base3`, ... whichever is first not taken
pub fn fresh_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Every identifier spelled inside `span` of a file, declared or used
pub fn names_in(file: &SourceFile, span: Range<usize>) -> BTreeSet<String> {
    file.info
        .uses_in(span)
        .map(|u| u.name.clone())
        .collect()
}

/// Conventional receiver name for a type: its lowercased first letter
pub fn receiver_name(type_name: &str) -> String {
    type_name
        .chars()
        .next()
        .map(|c| c.to_lowercase().collect())
        .unwrap_or_else(|| "r".to_string())
}

/// File stem for a symbol moved into its own file
pub fn file_stem(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identifier_grammar() {
        assert!(check_identifier("Sum").is_ok());
        assert!(check_identifier("größe").is_ok());
        assert!(check_identifier("9lives").is_err());
        assert!(check_identifier("range").is_err());
        assert!(check_identifier("_").is_err());
        assert!(check_identifier("a-b").is_err());
    }

    #[test]
    fn test_fresh_names() {
        let taken = ["s", "s2"];
        assert_eq!(fresh_name("s", |n| taken.contains(&n)), "s3");
        assert_eq!(fresh_name("t", |n| taken.contains(&n)), "t");
        assert_eq!(receiver_name("Cart"), "c");
        assert_eq!(file_stem("ParseURL"), "parseurl");
        assert_eq!(file_stem("Add"), "add");
    }
}
