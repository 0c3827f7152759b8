use pretty_assertions::assert_eq;
use refit_foundation::SymbolKind;
use refit_workspace::resolver::{self, ReferenceKind};
use refit_workspace::{LoadOptions, Workspace};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "go.mod", "module example.com/shop\n\ngo 1.22\n");
    write(
        root,
        "cart/cart.go",
        r#"package cart

type Item struct {
	Name  string
	Price int
}

type Cart struct {
	items []Item
}

func (c *Cart) Add(item Item) {
	c.items = append(c.items, item)
}

func (c *Cart) Total() int {
	sum := 0
	for _, it := range c.items {
		sum += it.Price
	}
	return sum
}
"#,
    );
    write(
        root,
        "cart/cart_test.go",
        r#"package cart_test

import (
	"testing"

	"example.com/shop/cart"
)

func TestTotal(t *testing.T) {
	c := &cart.Cart{}
	c.Add(cart.Item{Name: "a", Price: 2})
	if c.Total() != 2 {
		t.Fatal("bad total")
	}
}
"#,
    );
    write(
        root,
        "cmd/main.go",
        r#"package main

import (
	"fmt"

	"example.com/shop/cart"
)

func main() {
	var c cart.Cart
	c.Add(cart.Item{Name: "b", Price: 3})
	fmt.Println(c.Total())
}
"#,
    );
    write(root, ".hidden/skip.go", "package skip\n");
    dir
}

#[test]
fn test_load_from_disk() {
    let dir = fixture();
    let ws = Workspace::load(dir.path(), &LoadOptions::default()).unwrap();

    let keys: Vec<&str> = ws.packages.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec!["example.com/shop/cart", "example.com/shop/cart_test", "example.com/shop/cmd"]
    );
    assert!(ws.package("example.com/shop/cart_test").unwrap().external_test);
    assert!(ws.checker_diagnostics().is_empty(), "{:?}", ws.checker_diagnostics());
}

#[test]
fn test_cross_package_method_references() {
    let dir = fixture();
    let ws = Workspace::load(dir.path(), &LoadOptions::default()).unwrap();

    let total = resolver::lookup(&ws, "Cart.Total", Some(SymbolKind::Method), None).unwrap();
    let refs = resolver::references(&ws, total);
    assert_eq!(refs.len(), 2);
    assert!(refs.iter().all(|r| r.kind == ReferenceKind::Call));

    let item = resolver::lookup(&ws, "Item", None, Some("cart")).unwrap();
    let item_refs = resolver::references(&ws, item);
    // field type, Add parameter, two composite literals
    assert_eq!(item_refs.len(), 4);
    assert_eq!(
        item_refs.iter().filter(|r| r.qualifier.is_some()).count(),
        2
    );
}

#[test]
fn test_import_graph_over_loaded_packages() {
    let dir = fixture();
    let ws = Workspace::load(dir.path(), &LoadOptions::default()).unwrap();
    let graph = ws.import_graph();
    assert!(graph.imports("example.com/shop/cmd", "example.com/shop/cart"));
    assert!(graph.would_create_cycle("example.com/shop/cart", "example.com/shop/cmd"));
    assert!(graph.cycles().is_empty());
}
