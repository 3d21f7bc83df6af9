//! Behaviour-driven development (BDD) step definitions for grove scenarios.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

mod scenarios;

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, then, when};

use super::python_grammar;
use crate::{BindingError, Node, Parser, Query, QueryCursor, QueryErrorKind, Tree, TreeRegistry};

// =============================================================================
// Test World
// =============================================================================

/// State shared across BDD steps.
#[derive(Default)]
struct TestWorld {
    /// Registry shared by every tree the scenario parses.
    registry: TreeRegistry,
    /// Python source under test.
    source: String,
    /// Query source under test.
    query_source: String,
    /// Most recent parse result.
    tree: Option<Tree>,
    /// Root node retained after its tree was dropped.
    root: Option<Node>,
    /// Outcome of compiling `query_source`.
    compiled: Option<Result<Query, BindingError>>,
    /// Text of each capture, in capture order.
    captures: Vec<String>,
    /// Node kinds in walk order.
    walked: Vec<&'static str>,
}

impl TestWorld {
    fn parse(&mut self) {
        let mut parser =
            Parser::with_registry(self.registry.clone()).expect("parser should allocate");
        parser
            .set_language(python_grammar())
            .expect("python grammar should be compatible");
        let tree = parser
            .parse_str(None, &self.source)
            .expect("parse call should succeed")
            .expect("parser with a language should produce a tree");
        self.tree = Some(tree);
    }
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}

/// Strips surrounding double quotes and unescapes embedded ones.
fn unquote(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
        .replace("\\\"", "\"")
}

// =============================================================================
// Given Steps
// =============================================================================

#[given("Python source {source}")]
fn given_python_source(world: &RefCell<TestWorld>, source: String) {
    world.borrow_mut().source = unquote(&source);
}

#[given("the query {query}")]
fn given_query(world: &RefCell<TestWorld>, query: String) {
    world.borrow_mut().query_source = unquote(&query);
}

// =============================================================================
// When Steps
// =============================================================================

#[when("the source is parsed")]
fn when_parsed(world: &RefCell<TestWorld>) {
    world.borrow_mut().parse();
}

#[when("only the root node is kept")]
fn when_root_kept(world: &RefCell<TestWorld>) {
    let mut w = world.borrow_mut();
    let tree = w.tree.take().expect("source should be parsed first");
    w.root = Some(tree.root_node());
    drop(tree);
}

#[when("the root node is dropped")]
fn when_root_dropped(world: &RefCell<TestWorld>) {
    let root = world.borrow_mut().root.take();
    assert!(root.is_some(), "a root node should have been kept");
    drop(root);
}

#[when("the query is compiled")]
fn when_query_compiled(world: &RefCell<TestWorld>) {
    let mut w = world.borrow_mut();
    let compiled = Query::new(python_grammar(), &w.query_source);
    w.compiled = Some(compiled);
}

#[when("the query captures are collected")]
fn when_captures_collected(world: &RefCell<TestWorld>) {
    let mut w = world.borrow_mut();
    w.parse();
    let query = Query::new(python_grammar(), &w.query_source).expect("query should compile");
    let tree = w.tree.as_ref().expect("tree");
    let mut cursor = QueryCursor::new().expect("query cursor should allocate");
    let captures: Vec<String> = cursor
        .captures(&query, &tree.root_node(), w.source.as_bytes())
        .filter_map(|(found, index)| {
            let capture = found.captures.get(usize::try_from(index).ok()?)?;
            capture.node.utf8_text(&w.source).map(str::to_owned)
        })
        .collect();
    w.captures = captures;
}

#[when("the tree is walked")]
fn when_walked(world: &RefCell<TestWorld>) {
    let mut w = world.borrow_mut();
    let walk = w
        .tree
        .as_ref()
        .expect("source should be parsed first")
        .walk()
        .expect("cursor should allocate");
    w.walked = walk.map(|node| node.kind()).collect();
}

// =============================================================================
// Then Steps
// =============================================================================

#[then("the root node kind is {kind}")]
fn then_root_kind(world: &RefCell<TestWorld>, kind: String) {
    let w = world.borrow();
    let tree = w.tree.as_ref().expect("tree");
    assert_eq!(tree.root_node().kind(), unquote(&kind));
}

#[then("the tree has no syntax errors")]
fn then_no_errors(world: &RefCell<TestWorld>) {
    let w = world.borrow();
    let root = w.tree.as_ref().expect("tree").root_node();
    assert!(!root.has_error(), "unexpected errors in {}", root.to_sexp());
}

#[then("the tree has syntax errors")]
fn then_errors(world: &RefCell<TestWorld>) {
    let w = world.borrow();
    let root = w.tree.as_ref().expect("tree").root_node();
    assert!(root.has_error(), "expected errors in {}", root.to_sexp());
}

#[then("the live tree count is {count}")]
fn then_live_trees(world: &RefCell<TestWorld>, count: usize) {
    assert_eq!(world.borrow().registry.live_trees(), count);
}

#[then("the destroyed tree count is {count}")]
fn then_destroyed(world: &RefCell<TestWorld>, count: u64) {
    assert_eq!(world.borrow().registry.destroyed(), count);
}

#[then("the capture count is {count}")]
fn then_capture_count(world: &RefCell<TestWorld>, count: usize) {
    let w = world.borrow();
    assert_eq!(w.captures.len(), count, "captures: {:?}", w.captures);
}

#[then("capture {position} reads {text}")]
fn then_capture_text(world: &RefCell<TestWorld>, position: usize, text: String) {
    let w = world.borrow();
    let found = position
        .checked_sub(1)
        .and_then(|index| w.captures.get(index))
        .unwrap_or_else(|| panic!("no capture {position} in {:?}", w.captures));
    assert_eq!(found, &unquote(&text));
}

#[then("compilation fails with a node type error for {name}")]
fn then_node_type_error(world: &RefCell<TestWorld>, name: String) {
    let w = world.borrow();
    let outcome = w.compiled.as_ref().expect("query should have been compiled");
    let Err(BindingError::QueryCompile(error)) = outcome else {
        panic!("expected a compile error, got {outcome:?}");
    };
    assert_eq!(error.kind, QueryErrorKind::NodeType);
    assert_eq!(error.message, unquote(&name));
}

#[then("the walk starts with {kinds}")]
fn then_walk_prefix(world: &RefCell<TestWorld>, kinds: String) {
    let w = world.borrow();
    let listed = unquote(&kinds);
    let expected: Vec<&str> = listed.split(", ").collect();
    assert!(
        w.walked.starts_with(&expected),
        "walk {:?} does not start with {expected:?}",
        w.walked
    );
}
