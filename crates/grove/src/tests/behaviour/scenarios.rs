//! Scenario bindings for the grove BDD feature file.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::scenario;

use super::TestWorld;

/// Fixture providing the shared BDD world.
#[fixture]
fn world() -> RefCell<TestWorld> {
    super::world()
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "Valid Python source parses into a module"
)]
fn valid_source_parses(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "Broken Python source reports errors"
)]
fn broken_source_reports_errors(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "A node keeps its tree alive after the tree is dropped"
)]
fn node_keeps_tree_alive(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "A query captures every identifier"
)]
fn query_captures_identifiers(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "A text predicate filters captures"
)]
fn text_predicate_filters(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "An unknown node type fails to compile"
)]
fn unknown_node_type_fails(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/grove.feature",
    name = "A tree cursor walks the tree in pre-order"
)]
fn cursor_walks_pre_order(world: RefCell<TestWorld>) {
    drop(world);
}
