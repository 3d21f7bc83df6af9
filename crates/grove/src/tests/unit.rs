//! Unit tests for parsing, trees, nodes, and the tree registry.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use rstest::{fixture, rstest};

use super::{parser_for, python_grammar, python_tree, rust_grammar};
use crate::{
    BindingError, Chunk, InputEdit, InputEncoding, LogType, Logger, Parser, Point, Range,
    SourceInput, SymbolType, TreeRegistry,
};

/// Python source big enough to cross the engine's progress checkpoints.
fn large_python_source() -> String {
    (0..4_000)
        .map(|index| format!("value_{index} = [{index}, ({index} + 1) * 2, 'text']\n"))
        .collect()
}

#[fixture]
fn python_parser() -> Parser {
    parser_for(python_grammar())
}

// =============================================================================
// Parser configuration
// =============================================================================

#[rstest]
fn language_round_trips(mut python_parser: Parser) {
    assert_eq!(python_parser.language(), Some(python_grammar()));
    python_parser
        .set_language(rust_grammar())
        .expect("rust grammar is compatible");
    assert_eq!(python_parser.language(), Some(rust_grammar()));
}

#[test]
fn parser_without_language_yields_no_tree() {
    let mut parser = Parser::new().expect("parser");
    assert_eq!(parser.language(), None);
    let tree = parser.parse_str(None, "a + b").expect("parse call");
    assert!(tree.is_none());
}

#[rstest]
fn included_ranges_are_validated(mut python_parser: Parser) {
    assert!(python_parser.included_ranges().len() <= 1);
    let first = Range {
        start_point: Point::new(0, 0),
        end_point: Point::new(0, 5),
        start_byte: 0,
        end_byte: 5,
    };
    let second = Range {
        start_point: Point::new(1, 0),
        end_point: Point::new(1, 5),
        start_byte: 10,
        end_byte: 15,
    };
    python_parser
        .set_included_ranges(&[first, second])
        .expect("ordered ranges");
    assert_eq!(python_parser.included_ranges(), [first, second]);

    let overlapping = python_parser.set_included_ranges(&[second, first]);
    assert!(matches!(overlapping, Err(BindingError::InvalidRange { .. })));
    assert_eq!(python_parser.included_ranges(), [first, second]);
}

#[rstest]
fn included_ranges_restrict_the_tree(mut python_parser: Parser) {
    let source = "x = 1\n# y = 2\nz = 3\n";
    let only_last = Range {
        start_point: Point::new(2, 0),
        end_point: Point::new(3, 0),
        start_byte: 14,
        end_byte: 20,
    };
    python_parser
        .set_included_ranges(&[only_last])
        .expect("single range");
    let tree = python_parser
        .parse_str(None, source)
        .expect("parse call")
        .expect("tree");
    assert_eq!(tree.included_ranges(), [only_last]);
    assert_eq!(tree.root_node().start_byte(), 14);
}

#[rstest]
fn timeout_round_trips(mut python_parser: Parser) {
    assert_eq!(python_parser.timeout_micros(), 0);
    python_parser.set_timeout_micros(1_500);
    assert_eq!(python_parser.timeout_micros(), 1_500);
}

#[rstest]
fn cancellation_halts_and_reset_discards(mut python_parser: Parser) {
    let flag = Arc::new(AtomicUsize::new(1));
    python_parser.set_cancellation_flag(Some(Arc::clone(&flag)));
    assert!(python_parser.cancellation_flag().is_some());

    let source = large_python_source();
    let halted = python_parser.parse_str(None, &source).expect("parse call");
    assert!(halted.is_none());

    flag.store(0, Ordering::SeqCst);
    python_parser.reset();
    let tree = python_parser
        .parse_str(None, &source)
        .expect("parse call")
        .expect("uncancelled parse completes");
    assert!(!tree.root_node().has_error());

    python_parser.set_cancellation_flag(None);
    assert!(python_parser.cancellation_flag().is_none());
    assert_eq!(Arc::strong_count(&flag), 1);
}

#[rstest]
fn logger_receives_formatted_engine_events(mut python_parser: Parser) {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let previous = python_parser.set_logger(
        Logger::new(move |message: &str| {
            sink.lock().expect("lines").push(message.to_owned());
        })
        .with_format("[{type}] {message}"),
    );
    assert!(previous.is_none());
    assert!(python_parser.logger().is_some_and(|logger| logger.has_sink()));

    python_parser.parse_str(None, "a+b\n").expect("parse call");
    let seen = lines.lock().expect("lines").clone();
    assert!(!seen.is_empty());
    assert!(seen.iter().any(|line| line.starts_with(&format!("[{}]", LogType::Parse))));
    assert!(seen.iter().any(|line| line.starts_with(&format!("[{}]", LogType::Lex))));

    let removed = python_parser.clear_logger().expect("installed logger");
    assert_eq!(removed.format(), "[{type}] {message}");
    assert!(python_parser.logger().is_none());
}

#[cfg(unix)]
#[rstest]
fn dot_graphs_are_written_to_files(mut python_parser: Parser) {
    let dir = tempfile::tempdir().expect("temp dir");
    let parser_graph = dir.path().join("parser.dot");
    python_parser
        .print_dot_graphs_to_path(&parser_graph)
        .expect("graph file");
    let tree = python_parser
        .parse_str(None, "a+b\n")
        .expect("parse call")
        .expect("tree");
    python_parser.print_dot_graphs(None).expect("stop graphs");

    let tree_graph = dir.path().join("tree.dot");
    tree.write_dot_graph_to_path(&tree_graph).expect("tree graph");

    for path in [parser_graph, tree_graph] {
        let mut contents = String::new();
        std::fs::File::open(&path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .expect("readable graph");
        assert!(contents.contains("digraph"), "{} lacks a graph", path.display());
    }
}

#[rstest]
#[case(InputEncoding::Utf16Le)]
#[case(InputEncoding::Utf16Be)]
fn utf16_input_parses_like_utf8(mut python_parser: Parser, #[case] encoding: InputEncoding) {
    let source = "name = 'grove'\n";
    let bytes: Vec<u8> = source
        .encode_utf16()
        .flat_map(|unit| match encoding {
            InputEncoding::Utf16Be => unit.to_be_bytes(),
            _ => unit.to_le_bytes(),
        })
        .collect();
    let wide = python_parser
        .parse_bytes(None, &bytes, encoding)
        .expect("parse call")
        .expect("tree");
    let narrow = python_tree(source);
    assert_eq!(wide.root_node().to_sexp(), narrow.root_node().to_sexp());
    assert_eq!(wide.root_node().end_byte(), 2 * narrow.root_node().end_byte());
}

#[rstest]
fn chunked_input_matches_whole_input(mut python_parser: Parser) {
    let source = "def f(x):\n    return x * 2\n";
    let mut input = SourceInput::new(source.as_bytes(), 3);
    let tree = python_parser
        .parse(None, &mut input)
        .expect("parse call")
        .expect("tree");
    assert!(input.reads() > source.len().div_euclid(3));
    assert_eq!(tree.root_node().to_sexp(), python_tree(source).root_node().to_sexp());
}

#[rstest]
fn closures_serve_as_input(mut python_parser: Parser) {
    let mut input = |offset: usize, _: Point| -> Option<Chunk> {
        (offset == 0).then(|| Chunk::from("pass\n"))
    };
    let tree = python_parser
        .parse(None, &mut input)
        .expect("parse call")
        .expect("tree");
    assert_eq!(tree.root_node().to_sexp(), "(module (pass_statement))");
}

#[rstest]
fn input_panics_surface_after_the_engine_returns(mut python_parser: Parser) {
    let mut input = |_: usize, _: Point| -> Option<Chunk> { panic!("source vanished") };
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        python_parser.parse(None, &mut input)
    }));
    let payload = outcome.expect_err("panic should propagate");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"source vanished"));
    assert!(python_parser.parse_str(None, "pass\n").is_ok());
}

// =============================================================================
// Tree registry
// =============================================================================

#[test]
fn aliases_are_counted_and_freed_once() {
    let tree = python_tree("a+b\n");
    let registry = tree.tree_registry();
    let destroyed = registry.destroyed();
    assert_eq!(registry.alive_count(&tree), 1);

    let alias = tree.clone();
    let root = tree.root_node();
    let child = root.child(0).expect("statement");
    assert_eq!(registry.alive_count(&tree), 4);

    drop(alias);
    drop(root);
    assert_eq!(registry.alive_count(&tree), 2);
    assert_eq!(registry.live_trees(), 1);

    drop(tree);
    assert_eq!(registry.live_trees(), 1);
    assert_eq!(child.kind(), "expression_statement");
    drop(child);
    assert_eq!(registry.live_trees(), 0);
    assert_eq!(registry.destroyed(), destroyed + 1);
}

#[test]
fn copies_are_tracked_separately() {
    let tree = python_tree("pass\n");
    let registry = tree.tree_registry();
    let copy = tree.copy().expect("copy");
    assert_eq!(registry.live_trees(), 2);
    assert_eq!(registry.alive_count(&copy), 1);
    drop(tree);
    assert_eq!(registry.live_trees(), 1);
    assert_eq!(copy.root_node().to_sexp(), "(module (pass_statement))");
}

#[test]
fn parsers_can_share_a_registry() {
    let registry = TreeRegistry::new();
    let mut first = Parser::with_registry(registry.clone()).expect("parser");
    let mut second = Parser::with_registry(registry.clone()).expect("parser");
    first.set_language(python_grammar()).expect("python");
    second.set_language(rust_grammar()).expect("rust");

    let python = first.parse_str(None, "x = 1\n").expect("parse").expect("tree");
    let rust = second.parse_str(None, "fn f() {}").expect("parse").expect("tree");
    assert_eq!(registry.live_trees(), 2);
    drop((first, second));
    assert_eq!(registry.live_trees(), 2);
    drop((python, rust));
    assert_eq!(registry.live_trees(), 0);
}

#[test]
fn detached_trees_cross_threads() {
    let tree = python_tree("x = 1\n");
    let expected = tree.root_node().to_sexp();
    let detached = tree.detach().expect("detached copy");
    let receiving = TreeRegistry::new();
    let remote = receiving.clone();
    let sexp = thread::spawn(move || {
        let attached = detached.attach(&remote).expect("attach");
        attached.root_node().to_sexp()
    })
    .join()
    .expect("worker");
    assert_eq!(sexp, expected);
    assert_eq!(receiving.live_trees(), 0);
    assert_eq!(receiving.destroyed(), 1);
}

// =============================================================================
// Nodes
// =============================================================================

#[test]
fn child_access_is_bounds_checked() {
    let tree = python_tree("a+b\n");
    let root = tree.root_node();
    assert_eq!(root.child_count(), 1);
    assert!(matches!(
        root.child(1),
        Err(BindingError::IndexOutOfRange { what: "child", index: 1, len: 1 })
    ));
    assert!(root.named_child(u32::MAX).is_err());
    assert!(root.field_name_for_child(7).is_err());
    assert!(root.parent().is_none());
    assert!(root.next_sibling().is_none());
}

#[test]
fn fields_are_discoverable() {
    let tree = python_tree("a+b\n");
    let binary = tree
        .root_node()
        .named_descendant_for_byte_range(0, 3)
        .expect("binary operator");
    assert_eq!(binary.kind(), "binary_operator");
    assert_eq!(
        binary.fields().into_iter().collect::<Vec<_>>(),
        ["left", "operator", "right"]
    );
    assert!(binary.has_field("right"));
    assert!(!binary.has_field("body"));

    let fetched = binary.fetch_all(&["right", "missing", "left", "right"]);
    let texts: Vec<_> = fetched
        .iter()
        .map(|node| node.as_ref().and_then(|node| node.utf8_text("a+b\n")))
        .collect();
    assert_eq!(texts, [Some("b"), None, Some("a")]);
    assert_eq!(binary.fetch(&["missing", "left"]).len(), 1);
    assert_eq!(
        binary.child_by_field_name("operator").map(|node| node.kind()),
        Some("+")
    );
}

#[test]
fn relationships_navigate_the_tree() {
    let tree = python_tree("a+b\n");
    let root = tree.root_node();
    let left = root
        .descendant_for_byte_range(0, 1)
        .expect("left identifier");
    let operator = left.next_sibling().expect("operator");
    assert_eq!(operator.kind(), "+");
    assert!(!operator.is_named());
    assert_eq!(operator.prev_sibling().map(|node| node.id()), Some(left.id()));
    assert_eq!(
        left.next_named_sibling().and_then(|node| node.utf8_text("a+b\n")),
        Some("b")
    );
    let parent = left.parent().expect("parent");
    assert_eq!(parent.kind(), "binary_operator");
    assert_eq!(
        root.child_with_descendant(&left).map(|node| node.kind()),
        Some("expression_statement")
    );
    assert_eq!(left.start_point(), Point::new(0, 0));
    assert_eq!(left.end_point(), Point::new(0, 1));
}

#[test]
fn errors_are_flagged() {
    let tree = python_tree("def broken(:\n");
    let root = tree.root_node();
    assert!(root.has_error());
    assert!(tree.walk().expect("cursor").any(|node| node.is_error() || node.is_missing()));
}

#[test]
fn grammar_introspection_matches_nodes() {
    let grammar = python_grammar();
    let tree = python_tree("a+b\n");
    let root = tree.root_node();
    assert_eq!(root.grammar(), Some(grammar));
    assert_eq!(tree.grammar(), Some(grammar));
    assert!(grammar.name().is_none_or(|name| name == "python"));
    assert!(grammar.symbol_count() > 0);
    assert_eq!(grammar.symbol_for_name("module", true), Some(root.kind_id()));
    assert_eq!(grammar.symbol_name(root.kind_id()), Some("module"));
    assert_eq!(grammar.symbol_type(root.kind_id()), SymbolType::Regular);
    let left = grammar.field_id_for_name("left").expect("left field");
    assert_eq!(grammar.field_name_for_id(left), Some("left"));
    assert_eq!(grammar.field_id_for_name("no_such_field"), None);
}

// =============================================================================
// Edits
// =============================================================================

#[test]
fn edits_shift_later_nodes() {
    let source = "a+b\n";
    let mut tree = python_tree(source);
    let right = tree
        .root_node()
        .descendant_for_byte_range(2, 3)
        .expect("right identifier");
    let edit = InputEdit::replacing(source.as_bytes(), 0..1, b"aa").expect("edit");
    tree.edit(&edit);

    let shifted = tree
        .root_node()
        .descendant_for_byte_range(3, 4)
        .expect("shifted identifier");
    assert_eq!(shifted.start_byte(), 3);
    assert!(tree.root_node().has_changes());

    let mut stale = right;
    stale.edit(&edit);
    assert_eq!(stale.start_byte(), 3);
    assert_eq!(stale.start_point(), Point::new(0, 3));
}

#[rstest]
fn changed_ranges_cover_the_edit(mut python_parser: Parser) {
    let before = "x = 1\ny = 2\n";
    let after = "x = 1\ny = [2]\n";
    let mut old = python_parser
        .parse_str(None, before)
        .expect("parse")
        .expect("tree");
    old.edit(&InputEdit::replacing(before.as_bytes(), 10..11, b"[2]").expect("edit"));
    let new = python_parser
        .parse_str(Some(&old), after)
        .expect("parse")
        .expect("tree");
    let changed = new.changed_ranges(&old);
    assert!(!changed.is_empty());
    assert!(changed.iter().all(|range| range.start_byte >= 6));
}
