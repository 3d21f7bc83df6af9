//! End-to-end tests for grove using insta for snapshot testing.
//!
//! These tests drive the public API the way a host program would: load a
//! grammar, parse, edit, re-parse and query.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use grove::{
    BindingError, Grammar, Input, InputEdit, Parser, Point, Query, QueryCursor, SourceInput, Tree,
};
use insta::{assert_debug_snapshot, assert_snapshot};
use rstest::{fixture, rstest};

/// Fixture providing the bundled Python grammar.
#[fixture]
fn grammar() -> Grammar {
    Grammar::try_from(tree_sitter::Language::new(tree_sitter_python::LANGUAGE))
        .unwrap_or_else(|err| panic!("grammar: {err}"))
}

/// Fixture providing a parser for [`grammar`].
#[fixture]
fn parser(grammar: Grammar) -> Parser {
    let mut parser = Parser::new().unwrap_or_else(|err| panic!("parser: {err}"));
    parser
        .set_language(grammar)
        .unwrap_or_else(|err| panic!("set language: {err}"));
    parser
}

fn parse(parser: &mut Parser, old: Option<&Tree>, source: &str) -> Tree {
    parser
        .parse_str(old, source)
        .unwrap_or_else(|err| panic!("parse: {err}"))
        .unwrap_or_else(|| panic!("no tree for {source:?}"))
}

// =============================================================================
// Parsing
// =============================================================================

#[rstest]
fn fresh_parse_spans_the_source(mut parser: Parser) {
    let tree = parse(&mut parser, None, "a+b");
    let root = tree.root_node();

    assert_eq!(root.kind(), "module");
    assert_eq!(root.start_byte(), 0);
    assert_eq!(root.end_byte(), 3);
    assert_snapshot!(
        root.to_sexp(),
        @"(module (expression_statement (binary_operator left: (identifier) right: (identifier))))"
    );
}

#[rstest]
fn incremental_parse_matches_fresh_parse(mut parser: Parser) {
    let mut old = parse(&mut parser, None, "a+b");
    let edit = InputEdit::replacing(b"a+b", 0..1, b"aa")
        .unwrap_or_else(|err| panic!("edit: {err}"));
    assert_eq!(
        edit,
        InputEdit {
            start_byte: 0,
            old_end_byte: 1,
            new_end_byte: 2,
            start_point: Point::new(0, 0),
            old_end_point: Point::new(0, 1),
            new_end_point: Point::new(0, 2),
        }
    );
    old.edit(&edit);

    let left = old
        .root_node()
        .named_descendant_for_byte_range(0, 4)
        .and_then(|node| node.child_by_field_name("left"))
        .unwrap_or_else(|| panic!("left operand in {}", old.root_node().to_sexp()));
    assert!(left.has_changes());
    let right = left
        .parent()
        .and_then(|parent| parent.child_by_field_name("right"))
        .unwrap_or_else(|| panic!("right operand"));
    assert!(!right.has_changes());
    assert_eq!(right.byte_range(), 3..4);

    let incremental = parse(&mut parser, Some(&old), "aa+b");
    let fresh = parse(&mut parser, None, "aa+b");

    assert_eq!(incremental.root_node().end_byte(), 4);
    assert_eq!(incremental.root_node().to_sexp(), fresh.root_node().to_sexp());
    assert!(
        incremental
            .changed_ranges(&old)
            .iter()
            .all(|range| range.start_byte == 0),
        "only the edited identifier may differ"
    );
}

// =============================================================================
// Querying
// =============================================================================

#[rstest]
fn identifier_captures_arrive_in_order(mut parser: Parser, grammar: Grammar) {
    let tree = parse(&mut parser, None, "a+b");
    let query = Query::new(grammar, "(identifier) @id").unwrap_or_else(|err| panic!("query: {err}"));
    let mut cursor = QueryCursor::new().unwrap_or_else(|err| panic!("cursor: {err}"));
    cursor.exec(&query, &tree.root_node());

    let mut seen = Vec::new();
    while let Some((found, index)) = cursor.next_capture() {
        let capture = usize::try_from(index)
            .ok()
            .and_then(|position| found.captures.get(position))
            .unwrap_or_else(|| panic!("capture {index} missing from {found:?}"));
        let name = query
            .capture_name_for_id(capture.index)
            .unwrap_or_else(|err| panic!("capture name: {err}"));
        seen.push(format!("{name} {:?}", capture.node.byte_range()));
    }

    assert_snapshot!(seen.join("\n"), @r"
    id 0..1
    id 2..3
    ");
    assert!(cursor.next_capture().is_none());
    assert!(!cursor.is_executing());
}

#[rstest]
fn unknown_node_types_are_located(grammar: Grammar) {
    let err = Query::new(grammar, "(no_such_node) @x").expect_err("unknown node type");
    let BindingError::QueryCompile(compile) = err else {
        panic!("expected a compile error, got {err:?}");
    };
    assert_snapshot!(compile.to_string(), @"node type error at 0:1 (byte 1): no_such_node");
}

#[rstest]
fn capture_names_are_listed(grammar: Grammar) {
    let query = Query::new(
        grammar,
        "(assignment left: (identifier) @target right: (_) @value)\n(call function: (identifier) @callee)",
    )
    .unwrap_or_else(|err| panic!("query: {err}"));

    assert_eq!(query.pattern_count(), 2);
    assert_debug_snapshot!(query.capture_names(), @r#"
    [
        "target",
        "value",
        "callee",
    ]
    "#);
}

// =============================================================================
// Halting
// =============================================================================

#[rstest]
fn halted_parse_resumes_where_it_stopped(mut parser: Parser) {
    let source: String = (0..20_000)
        .map(|index| format!("item_{index} = [{index}, {index} * 2, ({index},)]\n"))
        .collect();

    let mut fresh_input = SourceInput::new(source.as_bytes(), 64);
    parse_to_completion(&mut parser, &mut fresh_input);
    let fresh_reads = fresh_input.reads();
    let halt_at = fresh_reads.div_euclid(2);

    let flag = Arc::new(AtomicUsize::new(0));
    parser.set_cancellation_flag(Some(Arc::clone(&flag)));
    let mut input = SourceInput::new(source.as_bytes(), 64);
    let mut halting = |offset: usize, position: Point| {
        let chunk = input.read(offset, position);
        if input.reads() == halt_at {
            flag.store(1, Ordering::SeqCst);
        }
        chunk
    };
    let halted = parser
        .parse(None, &mut halting)
        .unwrap_or_else(|err| panic!("parse: {err}"));
    assert!(halted.is_none(), "a raised cancellation flag halts the parse");
    assert!(input.reads() >= halt_at);

    flag.store(0, Ordering::SeqCst);
    input.reset_reads();
    parse_to_completion(&mut parser, &mut input);
    assert!(
        input.reads() < fresh_reads,
        "resumed parse read {} chunks, a fresh parse reads {fresh_reads}",
        input.reads()
    );
}

#[rstest]
fn timed_out_parse_returns_no_tree_then_completes(mut parser: Parser) {
    let source = "value = [1, 2, (3,)]\n".repeat(5_000);
    parser.set_timeout_micros(1);
    let halted = parser
        .parse_str(None, &source)
        .unwrap_or_else(|err| panic!("parse: {err}"));
    assert!(halted.is_none(), "a one microsecond budget cannot cover the input");

    let mut input = SourceInput::new(source.as_bytes(), 64);
    parse_to_completion(&mut parser, &mut input);
    assert_eq!(parser.timeout_micros(), 0);
}

#[rstest]
fn reset_abandons_a_halted_parse(mut parser: Parser) {
    let flag = Arc::new(AtomicUsize::new(1));
    parser.set_cancellation_flag(Some(Arc::clone(&flag)));
    let source = "x = 1\n".repeat(2_000);
    let halted = parser
        .parse_str(None, &source)
        .unwrap_or_else(|err| panic!("parse: {err}"));
    assert!(halted.is_none());

    flag.store(0, Ordering::SeqCst);
    parser.reset();
    let tree = parse(&mut parser, None, "a+b");
    assert_eq!(tree.root_node().end_byte(), 3);
}

fn parse_to_completion(parser: &mut Parser, input: &mut SourceInput) {
    parser.set_timeout_micros(0);
    let tree = parser
        .parse(None, input)
        .unwrap_or_else(|err| panic!("parse: {err}"))
        .unwrap_or_else(|| panic!("an unhalted parse should complete"));
    assert!(!tree.root_node().has_error());
}
