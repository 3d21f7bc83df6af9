//! Text predicates attached to query patterns.
//!
//! The engine reports predicates as flat step lists and leaves evaluating
//! them to the host. Predicates that compare capture text are compiled here
//! into [`TextPredicate`]s; every other operator is kept verbatim as a
//! [`GeneralPredicate`] for callers to interpret.

use regex::bytes::Regex;

use crate::error::{BindingError, Result};
use crate::query::{PredicateStep, QueryCapture};

/// A predicate over the source text of captured nodes.
///
/// `match_all` predicates hold when every captured node satisfies them; the
/// `any-` forms hold when at least one does. Either holds when the capture
/// matched no nodes.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TextPredicate {
    /// `#eq?`, `#not-eq?`, `#any-eq?`, `#any-not-eq?` between two captures.
    EqCapture {
        /// First capture.
        left: u32,
        /// Second capture.
        right: u32,
        /// `false` for the `not-` forms.
        positive: bool,
        /// `false` for the `any-` forms.
        match_all: bool,
    },
    /// The same operators comparing a capture with a literal.
    EqString {
        /// Capture whose text is compared.
        capture: u32,
        /// Literal to compare with.
        value: String,
        /// `false` for the `not-` forms.
        positive: bool,
        /// `false` for the `any-` forms.
        match_all: bool,
    },
    /// `#match?`, `#not-match?`, `#any-match?`, `#any-not-match?`.
    Match {
        /// Capture whose text is tested.
        capture: u32,
        /// Compiled pattern.
        regex: Regex,
        /// `false` for the `not-` forms.
        positive: bool,
        /// `false` for the `any-` forms.
        match_all: bool,
    },
    /// `#any-of?` and `#not-any-of?`.
    AnyOf {
        /// Capture whose text is tested.
        capture: u32,
        /// Accepted (or rejected) literals.
        values: Vec<String>,
        /// `false` for `#not-any-of?`.
        positive: bool,
    },
}

/// One argument of a [`GeneralPredicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateArg {
    /// A capture, by index.
    Capture(u32),
    /// A string literal.
    String(String),
}

/// A predicate whose operator this crate does not evaluate, such as `#set!`
/// or `#is?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralPredicate {
    /// Operator name including its trailing `?` or `!`.
    pub operator: String,
    /// Arguments in source order.
    pub args: Vec<PredicateArg>,
}

/// Predicates compiled for one pattern.
#[derive(Debug, Clone, Default)]
pub(crate) struct PatternPredicates {
    pub(crate) text: Vec<TextPredicate>,
    pub(crate) general: Vec<GeneralPredicate>,
}

/// Lookup tables needed to interpret predicate steps.
pub(crate) struct Names<'a> {
    pub(crate) captures: &'a [String],
    pub(crate) strings: &'a [String],
}

impl Names<'_> {
    fn capture(&self, id: u32) -> &str {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.captures.get(index))
            .map_or("", String::as_str)
    }

    fn string(&self, id: u32) -> &str {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.strings.get(index))
            .map_or("", String::as_str)
    }
}

/// Splits a pattern's steps into predicates.
///
/// `row` is the zero-based line of the pattern and is reported in errors.
pub(crate) fn compile(
    steps: &[PredicateStep],
    names: &Names<'_>,
    row: usize,
) -> Result<PatternPredicates> {
    let mut compiled = PatternPredicates::default();
    for predicate in steps.split(|step| *step == PredicateStep::Done) {
        let Some((head, args)) = predicate.split_first() else {
            continue;
        };
        let operator = match *head {
            PredicateStep::String(id) => names.string(id),
            PredicateStep::Capture(id) => {
                return Err(BindingError::predicate(
                    row,
                    format!(
                        "expected predicate to start with a function name, got @{}",
                        names.capture(id)
                    ),
                ));
            }
            PredicateStep::Done => continue,
        };
        match operator {
            "eq?" | "not-eq?" | "any-eq?" | "any-not-eq?" => {
                compiled.text.push(equality(operator, args, names, row)?);
            }
            "match?" | "not-match?" | "any-match?" | "any-not-match?" => {
                compiled.text.push(matching(operator, args, names, row)?);
            }
            "any-of?" | "not-any-of?" => {
                compiled.text.push(any_of(operator, args, names, row)?);
            }
            _ => compiled.general.push(GeneralPredicate {
                operator: operator.to_owned(),
                args: args
                    .iter()
                    .filter_map(|step| match *step {
                        PredicateStep::Capture(id) => Some(PredicateArg::Capture(id)),
                        PredicateStep::String(id) => {
                            Some(PredicateArg::String(names.string(id).to_owned()))
                        }
                        PredicateStep::Done => None,
                    })
                    .collect(),
            }),
        }
    }
    Ok(compiled)
}

fn expect_arity(operator: &str, args: &[PredicateStep], expected: usize, row: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(BindingError::predicate(
            row,
            format!(
                "wrong number of arguments to #{operator} predicate: expected {expected}, got {}",
                args.len()
            ),
        ))
    }
}

fn leading_capture(
    operator: &str,
    args: &[PredicateStep],
    names: &Names<'_>,
    row: usize,
) -> Result<u32> {
    match args.first() {
        Some(PredicateStep::Capture(id)) => Ok(*id),
        Some(PredicateStep::String(id)) => Err(BindingError::predicate(
            row,
            format!(
                "first argument to #{operator} predicate must be a capture name, got literal \"{}\"",
                names.string(*id)
            ),
        )),
        _ => Err(BindingError::predicate(
            row,
            format!("#{operator} predicate needs a capture argument"),
        )),
    }
}

fn equality(
    operator: &str,
    args: &[PredicateStep],
    names: &Names<'_>,
    row: usize,
) -> Result<TextPredicate> {
    expect_arity(operator, args, 2, row)?;
    let capture = leading_capture(operator, args, names, row)?;
    let positive = matches!(operator, "eq?" | "any-eq?");
    let match_all = matches!(operator, "eq?" | "not-eq?");
    Ok(match args.get(1) {
        Some(PredicateStep::Capture(right)) => TextPredicate::EqCapture {
            left: capture,
            right: *right,
            positive,
            match_all,
        },
        Some(PredicateStep::String(id)) => TextPredicate::EqString {
            capture,
            value: names.string(*id).to_owned(),
            positive,
            match_all,
        },
        _ => {
            return Err(BindingError::predicate(
                row,
                format!("#{operator} predicate is missing its second argument"),
            ));
        }
    })
}

fn matching(
    operator: &str,
    args: &[PredicateStep],
    names: &Names<'_>,
    row: usize,
) -> Result<TextPredicate> {
    expect_arity(operator, args, 2, row)?;
    let capture = leading_capture(operator, args, names, row)?;
    let pattern = match args.get(1) {
        Some(PredicateStep::String(id)) => names.string(*id),
        Some(PredicateStep::Capture(id)) => {
            return Err(BindingError::predicate(
                row,
                format!(
                    "second argument to #{operator} predicate must be a literal, got capture @{}",
                    names.capture(*id)
                ),
            ));
        }
        _ => "",
    };
    let regex = Regex::new(pattern).map_err(|error| {
        BindingError::predicate(row, format!("invalid regex in #{operator} predicate: {error}"))
    })?;
    Ok(TextPredicate::Match {
        capture,
        regex,
        positive: matches!(operator, "match?" | "any-match?"),
        match_all: matches!(operator, "match?" | "not-match?"),
    })
}

fn any_of(
    operator: &str,
    args: &[PredicateStep],
    names: &Names<'_>,
    row: usize,
) -> Result<TextPredicate> {
    if args.len() < 2 {
        return Err(BindingError::predicate(
            row,
            format!(
                "wrong number of arguments to #{operator} predicate: expected at least 1 value, got {}",
                args.len().saturating_sub(1)
            ),
        ));
    }
    let capture = leading_capture(operator, args, names, row)?;
    let values = args
        .iter()
        .skip(1)
        .map(|step| match *step {
            PredicateStep::String(id) => Ok(names.string(id).to_owned()),
            PredicateStep::Capture(id) => Err(BindingError::predicate(
                row,
                format!(
                    "arguments to #{operator} predicate must be literals, got capture @{}",
                    names.capture(id)
                ),
            )),
            PredicateStep::Done => Ok(String::new()),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TextPredicate::AnyOf {
        capture,
        values,
        positive: operator == "any-of?",
    })
}

fn text<'s>(capture: &QueryCapture, source: &'s [u8]) -> &'s [u8] {
    capture.node.text(source)
}

fn nodes(captures: &[QueryCapture], index: u32) -> impl Iterator<Item = &QueryCapture> {
    captures.iter().filter(move |capture| capture.index == index)
}

/// Applies `all`/`any` semantics to per-node outcomes.
fn quantify(mut outcomes: impl Iterator<Item = bool>, match_all: bool) -> bool {
    if match_all {
        outcomes.all(|outcome| outcome)
    } else {
        let mut seen = false;
        for outcome in outcomes {
            if outcome {
                return true;
            }
            seen = true;
        }
        !seen
    }
}

impl TextPredicate {
    /// Whether the captures of one match satisfy the predicate.
    #[must_use]
    pub fn is_satisfied(&self, captures: &[QueryCapture], source: &[u8]) -> bool {
        match self {
            Self::EqCapture {
                left,
                right,
                positive,
                match_all,
            } => {
                let lefts: Vec<_> = nodes(captures, *left).collect();
                let rights: Vec<_> = nodes(captures, *right).collect();
                let pairs = lefts.iter().zip(&rights).map(|(first, second)| {
                    (text(first, source) == text(second, source)) == *positive
                });
                if *match_all {
                    lefts.len() == rights.len() && quantify(pairs, true)
                } else {
                    quantify(pairs, false)
                }
            }
            Self::EqString {
                capture,
                value,
                positive,
                match_all,
            } => quantify(
                nodes(captures, *capture)
                    .map(|node| (text(node, source) == value.as_bytes()) == *positive),
                *match_all,
            ),
            Self::Match {
                capture,
                regex,
                positive,
                match_all,
            } => quantify(
                nodes(captures, *capture).map(|node| regex.is_match(text(node, source)) == *positive),
                *match_all,
            ),
            Self::AnyOf {
                capture,
                values,
                positive,
            } => nodes(captures, *capture).all(|node| {
                let found = values
                    .iter()
                    .any(|value| value.as_bytes() == text(node, source));
                found == *positive
            }),
        }
    }
}
