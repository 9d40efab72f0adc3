//! Public interface for running reflex source: lexer -> parser ->
//! preprocessor -> evaluator, tied together behind one entry point.

use std::rc::Rc;

use crate::{
    error::ReflexResult,
    eval,
    intern::{Interner, WellKnown},
    node::{Graph, NodeKind},
    parser::parse_module,
    preprocess::preprocess,
    resource::{NoLimitTracker, ResourceTracker},
};

/// The fully reduced primitive a program's `result` attribute carried, or
/// a fallback when it has no `_inner` attribute at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Int(i64),
    Str(Rc<str>),
    /// The reduced `result` value had no `_inner` attribute; printed as a
    /// generic placeholder rather than failing the run.
    Block,
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Block => write!(f, "<block>"),
        }
    }
}

/// Parses and holds one reflex program, ready to be run (and re-run —
/// running never mutates the parsed source).
///
/// # Example
/// ```
/// use reflex::Runner;
///
/// let runner = Runner::new("result = 2.add[y=3].result".to_owned());
/// let output = runner.run().unwrap();
/// assert_eq!(output.to_string(), "5");
/// ```
pub struct Runner {
    source: String,
}

impl Runner {
    #[must_use]
    pub fn new(source: String) -> Self {
        Self { source }
    }

    /// Runs to completion with no step budget.
    ///
    /// # Errors
    /// Returns a [`crate::error::ReflexError`] on any lex/parse/reference/
    /// type/invariant failure.
    pub fn run(&self) -> ReflexResult<Output> {
        self.run_with_tracker(&mut NoLimitTracker)
    }

    /// Runs to completion under an explicit [`ResourceTracker`], bounding
    /// runaway reductions with a step budget.
    ///
    /// # Errors
    /// Returns a [`crate::error::ReflexError`] on any lex/parse/reference/
    /// type/invariant failure, including [`crate::error::ReflexError::ResourceExceeded`].
    pub fn run_with_tracker(&self, tracker: &mut dyn ResourceTracker) -> ReflexResult<Output> {
        let mut graph = Graph::new();
        let mut interner = Interner::new();
        let wk = WellKnown::intern(&mut interner);

        let root = parse_module(&self.source, &mut graph, &mut interner)?;
        preprocess(&mut graph, &mut interner, &wk, root)?;

        // Evaluate the top-level module itself first: this is what resolves
        // any top-level `CloneAttr` aliasing before `result` is projected out
        // (top-level `Eager` is already rejected at parse time).
        let root = eval::evaluate(&mut graph, &interner, &wk, tracker, root)?;
        let result_id = graph.block_get(root, wk.result, "result")?;
        let result = eval::evaluate(&mut graph, &interner, &wk, tracker, result_id)?;

        let inner = graph.block_get(result, wk.inner, "_inner");
        Ok(match inner {
            Ok(inner) => match graph.kind(inner) {
                NodeKind::IntLit(v) => Output::Int(*v),
                NodeKind::StringLit(s) => Output::Str(Rc::clone(s)),
                other => unreachable!("`_inner` is always a primitive literal, found {}", other.kind_name()),
            },
            Err(_) => Output::Block,
        })
    }
}

/// Convenience wrapper around `Runner::new(source).run()`.
///
/// # Errors
/// See [`Runner::run`].
pub fn run_source(source: &str) -> ReflexResult<Output> {
    Runner::new(source.to_owned()).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_simple_program_end_to_end() {
        let output = run_source("result = 2.add[y=3].result").unwrap();
        assert_eq!(output.to_string(), "5");
    }

    #[test]
    fn falls_back_to_block_when_result_has_no_inner() {
        let output = run_source("result = { x = 1 }").unwrap();
        assert_eq!(output, Output::Block);
    }

    #[test]
    fn missing_result_attribute_is_a_reference_error() {
        assert!(run_source("x = 1").is_err());
    }

    #[test]
    fn a_runner_can_be_run_more_than_once() {
        let runner = Runner::new("result = 2.add[y=3].result".to_owned());
        assert_eq!(runner.run().unwrap().to_string(), "5");
        assert_eq!(runner.run().unwrap().to_string(), "5");
    }
}
