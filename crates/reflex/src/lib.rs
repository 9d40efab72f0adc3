#![doc = include_str!("../../../README.md")]

mod builtins;
mod error;
mod eval;
mod intern;
mod lexer;
mod node;
mod parser;
mod preprocess;
mod resource;
mod run;

pub use crate::{
    error::{Position, ReflexError, ReflexResult},
    resource::{LimitedTracker, NoLimitTracker, ResourceTracker},
    run::{Output, Runner, run_source},
};
