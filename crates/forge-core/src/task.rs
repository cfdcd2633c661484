// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The task boundary: named parameters over a tagged value union.
//!
//! A task declares its inputs and outputs by name; the engine sets and
//! reads them as [`Value`]s and coerces at the boundary. An invalid
//! conversion is a task failure, never a panic.

use thiserror::Error;

use crate::item::Item;
use crate::sched::TaskHost;

/// Failures at the task boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// The task declares no parameter with this name.
    #[error("unknown task parameter: {0}")]
    UnknownParameter(String),
    /// The supplied value cannot be coerced to the declared type.
    #[error("parameter {parameter}: expected {expected}, got {actual}")]
    IncompatibleValue {
        /// Parameter name.
        parameter: String,
        /// Declared kind.
        expected: &'static str,
        /// Supplied kind.
        actual: &'static str,
    },
    /// The task body failed.
    #[error("task failed: {0}")]
    Failed(String),
}

/// A task parameter value: primitive scalars, their arrays, and items.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// A single item.
    Item(Box<Item>),
    /// Boolean array.
    BoolList(Vec<bool>),
    /// Integer array.
    IntList(Vec<i64>),
    /// String array.
    StrList(Vec<String>),
    /// Item array.
    ItemList(Vec<Item>),
}

impl Value {
    /// Name of this value's kind, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Item(_) => "item",
            Self::BoolList(_) => "bool[]",
            Self::IntList(_) => "int[]",
            Self::StrList(_) => "string[]",
            Self::ItemList(_) => "item[]",
        }
    }

    /// Coerces to a boolean: booleans pass through, strings parse
    /// case-insensitively, single-element lists unwrap.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::Str(s) if s.eq_ignore_ascii_case("false") => Some(false),
            Self::BoolList(list) if list.len() == 1 => Some(list[0]),
            Self::StrList(list) if list.len() == 1 => {
                Self::Str(list[0].clone()).as_bool()
            }
            _ => None,
        }
    }

    /// Coerces to an integer: integers pass through, strings parse,
    /// single-element lists unwrap.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.trim().parse().ok(),
            Self::IntList(list) if list.len() == 1 => Some(list[0]),
            Self::StrList(list) if list.len() == 1 => list[0].trim().parse().ok(),
            _ => None,
        }
    }

    /// Coerces to a string: scalars render, items yield their include,
    /// single-element lists unwrap. Lists longer than one do not flatten.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Str(s) => Some(s.clone()),
            Self::Item(item) => Some(item.include()),
            Self::StrList(list) if list.len() == 1 => Some(list[0].clone()),
            Self::ItemList(list) if list.len() == 1 => Some(list[0].include()),
            _ => None,
        }
    }

    /// Coerces to an item list of `item_type`: items pass through
    /// (keeping their own type), strings become fresh items.
    #[must_use]
    pub fn into_items(self, item_type: &str) -> Option<Vec<Item>> {
        match self {
            Self::Item(item) => Some(vec![*item]),
            Self::ItemList(items) => Some(items),
            Self::Str(s) => Some(vec![Item::new(item_type, s)]),
            Self::StrList(list) => Some(
                list.into_iter()
                    .map(|s| Item::new(item_type, s))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// A single invocable build step with named inputs and outputs.
///
/// Implementations coerce with the [`Value`] helpers and report
/// [`TaskError::IncompatibleValue`] when a conversion fails; the engine
/// folds that into the target's result as a task failure.
pub trait TaskInstance {
    /// Sets an input parameter before execution.
    fn set_input(&mut self, name: &str, value: Value) -> Result<(), TaskError>;

    /// Reads an output parameter after execution.
    fn get_output(&self, name: &str) -> Result<Value, TaskError>;

    /// Runs the task. `host` carries the yield/reacquire callbacks for
    /// long-running work. Returns overall success.
    fn execute(&mut self, host: &TaskHost) -> Result<bool, TaskError>;
}
