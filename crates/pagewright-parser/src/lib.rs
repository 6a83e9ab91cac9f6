//! Parser for pagewright page sources.
//!
//! This crate turns the text of a page into the pieces the rendering engine
//! works with. It performs no I/O and knows nothing about values, filters or
//! formats: it only understands syntax.
//!
//! # Page Anatomy
//!
//! ```text
//! <!--
//! title: Getting started
//! layout: docs
//! -->
//! <h1>{{ title }}</h1>
//! <p>{{ summary | substring(0, 120) }}</p>
//! ```
//!
//! - Front matter: an optional block of `key: value` lines delimited by a
//!   format-specific prefix and suffix line (see [`parse_front_matter`]).
//! - Body: literal text interleaved with `{{ ... }}` expressions (see
//!   [`parse_template`]).
//!
//! # Expressions
//!
//! An expression is an initial value followed by zero or more filter stages
//! separated by `|`:
//!
//! ```text
//! {{ 1 | add(2) | multiply(3) }}
//! {{ model.items[0].name | upper }}
//! {{ 11200 | assignTo: balance }}
//! {{ { title: 'x', tags: ['a', 'b'] } | json }}
//! ```
//!
//! Stages take arguments in parentheses (`add(2)`) or in colon form
//! (`assignTo: balance`), where the remainder of the stage is passed as a
//! single string argument.
//!
//! # Example
//!
//! ```rust
//! use pagewright_parser::{parse_template, PageFragment};
//!
//! let fragments = parse_template("Hello {{ name | upper }}!");
//! assert_eq!(fragments.len(), 3);
//! assert_eq!(fragments[0], PageFragment::Text("Hello ".into()));
//!
//! let PageFragment::Variable(var) = &fragments[1] else { panic!() };
//! assert_eq!(var.binding.as_deref(), Some("name"));
//! assert_eq!(var.filters[0].name, "upper");
//! assert_eq!(var.original_text, "{{ name | upper }}");
//! ```
//!
//! Malformed expressions are never fatal at this level: a `{{ ... }}` span
//! that does not parse is kept as literal text, which lets pages share
//! syntax with client-side template engines.

mod cursor;
mod error;
pub mod expression;
pub mod fragment;
pub mod front_matter;

pub use error::{ParseError, ParseResult};
pub use expression::{
    parse_accessors, parse_expression, parse_pipeline, split_binding, Accessor, BindingPath,
    Expression, FilterCall, Literal, Pipeline,
};
pub use fragment::{parse_template, PageFragment, VariableFragment};
pub use front_matter::{parse_front_matter, FrontMatter};
