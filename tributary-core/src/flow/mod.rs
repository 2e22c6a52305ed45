//! Dependency declarations and the catalogs that hold them.

mod catalog;
mod declaration;

pub use catalog::{Catalog, Component, Dataflow};
pub use declaration::{
    Declaration, DeclarationKind, Dependencies, EvalFn, FormulaBuilder, FormulaError, Inputs, Value,
};
