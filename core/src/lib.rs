//! Infers statically-typed schemas from loosely-typed JSON (samples
//! and/or JSON Schema) and lowers them into a canonical type graph for
//! code generation.

pub mod attributes;
pub mod builder;
pub mod error;
pub mod input;
pub mod language;
pub mod names;
pub mod passes;
pub mod pipeline;
pub mod reconstitute;
pub mod run;
pub mod schema;
pub mod type_graph;

pub use error::{Error, Result};
