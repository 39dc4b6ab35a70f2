//! # Rewrite passes
//!
//! Each pass is a pure function from graph to graph. A pass either returns
//! its input unchanged together with `done = true`, or a wholly new graph;
//! no pass ever observes a partially-rewritten graph. Every pass is
//! idempotent under its own postcondition: applying it to its own output
//! is a no-op.

mod classes;
mod gc;
mod indirection;
mod intersections;
mod maps;
mod nullability;
mod objects;
mod strings;
mod transformations;
mod unions;

pub use classes::combine_classes;
pub use gc::garbage_collect;
pub use indirection::remove_indirection_intersections;
pub use intersections::resolve_intersections;
pub use maps::{MIN_MAP_PROPERTIES, infer_maps};
pub use nullability::{none_to_any, optional_to_nullable};
pub use objects::replace_object_type;
pub use strings::{ExpandStringsPolicy, expand_strings, flatten_strings};
pub use transformations::make_transformations;
pub use unions::flatten_unions;

use crate::{
    error::{Error, Result},
    reconstitute,
    type_graph::TypeGraph,
};

/// Run the local canonicalizing rewrites (duplicate interning, singleton
/// collapse) until a fixed point. Each round is a full reconstitution, so
/// the node count shrinks monotonically; equal counts mean stability.
pub fn rewrite_fixed_point(graph: TypeGraph) -> Result<TypeGraph> {
    let mut graph = graph;
    let bound = graph.len() + 1;
    for _ in 0..bound {
        let rewritten = reconstitute::identity(&graph)?;
        let stable = rewritten.len() == graph.len();
        graph = rewritten;
        if stable {
            return Ok(graph);
        }
    }
    Err(Error::structural("local rewrites did not reach a fixed point"))
}
