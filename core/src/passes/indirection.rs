use crate::{
    error::Result,
    reconstitute,
    type_graph::TypeGraph,
};

/// Collapse forwarding intersections left behind by the builder.
///
/// Postcondition: no forwarders remain; meaning preserved. An *empty*
/// forwarder (reserved but never resolved) is a structural violation.
pub fn remove_indirection_intersections(graph: TypeGraph) -> Result<TypeGraph> {
    let any_forwarder = graph.iter_reachable().any(|(_, ty)| ty.is_forwarder());
    if !any_forwarder {
        return Ok(graph);
    }
    // the plain copy collapses single-member intersections on the way
    // through and errors on empty ones
    reconstitute::identity(&graph)
}
