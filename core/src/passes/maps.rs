use crate::{
    error::Result,
    reconstitute::{Reconstitutor, rewrite_graph},
    type_graph::{Type, TypeGraph, TypeRef},
};

/// A class needs at least this many properties before it can become a map.
pub const MIN_MAP_PROPERTIES: usize = 4;

/// Turn classes that look like homogeneous string-keyed collections into
/// maps: enough properties, none optional, all of one value type, and the
/// property names not mandated by a schema.
///
/// Returns `changed`; the driver repeats until a fixed point since a
/// rewrite can make an enclosing class eligible.
pub fn infer_maps(graph: TypeGraph) -> Result<(TypeGraph, bool)> {
    let any = graph
        .iter_reachable()
        .any(|(type_ref, _)| map_candidate(&graph, type_ref).is_some());
    if !any {
        return Ok((graph, false));
    }
    let out = rewrite_graph(&graph, map_hook)?;
    tracing::debug!("inferred maps");
    Ok((out, true))
}

/// The homogeneous value type, if this class should become a map.
fn map_candidate(graph: &TypeGraph, type_ref: TypeRef) -> Option<TypeRef> {
    let Type::Class(class) = graph.ty(type_ref) else {
        return None;
    };
    if class.schema_named || class.properties.len() < MIN_MAP_PROPERTIES {
        return None;
    }
    let mut values = class.properties.values();
    let first = values.next()?;
    if first.optional {
        return None;
    }
    values
        .all(|p| !p.optional && p.ty == first.ty)
        .then_some(first.ty)
}

fn map_hook(type_ref: TypeRef, recon: &mut Reconstitutor<'_>) -> Option<Result<TypeRef>> {
    let value = map_candidate(recon.source(), type_ref)?;
    let attrs = recon.source().attributes(type_ref).clone();
    Some((|| {
        let value = recon.map(value, &mut map_hook)?;
        Ok(recon.builder().add_map(value, attrs))
    })())
}
