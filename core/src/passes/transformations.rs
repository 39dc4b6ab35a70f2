use crate::{
    error::Result,
    reconstitute::rewrite_graph,
    type_graph::{PrimitiveKind, TransformerKind, Type, TypeGraph},
};

/// Wrap the specialized string primitives into transformed-string nodes
/// for targets whose string-type mapping keeps them distinct. Renderers
/// emit decode/encode transformers for these.
///
/// Graphs built under a collapsing mapping never contain the specialized
/// primitives in the first place, so this is a no-op there.
pub fn make_transformations(graph: TypeGraph) -> Result<(TypeGraph, bool)> {
    let any = graph
        .iter_reachable()
        .any(|(_, ty)| transformer_for(ty).is_some());
    if !any {
        return Ok((graph, true));
    }
    let out = rewrite_graph(&graph, |type_ref, recon| {
        let kind = transformer_for(recon.source().ty(type_ref))?;
        let attrs = recon.source().attributes(type_ref).clone();
        match recon.source().string_type_mapping().keeps(kind) {
            true => Some(Ok(recon.builder().add_transformed_string(kind, attrs))),
            // a specialized primitive under a collapsing mapping has no
            // transformer; degrade to plain string
            false => Some(Ok(recon
                .builder()
                .add_primitive(PrimitiveKind::String, attrs))),
        }
    })?;
    tracing::debug!("inserted string transformations");
    Ok((out, true))
}

fn transformer_for(ty: &Type) -> Option<TransformerKind> {
    match ty {
        Type::Primitive(PrimitiveKind::Date) => Some(TransformerKind::Date),
        Type::Primitive(PrimitiveKind::Time) => Some(TransformerKind::Time),
        Type::Primitive(PrimitiveKind::DateTime) => Some(TransformerKind::DateTime),
        Type::Primitive(PrimitiveKind::IntegerString) => Some(TransformerKind::IntegerString),
        Type::Primitive(PrimitiveKind::BoolString) => Some(TransformerKind::BoolString),
        _ => None,
    }
}
