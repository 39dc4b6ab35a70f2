use std::collections::BTreeSet;

use crate::{
    error::Result,
    reconstitute::rewrite_graph,
    type_graph::{Property, Type, TypeGraph, TypeRef},
};

/// Lower `object` nodes for targets without a full object type: the named
/// properties become a class, additional properties become a map, and a
/// node carrying both becomes a union of the two.
///
/// Targets that support the full object type keep their objects untouched.
pub fn replace_object_type(
    graph: TypeGraph,
    supports_full_object_type: bool,
) -> Result<(TypeGraph, bool)> {
    if supports_full_object_type {
        return Ok((graph, true));
    }
    let any = graph
        .iter_reachable()
        .any(|(_, ty)| matches!(ty, Type::Object(_)));
    if !any {
        return Ok((graph, true));
    }

    let out = rewrite_graph(&graph, object_hook)?;
    tracing::debug!("replaced object types");
    Ok((out, true))
}

fn object_hook(
    type_ref: TypeRef,
    recon: &mut crate::reconstitute::Reconstitutor<'_>,
) -> Option<Result<TypeRef>> {
    match recon.source().ty(type_ref) {
        Type::Object(_) => Some(replace_one(type_ref, recon)),
        _ => None,
    }
}

fn replace_one(
    type_ref: TypeRef,
    recon: &mut crate::reconstitute::Reconstitutor<'_>,
) -> Result<TypeRef> {
    let Type::Object(object) = recon.source().ty(type_ref).clone() else {
        return Err(crate::error::Error::structural("object hook on non-object"));
    };
    let attrs = recon.source().attributes(type_ref).clone();

    let mut properties = Vec::with_capacity(object.properties.len());
    for (name, property) in object.properties {
        let ty = recon.map(property.ty, &mut object_hook)?;
        properties.push((name, Property {
            ty,
            optional: property.optional,
        }));
    }
    let additional = match object.additional {
        Some(additional) => Some(recon.map(additional, &mut object_hook)?),
        None => None,
    };

    match (properties.is_empty(), additional) {
        (_, None) => recon.builder().add_class(properties, true, true, attrs),
        (true, Some(value)) => Ok(recon.builder().add_map(value, attrs)),
        (false, Some(value)) => {
            let class = recon
                .builder()
                .add_class(properties, true, true, attrs.clone())?;
            let map = recon.builder().add_map(value, attrs.clone());
            recon
                .builder()
                .add_union(BTreeSet::from([class, map]), attrs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attributes::Attributes,
        builder::TypeBuilder,
        type_graph::{PrimitiveKind, StringTypeMapping},
    };
    use pretty_assertions::assert_eq;

    fn object_graph() -> TypeGraph {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let object = b
            .add_object(
                vec![("id".to_string(), Property::required(int))],
                Some(string),
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("top", object);
        b.finish().unwrap()
    }

    #[test]
    fn supported_target_keeps_objects() {
        let graph = object_graph();
        let (graph, done) = replace_object_type(graph, true).unwrap();
        assert!(done);
        assert_eq!(graph.to_string(), "top;{id:int,..:str}");
    }

    #[test]
    fn unsupported_target_gets_class_map_union() {
        let graph = object_graph();
        let (graph, _) = replace_object_type(graph, false).unwrap();
        assert_eq!(graph.to_string(), "top;|map<str>|{id:int}|");
    }

    #[test]
    fn pure_additional_becomes_map() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let object = b
            .add_object(vec![], Some(int), Attributes::default())
            .unwrap();
        b.add_top_level("top", object);
        let graph = b.finish().unwrap();

        let (graph, _) = replace_object_type(graph, false).unwrap();
        assert_eq!(graph.to_string(), "top;map<int>");
    }

    #[test]
    fn no_additional_becomes_class() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let object = b
            .add_object(
                vec![("id".to_string(), Property::required(int))],
                None,
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("top", object);
        let graph = b.finish().unwrap();

        let (graph, _) = replace_object_type(graph, false).unwrap();
        assert_eq!(graph.to_string(), "top;{id:int}");
    }
}
