use std::collections::BTreeSet;

use crate::{
    attributes::Attributes,
    error::Result,
    reconstitute::{Reconstitutor, rewrite_graph},
    type_graph::{PrimitiveKind, Property, Type, TypeGraph, TypeRef},
};

/// Replace every `none` with `any`. After this pass no `none` is
/// reachable: `none` only ever encodes "no information", which targets
/// render as their dynamic type.
pub fn none_to_any(graph: TypeGraph) -> Result<(TypeGraph, bool)> {
    let any = graph
        .iter_reachable()
        .any(|(_, ty)| matches!(ty, Type::Primitive(PrimitiveKind::None)));
    if !any {
        return Ok((graph, true));
    }
    let out = rewrite_graph(&graph, |type_ref, recon| {
        match recon.source().ty(type_ref) {
            Type::Primitive(PrimitiveKind::None) => {
                let attrs = recon.source().attributes(type_ref).clone();
                Some(Ok(recon.builder().add_primitive(PrimitiveKind::Any, attrs)))
            }
            _ => None,
        }
    })?;
    tracing::debug!("replaced none with any");
    Ok((out, true))
}

/// For targets without optional-property syntax: every optional class
/// property becomes a required property of `union{T, null}`.
pub fn optional_to_nullable(graph: TypeGraph) -> Result<(TypeGraph, bool)> {
    let any = graph.iter_reachable().any(|(_, ty)| match ty {
        Type::Class(class) => class.properties.values().any(|p| p.optional),
        _ => false,
    });
    if !any {
        return Ok((graph, true));
    }
    let out = rewrite_graph(&graph, nullable_hook)?;
    tracing::debug!("rewrote optional properties to nullable");
    Ok((out, true))
}

fn nullable_hook(type_ref: TypeRef, recon: &mut Reconstitutor<'_>) -> Option<Result<TypeRef>> {
    match recon.source().ty(type_ref) {
        Type::Class(class) if class.properties.values().any(|p| p.optional) => {
            Some(make_nullable(type_ref, recon))
        }
        _ => None,
    }
}

fn make_nullable(type_ref: TypeRef, recon: &mut Reconstitutor<'_>) -> Result<TypeRef> {
    let source = recon.source();
    let Type::Class(class) = source.ty(type_ref).clone() else {
        return Err(crate::error::Error::structural("nullable hook on non-class"));
    };
    let attrs = source.attributes(type_ref).clone();

    let mut properties = Vec::with_capacity(class.properties.len());
    for (name, property) in class.properties {
        let ty = match property.optional {
            false => recon.map(property.ty, &mut nullable_hook)?,
            true => match recon.source().ty(property.ty) {
                // null and any already admit null
                Type::Primitive(PrimitiveKind::Null) | Type::Primitive(PrimitiveKind::Any) => {
                    recon.map(property.ty, &mut nullable_hook)?
                }
                // keep the union flat: add null to the member set
                Type::Union(members) => {
                    let members = members.clone();
                    let mut mapped = BTreeSet::new();
                    for member in members {
                        mapped.insert(recon.map(member, &mut nullable_hook)?);
                    }
                    mapped.insert(
                        recon
                            .builder()
                            .add_primitive(PrimitiveKind::Null, Attributes::default()),
                    );
                    recon.builder().add_union(mapped, Attributes::default())?
                }
                _ => {
                    let mapped = recon.map(property.ty, &mut nullable_hook)?;
                    let null = recon
                        .builder()
                        .add_primitive(PrimitiveKind::Null, Attributes::default());
                    recon
                        .builder()
                        .add_union(BTreeSet::from([mapped, null]), Attributes::default())?
                }
            },
        };
        properties.push((name, Property {
            ty,
            optional: false,
        }));
    }
    recon
        .builder()
        .add_class(properties, class.nominal, class.schema_named, attrs)
}
