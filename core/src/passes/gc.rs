use crate::{
    error::Result,
    reconstitute::{Reconstitutor, rewrite_graph},
    type_graph::{Property, Type, TypeGraph, TypeRef},
};

/// Reachability sweep: the result contains exactly the types reachable
/// from the top levels, re-interned, in canonical (deterministic
/// traversal) order. With `alphabetize` set, class and object properties
/// come out in lexicographic key order.
pub fn garbage_collect(graph: TypeGraph, alphabetize: bool) -> Result<TypeGraph> {
    let out = match alphabetize {
        false => crate::reconstitute::identity(&graph)?,
        true => rewrite_graph(&graph, alphabetize_hook)?,
    };
    tracing::debug!(
        before = graph.len(),
        after = out.len(),
        "garbage collected"
    );
    Ok(out)
}

fn alphabetize_hook(
    type_ref: TypeRef,
    recon: &mut Reconstitutor<'_>,
) -> Option<Result<TypeRef>> {
    let sortable = match recon.source().ty(type_ref) {
        Type::Class(class) => !class.properties.keys().is_sorted(),
        Type::Object(object) => !object.properties.keys().is_sorted(),
        _ => false,
    };
    if !sortable {
        return None;
    }
    Some(alphabetize_one(type_ref, recon))
}

fn alphabetize_one(type_ref: TypeRef, recon: &mut Reconstitutor<'_>) -> Result<TypeRef> {
    let attrs = recon.source().attributes(type_ref).clone();
    match recon.source().ty(type_ref).clone() {
        Type::Class(class) => {
            let mut names: Vec<&String> = class.properties.keys().collect();
            names.sort();
            let names: Vec<String> = names.into_iter().cloned().collect();
            let mut properties = Vec::with_capacity(names.len());
            for name in names {
                let property = class.properties[&name];
                let ty = recon.map(property.ty, &mut alphabetize_hook)?;
                properties.push((name, Property {
                    ty,
                    optional: property.optional,
                }));
            }
            recon
                .builder()
                .add_class(properties, class.nominal, class.schema_named, attrs)
        }
        Type::Object(object) => {
            let mut names: Vec<&String> = object.properties.keys().collect();
            names.sort();
            let names: Vec<String> = names.into_iter().cloned().collect();
            let mut properties = Vec::with_capacity(names.len());
            for name in names {
                let property = object.properties[&name];
                let ty = recon.map(property.ty, &mut alphabetize_hook)?;
                properties.push((name, Property {
                    ty,
                    optional: property.optional,
                }));
            }
            let additional = match object.additional {
                Some(additional) => Some(recon.map(additional, &mut alphabetize_hook)?),
                None => None,
            };
            recon.builder().add_object(properties, additional, attrs)
        }
        _ => Err(crate::error::Error::structural("alphabetize hook on leaf")),
    }
}
