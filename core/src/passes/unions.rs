use std::collections::BTreeSet;

use crate::{
    attributes::Attributes,
    error::Result,
    reconstitute::{Reconstitutor, rewrite_graph},
    type_graph::{PrimitiveKind, Type, TypeGraph, TypeRef},
};

/// Flatten unions: no union member is itself a union, no duplicates, no
/// `none` members, never fewer than two members (singletons collapse to
/// the member, an all-`none` union collapses to `none`).
///
/// With `strict = true` and a target that does not support unions carrying
/// both number types, an `integer` member is folded into a `double`
/// member.
///
/// Returns `done = true` iff there was nothing to do; the caller loops
/// until then.
pub fn flatten_unions(
    graph: TypeGraph,
    strict: bool,
    supports_unions_with_both_number_types: bool,
) -> Result<(TypeGraph, bool)> {
    let unify_numbers = strict && !supports_unions_with_both_number_types;
    if !needs_flattening(&graph, unify_numbers) {
        return Ok((graph, true));
    }
    let out = rewrite_graph(&graph, |type_ref, recon| {
        flatten_hook(type_ref, recon, unify_numbers)
    })?;
    tracing::debug!(strict, unify_numbers, "flattened unions");
    Ok((out, false))
}

fn needs_flattening(graph: &TypeGraph, unify_numbers: bool) -> bool {
    for (_, ty) in graph.iter_reachable() {
        if let Type::Union(members) = ty {
            let mut has_integer = false;
            let mut has_double = false;
            for member in members {
                match graph.ty(*member) {
                    Type::Union(_) => return true,
                    Type::Primitive(PrimitiveKind::None) => return true,
                    Type::Primitive(PrimitiveKind::Integer) => has_integer = true,
                    Type::Primitive(PrimitiveKind::Double) => has_double = true,
                    _ => {}
                }
            }
            if unify_numbers && has_integer && has_double {
                return true;
            }
        }
    }
    false
}

fn flatten_hook(
    type_ref: TypeRef,
    recon: &mut Reconstitutor<'_>,
    unify_numbers: bool,
) -> Option<Result<TypeRef>> {
    if !matches!(recon.source().ty(type_ref), Type::Union(_)) {
        return None;
    }
    Some(flatten_one(type_ref, recon, unify_numbers))
}

fn flatten_one(
    type_ref: TypeRef,
    recon: &mut Reconstitutor<'_>,
    unify_numbers: bool,
) -> Result<TypeRef> {
    // expand to the transitive member closure in source coordinates,
    // dropping `none` members and absorbing nested union attributes
    let mut members = BTreeSet::new();
    let mut attrs = Attributes::default();
    let mut seen = BTreeSet::new();
    collect_members(recon.source(), type_ref, &mut members, &mut attrs, &mut seen);

    if members.is_empty() {
        // a union of nothing but `none` is itself `none`
        return Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs));
    }

    let source = recon.source();
    let mut dropped_integer_attrs = None;
    if unify_numbers {
        let has_double = members
            .iter()
            .any(|m| matches!(source.ty(*m), Type::Primitive(PrimitiveKind::Double)));
        if has_double {
            members.retain(|m| match source.ty(*m) {
                Type::Primitive(PrimitiveKind::Integer) => {
                    dropped_integer_attrs = Some(source.attributes(*m).clone());
                    false
                }
                _ => true,
            });
        }
    }

    let mut mapped = BTreeSet::new();
    let mut double_dest = None;
    for member in members {
        let is_double = matches!(source.ty(member), Type::Primitive(PrimitiveKind::Double));
        let dest = recon.map(member, &mut |r, rc| flatten_hook(r, rc, unify_numbers))?;
        if is_double {
            double_dest = Some(dest);
        }
        mapped.insert(dest);
    }
    if let (Some(integer_attrs), Some(dest)) = (dropped_integer_attrs, double_dest) {
        // the unified double inherits the dropped integer's attributes
        recon.builder().merge_attributes(dest, integer_attrs);
    }

    recon.builder().add_union(mapped, attrs)
}

fn collect_members(
    graph: &TypeGraph,
    type_ref: TypeRef,
    out: &mut BTreeSet<TypeRef>,
    attrs: &mut Attributes,
    seen: &mut BTreeSet<TypeRef>,
) {
    if !seen.insert(type_ref) {
        return;
    }
    match graph.ty(type_ref) {
        Type::Union(members) => {
            let merged = std::mem::take(attrs).merge(graph.attributes(type_ref).clone());
            *attrs = merged;
            for member in members {
                collect_members(graph, *member, out, attrs, seen);
            }
        }
        Type::Primitive(PrimitiveKind::None) => {
            let merged = std::mem::take(attrs).merge(graph.attributes(type_ref).clone());
            *attrs = merged;
        }
        _ => {
            out.insert(type_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::TypeBuilder,
        type_graph::StringTypeMapping,
    };
    use pretty_assertions::assert_eq;

    fn builder() -> TypeBuilder {
        TypeBuilder::new(StringTypeMapping::default())
    }

    #[test]
    fn nested_unions_flatten() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let null = b.add_primitive(PrimitiveKind::Null, Attributes::default());
        let inner = b
            .add_union(BTreeSet::from([string, null]), Attributes::default())
            .unwrap();
        let outer = b
            .add_union(BTreeSet::from([int, inner]), Attributes::default())
            .unwrap();
        b.add_top_level("top", outer);
        let graph = b.finish().unwrap();

        let (graph, done) = flatten_unions(graph, false, true).unwrap();
        assert!(!done);
        assert_eq!(graph.to_string(), "top;|int|null|str|");

        let (graph, done) = flatten_unions(graph, false, true).unwrap();
        assert!(done);
        assert_eq!(graph.to_string(), "top;|int|null|str|");
    }

    #[test]
    fn none_members_are_dropped() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let none = b.add_primitive(PrimitiveKind::None, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let union = b
            .add_union(BTreeSet::from([int, none, string]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, _) = flatten_unions(graph, false, true).unwrap();
        assert_eq!(graph.to_string(), "top;|int|str|");
    }

    #[test]
    fn union_of_none_and_one_member_collapses() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let none = b.add_primitive(PrimitiveKind::None, Attributes::default());
        let union = b
            .add_union(BTreeSet::from([int, none]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, _) = flatten_unions(graph, false, true).unwrap();
        assert_eq!(graph.to_string(), "top;int");
    }

    #[test]
    fn strict_mode_unifies_numbers() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let double = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let union = b
            .add_union(BTreeSet::from([int, double, string]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        // target supports both numbers: nothing to unify
        let (graph, done) = flatten_unions(graph.clone(), true, true).unwrap();
        assert!(done);
        assert_eq!(graph.to_string(), "top;|double|int|str|");

        // target does not: integer folds into double
        let (graph, done) = flatten_unions(graph, true, false).unwrap();
        assert!(!done);
        assert_eq!(graph.to_string(), "top;|double|str|");
    }

    #[test]
    fn non_strict_keeps_numbers_even_without_support() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let double = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let union = b
            .add_union(BTreeSet::from([int, double]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, done) = flatten_unions(graph, false, false).unwrap();
        assert!(done);
        assert_eq!(graph.to_string(), "top;|double|int|");
    }
}
