use std::collections::BTreeSet;

use crate::{
    attributes::{Attributes, StringCases},
    error::Result,
    reconstitute::rewrite_graph,
    type_graph::{PrimitiveKind, Type, TypeGraph, TypeRef},
};

/// When string types with known case sets expand into enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandStringsPolicy {
    /// Expand every known case set, including schema-provided ones
    /// (schema-mode).
    All,
    /// Expand inferred case sets (samples-mode with enum inference on).
    Infer,
    /// Never expand.
    Never,
}

/// Expand plain strings whose observed case set is still bounded into enum
/// types, per policy.
///
/// Schema-provided case sets (`all`) expand even as singletons and inside
/// unions. Inferred ones (`infer`) need at least two observed cases, and a
/// string that is one alternative among others in a union stays a string:
/// mixed values are evidence of free-form data, not of an enumeration.
pub fn expand_strings(
    graph: TypeGraph,
    policy: ExpandStringsPolicy,
) -> Result<(TypeGraph, bool)> {
    let min_cases = match policy {
        ExpandStringsPolicy::Never => return Ok((graph, true)),
        ExpandStringsPolicy::All => 1,
        ExpandStringsPolicy::Infer => 2,
    };
    let mut union_members = BTreeSet::new();
    if policy == ExpandStringsPolicy::Infer {
        for (_, ty) in graph.iter_reachable() {
            if let Type::Union(members) = ty {
                union_members.extend(members.iter().copied());
            }
        }
    }

    let any = graph
        .iter_reachable()
        .any(|(type_ref, _)| expandable(&graph, type_ref, min_cases, &union_members));
    if !any {
        return Ok((graph, true));
    }

    let out = rewrite_graph(&graph, |type_ref, recon| {
        if !expandable(recon.source(), type_ref, min_cases, &union_members) {
            return None;
        }
        let mut attrs = recon.source().attributes(type_ref).clone();
        let cases = match std::mem::take(&mut attrs.string_cases) {
            StringCases::Cases(cases) => cases,
            StringCases::Unbounded => return None,
        };
        Some(recon.builder().add_enum(cases, attrs))
    })?;
    tracing::debug!(?policy, "expanded strings");
    Ok((out, false))
}

fn expandable(
    graph: &TypeGraph,
    type_ref: TypeRef,
    min_cases: usize,
    union_members: &BTreeSet<TypeRef>,
) -> bool {
    matches!(graph.ty(type_ref), Type::Primitive(PrimitiveKind::String))
        && !union_members.contains(&type_ref)
        && graph
            .attributes(type_ref)
            .string_cases
            .as_cases()
            .is_some_and(|cases| cases.len() >= min_cases)
}

/// Collapse unions of string subtypes where a plain string subsumes them:
/// `union{string, enum, date}` becomes a single unbounded string (plus any
/// non-string members).
pub fn flatten_strings(graph: TypeGraph) -> Result<(TypeGraph, bool)> {
    let any = graph
        .iter_reachable()
        .any(|(type_ref, _)| collapsible(&graph, type_ref));
    if !any {
        return Ok((graph, true));
    }

    let out = rewrite_graph(&graph, collapse_hook)?;
    tracing::debug!("flattened strings");
    Ok((out, false))
}

fn collapse_hook(
    type_ref: TypeRef,
    recon: &mut crate::reconstitute::Reconstitutor<'_>,
) -> Option<Result<TypeRef>> {
    if !collapsible(recon.source(), type_ref) {
        return None;
    }
    Some(collapse_one(type_ref, recon))
}

fn collapse_one(
    type_ref: TypeRef,
    recon: &mut crate::reconstitute::Reconstitutor<'_>,
) -> Result<TypeRef> {
    let source = recon.source();
    let members = match source.ty(type_ref) {
        Type::Union(members) => members.clone(),
        _ => BTreeSet::new(),
    };
    let union_attrs = source.attributes(type_ref).clone();

    let mut string_attrs = Attributes::default();
    let mut rest = BTreeSet::new();
    for member in members {
        match string_like(source, member) {
            true => {
                string_attrs = string_attrs.merge(source.attributes(member).clone());
            }
            false => {
                rest.insert(recon.map(member, &mut collapse_hook)?);
            }
        }
    }
    // subsumption widens the case set away
    string_attrs.string_cases = StringCases::Unbounded;
    let string = recon
        .builder()
        .add_primitive(PrimitiveKind::String, string_attrs);
    rest.insert(string);
    recon.builder().add_union(rest, union_attrs)
}

fn string_like(graph: &TypeGraph, type_ref: TypeRef) -> bool {
    match graph.ty(type_ref) {
        Type::Primitive(kind) => kind.is_string_like(),
        Type::Enum(_) | Type::TransformedString(_) => true,
        _ => false,
    }
}

/// A union collapses when it has a plain string member and at least one
/// other string-like member.
fn collapsible(graph: &TypeGraph, type_ref: TypeRef) -> bool {
    let Type::Union(members) = graph.ty(type_ref) else {
        return false;
    };
    let plain = members
        .iter()
        .filter(|m| matches!(graph.ty(**m), Type::Primitive(PrimitiveKind::String)))
        .count();
    let stringish = members.iter().filter(|m| string_like(graph, **m)).count();
    plain >= 1 && stringish >= 2
}
