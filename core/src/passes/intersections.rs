use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
};

use indexmap::IndexMap;

use crate::{
    attributes::Attributes,
    error::{Error, Result},
    reconstitute::{Reconstitutor, rewrite_graph},
    type_graph::{PrimitiveKind, Property, Type, TypeGraph, TypeRef},
};

/// Replace every `intersection` node with its concrete meet.
///
/// The meet follows the JSON-Schema `allOf` reading:
///
/// - `any` is the identity, `none` absorbs
/// - unions distribute: `(A|B) ∧ C = (A∧C)|(B∧C)`
/// - equal primitives meet to themselves; `integer ∧ double = integer`;
///   anything else meets to `none`
/// - classes merge property-wise: a property required by any operand stays
///   required, shared property types meet recursively, and a map operand
///   constrains every property
/// - enums intersect their case sets
/// - mismatched structural kinds (class ∧ array, …) meet to `none`
///
/// Returns `done = true` iff no intersection was reachable. Distribution
/// can surface new unions, so the driver alternates with
/// `flatten_unions` until both report done.
pub fn resolve_intersections(graph: TypeGraph) -> Result<(TypeGraph, bool)> {
    let any = graph
        .iter_reachable()
        .any(|(_, ty)| matches!(ty, Type::Intersection(_)));
    if !any {
        return Ok((graph, true));
    }

    // meets are memoized on their expanded operand set, which also
    // terminates cyclic meets through a reserved slot
    let cache: MeetCache = RefCell::new(BTreeMap::new());
    let out = rewrite_graph(&graph, |type_ref, recon| hook(&cache, type_ref, recon))?;
    tracing::debug!("resolved intersections");
    Ok((out, false))
}

type MeetCache = RefCell<BTreeMap<BTreeSet<TypeRef>, TypeRef>>;

fn hook(
    cache: &MeetCache,
    type_ref: TypeRef,
    recon: &mut Reconstitutor<'_>,
) -> Option<Result<TypeRef>> {
    match recon.source().ty(type_ref) {
        Type::Intersection(members) => Some(meet(cache, members.clone(), recon)),
        _ => None,
    }
}

fn meet(cache: &MeetCache, raw: BTreeSet<TypeRef>, recon: &mut Reconstitutor<'_>) -> Result<TypeRef> {
    let source = recon.source();
    let mut operands = BTreeSet::new();
    let mut attrs = Attributes::default();
    expand_operands(source, &raw, &mut operands, &mut attrs, &mut BTreeSet::new());

    if let Some(dest) = cache.borrow().get(&operands) {
        return Ok(*dest);
    }

    // every operand was `any`: unconstrained
    if operands.is_empty() {
        return Ok(recon.builder().add_primitive(PrimitiveKind::Any, attrs));
    }

    if operands.len() == 1
        && let Some(only) = operands.first().copied()
    {
        let dest = recon.map(only, &mut |r, rc| hook(cache, r, rc))?;
        recon.builder().merge_attributes(dest, attrs);
        cache.borrow_mut().insert(operands, dest);
        return Ok(dest);
    }

    let slot = recon.builder().reserve();
    cache.borrow_mut().insert(operands.clone(), slot);
    let dest = meet_concrete(cache, &operands, attrs, recon)?;
    recon.builder().resolve_forwarder(slot, dest)?;
    Ok(slot)
}

/// Flatten nested intersections (and forwarders) into a plain operand set,
/// dropping `any` and folding the dropped nodes' attributes.
fn expand_operands(
    graph: &TypeGraph,
    members: &BTreeSet<TypeRef>,
    out: &mut BTreeSet<TypeRef>,
    attrs: &mut Attributes,
    seen: &mut BTreeSet<TypeRef>,
) {
    for member in members {
        if !seen.insert(*member) {
            continue;
        }
        match graph.ty(*member) {
            Type::Intersection(nested) => {
                let merged = std::mem::take(attrs).merge(graph.attributes(*member).clone());
                *attrs = merged;
                expand_operands(graph, &nested.clone(), out, attrs, seen);
            }
            Type::Primitive(PrimitiveKind::Any) => {
                let merged = std::mem::take(attrs).merge(graph.attributes(*member).clone());
                *attrs = merged;
            }
            _ => {
                out.insert(*member);
            }
        }
    }
}

fn meet_concrete(
    cache: &MeetCache,
    operands: &BTreeSet<TypeRef>,
    mut attrs: Attributes,
    recon: &mut Reconstitutor<'_>,
) -> Result<TypeRef> {
    let source = recon.source();

    // bottom absorbs
    if operands
        .iter()
        .any(|r| matches!(source.ty(*r), Type::Primitive(PrimitiveKind::None)))
    {
        return Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs));
    }

    // distribute over the first union operand
    let union_operand = operands
        .iter()
        .copied()
        .find(|r| matches!(source.ty(*r), Type::Union(_)));
    if let Some(union_ref) = union_operand {
        let branches = match source.ty(union_ref) {
            Type::Union(branches) => branches.clone(),
            _ => BTreeSet::new(),
        };
        let rest: BTreeSet<TypeRef> = operands
            .iter()
            .copied()
            .filter(|r| *r != union_ref)
            .collect();
        let mut results = BTreeSet::new();
        for branch in branches {
            let mut arm = rest.clone();
            arm.insert(branch);
            results.insert(meet(cache, arm, recon)?);
        }
        attrs = attrs.merge(source.attributes(union_ref).clone());
        return recon.builder().add_union(results, attrs);
    }

    // partition the remaining operands by family
    let mut class_operands: Vec<(IndexMap<String, Property>, bool)> = vec![];
    let mut map_values: Vec<TypeRef> = vec![];
    let mut array_elements: Vec<TypeRef> = vec![];
    let mut enum_sets: Vec<BTreeSet<String>> = vec![];
    let mut string_kinds: Vec<PrimitiveKind> = vec![];
    let mut other_primitives: Vec<PrimitiveKind> = vec![];

    for operand in operands {
        attrs = attrs.merge(source.attributes(*operand).clone());
        match source.ty(*operand) {
            Type::Class(class) => {
                class_operands.push((class.properties.clone(), class.schema_named))
            }
            Type::Object(object) => {
                class_operands.push((object.properties.clone(), true));
                if let Some(additional) = object.additional {
                    map_values.push(additional);
                }
            }
            Type::Map(value) => map_values.push(*value),
            Type::Array(element) => array_elements.push(*element),
            Type::Enum(cases) => enum_sets.push(cases.clone()),
            Type::TransformedString(kind) => string_kinds.push(kind.primitive()),
            Type::Primitive(kind) if kind.is_string_like() => string_kinds.push(*kind),
            Type::Primitive(kind) => other_primitives.push(*kind),
            Type::Union(_) | Type::Intersection(_) => {
                return Err(Error::structural("unexpanded operand in meet"));
            }
        }
    }

    let has_classish = !class_operands.is_empty() || !map_values.is_empty();
    let families = [
        has_classish,
        !array_elements.is_empty(),
        !enum_sets.is_empty() || !string_kinds.is_empty(),
        !other_primitives.is_empty(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count();
    if families > 1 {
        return Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs));
    }

    if !array_elements.is_empty() {
        let element = meet(cache, array_elements.into_iter().collect(), recon)?;
        return Ok(recon.builder().add_array(element, attrs));
    }

    if !enum_sets.is_empty() {
        // string operands other than plain `string` conflict with enums
        if string_kinds.iter().any(|k| *k != PrimitiveKind::String) {
            return Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs));
        }
        let mut iter = enum_sets.into_iter();
        let mut cases = iter.next().unwrap_or_default();
        for set in iter {
            cases = cases.intersection(&set).cloned().collect();
        }
        return match cases.is_empty() {
            true => Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs)),
            false => recon.builder().add_enum(cases, attrs),
        };
    }

    if !string_kinds.is_empty() {
        // plain string is the identity among string kinds
        let mut kind = PrimitiveKind::String;
        for candidate in string_kinds {
            if candidate == PrimitiveKind::String || candidate == kind {
                continue;
            }
            match kind {
                PrimitiveKind::String => kind = candidate,
                _ => return Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs)),
            }
        }
        return Ok(recon.builder().add_primitive(kind, attrs));
    }

    if !other_primitives.is_empty() {
        let mut iter = other_primitives.into_iter();
        let mut kind = iter.next().unwrap_or(PrimitiveKind::None);
        for candidate in iter {
            kind = match (kind, candidate) {
                (a, b) if a == b => a,
                (PrimitiveKind::Integer, PrimitiveKind::Double)
                | (PrimitiveKind::Double, PrimitiveKind::Integer) => PrimitiveKind::Integer,
                _ => return Ok(recon.builder().add_primitive(PrimitiveKind::None, attrs)),
            };
        }
        return Ok(recon.builder().add_primitive(kind, attrs));
    }

    if class_operands.is_empty() {
        // maps only
        let value = meet(cache, map_values.into_iter().collect(), recon)?;
        return Ok(recon.builder().add_map(value, attrs));
    }

    // class meet: union of property names, required-if-any-requires,
    // shared types met recursively, map operands constrain every property
    let schema_named = class_operands.iter().any(|(_, named)| *named);
    let mut merged: IndexMap<String, (BTreeSet<TypeRef>, bool)> = IndexMap::new();
    for (properties, _) in &class_operands {
        for (name, property) in properties {
            let entry = merged
                .entry(name.clone())
                .or_insert_with(|| (BTreeSet::new(), true));
            entry.0.insert(property.ty);
            entry.1 = entry.1 && property.optional;
        }
    }

    let mut properties = Vec::with_capacity(merged.len());
    for (name, (mut types, optional)) in merged {
        types.extend(map_values.iter().copied());
        let ty = meet(cache, types, recon)?;
        properties.push((name, Property { ty, optional }));
    }
    recon.builder().add_class(properties, true, schema_named, attrs)
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

    fn resolve(graph: TypeGraph) -> TypeGraph {
        let (graph, _) = resolve_intersections(graph).unwrap();
        graph
    }

    #[test]
    fn classes_meet_property_wise() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let a = b
            .add_class(
                vec![("a".to_string(), Property::required(int))],
                true,
                true,
                Attributes::default(),
            )
            .unwrap();
        let c = b
            .add_class(
                vec![
                    ("a".to_string(), Property::optional(int)),
                    ("b".to_string(), Property::optional(string)),
                ],
                true,
                true,
                Attributes::default(),
            )
            .unwrap();
        let meet = b
            .add_intersection(BTreeSet::from([a, c]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        // `a` required by the first operand stays required
        assert_eq!(graph.to_string(), "top;{a:int,b?:str}");
    }

    #[test]
    fn incompatible_primitives_meet_to_none() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let meet = b
            .add_intersection(BTreeSet::from([int, string]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        assert_eq!(graph.to_string(), "top;none");
    }

    #[test]
    fn integer_is_the_meet_of_integer_and_double() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let double = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let meet = b
            .add_intersection(BTreeSet::from([int, double]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        assert_eq!(graph.to_string(), "top;int");
    }

    #[test]
    fn any_is_the_identity() {
        let mut b = builder();
        let any = b.add_primitive(PrimitiveKind::Any, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let meet = b
            .add_intersection(BTreeSet::from([any, string]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        assert_eq!(graph.to_string(), "top;str");
    }

    #[test]
    fn unions_distribute() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let double = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let union = b
            .add_union(BTreeSet::from([int, string]), Attributes::default())
            .unwrap();
        let meet = b
            .add_intersection(BTreeSet::from([union, double]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        // int∧double = int, str∧double = none; the union keeps both arms
        // until flatten_unions drops the none member
        assert_eq!(graph.to_string(), "top;|int|none|");
        let (graph, _) = crate::passes::flatten_unions(graph, true, false).unwrap();
        assert_eq!(graph.to_string(), "top;int");
    }

    #[test]
    fn enums_intersect_cases() {
        let mut b = builder();
        let e1 = b
            .add_enum(
                BTreeSet::from(["r".to_string(), "g".to_string(), "b".to_string()]),
                Attributes::default(),
            )
            .unwrap();
        let e2 = b
            .add_enum(
                BTreeSet::from(["g".to_string(), "b".to_string(), "k".to_string()]),
                Attributes::default(),
            )
            .unwrap();
        let meet = b
            .add_intersection(BTreeSet::from([e1, e2]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        assert_eq!(graph.to_string(), "top;enum<b,g>");
    }

    #[test]
    fn maps_constrain_class_properties() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let double = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let class = b
            .add_class(
                vec![("n".to_string(), Property::required(double))],
                true,
                true,
                Attributes::default(),
            )
            .unwrap();
        let map = b.add_map(int, Attributes::default());
        let meet = b
            .add_intersection(BTreeSet::from([class, map]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        assert_eq!(graph.to_string(), "top;{n:int}");
    }

    #[test]
    fn mismatched_structures_meet_to_none() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let arr = b.add_array(int, Attributes::default());
        let class = b
            .add_class(
                vec![("x".to_string(), Property::required(int))],
                true,
                true,
                Attributes::default(),
            )
            .unwrap();
        let meet = b
            .add_intersection(BTreeSet::from([arr, class]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());
        assert_eq!(graph.to_string(), "top;none");
    }

    #[test]
    fn is_idempotent() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let double = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let meet = b
            .add_intersection(BTreeSet::from([int, double]), Attributes::default())
            .unwrap();
        b.add_top_level("top", meet);
        let graph = resolve(b.finish().unwrap());

        let (graph, done) = resolve_intersections(graph).unwrap();
        assert!(done);
        assert_eq!(graph.to_string(), "top;int");
    }
}
