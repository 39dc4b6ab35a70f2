use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
};

use indexmap::IndexMap;

use crate::{
    attributes::Attributes,
    error::Result,
    reconstitute::{Reconstitutor, rewrite_graph},
    type_graph::{Property, Type, TypeGraph, TypeRef},
};

/// Merge structurally similar classes: classes whose property-name sets
/// are identical collapse into one, property types joining as a flat
/// union and a property optional in any member staying optional.
///
/// The driver runs this twice: a first pass, and a cleanup pass only when
/// the first one changed the graph. Both run the same merge; the flags
/// select the log detail only.
///
/// Returns `changed = true` when at least one group was merged.
pub fn combine_classes(
    graph: TypeGraph,
    alphabetize: bool,
    first_pass: bool,
    final_pass: bool,
) -> Result<(TypeGraph, bool)> {
    // group reachable classes by their property-name sets
    let mut groups: BTreeMap<BTreeSet<String>, Vec<TypeRef>> = BTreeMap::new();
    for (type_ref, ty) in graph.iter_reachable() {
        if let Type::Class(class) = ty {
            let names: BTreeSet<String> = class.properties.keys().cloned().collect();
            groups.entry(names).or_default().push(type_ref);
        }
    }
    groups.retain(|_, members| members.len() > 1);
    if groups.is_empty() {
        return Ok((graph, false));
    }

    tracing::debug!(
        groups = groups.len(),
        first_pass,
        final_pass,
        "combining classes"
    );

    let mut group_of = BTreeMap::new();
    let mut group_members = vec![];
    for (_, members) in groups {
        let id = group_members.len();
        for member in &members {
            group_of.insert(*member, id);
        }
        group_members.push(members);
    }

    let combiner = Combiner {
        group_of,
        group_members,
        merged: RefCell::new(BTreeMap::new()),
        alphabetize,
    };
    let out = rewrite_graph(&graph, |type_ref, recon| combiner.hook(type_ref, recon))?;
    Ok((out, true))
}

struct Combiner {
    group_of: BTreeMap<TypeRef, usize>,
    group_members: Vec<Vec<TypeRef>>,
    /// group id -> destination (a reserved slot while the merge is being
    /// built, which also terminates cyclic member references)
    merged: RefCell<BTreeMap<usize, TypeRef>>,
    alphabetize: bool,
}

impl Combiner {
    fn hook(&self, type_ref: TypeRef, recon: &mut Reconstitutor<'_>) -> Option<Result<TypeRef>> {
        let group = *self.group_of.get(&type_ref)?;
        Some(self.merge_group(group, recon))
    }

    fn merge_group(&self, group: usize, recon: &mut Reconstitutor<'_>) -> Result<TypeRef> {
        if let Some(dest) = self.merged.borrow().get(&group) {
            return Ok(*dest);
        }
        let slot = recon.builder().reserve();
        self.merged.borrow_mut().insert(group, slot);

        let source = recon.source();
        let mut attrs = Attributes::default();
        let mut schema_named = false;
        let mut properties: IndexMap<String, (BTreeSet<TypeRef>, bool)> = IndexMap::new();
        for member in &self.group_members[group] {
            attrs = attrs.merge(source.attributes(*member).clone());
            let Type::Class(class) = source.ty(*member) else {
                continue;
            };
            schema_named = schema_named || class.schema_named;
            for (name, property) in &class.properties {
                let entry = properties
                    .entry(name.clone())
                    .or_insert_with(|| (BTreeSet::new(), false));
                // the joined type must stay a flat union, so expand union
                // members in source coordinates before mapping
                collect_flat(source, property.ty, &mut entry.0);
                entry.1 = entry.1 || property.optional;
            }
        }

        if self.alphabetize {
            properties.sort_keys();
        }

        let mut built = Vec::with_capacity(properties.len());
        for (name, (types, optional)) in properties {
            let mut mapped = BTreeSet::new();
            for ty in types {
                mapped.insert(recon.map(ty, &mut |r, rc| self.hook(r, rc))?);
            }
            let ty = match mapped.is_empty() {
                // every member type was `none`
                true => recon.builder().add_primitive(
                    crate::type_graph::PrimitiveKind::None,
                    Attributes::default(),
                ),
                false => recon.builder().add_union(mapped, Attributes::default())?,
            };
            built.push((name, Property { ty, optional }));
        }

        let class = recon
            .builder()
            .add_class(built, true, schema_named, attrs)?;
        recon.builder().resolve_forwarder(slot, class)?;
        Ok(slot)
    }
}

/// Expand a (possibly union) ref into flat non-union members. `none`
/// members carry no information and drop out of the join.
fn collect_flat(graph: &TypeGraph, type_ref: TypeRef, out: &mut BTreeSet<TypeRef>) {
    match graph.ty(type_ref) {
        Type::Union(members) => {
            for member in members.clone() {
                collect_flat(graph, member, out);
            }
        }
        Type::Primitive(crate::type_graph::PrimitiveKind::None) => {}
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
        type_graph::{PrimitiveKind, StringTypeMapping},
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn same_name_sets_merge_with_union_types() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let c1 = b
            .add_class(
                vec![("a".to_string(), Property::required(int))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![("a".to_string(), Property::required(string))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let union = b
            .add_union(BTreeSet::from([c1, c2]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, changed) = combine_classes(graph, false, true, false).unwrap();
        assert!(changed);
        // both classes map to the merged one; the singleton union collapses
        assert_eq!(graph.to_string(), "top;{a:|int|str|}");
    }

    #[test]
    fn optionality_is_joined() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c1 = b
            .add_class(
                vec![("a".to_string(), Property::required(int))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![("a".to_string(), Property::optional(int))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let union = b
            .add_union(BTreeSet::from([c1, c2]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, _) = combine_classes(graph, false, true, false).unwrap();
        assert_eq!(graph.to_string(), "top;{a?:int}");
    }

    #[test]
    fn different_name_sets_stay_apart() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c1 = b
            .add_class(
                vec![("a".to_string(), Property::required(int))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![("b".to_string(), Property::required(int))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let union = b
            .add_union(BTreeSet::from([c1, c2]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let before = graph.to_string();
        let (graph, changed) = combine_classes(graph, false, true, false).unwrap();
        assert!(!changed);
        assert_eq!(graph.to_string(), before);
    }

    #[test]
    fn merged_classes_alphabetize_on_request() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c1 = b
            .add_class(
                vec![
                    ("z".to_string(), Property::required(int)),
                    ("a".to_string(), Property::required(int)),
                ],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![
                    ("a".to_string(), Property::required(int)),
                    ("z".to_string(), Property::optional(int)),
                ],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let union = b
            .add_union(BTreeSet::from([c1, c2]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, _) = combine_classes(graph, true, true, false).unwrap();
        assert_eq!(graph.to_string(), "top;{a:int,z?:int}");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut b = TypeBuilder::new(StringTypeMapping::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let string = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let c1 = b
            .add_class(
                vec![("a".to_string(), Property::required(int))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![("a".to_string(), Property::required(string))],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        let union = b
            .add_union(BTreeSet::from([c1, c2]), Attributes::default())
            .unwrap();
        b.add_top_level("top", union);
        let graph = b.finish().unwrap();

        let (graph, _) = combine_classes(graph, false, true, false).unwrap();
        let (graph, changed) = combine_classes(graph, false, false, true).unwrap();
        assert!(!changed);
        assert_eq!(graph.to_string(), "top;{a:|int|str|}");
    }
}
