//! # Type Builder
//!
//! Constructs new [`TypeGraph`]s, either from inputs or on behalf of the
//! [`Reconstitutor`](crate::reconstitute::Reconstitutor) during a rewrite.
//!
//! Every `add_*` call returns a stable [`TypeRef`]. Non-nominal types are
//! structurally interned: adding an equal type with equal attributes twice
//! yields the same reference. Classes have nominal identity unless
//! explicitly flagged for structural interning.
//!
//! Cyclic structures are built through *forwarding intersections*:
//! [`TypeBuilder::reserve`] hands out a placeholder reference that can be
//! used as a child before its definition exists, and
//! [`TypeBuilder::resolve_forwarder`] later points it at the real node. The
//! builder flags [`TypeBuilder::did_add_forwarding_intersection`] so the
//! driver knows a resolution pass is required; a placeholder that is never
//! resolved fails [`TypeBuilder::finish`].

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::{
    attributes::Attributes,
    error::{Error, Result},
    type_graph::{
        ClassData, ObjectData, PrimitiveKind, Property, StringTypeMapping, TransformerKind, Type,
        TypeGraph, TypeRef,
    },
};

#[derive(Debug, Default)]
pub struct TypeBuilder {
    types: Vec<Type>,
    attributes: Vec<Attributes>,
    intern: BTreeMap<(Type, Attributes), TypeRef>,
    top_levels: IndexMap<String, TypeRef>,
    string_type_mapping: StringTypeMapping,
    pending_forwarders: BTreeSet<TypeRef>,
    did_add_forwarding_intersection: bool,
}

impl TypeBuilder {
    pub fn new(string_type_mapping: StringTypeMapping) -> Self {
        TypeBuilder {
            string_type_mapping,
            ..TypeBuilder::default()
        }
    }

    pub fn string_type_mapping(&self) -> &StringTypeMapping {
        &self.string_type_mapping
    }

    pub fn did_add_forwarding_intersection(&self) -> bool {
        self.did_add_forwarding_intersection
    }

    /// Number of nodes in the arena so far.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn push(&mut self, ty: Type, attributes: Attributes) -> TypeRef {
        let type_ref = self.types.len();
        self.types.push(ty);
        self.attributes.push(attributes);
        type_ref
    }

    /// Structural interning: reuse an existing node when an equal type with
    /// equal attributes was already added.
    fn intern(&mut self, ty: Type, attributes: Attributes) -> TypeRef {
        let key = (ty, attributes);
        match self.intern.get(&key) {
            Some(type_ref) => *type_ref,
            None => {
                let (ty, attributes) = key.clone();
                let type_ref = self.push(ty, attributes);
                self.intern.insert(key, type_ref);
                type_ref
            }
        }
    }

    pub fn add_primitive(&mut self, kind: PrimitiveKind, attributes: Attributes) -> TypeRef {
        self.intern(Type::Primitive(kind), attributes)
    }

    pub fn add_transformed_string(
        &mut self,
        kind: TransformerKind,
        attributes: Attributes,
    ) -> TypeRef {
        self.intern(Type::TransformedString(kind), attributes)
    }

    /// The primitive used for a specialized string kind under this graph's
    /// string-type mapping: the distinct kind when the target keeps it,
    /// plain string otherwise.
    pub fn get_primitive_string_type(
        &mut self,
        kind: TransformerKind,
        attributes: Attributes,
    ) -> TypeRef {
        let primitive = self.string_type_mapping.primitive_for(kind);
        self.add_primitive(primitive, attributes)
    }

    pub fn add_enum(
        &mut self,
        cases: BTreeSet<String>,
        attributes: Attributes,
    ) -> Result<TypeRef> {
        if cases.is_empty() {
            return Err(Error::structural("enum with no cases"));
        }
        Ok(self.intern(Type::Enum(cases), attributes))
    }

    /// Properties keep first-observed insertion order. Duplicate property
    /// names are a structural violation.
    pub fn add_class(
        &mut self,
        properties: Vec<(String, Property)>,
        nominal: bool,
        schema_named: bool,
        attributes: Attributes,
    ) -> Result<TypeRef> {
        let mut map = IndexMap::with_capacity(properties.len());
        for (name, property) in properties {
            if map.insert(name.clone(), property).is_some() {
                return Err(Error::structural(format!(
                    "class with duplicate property `{}`",
                    name
                )));
            }
        }
        let class = ClassData {
            properties: map,
            nominal,
            schema_named,
        };
        match nominal {
            true => Ok(self.push(Type::Class(class), attributes)),
            false => Ok(self.intern(Type::Class(class), attributes)),
        }
    }

    pub fn add_map(&mut self, value: TypeRef, attributes: Attributes) -> TypeRef {
        self.intern(Type::Map(value), attributes)
    }

    pub fn add_array(&mut self, element: TypeRef, attributes: Attributes) -> TypeRef {
        self.intern(Type::Array(element), attributes)
    }

    /// Members that are structurally equal but differ only in attributes
    /// collapse onto one node, merging the attributes. Pending forwarders
    /// are exempt: two unresolved placeholders may stand for different
    /// cycles.
    fn dedup_members(&mut self, members: BTreeSet<TypeRef>) -> BTreeSet<TypeRef> {
        let mut seen: BTreeMap<Type, TypeRef> = BTreeMap::new();
        let mut out = BTreeSet::new();
        for member in members {
            if self.pending_forwarders.contains(&member) {
                out.insert(member);
                continue;
            }
            match seen.get(&self.types[member]) {
                Some(kept) => {
                    let attributes = self.attributes[member].clone();
                    self.merge_attributes(*kept, attributes);
                }
                None => {
                    seen.insert(self.types[member].clone(), member);
                    out.insert(member);
                }
            }
        }
        out
    }

    /// Members are deduplicated (structurally, not just by reference); a
    /// singleton collapses to its member (the attributes merge onto it);
    /// an empty member set is a structural violation.
    pub fn add_union(
        &mut self,
        members: BTreeSet<TypeRef>,
        attributes: Attributes,
    ) -> Result<TypeRef> {
        let mut members = self.dedup_members(members);
        match members.pop_first() {
            None => Err(Error::structural("union with no members")),
            Some(member) if members.is_empty() => {
                self.merge_attributes(member, attributes);
                Ok(member)
            }
            Some(member) => {
                members.insert(member);
                Ok(self.intern(Type::Union(members), attributes))
            }
        }
    }

    /// Same membership rules as [`TypeBuilder::add_union`].
    pub fn add_intersection(
        &mut self,
        members: BTreeSet<TypeRef>,
        attributes: Attributes,
    ) -> Result<TypeRef> {
        let mut members = self.dedup_members(members);
        match members.pop_first() {
            None => Err(Error::structural("intersection with no members")),
            Some(member) if members.is_empty() => {
                self.merge_attributes(member, attributes);
                Ok(member)
            }
            Some(member) => {
                members.insert(member);
                Ok(self.intern(Type::Intersection(members), attributes))
            }
        }
    }

    pub fn add_object(
        &mut self,
        properties: Vec<(String, Property)>,
        additional: Option<TypeRef>,
        attributes: Attributes,
    ) -> Result<TypeRef> {
        let mut map = IndexMap::with_capacity(properties.len());
        for (name, property) in properties {
            if map.insert(name.clone(), property).is_some() {
                return Err(Error::structural(format!(
                    "object with duplicate property `{}`",
                    name
                )));
            }
        }
        Ok(self.intern(Type::Object(ObjectData {
            properties: map,
            additional,
        }), attributes))
    }

    /// Hand out a placeholder for a node whose definition is not built yet.
    /// Must be paired with [`TypeBuilder::resolve_forwarder`] before
    /// [`TypeBuilder::finish`].
    pub fn reserve(&mut self) -> TypeRef {
        let slot = self.push(Type::Intersection(BTreeSet::new()), Attributes::default());
        self.pending_forwarders.insert(slot);
        self.did_add_forwarding_intersection = true;
        slot
    }

    /// Point a reserved placeholder at its real node. The slot becomes a
    /// single-member forwarding intersection, removed later by the
    /// indirection pass (or by the reconstitutor before the graph is
    /// exposed).
    pub fn resolve_forwarder(&mut self, slot: TypeRef, target: TypeRef) -> Result<()> {
        if !self.pending_forwarders.remove(&slot) {
            return Err(Error::structural(format!(
                "resolve of non-pending forwarder #{}",
                slot
            )));
        }
        if slot == target {
            return Err(Error::structural("forwarder resolving to itself"));
        }
        self.types[slot] = Type::Intersection(BTreeSet::from([target]));
        Ok(())
    }

    /// Attribute content may only grow here; used when merges fold one
    /// node's metadata into another.
    pub fn merge_attributes(&mut self, type_ref: TypeRef, attributes: Attributes) {
        if attributes.is_empty() {
            return;
        }
        let current = std::mem::take(&mut self.attributes[type_ref]);
        self.attributes[type_ref] = current.merge(attributes);
    }

    pub fn add_top_level(&mut self, name: impl Into<String>, type_ref: TypeRef) {
        self.top_levels.insert(name.into(), type_ref);
    }

    /// Rewrite every child reference through the forwarder chains and drop
    /// the indirections, so the finished graph exposes none of them.
    pub(crate) fn strip_forwarders(&mut self) -> Result<()> {
        let resolve = |mut type_ref: TypeRef| -> Result<TypeRef> {
            let mut hops = 0;
            loop {
                match &self.types[type_ref] {
                    Type::Intersection(members) if members.len() == 1 => {
                        type_ref = *members.iter().next().unwrap();
                    }
                    _ => return Ok(type_ref),
                }
                hops += 1;
                if hops > self.types.len() {
                    return Err(Error::structural("forwarder cycle"));
                }
            }
        };

        let mut remap: Vec<TypeRef> = Vec::with_capacity(self.types.len());
        for type_ref in 0..self.types.len() {
            remap.push(resolve(type_ref)?);
        }

        for ty in &mut self.types {
            match ty {
                Type::Class(class) => {
                    for property in class.properties.values_mut() {
                        property.ty = remap[property.ty];
                    }
                }
                Type::Object(object) => {
                    for property in object.properties.values_mut() {
                        property.ty = remap[property.ty];
                    }
                    if let Some(additional) = &mut object.additional {
                        *additional = remap[*additional];
                    }
                }
                Type::Map(value) | Type::Array(value) => *value = remap[*value],
                Type::Union(members) => {
                    *members = members.iter().map(|m| remap[*m]).collect();
                }
                Type::Intersection(members) if members.len() > 1 => {
                    *members = members.iter().map(|m| remap[*m]).collect();
                }
                _ => {}
            }
        }
        for type_ref in self.top_levels.values_mut() {
            *type_ref = remap[*type_ref];
        }

        // the forwarder nodes are dead now; compact them out so the arena
        // holds only real types
        let mut new_index = vec![usize::MAX; self.types.len()];
        let mut kept = 0;
        for (i, ty) in self.types.iter().enumerate() {
            if !matches!(ty, Type::Intersection(members) if members.len() == 1) {
                new_index[i] = kept;
                kept += 1;
            }
        }
        if kept == self.types.len() {
            return Ok(());
        }
        let old_types = std::mem::take(&mut self.types);
        let old_attributes = std::mem::take(&mut self.attributes);
        for (i, (ty, attributes)) in old_types.into_iter().zip(old_attributes).enumerate() {
            if new_index[i] != usize::MAX {
                self.types.push(ty);
                self.attributes.push(attributes);
            }
        }
        for ty in &mut self.types {
            match ty {
                Type::Class(class) => {
                    for property in class.properties.values_mut() {
                        property.ty = new_index[property.ty];
                    }
                }
                Type::Object(object) => {
                    for property in object.properties.values_mut() {
                        property.ty = new_index[property.ty];
                    }
                    if let Some(additional) = &mut object.additional {
                        *additional = new_index[*additional];
                    }
                }
                Type::Map(value) | Type::Array(value) => *value = new_index[*value],
                Type::Union(members) | Type::Intersection(members) => {
                    *members = members.iter().map(|m| new_index[*m]).collect();
                }
                _ => {}
            }
        }
        for type_ref in self.top_levels.values_mut() {
            *type_ref = new_index[*type_ref];
        }
        Ok(())
    }

    pub fn finish(self) -> Result<TypeGraph> {
        if let Some(slot) = self.pending_forwarders.iter().next() {
            return Err(Error::structural(format!(
                "unresolved forwarder #{} at finish",
                slot
            )));
        }
        Ok(TypeGraph {
            types: self.types,
            attributes: self.attributes,
            top_levels: self.top_levels,
            string_type_mapping: self.string_type_mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn structural_interning_deduplicates() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let a = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let b = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        assert_eq!(a, b);

        let arr_a = builder.add_array(a, Attributes::default());
        let arr_b = builder.add_array(b, Attributes::default());
        assert_eq!(arr_a, arr_b);
    }

    #[test]
    fn distinct_attributes_stay_distinct() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let plain = builder.add_primitive(PrimitiveKind::String, Attributes::default());
        let named = builder.add_primitive(PrimitiveKind::String, Attributes::named("color"));
        assert_ne!(plain, named);
    }

    #[test]
    fn nominal_classes_are_not_interned() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![("x".to_string(), Property::required(int))];
        let a = builder
            .add_class(props.clone(), true, false, Attributes::default())
            .unwrap();
        let b = builder
            .add_class(props, true, false, Attributes::default())
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn structural_classes_are_interned() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![("x".to_string(), Property::required(int))];
        let a = builder
            .add_class(props.clone(), false, false, Attributes::default())
            .unwrap();
        let b = builder
            .add_class(props, false, false, Attributes::default())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_union_is_rejected() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        assert!(matches!(
            builder.add_union(BTreeSet::new(), Attributes::default()),
            Err(Error::StructuralInvariant(_))
        ));
    }

    #[test]
    fn singleton_union_collapses() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let collapsed = builder
            .add_union(BTreeSet::from([int]), Attributes::default())
            .unwrap();
        assert_eq!(collapsed, int);
    }

    #[test]
    fn union_members_dedup_structurally() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let a = builder.add_primitive(PrimitiveKind::Integer, Attributes::named("x"));
        let b = builder.add_primitive(PrimitiveKind::Integer, Attributes::named("y"));
        assert_ne!(a, b);

        // both members are integers; the union collapses onto one of them
        // and the attributes merge
        let collapsed = builder
            .add_union(BTreeSet::from([a, b]), Attributes::default())
            .unwrap();
        assert_eq!(collapsed, a);

        let string = builder.add_primitive(PrimitiveKind::String, Attributes::default());
        let union = builder
            .add_union(BTreeSet::from([a, b, string]), Attributes::default())
            .unwrap();
        builder.add_top_level("top", union);
        let graph = builder.finish().unwrap();
        assert_eq!(graph.to_string(), "top;|int|str|");
        assert!(graph.attributes(a).names.contains("x"));
        assert!(graph.attributes(a).names.contains("y"));
    }

    #[test]
    fn duplicate_class_property_is_rejected() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![
            ("x".to_string(), Property::required(int)),
            ("x".to_string(), Property::optional(int)),
        ];
        assert!(matches!(
            builder.add_class(props, true, false, Attributes::default()),
            Err(Error::StructuralInvariant(_))
        ));
    }

    #[test]
    fn unresolved_forwarder_fails_finish() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let slot = builder.reserve();
        builder.add_top_level("root", slot);
        assert!(matches!(
            builder.finish(),
            Err(Error::StructuralInvariant(_))
        ));
    }

    #[test]
    fn string_type_mapping_collapses_unkept_kinds() {
        let mut builder = TypeBuilder::new(StringTypeMapping::all_strings());
        let date = builder.get_primitive_string_type(TransformerKind::Date, Attributes::default());
        let string = builder.add_primitive(PrimitiveKind::String, Attributes::default());
        assert_eq!(date, string);

        let mut builder = TypeBuilder::new(StringTypeMapping::identity());
        let date = builder.get_primitive_string_type(TransformerKind::Date, Attributes::default());
        let string = builder.add_primitive(PrimitiveKind::String, Attributes::default());
        assert_ne!(date, string);
    }
}
