//! # Type Graph
//!
//! The intermediate representation: an arena of interned, possibly-cyclic
//! type nodes reachable from named top-level entries.
//!
//! Types are identified by [`TypeRef`] (an index into the arena) and
//! reference each other through those indices, which is what allows
//! recursive structures without reference counting. Each node carries an
//! [`Attributes`] bundle in a parallel vector.
//!
//! A graph is built once by the [`TypeBuilder`](crate::builder::TypeBuilder)
//! and treated as immutable from then on. Every rewrite pass produces a new
//! graph through the [`Reconstitutor`](crate::reconstitute::Reconstitutor);
//! nothing mutates a finished graph in place.
//!
//! ## Canonical display form
//!
//! Graphs render to a compact single-line syntax used throughout the tests:
//!
//! ```text
//! {a:int,b?:str}       class; `?` marks an optional property
//! map<int>             map with integer values
//! [str]                array of strings
//! |int|str|null|       union
//! &int&str&            intersection (only before resolution)
//! enum<b,g,r>          enum, cases sorted
//! {a:int,..:str}       object type with additional properties
//! @date                transformed string
//! #3                   reference back into a cycle
//! ```
//!
//! Top levels print as `name;body`, one per line.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt::{self, Display},
};

use indexmap::IndexMap;

use crate::attributes::Attributes;

/// Index of a type node within one graph's arena.
pub type TypeRef = usize;

/// Primitive type kinds. None of these carry children.
///
/// `None` is the inference bottom: the element type of `[]`, for example.
/// It is eliminated by the `none_to_any` pass before rendering. The
/// date/time and stringified-number kinds only exist in graphs whose
/// [`StringTypeMapping`] keeps them distinct from plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrimitiveKind {
    None,
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Date,
    Time,
    DateTime,
    IntegerString,
    BoolString,
}

impl PrimitiveKind {
    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            PrimitiveKind::String
                | PrimitiveKind::Date
                | PrimitiveKind::Time
                | PrimitiveKind::DateTime
                | PrimitiveKind::IntegerString
                | PrimitiveKind::BoolString
        )
    }

    pub fn lexeme(self) -> &'static str {
        match self {
            PrimitiveKind::None => "none",
            PrimitiveKind::Any => "any",
            PrimitiveKind::Null => "null",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Integer => "int",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "str",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Time => "time",
            PrimitiveKind::DateTime => "datetime",
            PrimitiveKind::IntegerString => "intstr",
            PrimitiveKind::BoolString => "boolstr",
        }
    }
}

/// Identifier of a string transformer: which specialized string kinds a
/// target can decode on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransformerKind {
    Date,
    Time,
    DateTime,
    IntegerString,
    BoolString,
}

impl TransformerKind {
    pub const ALL: [TransformerKind; 5] = [
        TransformerKind::Date,
        TransformerKind::Time,
        TransformerKind::DateTime,
        TransformerKind::IntegerString,
        TransformerKind::BoolString,
    ];

    /// The primitive kind this transformer specializes.
    pub fn primitive(self) -> PrimitiveKind {
        match self {
            TransformerKind::Date => PrimitiveKind::Date,
            TransformerKind::Time => PrimitiveKind::Time,
            TransformerKind::DateTime => PrimitiveKind::DateTime,
            TransformerKind::IntegerString => PrimitiveKind::IntegerString,
            TransformerKind::BoolString => PrimitiveKind::BoolString,
        }
    }

    pub fn lexeme(self) -> &'static str {
        match self {
            TransformerKind::Date => "date",
            TransformerKind::Time => "time",
            TransformerKind::DateTime => "datetime",
            TransformerKind::IntegerString => "intstr",
            TransformerKind::BoolString => "boolstr",
        }
    }
}

/// Per-target mapping from transformer kind to the primitive used for it.
///
/// Mapping a kind to [`PrimitiveKind::String`] collapses it: the builder
/// will hand out a plain string instead and `make_transformations` has
/// nothing to insert for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTypeMapping {
    mapped: BTreeMap<TransformerKind, PrimitiveKind>,
}

impl Default for StringTypeMapping {
    fn default() -> Self {
        Self::all_strings()
    }
}

impl StringTypeMapping {
    /// Every transformer kind stays distinct.
    pub fn identity() -> Self {
        StringTypeMapping {
            mapped: TransformerKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.primitive()))
                .collect(),
        }
    }

    /// Every transformer kind collapses to plain string.
    pub fn all_strings() -> Self {
        StringTypeMapping {
            mapped: TransformerKind::ALL
                .into_iter()
                .map(|kind| (kind, PrimitiveKind::String))
                .collect(),
        }
    }

    pub fn with(mut self, kind: TransformerKind, primitive: PrimitiveKind) -> Self {
        self.mapped.insert(kind, primitive);
        self
    }

    pub fn primitive_for(&self, kind: TransformerKind) -> PrimitiveKind {
        self.mapped
            .get(&kind)
            .copied()
            .unwrap_or(PrimitiveKind::String)
    }

    /// Whether this target keeps `kind` distinct from plain strings.
    pub fn keeps(&self, kind: TransformerKind) -> bool {
        self.primitive_for(kind) == kind.primitive()
    }
}

/// A class property: the referenced type plus the optional flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Property {
    pub ty: TypeRef,
    pub optional: bool,
}

impl Property {
    pub fn required(ty: TypeRef) -> Self {
        Property {
            ty,
            optional: false,
        }
    }

    pub fn optional(ty: TypeRef) -> Self {
        Property { ty, optional: true }
    }
}

/// Class payload: an ordered property map plus identity flags.
///
/// `nominal` classes are never structurally interned; two nominal classes
/// with equal properties stay distinct until `combine_classes` merges them.
/// `schema_named` marks property names mandated by a schema, which blocks
/// map inference.
#[derive(Debug, Clone)]
pub struct ClassData {
    pub properties: IndexMap<String, Property>,
    pub nominal: bool,
    pub schema_named: bool,
}

/// Open record: class-like properties plus an optional additional-properties
/// type. Only present while the target supports a full object type.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub properties: IndexMap<String, Property>,
    pub additional: Option<TypeRef>,
}

// IndexMap compares order-insensitively, but the interning cache keys on
// Ord, which must agree with Eq. Both are therefore hand-written to compare
// properties in iteration order.

fn cmp_properties(a: &IndexMap<String, Property>, b: &IndexMap<String, Property>) -> Ordering {
    a.iter().cmp(b.iter())
}

impl PartialEq for ClassData {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ClassData {}

impl PartialOrd for ClassData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassData {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_properties(&self.properties, &other.properties)
            .then(self.nominal.cmp(&other.nominal))
            .then(self.schema_named.cmp(&other.schema_named))
    }
}

impl PartialEq for ObjectData {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ObjectData {}

impl PartialOrd for ObjectData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectData {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_properties(&self.properties, &other.properties)
            .then(self.additional.cmp(&other.additional))
    }
}

/// A type node. Children are referenced by [`TypeRef`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    Primitive(PrimitiveKind),
    /// Finite set of string cases.
    Enum(BTreeSet<String>),
    Class(ClassData),
    /// String-keyed homogeneous mapping; the ref is the value type.
    Map(TypeRef),
    Array(TypeRef),
    /// Unordered, deduplicated member set; never fewer than two members in
    /// a finished graph.
    Union(BTreeSet<TypeRef>),
    /// Only present before `resolve_intersections`. A single-member
    /// intersection is a forwarder: pure indirection introduced while a
    /// cyclic structure was under construction.
    Intersection(BTreeSet<TypeRef>),
    Object(ObjectData),
    /// A string specialized with a transformer identifier, inserted by
    /// `make_transformations` for targets that keep the kind distinct.
    TransformedString(TransformerKind),
}

impl Type {
    /// Child references in deterministic order.
    pub fn children(&self) -> Vec<TypeRef> {
        match self {
            Type::Primitive(_) | Type::Enum(_) | Type::TransformedString(_) => vec![],
            Type::Class(class) => class.properties.values().map(|p| p.ty).collect(),
            Type::Object(object) => object
                .properties
                .values()
                .map(|p| p.ty)
                .chain(object.additional)
                .collect(),
            Type::Map(value) | Type::Array(value) => vec![*value],
            Type::Union(members) | Type::Intersection(members) => members.iter().copied().collect(),
        }
    }

    /// Forwarders are intersections with at most one member; they must not
    /// survive past `remove_indirection_intersections`.
    pub fn is_forwarder(&self) -> bool {
        matches!(self, Type::Intersection(members) if members.len() <= 1)
    }
}

/// The graph: a type arena, a parallel attribute arena, named top-level
/// entries, and the string-type mapping it was built under.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    pub(crate) types: Vec<Type>,
    pub(crate) attributes: Vec<Attributes>,
    pub(crate) top_levels: IndexMap<String, TypeRef>,
    pub(crate) string_type_mapping: StringTypeMapping,
}

impl TypeGraph {
    pub fn get(&self, type_ref: TypeRef) -> Option<&Type> {
        self.types.get(type_ref)
    }

    /// Arena access for pass code; refs produced by this graph are always
    /// in bounds.
    pub(crate) fn ty(&self, type_ref: TypeRef) -> &Type {
        &self.types[type_ref]
    }

    pub fn attributes(&self, type_ref: TypeRef) -> &Attributes {
        &self.attributes[type_ref]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn top_levels(&self) -> &IndexMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn string_type_mapping(&self) -> &StringTypeMapping {
        &self.string_type_mapping
    }

    /// Breadth-first iteration over everything reachable from the top
    /// levels, each node exactly once, in deterministic order.
    pub fn iter_reachable(&self) -> ReachableIter<'_> {
        ReachableIter {
            graph: self,
            frontier: self.top_levels.values().copied().collect(),
            visited: BTreeSet::new(),
        }
    }

    /// Reachable refs in visit order.
    pub fn reachable(&self) -> Vec<TypeRef> {
        self.iter_reachable().map(|(type_ref, _)| type_ref).collect()
    }
}

pub struct ReachableIter<'graph> {
    graph: &'graph TypeGraph,
    frontier: VecDeque<TypeRef>,
    visited: BTreeSet<TypeRef>,
}

impl<'graph> Iterator for ReachableIter<'graph> {
    type Item = (TypeRef, &'graph Type);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(type_ref) = self.frontier.pop_front() {
            if self.visited.insert(type_ref) {
                if let Some(ty) = self.graph.get(type_ref) {
                    self.frontier.extend(ty.children());
                    return Some((type_ref, ty));
                }
            }
        }
        None
    }
}

impl TypeGraph {
    /// Canonical textual form of one type. Union and intersection members
    /// render in sorted textual order so the output is independent of
    /// arena indices.
    fn render_type(&self, type_ref: TypeRef, on_path: &mut BTreeSet<TypeRef>) -> String {
        if on_path.contains(&type_ref) {
            return format!("#{}", type_ref);
        }
        on_path.insert(type_ref);

        let rendered = match self.ty(type_ref) {
            Type::Primitive(kind) => kind.lexeme().to_string(),
            Type::TransformedString(kind) => format!("@{}", kind.lexeme()),
            Type::Enum(cases) => {
                let cases: Vec<&str> = cases.iter().map(|c| c.as_str()).collect();
                format!("enum<{}>", cases.join(","))
            }
            Type::Class(class) => {
                let fields: Vec<String> = class
                    .properties
                    .iter()
                    .map(|(name, property)| {
                        let marker = if property.optional { "?" } else { "" };
                        format!("{}{}:{}", name, marker, self.render_type(property.ty, on_path))
                    })
                    .collect();
                format!("{{{}}}", fields.join(","))
            }
            Type::Object(object) => {
                let mut fields: Vec<String> = object
                    .properties
                    .iter()
                    .map(|(name, property)| {
                        let marker = if property.optional { "?" } else { "" };
                        format!("{}{}:{}", name, marker, self.render_type(property.ty, on_path))
                    })
                    .collect();
                if let Some(additional) = object.additional {
                    fields.push(format!("..:{}", self.render_type(additional, on_path)));
                }
                format!("{{{}}}", fields.join(","))
            }
            Type::Map(value) => format!("map<{}>", self.render_type(*value, on_path)),
            Type::Array(element) => format!("[{}]", self.render_type(*element, on_path)),
            Type::Union(members) => {
                let mut rendered: Vec<String> = members
                    .iter()
                    .map(|member| self.render_type(*member, on_path))
                    .collect();
                rendered.sort();
                format!("|{}|", rendered.join("|"))
            }
            Type::Intersection(members) => {
                let mut rendered: Vec<String> = members
                    .iter()
                    .map(|member| self.render_type(*member, on_path))
                    .collect();
                rendered.sort();
                format!("&{}&", rendered.join("&"))
            }
        };

        // only detect cycles on the current path; siblings may revisit
        on_path.remove(&type_ref);
        rendered
    }
}

impl Display for TypeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, type_ref)) in self.top_levels.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let mut on_path = BTreeSet::new();
            write!(f, "{};{}", name, self.render_type(*type_ref, &mut on_path))?;
        }
        Ok(())
    }
}
