//! # Reconstitution
//!
//! Copies a source graph into a fresh builder through a remapping function,
//! preserving identity for unchanged subtrees and terminating on cycles.
//!
//! The memo table is keyed by source reference: the first time a node is
//! reached its destination is computed once and reused everywhere else it
//! is referenced. Re-entering a node that is still being copied (a cycle)
//! hands out a reserved forwarder slot instead of recursing forever; the
//! slot is pointed at the finished node afterwards and every forwarder is
//! stripped before the destination graph is exposed, so no pass ever
//! observes an indirection introduced by another.
//!
//! A rewrite hook receives each source reference before the default copy
//! runs. Returning `None` keeps the structural copy; returning a
//! destination reference substitutes it (and is memoized like any other
//! result).

use crate::{
    builder::TypeBuilder,
    error::{Error, Result},
    type_graph::{Type, TypeGraph, TypeRef},
};

/// Hook signature: `None` means "default copy", `Some(dest)` substitutes.
pub trait RewriteFn: FnMut(TypeRef, &mut Reconstitutor<'_>) -> Option<Result<TypeRef>> {}
impl<F: FnMut(TypeRef, &mut Reconstitutor<'_>) -> Option<Result<TypeRef>>> RewriteFn for F {}

pub struct Reconstitutor<'graph> {
    source: &'graph TypeGraph,
    builder: TypeBuilder,
    memo: Vec<Option<TypeRef>>,
    reserved: Vec<Option<TypeRef>>,
    in_progress: Vec<TypeRef>,
}

impl<'graph> Reconstitutor<'graph> {
    pub fn new(source: &'graph TypeGraph) -> Self {
        Reconstitutor {
            source,
            builder: TypeBuilder::new(source.string_type_mapping().clone()),
            memo: vec![None; source.len()],
            reserved: vec![None; source.len()],
            in_progress: vec![],
        }
    }

    pub fn source(&self) -> &'graph TypeGraph {
        self.source
    }

    pub fn builder(&mut self) -> &mut TypeBuilder {
        &mut self.builder
    }

    /// Map one source reference into the destination graph.
    pub fn map(&mut self, type_ref: TypeRef, f: &mut impl RewriteFn) -> Result<TypeRef> {
        if let Some(dest) = self.memo[type_ref] {
            return Ok(dest);
        }

        if self.in_progress.contains(&type_ref) {
            // cycle: hand out a forwarder slot to be resolved once the
            // node itself finishes copying
            let slot = match self.reserved[type_ref] {
                Some(slot) => slot,
                None => {
                    let slot = self.builder.reserve();
                    self.reserved[type_ref] = Some(slot);
                    slot
                }
            };
            return Ok(slot);
        }

        self.in_progress.push(type_ref);
        let result = match f(type_ref, self) {
            Some(substituted) => substituted,
            None => self.copy(type_ref, f),
        };
        self.in_progress.pop();
        let dest = result?;

        match self.reserved[type_ref] {
            Some(slot) => {
                self.builder.resolve_forwarder(slot, dest)?;
                self.memo[type_ref] = Some(slot);
                Ok(slot)
            }
            None => {
                self.memo[type_ref] = Some(dest);
                Ok(dest)
            }
        }
    }

    /// Default structural copy of one node, recursing through the hook.
    pub fn copy(&mut self, type_ref: TypeRef, f: &mut impl RewriteFn) -> Result<TypeRef> {
        let attributes = self.source.attributes(type_ref).clone();
        match self.source.ty(type_ref).clone() {
            Type::Primitive(kind) => Ok(self.builder.add_primitive(kind, attributes)),
            Type::TransformedString(kind) => {
                Ok(self.builder.add_transformed_string(kind, attributes))
            }
            Type::Enum(cases) => self.builder.add_enum(cases, attributes),
            Type::Map(value) => {
                let value = self.map(value, f)?;
                Ok(self.builder.add_map(value, attributes))
            }
            Type::Array(element) => {
                let element = self.map(element, f)?;
                Ok(self.builder.add_array(element, attributes))
            }
            Type::Union(members) => {
                let mut mapped = std::collections::BTreeSet::new();
                for member in members {
                    mapped.insert(self.map(member, f)?);
                }
                self.builder.add_union(mapped, attributes)
            }
            Type::Intersection(members) => {
                if members.is_empty() {
                    return Err(Error::structural("forwarder past its lifetime"));
                }
                let mut mapped = std::collections::BTreeSet::new();
                for member in members {
                    mapped.insert(self.map(member, f)?);
                }
                self.builder.add_intersection(mapped, attributes)
            }
            Type::Class(class) => {
                let mut properties = Vec::with_capacity(class.properties.len());
                for (name, property) in class.properties {
                    let ty = self.map(property.ty, f)?;
                    properties.push((name, crate::type_graph::Property {
                        ty,
                        optional: property.optional,
                    }));
                }
                self.builder
                    .add_class(properties, class.nominal, class.schema_named, attributes)
            }
            Type::Object(object) => {
                let mut properties = Vec::with_capacity(object.properties.len());
                for (name, property) in object.properties {
                    let ty = self.map(property.ty, f)?;
                    properties.push((name, crate::type_graph::Property {
                        ty,
                        optional: property.optional,
                    }));
                }
                let additional = match object.additional {
                    Some(additional) => Some(self.map(additional, f)?),
                    None => None,
                };
                self.builder.add_object(properties, additional, attributes)
            }
        }
    }

    /// Map every top level through the hook, keeping names.
    pub fn reconstitute_top_levels(&mut self, f: &mut impl RewriteFn) -> Result<()> {
        let top_levels: Vec<(String, TypeRef)> = self
            .source
            .top_levels()
            .iter()
            .map(|(name, type_ref)| (name.clone(), *type_ref))
            .collect();
        for (name, type_ref) in top_levels {
            let dest = self.map(type_ref, f)?;
            self.builder.add_top_level(name, dest);
        }
        Ok(())
    }

    pub fn add_top_level(&mut self, name: impl Into<String>, dest: TypeRef) {
        self.builder.add_top_level(name, dest);
    }

    /// Strip any forwarders introduced for cycles, then finish the graph.
    pub fn finish(mut self) -> Result<TypeGraph> {
        self.builder.strip_forwarders()?;
        self.builder.finish()
    }
}

/// Copy `source` through `f`, producing a finished graph. The workhorse of
/// every rewrite pass.
pub fn rewrite_graph(source: &TypeGraph, mut f: impl RewriteFn) -> Result<TypeGraph> {
    let mut recon = Reconstitutor::new(source);
    recon.reconstitute_top_levels(&mut f)?;
    recon.finish()
}

/// Structural copy with no substitutions. Reachable-only, canonically
/// re-interned.
pub fn identity(source: &TypeGraph) -> Result<TypeGraph> {
    rewrite_graph(source, |_, _| None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attributes::Attributes,
        builder::TypeBuilder,
        type_graph::{PrimitiveKind, Property, StringTypeMapping},
    };
    use pretty_assertions::assert_eq;

    /// Self-referential list node: `{next?: Node, val: int}`.
    fn cyclic_graph() -> TypeGraph {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let node = builder.reserve();
        let class = builder
            .add_class(
                vec![
                    ("next".to_string(), Property::optional(node)),
                    ("val".to_string(), Property::required(int)),
                ],
                true,
                false,
                Attributes::default(),
            )
            .unwrap();
        builder.resolve_forwarder(node, class).unwrap();
        builder.add_top_level("node", node);
        let mut graph = builder.finish().unwrap();
        // initial builds leave forwarders for the indirection pass; strip
        // here so the fixture is already clean
        graph = identity(&graph).unwrap();
        graph
    }

    #[test]
    fn identity_preserves_cycles() {
        let graph = cyclic_graph();
        assert_eq!(graph.to_string(), "node;{next?:#1,val:int}");

        let copied = identity(&graph).unwrap();
        assert_eq!(copied.to_string(), graph.to_string());
    }

    #[test]
    fn identity_drops_unreachable_nodes() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let _unreachable = builder.add_primitive(PrimitiveKind::Bool, Attributes::default());
        builder.add_top_level("n", int);
        let graph = builder.finish().unwrap();
        assert_eq!(graph.len(), 2);

        let copied = identity(&graph).unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied.to_string(), "n;int");
    }

    #[test]
    fn substitution_hook_rewrites() {
        let mut builder = TypeBuilder::new(StringTypeMapping::default());
        let int = builder.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let arr = builder.add_array(int, Attributes::default());
        builder.add_top_level("xs", arr);
        let graph = builder.finish().unwrap();

        let rewritten = rewrite_graph(&graph, |type_ref, recon| {
            match recon.source().ty(type_ref) {
                crate::type_graph::Type::Primitive(PrimitiveKind::Integer) => {
                    let attrs = recon.source().attributes(type_ref).clone();
                    Some(Ok(recon.builder().add_primitive(PrimitiveKind::Double, attrs)))
                }
                _ => None,
            }
        })
        .unwrap();
        assert_eq!(rewritten.to_string(), "xs;[double]");
    }
}
