//! # Name gathering
//!
//! Assigns a human-readable name to every reachable type a renderer will
//! declare (classes, objects, enums, unions).
//!
//! Candidates come from three places: the top-level entry names, the
//! property names under which a type is referenced (chased through array
//! and map wrappers), and names recorded in the attribute bundle (schema
//! titles and definition keys). In schema mode the attribute names win;
//! for sampled input (`assume_names_from_samples`) the contextual names
//! do.
//!
//! Several types can want the same name; contention is resolved by
//! maximum bipartite matching so as many types as possible get one of
//! their own candidates. Whatever remains unnamed draws a synthesized
//! name from the per-run [`NameSupply`].

use std::collections::{BTreeMap, BTreeSet};

use crate::type_graph::{Type, TypeGraph, TypeRef};

/// Counter for synthesized type names. One per run, threaded through the
/// pipeline explicitly; runs never share it.
#[derive(Debug, Default)]
pub struct NameSupply {
    next: usize,
}

impl NameSupply {
    pub fn new() -> Self {
        NameSupply::default()
    }

    pub fn fresh(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        format!("Type{}", n)
    }
}

/// Final name assignment for one graph.
#[derive(Debug, Default)]
pub struct Names {
    assigned: BTreeMap<TypeRef, String>,
}

impl Names {
    pub fn get(&self, type_ref: TypeRef) -> Option<&str> {
        self.assigned.get(&type_ref).map(|name| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeRef, &str)> {
        self.assigned
            .iter()
            .map(|(type_ref, name)| (*type_ref, name.as_str()))
    }
}

/// Types a renderer declares and therefore needs a name for.
fn nameable(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Class(_) | Type::Object(_) | Type::Enum(_) | Type::Union(_)
    )
}

pub fn gather_names(
    graph: &TypeGraph,
    assume_names_from_samples: bool,
    supply: &mut NameSupply,
) -> Names {
    let mut candidates: BTreeMap<TypeRef, Vec<String>> = BTreeMap::new();
    let push = |type_ref: TypeRef, name: &str, candidates: &mut BTreeMap<TypeRef, Vec<String>>| {
        let names = candidates.entry(type_ref).or_default();
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    };

    // contextual candidates: top-level entries and property names, chased
    // through array/map wrappers to the nameable inner type
    for (name, type_ref) in graph.top_levels() {
        if let Some(target) = naming_target(graph, *type_ref) {
            push(target, name, &mut candidates);
        }
    }
    for (_, ty) in graph.iter_reachable() {
        let properties = match ty {
            Type::Class(class) => &class.properties,
            Type::Object(object) => &object.properties,
            _ => continue,
        };
        for (name, property) in properties {
            if let Some(target) = naming_target(graph, property.ty) {
                push(target, name, &mut candidates);
            }
        }
    }

    // attribute candidates (schema titles, definition keys) outrank the
    // contextual ones unless names are assumed from samples
    for (type_ref, ty) in graph.iter_reachable() {
        if !nameable(ty) {
            continue;
        }
        let attribute_names = &graph.attributes(type_ref).names;
        let names = candidates.entry(type_ref).or_default();
        for name in attribute_names {
            if names.iter().any(|existing| existing == name) {
                continue;
            }
            match assume_names_from_samples {
                true => names.push(name.clone()),
                false => names.insert(0, name.clone()),
            }
        }
    }

    let mut names = Names {
        assigned: BipartiteMatcher::solve(candidates),
    };

    // everything nameable still missing draws a synthesized name
    for (type_ref, ty) in graph.iter_reachable() {
        if nameable(ty) && !names.assigned.contains_key(&type_ref) {
            names.assigned.insert(type_ref, supply.fresh());
        }
    }
    names
}

/// Chase array and map wrappers down to the type worth naming.
fn naming_target(graph: &TypeGraph, mut type_ref: TypeRef) -> Option<TypeRef> {
    let mut visited = BTreeSet::new();
    loop {
        if !visited.insert(type_ref) {
            return None;
        }
        match graph.ty(type_ref) {
            Type::Array(inner) | Type::Map(inner) => type_ref = *inner,
            ty if nameable(ty) => return Some(type_ref),
            _ => return None,
        }
    }
}

/// Maximum bipartite matching between types and their candidate names.
struct BipartiteMatcher {
    candidates: BTreeMap<TypeRef, Vec<String>>,
    matched: BTreeMap<String, TypeRef>,
    visited: BTreeSet<TypeRef>,
}

impl BipartiteMatcher {
    fn solve(candidates: BTreeMap<TypeRef, Vec<String>>) -> BTreeMap<TypeRef, String> {
        let mut matcher = BipartiteMatcher {
            candidates,
            matched: BTreeMap::new(),
            visited: BTreeSet::new(),
        };

        let type_refs: Vec<TypeRef> = matcher.candidates.keys().copied().collect();
        for type_ref in type_refs {
            // fresh visited set for each augmenting path search
            matcher.visited.clear();
            matcher.try_match(type_ref);
        }

        let mut result = BTreeMap::new();
        for (name, type_ref) in matcher.matched {
            result.insert(type_ref, name);
        }
        result
    }

    /// Try to find a name for `type_ref`, possibly displacing a previous
    /// owner onto one of its alternatives.
    fn try_match(&mut self, type_ref: TypeRef) -> bool {
        if !self.visited.insert(type_ref) {
            return false;
        }

        let Some(candidates) = self.candidates.get(&type_ref) else {
            return false;
        };

        for name in candidates.clone() {
            let available = match self.matched.get(&name) {
                None => true,
                Some(owner) => self.try_match(*owner),
            };
            if available {
                self.matched.insert(name, type_ref);
                return true;
            }
        }
        false
    }
}
