//! Rust renderer: serde structs for classes, unit enums for string enums,
//! untagged enums for unions, `Box` on cycle back-edges.

use std::collections::BTreeSet;

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use typelift::{
    error::{Error, Result},
    language::{Target, TargetLanguage},
    names::Names,
    run::{RenderOptions, RenderResult},
    type_graph::{PrimitiveKind, StringTypeMapping, Type, TypeGraph, TypeRef},
};

pub struct RustTarget {
    language: TargetLanguage,
}

impl Default for RustTarget {
    fn default() -> Self {
        RustTarget {
            language: TargetLanguage {
                display_name: "Rust",
                names: &["rust", "rs"],
                string_type_mapping: StringTypeMapping::all_strings(),
                supports_unions_with_both_number_types: true,
                supports_full_object_type: false,
                supports_optional_class_properties: true,
            },
        }
    }
}

impl RustTarget {
    pub fn new() -> Self {
        RustTarget::default()
    }
}

impl Target for RustTarget {
    fn language(&self) -> &TargetLanguage {
        &self.language
    }

    fn render(
        &self,
        graph: &TypeGraph,
        names: &Names,
        options: &RenderOptions,
    ) -> Result<IndexMap<String, RenderResult>> {
        if let Some(option) = options.renderer_options.keys().next() {
            return Err(Error::UnknownRendererOption {
                renderer: self.language.display_name.to_string(),
                option: option.clone(),
            });
        }

        let emitter = Emitter {
            graph,
            names,
            back_edges: back_edges(graph),
            indent: options
                .indentation
                .clone()
                .unwrap_or_else(|| "    ".to_string()),
        };

        let mut lines: Vec<String> = vec![];
        for comment in &options.leading_comments {
            lines.push(format!("// {}", comment));
        }
        lines.push("use serde::{Serialize, Deserialize};".to_string());
        lines.push(String::new());

        // entry-point aliases use SCREAMING_SNAKE_CASE names, which never
        // clash with the PascalCase declarations
        for (name, type_ref) in graph.top_levels() {
            lines.push(format!(
                "pub type {} = {};",
                name.to_case(Case::UpperSnake),
                emitter.type_name(*type_ref, *type_ref)
            ));
        }

        for (type_ref, ty) in graph.iter_reachable() {
            match ty {
                Type::Class(class) => {
                    emitter.emit_struct(&mut lines, type_ref, &class.properties)
                }
                Type::Object(object) => {
                    emitter.emit_struct(&mut lines, type_ref, &object.properties)
                }
                Type::Enum(cases) => emitter.emit_enum(&mut lines, type_ref, cases),
                Type::Union(members) => emitter.emit_union(&mut lines, type_ref, members),
                _ => {}
            }
        }

        lines.push(String::new());
        let mut results = IndexMap::new();
        results.insert(options.output_filename.clone(), RenderResult {
            lines,
            annotations: vec![],
        });
        Ok(results)
    }
}

struct Emitter<'a> {
    graph: &'a TypeGraph,
    names: &'a Names,
    back_edges: BTreeSet<(TypeRef, TypeRef)>,
    indent: String,
}

impl Emitter<'_> {
    fn declared_name(&self, type_ref: TypeRef) -> String {
        self.names
            .get(type_ref)
            .map(|name| name.to_case(Case::Pascal))
            .unwrap_or_else(|| format!("Type{}", type_ref))
    }

    fn type_name(&self, type_ref: TypeRef, parent: TypeRef) -> String {
        let Some(ty) = self.graph.get(type_ref) else {
            return "serde_json::Value".to_string();
        };
        match ty {
            Type::Primitive(PrimitiveKind::Bool) => "bool".to_string(),
            Type::Primitive(PrimitiveKind::Integer) => "isize".to_string(),
            Type::Primitive(PrimitiveKind::Double) => "f64".to_string(),
            Type::Primitive(kind) if kind.is_string_like() => "String".to_string(),
            Type::TransformedString(_) => "String".to_string(),
            Type::Primitive(PrimitiveKind::Null) => "Option<serde_json::Value>".to_string(),
            Type::Primitive(_) => "serde_json::Value".to_string(),
            Type::Array(element) => {
                format!("Vec<{}>", self.type_name(*element, type_ref))
            }
            Type::Map(value) => format!(
                "std::collections::HashMap<String, {}>",
                self.type_name(*value, type_ref)
            ),
            Type::Class(_) | Type::Object(_) | Type::Enum(_) | Type::Union(_) => {
                let mut ident = self.declared_name(type_ref);
                if self.back_edges.contains(&(parent, type_ref)) {
                    ident = format!("Box<{}>", ident);
                }
                ident
            }
            Type::Intersection(_) => "serde_json::Value".to_string(),
        }
    }

    fn emit_struct(
        &self,
        lines: &mut Vec<String>,
        type_ref: TypeRef,
        properties: &IndexMap<String, typelift::type_graph::Property>,
    ) {
        lines.push(String::new());
        lines.push("#[derive(Serialize, Deserialize, Debug)]".to_string());
        lines.push(format!("pub struct {} {{", self.declared_name(type_ref)));
        for (idx, (original_name, property)) in properties.iter().enumerate() {
            let mut type_name = self.type_name(property.ty, type_ref);
            if property.optional {
                type_name = format!("Option<{}>", type_name);
            }
            let var_name = match is_rust_identifier(original_name) {
                true => original_name.to_case(Case::Snake),
                false => format!("var_{}", idx),
            };
            if *original_name != var_name {
                lines.push(format!(
                    "{}#[serde(rename = \"{}\")]",
                    self.indent, original_name
                ));
            }
            lines.push(format!("{}pub {}: {},", self.indent, var_name, type_name));
        }
        lines.push("}".to_string());
    }

    fn emit_enum(&self, lines: &mut Vec<String>, type_ref: TypeRef, cases: &BTreeSet<String>) {
        lines.push(String::new());
        lines.push("#[derive(Serialize, Deserialize, Debug)]".to_string());
        lines.push(format!("pub enum {} {{", self.declared_name(type_ref)));
        for (idx, case) in cases.iter().enumerate() {
            let variant = match is_rust_identifier(case) {
                true => case.to_case(Case::Pascal),
                false => format!("Case{}", idx),
            };
            if *case != variant {
                lines.push(format!("{}#[serde(rename = \"{}\")]", self.indent, case));
            }
            lines.push(format!("{}{},", self.indent, variant));
        }
        lines.push("}".to_string());
    }

    fn emit_union(&self, lines: &mut Vec<String>, type_ref: TypeRef, members: &BTreeSet<TypeRef>) {
        lines.push(String::new());
        lines.push("#[derive(Serialize, Deserialize, Debug)]".to_string());
        lines.push("#[serde(untagged)]".to_string());
        lines.push(format!("pub enum {} {{", self.declared_name(type_ref)));
        for member in members {
            let associated = self.type_name(*member, type_ref);
            let variant = match self.graph.get(*member) {
                Some(Type::Primitive(PrimitiveKind::Bool)) => "Bool".to_string(),
                Some(Type::Primitive(PrimitiveKind::Integer)) => "Integer".to_string(),
                Some(Type::Primitive(PrimitiveKind::Double)) => "Double".to_string(),
                Some(Type::Primitive(PrimitiveKind::Null)) => "Null".to_string(),
                Some(Type::Primitive(kind)) if kind.is_string_like() => "String".to_string(),
                Some(Type::TransformedString(_)) => "String".to_string(),
                Some(Type::Array(_)) => "Array".to_string(),
                Some(Type::Map(_)) => "Map".to_string(),
                Some(Type::Class(_) | Type::Object(_) | Type::Enum(_) | Type::Union(_)) => {
                    self.declared_name(*member)
                }
                _ => format!("Variant{}", member),
            };
            match self.graph.get(*member) {
                // null needs no payload in an untagged enum
                Some(Type::Primitive(PrimitiveKind::Null)) => {
                    lines.push(format!("{}{},", self.indent, variant));
                }
                _ => {
                    lines.push(format!("{}{}({}),", self.indent, variant, associated));
                }
            }
        }
        lines.push("}".to_string());
    }
}

/// Edges closing a cycle; the referencing field needs `Box`.
fn back_edges(graph: &TypeGraph) -> BTreeSet<(TypeRef, TypeRef)> {
    let mut edges = BTreeSet::new();
    let mut state = vec![0u8; graph.len()];
    for type_ref in graph.top_levels().values() {
        visit(graph, *type_ref, &mut state, &mut edges);
    }
    edges
}

fn visit(
    graph: &TypeGraph,
    type_ref: TypeRef,
    state: &mut Vec<u8>,
    edges: &mut BTreeSet<(TypeRef, TypeRef)>,
) {
    if state[type_ref] != 0 {
        return;
    }
    state[type_ref] = 1;
    if let Some(ty) = graph.get(type_ref) {
        for child in ty.children() {
            match state[child] {
                1 => {
                    edges.insert((type_ref, child));
                }
                0 => visit(graph, child, state, edges),
                _ => {}
            }
        }
    }
    state[type_ref] = 2;
}

fn is_rust_identifier(s: &str) -> bool {
    syn::parse_str::<syn::Ident>(s).is_ok()
}
