//! # Target languages
//!
//! A target is described by a capability record, not virtual methods: the
//! pipeline reads the booleans and the string-type mapping and behaves
//! accordingly. The only behavior a target brings is its renderer.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::{
    error::{Error, Result},
    names::Names,
    run::{RenderOptions, RenderResult},
    type_graph::{StringTypeMapping, TransformerKind, Type, TypeGraph, TypeRef},
};

/// Capability descriptor consumed by the pipeline driver.
#[derive(Debug, Clone)]
pub struct TargetLanguage {
    pub display_name: &'static str,
    /// Names this target answers to on the command line. The driver also
    /// uses them to recognize the schema passthrough.
    pub names: &'static [&'static str],
    pub string_type_mapping: StringTypeMapping,
    pub supports_unions_with_both_number_types: bool,
    pub supports_full_object_type: bool,
    pub supports_optional_class_properties: bool,
}

impl TargetLanguage {
    /// Whether this target is the JSON Schema passthrough.
    pub fn is_schema(&self) -> bool {
        self.names
            .iter()
            .any(|name| *name == "schema" || *name == "json-schema")
    }
}

/// A resolved output target: capabilities plus a renderer for the
/// canonical graph.
pub trait Target {
    fn language(&self) -> &TargetLanguage;

    fn render(
        &self,
        graph: &TypeGraph,
        names: &Names,
        options: &RenderOptions,
    ) -> Result<IndexMap<String, RenderResult>>;
}

/// The built-in JSON Schema target: emits a schema document generated
/// from the canonical graph. (A single schema input short-circuits in the
/// driver and never reaches this renderer.)
pub struct JsonSchemaTarget {
    language: TargetLanguage,
}

impl Default for JsonSchemaTarget {
    fn default() -> Self {
        JsonSchemaTarget {
            language: TargetLanguage {
                display_name: "JSON Schema",
                names: &["schema", "json-schema"],
                string_type_mapping: StringTypeMapping::identity(),
                supports_unions_with_both_number_types: true,
                supports_full_object_type: true,
                supports_optional_class_properties: true,
            },
        }
    }
}

impl JsonSchemaTarget {
    pub fn new() -> Self {
        JsonSchemaTarget::default()
    }
}

impl Target for JsonSchemaTarget {
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

        let emitter = SchemaEmitter { graph, names };
        let mut definitions = Map::new();
        for (type_ref, name) in names.iter() {
            // only reachable declarations make it into the output
            if graph.get(type_ref).is_some() {
                definitions.insert(name.to_string(), emitter.definition_body(type_ref));
            }
        }

        let mut document = Map::new();
        document.insert(
            "$schema".to_string(),
            json!("http://json-schema.org/draft-06/schema#"),
        );
        if let [type_ref] = graph.top_levels().values().copied().collect::<Vec<_>>().as_slice() {
            for (key, value) in emitter.schema_ref(*type_ref).into_map() {
                document.insert(key, value);
            }
        } else {
            let refs: Vec<Value> = graph
                .top_levels()
                .values()
                .map(|type_ref| Value::from(emitter.schema_ref(*type_ref)))
                .collect();
            document.insert("oneOf".to_string(), json!(refs));
        }
        if !definitions.is_empty() {
            document.insert("definitions".to_string(), Value::Object(definitions));
        }

        let text = crate::run::to_pretty_json(&Value::Object(document))?;
        let mut results = IndexMap::new();
        results.insert(
            options.output_filename.clone(),
            RenderResult::from_text(&text),
        );
        Ok(results)
    }
}

/// Either an inline schema object or a `$ref` to a definition.
struct SchemaValue(Map<String, Value>);

impl SchemaValue {
    fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<SchemaValue> for Value {
    fn from(value: SchemaValue) -> Self {
        Value::Object(value.0)
    }
}

struct SchemaEmitter<'a> {
    graph: &'a TypeGraph,
    names: &'a Names,
}

impl SchemaEmitter<'_> {
    /// A reference to the type: `$ref` when it has a declared name, the
    /// inline body otherwise.
    fn schema_ref(&self, type_ref: TypeRef) -> SchemaValue {
        match self.names.get(type_ref) {
            Some(name) => {
                let mut map = Map::new();
                map.insert("$ref".to_string(), json!(format!("#/definitions/{}", name)));
                SchemaValue(map)
            }
            None => SchemaValue(self.definition_body(type_ref).as_object().cloned().unwrap_or_default()),
        }
    }

    fn definition_body(&self, type_ref: TypeRef) -> Value {
        use crate::type_graph::PrimitiveKind;

        let Some(ty) = self.graph.get(type_ref) else {
            return json!({});
        };
        match ty {
            Type::Primitive(PrimitiveKind::None) | Type::Primitive(PrimitiveKind::Any) => {
                json!({})
            }
            Type::Primitive(PrimitiveKind::Null) => json!({"type": "null"}),
            Type::Primitive(PrimitiveKind::Bool) => json!({"type": "boolean"}),
            Type::Primitive(PrimitiveKind::Integer) => json!({"type": "integer"}),
            Type::Primitive(PrimitiveKind::Double) => json!({"type": "number"}),
            Type::Primitive(PrimitiveKind::String) => json!({"type": "string"}),
            Type::Primitive(PrimitiveKind::Date) => json!({"type": "string", "format": "date"}),
            Type::Primitive(PrimitiveKind::Time) => json!({"type": "string", "format": "time"}),
            Type::Primitive(PrimitiveKind::DateTime) => {
                json!({"type": "string", "format": "date-time"})
            }
            Type::Primitive(PrimitiveKind::IntegerString) | Type::Primitive(PrimitiveKind::BoolString) => {
                json!({"type": "string"})
            }
            Type::TransformedString(kind) => match kind {
                TransformerKind::Date => json!({"type": "string", "format": "date"}),
                TransformerKind::Time => json!({"type": "string", "format": "time"}),
                TransformerKind::DateTime => json!({"type": "string", "format": "date-time"}),
                TransformerKind::IntegerString | TransformerKind::BoolString => {
                    json!({"type": "string"})
                }
            },
            Type::Enum(cases) => json!({"enum": cases.iter().collect::<Vec<_>>()}),
            Type::Array(element) => {
                json!({"type": "array", "items": Value::from(self.schema_ref(*element))})
            }
            Type::Map(value) => json!({
                "type": "object",
                "additionalProperties": Value::from(self.schema_ref(*value)),
            }),
            Type::Class(class) => {
                let mut properties = Map::new();
                let mut required = vec![];
                for (name, property) in &class.properties {
                    properties.insert(name.clone(), Value::from(self.schema_ref(property.ty)));
                    if !property.optional {
                        required.push(name.clone());
                    }
                }
                json!({
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                    "additionalProperties": false,
                })
            }
            Type::Object(object) => {
                let mut properties = Map::new();
                let mut required = vec![];
                for (name, property) in &object.properties {
                    properties.insert(name.clone(), Value::from(self.schema_ref(property.ty)));
                    if !property.optional {
                        required.push(name.clone());
                    }
                }
                let additional = match object.additional {
                    Some(additional) => Value::from(self.schema_ref(additional)),
                    None => json!(false),
                };
                json!({
                    "type": "object",
                    "properties": Value::Object(properties),
                    "required": required,
                    "additionalProperties": additional,
                })
            }
            Type::Union(members) => {
                let members: Vec<Value> = members
                    .iter()
                    .map(|member| Value::from(self.schema_ref(*member)))
                    .collect();
                json!({"anyOf": members})
            }
            Type::Intersection(_) => json!({}),
        }
    }
}
