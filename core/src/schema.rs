//! # JSON Schema Reader
//!
//! Lowers a JSON Schema document into builder types. This is deliberately
//! not a validator: only the vocabulary needed to infer types is read.
//!
//! Supported keywords: `type` (including arrays of type names),
//! `properties` + `required`, `additionalProperties`, `items`, string
//! `enum`, `format` (`date`, `time`, `date-time`), `oneOf`/`anyOf`
//! (union), `allOf` (intersection), `$ref` into `#/definitions/…` or
//! `#/$defs/…`, and `title`/`description` (attributes).
//!
//! `$ref` cycles are built through forwarding intersections: a definition
//! that is referenced while it is still being read hands out a reserved
//! placeholder, resolved once the definition finishes. The builder flags
//! the forwarders so the driver runs the indirection-removal pass first.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::{
    attributes::{Attributes, StringCases},
    builder::TypeBuilder,
    error::{Error, Result},
    input::InferenceFlags,
    type_graph::{PrimitiveKind, Property, TransformerKind, TypeRef},
};

/// Read one schema document and register it as a top level.
pub(crate) fn add_schema_types(
    builder: &mut TypeBuilder,
    name: &str,
    schema: &Value,
    flags: &InferenceFlags,
    provenance: usize,
) -> Result<()> {
    let definitions = collect_definitions(schema);
    let mut reader = SchemaReader {
        builder,
        definitions,
        resolved: BTreeMap::new(),
        in_progress: BTreeMap::new(),
        flags: *flags,
        provenance,
    };
    let type_ref = reader.read(schema)?;
    reader
        .builder
        .merge_attributes(type_ref, Attributes::named(name));
    reader.builder.add_top_level(name, type_ref);
    Ok(())
}

fn collect_definitions(schema: &Value) -> BTreeMap<String, Value> {
    let mut definitions = BTreeMap::new();
    for key in ["definitions", "$defs"] {
        if let Some(Value::Object(defs)) = schema.get(key) {
            for (name, def) in defs {
                definitions.insert(format!("#/{}/{}", key, name), def.clone());
            }
        }
    }
    definitions
}

struct SchemaReader<'b> {
    builder: &'b mut TypeBuilder,
    definitions: BTreeMap<String, Value>,
    resolved: BTreeMap<String, TypeRef>,
    in_progress: BTreeMap<String, TypeRef>,
    flags: InferenceFlags,
    provenance: usize,
}

impl SchemaReader<'_> {
    fn attrs(&self, schema: &Value) -> Attributes {
        let mut attrs = Attributes::default().with_provenance(self.provenance);
        if let Some(Value::String(title)) = schema.get("title") {
            attrs.names.insert(title.clone());
        }
        if let Some(Value::String(description)) = schema.get("description") {
            attrs.descriptions.insert(description.clone());
        }
        attrs
    }

    fn read(&mut self, schema: &Value) -> Result<TypeRef> {
        match schema {
            // boolean schemas: `true` accepts anything, `false` nothing
            Value::Bool(true) => {
                Ok(self
                    .builder
                    .add_primitive(PrimitiveKind::Any, self.attrs(schema)))
            }
            Value::Bool(false) => {
                Ok(self
                    .builder
                    .add_primitive(PrimitiveKind::None, self.attrs(schema)))
            }
            Value::Object(_) => self.read_object_schema(schema),
            _ => Err(Error::input(format!(
                "schema must be an object or boolean, got {}",
                schema
            ))),
        }
    }

    fn read_object_schema(&mut self, schema: &Value) -> Result<TypeRef> {
        if let Some(Value::String(reference)) = schema.get("$ref") {
            return self.resolve_ref(reference);
        }

        if let Some(Value::Array(cases)) = schema.get("enum") {
            return self.read_enum(schema, cases);
        }

        if let Some(Value::Array(operands)) = schema.get("allOf") {
            return self.read_all_of(schema, operands);
        }

        if let Some(Value::Array(alternatives)) =
            schema.get("oneOf").or_else(|| schema.get("anyOf"))
        {
            let mut members = BTreeSet::new();
            for alternative in alternatives {
                members.insert(self.read(alternative)?);
            }
            return self.builder.add_union(members, self.attrs(schema));
        }

        match schema.get("type") {
            Some(Value::String(name)) => self.read_typed(schema, name),
            Some(Value::Array(names)) => {
                let mut members = BTreeSet::new();
                for name in names {
                    let Value::String(name) = name else {
                        return Err(Error::input("non-string entry in type array"));
                    };
                    members.insert(self.read_typed(schema, name)?);
                }
                self.builder.add_union(members, self.attrs(schema))
            }
            Some(other) => Err(Error::input(format!("unsupported type clause {}", other))),
            // untyped schema with properties still describes an object;
            // a completely empty schema accepts anything
            None => match schema.get("properties").is_some()
                || schema.get("additionalProperties").is_some()
            {
                true => self.read_object_type(schema),
                false => Ok(self
                    .builder
                    .add_primitive(PrimitiveKind::Any, self.attrs(schema))),
            },
        }
    }

    fn read_typed(&mut self, schema: &Value, type_name: &str) -> Result<TypeRef> {
        let attrs = self.attrs(schema);
        match type_name {
            "null" => Ok(self.builder.add_primitive(PrimitiveKind::Null, attrs)),
            "boolean" => Ok(self.builder.add_primitive(PrimitiveKind::Bool, attrs)),
            "integer" => Ok(self.builder.add_primitive(PrimitiveKind::Integer, attrs)),
            "number" => Ok(self.builder.add_primitive(PrimitiveKind::Double, attrs)),
            "string" => match schema.get("format").and_then(Value::as_str) {
                Some("date") => Ok(self
                    .builder
                    .get_primitive_string_type(TransformerKind::Date, attrs)),
                Some("time") => Ok(self
                    .builder
                    .get_primitive_string_type(TransformerKind::Time, attrs)),
                Some("date-time") => Ok(self
                    .builder
                    .get_primitive_string_type(TransformerKind::DateTime, attrs)),
                // unknown formats are annotations, not types
                _ => Ok(self.builder.add_primitive(PrimitiveKind::String, attrs)),
            },
            "array" => {
                let element = match schema.get("items") {
                    Some(items) => self.read(items)?,
                    None => self.builder.add_primitive(PrimitiveKind::Any, self.base_attrs()),
                };
                Ok(self.builder.add_array(element, attrs))
            }
            "object" => self.read_object_type(schema),
            other => Err(Error::input(format!("unknown type name `{}`", other))),
        }
    }

    fn base_attrs(&self) -> Attributes {
        Attributes::default().with_provenance(self.provenance)
    }

    /// Schema enums lower to strings with a known case set; the
    /// expand-strings pass turns them into enum types (policy `all` in
    /// schema-mode).
    fn read_enum(&mut self, schema: &Value, cases: &[Value]) -> Result<TypeRef> {
        let mut set = BTreeSet::new();
        for case in cases {
            match case {
                Value::String(s) => {
                    set.insert(s.clone());
                }
                // non-string enums degrade to `any`
                _ => {
                    return Ok(self
                        .builder
                        .add_primitive(PrimitiveKind::Any, self.attrs(schema)));
                }
            }
        }
        if set.is_empty() {
            return Err(Error::input("enum clause with no cases"));
        }
        let attrs = self.attrs(schema).with_cases(StringCases::from_set(set));
        Ok(self.builder.add_primitive(PrimitiveKind::String, attrs))
    }

    fn read_all_of(&mut self, schema: &Value, operands: &[Value]) -> Result<TypeRef> {
        let mut members = BTreeSet::new();
        for operand in operands {
            members.insert(self.read(operand)?);
        }
        // sibling constraints participate as one more operand
        let Value::Object(fields) = schema else {
            return Err(Error::input("allOf on non-object schema"));
        };
        let siblings: serde_json::Map<String, Value> = fields
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "allOf" | "title" | "description"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !siblings.is_empty() {
            members.insert(self.read(&Value::Object(siblings))?);
        }
        self.builder.add_intersection(members, self.attrs(schema))
    }

    fn read_object_type(&mut self, schema: &Value) -> Result<TypeRef> {
        let required: BTreeSet<&str> = match schema.get("required") {
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
            _ => BTreeSet::new(),
        };

        let mut properties = Vec::new();
        if let Some(Value::Object(props)) = schema.get("properties") {
            for (name, prop_schema) in props {
                let ty = self.read(prop_schema)?;
                let optional =
                    !required.contains(name.as_str()) || self.flags.all_properties_optional;
                properties.push((name.clone(), Property { ty, optional }));
            }
        }

        let additional = match schema.get("additionalProperties") {
            Some(Value::Bool(false)) | None => None,
            Some(Value::Bool(true)) => Some(
                self.builder
                    .add_primitive(PrimitiveKind::Any, self.base_attrs()),
            ),
            Some(additional) => Some(self.read(additional)?),
        };

        let attrs = self.attrs(schema);
        match (properties.is_empty(), additional) {
            // pure additional-properties object is a map
            (true, Some(value)) => Ok(self.builder.add_map(value, attrs)),
            (_, None) => self.builder.add_class(properties, true, true, attrs),
            (false, Some(additional)) => {
                self.builder.add_object(properties, Some(additional), attrs)
            }
        }
    }

    fn resolve_ref(&mut self, reference: &str) -> Result<TypeRef> {
        if let Some(type_ref) = self.resolved.get(reference) {
            return Ok(*type_ref);
        }
        if let Some(slot) = self.in_progress.get(reference) {
            // cycle: the forwarder stands in until the definition finishes
            return Ok(*slot);
        }
        let Some(definition) = self.definitions.get(reference).cloned() else {
            return Err(Error::input(format!("unresolvable $ref `{}`", reference)));
        };

        let slot = self.builder.reserve();
        self.in_progress.insert(reference.to_string(), slot);
        let target = self.read(&definition)?;
        // the definition key is a name candidate for the referenced type
        if let Some(key) = reference.rsplit('/').next() {
            self.builder
                .merge_attributes(target, Attributes::named(key));
        }
        self.builder.resolve_forwarder(slot, target)?;
        self.in_progress.remove(reference);
        self.resolved.insert(reference.to_string(), slot);
        Ok(slot)
    }
}
