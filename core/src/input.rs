//! # Input Data
//!
//! The ingestion collaborator: collects JSON samples and JSON Schema
//! documents, then lowers all of them into a [`TypeBuilder`] as named top
//! levels. Ingestion finishes before the pipeline starts; `add_types` is
//! the only place the engine touches raw input.
//!
//! ## Sample shape inference
//!
//! Multiple samples for one top level are merged structurally before
//! lowering:
//!
//! - **T + T → T**: equal shapes collapse, recursively for arrays/objects
//! - **none + T → T**: `none` is the bottom (an empty array's element type)
//!   and adopts any concrete shape
//! - **T + null → union{T, null}**: an explicit `null` value contributes a
//!   null union member
//! - **T1 + T2 → union{T1, T2}**: distinct concrete shapes form a flat,
//!   deduplicated union
//! - a property missing from some object samples becomes *optional*; this
//!   is deliberately distinct from an explicit null value
//!
//! String samples record their observed case set (bounded, for later enum
//! expansion) and are classified as date / time / date-time /
//! integer-string / bool-string when the corresponding inference flag is
//! set; the builder's string-type mapping decides whether those kinds stay
//! distinct from plain strings.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    attributes::{Attributes, StringCases},
    builder::TypeBuilder,
    error::{Error, Result},
    schema,
    type_graph::{PrimitiveKind, Property, TransformerKind, TypeRef},
};

/// Flags consumed while lowering inputs into the initial graph.
#[derive(Debug, Clone, Copy)]
pub struct InferenceFlags {
    pub infer_enums: bool,
    pub infer_dates: bool,
    pub infer_integer_strings: bool,
    pub all_properties_optional: bool,
    pub fixed_top_levels: bool,
}

impl Default for InferenceFlags {
    fn default() -> Self {
        InferenceFlags {
            infer_enums: true,
            infer_dates: true,
            infer_integer_strings: true,
            all_properties_optional: false,
            fixed_top_levels: false,
        }
    }
}

#[derive(Debug)]
enum Source {
    Samples { name: String, samples: Vec<Value> },
    Schema { name: String, raw: String, parsed: Value },
}

/// All inputs for one run. Must be finished before the pipeline consumes it.
#[derive(Debug, Default)]
pub struct InputData {
    sources: Vec<Source>,
    finished: bool,
}

impl InputData {
    pub fn new() -> Self {
        InputData::default()
    }

    /// Add sample documents for a top level. Samples for an already-known
    /// name accumulate onto it.
    pub fn add_samples(&mut self, name: impl Into<String>, samples: Vec<Value>) {
        let name = name.into();
        for source in &mut self.sources {
            if let Source::Samples { name: existing, samples: all } = source {
                if *existing == name {
                    all.extend(samples);
                    return;
                }
            }
        }
        self.sources.push(Source::Samples { name, samples });
    }

    pub fn add_sample_str(&mut self, name: impl Into<String>, json: &str) -> Result<()> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::input(format!("invalid sample json: {}", e)))?;
        self.add_samples(name, vec![value]);
        Ok(())
    }

    /// Add one JSON Schema document as a top level.
    pub fn add_schema(&mut self, name: impl Into<String>, raw: impl Into<String>) -> Result<()> {
        let raw = raw.into();
        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::input(format!("invalid schema json: {}", e)))?;
        self.sources.push(Source::Schema {
            name: name.into(),
            raw,
            parsed,
        });
        Ok(())
    }

    pub fn finish_adding_inputs(&mut self) {
        self.finished = true;
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sampled input always needs the IR; schema-only input can skip it
    /// when the target is the schema passthrough.
    pub fn need_ir(&self) -> bool {
        self.sources
            .iter()
            .any(|source| matches!(source, Source::Samples { .. }))
    }

    /// Whether any input originated from JSON Schema (schema-mode).
    pub fn need_schema_processing(&self) -> bool {
        self.sources
            .iter()
            .any(|source| matches!(source, Source::Schema { .. }))
    }

    /// The raw schema text, iff the whole input is one schema document.
    pub fn single_string_schema_source(&self) -> Option<&str> {
        match self.sources.as_slice() {
            [Source::Schema { raw, .. }] => Some(raw),
            _ => None,
        }
    }

    /// Lower every source into the builder as a named top level.
    pub fn add_types(&self, builder: &mut TypeBuilder, flags: &InferenceFlags) -> Result<()> {
        if !self.finished {
            return Err(Error::input("inputs consumed before finish_adding_inputs"));
        }
        for (provenance, source) in self.sources.iter().enumerate() {
            match source {
                Source::Samples { name, samples } => {
                    let mut shape = Shape::None;
                    for sample in samples {
                        shape = Shape::merge(shape, Shape::of(sample, flags));
                    }
                    let lowerer = Lowerer { flags: *flags, provenance };
                    let type_ref = lowerer.lower(builder, shape, true)?;
                    builder.merge_attributes(type_ref, Attributes::named(name.clone()));
                    builder.add_top_level(name.clone(), type_ref);
                }
                Source::Schema { name, parsed, .. } => {
                    schema::add_schema_types(builder, name, parsed, flags, provenance)?;
                }
            }
        }
        Ok(())
    }
}

/// Merged shape of one or more samples, before lowering into the graph.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    None,
    Null,
    Bool,
    Integer,
    Double,
    String(StringShape),
    Array(Box<Shape>),
    Object(IndexMap<String, FieldShape>),
    Union(Vec<Shape>),
}

#[derive(Debug, Clone, PartialEq)]
struct StringShape {
    /// Specialized kind when every observed value classified the same way.
    kind: Option<TransformerKind>,
    cases: StringCases,
}

#[derive(Debug, Clone, PartialEq)]
struct FieldShape {
    shape: Shape,
    optional: bool,
}

impl Shape {
    fn of(value: &Value, flags: &InferenceFlags) -> Shape {
        match value {
            Value::Null => Shape::Null,
            Value::Bool(_) => Shape::Bool,
            Value::Number(n) => match n.is_i64() || n.is_u64() {
                true => Shape::Integer,
                false => Shape::Double,
            },
            Value::String(s) => Shape::String(StringShape {
                kind: classify_string(s, flags),
                cases: StringCases::observed(s.clone()),
            }),
            Value::Array(elements) => {
                let mut element = Shape::None;
                for value in elements {
                    element = Shape::merge(element, Shape::of(value, flags));
                }
                Shape::Array(Box::new(element))
            }
            Value::Object(fields) => Shape::Object(
                fields
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.clone(),
                            FieldShape {
                                shape: Shape::of(value, flags),
                                optional: false,
                            },
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Merge two shapes observed at the same position.
    fn merge(existing: Shape, new: Shape) -> Shape {
        match (existing, new) {
            (Shape::None, other) | (other, Shape::None) => other,

            (Shape::Null, Shape::Null) => Shape::Null,
            (Shape::Bool, Shape::Bool) => Shape::Bool,
            (Shape::Integer, Shape::Integer) => Shape::Integer,
            (Shape::Double, Shape::Double) => Shape::Double,

            (Shape::String(a), Shape::String(b)) => Shape::String(StringShape::merge(a, b)),

            (Shape::Array(a), Shape::Array(b)) => Shape::Array(Box::new(Shape::merge(*a, *b))),

            (Shape::Object(a), Shape::Object(b)) => Shape::Object(merge_fields(a, b)),

            (Shape::Union(members), other) | (other, Shape::Union(members)) => {
                let mut merged = members;
                merge_into_union(&mut merged, other);
                Shape::Union(merged)
            }

            // distinct concrete shapes (including explicit null) form a union
            (a, b) => {
                let mut members = vec![a];
                merge_into_union(&mut members, b);
                Shape::Union(members)
            }
        }
    }
}

impl StringShape {
    fn merge(a: StringShape, b: StringShape) -> StringShape {
        StringShape {
            kind: match a.kind == b.kind {
                true => a.kind,
                false => None,
            },
            cases: match (a.cases, b.cases) {
                (StringCases::Cases(mut x), StringCases::Cases(y)) => {
                    x.extend(y);
                    StringCases::from_set(x)
                }
                _ => StringCases::Unbounded,
            },
        }
    }
}

/// Fold one shape into an existing union member list: members of the same
/// family merge, everything else joins as a new member.
fn merge_into_union(members: &mut Vec<Shape>, new: Shape) {
    match new {
        Shape::None => {}
        Shape::Union(new_members) => {
            for member in new_members {
                merge_into_union(members, member);
            }
        }
        new => {
            let mergeable = members.iter_mut().find(|member| {
                matches!(
                    (&**member, &new),
                    (Shape::Null, Shape::Null)
                        | (Shape::Bool, Shape::Bool)
                        | (Shape::Integer, Shape::Integer)
                        | (Shape::Double, Shape::Double)
                        | (Shape::String(_), Shape::String(_))
                        | (Shape::Array(_), Shape::Array(_))
                        | (Shape::Object(_), Shape::Object(_))
                )
            });
            match mergeable {
                Some(member) => {
                    let yanked = std::mem::replace(member, Shape::None);
                    *member = Shape::merge(yanked, new);
                }
                None => members.push(new),
            }
        }
    }
}

/// Shared fields merge recursively with OR'd optionality; fields missing on
/// either side become optional. First-observed insertion order is kept.
fn merge_fields(
    mut existing: IndexMap<String, FieldShape>,
    new: IndexMap<String, FieldShape>,
) -> IndexMap<String, FieldShape> {
    for (name, field) in existing.iter_mut() {
        if !new.contains_key(name) {
            field.optional = true;
        }
    }
    for (name, mut field) in new {
        match existing.get_mut(&name) {
            Some(existing_field) => {
                let yanked = std::mem::replace(&mut existing_field.shape, Shape::None);
                existing_field.shape = Shape::merge(yanked, field.shape);
                existing_field.optional = existing_field.optional || field.optional;
            }
            None => {
                field.optional = true;
                existing.insert(name, field);
            }
        }
    }
    existing
}

struct Lowerer {
    flags: InferenceFlags,
    provenance: usize,
}

impl Lowerer {
    fn attrs(&self) -> Attributes {
        Attributes::default().with_provenance(self.provenance)
    }

    fn lower(&self, builder: &mut TypeBuilder, shape: Shape, top_level: bool) -> Result<TypeRef> {
        match shape {
            Shape::None => Ok(builder.add_primitive(PrimitiveKind::None, self.attrs())),
            Shape::Null => Ok(builder.add_primitive(PrimitiveKind::Null, self.attrs())),
            Shape::Bool => Ok(builder.add_primitive(PrimitiveKind::Bool, self.attrs())),
            Shape::Integer => Ok(builder.add_primitive(PrimitiveKind::Integer, self.attrs())),
            Shape::Double => Ok(builder.add_primitive(PrimitiveKind::Double, self.attrs())),
            Shape::String(string) => {
                let attrs = self.attrs().with_cases(string.cases);
                match string.kind {
                    Some(kind) => Ok(builder.get_primitive_string_type(kind, attrs)),
                    None => Ok(builder.add_primitive(PrimitiveKind::String, attrs)),
                }
            }
            Shape::Array(element) => {
                let element = self.lower(builder, *element, false)?;
                Ok(builder.add_array(element, self.attrs()))
            }
            Shape::Object(fields) => {
                let mut properties = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    let ty = self.lower(builder, field.shape, false)?;
                    let optional = field.optional || self.flags.all_properties_optional;
                    properties.push((name, Property { ty, optional }));
                }
                // sampled classes intern structurally so repeated shapes
                // collapse; fixed top levels opt their root class out
                let nominal = top_level && self.flags.fixed_top_levels;
                builder.add_class(properties, nominal, false, self.attrs())
            }
            Shape::Union(members) => {
                let mut mapped = BTreeSet::new();
                for member in members {
                    mapped.insert(self.lower(builder, member, false)?);
                }
                builder.add_union(mapped, self.attrs())
            }
        }
    }
}

fn classify_string(s: &str, flags: &InferenceFlags) -> Option<TransformerKind> {
    if flags.infer_dates {
        if is_date(s) {
            return Some(TransformerKind::Date);
        }
        if is_time(s) {
            return Some(TransformerKind::Time);
        }
        if is_date_time(s) {
            return Some(TransformerKind::DateTime);
        }
    }
    if flags.infer_integer_strings {
        if !s.is_empty() && s.len() <= 19 && s.parse::<i64>().is_ok() {
            return Some(TransformerKind::IntegerString);
        }
        if s == "true" || s == "false" {
            return Some(TransformerKind::BoolString);
        }
    }
    None
}

fn digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `YYYY-MM-DD` with plausible month/day ranges.
fn is_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let (year, month, day) = (&s[0..4], &s[5..7], &s[8..10]);
    if !(digits(year) && digits(month) && digits(day)) {
        return false;
    }
    let month: u32 = month.parse().unwrap_or(0);
    let day: u32 = day.parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// `HH:MM:SS`, optional fractional seconds.
fn is_time(s: &str) -> bool {
    let (clock, fraction) = match s.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (s, None),
    };
    if let Some(fraction) = fraction {
        if !digits(fraction) {
            return false;
        }
    }
    let bytes = clock.as_bytes();
    if bytes.len() != 8 || bytes[2] != b':' || bytes[5] != b':' {
        return false;
    }
    let (hour, minute, second) = (&clock[0..2], &clock[3..5], &clock[6..8]);
    if !(digits(hour) && digits(minute) && digits(second)) {
        return false;
    }
    let hour: u32 = hour.parse().unwrap_or(99);
    let minute: u32 = minute.parse().unwrap_or(99);
    let second: u32 = second.parse().unwrap_or(99);
    hour <= 23 && minute <= 59 && second <= 60
}

/// RFC 3339 style: date `T` time, optional `Z` or `±HH:MM` offset.
fn is_date_time(s: &str) -> bool {
    let Some((date, time)) = s.split_once(['T', 't']) else {
        return false;
    };
    if !is_date(date) {
        return false;
    }
    let time = time.strip_suffix(['Z', 'z']).unwrap_or(time);
    if let Some(idx) = time.rfind(['+', '-']) {
        let (clock, offset) = time.split_at(idx);
        let offset = &offset[1..];
        let offset_ok = match offset.split_once(':') {
            Some((h, m)) => h.len() == 2 && m.len() == 2 && digits(h) && digits(m),
            None => false,
        };
        return offset_ok && is_time(clock);
    }
    is_time(time)
}
