//! End-to-end pipeline scenarios: samples or schemas in, canonical graph
//! (or rendered output) out.

use pretty_assertions::assert_eq;

use typelift::{
    input::InputData,
    language::{JsonSchemaTarget, TargetLanguage},
    names::NameSupply,
    pipeline::{PipelineFlags, make_graph},
    run::{Options, run},
    type_graph::{PrimitiveKind, StringTypeMapping, Type},
};

fn test_language(supports_optional_class_properties: bool) -> TargetLanguage {
    TargetLanguage {
        display_name: "Test",
        names: &["test"],
        string_type_mapping: StringTypeMapping::all_strings(),
        supports_unions_with_both_number_types: true,
        supports_full_object_type: false,
        supports_optional_class_properties,
    }
}

fn samples_graph(
    json: &str,
    flags: PipelineFlags,
    language: &TargetLanguage,
) -> typelift::type_graph::TypeGraph {
    let mut input = InputData::new();
    input.add_sample_str("top", json).unwrap();
    input.finish_adding_inputs();
    let mut supply = NameSupply::new();
    let (graph, _) = make_graph(&input, language, &flags, &mut supply).unwrap();
    graph
}

fn schema_graph(
    schema: &str,
    flags: PipelineFlags,
    language: &TargetLanguage,
) -> typelift::type_graph::TypeGraph {
    let mut input = InputData::new();
    input.add_schema("top", schema).unwrap();
    input.finish_adding_inputs();
    let mut supply = NameSupply::new();
    let (graph, _) = make_graph(&input, language, &flags, &mut supply).unwrap();
    graph
}

/// S1: schema passthrough pretty-prints the input with four-space indent
/// and a terminating empty line.
#[test]
fn s1_schema_passthrough() {
    let mut input = InputData::new();
    input
        .add_schema(
            "top",
            r#"{"type":"object","properties":{"a":{"type":"string"}}}"#,
        )
        .unwrap();
    let options = Options::new(Box::new(JsonSchemaTarget::new()), input);
    let results = run(options).unwrap();

    assert_eq!(results.len(), 1);
    let result = &results["stdout"];
    assert_eq!(result.lines, vec![
        "{".to_string(),
        "    \"type\": \"object\",".to_string(),
        "    \"properties\": {".to_string(),
        "        \"a\": {".to_string(),
        "            \"type\": \"string\"".to_string(),
        "        }".to_string(),
        "    }".to_string(),
        "}".to_string(),
        String::new(),
    ]);
}

/// S2: the element type of an empty array is `none` at inference and
/// `any` in the final graph; no `none` survives.
#[test]
fn s2_none_to_any() {
    let graph = samples_graph(
        r#"{"x": []}"#,
        PipelineFlags::default(),
        &test_language(true),
    );
    assert_eq!(graph.to_string(), "top;{x:[any]}");
    assert!(
        graph
            .iter_reachable()
            .all(|(_, ty)| !matches!(ty, Type::Primitive(PrimitiveKind::None)))
    );
}

/// S3: a homogeneous six-property object becomes a map, unless map
/// inference is off.
#[test]
fn s3_map_inference() {
    let json = r#"{"a":1,"b":2,"c":3,"d":4,"e":5,"f":6}"#;
    let graph = samples_graph(json, PipelineFlags::default(), &test_language(true));
    assert_eq!(graph.to_string(), "top;map<int>");

    let flags = PipelineFlags {
        infer_maps: false,
        ..PipelineFlags::default()
    };
    let graph = samples_graph(json, flags, &test_language(true));
    assert_eq!(
        graph.to_string(),
        "top;{a:int,b:int,c:int,d:int,e:int,f:int}"
    );
}

/// S4: sampled string cases expand into an enum, unless enum inference is
/// off.
#[test]
fn s4_enum_expansion() {
    let json = r#"[{"c":"r"},{"c":"g"},{"c":"b"}]"#;
    let graph = samples_graph(json, PipelineFlags::default(), &test_language(true));
    assert_eq!(graph.to_string(), "top;[{c:enum<b,g,r>}]");

    let flags = PipelineFlags {
        infer_enums: false,
        ..PipelineFlags::default()
    };
    let graph = samples_graph(json, flags, &test_language(true));
    assert_eq!(graph.to_string(), "top;[{c:str}]");
}

/// S5: without optional-property support an optional integer becomes a
/// required `union{integer, null}`.
#[test]
fn s5_optional_to_nullable() {
    let json = r#"[{"a":1},{}]"#;
    let graph = samples_graph(json, PipelineFlags::default(), &test_language(false));
    assert_eq!(graph.to_string(), "top;[{a:|int|null|}]");

    // every class property is required now
    for (_, ty) in graph.iter_reachable() {
        if let Type::Class(class) = ty {
            assert!(class.properties.values().all(|p| !p.optional));
        }
    }
}

/// S6: mixed samples form one flat deduplicated union.
#[test]
fn s6_union_normalization() {
    let graph = samples_graph(
        r#"[1, "x y", 2, "y z", null]"#,
        PipelineFlags::default(),
        &test_language(true),
    );
    assert_eq!(graph.to_string(), "top;[|int|null|str|]");
}

/// Same input, same options, same capabilities: identical canonical
/// graphs.
#[test]
fn determinism() {
    let json = r#"
        {
            "users": [
                {"id": 1, "name": "ann lee", "tags": ["a", "b"]},
                {"id": 2, "name": "bob roy", "email": "b example"}
            ],
            "total": 2
        }
    "#;
    let a = samples_graph(json, PipelineFlags::default(), &test_language(true));
    let b = samples_graph(json, PipelineFlags::default(), &test_language(true));
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(a.len(), b.len());
}

/// After the final sweep every type in the arena is reachable from a top
/// level.
#[test]
fn gc_leaves_only_reachable_types() {
    let graph = samples_graph(
        r#"[{"a":1,"b":"x y"},{"a":2}]"#,
        PipelineFlags::default(),
        &test_language(true),
    );
    assert_eq!(graph.reachable().len(), graph.len());
}

/// Property order follows `alphabetize_properties`.
#[test]
fn class_property_ordering() {
    let json = r#"{"zebra":1,"apple":2,"mango":3}"#;
    let graph = samples_graph(json, PipelineFlags::default(), &test_language(true));
    assert_eq!(graph.to_string(), "top;{zebra:int,apple:int,mango:int}");

    let flags = PipelineFlags {
        alphabetize_properties: true,
        ..PipelineFlags::default()
    };
    let graph = samples_graph(json, flags, &test_language(true));
    assert_eq!(graph.to_string(), "top;{apple:int,mango:int,zebra:int}");
}

/// Schema-mode: allOf resolves to the concrete meet, $ref cycles work,
/// schema enums expand, and no intersection survives.
#[test]
fn schema_mode_pipeline() {
    let schema = r##"
    {
        "definitions": {
            "entry": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["id"]
            }
        },
        "type": "object",
        "properties": {
            "first": {
                "allOf": [
                    {"$ref": "#/definitions/entry"},
                    {
                        "type": "object",
                        "properties": {"extra": {"type": "string"}},
                        "required": ["extra"]
                    }
                ]
            },
            "mode": {"enum": ["a", "b"]}
        },
        "required": ["first", "mode"]
    }
    "##;
    let graph = schema_graph(schema, PipelineFlags::default(), &test_language(true));
    assert_eq!(
        graph.to_string(),
        "top;{first:{id:int,tags?:[str],extra:str},mode:enum<a,b>}"
    );
    assert!(
        graph
            .iter_reachable()
            .all(|(_, ty)| !matches!(ty, Type::Intersection(_)))
    );
}

/// A recursive schema keeps its cycle through the whole pipeline.
#[test]
fn recursive_schema_survives_the_pipeline() {
    let schema = r##"
    {
        "definitions": {
            "node": {
                "type": "object",
                "properties": {
                    "val": {"type": "integer"},
                    "next": {"$ref": "#/definitions/node"}
                },
                "required": ["val"]
            }
        },
        "$ref": "#/definitions/node"
    }
    "##;
    let graph = schema_graph(schema, PipelineFlags::default(), &test_language(true));
    let rendered = graph.to_string();
    assert!(
        rendered.starts_with("top;{val:int,next?:#"),
        "expected a self-reference, got {rendered}"
    );
}

/// `no_render` builds the graph and returns a placeholder.
#[test]
fn no_render_short_circuits() {
    let mut input = InputData::new();
    input.add_sample_str("top", r#"{"a": 1}"#).unwrap();
    let mut options = Options::new(Box::new(JsonSchemaTarget::new()), input);
    options.no_render = true;
    let results = run(options).unwrap();
    assert_eq!(results["stdout"].lines[0], "// rendering skipped");
}

/// Unknown renderer options are fatal configuration errors.
#[test]
fn unknown_renderer_option_is_fatal() {
    let mut input = InputData::new();
    input.add_sample_str("top", r#"{"a": 1}"#).unwrap();
    let mut options = Options::new(Box::new(JsonSchemaTarget::new()), input);
    options
        .renderer_options
        .insert("just-types".to_string(), "true".to_string());
    assert!(matches!(
        run(options),
        Err(typelift::Error::UnknownRendererOption { .. })
    ));
}

/// Rendering a graph back to JSON Schema produces a schema document with
/// definitions for the named classes.
#[test]
fn samples_render_to_schema() {
    let mut input = InputData::new();
    input.add_sample_str("top", r#"{"user": {"id": 7}}"#).unwrap();
    let options = Options::new(Box::new(JsonSchemaTarget::new()), input);
    let results = run(options).unwrap();
    let text = results["stdout"].lines.join("\n");
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["$schema"], "http://json-schema.org/draft-06/schema#");
    assert!(value["definitions"]["user"].is_object());
    assert!(value["definitions"]["top"].is_object());
    assert_eq!(value["$ref"], "#/definitions/top");
}
