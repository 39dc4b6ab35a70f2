//! # Driver entry
//!
//! [`run`] takes the configured options, builds and canonicalizes the
//! type graph, and hands it to the target's renderer. The result maps
//! output filenames to [`RenderResult`]s; [`concatenate`] folds a
//! multi-file result into one.
//!
//! Two shortcuts skip the pipeline entirely: the *schema passthrough*
//! (the target is the schema target and the whole input is one schema
//! document, which is just pretty-printed), and `no_render` (the graph is
//! built, then a placeholder is returned without invoking the renderer).

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::Result,
    input::InputData,
    language::Target,
    names::NameSupply,
    pipeline::{self, PipelineFlags},
};

/// A position in rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// A half-open range in rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub annotation: String,
    pub span: Span,
}

/// One rendered output file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub lines: Vec<String>,
    pub annotations: Vec<Annotation>,
}

impl RenderResult {
    /// Split text into lines with a terminating empty line.
    pub fn from_text(text: &str) -> Self {
        let mut lines: Vec<String> = text.lines().map(|line| line.to_string()).collect();
        lines.push(String::new());
        RenderResult {
            lines,
            annotations: vec![],
        }
    }
}

/// Options forwarded to a renderer.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub output_filename: String,
    pub leading_comments: Vec<String>,
    pub indentation: Option<String>,
    pub renderer_options: BTreeMap<String, String>,
}

/// Everything one run needs. Field defaults follow the CLI defaults.
pub struct Options {
    pub target: Box<dyn Target>,
    pub input: InputData,
    pub combine_classes: bool,
    pub infer_maps: bool,
    pub infer_enums: bool,
    pub infer_dates: bool,
    pub infer_integer_strings: bool,
    pub alphabetize_properties: bool,
    pub all_properties_optional: bool,
    pub fixed_top_levels: bool,
    pub no_render: bool,
    pub output_filename: String,
    pub leading_comments: Vec<String>,
    pub renderer_options: BTreeMap<String, String>,
    pub indentation: Option<String>,
    pub debug_print_graph: bool,
    pub debug_print_times: bool,
    pub check_provenance: bool,
}

impl Options {
    pub fn new(target: Box<dyn Target>, input: InputData) -> Self {
        Options {
            target,
            input,
            combine_classes: true,
            infer_maps: true,
            infer_enums: true,
            infer_dates: true,
            infer_integer_strings: true,
            alphabetize_properties: false,
            all_properties_optional: false,
            fixed_top_levels: false,
            no_render: false,
            output_filename: "stdout".to_string(),
            leading_comments: vec![],
            renderer_options: BTreeMap::new(),
            indentation: None,
            debug_print_graph: false,
            debug_print_times: false,
            check_provenance: false,
        }
    }
}

pub fn run(options: Options) -> Result<IndexMap<String, RenderResult>> {
    let Options {
        target,
        mut input,
        combine_classes,
        infer_maps,
        infer_enums,
        infer_dates,
        infer_integer_strings,
        alphabetize_properties,
        all_properties_optional,
        fixed_top_levels,
        no_render,
        output_filename,
        leading_comments,
        renderer_options,
        indentation,
        debug_print_graph,
        debug_print_times,
        check_provenance,
    } = options;

    input.finish_adding_inputs();

    // fast path: schema in, schema out, nothing to infer
    if target.language().is_schema() && !input.need_ir() {
        if let Some(raw) = input.single_string_schema_source() {
            let value: Value = serde_json::from_str(raw)?;
            let pretty = to_pretty_json(&value)?;
            let mut results = IndexMap::new();
            results.insert(output_filename, RenderResult::from_text(&pretty));
            return Ok(results);
        }
    }

    let flags = PipelineFlags {
        combine_classes,
        infer_maps,
        infer_enums,
        infer_dates,
        infer_integer_strings,
        alphabetize_properties,
        all_properties_optional,
        fixed_top_levels,
        debug_print_graph,
        debug_print_times,
        check_provenance,
    };
    let mut supply = NameSupply::new();
    let (graph, names) = pipeline::make_graph(&input, target.language(), &flags, &mut supply)?;

    if no_render {
        let mut results = IndexMap::new();
        results.insert(output_filename, RenderResult {
            lines: vec!["// rendering skipped".to_string(), String::new()],
            annotations: vec![],
        });
        return Ok(results);
    }

    let render_options = RenderOptions {
        output_filename,
        leading_comments,
        indentation,
        renderer_options,
    };
    target.render(&graph, &names, &render_options)
}

/// Concatenate a multi-file result: each file prefixed with a
/// `// <filename>` comment and an empty line, annotation spans shifted by
/// the cumulative line offset.
pub fn concatenate(results: &IndexMap<String, RenderResult>) -> RenderResult {
    let mut lines = vec![];
    let mut annotations = vec![];
    for (filename, result) in results {
        let offset = lines.len() + 2;
        lines.push(format!("// {}", filename));
        lines.push(String::new());
        lines.extend(result.lines.iter().cloned());
        annotations.extend(result.annotations.iter().map(|a| Annotation {
            annotation: a.annotation.clone(),
            span: Span {
                start: Location {
                    line: a.span.start.line + offset,
                    column: a.span.start.column,
                },
                end: Location {
                    line: a.span.end.line + offset,
                    column: a.span.end.column,
                },
            },
        }));
    }
    RenderResult { lines, annotations }
}

/// Pretty-print with four-space indentation.
pub(crate) fn to_pretty_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf).unwrap_or_default())
}
