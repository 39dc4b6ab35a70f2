use std::{
    error::Error,
    fs,
    io::{Write, stdout},
    path::PathBuf,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use typelift::{
    input::InputData,
    language::{JsonSchemaTarget, Target},
    run::{Options, concatenate, run},
};
use typelift_rust::RustTarget;

#[derive(Parser, Debug)]
struct TypeLift {
    /// input json filepath (samples, or a schema with --schema)
    #[arg(short, long)]
    filepath: PathBuf,

    /// output language
    #[arg(long)]
    lang: String,

    /// treat the input as a JSON Schema document
    #[arg(long)]
    schema: bool,

    /// top-level type name; defaults to the input file stem
    #[arg(long)]
    top_level: Option<String>,

    /// Optional output file; if omitted, prints to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    no_combine_classes: bool,

    #[arg(long)]
    no_maps: bool,

    #[arg(long)]
    no_enums: bool,

    #[arg(long)]
    no_dates: bool,

    #[arg(long)]
    no_integer_strings: bool,

    #[arg(long)]
    alphabetize_properties: bool,

    #[arg(long)]
    all_properties_optional: bool,

    #[arg(long)]
    fixed_top_levels: bool,

    #[arg(long)]
    no_render: bool,

    #[arg(long, env("TYPELIFT_DEBUG_GRAPH"))]
    debug_print_graph: bool,

    #[arg(long, env("TYPELIFT_DEBUG_TIMES"))]
    debug_print_times: bool,
}

fn target(lang: &str) -> Result<Box<dyn Target>, typelift::Error> {
    let known: Vec<Box<dyn Target>> =
        vec![Box::new(JsonSchemaTarget::new()), Box::new(RustTarget::new())];
    for candidate in known {
        if candidate.language().names.contains(&lang) {
            return Ok(candidate);
        }
    }
    Err(typelift::Error::UnknownOutputLanguage(lang.to_string()))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env(/* RUST_LOG env var sets logging level */))
        .with_writer(std::io::stderr)
        .init();

    let args = TypeLift::parse();

    let top_level = args
        .top_level
        .or_else(|| {
            args.filepath
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "top-level".to_string());

    let text = fs::read_to_string(&args.filepath)?;
    let mut input = InputData::new();
    match args.schema {
        true => input.add_schema(&top_level, text)?,
        false => input.add_sample_str(&top_level, &text)?,
    }
    input.finish_adding_inputs();

    let mut options = Options::new(target(&args.lang)?, input);
    options.combine_classes = !args.no_combine_classes;
    options.infer_maps = !args.no_maps;
    options.infer_enums = !args.no_enums;
    options.infer_dates = !args.no_dates;
    options.infer_integer_strings = !args.no_integer_strings;
    options.alphabetize_properties = args.alphabetize_properties;
    options.all_properties_optional = args.all_properties_optional;
    options.fixed_top_levels = args.fixed_top_levels;
    options.no_render = args.no_render;
    options.debug_print_graph = args.debug_print_graph;
    options.debug_print_times = args.debug_print_times;
    if let Some(output) = &args.output {
        options.output_filename = output.to_string_lossy().into_owned();
    }

    let results = run(options)?;
    tracing::debug!(files = results.len(), "render complete");
    let combined = match results.len() {
        1 => results.into_iter().next().map(|(_, result)| result),
        _ => Some(concatenate(&results)),
    };

    let mut out: Box<dyn Write> = match args.output {
        Some(output_filepath) => Box::new(fs::File::create(output_filepath)?),
        None => Box::new(stdout().lock()),
    };
    if let Some(result) = combined {
        for line in result.lines {
            writeln!(out, "{}", line)?;
        }
    }

    Ok(())
}
