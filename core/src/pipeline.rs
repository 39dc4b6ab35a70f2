//! # Pipeline driver
//!
//! Runs the ordered rewrite program over the initial graph:
//!
//! 1. build (inputs → builder, honoring the inference flags)
//! 2. remove forwarding intersections, if the builder created any
//! 3. schema-mode fixed point: resolve intersections / strict-flatten
//!    unions until both report done
//! 4. replace object types the target cannot express
//! 5. flatten unions to a fixed point
//! 6. combine classes (cleanup run only when the first one changed
//!    something)
//! 7. infer maps to a fixed point
//! 8. expand strings into enums per policy
//! 9. one flatten, asserted done (expansion never nests unions)
//! 10. flatten string unions (schema-mode)
//! 11. none → any
//! 12. optional → nullable, when the target has no optional properties
//! 13. local rewrites to a fixed point
//! 14. insert string transformations
//! 15. one flatten, asserted done
//! 16. garbage collect
//! 17. gather names
//!
//! The self-check failures in steps 3, 9 and 15 signal bugs in the
//! pipeline itself and surface as structural-invariant errors.

use std::time::Instant;

use crate::{
    builder::TypeBuilder,
    error::{Error, Result},
    input::{InferenceFlags, InputData},
    language::TargetLanguage,
    names::{NameSupply, Names, gather_names},
    passes,
    type_graph::TypeGraph,
};

/// User flags consumed by the driver. Defaults follow the option table.
#[derive(Debug, Clone)]
pub struct PipelineFlags {
    pub combine_classes: bool,
    pub infer_maps: bool,
    pub infer_enums: bool,
    pub infer_dates: bool,
    pub infer_integer_strings: bool,
    pub alphabetize_properties: bool,
    pub all_properties_optional: bool,
    pub fixed_top_levels: bool,
    pub debug_print_graph: bool,
    pub debug_print_times: bool,
    pub check_provenance: bool,
}

impl Default for PipelineFlags {
    fn default() -> Self {
        PipelineFlags {
            combine_classes: true,
            infer_maps: true,
            infer_enums: true,
            infer_dates: true,
            infer_integer_strings: true,
            alphabetize_properties: false,
            all_properties_optional: false,
            fixed_top_levels: false,
            debug_print_graph: false,
            debug_print_times: false,
            check_provenance: false,
        }
    }
}

struct Timer {
    enabled: bool,
    last: Instant,
}

impl Timer {
    fn new(enabled: bool) -> Self {
        Timer {
            enabled,
            last: Instant::now(),
        }
    }

    fn mark(&mut self, pass: &str) {
        if self.enabled {
            let now = Instant::now();
            tracing::info!(
                pass,
                elapsed_ms = (now - self.last).as_millis() as u64,
                "pass finished"
            );
            self.last = now;
        }
    }
}

/// Build the initial graph and drive it to its canonical form.
pub fn make_graph(
    input: &InputData,
    language: &TargetLanguage,
    flags: &PipelineFlags,
    supply: &mut NameSupply,
) -> Result<(TypeGraph, Names)> {
    let schema_mode = input.need_schema_processing();
    let mut timer = Timer::new(flags.debug_print_times);

    // 1. build
    let mut builder = TypeBuilder::new(language.string_type_mapping.clone());
    let inference = InferenceFlags {
        infer_enums: flags.infer_enums,
        infer_dates: flags.infer_dates,
        infer_integer_strings: flags.infer_integer_strings,
        all_properties_optional: flags.all_properties_optional,
        fixed_top_levels: flags.fixed_top_levels,
    };
    input.add_types(&mut builder, &inference)?;
    let forwarders = builder.did_add_forwarding_intersection();
    let mut graph = builder.finish()?;
    timer.mark("build");

    if flags.debug_print_graph {
        tracing::debug!(graph = %graph, "initial graph");
    }

    // 2. forwarder cleanup
    if forwarders {
        graph = passes::remove_indirection_intersections(graph)?;
        timer.mark("remove-indirection-intersections");
    }

    // 3. schema-mode fixed point
    if schema_mode {
        let mut intersections_done = false;
        let mut unions_done = false;
        while !(intersections_done && unions_done) {
            let mut changed = false;
            if !intersections_done {
                let (next, done) = passes::resolve_intersections(graph)?;
                graph = next;
                changed |= !done;
                intersections_done = done;
            }
            if !unions_done {
                let (next, done) = passes::flatten_unions(
                    graph,
                    true,
                    language.supports_unions_with_both_number_types,
                )?;
                graph = next;
                changed |= !done;
                unions_done = done;
            }
            if !changed && !(intersections_done && unions_done) {
                return Err(Error::structural(
                    "intersection/union fixed point made no progress",
                ));
            }
        }
        timer.mark("resolve-intersections");
    }

    // 4. object types
    let (next, _) = passes::replace_object_type(graph, language.supports_full_object_type)?;
    graph = next;
    timer.mark("replace-object-type");

    // 5. flatten to fixed point
    loop {
        let (next, done) = passes::flatten_unions(
            graph,
            false,
            language.supports_unions_with_both_number_types,
        )?;
        graph = next;
        if done {
            break;
        }
    }
    timer.mark("flatten-unions");

    // 6. combine classes, cleanup only after a change
    if flags.combine_classes {
        let (next, changed) =
            passes::combine_classes(graph, flags.alphabetize_properties, true, false)?;
        graph = next;
        if changed {
            let (next, _) =
                passes::combine_classes(graph, flags.alphabetize_properties, false, true)?;
            graph = next;
        }
        timer.mark("combine-classes");
    }

    // 7. map inference to fixed point
    if flags.infer_maps {
        loop {
            let (next, changed) = passes::infer_maps(graph)?;
            graph = next;
            if !changed {
                break;
            }
        }
        timer.mark("infer-maps");
    }

    // 8. enum expansion
    let policy = match (schema_mode, flags.infer_enums) {
        (true, _) => passes::ExpandStringsPolicy::All,
        (false, true) => passes::ExpandStringsPolicy::Infer,
        (false, false) => passes::ExpandStringsPolicy::Never,
    };
    let (next, _) = passes::expand_strings(graph, policy)?;
    graph = next;
    timer.mark("expand-strings");

    // 9. expansion must not have nested unions
    let (next, done) = passes::flatten_unions(
        graph,
        false,
        language.supports_unions_with_both_number_types,
    )?;
    graph = next;
    if !done {
        return Err(Error::structural(
            "string expansion re-introduced union work",
        ));
    }

    // 10. string union collapse
    if schema_mode {
        let (next, _) = passes::flatten_strings(graph)?;
        graph = next;
        timer.mark("flatten-strings");
    }

    // 11. no `none` past this point
    let (next, _) = passes::none_to_any(graph)?;
    graph = next;
    timer.mark("none-to-any");

    // 12. optionality lowering
    if !language.supports_optional_class_properties {
        let (next, _) = passes::optional_to_nullable(graph)?;
        graph = next;
        timer.mark("optional-to-nullable");
    }

    // 13. local rewrites
    graph = passes::rewrite_fixed_point(graph)?;
    timer.mark("rewrite-fixed-point");

    // 14. transformations
    let (next, _) = passes::make_transformations(graph)?;
    graph = next;
    timer.mark("make-transformations");

    // 15. transformations must not have nested unions either
    let (next, done) = passes::flatten_unions(
        graph,
        false,
        language.supports_unions_with_both_number_types,
    )?;
    graph = next;
    if !done {
        return Err(Error::structural(
            "transformation insertion re-introduced union work",
        ));
    }

    // 16. sweep
    graph = passes::garbage_collect(graph, flags.alphabetize_properties)?;
    timer.mark("garbage-collect");

    if flags.check_provenance {
        for (type_ref, _) in graph.iter_reachable() {
            if graph.attributes(type_ref).provenance.is_empty() {
                tracing::warn!(type_ref, "type without provenance");
            }
        }
    }

    if flags.debug_print_graph {
        tracing::debug!(graph = %graph, "final graph");
    }

    // 17. names
    let names = gather_names(&graph, !schema_mode, supply);
    timer.mark("gather-names");

    Ok((graph, names))
}
