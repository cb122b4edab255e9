//! Source ingestion: everything the generation layer receives.

use crate::config::{PipelineConfig, Scope, SourcePaths};
use crate::error::ParseError;
use crate::overlay::{OverlayAssembler, ResolvedOverlays};
use crate::process::Process;
use crate::script::TestScript;
use crate::{bpmn, tosca};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSources {
    pub tosca_scripts: Vec<TestScript>,
    pub bpmn_processes: Vec<Process>,
}

/// Parses every configured script and process. Paths that do not exist are
/// skipped with a warning; any other failure aborts.
pub fn parse_sources(paths: &SourcePaths) -> Result<ParsedSources, ParseError> {
    let mut parsed = ParsedSources::default();

    for path in existing(&paths.tosca, "Tosca") {
        let script = tosca::parse(path)?;
        tracing::info!(
            name = %script.name,
            steps = script.steps.len(),
            site_specific = script.site_specific_steps().len(),
            "parsed Tosca script"
        );
        parsed.tosca_scripts.push(script);
    }

    for path in existing(&paths.bpmn, "BPMN") {
        let process = bpmn::parse(path)?;
        tracing::info!(
            name = %process.name,
            tasks = process.tasks.len(),
            roles = process.participants.len(),
            decisions = process.decision_points().len(),
            "parsed BPMN process"
        );
        parsed.bpmn_processes.push(process);
    }

    Ok(parsed)
}

fn existing<'a>(paths: &'a [PathBuf], kind: &'static str) -> impl Iterator<Item = &'a Path> + 'a {
    paths.iter().map(PathBuf::as_path).filter(move |path| {
        let found = path.exists();
        if !found {
            tracing::warn!(kind, path = %path.display(), "source file not found, skipping");
        }
        found
    })
}

pub fn load_overlays(paths: &[PathBuf], role: &str) -> Result<ResolvedOverlays, ParseError> {
    if paths.is_empty() {
        tracing::warn!("no overlay files configured");
        return Ok(ResolvedOverlays::default());
    }
    let mut assembler = OverlayAssembler::new();
    assembler.load(paths)?;
    Ok(assembler.resolve(role))
}

/// Parsed sources plus resolved overlays, ready to hand to a generator.
#[derive(Debug, Clone, Serialize)]
pub struct DryRun {
    pub generated_at: String,
    pub scope: Scope,
    pub sources: ParsedSources,
    pub overlay: ResolvedOverlays,
}

pub fn dry_run(config: &PipelineConfig) -> Result<DryRun, ParseError> {
    let paths = config.resolve_sources();
    let sources = parse_sources(&paths)?;
    let overlay = load_overlays(&paths.overlay, &config.scope.role)?;

    Ok(DryRun {
        generated_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        scope: config.scope.clone(),
        sources,
        overlay,
    })
}
