use anyhow::Context;
use clap::{Parser, Subcommand};
use opal_core::{bpmn, tosca, DryRun, OverlayAssembler, PipelineConfig, Variation};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Inspect process diagrams, test scripts and Opal site overlays"
)]
struct OpalCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a BPMN 2.0 process diagram and print its execution order
    Bpmn {
        /// Path to the BPMN XML file
        input: PathBuf,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Parse a Tosca test script and print its steps
    Tosca {
        /// Path to the Tosca XML file
        input: PathBuf,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Load one or more overlay files and print the resolved rules
    Overlay {
        /// Overlay YAML files, later files replace the site block
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Target role (accepted, not yet used for filtering)
        #[arg(long, default_value = "")]
        role: String,
        /// Only show the rules for this transaction code
        #[arg(long)]
        transaction: Option<String>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Parse every configured source and resolve overlays, without generating content
    Run {
        /// Pipeline configuration file
        #[arg(long, short, default_value = "config.yaml")]
        config: PathBuf,
        /// Output the full hand-off bundle as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = OpalCli::parse();

    match cli.command {
        Command::Bpmn { input, json } => {
            let process = bpmn::parse(&input)
                .with_context(|| format!("failed to parse BPMN {}", input.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&process)?);
            } else {
                print!("{}", process.summary());
            }
        }
        Command::Tosca { input, json } => {
            let script = tosca::parse(&input)
                .with_context(|| format!("failed to parse Tosca script {}", input.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&script)?);
            } else {
                print!("{}", script.summary());
            }
        }
        Command::Overlay {
            inputs,
            role,
            transaction,
            json,
        } => {
            let mut assembler = OverlayAssembler::new();
            let loaded = assembler.load(&inputs).context("failed to load overlays")?;
            if loaded == 0 {
                anyhow::bail!("none of the overlay files exist");
            }
            match transaction {
                Some(code) => output_transaction(&assembler, &code, json)?,
                None if json => {
                    println!("{}", serde_json::to_string_pretty(&assembler.resolve(&role))?);
                }
                None => print!("{}", assembler.summary()),
            }
        }
        Command::Run { config, json } => {
            let pipeline = load_config(&config)?;
            let bundle = opal_core::dry_run(&pipeline).context("dry run failed")?;
            output_run(&bundle, json)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("OPAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    PipelineConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

fn output_transaction(assembler: &OverlayAssembler, code: &str, json: bool) -> anyhow::Result<()> {
    let variations = assembler.get_overlays_for_transaction(code);
    let constraints = assembler.get_field_constraints(code);
    let gates = assembler.get_process_gates(code);
    let approvals = assembler.get_approval_rules(code);

    if json {
        let payload = json!({
            "transaction": code,
            "variations": variations,
            "field_constraints": constraints,
            "process_gates": gates,
            "approval_rules": approvals,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("Transaction {code}: {} variations", variations.len());
    print_variations("Field constraints", &constraints, |v| {
        v.field.as_ref().map(display_value).unwrap_or_default()
    });
    print_variations("Process gates", &gates, |v| {
        v.step.as_ref().map(display_value).unwrap_or_default()
    });
    print_variations("Approval rules", &approvals, |v| {
        let tiers = v.tiers.as_ref().and_then(Value::as_array).map(Vec::len).unwrap_or(0);
        format!("{tiers} tiers")
    });
    Ok(())
}

fn print_variations(title: &str, variations: &[&Variation], label: impl Fn(&Variation) -> String) {
    if variations.is_empty() {
        return;
    }
    println!("\n{title}:");
    for variation in variations {
        println!(
            "  - {}: {} -> {} ({})",
            label(variation),
            display_value(&variation.enterprise_default),
            display_value(&variation.site_override),
            variation.reason
        );
    }
}

fn output_run(bundle: &DryRun, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(bundle)?);
        return Ok(());
    }

    let scope = &bundle.scope;
    println!("Company: {}", scope.company);
    println!("Site: {} ({})", scope.site, scope.site_code);
    println!("Role: {}", scope.role);
    println!("Process: {}", scope.process);

    println!("\nTosca scripts:");
    for script in &bundle.sources.tosca_scripts {
        println!(
            "  - {}: {} steps, {} site-specific",
            script.name,
            script.steps.len(),
            script.site_specific_steps().len()
        );
    }
    println!("\nBPMN processes:");
    for process in &bundle.sources.bpmn_processes {
        println!(
            "  - {}: {} tasks, {} roles, {} decisions",
            process.name,
            process.tasks.len(),
            process.roles().len(),
            process.decision_points().len()
        );
    }

    let overlay = &bundle.overlay;
    let variations: usize = overlay
        .overlays
        .iter()
        .map(|rule| rule.variations.len())
        .sum();
    println!(
        "\nOverlays: {} rules, {} variations (site: {})",
        overlay.overlays.len(),
        variations,
        overlay.site.name.as_deref().unwrap_or("Unknown")
    );
    println!("\nDry run complete, generated at {}", bundle.generated_at);
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
