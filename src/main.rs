use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use text_patcher::config::{load_from_dir, load_from_path, ConfigError, PipelineConfig};
use text_patcher::{presets, Pipeline, RunOptions, RunReport, StepOutcome, WorkspaceGuard};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "text-patcher")]
#[command(about = "Apply ordered pattern-based edits to a text file", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StepSource {
    /// Step list file, or a directory of *.toml step lists
    #[arg(short, long, conflicts_with = "preset")]
    steps: Option<PathBuf>,

    /// Built-in preset to run
    #[arg(short, long)]
    preset: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply step lists to their target files
    Apply {
        /// File to rewrite, relative to the workspace (defaults to the step list's meta.target)
        target: Option<PathBuf>,

        #[command(flatten)]
        source: StepSource,

        /// Workspace root the target must stay inside (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print run reports as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },

    /// Report which steps would match, without writing
    Check {
        /// File to inspect, relative to the workspace (defaults to the step list's meta.target)
        target: Option<PathBuf>,

        #[command(flatten)]
        source: StepSource,

        /// Workspace root the target must stay inside (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Print run reports as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },

    /// List built-in presets and the steps of the selected step lists
    List {
        #[command(flatten)]
        source: StepSource,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            target,
            source,
            workspace,
            dry_run,
            diff,
            json,
        } => cmd_apply(target, &source, workspace, dry_run, diff, json),

        Commands::Check {
            target,
            source,
            workspace,
            json,
        } => cmd_apply(target, &source, workspace, true, false, json),

        Commands::List { source } => cmd_list(&source),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "text_patcher=info",
        _ => "text_patcher=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// A loaded step list and where it came from.
struct StepList {
    label: String,
    config: PipelineConfig,
}

fn step_lists_from(lists: Vec<(PathBuf, PipelineConfig)>) -> Vec<StepList> {
    lists
        .into_iter()
        .map(|(path, config)| StepList {
            label: path.display().to_string(),
            config,
        })
        .collect()
}

fn load_preset(name: &str) -> Result<StepList> {
    let Some(config) = presets::load(name) else {
        anyhow::bail!(
            "Unknown preset '{}'. Available: {}",
            name,
            presets::names().collect::<Vec<_>>().join(", ")
        );
    };
    Ok(StepList {
        label: format!("preset {name}"),
        config: config?,
    })
}

/// Resolve step lists
///
/// Priority order:
/// 1. --preset
/// 2. --steps (file, or directory of *.toml)
/// 3. ./patches/*.toml
/// 4. The default built-in preset
fn resolve_step_lists(source: &StepSource) -> Result<Vec<StepList>> {
    if let Some(name) = &source.preset {
        return Ok(vec![load_preset(name)?]);
    }

    if let Some(path) = &source.steps {
        if path.is_dir() {
            return Ok(step_lists_from(load_from_dir(path)?));
        }
        let config = load_from_path(path)?;
        return Ok(step_lists_from(vec![(path.clone(), config)]));
    }

    if let Ok(cwd) = env::current_dir() {
        let patches_dir = cwd.join("patches");
        if patches_dir.is_dir() {
            match load_from_dir(&patches_dir) {
                Ok(lists) => return Ok(step_lists_from(lists)),
                Err(ConfigError::NoStepFiles { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(vec![load_preset(presets::DEFAULT)?])
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. TEXT_PATCHER_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path);
    }

    if let Ok(env_path) = env::var("TEXT_PATCHER_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: TEXT_PATCHER_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

fn resolve_target(cli_target: Option<&Path>, list: &StepList) -> Result<PathBuf> {
    if let Some(target) = cli_target {
        return Ok(target.to_path_buf());
    }
    match &list.config.meta.target {
        Some(target) => Ok(PathBuf::from(target)),
        None => anyhow::bail!(
            "No target file given and {} does not set meta.target",
            list.label
        ),
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_step_lines(report: &RunReport, config: &PipelineConfig, dry_run: bool) {
    for (step, definition) in report.steps.iter().zip(&config.steps) {
        let label = match &definition.description {
            Some(description) => format!("{} {}", step.id, format!("({description})").dimmed()),
            None => step.id.clone(),
        };
        match step.outcome {
            StepOutcome::Applied { replacements } => {
                let verb = if dry_run { "Would apply" } else { "Applied" };
                println!(
                    "{} {}: {} ({} {})",
                    "✓".green(),
                    label,
                    verb,
                    replacements,
                    if replacements == 1 { "edit" } else { "edits" }
                );
            }
            StepOutcome::NoMatch => {
                println!("{} {}: No match, buffer unchanged", "⊙".yellow(), label);
            }
            StepOutcome::Guarded => {
                println!("{} {}: Guard text present, skipped", "⊘".cyan(), label);
            }
        }
    }
}

fn cmd_apply(
    target: Option<PathBuf>,
    source: &StepSource,
    workspace: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    // 1. Resolve workspace and step lists
    let workspace = resolve_workspace(workspace)?;
    let guard = WorkspaceGuard::new(&workspace)
        .with_context(|| format!("invalid workspace {}", workspace.display()))?;
    let step_lists = resolve_step_lists(source)?;

    if !json {
        println!("Workspace: {}", guard.workspace_root().display());
        println!();
    }

    let options = RunOptions {
        dry_run,
        guard: Some(guard.clone()),
    };

    let mut reports = Vec::new();
    let mut total_applied = 0;
    let mut total_unmatched = 0;
    let mut total_guarded = 0;

    // 2. Resolve targets and compile every step list before anything is written
    let mut planned = Vec::with_capacity(step_lists.len());
    for list in &step_lists {
        let target = guard.resolve(resolve_target(target.as_deref(), list)?);
        let pipeline = Pipeline::from_config(&list.config)
            .with_context(|| format!("failed to compile steps from {}", list.label))?;
        planned.push((list, target, pipeline));
    }

    // 3. Run each pipeline against its target
    for (list, target, pipeline) in planned {
        if !json {
            println!(
                "Running {} step(s) from {} on {}...",
                pipeline.steps().len(),
                list.label,
                target.display()
            );
            if dry_run {
                println!("{}", "  [DRY RUN - target will not be written]".cyan());
            }
        }

        let report = pipeline.run(&target, &options)?;

        for step in &report.steps {
            match step.outcome {
                StepOutcome::Applied { .. } => total_applied += 1,
                StepOutcome::NoMatch => total_unmatched += 1,
                StepOutcome::Guarded => total_guarded += 1,
            }
        }

        if !json {
            print_step_lines(&report, &list.config, dry_run);

            if show_diff && report.changed() {
                display_diff(&report.path, &report.original, &report.transformed);
            }

            if report.written {
                println!("Saved {}", report.path.display());
            } else if !report.changed() {
                println!("{}", "  No changes".dimmed());
            }
            println!();
        }

        reports.push(report);
    }

    // 4. Summary
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!("  {} no match", format!("{}", total_unmatched).yellow());
    println!("  {} guarded", format!("{}", total_guarded).cyan());

    Ok(())
}

fn cmd_list(source: &StepSource) -> Result<()> {
    println!("{}", "Built-in presets:".bold());
    for name in presets::names() {
        let marker = if name == presets::DEFAULT {
            " (default)"
        } else {
            ""
        };
        println!("  - {}{}", name, marker.dimmed());
    }
    println!();

    for list in resolve_step_lists(source)? {
        let meta = &list.config.meta;
        println!("{} {}", "Steps from".bold(), list.label);
        if let Some(description) = &meta.description {
            println!("  {}", description.dimmed());
        }
        if let Some(target) = &meta.target {
            println!("  Target: {}", target);
        }

        let steps = list.config.to_steps();
        for (index, (step, definition)) in steps.iter().zip(&list.config.steps).enumerate() {
            print!("  {:>2}. {} [{}]", index + 1, step.id, step.kind());
            if !definition.depends_on.is_empty() {
                print!(
                    " {}",
                    format!("after {}", definition.depends_on.join(", ")).dimmed()
                );
            }
            println!();
        }
        println!();
    }

    Ok(())
}
