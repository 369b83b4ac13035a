//! Cloud Build Launcher CLI
//!
//! The `cloudbuild` command switches the git branch of several Cloud Build
//! targets and launches them in one go.
//!
//! ## Commands
//!
//! - `settings`: Manage organization, project, API token and target ids
//! - `targets`: List the project's build targets
//! - `projects`: List projects visible to the token
//! - `launch`: Adjust branch (optional) and launch the selected targets

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cloudbuild_core::{
    default_settings_path, target_ids, ApiOptions, BatchOrchestrator, BatchPlan, BatchReport,
    BatchRequest, CloudBuildApi, FailurePolicy, LauncherSettings,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "cloudbuild")]
#[command(author = "Cloud Build Launcher Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Switch branches and launch Cloud Build targets in batch", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (default: .cloudbuild/settings.toml)
    #[arg(long, global = true, env = "CLOUDBUILD_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage launcher settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// List build targets of the configured project
    Targets,

    /// List projects visible to the API token
    Projects,

    /// Adjust the branch of selected targets and launch their builds
    Launch {
        /// Target id to launch (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Launch every stored target
        #[arg(long, conflicts_with = "targets")]
        all: bool,

        /// Switch each target to this git branch before launching
        #[arg(short, long)]
        branch: Option<String>,

        /// Keep going with the next target when one fails
        #[arg(long)]
        continue_on_failure: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Create the settings file if it does not exist
    Init {
        /// Organization id
        #[arg(long)]
        org: Option<String>,
        /// Project id (like 1234abcd-12ab-12ab-12ab-123456abcdef)
        #[arg(long)]
        project: Option<String>,
        /// API token from the Cloud Build settings page
        #[arg(long)]
        token: Option<String>,
    },

    /// Show current settings (token masked)
    Show,

    /// Update organization, project or token
    Set {
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },

    /// Append a target id to the stored list
    AddTarget {
        /// Target id as shown in the config edit page URL
        id: String,
    },

    /// Remove a target id from the stored list
    RemoveTarget {
        id: String,
    },

    /// Replace the stored list with the targets that exist on the server
    SyncTargets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    cloudbuild_core::init_tracing(cli.json, level);

    let settings_path = cli.settings.unwrap_or_else(default_settings_path);

    match cli.command {
        Commands::Settings { action } => match action {
            SettingsAction::Init {
                org,
                project,
                token,
            } => cmd_settings_init(
                &settings_path,
                org.as_deref(),
                project.as_deref(),
                token.as_deref(),
            ),
            SettingsAction::Show => cmd_settings_show(&settings_path),
            SettingsAction::Set {
                org,
                project,
                token,
            } => cmd_settings_set(
                &settings_path,
                org.as_deref(),
                project.as_deref(),
                token.as_deref(),
            ),
            SettingsAction::AddTarget { id } => cmd_settings_add_target(&settings_path, &id),
            SettingsAction::RemoveTarget { id } => {
                cmd_settings_remove_target(&settings_path, &id)
            }
            SettingsAction::SyncTargets => cmd_settings_sync_targets(&settings_path).await,
        },
        Commands::Targets => cmd_targets(&settings_path).await,
        Commands::Projects => cmd_projects(&settings_path).await,
        Commands::Launch {
            targets,
            all,
            branch,
            continue_on_failure,
        } => {
            cmd_launch(
                &settings_path,
                targets,
                all,
                branch.as_deref(),
                continue_on_failure,
            )
            .await
        }
    }
}

// ========== Settings Commands ==========

fn load_settings(path: &Path) -> Result<LauncherSettings> {
    LauncherSettings::load_or_default(path)
        .context(format!("Failed to read settings from {:?}", path))
}

fn save_settings(settings: &LauncherSettings, path: &Path) -> Result<()> {
    settings
        .save(path)
        .context(format!("Failed to write settings to {:?}", path))
}

fn apply_fields(
    settings: &mut LauncherSettings,
    org: Option<&str>,
    project: Option<&str>,
    token: Option<&str>,
) {
    if let Some(org) = org {
        settings.org_id = org.trim().to_string();
    }
    if let Some(project) = project {
        settings.project_id = project.trim().to_string();
    }
    if let Some(token) = token {
        settings.api_token = token.trim().to_string();
    }
}

/// Create the settings file
fn cmd_settings_init(
    path: &Path,
    org: Option<&str>,
    project: Option<&str>,
    token: Option<&str>,
) -> Result<()> {
    if path.exists() {
        println!("Settings already exist at {:?}", path);
        return Ok(());
    }

    let mut settings = LauncherSettings::default();
    apply_fields(&mut settings, org, project, token);
    save_settings(&settings, path)?;

    println!("Created settings at {:?}", path);
    Ok(())
}

fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count == 0 {
        "(not set)".to_string()
    } else if count <= 4 {
        "****".to_string()
    } else {
        let tail: String = token.chars().skip(count - 4).collect();
        format!("****{}", tail)
    }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// Show current settings
fn cmd_settings_show(path: &Path) -> Result<()> {
    let settings = load_settings(path)?.with_env_overrides();

    println!("Settings file: {:?}", path);
    println!("Organization:  {}", or_unset(&settings.org_id));
    println!("Project:       {}", or_unset(&settings.project_id));
    println!("API token:     {}", mask_token(&settings.api_token));
    println!();

    if settings.target_configs.is_empty() {
        println!("No target configs. Add one with 'cloudbuild settings add-target <id>'.");
    } else {
        println!("Target configs:");
        for id in &settings.target_configs {
            println!("  {}", id);
        }
    }

    Ok(())
}

/// Update organization, project or token
fn cmd_settings_set(
    path: &Path,
    org: Option<&str>,
    project: Option<&str>,
    token: Option<&str>,
) -> Result<()> {
    if org.is_none() && project.is_none() && token.is_none() {
        bail!("Nothing to set; pass --org, --project or --token");
    }

    let mut settings = load_settings(path)?;
    apply_fields(&mut settings, org, project, token);
    save_settings(&settings, path)?;

    println!("Updated settings at {:?}", path);
    Ok(())
}

/// Append a target id
fn cmd_settings_add_target(path: &Path, id: &str) -> Result<()> {
    let mut settings = load_settings(path)?;
    if settings.add_target(id)? {
        save_settings(&settings, path)?;
        println!("Added target '{}'", id.trim());
    } else {
        println!("Target '{}' is already configured", id.trim());
    }
    Ok(())
}

/// Remove a target id
fn cmd_settings_remove_target(path: &Path, id: &str) -> Result<()> {
    let mut settings = load_settings(path)?;
    if settings.remove_target(id) {
        save_settings(&settings, path)?;
        println!("Removed target '{}'", id.trim());
    } else {
        println!("Target '{}' is not configured", id.trim());
    }
    Ok(())
}

/// Replace the stored target list with the server's
async fn cmd_settings_sync_targets(path: &Path) -> Result<()> {
    let mut settings = load_settings(path)?;
    let api = connect(&settings)?;

    let targets = api
        .list_build_targets()
        .await
        .context("Failed to list build targets")?;

    settings.replace_targets(target_ids(&targets));
    save_settings(&settings, path)?;

    println!("Stored {} target configs:", settings.target_configs.len());
    for id in &settings.target_configs {
        println!("  {}", id);
    }
    Ok(())
}

// ========== Remote Commands ==========

fn connect(settings: &LauncherSettings) -> Result<CloudBuildApi> {
    let endpoint = settings
        .clone()
        .with_env_overrides()
        .endpoint()
        .context("Settings are incomplete; run 'cloudbuild settings set'")?;
    CloudBuildApi::connect(endpoint, ApiOptions::from_env()).context("Failed to create API client")
}

/// List build targets
async fn cmd_targets(path: &Path) -> Result<()> {
    let settings = load_settings(path)?;
    let api = connect(&settings)?;

    let targets = api
        .list_build_targets()
        .await
        .context("Failed to list build targets")?;

    if targets.is_empty() {
        println!("No build targets found.");
        return Ok(());
    }

    for target in targets {
        let marker = if settings.target_configs.contains(&target.id) {
            "* "
        } else {
            "  "
        };
        println!("{}{} ({})", marker, target.id, target.name);
    }

    Ok(())
}

/// List projects
async fn cmd_projects(path: &Path) -> Result<()> {
    let settings = load_settings(path)?;
    let api = connect(&settings)?;

    let projects = api
        .list_projects()
        .await
        .context("Failed to list projects")?;

    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }

    for project in projects {
        println!(
            "{}  {}  (org: {} / {})",
            project.project_id, project.name, project.org_name, project.org_id
        );
    }

    Ok(())
}

fn build_request(
    settings: &LauncherSettings,
    targets: Vec<String>,
    all: bool,
    branch: Option<&str>,
    continue_on_failure: bool,
) -> BatchRequest {
    let selected = if all {
        settings.target_configs.clone()
    } else {
        targets
    };

    let mut request = BatchRequest::new(selected);
    if let Some(branch) = branch {
        request = request.with_branch(branch);
    }
    if continue_on_failure {
        request = request.with_policy(FailurePolicy::SkipTarget);
    }
    request
}

/// Plan the batch against the stored targets, refusing a plan with no steps.
fn plan_launch(settings: &LauncherSettings, request: &BatchRequest) -> Result<BatchPlan> {
    let plan = BatchPlan::build(&settings.target_configs, request).context("Nothing to launch")?;
    if plan.is_empty() {
        bail!("Nothing to launch: none of the selected targets is in the stored target configs");
    }
    Ok(plan)
}

fn print_report(report: &BatchReport) {
    print!("{}", report.text());
    for target in &report.skipped_targets {
        println!("skipped target:{}", target);
    }
}

/// Adjust and launch the selected targets
async fn cmd_launch(
    path: &Path,
    targets: Vec<String>,
    all: bool,
    branch: Option<&str>,
    continue_on_failure: bool,
) -> Result<()> {
    let settings = load_settings(path)?;
    let request = build_request(&settings, targets, all, branch, continue_on_failure);
    let plan = plan_launch(&settings, &request)?;

    for id in &request.selected {
        if !settings.target_configs.contains(id) {
            println!("Ignoring '{}': not in stored target configs", id);
        }
    }

    let api = connect(&settings)?;
    info!(batch_id = %plan.batch_id, steps = plan.steps.len(), "launching batch");
    let report = BatchOrchestrator::new(&api).execute(&plan).await?;

    print_report(&report);

    if !report.all_succeeded() {
        bail!(
            "{} step(s) failed; failed targets: {}",
            report.failed_steps,
            report.failed_targets.join(", ")
        );
    }
    Ok(())
}
