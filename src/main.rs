//! build-chain - Cross-repository build orchestrator
//!
//! CLI entry point: `build <flow>` commands run a flow end to end,
//! `tools` hosts the auxiliary project-list, plan and resume commands.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use build_chain::checkout::{CliGit, DryRunGit, ForgeClient, Git, GithubClient};
use build_chain::config::{FlowType, RunConfig};
use build_chain::definition::read_definition;
use build_chain::error::ChainError;
use build_chain::flow::FlowRunner;
use build_chain::state;
use build_chain::summary::{print_project_list, print_summary};
use build_chain::Chain;

/// Cross-repository build orchestrator
///
/// Checks out a chain of interdependent repositories around a starting
/// project and builds them in dependency-respecting parallel batches.
#[derive(Parser, Debug)]
#[command(name = "build-chain", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a build flow
    #[command(subcommand)]
    Build(BuildFlow),
    /// Auxiliary tools operating on a definition or a previous run
    #[command(subcommand)]
    Tools(Tool),
}

#[derive(Subcommand, Debug)]
enum BuildFlow {
    /// Pull request flow: starter plus its transitive upstream
    CrossPr(BuildArgs),
    /// Push flow: starter plus upstream and the whole downstream tree
    FullDownstream(BuildArgs),
    /// Single-repository pull request flow: starter only
    SinglePr(BuildArgs),
    /// Manual branch build
    Branch {
        #[command(flatten)]
        args: BuildArgs,
        /// Also build the starter's transitive downstream tree
        #[arg(long)]
        full_project_dependency_tree: bool,
    },
}

#[derive(Subcommand, Debug)]
enum Tool {
    /// Print the resolved chain for a flow without running anything
    ProjectList(BuildArgs),
    /// Dry-run a cross-pr flow, printing the planned actions
    Plan(BuildArgs),
    /// Resume an interrupted run from its state snapshot
    Resume {
        /// Working folder holding the state snapshot
        #[arg(long, default_value = ".")]
        root_folder: PathBuf,
        /// Forge API token (defaults to GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
}

/// Arguments shared by every flow command.
#[derive(Args, Debug)]
struct BuildArgs {
    /// Path to the dependency definition file
    #[arg(short = 'f', long)]
    definition_file: PathBuf,

    /// Project id anchoring the run, e.g. kiegroup/drools
    #[arg(short = 'p', long)]
    starting_project: String,

    /// Account the triggering change comes from (defaults to the starter's group)
    #[arg(long)]
    source_group: Option<String>,

    /// Branch the triggering change lives on (defaults to the target branch)
    #[arg(long)]
    source_branch: Option<String>,

    /// Branch the triggering change targets
    #[arg(long, default_value = "main")]
    target_branch: String,

    /// Working folder for checkouts, artifacts and the state file
    #[arg(long, default_value = ".")]
    root_folder: PathBuf,

    /// Record failures and keep scheduling instead of stopping at the first failed batch
    #[arg(long)]
    fail_at_end: bool,

    /// One node per batch, in chain order
    #[arg(long)]
    sequential: bool,

    /// Record every command as SKIP without invoking anything
    #[arg(long)]
    skip_execution: bool,

    /// Record this project's commands as SKIP (repeatable)
    #[arg(long = "skip-project-execution")]
    skip_project_execution: Vec<String>,

    /// Skip checkout for every node
    #[arg(long)]
    skip_checkout: bool,

    /// Skip checkout for this project (repeatable)
    #[arg(long = "skip-project-checkout")]
    skip_project_checkout: Vec<String>,

    /// Command treatment `pattern||replacement` expression (repeatable)
    #[arg(short = 't', long = "replace-expression")]
    replace_expressions: Vec<String>,

    /// Forge API token (defaults to GITHUB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Base URL repositories are cloned from
    #[arg(long, default_value = "https://github.com")]
    forge_url: String,

    /// Base URL for fork and pull-request lookups
    #[arg(long, default_value = "https://api.github.com")]
    forge_api_url: String,
}

impl BuildArgs {
    /// Resolve the run configuration, applying source fallbacks.
    fn to_config(&self, flow_type: FlowType, full_project_dependency_tree: bool) -> RunConfig {
        let source_group = self
            .source_group
            .clone()
            .unwrap_or_else(|| starter_group(&self.starting_project));
        let source_branch = self
            .source_branch
            .clone()
            .unwrap_or_else(|| self.target_branch.clone());

        RunConfig {
            flow_type,
            starting_project: self.starting_project.clone(),
            source_group,
            source_branch,
            target_branch: self.target_branch.clone(),
            root_folder: self.root_folder.clone(),
            fail_at_end: self.fail_at_end,
            sequential: self.sequential,
            skip_execution: self.skip_execution,
            skip_project_execution: self.skip_project_execution.clone(),
            skip_checkout: self.skip_checkout,
            skip_project_checkout: self.skip_project_checkout.clone(),
            replace_expressions: self.replace_expressions.clone(),
            full_project_dependency_tree,
            forge_url: self.forge_url.clone(),
            forge_api_url: self.forge_api_url.clone(),
            dry_run: false,
        }
    }

    fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}

/// The group part of a `group/name` project id.
fn starter_group(project: &str) -> String {
    project
        .split_once('/')
        .map_or(project, |(group, _)| group)
        .to_string()
}

/// Load the definition and cut it down to the flow's chain shape.
///
/// Definition problems are configuration errors so the process exits with
/// the dedicated code.
fn load_chain(config: &RunConfig, definition_file: &Path) -> Result<Chain> {
    let nodes = read_definition(definition_file)
        .map_err(|e| ChainError::Configuration(format!("{e:#}")))?;
    let chain = Chain::new(nodes).subset(
        &config.starting_project,
        config.flow_type.includes_upstream(),
        config
            .flow_type
            .includes_downstream(config.full_project_dependency_tree),
    )?;
    Ok(chain)
}

/// Run a flow end to end and turn the result into an exit code.
async fn run_flow(config: RunConfig, chain: Chain, token: Option<String>) -> Result<i32> {
    // Dry runs stub git and command execution only; fork/PR lookups stay
    // live so the printed plan matches the decisions a real run would take.
    let forge: Arc<dyn ForgeClient> =
        Arc::new(GithubClient::new(&config.forge_api_url, token)?);
    let git: Arc<dyn Git> = if config.dry_run {
        Arc::new(DryRunGit)
    } else {
        Arc::new(CliGit)
    };

    eprintln!(
        "{} {} flow for {}",
        "===".bold().cyan(),
        config.flow_type.label(),
        config.starting_project.bold()
    );

    let runner = FlowRunner::new(config, chain, forge, git);
    let result = runner.run(None).await?;
    print_summary(&result);
    Ok(i32::from(!result.success()))
}

async fn run_build(args: &BuildArgs, flow_type: FlowType, full_tree: bool) -> Result<i32> {
    let config = args.to_config(flow_type, full_tree);
    let chain = load_chain(&config, &args.definition_file)?;
    let token = args.resolved_token();
    run_flow(config, chain, token).await
}

async fn run_tool(tool: Tool) -> Result<i32> {
    match tool {
        Tool::ProjectList(args) => {
            let config = args.to_config(FlowType::CrossPullRequest, false);
            let chain = load_chain(&config, &args.definition_file)?;
            let starter_index = chain.starter_index(&config.starting_project)?;
            print_project_list(&chain, starter_index);
            Ok(0)
        }
        Tool::Plan(args) => {
            let mut config = args.to_config(FlowType::CrossPullRequest, false);
            config.dry_run = true;
            let chain = load_chain(&config, &args.definition_file)?;
            let token = args.resolved_token();
            run_flow(config, chain, token).await
        }
        Tool::Resume { root_folder, token } => {
            let snapshot = state::load(&root_folder)?;
            let (config, chain, prior) = snapshot.into_parts();
            let token = token.or_else(|| std::env::var("GITHUB_TOKEN").ok());

            eprintln!(
                "{} resuming {} flow for {}",
                "===".bold().cyan(),
                config.flow_type.label(),
                config.starting_project.bold()
            );

            let forge: Arc<dyn ForgeClient> =
                Arc::new(GithubClient::new(&config.forge_api_url, token)?);
            let runner = FlowRunner::new(config, chain, forge, Arc::new(CliGit));
            let result = runner.run(Some(&prior)).await?;
            print_summary(&result);
            Ok(i32::from(!result.success()))
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Build(flow) => match flow {
            BuildFlow::CrossPr(args) => run_build(&args, FlowType::CrossPullRequest, false).await,
            BuildFlow::FullDownstream(args) => {
                run_build(&args, FlowType::FullDownstream, false).await
            }
            BuildFlow::SinglePr(args) => {
                run_build(&args, FlowType::SinglePullRequest, false).await
            }
            BuildFlow::Branch {
                args,
                full_project_dependency_tree,
            } => {
                run_build(&args, FlowType::Branch, full_project_dependency_tree).await
            }
        },
        Command::Tools(tool) => run_tool(tool).await,
    }
}

/// Map an error to the process exit code: configuration problems get their
/// own code so CI can tell them from build failures.
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if error
        .downcast_ref::<ChainError>()
        .is_some_and(ChainError::is_configuration)
    {
        2
    } else {
        1
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await.context("build-chain failed") {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            std::process::exit(exit_code_for(&error));
        }
    }
}
