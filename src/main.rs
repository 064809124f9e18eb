use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing_subscriber::EnvFilter;

use vigil_core::VigilConfig;
use vigil_difflens::filter::FileFilter;
use vigil_review::github::{OctocrabHost, PullRequestId};
use vigil_review::llm::LlmClient;
use vigil_review::orchestrator::ReviewOrchestrator;

const CONFIG_FILE: &str = ".vigil.toml";

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Bounded, incremental AI reviews for GitHub pull requests",
    long_about = "Vigil reviews the files changed in a pull request with an LLM, posts\n\
                   line-anchored comments, and finishes with a summary comment. Later runs\n\
                   only review commits pushed since the last summary.\n\n\
                   Examples:\n  \
                     vigil review --pr owner/repo#42           Review and post comments\n  \
                     vigil review --pr owner/repo#42 --dry-run Log what would be posted\n  \
                     vigil plan --pr owner/repo#42             Show which files would be reviewed\n  \
                     vigil init                                Write a default .vigil.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .vigil.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request and post comments
    #[command(long_about = "Review a pull request and post comments.\n\n\
        Resolves the commit range (incremental when an earlier summary exists),\n\
        filters the changed files, analyses each one with the configured LLM and\n\
        posts line comments plus one summary comment.\n\n\
        Examples:\n  vigil review --pr owner/repo#123\n  vigil review --pr owner/repo#123 --exclude-ext .lock,.snap --fail-on-error")]
    Review {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        filters: FilterArgs,
        /// Per-file analysis step limit
        #[arg(long)]
        max_steps_per_file: Option<u32>,
        /// Analysis step limit for the whole run
        #[arg(long)]
        max_total_steps: Option<u32>,
        /// Exit non-zero when the review fails
        #[arg(
            long,
            long_help = "Exit with a non-zero code when the review fails.\n\n\
                Without this flag a failed review is logged as a warning and the\n\
                process exits successfully, so CI pipelines are not blocked."
        )]
        fail_on_error: bool,
        /// Log comments and the summary instead of posting them
        #[arg(long)]
        dry_run: bool,
        /// API key for the LLM provider
        #[arg(long, env = "VIGIL_LLM_API_KEY", hide_env_values = true)]
        llm_api_key: Option<String>,
    },
    /// Show which files a review would cover, without calling the LLM
    Plan {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Create a default .vigil.toml configuration file
    #[command(long_about = "Create a default .vigil.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .vigil.toml already exists.")]
    Init,
}

#[derive(Args)]
struct Target {
    /// Pull request to review (format: owner/repo#123)
    #[arg(long)]
    pr: String,
    /// GitHub token (falls back to GH_TOKEN and the config file)
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
}

#[derive(Args)]
struct FilterArgs {
    /// Only review files with these extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_ext: Vec<String>,
    /// Skip files with these extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_ext: Vec<String>,
    /// Only review files under these paths (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_path: Vec<String>,
    /// Skip files under these paths (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_path: Vec<String>,
}

impl FilterArgs {
    /// Non-empty CLI lists replace the configured ones.
    fn apply(self, config: &mut VigilConfig) {
        let review = &mut config.review;
        replace_if_set(&mut review.include_extensions, self.include_ext);
        replace_if_set(&mut review.exclude_extensions, self.exclude_ext);
        replace_if_set(&mut review.include_paths, self.include_path);
        replace_if_set(&mut review.exclude_paths, self.exclude_path);
    }
}

fn replace_if_set(target: &mut Vec<String>, values: Vec<String>) {
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if !values.is_empty() {
        *target = values;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// Machine-readable JSON with camelCase keys
    Json,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "vigil_ai=debug,vigil_review=debug,vigil_difflens=debug"
    } else {
        "vigil_ai=info,vigil_review=info,vigil_difflens=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<VigilConfig> {
    let config = match path {
        Some(path) => VigilConfig::from_file(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                VigilConfig::from_file(default_path).wrap_err("loading .vigil.toml")?
            } else {
                VigilConfig::default()
            }
        }
    };
    Ok(config)
}

fn github_host(config: &VigilConfig, token: Option<String>) -> Result<OctocrabHost> {
    let token = token
        .or_else(|| std::env::var("GH_TOKEN").ok())
        .or_else(|| config.github.token.clone())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            miette::miette!(
                help = "Pass --github-token, set GITHUB_TOKEN, or add token under [github] in .vigil.toml",
                "No GitHub token configured"
            )
        })?;
    Ok(OctocrabHost::new(&token, &config.github.api_url)?)
}

fn llm_client(config: &mut VigilConfig, api_key: Option<String>) -> Result<LlmClient> {
    let env_var = config.llm.api_key_env_var();
    if let Some(key) = api_key.or_else(|| std::env::var(env_var).ok()) {
        config.llm.api_key = Some(key);
    }
    if config.llm.api_key.is_none() && config.llm.provider != "ollama" {
        miette::bail!(miette::miette!(
            help = "Set {env_var}, pass --llm-api-key, or add api_key under [llm] in .vigil.toml",
            "No API key configured for LLM provider '{}'",
            config.llm.provider
        ));
    }
    Ok(LlmClient::new(&config.llm)?)
}

fn parse_pr(pr: &str) -> Result<PullRequestId> {
    Ok(pr.parse::<PullRequestId>()?)
}

const DEFAULT_CONFIG: &str = r#"# Vigil Configuration

[llm]
# provider = "openai"        # openai | openrouter | gemini | ollama
# model = "gpt-4o"
# base_url = "https://api.openai.com"
# timeout_secs = 120

[github]
# api_url = "https://api.github.com"

[review]
# include_extensions = [".rs", ".ts"]
# exclude_extensions = [".lock", ".snap"]
# include_paths = ["src"]
# exclude_paths = ["vendor", "dist"]
# max_steps_per_file = 10
# max_total_steps = 50
# max_attempts = 3
# initial_backoff_ms = 1000
# rate_limit_cooldown_secs = 10
# context_margin_lines = 20
# suggest_as_diff = true
# dedupe_comments = true
# fail_on_error = false
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Review {
            target,
            filters,
            max_steps_per_file,
            max_total_steps,
            fail_on_error,
            dry_run,
            llm_api_key,
        } => {
            filters.apply(&mut config);
            if let Some(n) = max_steps_per_file {
                config.review.max_steps_per_file = n;
            }
            if let Some(n) = max_total_steps {
                config.review.max_total_steps = n;
            }
            let fail_on_error = fail_on_error || config.review.fail_on_error;

            let pr = parse_pr(&target.pr)?;
            let host = github_host(&config, target.github_token)?;
            let llm = llm_client(&mut config, llm_api_key)?;
            tracing::info!(%pr, model = llm.model(), dry_run, "starting review");

            let orchestrator =
                ReviewOrchestrator::new(Arc::new(host), Arc::new(llm), config.review.clone())
                    .with_dry_run(dry_run);

            match orchestrator.run(&pr).await {
                Ok(outcome) => match cli.format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&outcome).into_diagnostic()?);
                    }
                    OutputFormat::Text => print!("{outcome}"),
                },
                Err(err) if fail_on_error => {
                    return Err(err).wrap_err(format!("review of {pr} failed"));
                }
                Err(err) => {
                    tracing::warn!(%pr, error = %err, "review failed; not failing the build (fail_on_error is off)");
                }
            }
        }
        Command::Plan { target, filters } => {
            filters.apply(&mut config);
            let pr = parse_pr(&target.pr)?;
            let host = github_host(&config, target.github_token)?;

            // the model is never called while planning
            let llm = LlmClient::new(&config.llm)?;
            let orchestrator =
                ReviewOrchestrator::new(Arc::new(host), Arc::new(llm), config.review.clone());
            let plan = orchestrator.prepare(&pr).await?;
            let session = &plan.session;

            match cli.format {
                OutputFormat::Json => {
                    let files: Vec<&str> =
                        session.files.iter().map(|f| f.filename.as_str()).collect();
                    let skipped: Vec<serde_json::Value> = plan
                        .skipped
                        .iter()
                        .map(|s| serde_json::json!({"path": s.path, "reason": s.reason.to_string()}))
                        .collect();
                    let report = serde_json::json!({
                        "baseCommit": session.base_commit,
                        "headCommit": session.head_commit,
                        "incremental": session.incremental,
                        "files": files,
                        "skipped": skipped,
                    });
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                OutputFormat::Text => {
                    let mode = if session.incremental { "incremental" } else { "full" };
                    println!(
                        "{pr}: {mode} review {}..{}",
                        session.base_commit, session.head_commit
                    );
                    println!("Files to review ({}):", session.files.len());
                    for f in &session.files {
                        println!("  {} ({}, +{}/-{})", f.filename, f.status, f.additions, f.deletions);
                    }
                    if !plan.skipped.is_empty() {
                        println!("Skipped ({}):", plan.skipped.len());
                        for s in &plan.skipped {
                            println!("  {} ({})", s.path, s.reason);
                        }
                    }
                }
            }
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
    }

    Ok(())
}
