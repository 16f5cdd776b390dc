use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use meetbill::auth;
use meetbill::config::{self, AppConfig};
use meetbill::matching::ai::AiMatcher;
use meetbill::matching::match_subject;
use meetbill::models::{TrackerUser, UserIdentity};
use meetbill::output::{json as json_out, report, table};
use meetbill::process::{self, Session, DEFAULT_WORKTYPE_ID};
use meetbill::providers::azure_openai::AzureCompletion;
use meetbill::providers::graph::{GraphCalendar, GraphUser};
use meetbill::providers::intervals::IntervalsTracker;
use meetbill::providers::{CompletionService, TimeTracker};

const TRACKER_TOKEN_ENV: &str = "MEETBILL_TRACKER_TOKEN";
const GRAPH_TOKEN_ENV: &str = "MEETBILL_GRAPH_TOKEN";
const AI_KEY_ENV: &str = "MEETBILL_AI_KEY";

#[derive(Parser)]
#[command(name = "meetbill", version, about = "Turn calendar meeting attendance into billable time entries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Time tracker API token
    #[arg(long, global = true, env = "MEETBILL_TRACKER_TOKEN", hide_env_values = true)]
    tracker_token: Option<String>,

    /// Microsoft Graph access token
    #[arg(long, global = true, env = "MEETBILL_GRAPH_TOKEN", hide_env_values = true)]
    graph_token: Option<String>,

    /// Azure OpenAI API key
    #[arg(long, global = true, env = "MEETBILL_AI_KEY", hide_env_values = true)]
    ai_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process recent meetings and post billable time
    Run {
        /// Days to look back (default from config, else 30)
        #[arg(long)]
        days: Option<u32>,

        /// Match and report without posting entries
        #[arg(long)]
        dry_run: bool,

        /// Only use direct keyword matching
        #[arg(long)]
        no_ai: bool,

        /// Write a text report (default: meeting_processing_<timestamp>.txt)
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        export: Option<Option<PathBuf>>,
    },

    /// List tracker tasks with their matching keywords
    Tasks,

    /// Preview which task a meeting subject would be billed to
    Match {
        /// Meeting subject
        subject: String,

        /// Only use direct keyword matching
        #[arg(long)]
        no_ai: bool,
    },

    /// Manage the saved tracker token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage ~/.meetbill/config.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Save a tracker token
    Set {
        /// Token value
        token: String,
    },
    /// Show the resolved tracker token (redacted)
    Show,
    /// Delete the saved tracker token
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config template
    Init,
    /// Print the config with secrets redacted
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    let rust_log = std::env::var("RUST_LOG").ok();
    if let Some(level) = verbosity_level(cli.verbose, rust_log.as_deref()) {
        filter = filter.add_directive(level.into());
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let json_output = cli.json;
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Run {
            days,
            dry_run,
            no_ai,
            export,
        } => {
            let tracker = connect_tracker(cli.tracker_token.as_deref(), &config)?;
            let graph_token = config::resolve_credential(
                cli.graph_token.as_deref(),
                GRAPH_TOKEN_ENV,
                config.calendar.as_ref().map(|c| &c.credential),
            )?
            .with_context(|| {
                format!("No calendar token. Pass --graph-token, set {GRAPH_TOKEN_ENV}, or configure [calendar].")
            })?;
            let base_url = config
                .calendar
                .as_ref()
                .and_then(|c| c.credential.base_url.clone());
            let calendar = GraphCalendar::connect(graph_token, base_url)
                .context("Failed to connect to the calendar")?;

            let me = tracker
                .current_user()
                .context("Failed to identify the tracker user")?;
            let email_domain = config.calendar.as_ref().and_then(|c| c.email_domain.as_deref());
            let session = Session {
                user: build_identity(&me, calendar.user(), email_domain),
                person_id: me.person_id,
                worktype_id: config.worktype_id().unwrap_or(DEFAULT_WORKTYPE_ID),
                dry_run,
            };
            eprintln!("Processing meetings for {} <{}>", session.user.name, session.user.email);

            let catalog = process::load_catalog(&tracker)?;
            eprintln!("Loaded {} tasks", catalog.len());

            let ai = if no_ai { None } else { connect_ai(cli.ai_key.as_deref(), &config)? };
            if ai.is_none() {
                eprintln!("AI matching disabled; using direct keyword matching only");
            }

            let lookback = days.unwrap_or_else(|| config.lookback_days());
            let run_report = process::run_batch(
                &calendar,
                &tracker,
                ai.as_ref().map(|a| a as &dyn CompletionService),
                &catalog,
                &session,
                lookback,
            )?;

            if json_output {
                json_out::print_json(&run_report)?;
            } else {
                if dry_run {
                    println!("[dry-run] No entries were posted.\n");
                }
                table::print_report(&run_report);
            }

            if let Some(path) = export {
                let path = path.unwrap_or_else(|| report::default_report_path(Local::now()));
                let written = report::export(&run_report, &path)?;
                eprintln!("Detailed report exported to: {}", written.display());
            }
        }

        Commands::Tasks => {
            let tracker = connect_tracker(cli.tracker_token.as_deref(), &config)?;
            let catalog = process::load_catalog(&tracker)?;
            if json_output {
                json_out::print_json(&json_out::catalog_rows(&catalog))?;
            } else {
                table::print_catalog(&catalog);
            }
        }

        Commands::Match { subject, no_ai } => {
            let tracker = connect_tracker(cli.tracker_token.as_deref(), &config)?;
            let catalog = process::load_catalog(&tracker)?;
            let ai = if no_ai { None } else { connect_ai(cli.ai_key.as_deref(), &config)? };
            let matcher = ai.as_ref().map(|a| AiMatcher::new(a as &dyn CompletionService));

            let result = match_subject(&subject, &catalog, matcher.as_ref());
            let task = result.task_id.and_then(|id| catalog.get(id));

            if json_output {
                json_out::print_json(&json_out::MatchPreview {
                    subject: &subject,
                    result,
                    task,
                })?;
            } else {
                match (result.task_id, task) {
                    (Some(_), Some(t)) => {
                        println!("{} -> {} ({})", subject, t.title, t.id);
                        print!("  tier: {}", result.tier.as_str());
                        if let Some(score) = result.score {
                            print!(", score: {score:.2}");
                        }
                        println!();
                    }
                    (Some(id), None) => println!("{subject} -> unknown task {id}"),
                    _ => println!("{subject} -> no match"),
                }
            }
        }

        Commands::Token { action } => {
            let path = token_path(&config)?;
            match action {
                TokenAction::Set { token } => {
                    let token = token.trim();
                    if token.is_empty() {
                        anyhow::bail!("Token must not be empty");
                    }
                    auth::save_token(&path, token)?;
                    println!("Saved tracker token to {}", path.display());
                }
                TokenAction::Show => match resolve_tracker_token(cli.tracker_token.as_deref(), &config)? {
                    Some(token) => {
                        if json_output {
                            json_out::print_json(&serde_json::json!({
                                "token": auth::redact(&token),
                                "token_file": path.display().to_string(),
                            }))?;
                        } else {
                            println!("Tracker token: {}", auth::redact(&token));
                        }
                    }
                    None => println!("No tracker token configured."),
                },
                TokenAction::Clear => {
                    if auth::clear_token(&path)? {
                        println!("Removed {}", path.display());
                    } else {
                        println!("No saved token at {}", path.display());
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let path = config::config_path()?;
                if config::init_config()? {
                    println!("Created {}", path.display());
                } else {
                    println!("Config already exists: {}", path.display());
                }
            }
            ConfigAction::Show => {
                if json_output {
                    json_out::print_json(&serde_json::json!({
                        "path": config::config_path()?.display().to_string(),
                        "lookback_days": config.lookback_days(),
                        "worktype_id": config.worktype_id().unwrap_or(DEFAULT_WORKTYPE_ID),
                        "ai_enabled": config.ai_settings().is_some(),
                    }))?;
                } else {
                    println!("{}", config.display_redacted());
                }
            }
        },
    }

    Ok(())
}

/// Global level from `-v`. Without `-v` a non-empty `RUST_LOG` decides alone.
fn verbosity_level(verbose: u8, rust_log: Option<&str>) -> Option<tracing::Level> {
    match verbose {
        0 if rust_log.is_some_and(|v| !v.trim().is_empty()) => None,
        0 => Some(tracing::Level::WARN),
        1 => Some(tracing::Level::INFO),
        _ => Some(tracing::Level::DEBUG),
    }
}

fn token_path(config: &AppConfig) -> Result<PathBuf> {
    match config.token_file() {
        Some(p) => Ok(p.to_path_buf()),
        None => auth::default_token_path(),
    }
}

/// Flag > env > config key > config command > saved token file.
fn resolve_tracker_token(flag: Option<&str>, config: &AppConfig) -> Result<Option<String>> {
    let resolved = config::resolve_credential(
        flag,
        TRACKER_TOKEN_ENV,
        config.tracker.as_ref().map(|t| &t.credential),
    )?;
    if resolved.is_some() {
        return Ok(resolved);
    }
    auth::load_token(&token_path(config)?)
}

fn connect_tracker(flag: Option<&str>, config: &AppConfig) -> Result<IntervalsTracker> {
    let token = resolve_tracker_token(flag, config)?.with_context(|| {
        format!("No tracker token. Run `meetbill token set <TOKEN>`, pass --tracker-token, or set {TRACKER_TOKEN_ENV}.")
    })?;
    let base_url = config
        .tracker
        .as_ref()
        .and_then(|t| t.credential.base_url.clone());
    Ok(IntervalsTracker::new(&token, base_url))
}

/// `Ok(None)` when AI matching is not configured.
fn connect_ai(flag: Option<&str>, config: &AppConfig) -> Result<Option<AzureCompletion>> {
    let Some(settings) = config.ai_settings() else {
        return Ok(None);
    };
    let Some(endpoint) = settings.endpoint.clone() else {
        return Ok(None);
    };
    let key = config::resolve_credential(flag, AI_KEY_ENV, Some(&settings.credential))?
        .with_context(|| format!("[ai] endpoint is set but no key found. Pass --ai-key or set {AI_KEY_ENV}."))?;
    Ok(Some(AzureCompletion::new(endpoint, key)))
}

/// Who the current user is, for filling in anonymized attendance rows.
fn build_identity(me: &TrackerUser, graph: &GraphUser, email_domain: Option<&str>) -> UserIdentity {
    let name = match me.display_name() {
        n if !n.is_empty() => n,
        _ => graph.display_name.clone().unwrap_or_else(|| me.username.clone()),
    };
    let graph_email = graph.mail.clone().or_else(|| graph.user_principal_name.clone());
    let email = me
        .email
        .clone()
        .filter(|e| !e.is_empty())
        .or_else(|| email_domain.map(|d| format!("{}@{}", me.username, d)))
        .or_else(|| graph_email.clone())
        .unwrap_or_else(|| me.username.clone());

    let mut aliases = vec![graph.id.clone()];
    for alt in [graph.mail.as_ref(), graph.user_principal_name.as_ref()].into_iter().flatten() {
        if !alt.eq_ignore_ascii_case(&email) && !aliases.contains(alt) {
            aliases.push(alt.clone());
        }
    }

    UserIdentity { name, email, aliases }
}
