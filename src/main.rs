use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use radiodl::registry::RegistryBuilder;
use radiodl::{
    DiscoveryOptions, DownloadRequest, DylibLoader, EpisodeInfo, NoopReporter, ProgrammeInfo,
    ProgressEvent, ProgressIcon, ProgressReporter, ProviderId, ProviderInfo, ProviderRegistry,
    RegisteredProvider, SessionId, SessionState, SessionSupervisor, SharedProgressReporter,
    SupervisorOptions, final_name, output_path,
};

// Emoji with fallback for terminals without Unicode support
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static PLUG: Emoji<'_, '_> = Emoji("🔌 ", "[p] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[?] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static CONVERT: Emoji<'_, '_> = Emoji("🔄 ", "[c] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Download radio programmes through pluggable content providers
#[derive(Parser, Debug)]
#[command(name = "radiodl")]
#[command(about = "Download radio programmes through pluggable content providers")]
#[command(version)]
struct Args {
    /// File name suffix of provider modules (default: "provider" + platform library suffix)
    #[arg(long, global = true)]
    module_suffix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the providers found in a module directory
    Providers {
        /// Directory containing provider modules
        module_dir: PathBuf,

        /// Print machine readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a programme and its available episodes
    Programme {
        /// Directory containing provider modules
        module_dir: PathBuf,

        /// Id of the provider offering the programme
        provider_id: ProviderId,

        /// Provider specific programme id
        programme_id: String,

        /// Print machine readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Download one or more episodes of a programme
    Download {
        /// Directory containing provider modules
        module_dir: PathBuf,

        /// Id of the provider offering the programme
        provider_id: ProviderId,

        /// Provider specific programme id
        programme_id: String,

        /// Provider specific episode ids
        #[arg(required = true)]
        episode_ids: Vec<String>,

        /// Output directory for downloaded episodes
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Seconds to wait for each metadata lookup (0 = no limit)
        #[arg(long, default_value = "60")]
        metadata_timeout: u64,

        /// Quiet mode - suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<SessionId, ProgressBar>>,
    labels: HashMap<String, String>,
}

impl IndicatifReporter {
    /// `labels` maps episode ids to the names shown next to their bars
    fn new(labels: HashMap<String, String>) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            labels,
        }
    }

    fn get_or_create_bar(&self, session_id: SessionId) -> ProgressBar {
        let mut bars = self.bars.lock();

        if let Some(bar) = bars.get(&session_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template("  {prefix}[{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(style);
        bar.set_prefix(DOWNLOAD.to_string());
        bars.insert(session_id, bar.clone());
        bar
    }

    fn finish_bar(&self, session_id: SessionId) {
        self.bars.lock().remove(&session_id);
    }

    fn label(&self, episode_id: &str) -> String {
        let label = self
            .labels
            .get(episode_id)
            .map(String::as_str)
            .unwrap_or(episode_id);
        truncate_title(label, 40)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StateChanged {
                session_id,
                key,
                state,
            } => {
                let bar = self.get_or_create_bar(session_id);
                match state {
                    SessionState::Converting => bar.set_prefix(CONVERT.to_string()),
                    SessionState::Downloading => bar.set_prefix(DOWNLOAD.to_string()),
                    _ => {}
                }
                bar.set_message(format!(
                    "{} {}",
                    self.label(&key.episode_id),
                    state.to_string().dimmed()
                ));
            }

            ProgressEvent::Progress {
                session_id,
                key,
                percent,
                status,
                icon,
            } => {
                let bar = self.get_or_create_bar(session_id);
                bar.set_prefix(match icon {
                    ProgressIcon::Downloading => DOWNLOAD.to_string(),
                    ProgressIcon::Converting => CONVERT.to_string(),
                });
                bar.set_position(u64::from(percent));
                bar.set_message(format!(
                    "{} {}",
                    self.label(&key.episode_id),
                    status.dimmed()
                ));
            }

            ProgressEvent::Finished {
                session_id, key, ..
            } => {
                let bar = self.get_or_create_bar(session_id);
                bar.set_position(100);
                bar.finish_with_message(format!(
                    "{SUCCESS}{}",
                    self.label(&key.episode_id).green()
                ));
                self.finish_bar(session_id);
            }

            ProgressEvent::Failed {
                session_id,
                key,
                error,
            } => {
                let bar = self.get_or_create_bar(session_id);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    self.label(&key.episode_id).red(),
                    error.red()
                ));
                self.finish_bar(session_id);
            }

            ProgressEvent::Cancelled { session_id, key } => {
                let bar = self.get_or_create_bar(session_id);
                bar.abandon_with_message(format!(
                    "{STOP}{} {}",
                    self.label(&key.episode_id).yellow(),
                    "cancelled".dimmed()
                ));
                self.finish_bar(session_id);
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn discovery_options(module_suffix: Option<String>) -> DiscoveryOptions {
    match module_suffix {
        Some(module_suffix) => DiscoveryOptions { module_suffix },
        None => DiscoveryOptions::default(),
    }
}

/// Discover providers, printing problems with individual modules unless `quiet`
fn load_registry(
    module_dir: &Path,
    options: &DiscoveryOptions,
    lookup_timeout: Option<Duration>,
    quiet: bool,
) -> Result<ProviderRegistry> {
    let mut builder = RegistryBuilder::new();
    builder.set_lookup_timeout(lookup_timeout);
    let report = builder.discover(module_dir, &DylibLoader::new(), options);
    let registry = builder.build();

    if let Some(error) = report.directory_error {
        return Err(error).with_context(|| {
            format!("Failed to read module directory {}", module_dir.display())
        });
    }

    if !quiet {
        for skipped in &report.skipped_modules {
            eprintln!(
                "{WARNING}{} {} - {}",
                "Skipped module".yellow(),
                skipped.path.display(),
                skipped.error.to_string().dimmed()
            );
        }
        for rejected in &report.rejected {
            eprintln!(
                "{WARNING}{} {}",
                "Rejected provider:".yellow(),
                rejected.error.to_string().dimmed()
            );
        }
    }

    Ok(registry)
}

fn lookup(registry: &ProviderRegistry, provider_id: ProviderId) -> Result<&RegisteredProvider> {
    match registry.get_by_id(&provider_id) {
        Some(provider) => Ok(provider),
        None => bail!("No provider with id {provider_id} was found"),
    }
}

fn list_providers(registry: &ProviderRegistry, json: bool) -> Result<()> {
    if json {
        let infos: Vec<&ProviderInfo> = registry.get_all().iter().map(|p| p.info()).collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("{}", "No providers found".yellow());
        return Ok(());
    }

    for provider in registry.get_all() {
        let info = provider.info();
        println!(
            "{PLUG}{} {}",
            info.name.bold().green(),
            info.id.to_string().dimmed()
        );
        if !info.description.is_empty() {
            println!("    {}", info.description);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ProgrammeListing<'a> {
    provider: &'a ProviderInfo,
    programme_id: &'a str,
    programme: &'a ProgrammeInfo,
    episodes: Vec<EpisodeListing>,
}

#[derive(Serialize)]
struct EpisodeListing {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<EpisodeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn show_programme(
    registry: &ProviderRegistry,
    provider_id: ProviderId,
    programme_id: &str,
    json: bool,
) -> Result<()> {
    let provider = lookup(registry, provider_id)?;

    let programme = provider
        .programme_info(programme_id)
        .await
        .with_context(|| format!("Failed to look up programme {programme_id}"))?;

    let episode_ids = if programme.single_episode {
        vec![programme_id.to_string()]
    } else {
        provider
            .available_episode_ids(programme_id)
            .await
            .with_context(|| format!("Failed to list episodes of {programme_id}"))?
    };

    let mut episodes = Vec::with_capacity(episode_ids.len());
    for id in episode_ids {
        let listing = match provider.episode_info(programme_id, &id).await {
            Ok(info) => EpisodeListing {
                id,
                info: Some(info),
                error: None,
            },
            Err(error) => EpisodeListing {
                id,
                info: None,
                error: Some(error.to_string()),
            },
        };
        episodes.push(listing);
    }

    if json {
        let listing = ProgrammeListing {
            provider: provider.info(),
            programme_id,
            programme: &programme,
            episodes,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{RADIO}{}", programme.name.bold().green());
    if let Some(description) = &programme.description {
        println!("    {}", description.dimmed());
    }
    println!();

    if episodes.is_empty() {
        println!("{}", "No episodes available".yellow());
    }
    for episode in &episodes {
        match (&episode.info, &episode.error) {
            (Some(info), _) => println!(
                "  {} {} {}",
                episode.id.cyan(),
                info.date.format("%Y-%m-%d").to_string().dimmed(),
                info.name
            ),
            (None, Some(error)) => println!("  {} {}", episode.id.cyan(), error.red()),
            (None, None) => println!("  {}", episode.id.cyan()),
        }
    }

    Ok(())
}

struct DownloadArgs {
    provider_id: ProviderId,
    programme_id: String,
    episode_ids: Vec<String>,
    output_dir: PathBuf,
    metadata_timeout: Option<Duration>,
    quiet: bool,
}

/// Returns false when nothing could be downloaded
async fn download(registry: ProviderRegistry, args: DownloadArgs) -> Result<bool> {
    let provider = lookup(&registry, args.provider_id)?;

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;

    // Metadata is looked up here rather than by the sessions, since the
    // target file name is derived from it
    let programme = provider
        .programme_info(&args.programme_id)
        .await
        .with_context(|| format!("Failed to look up programme {}", args.programme_id))?;

    let mut failures: Vec<(String, String)> = Vec::new();
    let mut requests = Vec::new();
    let mut labels = HashMap::new();
    for episode_id in &args.episode_ids {
        match provider.episode_info(&args.programme_id, episode_id).await {
            Ok(episode) => {
                labels.insert(episode_id.clone(), episode.name.clone());
                let target = final_name(&args.output_dir, &programme, &episode);
                requests.push(
                    DownloadRequest::new(
                        args.provider_id,
                        args.programme_id.clone(),
                        episode_id.clone(),
                        target,
                    )
                    .with_programme(programme.clone())
                    .with_episode(episode),
                );
            }
            Err(error) => failures.push((episode_id.clone(), error.to_string())),
        }
    }

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new(labels.clone()))
    };

    let supervisor = Arc::new(SessionSupervisor::new(
        Arc::new(registry),
        SupervisorOptions {
            metadata_timeout: args.metadata_timeout,
        },
        reporter,
    ));

    let mut handles = Vec::with_capacity(requests.len());
    for request in requests {
        let episode_id = request.episode_id.clone();
        let final_name = request.final_name.clone();
        match supervisor.start(request) {
            Ok(handle) => handles.push((handle, final_name)),
            Err(error) => failures.push((episode_id, error.to_string())),
        }
    }

    let interrupt = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                supervisor.cancel_all();
            }
        }
    });

    let mut produced = Vec::new();
    let mut cancelled = 0;
    for (handle, final_name) in &handles {
        let snapshot = handle.wait().await;
        match snapshot.state {
            SessionState::Finished => {
                let extension = snapshot.extension.unwrap_or_default();
                produced.push(output_path(final_name, &extension));
            }
            SessionState::Cancelled => cancelled += 1,
            _ => failures.push((
                snapshot.key.episode_id,
                snapshot.error.unwrap_or_default(),
            )),
        }
    }
    interrupt.abort();
    supervisor.drain_terminal();

    if !args.quiet {
        println!(
            "\n{PARTY}{} {} downloaded, {} failed, {} cancelled",
            "Done:".bold().green(),
            produced.len().to_string().green().bold(),
            if failures.is_empty() {
                failures.len().to_string().green()
            } else {
                failures.len().to_string().red().bold()
            },
            cancelled.to_string().yellow()
        );

        if !failures.is_empty() {
            println!("\n{}", "Failed episodes:".red().bold());
            for (episode_id, error) in &failures {
                let label = labels.get(episode_id).unwrap_or(episode_id);
                println!("  {}{} - {}", CROSS, label.yellow(), error.dimmed());
            }
        }

        for path in &produced {
            println!("{FOLDER}{}", path.display().to_string().cyan());
        }
        println!();
    }

    Ok(!produced.is_empty() || (failures.is_empty() && cancelled == 0))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let options = discovery_options(args.module_suffix);
    let default_timeout = SupervisorOptions::default().metadata_timeout;

    match args.command {
        Command::Providers { module_dir, json } => {
            let registry = load_registry(&module_dir, &options, default_timeout, json)?;
            list_providers(&registry, json)?;
        }

        Command::Programme {
            module_dir,
            provider_id,
            programme_id,
            json,
        } => {
            let registry = load_registry(&module_dir, &options, default_timeout, json)?;
            show_programme(&registry, provider_id, &programme_id, json).await?;
        }

        Command::Download {
            module_dir,
            provider_id,
            programme_id,
            episode_ids,
            output_dir,
            metadata_timeout,
            quiet,
        } => {
            if !quiet {
                println!(
                    "\n{}{} {}\n",
                    RADIO,
                    "radiodl".bold().magenta(),
                    "- Radio Downloader".dimmed()
                );
            }

            let metadata_timeout =
                (metadata_timeout > 0).then_some(Duration::from_secs(metadata_timeout));
            let registry = load_registry(&module_dir, &options, metadata_timeout, quiet)?;
            let args = DownloadArgs {
                provider_id,
                programme_id,
                episode_ids,
                output_dir,
                metadata_timeout,
                quiet,
            };

            if !download(registry, args).await.context("Download failed")? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
