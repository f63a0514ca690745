use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ripperkit::config::Config;
use ripperkit::conflicts;
use ripperkit::db::{Database, GameRecord};
use ripperkit::game::Game;
use ripperkit::loadorder;
use ripperkit::mods;
use ripperkit::profiles;
use ripperkit::scan;
use ripperkit::updates;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ripperkit")]
#[command(
    author,
    version,
    about = "A mod correlation, conflict, and load-order engine for Cyberpunk 2077"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Game install directory. Only needed once; persisted into the config and database.
    #[arg(long)]
    game_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rescan staged archives and on-disk mods, regroup files, and rebuild conflict evidence
    Scan,

    /// Install a mod from a staged archive
    Install {
        /// Path to the archive file
        path: String,
        /// File paths (relative to the mod's own root) to skip extracting
        #[arg(long = "skip")]
        skip_conflicts: Vec<String>,
    },

    /// Uninstall an installed mod and remove its files
    Uninstall { installed_mod_id: i64 },

    /// Enable or disable an installed mod
    Toggle { installed_mod_id: i64 },

    /// Correlate staged archives against the mod catalog
    Correlate,

    /// List current conflict evidence
    Conflicts,

    /// Load-order operations
    Loadorder {
        #[command(subcommand)]
        action: LoadorderCommands,
    },

    /// Check installed mods for available updates
    CheckUpdates {
        /// Use the last cached result, or an offline version comparison, instead of calling the catalog
        #[arg(long)]
        cached: bool,
    },

    /// Profile operations (named snapshots of which mods are enabled)
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },
}

#[derive(Subcommand)]
enum LoadorderCommands {
    /// Show the generated load order
    Show,
    /// Record that `winner` should load after every id in `losers`
    Prefer {
        winner_mod_id: i64,
        loser_mod_ids: Vec<i64>,
    },
    /// Clear every load-order preference for this game
    Clear,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Snapshot every installed mod's current enabled state under a new name
    Save { name: String },
    /// Toggle mods to match a saved profile
    Load { name: String },
    /// Write a profile's enabled mods to a shareable JSON file
    Export { name: String, path: String },
    /// Create a profile from a previously exported JSON file
    Import { path: String },
    /// Show what differs between two profiles
    Diff { a: String, b: String },
}

fn setup_logging(verbosity: u8, paths: &ripperkit::config::Paths) -> Result<()> {
    let filter = match verbosity {
        0 => "ripperkit=info",
        1 => "ripperkit=debug",
        _ => "ripperkit=trace",
    };

    let log_dir = paths.data_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ripperkit.log");

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(file))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    Ok(())
}

/// Resolve the game to operate on, persisting `--game-path` if it was given.
async fn resolve_game(db: &Database, config: &mut Config, game_path: Option<&str>) -> Result<Game> {
    if let Some(path) = game_path {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            bail!("--game-path cannot be empty");
        }
        let game = Game::cyberpunk2077(PathBuf::from(trimmed));
        db.upsert_game(&GameRecord {
            id: game.id.clone(),
            name: game.name.clone(),
            catalog_domain: game.catalog_domain.clone(),
            install_path: game.install_path.to_string_lossy().into_owned(),
            mod_paths_json: serde_json::to_string(&game.mod_paths)?,
        })?;
        config.active_game = Some(game.id.clone());
        config.save().await?;
        return Ok(game);
    }

    let game_id = config.active_game.clone().unwrap_or_else(|| "cyberpunk2077".to_string());
    match db.get_game(&game_id)? {
        Some(record) => Game::from_record(&record),
        None => bail!("no game configured yet; pass --game-path <install dir> once to set it up"),
    }
}

fn require_profile(db: &Database, game: &Game, name: &str) -> Result<ripperkit::db::ProfileRecord> {
    db.get_profile(&game.id, name)?
        .ok_or_else(|| anyhow::anyhow!("no profile named '{name}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().await?;
    config.paths.ensure_dirs()?;
    setup_logging(cli.verbose, &config.paths)?;

    let db = Database::open(&config.paths.database_file())?;
    let game = resolve_game(&db, &mut config, cli.game_path.as_deref()).await?;

    match cli.command {
        Commands::Scan => {
            let spinner = indicatif::ProgressBar::new_spinner();
            spinner.set_message("scanning mod files...");
            spinner.enable_steady_tick(std::time::Duration::from_millis(100));
            let summary = scan::run(&db, &game)?;
            spinner.finish_and_clear();
            println!(
                "scanned {} file(s) into {} group(s); {} conflict record(s); {} mod(s) in load order",
                summary.files_scanned, summary.groups, summary.conflict_evidence, summary.modlist_entries
            );
        }

        Commands::Install { path, skip_conflicts } => {
            let result = mods::install(&db, &game, std::path::Path::new(&path), &skip_conflicts, &HashMap::new())?;
            println!(
                "installed '{}' (id {}): {} file(s) extracted, {} skipped, {} overwritten",
                result.name, result.installed_mod_id, result.files_extracted, result.files_skipped, result.files_overwritten
            );
        }

        Commands::Uninstall { installed_mod_id } => {
            let result = mods::uninstall(&db, &game, installed_mod_id)?;
            println!(
                "removed {} file(s), {} directory(ies)",
                result.files_deleted, result.directories_removed
            );
        }

        Commands::Toggle { installed_mod_id } => {
            let result = mods::toggle(&db, &game, installed_mod_id)?;
            println!(
                "mod {} is now {} ({} file(s) affected)",
                installed_mod_id,
                if result.disabled { "disabled" } else { "enabled" },
                result.files_affected
            );
        }

        Commands::Correlate => {
            bail!(
                "this build ships no CatalogClient implementation (mod catalog access is \
                 out of scope); correlate requires a caller-supplied implementation of \
                 ripperkit::correlate::CatalogClient and cannot run from this CLI"
            );
        }

        Commands::Conflicts => {
            let evidence = db.get_conflict_evidence(&game.id)?;
            if evidence.is_empty() {
                println!("no conflict evidence recorded; run `scan` first");
            }
            for e in &evidence {
                println!("[{}/{}] {} <-> {} ({})", e.kind, e.severity, e.mod_a_id, e.mod_b_id, e.key);
            }

            let summary = conflicts::archive_resource::summarize_by_archive(&db, &game.id)?;
            if !summary.is_empty() {
                println!("\nper-archive summary:");
                for s in &summary {
                    println!(
                        "  {} [{}] wins={} losses={}",
                        s.archive, s.severity, s.wins, s.losses
                    );
                }
            }
        }

        Commands::Loadorder { action } => match action {
            LoadorderCommands::Show => {
                let view = loadorder::get_modlist_view(&db, &game)?;
                for entry in &view.groups {
                    let marker = if entry.is_unmanaged { "?" } else { " " };
                    println!("{:>3} {} {}", entry.position, marker, entry.mod_name);
                }
                if !view.preferences.is_empty() {
                    println!("preferences:");
                    for p in &view.preferences {
                        println!("  {} before {}", p.winner_mod_name, p.loser_mod_name);
                    }
                }
            }
            LoadorderCommands::Prefer { winner_mod_id, loser_mod_ids } => {
                let added = loadorder::add_preferences(&db, &game, winner_mod_id, &loser_mod_ids)?;
                println!("added {added} preference(s)");
            }
            LoadorderCommands::Clear => {
                let removed = loadorder::remove_all_preferences(&db, &game)?;
                println!("cleared {removed} preference(s)");
            }
        },

        Commands::CheckUpdates { cached } => {
            if !cached {
                bail!(
                    "this build ships no CatalogClient implementation (mod catalog access is \
                     out of scope); pass --cached for an offline check against the last \
                     cached result, or supply a CatalogClient to check fresh"
                );
            }
            let result = updates::check_cached_updates(&db, &game)?;
            println!("checked {} tracked mod(s); {} update(s) available", result.total_checked, result.updates.len());
            for entry in &result.updates {
                println!("  {} ({} -> {}): {}", entry.display_name, entry.local_version, entry.nexus_version, entry.reason);
            }
        }

        Commands::Profile { action } => match action {
            ProfileCommands::Save { name } => {
                profiles::create(&db, &game, &name)?;
                println!("saved profile '{name}'");
            }
            ProfileCommands::Load { name } => {
                let profile = require_profile(&db, &game, &name)?;
                let result = profiles::load(&db, &game, &profile)?;
                println!("loaded profile '{name}': {} mod(s) toggled", result.mods_toggled);
            }
            ProfileCommands::Export { name, path } => {
                let profile = require_profile(&db, &game, &name)?;
                let export = profiles::export(&db, &game, &profile)?;
                let json = serde_json::to_string_pretty(&export)?;
                std::fs::write(&path, json)?;
                println!("exported profile '{name}' to {path}");
            }
            ProfileCommands::Import { path } => {
                let content = std::fs::read_to_string(&path)?;
                let export: ripperkit::profiles::ProfileExport = serde_json::from_str(&content)?;
                let profile = profiles::import(&db, &game, &export)?;
                println!("imported profile '{}'", profile.name);
            }
            ProfileCommands::Diff { a, b } => {
                let profile_a = require_profile(&db, &game, &a)?;
                let profile_b = require_profile(&db, &game, &b)?;
                let diff = profiles::compare(&db, &profile_a, &profile_b)?;
                println!("added: {:?}", diff.added);
                println!("removed: {:?}", diff.removed);
                println!("state changed: {:?}", diff.state_changed);
            }
        },
    }

    Ok(())
}
