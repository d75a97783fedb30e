use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use silenceguard::bridge::{Bridge, LoopbackBridge, RiskInterceptedPayload};
use silenceguard::cli::{Cli, Commands, DictCommands};
use silenceguard::dictionary::{split_variants, DictionaryEntry, DictionaryStore};
use silenceguard::managers::history::InterceptHistory;
use silenceguard::managers::monitor::MonitorSession;
use silenceguard::matcher::scan;
use silenceguard::phonetic::PhoneticEngine;
use silenceguard::settings::{self, AppSettings};
use silenceguard::text::{count_words, normalize};
use silenceguard::tracing_config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => settings::default_config_dir()?,
    };
    std::fs::create_dir_all(&config_dir)?;
    tracing_config::init_tracing(&settings::log_dir(&config_dir))?;
    if let Some(level) = cli.log_level {
        tracing_config::set_file_log_level(level);
    }

    let app_settings = settings::load_settings(&config_dir);

    match cli.command {
        Commands::Monitor => run_monitor(&config_dir, app_settings).await,
        Commands::Check { text, threshold } => {
            run_check(&config_dir, app_settings, &text, threshold)
        }
        Commands::Dict { command } => run_dict(&config_dir, command),
        Commands::History { limit } => run_history(&config_dir, limit),
    }
}

/// Reads cumulative transcript updates from stdin, one per line, and runs
/// them through a monitoring session until EOF. `:undo [word]` flags the
/// last (or named) interception as a false positive.
async fn run_monitor(config_dir: &Path, app_settings: AppSettings) -> Result<()> {
    let dictionary = DictionaryStore::load(&settings::dictionary_path(config_dir));
    if dictionary.is_empty() {
        warn!("dictionary is empty, nothing will match");
    }

    let history = Arc::new(InterceptHistory::new(settings::history_path(config_dir))?);
    let bridge: Arc<dyn Bridge> = Arc::new(LoopbackBridge::new());
    bridge.set_ack_listener(Box::new(|ack: RiskInterceptedPayload| {
        info!(word = %ack.word, hook = ack.hook_type.as_str(), "interception confirmed");
    }));

    let phonetics = Arc::new(PhoneticEngine::new());
    let mut session = MonitorSession::new(app_settings, dictionary, phonetics, bridge)
        .with_history(history);
    session.start()?;

    println!(
        "session {} reading transcript updates from stdin (Ctrl-D to stop)",
        session.session_id()
    );

    let mut last_fired: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(rest) = line.strip_prefix(":undo") {
            let word = match rest.trim() {
                "" => last_fired.clone(),
                named => Some(named.to_string()),
            };
            match word {
                Some(word) => {
                    session.mark_false_positive(&word)?;
                    println!("flagged '{word}' as false positive");
                }
                None => println!("nothing intercepted yet"),
            }
            continue;
        }

        let outcome = session.feed(&line)?;
        match (&outcome.hit, outcome.fired) {
            (Some(hit), true) => {
                println!("!! {} ({} match at {})", hit.word, hit.match_type.as_str(), hit.index);
                last_fired = Some(hit.word.clone());
            }
            (Some(hit), false) => {
                println!("-- {} (within cooldown)", hit.word);
            }
            (None, _) => {}
        }
    }

    info!(
        session = %session.session_id(),
        transcript_entries = session.transcript().len(),
        "stdin closed, session finished"
    );
    Ok(())
}

/// One-shot scan of a single text, bypassing cooldown and session state.
fn run_check(
    config_dir: &Path,
    app_settings: AppSettings,
    text: &str,
    threshold: Option<f64>,
) -> Result<()> {
    let dictionary = DictionaryStore::load(&settings::dictionary_path(config_dir));
    let phonetics = PhoneticEngine::new();
    phonetics.load();

    let mut options = app_settings.match_options();
    if let Some(value) = threshold {
        options.similarity_threshold = value;
    }

    let clean = normalize(text);
    match scan(&clean, 0, dictionary.entries(), &phonetics, &options) {
        Some(hit) => println!("{} match: '{}' at char {}", hit.match_type.as_str(), hit.word, hit.index),
        None => println!("no match"),
    }
    Ok(())
}

fn run_dict(config_dir: &Path, command: DictCommands) -> Result<()> {
    let path = settings::dictionary_path(config_dir);
    let mut store = DictionaryStore::load(&path);

    match command {
        DictCommands::List => {
            if store.is_empty() {
                println!("dictionary is empty");
                return Ok(());
            }
            for entry in store.entries() {
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.keyword,
                    entry.risk_level.as_str(),
                    if entry.is_local_only { "local" } else { "shared" },
                    entry.variants.join(",")
                );
            }
        }
        DictCommands::Add {
            keyword,
            variants,
            risk,
        } => {
            let variants = variants.as_deref().map(split_variants).unwrap_or_default();
            store.add(DictionaryEntry::new(keyword.clone(), variants, risk))?;
            store.save(&path)?;
            println!("added '{keyword}' ({} entries)", store.len());
        }
        DictCommands::Remove { keyword } => {
            store.remove(&keyword)?;
            store.save(&path)?;
            println!("removed '{keyword}' ({} entries)", store.len());
        }
    }
    Ok(())
}

fn run_history(config_dir: &Path, limit: usize) -> Result<()> {
    let history = InterceptHistory::new(settings::history_path(config_dir))?;
    let events = history.recent(limit)?;
    if events.is_empty() {
        println!("no interception events recorded");
        return Ok(());
    }
    for event in &events {
        println!(
            "{}\t{}\t{}\t{}\t{:.2}\t{}",
            event.local_time(),
            event.session_id,
            event.word,
            event.match_type,
            event.confidence,
            event.transcript
        );
    }
    let words: usize = events.iter().map(|e| count_words(&e.transcript)).sum();
    println!("{} of {} events shown, {} transcript words", events.len(), history.count()?, words);
    Ok(())
}
