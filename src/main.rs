use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use castfeed::audio;
use castfeed::config::{ConfigStore, FeedSettings};
use castfeed::feed::{EpisodeDuration, EpisodeInput, FeedEngine, FeedError};
use castfeed::util::check_episode_text;

#[derive(Parser, Debug)]
#[command(
    name = "castfeed",
    version,
    about = "Publish a podcast episode into an RSS feed"
)]
struct Args {
    /// Feed configuration (key=value, or .toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Episode title (prompted for when omitted)
    #[arg(short, long)]
    title: Option<String>,

    /// Episode description (prompted for when omitted)
    #[arg(short, long)]
    description: Option<String>,

    /// Running time as H:MM:SS, M:SS or seconds; overrides the measured length
    #[arg(long, value_name = "DURATION")]
    duration: Option<EpisodeDuration>,

    /// LAME encoder binary used for WAV input
    #[arg(long, value_name = "PATH")]
    encoder: Option<String>,

    /// WAV or MP3 file to publish
    audio: PathBuf,
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let store = ConfigStore::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    let settings = FeedSettings::from_store(store).context("Config is incomplete")?;

    let title = answer_or_prompt(args.title, "Episode title")?;
    let description = answer_or_prompt(args.description, "Episode description")?;
    // Reject bad text before spending time on a transcode
    check_episode_text(&title, &description).context("Episode text rejected")?;

    let prepared = audio::prepare(&args.audio, args.duration, args.encoder.as_deref())
        .context("Failed to prepare audio")?;

    let input = EpisodeInput {
        audio_path: prepared.mp3_path,
        title,
        description,
        duration: prepared.duration,
    };

    let backup_dir = settings.backup_dir.clone();
    let engine = FeedEngine::new(settings, tracing::info_span!("publish"));

    match engine.add_episode(&input) {
        Ok(publication) => {
            println!(
                "Published '{}' to {} ({} episodes)",
                input.title,
                publication.feed_path.display(),
                publication.item_count
            );
            if let Some(backup) = publication.backup {
                println!("Previous feed saved as {}", backup.display());
            }
            Ok(())
        }
        Err(e @ FeedError::RestoreFailed { .. }) => {
            eprintln!("The feed could not be written and the backup could not be restored.");
            eprintln!(
                "Copy the newest file from {} over the feed by hand.",
                backup_dir.display()
            );
            Err(e.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to publish episode")),
    }
}

/// Uses the flag value when given, otherwise asks on stdin. Blank answers
/// are fatal.
fn answer_or_prompt(given: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = given {
        return Ok(value);
    }

    print!("{label}: ");
    std::io::stdout().flush().context("Failed to write prompt")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))?;

    let answer = line.trim();
    if answer.is_empty() {
        bail!("{label} cannot be empty");
    }
    Ok(answer.to_string())
}
