#![forbid(unsafe_code)]

//! Describes downloaded videos with Gemini.
//!
//! Individual files are described on stdout. `--topic` walks a topic folder and
//! stores one Markdown summary per video under `summaries/<topic>/`, skipping
//! videos that already have one.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use topictube_tools::config::{RuntimeOverrides, resolve_runtime_settings};
use topictube_tools::gemini::{GeminiClient, scene_breakdown_prompt};
use topictube_tools::layout::DataLayout;
use topictube_tools::logging;
use topictube_tools::sweep::is_video_file_name;
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(name = "summarize_video")]
#[command(about = "Describe downloaded videos scene by scene with Gemini")]
#[command(version)]
struct Cli {
    /// Video files to describe
    #[arg(conflicts_with_all = ["topic", "query", "list_models"])]
    files: Vec<PathBuf>,

    /// Prompt sent along with each video
    #[arg(long)]
    prompt: Option<String>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// Summarize every video of a topic into the summaries folder
    #[arg(long, conflicts_with_all = ["query", "list_models"])]
    topic: Option<String>,

    /// Send a plain text prompt and print the answer
    #[arg(long, conflicts_with = "list_models")]
    query: Option<String>,

    /// Print the models available to the API key
    #[arg(long)]
    list_models: bool,

    /// Re-create summaries that already exist (with --topic)
    #[arg(long)]
    force: bool,

    /// Root folder holding the topic folders
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(?cli, "parsed arguments");

    let settings = resolve_runtime_settings(RuntimeOverrides {
        data_root: cli.data_root.clone(),
        gemini_model: cli.model.clone(),
        ..RuntimeOverrides::default()
    })?;
    let client = GeminiClient::from_settings(&settings)?;

    if cli.list_models {
        for model in client.list_models()? {
            println!("{model}");
        }
        return Ok(());
    }

    if let Some(query) = &cli.query {
        println!("{}", client.generate(query, None)?);
        return Ok(());
    }

    let prompt = cli.prompt.as_deref().unwrap_or(scene_breakdown_prompt());

    if let Some(topic) = &cli.topic {
        let layout = DataLayout::new(&settings.data_root);
        return summarize_topic(&client, &layout, topic, prompt, cli.force);
    }

    if cli.files.is_empty() {
        bail!("nothing to do; pass video files, --topic, --query or --list-models");
    }
    for file in &cli.files {
        println!("===================================");
        println!("{}", file.display());
        println!("===================================");
        println!("{}", client.describe_video(file, prompt)?);
    }
    Ok(())
}

fn summarize_topic(
    client: &GeminiClient,
    layout: &DataLayout,
    topic: &str,
    prompt: &str,
    force: bool,
) -> Result<()> {
    let folder = layout.topic_dir(topic)?;
    let summary_dir = layout.summary_dir(topic)?;
    let videos = collect_videos(&folder)?;
    println!("Found {} videos in {}", videos.len(), folder.display());

    let (mut written, mut skipped, mut failed) = (0, 0, Vec::new());
    for (index, video) in videos.iter().enumerate() {
        let target = summary_path(&summary_dir, video);
        println!();
        println!("[{}/{}] {}", index + 1, videos.len(), video.display());
        if target.exists() && !force {
            println!("Summary already exists: {}", target.display());
            skipped += 1;
            continue;
        }
        match client
            .describe_video(video, prompt)
            .and_then(|text| write_summary(&target, video, client.model(), &text))
        {
            Ok(()) => {
                println!("Summary saved to: {}", target.display());
                written += 1;
            }
            Err(err) => {
                tracing::warn!(video = %video.display(), "summary failed: {err:#}");
                println!("Summary failed: {err}");
                failed.push(video.clone());
            }
        }
    }

    println!();
    println!("==================================================");
    println!("SUMMARY");
    println!("==================================================");
    println!("Written: {written}");
    println!("Already present: {skipped}");
    println!("Failed: {}", failed.len());
    for video in &failed {
        println!("  - {}", video.display());
    }
    Ok(())
}

/// Video files directly inside `folder`, sorted by name.
fn collect_videos(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("walking {}", folder.display()))?;
        if entry.file_type().is_file() && is_video_file_name(&entry.file_name().to_string_lossy()) {
            videos.push(entry.into_path());
        }
    }
    Ok(videos)
}

fn summary_path(summary_dir: &Path, video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    summary_dir.join(format!("{stem}.md"))
}

fn write_summary(target: &Path, video: &Path, model: &str, text: &str) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let title = video
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let body = format!("# {title}\n\n_Model: {model}_\n\n{}\n", text.trim_end());
    fs::write(target, body).with_context(|| format!("writing {}", target.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["summarize_video", "a.mp4", "--topic", "t"]).is_err());
        assert!(Cli::try_parse_from(["summarize_video", "--query", "q", "--list-models"]).is_err());
        let cli = Cli::parse_from(["summarize_video", "a.mp4", "b.mkv", "--model", "gemini-1.5-flash"]);
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.model.as_deref(), Some("gemini-1.5-flash"));
    }

    #[test]
    fn collects_only_top_level_videos() -> Result<()> {
        let dir = tempdir()?;
        for name in ["b_2.mp4", "a_1.webm", "notes.txt"] {
            fs::write(dir.path().join(name), "x")?;
        }
        fs::create_dir(dir.path().join("nested"))?;
        fs::write(dir.path().join("nested/c_3.mp4"), "x")?;

        let videos = collect_videos(dir.path())?;
        let names: Vec<_> = videos
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_1.webm", "b_2.mp4"]);
        Ok(())
    }

    #[test]
    fn summary_path_uses_video_stem() -> Result<()> {
        let dir = tempdir()?;
        let target = summary_path(&dir.path().join("summaries/t"), Path::new("/x/Title_AB.mp4"));
        assert_eq!(target, dir.path().join("summaries/t/Title_AB.md"));

        write_summary(&target, Path::new("/x/Title_AB.mp4"), "m", "Scene 1\n\n")?;
        let written = fs::read_to_string(&target)?;
        assert!(written.starts_with("# Title_AB.mp4\n"));
        assert!(written.ends_with("Scene 1\n"));
        Ok(())
    }
}
