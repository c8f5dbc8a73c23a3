//! Subcommand implementations over the shared services

use crate::cli::Command;
use anyhow::{bail, Context, Result};
use app_core::{FailReason, ResizeMode, Services, ThumbnailOptions, ThumbnailResult};
use app_fs::{NestedPath, VfsEntry};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub async fn run(services: &Services, command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Roots => {
            for root in services.vfs.roots() {
                println!("{}", root);
            }
            Ok(())
        }
        Command::Ls { path, json } => ls(services, &path, json).await,
        Command::Cat { path } => cat(services, &path, cancel).await,
        Command::Stat { path, json } => {
            let entry = services.vfs.stat(&path).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("path:     {}", entry.path);
                println!("kind:     {}", kind_label(&entry));
                println!("size:     {}", entry.size);
                println!("modified: {}", entry.modified.to_rfc3339());
            }
            Ok(())
        }
        Command::Extract { path, out } => extract(services, &path, &out, cancel).await,
        Command::Thumb {
            path,
            width,
            height,
            mode,
            out,
            cache_only,
        } => thumb(services, &path, width, height, mode, &out, cache_only, cancel).await,
    }
}

fn kind_label(entry: &VfsEntry) -> &'static str {
    if entry.is_dir() {
        "directory"
    } else if entry.is_archive() {
        "archive"
    } else {
        "file"
    }
}

/// Archives named without a trailing `::` are listed as their root
async fn browsable(services: &Services, path: &NestedPath) -> Result<NestedPath> {
    let entry = services.vfs.stat(path).await?;
    if entry.is_archive() {
        Ok(path.as_directory())
    } else if entry.is_dir() {
        Ok(path.clone())
    } else {
        bail!("not a directory: {}", path)
    }
}

async fn ls(services: &Services, path: &NestedPath, json: bool) -> Result<()> {
    let dir = if path.is_archive_root() {
        path.clone()
    } else {
        browsable(services, path).await?
    };
    let entries = services.vfs.list(&dir).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        let marker = if entry.is_dir() {
            'd'
        } else if entry.is_archive() {
            'a'
        } else {
            '-'
        };
        println!(
            "{} {:>12} {} {}",
            marker,
            entry.size,
            entry.modified.format("%Y-%m-%d %H:%M"),
            entry.name
        );
    }
    Ok(())
}

async fn cat(services: &Services, path: &NestedPath, cancel: &CancellationToken) -> Result<()> {
    let bytes = services.vfs.read(path, cancel).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

async fn extract(
    services: &Services,
    path: &NestedPath,
    out: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(extracted) = services.vfs.try_extract_file(path, cancel).await? else {
        bail!("{} is not inside an archive", path);
    };

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let dest = out.join(path.file_name());
    std::fs::copy(extracted.path(), &dest)
        .with_context(|| format!("copying to {}", dest.display()))?;
    extracted.dispose();

    println!("{}", dest.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn thumb(
    services: &Services,
    path: &NestedPath,
    width: u32,
    height: u32,
    mode: ResizeMode,
    out: &Path,
    cache_only: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("thumbnail size must be positive");
    }
    let options = ThumbnailOptions::new(width, height, mode);
    let entry = services.vfs.stat(path).await?;

    let result = if entry.is_dir() {
        services.directory_thumbnails.generate(&entry, options)?
    } else {
        services
            .file_thumbnails
            .generate(&entry, options, cache_only, cancel)
            .await?
    };

    match result {
        ThumbnailResult::Succeeded(contents) => {
            std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
            for (i, image) in contents.iter().enumerate() {
                let dest = thumbnail_path(out, &entry, i, options);
                std::fs::write(&dest, image)
                    .with_context(|| format!("writing {}", dest.display()))?;
                println!("{}", dest.display());
            }
            Ok(())
        }
        ThumbnailResult::Failed(FailReason::CacheMiss) => bail!("no cached thumbnail for {}", path),
        ThumbnailResult::Failed(FailReason::NotSupported) => {
            bail!("cannot render a thumbnail for {}", path)
        }
        ThumbnailResult::Failed(FailReason::Cancelled) => bail!("cancelled"),
    }
}

fn thumbnail_path(out: &Path, entry: &VfsEntry, index: usize, options: ThumbnailOptions) -> PathBuf {
    let stem = Path::new(&entry.name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("thumbnail");
    out.join(format!("{}-{}.{}", stem, index, options.format.extension()))
}
