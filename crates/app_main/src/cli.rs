use app_core::ResizeMode;
use app_fs::NestedPath;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nestfiler")]
#[command(version)]
#[command(about = "Browse files inside nested archives and render thumbnails", long_about = None)]
#[command(after_help = "Paths cross archive boundaries with '::':\n  \
  nestfiler ls books.zip::                     list the root of books.zip\n  \
  nestfiler cat books.zip::vol1.rar::001.jpg   print an entry nested two archives deep\n  \
  nestfiler thumb movie.mp4 --out thumbs       render movie frames into ./thumbs")]
pub struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List file system roots
    Roots,

    /// List a directory, an archive or a directory inside an archive
    Ls {
        #[arg(value_name = "PATH")]
        path: NestedPath,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a file's contents to stdout
    Cat {
        #[arg(value_name = "PATH")]
        path: NestedPath,
    },

    /// Show size, kind and modification time
    Stat {
        #[arg(value_name = "PATH")]
        path: NestedPath,

        /// Print the entry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy an archive entry to a directory
    Extract {
        #[arg(value_name = "PATH")]
        path: NestedPath,

        /// Destination directory
        #[arg(long, short = 'o', value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Render thumbnails for a picture, movie or directory
    Thumb {
        #[arg(value_name = "PATH")]
        path: NestedPath,

        #[arg(long, default_value_t = 256)]
        width: u32,

        #[arg(long, default_value_t = 256)]
        height: u32,

        /// pad or crop
        #[arg(long, default_value = "pad")]
        mode: ResizeMode,

        /// Destination directory
        #[arg(long, short = 'o', value_name = "DIR", default_value = ".")]
        out: PathBuf,

        /// Only report cached thumbnails; never decode
        #[arg(long)]
        cache_only: bool,
    },
}
