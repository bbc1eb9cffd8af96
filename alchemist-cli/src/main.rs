//! Archive Alchemist CLI
//!
//! Crafts ZIP and TAR archives with traversal paths, link tricks, duplicate
//! names and special permission bits, and inspects them down to the raw headers.

mod commands;
mod utils;

use alchemist_archive::ArchiveFormat;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use utils::{AttrArgs, ContentArgs, PayloadArgs};

#[derive(Parser)]
#[command(name = "archive-alchemist")]
#[command(
    author,
    version,
    about = "Craft and inspect archives for extraction security testing"
)]
#[command(long_about = "
Archive Alchemist builds ZIP and TAR archives with byte-level control over
paths, links, duplicate names and permission bits, then inspects them down to
the raw headers.

Examples:
  archive-alchemist -f evil.zip add ../../etc/cron.d/job --content '* * * * * id'
  archive-alchemist -f evil.tar add link --symlink /etc/passwd
  archive-alchemist -f evil.tar add link --content 'overwritten'
  archive-alchemist -f evil.tar.gz add bin/tool --content-file ./tool --mode 755 --setuid
  archive-alchemist -f evil.zip list -ll
  archive-alchemist -f evil.zip polyglot --content-file header.gif
  archive-alchemist -f evil.tar extract -o out --vulnerable
")]
struct Cli {
    /// Archive file to create, modify or inspect
    #[arg(short, long)]
    file: PathBuf,

    /// Archive type (auto-detected from content or extension when omitted)
    #[arg(short = 't', long = "type", value_enum)]
    archive_type: Option<TypeArg>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an entry, even if one with the same path already exists
    Add {
        /// Path inside the archive (stored verbatim)
        path: String,

        #[command(flatten)]
        payload: PayloadArgs,

        #[command(flatten)]
        attrs: AttrArgs,

        /// Write a ZIP Unicode Path extra field naming this path instead
        #[arg(long)]
        unicode_path: Option<String>,
    },

    /// Remove an entry (and anything under it), then add the new payload
    Replace {
        /// Path inside the archive
        path: String,

        #[command(flatten)]
        payload: PayloadArgs,

        #[command(flatten)]
        attrs: AttrArgs,

        /// Write a ZIP Unicode Path extra field naming this path instead
        #[arg(long)]
        unicode_path: Option<String>,
    },

    /// Append bytes to the last file entry with this path
    Append {
        /// Path inside the archive
        path: String,

        #[command(flatten)]
        content: ContentArgs,
    },

    /// Change attributes of every entry with this path
    Modify {
        /// Path inside the archive
        path: String,

        #[command(flatten)]
        attrs: AttrArgs,

        /// Turn the entry into a symlink to this target
        #[arg(long)]
        symlink: Option<String>,

        /// Turn the entry into a hardlink to this target
        #[arg(long)]
        hardlink: Option<String>,
    },

    /// Remove entries
    #[command(alias = "rm")]
    Remove {
        /// Path inside the archive
        path: String,

        /// Also remove everything nested under the path
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        recursive: bool,
    },

    /// List archive contents
    #[command(alias = "ls")]
    List {
        /// Detail level: -l for attributes, -ll for raw headers
        #[arg(short = 'l', long = "long", action = ArgAction::Count)]
        level: u8,

        /// Output as JSON (machine-readable)
        #[arg(long)]
        json: bool,
    },

    /// Print the content of an entry
    #[command(alias = "cat")]
    Read {
        /// Path inside the archive
        path: String,

        /// Which of several entries with the same path to read
        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },

    /// Extract the archive
    Extract {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Follow entry paths and links verbatim, like a naive extractor
        #[arg(long)]
        vulnerable: bool,

        /// Use 0644 for files and 0755 for directories
        #[arg(long)]
        normalize_permissions: bool,

        /// Only extract this path and what is nested under it
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Prepend bytes to the archive, keeping it readable
    Polyglot {
        #[command(flatten)]
        content: ContentArgs,
    },
}

/// Archive type accepted by `--type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TypeArg {
    /// ZIP archive
    Zip,
    /// Uncompressed TAR archive
    Tar,
    /// Gzip-compressed TAR
    #[value(name = "tar.gz")]
    TarGz,
    /// XZ-compressed TAR
    #[value(name = "tar.xz")]
    TarXz,
    /// Bzip2-compressed TAR
    #[value(name = "tar.bz2")]
    TarBz2,
}

impl From<TypeArg> for ArchiveFormat {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Zip => ArchiveFormat::Zip,
            TypeArg::Tar => ArchiveFormat::Tar,
            TypeArg::TarGz => ArchiveFormat::TarGz,
            TypeArg::TarXz => ArchiveFormat::TarXz,
            TypeArg::TarBz2 => ArchiveFormat::TarBz2,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = cli.file.as_path();
    let format = cli.archive_type.map(ArchiveFormat::from);

    let result = match cli.command {
        Commands::Add {
            path,
            payload,
            attrs,
            unicode_path,
        } => commands::cmd_add(file, format, &path, payload, &attrs, unicode_path),
        Commands::Replace {
            path,
            payload,
            attrs,
            unicode_path,
        } => commands::cmd_replace(file, format, &path, payload, &attrs, unicode_path),
        Commands::Append { path, content } => commands::cmd_append(file, format, &path, content),
        Commands::Modify {
            path,
            attrs,
            symlink,
            hardlink,
        } => commands::cmd_modify(file, format, &path, &attrs, symlink, hardlink),
        Commands::Remove { path, recursive } => {
            commands::cmd_remove(file, format, &path, recursive)
        }
        Commands::List { level, json } => commands::cmd_list(file, format, level, json),
        Commands::Read { path, index } => commands::cmd_read(file, format, &path, index),
        Commands::Extract {
            output_dir,
            vulnerable,
            normalize_permissions,
            path,
        } => {
            let options = alchemist_archive::ExtractOptions::new(output_dir)
                .with_vulnerable(vulnerable)
                .with_normalized_permissions(normalize_permissions)
                .with_path_filter(path);
            commands::cmd_extract(file, format, &options)
        }
        Commands::Polyglot { content } => commands::cmd_polyglot(file, format, content),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
