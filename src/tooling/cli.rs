//! CLI Tooling
//!
//! Command-line interface over the session API. Every one-shot command runs
//! in its own session. Mutating commands commit on success and abandon on a
//! fatal error; inspecting commands always abandon.

use crate::audit::{self, AuditReport};
use crate::config::{xdg, ConfigLoader, DedupConfig, RootLayout};
use crate::error::ApiError;
use crate::logging::{LogFormat, LogTarget, LoggingConfig};
use crate::session::{ExtensionFilter, ImportMode, OpenOptions, VirtualFileSystem};
use crate::tree::{DirEntry, NodeInfo};
use crate::types::NodeKind;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// dedupfs - per-user virtual filesystems over shared, deduplicated storage
#[derive(Parser, Debug)]
#[command(name = "dedupfs")]
#[command(about = "Per-user virtual filesystems over a shared content-addressed store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// User whose tree to operate on (default: "default")
    #[arg(long, short = 'u', global = true)]
    pub user: Option<String>,

    /// Configuration file path (layered over the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Create the root skeleton if it is missing
    #[arg(long, global = true)]
    pub init: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long, global = true)]
    pub log_output: Option<LogTarget>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Fold the logging flags over the configured logging section.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.format = format;
        }
        if let Some(output) = self.log_output {
            config.output = output;
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the store skeleton and the user's tree
    Init,
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print a file
    Cat { path: String },
    /// Show node details
    Stat {
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parents
        #[arg(short = 'p', long)]
        parents: bool,
    },
    /// Remove a file or directory
    Rm {
        path: String,
        /// Remove directories and their contents
        #[arg(short = 'r', long)]
        recursive: bool,
        /// Do not ask for confirmation
        #[arg(long)]
        force: bool,
    },
    /// Move or rename a node
    Mv { src: String, dst: String },
    /// Copy a node
    Cp { src: String, dst: String },
    /// Import a host file or directory
    Import {
        host: PathBuf,
        inner: String,
        /// Delete the host source after importing
        #[arg(long = "move")]
        move_source: bool,
        /// Only import files with these extensions (comma separated)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },
    /// Export a file or directory to a new host path
    Export {
        inner: String,
        host: PathBuf,
        /// Only export files with these extensions (comma separated)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },
    /// Compare two directories
    Diff { base: String, patch: String },
    /// Check refcounts against every user tree and the entity directory
    Audit {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete orphan entities and stale temporary files
    Sweep {
        /// Actually delete (default: report only)
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Config,
    /// Interactive shell
    Shell,
}

/// Resolved root, user and options for command execution.
pub struct CliContext {
    config: DedupConfig,
    root: PathBuf,
    user: String,
    init: bool,
}

impl CliContext {
    /// Load configuration and resolve the root and user.
    ///
    /// Precedence for both: command line, configuration, built-in default.
    pub fn new(
        root: Option<PathBuf>,
        user: Option<String>,
        config_path: Option<PathBuf>,
        init: bool,
    ) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        let root = match root.or_else(|| config.root.clone()) {
            Some(root) => root,
            None => xdg::default_root()?,
        };
        let user = user
            .or_else(|| config.user.clone())
            .unwrap_or_else(|| "default".to_string());
        Ok(Self {
            config,
            root,
            user,
            init,
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn options(&self, init: bool) -> OpenOptions {
        OpenOptions {
            init: self.init || init,
            layout: self.config.layout.clone(),
            documents: self.config.documents.clone(),
        }
    }

    fn layout(&self) -> RootLayout {
        RootLayout::new(&self.root, self.config.layout.clone())
    }

    fn scoped<T>(
        &self,
        f: impl FnOnce(&mut VirtualFileSystem) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        VirtualFileSystem::scoped(&self.root, &self.user, &self.options(false), f)
    }

    /// Run `f` in a session that is abandoned afterwards, whatever the result.
    fn read_only<T>(
        &self,
        f: impl FnOnce(&VirtualFileSystem) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut vfs = VirtualFileSystem::open(&self.root, &self.user, &self.options(false))?;
        let result = f(&vfs);
        vfs.abandon()?;
        result
    }

    /// Stream the bytes of `path` to `out` unchanged.
    pub fn cat_to<W: Write>(&self, path: &str, out: &mut W) -> Result<u64, ApiError> {
        self.read_only(|vfs| vfs.read_to_writer(path, out))
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Init => {
                VirtualFileSystem::scoped(&self.root, &self.user, &self.options(true), |_| Ok(()))?;
                info!(root = %self.root.display(), user = %self.user, "Init command");
                Ok(format!(
                    "Initialized store at {} for user {}",
                    self.root.display(),
                    self.user
                ))
            }
            Commands::Ls { path, format } => {
                let entries = self.read_only(|vfs| vfs.list(path))?;
                format_listing(&entries, format)
            }
            Commands::Cat { path } => {
                let mut bytes = Vec::new();
                self.cat_to(path, &mut bytes)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Commands::Stat { path, format } => {
                let info = self.read_only(|vfs| vfs.stat(path))?;
                format_stat(&info, format)
            }
            Commands::Mkdir { path, parents } => {
                self.scoped(|vfs| vfs.make_dir(path, *parents))?;
                Ok(format!("Created directory {}", path))
            }
            Commands::Rm {
                path,
                recursive,
                force,
            } => {
                if *recursive && !force {
                    use dialoguer::Confirm;
                    let confirmed = Confirm::new()
                        .with_prompt(format!("Remove {} and everything below it?", path))
                        .interact()
                        .map_err(|e| {
                            ApiError::ConfigError(format!("Failed to get user input: {}", e))
                        })?;
                    if !confirmed {
                        return Ok("Removal cancelled".to_string());
                    }
                }
                let outcome = self.scoped(|vfs| vfs.remove(path, *recursive))?;
                let mut message = format!(
                    "Removed {}: {} file(s) detached, {} entit{} reclaimed",
                    path,
                    outcome.files,
                    outcome.reclaimed,
                    if outcome.reclaimed == 1 { "y" } else { "ies" }
                );
                if outcome.orphaned > 0 {
                    message.push_str(&format!(
                        ", {} left as orphans (run sweep)",
                        outcome.orphaned
                    ));
                }
                Ok(message)
            }
            Commands::Mv { src, dst } => {
                self.scoped(|vfs| vfs.move_node(src, dst))?;
                Ok(format!("Moved {} -> {}", src, dst))
            }
            Commands::Cp { src, dst } => {
                let files = self.scoped(|vfs| vfs.copy(src, dst))?;
                Ok(format!("Copied {} -> {} ({} file(s))", src, dst, files))
            }
            Commands::Import {
                host,
                inner,
                move_source,
                ext,
            } => {
                let mode = if *move_source {
                    ImportMode::Move
                } else {
                    ImportMode::Copy
                };
                let filter = extension_filter(ext);
                let summary = self.scoped(|vfs| vfs.import_host(host, inner, mode, &filter))?;
                Ok(format!(
                    "Imported {} file(s) and {} dir(s) into {} ({} bytes, {} new entities, {} skipped)",
                    summary.files,
                    summary.dirs,
                    inner,
                    summary.bytes,
                    summary.new_entities,
                    summary.skipped
                ))
            }
            Commands::Export { inner, host, ext } => {
                let filter = extension_filter(ext);
                let summary = self.read_only(|vfs| vfs.export_host(inner, host, &filter))?;
                Ok(format!(
                    "Exported {} file(s) and {} dir(s) to {} ({} bytes, {} skipped)",
                    summary.files,
                    summary.dirs,
                    host.display(),
                    summary.bytes,
                    summary.skipped
                ))
            }
            Commands::Diff { base, patch } => {
                let lines = self.read_only(|vfs| vfs.diff(base, patch))?;
                if lines.is_empty() {
                    return Ok("No differences".to_string());
                }
                Ok(lines
                    .iter()
                    .map(|l| match l {
                        crate::session::DiffLine::Removed(_) => l.to_string().red().to_string(),
                        crate::session::DiffLine::Added(_) => l.to_string().green().to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Commands::Audit { format } => {
                let report = audit::audit_root(&self.layout())?;
                format_audit(&report, format)
            }
            Commands::Sweep { force } => {
                if !force {
                    let report = audit::audit_root(&self.layout())?;
                    return Ok(format!(
                        "Would remove {} orphan entit{} and {} temporary file(s). Use --force to delete.",
                        report.orphans.len(),
                        if report.orphans.len() == 1 { "y" } else { "ies" },
                        report.temporaries.len()
                    ));
                }
                let sweep = audit::sweep_orphans(&self.layout())?;
                Ok(format!(
                    "Removed {} orphan entit{} and {} temporary file(s), {} bytes freed",
                    sweep.entities,
                    if sweep.entities == 1 { "y" } else { "ies" },
                    sweep.temporaries,
                    sweep.bytes
                ))
            }
            Commands::Config => {
                let mut effective = self.config.clone();
                effective.root = Some(self.root.clone());
                effective.user = Some(self.user.clone());
                toml::to_string_pretty(&effective)
                    .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
            }
            Commands::Shell => {
                let stdin = std::io::stdin();
                let mut stdout = std::io::stdout();
                self.scoped(|vfs| super::shell::run_shell(vfs, stdin.lock(), &mut stdout))?;
                Ok("Session committed".to_string())
            }
        }
    }
}

fn extension_filter(ext: &[String]) -> ExtensionFilter {
    if ext.is_empty() {
        ExtensionFilter::all()
    } else {
        ExtensionFilter::only(ext)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ConfigError(format!("Failed to render JSON: {}", e)))
}

fn format_listing(entries: &[DirEntry], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&entries);
    }
    if entries.is_empty() {
        return Ok("(empty)".to_string());
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Name", "Kind", "Size", "Modified", "Digest"]);
    for entry in entries {
        let name = match entry.kind {
            NodeKind::Directory => format!("{}/", entry.name),
            NodeKind::File => entry.name.clone(),
        };
        let digest = entry
            .digest
            .map(|d| d.short())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            name,
            entry.kind.to_string(),
            entry.size.to_string(),
            entry.modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            digest,
        ]);
    }
    Ok(table.to_string())
}

fn format_stat(info: &NodeInfo, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(info);
    }
    let mut out = format!("{}\n", info.path.bold());
    out.push_str(&format!("  kind:     {}\n", info.kind));
    match info.kind {
        NodeKind::Directory => out.push_str(&format!("  entries:  {}\n", info.size)),
        NodeKind::File => out.push_str(&format!("  size:     {}\n", info.size)),
    }
    if let Some(digest) = &info.digest {
        out.push_str(&format!("  digest:   {}\n", digest));
    }
    out.push_str(&format!("  created:  {}\n", info.metadata.created.to_rfc3339()));
    out.push_str(&format!("  modified: {}", info.metadata.modified.to_rfc3339()));
    for (key, value) in &info.metadata.attributes {
        out.push_str(&format!("\n  {}: {}", key, value));
    }
    Ok(out)
}

fn format_audit(report: &AuditReport, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(report);
    }
    let status = if report.is_consistent() {
        "consistent".green().to_string()
    } else {
        "INCONSISTENT".red().to_string()
    };
    let mut out = format!(
        "Audit: {}\n  users: {}\n  counted digests: {}\n  entity files: {}\n  orphans: {}\n  temporaries: {}",
        status,
        report.users,
        report.digests,
        report.entities,
        report.orphans.len(),
        report.temporaries.len()
    );
    if !report.mismatches.is_empty() {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Digest", "Recorded", "Expected"]);
        for m in &report.mismatches {
            table.add_row(vec![
                m.digest.to_hex(),
                m.recorded.to_string(),
                m.expected.to_string(),
            ]);
        }
        out.push_str(&format!("\n\nCount mismatches ({}):\n{}", report.mismatches.len(), table));
    }
    if !report.missing.is_empty() {
        out.push_str(&format!("\n\nMissing entities ({}):", report.missing.len()));
        for digest in &report.missing {
            out.push_str(&format!("\n  - {}", digest));
        }
    }
    if !report.foreign.is_empty() {
        out.push_str(&format!("\n\nForeign files ({}):", report.foreign.len()));
        for path in &report.foreign {
            out.push_str(&format!("\n  - {}", path.display()));
        }
    }
    Ok(out)
}
