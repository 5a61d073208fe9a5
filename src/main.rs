// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use pacrat::callback::{CallbackSink, Event, LogLevel, Question};
use pacrat::config::Config;
use pacrat::dep;
use pacrat::handle::Handle;
use pacrat::package;
use pacrat::transaction::{RemoveDepth, TransactionFlags};
use pacrat::version::vercmp;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pacrat")]
#[command(author, version, about = "Package resolution and transaction engine", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two version strings; prints -1, 0, or 1
    Vercmp {
        first: String,
        second: String,
    },
    /// Check dependency specs against the installed set
    ///
    /// Prints each unsatisfied spec and exits 127 when any is missing.
    Deptest {
        /// Dependency specs, e.g. `glibc>=2.34`
        deps: Vec<String>,
    },
    /// List or search installed packages
    Query {
        /// Exact names, or regex patterns with --search
        patterns: Vec<String>,
        /// Match patterns against names and descriptions
        #[arg(short, long)]
        search: bool,
    },
    /// Show full details of an installed or sync package
    Info {
        name: String,
    },
    /// Install package files
    Install {
        /// Paths to `.pkg.tar.{zst,xz,gz}` files
        files: Vec<PathBuf>,
        /// Skip dependency resolution
        #[arg(long)]
        nodeps: bool,
        /// Record targets as dependencies instead of explicit
        #[arg(long)]
        asdeps: bool,
        /// Stop after the download phase
        #[arg(long)]
        downloadonly: bool,
    },
    /// Remove an installed package
    Remove {
        name: String,
        /// Skip the required-by check
        #[arg(long)]
        nodeps: bool,
        /// Also remove packages that depend on the target
        #[arg(long)]
        cascade: bool,
        /// Follow dependents transitively
        #[arg(long)]
        recursive: bool,
        /// Touch only database records
        #[arg(long)]
        dbonly: bool,
    },
}

/// Sink that renders engine callbacks on the terminal and answers
/// questions with their defaults.
#[derive(Default)]
struct CliSink {
    last_target: Option<String>,
}

impl CallbackSink for CliSink {
    fn on_event(&mut self, event: &Event) {
        match event {
            Event::AddStart(name)
            | Event::UpgradeStart(name)
            | Event::RemoveStart(name)
            | Event::RetrieveStart(name) => println!("{}: {}", event.describe(), name),
            _ => {}
        }
    }

    fn on_question(&mut self, question: &Question) -> bool {
        match question {
            Question::ConflictRemove { first, second } => {
                println!("{first} conflicts with {second} (skipping; use a conflict-aware frontend to override)");
            }
            Question::Replace { old, new } => {
                println!("replacing {old} with {new}");
            }
            Question::RemoveHold { name } => {
                println!("{name} is designated as a hold package (keeping it)");
            }
        }
        question.default_answer()
    }

    fn on_progress(&mut self, target: &str, percent: u8, n_targets: usize, current: usize) {
        if percent == 100 && self.last_target.as_deref() != Some(target) {
            println!("({current}/{n_targets}) {target} done");
            self.last_target = Some(target.to_string());
        }
    }

    fn on_download(&mut self, filename: &str, transferred: u64, total: u64) {
        if transferred == total {
            println!("downloaded {filename} ({total} bytes)");
        }
    }

    fn on_log(&mut self, level: LogLevel, message: &str) {
        if level == LogLevel::Error || level == LogLevel::Warning {
            eprintln!("{message}");
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

fn print_info(pkg: &package::Package) {
    println!("Name            : {}", pkg.name);
    println!("Version         : {}", pkg.version);
    if let Some(desc) = &pkg.desc {
        println!("Description     : {desc}");
    }
    if let Some(arch) = &pkg.arch {
        println!("Architecture    : {arch}");
    }
    if let Some(url) = &pkg.url {
        println!("URL             : {url}");
    }
    if !pkg.licenses.is_empty() {
        println!("Licenses        : {}", pkg.licenses.join("  "));
    }
    if !pkg.groups.is_empty() {
        println!("Groups          : {}", pkg.groups.join("  "));
    }
    if !pkg.provides.is_empty() {
        let provides: Vec<String> = pkg.provides.iter().map(ToString::to_string).collect();
        println!("Provides        : {}", provides.join("  "));
    }
    if !pkg.depends.is_empty() {
        let depends: Vec<String> = pkg.depends.iter().map(ToString::to_string).collect();
        println!("Depends On      : {}", depends.join("  "));
    }
    if !pkg.optdepends.is_empty() {
        println!("Optional Deps   : {}", pkg.optdepends.join("  "));
    }
    if !pkg.conflicts.is_empty() {
        let conflicts: Vec<String> = pkg.conflicts.iter().map(ToString::to_string).collect();
        println!("Conflicts With  : {}", conflicts.join("  "));
    }
    if pkg.isize > 0 {
        println!("Installed Size  : {} B", pkg.isize);
    }
    if let Some(db) = pkg.db() {
        println!("Repository      : {}", db.name());
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Some(Commands::Vercmp { first, second }) => {
            let result = match vercmp(&first, &second) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            println!("{result}");
            Ok(())
        }
        Some(Commands::Deptest { deps }) => {
            let handle = Handle::new(config)?;
            let installed = handle.localdb().pkgcache();
            let mut missing = Vec::new();
            for spec in &deps {
                if dep::find_satisfier(&installed, spec)?.is_none() {
                    missing.push(spec.clone());
                }
            }
            if missing.is_empty() {
                Ok(())
            } else {
                for spec in &missing {
                    println!("{spec}");
                }
                std::process::exit(127);
            }
        }
        Some(Commands::Query { patterns, search }) => {
            let handle = Handle::new(config)?;
            let local = handle.localdb();
            if search {
                let refs: Vec<&str> = patterns.iter().map(String::as_str).collect();
                for pkg in local.search(&refs)? {
                    println!("{} {}", pkg.name, pkg.version);
                    if let Some(desc) = &pkg.desc {
                        println!("    {desc}");
                    }
                }
            } else if patterns.is_empty() {
                for pkg in local.pkgcache() {
                    println!("{} {}", pkg.name, pkg.version);
                }
            } else {
                for name in &patterns {
                    match local.pkg(name) {
                        Some(pkg) => println!("{} {}", pkg.name, pkg.version),
                        None => anyhow::bail!("package '{name}' was not found"),
                    }
                }
            }
            Ok(())
        }
        Some(Commands::Info { name }) => {
            let handle = Handle::new(config)?;
            let found = handle
                .localdb()
                .pkg(&name)
                .or_else(|| handle.syncdbs().iter().find_map(|db| db.pkg(&name)));
            match found {
                Some(pkg) => {
                    print_info(&pkg);
                    let required_by = dep::compute_requiredby(&pkg, handle.localdb());
                    if !required_by.is_empty() {
                        println!("Required By     : {}", required_by.join("  "));
                    }
                    Ok(())
                }
                None => anyhow::bail!("package '{name}' was not found"),
            }
        }
        Some(Commands::Install {
            files,
            nodeps,
            asdeps,
            downloadonly,
        }) => {
            if files.is_empty() {
                anyhow::bail!("no targets specified");
            }
            let mut handle = Handle::new(config)?;
            let mut sink = CliSink::default();
            let flags = TransactionFlags {
                no_deps: nodeps,
                all_deps: asdeps,
                download_only: downloadonly,
                ..TransactionFlags::default()
            };

            let mut targets = Vec::new();
            for file in &files {
                let pkg = package::archive::load(file)?;
                info!("loaded target {}", pkg.fullname());
                targets.push(Rc::new(pkg));
            }

            let mut trans = handle.transaction(flags, &mut sink);
            for pkg in targets {
                trans.add_pkg(pkg)?;
            }
            trans.prepare()?;
            trans.commit()?;
            trans.release();
            Ok(())
        }
        Some(Commands::Remove {
            name,
            nodeps,
            cascade,
            recursive,
            dbonly,
        }) => {
            let mut handle = Handle::new(config)?;
            let target = handle
                .localdb()
                .pkg(&name)
                .ok_or_else(|| anyhow::anyhow!("package '{name}' is not installed"))?;

            let mut sink = CliSink::default();
            let flags = TransactionFlags {
                no_deps: nodeps,
                db_only: dbonly,
                cascade,
                recurse: if recursive {
                    RemoveDepth::All
                } else {
                    RemoveDepth::None
                },
                ..TransactionFlags::default()
            };
            let mut trans = handle.transaction(flags, &mut sink);
            trans.remove_pkg(target)?;
            trans.prepare()?;
            trans.commit()?;
            trans.release();
            Ok(())
        }
        None => {
            println!("pacrat v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pacrat --help' for usage information");
            Ok(())
        }
    }
}
