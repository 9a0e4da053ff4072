use anyhow::Result;
use charpack::cleanup;
use charpack::commands::{self, Config};
use charpack::runtime::RealRuntime;
use log::warn;
use std::path::PathBuf;

/// charpack - character package installer
///
/// Validates, installs, updates and removes signed character packages
/// (avatar assets, personality presets and their manifest).
///
/// Examples:
///   charpack install hero.zip       # Install a package archive
///   charpack update hero            # Update from {root}/updates/hero.zip
///   charpack list                   # List installed packages
#[derive(clap::Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Packages root directory (overrides defaults; also via CHARPACK_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "CHARPACK_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub packages_root: Option<PathBuf>,

    /// Host system version packages are checked against
    #[arg(long = "system-version", value_name = "VERSION", global = true)]
    pub system_version: Option<String>,

    /// Feature supported by the host system (repeatable)
    #[arg(long = "feature", value_name = "NAME", global = true)]
    pub features: Vec<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package archive
    Install(InstallArgs),

    /// Update an installed package
    Update(UpdateArgs),

    /// Uninstall a package
    Uninstall(PackageArgs),

    /// List installed packages
    List(ListArgs),

    /// Show details of an installed package
    Show(ShowArgs),

    /// Record that a package was just used
    MarkUsed(PackageArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Path to the package archive (.zip)
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Print the installation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    #[arg(value_name = "PACKAGE_ID")]
    pub package_id: String,

    /// Archive to update from (defaults to the staged update archive)
    #[arg(long, short = 'a', value_name = "ARCHIVE")]
    pub archive: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    #[arg(value_name = "PACKAGE_ID")]
    pub package_id: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    #[arg(value_name = "PACKAGE_ID")]
    pub package_id: String,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = <Cli as clap::Parser>::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = RealRuntime;
    let config = Config::new(
        &runtime,
        cli.packages_root,
        cli.system_version,
        cli.features,
    )?;

    let cancel = config.cancel.clone();
    let cleanup_ctx = config.cleanup.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cleaning up");
            cancel.cancel();
            cleanup::lock(&cleanup_ctx).cleanup(&RealRuntime);
            std::process::exit(130);
        }
    });

    match cli.command {
        Commands::Install(args) => {
            commands::install(&runtime, &args.archive, args.json, config).await?
        }
        Commands::Update(args) => {
            commands::update(&runtime, &args.package_id, args.archive.as_deref(), config).await?
        }
        Commands::Uninstall(args) => commands::uninstall(&runtime, &args.package_id, config).await?,
        Commands::List(args) => commands::list(&runtime, args.json, config)?,
        Commands::Show(args) => commands::show(&runtime, &args.package_id, args.json, config)?,
        Commands::MarkUsed(args) => commands::mark_used(&runtime, &args.package_id, config)?,
    }
    Ok(())
}
