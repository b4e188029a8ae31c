//! Command-line surface: subcommands `download`, `install`, `update`,
//! `uninstall`, `verify`, `version`, wired with `clap`'s builder API the
//! same way the teacher's tool subcommands are registered.

use std::path::PathBuf;

use log::LevelFilter;

use crate::config::AppConfig;
use crate::fs::{FileSystem, RealFs};
use crate::prompt::{FixedConfirm, StdinConfirm};
use crate::HttpClient;

const DEFAULT_INSTALL_DIR: &str = "/usr/local/go";

pub struct App {
    cmd: clap::Command,
}

impl App {
    pub fn new() -> Self {
        let install_dir_arg = clap::Arg::new("install-dir")
            .short('d')
            .long("install-dir")
            .value_name("DIR")
            .default_value(DEFAULT_INSTALL_DIR);

        Self {
            cmd: clap::Command::new("goup")
                .about("Installs, updates, verifies, and removes the official Go toolchain")
                .version(crate::build_info::get().version)
                .subcommand_required(true)
                .arg_required_else_help(true)
                .arg(
                    clap::Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(clap::ArgAction::Count),
                )
                .subcommand(
                    clap::Command::new("download")
                        .about("Downloads and verifies the latest Go archive without installing it")
                        .arg(install_dir_arg.clone()),
                )
                .subcommand(
                    clap::Command::new("install")
                        .about("Installs the latest Go toolchain into the install directory")
                        .arg(install_dir_arg.clone()),
                )
                .subcommand(
                    clap::Command::new("update")
                        .about("Updates an existing Go installation to the latest release")
                        .arg(install_dir_arg.clone())
                        .arg(
                            clap::Arg::new("auto-install")
                                .long("auto-install")
                                .action(clap::ArgAction::SetTrue),
                        )
                        .arg(
                            clap::Arg::new("yes")
                                .long("yes")
                                .action(clap::ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    clap::Command::new("uninstall")
                        .about("Removes the installed Go toolchain")
                        .arg(install_dir_arg.clone()),
                )
                .subcommand(
                    clap::Command::new("verify")
                        .about("Checks that the installed Go toolchain reports the expected version")
                        .arg(install_dir_arg.clone())
                        .arg(clap::Arg::new("expected").required(true)),
                )
                .subcommand(
                    clap::Command::new("version")
                        .about("Prints build identity information")
                        .arg(
                            clap::Arg::new("json")
                                .long("json")
                                .action(clap::ArgAction::SetTrue),
                        ),
                ),
        }
    }

    pub async fn run(self, client: &HttpClient) -> anyhow::Result<()> {
        let matches = self.cmd.get_matches();

        match matches.get_count("verbose") {
            0 => log::set_max_level(LevelFilter::Info),
            1 => log::set_max_level(LevelFilter::Debug),
            _ => log::set_max_level(LevelFilter::Trace),
        }

        let fs = RealFs;
        let config = crate::config::load().unwrap_or_default();

        match matches.subcommand() {
            Some(("download", args)) => run_download(&fs, client, &config, args).await,
            Some(("install", args)) => run_install(&fs, client, &config, args).await,
            Some(("update", args)) => run_update_cmd(&fs, client, &config, args).await,
            Some(("uninstall", args)) => run_uninstall(&fs, args),
            Some(("verify", args)) => run_verify(args).await,
            Some(("version", args)) => run_version(args),
            _ => unreachable!("clap enforces subcommand_required"),
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn install_dir_of(args: &clap::ArgMatches) -> PathBuf {
    PathBuf::from(args.get_one::<String>("install-dir").unwrap())
}

async fn run_download(
    fs: &dyn FileSystem,
    client: &HttpClient,
    config: &AppConfig,
    args: &clap::ArgMatches,
) -> anyhow::Result<()> {
    let _install_dir = install_dir_of(args);
    let selected = crate::index::fetch_latest(client, config.http_retries).await?;
    let tmp_parent = std::env::temp_dir();
    let filename = selected.url.rsplit('/').next().unwrap_or(&selected.url).to_string();
    let (guard, outcome) =
        crate::download::download_and_verify(client, fs, &selected.url, &filename, &selected.sha256, &tmp_parent)
            .await?;
    println!(
        "downloaded {} ({}) to {}",
        selected.version,
        selected.sha256,
        outcome.archive_path.display()
    );
    drop(guard);
    Ok(())
}

async fn run_install(
    fs: &dyn FileSystem,
    client: &HttpClient,
    config: &AppConfig,
    args: &clap::ArgMatches,
) -> anyhow::Result<()> {
    let install_dir = install_dir_of(args);
    let options = crate::orchestrator::UpdateOptions {
        install_dir,
        auto_install: true,
        assume_yes: true,
    };
    let outcome = crate::orchestrator::run_update(fs, client, config, &FixedConfirm(true), &options).await?;
    println!("installed {}", outcome.latest);
    Ok(())
}

async fn run_update_cmd(
    fs: &dyn FileSystem,
    client: &HttpClient,
    config: &AppConfig,
    args: &clap::ArgMatches,
) -> anyhow::Result<()> {
    let install_dir = install_dir_of(args);
    let auto_install = args.get_flag("auto-install");
    let assume_yes = args.get_flag("yes");
    let options = crate::orchestrator::UpdateOptions {
        install_dir,
        auto_install,
        assume_yes,
    };

    let outcome = if assume_yes {
        crate::orchestrator::run_update(fs, client, config, &FixedConfirm(true), &options).await?
    } else {
        crate::orchestrator::run_update(fs, client, config, &StdinConfirm, &options).await?
    };

    match outcome.decision {
        crate::orchestrator::Decision::NoOp => println!("already up to date at {}", outcome.latest),
        crate::orchestrator::Decision::FreshInstall => println!("installed {}", outcome.latest),
        crate::orchestrator::Decision::Upgrade => println!("updated to {}", outcome.latest),
    }
    Ok(())
}

fn run_uninstall(fs: &dyn FileSystem, args: &clap::ArgMatches) -> anyhow::Result<()> {
    let install_dir = install_dir_of(args);
    crate::privilege::elevate_for_operation("uninstall", &std::env::args().collect::<Vec<_>>())?;
    crate::uninstall::uninstall(fs, &install_dir)?;
    println!("removed {}", install_dir.display());
    Ok(())
}

async fn run_verify(args: &clap::ArgMatches) -> anyhow::Result<()> {
    let install_dir = install_dir_of(args);
    let expected = args.get_one::<String>("expected").unwrap();
    let expected = crate::version::parse(expected)?;
    crate::verify::verify(&install_dir, &expected).await?;
    println!("{} reports {}", install_dir.display(), expected);
    Ok(())
}

fn run_version(args: &clap::ArgMatches) -> anyhow::Result<()> {
    let info = crate::build_info::get();
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(info)?);
    } else {
        println!(
            "goup {} ({}) built {} for {}",
            info.version, info.commit, info.build_date, info.target
        );
    }
    Ok(())
}
