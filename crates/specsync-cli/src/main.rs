//! `specsync` binary

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use specsync_cli::commands::{self, PackageArgs};
use specsync_cli::{telemetry, AppConfig};
use specsync_loader::{CrawlResult, IV_PARAMETER, KEY_PARAMETER};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

fn package_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("package")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Encrypted client package on disk"),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .required(true)
                .help("Radix-encoded cipher key (parameter \"0\")"),
        )
        .arg(
            Arg::new("iv")
                .long("iv")
                .required(true)
                .help("Radix-encoded initialization vector (parameter \"-1\")"),
        )
}

fn cli() -> Command {
    Command::new("specsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fetch client packages and synchronize their transform specs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: ./specsync.toml if present)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print the result as JSON"),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download the client package, hash it and resolve its spec")
                .arg(Arg::new("archive").long("archive").help("Package URL"))
                .arg(Arg::new("referer").long("referer").help("Referer sent with the download"))
                .arg(Arg::new("key").long("key").help("Radix-encoded cipher key"))
                .arg(Arg::new("iv").long("iv").help("Radix-encoded initialization vector")),
        )
        .subcommand(package_args(
            Command::new("hash").about("Decode a package on disk and print its content hash"),
        ))
        .subcommand(
            package_args(
                Command::new("resolve").about("Decode a package on disk and resolve its spec"),
            )
            .arg(
                Arg::new("rebuild")
                    .long("rebuild")
                    .action(ArgAction::SetTrue)
                    .help("Ask the cache to rebuild the spec first"),
            ),
        )
}

fn read_package_args(args: &ArgMatches) -> anyhow::Result<PackageArgs> {
    let path = args
        .get_one::<PathBuf>("package")
        .context("missing package path")?;
    let key = args.get_one::<String>("key").context("missing --key")?;
    let iv = args.get_one::<String>("iv").context("missing --iv")?;
    Ok(PackageArgs {
        path: path.clone(),
        key: key.clone(),
        iv: iv.clone(),
    })
}

fn crawl_from(config: &AppConfig, args: &ArgMatches) -> CrawlResult {
    let mut crawl = config.crawl.clone().unwrap_or_else(|| CrawlResult {
        archive: String::new(),
        referer: String::new(),
        parameters: HashMap::new(),
    });
    if let Some(archive) = args.get_one::<String>("archive") {
        crawl.archive.clone_from(archive);
    }
    if let Some(referer) = args.get_one::<String>("referer") {
        crawl.referer.clone_from(referer);
    }
    if let Some(key) = args.get_one::<String>("key") {
        crawl.parameters.insert(KEY_PARAMETER.to_string(), key.clone());
    }
    if let Some(iv) = args.get_one::<String>("iv") {
        crawl.parameters.insert(IV_PARAMETER.to_string(), iv.clone());
    }
    crawl
}

async fn run(matches: &ArgMatches) -> anyhow::Result<String> {
    let config = AppConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let json = matches.get_flag("json");

    let summary = match matches.subcommand() {
        Some(("fetch", args)) => {
            let transport = commands::transport(&config.cache)?;
            commands::fetch(transport, &config, crawl_from(&config, args)).await?
        }
        Some(("hash", args)) => commands::hash(&config, &read_package_args(args)?)?,
        Some(("resolve", args)) => {
            let transport = commands::transport(&config.cache)?;
            let rebuild = args.get_flag("rebuild");
            commands::resolve(transport, &config, &read_package_args(args)?, rebuild).await?
        }
        _ => anyhow::bail!("unknown command"),
    };
    summary.render(json)
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    telemetry::init(
        matches.get_count("verbose"),
        matches.get_flag("log-json"),
    );

    match run(&matches).await {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!("{err:?}");
            eprintln!("error: {}", commands::user_message(&err));
            ExitCode::FAILURE
        }
    }
}
