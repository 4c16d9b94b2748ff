//! `kilt` command line driver

use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use kilt_core::{load_build_spec_file, Configuration, EntrypointStrategy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Some unit failed but the document was written
const EXIT_PARTIAL: i32 = 2;

fn cli() -> Command {
    Command::new("kilt")
        .version(kilt_cfn::VERSION)
        .about("Instrument Fargate task definitions in CloudFormation templates")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format on stderr"),
        )
        .subcommand(
            Command::new("patch")
                .about("Patch a template with a recipe")
                .arg(
                    Arg::new("recipe")
                        .long("recipe")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Recipe file (.yaml, .yml, .json or .toml)"),
                )
                .arg(
                    Arg::new("template")
                        .long("template")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("CloudFormation template in JSON"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the patched template here instead of stdout"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file; flags override its values"),
                )
                .arg(
                    Arg::new("opt-in")
                        .long("opt-in")
                        .action(ArgAction::SetTrue)
                        .help("Only instrument units tagged for inclusion"),
                )
                .arg(
                    Arg::new("log-group")
                        .long("log-group")
                        .help("Log group for injected sidecars"),
                )
                .arg(
                    Arg::new("image-auth-secret")
                        .long("image-auth-secret")
                        .help("Registry credentials secret for sidecar images"),
                )
                .arg(Arg::new("kilt-version").long("kilt-version").help("Kilt runtime version"))
                .arg(Arg::new("recipe-config").long("recipe-config").help("Opaque recipe parameters"))
                .arg(
                    Arg::new("use-repository-hints")
                        .long("use-repository-hints")
                        .action(ArgAction::SetTrue)
                        .help("Allow image repository metadata to be consulted"),
                )
                .arg(
                    Arg::new("entrypoint-strategy")
                        .long("entrypoint-strategy")
                        .value_parser(["append", "blob"])
                        .help("How the original entrypoint is passed to the wrapper"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Load a recipe and print what it injects")
                .arg(
                    Arg::new("recipe")
                        .long("recipe")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Recipe file (.yaml, .yml, .json or .toml)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the loaded build spec as JSON"),
                ),
        )
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn configuration(args: &ArgMatches) -> Result<Configuration> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => Configuration::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => Configuration::new(),
    };

    if args.get_flag("opt-in") {
        config.opt_in = true;
    }
    if args.get_flag("use-repository-hints") {
        config.use_repository_hints = true;
    }
    if let Some(v) = args.get_one::<String>("log-group") {
        config.log_group.clone_from(v);
    }
    if let Some(v) = args.get_one::<String>("image-auth-secret") {
        config.image_auth_secret.clone_from(v);
    }
    if let Some(v) = args.get_one::<String>("kilt-version") {
        config.kilt_version.clone_from(v);
    }
    if let Some(v) = args.get_one::<String>("recipe-config") {
        config.recipe_config.clone_from(v);
    }
    if let Some(v) = args.get_one::<String>("entrypoint-strategy") {
        config.entrypoint_strategy = v.parse::<EntrypointStrategy>()?;
    }
    Ok(config)
}

fn run_patch(args: &ArgMatches) -> Result<i32> {
    let (Some(recipe), Some(template)) = (
        args.get_one::<PathBuf>("recipe"),
        args.get_one::<PathBuf>("template"),
    ) else {
        anyhow::bail!("--recipe and --template are required");
    };

    let config = configuration(args)?;
    let spec = load_build_spec_file(recipe)
        .with_context(|| format!("loading recipe {}", recipe.display()))?;
    let input = std::fs::read(template)
        .with_context(|| format!("reading template {}", template.display()))?;

    tracing::info!(
        template = %template.display(),
        opt_in = config.opt_in,
        kilt_version = config.kilt_version.as_str(),
        recipe_config = config.recipe_config.as_str(),
        use_repository_hints = config.use_repository_hints,
        strategy = ?config.entrypoint_strategy,
        "patching template"
    );

    let output = kilt_cfn::patch(&input, &config, &spec)
        .with_context(|| format!("patching {}", template.display()))?;

    match args.get_one::<PathBuf>("out") {
        Some(path) => std::fs::write(path, &output.document)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output.document)?;
            stdout.write_all(b"\n")?;
        }
    }

    let report = &output.report;
    tracing::info!(
        patched = report.patched.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "done"
    );
    Ok(if report.is_success() { 0 } else { EXIT_PARTIAL })
}

fn run_validate(args: &ArgMatches) -> Result<i32> {
    let Some(recipe) = args.get_one::<PathBuf>("recipe") else {
        anyhow::bail!("--recipe is required");
    };
    let spec = load_build_spec_file(recipe)
        .with_context(|| format!("loading recipe {}", recipe.display()))?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&spec)?);
        return Ok(0);
    }

    println!("Recipe: {}", recipe.display());
    println!("  Image: {}", spec.image);
    println!("  Entrypoint: {:?}", spec.entry_point);
    println!("  Command: {:?}", spec.command);
    println!("  Environment: {}", spec.env.len());
    for mount in &spec.mounts {
        println!("  Mount: {} ({}) {:?}", mount.name(), mount.image(), mount.volumes());
    }
    for policy in &spec.policies {
        println!("  Policy: {} {} {:?}", policy.key(), policy.effect(), policy.actions());
    }
    Ok(0)
}

fn main() {
    let matches = cli().get_matches();
    let format = matches
        .get_one::<String>("log-format")
        .map_or("text", String::as_str);
    init_tracing(format);

    let result = match matches.subcommand() {
        Some(("patch", args)) => run_patch(args),
        Some(("validate", args)) => run_validate(args),
        _ => Ok(0),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(1);
        }
    }
}
