use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use sitemirror_core::archive::create_archive;
use sitemirror_core::assets::AssetDedup;
use sitemirror_core::config::{MirrorConfig, load_config, resolve_config_path};
use sitemirror_core::logging::init_logging;
use sitemirror_core::mirror::MirrorSettings;
use sitemirror_core::pipeline::{CloneReport, FixOptions, FixReport, clone_site, fix_site};
use sitemirror_core::profile::ProfileRegistry;
use sitemirror_core::target::{TargetDescriptor, TargetOptions};
use sitemirror_core::tools::SystemToolchain;

#[derive(Debug, Parser)]
#[command(
    name = "sitemirror",
    version,
    about = "Mirror a website into a self-contained local copy"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, help = "Print the run report as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            json: cli.json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(name = "clone", about = "Download, fix up and package a site")]
    CloneSite(CloneArgs),
    #[command(about = "Normalize layout and query paths of an existing mirror")]
    Fix(FixArgs),
    #[command(about = "Zip an existing mirror")]
    Archive(ArchiveArgs),
    #[command(about = "List built-in and configured profiles")]
    Profiles,
}

#[derive(Debug, Args)]
struct TargetArgs {
    url: String,
    #[arg(short, long, value_name = "DIR", help = "Output directory (default: ./<url>)")]
    output: Option<PathBuf>,
    #[arg(long, help = "Empty the output directory before downloading")]
    clean: bool,
    #[arg(long, value_name = "PATH", help = "Archive path (default: <output>.zip)")]
    zip: Option<PathBuf>,
    #[arg(short, long = "profile", value_name = "NAME", help = "Apply a profile (repeatable)")]
    profiles: Vec<String>,
    #[arg(long = "domain", value_name = "DOMAIN", help = "Extra asset domain (repeatable)")]
    domains: Vec<String>,
    #[arg(
        long = "replace",
        value_name = "FIND=REPLACE",
        value_parser = parse_rewrite_rule,
        help = "Literal HTML rewrite rule (repeatable)"
    )]
    replacements: Vec<(String, String)>,
    #[arg(long = "query-suffix", value_name = "SUFFIX", help = "Query suffix to materialize (repeatable)")]
    query_suffixes: Vec<String>,
}

#[derive(Debug, Args)]
struct CloneArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, help = "Fetch each discovered asset URL once per script")]
    dedupe_assets: bool,
    #[arg(long, help = "Do not fail when the mirror is already flattened")]
    allow_normalized: bool,
    #[arg(long, help = "Skip writing the zip archive")]
    no_archive: bool,
}

#[derive(Debug, Args)]
struct FixArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, help = "Do not fail when the mirror is already flattened")]
    allow_normalized: bool,
}

#[derive(Debug, Args)]
struct ArchiveArgs {
    #[command(flatten)]
    target: TargetArgs,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::CloneSite(args)) => run_clone(&runtime, args),
        Some(Commands::Fix(args)) => run_fix(&runtime, args),
        Some(Commands::Archive(args)) => run_archive(&runtime, args),
        Some(Commands::Profiles) => run_profiles(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_clone(runtime: &RuntimeOptions, args: CloneArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let target = resolve_target(&config, &args.target)?;
    let mut settings = MirrorSettings::from_config(&config);
    if args.dedupe_assets {
        settings.dedup = AssetDedup::Unique;
    }
    let toolchain = SystemToolchain::discover(config.wget_path().as_deref())?;

    let report = clone_site(
        &toolchain,
        &target,
        &settings,
        FixOptions {
            allow_normalized: args.allow_normalized,
        },
        !args.no_archive,
    )
    .with_context(|| format!("failed to clone {}", target.source))?;

    if runtime.json {
        return print_json(&report);
    }
    println!("clone");
    print_target(&target);
    print_clone_report(&report, &target);
    Ok(())
}

fn run_fix(runtime: &RuntimeOptions, args: FixArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let target = resolve_target(&config, &args.target)?;
    let toolchain = SystemToolchain::discover(config.wget_path().as_deref())?;

    let report = fix_site(
        &toolchain,
        &target,
        FixOptions {
            allow_normalized: args.allow_normalized,
        },
    )?;

    if runtime.json {
        return print_json(&report);
    }
    println!("fix");
    print_target(&target);
    print_fix_report(&report);
    Ok(())
}

fn run_archive(runtime: &RuntimeOptions, args: ArchiveArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let target = resolve_target(&config, &args.target)?;
    let report = create_archive(&target.output_dir, &target.archive_path)
        .context("failed to create zip file")?;

    if runtime.json {
        return print_json(&report);
    }
    println!("archive");
    println!("output_dir: {}", normalize_path(&target.output_dir));
    println!("archive_path: {}", normalize_path(&target.archive_path));
    println!("files: {}", report.files);
    println!("directories: {}", report.directories);
    Ok(())
}

fn run_profiles(runtime: &RuntimeOptions) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let registry = config.registry();

    if runtime.json {
        let profiles = registry.iter().collect::<Vec<_>>();
        return print_json(&profiles);
    }
    for profile in registry.iter() {
        println!("{} (v{})", profile.name, profile.version);
        println!("  domains: {}", join_or_dash(&profile.domains));
        println!("  query_suffixes: {}", join_or_dash(&profile.query_suffixes));
        println!("  rewrite_rules: {}", profile.replace.len());
    }
    Ok(())
}

fn load_runtime_config(runtime: &RuntimeOptions) -> Result<MirrorConfig> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let path = resolve_config_path(runtime.config.as_deref(), &cwd);
    load_config(&path)
}

fn resolve_target(config: &MirrorConfig, args: &TargetArgs) -> Result<TargetDescriptor> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let base = TargetDescriptor::new(
        TargetOptions {
            url: args.url.clone(),
            output_dir: args.output.clone(),
            clean: args.clean,
            archive_path: args.zip.clone(),
            domains: args.domains.clone(),
            rewrite_rules: args.replacements.clone(),
            query_suffixes: args.query_suffixes.clone(),
        },
        &cwd,
    )?;
    apply_profiles(base, &config.registry(), &args.profiles)
}

fn apply_profiles(
    base: TargetDescriptor,
    registry: &ProfileRegistry,
    names: &[String],
) -> Result<TargetDescriptor> {
    let mut target = base;
    for name in names {
        if let Some(profile) = registry.lookup(name)? {
            target = target.with_profile(profile);
        }
    }
    Ok(target)
}

fn parse_rewrite_rule(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((find, replace)) if !find.is_empty() => Ok((find.to_string(), replace.to_string())),
        _ => Err(format!("expected FIND=REPLACE with a non-empty FIND, got {raw:?}")),
    }
}

fn print_target(target: &TargetDescriptor) {
    println!("source: {}", target.source);
    println!("output_dir: {}", normalize_path(&target.output_dir));
    println!("domains: {}", target.domains.joined());
    println!(
        "profiles: {}",
        if target.profiles.is_empty() {
            "-".to_string()
        } else {
            target.profiles.join(",")
        }
    );
}

fn print_clone_report(report: &CloneReport, target: &TargetDescriptor) {
    let mirror = &report.mirror;
    println!("fetch: {}", format_flag(mirror.fetch.is_success()));
    println!("scripts_scanned: {}", mirror.scripts_scanned);
    println!(
        "imports: found={} fetched={} present={} skipped={} failed={}",
        mirror.imports.found,
        mirror.imports.fetched,
        mirror.imports.present,
        mirror.imports.skipped,
        mirror.imports.failed
    );
    println!("asset_batches: {}", mirror.asset_batches);
    println!("asset_urls: {}", mirror.asset_urls);
    println!("scripts_rewritten: {}", mirror.scripts_rewritten);
    print_fix_report(&report.fix);
    match &report.archive {
        Some(archive) => println!(
            "archive: {} ({} files)",
            normalize_path(&target.archive_path),
            archive.files
        ),
        None => println!("archive: -"),
    }
}

fn print_fix_report(report: &FixReport) {
    let layout = &report.layout;
    println!("rules_applied: {}", layout.rules_applied);
    if layout.flattened {
        println!("moved: {}", layout.moved.len());
        println!("move_failures: {}", layout.move_failures.len());
    } else {
        println!("moved: - (already normalized)");
    }
    println!("materialized: {}", report.materialized.len());
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn clone_accepts_repeated_target_options() {
        let cli = Cli::try_parse_from([
            "sitemirror",
            "clone",
            "https://example.com",
            "--profile",
            "framer",
            "--profile",
            "framer-remove-watermark",
            "--domain",
            "cdn.example.net",
            "--replace",
            "../cdn=./cdn",
            "--query-suffix",
            "?v=2",
            "--no-archive",
            "--json",
        ])
        .expect("parse");
        assert!(cli.json);
        let Some(Commands::CloneSite(args)) = cli.command else {
            panic!("expected clone");
        };
        assert_eq!(args.target.profiles, vec!["framer", "framer-remove-watermark"]);
        assert_eq!(
            args.target.replacements,
            vec![("../cdn".to_string(), "./cdn".to_string())]
        );
        assert!(args.no_archive);
    }

    #[test]
    fn rewrite_rule_splits_on_first_equals() {
        assert_eq!(
            parse_rewrite_rule("a=b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert!(parse_rewrite_rule("=x").is_err());
        assert!(parse_rewrite_rule("no-separator").is_err());
    }

    #[test]
    fn profiles_fold_in_order_and_none_is_skipped() {
        let base = TargetDescriptor::new(
            TargetOptions {
                url: "example.com".to_string(),
                ..TargetOptions::default()
            },
            Path::new("/tmp"),
        )
        .expect("target");
        let registry = ProfileRegistry::builtin();
        let target = apply_profiles(
            base,
            &registry,
            &["none".to_string(), "webflow".to_string()],
        )
        .expect("profiles");
        assert_eq!(target.profiles, vec!["webflow"]);
        assert!(target.domains.contains("website-files.com"));

        let base = TargetDescriptor::new(
            TargetOptions {
                url: "example.com".to_string(),
                ..TargetOptions::default()
            },
            Path::new("/tmp"),
        )
        .expect("target");
        assert!(apply_profiles(base, &registry, &["wix".to_string()]).is_err());
    }
}
