use std::path::{Path, PathBuf};

use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::encode::pattern::PatternEncoder;
use mmdio::{xfile, Asset, AssetKind, Config, Repository};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S.%6f)} [{level}] - {m}{n}";

type CliResult<T> = Result<T, Box<dyn std::error::Error + 'static>>;

fn path_arg(name: &'static str, help: &'static str) -> clap::Arg {
    clap::Arg::new(name)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .help(help)
}

fn command() -> clap::Command {
    clap::Command::new("mmdio")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Inspect, hash and convert MMD assets")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            clap::Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(clap::ArgAction::Count)
                .help("Raise the log level, repeat for more detail"),
        )
        .arg(
            clap::arg!(
                --"log-file" <FILE> "Also write the log to this file"
            )
            .required(false)
            .global(true)
            .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(
                --config <FILE> "JSON file with load and save options"
            )
            .required(false)
            .global(true)
            .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand(
            clap::Command::new("info")
                .about("Print kind, name, hash and entity counts")
                .arg(path_arg("path", "Asset to inspect")),
        )
        .subcommand(
            clap::Command::new("name")
                .about("Print the name stored in the asset header")
                .arg(path_arg("path", "Asset to inspect")),
        )
        .subcommand(
            clap::Command::new("hash")
                .about("Print the SHA-1 hash of the asset")
                .arg(path_arg("path", "Asset to hash")),
        )
        .subcommand(
            clap::Command::new("convert")
                .about("Load INPUT and save it as OUTPUT, the format follows the extension")
                .arg(path_arg("input", "Asset to load"))
                .arg(path_arg("output", "Destination (pmx, vmd, json or csv)"))
                .arg(
                    clap::Arg::new("no-system")
                        .long("no-system")
                        .action(clap::ArgAction::SetTrue)
                        .help("Drop system bones and morphs"),
                )
                .arg(
                    clap::Arg::new("threads")
                        .long("threads")
                        .value_name("N")
                        .value_parser(clap::value_parser!(u32).range(1..))
                        .help("Worker threads for .x normal generation"),
                ),
        )
        .subcommand(
            clap::Command::new("inflate")
                .about("Expand a compressed .x file into its text form")
                .arg(path_arg("input", "Compressed .x file"))
                .arg(path_arg("output", "Destination of the text form")),
        )
}

fn init_logger(verbose: u8, log_file: Option<&PathBuf>) -> CliResult<()> {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let mut config = log4rs::config::Config::builder()
        .appender(log4rs::config::Appender::builder().build("console", Box::new(console)));
    let mut root = log4rs::config::Root::builder().appender("console");
    if let Some(path) = log_file {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(path)?;
        config =
            config.appender(log4rs::config::Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }
    log4rs::init_config(config.build(root.build(level))?)?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> CliResult<Config> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            log::debug!("options loaded from {}", path.display());
            Ok(Config::from_json(&text)?)
        }
        None => Ok(Config::default()),
    }
}

fn required_path<'a>(matches: &'a clap::ArgMatches, name: &str) -> &'a Path {
    matches
        .get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .unwrap_or_else(|| Path::new(""))
}

fn print_info(repository: &Repository, path: &Path) -> CliResult<()> {
    let kind = AssetKind::from_path(path)?;
    let asset = repository.load(path)?;
    println!("kind: {}", kind.name());
    println!("name: {}", asset.name());
    println!("hash: {}", repository.hash(path)?);
    match &asset {
        Asset::Model(model) => {
            println!("vertices: {}", model.vertices.len());
            println!("faces: {}", model.faces.len());
            println!("textures: {}", model.textures.len());
            println!("materials: {}", model.materials.len());
            println!("bones: {}", model.bones.len());
            println!("morphs: {}", model.morphs.len());
            println!("display slots: {}", model.display_slots.len());
            println!("rigid bodies: {}", model.rigid_bodies.len());
            println!("joints: {}", model.joints.len());
        }
        Asset::Motion(motion) => {
            println!("bone frames: {}", motion.bones.registered_len());
            println!("morph frames: {}", motion.morphs.registered_len());
            println!("camera frames: {}", motion.cameras.registered_len());
            println!("light frames: {}", motion.lights.registered_len());
            println!("shadow frames: {}", motion.shadows.registered_len());
            println!("ik frames: {}", motion.iks.registered_len());
            println!("frames: {}..{}", motion.min_frame(), motion.max_frame());
        }
        Asset::Csv(csv) => println!("records: {}", csv.len()),
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let matches = command().get_matches();
    init_logger(
        matches.get_count("verbose"),
        matches.get_one::<PathBuf>("log-file"),
    )?;
    let config = load_config(matches.get_one::<PathBuf>("config"))?;
    let mut repository = Repository::from(config);

    match matches.subcommand() {
        Some(("info", sub)) => print_info(&repository, required_path(sub, "path"))?,
        Some(("name", sub)) => println!("{}", repository.load_name(required_path(sub, "path"))?),
        Some(("hash", sub)) => println!("{}", repository.hash(required_path(sub, "path"))?),
        Some(("convert", sub)) => {
            if sub.get_flag("no-system") {
                repository.save_options.include_system = false;
            }
            if let Some(threads) = sub.get_one::<u32>("threads") {
                repository.load_options.x_worker_threads = Some(*threads as usize);
            }
            let input = required_path(sub, "input");
            let output = required_path(sub, "output");
            let asset = repository.load(input)?;
            repository.save(output, &asset)?;
            log::info!("converted {} to {}", input.display(), output.display());
        }
        Some(("inflate", sub)) => {
            let input = required_path(sub, "input");
            let output = required_path(sub, "output");
            let bytes = std::fs::read(input)?;
            let text = xfile::decompress(&bytes)?;
            std::fs::write(output, &text)?;
            log::info!(
                "inflated {} ({} -> {} bytes)",
                input.display(),
                bytes.len(),
                text.len()
            );
        }
        _ => unreachable!("a subcommand is required"),
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

#[test]
fn test_command_is_consistent() {
    command().debug_assert();
}

#[test]
fn test_convert_arguments() {
    let matches = command()
        .try_get_matches_from([
            "mmdio", "-vv", "convert", "a.x", "b.pmx", "--no-system", "--threads", "4",
        ])
        .unwrap();
    assert_eq!(2, matches.get_count("verbose"));
    let (name, sub) = matches.subcommand().unwrap();
    assert_eq!("convert", name);
    assert_eq!(Path::new("a.x"), required_path(sub, "input"));
    assert!(sub.get_flag("no-system"));
    assert_eq!(Some(&4), sub.get_one::<u32>("threads"));
    assert!(command()
        .try_get_matches_from(["mmdio", "convert", "a.x", "b.pmx", "--threads", "0"])
        .is_err());
}

#[test]
fn test_author_comes_from_manifest() {
    assert_eq!(Some("mmdio developers"), command().get_author());
}
