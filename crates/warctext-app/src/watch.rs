use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use warctext::{
    tika::{TikaClient, DEFAULT_TIKA_URL},
    transform::RecordTransformer,
    watch::{WatchConfig, Watcher},
};

const ABOUT: &str = "Watch a directory and rewrite WARC files through the extraction service";
const ABOUT_LONG: &str = "Watch a directory and rewrite WARC files through the extraction service.

Files whose name ends with the input suffix are rewritten so that binary \
documents (PDF, Office formats, RTF, OpenDocument) become plain text \
conversion records, then validated. Inputs whose output already exists are \
skipped, so interrupted runs can simply be restarted.";
const DIRECTORY_HELP: &str = "Directory to watch for WARC files";
const TIKA_URL_HELP: &str = "URL of the extraction service endpoint";
const MIN_TEXT_LENGTH_HELP: &str = "Discard extractor output shorter than this many bytes";
const WORKERS_HELP: &str = "Number of files processed concurrently";
const POLL_INTERVAL_HELP: &str = "Seconds to sleep between directory scans";
const INPUT_SUFFIX_HELP: &str = "Process files whose name ends with this suffix";
const OUTPUT_SUFFIX_HELP: &str = "Name outputs by substituting this suffix";
const DELETE_INPUT_HELP: &str = "Delete each input file after its output validates";
const ONCE_HELP: &str = "Scan the directory once and exit";

/// Marker error for the dedicated exit code when the extraction service
/// cannot be reached at startup.
#[derive(Debug)]
pub struct ServiceUnreachable {
    pub url: String,
}

impl Display for ServiceUnreachable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "extraction service unreachable at {}", self.url)
    }
}

impl std::error::Error for ServiceUnreachable {}

pub fn create_command() -> Command<'static> {
    Command::new("watch")
        .about(ABOUT)
        .long_about(ABOUT_LONG)
        .arg(
            Arg::new("directory")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help(DIRECTORY_HELP),
        )
        .arg(
            Arg::new("tika_url")
                .long("tika-url")
                .takes_value(true)
                .value_parser(clap::value_parser!(String))
                .default_value(DEFAULT_TIKA_URL)
                .help(TIKA_URL_HELP),
        )
        .arg(
            Arg::new("min_text_length")
                .long("min-text-length")
                .takes_value(true)
                .value_parser(clap::value_parser!(u64))
                .default_value("256")
                .help(MIN_TEXT_LENGTH_HELP),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .takes_value(true)
                .value_parser(clap::value_parser!(u64).range(1..))
                .default_value("1")
                .help(WORKERS_HELP),
        )
        .arg(
            Arg::new("poll_interval")
                .long("poll-interval")
                .takes_value(true)
                .value_parser(clap::value_parser!(u64).range(1..))
                .default_value("15")
                .help(POLL_INTERVAL_HELP),
        )
        .arg(
            Arg::new("input_suffix")
                .long("input-suffix")
                .takes_value(true)
                .value_parser(clap::value_parser!(String))
                .default_value(".warc.gz")
                .help(INPUT_SUFFIX_HELP),
        )
        .arg(
            Arg::new("output_suffix")
                .long("output-suffix")
                .takes_value(true)
                .value_parser(clap::value_parser!(String))
                .default_value("-ViaTika.warc.gz")
                .help(OUTPUT_SUFFIX_HELP),
        )
        .arg(
            Arg::new("delete_input")
                .long("delete-input")
                .action(ArgAction::SetTrue)
                .help(DELETE_INPUT_HELP),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .action(ArgAction::SetTrue)
                .help(ONCE_HELP),
        )
}

pub fn run(arg_matches: &ArgMatches) -> anyhow::Result<()> {
    let directory = arg_matches.get_one::<PathBuf>("directory").unwrap();
    anyhow::ensure!(
        directory.is_dir(),
        "not a directory: {}",
        directory.display()
    );

    let tika_url = arg_matches.get_one::<String>("tika_url").unwrap();
    let min_text_length = *arg_matches.get_one::<u64>("min_text_length").unwrap() as usize;

    let client = TikaClient::new(tika_url, min_text_length)
        .context("failed to construct extraction client")?;

    if client.health_check().is_err() {
        return Err(ServiceUnreachable {
            url: tika_url.to_string(),
        }
        .into());
    }

    let mut config = WatchConfig::new(directory.clone());
    config.input_suffix = arg_matches
        .get_one::<String>("input_suffix")
        .unwrap()
        .clone();
    config.output_suffix = arg_matches
        .get_one::<String>("output_suffix")
        .unwrap()
        .clone();
    config.poll_interval =
        Duration::from_secs(*arg_matches.get_one::<u64>("poll_interval").unwrap());
    config.delete_input = arg_matches.get_one::<bool>("delete_input").cloned().unwrap();
    config.workers = *arg_matches.get_one::<u64>("workers").unwrap() as usize;

    anyhow::ensure!(
        config.input_suffix != config.output_suffix,
        "output suffix must differ from input suffix"
    );

    tracing::info!(?config, %tika_url, "starting watcher");

    let watcher = Watcher::new(config, move || RecordTransformer::new(client.clone()));

    if arg_matches.get_one::<bool>("once").cloned().unwrap() {
        let report = watcher.scan_once()?;
        tracing::info!(?report, "single scan complete");
    } else {
        watcher.run();
    }

    Ok(())
}
