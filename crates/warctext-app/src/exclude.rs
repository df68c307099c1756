use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use warctext::{
    compress::CompressionFormat,
    exclude::{load_patterns, ExclusionFilter, MatchMode},
    warc::{WARCReader, WARCWriter},
};

use crate::argutil::{InputStream, OutputStream};

const ABOUT: &str = "Re-emit a WARC file with records removed by header patterns";
const ABOUT_LONG: &str = "Re-emit a WARC file with records removed by header patterns.

Each pattern is of the form field/regexp, with field being a WARC header \
and regexp a pattern matched against the header's value. Matched records \
are excluded, and records whose WARC-Concurrent-To names an excluded \
record are excluded with them.

For response records the synthetic fields XHTTP-Response-Code, \
XHTTP-Content-Type and XHTTP-Body match against the captured HTTP message. \
A pattern of the form XFile/path reads further patterns from a file, one \
per line.

Example pattern: WARC-Target-URI/^https?://www.example.com/";
const IN_FILENAME_HELP: &str = "Path to input WARC file (default: stdin)";
const OUT_FILENAME_HELP: &str = "Path to output WARC file (default: stdout)";
const GZ_HELP: &str = "Treat the input as per-record gzip (default: guess)";
const GP_HELP: &str = "Treat the input as uncompressed (default: guess)";
const GZIP_OUTPUT_HELP: &str = "Compress the output with one gzip member per record";
const NO_HTTP_FIELDS_HELP: &str = "Disable the synthetic XHTTP- fields";
const ANY_HELP: &str = "Exclude when any pattern matches (default: all must match)";
const PATTERNS_HELP: &str = "Patterns of the form field/regexp or XFile/path";

pub fn create_command() -> Command<'static> {
    Command::new("exclude")
        .about(ABOUT)
        .long_about(ABOUT_LONG)
        .arg(
            Arg::new("in_filename")
                .long("in-filename")
                .short('i')
                .takes_value(true)
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("-")
                .help(IN_FILENAME_HELP),
        )
        .arg(
            Arg::new("out_filename")
                .long("out-filename")
                .short('o')
                .takes_value(true)
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("-")
                .help(OUT_FILENAME_HELP),
        )
        .arg(Arg::new("gz").long("gz").action(ArgAction::SetTrue).help(GZ_HELP))
        .arg(
            Arg::new("gp")
                .long("gp")
                .action(ArgAction::SetTrue)
                .conflicts_with("gz")
                .help(GP_HELP),
        )
        .arg(
            Arg::new("gzip_output")
                .long("gzip-output")
                .short('G')
                .action(ArgAction::SetTrue)
                .help(GZIP_OUTPUT_HELP),
        )
        .arg(
            Arg::new("no_http_fields")
                .long("no-http-fields")
                .short('e')
                .action(ArgAction::SetTrue)
                .help(NO_HTTP_FIELDS_HELP),
        )
        .arg(
            Arg::new("any")
                .long("any")
                .short('a')
                .action(ArgAction::SetTrue)
                .help(ANY_HELP),
        )
        .arg(
            Arg::new("patterns")
                .required(true)
                .multiple_values(true)
                .value_parser(clap::value_parser!(String))
                .help(PATTERNS_HELP),
        )
}

pub fn run(arg_matches: &ArgMatches) -> anyhow::Result<()> {
    let patterns = arg_matches
        .get_many::<String>("patterns")
        .unwrap()
        .cloned()
        .collect::<Vec<String>>();
    let predicates = load_patterns(&patterns)?;

    for predicate in &predicates {
        tracing::info!(
            field = predicate.field.as_str(),
            pattern = predicate.pattern.as_str(),
            "excluding on"
        );
    }

    let mode = if arg_matches.get_one::<bool>("any").cloned().unwrap() {
        MatchMode::Any
    } else {
        MatchMode::All
    };
    let http_fields = !arg_matches
        .get_one::<bool>("no_http_fields")
        .cloned()
        .unwrap();

    let filter = ExclusionFilter::new(predicates, mode, http_fields)?;

    let in_filename = arg_matches.get_one::<PathBuf>("in_filename").unwrap();
    let input = InputStream::open(in_filename)
        .with_context(|| format!("failed to open {}", in_filename.display()))?;

    let mut reader = if arg_matches.get_one::<bool>("gz").cloned().unwrap() {
        WARCReader::with_format(input, CompressionFormat::Gzip)?
    } else if arg_matches.get_one::<bool>("gp").cloned().unwrap() {
        WARCReader::with_format(input, CompressionFormat::Raw)?
    } else {
        WARCReader::new(input)?
    };

    let out_filename = arg_matches.get_one::<PathBuf>("out_filename").unwrap();
    let output = OutputStream::open(out_filename)
        .with_context(|| format!("failed to open {}", out_filename.display()))?;

    let output_format = if arg_matches.get_one::<bool>("gzip_output").cloned().unwrap() {
        CompressionFormat::Gzip
    } else {
        CompressionFormat::Raw
    };
    let mut writer = WARCWriter::new_compressed(output, output_format, Default::default());

    let stats = filter.run(&mut reader, &mut writer)?;
    writer.into_inner().flush()?;

    tracing::info!(?stats, "exclusion complete");

    Ok(())
}
