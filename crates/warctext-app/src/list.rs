use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use warctext::warc::WARCReader;

use crate::argutil::{InputStream, OutputStream};

const ABOUT: &str = "List file contents using header fields";
const ABOUT_LONG: &str = "List file contents using header fields.

Prints the selected header fields of every record as CSV (or JSON lines), \
one line per record. The default field set shows what was captured and \
with which content types.";
const INPUT_WARC_FILE_HELP: &str = "Path to WARC file";
const OUTPUT_FILE_HELP: &str = "Path to output file";
const SHOW_FIELD_WITH_NAME_HELP: &str = "Show values with the given field name";
const OUTPUT_AS_JSON_HELP: &str = "Format the output as JSON lines";

pub fn create_command() -> Command<'static> {
    Command::new("list")
        .about(ABOUT)
        .long_about(ABOUT_LONG)
        .arg(
            Arg::new("input")
                .required(true)
                .multiple_values(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help(INPUT_WARC_FILE_HELP),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .default_value("-")
                .value_parser(clap::value_parser!(PathBuf))
                .help(OUTPUT_FILE_HELP),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .takes_value(true)
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(String))
                .default_values(&[
                    "WARC-Date",
                    "WARC-Type",
                    "Content-Type",
                    "Content-Length",
                    "WARC-Target-URI",
                ])
                .help(SHOW_FIELD_WITH_NAME_HELP),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help(OUTPUT_AS_JSON_HELP),
        )
}

pub fn run(arg_matches: &ArgMatches) -> anyhow::Result<()> {
    let names = arg_matches
        .get_many::<String>("name")
        .unwrap()
        .collect::<Vec<&String>>();
    let is_json = arg_matches.get_one::<bool>("json").cloned().unwrap();

    let out_filename = arg_matches.get_one::<PathBuf>("output").unwrap();
    let mut output = OutputStream::open(out_filename)
        .with_context(|| format!("failed to open {}", out_filename.display()))?;

    for path in arg_matches.get_many::<PathBuf>("input").unwrap() {
        let input =
            InputStream::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut reader = WARCReader::new(input)?;

        loop {
            let header = match reader.begin_record()? {
                Some(header) => header,
                None => break,
            };

            let mut line_buffer = Vec::new();

            for name in &names {
                match header.fields.get_str(name.as_str()) {
                    Some(value) => line_buffer.push(value.to_string()),
                    None => line_buffer.push("".to_string()),
                }
            }

            if is_json {
                output.write_all(serde_json::to_string(&line_buffer)?.as_bytes())?;
                output.write_all(b"\n")?;
            } else {
                let mut writer = csv::Writer::from_writer(Vec::new());
                writer.serialize(&line_buffer)?;
                output.write_all(&writer.into_inner()?)?;
            }

            let mut block = reader.read_block();
            std::io::copy(&mut block, &mut std::io::sink())?;
            reader.end_record(block)?;
        }
    }

    output.flush()?;

    Ok(())
}
