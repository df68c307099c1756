use clap::{Arg, ArgMatches, Command};
use tracing_subscriber::{prelude::*, EnvFilter};

pub fn logging_args(command: Command<'static>) -> Command<'static> {
    command.arg(
        Arg::new("log_filter")
            .long("log-filter")
            .short('l')
            .takes_value(true)
            .value_parser(clap::value_parser!(String))
            .help("Filter level of severity and targets of logging messages")
            .default_value("warn"),
    )
}

pub fn set_up_logging(arg_matches: &ArgMatches) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(arg_matches.get_one::<String>("log_filter").unwrap())?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
