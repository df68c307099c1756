use clap::Command;

pub fn root_command() -> Command<'static> {
    let command = Command::new(clap::crate_name!())
        .about("Rewrite WARC archives with extracted plain text")
        .version(clap::crate_version!())
        .subcommand_required(true)
        .subcommand(crate::watch::create_command())
        .subcommand(crate::exclude::create_command())
        .subcommand(crate::list::create_command());

    crate::logging::logging_args(command)
}
