mod args;
mod argutil;
mod exclude;
mod list;
mod logging;
mod watch;

fn main() {
    let exit_code = main_inner();
    std::process::exit(exit_code);
}

fn main_inner() -> i32 {
    let command = crate::args::root_command();
    let arg_matches = match command.try_get_matches() {
        Ok(matches) => matches,
        Err(error) => {
            let _ = error.print();

            return match error.kind() {
                clap::ErrorKind::DisplayHelp | clap::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
        }
    };

    if let Err(error) = crate::logging::set_up_logging(&arg_matches) {
        eprintln!("Error: {error:#}");
        return 1;
    }

    let result = match arg_matches.subcommand() {
        Some(("watch", sub_matches)) => crate::watch::run(sub_matches),
        Some(("exclude", sub_matches)) => crate::exclude::run(sub_matches),
        Some(("list", sub_matches)) => crate::list::run(sub_matches),
        _ => unreachable!(),
    };

    match result {
        Ok(_) => {
            tracing::info!("program exit ok");
            0
        }
        Err(error) => {
            let error_message_line = format!("{:#}", error);
            tracing::error!(error = %error_message_line, "program exit error");
            eprintln!("Error: {error_message_line}");

            if error.downcast_ref::<crate::watch::ServiceUnreachable>().is_some() {
                2
            } else {
                1
            }
        }
    }
}
