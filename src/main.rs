//! This program runs the OpenFOAM benchmark on remote machines. Which routine is chosen by passing
//! different command line arguments.

use openfoam_runner::BenchError;

fn run() -> Result<(), failure::Error> {
    // Catch broken defaults before touching any machine.
    openfoam_runner::templates::check_defaults()?;

    let matches = clap::App::new("runner")
        .about(
            "This program runs the OpenFOAM benchmark on remote machines. Which routine is \
             chosen by passing different command line arguments.",
        )
        .subcommand(openfoam_runner::bench::cli_options())
        .subcommand(openfoam_runner::parse_time::cli_options())
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .setting(clap::AppSettings::DisableVersion)
        .get_matches();

    match matches.subcommand() {
        ("openfoam", Some(sub_m)) => openfoam_runner::bench::run(sub_m),
        ("parse_time", Some(sub_m)) => openfoam_runner::parse_time::run(sub_m),

        _ => {
            unreachable!();
        }
    }
}

fn main() {
    use console::style;

    env_logger::init();

    // Set the RUST_BACKTRACE environment variable so that we always get backtraces. Normally, one
    // doesn't want this because of the performance penalty, but in this case, we don't care too
    // much, whereas the debugging improve is massive.
    std::env::set_var("RUST_BACKTRACE", "1");

    // If an error occurred, try to print something helpful.
    if let Err(err) = run() {
        const MESSAGE: &str = r#"== ERROR ==================================================================================
`runner` encountered an error. The command log above may offer clues. To see every command run on
the hosts, set the RUST_LOG=debug environment variable.
"#;

        println!("{}", style(MESSAGE).red().bold());

        // Errors from SSH commands
        if err.downcast_ref::<spurs::SshError>().is_some() {
            println!("An error occurred while attempting to run a command over SSH");
        }

        match err.downcast_ref::<BenchError>() {
            Some(BenchError::Timeout { .. }) => {
                println!("A command ran out of time. See --command_timeout and --run_timeout.")
            }
            Some(BenchError::RemoteCommandFailed { .. })
            | Some(BenchError::HostBatchFailed { .. }) => {
                println!("A command failed on a host. Its output is in the log above.")
            }
            Some(BenchError::MalformedTiming { .. }) => println!(
                "The solver run did not end with a `time` report. Check that `Allrun` ran to \
                 completion."
            ),
            Some(BenchError::SharedStorageMissing { .. }) => println!(
                "Multi-host runs need $HOME/OpenFOAM/run on storage shared by every host."
            ),
            _ => {}
        }

        // Print error and backtrace
        println!(
            "`runner` encountered the following error:\n{}\n{}",
            err.as_fail(),
            err.backtrace(),
        );

        std::process::exit(101);
    }
}
