//! Some routines for adding common CLI options in a consistent, less boilerplatey way.

/// Validator for positive integer options.
pub fn is_positive_usize(s: String) -> Result<(), String> {
    match s.as_str().parse::<usize>() {
        Ok(0) => Err("must be greater than zero".into()),
        Ok(_) => Ok(()),
        Err(e) => Err(format!("{:?}", e)),
    }
}

/// Parse an option already checked by `is_positive_usize`.
pub fn value_of_usize(sub_m: &clap::ArgMatches<'_>, name: &str) -> Option<usize> {
    sub_m.value_of(name).map(|v| v.parse::<usize>().unwrap())
}

/// CLI options for choosing the hosts to run on and how to talk to them.
pub mod hosts {
    use clap::{App, Arg, ArgMatches};

    use super::{is_positive_usize, value_of_usize};

    /// The parsed host options.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct HostOptions {
        pub username: String,
        pub hosts: Vec<String>,
        pub num_hosts: Option<usize>,
        pub command_timeout: Option<u64>,
    }

    pub fn add_cli_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("USERNAME")
                .required(true)
                .takes_value(true)
                .help("The username on the remotes (e.g. markm)"),
        )
        .arg(
            Arg::with_name("HOSTS")
                .required(true)
                .takes_value(true)
                .multiple(true)
                .help(
                    "The remotes, as [user@]address[:port] (e.g. c240g2-031321.wisc.cloudlab.us:22). \
                     The first one is the master. Other hosts reach each host by its address, so \
                     use addresses that work between the hosts.",
                ),
        )
        .arg(
            Arg::with_name("NUM_HOSTS")
                .long("num_hosts")
                .takes_value(true)
                .validator(is_positive_usize)
                .help("Only use the first NUM_HOSTS of the given hosts."),
        )
        .arg(
            Arg::with_name("COMMAND_TIMEOUT")
                .long("command_timeout")
                .takes_value(true)
                .validator(is_positive_usize)
                .help(
                    "Fail if any remote command takes longer than this many seconds. By \
                     default, commands may take forever. Does not apply to the solver run \
                     itself; see --run_timeout.",
                ),
        )
    }

    /// Parse and return the values added by `add_cli_options`.
    pub fn parse_cli_options(sub_m: &ArgMatches<'_>) -> HostOptions {
        HostOptions {
            username: sub_m.value_of("USERNAME").unwrap().into(),
            hosts: sub_m
                .values_of("HOSTS")
                .map(|values| values.map(Into::into).collect())
                .unwrap_or_else(Vec::new),
            num_hosts: value_of_usize(sub_m, "NUM_HOSTS"),
            command_timeout: value_of_usize(sub_m, "COMMAND_TIMEOUT").map(|t| t as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::hosts::*;
    use super::*;

    #[test]
    fn positive_usize_validation() {
        assert!(is_positive_usize("8".into()).is_ok());
        assert!(is_positive_usize("0".into()).is_err());
        assert!(is_positive_usize("-1".into()).is_err());
        assert!(is_positive_usize("eight".into()).is_err());
    }

    #[test]
    fn host_options_are_parsed() {
        let app = add_cli_options(clap::App::new("test"));
        let matches = app
            .get_matches_from_safe(vec![
                "test",
                "markm",
                "node0:22",
                "root@node1",
                "--num_hosts",
                "2",
            ])
            .unwrap();
        let opts = parse_cli_options(&matches);
        assert_eq!(opts.username, "markm");
        assert_eq!(opts.hosts, vec!["node0:22", "root@node1"]);
        assert_eq!(opts.num_hosts, Some(2));
        assert_eq!(opts.command_timeout, None);
    }

    #[test]
    fn hosts_are_required() {
        let app = add_cli_options(clap::App::new("test"));
        assert!(app.get_matches_from_safe(vec!["test", "markm"]).is_err());
    }
}
