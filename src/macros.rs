//! Macros shared by the routines in this crate.

/// Join path components with `/`, without doubling separators.
///
/// ```rust,ignore
/// let path = dir!(user_home, RUN_ROOT, "motorBike");
/// ```
#[macro_export]
macro_rules! dir {
    ($first:expr $(, $part:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut path = String::from(::std::convert::AsRef::<str>::as_ref(&$first));
        $(
            if !path.ends_with('/') {
                path.push('/');
            }
            path.push_str(::std::convert::AsRef::<str>::as_ref(&$part).trim_start_matches('/'));
        )*
        path
    }};
}

/// Build a `RemoteCmd` with `format!` syntax, like `spurs::cmd!`.
#[macro_export]
macro_rules! rcmd {
    ($($arg:tt)*) => {
        $crate::remote::RemoteCmd::new(format!($($arg)*))
    };
}

/// Run a list of commands on a host, bailing out on the first failure. With `in <dir>`, every
/// command runs in that directory.
#[macro_export]
macro_rules! with_shell {
    ($host:ident in $cwd:expr => $($cmd:expr),+ $(,)?) => {{
        $(
            $host.run($cmd.cwd($cwd))?;
        )+
    }};
    ($host:ident => $($cmd:expr),+ $(,)?) => {{
        $(
            $host.run($cmd)?;
        )+
    }};
}

/// Time the given expression and push `(label, duration)` onto `timers`.
#[macro_export]
macro_rules! time {
    ($timers:expr, $label:expr, $expr:expr) => {{
        let start = ::std::time::Instant::now();
        let result = $expr;
        let duration = start.elapsed();
        $timers.push(($label, duration));
        result
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn dir_joins_without_doubling_slashes() {
        let home = String::from("/home/markm/");
        assert_eq!(
            dir!(home, "OpenFOAM/run", "motorBike"),
            "/home/markm/OpenFOAM/run/motorBike"
        );
        assert_eq!(dir!("/a", "/b/", "c"), "/a/b/c");
        assert_eq!(dir!("solo"), "solo");
    }

    #[test]
    fn time_records_label() {
        let mut timers = vec![];
        let x = time!(timers, "Add", 1 + 1);
        assert_eq!(x, 2);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].0, "Add");
    }
}
