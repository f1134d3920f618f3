//! Parse a saved `time` report into samples, without touching any host. Useful for checking the
//! output of a run that was done by hand.

use clap::clap_app;

use failure::ResultExt;

use crate::sample::Sample;
use crate::timing::TimingParser;

pub fn cli_options() -> clap::App<'static, 'static> {
    clap_app! { parse_time =>
        (about: "Parse the output of bash's `time` (e.g. the stderr of `time ./Allrun`) and print \
                 the samples as JSON.")
        (@setting ArgRequiredElseHelp)
        (@setting DisableVersion)
        (@arg FILE: +required +takes_value
         "A file holding the output of `time`.")
    }
}

pub fn run(sub_m: &clap::ArgMatches<'_>) -> Result<(), failure::Error> {
    let path = sub_m.value_of("FILE").unwrap();
    let output =
        std::fs::read_to_string(path).with_context(|_| format!("reading {}", path))?;

    let samples = parse(&output)?;
    println!("{}", serde_json::to_string_pretty(&samples)?);

    Ok(())
}

fn parse(output: &str) -> Result<Vec<Sample>, failure::Error> {
    Ok(TimingParser::new().parse(output)?)
}
