use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use chrono::{TimeZone, Utc};
use cvs_log::Parser;
use cvs_patchset_process::CvsLog;
use patchset::Engine;
use regex::Regex;
use structopt::StructOpt;

use filter::Restrictions;

mod filter;
mod output;
mod sandbox;
mod stats;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cvs-patchset",
    about = "reconstructs logical commits (patch sets) from per-file CVS history"
)]
struct Opt {
    #[structopt(
        short = "z",
        long = "fuzz",
        default_value = "300",
        help = "timestamp fuzz factor for identifying patch sets, in seconds"
    )]
    fuzz: i64,

    #[structopt(
        short = "s",
        help = "generate diffs for the given patch sets (comma-separated ranges: N or N-M)"
    )]
    show: Option<String>,

    #[structopt(short = "a", help = "restrict output to patch sets created by author")]
    author: Option<String>,

    #[structopt(
        short = "l",
        parse(try_from_str = Regex::new),
        help = "restrict output to patch sets matching a regex in the log message"
    )]
    log_filter: Option<Regex>,

    #[structopt(short = "f", help = "restrict output to patch sets involving file")]
    file: Option<String>,

    #[structopt(
        short = "d",
        number_of_values = 1,
        help = "show revisions newer than date; given twice, between the two dates"
    )]
    date: Vec<String>,

    #[structopt(
        short = "r",
        number_of_values = 1,
        help = "show revisions since tag; given twice, between the two tags"
    )]
    tag: Vec<String>,

    #[structopt(
        short = "b",
        help = "restrict output to patch sets affecting the history of branch"
    )]
    branch: Option<String>,

    #[structopt(short = "u", long = "update", help = "update the cvsps.cache file")]
    update_cache: bool,

    #[structopt(
        short = "x",
        long = "ignore-cache",
        help = "ignore (and rebuild) the cvsps.cache file"
    )]
    ignore_cache: bool,

    #[structopt(
        short = "p",
        long = "patch-dir",
        help = "output patch sets to individual files in the given directory"
    )]
    patch_set_dir: Option<PathBuf>,

    #[structopt(short = "v", long = "verbose", help = "show verbose parsing messages")]
    verbose: bool,

    #[structopt(short = "t", long = "statistics", help = "show brief statistics")]
    statistics: bool,

    #[structopt(long = "norc", help = "when invoking cvs, ignore the .cvsrc file")]
    norc: bool,

    #[structopt(
        long = "summary-first",
        help = "when multiple patch sets are shown, put all summaries first"
    )]
    summary_first: bool,

    #[structopt(
        long = "test-log",
        help = "parse a saved log file instead of invoking cvs"
    )]
    test_log: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();

    let _logger =
        flexi_logger::Logger::try_with_env_or_str(if opt.verbose { "debug" } else { "warn" })?
            .start()?;

    if opt.branch.as_deref() == Some("TRUNK") {
        log::warn!("the HEAD branch of CVS is called HEAD, not TRUNK");
    }
    if opt.date.len() > 2 {
        anyhow::bail!("at most two -d dates may be given");
    }
    if opt.tag.len() > 2 {
        anyhow::bail!("at most two -r tags may be given");
    }

    let mut engine = Engine::new();
    let cache_path = cvs_patchset_state::cache_file()?;

    let mut cache_date = None;
    if !opt.ignore_cache {
        // The cache stores canonical patch sets, so reloading never
        // re-fuzzes; the configured fuzz only applies to live log parsing.
        cache_date = cvs_patchset_state::read_cache(&mut engine, &cache_path)?;
    }

    let update_cache = opt.update_cache || opt.ignore_cache || cache_date.is_none();
    let mut do_write_cache = false;
    let mut write_date = cache_date.unwrap_or(0);

    if update_cache {
        write_date = load_from_cvs(&mut engine, &opt, cache_date)?;
        do_write_cache = true;
    }

    engine.resolve_global_symbols(
        opt.tag.get(0).map(String::as_str),
        opt.tag.get(1).map(String::as_str),
    );

    if do_write_cache {
        // Losing the cache costs a rebuild next run, nothing more.
        if let Err(e) = cvs_patchset_state::write_cache(&engine, &cache_path, write_date) {
            log::error!("can't write cache file {}: {}", cache_path.display(), e);
        }
    }

    if opt.statistics {
        println!("Statistics:");
        stats::print(&engine);
    }

    let mut restrictions = Restrictions::from_opt(&opt)?;
    output::show_patch_sets(&engine, &opt, &mut restrictions)?;

    Ok(())
}

/// Streams a fresh (or incremental) log through the parser into the engine.
/// Returns the moment the log was requested, which becomes the new cache
/// date.
fn load_from_cvs(engine: &mut Engine, opt: &Opt, cache_date: Option<i64>) -> anyhow::Result<i64> {
    let strip = sandbox::strip_path(".")?;

    let since = cache_date
        .filter(|&date| date > 0)
        .and_then(|date| Utc.timestamp_opt(date, 0).single())
        .map(|date| date.format("%b %d, %Y %H:%M:%S GMT").to_string());

    let now = Utc::now().timestamp();

    if let Some(path) = &opt.test_log {
        let reader = BufReader::new(File::open(path)?);
        run_parser(engine, reader, &strip, opt.fuzz)?;
    } else {
        let mut cvs = CvsLog::spawn(opt.norc, since.as_deref())?;
        let reader = cvs.reader()?;
        run_parser(engine, reader, &strip, opt.fuzz)?;
        cvs.wait()?;
    }

    Ok(now)
}

fn run_parser<R: BufRead>(
    engine: &mut Engine,
    reader: R,
    strip: &str,
    fuzz: i64,
) -> anyhow::Result<()> {
    for event in Parser::new(reader, strip) {
        engine.apply(event?, fuzz)?;
    }

    Ok(())
}
