//! flowtrust CLI - fixed command surface over the trust engine.
//!
//! Commands are an enumerated set (no dynamic dispatch): load, score,
//! report, stats, watchlist.

use std::path::PathBuf;
use std::process::ExitCode;

use flowtrust::geo::TableGeoProvider;
use flowtrust::logic::watchlist;
use flowtrust::{constants, EngineConfig, EngineError, TrustEngine};

const USAGE: &str = "usage: flowtrust <command>

commands:
  load                 process all unprocessed netflow batches, oldest first
  score <AS>           print the trust metric for one AS
  report [threshold]   print low-trust sources from the last processed batch
  stats                print global statistics
  watchlist <file>     score a file of IP addresses

environment:
  FLOWTRUST_NETFLOW_DIR    batch directory (default ./netflow)
  FLOWTRUST_STATE_PATH     state database path
  FLOWTRUST_GEO_TABLE      geo lookup table (JSON)
  FLOWTRUST_SOURCE_FILTER  outbound source filter substring";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("{} v{}", constants::APP_NAME, constants::APP_VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), EngineError> {
    let command = match args.first() {
        Some(c) => c.as_str(),
        None => {
            eprintln!("{}", USAGE);
            return Ok(());
        }
    };

    let config = EngineConfig::from_env();
    let geo = load_geo_table();
    let mut engine = TrustEngine::open(config, geo)?;

    match command {
        "load" => {
            let summary = engine.run()?;
            println!(
                "{} batches processed, {} flows ingested, {} records skipped",
                summary.batches_processed, summary.flows_ingested, summary.records_skipped
            );
            for (as_id, metric) in engine.trust_ranking().into_iter().take(20) {
                println!("{:<12} {:>8.0} / {:.0}", as_id, metric, constants::TRUST_SCALE);
            }
        }
        "score" => {
            let as_id = args.get(1).map(|s| s.to_uppercase()).unwrap_or_default();
            if as_id.is_empty() {
                eprintln!("{}", USAGE);
                return Ok(());
            }
            match engine.score(&as_id) {
                Some(metric) => println!(
                    "{} trust metric: {:.0} of {:.0} (lower is better)",
                    as_id,
                    metric,
                    constants::TRUST_SCALE
                ),
                None => println!("{}: trust metric unavailable", as_id),
            }
            if let Some(profile) = engine.profile(&as_id) {
                println!(
                    "  {} ({}) distance={}mi flows={} bytes={} avg_bytes_per_flow={:.0}",
                    profile.org_name,
                    profile.country_code,
                    profile.distance_miles,
                    profile.total_flow_count,
                    profile.total_bytes,
                    profile.avg_bytes_per_flow
                );
            }
        }
        "report" => {
            // The report is scoped to a batch, so process pending batches
            // first; the output reflects the last batch ingested here.
            engine.run()?;
            let flagged = match args.get(1).and_then(|s| s.parse::<f64>().ok()) {
                Some(threshold) => engine.report().low_trust_sources(threshold),
                None => engine.flagged_sources(),
            };
            if flagged.is_empty() {
                println!("no sources above the trust threshold");
            }
            for (source, metric) in flagged {
                println!("{:<40} {:>8.0}", source, metric);
            }
        }
        "stats" => {
            let s = engine.stats_summary();
            println!("total flows:        {}", s.total_flow_count);
            println!("total bytes:        {}", s.total_bytes);
            match s.avg_bytes_per_flow {
                Some(avg) => println!("avg bytes/flow:     {:.0}", avg),
                None => println!("avg bytes/flow:     n/a"),
            }
            println!("flow cutoff:        {:.2}", s.flow_cutoff);
            println!("byte cutoff:        {:.2}", s.byte_cutoff);
            println!("known ASes:         {}", s.as_count);
            println!(
                "coverage:           {} mins in {} batches",
                s.coverage_mins, s.batch_count
            );
            if let (Some(p50), Some(p90)) = (s.byte_volume_p50, s.byte_volume_p90) {
                println!("byte volume p50:    {:.0}", p50);
                println!("byte volume p90:    {:.0}", p90);
            }
        }
        "watchlist" => {
            let path = match args.get(1) {
                Some(p) => PathBuf::from(p),
                None => {
                    eprintln!("{}", USAGE);
                    return Ok(());
                }
            };
            let report = watchlist::score_watchlist(&engine, &path)?;
            match report.avg_trust() {
                Some(avg) => println!(
                    "{} ASes scored, avg trust {:.0} of {:.0}",
                    report.scored_count,
                    avg,
                    constants::TRUST_SCALE
                ),
                None => println!("no scorable ASes in watchlist"),
            }
        }
        _ => {
            eprintln!("unknown command: {}\n\n{}", command, USAGE);
        }
    }

    Ok(())
}

/// Geo table from FLOWTRUST_GEO_TABLE, or an empty provider (every lookup
/// then fails soft and records are dropped as unattributable).
fn load_geo_table() -> TableGeoProvider {
    match std::env::var_os("FLOWTRUST_GEO_TABLE") {
        Some(path) => {
            let path = PathBuf::from(path);
            match TableGeoProvider::load(&path) {
                Ok(table) => table,
                Err(e) => {
                    log::warn!("geo table {} unusable: {} - lookups will fail soft", path.display(), e);
                    TableGeoProvider::default()
                }
            }
        }
        None => {
            log::warn!("FLOWTRUST_GEO_TABLE not set - AS attribution unavailable");
            TableGeoProvider::default()
        }
    }
}
