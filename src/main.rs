use std::fs;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use rapm::config::RapmConfig;
use rapm::dataset::random_split;
use rapm::report::{self, ArtifactInputs};
use rapm::search::{CandidateSummary, GridSearch};
use rapm::stint::{self, PlayerIndex, StintReader};
use rapm::{evaluate, exact};

const DEFAULT_TOP: usize = 25;
const EXACT_CHECK_MAX_DIM: usize = 2000;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let stints_path = parse_path_arg("--stints").context("missing --stints <path.jsonl>")?;
    let out_path = parse_path_arg("--out");
    let top = parse_usize_arg("--top")?.unwrap_or(DEFAULT_TOP);
    let merge = has_flag("--merge-lineups");
    let check_exact = has_flag("--check-exact");

    let cfg = RapmConfig::from_env().context("load RAPM_* configuration")?;

    let file =
        fs::File::open(&stints_path).with_context(|| format!("open {}", stints_path.display()))?;
    let mut stints = StintReader::new(BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("read stints from {}", stints_path.display()))?;
    if merge {
        let before = stints.len();
        stints = stint::merge_matchups(&stints);
        println!("merged {before} stints into {} matchups", stints.len());
    }

    let index = PlayerIndex::build(&stints);
    if index.is_empty() {
        return Err(anyhow!("no players found in {}", stints_path.display()));
    }
    let (examples, summary) = stint::encode_stints(&stints, &index).context("encode stints")?;
    println!(
        "players={} examples={} skipped_no_possessions={}",
        index.len(),
        summary.encoded,
        summary.skipped_no_possessions
    );

    let split = random_split(examples, cfg.train_ratio, cfg.seed).context("split examples")?;
    println!(
        "train={} held_out={} seed={} ratio={:.2}",
        split.train.len(),
        split.held_out.len(),
        cfg.seed,
        cfg.train_ratio
    );

    let observed: Mutex<Vec<CandidateSummary>> = Mutex::new(Vec::new());
    let search = GridSearch::new(cfg.lambdas.clone()).with_execution(cfg.execution());
    println!(
        "searching {} lambda candidates ({:?})",
        search.candidates().len(),
        cfg.execution()
    );
    let best = search
        .run_observed(&split.train, &split.held_out, &cfg.ridge(), |summary| {
            if let Ok(mut guard) = observed.lock() {
                guard.push(summary.clone());
            }
        })
        .context("grid search")?;
    let mut candidates = observed
        .into_inner()
        .map_err(|_| anyhow!("candidate log lock poisoned"))?;
    candidates.sort_by(|a, b| a.reg_param.total_cmp(&b.reg_param));

    println!();
    println!("lambda sweep (held-out rmse):");
    for c in &candidates {
        match &c.outcome {
            Ok(rmse) => println!("  lambda={:<10} rmse={rmse:.4}", c.reg_param),
            Err(err) => println!("  lambda={:<10} failed: {err}", c.reg_param),
        }
    }
    println!("selected lambda={} rmse={:.4}", best.reg_param, best.rmse);

    if check_exact {
        if index.len() > EXACT_CHECK_MAX_DIM {
            println!(
                "skip exact check: {} players exceeds {EXACT_CHECK_MAX_DIM}",
                index.len()
            );
        } else {
            let reference = exact::solve_ridge(&split.train, best.reg_param)
                .context("exact ridge solve")?;
            let reference_rmse = evaluate::rmse(&reference, &split.held_out, best.reg_param)
                .context("exact ridge rmse")?;
            let max_gap = best
                .weights
                .as_slice()
                .iter()
                .zip(reference.as_slice())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max);
            println!("exact check: rmse={reference_rmse:.4} max |w_sgd - w_exact|={max_gap:.5}");
        }
    }

    println!();
    println!("Top {top} players by coefficient:");
    report::print_ratings(&report::rank_players(&best.weights, &index, Some(top)));

    if let Some(out_path) = out_path {
        let artifact = report::build_artifact(
            &best,
            &index,
            ArtifactInputs {
                seed: cfg.seed,
                train_ratio: cfg.train_ratio,
                train_samples: split.train.len(),
                held_out_samples: split.held_out.len(),
                candidates: &candidates,
            },
        );
        report::write_artifact(&artifact, &out_path)?;
        println!();
        println!("artifact written: {}", out_path.display());
    }
    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_arg(name).map(PathBuf::from)
}

fn parse_usize_arg(name: &str) -> Result<Option<usize>> {
    let Some(raw) = parse_arg(name) else {
        return Ok(None);
    };
    raw.parse::<usize>()
        .map(Some)
        .with_context(|| format!("{name} expects a number, got {raw:?}"))
}

fn parse_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix)
            && !v.trim().is_empty()
        {
            return Some(v.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|a| a == flag)
}
