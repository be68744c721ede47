use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use rapm::stint::Stint;

const TEAMS: usize = 30;
const ROSTER: usize = 13;
const LINEUP: usize = 5;
const POINTS_PER_POSSESSION: f64 = 1.12;

fn main() -> Result<()> {
    let out_path = parse_arg("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/synthetic_stints.jsonl"));
    let stint_count = parse_num_arg("--stints")?.unwrap_or(20_000) as usize;
    let seed = parse_num_arg("--seed")?.unwrap_or(7);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rosters: Vec<Vec<(String, f64)>> = (0..TEAMS)
        .map(|team| {
            (0..ROSTER)
                .map(|slot| {
                    // Bell-shaped per-100 ratings (sd about 3.5) from a sum of uniforms.
                    let z: f64 = (0..6).map(|_| rng.gen_range(-1.0..1.0)).sum::<f64>();
                    (format!("t{team:02}_p{slot:02}"), z * 2.5)
                })
                .collect()
        })
        .collect();

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file =
        fs::File::create(&out_path).with_context(|| format!("create {}", out_path.display()))?;
    let mut out = BufWriter::new(file);

    for n in 0..stint_count {
        let home_team = rng.gen_range(0..TEAMS);
        let mut away_team = rng.gen_range(0..TEAMS - 1);
        if away_team >= home_team {
            away_team += 1;
        }
        let home = pick_lineup(&rosters[home_team], &mut rng)?;
        let away = pick_lineup(&rosters[away_team], &mut rng)?;

        let edge: f64 =
            home.iter().map(|p| p.1).sum::<f64>() - away.iter().map(|p| p.1).sum::<f64>();
        let possessions = rng.gen_range(2..=18);
        let home_rate = (POINTS_PER_POSSESSION + edge / 200.0).clamp(0.6, 1.6);
        let away_rate = (POINTS_PER_POSSESSION - edge / 200.0).clamp(0.6, 1.6);
        let home_points = simulate_points(possessions, home_rate, &mut rng);
        let away_points = simulate_points(possessions, away_rate, &mut rng);
        // Side bookkeeping disagrees now and then, as in real play-by-play.
        let away_possessions = possessions as i64 + rng.gen_range(-1..=1);

        let stint = Stint {
            game_id: Some(format!("g{:05}", n / 40)),
            home_players: home.into_iter().map(|p| p.0).collect(),
            away_players: away.into_iter().map(|p| p.0).collect(),
            home_points,
            away_points,
            home_possessions: possessions as f64,
            away_possessions: away_possessions.max(1) as f64,
        };
        let line = serde_json::to_string(&stint).context("serialize stint")?;
        writeln!(out, "{line}").context("write stint")?;
    }
    out.flush().context("flush stints")?;

    println!(
        "wrote {stint_count} stints for {} players to {}",
        TEAMS * ROSTER,
        out_path.display()
    );
    Ok(())
}

fn pick_lineup(roster: &[(String, f64)], rng: &mut ChaCha8Rng) -> Result<Vec<(String, f64)>> {
    let picked: Vec<(String, f64)> = roster.choose_multiple(rng, LINEUP).cloned().collect();
    if picked.len() != LINEUP {
        return Err(anyhow!("roster too small for a lineup"));
    }
    Ok(picked)
}

fn simulate_points(possessions: u32, rate: f64, rng: &mut ChaCha8Rng) -> u32 {
    let mut points = 0;
    for _ in 0..possessions {
        let roll = rng.gen_range(0.0..1.0);
        let p_score = (rate / 2.2).clamp(0.0, 1.0);
        if roll < p_score * 0.8 {
            points += 2;
        } else if roll < p_score {
            points += 3;
        }
    }
    points
}

fn parse_num_arg(name: &str) -> Result<Option<u64>> {
    let Some(raw) = parse_arg(name) else {
        return Ok(None);
    };
    raw.parse::<u64>()
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
