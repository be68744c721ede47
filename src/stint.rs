use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::error::{RapmError, RapmResult};
use crate::sparse::{Example, SparseVector};

const HOME_SIGN: f64 = 1.0;
const AWAY_SIGN: f64 = -1.0;

/// A stretch of play with both lineups unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stint {
    #[serde(default)]
    pub game_id: Option<String>,
    pub home_players: Vec<String>,
    pub away_players: Vec<String>,
    pub home_points: u32,
    pub away_points: u32,
    pub home_possessions: f64,
    pub away_possessions: f64,
}

impl Stint {
    /// Mean of the two sides' possession counts.
    ///
    /// The sides are bookkept separately and can disagree by a possession or
    /// two; averaging them is intentional.
    pub fn possessions(&self) -> f64 {
        (self.home_possessions + self.away_possessions) / 2.0
    }

    /// Home point margin per 100 possessions, `None` without positive possessions.
    pub fn margin_per_100(&self) -> Option<f64> {
        let poss = self.possessions();
        if !(poss.is_finite() && poss > 0.0) {
            return None;
        }
        let margin = self.home_points as f64 - self.away_points as f64;
        Some(100.0 * margin / poss)
    }

    fn matchup_key(&self) -> (Vec<String>, Vec<String>) {
        let mut home = self.home_players.clone();
        let mut away = self.away_players.clone();
        home.sort();
        away.sort();
        (home, away)
    }
}

/// Streams stints from JSON lines, one object per line. Blank lines are skipped.
pub struct StintReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> StintReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for StintReader<R> {
    type Item = RapmResult<Stint>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(RapmError::Ingest {
                        line: self.line_no,
                        detail: err.to_string(),
                    }));
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(serde_json::from_str::<Stint>(trimmed).map_err(|err| {
                RapmError::Ingest {
                    line: self.line_no,
                    detail: err.to_string(),
                }
            }));
        }
    }
}

pub fn read_stints<R: BufRead>(reader: R) -> RapmResult<Vec<Stint>> {
    StintReader::new(reader).collect()
}

/// Sum stints that share the same two lineups (order inside a lineup ignored).
///
/// Output is ordered by lineup so the merge is deterministic.
pub fn merge_matchups(stints: &[Stint]) -> Vec<Stint> {
    let mut merged: BTreeMap<(Vec<String>, Vec<String>), Stint> = BTreeMap::new();
    for stint in stints {
        let key = stint.matchup_key();
        match merged.get_mut(&key) {
            Some(acc) => {
                acc.home_points += stint.home_points;
                acc.away_points += stint.away_points;
                acc.home_possessions += stint.home_possessions;
                acc.away_possessions += stint.away_possessions;
                acc.game_id = None;
            }
            None => {
                let mut first = stint.clone();
                first.home_players = key.0.clone();
                first.away_players = key.1.clone();
                merged.insert(key, first);
            }
        }
    }
    merged.into_values().collect()
}

/// Immutable player-name to feature-index mapping.
///
/// Names are sorted before enumeration, so the same set of players always
/// maps to the same indices regardless of input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIndex {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl PlayerIndex {
    pub fn build(stints: &[Stint]) -> Self {
        let unique: BTreeSet<&str> = stints
            .iter()
            .flat_map(|s| s.home_players.iter().chain(s.away_players.iter()))
            .map(|name| name.as_str())
            .collect();
        Self::from_names(unique)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let unique: BTreeSet<&str> = names.into_iter().collect();
        let names: Vec<String> = unique.into_iter().map(str::to_string).collect();
        let by_name = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self { names, by_name }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    pub encoded: usize,
    pub skipped_no_possessions: usize,
}

/// Turn stints into examples: home players `+1`, away players `-1`,
/// label = home margin per 100 possessions.
pub fn encode_stints(
    stints: &[Stint],
    index: &PlayerIndex,
) -> RapmResult<(Vec<Example>, EncodeSummary)> {
    let mut examples = Vec::with_capacity(stints.len());
    let mut summary = EncodeSummary::default();

    for (pos, stint) in stints.iter().enumerate() {
        let Some(label) = stint.margin_per_100() else {
            summary.skipped_no_possessions += 1;
            continue;
        };

        let mut entries: Vec<(usize, f64)> =
            Vec::with_capacity(stint.home_players.len() + stint.away_players.len());
        let mut home_seen = BTreeSet::new();
        for name in &stint.home_players {
            entries.push((lookup(index, name, pos)?, HOME_SIGN));
            home_seen.insert(name.as_str());
        }
        for name in &stint.away_players {
            if home_seen.contains(name.as_str()) {
                return Err(RapmError::InvalidStint {
                    index: pos,
                    detail: format!("player {name} listed on both sides"),
                });
            }
            entries.push((lookup(index, name, pos)?, AWAY_SIGN));
        }

        let features = SparseVector::new(index.len(), entries)?;
        examples.push(Example::new(features, label));
        summary.encoded += 1;
    }

    if summary.skipped_no_possessions > 0 {
        log::warn!(
            "skipped {} stint(s) without positive possessions",
            summary.skipped_no_possessions
        );
    }
    Ok((examples, summary))
}

fn lookup(index: &PlayerIndex, name: &str, pos: usize) -> RapmResult<usize> {
    index.index_of(name).ok_or_else(|| RapmError::InvalidStint {
        index: pos,
        detail: format!("player {name} missing from index"),
    })
}
