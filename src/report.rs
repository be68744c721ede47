use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::search::{CandidateSummary, SearchResult};
use crate::stint::PlayerIndex;
use crate::trainer::Weights;

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub rank: usize,
    pub player: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub lambda: f64,
    #[serde(default)]
    pub rmse: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<&CandidateSummary> for CandidateRecord {
    fn from(summary: &CandidateSummary) -> Self {
        match &summary.outcome {
            Ok(rmse) => Self {
                lambda: summary.reg_param,
                rmse: Some(*rmse),
                error: None,
            },
            Err(err) => Self {
                lambda: summary.reg_param,
                rmse: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapmArtifact {
    pub version: u32,
    pub generated_at: String,
    pub seed: u64,
    pub train_ratio: f64,
    pub lambda: f64,
    pub held_out_rmse: f64,
    pub train_samples: usize,
    pub held_out_samples: usize,
    #[serde(default)]
    pub candidates: Vec<CandidateRecord>,
    pub ratings: Vec<PlayerRating>,
}

/// Players ordered by coefficient, highest first; equal coefficients by name.
///
/// `top_n = None` keeps every player.
pub fn rank_players(
    weights: &Weights,
    index: &PlayerIndex,
    top_n: Option<usize>,
) -> Vec<PlayerRating> {
    let mut rows: Vec<(&str, f64)> = weights
        .as_slice()
        .iter()
        .enumerate()
        .filter_map(|(idx, &coef)| index.name(idx).map(|name| (name, coef)))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let limit = top_n.unwrap_or(rows.len());
    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(pos, (name, coefficient))| PlayerRating {
            rank: pos + 1,
            player: name.to_string(),
            coefficient,
        })
        .collect()
}

pub struct ArtifactInputs<'a> {
    pub seed: u64,
    pub train_ratio: f64,
    pub train_samples: usize,
    pub held_out_samples: usize,
    pub candidates: &'a [CandidateSummary],
}

pub fn build_artifact(
    result: &SearchResult,
    index: &PlayerIndex,
    inputs: ArtifactInputs<'_>,
) -> RapmArtifact {
    let mut candidates: Vec<CandidateRecord> =
        inputs.candidates.iter().map(CandidateRecord::from).collect();
    candidates.sort_by(|a, b| a.lambda.total_cmp(&b.lambda));
    RapmArtifact {
        version: ARTIFACT_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        seed: inputs.seed,
        train_ratio: inputs.train_ratio,
        lambda: result.reg_param,
        held_out_rmse: result.rmse,
        train_samples: inputs.train_samples,
        held_out_samples: inputs.held_out_samples,
        candidates,
        ratings: rank_players(&result.weights, index, None),
    }
}

pub fn write_artifact(artifact: &RapmArtifact, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_string_pretty(artifact).context("serialize artifact")?;
    fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

pub fn print_ratings(ratings: &[PlayerRating]) {
    for row in ratings {
        println!("{:>4}  {:28} {:+8.3}", row.rank, row.player, row.coefficient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RapmError;

    #[test]
    fn ranking_is_descending_with_name_tiebreak() {
        let index = PlayerIndex::from_names(["carl", "ann", "bob"]);
        // indices: ann=0, bob=1, carl=2
        let w = Weights::from(vec![1.5, -2.0, 1.5]);
        let ranked = rank_players(&w, &index, None);
        let names: Vec<&str> = ranked.iter().map(|r| r.player.as_str()).collect();
        assert_eq!(names, vec!["ann", "carl", "bob"]);
        assert_eq!(ranked[2].rank, 3);

        let top = rank_players(&w, &index, Some(1));
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].player, "ann");
    }

    #[test]
    fn candidate_records_keep_failures() {
        let ok = CandidateSummary {
            reg_param: 0.1,
            outcome: Ok(3.0),
        };
        let failed = CandidateSummary {
            reg_param: 1.0,
            outcome: Err(RapmError::EmptyEvaluation),
        };
        let ok = CandidateRecord::from(&ok);
        let failed = CandidateRecord::from(&failed);
        assert_eq!(ok.rmse, Some(3.0));
        assert!(failed.rmse.is_none());
        assert!(failed.error.unwrap().contains("empty"));
    }

    fn tiny_artifact() -> RapmArtifact {
        RapmArtifact {
            version: ARTIFACT_VERSION,
            generated_at: "2026-01-01T00:00:00+00:00".to_string(),
            seed: 42,
            train_ratio: 0.8,
            lambda: 0.01,
            held_out_rmse: 12.5,
            train_samples: 8,
            held_out_samples: 2,
            candidates: Vec::new(),
            ratings: vec![PlayerRating {
                rank: 1,
                player: "ann".to_string(),
                coefficient: 1.5,
            }],
        }
    }

    #[test]
    fn artifact_write_creates_parent_dirs_and_reports_blocked_parent() {
        let root = std::env::temp_dir().join(format!("rapm_report_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);

        let nested = root.join("a").join("b").join("rapm.json");
        write_artifact(&tiny_artifact(), &nested).unwrap();
        let raw = fs::read_to_string(&nested).unwrap();
        let back: RapmArtifact = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.ratings[0].player, "ann");

        let blocker = root.join("plain_file");
        fs::write(&blocker, "x").unwrap();
        let err = write_artifact(&tiny_artifact(), &blocker.join("rapm.json")).unwrap_err();
        assert!(format!("{err:#}").contains("create"), "{err:#}");

        let _ = fs::remove_dir_all(&root);
    }
}
