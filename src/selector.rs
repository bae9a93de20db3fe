use futures::future::join_all;
use serde::Serialize;

use crate::scoring::QualityScorer;

/// One scored output image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleCandidate {
    pub url: String,
    pub score: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub url: String,
    /// `None` when no scoring was needed or every call failed.
    pub score: Option<f64>,
    /// Ranked best-first. Empty when scoring was skipped.
    pub candidates: Vec<SampleCandidate>,
}

/// Keep only outputs that can be displayed: `http(s)` URLs or inline images.
pub fn validate_outputs(outputs: Vec<String>) -> Vec<String> {
    outputs
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| {
            let valid = o.starts_with("https://")
                || o.starts_with("http://")
                || o.starts_with("data:image/");
            if !valid {
                tracing::warn!(output = %o, "Dropping invalid output");
            }
            valid
        })
        .collect()
}

/// Picks the best of several candidate outputs.
pub struct SampleSelector<'a, S> {
    scorer: &'a S,
    neutral_score: f64,
}

impl<'a, S: QualityScorer> SampleSelector<'a, S> {
    pub fn new(scorer: &'a S, neutral_score: f64) -> Self {
        Self {
            scorer,
            neutral_score,
        }
    }

    /// A single candidate is returned without scoring. Otherwise every
    /// candidate is scored concurrently; failures get the neutral score,
    /// and if all fail the first candidate wins.
    pub async fn select_best(&self, candidates: &[String]) -> Option<Selection> {
        match candidates {
            [] => None,
            [only] => Some(Selection {
                url: only.clone(),
                score: None,
                candidates: Vec::new(),
            }),
            _ => Some(self.rank(candidates).await),
        }
    }

    async fn rank(&self, candidates: &[String]) -> Selection {
        let results = join_all(candidates.iter().map(|url| self.scorer.score(url))).await;

        let mut failures = 0usize;
        let mut ranked: Vec<SampleCandidate> = candidates
            .iter()
            .zip(results)
            .map(|(url, result)| match result {
                Ok(s) => SampleCandidate {
                    url: url.clone(),
                    score: s.score,
                    reasoning: s.reasoning,
                },
                Err(e) => {
                    failures += 1;
                    tracing::warn!(url = %url, error = %e, "Scoring failed, using neutral score");
                    SampleCandidate {
                        url: url.clone(),
                        score: self.neutral_score,
                        reasoning: format!("scoring failed: {e}"),
                    }
                }
            })
            .collect();

        if failures == candidates.len() {
            tracing::warn!("All scoring calls failed, keeping first candidate");
            return Selection {
                url: candidates[0].clone(),
                score: None,
                candidates: ranked,
            };
        }

        // Stable: ties keep provider order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        let best = &ranked[0];
        tracing::info!(url = %best.url, score = best.score, candidates = ranked.len(), "Selected best sample");
        Selection {
            url: best.url.clone(),
            score: Some(best.score),
            candidates: ranked,
        }
    }
}
