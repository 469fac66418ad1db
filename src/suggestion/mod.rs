//! Suggested answers for admins.
//!
//! Scores a small knowledge base against the question text. Results go
//! back to the requester only and are never broadcast.

use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::SuggestionConfig;

const KNOWLEDGE_BASE: &[&str] = &[
    "We are currently looking for Senior Engineers and Product Designers. Please visit our careers page.",
    "We recently closed our Series A led by TopTier VC. We are well capitalized for the next 24 months.",
    "Our roadmap includes mobile apps and advanced analytics. Stay tuned for the Q4 release.",
    "Our mission is to democratize access to founder knowledge through real-time tooling.",
];

pub const FALLBACK_SUGGESTION: &str = "That's a great question. We appreciate your interest and will get back to you with a detailed update shortly.";

pub struct SuggestionService {
    entries: Vec<(&'static str, HashMap<String, f64>)>,
    delay: Duration,
    min_score: f64,
}

impl SuggestionService {
    pub fn new(config: &SuggestionConfig) -> Self {
        Self {
            entries: KNOWLEDGE_BASE.iter().map(|doc| (*doc, term_vector(doc))).collect(),
            delay: Duration::from_millis(config.delay_ms),
            min_score: config.min_score,
        }
    }

    pub async fn suggest(&self, text: &str) -> String {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let query = term_vector(text);
        let best = self
            .entries
            .iter()
            .map(|(doc, terms)| (*doc, cosine(&query, terms)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((doc, score)) if score >= self.min_score => {
                debug!("Suggestion matched with score {:.3}", score);
                doc.to_string()
            }
            _ => FALLBACK_SUGGESTION.to_string(),
        }
    }
}

fn term_vector(text: &str) -> HashMap<String, f64> {
    let mut terms = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
    {
        *terms.entry(word).or_insert(0.0) += 1.0;
    }
    terms
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a.iter().filter_map(|(k, x)| b.get(k).map(|y| x * y)).sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
