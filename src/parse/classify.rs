//! Closed classification sets shared by parsers, comparison and alerts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowercase, collapse `-`/`_`/whitespace runs into single spaces.
fn normalize_label(text: &str) -> String {
    text.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    StrongBuy,
    ModerateBuy,
    Buy,
    Hold,
    Sell,
    ModerateSell,
    StrongSell,
    Unknown,
}

impl Rating {
    /// Map a consensus label such as `"Moderate Buy"` or `"strong-sell"`.
    pub fn from_label(text: &str) -> Rating {
        match normalize_label(text).as_str() {
            "strong buy" => Rating::StrongBuy,
            "moderate buy" => Rating::ModerateBuy,
            "buy" | "outperform" => Rating::Buy,
            "hold" | "neutral" => Rating::Hold,
            "sell" | "underperform" => Rating::Sell,
            "moderate sell" => Rating::ModerateSell,
            "strong sell" => Rating::StrongSell,
            _ => Rating::Unknown,
        }
    }

    /// Map a 1-5 consensus score, 5 being the most bullish.
    pub fn from_score(score: f64) -> Rating {
        if !score.is_finite() {
            return Rating::Unknown;
        }
        match score {
            s if s >= 4.5 => Rating::StrongBuy,
            s if s >= 3.5 => Rating::ModerateBuy,
            s if s >= 2.5 => Rating::Hold,
            s if s >= 1.5 => Rating::ModerateSell,
            _ => Rating::StrongSell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::StrongBuy => "Strong Buy",
            Rating::ModerateBuy => "Moderate Buy",
            Rating::Buy => "Buy",
            Rating::Hold => "Hold",
            Rating::Sell => "Sell",
            Rating::ModerateSell => "Moderate Sell",
            Rating::StrongSell => "Strong Sell",
            Rating::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Neutral,
    Bearish,
    Unknown,
}

/// Scores beyond this distance from zero are directional.
const SENTIMENT_THRESHOLD: f64 = 0.2;

impl Sentiment {
    pub fn from_label(text: &str) -> Sentiment {
        match normalize_label(text).as_str() {
            "bullish" | "very bullish" | "positive" | "very positive" => Sentiment::Bullish,
            "bearish" | "very bearish" | "negative" | "very negative" => Sentiment::Bearish,
            "neutral" => Sentiment::Neutral,
            _ => Sentiment::Unknown,
        }
    }

    /// Classify a score on either a -1..1 scale or a 0..100 scale.
    ///
    /// Scores above 1 are taken as 0..100 and re-centred on 50.
    pub fn from_score(score: f64) -> Sentiment {
        if !score.is_finite() {
            return Sentiment::Unknown;
        }
        let centred = if score > 1.0 {
            (score - 50.0) / 50.0
        } else {
            score
        };

        if centred > SENTIMENT_THRESHOLD {
            Sentiment::Bullish
        } else if centred < -SENTIMENT_THRESHOLD {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        }
    }

    /// Bullish vs bearish, in either direction.
    pub fn is_opposite(&self, other: &Sentiment) -> bool {
        matches!(
            (self, other),
            (Sentiment::Bullish, Sentiment::Bearish) | (Sentiment::Bearish, Sentiment::Bullish)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Neutral => "neutral",
            Sentiment::Bearish => "bearish",
            Sentiment::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
