//! Default rule tables, one per metric family.

use serde_json::Value;

use super::classify::{Rating, Sentiment};
use super::rules::{Extractor, FieldRule, first_number, number_at};
use crate::util::round_to;
use crate::{FieldValue, MetricFamily};

pub fn default_rules(family: MetricFamily) -> Vec<FieldRule> {
    match family {
        MetricFamily::AnalystRatings => analyst_ratings(),
        MetricFamily::NewsSentiment => news_sentiment(),
        MetricFamily::QuantamentalScores => quantamental_scores(),
        MetricFamily::HedgeFundData => hedge_fund_data(),
        MetricFamily::CrowdStatistics => crowd_statistics(),
        MetricFamily::BloggerSentiment => blogger_sentiment(),
        MetricFamily::TechnicalIndicators => technical_indicators(),
        MetricFamily::TargetPrices => target_prices(),
    }
}

fn zero() -> FieldValue {
    FieldValue::Number(0.0)
}

fn analyst_ratings() -> Vec<FieldRule> {
    vec![
        FieldRule::number("total_analysts", &["/analystConsensus/numberOfAnalystRatings"]),
        FieldRule::number("buy_count", &["/analystConsensus/buy"]),
        FieldRule::number("hold_count", &["/analystConsensus/hold"]),
        FieldRule::number("sell_count", &["/analystConsensus/sell"]),
        FieldRule::number("consensus_score", &["/analystConsensus/consensusRating"]),
        FieldRule::new("consensus_rating")
            .then(Extractor::Rating("/analystConsensus/consensus"))
            .then(Extractor::Derived(rating_from_consensus_score)),
        FieldRule::number("avg_price_target", &["/analystPriceTarget/average"]),
        FieldRule::number("high_price_target", &["/analystPriceTarget/high"]),
        FieldRule::number("low_price_target", &["/analystPriceTarget/low"]),
    ]
}

fn rating_from_consensus_score(payload: &Value) -> Option<FieldValue> {
    number_at(payload, "/analystConsensus/consensusRating")
        .map(|score| FieldValue::Rating(Rating::from_score(score)))
}

const STOCK_BULLISH: &str = "/newsSentimentScore/stock/bullishPercent";
const STOCK_BEARISH: &str = "/newsSentimentScore/stock/bearishPercent";

fn news_sentiment() -> Vec<FieldRule> {
    vec![
        FieldRule::number("stock_bullish_percent", &[STOCK_BULLISH]),
        FieldRule::number("stock_bearish_percent", &[STOCK_BEARISH]),
        FieldRule::number(
            "sector_bullish_percent",
            &["/newsSentimentScore/sector/bullishPercent"],
        ),
        FieldRule::number(
            "sector_bearish_percent",
            &["/newsSentimentScore/sector/bearishPercent"],
        ),
        FieldRule::derived("sentiment_score", news_sentiment_score),
        FieldRule::new("sentiment")
            .then(Extractor::Sentiment("/sentiment"))
            .then(Extractor::Derived(news_sentiment_label)),
        FieldRule::number("buzz_score", &["/buzz/buzz"]),
        FieldRule::number("total_articles", &["/buzz/articlesInLastWeek"]),
    ]
}

fn news_sentiment_score(payload: &Value) -> Option<FieldValue> {
    let bullish = number_at(payload, STOCK_BULLISH)?;
    let bearish = number_at(payload, STOCK_BEARISH)?;
    Some(FieldValue::Number(round_to(bullish - bearish, 4)))
}

/// Bullish share of the directional coverage, independent of percent scale.
fn news_sentiment_label(payload: &Value) -> Option<FieldValue> {
    let bullish = number_at(payload, STOCK_BULLISH)?;
    let bearish = number_at(payload, STOCK_BEARISH)?;
    Some(FieldValue::Sentiment(balance_sentiment(bullish, bearish)))
}

fn balance_sentiment(bullish: f64, bearish: f64) -> Sentiment {
    let total = bullish + bearish;
    if total <= 0.0 {
        return Sentiment::Neutral;
    }
    Sentiment::from_score((bullish - bearish) / total)
}

fn quantamental_scores() -> Vec<FieldRule> {
    vec![
        FieldRule::number("overall_score", &["/quantamental"]),
        FieldRule::number("quality_score", &["/quality"]),
        FieldRule::number("value_score", &["/valuation"]),
        FieldRule::number("growth_score", &["/growth"]),
        FieldRule::number("momentum_score", &["/momentum"]),
        FieldRule::number("income_score", &["/income"]),
    ]
}

fn hedge_fund_data() -> Vec<FieldRule> {
    vec![
        FieldRule::number(
            "sentiment_score",
            &["/overview/hedgeFundData/sentiment", "/hedgeFundData/sentiment"],
        ),
        FieldRule::number(
            "trend_action",
            &["/overview/hedgeFundData/trendAction", "/hedgeFundData/trendAction"],
        ),
        FieldRule::number(
            "trend_value",
            &["/overview/hedgeFundData/trendValue", "/hedgeFundData/trendValue"],
        ),
        FieldRule::number(
            "new_positions",
            &["/overview/hedgeFundData/newPositions", "/hedgeFundData/newPositions"],
        )
        .or(zero()),
        FieldRule::number(
            "increased_positions",
            &[
                "/overview/hedgeFundData/increasedPositions",
                "/hedgeFundData/increasedPositions",
            ],
        )
        .or(zero()),
        FieldRule::number(
            "decreased_positions",
            &[
                "/overview/hedgeFundData/decreasedPositions",
                "/hedgeFundData/decreasedPositions",
            ],
        )
        .or(zero()),
        FieldRule::number(
            "closed_positions",
            &[
                "/overview/hedgeFundData/closedPositions",
                "/hedgeFundData/closedPositions",
            ],
        )
        .or(zero()),
    ]
}

fn crowd_statistics() -> Vec<FieldRule> {
    vec![
        FieldRule::number("portfolio_holding", &["/generalStatsAll/portfoliosHolding"]),
        FieldRule::number("amount_of_portfolios", &["/generalStatsAll/amountOfPortfolios"]),
        FieldRule::number("percent_allocated", &["/generalStatsAll/percentAllocated"]),
        FieldRule::number("percent_over_last_7d", &["/generalStatsAll/percentOverLast7Days"]),
        FieldRule::number("percent_over_last_30d", &["/generalStatsAll/percentOverLast30Days"]),
        FieldRule::number("sentiment_score", &["/generalStatsAll/score", "/score"]),
        FieldRule::number("rank_day", &["/generalStatsAll/rankDay", "/rankDay", "/rank/day"]),
        FieldRule::number("rank_week", &["/generalStatsAll/rankWeek", "/rankWeek", "/rank/week"]),
        FieldRule::number(
            "mentions_count",
            &["/generalStatsAll/mentions", "/mentionsCount", "/mentions"],
        ),
    ]
}

const BLOGGER_BULLISH: &str = "/bloggerSentiment/bullishCount";
const BLOGGER_BEARISH: &str = "/bloggerSentiment/bearishCount";
const BLOGGER_NEUTRAL: &str = "/bloggerSentiment/neutralCount";

fn blogger_sentiment() -> Vec<FieldRule> {
    vec![
        FieldRule::number("bullish", &["/bloggerSentiment/bullish"]),
        FieldRule::number("bearish", &["/bloggerSentiment/bearish"]),
        FieldRule::number("neutral", &["/bloggerSentiment/neutral"]),
        FieldRule::number("bullish_count", &[BLOGGER_BULLISH]).or(zero()),
        FieldRule::number("bearish_count", &[BLOGGER_BEARISH]).or(zero()),
        FieldRule::number("neutral_count", &[BLOGGER_NEUTRAL]).or(zero()),
        FieldRule::number("sentiment_score", &["/bloggerSentiment/score"]),
        FieldRule::number("avg_sentiment", &["/bloggerSentiment/avg"]),
        FieldRule::derived("total_articles", |payload| {
            blogger_counts(payload).map(|(b, s, n)| FieldValue::Number(b + s + n))
        }),
        FieldRule::derived("bullish_percent", |payload| {
            blogger_share(payload, |(bullish, _, _)| bullish)
        }),
        FieldRule::derived("bearish_percent", |payload| {
            blogger_share(payload, |(_, bearish, _)| bearish)
        }),
        FieldRule::derived("sentiment", |payload| {
            let (bullish, bearish, _) = blogger_counts(payload)?;
            Some(FieldValue::Sentiment(balance_sentiment(bullish, bearish)))
        }),
    ]
}

fn blogger_counts(payload: &Value) -> Option<(f64, f64, f64)> {
    let bullish = number_at(payload, BLOGGER_BULLISH);
    let bearish = number_at(payload, BLOGGER_BEARISH);
    let neutral = number_at(payload, BLOGGER_NEUTRAL);
    if bullish.is_none() && bearish.is_none() && neutral.is_none() {
        return None;
    }
    Some((
        bullish.unwrap_or(0.0),
        bearish.unwrap_or(0.0),
        neutral.unwrap_or(0.0),
    ))
}

fn blogger_share(payload: &Value, pick: fn((f64, f64, f64)) -> f64) -> Option<FieldValue> {
    let counts = blogger_counts(payload)?;
    let total = counts.0 + counts.1 + counts.2;
    if total <= 0.0 {
        return None;
    }
    Some(FieldValue::Number(round_to(pick(counts) / total * 100.0, 2)))
}

fn technical_indicators() -> Vec<FieldRule> {
    vec![
        FieldRule::number("short_score", &["/scores/0/short/score", "/short/score"]),
        FieldRule::number(
            "intermediate_score",
            &["/scores/0/intermediate/score", "/intermediate/score"],
        ),
        FieldRule::number("long_score", &["/scores/0/long/score", "/long/score"]),
        FieldRule::text("short_signal", &["/scores/0/short/signal", "/short/signal"]),
        FieldRule::text(
            "intermediate_signal",
            &["/scores/0/intermediate/signal", "/intermediate/signal"],
        ),
        FieldRule::text("long_signal", &["/scores/0/long/signal", "/long/signal"]),
    ]
}

fn target_prices() -> Vec<FieldRule> {
    vec![
        FieldRule::number("target_price", &["/targetPrice"]),
        FieldRule::number("close_price", &["/closePrice"]),
        FieldRule::text("target_date", &["/targetDate"]),
        FieldRule::text("last_updated", &["/lastUpdated"]),
        FieldRule::derived("upside_potential", |payload| {
            let target = first_number(payload, &["/targetPrice"])?;
            let close = first_number(payload, &["/closePrice"])?;
            if close == 0.0 {
                return None;
            }
            Some(FieldValue::Number(round_to((target - close) / close * 100.0, 2)))
        }),
    ]
}
