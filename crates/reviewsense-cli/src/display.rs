//! Terminal rendering for results, stats, and incoming records.

use reviewsense_core::{IncomingReview, SentimentResult, SentimentStats};
use reviewsense_sync::TriggerOutcome;

use crate::import::ImportSummary;
use reviewsense_sync::http::ReviewsPage;

const REVIEW_WIDTH: usize = 56;

// ── Single result ──

pub fn print_result(result: &SentimentResult) {
    println!("  {:<14} {}", "sentiment", result.sentiment);
    println!("  {:<14} {:.4}", "confidence", result.confidence);
    println!("  {:<14} {}", "review", result.review);
    if let Some(title) = &result.movie_title {
        println!("  {:<14} {}", "movie_title", title);
    }
    if let Some(user) = &result.user_id {
        println!("  {:<14} {}", "user_id", user);
    }
    println!("  {:<14} {}", "timestamp", result.timestamp.to_rfc3339());
    println!("  {:<14} {}", "model_version", result.model_version);
}

// ── Listings ──

pub fn print_reviews(page: &ReviewsPage) {
    if page.reviews.is_empty() {
        println!("No reviews (limit {}, skip {}).", page.limit, page.skip);
        return;
    }
    println!(
        "{:>6}  {:<8}  {:>6}  {:<20}  {}",
        "id", "label", "conf", "timestamp", "review"
    );
    for stored in &page.reviews {
        let r = &stored.result;
        println!(
            "{:>6}  {:<8}  {:>6.3}  {:<20}  {}",
            stored.id,
            r.sentiment.as_str(),
            r.confidence,
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            truncate(&r.review, REVIEW_WIDTH)
        );
    }
    println!(
        "\n{} shown (limit {}, skip {})",
        page.total, page.limit, page.skip
    );
}

pub fn print_incoming(records: &[IncomingReview]) {
    if records.is_empty() {
        println!("No incoming records.");
        return;
    }
    println!(
        "{:>6}  {:<11}  {:<8}  {:>6}  {}",
        "id", "status", "label", "conf", "review"
    );
    for rec in records {
        let label = rec.sentiment.map(|s| s.as_str()).unwrap_or("-");
        let conf = rec
            .confidence
            .map(|c| format!("{c:.3}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>6}  {:<11}  {:<8}  {:>6}  {}",
            rec.id,
            rec.status.as_str(),
            label,
            conf,
            truncate(&rec.review, REVIEW_WIDTH)
        );
        if let Some(err) = &rec.error {
            println!("{:>6}  error: {}", "", err);
        }
    }
}

// ── Aggregates ──

pub fn print_stats(stats: &SentimentStats) {
    println!("  {:<20} {}", "total", stats.total);
    println!("  {:<20} {}", "positive", stats.positive_count);
    println!("  {:<20} {}", "negative", stats.negative_count);
    println!("  {:<20} {:.1}%", "positive share", stats.positive_percentage);
    println!("  {:<20} {:.3}", "avg confidence", stats.average_confidence);
}

pub fn print_import(summary: &ImportSummary) {
    println!("  {:<20} {}", "processed", summary.processed);
    println!("  {:<20} {}", "failed", summary.failed);
    if let Some(agreement) = summary.agreement() {
        println!(
            "  {:<20} {:.1}% ({}/{})",
            "label agreement",
            agreement * 100.0,
            summary.agreed,
            summary.labelled
        );
    }
    println!();
}

pub fn print_outcome(outcome: &TriggerOutcome) {
    match outcome {
        TriggerOutcome::Skipped { reason } => println!("skipped: {reason}"),
        TriggerOutcome::Processed {
            id,
            sentiment,
            confidence,
        } => println!("record {id} processed: {sentiment} ({confidence:.3})"),
        TriggerOutcome::Failed { id, error } => println!("record {id} failed: {error}"),
    }
}

/// Cut `text` to at most `max` characters, marking the cut with `…`.
fn truncate(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        return flat;
    }
    let mut out: String = flat.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
