use comlens_core::AnalysisResult;

/// Format a normalized analysis as human-readable markdown
pub fn format_result_readable(result: &AnalysisResult, heading: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", heading));

    output.push_str("## Summary\n\n");
    output.push_str(&result.summary);
    output.push_str("\n\n");

    if let Some(summary_en) = &result.summary_en {
        output.push_str("## Summary (English)\n\n");
        output.push_str(summary_en);
        output.push_str("\n\n");
    }

    output.push_str("## Sentiment\n\n");
    output.push_str(&format!(
        "**Positive:** {:.0}% | **Negative:** {:.0}% | **Neutral:** {:.0}%\n\n",
        result.sentiment.positive, result.sentiment.negative, result.sentiment.neutral
    ));

    if !result.topics.is_empty() {
        output.push_str("## Topics\n\n");
        for topic in &result.topics {
            output.push_str(&format!("• {}\n", topic));
        }
        output.push('\n');
    }

    if !result.hidden_gems.is_empty() {
        output.push_str("## Hidden Gems\n\n");
        for (i, gem) in result.hidden_gems.iter().enumerate() {
            output.push_str(&format!(
                "{}. \"{}\" — {} ({} likes)\n",
                i + 1,
                gem.comment,
                gem.author,
                gem.like_count
            ));
            if !gem.reason.is_empty() {
                output.push_str(&format!("   {}\n", gem.reason));
            }
        }
        output.push('\n');
    }

    if !result.controversy.is_empty() {
        output.push_str("## Controversy\n\n");
        for entry in &result.controversy {
            output.push_str(&format!("### {}\n\n{}\n\n", entry.topic, entry.description));
        }
    }

    if !result.keywords.is_empty() {
        output.push_str("## Keywords\n\n");
        output.push_str(&result.keywords.join(", "));
        output.push('\n');
    }

    output
}
