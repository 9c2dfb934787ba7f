use crate::errors::AppResult;
use crate::models::FinancialRecord;

pub fn forecast_prompt(
    series: &[serde_json::Value],
    date_key: &str,
    value_key: &str,
    periods: usize,
) -> AppResult<String> {
    let history = serde_json::to_string(series)?;
    Ok(format!(
        "You are a financial data scientist. Based on the following historical time-series data, predict the next {periods} data points.
The data represents '{value_key}' over time. The date or period is in the '{date_key}' column.

Historical Data:
{history}

Respond ONLY with a valid JSON array of objects for the next {periods} periods. The objects must have the exact same keys: '{date_key}' and '{value_key}'.
Do not include any introductory text, explanations, or markdown code fences.
"
    ))
}

pub fn report_prompt(rows: &[FinancialRecord]) -> AppResult<String> {
    let data = serde_json::to_string_pretty(rows)?;
    Ok(format!(
        "You are a senior business strategist providing an analysis for an executive review.
Here is the data available for analysis:
--- DATA ---
{data}
--- END DATA ---

Please provide a concise but insightful business report based on this data. Your analysis should include:
1.  **Executive Summary:** A brief overview of the key findings.
2.  **Key Performance Indicators (KPIs):** Identify 2-3 important KPIs from the data, describe their trends, and explain their significance.
3.  **Opportunity:** Highlight one potential opportunity revealed by the data.
4.  **Risk:** Point out one potential risk or area for concern.
5.  **Recommendation:** A clear, actionable recommendation based on your analysis.

Format the entire response in Markdown for readability.
"
    ))
}

#[cfg(test)]
mod tests {
    use super::{forecast_prompt, report_prompt};
    use crate::models::FinancialRecord;
    use chrono::Utc;

    #[test]
    fn forecast_prompt_names_keys_and_embeds_history() {
        let series = vec![serde_json::json!({ "month": "2024-08", "revenue": 50000.0 })];
        let prompt = forecast_prompt(&series, "month", "revenue", 5).expect("prompt");
        assert!(prompt.contains("predict the next 5 data points"));
        assert!(prompt.contains("'month' and 'revenue'"));
        assert!(prompt.contains("[{\"month\":\"2024-08\",\"revenue\":50000.0}]"));
        assert!(prompt.contains("markdown code fences"));
    }

    #[test]
    fn report_prompt_lists_five_sections() {
        let rows = vec![FinancialRecord {
            id: 1,
            created_at: Utc::now(),
            month: "2024-08".to_string(),
            revenue: Some(50_000.0),
            new_users: Some(500),
            conversion_rate: Some(0.05),
        }];
        let prompt = report_prompt(&rows).expect("prompt");
        for section in ["Executive Summary", "Key Performance Indicators", "Opportunity", "Risk", "Recommendation"] {
            assert!(prompt.contains(section), "missing section {section}");
        }
        assert!(prompt.contains("\"new_users\": 500"));
    }
}
