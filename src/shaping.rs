//! Converts persisted rows into the derived view state the dashboard renders.
//!
//! Everything here is pure: the same rows always produce the same view.

use crate::models::{
    ChangeType, ChartKeys, ChartPoint, FinancialRecord, ForecastPoint, Kpi, NUMERIC_FIELDS,
};
use serde::{Deserialize, Serialize};

const MISSING_VALUE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub kpis: Vec<Kpi>,
    pub chart_keys: Option<ChartKeys>,
    pub rows: Vec<FinancialRecord>,
}

pub fn derive_view_state(rows: &[FinancialRecord]) -> ViewState {
    let Some(first) = rows.first() else {
        return ViewState::default();
    };

    let numeric_fields: Vec<&'static str> = NUMERIC_FIELDS
        .iter()
        .copied()
        .filter(|field| first.numeric_value(field).is_some())
        .collect();

    if numeric_fields.is_empty() {
        return ViewState {
            kpis: Vec::new(),
            chart_keys: None,
            rows: rows.to_vec(),
        };
    }

    let latest = &rows[rows.len() - 1];
    let previous = rows.len().checked_sub(2).map(|index| &rows[index]);

    let kpis = numeric_fields
        .into_iter()
        .map(|field| {
            let latest_value = latest.numeric_value(field);
            let (change, change_type) = match (latest_value, previous.and_then(|row| row.numeric_value(field))) {
                (Some(current), Some(prior)) => period_change(current, prior),
                _ => (None, None),
            };
            Kpi {
                label: humanize_label(field),
                value: latest_value
                    .map(format_number)
                    .unwrap_or_else(|| MISSING_VALUE.to_string()),
                change,
                change_type,
            }
        })
        .collect();

    ViewState {
        kpis,
        chart_keys: Some(ChartKeys::default()),
        rows: rows.to_vec(),
    }
}

fn period_change(current: f64, prior: f64) -> (Option<String>, Option<ChangeType>) {
    if prior == 0.0 || !prior.is_finite() || !current.is_finite() {
        return (None, None);
    }
    let percent = (current - prior) / prior.abs() * 100.0;
    let formatted = format_number(percent.abs());
    if current > prior {
        (Some(format!("+{}%", formatted)), Some(ChangeType::Increase))
    } else if current < prior {
        (Some(format!("-{}%", formatted)), Some(ChangeType::Decrease))
    } else {
        (Some("0%".to_string()), None)
    }
}

/// `new_users` -> `New Users`.
pub fn humanize_label(field: &str) -> String {
    field
        .replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats with `,` grouping and at most two fraction digits, trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let scaled = (value.abs() * 100.0).round();
    if scaled >= u64::MAX as f64 {
        return value.to_string();
    }
    let scaled = scaled as u64;
    let whole = scaled / 100;
    let fraction = scaled % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if value < 0.0 && scaled > 0 {
        out.push('-');
    }
    out.push_str(&grouped);
    if fraction > 0 {
        let fraction = format!("{:02}", fraction);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

/// The two-key series sent to the forecaster.
pub fn history_series(rows: &[FinancialRecord], keys: &ChartKeys) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|row| {
            let mut point = serde_json::Map::new();
            point.insert(keys.x_axis.clone(), row.field_json(&keys.x_axis));
            point.insert(keys.y_axis.clone(), row.field_json(&keys.y_axis));
            serde_json::Value::Object(point)
        })
        .collect()
}

/// Historical points followed by forecast points.
pub fn chart_series(
    rows: &[FinancialRecord],
    forecast: Option<&[ForecastPoint]>,
    keys: &ChartKeys,
) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = rows
        .iter()
        .map(|row| ChartPoint {
            label: match row.field_json(&keys.x_axis) {
                serde_json::Value::String(label) => label,
                other => other.to_string(),
            },
            value: row.numeric_value(&keys.y_axis),
            forecast: false,
        })
        .collect();

    if let Some(forecast) = forecast {
        points.extend(forecast.iter().map(|point| ChartPoint {
            label: point.period.clone(),
            value: Some(point.value),
            forecast: true,
        }));
    }
    points
}
