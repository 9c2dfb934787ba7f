use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DATE_KEY: &str = "month";
pub const PRIMARY_VALUE_KEY: &str = "revenue";
pub const NUMERIC_FIELDS: [&str; 3] = ["revenue", "new_users", "conversion_rate"];
pub const FORECAST_PERIODS: usize = 5;

/// One row of the `financial_data` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FinancialRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub month: String,
    pub revenue: Option<f64>,
    pub new_users: Option<i64>,
    pub conversion_rate: Option<f64>,
}

impl FinancialRecord {
    /// Value of a numeric column, widened to `f64`. Unknown names yield `None`.
    pub fn numeric_value(&self, field: &str) -> Option<f64> {
        match field {
            "revenue" => self.revenue,
            "new_users" => self.new_users.map(|value| value as f64),
            "conversion_rate" => self.conversion_rate,
            _ => None,
        }
    }

    /// Column value as JSON, `Null` for absent values and unknown names.
    pub fn field_json(&self, field: &str) -> serde_json::Value {
        match field {
            "id" => serde_json::Value::from(self.id),
            "created_at" => serde_json::Value::from(self.created_at.to_rfc3339()),
            "month" => serde_json::Value::from(self.month.clone()),
            "revenue" => self.revenue.map(serde_json::Value::from).unwrap_or_default(),
            "new_users" => self.new_users.map(serde_json::Value::from).unwrap_or_default(),
            "conversion_rate" => self.conversion_rate.map(serde_json::Value::from).unwrap_or_default(),
            _ => serde_json::Value::Null,
        }
    }
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NewFinancialRecord {
    pub month: String,
    pub revenue: f64,
    pub new_users: Option<i64>,
    pub conversion_rate: Option<f64>,
}

/// Raw text captured by the entry form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecordForm {
    pub month: String,
    pub revenue: String,
    pub new_users: String,
    pub conversion_rate: String,
}

impl RecordForm {
    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        match field {
            FormField::Month => self.month = value,
            FormField::Revenue => self.revenue = value,
            FormField::NewUsers => self.new_users = value,
            FormField::ConversionRate => self.conversion_rate = value,
        }
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Month => &self.month,
            FormField::Revenue => &self.revenue,
            FormField::NewUsers => &self.new_users,
            FormField::ConversionRate => &self.conversion_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Month,
    Revenue,
    NewUsers,
    ConversionRate,
}

impl FormField {
    pub const ALL: [FormField; 4] = [Self::Month, Self::Revenue, Self::NewUsers, Self::ConversionRate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Revenue => "revenue",
            Self::NewUsers => "new_users",
            Self::ConversionRate => "conversion_rate",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Month => "Month",
            Self::Revenue => "Revenue",
            Self::NewUsers => "New Users",
            Self::ConversionRate => "Conversion Rate",
        }
    }

    pub fn required(self) -> bool {
        matches!(self, Self::Month | Self::Revenue)
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Month => "e.g., 2024-08",
            Self::Revenue => "e.g., 50000",
            Self::NewUsers => "e.g., 500",
            Self::ConversionRate => "e.g., 0.05",
        }
    }
}

impl FromStr for FormField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "month" => Ok(Self::Month),
            "revenue" => Ok(Self::Revenue),
            "new_users" | "users" => Ok(Self::NewUsers),
            "conversion_rate" | "conversion" => Ok(Self::ConversionRate),
            other => Err(format!("Unknown form field '{}'.", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub label: String,
    pub value: String,
    pub change: Option<String>,
    pub change_type: Option<ChangeType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartKeys {
    pub x_axis: String,
    pub y_axis: String,
}

impl Default for ChartKeys {
    fn default() -> Self {
        Self {
            x_axis: DATE_KEY.to_string(),
            y_axis: PRIMARY_VALUE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub label: String,
    pub value: Option<f64>,
    pub forecast: bool,
}

/// A model-extrapolated period restricted to the chart's two keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub period: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub markdown: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub gemini_path: String,
    pub gemini_launch_args: Vec<String>,
    pub model: String,
    pub redact_aggressive: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            gemini_path: "gemini".to_string(),
            gemini_launch_args: Vec::new(),
            model: "gemini-2.5-flash".to_string(),
            redact_aggressive: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppSettings, FormField, RecordForm};

    #[test]
    fn form_field_parses_aliases() {
        assert_eq!("new-users".parse::<FormField>(), Ok(FormField::NewUsers));
        assert_eq!(" Revenue ".parse::<FormField>(), Ok(FormField::Revenue));
        assert!("churn".parse::<FormField>().is_err());
    }

    #[test]
    fn form_set_and_get_round_through_fields() {
        let mut form = RecordForm::default();
        form.set(FormField::ConversionRate, "0.05");
        assert_eq!(form.get(FormField::ConversionRate), "0.05");
        assert_eq!(form.get(FormField::Month), "");
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: AppSettings = serde_json::from_value(serde_json::json!({ "model": "gemini-pro" }))
            .expect("settings");
        assert_eq!(settings.model, "gemini-pro");
        assert_eq!(settings.gemini_path, "gemini");
        assert!(settings.redact_aggressive);
    }
}
