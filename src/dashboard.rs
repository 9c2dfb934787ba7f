use crate::db::RecordStore;
use crate::errors::{AppError, AppResult};
use crate::gateway::{AiGateway, TextGenerator};
use crate::models::{
    AppSettings, ChartKeys, FinancialRecord, ForecastPoint, FormField, NewFinancialRecord, RecordForm, Report,
};
use crate::shaping::{derive_view_state, history_series, ViewState};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

pub const REQUIRED_FIELDS_MESSAGE: &str = "Month and Revenue are required fields.";
pub const INVALID_REVENUE_MESSAGE: &str = "Revenue must be a number.";

/// The single operation currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Activity {
    Idle,
    Loading,
    Submitting,
    Forecasting,
    GeneratingReport,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Submitting => "submitting",
            Self::Forecasting => "forecasting",
            Self::GeneratingReport => "generating-report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyData {
    pub view: ViewState,
    pub chart_keys: ChartKeys,
    pub forecast: Option<Vec<ForecastPoint>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DataState {
    /// Not loaded yet, or the last load failed.
    Unavailable,
    /// Loaded, but nothing chartable: drives the welcome screen.
    Empty { view: ViewState },
    Ready(ReadyData),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub form: RecordForm,
    pub data: DataState,
    pub activity: Activity,
    pub report: Option<Report>,
    pub error: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            form: RecordForm::default(),
            data: DataState::Unavailable,
            activity: Activity::Idle,
            report: None,
            error: None,
        }
    }
}

impl DashboardState {
    pub fn ready(&self) -> Option<&ReadyData> {
        match &self.data {
            DataState::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    /// Both AI actions share one admission rule.
    pub fn ai_actions_enabled(&self) -> bool {
        self.activity == Activity::Idle && self.ready().is_some()
    }

    pub fn set_form_field(&mut self, field: FormField, value: impl Into<String>) {
        self.form.set(field, value);
    }

    fn record_error(&mut self, error: &AppError) {
        self.error = Some(error.user_message().to_string());
    }

    fn admit(&mut self, next: Activity) -> AppResult<()> {
        if self.activity != Activity::Idle {
            let error = AppError::Busy(format!(
                "Please wait until {} finishes.",
                self.activity.as_str().replace('-', " ")
            ));
            self.record_error(&error);
            return Err(error);
        }
        self.error = None;
        self.activity = next;
        Ok(())
    }

    pub fn begin_load(&mut self) -> AppResult<()> {
        self.admit(Activity::Loading)
    }

    /// Rows replace the previous view wholesale; any held forecast is discarded.
    pub fn finish_load(&mut self, result: AppResult<Vec<FinancialRecord>>) {
        self.activity = Activity::Idle;
        match result {
            Ok(rows) => {
                let view = derive_view_state(&rows);
                self.data = match (rows.is_empty(), view.chart_keys.clone()) {
                    (false, Some(chart_keys)) => DataState::Ready(ReadyData {
                        view,
                        chart_keys,
                        forecast: None,
                    }),
                    _ => DataState::Empty { view },
                };
                self.error = None;
            }
            Err(error) => {
                self.record_error(&error);
                self.data = DataState::Unavailable;
            }
        }
    }

    /// Validates the form. Invalid input is reported without entering `Submitting`.
    pub fn begin_submit(&mut self) -> AppResult<NewFinancialRecord> {
        let record = match parse_form(&self.form) {
            Ok(record) => record,
            Err(error) => {
                self.record_error(&error);
                return Err(error);
            }
        };
        self.admit(Activity::Submitting)?;
        Ok(record)
    }

    /// A stored record resets the form and chains straight into a reload.
    pub fn finish_submit(&mut self, result: AppResult<()>) {
        match result {
            Ok(()) => {
                self.form = RecordForm::default();
                self.activity = Activity::Loading;
            }
            Err(error) => {
                self.activity = Activity::Idle;
                self.record_error(&error);
            }
        }
    }

    /// Returns the two-key history and the keys to forecast against.
    pub fn begin_forecast(&mut self) -> AppResult<(Vec<serde_json::Value>, ChartKeys)> {
        let Some(ready) = self.ready() else {
            let error = AppError::Validation("Add financial data before requesting a forecast.".to_string());
            self.record_error(&error);
            return Err(error);
        };
        let keys = ready.chart_keys.clone();
        let series = history_series(&ready.view.rows, &keys);
        self.admit(Activity::Forecasting)?;
        Ok((series, keys))
    }

    pub fn finish_forecast(&mut self, result: AppResult<Vec<ForecastPoint>>) {
        self.activity = Activity::Idle;
        match result {
            Ok(points) => {
                if let DataState::Ready(ready) = &mut self.data {
                    ready.forecast = Some(points);
                }
            }
            Err(error) => self.record_error(&error),
        }
    }

    pub fn begin_report(&mut self) -> AppResult<Vec<FinancialRecord>> {
        let Some(ready) = self.ready() else {
            let error = AppError::Validation("Add financial data before requesting a report.".to_string());
            self.record_error(&error);
            return Err(error);
        };
        let rows = ready.view.rows.clone();
        self.admit(Activity::GeneratingReport)?;
        Ok(rows)
    }

    pub fn finish_report(&mut self, result: AppResult<String>) {
        self.activity = Activity::Idle;
        match result {
            Ok(markdown) => {
                self.report = Some(Report {
                    markdown,
                    generated_at: Utc::now(),
                })
            }
            Err(error) => self.record_error(&error),
        }
    }

    pub fn dismiss_report(&mut self) {
        self.report = None;
    }
}

/// Converts raw form text into an insert payload.
pub fn parse_form(form: &RecordForm) -> AppResult<NewFinancialRecord> {
    let month = form.month.trim();
    let revenue = form.revenue.trim();
    if month.is_empty() || revenue.is_empty() {
        return Err(AppError::Validation(REQUIRED_FIELDS_MESSAGE.to_string()));
    }

    let revenue = revenue
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| AppError::Validation(INVALID_REVENUE_MESSAGE.to_string()))?;

    Ok(NewFinancialRecord {
        month: month.to_string(),
        revenue,
        new_users: form.new_users.trim().parse::<i64>().ok(),
        conversion_rate: form
            .conversion_rate
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite()),
    })
}

/// Result of a background operation, handed back to [`DashboardCore::complete`].
#[derive(Debug)]
pub enum Completion {
    Load(AppResult<Vec<FinancialRecord>>),
    Submit(AppResult<Stored>),
    Forecast(AppResult<Vec<ForecastPoint>>),
    Report(AppResult<String>),
}

/// An inserted record together with the reload that follows it.
#[derive(Debug)]
pub struct Stored {
    pub record: FinancialRecord,
    pub rows: AppResult<Vec<FinancialRecord>>,
}

pub type PendingTask = JoinHandle<Completion>;

/// Owns the view state and runs each user action against the store and the AI gateway.
///
/// `start_*` admits an operation and spawns it; the caller later passes the
/// task's [`Completion`] to [`complete`](Self::complete). Store calls run on the
/// blocking pool, AI calls on the async runtime.
pub struct DashboardCore<S, G> {
    store: Arc<S>,
    ai: Arc<AiGateway<G>>,
    state: DashboardState,
}

impl<S, G> DashboardCore<S, G>
where
    S: RecordStore + 'static,
    G: TextGenerator + 'static,
{
    pub fn new(store: Arc<S>, ai: AiGateway<G>) -> Self {
        Self {
            store,
            ai: Arc::new(ai),
            state: DashboardState::default(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn ai(&self) -> &AiGateway<G> {
        &self.ai
    }

    pub fn apply_settings(&self, settings: &AppSettings) {
        self.ai.apply_settings(settings);
    }

    pub fn set_form_field(&mut self, field: FormField, value: impl Into<String>) {
        self.state.set_form_field(field, value);
    }

    pub fn dismiss_report(&mut self) {
        self.state.dismiss_report();
    }

    pub fn start_load(&mut self) -> AppResult<PendingTask> {
        self.state.begin_load()?;
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || Completion::Load(store.fetch_all())))
    }

    pub fn start_submit(&mut self) -> AppResult<PendingTask> {
        let record = self.state.begin_submit()?;
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || {
            Completion::Submit(store.insert(&record).map(|record| Stored {
                record,
                rows: store.fetch_all(),
            }))
        }))
    }

    pub fn start_forecast(&mut self) -> AppResult<PendingTask> {
        let (series, keys) = self.state.begin_forecast()?;
        let ai = Arc::clone(&self.ai);
        Ok(tokio::spawn(async move {
            Completion::Forecast(ai.forecast(&series, &keys.x_axis, &keys.y_axis).await)
        }))
    }

    pub fn start_report(&mut self) -> AppResult<PendingTask> {
        let rows = self.state.begin_report()?;
        let ai = Arc::clone(&self.ai);
        Ok(tokio::spawn(async move { Completion::Report(ai.report(&rows).await) }))
    }

    /// Applies a finished operation to the state and returns its outcome.
    pub fn complete(&mut self, completion: Completion) -> AppResult<()> {
        match completion {
            Completion::Load(result) => self.finish_load(result),
            Completion::Submit(Ok(stored)) => {
                tracing::info!(id = stored.record.id, month = %stored.record.month, "financial record submitted");
                self.state.finish_submit(Ok(()));
                self.finish_load(stored.rows)
            }
            Completion::Submit(Err(error)) => {
                tracing::error!(error = %error, "failed to submit financial record");
                self.state.finish_submit(Err(error.clone()));
                Err(error)
            }
            Completion::Forecast(result) => {
                let outcome = match &result {
                    Ok(points) => {
                        tracing::info!(points = points.len(), "forecast ready");
                        Ok(())
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "forecast failed");
                        Err(error.clone())
                    }
                };
                self.state.finish_forecast(result);
                outcome
            }
            Completion::Report(result) => {
                let outcome = match &result {
                    Ok(text) => {
                        tracing::info!(chars = text.len(), "report ready");
                        Ok(())
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "report generation failed");
                        Err(error.clone())
                    }
                };
                self.state.finish_report(result);
                outcome
            }
        }
    }

    fn finish_load(&mut self, result: AppResult<Vec<FinancialRecord>>) -> AppResult<()> {
        let outcome = match &result {
            Ok(rows) => {
                tracing::info!(rows = rows.len(), "loaded financial records");
                Ok(())
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to load financial records");
                Err(error.clone())
            }
        };
        self.state.finish_load(result);
        outcome
    }

    /// Closes out the in-flight operation when its task panicked or was cancelled.
    pub fn abandon(&mut self, error: JoinError) -> AppResult<()> {
        let error = AppError::Internal(format!("background task failed: {}", error));
        tracing::error!(activity = self.state.activity.as_str(), error = %error, "operation abandoned");
        let completion = match self.state.activity {
            Activity::Idle => return Err(error),
            Activity::Loading => Completion::Load(Err(error)),
            Activity::Submitting => Completion::Submit(Err(error)),
            Activity::Forecasting => Completion::Forecast(Err(error)),
            Activity::GeneratingReport => Completion::Report(Err(error)),
        };
        self.complete(completion)
    }

    /// Waits for `task` and applies its result.
    pub async fn finish(&mut self, task: PendingTask) -> AppResult<()> {
        match task.await {
            Ok(completion) => self.complete(completion),
            Err(error) => self.abandon(error),
        }
    }

    pub async fn load(&mut self) -> AppResult<()> {
        let task = self.start_load()?;
        self.finish(task).await
    }

    pub async fn submit(&mut self) -> AppResult<()> {
        let task = self.start_submit()?;
        self.finish(task).await
    }

    pub async fn forecast(&mut self) -> AppResult<()> {
        let task = self.start_forecast()?;
        self.finish(task).await
    }

    pub async fn generate_report(&mut self) -> AppResult<()> {
        let task = self.start_report()?;
        self.finish(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_form, Activity, DashboardCore, DashboardState, DataState, REQUIRED_FIELDS_MESSAGE};
    use crate::adapters::GenerationRequest;
    use crate::db::{Database, RecordStore};
    use crate::errors::{AppError, AppResult};
    use crate::gateway::testing::ScriptedGenerator;
    use crate::gateway::{AiGateway, TextGenerator};
    use crate::models::{FinancialRecord, ForecastPoint, FormField, NewFinancialRecord, RecordForm};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingStore {
        rows: Mutex<Vec<FinancialRecord>>,
        inserts: AtomicUsize,
        fail_reads: bool,
    }

    impl RecordStore for CountingStore {
        fn fetch_all(&self) -> AppResult<Vec<FinancialRecord>> {
            if self.fail_reads {
                return Err(AppError::Store("permission denied for table financial_data".to_string()));
            }
            Ok(self.rows.lock().expect("rows").clone())
        }

        fn insert(&self, record: &NewFinancialRecord) -> AppResult<FinancialRecord> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().expect("rows");
            let stored = FinancialRecord {
                id: rows.len() as i64 + 1,
                created_at: chrono::Utc::now(),
                month: record.month.clone(),
                revenue: Some(record.revenue),
                new_users: record.new_users,
                conversion_rate: record.conversion_rate,
            };
            rows.push(stored.clone());
            Ok(stored)
        }
    }

    fn fill(core: &mut DashboardCore<impl RecordStore + 'static, ScriptedGenerator>, pairs: &[(FormField, &str)]) {
        for (field, value) in pairs {
            core.set_form_field(*field, *value);
        }
    }

    fn core_with<S: RecordStore + 'static>(store: Arc<S>, replies: Vec<AppResult<String>>) -> DashboardCore<S, ScriptedGenerator> {
        DashboardCore::new(store, AiGateway::new(ScriptedGenerator::with_replies(replies), "gemini-2.5-flash"))
    }

    #[tokio::test]
    async fn submitting_a_record_stores_typed_values_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("dash.db")).expect("db"));
        let mut core = core_with(db.clone(), vec![]);
        core.load().await.expect("initial load");
        assert!(matches!(core.state().data, DataState::Empty { .. }));

        fill(
            &mut core,
            &[
                (FormField::Month, "2024-08"),
                (FormField::Revenue, "50000"),
                (FormField::NewUsers, "500"),
                (FormField::ConversionRate, "0.05"),
            ],
        );
        core.submit().await.expect("submit");

        let rows = db.fetch_all().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].revenue, Some(50_000.0));
        assert_eq!(rows[0].new_users, Some(500));
        assert_eq!(rows[0].conversion_rate, Some(0.05));

        let state = core.state();
        assert_eq!(state.activity, Activity::Idle);
        assert_eq!(state.form, RecordForm::default());
        let ready = state.ready().expect("ready");
        let values: Vec<&str> = ready.view.kpis.iter().map(|kpi| kpi.value.as_str()).collect();
        assert_eq!(values, vec!["50,000", "500", "0.05"]);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn blank_revenue_is_rejected_before_the_store() {
        let store = Arc::new(CountingStore::default());
        let mut core = core_with(store.clone(), vec![]);
        fill(&mut core, &[(FormField::Month, "2024-08")]);

        let error = core.submit().await.expect_err("rejected");
        assert!(matches!(error, AppError::Validation(_)));
        assert_eq!(core.state().error.as_deref(), Some(REQUIRED_FIELDS_MESSAGE));
        assert_eq!(core.state().activity, Activity::Idle);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn load_failure_surfaces_message_verbatim() {
        let store = Arc::new(CountingStore {
            fail_reads: true,
            ..CountingStore::default()
        });
        let mut core = core_with(store, vec![]);
        assert!(core.load().await.is_err());
        assert_eq!(
            core.state().error.as_deref(),
            Some("permission denied for table financial_data")
        );
        assert_eq!(core.state().data, DataState::Unavailable);
        assert_eq!(core.state().activity, Activity::Idle);
    }

    #[tokio::test]
    async fn forecast_is_held_until_next_load() {
        let store = Arc::new(CountingStore::default());
        let mut core = core_with(
            store,
            vec![Ok("[{\"month\":\"2024-09\",\"revenue\":52000}]".to_string())],
        );
        fill(&mut core, &[(FormField::Month, "2024-08"), (FormField::Revenue, "50000")]);
        core.submit().await.expect("submit");

        core.forecast().await.expect("forecast");
        let forecast = core.state().ready().and_then(|ready| ready.forecast.clone());
        assert_eq!(
            forecast,
            Some(vec![ForecastPoint {
                period: "2024-09".to_string(),
                value: 52_000.0
            }])
        );

        core.load().await.expect("reload");
        assert!(core.state().ready().expect("ready").forecast.is_none());
    }

    #[tokio::test]
    async fn malformed_forecast_leaves_no_partial_result() {
        let store = Arc::new(CountingStore::default());
        let mut core = core_with(store, vec![Ok("{\"month\":\"2024-09\"}".to_string())]);
        fill(&mut core, &[(FormField::Month, "2024-08"), (FormField::Revenue, "50000")]);
        core.submit().await.expect("submit");

        let error = core.forecast().await.expect_err("format");
        assert!(matches!(error, AppError::AiFormat(_)));
        assert_eq!(
            core.state().error.as_deref(),
            Some("AI returned a non-array format for the forecast.")
        );
        assert!(core.state().ready().expect("ready").forecast.is_none());
        assert_eq!(core.state().activity, Activity::Idle);
    }

    #[tokio::test]
    async fn ai_actions_require_loaded_data() {
        let store = Arc::new(CountingStore::default());
        let mut core = core_with(store, vec![Ok("unused".to_string())]);
        core.load().await.expect("load");
        assert!(!core.state().ai_actions_enabled());
        assert!(matches!(core.forecast().await, Err(AppError::Validation(_))));
        assert!(matches!(core.generate_report().await, Err(AppError::Validation(_))));
        assert!(core.ai().generator().requests().is_empty());
    }

    #[tokio::test]
    async fn dismissing_the_report_clears_it() {
        let store = Arc::new(CountingStore::default());
        let mut core = core_with(store, vec![Ok("# Report\nAll good.".to_string())]);
        fill(&mut core, &[(FormField::Month, "2024-08"), (FormField::Revenue, "50000")]);
        core.submit().await.expect("submit");

        core.generate_report().await.expect("report");
        assert_eq!(
            core.state().report.as_ref().map(|report| report.markdown.as_str()),
            Some("# Report\nAll good.")
        );

        core.dismiss_report();
        assert!(core.state().report.is_none());
        core.dismiss_report();
        assert!(core.state().report.is_none());
    }

    /// Never answers, so the forecast stays in flight.
    struct StalledGenerator;

    impl TextGenerator for StalledGenerator {
        async fn generate(&self, _request: GenerationRequest) -> AppResult<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn report_is_busy_while_forecast_is_in_flight() {
        let store = Arc::new(CountingStore::default());
        let mut core = DashboardCore::new(store, AiGateway::new(StalledGenerator, "m"));
        core.set_form_field(FormField::Month, "2024-08");
        core.set_form_field(FormField::Revenue, "50000");
        core.submit().await.expect("submit");

        let pending = core.start_forecast().expect("forecast admitted");
        assert_eq!(core.state().activity, Activity::Forecasting);
        assert!(!core.state().ai_actions_enabled());

        let error = core.generate_report().await.expect_err("busy");
        assert_eq!(error.code(), "BUSY");
        assert_eq!(
            core.state().error.as_deref(),
            Some("Please wait until forecasting finishes.")
        );
        assert!(matches!(core.start_load(), Err(AppError::Busy(_))));

        // Editing the form stays available while the forecast runs.
        core.set_form_field(FormField::Month, "2024-09");
        assert_eq!(core.state().form.month, "2024-09");

        pending.abort();
        let error = core.finish(pending).await.expect_err("cancelled");
        assert!(matches!(error, AppError::Internal(_)));
        assert_eq!(core.state().activity, Activity::Idle);
        assert!(core.state().ai_actions_enabled());
    }

    #[tokio::test]
    async fn completions_apply_when_the_task_is_awaited_later() {
        let store = Arc::new(CountingStore::default());
        let mut core = core_with(store, vec![Ok("# Report".to_string())]);
        fill(&mut core, &[(FormField::Month, "2024-08"), (FormField::Revenue, "50000")]);
        let pending = core.start_submit().expect("submit admitted");
        assert_eq!(core.state().activity, Activity::Submitting);
        core.finish(pending).await.expect("submit");

        let pending = core.start_report().expect("report admitted");
        assert_eq!(core.state().activity, Activity::GeneratingReport);
        assert!(core.state().report.is_none());
        core.finish(pending).await.expect("report");
        assert_eq!(core.state().activity, Activity::Idle);
        assert!(core.state().report.is_some());
    }

    #[test]
    fn only_one_operation_is_admitted_at_a_time() {
        let mut state = DashboardState::default();
        state.finish_load(Ok(vec![FinancialRecord {
            id: 1,
            created_at: chrono::Utc::now(),
            month: "2024-08".to_string(),
            revenue: Some(1.0),
            new_users: None,
            conversion_rate: None,
        }]));
        state.begin_forecast().expect("forecast admitted");
        assert!(!state.ai_actions_enabled());
        assert!(matches!(state.begin_report(), Err(AppError::Busy(_))));
        state.finish_forecast(Ok(vec![]));
        assert!(state.ai_actions_enabled());
    }

    #[test]
    fn form_parsing_coerces_optional_fields() {
        let form = RecordForm {
            month: " 2024-08 ".to_string(),
            revenue: "1234.5".to_string(),
            new_users: "many".to_string(),
            conversion_rate: "".to_string(),
        };
        let record = parse_form(&form).expect("record");
        assert_eq!(record.month, "2024-08");
        assert_eq!(record.revenue, 1234.5);
        assert_eq!(record.new_users, None);
        assert_eq!(record.conversion_rate, None);

        let invalid = RecordForm {
            revenue: "lots".to_string(),
            ..form
        };
        assert_eq!(
            parse_form(&invalid).expect_err("invalid").user_message(),
            "Revenue must be a number."
        );
    }
}
