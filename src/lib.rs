use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tauri::{Builder, Emitter, Manager};

pub mod api;
pub mod diagnosis;
pub mod maslach;
pub mod questionnaire;
pub mod reaction;
pub mod session;
pub mod store;

use api::BurnoutApiClient;
use diagnosis::DiagnosisFlow;
use questionnaire::QuestionnaireFlow;
use reaction::ReactionFlow;
use session::Identity;
use store::{JsonFileStore, MemoryStore, ResultStore};

/// Transient toast shown by the frontend. Mirrors the severity levels of
/// the toast widget used by the web version of the product.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: &'static str,
    pub summary: String,
    pub detail: String,
    pub life: u32,
}

impl Notification {
    pub fn success(summary: &str, detail: &str) -> Self {
        Self { severity: "success", summary: summary.to_string(), detail: detail.to_string(), life: 3000 }
    }

    pub fn info(summary: &str, detail: &str) -> Self {
        Self { severity: "info", summary: summary.to_string(), detail: detail.to_string(), life: 3000 }
    }

    pub fn error(summary: &str, detail: &str) -> Self {
        Self { severity: "error", summary: summary.to_string(), detail: detail.to_string(), life: 5000 }
    }
}

pub fn notify(app: &tauri::AppHandle, notification: Notification) {
    let _ = app.emit("notify", notification);
}

pub struct AppState {
    pub api: BurnoutApiClient,
    pub store: Arc<Mutex<Box<dyn ResultStore>>>,
    pub session: Arc<Mutex<Option<Identity>>>,
    pub questionnaire: Arc<Mutex<QuestionnaireFlow>>,
    pub reaction: Arc<Mutex<ReactionFlow>>,
    pub diagnosis: Arc<Mutex<DiagnosisFlow>>,
    /// The single pending reaction-flow timer (stimulus delay or
    /// inter-attempt pause); replaced with abort on every transition.
    pub reaction_timer: Arc<Mutex<Option<tauri::async_runtime::JoinHandle<()>>>>,
    /// In-flight result submission, aborted on restart and teardown.
    pub submit_task: Arc<Mutex<Option<tauri::async_runtime::JoinHandle<()>>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            api: BurnoutApiClient::new(),
            store: Arc::new(Mutex::new(Box::new(MemoryStore::new()))),
            session: Arc::new(Mutex::new(None)),
            questionnaire: Arc::new(Mutex::new(QuestionnaireFlow::new())),
            reaction: Arc::new(Mutex::new(ReactionFlow::new())),
            diagnosis: Arc::new(Mutex::new(DiagnosisFlow::new())),
            reaction_timer: Arc::new(Mutex::new(None)),
            submit_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancels every pending timer and in-flight request. Called on
    /// teardown so no response handler runs after the app is gone.
    pub fn cancel_background_tasks(&self) {
        if let Some(timer) = self.reaction_timer.lock().take() {
            timer.abort();
        }
        if let Some(task) = self.submit_task.lock().take() {
            task.abort();
        }
    }
}

pub fn run() -> Result<()> {
    info!("Burnout Monitor starting...");

    let app = Builder::default()
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(tauri::generate_handler![
            // Session shell
            session::login,
            session::logout,
            session::current_user,
            // Diagnosis orchestrator
            diagnosis::diagnosis_start,
            diagnosis::diagnosis_state,
            // Questionnaire flow
            questionnaire::questionnaire_state,
            questionnaire::questionnaire_answer,
            questionnaire::questionnaire_prev,
            questionnaire::questionnaire_next,
            // Reaction flow
            reaction::reaction_state,
            reaction::reaction_start,
            reaction::reaction_press,
            // Statistics dashboard
            api::fetch_timeseries,
            api::fetch_reference_data
        ])
        .manage(AppState::new())
        .setup(|app| {
            let state = app.state::<AppState>();
            match app.path().app_data_dir() {
                Ok(dir) => match JsonFileStore::open(dir.join("store.json")) {
                    Ok(file_store) => {
                        *state.store.lock() = Box::new(file_store);
                    }
                    Err(e) => {
                        warn!("Falling back to in-memory store: {}", e);
                    }
                },
                Err(e) => {
                    warn!("App data directory unavailable, results will not persist: {}", e);
                }
            }
            info!("✅ Burnout Monitor ready");
            Ok(())
        })
        .build(tauri::generate_context!())?;

    app.run(|app_handle, event| {
        if let tauri::RunEvent::ExitRequested { .. } = event {
            info!("Shutting down, cancelling background tasks");
            app_handle.state::<AppState>().cancel_background_tasks();
        }
    });

    Ok(())
}
