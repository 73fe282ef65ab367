use log::{error, info, warn};
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::maslach::{BurnoutBand, MaslachResult};
use crate::reaction::ReactionResult;
use crate::store::{self, MASLACH_RESULT_KEY, REACTION_RESULT_KEY};
use crate::{notify, AppState, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisStep {
    Maslach,
    Reaction,
    Results,
}

/// Sequences questionnaire → reaction test → results. The submission to
/// the backend runs at most once per flow instance.
pub struct DiagnosisFlow {
    step: DiagnosisStep,
    has_submitted: bool,
    submitting: bool,
    recommendation: Option<String>,
}

impl Default for DiagnosisFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosisFlow {
    pub fn new() -> Self {
        Self {
            step: DiagnosisStep::Maslach,
            has_submitted: false,
            submitting: false,
            recommendation: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn step(&self) -> DiagnosisStep {
        self.step
    }

    pub fn to_reaction(&mut self) -> bool {
        if self.step == DiagnosisStep::Maslach {
            self.step = DiagnosisStep::Reaction;
            true
        } else {
            false
        }
    }

    /// Enters the results step. Returns true exactly once per flow
    /// instance - the caller then owns triggering the submission.
    pub fn enter_results(&mut self) -> bool {
        self.step = DiagnosisStep::Results;
        if self.has_submitted {
            return false;
        }
        self.has_submitted = true;
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaslachSubmission {
    pub exhaustion: i32,
    pub depersonalization: i32,
    pub achievement: i32,
    #[serde(rename = "burnoutLevel")]
    pub burnout_level: f64,
}

impl From<&MaslachResult> for MaslachSubmission {
    fn from(result: &MaslachResult) -> Self {
        Self {
            exhaustion: result.exhaustion,
            depersonalization: result.depersonalization,
            achievement: result.achievement,
            burnout_level: result.burnout_level,
        }
    }
}

/// Payload of `POST /api/submit_results`. Built only at submission time
/// and not kept around afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedSubmission {
    pub maslach_result: MaslachSubmission,
    pub reaction_result: ReactionResult,
    pub user_id: i64,
}

/// A missing reaction cache degrades to zeroed statistics rather than
/// blocking the submission of the questionnaire scores.
pub fn build_submission(
    maslach: &MaslachResult,
    reaction: Option<ReactionResult>,
    user_id: i64,
) -> CombinedSubmission {
    CombinedSubmission {
        maslach_result: maslach.into(),
        reaction_result: reaction.unwrap_or_default(),
        user_id,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisSnapshot {
    pub step: DiagnosisStep,
    pub maslach: Option<MaslachResult>,
    pub reaction: Option<ReactionResult>,
    pub burnout_band: Option<BurnoutBand>,
    pub burnout_band_label: Option<&'static str>,
    pub recommendation: Option<String>,
    pub submitting: bool,
}

pub fn snapshot(state: &AppState) -> DiagnosisSnapshot {
    let (step, recommendation, submitting) = {
        let flow = state.diagnosis.lock();
        (flow.step(), flow.recommendation.clone(), flow.submitting)
    };

    let (maslach, reaction) = if step == DiagnosisStep::Results {
        let store = state.store.lock();
        (
            store::get_typed::<MaslachResult>(store.as_ref(), MASLACH_RESULT_KEY),
            store::get_typed::<ReactionResult>(store.as_ref(), REACTION_RESULT_KEY),
        )
    } else {
        (None, None)
    };

    let band = maslach
        .as_ref()
        .map(|m| BurnoutBand::from_level(m.burnout_level));

    DiagnosisSnapshot {
        step,
        maslach,
        reaction,
        burnout_band: band,
        burnout_band_label: band.map(|b| b.label_ru()),
        recommendation,
        submitting,
    }
}

pub fn emit_snapshot(app: &AppHandle) {
    let state = app.state::<AppState>();
    let _ = app.emit("diagnosis-state", snapshot(&state));
}

/// Questionnaire completion hand-off.
pub fn advance_to_reaction(app: &AppHandle, state: &AppState) {
    if state.diagnosis.lock().to_reaction() {
        state.reaction.lock().reset();
        emit_snapshot(app);
    }
}

/// Reaction completion hand-off: show cached results immediately, then
/// submit the combined payload in the background, once.
pub fn enter_results(app: &AppHandle) {
    let state = app.state::<AppState>();
    let should_submit = state.diagnosis.lock().enter_results();
    emit_snapshot(app);

    if !should_submit {
        return;
    }

    let user_id = match state.session.lock().as_ref() {
        Some(identity) => identity.id,
        None => {
            warn!("No authenticated user at results time, skipping submission");
            return;
        }
    };

    let (maslach, reaction) = {
        let store = state.store.lock();
        (
            store::get_typed::<MaslachResult>(store.as_ref(), MASLACH_RESULT_KEY),
            store::get_typed::<ReactionResult>(store.as_ref(), REACTION_RESULT_KEY),
        )
    };
    let Some(maslach) = maslach else {
        warn!("No cached questionnaire result, nothing to submit");
        return;
    };
    if reaction.is_none() {
        warn!("No cached reaction result, submitting zeroed reaction statistics");
    }

    state.diagnosis.lock().submitting = true;
    emit_snapshot(app);
    notify(
        app,
        Notification::info(
            "Синхронизация...",
            "Сохраняем ваши результаты и генерируем рекомендации.",
        ),
    );

    let payload = build_submission(&maslach, reaction, user_id);
    let api = state.api.clone();
    let app_handle = app.clone();
    let handle = tauri::async_runtime::spawn(async move {
        let outcome = api.submit_results(&payload).await;
        let state = app_handle.state::<AppState>();
        {
            let mut flow = state.diagnosis.lock();
            flow.submitting = false;
            if let Ok(message) = &outcome {
                flow.recommendation = Some(message.clone());
            }
        }

        match outcome {
            Ok(_) => {
                info!("✅ Results submitted, recommendation received");
                notify(
                    &app_handle,
                    Notification::success("Успех!", "Результаты сохранены, рекомендации получены."),
                );
            }
            Err(e) => {
                error!("💥 Result submission failed: {}", e);
                notify(
                    &app_handle,
                    Notification::error(
                        "Ошибка синхронизации",
                        "Не удалось получить рекомендации. Результаты тестов доступны на этой странице.",
                    ),
                );
            }
        }
        emit_snapshot(&app_handle);
    });

    // A restarted diagnosis or app teardown aborts the in-flight request.
    let mut slot = state.submit_task.lock();
    if let Some(old) = slot.take() {
        old.abort();
    }
    *slot = Some(handle);
}

#[tauri::command]
pub fn diagnosis_state(state: State<'_, AppState>) -> DiagnosisSnapshot {
    snapshot(&state)
}

#[tauri::command]
pub fn diagnosis_start(app: AppHandle, state: State<'_, AppState>) -> DiagnosisSnapshot {
    info!("🩺 Diagnosis flow started");
    if let Some(task) = state.submit_task.lock().take() {
        task.abort();
    }
    state.diagnosis.lock().reset();
    state.questionnaire.lock().reset();
    state.reaction.lock().reset();
    let snap = snapshot(&state);
    let _ = app.emit("diagnosis-state", snap.clone());
    snap
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_maslach() -> MaslachResult {
        MaslachResult {
            exhaustion: 20,
            depersonalization: 10,
            achievement: 30,
            burnout_level: 0.4011,
            date: Utc::now(),
        }
    }

    #[test]
    fn test_linear_step_sequence() {
        let mut flow = DiagnosisFlow::new();
        assert_eq!(flow.step(), DiagnosisStep::Maslach);
        assert!(flow.to_reaction());
        assert_eq!(flow.step(), DiagnosisStep::Reaction);
        // Reaction cannot be entered twice.
        assert!(!flow.to_reaction());
    }

    #[test]
    fn test_results_submission_guard_fires_once() {
        let mut flow = DiagnosisFlow::new();
        flow.to_reaction();
        assert!(flow.enter_results());
        assert!(!flow.enter_results());

        flow.reset();
        assert!(flow.enter_results());
    }

    #[test]
    fn test_submission_defaults_missing_reaction_fields() {
        let maslach = sample_maslach();
        let payload = build_submission(&maslach, None, 7);

        assert_eq!(payload.user_id, 7);
        assert_eq!(payload.maslach_result.burnout_level, 0.4011);
        assert!(payload.reaction_result.times.is_empty());
        assert_eq!(payload.reaction_result.avg_time, 0);
        assert_eq!(payload.reaction_result.cognitive_index, 0);
    }

    #[test]
    fn test_submission_wire_shape() {
        let maslach = sample_maslach();
        let payload = build_submission(&maslach, None, 42);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["user_id"], 42);
        assert_eq!(json["maslach_result"]["burnoutLevel"], 0.4011);
        // The submission omits the local timestamp.
        assert!(json["maslach_result"].get("date").is_none());
        assert_eq!(json["reaction_result"]["avgTime"], 0);
        assert_eq!(json["reaction_result"]["fatigueTrend"], 0);
    }
}
