use log::info;
use serde::Serialize;
use tauri::{AppHandle, State};

use crate::diagnosis;
use crate::maslach::{
    calculate_results, AnswerSet, MaslachQuestion, MaslachResult, ANSWER_OPTIONS,
    MASLACH_QUESTIONS, MAX_ANSWER_VALUE,
};
use crate::store::{self, ResultStore, StoreError, MASLACH_RESULT_KEY};
use crate::{notify, AppState, Notification};

/// Short beat between the last answer and the computed result so the
/// progress bar can finish its sweep.
const SUBMIT_ANIMATION_MS: u64 = 400;

/// Linear stepper over the 22 questions: `Answering(index)` states, then a
/// transient submitting state that computes and persists the result.
pub struct QuestionnaireFlow {
    current: usize,
    answers: AnswerSet,
    submitting: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Advance {
    Moved,
    Completed,
}

impl Default for QuestionnaireFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionnaireFlow {
    pub fn new() -> Self {
        Self {
            current: 0,
            answers: AnswerSet::new(),
            submitting: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn current_question(&self) -> Option<&'static MaslachQuestion> {
        MASLACH_QUESTIONS.get(self.current)
    }

    pub fn current_answer(&self) -> Option<u8> {
        let question = self.current_question()?;
        self.answers.get(&question.id).copied()
    }

    /// "Next" stays disabled until the active question has an answer.
    pub fn can_advance(&self) -> bool {
        !self.submitting && self.current_answer().is_some()
    }

    pub fn select_answer(&mut self, value: u8) -> Result<(), String> {
        if value > MAX_ANSWER_VALUE {
            return Err(format!("Недопустимое значение ответа: {}", value));
        }
        let question = self
            .current_question()
            .ok_or_else(|| "Все вопросы уже отвечены".to_string())?;
        self.answers.insert(question.id, value);
        Ok(())
    }

    pub fn next(&mut self) -> Result<Advance, String> {
        if !self.can_advance() {
            return Err("Текущий вопрос ещё не отвечен".to_string());
        }
        if self.current < MASLACH_QUESTIONS.len() - 1 {
            self.current += 1;
            Ok(Advance::Moved)
        } else {
            // Off-the-end index drives the progress bar to 100%.
            self.current = MASLACH_QUESTIONS.len();
            self.submitting = true;
            Ok(Advance::Completed)
        }
    }

    /// "Previous" keeps recorded answers.
    pub fn prev(&mut self) {
        if !self.submitting && self.current > 0 {
            self.current -= 1;
        }
    }

    /// Progress the cosmetic bar animates toward, in percent.
    pub fn progress_target(&self) -> f64 {
        (self.current as f64 / MASLACH_QUESTIONS.len() as f64) * 100.0
    }

    /// Computes the score and persists it under the well-known key.
    pub fn finalize(&self, store: &mut dyn ResultStore) -> Result<MaslachResult, StoreError> {
        let result = calculate_results(&self.answers);
        store::set_typed(store, MASLACH_RESULT_KEY, &result)?;
        Ok(result)
    }

    pub fn snapshot(&self) -> QuestionnaireSnapshot {
        QuestionnaireSnapshot {
            current: self.current,
            total: MASLACH_QUESTIONS.len(),
            question: self.current_question().cloned(),
            options: ANSWER_OPTIONS.clone(),
            answer: self.current_answer(),
            can_advance: self.can_advance(),
            can_go_back: !self.submitting && self.current > 0,
            is_last: self.current + 1 == MASLACH_QUESTIONS.len(),
            progress_target: self.progress_target(),
            submitting: self.submitting,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireSnapshot {
    pub current: usize,
    pub total: usize,
    pub question: Option<MaslachQuestion>,
    pub options: Vec<crate::maslach::AnswerOption>,
    pub answer: Option<u8>,
    pub can_advance: bool,
    pub can_go_back: bool,
    pub is_last: bool,
    pub progress_target: f64,
    pub submitting: bool,
}

#[tauri::command]
pub fn questionnaire_state(state: State<'_, AppState>) -> QuestionnaireSnapshot {
    state.questionnaire.lock().snapshot()
}

#[tauri::command]
pub fn questionnaire_answer(
    value: u8,
    state: State<'_, AppState>,
) -> Result<QuestionnaireSnapshot, String> {
    let mut flow = state.questionnaire.lock();
    flow.select_answer(value)?;
    Ok(flow.snapshot())
}

#[tauri::command]
pub fn questionnaire_prev(state: State<'_, AppState>) -> QuestionnaireSnapshot {
    let mut flow = state.questionnaire.lock();
    flow.prev();
    flow.snapshot()
}

#[tauri::command]
pub async fn questionnaire_next(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<QuestionnaireSnapshot, String> {
    let advance = state.questionnaire.lock().next()?;

    if advance == Advance::Completed {
        tokio::time::sleep(std::time::Duration::from_millis(SUBMIT_ANIMATION_MS)).await;

        let result = {
            let flow = state.questionnaire.lock();
            let mut store = state.store.lock();
            flow.finalize(store.as_mut())
                .map_err(|e| format!("Не удалось сохранить результат теста: {}", e))?
        };
        info!(
            "✅ Questionnaire complete: exhaustion={} depersonalization={} achievement={} burnoutLevel={}",
            result.exhaustion, result.depersonalization, result.achievement, result.burnout_level
        );

        notify(
            &app,
            Notification::success(
                "Анализ завершён",
                "Результаты сохранены. Переход к тесту на реакцию.",
            ),
        );
        diagnosis::advance_to_reaction(&app, &state);
    }

    Ok(state.questionnaire.lock().snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn answered_flow(upto: usize) -> QuestionnaireFlow {
        let mut flow = QuestionnaireFlow::new();
        for _ in 0..upto {
            flow.select_answer(3).unwrap();
            flow.next().unwrap();
        }
        flow
    }

    #[test]
    fn test_next_rejected_without_answer() {
        let mut flow = QuestionnaireFlow::new();
        assert!(!flow.can_advance());
        assert!(flow.next().is_err());
        assert_eq!(flow.snapshot().current, 0);
    }

    #[test]
    fn test_prev_keeps_recorded_answers() {
        let mut flow = QuestionnaireFlow::new();
        flow.select_answer(5).unwrap();
        flow.next().unwrap();
        flow.select_answer(2).unwrap();

        flow.prev();
        assert_eq!(flow.current_answer(), Some(5));
        flow.next().unwrap();
        assert_eq!(flow.current_answer(), Some(2));
    }

    #[test]
    fn test_prev_is_noop_at_first_question() {
        let mut flow = QuestionnaireFlow::new();
        flow.prev();
        assert_eq!(flow.snapshot().current, 0);
    }

    #[test]
    fn test_completion_after_last_question() {
        let mut flow = answered_flow(21);
        assert!(flow.snapshot().is_last);

        flow.select_answer(3).unwrap();
        assert_eq!(flow.next().unwrap(), Advance::Completed);

        let snapshot = flow.snapshot();
        assert!(snapshot.submitting);
        assert_eq!(snapshot.progress_target, 100.0);
        // The stepper no longer moves once submitting.
        assert!(flow.next().is_err());
        flow.prev();
        assert!(flow.snapshot().submitting);
    }

    #[test]
    fn test_finalize_persists_result() {
        let mut flow = answered_flow(21);
        flow.select_answer(3).unwrap();
        flow.next().unwrap();

        let mut store = MemoryStore::new();
        let result = flow.finalize(&mut store).unwrap();
        assert!(result.burnout_level > 0.0);

        let cached: crate::maslach::MaslachResult =
            crate::store::get_typed(&store, MASLACH_RESULT_KEY).unwrap();
        assert_eq!(cached.exhaustion, result.exhaustion);
        assert_eq!(cached.burnout_level, result.burnout_level);
    }

    #[test]
    fn test_rejects_out_of_scale_answer() {
        let mut flow = QuestionnaireFlow::new();
        assert!(flow.select_answer(7).is_err());
        assert!(flow.select_answer(6).is_ok());
    }

    #[test]
    fn test_progress_target_tracks_index() {
        let flow = answered_flow(11);
        assert_eq!(flow.progress_target(), 50.0);
    }
}
