use std::time::Instant;

use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Manager, State};

use crate::diagnosis;
use crate::store::{self, ResultStore, StoreError, REACTION_RESULT_KEY};
use crate::{notify, AppState, Notification};

pub const MAX_ATTEMPTS: usize = 5;

/// Stimulus delay is sampled uniformly from this window, per attempt.
const STIMULUS_DELAY_MIN_MS: u64 = 2000;
const STIMULUS_DELAY_MAX_MS: u64 = 5000;
/// Pause before the same attempt is retried after a premature press.
const TOO_EARLY_PAUSE_MS: u64 = 2000;
/// Pause between a recorded attempt and arming the next one.
const NEXT_ATTEMPT_PAUSE_MS: u64 = 1500;
/// Beat between the 5th recorded latency and the results hand-off.
const FINISH_PAUSE_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReactionResult {
    pub times: Vec<u64>,
    #[serde(rename = "avgTime")]
    pub avg_time: u64,
    #[serde(rename = "minTime")]
    pub min_time: u64,
    #[serde(rename = "maxTime")]
    pub max_time: u64,
    pub stability: i64,
    #[serde(rename = "fatigueTrend")]
    pub fatigue_trend: i64,
    #[serde(rename = "cognitiveIndex")]
    pub cognitive_index: u8,
}

/// Summary statistics over the ordered latencies of one run.
///
/// Stability uses the population standard deviation and is deliberately
/// left unclamped, matching the product: a spread larger than the mean
/// yields a negative percentage. The fatigue trend splits the sequence at
/// floor(n/2), so a 5-attempt run compares the first 2 against the last 3.
pub fn calculate_statistics(times: &[u64]) -> ReactionResult {
    debug_assert!(!times.is_empty());

    let n = times.len() as f64;
    let avg = times.iter().sum::<u64>() as f64 / n;
    let min = times.iter().copied().min().unwrap_or(0);
    let max = times.iter().copied().max().unwrap_or(0);

    let variance = times
        .iter()
        .map(|&t| (t as f64 - avg).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let stability = (100.0 - std_dev / avg * 100.0).round() as i64;

    let split = times.len() / 2;
    let first_avg = times[..split].iter().sum::<u64>() as f64 / split.max(1) as f64;
    let second_avg =
        times[split..].iter().sum::<u64>() as f64 / (times.len() - split).max(1) as f64;
    let fatigue_trend = ((second_avg - first_avg) / first_avg * 100.0).round() as i64;

    let mut cognitive_index = 100.0;
    if avg > 250.0 {
        cognitive_index -= (avg - 250.0) * 0.1;
    }
    if avg > 350.0 {
        cognitive_index -= (avg - 350.0) * 0.2;
    }
    let cognitive_index = cognitive_index.clamp(0.0, 100.0).round() as u8;

    ReactionResult {
        times: times.to_vec(),
        avg_time: avg.round() as u64,
        min_time: min,
        max_time: max,
        stability,
        fatigue_trend,
        cognitive_index,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionPhase {
    /// Before the run starts, and never again once it is running.
    Idle,
    /// Random delay pending; a press here is premature.
    Waiting,
    /// Cue is visible, the clock is running.
    Stimulus,
    /// Premature press; the same attempt retries after a pause.
    TooEarly,
    /// Latency recorded, next attempt arms after a pause.
    Recorded,
    /// All attempts recorded.
    Done,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PressOutcome {
    /// Press outside `Waiting`/`Stimulus` (double press, not running).
    Ignored,
    TooEarly { generation: u64 },
    Recorded { latency_ms: u64, finished: bool, generation: u64 },
}

/// Stimulus-response state machine. Timer callbacks carry the generation
/// they were armed for; any transition bumps the generation, so a stale
/// callback that survived its abort is still a no-op.
pub struct ReactionFlow {
    phase: ReactionPhase,
    attempts: Vec<u64>,
    stimulus_at: Option<Instant>,
    last_time: Option<u64>,
    generation: u64,
}

impl Default for ReactionFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactionFlow {
    pub fn new() -> Self {
        Self {
            phase: ReactionPhase::Idle,
            attempts: Vec::new(),
            stimulus_at: None,
            last_time: None,
            generation: 0,
        }
    }

    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new();
        self.generation = generation;
    }

    pub fn phase(&self) -> ReactionPhase {
        self.phase
    }

    pub fn attempts(&self) -> &[u64] {
        &self.attempts
    }

    /// Enters `Waiting` for the next attempt and returns the generation a
    /// stimulus timer must present to fire.
    pub fn begin_waiting(&mut self) -> u64 {
        self.phase = ReactionPhase::Waiting;
        self.stimulus_at = None;
        self.last_time = None;
        self.generation += 1;
        self.generation
    }

    /// Called by the stimulus timer. Ignored when the flow has already
    /// moved on (premature press, reset).
    pub fn stimulus_due(&mut self, generation: u64, now: Instant) -> bool {
        if self.generation != generation || self.phase != ReactionPhase::Waiting {
            return false;
        }
        self.phase = ReactionPhase::Stimulus;
        self.stimulus_at = Some(now);
        true
    }

    pub fn press(&mut self, now: Instant) -> PressOutcome {
        match self.phase {
            ReactionPhase::Waiting => {
                self.generation += 1;
                self.phase = ReactionPhase::TooEarly;
                PressOutcome::TooEarly { generation: self.generation }
            }
            ReactionPhase::Stimulus => {
                let Some(shown_at) = self.stimulus_at.take() else {
                    return PressOutcome::Ignored;
                };
                let latency_ms = now.duration_since(shown_at).as_millis() as u64;
                self.attempts.push(latency_ms);
                self.last_time = Some(latency_ms);
                self.generation += 1;
                let finished = self.attempts.len() >= MAX_ATTEMPTS;
                self.phase = if finished {
                    ReactionPhase::Done
                } else {
                    ReactionPhase::Recorded
                };
                PressOutcome::Recorded { latency_ms, finished, generation: self.generation }
            }
            _ => PressOutcome::Ignored,
        }
    }

    /// Whether a pause timer armed for `generation` may re-arm the flow.
    pub fn resume_due(&self, generation: u64) -> bool {
        self.generation == generation
            && matches!(self.phase, ReactionPhase::TooEarly | ReactionPhase::Recorded)
    }

    /// Computes the run statistics and persists them under the well-known key.
    pub fn finalize(&self, store: &mut dyn ResultStore) -> Result<ReactionResult, StoreError> {
        let result = calculate_statistics(&self.attempts);
        store::set_typed(store, REACTION_RESULT_KEY, &result)?;
        Ok(result)
    }

    pub fn snapshot(&self) -> ReactionSnapshot {
        ReactionSnapshot {
            phase: self.phase,
            attempts: self.attempts.clone(),
            attempt: self.attempts.len(),
            max_attempts: MAX_ATTEMPTS,
            last_time: self.last_time,
            progress: (self.attempts.len() as f64 / MAX_ATTEMPTS as f64) * 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSnapshot {
    pub phase: ReactionPhase,
    pub attempts: Vec<u64>,
    pub attempt: usize,
    pub max_attempts: usize,
    pub last_time: Option<u64>,
    pub progress: f64,
}

fn sample_stimulus_delay() -> u64 {
    rand::thread_rng().gen_range(STIMULUS_DELAY_MIN_MS..STIMULUS_DELAY_MAX_MS)
}

/// Replaces the single pending reaction timer, aborting the previous one.
/// Transitions always cancel whatever was scheduled before them.
fn replace_timer(state: &AppState, handle: Option<tauri::async_runtime::JoinHandle<()>>) {
    let mut slot = state.reaction_timer.lock();
    if let Some(old) = slot.take() {
        old.abort();
    }
    *slot = handle;
}

fn emit_state(app: &AppHandle, snapshot: ReactionSnapshot) {
    let _ = app.emit("reaction-state", snapshot);
}

/// Arms the next attempt: enters `Waiting` and schedules the stimulus cue
/// after a fresh random delay.
fn arm_attempt(app: &AppHandle) {
    let state = app.state::<AppState>();
    let (generation, snapshot) = {
        let mut flow = state.reaction.lock();
        (flow.begin_waiting(), flow.snapshot())
    };
    emit_state(app, snapshot);

    let delay_ms = sample_stimulus_delay();
    info!("⏱️ Attempt armed (gen {}), stimulus in {} ms", generation, delay_ms);

    let app_handle = app.clone();
    let handle = tauri::async_runtime::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        let state = app_handle.state::<AppState>();
        let fired = {
            let mut flow = state.reaction.lock();
            if flow.stimulus_due(generation, Instant::now()) {
                Some(flow.snapshot())
            } else {
                None
            }
        };
        if let Some(snapshot) = fired {
            emit_state(&app_handle, snapshot);
        }
    });
    replace_timer(&state, Some(handle));
}

/// Schedules `arm_attempt` after a pause, guarded by the flow generation.
fn schedule_rearm(app: &AppHandle, generation: u64, pause_ms: u64) {
    let state = app.state::<AppState>();
    let app_handle = app.clone();
    let handle = tauri::async_runtime::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(pause_ms)).await;
        let state = app_handle.state::<AppState>();
        let due = state.reaction.lock().resume_due(generation);
        if due {
            arm_attempt(&app_handle);
        }
    });
    replace_timer(&state, Some(handle));
}

#[tauri::command]
pub fn reaction_state(state: State<'_, AppState>) -> ReactionSnapshot {
    state.reaction.lock().snapshot()
}

#[tauri::command]
pub fn reaction_start(app: AppHandle, state: State<'_, AppState>) -> ReactionSnapshot {
    info!("🚦 Reaction test started");
    state.reaction.lock().reset();
    arm_attempt(&app);
    state.reaction.lock().snapshot()
}

/// The user's action signal - pointer click or Space/Enter, the frontend
/// funnels both here.
#[tauri::command]
pub fn reaction_press(app: AppHandle, state: State<'_, AppState>) -> ReactionSnapshot {
    let (outcome, snapshot) = {
        let mut flow = state.reaction.lock();
        let outcome = flow.press(Instant::now());
        (outcome, flow.snapshot())
    };

    match outcome {
        PressOutcome::Ignored => {}
        PressOutcome::TooEarly { generation } => {
            info!("⚠️ Premature press, retrying the attempt");
            emit_state(&app, snapshot.clone());
            schedule_rearm(&app, generation, TOO_EARLY_PAUSE_MS);
        }
        PressOutcome::Recorded { latency_ms, finished: false, generation } => {
            info!("🖱️ Reaction recorded: {} ms", latency_ms);
            emit_state(&app, snapshot.clone());
            schedule_rearm(&app, generation, NEXT_ATTEMPT_PAUSE_MS);
        }
        PressOutcome::Recorded { latency_ms, finished: true, .. } => {
            info!("🖱️ Final reaction recorded: {} ms", latency_ms);
            emit_state(&app, snapshot.clone());
            let app_handle = app.clone();
            let handle = tauri::async_runtime::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(FINISH_PAUSE_MS)).await;
                finish_run(&app_handle);
            });
            replace_timer(&state, Some(handle));
        }
    }

    snapshot
}

fn finish_run(app: &AppHandle) {
    let state = app.state::<AppState>();
    let result = {
        let flow = state.reaction.lock();
        let mut store = state.store.lock();
        flow.finalize(store.as_mut())
    };

    match result {
        Ok(result) => {
            info!(
                "✅ Reaction test complete: avg={} ms, stability={}%, cognitiveIndex={}",
                result.avg_time, result.stability, result.cognitive_index
            );
            notify(
                app,
                Notification::success(
                    "Тест завершен",
                    &format!("Средняя реакция: {} мс", result.avg_time),
                ),
            );
        }
        Err(e) => {
            warn!("Failed to persist reaction result: {}", e);
            notify(
                app,
                Notification::error("Ошибка", "Не удалось сохранить результат теста."),
            );
        }
    }

    diagnosis::enter_results(app);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn run_one_attempt(flow: &mut ReactionFlow) -> PressOutcome {
        let generation = flow.begin_waiting();
        assert!(flow.stimulus_due(generation, Instant::now()));
        flow.press(Instant::now())
    }

    #[test]
    fn test_statistics_uniform_200() {
        let result = calculate_statistics(&[200, 200, 200, 200, 200]);
        assert_eq!(result.avg_time, 200);
        assert_eq!(result.min_time, 200);
        assert_eq!(result.max_time, 200);
        assert_eq!(result.stability, 100);
        assert_eq!(result.fatigue_trend, 0);
        assert_eq!(result.cognitive_index, 100);
    }

    #[test]
    fn test_statistics_cognitive_penalties() {
        // One slope above 250, both slopes above 350.
        assert_eq!(calculate_statistics(&[300; 5]).cognitive_index, 95);
        assert_eq!(calculate_statistics(&[400; 5]).cognitive_index, 75);
        // Slow enough to pin the index at the floor.
        assert_eq!(calculate_statistics(&[2000; 5]).cognitive_index, 0);
    }

    #[test]
    fn test_statistics_asymmetric_split() {
        // First half is the first 2 samples, second half the last 3.
        let result = calculate_statistics(&[200, 200, 300, 300, 300]);
        assert_eq!(result.fatigue_trend, 50);
        assert_eq!(result.avg_time, 260);
        assert_eq!(result.stability, 81);
        assert_eq!(result.cognitive_index, 99);
    }

    #[test]
    fn test_statistics_stability_unclamped() {
        let result = calculate_statistics(&[10, 1000, 10, 1000, 10]);
        assert!(result.stability < 0);
    }

    #[test]
    fn test_press_during_waiting_does_not_record() {
        let mut flow = ReactionFlow::new();
        flow.begin_waiting();

        let outcome = flow.press(Instant::now());
        assert!(matches!(outcome, PressOutcome::TooEarly { .. }));
        assert!(flow.attempts().is_empty());
        assert_eq!(flow.snapshot().attempt, 0);
        assert_eq!(flow.phase(), ReactionPhase::TooEarly);
    }

    #[test]
    fn test_stale_stimulus_timer_is_ignored() {
        let mut flow = ReactionFlow::new();
        let generation = flow.begin_waiting();
        flow.press(Instant::now()); // premature, bumps generation

        assert!(!flow.stimulus_due(generation, Instant::now()));
        assert_eq!(flow.phase(), ReactionPhase::TooEarly);
    }

    #[test]
    fn test_too_early_retries_same_attempt() {
        let mut flow = ReactionFlow::new();
        flow.begin_waiting();
        let PressOutcome::TooEarly { generation } = flow.press(Instant::now()) else {
            panic!("expected a premature press");
        };

        assert!(flow.resume_due(generation));
        flow.begin_waiting();
        assert_eq!(flow.snapshot().attempt, 0);
    }

    #[test]
    fn test_presses_outside_active_phases_are_noops() {
        let mut flow = ReactionFlow::new();
        assert_eq!(flow.press(Instant::now()), PressOutcome::Ignored);

        // Double press right after a recorded latency.
        run_one_attempt(&mut flow);
        assert_eq!(flow.phase(), ReactionPhase::Recorded);
        assert_eq!(flow.press(Instant::now()), PressOutcome::Ignored);
        assert_eq!(flow.attempts().len(), 1);
    }

    #[test]
    fn test_five_recorded_attempts_finish_the_run() {
        let mut flow = ReactionFlow::new();
        for i in 0..MAX_ATTEMPTS {
            let outcome = run_one_attempt(&mut flow);
            let PressOutcome::Recorded { finished, .. } = outcome else {
                panic!("expected a recorded press");
            };
            assert_eq!(finished, i == MAX_ATTEMPTS - 1);
        }
        assert_eq!(flow.phase(), ReactionPhase::Done);

        let mut store = MemoryStore::new();
        let result = flow.finalize(&mut store).unwrap();
        assert_eq!(result.times.len(), MAX_ATTEMPTS);

        let cached: ReactionResult =
            crate::store::get_typed(&store, REACTION_RESULT_KEY).unwrap();
        assert_eq!(cached.times, result.times);
    }

    #[test]
    fn test_reset_invalidates_pending_timers() {
        let mut flow = ReactionFlow::new();
        let generation = flow.begin_waiting();
        flow.reset();
        assert!(!flow.stimulus_due(generation, Instant::now()));
        assert_eq!(flow.phase(), ReactionPhase::Idle);
    }
}
