use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaslachCategory {
    Exhaustion,
    Depersonalization,
    Achievement,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaslachQuestion {
    pub id: u32,
    pub text: &'static str,
    pub category: MaslachCategory,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOption {
    pub label: &'static str,
    pub value: u8,
}

/// 7-point Likert scale shared by all questions.
pub static ANSWER_OPTIONS: Lazy<Vec<AnswerOption>> = Lazy::new(|| {
    vec![
        AnswerOption { label: "Никогда", value: 0 },
        AnswerOption { label: "Очень редко", value: 1 },
        AnswerOption { label: "Редко", value: 2 },
        AnswerOption { label: "Иногда", value: 3 },
        AnswerOption { label: "Часто", value: 4 },
        AnswerOption { label: "Очень часто", value: 5 },
        AnswerOption { label: "Каждый день", value: 6 },
    ]
});

pub const MAX_ANSWER_VALUE: u8 = 6;

/// Maslach Burnout Inventory, the 22-item variant used by the product:
/// 9 exhaustion items, 5 depersonalization items, 8 achievement items.
pub static MASLACH_QUESTIONS: Lazy<Vec<MaslachQuestion>> = Lazy::new(|| {
    use MaslachCategory::*;
    vec![
        // Эмоциональное истощение
        MaslachQuestion { id: 1, text: "Я чувствую себя эмоционально опустошенным(ой) из-за моей работы", category: Exhaustion },
        MaslachQuestion { id: 2, text: "К концу рабочего дня я чувствую себя как выжатый лимон", category: Exhaustion },
        MaslachQuestion { id: 3, text: "Я чувствую усталость, когда встаю утром и должен(на) идти на работу", category: Exhaustion },
        MaslachQuestion { id: 4, text: "Весь день работать с людьми - это стресс для меня", category: Exhaustion },
        MaslachQuestion { id: 5, text: "Я чувствую себя измотанным(ой) своей работой", category: Exhaustion },
        MaslachQuestion { id: 6, text: "Моя работа приводит меня в отчаяние", category: Exhaustion },
        MaslachQuestion { id: 7, text: "Я чувствую, что работаю слишком много", category: Exhaustion },
        MaslachQuestion { id: 8, text: "Работа с людьми создает слишком много стресса", category: Exhaustion },
        MaslachQuestion { id: 9, text: "Я чувствую себя на грани срыва", category: Exhaustion },
        // Деперсонализация
        MaslachQuestion { id: 10, text: "Я чувствую, что обращаюсь с некоторыми коллегами безлично", category: Depersonalization },
        MaslachQuestion { id: 11, text: "С тех пор как начал(а) работать, я стал(а) более черствым(ой) к людям", category: Depersonalization },
        MaslachQuestion { id: 12, text: "Я боюсь, что моя работа делает меня эмоционально жестким(ой)", category: Depersonalization },
        MaslachQuestion { id: 13, text: "Меня не волнует, что происходит с моими коллегами", category: Depersonalization },
        MaslachQuestion { id: 14, text: "Я чувствую, что коллеги винят меня в своих проблемах", category: Depersonalization },
        // Редукция профессиональных достижений
        MaslachQuestion { id: 15, text: "Я легко понимаю, что чувствуют мои коллеги", category: Achievement },
        MaslachQuestion { id: 16, text: "Я эффективно решаю проблемы моих коллег", category: Achievement },
        MaslachQuestion { id: 17, text: "Я чувствую, что положительно влияю на жизнь людей своей работой", category: Achievement },
        MaslachQuestion { id: 18, text: "Я полон(на) энергии", category: Achievement },
        MaslachQuestion { id: 19, text: "Я легко создаю расслабленную атмосферу с коллегами", category: Achievement },
        MaslachQuestion { id: 20, text: "Я чувствую себя воодушевленным(ой) после работы с коллегами", category: Achievement },
        MaslachQuestion { id: 21, text: "Я многого достиг(ла) в своей профессии", category: Achievement },
        MaslachQuestion { id: 22, text: "В работе я спокойно справляюсь с эмоциональными проблемами", category: Achievement },
    ]
});

/// Maximum attainable raw sums per subscale (item count × 6), used to
/// normalize each term of the composite index to [0,1].
const EXHAUSTION_MAX: f64 = 54.0;
const DEPERSONALIZATION_MAX: f64 = 30.0;
const ACHIEVEMENT_MAX: f64 = 48.0;

/// Sparse question-id → answer-value mapping, filled in as the user moves
/// through the questionnaire.
pub type AnswerSet = BTreeMap<u32, u8>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaslachResult {
    pub exhaustion: i32,
    pub depersonalization: i32,
    pub achievement: i32,
    #[serde(rename = "burnoutLevel")]
    pub burnout_level: f64,
    pub date: DateTime<Utc>,
}

/// Presentation banding of the composite index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnoutBand {
    Low,
    Medium,
    High,
}

impl BurnoutBand {
    pub fn from_level(level: f64) -> Self {
        if level < 0.35 {
            BurnoutBand::Low
        } else if level < 0.65 {
            BurnoutBand::Medium
        } else {
            BurnoutBand::High
        }
    }

    pub fn label_ru(&self) -> &'static str {
        match self {
            BurnoutBand::Low => "Низкий",
            BurnoutBand::Medium => "Средний",
            BurnoutBand::High => "Высокий",
        }
    }
}

/// Score the questionnaire. Exhaustion and depersonalization items add
/// their raw value; achievement items are scale-inverted (a high answer
/// means *less* reduction of achievement) and add `6 − value`.
///
/// The composite index is the normalized Euclidean mean of the three
/// subscale terms, i.e. the distance from the "no burnout" corner,
/// rounded to 4 decimal places.
///
/// Completeness of `answers` is the flow's responsibility; missing items
/// simply contribute nothing to their subscale.
pub fn calculate_results(answers: &AnswerSet) -> MaslachResult {
    debug_assert_eq!(answers.len(), MASLACH_QUESTIONS.len(), "answer set is incomplete");

    let mut exhaustion: i32 = 0;
    let mut depersonalization: i32 = 0;
    let mut achievement: i32 = 0;

    for (question_id, value) in answers {
        let Some(question) = MASLACH_QUESTIONS.iter().find(|q| q.id == *question_id) else {
            continue;
        };
        match question.category {
            MaslachCategory::Exhaustion => exhaustion += i32::from(*value),
            MaslachCategory::Depersonalization => depersonalization += i32::from(*value),
            MaslachCategory::Achievement => {
                achievement += i32::from(MAX_ANSWER_VALUE - *value)
            }
        }
    }

    let exhaustion_term = f64::from(exhaustion) / EXHAUSTION_MAX;
    let depersonalization_term = f64::from(depersonalization) / DEPERSONALIZATION_MAX;
    let achievement_term = 1.0 - f64::from(achievement) / ACHIEVEMENT_MAX;

    let burnout_level = ((exhaustion_term.powi(2)
        + depersonalization_term.powi(2)
        + achievement_term.powi(2))
        / 3.0)
        .sqrt();
    let burnout_level = (burnout_level * 10_000.0).round() / 10_000.0;

    MaslachResult {
        exhaustion,
        depersonalization,
        achievement,
        burnout_level,
        date: Utc::now(),
    }
}
