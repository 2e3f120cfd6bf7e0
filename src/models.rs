use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowIntensity {
    Spotting,
    Light,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Calm,
    Sad,
    Anxious,
    Irritable,
    Tired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymptomType {
    Cramps,
    Headache,
    MoodLow,
    MoodHigh,
    Fatigue,
    Bloating,
    BreastTenderness,
    Acne,
    Nausea,
    BackPain,
}

impl SymptomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymptomType::Cramps => "cramps",
            SymptomType::Headache => "headache",
            SymptomType::MoodLow => "mood_low",
            SymptomType::MoodHigh => "mood_high",
            SymptomType::Fatigue => "fatigue",
            SymptomType::Bloating => "bloating",
            SymptomType::BreastTenderness => "breast_tenderness",
            SymptomType::Acne => "acne",
            SymptomType::Nausea => "nausea",
            SymptomType::BackPain => "back_pain",
        }
    }
}

/// One logged period belonging to a subject.
///
/// `duration_days` is always derived from the dates by the write path;
/// it is never accepted from a caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleRecord {
    pub id: Uuid,
    pub subject_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
    #[serde(default)]
    pub intensity: Option<FlowIntensity>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub symptoms: Vec<SymptomType>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub basal_body_temperature_c: Option<f32>,
    #[serde(default)]
    pub resting_heart_rate_bpm: Option<u16>,
}

/// Caller-supplied fields for logging or updating a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleDraft {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub intensity: Option<FlowIntensity>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub symptoms: Vec<SymptomType>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub basal_body_temperature_c: Option<f32>,
    #[serde(default)]
    pub resting_heart_rate_bpm: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertileWindow {
    pub fertile_start: NaiveDate,
    pub fertile_end: NaiveDate,
    pub peak_start: NaiveDate,
    pub peak_end: NaiveDate,
}

/// Next-cycle prediction produced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CyclePrediction {
    pub avg_cycle_length: i64,
    pub avg_period_duration: i64,
    pub next_period_start: Option<NaiveDate>,
    pub predicted_period_days: Vec<NaiveDate>,
    pub ovulation_date: Option<NaiveDate>,
    pub fertile_window: Option<FertileWindow>,
    pub confidence: Option<f32>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseInference {
    pub phase: CyclePhase,
    pub days_since_last_period: Option<i64>,
    /// 1-based day of bleeding, only set inside the menstrual window.
    pub menstrual_day: Option<i64>,
    pub note: Option<String>,
}

/// Full derived statistics returned by the prediction endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStatistics {
    pub average_cycle_length_days: i64,
    pub average_period_duration_days: i64,
    pub predicted_next_period_start: Option<NaiveDate>,
    pub predicted_period_days: Vec<NaiveDate>,
    pub predicted_ovulation_date: Option<NaiveDate>,
    pub fertile_window: Option<FertileWindow>,
    pub is_irregular: bool,
    pub current_phase: CyclePhase,
    pub confidence: Option<f32>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleInsights {
    pub avg_cycle_length: i64,
    pub avg_duration: i64,
    pub is_irregular: bool,
    pub next_period_start: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentPhase {
    pub phase: CyclePhase,
    pub days_since_last_period: Option<i64>,
    pub menstrual_day: Option<i64>,
    pub avg_cycle_length: i64,
    pub note: Option<String>,
    pub last_period_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectedCycle {
    pub cycle_start: NaiveDate,
    pub period_days: Vec<NaiveDate>,
    pub ovulation_date: NaiveDate,
    pub fertile_window: FertileWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleCalendar {
    pub avg_cycle_length: i64,
    pub avg_period_duration: i64,
    pub cycles: Vec<ProjectedCycle>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStats {
    pub total_cycles: usize,
    pub valid_gaps: usize,
    pub avg_cycle_length: i64,
    pub avg_period_length: i64,
    pub uses_default_cycle_length: bool,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectIrregularity {
    pub subject_id: String,
    pub record_count: usize,
    pub valid_gap_count: usize,
    pub avg_cycle_length: i64,
    pub std_dev_days: f64,
    pub gap_range_days: Option<i64>,
    pub is_irregular: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistogramBucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymptomCount {
    pub symptom: SymptomType,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopulationStats {
    pub total_subjects: usize,
    pub irregular_count: usize,
    pub regular_count: usize,
    pub irregular_percentage: f64,
    pub cycle_length_distribution: Vec<HistogramBucket>,
    pub period_duration_distribution: Vec<HistogramBucket>,
    pub symptom_frequency: Vec<SymptomCount>,
}

/// Admin report over many subjects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateIrregularityReport {
    pub generated_on: NaiveDate,
    pub subjects: Vec<SubjectIrregularity>,
    pub population: PopulationStats,
}
