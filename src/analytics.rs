//! Cycle analytics: gap filtering, averages, next-cycle prediction,
//! irregularity checks and phase inference.
//!
//! Every function here is pure. Record slices are expected to be sorted by
//! `start_date` ascending (see [`sort_chronologically`]).

use chrono::{Duration, NaiveDate};

use crate::models::{
    CyclePhase, CyclePrediction, CycleRecord, CycleStats, FertileWindow, PhaseInference,
    ProjectedCycle,
};

/// Gaps at or below this many days are treated as spotting or a logging error.
pub const GAP_NOISE_FLOOR_DAYS: i64 = 10;
pub const DEFAULT_CYCLE_LENGTH_DAYS: i64 = 28;
pub const DEFAULT_PERIOD_DURATION_DAYS: i64 = 5;
pub const REGULAR_CYCLE_MIN_DAYS: i64 = 21;
pub const REGULAR_CYCLE_MAX_DAYS: i64 = 35;
/// Maximum spread (longest minus shortest gap) for a regular history.
pub const GAP_RANGE_THRESHOLD_DAYS: i64 = 7;
/// Maximum population standard deviation of gaps for a regular history.
pub const GAP_STDDEV_THRESHOLD_DAYS: f64 = 7.0;
pub const FERTILE_WINDOW_LEAD_DAYS: i64 = 5;
pub const FERTILE_WINDOW_TAIL_DAYS: i64 = 1;
pub const PEAK_FERTILITY_LEAD_DAYS: i64 = 2;
pub const MENSTRUAL_PHASE_LAST_DAY: i64 = 5;
pub const FOLLICULAR_PHASE_LAST_DAY: i64 = 13;
pub const OVULATION_PHASE_LAST_DAY: i64 = 16;
pub const FOLLICULAR_PHASE_FIRST_DAY: i64 = MENSTRUAL_PHASE_LAST_DAY + 1;
pub const OVULATION_PHASE_FIRST_DAY: i64 = FOLLICULAR_PHASE_LAST_DAY + 1;
pub const LUTEAL_PHASE_FIRST_DAY: i64 = OVULATION_PHASE_LAST_DAY + 1;
pub const DEFAULT_PROJECTION_CYCLES: usize = 8;
pub const MAX_PROJECTION_CYCLES: usize = 24;

pub const INSUFFICIENT_DATA_NOTE: &str =
    "Not enough data to predict the next cycle. Log at least one period to get predictions.";
pub const NO_DATA_PHASE_NOTE: &str =
    "No cycle data logged yet. Defaulting to the menstrual phase.";
pub const NEW_CYCLE_NOTE: &str = "Potential start of new menstrual phase.";
pub const DATE_OUT_OF_RANGE_NOTE: &str =
    "Predicted dates fall outside the supported calendar range.";

/// Which variance test decides irregularity.
///
/// User-facing insights use [`IrregularityCheck::Range`]; admin aggregate
/// reporting uses [`IrregularityCheck::StdDev`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrregularityCheck {
    Range,
    StdDev,
}

pub fn sort_chronologically(records: &mut [CycleRecord]) {
    records.sort_by_key(|r| (r.start_date, r.end_date));
}

/// Whole days from `from` to `to`; negative when `to` precedes `from`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// `date` moved by `days`, or `None` past the ends of the calendar.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
}

/// Inclusive day count of a period, never less than one.
pub fn period_duration(start: NaiveDate, end: NaiveDate) -> i64 {
    (days_between(start, end) + 1).max(1)
}

/// Gaps between consecutive start dates, with noise gaps discarded.
pub fn cycle_gaps(records: &[CycleRecord]) -> Vec<i64> {
    records
        .windows(2)
        .map(|w| days_between(w[0].start_date, w[1].start_date))
        .filter(|&gap| gap > GAP_NOISE_FLOOR_DAYS)
        .collect()
}

pub fn average_cycle_length(records: &[CycleRecord]) -> i64 {
    average_of_gaps(&cycle_gaps(records))
}

pub fn average_duration(records: &[CycleRecord]) -> i64 {
    let durations: Vec<i64> = records
        .iter()
        .map(|r| period_duration(r.start_date, r.end_date))
        .collect();
    mean(&durations)
        .map(round_half_up)
        .unwrap_or(DEFAULT_PERIOD_DURATION_DAYS)
}

fn average_of_gaps(gaps: &[i64]) -> i64 {
    mean(gaps)
        .map(round_half_up)
        .unwrap_or(DEFAULT_CYCLE_LENGTH_DAYS)
}

/// Predict the next period from the history.
///
/// Ovulation is anchored to the start of the cycle it falls in, which for
/// the next-cycle prediction is the most recent logged start.
pub fn predict_next_cycle(records: &[CycleRecord]) -> CyclePrediction {
    let gaps = cycle_gaps(records);
    let avg_cycle_length = average_of_gaps(&gaps);
    let avg_period_duration = average_duration(records);

    let no_prediction = |note: &str| CyclePrediction {
        avg_cycle_length,
        avg_period_duration,
        next_period_start: None,
        predicted_period_days: Vec::new(),
        ovulation_date: None,
        fertile_window: None,
        confidence: None,
        note: Some(note.to_string()),
    };

    let Some(last) = records.last() else {
        return no_prediction(INSUFFICIENT_DATA_NOTE);
    };

    let projected = add_days(last.start_date, avg_cycle_length).and_then(|next| {
        let period_days = consecutive_days(next, avg_period_duration)?;
        let ovulation = ovulation_for_cycle(last.start_date, avg_cycle_length)?;
        Some((next, period_days, ovulation, fertile_window(ovulation)?))
    });
    let Some((next_period_start, predicted_period_days, ovulation_date, window)) = projected
    else {
        return no_prediction(DATE_OUT_OF_RANGE_NOTE);
    };

    CyclePrediction {
        avg_cycle_length,
        avg_period_duration,
        next_period_start: Some(next_period_start),
        predicted_period_days,
        ovulation_date: Some(ovulation_date),
        fertile_window: Some(window),
        confidence: Some(prediction_confidence(&gaps)),
        note: None,
    }
}

/// Project `count` cycles past the last logged start, each with its own
/// ovulation and fertile window. Stops early at the end of the calendar.
pub fn project_cycles(records: &[CycleRecord], count: usize) -> Vec<ProjectedCycle> {
    let Some(last) = records.last() else {
        return Vec::new();
    };
    let avg_cycle_length = average_cycle_length(records);
    let avg_period_duration = average_duration(records);

    (1..=count.min(MAX_PROJECTION_CYCLES) as i64)
        .map_while(|i| {
            let cycle_start = add_days(last.start_date, i * avg_cycle_length)?;
            let ovulation_date = ovulation_for_cycle(cycle_start, avg_cycle_length)?;
            Some(ProjectedCycle {
                cycle_start,
                period_days: consecutive_days(cycle_start, avg_period_duration)?,
                ovulation_date,
                fertile_window: fertile_window(ovulation_date)?,
            })
        })
        .collect()
}

pub fn ovulation_for_cycle(cycle_start: NaiveDate, avg_cycle_length: i64) -> Option<NaiveDate> {
    add_days(cycle_start, round_half_up(avg_cycle_length as f64 / 2.0))
}

/// Six-day window ending the day after ovulation; peak is the two days
/// before ovulation through ovulation itself.
pub fn fertile_window(ovulation_date: NaiveDate) -> Option<FertileWindow> {
    Some(FertileWindow {
        fertile_start: add_days(ovulation_date, -FERTILE_WINDOW_LEAD_DAYS)?,
        fertile_end: add_days(ovulation_date, FERTILE_WINDOW_TAIL_DAYS)?,
        peak_start: add_days(ovulation_date, -PEAK_FERTILITY_LEAD_DAYS)?,
        peak_end: ovulation_date,
    })
}

fn consecutive_days(first: NaiveDate, count: i64) -> Option<Vec<NaiveDate>> {
    (0..count).map(|offset| add_days(first, offset)).collect()
}

/// 0.5 with fewer than two gaps, otherwise one minus the coefficient of
/// variation, clamped to [0.1, 0.95].
pub fn prediction_confidence(gaps: &[i64]) -> f32 {
    if gaps.len() < 2 {
        return 0.5;
    }
    let avg = mean(gaps).unwrap_or(DEFAULT_CYCLE_LENGTH_DAYS as f64);
    let std_dev = sample_std_deviation(gaps);
    (1.0 - (std_dev / avg) as f32).clamp(0.1, 0.95)
}

pub fn mean_out_of_range(avg_cycle_length: i64) -> bool {
    avg_cycle_length < REGULAR_CYCLE_MIN_DAYS || avg_cycle_length > REGULAR_CYCLE_MAX_DAYS
}

/// Longest minus shortest gap exceeds the threshold. Needs two gaps.
pub fn range_irregularity(gaps: &[i64]) -> bool {
    gap_range(gaps).is_some_and(|range| range > GAP_RANGE_THRESHOLD_DAYS)
}

/// Population standard deviation of gaps exceeds the threshold.
pub fn stddev_irregularity(gaps: &[i64]) -> bool {
    population_std_deviation(gaps).is_some_and(|sd| sd > GAP_STDDEV_THRESHOLD_DAYS)
}

pub fn detect_irregularity(records: &[CycleRecord], check: IrregularityCheck) -> bool {
    let gaps = cycle_gaps(records);
    if mean_out_of_range(average_of_gaps(&gaps)) {
        return true;
    }
    match check {
        IrregularityCheck::Range => range_irregularity(&gaps),
        IrregularityCheck::StdDev => stddev_irregularity(&gaps),
    }
}

pub fn gap_range(gaps: &[i64]) -> Option<i64> {
    if gaps.len() < 2 {
        return None;
    }
    let max = gaps.iter().max()?;
    let min = gaps.iter().min()?;
    Some(max - min)
}

/// Classify the phase of `now` relative to the most recent period start.
///
/// A negative day count (now before the last start) is not clamped and
/// lands in the new-cycle fallback together with overdue cycles.
pub fn infer_current_phase(
    last_record: Option<&CycleRecord>,
    avg_cycle_length: i64,
    now: NaiveDate,
) -> PhaseInference {
    let Some(last) = last_record else {
        return PhaseInference {
            phase: CyclePhase::Menstrual,
            days_since_last_period: None,
            menstrual_day: None,
            note: Some(NO_DATA_PHASE_NOTE.to_string()),
        };
    };

    let days = days_between(last.start_date, now);
    let (phase, menstrual_day, note) = match days {
        0..=MENSTRUAL_PHASE_LAST_DAY => (CyclePhase::Menstrual, Some(days + 1), None),
        FOLLICULAR_PHASE_FIRST_DAY..=FOLLICULAR_PHASE_LAST_DAY => {
            (CyclePhase::Follicular, None, None)
        }
        OVULATION_PHASE_FIRST_DAY..=OVULATION_PHASE_LAST_DAY => {
            (CyclePhase::Ovulation, None, None)
        }
        d if d >= LUTEAL_PHASE_FIRST_DAY && d <= avg_cycle_length => {
            (CyclePhase::Luteal, None, None)
        }
        _ => (CyclePhase::Menstrual, None, Some(NEW_CYCLE_NOTE.to_string())),
    };

    PhaseInference {
        phase,
        days_since_last_period: Some(days),
        menstrual_day,
        note,
    }
}

/// Descriptive statistics for the stats view.
pub fn cycle_stats(records: &[CycleRecord]) -> CycleStats {
    let gaps = cycle_gaps(records);
    let last = records.last();

    CycleStats {
        total_cycles: records.len(),
        valid_gaps: gaps.len(),
        avg_cycle_length: average_of_gaps(&gaps),
        avg_period_length: average_duration(records),
        uses_default_cycle_length: gaps.is_empty(),
        shortest_cycle: gaps.iter().copied().min(),
        longest_cycle: gaps.iter().copied().max(),
        last_period_start: last.map(|r| r.start_date),
        last_period_end: last.map(|r| r.end_date),
    }
}

/// Half-up rounding, matching the way averages are reported to users.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

pub fn population_std_deviation(values: &[i64]) -> Option<f64> {
    let avg = mean(values)?;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - avg).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

fn sample_std_deviation(values: &[i64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values).unwrap_or(0.0);
    let variance = values
        .iter()
        .map(|&v| (v as f64 - avg).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}
