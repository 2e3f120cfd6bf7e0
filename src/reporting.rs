//! Population-level irregularity reporting for admins.
//!
//! Each subject is judged with the standard-deviation variant of
//! [`analytics::detect_irregularity`]; the population figures are a plain
//! fold over those per-subject results.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::analytics::{self, IrregularityCheck};
use crate::models::{
    AggregateIrregularityReport, CycleRecord, HistogramBucket, PopulationStats,
    SubjectIrregularity, SymptomCount, SymptomType,
};

const CYCLE_LENGTH_BUCKETS: [(&str, i64, i64); 5] = [
    ("<21", i64::MIN, 20),
    ("21-25", 21, 25),
    ("26-30", 26, 30),
    ("31-35", 31, 35),
    (">35", 36, i64::MAX),
];

const PERIOD_DURATION_BUCKETS: [(&str, i64, i64); 4] = [
    ("1-3", 1, 3),
    ("4-5", 4, 5),
    ("6-7", 6, 7),
    (">7", 8, i64::MAX),
];

/// Irregularity summary for one subject. `records` must be sorted.
pub fn subject_irregularity(subject_id: &str, records: &[CycleRecord]) -> SubjectIrregularity {
    let gaps = analytics::cycle_gaps(records);
    SubjectIrregularity {
        subject_id: subject_id.to_string(),
        record_count: records.len(),
        valid_gap_count: gaps.len(),
        avg_cycle_length: analytics::average_cycle_length(records),
        std_dev_days: analytics::population_std_deviation(&gaps).unwrap_or(0.0),
        gap_range_days: analytics::gap_range(&gaps),
        is_irregular: analytics::detect_irregularity(records, IrregularityCheck::StdDev),
    }
}

/// Build the admin report from sorted per-subject histories.
pub fn aggregate_report(
    histories: &[(String, Vec<CycleRecord>)],
    generated_on: NaiveDate,
) -> AggregateIrregularityReport {
    let subjects: Vec<SubjectIrregularity> = histories
        .iter()
        .map(|(subject_id, records)| subject_irregularity(subject_id, records))
        .collect();

    let total_subjects = subjects.len();
    let irregular_count = subjects.iter().filter(|s| s.is_irregular).count();

    let cycle_lengths: Vec<i64> = subjects.iter().map(|s| s.avg_cycle_length).collect();
    let durations: Vec<i64> = histories
        .iter()
        .flat_map(|(_, records)| records)
        .map(|r| analytics::period_duration(r.start_date, r.end_date))
        .collect();

    AggregateIrregularityReport {
        generated_on,
        population: PopulationStats {
            total_subjects,
            irregular_count,
            regular_count: total_subjects - irregular_count,
            irregular_percentage: percentage(irregular_count, total_subjects),
            cycle_length_distribution: histogram(&CYCLE_LENGTH_BUCKETS, &cycle_lengths),
            period_duration_distribution: histogram(&PERIOD_DURATION_BUCKETS, &durations),
            symptom_frequency: symptom_frequency(histories.iter().flat_map(|(_, r)| r)),
        },
        subjects,
    }
}

/// Share of `part` in `whole`, in percent with one decimal.
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

fn histogram(buckets: &[(&str, i64, i64)], values: &[i64]) -> Vec<HistogramBucket> {
    buckets
        .iter()
        .map(|&(label, low, high)| HistogramBucket {
            label: label.to_string(),
            count: values.iter().filter(|&&v| v >= low && v <= high).count(),
        })
        .collect()
}

/// Most frequent first, ties broken by symptom name.
fn symptom_frequency<'a>(records: impl Iterator<Item = &'a CycleRecord>) -> Vec<SymptomCount> {
    let mut counts: HashMap<SymptomType, usize> = HashMap::new();
    for symptom in records.flat_map(|r| r.symptoms.iter()) {
        *counts.entry(*symptom).or_default() += 1;
    }

    let mut frequency: Vec<SymptomCount> = counts
        .into_iter()
        .map(|(symptom, count)| SymptomCount { symptom, count })
        .collect();
    frequency.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.symptom.as_str().cmp(b.symptom.as_str()))
    });
    frequency
}
