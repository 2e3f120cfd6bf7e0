use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::{self, IrregularityCheck};
use crate::models::{
    AggregateIrregularityReport, CurrentPhase, CycleCalendar, CycleDraft, CycleInsights,
    CycleRecord, CycleStatistics, CycleStats,
};
use crate::reporting;
use crate::storage::{RecordStore, StoreError};

pub const LIMITED_DATA_NOTE: &str =
    "Log at least two cycles for personalised averages. Using the default 28-day cycle length.";

/// Analytics and record operations exposed to the API layer.
///
/// Histories are fetched fresh from the store on every call and sorted
/// before they reach the engine; nothing is cached.
#[derive(Clone)]
pub struct CycleService {
    store: Arc<dyn RecordStore>,
}

impl CycleService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn history(&self, subject_id: &str) -> Result<Vec<CycleRecord>, StoreError> {
        let mut records = self.store.list_for_subject(subject_id)?;
        analytics::sort_chronologically(&mut records);
        Ok(records)
    }

    pub fn list_cycles(&self, subject_id: &str) -> Result<Vec<CycleRecord>, StoreError> {
        self.history(subject_id)
    }

    pub fn log_cycle(
        &self,
        subject_id: &str,
        draft: CycleDraft,
    ) -> Result<CycleRecord, StoreError> {
        let record = self.store.insert(subject_id, draft)?;
        info!(subject_id, cycle_id = %record.id, "Logged cycle");
        Ok(record)
    }

    pub fn update_cycle(
        &self,
        subject_id: &str,
        cycle_id: Uuid,
        draft: CycleDraft,
    ) -> Result<CycleRecord, StoreError> {
        let record = self.store.update(subject_id, cycle_id, draft)?;
        info!(subject_id, %cycle_id, "Updated cycle");
        Ok(record)
    }

    pub fn delete_cycle(&self, subject_id: &str, cycle_id: Uuid) -> Result<(), StoreError> {
        self.store.delete(subject_id, cycle_id)?;
        info!(subject_id, %cycle_id, "Deleted cycle");
        Ok(())
    }

    /// Next period, ovulation and fertile window, plus the irregularity
    /// flag and the phase on `now`.
    pub fn prediction(
        &self,
        subject_id: &str,
        now: NaiveDate,
    ) -> Result<CycleStatistics, StoreError> {
        let records = self.history(subject_id)?;
        let prediction = analytics::predict_next_cycle(&records);
        let phase =
            analytics::infer_current_phase(records.last(), prediction.avg_cycle_length, now);
        let is_irregular = analytics::detect_irregularity(&records, IrregularityCheck::Range);

        debug!(
            subject_id,
            records = records.len(),
            is_irregular,
            "Computed prediction"
        );

        Ok(CycleStatistics {
            average_cycle_length_days: prediction.avg_cycle_length,
            average_period_duration_days: prediction.avg_period_duration,
            predicted_next_period_start: prediction.next_period_start,
            predicted_period_days: prediction.predicted_period_days,
            predicted_ovulation_date: prediction.ovulation_date,
            fertile_window: prediction.fertile_window,
            is_irregular,
            current_phase: phase.phase,
            confidence: prediction.confidence,
            note: prediction.note,
        })
    }

    pub fn insights(&self, subject_id: &str) -> Result<CycleInsights, StoreError> {
        let records = self.history(subject_id)?;
        let gaps = analytics::cycle_gaps(&records);
        let avg_cycle_length = analytics::average_cycle_length(&records);

        let note = if records.is_empty() {
            Some(analytics::INSUFFICIENT_DATA_NOTE.to_string())
        } else if gaps.is_empty() {
            Some(LIMITED_DATA_NOTE.to_string())
        } else {
            None
        };

        debug!(subject_id, records = records.len(), "Computed insights");

        Ok(CycleInsights {
            avg_cycle_length,
            avg_duration: analytics::average_duration(&records),
            is_irregular: analytics::detect_irregularity(&records, IrregularityCheck::Range),
            next_period_start: records
                .last()
                .and_then(|r| analytics::add_days(r.start_date, avg_cycle_length)),
            note,
        })
    }

    pub fn current_phase(
        &self,
        subject_id: &str,
        now: NaiveDate,
    ) -> Result<CurrentPhase, StoreError> {
        let records = self.history(subject_id)?;
        let avg_cycle_length = analytics::average_cycle_length(&records);
        let inference = analytics::infer_current_phase(records.last(), avg_cycle_length, now);

        debug!(subject_id, phase = ?inference.phase, "Inferred current phase");

        Ok(CurrentPhase {
            phase: inference.phase,
            days_since_last_period: inference.days_since_last_period,
            menstrual_day: inference.menstrual_day,
            avg_cycle_length,
            note: inference.note,
            last_period_start: records.last().map(|r| r.start_date),
        })
    }

    pub fn calendar(&self, subject_id: &str, count: usize) -> Result<CycleCalendar, StoreError> {
        let records = self.history(subject_id)?;
        let cycles = analytics::project_cycles(&records, count);

        Ok(CycleCalendar {
            avg_cycle_length: analytics::average_cycle_length(&records),
            avg_period_duration: analytics::average_duration(&records),
            note: cycles
                .is_empty()
                .then(|| analytics::INSUFFICIENT_DATA_NOTE.to_string()),
            cycles,
        })
    }

    pub fn stats(&self, subject_id: &str) -> Result<CycleStats, StoreError> {
        Ok(analytics::cycle_stats(&self.history(subject_id)?))
    }

    /// Admin report; an empty `subject_ids` covers every stored subject.
    /// Repeated ids are reported once.
    pub fn aggregate_irregularity(
        &self,
        subject_ids: &[String],
        now: NaiveDate,
    ) -> Result<AggregateIrregularityReport, StoreError> {
        let subject_ids: BTreeSet<String> = if subject_ids.is_empty() {
            self.store.subjects()?.into_iter().collect()
        } else {
            subject_ids.iter().cloned().collect()
        };

        let histories = subject_ids
            .into_iter()
            .map(|id| {
                let records = self.history(&id)?;
                Ok((id, records))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let report = reporting::aggregate_report(&histories, now);
        info!(
            subjects = report.population.total_subjects,
            irregular = report.population.irregular_count,
            "Built aggregate irregularity report"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CyclePhase;
    use crate::storage::MemoryStore;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn draft(start: &str, end: &str) -> CycleDraft {
        CycleDraft {
            start_date: date(start),
            end_date: date(end),
            intensity: None,
            mood: None,
            symptoms: Vec::new(),
            notes: None,
            basal_body_temperature_c: None,
            resting_heart_rate_bpm: None,
        }
    }

    fn service_with(subject: &str, periods: &[(&str, &str)]) -> CycleService {
        let service = CycleService::new(Arc::new(MemoryStore::new()));
        for (start, end) in periods {
            service.log_cycle(subject, draft(start, end)).unwrap();
        }
        service
    }

    #[test]
    fn single_period_prediction() {
        let service = service_with("alice", &[("2024-01-01", "2024-01-05")]);
        let stats = service.prediction("alice", date("2024-01-03")).unwrap();

        assert_eq!(stats.average_cycle_length_days, 28);
        assert_eq!(stats.average_period_duration_days, 5);
        assert_eq!(stats.predicted_next_period_start, Some(date("2024-01-29")));
        assert_eq!(stats.predicted_ovulation_date, Some(date("2024-01-15")));
        let window = stats.fertile_window.unwrap();
        assert_eq!(window.fertile_start, date("2024-01-10"));
        assert_eq!(window.fertile_end, date("2024-01-16"));
        assert_eq!(stats.current_phase, CyclePhase::Menstrual);
        assert!(!stats.is_irregular);
    }

    #[test]
    fn history_is_sorted_before_analysis() {
        let service = service_with(
            "alice",
            &[
                ("2024-02-26", "2024-03-01"),
                ("2024-01-01", "2024-01-05"),
                ("2024-01-29", "2024-02-02"),
            ],
        );
        let insights = service.insights("alice").unwrap();

        assert_eq!(insights.avg_cycle_length, 28);
        assert!(!insights.is_irregular);
        assert_eq!(insights.next_period_start, Some(date("2024-03-25")));
        assert!(insights.note.is_none());

        let listed = service.list_cycles("alice").unwrap();
        assert_eq!(listed[0].start_date, date("2024-01-01"));
    }

    #[test]
    fn new_subject_gets_defaults_not_errors() {
        let service = service_with("alice", &[]);

        let stats = service.prediction("nobody", date("2024-01-01")).unwrap();
        assert!(stats.predicted_next_period_start.is_none());
        assert!(stats.predicted_period_days.is_empty());
        assert!(stats.note.is_some());

        let phase = service.current_phase("nobody", date("2024-01-01")).unwrap();
        assert_eq!(phase.phase, CyclePhase::Menstrual);
        assert_eq!(phase.note.as_deref(), Some(analytics::NO_DATA_PHASE_NOTE));
        assert!(phase.last_period_start.is_none());

        let insights = service.insights("nobody").unwrap();
        assert_eq!(insights.avg_cycle_length, 28);
        assert_eq!(insights.avg_duration, 5);
        assert!(insights.next_period_start.is_none());

        let calendar = service.calendar("nobody", 8).unwrap();
        assert!(calendar.cycles.is_empty());
        assert!(calendar.note.is_some());
    }

    #[test]
    fn single_period_insights_note_limited_data() {
        let service = service_with("alice", &[("2024-01-01", "2024-01-05")]);
        let insights = service.insights("alice").unwrap();
        assert_eq!(insights.note.as_deref(), Some(LIMITED_DATA_NOTE));
    }

    #[test]
    fn current_phase_uses_whole_history() {
        // gaps 30 and 32 -> 31; day 30 after last start is still luteal
        let service = service_with(
            "alice",
            &[
                ("2024-01-01", "2024-01-05"),
                ("2024-01-31", "2024-02-04"),
                ("2024-03-03", "2024-03-07"),
            ],
        );
        let phase = service.current_phase("alice", date("2024-04-02")).unwrap();

        assert_eq!(phase.avg_cycle_length, 31);
        assert_eq!(phase.days_since_last_period, Some(30));
        assert_eq!(phase.phase, CyclePhase::Luteal);
        assert_eq!(phase.last_period_start, Some(date("2024-03-03")));
    }

    #[test]
    fn aggregate_defaults_to_all_subjects() {
        let service = service_with(
            "alice",
            &[("2024-01-01", "2024-01-05"), ("2024-02-10", "2024-02-14")],
        );
        service.log_cycle("bob", draft("2024-01-03", "2024-01-07")).unwrap();

        let report = service.aggregate_irregularity(&[], date("2024-06-01")).unwrap();
        assert_eq!(report.population.total_subjects, 2);
        assert_eq!(report.population.irregular_count, 1);

        let only_bob = service
            .aggregate_irregularity(&["bob".to_string()], date("2024-06-01"))
            .unwrap();
        assert_eq!(only_bob.subjects.len(), 1);
        assert!(!only_bob.subjects[0].is_irregular);
    }

    #[test]
    fn aggregate_counts_repeated_subjects_once() {
        let service = service_with(
            "alice",
            &[("2024-01-01", "2024-01-05"), ("2024-02-10", "2024-02-14")],
        );
        service.log_cycle("bob", draft("2024-01-03", "2024-01-07")).unwrap();

        let ids = ["alice", "bob", "alice"].map(String::from);
        let report = service.aggregate_irregularity(&ids, date("2024-06-01")).unwrap();
        assert_eq!(report.subjects.len(), 2);
        assert_eq!(report.population.total_subjects, 2);
        assert_eq!(report.population.irregular_count, 1);
        assert_eq!(report.population.irregular_percentage, 50.0);
    }

    #[test]
    fn insights_past_calendar_end_have_no_next_period() {
        let store = MemoryStore::new();
        let record = CycleRecord {
            id: Uuid::new_v4(),
            subject_id: "alice".into(),
            start_date: NaiveDate::MAX,
            end_date: NaiveDate::MAX,
            duration_days: 1,
            intensity: None,
            mood: None,
            symptoms: Vec::new(),
            notes: None,
            basal_body_temperature_c: None,
            resting_heart_rate_bpm: None,
        };
        store.seed(record);
        let service = CycleService::new(Arc::new(store));

        let insights = service.insights("alice").unwrap();
        assert!(insights.next_period_start.is_none());
        let stats = service.prediction("alice", date("2024-01-01")).unwrap();
        assert!(stats.predicted_next_period_start.is_none());
        assert_eq!(stats.note.as_deref(), Some(analytics::DATE_OUT_OF_RANGE_NOTE));
        assert!(service.calendar("alice", 8).unwrap().cycles.is_empty());
    }
}
