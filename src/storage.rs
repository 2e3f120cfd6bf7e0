use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::analytics::period_duration;
use crate::crypto;
use crate::models::{CycleDraft, CycleRecord};

pub const LEDGER_FILE: &str = "ledger.safeher";

const BODY_TEMPERATURE_RANGE_C: (f32, f32) = (34.0, 42.0);
const RESTING_HEART_RATE_RANGE_BPM: (u16, u16) = (20, 250);
/// Calendar years accepted for period dates.
const SUPPORTED_YEARS: (i32, i32) = (1900, 2999);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("end date {end} is before start date {start}")]
    InvalidDates { start: NaiveDate, end: NaiveDate },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("subject id must not be empty")]
    EmptySubject,
    #[error("cycle record {0} not found")]
    NotFound(Uuid),
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record store lock poisoned")]
    Poisoned,
}

/// Keyed store of cycle records, one history per subject.
pub trait RecordStore: Send + Sync {
    /// All records of a subject, in no particular order.
    fn list_for_subject(&self, subject_id: &str) -> Result<Vec<CycleRecord>, StoreError>;

    /// Every subject with at least one record.
    fn subjects(&self) -> Result<Vec<String>, StoreError>;

    fn insert(&self, subject_id: &str, draft: CycleDraft) -> Result<CycleRecord, StoreError>;

    fn update(
        &self,
        subject_id: &str,
        id: Uuid,
        draft: CycleDraft,
    ) -> Result<CycleRecord, StoreError>;

    fn delete(&self, subject_id: &str, id: Uuid) -> Result<(), StoreError>;
}

/// Reject drafts the analytics engine must never see.
pub fn validate_draft(draft: &CycleDraft) -> Result<(), StoreError> {
    let (first_year, last_year) = SUPPORTED_YEARS;
    for (field, date) in [("start_date", draft.start_date), ("end_date", draft.end_date)] {
        if !(first_year..=last_year).contains(&date.year()) {
            return Err(StoreError::OutOfRange {
                field,
                value: date.to_string(),
            });
        }
    }

    if draft.end_date < draft.start_date {
        return Err(StoreError::InvalidDates {
            start: draft.start_date,
            end: draft.end_date,
        });
    }

    if let Some(temp) = draft.basal_body_temperature_c {
        let (min, max) = BODY_TEMPERATURE_RANGE_C;
        if !(min..=max).contains(&temp) {
            return Err(StoreError::OutOfRange {
                field: "basal_body_temperature_c",
                value: temp.to_string(),
            });
        }
    }

    if let Some(bpm) = draft.resting_heart_rate_bpm {
        let (min, max) = RESTING_HEART_RATE_RANGE_BPM;
        if !(min..=max).contains(&bpm) {
            return Err(StoreError::OutOfRange {
                field: "resting_heart_rate_bpm",
                value: bpm.to_string(),
            });
        }
    }

    Ok(())
}

fn build_record(subject_id: &str, id: Uuid, draft: CycleDraft) -> CycleRecord {
    CycleRecord {
        id,
        subject_id: subject_id.to_string(),
        start_date: draft.start_date,
        end_date: draft.end_date,
        duration_days: period_duration(draft.start_date, draft.end_date),
        intensity: draft.intensity,
        mood: draft.mood,
        symptoms: draft.symptoms,
        notes: draft.notes,
        basal_body_temperature_c: draft.basal_body_temperature_c,
        resting_heart_rate_bpm: draft.resting_heart_rate_bpm,
    }
}

fn check_subject(subject_id: &str) -> Result<(), StoreError> {
    if subject_id.trim().is_empty() {
        return Err(StoreError::EmptySubject);
    }
    Ok(())
}

/// In-memory ledger shared by both store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    subjects: BTreeMap<String, Vec<CycleRecord>>,
}

impl Ledger {
    fn list(&self, subject_id: &str) -> Vec<CycleRecord> {
        self.subjects.get(subject_id).cloned().unwrap_or_default()
    }

    fn subject_ids(&self) -> Vec<String> {
        self.subjects
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn insert(&mut self, subject_id: &str, draft: CycleDraft) -> Result<CycleRecord, StoreError> {
        check_subject(subject_id)?;
        validate_draft(&draft)?;
        let record = build_record(subject_id, Uuid::new_v4(), draft);
        self.subjects
            .entry(subject_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn update(
        &mut self,
        subject_id: &str,
        id: Uuid,
        draft: CycleDraft,
    ) -> Result<CycleRecord, StoreError> {
        validate_draft(&draft)?;
        let existing = self
            .subjects
            .get_mut(subject_id)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or(StoreError::NotFound(id))?;
        *existing = build_record(subject_id, id, draft);
        Ok(existing.clone())
    }

    fn delete(&mut self, subject_id: &str, id: Uuid) -> Result<(), StoreError> {
        let records = self
            .subjects
            .get_mut(subject_id)
            .ok_or(StoreError::NotFound(id))?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(id));
        }
        if records.is_empty() {
            self.subjects.remove(subject_id);
        }
        Ok(())
    }
}

fn lock(ledger: &Mutex<Ledger>) -> Result<MutexGuard<'_, Ledger>, StoreError> {
    ledger.lock().map_err(|_| StoreError::Poisoned)
}

/// Volatile store, the default for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, skipping write-path validation.
    #[cfg(test)]
    pub(crate) fn seed(&self, record: CycleRecord) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger
            .subjects
            .entry(record.subject_id.clone())
            .or_default()
            .push(record);
    }
}

impl RecordStore for MemoryStore {
    fn list_for_subject(&self, subject_id: &str) -> Result<Vec<CycleRecord>, StoreError> {
        Ok(lock(&self.ledger)?.list(subject_id))
    }

    fn subjects(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.ledger)?.subject_ids())
    }

    fn insert(&self, subject_id: &str, draft: CycleDraft) -> Result<CycleRecord, StoreError> {
        lock(&self.ledger)?.insert(subject_id, draft)
    }

    fn update(
        &self,
        subject_id: &str,
        id: Uuid,
        draft: CycleDraft,
    ) -> Result<CycleRecord, StoreError> {
        lock(&self.ledger)?.update(subject_id, id, draft)
    }

    fn delete(&self, subject_id: &str, id: Uuid) -> Result<(), StoreError> {
        lock(&self.ledger)?.delete(subject_id, id)
    }
}

/// Ledger kept decrypted in memory and re-sealed to disk after every
/// mutation. The on-disk copy is only replaced once sealing succeeds.
///
/// Writers queue on `write_lock` for the whole mutation; `ledger` is only
/// held to snapshot and to commit, so reads never wait on key derivation.
pub struct EncryptedFileStore {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    ledger: Mutex<Ledger>,
    write_lock: Mutex<()>,
}

impl EncryptedFileStore {
    /// Open the ledger in `dir`, creating an empty sealed ledger on first use.
    pub fn open(dir: &Path, passphrase: Zeroizing<String>) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LEDGER_FILE);

        let ledger = if path.exists() {
            let sealed = fs::read(&path)?;
            let plaintext = crypto::open(&passphrase, &sealed)?;
            let ledger: Ledger = serde_json::from_slice(&plaintext)?;
            info!(
                path = %path.display(),
                subjects = ledger.subjects.len(),
                "Opened encrypted ledger"
            );
            ledger
        } else {
            let ledger = Ledger::default();
            write_sealed(&path, &passphrase, &ledger)?;
            info!(path = %path.display(), "Created encrypted ledger");
            ledger
        };

        Ok(Self {
            path,
            passphrase,
            ledger: Mutex::new(ledger),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the ledger, persist it, then commit.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Ledger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _writer = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = lock(&self.ledger)?.clone();
        let out = change(&mut next)?;
        write_sealed(&self.path, &self.passphrase, &next)?;
        *lock(&self.ledger)? = next;
        debug!(path = %self.path.display(), "Persisted encrypted ledger");
        Ok(out)
    }
}

fn write_sealed(path: &Path, passphrase: &str, ledger: &Ledger) -> Result<(), StoreError> {
    let json = Zeroizing::new(serde_json::to_vec(ledger)?);
    let sealed = crypto::seal(passphrase, &json)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, sealed)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

impl RecordStore for EncryptedFileStore {
    fn list_for_subject(&self, subject_id: &str) -> Result<Vec<CycleRecord>, StoreError> {
        Ok(lock(&self.ledger)?.list(subject_id))
    }

    fn subjects(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.ledger)?.subject_ids())
    }

    fn insert(&self, subject_id: &str, draft: CycleDraft) -> Result<CycleRecord, StoreError> {
        self.mutate(|ledger| ledger.insert(subject_id, draft))
    }

    fn update(
        &self,
        subject_id: &str,
        id: Uuid,
        draft: CycleDraft,
    ) -> Result<CycleRecord, StoreError> {
        self.mutate(|ledger| ledger.update(subject_id, id, draft))
    }

    fn delete(&self, subject_id: &str, id: Uuid) -> Result<(), StoreError> {
        self.mutate(|ledger| ledger.delete(subject_id, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SymptomType;

    fn secret(passphrase: &str) -> Zeroizing<String> {
        Zeroizing::new(passphrase.to_string())
    }

    fn draft(start: &str, end: &str) -> CycleDraft {
        CycleDraft {
            start_date: NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap(),
            end_date: NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
            intensity: None,
            mood: None,
            symptoms: Vec::new(),
            notes: None,
            basal_body_temperature_c: None,
            resting_heart_rate_bpm: None,
        }
    }

    #[test]
    fn insert_computes_duration() {
        let store = MemoryStore::new();
        let record = store.insert("alice", draft("2024-01-01", "2024-01-05")).unwrap();
        assert_eq!(record.duration_days, 5);
        assert_eq!(record.subject_id, "alice");
        assert_eq!(store.list_for_subject("alice").unwrap(), vec![record]);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert("alice", draft("2024-01-05", "2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDates { .. }));
        assert!(store.list_for_subject("alice").unwrap().is_empty());
    }

    #[test]
    fn vitals_are_range_checked() {
        let mut d = draft("2024-01-01", "2024-01-05");
        d.basal_body_temperature_c = Some(45.0);
        assert!(matches!(
            validate_draft(&d),
            Err(StoreError::OutOfRange { field: "basal_body_temperature_c", .. })
        ));

        d.basal_body_temperature_c = Some(36.6);
        d.resting_heart_rate_bpm = Some(10);
        assert!(matches!(
            validate_draft(&d),
            Err(StoreError::OutOfRange { field: "resting_heart_rate_bpm", .. })
        ));
    }

    #[test]
    fn dates_outside_supported_years_are_rejected() {
        let mut d = draft("2024-01-01", "2024-01-05");
        d.end_date = NaiveDate::MAX;
        assert!(matches!(
            validate_draft(&d),
            Err(StoreError::OutOfRange { field: "end_date", .. })
        ));

        d.start_date = NaiveDate::MAX - chrono::Duration::days(4);
        assert!(matches!(
            validate_draft(&d),
            Err(StoreError::OutOfRange { field: "start_date", .. })
        ));

        let store = MemoryStore::new();
        assert!(store.insert("alice", draft("1899-12-27", "1900-01-02")).is_err());
        assert!(store.insert("alice", draft("1900-01-01", "1900-01-05")).is_ok());
    }

    #[test]
    fn empty_subject_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert("  ", draft("2024-01-01", "2024-01-05")),
            Err(StoreError::EmptySubject)
        ));
    }

    #[test]
    fn update_recomputes_duration() {
        let store = MemoryStore::new();
        let record = store.insert("alice", draft("2024-01-01", "2024-01-05")).unwrap();

        let mut changed = draft("2024-01-02", "2024-01-08");
        changed.symptoms = vec![SymptomType::Cramps];
        let updated = store.update("alice", record.id, changed).unwrap();

        assert_eq!(updated.id, record.id);
        assert_eq!(updated.duration_days, 7);
        assert_eq!(updated.symptoms, vec![SymptomType::Cramps]);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        store.insert("alice", draft("2024-01-01", "2024-01-05")).unwrap();
        let missing = Uuid::new_v4();

        assert!(matches!(
            store.update("alice", missing, draft("2024-01-01", "2024-01-05")),
            Err(StoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(store.delete("bob", missing), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_drops_empty_subjects() {
        let store = MemoryStore::new();
        let record = store.insert("alice", draft("2024-01-01", "2024-01-05")).unwrap();
        store.insert("bob", draft("2024-01-03", "2024-01-06")).unwrap();
        assert_eq!(store.subjects().unwrap(), vec!["alice", "bob"]);

        store.delete("alice", record.id).unwrap();
        assert_eq!(store.subjects().unwrap(), vec!["bob"]);
    }

    #[test]
    fn encrypted_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = {
            let store = EncryptedFileStore::open(dir.path(), secret("passphrase")).unwrap();
            store.insert("alice", draft("2024-01-01", "2024-01-05")).unwrap()
        };

        let reopened = EncryptedFileStore::open(dir.path(), secret("passphrase")).unwrap();
        assert_eq!(reopened.list_for_subject("alice").unwrap(), vec![record]);
        assert!(reopened.path().ends_with(LEDGER_FILE));
    }

    #[test]
    fn encrypted_store_rejects_wrong_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        EncryptedFileStore::open(dir.path(), secret("right")).unwrap();

        let result = EncryptedFileStore::open(dir.path(), secret("wrong"));
        assert!(matches!(
            result,
            Err(StoreError::Crypto(crypto::CryptoError::Open))
        ));
    }

    #[test]
    fn failed_validation_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), secret("pass")).unwrap();
        let before = fs::read(store.path()).unwrap();

        assert!(store.insert("alice", draft("2024-01-05", "2024-01-01")).is_err());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn ledger_stays_readable_during_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), secret("pass")).unwrap();
        store.insert("alice", draft("2024-01-01", "2024-01-05")).unwrap();

        let seen = store
            .mutate(|next| {
                assert!(store.ledger.try_lock().is_ok());
                let visible = store.list_for_subject("alice")?;
                next.insert("alice", draft("2024-01-29", "2024-02-02"))?;
                Ok(visible.len())
            })
            .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(store.list_for_subject("alice").unwrap().len(), 2);
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(LEDGER_FILE);
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupied"), b"x").unwrap();

        let result = write_sealed(&target, "pass", &Ledger::default());
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(!target.with_extension("tmp").exists());
    }
}
