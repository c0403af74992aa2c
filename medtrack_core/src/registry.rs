//! Medication and schedule registry with file locking.
//!
//! The registry is the snapshot of all medications and every schedule
//! version, saved atomically so concurrent invocations never see a torn
//! file.

use crate::schedule::ScheduleDraft;
use crate::{Error, Medication, OccurrenceKey, Result, Schedule};
use chrono::NaiveDateTime;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// All medications and schedule versions known to the system
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Registry {
    pub medications: HashMap<Uuid, Medication>,
    /// Every version ever created, including deactivated ones; adherence
    /// history stays resolvable against old versions
    pub schedules: Vec<Schedule>,
}

impl Registry {
    pub fn add_medication(&mut self, medication: Medication) -> Uuid {
        let id = medication.id;
        self.medications.insert(id, medication);
        id
    }

    pub fn medication(&self, id: Uuid) -> Option<&Medication> {
        self.medications.get(&id)
    }

    /// Case-insensitive lookup by medication name
    pub fn medication_by_name(&self, name: &str) -> Option<&Medication> {
        self.medications
            .values()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn add_schedule(&mut self, schedule: Schedule) {
        self.schedules.push(schedule);
    }

    /// The latest version of a schedule, active or not
    pub fn schedule(&self, id: Uuid) -> Option<&Schedule> {
        self.schedules
            .iter()
            .filter(|s| s.id == id)
            .max_by_key(|s| s.version)
    }

    /// Active schedules whose medication is also still active
    pub fn active_schedules(&self) -> Vec<Schedule> {
        self.schedules
            .iter()
            .filter(|s| {
                s.active
                    && self
                        .medications
                        .get(&s.medication_id)
                        .map(|m| m.active)
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Resolve the schedule version to record an occurrence against
    ///
    /// Prefers the active version when it covers `scheduled_at`; otherwise
    /// falls back to the newest superseded version that does, so doses
    /// scheduled before a revision stay recordable. Fails with
    /// [`Error::UnknownOccurrence`] when the schedule line has been
    /// discontinued or no version covers the instant.
    pub fn recordable_schedule(&self, id: Uuid, scheduled_at: NaiveDateTime) -> Result<Schedule> {
        let key = OccurrenceKey::new(id, scheduled_at);

        let mut versions: Vec<&Schedule> =
            self.schedules.iter().filter(|s| s.id == id).collect();
        versions.sort_by_key(|s| std::cmp::Reverse(s.version));

        let line_live = versions.iter().any(|s| s.active)
            && versions
                .first()
                .and_then(|s| self.medications.get(&s.medication_id))
                .map(|m| m.active)
                .unwrap_or(false);
        if !line_live {
            return Err(Error::UnknownOccurrence(key.to_string()));
        }

        versions
            .iter()
            .find(|s| s.active && s.covers(scheduled_at))
            .or_else(|| versions.iter().find(|s| s.covers(scheduled_at)))
            .map(|s| (*s).clone())
            .ok_or_else(|| Error::UnknownOccurrence(key.to_string()))
    }

    /// Replace a schedule with a new version built from `draft`
    ///
    /// The current version is deactivated in place; history generated under
    /// it is untouched because records key on `schedule_id + scheduled_at`.
    pub fn revise_schedule(&mut self, id: Uuid, draft: ScheduleDraft) -> Result<Schedule> {
        let current = self
            .schedules
            .iter_mut()
            .filter(|s| s.id == id && s.active)
            .max_by_key(|s| s.version)
            .ok_or_else(|| Error::InvalidSchedule(format!("no active schedule {}", id)))?;

        let revised = current.revise(draft)?;
        current.active = false;
        self.schedules.push(revised.clone());
        Ok(revised)
    }

    /// Mark a medication and its schedules inactive
    ///
    /// Past adherence records are never deleted by discontinuation.
    pub fn discontinue_medication(&mut self, id: Uuid) -> Result<()> {
        let medication = self
            .medications
            .get_mut(&id)
            .ok_or_else(|| Error::Other(format!("no medication {}", id)))?;
        medication.active = false;

        for schedule in self.schedules.iter_mut().filter(|s| s.medication_id == id) {
            schedule.active = false;
        }
        Ok(())
    }

    /// Load the registry from a file with shared locking
    ///
    /// Returns an empty registry if the file doesn't exist.
    /// If the file is corrupted, logs a warning and returns an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No registry file found, starting empty");
            return Ok(Self::default());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(
                    "Unable to open registry file {:?}: {}. Starting empty.",
                    path,
                    e
                );
                return Ok(Self::default());
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!(
                "Unable to lock registry file {:?}: {}. Starting empty.",
                path,
                e
            );
            return Ok(Self::default());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!(
                "Failed to read registry file {:?}: {}. Starting empty.",
                path,
                e
            );
            return Ok(Self::default());
        }

        file.unlock()?;

        match serde_json::from_str::<Registry>(&contents) {
            Ok(registry) => {
                tracing::debug!("Loaded registry from {:?}", path);
                Ok(registry)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse registry file {:?}: {}. Starting empty.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save the registry to a file with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "registry path missing parent")
        })?)?;

        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved registry to {:?}", path);
        Ok(())
    }

    /// Load, modify, and save back atomically
    pub fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut Registry) -> Result<()>,
    {
        let mut registry = Self::load(path)?;
        f(&mut registry)?;
        registry.save(path)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn sample_registry() -> Registry {
        let mut registry = Registry::default();
        let med_id = registry.add_medication(Medication::new(
            "Aspirin",
            Some("500mg".into()),
            Some("with food".into()),
        ));
        let schedule = Schedule::create(
            med_id,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ScheduleDraft {
                times_of_day: vec![t(8), t(20)],
                ..Default::default()
            },
        )
        .unwrap();
        registry.add_schedule(schedule);
        registry
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("registry.json");

        let registry = sample_registry();
        registry.save(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert_eq!(loaded.medications.len(), 1);
        assert_eq!(loaded.schedules.len(), 1);
        assert!(loaded.medication_by_name("aspirin").is_some());
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let registry = Registry::load(&path).unwrap();
        assert!(registry.medications.is_empty());
        assert!(registry.schedules.is_empty());
    }

    #[test]
    fn test_corrupted_registry_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("corrupted.json");

        std::fs::write(&path, "{ invalid json }").unwrap();

        let registry = Registry::load(&path).unwrap();
        assert!(registry.medications.is_empty());
    }

    #[test]
    fn test_update_pattern() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("registry.json");

        Registry::default().save(&path).unwrap();

        Registry::update(&path, |registry| {
            registry.add_medication(Medication::new("Metformin", Some("850mg".into()), None));
            Ok(())
        })
        .unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert!(loaded.medication_by_name("Metformin").is_some());
    }

    #[test]
    fn test_revise_keeps_old_version_inactive() {
        let mut registry = sample_registry();
        let id = registry.schedules[0].id;

        let revised = registry
            .revise_schedule(
                id,
                ScheduleDraft {
                    times_of_day: vec![t(9)],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(revised.version, 2);
        assert_eq!(registry.schedules.len(), 2);
        assert!(!registry.schedules[0].active);
        assert_eq!(registry.schedule(id).unwrap().version, 2);
        assert_eq!(registry.active_schedules().len(), 1);
    }

    #[test]
    fn test_recordable_schedule_after_revision() {
        let mut registry = sample_registry();
        let id = registry.schedules[0].id;

        registry
            .revise_schedule(
                id,
                ScheduleDraft {
                    times_of_day: vec![t(9)],
                    ..Default::default()
                },
            )
            .unwrap();

        // A dose scheduled under v1 resolves to v1, even though v1 is
        // no longer the active version
        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_time(t(8));
        let resolved = registry.recordable_schedule(id, at).unwrap();
        assert_eq!(resolved.version, 1);
        assert!(!resolved.active);

        // A dose under the new rule resolves to v2
        let at = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_time(t(9));
        assert_eq!(registry.recordable_schedule(id, at).unwrap().version, 2);
    }

    #[test]
    fn test_recordable_schedule_rejects_discontinued() {
        let mut registry = sample_registry();
        let id = registry.schedules[0].id;
        let med_id = registry.schedules[0].medication_id;

        registry.discontinue_medication(med_id).unwrap();

        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_time(t(8));
        let result = registry.recordable_schedule(id, at);
        assert!(matches!(result, Err(Error::UnknownOccurrence(_))));
    }

    #[test]
    fn test_recordable_schedule_rejects_uncovered_instant() {
        let registry = sample_registry();
        let id = registry.schedules[0].id;

        let at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_time(t(9));
        let result = registry.recordable_schedule(id, at);
        assert!(matches!(result, Err(Error::UnknownOccurrence(_))));
    }

    #[test]
    fn test_discontinue_deactivates_schedules() {
        let mut registry = sample_registry();
        let med_id = registry.schedules[0].medication_id;

        registry.discontinue_medication(med_id).unwrap();

        assert!(!registry.medications[&med_id].active);
        assert!(registry.active_schedules().is_empty());
        // Versions themselves are retained
        assert_eq!(registry.schedules.len(), 1);
    }

    #[test]
    fn test_revise_missing_schedule_fails() {
        let mut registry = Registry::default();
        let result = registry.revise_schedule(
            Uuid::new_v4(),
            ScheduleDraft {
                times_of_day: vec![t(8)],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    }
}
