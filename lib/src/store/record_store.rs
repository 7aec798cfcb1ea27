// lib/src/store/record_store.rs
//! Sled-backed record store for the three entity tables.
//!
//! Sensitive columns pass through the field cipher on the way in and out;
//! the phone blind index lives in its own tree and is written in the same
//! transaction as the patient record it points at. Dedup-guard transitions
//! (`reminded`, `birthday_card_sent_year`) are single-key transactions so a
//! scheduled sweep and a manual trigger racing each other can never leave a
//! record half-updated.

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use models::errors::{BotError, BotResult};
use models::{Appointment, DiaryEntry, Patient};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use uuid::Uuid;

use crate::crypto::{blind_index, FieldCipher};

const TREE_PATIENTS: &str = "patients";
const TREE_APPOINTMENTS: &str = "appointments";
const TREE_DIARY: &str = "diary_entries";
const TREE_PHONE_INDEX: &str = "phone_index";

/// On-disk patient row. `name_enc`/`phone_enc` are codec blobs;
/// `phone_digest` is the blind index copy that also keys `phone_index`.
#[derive(Serialize, Deserialize)]
struct PatientRecord {
    id: Uuid,
    name_enc: String,
    phone_enc: String,
    phone_digest: String,
    birthdate: Option<NaiveDate>,
    birthday_card_sent_year: Option<i32>,
}

#[derive(Serialize, Deserialize)]
struct AppointmentRecord {
    id: Uuid,
    date: NaiveDateTime,
    description_enc: Option<String>,
    patient_id: Uuid,
    reminded: bool,
}

#[derive(Serialize, Deserialize)]
struct DiaryRecord {
    id: Uuid,
    date: NaiveDateTime,
    content_enc: String,
    patient_id: Uuid,
}

pub struct RecordStore {
    db: sled::Db,
    patients: sled::Tree,
    appointments: sled::Tree,
    diary_entries: sled::Tree,
    phone_index: sled::Tree,
    cipher: FieldCipher,
}

impl RecordStore {
    pub fn open<P: AsRef<Path>>(path: P, cipher: FieldCipher) -> BotResult<Self> {
        let db = sled::open(path.as_ref())?;
        let store = RecordStore {
            patients: db.open_tree(TREE_PATIENTS)?,
            appointments: db.open_tree(TREE_APPOINTMENTS)?,
            diary_entries: db.open_tree(TREE_DIARY)?,
            phone_index: db.open_tree(TREE_PHONE_INDEX)?,
            db,
            cipher,
        };
        info!("Record store opened at {:?}", path.as_ref());
        Ok(store)
    }

    // ---- Patients ----

    /// Admits a new patient. The phone is canonicalized and validated first;
    /// the record and its digest index entry commit in one transaction, and
    /// a digest collision aborts the whole write.
    pub fn create_patient(
        &self,
        name: &str,
        raw_phone: &str,
        birthdate: Option<NaiveDate>,
    ) -> BotResult<Patient> {
        if name.trim().is_empty() {
            return Err(BotError::Validation("name is required".to_string()));
        }
        let canonical = blind_index::canonicalize_phone(raw_phone)?;
        let digest = blind_index::digest(&canonical);

        let record = PatientRecord {
            id: Uuid::new_v4(),
            name_enc: self.cipher.encode(name)?,
            phone_enc: self.cipher.encode(&canonical)?,
            phone_digest: digest.clone(),
            birthdate,
            birthday_card_sent_year: None,
        };
        let id_bytes = record.id.as_bytes().to_vec();
        let value = serde_json::to_vec(&record)?;

        let result = (&self.patients, &self.phone_index).transaction(|(patients, index)| {
            if index.get(digest.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(BotError::DuplicatePhone));
            }
            index.insert(digest.as_bytes(), id_bytes.clone())?;
            patients.insert(id_bytes.clone(), value.clone())?;
            Ok(())
        });
        map_tx(result)?;
        self.db.flush()?;

        info!("Patient {} admitted", record.id);
        self.decode_patient(record)
    }

    pub fn patient(&self, id: Uuid) -> BotResult<Patient> {
        let bytes = self.patients.get(id.as_bytes())?.ok_or(BotError::NotFound(id))?;
        self.decode_patient(serde_json::from_slice(&bytes)?)
    }

    pub fn patients(&self) -> BotResult<Vec<Patient>> {
        let mut out = Vec::new();
        for item in self.patients.iter() {
            let (_, bytes) = item?;
            out.push(self.decode_patient(serde_json::from_slice(&bytes)?)?);
        }
        Ok(out)
    }

    /// Equality lookup by contact address, via the blind index only.
    pub fn find_patient_by_phone(&self, raw_phone: &str) -> BotResult<Option<Patient>> {
        let digest = blind_index::phone_digest(raw_phone)?;
        let Some(id_bytes) = self.phone_index.get(digest.as_bytes())? else {
            return Ok(None);
        };
        let id = uuid_from_bytes(&id_bytes)?;
        match self.patients.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode_patient(serde_json::from_slice(&bytes)?)?)),
            None => {
                // Index points at a record that is gone; treat as no match.
                warn!("phone index entry dangles for patient {}", id);
                Ok(None)
            }
        }
    }

    /// Deletes a patient and everything the patient owns. The cascade is
    /// explicit: dependents first, then the index entry, then the patient.
    pub fn delete_patient(&self, id: Uuid) -> BotResult<()> {
        let bytes = self.patients.get(id.as_bytes())?.ok_or(BotError::NotFound(id))?;
        let record: PatientRecord = serde_json::from_slice(&bytes)?;

        let appointment_ids = self.dependent_ids(&self.appointments, id)?;
        let diary_ids = self.dependent_ids(&self.diary_entries, id)?;

        for appt_id in &appointment_ids {
            self.appointments.remove(appt_id.as_bytes())?;
        }
        for entry_id in &diary_ids {
            self.diary_entries.remove(entry_id.as_bytes())?;
        }
        self.phone_index.remove(record.phone_digest.as_bytes())?;
        self.patients.remove(id.as_bytes())?;
        self.db.flush()?;

        info!(
            "Patient {} deleted with {} appointments and {} diary entries",
            id,
            appointment_ids.len(),
            diary_ids.len()
        );
        Ok(())
    }

    /// Commits the year marker for the birthday dedup guard. Called only
    /// after the gateway confirmed the send.
    pub fn set_birthday_card_year(&self, id: Uuid, year: i32) -> BotResult<()> {
        let result = self.patients.transaction(|tx| {
            let bytes = tx
                .get(id.as_bytes())?
                .ok_or(ConflictableTransactionError::Abort(BotError::NotFound(id)))?;
            let mut record: PatientRecord =
                serde_json::from_slice(&bytes).map_err(abort_serde)?;
            record.birthday_card_sent_year = Some(year);
            tx.insert(
                id.as_bytes().as_slice(),
                serde_json::to_vec(&record).map_err(abort_serde)?,
            )?;
            Ok(())
        });
        map_tx(result)?;
        self.db.flush()?;
        debug!("Birthday card year {} recorded for patient {}", year, id);
        Ok(())
    }

    // ---- Appointments ----

    pub fn add_appointment(
        &self,
        patient_id: Uuid,
        date: NaiveDateTime,
        description: Option<&str>,
    ) -> BotResult<Appointment> {
        if !self.patients.contains_key(patient_id.as_bytes())? {
            return Err(BotError::NotFound(patient_id));
        }
        let record = AppointmentRecord {
            id: Uuid::new_v4(),
            date,
            description_enc: match description {
                Some(d) if !d.is_empty() => Some(self.cipher.encode(d)?),
                _ => None,
            },
            patient_id,
            reminded: false,
        };
        self.appointments
            .insert(record.id.as_bytes(), serde_json::to_vec(&record)?)?;
        self.db.flush()?;
        self.decode_appointment(record)
    }

    pub fn appointment(&self, id: Uuid) -> BotResult<Appointment> {
        let bytes = self.appointments.get(id.as_bytes())?.ok_or(BotError::NotFound(id))?;
        self.decode_appointment(serde_json::from_slice(&bytes)?)
    }

    /// Appointments are cancellable independently of their patient.
    pub fn cancel_appointment(&self, id: Uuid) -> BotResult<()> {
        self.appointments
            .remove(id.as_bytes())?
            .ok_or(BotError::NotFound(id))?;
        self.db.flush()?;
        Ok(())
    }

    pub fn appointments_for(&self, patient_id: Uuid) -> BotResult<Vec<Appointment>> {
        let mut out = Vec::new();
        for item in self.appointments.iter() {
            let (_, bytes) = item?;
            let record: AppointmentRecord = serde_json::from_slice(&bytes)?;
            if record.patient_id == patient_id {
                out.push(self.decode_appointment(record)?);
            }
        }
        out.sort_by_key(|a| a.date);
        Ok(out)
    }

    /// Appointments in `[start, end)` whose reminder has not been confirmed
    /// sent. The sweep calls this each tick with tomorrow's calendar day.
    pub fn due_unreminded(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BotResult<Vec<Appointment>> {
        let mut out = Vec::new();
        for item in self.appointments.iter() {
            let (_, bytes) = item?;
            let record: AppointmentRecord = serde_json::from_slice(&bytes)?;
            if !record.reminded && record.date >= start && record.date < end {
                out.push(self.decode_appointment(record)?);
            }
        }
        out.sort_by_key(|a| a.date);
        Ok(out)
    }

    /// Flips the reminder dedup guard, false→true, in a transaction scoped
    /// to the single appointment row. Idempotent once set.
    pub fn mark_reminded(&self, id: Uuid) -> BotResult<()> {
        let result = self.appointments.transaction(|tx| {
            let bytes = tx
                .get(id.as_bytes())?
                .ok_or(ConflictableTransactionError::Abort(BotError::NotFound(id)))?;
            let mut record: AppointmentRecord =
                serde_json::from_slice(&bytes).map_err(abort_serde)?;
            if !record.reminded {
                record.reminded = true;
                tx.insert(
                    id.as_bytes().as_slice(),
                    serde_json::to_vec(&record).map_err(abort_serde)?,
                )?;
            }
            Ok(())
        });
        map_tx(result)?;
        self.db.flush()?;
        Ok(())
    }

    // ---- Diary entries ----

    pub fn add_diary_entry(
        &self,
        patient_id: Uuid,
        content: &str,
        date: NaiveDateTime,
    ) -> BotResult<DiaryEntry> {
        if !self.patients.contains_key(patient_id.as_bytes())? {
            return Err(BotError::NotFound(patient_id));
        }
        let record = DiaryRecord {
            id: Uuid::new_v4(),
            date,
            content_enc: self.cipher.encode(content)?,
            patient_id,
        };
        self.diary_entries
            .insert(record.id.as_bytes(), serde_json::to_vec(&record)?)?;
        self.db.flush()?;
        self.decode_diary(record)
    }

    /// Newest first, the order the staff view shows them in.
    pub fn diary_entries_for(&self, patient_id: Uuid) -> BotResult<Vec<DiaryEntry>> {
        let mut out = Vec::new();
        for item in self.diary_entries.iter() {
            let (_, bytes) = item?;
            let record: DiaryRecord = serde_json::from_slice(&bytes)?;
            if record.patient_id == patient_id {
                out.push(self.decode_diary(record)?);
            }
        }
        out.sort_by_key(|e| std::cmp::Reverse(e.date));
        Ok(out)
    }

    // ---- Decoding helpers ----

    fn decode_patient(&self, record: PatientRecord) -> BotResult<Patient> {
        Ok(Patient {
            id: record.id,
            name: self.cipher.decode(&record.name_enc)?,
            phone: self.cipher.decode(&record.phone_enc)?,
            phone_digest: record.phone_digest,
            birthdate: record.birthdate,
            birthday_card_sent_year: record.birthday_card_sent_year,
        })
    }

    fn decode_appointment(&self, record: AppointmentRecord) -> BotResult<Appointment> {
        Ok(Appointment {
            id: record.id,
            date: record.date,
            description: match record.description_enc {
                Some(blob) => Some(self.cipher.decode(&blob)?),
                None => None,
            },
            patient_id: record.patient_id,
            reminded: record.reminded,
        })
    }

    fn decode_diary(&self, record: DiaryRecord) -> BotResult<DiaryEntry> {
        Ok(DiaryEntry {
            id: record.id,
            date: record.date,
            content: self.cipher.decode(&record.content_enc)?,
            patient_id: record.patient_id,
        })
    }

    fn dependent_ids(&self, tree: &sled::Tree, patient_id: Uuid) -> BotResult<Vec<Uuid>> {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (key, bytes) = item?;
            let owner: Uuid = match serde_json::from_slice::<serde_json::Value>(&bytes)?
                .get("patient_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                Some(owner) => owner,
                None => continue,
            };
            if owner == patient_id {
                out.push(uuid_from_bytes(&key)?);
            }
        }
        Ok(out)
    }
}

fn uuid_from_bytes(bytes: &[u8]) -> BotResult<Uuid> {
    Uuid::from_slice(bytes).map_err(|e| BotError::Storage(format!("malformed record key: {}", e)))
}

fn map_tx(result: Result<(), TransactionError<BotError>>) -> BotResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(e.into()),
    }
}

fn abort_serde(err: serde_json::Error) -> ConflictableTransactionError<BotError> {
    ConflictableTransactionError::Abort(BotError::from(err))
}
