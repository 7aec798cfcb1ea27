// notification_service/src/jobs.rs
//! The three notification jobs. Each is re-entrant: a scheduled tick and a
//! manual trigger may overlap, and dedup-guard state only ever advances
//! after the gateway confirms a send, so the worst overlap outcome is one
//! duplicate message, never a lost one.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use healthbot::services::cards::{default_birthday_card, CardProvider};
use healthbot::services::calendar::google_calendar_link;
use healthbot::services::gateway::{MessageGateway, SendOutcome};
use healthbot::RecordStore;
use log::{error, info, warn};
use models::errors::BotResult;
use models::{Appointment, Patient};
use std::sync::Arc;
use uuid::Uuid;

pub const DIARY_NUDGE: &str =
    "Good morning! Please remember to send your daily e-diary entry. Just reply with your entry.";

/// Shared context injected into every job: store handle, gateway client,
/// text provider. Constructed once at startup, no global state.
pub struct Jobs {
    store: Arc<RecordStore>,
    gateway: Arc<dyn MessageGateway>,
    cards: Arc<dyn CardProvider>,
}

impl Jobs {
    pub fn new(
        store: Arc<RecordStore>,
        gateway: Arc<dyn MessageGateway>,
        cards: Arc<dyn CardProvider>,
    ) -> Self {
        Jobs { store, gateway, cards }
    }

    /// Sweeps appointments falling within tomorrow's calendar day whose
    /// reminder is not yet confirmed sent. Only a `Sent` outcome flips the
    /// flag; anything else is retried on the next sweep. A single
    /// recipient's failure never aborts the batch.
    pub async fn run_reminder_sweep(&self, now: NaiveDateTime) -> BotResult<usize> {
        let tomorrow = now.date() + Days::new(1);
        let start = tomorrow.and_time(NaiveTime::MIN);
        let end = (tomorrow + Days::new(1)).and_time(NaiveTime::MIN);

        let due = self.store.due_unreminded(start, end)?;
        if due.is_empty() {
            return Ok(0);
        }
        info!("Reminder sweep: {} appointment(s) due on {}", due.len(), tomorrow);

        let mut sent = 0;
        for appointment in due {
            let patient = match self.store.patient(appointment.patient_id) {
                Ok(p) => p,
                Err(e) => {
                    error!("skipping appointment {}: {}", appointment.id, e);
                    continue;
                }
            };
            let message = render_sweep_reminder(&patient, &appointment);
            match self.gateway.send(&patient.phone, &message).await {
                SendOutcome::Sent => {
                    if let Err(e) = self.store.mark_reminded(appointment.id) {
                        error!("sent but failed to mark appointment {}: {}", appointment.id, e);
                    } else {
                        sent += 1;
                    }
                }
                outcome => {
                    warn!(
                        "reminder for appointment {} not confirmed ({:?}); will retry next sweep",
                        appointment.id, outcome
                    );
                }
            }
        }
        Ok(sent)
    }

    /// Sends the diary nudge to every patient, every day, with no dedup
    /// state. The duplicate-send risk on overlap is accepted by design.
    pub async fn run_diary_nudge(&self) -> BotResult<usize> {
        let patients = self.store.patients()?;
        let mut sent = 0;
        for patient in patients {
            match self.gateway.send(&patient.phone, DIARY_NUDGE).await {
                SendOutcome::Sent => sent += 1,
                outcome => warn!("diary nudge to patient {} not confirmed ({:?})", patient.id, outcome),
            }
        }
        info!("Diary nudge: {} message(s) confirmed", sent);
        Ok(sent)
    }

    /// Sends at most one birthday card per patient per calendar year. The
    /// year marker advances only on a confirmed send, so reruns on the same
    /// day are harmless and a failed send retries on the next daily tick.
    pub async fn run_birthday_check(&self, today: NaiveDate) -> BotResult<usize> {
        let year = today.year();
        let mut sent = 0;
        for patient in self.store.patients()? {
            if !patient.is_birthday(today) || !patient.birthday_card_pending(year) {
                continue;
            }
            let card = match self.cards.birthday_card(&patient.name, "").await {
                Ok(text) => text,
                Err(e) => {
                    warn!("card generation failed for patient {} ({}); using default card", patient.id, e);
                    default_birthday_card(&patient.name)
                }
            };
            match self.gateway.send(&patient.phone, &card).await {
                SendOutcome::Sent => {
                    if let Err(e) = self.store.set_birthday_card_year(patient.id, year) {
                        error!("sent but failed to mark card year for patient {}: {}", patient.id, e);
                    } else {
                        sent += 1;
                    }
                }
                outcome => {
                    warn!("birthday card to patient {} not confirmed ({:?})", patient.id, outcome);
                }
            }
        }
        Ok(sent)
    }

    /// Staff-triggered "send reminder now" for one appointment. Shares the
    /// sweep's confirm-then-mark rule; racing the sweep can at worst send
    /// the reminder twice.
    pub async fn send_reminder_now(&self, appointment_id: Uuid) -> BotResult<SendOutcome> {
        let appointment = self.store.appointment(appointment_id)?;
        let patient = self.store.patient(appointment.patient_id)?;
        let message = render_manual_reminder(&patient, &appointment);
        let outcome = self.gateway.send(&patient.phone, &message).await;
        if outcome.is_sent() {
            self.store.mark_reminded(appointment.id)?;
        }
        Ok(outcome)
    }
}

fn calendar_footer(title: String, appointment: &Appointment) -> String {
    let link = google_calendar_link(
        &title,
        appointment.date,
        appointment.description.as_deref().unwrap_or("Medical Appointment"),
    );
    format!("\n\nAdd to Google Calendar: {}", link)
}

fn render_sweep_reminder(patient: &Patient, appointment: &Appointment) -> String {
    let mut message = format!(
        "Hello {}, this is a reminder for your appointment tomorrow at {}.",
        patient.name,
        appointment.date.format("%H:%M")
    );
    message.push_str(&calendar_footer(format!("Medical Appointment - {}", patient.name), appointment));
    message
}

fn render_manual_reminder(patient: &Patient, appointment: &Appointment) -> String {
    let mut message = format!(
        "Hello {}, 提提您 {} 要覆診啊！",
        patient.name,
        appointment.date.format("%m月%d日 %H:%M")
    );
    if let Some(description) = &appointment.description {
        message.push_str(&format!(" 備註: {}", description));
    }
    message.push_str(&calendar_footer(format!("覆診Appointment - {}", patient.name), appointment));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use healthbot::FieldCipher;
    use models::errors::BotError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Gateway stub: pops scripted outcomes (defaulting to `Sent`) and
    /// records every attempted (phone, message) pair.
    struct ScriptedGateway {
        script: Mutex<VecDeque<SendOutcome>>,
        attempts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedGateway {
        fn always_sent() -> Arc<Self> {
            Arc::new(ScriptedGateway {
                script: Mutex::new(VecDeque::new()),
                attempts: Mutex::new(Vec::new()),
            })
        }

        fn scripted(outcomes: Vec<SendOutcome>) -> Arc<Self> {
            Arc::new(ScriptedGateway {
                script: Mutex::new(outcomes.into()),
                attempts: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> Vec<(String, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageGateway for ScriptedGateway {
        async fn send(&self, phone: &str, message: &str) -> SendOutcome {
            self.attempts.lock().unwrap().push((phone.to_string(), message.to_string()));
            self.script.lock().unwrap().pop_front().unwrap_or(SendOutcome::Sent)
        }
    }

    struct StubCards {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl CardProvider for StubCards {
        async fn birthday_card(&self, patient_name: &str, _description: &str) -> BotResult<String> {
            match &self.response {
                Ok(text) => Ok(format!("{} {}", text, patient_name)),
                Err(()) => Err(BotError::Provider("stubbed outage".to_string())),
            }
        }
    }

    fn fixture(gateway: Arc<ScriptedGateway>, cards_ok: bool) -> (TempDir, Arc<RecordStore>, Jobs) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(dir.path(), FieldCipher::new(Some([1u8; 32]))).unwrap());
        let cards: Arc<dyn CardProvider> = Arc::new(StubCards {
            response: if cards_ok { Ok("生日快樂".to_string()) } else { Err(()) },
        });
        let jobs = Jobs::new(store.clone(), gateway, cards);
        (dir, store, jobs)
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 23).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    fn tomorrow_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn sweep_sends_once_and_is_idempotent() {
        let gateway = ScriptedGateway::always_sent();
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        let p = store.create_patient("陳小明", "85291234567", None).unwrap();
        let a = store.add_appointment(p.id, tomorrow_at(9, 30), Some("覆診")).unwrap();

        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 1);
        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 0);

        let attempts = gateway.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].0, "85291234567");
        assert!(attempts[0].1.contains("Hello 陳小明"));
        assert!(attempts[0].1.contains("09:30"));
        assert!(attempts[0].1.contains("calendar.google.com"));
        assert!(store.appointment(a.id).unwrap().reminded);
    }

    #[tokio::test]
    async fn transport_failure_leaves_flag_clear_for_retry() {
        let gateway = ScriptedGateway::scripted(vec![SendOutcome::TransportFailure {
            reason: "timeout".to_string(),
        }]);
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        let p = store.create_patient("A", "85291234567", None).unwrap();
        let a = store.add_appointment(p.id, tomorrow_at(9, 30), None).unwrap();

        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 0);
        assert!(!store.appointment(a.id).unwrap().reminded);

        // Next sweep retries and the default outcome (Sent) confirms it.
        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 1);
        assert!(store.appointment(a.id).unwrap().reminded);
        assert_eq!(gateway.attempts().len(), 2);
    }

    #[tokio::test]
    async fn gateway_rejection_is_also_retried_later() {
        let gateway = ScriptedGateway::scripted(vec![SendOutcome::RejectedByGateway {
            code: 503,
            reason: "session down".to_string(),
        }]);
        let (_dir, store, jobs) = fixture(gateway, true);
        let p = store.create_patient("A", "85291234567", None).unwrap();
        let a = store.add_appointment(p.id, tomorrow_at(9, 30), None).unwrap();

        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 0);
        assert!(!store.appointment(a.id).unwrap().reminded);
    }

    #[tokio::test]
    async fn one_failing_recipient_does_not_abort_the_batch() {
        let gateway = ScriptedGateway::scripted(vec![
            SendOutcome::TransportFailure { reason: "timeout".to_string() },
            SendOutcome::Sent,
        ]);
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        let p1 = store.create_patient("A", "85291234567", None).unwrap();
        let p2 = store.create_patient("B", "85291234568", None).unwrap();
        let a1 = store.add_appointment(p1.id, tomorrow_at(9, 0), None).unwrap();
        let a2 = store.add_appointment(p2.id, tomorrow_at(10, 0), None).unwrap();

        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 1);
        assert_eq!(gateway.attempts().len(), 2);
        assert!(!store.appointment(a1.id).unwrap().reminded);
        assert!(store.appointment(a2.id).unwrap().reminded);
    }

    #[tokio::test]
    async fn sweep_ignores_appointments_outside_tomorrow() {
        let gateway = ScriptedGateway::always_sent();
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        let p = store.create_patient("A", "85291234567", None).unwrap();
        // Today and the day after tomorrow: neither is due.
        store
            .add_appointment(p.id, NaiveDate::from_ymd_opt(2026, 8, 23).unwrap().and_hms_opt(15, 0, 0).unwrap(), None)
            .unwrap();
        store
            .add_appointment(p.id, NaiveDate::from_ymd_opt(2026, 8, 25).unwrap().and_hms_opt(9, 0, 0).unwrap(), None)
            .unwrap();

        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 0);
        assert!(gateway.attempts().is_empty());
    }

    #[tokio::test]
    async fn diary_nudge_goes_to_everyone_every_run() {
        let gateway = ScriptedGateway::always_sent();
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        store.create_patient("A", "85291234567", None).unwrap();
        store.create_patient("B", "85291234568", None).unwrap();

        assert_eq!(jobs.run_diary_nudge().await.unwrap(), 2);
        assert_eq!(jobs.run_diary_nudge().await.unwrap(), 2);
        let attempts = gateway.attempts();
        assert_eq!(attempts.len(), 4);
        assert!(attempts.iter().all(|(_, m)| m == DIARY_NUDGE));
    }

    #[tokio::test]
    async fn birthday_card_goes_out_at_most_once_per_year() {
        let gateway = ScriptedGateway::always_sent();
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        let p = store
            .create_patient("小明", "85291234567", NaiveDate::from_ymd_opt(2015, 8, 23))
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert_eq!(jobs.run_birthday_check(today).await.unwrap(), 1);
        assert_eq!(jobs.run_birthday_check(today).await.unwrap(), 0);
        assert_eq!(jobs.run_birthday_check(today).await.unwrap(), 0);
        assert_eq!(gateway.attempts().len(), 1);
        assert_eq!(store.patient(p.id).unwrap().birthday_card_sent_year, Some(2026));

        // The marker resets implicitly by year comparison.
        let next_year = NaiveDate::from_ymd_opt(2027, 8, 23).unwrap();
        assert_eq!(jobs.run_birthday_check(next_year).await.unwrap(), 1);
        assert_eq!(store.patient(p.id).unwrap().birthday_card_sent_year, Some(2027));
    }

    #[tokio::test]
    async fn birthday_send_failure_keeps_the_year_marker_clear() {
        let gateway = ScriptedGateway::scripted(vec![SendOutcome::TransportFailure {
            reason: "timeout".to_string(),
        }]);
        let (_dir, store, jobs) = fixture(gateway, true);
        let p = store
            .create_patient("小明", "85291234567", NaiveDate::from_ymd_opt(2015, 8, 23))
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert_eq!(jobs.run_birthday_check(today).await.unwrap(), 0);
        assert_eq!(store.patient(p.id).unwrap().birthday_card_sent_year, None);
    }

    #[tokio::test]
    async fn provider_outage_falls_back_to_the_default_card() {
        let gateway = ScriptedGateway::always_sent();
        let (_dir, store, jobs) = fixture(gateway.clone(), false);
        store
            .create_patient("小明", "85291234567", NaiveDate::from_ymd_opt(2015, 8, 23))
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert_eq!(jobs.run_birthday_check(today).await.unwrap(), 1);
        let attempts = gateway.attempts();
        assert!(attempts[0].1.contains("小明"));
        assert!(attempts[0].1.contains("生日快樂"));
    }

    #[tokio::test]
    async fn manual_trigger_then_sweep_sends_only_once() {
        let gateway = ScriptedGateway::always_sent();
        let (_dir, store, jobs) = fixture(gateway.clone(), true);
        let p = store.create_patient("陳小明", "85291234567", None).unwrap();
        let a = store.add_appointment(p.id, tomorrow_at(9, 30), Some("帶定藥物")).unwrap();

        let outcome = jobs.send_reminder_now(a.id).await.unwrap();
        assert!(outcome.is_sent());
        assert!(store.appointment(a.id).unwrap().reminded);

        assert_eq!(jobs.run_reminder_sweep(now()).await.unwrap(), 0);
        let attempts = gateway.attempts();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].1.contains("提提您"));
        assert!(attempts[0].1.contains("備註: 帶定藥物"));
    }
}
