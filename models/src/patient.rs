// models/src/patient.rs

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A clinic patient, decrypted for in-process use.
///
/// `name` and `phone` are stored encrypted; `phone_digest` is the blind
/// index over the canonical plaintext phone and is the only column inbound
/// lookups ever touch. The digest is derived, never set independently of
/// the phone — the record store owns that pairing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    /// Canonical contact address: 11 digits, leading 852.
    pub phone: String,
    /// SHA-256 hex of the canonical phone. Unique across patients.
    pub phone_digest: String,
    pub birthdate: Option<NaiveDate>,
    /// Last calendar year a birthday card was confirmed sent.
    pub birthday_card_sent_year: Option<i32>,
}

impl Patient {
    /// Whether `today` is this patient's celebration day.
    ///
    /// Feb-29 birthdates celebrate on Feb 28 in non-leap years.
    pub fn is_birthday(&self, today: NaiveDate) -> bool {
        let Some(birth) = self.birthdate else {
            return false;
        };
        if birth.month() == today.month() && birth.day() == today.day() {
            return true;
        }
        birth.month() == 2
            && birth.day() == 29
            && !is_leap_year(today.year())
            && today.month() == 2
            && today.day() == 28
    }

    /// True when a card may still be sent this year.
    pub fn birthday_card_pending(&self, year: i32) -> bool {
        self.birthday_card_sent_year != Some(year)
    }
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}
