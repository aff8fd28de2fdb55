//! Trip state and the rules for changing and merging it.
//!
//! [`TripState`] is the client's merged view of everything a user can
//! change: the days they added and the notes/attachments per day. It is a
//! plain value; the sync coordinator in the `tabi` crate decides when to
//! persist it and where.
//!
//! # Mutations
//!
//! [`TripState::apply`] validates a [`Mutation`] against the catalog and
//! applies it in place. Callers that must not expose a half-applied change
//! clone first and swap on success.
//!
//! # Merge
//!
//! [`TripState::merge_remote`] folds a remote snapshot into local state with
//! remote-wins semantics at field-group granularity: a remote day replaces
//! the local day with the same date as a whole, and a remote user-data entry
//! replaces the local entry for that date as a whole. Entries that exist only
//! locally are kept. No timestamps are compared.

use thiserror::Error;

use crate::catalog::{parse_day_date, Catalog};
use crate::models::{Attachment, DayUserData, ItineraryDay, TripSnapshot, UserDataMap};

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("location must not be empty")]
    EmptyLocation,

    #[error("a day for {0} already exists")]
    DuplicateDay(String),

    #[error("no day for {0} in the itinerary")]
    UnknownDay(String),

    #[error("attachment {id} already exists on {date}")]
    DuplicateAttachment { date: String, id: String },
}

/// A single user change.
#[derive(Debug, Clone)]
pub enum Mutation {
    SetNotes { date: String, notes: String },
    AddAttachment { date: String, attachment: Attachment },
    RemoveAttachment { date: String, id: String },
    AddDay(ItineraryDay),
}

/// What [`TripState::apply`] changed, for callers that track selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    UserData { date: String },
    DayAdded { date: String },
    /// The mutation matched nothing (removing an unknown attachment id).
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripState {
    pub custom_days: Vec<ItineraryDay>,
    pub user_data_map: UserDataMap,
}

impl TripState {
    pub fn from_snapshot(snapshot: TripSnapshot) -> Self {
        Self {
            custom_days: snapshot.custom_days,
            user_data_map: snapshot.user_data_map,
        }
    }

    pub fn snapshot(&self) -> TripSnapshot {
        TripSnapshot {
            custom_days: self.custom_days.clone(),
            user_data_map: self.user_data_map.clone(),
        }
    }

    /// User data for a day; an absent entry reads as the default.
    pub fn user_data(&self, date: &str) -> DayUserData {
        self.user_data_map.get(date).cloned().unwrap_or_default()
    }

    /// Catalog days plus custom days, date-sorted.
    pub fn days(&self, catalog: &Catalog) -> Vec<ItineraryDay> {
        catalog.days(&self.custom_days)
    }

    pub fn has_day(&self, catalog: &Catalog, date: &str) -> bool {
        catalog.contains_date(date) || self.custom_days.iter().any(|d| d.date == date)
    }

    /// Validate and apply one mutation in place.
    ///
    /// On error the state is unchanged.
    pub fn apply(&mut self, catalog: &Catalog, mutation: Mutation) -> Result<Applied, StateError> {
        match mutation {
            Mutation::SetNotes { date, notes } => {
                self.require_day(catalog, &date)?;
                self.user_data_map.entry(date.clone()).or_default().notes = notes;
                Ok(Applied::UserData { date })
            }
            Mutation::AddAttachment { date, attachment } => {
                self.require_day(catalog, &date)?;
                let entry = self.user_data_map.entry(date.clone()).or_default();
                if entry.attachments.iter().any(|a| a.id == attachment.id) {
                    return Err(StateError::DuplicateAttachment {
                        date,
                        id: attachment.id,
                    });
                }
                entry.attachments.push(attachment);
                Ok(Applied::UserData { date })
            }
            Mutation::RemoveAttachment { date, id } => {
                self.require_day(catalog, &date)?;
                let Some(entry) = self.user_data_map.get_mut(&date) else {
                    return Ok(Applied::Unchanged);
                };
                let before = entry.attachments.len();
                entry.attachments.retain(|a| a.id != id);
                if entry.attachments.len() == before {
                    Ok(Applied::Unchanged)
                } else {
                    Ok(Applied::UserData { date })
                }
            }
            Mutation::AddDay(day) => {
                if parse_day_date(&day.date).is_none() {
                    return Err(StateError::InvalidDate(day.date));
                }
                if day.location.trim().is_empty() {
                    return Err(StateError::EmptyLocation);
                }
                if self.has_day(catalog, &day.date) {
                    return Err(StateError::DuplicateDay(day.date));
                }
                let date = day.date.clone();
                self.custom_days.push(day);
                self.user_data_map.insert(date.clone(), DayUserData::default());
                Ok(Applied::DayAdded { date })
            }
        }
    }

    /// Fold a remote snapshot into this state, remote winning per entry.
    pub fn merge_remote(&mut self, remote: TripSnapshot) {
        for remote_day in remote.custom_days {
            match self
                .custom_days
                .iter_mut()
                .find(|d| d.date == remote_day.date)
            {
                Some(local) => *local = remote_day,
                None => self.custom_days.push(remote_day),
            }
        }
        self.user_data_map.extend(remote.user_data_map);
    }

    fn require_day(&self, catalog: &Catalog, date: &str) -> Result<(), StateError> {
        if self.has_day(catalog, date) {
            Ok(())
        } else {
            Err(StateError::UnknownDay(date.to_string()))
        }
    }
}

/// Index of the day with `date` in a date-sorted day list.
pub fn position_of(days: &[ItineraryDay], date: &str) -> Option<usize> {
    days.iter().position(|d| d.date == date)
}

/// Next attachment id for a day: the timestamp, bumped until unused.
pub fn next_attachment_id(existing: &[Attachment], now_millis: i64) -> String {
    let mut candidate = now_millis;
    while existing.iter().any(|a| a.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}
