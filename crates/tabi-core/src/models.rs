//! Core data models used throughout Tabi.
//!
//! These types mirror the JSON documents exchanged between the client, the
//! HTTP server, and the persisted trip document. Field names serialize in
//! camelCase and absent optional fields are omitted, so a value written by
//! one side reads back identically on the other.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the traveller moves on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Flight,
    Train,
    Bus,
    Arrival,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Flight => "flight",
            TransportKind::Train => "train",
            TransportKind::Bus => "bus",
            TransportKind::Arrival => "arrival",
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flight" => Ok(TransportKind::Flight),
            "train" => Ok(TransportKind::Train),
            "bus" => Ok(TransportKind::Bus),
            "arrival" => Ok(TransportKind::Arrival),
            other => Err(format!(
                "unknown transport type '{}': expected flight, train, bus, or arrival",
                other
            )),
        }
    }
}

/// Transportation details for a day. Only `type` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transportation {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passengers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Transportation {
    /// A transportation record with only its kind set.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            departure: None,
            arrival: None,
            route: None,
            airline: None,
            operator: None,
            bus_number: None,
            ticket_reference: None,
            passengers: None,
            booking_url: None,
            notes: None,
        }
    }
}

/// A second booking held for the same stay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateBooking {
    pub source: String,
    pub reference: String,
    pub room_type: String,
    pub breakfast: bool,
}

/// An extra room booked for part of a stay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraRoom {
    pub dates: String,
    pub reference: String,
    pub pin: String,
}

/// Structured accommodation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccommodationDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakfast: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepaid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nights: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_booking: Option<AlternateBooking>,
    #[serde(rename = "hannaRoom", default, skip_serializing_if = "Option::is_none")]
    pub extra_room: Option<ExtraRoom>,
}

impl AccommodationDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            booking_source: None,
            confirmation_number: None,
            pin: None,
            room_type: None,
            breakfast: None,
            prepaid: None,
            nights: None,
            check_in: None,
            check_out: None,
            beds: None,
            notes: None,
            alternate_booking: None,
            extra_room: None,
        }
    }
}

/// Where the traveller sleeps: a plain label or a full booking record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Accommodation {
    Text(String),
    Details(AccommodationDetails),
}

impl Accommodation {
    /// Display name regardless of representation.
    pub fn name(&self) -> &str {
        match self {
            Accommodation::Text(s) => s,
            Accommodation::Details(d) => &d.name,
        }
    }
}

/// One day of the itinerary. `date` is the identity within a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryDay {
    pub date: String,
    pub location: String,
    /// `null` on the wire when absent.
    #[serde(default)]
    pub transportation: Option<Transportation>,
    #[serde(default)]
    pub accommodation: Option<Accommodation>,
}

/// Trip-level metadata from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub flight_booking_ref: String,
}

/// The catalog file format: trip metadata plus the fixed itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripData {
    pub trip: Trip,
    pub itinerary: Vec<ItineraryDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
}

impl AttachmentKind {
    /// Classify a MIME type. Only `image/*` and `application/pdf` qualify.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let ct = content_type.trim().to_ascii_lowercase();
        if ct == "application/pdf" {
            Some(AttachmentKind::Pdf)
        } else if ct.starts_with("image/") {
            Some(AttachmentKind::Image)
        } else {
            None
        }
    }
}

/// A file attached to a day. Immutable once created; only removal is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// RFC 3339 text, kept verbatim so stored documents round-trip.
    pub added_at: String,
}

/// User-entered annotation data for one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayUserData {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Annotation data keyed by day date. Ordered so serialization is stable.
pub type UserDataMap = BTreeMap<String, DayUserData>;

/// The synchronized part of the trip: user-added days and all annotations.
///
/// This is the body of `GET /trip` and `POST /trip`, and what a remote push
/// carries in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSnapshot {
    #[serde(default)]
    pub custom_days: Vec<ItineraryDay>,
    #[serde(default)]
    pub user_data_map: UserDataMap,
}

/// The persisted remote document: one snapshot per user identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDocument {
    pub user_id: String,
    pub custom_days: Vec<ItineraryDay>,
    pub user_data_map: UserDataMap,
    pub updated_at: DateTime<Utc>,
}

impl TripDocument {
    pub fn snapshot(&self) -> TripSnapshot {
        TripSnapshot {
            custom_days: self.custom_days.clone(),
            user_data_map: self.user_data_map.clone(),
        }
    }
}
