//! The static itinerary catalog.
//!
//! The catalog is the immutable, bundled list of itinerary days plus trip
//! metadata. It is compiled into the binary from `data/japan-trip.json` and
//! can be replaced by a file at load time. Everything else reads it; nothing
//! writes it. User-added days live in [`TripState`](crate::state::TripState)
//! and are merged in by [`Catalog::days`].

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::models::{ItineraryDay, TransportKind, Trip, TripData};

const BUNDLED: &str = include_str!("../data/japan-trip.json");

/// Read-only trip metadata and itinerary.
#[derive(Debug, Clone)]
pub struct Catalog {
    trip: Trip,
    itinerary: Vec<ItineraryDay>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED).context("bundled itinerary is invalid")
    }

    /// Parse a catalog from its JSON file format.
    pub fn from_json(json: &str) -> Result<Self> {
        let data: TripData = serde_json::from_str(json).context("failed to parse itinerary JSON")?;
        Ok(Self::from_data(data))
    }

    pub fn from_data(data: TripData) -> Self {
        Self {
            trip: data.trip,
            itinerary: data.itinerary,
        }
    }

    pub fn trip(&self) -> &Trip {
        &self.trip
    }

    pub fn itinerary(&self) -> &[ItineraryDay] {
        &self.itinerary
    }

    pub fn contains_date(&self, date: &str) -> bool {
        self.itinerary.iter().any(|d| d.date == date)
    }

    /// Catalog days merged with user-added days, sorted by date.
    ///
    /// The sort is stable and catalog days come first, so two entries on
    /// the same date keep catalog-before-custom order.
    pub fn days(&self, custom_days: &[ItineraryDay]) -> Vec<ItineraryDay> {
        let mut days: Vec<ItineraryDay> = self
            .itinerary
            .iter()
            .chain(custom_days.iter())
            .cloned()
            .collect();
        days.sort_by(|a, b| a.date.cmp(&b.date));
        days
    }
}

/// Parse an ISO `YYYY-MM-DD` day date.
pub fn parse_day_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Short card label, e.g. `Mon, Mar 10`. Unparseable dates are returned as-is.
pub fn format_date(date: &str) -> String {
    parse_day_date(date)
        .map(|d| d.format("%a, %b %-d").to_string())
        .unwrap_or_else(|| date.to_string())
}

/// Long detail label, e.g. `Monday, March 10, 2025`.
pub fn format_full_date(date: &str) -> String {
    parse_day_date(date)
        .map(|d| d.format("%A, %B %-d, %Y").to_string())
        .unwrap_or_else(|| date.to_string())
}

/// Icon name for a transport kind.
pub fn transport_icon(kind: Option<TransportKind>) -> &'static str {
    match kind {
        Some(TransportKind::Flight) => "plane",
        Some(TransportKind::Train) => "train",
        Some(TransportKind::Bus) => "bus",
        Some(TransportKind::Arrival) => "plane-arrival",
        None => "circle",
    }
}
