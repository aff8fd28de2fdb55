//! Itinerary client commands (`tabi days`, `tabi show`, `tabi note`, ...).
//!
//! Each command opens a [`SyncCoordinator`] over the local store, reconciles
//! with the remote (a failure is reported, not fatal), applies at most one
//! change, and flushes the pending push before returning.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use tabi_core::catalog::{format_date, format_full_date, transport_icon};
use tabi_core::lookup::{accommodation_map_url, location_map_url, location_photo};
use tabi_core::models::{
    Accommodation, AccommodationDetails, ItineraryDay, TransportKind, Transportation,
};

use crate::config::Config;
use crate::local::FileLocalStore;
use crate::remote::{HttpRemote, HttpUploader};
use crate::sync::{SyncCoordinator, SyncStatus};

/// Arguments of `tabi add-day`.
#[derive(Debug, Clone)]
pub struct NewDay {
    pub date: String,
    pub location: String,
    pub transport: Option<TransportKind>,
    pub departure: Option<String>,
    pub route: Option<String>,
    pub hotel: Option<String>,
    pub nights: Option<u32>,
}

impl NewDay {
    pub fn into_day(self) -> ItineraryDay {
        let transportation = self.transport.map(|kind| Transportation {
            departure: self.departure,
            route: self.route,
            ..Transportation::new(kind)
        });
        let accommodation = self.hotel.map(|name| match self.nights {
            Some(nights) => Accommodation::Details(AccommodationDetails {
                nights: Some(nights),
                ..AccommodationDetails::named(name)
            }),
            None => Accommodation::Text(name),
        });
        ItineraryDay {
            date: self.date,
            location: self.location,
            transportation,
            accommodation,
        }
    }
}

/// Open the coordinator and reconcile once.
pub async fn open_coordinator(config: &Config) -> Result<SyncCoordinator> {
    let catalog = Arc::new(config.load_catalog()?);
    let local = Arc::new(FileLocalStore::new(&config.sync.local_dir));
    let remote = Arc::new(HttpRemote::from_config(&config.sync)?);
    let sync = SyncCoordinator::open(catalog, local, remote, config.sync.debounce())?;

    if let Err(e) = sync.reconcile().await {
        eprintln!("Warning: working offline ({})", e);
    }
    Ok(sync)
}

async fn finish(sync: &SyncCoordinator) -> Result<()> {
    if let Err(e) = sync.flush().await {
        eprintln!("Warning: saved locally, remote sync failed ({})", e);
    }
    Ok(())
}

pub async fn run_days(config: &Config) -> Result<()> {
    let sync = open_coordinator(config).await?;
    let trip = sync.catalog().trip();
    println!("{} ({} to {})", trip.name, trip.start_date, trip.end_date);
    println!();

    for (i, day) in sync.days().iter().enumerate() {
        let data = sync.user_data(&day.date);
        let mut marks = String::new();
        if !data.notes.is_empty() {
            marks.push_str(" [notes]");
        }
        if !data.attachments.is_empty() {
            marks.push_str(&format!(" [{} files]", data.attachments.len()));
        }
        println!(
            "{:>3}  {}  {:<14} {}{}",
            i,
            day.date,
            format_date(&day.date),
            day.location,
            marks
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, date: &str) -> Result<()> {
    let sync = open_coordinator(config).await?;
    let days = sync.days();
    let Some(day) = days.iter().find(|d| d.date == date) else {
        bail!("no day dated {} in this trip", date);
    };
    let data = sync.user_data(date);

    println!("--- {} ---", format_full_date(&day.date));
    println!("location:     {}", day.location);
    println!("photo:        {}", location_photo(&day.location));
    println!("map:          {}", location_map_url(&day.location));

    if let Some(t) = &day.transportation {
        println!();
        println!("--- Transportation ({}) ---", transport_icon(Some(t.kind)));
        println!("type:         {}", t.kind.as_str());
        let fields = [
            ("departure", &t.departure),
            ("arrival", &t.arrival),
            ("route", &t.route),
            ("airline", &t.airline),
            ("operator", &t.operator),
            ("bus", &t.bus_number),
            ("ticket", &t.ticket_reference),
            ("booking", &t.booking_url),
            ("notes", &t.notes),
        ];
        for (label, value) in fields {
            if let Some(v) = value {
                println!("{:<13} {}", format!("{}:", label), v);
            }
        }
        if let Some(p) = t.passengers {
            println!("passengers:   {}", p);
        }
    }

    if let Some(acc) = &day.accommodation {
        println!();
        println!("--- Accommodation ---");
        println!("name:         {}", acc.name());
        if let Accommodation::Details(d) = acc {
            if let Some(ref c) = d.confirmation_number {
                println!("confirmation: {}", c);
            }
            if let Some(n) = d.nights {
                println!("nights:       {}", n);
            }
            if let (Some(i), Some(o)) = (&d.check_in, &d.check_out) {
                println!("check-in/out: {} / {}", i, o);
            }
        }
        if let Some(url) = accommodation_map_url(acc.name()) {
            println!("map:          {}", url);
        }
    }

    println!();
    println!("--- Notes ---");
    if data.notes.is_empty() {
        println!("(none)");
    } else {
        println!("{}", data.notes);
    }

    println!();
    println!("--- Attachments ({}) ---", data.attachments.len());
    for a in &data.attachments {
        println!("[{}] {} ({:?})", a.id, a.name, a.kind);
        println!("    {}", a.url);
    }
    Ok(())
}

pub async fn run_add_day(config: &Config, day: NewDay) -> Result<()> {
    let sync = open_coordinator(config).await?;
    let day = day.into_day();
    let date = day.date.clone();
    let index = sync.add_day(day)?;
    println!("Added {} at position {}.", format_full_date(&date), index);
    finish(&sync).await
}

pub async fn run_note(config: &Config, date: &str, text: &str) -> Result<()> {
    let sync = open_coordinator(config).await?;
    sync.set_notes(date, text)?;
    println!("Notes saved for {}.", format_date(date));
    finish(&sync).await
}

pub async fn run_attach(config: &Config, date: &str, file: &Path) -> Result<()> {
    let sync = open_coordinator(config).await?;
    // Fail on an unknown day before spending an upload.
    if !sync.days().iter().any(|d| d.date == date) {
        bail!("no day dated {} in this trip", date);
    }

    let uploader = HttpUploader::from_config(&config.sync)?;
    let (stored, kind) = uploader.upload_path(file).await?;
    let attachment = sync.add_attachment(date, stored, kind)?;
    println!("Attached {} as {}.", attachment.name, attachment.id);
    println!("    {}", attachment.url);
    finish(&sync).await
}

pub async fn run_detach(config: &Config, date: &str, id: &str) -> Result<()> {
    let sync = open_coordinator(config).await?;
    let before = sync.user_data(date).attachments.len();
    sync.remove_attachment(date, id)?;
    if sync.user_data(date).attachments.len() == before {
        println!("No attachment {} on {}.", id, format_date(date));
    } else {
        println!("Removed attachment {}.", id);
    }
    finish(&sync).await
}

/// Reconcile, then push the merged state.
pub async fn run_sync(config: &Config) -> Result<()> {
    let sync = open_coordinator(config).await?;
    if let SyncStatus::SyncFailed(msg) = sync.status() {
        bail!("remote unavailable: {}", msg);
    }
    sync.push_now().await?;
    let snapshot = sync.snapshot();
    println!(
        "Synced: {} custom days, {} annotated days.",
        snapshot.custom_days.len(),
        snapshot.user_data_map.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_day_builds_optional_parts() {
        let bare = NewDay {
            date: "2025-03-10".into(),
            location: "Kyoto".into(),
            transport: None,
            departure: None,
            route: None,
            hotel: None,
            nights: None,
        };
        let day = bare.clone().into_day();
        assert!(day.transportation.is_none());
        assert!(day.accommodation.is_none());

        let full = NewDay {
            transport: Some(TransportKind::Train),
            route: Some("Tokyo → Kyoto".into()),
            hotel: Some("Hotel Kanra".into()),
            nights: Some(2),
            ..bare
        }
        .into_day();
        let t = full.transportation.unwrap();
        assert_eq!(t.kind, TransportKind::Train);
        assert_eq!(t.route.as_deref(), Some("Tokyo → Kyoto"));
        match full.accommodation.unwrap() {
            Accommodation::Details(d) => {
                assert_eq!(d.name, "Hotel Kanra");
                assert_eq!(d.nights, Some(2));
            }
            other => panic!("expected details, got {:?}", other),
        }
    }
}
