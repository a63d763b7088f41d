//! Parcel allocation: size classification, open-batch lookup, full detection
//! and successor creation.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::ledger::{Ledger, NewBatch, NewParcel};
use super::lifecycle;
use super::{
    AllocatorConfig, Allocation, Batch, BatchStatus, ConfirmParcelRequest, DispatchError, Parcel,
    SizeClass,
};

/// Candidate names for an auto-created batch, in the order they are tried:
/// `Auto-HHMMSS (class)`, then `Auto-HHMMSS-2 (class)`, `Auto-HHMMSS-3 (class)`...
pub fn batch_name_candidates(
    now: DateTime<Utc>,
    class: SizeClass,
    attempts: u32,
) -> impl Iterator<Item = String> {
    let stamp = now.format("%H%M%S").to_string();
    (1..=attempts).map(move |n| {
        if n == 1 {
            format!("Auto-{} ({})", stamp, class)
        } else {
            format!("Auto-{}-{} ({})", stamp, n, class)
        }
    })
}

/// First candidate name for which `exists` says no.
pub fn pick_batch_name<F>(
    now: DateTime<Utc>,
    class: SizeClass,
    attempts: u32,
    mut exists: F,
) -> Result<String, DispatchError>
where
    F: FnMut(&str) -> Result<bool, DispatchError>,
{
    for candidate in batch_name_candidates(now, class, attempts) {
        if !exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(DispatchError::Conflict(format!(
        "no free batch name for {} after {} attempts",
        class, attempts
    )))
}

fn validate_request(request: &ConfirmParcelRequest) -> Result<(), DispatchError> {
    if !(request.volume.is_finite() && request.volume >= 0.0) {
        return Err(DispatchError::Validation(
            "volume must be a non-negative number".to_string(),
        ));
    }
    if !(request.weight.is_finite() && request.weight >= 0.0) {
        return Err(DispatchError::Validation(
            "weight must be a non-negative number".to_string(),
        ));
    }
    if request.external_id.trim().is_empty() {
        return Err(DispatchError::Validation(
            "external_id cannot be empty".to_string(),
        ));
    }
    if request.delivery_address.trim().is_empty() {
        return Err(DispatchError::Validation(
            "delivery_address cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Create a fresh `InProgress` batch of `class` and register it as open.
fn open_new_batch<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &AllocatorConfig,
    class: SizeClass,
    max_volume: f64,
    now: DateTime<Utc>,
) -> Result<Batch, DispatchError> {
    let name = pick_batch_name(now, class, config.max_name_attempts, |name| {
        ledger.batch_name_exists(name)
    })?;
    let batch = ledger.insert_batch(NewBatch {
        name,
        size_class: class,
        max_volume,
        full_threshold_percent: config.full_threshold_percent,
        created_at: now,
    })?;
    ledger.set_open_batch(class, batch.id)?;
    Ok(batch)
}

/// The batch that should receive the next parcel of `class`, if one exists.
///
/// The open-batch entry is trusted only while it points at an `InProgress`
/// batch of the same class; otherwise it is dropped and the oldest
/// `InProgress` batch of the class takes over.
fn open_target<L: Ledger + ?Sized>(
    ledger: &mut L,
    class: SizeClass,
) -> Result<Option<Batch>, DispatchError> {
    if let Some(id) = ledger.open_batch(class)? {
        match ledger.batch(id)? {
            Some(batch) if batch.status == BatchStatus::InProgress && batch.size_class == class => {
                return Ok(Some(batch));
            }
            _ => ledger.clear_open_batch(id)?,
        }
    }

    match ledger.oldest_in_progress(class)? {
        Some(batch) => {
            ledger.set_open_batch(class, batch.id)?;
            Ok(Some(batch))
        }
        None => Ok(None),
    }
}

/// Route a confirmed parcel into the open batch of its size class.
///
/// When the parcel pushes the batch to its full threshold the batch becomes
/// `Full` and a successor with the same capacity is opened in its place.
pub fn allocate<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &AllocatorConfig,
    request: ConfirmParcelRequest,
    now: DateTime<Utc>,
) -> Result<Allocation, DispatchError> {
    validate_request(&request)?;

    let class = config.classify(request.volume);
    let (mut batch, created_batch) = match open_target(ledger, class)? {
        Some(batch) => (batch, false),
        None => {
            let capacity = config.default_capacity(class);
            (open_new_batch(ledger, config, class, capacity, now)?, true)
        }
    };

    let parcel = ledger.insert_parcel(NewParcel {
        external_id: request.external_id.trim().to_string(),
        dimensions: request.dimensions,
        weight: request.weight,
        volume: request.volume,
        image_name: request.image_name,
        delivery_address: request.delivery_address.trim().to_string(),
        created_by: request.created_by,
        batch_id: batch.id,
        created_at: now,
    })?;

    batch.current_volume += parcel.volume;

    let mut successor = None;
    let became_full = batch.is_over_threshold();
    if became_full {
        batch.status = BatchStatus::Full;
        ledger.clear_open_batch(batch.id)?;
        successor = Some(open_new_batch(ledger, config, class, batch.max_volume, now)?);
        debug!(
            batch_id = batch.id,
            load_percent = batch.load_percent(),
            "Batch reached full threshold"
        );
    }
    ledger.save_batch(&batch)?;

    Ok(Allocation {
        parcel,
        batch,
        created_batch,
        became_full,
        successor,
    })
}

/// Delete parcels by id. Each parcel's volume is subtracted from its batch
/// unless the batch is already `Completed`; volumes never go below zero.
pub fn release_parcels<L: Ledger + ?Sized>(
    ledger: &mut L,
    ids: &[i64],
) -> Result<Vec<Parcel>, DispatchError> {
    let ids = lifecycle::distinct_ids(ids);
    let mut removed = Vec::with_capacity(ids.len());
    for id in ids {
        let parcel = ledger.require_parcel(id)?;
        let mut batch = ledger.require_batch(parcel.batch_id)?;
        if batch.status != BatchStatus::Completed {
            batch.current_volume = (batch.current_volume - parcel.volume).max(0.0);
            ledger.save_batch(&batch)?;
        }
        ledger.delete_parcel(id)?;
        removed.push(parcel);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_name_candidates() {
        let names: Vec<String> = batch_name_candidates(at(9, 5, 7), SizeClass::Medium, 3).collect();
        assert_eq!(
            names,
            vec![
                "Auto-090507 (medium)",
                "Auto-090507-2 (medium)",
                "Auto-090507-3 (medium)",
            ]
        );
    }

    #[test]
    fn test_pick_skips_taken_names() {
        let taken = ["Auto-120000 (small)", "Auto-120000-2 (small)"];
        let name = pick_batch_name(at(12, 0, 0), SizeClass::Small, 5, |n| {
            Ok(taken.contains(&n))
        })
        .unwrap();
        assert_eq!(name, "Auto-120000-3 (small)");
    }

    #[test]
    fn test_pick_exhausted_is_conflict() {
        let result = pick_batch_name(at(12, 0, 0), SizeClass::Large, 4, |_| Ok(true));
        assert!(matches!(result, Err(DispatchError::Conflict(_))));
    }

    #[test]
    fn test_pick_propagates_lookup_errors() {
        let result = pick_batch_name(at(12, 0, 0), SizeClass::Large, 4, |_| {
            Err(DispatchError::Database("locked".to_string()))
        });
        assert!(matches!(result, Err(DispatchError::Database(_))));
    }

    #[test]
    fn test_validate_request() {
        let valid = ConfirmParcelRequest {
            external_id: "P-2024-001".to_string(),
            dimensions: "10*10*10cm".to_string(),
            weight: 0.03,
            volume: 0.001,
            delivery_address: "12 Harbour Rd".to_string(),
            image_name: None,
            created_by: "admin".to_string(),
        };
        assert!(validate_request(&valid).is_ok());

        let zero = ConfirmParcelRequest {
            volume: 0.0,
            weight: 0.0,
            ..valid.clone()
        };
        assert!(validate_request(&zero).is_ok());

        for bad in [
            ConfirmParcelRequest {
                volume: -0.1,
                ..valid.clone()
            },
            ConfirmParcelRequest {
                volume: f64::NAN,
                ..valid.clone()
            },
            ConfirmParcelRequest {
                weight: f64::INFINITY,
                ..valid.clone()
            },
            ConfirmParcelRequest {
                external_id: "  ".to_string(),
                ..valid.clone()
            },
            ConfirmParcelRequest {
                delivery_address: String::new(),
                ..valid.clone()
            },
        ] {
            assert!(matches!(
                validate_request(&bad),
                Err(DispatchError::Validation(_))
            ));
        }
    }
}
