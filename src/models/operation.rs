use crate::database::get_db;
use crate::errors::{is_duplicate_key, ApiError};
use chrono::{Datelike, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, DateTime, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Collection,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::machine::MachineKind;

/// Machine state over the recorded shift.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Marche,
    Arret,
}

/// One shift record (fiche de décapage).
#[derive(Debug, Deserialize, Serialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub fiche_id: String,
    pub date: DateTime,
    pub method: MachineKind,
    pub machine_id: ObjectId,
    pub operator_id: ObjectId,
    pub poste: u8,
    pub panneau: String,
    pub tranche: String,
    pub niveau: String,
    pub machine_status: MachineStatus,
    pub working_hours: f64,
    pub downtime: f64,
    pub volume_blasted: f64,
    pub observations: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub date: Option<chrono::DateTime<Utc>>,
    pub machine_id: String,
    pub operator_id: Option<String>,
    pub poste: u8,
    pub panneau: String,
    pub tranche: String,
    pub niveau: String,
    pub machine_status: MachineStatus,
    pub working_hours: Option<f64>,
    pub downtime: Option<f64>,
    pub volume_blasted: Option<f64>,
    pub observations: Option<String>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationUpdateRequest {
    pub date: Option<chrono::DateTime<Utc>>,
    pub poste: Option<u8>,
    pub panneau: Option<String>,
    pub tranche: Option<String>,
    pub niveau: Option<String>,
    pub machine_status: Option<MachineStatus>,
    pub working_hours: Option<f64>,
    pub downtime: Option<f64>,
    pub volume_blasted: Option<f64>,
    pub observations: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub id: String,
    pub fiche_id: String,
    pub date: chrono::DateTime<Utc>,
    pub method: MachineKind,
    pub machine_id: String,
    pub operator_id: String,
    pub poste: u8,
    pub panneau: String,
    pub tranche: String,
    pub niveau: String,
    pub machine_status: MachineStatus,
    pub working_hours: f64,
    pub downtime: f64,
    pub volume_blasted: f64,
    /// Rendering rate in m³ per working hour, derived server-side.
    #[serde(rename = "yield")]
    pub yield_per_hour: f64,
    pub observations: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

const FICHE_SUFFIX_LEN: usize = 6;
const FICHE_SPACE: u64 = 36u64.pow(FICHE_SUFFIX_LEN as u32);

// Randomly seeded per process, stepped on every fiche. Consecutive values
// cannot repeat within 36^6 ids; the unique index covers the rest.
static FICHE_SEQ: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(rand::random()));

/// `FD-<year>-<6 uppercase base36 chars>`.
pub fn generate_fiche_id(year: i32) -> String {
    let mut value = FICHE_SEQ.fetch_add(1, Ordering::Relaxed) % FICHE_SPACE;
    let mut suffix = [b'0'; FICHE_SUFFIX_LEN];
    for slot in suffix.iter_mut().rev() {
        let digit = (value % 36) as u8;
        *slot = if digit < 10 {
            b'0' + digit
        } else {
            b'A' + digit - 10
        };
        value /= 36;
    }
    let suffix: String = suffix.iter().map(|byte| *byte as char).collect();
    format!("FD-{year}-{suffix}")
}

fn non_negative(value: Option<f64>, code: &'static str) -> Result<f64, ApiError> {
    let value = value.unwrap_or(0.0);
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ApiError::Validation(code.to_string()))
    }
}

fn validate_poste(poste: u8) -> Result<(), ApiError> {
    if (1..=3).contains(&poste) {
        Ok(())
    } else {
        Err(ApiError::validation("POSTE_MUST_BE_1_2_OR_3"))
    }
}

impl OperationRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_poste(self.poste)?;
        non_negative(self.working_hours, "WORKING_HOURS_MUST_BE_POSITIVE")?;
        non_negative(self.downtime, "DOWNTIME_MUST_BE_POSITIVE")?;
        non_negative(self.volume_blasted, "VOLUME_MUST_BE_POSITIVE")?;
        if self.panneau.is_empty() || self.tranche.is_empty() || self.niveau.is_empty() {
            return Err(ApiError::validation("OPERATION_MUST_HAVE_ZONE"));
        }
        Ok(())
    }
}

impl OperationUpdateRequest {
    pub fn into_document(self) -> Result<Document, ApiError> {
        let mut changes = Document::new();

        if let Some(date) = self.date {
            changes.insert("date", DateTime::from_chrono(date));
        }
        if let Some(poste) = self.poste {
            validate_poste(poste)?;
            changes.insert("poste", poste as i32);
        }
        if let Some(panneau) = self.panneau {
            changes.insert("panneau", panneau);
        }
        if let Some(tranche) = self.tranche {
            changes.insert("tranche", tranche);
        }
        if let Some(niveau) = self.niveau {
            changes.insert("niveau", niveau);
        }
        if let Some(status) = self.machine_status {
            changes.insert("machine_status", to_bson(&status).map_err(ApiError::internal)?);
        }
        if let Some(hours) = self.working_hours {
            changes.insert(
                "working_hours",
                non_negative(Some(hours), "WORKING_HOURS_MUST_BE_POSITIVE")?,
            );
        }
        if let Some(downtime) = self.downtime {
            changes.insert(
                "downtime",
                non_negative(Some(downtime), "DOWNTIME_MUST_BE_POSITIVE")?,
            );
        }
        if let Some(volume) = self.volume_blasted {
            changes.insert(
                "volume_blasted",
                non_negative(Some(volume), "VOLUME_MUST_BE_POSITIVE")?,
            );
        }
        if let Some(observations) = self.observations {
            changes.insert("observations", observations);
        }
        if changes.is_empty() {
            return Err(ApiError::validation("EMPTY_UPDATE"));
        }
        changes.insert("updated_at", DateTime::now());
        Ok(changes)
    }
}

impl Operation {
    fn collection() -> Collection<Operation> {
        get_db().collection::<Operation>("operations")
    }
    /// Insert with a bounded retry on fiche-id collision against the unique index.
    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        let id = ObjectId::new();
        self._id = Some(id);

        for _ in 0..3 {
            match Self::collection().insert_one(&*self, None).await {
                Ok(_) => return Ok(id),
                Err(error) if is_duplicate_key(&error) => {
                    self.fiche_id = generate_fiche_id(self.date.to_chrono().year());
                }
                Err(error) => return Err(ApiError::internal(error)),
            }
        }
        Err(ApiError::Conflict("FICHE_ALREADY_EXIST"))
    }
    pub async fn find_many() -> Result<Vec<Operation>, ApiError> {
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();

        Self::collection()
            .find(doc! {}, options)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub async fn find_by_date_range(
        start: DateTime,
        end: DateTime,
    ) -> Result<Vec<Operation>, ApiError> {
        let options = FindOptions::builder().sort(doc! { "date": -1 }).build();

        Self::collection()
            .find(doc! { "date": { "$gte": start, "$lte": end } }, options)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub async fn update(_id: &ObjectId, changes: Document) -> Result<Option<Operation>, ApiError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Self::collection()
            .find_one_and_update(doc! { "_id": _id }, doc! { "$set": changes }, options)
            .await
            .map_err(ApiError::internal)
    }
    pub fn into_response(self) -> OperationResponse {
        let yield_per_hour = crate::stats::operation_yield(&self);
        OperationResponse {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            fiche_id: self.fiche_id,
            date: self.date.to_chrono(),
            method: self.method,
            machine_id: self.machine_id.to_hex(),
            operator_id: self.operator_id.to_hex(),
            poste: self.poste,
            panneau: self.panneau,
            tranche: self.tranche,
            niveau: self.niveau,
            machine_status: self.machine_status,
            working_hours: self.working_hours,
            downtime: self.downtime,
            volume_blasted: self.volume_blasted,
            yield_per_hour,
            observations: self.observations,
            created_at: self.created_at.to_chrono(),
            updated_at: self.updated_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashSet;

    #[test]
    fn fiche_id_matches_documented_format() {
        let pattern = Regex::new(r"^FD-\d{4}-[0-9A-Z]{6}$").unwrap();
        for _ in 0..100 {
            let fiche = generate_fiche_id(2025);
            assert!(pattern.is_match(&fiche), "bad fiche id: {fiche}");
        }
    }

    #[test]
    fn ten_thousand_fiche_ids_never_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_fiche_id(2025)));
        }
    }

    fn request(poste: u8, hours: Option<f64>, downtime: Option<f64>) -> OperationRequest {
        OperationRequest {
            date: None,
            machine_id: ObjectId::new().to_hex(),
            operator_id: None,
            poste,
            panneau: "P-45".to_string(),
            tranche: "T-12".to_string(),
            niveau: "N-8".to_string(),
            machine_status: MachineStatus::Marche,
            working_hours: hours,
            downtime,
            volume_blasted: Some(1000.0),
            observations: None,
        }
    }

    #[test]
    fn poste_outside_shift_range_is_rejected() {
        assert!(request(0, Some(8.0), None).validate().is_err());
        assert!(request(4, Some(8.0), None).validate().is_err());
        for poste in 1..=3 {
            assert!(request(poste, Some(8.0), None).validate().is_ok());
        }
    }

    #[test]
    fn negative_hours_and_downtime_are_rejected() {
        assert!(request(1, Some(-1.0), None).validate().is_err());
        assert!(request(1, Some(8.0), Some(-0.5)).validate().is_err());
        assert!(request(1, None, None).validate().is_ok());
    }

    #[test]
    fn update_document_rejects_negative_volume_and_keeps_updated_at() {
        let update = OperationUpdateRequest {
            date: None,
            poste: None,
            panneau: None,
            tranche: None,
            niveau: None,
            machine_status: None,
            working_hours: None,
            downtime: None,
            volume_blasted: Some(-10.0),
            observations: None,
        };
        assert!(update.into_document().is_err());

        let update = OperationUpdateRequest {
            date: None,
            poste: Some(2),
            panneau: None,
            tranche: None,
            niveau: None,
            machine_status: None,
            working_hours: Some(6.5),
            downtime: None,
            volume_blasted: None,
            observations: None,
        };
        let changes = update.into_document().unwrap();
        assert_eq!(changes.get_i32("poste").unwrap(), 2);
        assert!(changes.get_datetime("updated_at").is_ok());
    }

    #[test]
    fn response_projection_converts_timestamps_and_derives_yield() {
        let stamp = DateTime::from_millis(1_700_000_000_000);
        let operation = Operation {
            _id: Some(ObjectId::new()),
            fiche_id: "FD-2025-000001".to_string(),
            date: stamp,
            method: MachineKind::Poussage,
            machine_id: ObjectId::new(),
            operator_id: ObjectId::new(),
            poste: 1,
            panneau: "P-45".to_string(),
            tranche: "T-12".to_string(),
            niveau: "N-8".to_string(),
            machine_status: MachineStatus::Marche,
            working_hours: 8.0,
            downtime: 0.0,
            volume_blasted: 1000.0,
            observations: None,
            created_at: stamp,
            updated_at: stamp,
        };

        let response = operation.into_response();
        assert_eq!(response.date, stamp.to_chrono());
        assert_eq!(response.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(response.yield_per_hour, 125.0);
        assert_eq!(DateTime::from_chrono(response.date), stamp);
    }

    #[test]
    fn empty_update_is_rejected() {
        let update = OperationUpdateRequest {
            date: None,
            poste: None,
            panneau: None,
            tranche: None,
            niveau: None,
            machine_status: None,
            working_hours: None,
            downtime: None,
            volume_blasted: None,
            observations: None,
        };
        assert!(matches!(
            update.into_document(),
            Err(ApiError::Validation(_))
        ));
    }
}
