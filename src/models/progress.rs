use crate::database::get_db;
use crate::errors::ApiError;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, DateTime},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection,
};
use serde::{Deserialize, Serialize};

use super::machine::MachineKind;

/// Zone completion row, unique per (panneau, tranche, niveau).
#[derive(Debug, Deserialize, Serialize)]
pub struct Progress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub panneau: String,
    pub tranche: String,
    pub niveau: String,
    pub method: MachineKind,
    pub progress_percentage: f64,
    pub target_depth: Option<f64>,
    pub current_depth: Option<f64>,
    pub updated_at: DateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub panneau: String,
    pub tranche: String,
    pub niveau: String,
    pub method: MachineKind,
    pub progress_percentage: f64,
    pub target_depth: Option<f64>,
    pub current_depth: Option<f64>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub id: String,
    pub panneau: String,
    pub tranche: String,
    pub niveau: String,
    pub method: MachineKind,
    pub progress_percentage: f64,
    pub target_depth: Option<f64>,
    pub current_depth: Option<f64>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProgressRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.panneau.is_empty() || self.tranche.is_empty() || self.niveau.is_empty() {
            return Err(ApiError::validation("PROGRESS_MUST_HAVE_ZONE"));
        }
        if !self.progress_percentage.is_finite()
            || !(0.0..=100.0).contains(&self.progress_percentage)
        {
            return Err(ApiError::validation("PERCENTAGE_MUST_BE_0_TO_100"));
        }
        Ok(())
    }
}

impl Progress {
    fn collection() -> Collection<Progress> {
        get_db().collection::<Progress>("progress")
    }
    /// Single atomic conditional write on the natural key: re-submission
    /// overwrites the existing row, never inserts a duplicate.
    pub async fn upsert(request: &ProgressRequest) -> Result<Progress, ApiError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let method = to_bson(&request.method).map_err(ApiError::internal)?;

        Self::collection()
            .find_one_and_update(
                doc! {
                    "panneau": &request.panneau,
                    "tranche": &request.tranche,
                    "niveau": &request.niveau,
                },
                doc! { "$set": {
                    "method": method,
                    "progress_percentage": request.progress_percentage,
                    "target_depth": request.target_depth,
                    "current_depth": request.current_depth,
                    "updated_at": DateTime::now(),
                } },
                options,
            )
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::internal("upsert returned no document"))
    }
    pub async fn find_many() -> Result<Vec<Progress>, ApiError> {
        Self::collection()
            .find(doc! {}, None)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub fn into_response(self) -> ProgressResponse {
        ProgressResponse {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            panneau: self.panneau,
            tranche: self.tranche,
            niveau: self.niveau,
            method: self.method,
            progress_percentage: self.progress_percentage,
            target_depth: self.target_depth,
            current_depth: self.current_depth,
            updated_at: self.updated_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(percentage: f64) -> ProgressRequest {
        ProgressRequest {
            panneau: "P3".to_string(),
            tranche: "T1".to_string(),
            niveau: "N2".to_string(),
            method: MachineKind::Poussage,
            progress_percentage: percentage,
            target_depth: Some(20.0),
            current_depth: Some(12.5),
        }
    }

    #[test]
    fn percentage_outside_range_is_rejected() {
        assert!(request(-1.0).validate().is_err());
        assert!(request(100.1).validate().is_err());
        assert!(request(f64::NAN).validate().is_err());
        assert!(request(0.0).validate().is_ok());
        assert!(request(100.0).validate().is_ok());
    }

    #[test]
    fn empty_zone_descriptor_is_rejected() {
        let mut bad = request(50.0);
        bad.niveau = String::new();
        assert!(matches!(bad.validate(), Err(ApiError::Validation(_))));
    }
}
