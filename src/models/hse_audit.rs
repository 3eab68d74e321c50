use crate::database::get_db;
use crate::errors::ApiError;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime},
    options::FindOptions,
    Collection,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Compliant,
    NonCompliant,
    Pending,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HseAudit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub title: String,
    pub audit_type: String,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub audited_by: ObjectId,
    pub location: Option<String>,
    pub findings: Option<String>,
    pub status: AuditStatus,
    pub audit_date: DateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HseAuditRequest {
    pub title: String,
    pub audit_type: String,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub location: Option<String>,
    pub findings: Option<String>,
    pub status: AuditStatus,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HseAuditResponse {
    pub id: String,
    pub title: String,
    pub audit_type: String,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub audited_by: String,
    pub location: Option<String>,
    pub findings: Option<String>,
    pub status: AuditStatus,
    pub audit_date: chrono::DateTime<chrono::Utc>,
}

impl HseAuditRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::validation("AUDIT_MUST_HAVE_TITLE"));
        }
        if self.audit_type.trim().is_empty() {
            return Err(ApiError::validation("AUDIT_MUST_HAVE_TYPE"));
        }
        match (self.score, self.max_score) {
            (Some(score), _) if !score.is_finite() || score < 0.0 => {
                Err(ApiError::validation("SCORE_MUST_BE_POSITIVE"))
            }
            (_, Some(max)) if !max.is_finite() || max <= 0.0 => {
                Err(ApiError::validation("MAX_SCORE_MUST_BE_POSITIVE"))
            }
            (Some(score), Some(max)) if score > max => {
                Err(ApiError::validation("SCORE_EXCEEDS_MAX_SCORE"))
            }
            _ => Ok(()),
        }
    }
}

impl HseAudit {
    fn collection() -> Collection<HseAudit> {
        get_db().collection::<HseAudit>("hse-audits")
    }
    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        let id = ObjectId::new();
        self._id = Some(id);

        Self::collection()
            .insert_one(&*self, None)
            .await
            .map_err(ApiError::internal)
            .map(|_| id)
    }
    pub async fn find_many() -> Result<Vec<HseAudit>, ApiError> {
        let options = FindOptions::builder().sort(doc! { "audit_date": -1 }).build();

        Self::collection()
            .find(doc! {}, options)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub fn into_response(self) -> HseAuditResponse {
        HseAuditResponse {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            title: self.title,
            audit_type: self.audit_type,
            score: self.score,
            max_score: self.max_score,
            audited_by: self.audited_by.to_hex(),
            location: self.location,
            findings: self.findings,
            status: self.status,
            audit_date: self.audit_date.to_chrono(),
        }
    }
}
