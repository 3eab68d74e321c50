use crate::database::get_db;
use crate::errors::ApiError;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, DateTime},
    options::FindOptions,
    Collection,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Minor,
    Major,
    Critical,
}
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SafetyIncident {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub reported_by: ObjectId,
    pub machine_id: Option<ObjectId>,
    pub location: Option<String>,
    pub reported_at: DateTime,
    pub resolved_at: Option<DateTime>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyIncidentRequest {
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub machine_id: Option<String>,
    pub location: Option<String>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyIncidentUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<IncidentSeverity>,
    pub status: Option<IncidentStatus>,
    pub location: Option<String>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyIncidentResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub reported_by: String,
    pub machine_id: Option<String>,
    pub location: Option<String>,
    pub reported_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SafetyIncident {
    fn collection() -> Collection<SafetyIncident> {
        get_db().collection::<SafetyIncident>("safety-incidents")
    }
    /// Status transition rules. Entering `resolved` stamps `resolved_at`
    /// exactly once; re-resolving keeps the original timestamp and no other
    /// transition touches it. `closed` is only reachable from `resolved`.
    pub fn apply_status(&mut self, next: IncidentStatus, now: DateTime) -> Result<(), ApiError> {
        if next == IncidentStatus::Closed
            && !matches!(self.status, IncidentStatus::Resolved | IncidentStatus::Closed)
        {
            return Err(ApiError::validation("INCIDENT_MUST_BE_RESOLVED_BEFORE_CLOSE"));
        }
        if next == IncidentStatus::Resolved && self.resolved_at.is_none() {
            self.resolved_at = Some(now);
        }
        self.status = next;
        Ok(())
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
    pub async fn find_many() -> Result<Vec<SafetyIncident>, ApiError> {
        let options = FindOptions::builder().sort(doc! { "reported_at": -1 }).build();

        Self::collection()
            .find(doc! {}, options)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<SafetyIncident>, ApiError> {
        Self::collection()
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(ApiError::internal)
    }
    pub async fn update(&self) -> Result<(), ApiError> {
        let _id = self
            ._id
            .ok_or_else(|| ApiError::internal("updating incident without _id"))?;

        Self::collection()
            .update_one(
                doc! { "_id": _id },
                doc! { "$set": to_bson(self).map_err(ApiError::internal)? },
                None,
            )
            .await
            .map_err(ApiError::internal)
            .map(|_| ())
    }
    pub fn into_response(self) -> SafetyIncidentResponse {
        SafetyIncidentResponse {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            title: self.title,
            description: self.description,
            severity: self.severity,
            status: self.status,
            reported_by: self.reported_by.to_hex(),
            machine_id: self.machine_id.map(|id| id.to_hex()),
            location: self.location,
            reported_at: self.reported_at.to_chrono(),
            resolved_at: self.resolved_at.map(|time| time.to_chrono()),
        }
    }
}

impl SafetyIncidentRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::validation("INCIDENT_MUST_HAVE_TITLE"));
        }
        if self.description.trim().is_empty() {
            return Err(ApiError::validation("INCIDENT_MUST_HAVE_DESCRIPTION"));
        }
        Ok(())
    }
}
