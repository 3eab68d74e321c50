use crate::database::get_db;
use crate::errors::{is_duplicate_key, ApiError};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, DateTime, Document},
    Collection,
};
use serde::{Deserialize, Serialize};

/// Mining method category. Operations snapshot this at creation time.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MachineKind {
    Transport,
    Casement,
    Poussage,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Machine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub name: String,
    pub kind: MachineKind,
    pub specifications: Option<Document>,
    pub is_active: bool,
    pub created_at: DateTime,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MachineKind,
    pub specifications: Option<Document>,
}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MachineKind,
    pub specifications: Option<Document>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Machine {
    fn collection() -> Collection<Machine> {
        get_db().collection::<Machine>("machines")
    }
    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        let id = ObjectId::new();
        self._id = Some(id);

        Self::collection()
            .insert_one(&*self, None)
            .await
            .map_err(|error| {
                if is_duplicate_key(&error) {
                    ApiError::Conflict("MACHINE_ALREADY_EXIST")
                } else {
                    ApiError::internal(error)
                }
            })
            .map(|_| id)
    }
    pub async fn find_many() -> Result<Vec<Machine>, ApiError> {
        Self::collection()
            .find(doc! {}, None)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub async fn find_by_kind(kind: MachineKind) -> Result<Vec<Machine>, ApiError> {
        let kind = to_bson(&kind).map_err(ApiError::internal)?;

        Self::collection()
            .find(doc! { "kind": kind }, None)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Machine>, ApiError> {
        Self::collection()
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(ApiError::internal)
    }
    pub async fn count() -> Result<u64, ApiError> {
        Self::collection()
            .count_documents(doc! {}, None)
            .await
            .map_err(ApiError::internal)
    }
    pub fn into_response(self) -> MachineResponse {
        MachineResponse {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            name: self.name,
            kind: self.kind,
            specifications: self.specifications,
            is_active: self.is_active,
            created_at: self.created_at.to_chrono(),
        }
    }
}
