use actix_web::{get, post, web, HttpResponse};
use mongodb::bson::DateTime;
use serde::Deserialize;

use crate::errors::ApiError;
use crate::models::machine::{Machine, MachineKind, MachineRequest};
use crate::models::user::{AdminUser, AuthUser};

#[derive(Deserialize)]
pub struct MachineQueryParams {
    #[serde(rename = "type")]
    pub kind: Option<MachineKind>,
}

#[get("/machines")]
pub async fn get_machines(
    _auth: AuthUser,
    query: web::Query<MachineQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let machines = match query.kind {
        Some(kind) => Machine::find_by_kind(kind).await?,
        None => Machine::find_many().await?,
    };
    let machines: Vec<_> = machines.into_iter().map(Machine::into_response).collect();

    Ok(HttpResponse::Ok().json(machines))
}

#[post("/machines")]
pub async fn create_machine(
    _admin: AdminUser,
    payload: web::Json<MachineRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload: MachineRequest = payload.into_inner();

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("MACHINE_MUST_HAVE_NAME"));
    }

    let mut machine = Machine {
        _id: None,
        name: payload.name,
        kind: payload.kind,
        specifications: payload.specifications,
        is_active: true,
        created_at: DateTime::now(),
    };
    machine.save().await?;

    Ok(HttpResponse::Created().json(machine.into_response()))
}
