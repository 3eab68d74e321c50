use actix_web::{get, post, put, web, HttpResponse};
use chrono::{Datelike, NaiveDate, Utc};
use mongodb::bson::DateTime;
use serde::Deserialize;

use crate::errors::ApiError;
use crate::models::machine::Machine;
use crate::models::operation::{
    generate_fiche_id, Operation, OperationRequest, OperationUpdateRequest,
};
use crate::models::user::AuthUser;
use crate::routes::parse_object_id;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationQueryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn parse_day(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::validation("DATE_MUST_BE_YYYY_MM_DD"))
}

#[get("/operations")]
pub async fn get_operations(
    _auth: AuthUser,
    query: web::Query<OperationQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let operations = match (&query.start_date, &query.end_date) {
        (Some(start), Some(end)) => {
            // Inclusive day range.
            let start = parse_day(start)?
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| ApiError::validation("DATE_MUST_BE_YYYY_MM_DD"))?
                .and_utc();
            let end = parse_day(end)?
                .and_hms_milli_opt(23, 59, 59, 999)
                .ok_or_else(|| ApiError::validation("DATE_MUST_BE_YYYY_MM_DD"))?
                .and_utc();
            if start > end {
                return Err(ApiError::validation("START_DATE_AFTER_END_DATE"));
            }
            Operation::find_by_date_range(DateTime::from_chrono(start), DateTime::from_chrono(end))
                .await?
        }
        (None, None) => Operation::find_many().await?,
        _ => return Err(ApiError::validation("DATE_RANGE_NEEDS_BOTH_BOUNDS")),
    };
    let operations: Vec<_> = operations
        .into_iter()
        .map(Operation::into_response)
        .collect();

    Ok(HttpResponse::Ok().json(operations))
}

#[post("/operations")]
pub async fn create_operation(
    auth: AuthUser,
    payload: web::Json<OperationRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload: OperationRequest = payload.into_inner();
    payload.validate()?;

    let machine_id = parse_object_id(&payload.machine_id)?;
    // Method is a snapshot of the machine's category at record time; later
    // machine edits never rewrite history.
    let machine = Machine::find_by_id(&machine_id)
        .await?
        .ok_or(ApiError::NotFound("MACHINE_NOT_FOUND"))?;

    let operator_id = match &payload.operator_id {
        Some(operator_id) => parse_object_id(operator_id)?,
        None => auth.id,
    };
    let date = payload.date.unwrap_or_else(Utc::now);

    let mut operation = Operation {
        _id: None,
        fiche_id: generate_fiche_id(date.year()),
        date: DateTime::from_chrono(date),
        method: machine.kind,
        machine_id,
        operator_id,
        poste: payload.poste,
        panneau: payload.panneau,
        tranche: payload.tranche,
        niveau: payload.niveau,
        machine_status: payload.machine_status,
        working_hours: payload.working_hours.unwrap_or(0.0),
        downtime: payload.downtime.unwrap_or(0.0),
        volume_blasted: payload.volume_blasted.unwrap_or(0.0),
        observations: payload.observations,
        created_at: DateTime::now(),
        updated_at: DateTime::now(),
    };
    operation.save().await?;

    Ok(HttpResponse::Created().json(operation.into_response()))
}

#[put("/operations/{operation_id}")]
pub async fn update_operation(
    _auth: AuthUser,
    operation_id: web::Path<String>,
    payload: web::Json<OperationUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let operation_id = parse_object_id(&operation_id)?;
    let changes = payload.into_inner().into_document()?;

    let operation = Operation::update(&operation_id, changes)
        .await?
        .ok_or(ApiError::NotFound("OPERATION_NOT_FOUND"))?;

    Ok(HttpResponse::Ok().json(operation.into_response()))
}
