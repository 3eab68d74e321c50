use actix_web::{get, post, put, web, HttpResponse};
use mongodb::bson::DateTime;

use crate::errors::ApiError;
use crate::models::hse_audit::{HseAudit, HseAuditRequest};
use crate::models::safety_incident::{
    IncidentStatus, SafetyIncident, SafetyIncidentRequest, SafetyIncidentUpdateRequest,
};
use crate::models::user::AuthUser;
use crate::routes::parse_object_id;

#[get("/safety/incidents")]
pub async fn get_incidents(_auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let incidents = SafetyIncident::find_many().await?;
    let incidents: Vec<_> = incidents
        .into_iter()
        .map(SafetyIncident::into_response)
        .collect();

    Ok(HttpResponse::Ok().json(incidents))
}

#[post("/safety/incidents")]
pub async fn create_incident(
    auth: AuthUser,
    payload: web::Json<SafetyIncidentRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload: SafetyIncidentRequest = payload.into_inner();
    payload.validate()?;

    let machine_id = match &payload.machine_id {
        Some(machine_id) => Some(parse_object_id(machine_id)?),
        None => None,
    };

    // Always enters at open; reporter is the caller, never client-supplied.
    let mut incident = SafetyIncident {
        _id: None,
        title: payload.title,
        description: payload.description,
        severity: payload.severity,
        status: IncidentStatus::Open,
        reported_by: auth.id,
        machine_id,
        location: payload.location,
        reported_at: DateTime::now(),
        resolved_at: None,
    };
    incident.save().await?;

    Ok(HttpResponse::Created().json(incident.into_response()))
}

#[put("/safety/incidents/{incident_id}")]
pub async fn update_incident(
    _auth: AuthUser,
    incident_id: web::Path<String>,
    payload: web::Json<SafetyIncidentUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let incident_id = parse_object_id(&incident_id)?;
    let payload = payload.into_inner();

    let mut incident = SafetyIncident::find_by_id(&incident_id)
        .await?
        .ok_or(ApiError::NotFound("INCIDENT_NOT_FOUND"))?;

    if let Some(title) = payload.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("INCIDENT_MUST_HAVE_TITLE"));
        }
        incident.title = title;
    }
    if let Some(description) = payload.description {
        if description.trim().is_empty() {
            return Err(ApiError::validation("INCIDENT_MUST_HAVE_DESCRIPTION"));
        }
        incident.description = description;
    }
    if let Some(severity) = payload.severity {
        incident.severity = severity;
    }
    if let Some(location) = payload.location {
        incident.location = Some(location);
    }
    if let Some(status) = payload.status {
        incident.apply_status(status, DateTime::now())?;
    }
    incident.update().await?;

    Ok(HttpResponse::Ok().json(incident.into_response()))
}

#[get("/safety/audits")]
pub async fn get_audits(_auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let audits = HseAudit::find_many().await?;
    let audits: Vec<_> = audits.into_iter().map(HseAudit::into_response).collect();

    Ok(HttpResponse::Ok().json(audits))
}

#[post("/safety/audits")]
pub async fn create_audit(
    auth: AuthUser,
    payload: web::Json<HseAuditRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload: HseAuditRequest = payload.into_inner();
    payload.validate()?;

    let mut audit = HseAudit {
        _id: None,
        title: payload.title,
        audit_type: payload.audit_type,
        score: payload.score,
        max_score: payload.max_score,
        audited_by: auth.id,
        location: payload.location,
        findings: payload.findings,
        status: payload.status,
        audit_date: DateTime::now(),
    };
    audit.save().await?;

    Ok(HttpResponse::Created().json(audit.into_response()))
}
