use actix_web::{get, web, HttpResponse};
use mongodb::bson::DateTime;

use crate::errors::ApiError;
use crate::models::machine::Machine;
use crate::models::operation::Operation;
use crate::models::progress::Progress;
use crate::models::safety_incident::SafetyIncident;
use crate::models::user::AuthUser;
use crate::models::hse_audit::HseAudit;
use crate::stats::{self, StatsConfig};

#[get("/stats/dashboard")]
pub async fn dashboard(_auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let machines = Machine::find_many().await?;
    let operations = Operation::find_many().await?;
    let incidents = SafetyIncident::find_many().await?;

    Ok(HttpResponse::Ok().json(stats::dashboard_stats(&machines, &operations, &incidents)))
}

#[get("/stats/safety")]
pub async fn safety(
    _auth: AuthUser,
    config: web::Data<StatsConfig>,
) -> Result<HttpResponse, ApiError> {
    let incidents = SafetyIncident::find_many().await?;
    let audits = HseAudit::find_many().await?;

    Ok(HttpResponse::Ok().json(stats::safety_overview(
        &incidents,
        &audits,
        DateTime::now(),
        &config,
    )))
}

#[get("/stats/progress")]
pub async fn progress(_auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let rows = Progress::find_many().await?;

    Ok(HttpResponse::Ok().json(stats::progress_by_panneau(&rows)))
}
