use actix_web::{get, post, web, HttpResponse};

use crate::errors::ApiError;
use crate::models::progress::{Progress, ProgressRequest};
use crate::models::user::AuthUser;

#[get("/progress")]
pub async fn get_progress(_auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let rows = Progress::find_many().await?;
    let rows: Vec<_> = rows.into_iter().map(Progress::into_response).collect();

    Ok(HttpResponse::Ok().json(rows))
}

#[post("/progress")]
pub async fn upsert_progress(
    _auth: AuthUser,
    payload: web::Json<ProgressRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload: ProgressRequest = payload.into_inner();
    payload.validate()?;

    let row = Progress::upsert(&payload).await?;
    Ok(HttpResponse::Ok().json(row.into_response()))
}
