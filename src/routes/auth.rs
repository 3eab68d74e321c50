use actix_web::{get, post, web, HttpResponse};
use serde::Serialize;

use crate::errors::ApiError;
use crate::models::user::{AuthUser, User, UserCredential, UserResponse};

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: UserResponse,
}

#[post("/auth/login")]
pub async fn login(payload: web::Json<UserCredential>) -> Result<HttpResponse, ApiError> {
    let payload: UserCredential = payload.into_inner();

    let (token, user) = payload.authenticate().await?;
    Ok(HttpResponse::Ok().json(LoginResponse { token, user }))
}

#[get("/auth/me")]
pub async fn me(auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let user = User::find_by_id(&auth.id)
        .await?
        .ok_or(ApiError::NotFound("USER_NOT_FOUND"))?;

    Ok(HttpResponse::Ok().json(user.into_response()))
}
