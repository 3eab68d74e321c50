use actix_web::{get, post, put, web, HttpResponse};
use mongodb::bson::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ApiError;
use crate::models::user::{self, AdminUser, User, UserRequest, UserUpdateRequest};
use crate::routes::parse_object_id;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9_+]([a-z0-9_+.]*[a-z0-9_+])?)@([a-z0-9]+([\-\.]{1}[a-z0-9]+)*\.[a-z]{2,6})")
        .unwrap()
});

#[get("/users")]
pub async fn get_users(_admin: AdminUser) -> Result<HttpResponse, ApiError> {
    let users = User::find_many().await?;
    let users: Vec<_> = users.into_iter().map(User::into_response).collect();

    Ok(HttpResponse::Ok().json(users))
}

#[post("/users")]
pub async fn create_user(
    _admin: AdminUser,
    payload: web::Json<UserRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload: UserRequest = payload.into_inner();

    if payload.username.trim().is_empty() {
        return Err(ApiError::validation("USER_MUST_HAVE_USERNAME"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::validation("USER_MUST_HAVE_VALID_PASSWORD"));
    }
    if !EMAIL_REGEX.is_match(&payload.email) {
        return Err(ApiError::validation("USER_MUST_HAVE_VALID_EMAIL"));
    }

    let mut user = User {
        _id: None,
        username: payload.username,
        password: payload.password,
        role: payload.role,
        name: payload.name,
        email: payload.email,
        team: payload.team,
        is_active: true,
        last_login: None,
        created_at: DateTime::now(),
    };
    user.save().await?;

    Ok(HttpResponse::Created().json(user.into_response()))
}

#[put("/users/{user_id}")]
pub async fn update_user(
    _admin: AdminUser,
    user_id: web::Path<String>,
    payload: web::Json<UserUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = parse_object_id(&user_id)?;
    let payload = payload.into_inner();

    if let Some(email) = &payload.email {
        if !EMAIL_REGEX.is_match(email) {
            return Err(ApiError::validation("USER_MUST_HAVE_VALID_EMAIL"));
        }
    }

    let changes = user::update_document(payload)?;
    let user = User::update(&user_id, changes)
        .await?
        .ok_or(ApiError::NotFound("USER_NOT_FOUND"))?;

    Ok(HttpResponse::Ok().json(user.into_response()))
}
