use crate::database::get_db;
use crate::errors::{is_duplicate_key, ApiError};
use actix_service::{self, Transform};
use actix_web::{
    dev::{Payload, Service, ServiceRequest, ServiceResponse},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use chrono::Utc;
use futures::future::{ready, LocalBoxFuture, Ready};
use futures::{FutureExt, TryStreamExt};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, DateTime, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Collection,
};
use once_cell::sync::Lazy;
use pwhash::bcrypt;
use serde::{Deserialize, Serialize};
use std::{rc::Rc, str::FromStr};

static JWT_SECRET: Lazy<String> =
    Lazy::new(|| std::env::var("JWT_SECRET").unwrap_or_else(|_| String::from("decapage-dev-secret")));

const TOKEN_LIFETIME_SECS: i64 = 8 * 3600;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Supervisor,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    sub: String,
    username: String,
    role: UserRole,
    exp: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub name: String,
    pub email: String,
    pub team: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime>,
    pub created_at: DateTime,
}
#[derive(Debug, Deserialize)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub username: String,
    pub password: String,
    pub role: UserRole,
    pub name: String,
    pub email: String,
    pub team: Option<String>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub team: Option<String>,
    pub is_active: Option<bool>,
}
/// Public-safe projection, never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: UserRole,
    pub email: String,
    pub team: Option<String>,
    pub is_active: bool,
    pub last_login: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

/// Decoded token identity attached to the request by the auth middleware.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: ObjectId,
    pub username: String,
    pub role: UserRole,
}
/// Admin-only gate: wraps `AuthUser`, rejects supervisors with 403.
pub struct AdminUser(pub AuthUser);

pub struct UserAuthenticationMiddleware<S> {
    service: Rc<S>,
}
pub struct UserAuthenticationMiddlewareFactory;

impl User {
    fn collection() -> Collection<User> {
        get_db().collection::<User>("users")
    }
    pub async fn save(&mut self) -> Result<ObjectId, ApiError> {
        let id = ObjectId::new();
        self._id = Some(id);
        self.password = bcrypt::hash(&self.password).map_err(ApiError::internal)?;

        Self::collection()
            .insert_one(&*self, None)
            .await
            .map_err(|error| {
                if is_duplicate_key(&error) {
                    ApiError::Conflict("USER_ALREADY_EXIST")
                } else {
                    ApiError::internal(error)
                }
            })
            .map(|_| id)
    }
    pub async fn find_many() -> Result<Vec<User>, ApiError> {
        Self::collection()
            .find(doc! {}, None)
            .await
            .map_err(ApiError::internal)?
            .try_collect()
            .await
            .map_err(ApiError::internal)
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<User>, ApiError> {
        Self::collection()
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(ApiError::internal)
    }
    pub async fn find_by_username(username: &str) -> Result<Option<User>, ApiError> {
        Self::collection()
            .find_one(doc! { "username": username }, None)
            .await
            .map_err(ApiError::internal)
    }
    pub async fn count() -> Result<u64, ApiError> {
        Self::collection()
            .count_documents(doc! {}, None)
            .await
            .map_err(ApiError::internal)
    }
    pub async fn update(_id: &ObjectId, changes: Document) -> Result<Option<User>, ApiError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Self::collection()
            .find_one_and_update(doc! { "_id": _id }, doc! { "$set": changes }, options)
            .await
            .map_err(|error| {
                if is_duplicate_key(&error) {
                    ApiError::Conflict("USER_ALREADY_EXIST")
                } else {
                    ApiError::internal(error)
                }
            })
    }
    pub async fn update_last_login(_id: &ObjectId) -> Result<(), ApiError> {
        Self::collection()
            .update_one(
                doc! { "_id": _id },
                doc! { "$set": { "last_login": DateTime::now() } },
                None,
            )
            .await
            .map_err(ApiError::internal)
            .map(|_| ())
    }
    pub fn into_response(self) -> UserResponse {
        UserResponse {
            id: self._id.map(|id| id.to_hex()).unwrap_or_default(),
            username: self.username,
            name: self.name,
            role: self.role,
            email: self.email,
            team: self.team,
            is_active: self.is_active,
            last_login: self.last_login.map(|time| time.to_chrono()),
            created_at: self.created_at.to_chrono(),
        }
    }
}

impl UserCredential {
    /// Unknown username, wrong password and deactivated account all fail with
    /// the same code so callers cannot enumerate users.
    pub async fn authenticate(&self) -> Result<(String, UserResponse), ApiError> {
        let user = User::find_by_username(&self.username)
            .await?
            .ok_or(ApiError::Unauthorized("INVALID_CREDENTIALS"))?;

        if !user.is_active || !bcrypt::verify(&self.password, &user.password) {
            return Err(ApiError::Unauthorized("INVALID_CREDENTIALS"));
        }

        let id = user
            ._id
            .ok_or_else(|| ApiError::internal("stored user without _id"))?;

        User::update_last_login(&id).await?;

        let token = issue_token(&id, &user.username, user.role)?;
        Ok((token, user.into_response()))
    }
}

pub fn issue_token(id: &ObjectId, username: &str, role: UserRole) -> Result<String, ApiError> {
    let claims = UserClaims {
        sub: id.to_hex(),
        username: username.to_string(),
        role,
        exp: Utc::now().timestamp() + TOKEN_LIFETIME_SECS,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .map_err(ApiError::internal)
}

/// Signature + expiry check; identity comes from the claims, no lookup needed.
pub fn verify_token(token: &str) -> Option<AuthUser> {
    let data = decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()?;
    let id = ObjectId::from_str(&data.claims.sub).ok()?;

    Some(AuthUser {
        id,
        username: data.claims.username,
        role: data.claims.role,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or(ApiError::Unauthorized("UNAUTHORIZED")),
        )
    }
}
impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = req
            .extensions()
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized("UNAUTHORIZED"))
            .and_then(|user| {
                if user.role == UserRole::Admin {
                    Ok(AdminUser(user))
                } else {
                    Err(ApiError::Forbidden("FORBIDDEN"))
                }
            });
        ready(result)
    }
}

impl<S, B> Service<ServiceRequest> for UserAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv: Rc<S> = self.service.clone();

        async move {
            let bearer_token = req
                .headers()
                .get("Authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "));
            if let Some(token) = bearer_token {
                if let Some(auth_user) = verify_token(token) {
                    req.extensions_mut().insert::<AuthUser>(auth_user);
                }
            }
            let res: ServiceResponse<B> = srv.call(req).await?;
            Ok(res)
        }
        .boxed_local()
    }
}
impl<S, B> Transform<S, ServiceRequest> for UserAuthenticationMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = UserAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(UserAuthenticationMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub fn update_document(payload: UserUpdateRequest) -> Result<Document, ApiError> {
    let mut changes = Document::new();

    if let Some(name) = payload.name {
        changes.insert("name", name);
    }
    if let Some(email) = payload.email {
        changes.insert("email", email);
    }
    if let Some(team) = payload.team {
        changes.insert("team", team);
    }
    if let Some(role) = payload.role {
        changes.insert("role", to_bson(&role).map_err(ApiError::internal)?);
    }
    if let Some(is_active) = payload.is_active {
        changes.insert("is_active", is_active);
    }
    if let Some(password) = payload.password {
        if password.len() < 8 {
            return Err(ApiError::validation("USER_MUST_HAVE_VALID_PASSWORD"));
        }
        changes.insert("password", bcrypt::hash(&password).map_err(ApiError::internal)?);
    }
    if changes.is_empty() {
        return Err(ApiError::validation("EMPTY_UPDATE"));
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip_preserves_identity() {
        let id = ObjectId::new();
        let token = issue_token(&id, "m.alami", UserRole::Supervisor).unwrap();

        let auth = verify_token(&token).expect("fresh token must verify");
        assert_eq!(auth.id, id);
        assert_eq!(auth.username, "m.alami");
        assert_eq!(auth.role, UserRole::Supervisor);
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = UserClaims {
            sub: ObjectId::new().to_hex(),
            username: "m.alami".to_string(),
            role: UserRole::Admin,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verify_token(&token).is_none());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = issue_token(&ObjectId::new(), "m.alami", UserRole::Admin).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

        assert!(verify_token(&tampered).is_none());
    }

    #[actix_web::test]
    async fn admin_gate_rejects_supervisor_with_forbidden() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(AuthUser {
            id: ObjectId::new(),
            username: "m.alami".to_string(),
            role: UserRole::Supervisor,
        });

        let result = AdminUser::from_request(&req, &mut Payload::None).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[actix_web::test]
    async fn admin_gate_accepts_admin() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(AuthUser {
            id: ObjectId::new(),
            username: "admin".to_string(),
            role: UserRole::Admin,
        });

        assert!(AdminUser::from_request(&req, &mut Payload::None).await.is_ok());
    }

    #[actix_web::test]
    async fn missing_token_fails_closed() {
        let req = actix_web::test::TestRequest::default().to_http_request();

        let auth = AuthUser::from_request(&req, &mut Payload::None).await;
        assert!(matches!(auth, Err(ApiError::Unauthorized(_))));
        let admin = AdminUser::from_request(&req, &mut Payload::None).await;
        assert!(matches!(admin, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn update_document_rejects_short_password() {
        let payload = UserUpdateRequest {
            password: Some("short".to_string()),
            role: None,
            name: None,
            email: None,
            team: None,
            is_active: None,
        };
        assert!(matches!(
            update_document(payload),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn update_document_hashes_password() {
        let payload = UserUpdateRequest {
            password: Some("supervisor123".to_string()),
            role: None,
            name: None,
            email: None,
            team: None,
            is_active: Some(false),
        };
        let changes = update_document(payload).unwrap();
        let stored = changes.get_str("password").unwrap();
        assert_ne!(stored, "supervisor123");
        assert!(bcrypt::verify("supervisor123", stored));
        assert!(!changes.get_bool("is_active").unwrap());
    }
}
