use crate::errors::ApiError;
use actix_web::web;
use mongodb::bson::oid::ObjectId;
use std::str::FromStr;

pub mod auth;
pub mod machine;
pub mod operation;
pub mod progress;
pub mod safety;
pub mod stats;
pub mod user;

pub fn parse_object_id(value: &str) -> Result<ObjectId, ApiError> {
    ObjectId::from_str(value).map_err(|_| ApiError::validation("INVALID_ID"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(auth::login)
        .service(auth::me)
        .service(user::get_users)
        .service(user::create_user)
        .service(user::update_user)
        .service(machine::get_machines)
        .service(machine::create_machine)
        .service(operation::get_operations)
        .service(operation::create_operation)
        .service(operation::update_operation)
        .service(progress::get_progress)
        .service(progress::upsert_progress)
        .service(safety::get_incidents)
        .service(safety::create_incident)
        .service(safety::update_incident)
        .service(safety::get_audits)
        .service(safety::create_audit)
        .service(stats::dashboard)
        .service(stats::safety)
        .service(stats::progress);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_parsing() {
        let id = ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex()).unwrap(), id);
        assert!(parse_object_id("1").is_err());
        assert!(parse_object_id("not-an-id").is_err());
    }
}
