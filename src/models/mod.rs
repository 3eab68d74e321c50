pub mod hse_audit;
pub mod machine;
pub mod operation;
pub mod progress;
pub mod safety_incident;
pub mod user;
