use mongodb::bson::{doc, DateTime};

use crate::errors::ApiError;
use crate::models::machine::{Machine, MachineKind};
use crate::models::user::{User, UserRole};

/// Idempotent bootstrap: skipped entirely once any user exists.
pub async fn run() -> Result<(), ApiError> {
    if User::count().await? > 0 {
        log::info!("database already initialized, skipping seed");
        return Ok(());
    }

    let admin_password =
        std::env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| String::from("admin123"));
    let supervisor_password =
        std::env::var("SEED_SUPERVISOR_PASSWORD").unwrap_or_else(|_| String::from("supervisor123"));

    let mut admin = User {
        _id: None,
        username: "admin".to_string(),
        password: admin_password,
        role: UserRole::Admin,
        name: "Administrateur OCP".to_string(),
        email: "admin@example.com".to_string(),
        team: Some("Administration".to_string()),
        is_active: true,
        last_login: None,
        created_at: DateTime::now(),
    };
    admin.save().await?;

    let mut supervisor = User {
        _id: None,
        username: "supervisor".to_string(),
        password: supervisor_password,
        role: UserRole::Supervisor,
        name: "Mohamed Alami".to_string(),
        email: "supervisor@example.com".to_string(),
        team: Some("Équipe Décapage A".to_string()),
        is_active: true,
        last_login: None,
        created_at: DateTime::now(),
    };
    supervisor.save().await?;
    log::info!("seeded admin and supervisor accounts");

    if Machine::count().await? == 0 {
        let fleet = [
            (
                "D11",
                MachineKind::Poussage,
                doc! { "power": "850 CV", "weight": "104 tonnes", "blade": "Semi-U de 7,4 m³", "manufacturer": "Caterpillar" },
            ),
            (
                "750011",
                MachineKind::Casement,
                doc! { "power": "536 CV", "weight": "400 tonnes", "bucket": "23 m³", "reach": "17,7 m", "manufacturer": "Liebherr" },
            ),
            (
                "750012",
                MachineKind::Casement,
                doc! { "power": "536 CV", "weight": "400 tonnes", "bucket": "23 m³", "reach": "17,7 m", "manufacturer": "Liebherr" },
            ),
            (
                "PH1",
                MachineKind::Casement,
                doc! { "power": "2x1175 CV", "weight": "800 tonnes", "bucket": "42 m³", "reach": "20,5 m", "manufacturer": "Komatsu" },
            ),
            (
                "PH2",
                MachineKind::Casement,
                doc! { "power": "2x1175 CV", "weight": "800 tonnes", "bucket": "42 m³", "reach": "20,5 m", "manufacturer": "Komatsu" },
            ),
            (
                "200B1",
                MachineKind::Casement,
                doc! { "power": "1450 CV", "weight": "200 tonnes", "bucket": "12 m³", "reach": "14,2 m", "manufacturer": "Hitachi" },
            ),
            (
                "Libhere",
                MachineKind::Casement,
                doc! { "power": "700 CV", "weight": "450 tonnes", "bucket": "25 m³", "reach": "18,5 m", "manufacturer": "Liebherr" },
            ),
            (
                "Transwine",
                MachineKind::Transport,
                doc! { "power": "4000 CV", "capacity": "400 tonnes", "payload": "363 tonnes", "manufacturer": "Caterpillar" },
            ),
            (
                "Procaneq",
                MachineKind::Transport,
                doc! { "power": "3500 CV", "capacity": "320 tonnes", "payload": "290 tonnes", "manufacturer": "Komatsu" },
            ),
        ];

        for (name, kind, specifications) in fleet {
            let mut machine = Machine {
                _id: None,
                name: name.to_string(),
                kind,
                specifications: Some(specifications),
                is_active: true,
                created_at: DateTime::now(),
            };
            machine.save().await?;
        }
        log::info!("seeded machine fleet");
    }

    Ok(())
}
