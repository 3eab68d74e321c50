use mongodb::{bson::doc, options::IndexOptions, Client, Database, IndexModel};
use once_cell::sync::OnceCell;

static DB: OnceCell<Database> = OnceCell::new();

pub async fn connect(uri: String) {
    let client = Client::with_uri_str(uri)
        .await
        .expect("Failed to connect to database");
    let db = client.database("decapage");

    ensure_indexes(&db)
        .await
        .expect("Failed to create database indexes");

    DB.set(db).expect("Database already connected");
}

pub fn get_db() -> Database {
    DB.get().expect("Database is not available yet!").clone()
}

/// Unique indexes back the Conflict error path and make the progress upsert a
/// single atomic conditional write on its natural key.
async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<mongodb::bson::Document>("users")
        .create_indexes(
            vec![
                IndexModel::builder()
                    .keys(doc! { "username": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            ],
            None,
        )
        .await?;
    db.collection::<mongodb::bson::Document>("machines")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;
    db.collection::<mongodb::bson::Document>("operations")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "fiche_id": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;
    db.collection::<mongodb::bson::Document>("progress")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "panneau": 1, "tranche": 1, "niveau": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;
    Ok(())
}
