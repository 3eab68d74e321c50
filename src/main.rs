use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::io;

mod database;
mod errors;
mod models;
mod routes;
mod seed;
mod stats;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let db_uri: String =
        std::env::var("MONGODB_URI").unwrap_or_else(|_| String::from("mongodb://localhost:27017"));

    database::connect(db_uri).await;

    if std::env::var("SEED_ON_START").map(|value| value == "1").unwrap_or(false) {
        if let Err(error) = seed::run().await {
            log::error!("seeding failed: {error}");
        }
    }

    let stats_config = stats::StatsConfig::from_env();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .wrap(models::user::UserAuthenticationMiddlewareFactory)
            .app_data(web::Data::new(stats_config))
            .service(web::scope("/api").configure(routes::configure))
    })
    .bind(("127.0.0.1", 8000))?
    .run()
    .await
}
