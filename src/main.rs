mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web::Data};
use dotenv::dotenv;
use std::env;
use std::fs;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db = db::establish_connection()
        .await
        .expect("Failed to connect to the database");

    // Le répertoire d'uploads doit exister avant la première requête multipart
    fs::create_dir_all(utils::upload::uploads_dir())?;

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);

    tracing::info!("MusicDesk API listening on port {}", port);

    let db_data = Data::new(db);

    HttpServer::new(move || {
        // Front Vite en dev ; les cookies de session exigent credentials
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:5001")
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        App::new()
            .wrap(cors)
            .app_data(db_data.clone())
            .configure(routes::configure_routes)
    })
    .bind(("127.0.0.1", port))?
    .run()
    .await
}
