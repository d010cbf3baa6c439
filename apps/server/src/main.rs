#![warn(clippy::all, clippy::pedantic)]

use std::env::var;
use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tracing::info;
use vigil_service::config::Config;
use vigil_service::dashboard::Dashboard;

mod error;
mod routes;
#[cfg(test)]
mod tests;

use error::AppError;
use logger::init_tracing;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_config(var("VIGIL_CONFIG").ok())?;
    let database = vigil_service::database::open(&config.database.path, 4).await?;
    let dashboard = web::Data::new(Dashboard::new(Arc::new(database)));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    run_server(addr, dashboard).await
}

async fn run_server(addr: SocketAddr, dashboard: web::Data<Dashboard>) -> Result<(), AppError> {
    info!("Dashboard API listening on {}", addr);

    HttpServer::new(move || App::new().app_data(dashboard.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
