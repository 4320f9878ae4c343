use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use beat_payment_engine::{sqlite::db::run_migrations, OrderFlowApi, SqliteDatabase};
use stripe_tools::StripeApi;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::stripe::StripeGateway,
    mailer::HttpMailer,
    routes::{health, stripe_webhook},
};

/// The concrete collaborator stack the production server runs with.
type LiveOrderFlow = OrderFlowApi<SqliteDatabase, SqliteDatabase, StripeGateway, HttpMailer>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    run_migrations(db.pool()).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let api = StripeApi::new(config.stripe.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = StripeGateway::new(api);
    let mailer = HttpMailer::new(config.mailer.clone());
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let order_flow: LiveOrderFlow = OrderFlowApi::new(db.clone(), db.clone(), gateway.clone(), mailer.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bps::access_log"))
            .app_data(web::Data::new(order_flow))
            .app_data(web::Data::new(config.clone()))
            .service(health)
            .service(web::resource("/webhook/stripe").route(web::post().to(
                stripe_webhook::<SqliteDatabase, SqliteDatabase, StripeGateway, HttpMailer>,
            )))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
