pub mod routes;

use crate::{
    config::{Config, ServerConfig},
    credential::CredentialResolver,
    error::{GatewayError, Result},
    inference::ChatClient,
    logger,
    payload::PayloadNormalizer,
    solver::Solver,
};
use actix_cors::Cors;
use actix_web::{
    error::JsonPayloadError, middleware, web, App, HttpRequest, HttpServer,
};
use std::sync::Arc;

pub use routes::{configure_routes, ENDPOINTS};

/// Wires the real chat client behind the solver.
pub fn build_solver(config: &Config) -> Result<Solver> {
    let credentials = CredentialResolver::from_default_key(&config.api_key)?;
    let backend = ChatClient::new(config.model.clone())?;

    Ok(Solver::new(
        PayloadNormalizer::new(config.server.max_image_bytes),
        credentials,
        Arc::new(backend),
    ))
}

pub fn cors(config: &ServerConfig) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if config.allows_any_origin() {
        cors.allow_any_origin()
    } else {
        config
            .cors_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}

/// JSON bodies carry base64, so the limit is the image ceiling plus a third
/// and some room for the rest of the document. Saturates for huge ceilings.
pub fn json_limit(max_image_bytes: usize) -> usize {
    max_image_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(64 * 1024)
}

pub fn json_config(max_image_bytes: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(json_limit(max_image_bytes))
        .error_handler(|err, _req: &HttpRequest| {
            let mapped = match err {
                JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
                    GatewayError::PayloadTooLarge("Request body is too large".into())
                }
                other => {
                    log::debug!("Rejected JSON body: {}", other);
                    GatewayError::InvalidRequestShape(
                        "Request body must be a JSON object with the required fields".into(),
                    )
                }
            };
            mapped.into()
        })
}

pub async fn run(config: Config) -> std::io::Result<()> {
    let solver = build_solver(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let solver = web::Data::new(solver);

    let server_config = config.server.clone();
    let bind_address = server_config.bind_address();
    logger::log_startup_info("Vibe Math API", env!("CARGO_PKG_VERSION"), &bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&server_config))
            .wrap(middleware::Logger::default())
            .app_data(solver.clone())
            .app_data(json_config(server_config.max_image_bytes))
            .configure(configure_routes)
            .default_service(web::route().to(routes::not_found))
    })
    .bind(&bind_address)?
    .run()
    .await
}
