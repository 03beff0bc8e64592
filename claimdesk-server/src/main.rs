#![deny(missing_docs)]
//! ClaimDesk server executable.
//!
//! Hosts HTTP endpoints for freight audits, dispute cases and workflow triggers.

mod crypto;
mod db;
mod models;
mod openapi;
mod routes;
mod schema;
mod workflows;

#[cfg(not(test))]
use actix_cors::Cors;
#[cfg(not(test))]
use actix_web::{App, HttpServer, http::header, web};
#[cfg(not(test))]
use dotenvy::dotenv;
#[cfg(not(test))]
use log::{debug, info, warn};

#[allow(unused_imports)]
use std::str::FromStr;

#[cfg(not(test))]
use crate::crypto::{bootstrap_keys_from_env, generate_api_key};
#[cfg(not(test))]
use crate::db::{DbPool, count_api_keys, ensure_api_keys, init_pool};
#[cfg(not(test))]
use crate::routes::{AppState, ServerConfig, configure};
#[cfg(not(test))]
use crate::workflows::NotificationService;

#[cfg(not(test))]
fn bootstrap_api_keys(pool: &DbPool) -> Result<(), String> {
    let keys = bootstrap_keys_from_env()?;
    let mut conn = pool
        .get()
        .map_err(|err| format!("failed to fetch database connection: {err}"))?;
    let added = ensure_api_keys(&mut conn, &keys)?;
    if added > 0 {
        info!("registered {added} api key(s) from CLAIMDESK_API_KEYS");
    }
    if count_api_keys(&mut conn)? == 0 {
        let key = generate_api_key()?;
        ensure_api_keys(
            &mut conn,
            &[crypto::BootstrapKey {
                label: "generated".to_string(),
                key: key.clone(),
            }],
        )?;
        warn!("no api keys configured; generated one, store it now: {key}");
    }
    Ok(())
}

#[cfg(not(test))]
fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let pool = init_pool().expect("database pool must initialize");
    bootstrap_api_keys(&pool).expect("api keys must bootstrap");

    // The webhook client is a `reqwest::blocking::Client`, which must not be
    // created inside the Actix runtime.
    let notifications = NotificationService::from_env();
    let config = ServerConfig::from_env().expect("CLAIMDESK_* settings must be valid");
    let sweep_interval = config.cache_ttl.max(std::time::Duration::from_secs(1));

    let state = web::Data::new(AppState::new(pool, config, notifications));

    let origins = std::env::var("CLAIMDESK_UI_ORIGINS")
        .unwrap_or_else(|_| "http://127.0.0.1:4200,http://localhost:4200".to_string());
    let allowed_origins: Vec<String> = origins
        .split(',')
        .map(|value| value.trim())
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();

    let listen_addr = std::env::var("CLAIMDESK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listen_port =
        u16::from_str(&std::env::var("CLAIMDESK_PORT").unwrap_or_else(|_| "8080".to_string()))
            .expect("CLAIMDESK_PORT must be a u16 number");
    let err_msg = format!("Can't bind {}:{}", &listen_addr, listen_port);

    actix_web::rt::System::new().block_on(async move {
        let cache = state.summary_cache.clone();
        actix_web::rt::spawn(async move {
            let mut interval = actix_web::rt::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                cache.sweep();
                debug!("swept batch summary cache, {} entries live", cache.len());
            }
        });

        info!("claimdesk server listening on {listen_addr}:{listen_port}");
        HttpServer::new(move || {
            let mut cors = Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
                .max_age(3600);
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            App::new()
                .wrap(actix_web::middleware::Logger::default())
                .wrap(cors)
                .app_data(state.clone())
                .configure(configure)
        })
        .bind((listen_addr, listen_port))
        .expect(&err_msg)
        .run()
        .await
    })
}

#[cfg(test)]
fn main() {}
