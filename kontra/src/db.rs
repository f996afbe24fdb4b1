//! Shared connection plumbing for the relational materializer and SQL
//! executors (C5/C6). The core is synchronous; `sqlx`/`tiberius` are async,
//! so every call into them is bridged through a short-lived current-thread
//! `tokio` runtime rather than requiring callers to be async themselves.

use std::net::TcpStream;

use sqlx::postgres::{PgPoolOptions, PgPool};
use tiberius::{AuthMethod, Client, Config as TiberiusConfig};
use tokio::net::TcpStream as TokioTcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::{
    error::{AppResult, resource_error},
    handle::DbParams
};

/// Tiberius speaks the `futures` `AsyncRead`/`AsyncWrite` traits; `Compat`
/// bridges a plain tokio `TcpStream` into that world.
pub type SqlServerClient = Client<Compat<TokioTcpStream>>;

/// Runs a future to completion on a fresh current-thread runtime. Owned
/// connections live only for the duration of one `execute`/`to_columnar`
/// call, so a per-call runtime is simpler than threading a shared one
/// through the engine.
pub fn run_blocking<F: std::future::Future>(fut: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start tokio current-thread runtime");
    runtime.block_on(fut)
}

pub async fn connect_postgres(params: &DbParams) -> AppResult<PgPool> {
    let url = postgres_url(params);
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .map_err(|e| resource_error(format!("failed to connect to postgres: {e}")))
}

fn postgres_url(params: &DbParams) -> String {
    let user = params.user.as_deref().unwrap_or("postgres");
    let password = params.password.as_deref().unwrap_or("");
    let host = params.host.as_deref().unwrap_or("localhost");
    let port = params.port.unwrap_or(5432);
    let database = params.database.as_deref().unwrap_or("postgres");
    format!("postgres://{user}:{password}@{host}:{port}/{database}")
}

pub async fn connect_sqlserver(params: &DbParams) -> AppResult<SqlServerClient> {
    let mut config = TiberiusConfig::new();
    config.host(params.host.as_deref().unwrap_or("localhost"));
    config.port(params.port.unwrap_or(1433));
    if let Some(db) = &params.database {
        config.database(db);
    }
    config.authentication(AuthMethod::sql_server(
        params.user.as_deref().unwrap_or(""),
        params.password.as_deref().unwrap_or("")
    ));
    config.trust_cert();

    let tcp = TokioTcpStream::connect(config.get_addr())
        .await
        .map_err(|e| resource_error(format!("failed to reach sql server: {e}")))?;
    tcp.set_nodelay(true).ok();

    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| resource_error(format!("failed to authenticate with sql server: {e}")))
}

/// Cheap reachability probe used by `DatabaseMaterializer::io_debug` and the
/// executor's `introspect`; avoids opening a full pooled connection just to
/// report whether the host is up.
pub fn tcp_reachable(host: &str, port: u16) -> bool {
    TcpStream::connect((host, port)).is_ok()
}
