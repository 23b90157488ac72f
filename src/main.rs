// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use agentpay_server::{
    api::router,
    blockchain::{ChainClient, TxBuilder},
    config::AppConfig,
    ledger::LedgerDb,
    state::AppState,
    watcher::DepositWatcher,
};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let ledger =
        Arc::new(LedgerDb::open(&config.db_path).expect("Failed to open ledger database"));

    // Platform hot wallet for withdrawal broadcasts; requests still queue
    // when it is absent
    let tx_builder = match config.platform_private_key.as_deref() {
        Some(key) => match TxBuilder::new(&config.rpc_url, config.token_contract, key) {
            Ok(builder) => {
                tracing::info!(
                    platform_wallet = %builder.platform_address(),
                    "Platform hot wallet loaded"
                );
                Some(builder)
            }
            Err(e) => {
                eprintln!("Invalid PLATFORM_PRIVATE_KEY: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("PLATFORM_PRIVATE_KEY not set, withdrawals will stay queued");
            None
        }
    };

    let chain = ChainClient::new(&config.rpc_url).expect("Invalid RPC URL");
    match chain.chain_id().await {
        Ok(chain_id) => tracing::info!(chain_id, rpc_url = %config.rpc_url, "Connected to chain"),
        Err(e) => tracing::warn!(error = %e, "Could not query chain id, continuing anyway"),
    }

    let state = AppState::new(config, ledger.clone(), tx_builder);

    // Seed the reward schedule and the main pool (idempotent)
    state
        .rewards
        .seed(state.config.reward_pool_initial)
        .expect("Failed to seed reward configuration");

    // Surface withdrawals stranded in `processing` by a previous crash;
    // they need manual reconciliation against on-chain history
    state.withdrawals.log_stranded();

    let shutdown = CancellationToken::new();

    let watcher = DepositWatcher::new(
        ledger.clone(),
        chain,
        state.config.token_contract,
        state.config.deposit_confirmations,
        state.config.min_deposit,
    );
    tokio::spawn(watcher.run(shutdown.clone()));
    tokio::spawn(state.withdrawals.clone().run(shutdown.clone()));
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(%addr, "AgentPay server listening (docs at /docs)");

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    let serve_shutdown = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await;

    // Stop background tasks however the server exits
    shutdown.cancel();

    if let Err(e) = result {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Trip the shared cancellation token on ctrl-c or SIGTERM.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
