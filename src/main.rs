use std::sync::Arc;

use mining_engine::auth::StaticTokenAuth;
use mining_engine::config::ServerConfig;
use mining_engine::domain::LedgerStore;
use mining_engine::logging;
use mining_engine::mining::MiningEngine;
use mining_engine::payout::WithdrawalEngine;
use mining_engine::server::{self, AppState};
use mining_engine::store::MemoryLedgerStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = ServerConfig::from_env()?;
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new(config.tunables.clone()));

    let mut auth = StaticTokenAuth::new();
    for (token, user_id) in &config.tokens {
        auth = auth.with_token(token, user_id);
        // Known users get their ledger row up front; the engines treat a
        // missing row as a provisioning bug, not a signup path.
        store.create_profile(user_id).await?;
    }

    let state = AppState {
        mining: Arc::new(MiningEngine::new(store.clone(), config.tunables.clone())),
        withdrawals: Arc::new(WithdrawalEngine::new(store.clone(), config.tunables.clone())),
        auth: Arc::new(auth),
    };

    server::serve(state, config.bind_addr).await?;
    Ok(())
}
