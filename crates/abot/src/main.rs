use std::sync::Arc;

use abot_core::{config::Config, repository::ApplicantRepository};
use abot_supabase::SupabaseClient;

#[tokio::main]
async fn main() -> Result<(), abot_core::Error> {
    abot_core::logging::init("abot")?;

    let cfg = Arc::new(Config::load()?);

    let backend = Arc::new(SupabaseClient::new(&cfg)?);
    tracing::info!(
        url = %cfg.supabase_url,
        active = %cfg.active_table,
        archive = %cfg.archive_table,
        "backend configured"
    );
    let repo = Arc::new(ApplicantRepository::new(backend.clone(), backend));

    abot_telegram::router::run_polling(cfg, repo)
        .await
        .map_err(|e| abot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
