use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher as UpdateDispatcher, dptree, prelude::*, types::BotCommand};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use abot_core::{
    alerts::SubscriptionAlerts,
    command::CATALOG,
    config::Config,
    dispatch::Dispatcher,
    domain::ChatId,
    messaging::port::MessagingPort,
    repository::ApplicantRepository,
    session::SessionStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
    pub chat_locks: Arc<ChatLocks>,
}

/// Serializes update handling per chat so flow steps are processed in order.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub fn bot_commands() -> Vec<BotCommand> {
    CATALOG
        .iter()
        .map(|(name, _, desc)| BotCommand::new(*name, *desc))
        .collect()
}

pub async fn run_polling(cfg: Arc<Config>, repo: Arc<ApplicantRepository>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }
    tracing::info!(allowed_users = cfg.telegram_allowed_users.len(), "authorization loaded");

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        tracing::warn!(error = %e, "failed to register bot commands");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let cancel = CancellationToken::new();
    let alerts_task = match (cfg.alerts_enabled, cfg.alert_chat_id) {
        (true, Some(chat_id)) => {
            let alerts = SubscriptionAlerts::new(
                repo.clone(),
                messenger.clone(),
                ChatId(chat_id),
                cfg.alert_hour,
                cfg.expiring_window_days,
                cfg.telegram_safe_limit,
            );
            Some(alerts.start(cancel.clone()))
        }
        (true, None) => {
            tracing::info!("daily report disabled: TELEGRAM_CHAT_ID not set");
            None
        }
        (false, _) => None,
    };

    let dispatcher = Arc::new(Dispatcher::new(
        repo,
        SessionStore::new(cfg.flow_timeout),
        cfg.expiring_window_days,
    ));

    let state = Arc::new(AppState {
        cfg,
        dispatcher,
        messenger,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Some(handle) = alerts_task {
        let _ = handle.await;
    }
    tracing::info!("bot stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_catalog_command() {
        let cmds = bot_commands();
        assert_eq!(cmds.len(), CATALOG.len());
        assert!(cmds.iter().any(|c| c.command == "list_pending"));
        assert!(cmds
            .iter()
            .all(|c| c.command.chars().all(|ch| ch.is_ascii_lowercase() || ch == '_')));
    }

    #[tokio::test]
    async fn chat_locks_are_reusable() {
        let locks = ChatLocks::default();
        drop(locks.lock_chat(1).await);
        let _again = locks.lock_chat(1).await;
        let _other = locks.lock_chat(2).await;
    }
}
