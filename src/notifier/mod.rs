/// Outbound trade alerts and inbound remote-control commands over the
/// Telegram Bot API, grounded in `original_source/telegram_bot/notifier.py`
/// (push side) and `original_source/telegram_bot/bot.py` (command side);
/// HTTP style follows `market_data::DexScreenerProvider`.
use crate::config::TradingControl;
use crate::error::{AppError, AppResult};
use crate::store::Store;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

fn short_wallet(address: &str) -> String {
    if address.len() > 10 {
        format!("{}...{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

fn bot_token_from_env() -> Option<String> {
    std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty())
}

fn chat_id_from_env() -> Option<i64> {
    std::env::var("TELEGRAM_CHAT_ID").ok().and_then(|s| s.parse().ok())
}

/// Pushes trade alerts. Independent of `ChatBot`, which waits for commands.
pub struct TelegramNotifier {
    http: Client,
    bot_token: Option<String>,
    chat_id: Option<i64>,
}

impl TelegramNotifier {
    pub fn from_env() -> Self {
        let bot_token = bot_token_from_env();
        let chat_id = chat_id_from_env();
        if bot_token.is_none() || chat_id.is_none() {
            info!("telegram notifier disabled: TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set");
        }
        Self { http: Client::new(), bot_token, chat_id }
    }

    fn enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn send(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.bot_token, self.chat_id) else { return };
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        if let Err(e) = self.http.post(&url).json(&json!({"chat_id": chat_id, "text": text})).send().await {
            warn!(error = %e, "telegram send failed");
        }
    }

    pub async fn notify_buy(&self, symbol: &str, amount_native: f64, price_usd: f64, wallet: &str, status: &str) {
        if !self.enabled() {
            return;
        }
        self.send(&format!(
            "BUY {symbol}\n{amount_native:.4} native @ ${price_usd:.6}\ntriggered by {}\nstatus: {status}",
            short_wallet(wallet)
        ))
        .await;
    }

    pub async fn notify_sell(&self, symbol: &str, reason: &str, pnl_native: f64) {
        if !self.enabled() {
            return;
        }
        let sign = if pnl_native >= 0.0 { "+" } else { "" };
        self.send(&format!("SELL {symbol} ({reason})\nPnL: {sign}{pnl_native:.4} native")).await;
    }

    pub async fn notify_skip(&self, symbol: &str, reason: &str) {
        if !self.enabled() {
            return;
        }
        self.send(&format!("SKIP {symbol}: {reason}")).await;
    }

    pub async fn notify_daily_summary(&self, trades: u32, pnl_native: f64) {
        if !self.enabled() {
            return;
        }
        self.send(&format!("Daily summary: {trades} trades, {pnl_native:.4} native PnL")).await;
    }

    pub async fn notify_error(&self, context: &str, error: &str) {
        if !self.enabled() {
            return;
        }
        self.send(&format!("ERROR in {context}: {error}")).await;
    }
}

#[derive(Debug, Deserialize)]
struct TelegramUpdatesResponse {
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

const HELP_TEXT: &str = "\
/status     - mode, kill switch, open positions\n\
/positions  - open positions with live PnL\n\
/pnl        - today's profit/loss\n\
/wallets    - monitored smart wallets\n\
/pause      - toggle the kill switch\n\
/help       - this message";

/// Long-polls `getUpdates` and answers a small command set, restricted to
/// `authorized_chat_id` when one is configured (spec §6: unauthorized
/// callers are ignored, never errored back to).
pub struct ChatBot {
    http: Client,
    bot_token: Option<String>,
    authorized_chat_id: Option<i64>,
    store: Store,
    control: TradingControl,
}

impl ChatBot {
    pub fn new(store: Store, control: TradingControl) -> Self {
        Self { http: Client::new(), bot_token: bot_token_from_env(), authorized_chat_id: chat_id_from_env(), store, control }
    }

    pub async fn run(&self) {
        if self.bot_token.is_none() {
            info!("chat bot disabled: TELEGRAM_BOT_TOKEN not set");
            return;
        }

        let mut offset = 0i64;
        loop {
            match self.poll(offset).await {
                Ok(next) => offset = next,
                Err(e) => {
                    warn!(error = %e, "chat bot poll failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn poll(&self, offset: i64) -> AppResult<i64> {
        let token = self.bot_token.as_ref().expect("checked in run");
        let url = format!("https://api.telegram.org/bot{token}/getUpdates?timeout=30&offset={offset}");
        let resp = self.http.get(&url).send().await.map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        let parsed: TelegramUpdatesResponse = resp.json().await.map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

        let mut next_offset = offset;
        for update in parsed.result {
            next_offset = update.update_id + 1;
            let Some(message) = update.message else { continue };
            if !self.is_authorized(message.chat.id) {
                continue;
            }
            let Some(text) = message.text else { continue };
            let reply = self.dispatch(&text).await;
            if let Some(reply) = reply {
                self.send_to(message.chat.id, &reply).await;
            }
        }
        Ok(next_offset)
    }

    fn is_authorized(&self, chat_id: i64) -> bool {
        self.authorized_chat_id.map(|id| id == chat_id).unwrap_or(true)
    }

    async fn dispatch(&self, text: &str) -> Option<String> {
        match text.split_whitespace().next().unwrap_or("") {
            "/status" => Some(self.cmd_status().await),
            "/positions" => Some(self.cmd_positions().await),
            "/pnl" => Some(self.cmd_pnl().await),
            "/wallets" => Some(self.cmd_wallets().await),
            "/pause" => Some(self.cmd_pause()),
            "/start" | "/help" => Some(HELP_TEXT.to_string()),
            _ => None,
        }
    }

    async fn cmd_status(&self) -> String {
        let mode = self.control.mode();
        let paused = if self.control.is_killed() { " [PAUSED]" } else { "" };
        match self.store.get_open_positions().await {
            Ok(positions) => format!("mode: {mode:?}{paused}\nopen positions: {}", positions.len()),
            Err(e) => format!("status unavailable: {e}"),
        }
    }

    async fn cmd_positions(&self) -> String {
        match self.store.get_open_positions().await {
            Ok(positions) if positions.is_empty() => "no open positions".to_string(),
            Ok(positions) => positions
                .iter()
                .map(|p| format!("{} x{:.2} pnl={:.4}", p.mint, p.multiplier(), p.unrealized_pnl_native))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("positions unavailable: {e}"),
        }
    }

    async fn cmd_pnl(&self) -> String {
        match self.store.todays_pnl().await {
            Ok(pnl) => format!("today's PnL: {pnl:.4} native"),
            Err(e) => format!("pnl unavailable: {e}"),
        }
    }

    async fn cmd_wallets(&self) -> String {
        match self.store.monitored_wallets().await {
            Ok(wallets) if wallets.is_empty() => "no monitored wallets".to_string(),
            Ok(wallets) => {
                let shown: Vec<String> = wallets.iter().take(20).map(|w| short_wallet(&w.address)).collect();
                format!("monitoring {} wallets:\n{}", wallets.len(), shown.join("\n"))
            }
            Err(e) => format!("wallets unavailable: {e}"),
        }
    }

    fn cmd_pause(&self) -> String {
        if self.control.is_killed() {
            self.control.reset_kill_switch();
            "trading resumed".to_string()
        } else {
            self.control.engage_kill_switch("paused via chat command");
            "trading paused".to_string()
        }
    }

    async fn send_to(&self, chat_id: i64, text: &str) {
        let token = self.bot_token.as_ref().expect("checked in run");
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        if let Err(e) = self.http.post(&url).json(&json!({"chat_id": chat_id, "text": text})).send().await {
            warn!(error = %e, "telegram reply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_wallet_truncates_long_addresses() {
        assert_eq!(short_wallet("5tzFkiKscjHb5gRMRhMkDw98JhxTFLYT7A3cCp1qhxgR"), "5tzFki...hxgR");
    }

    #[test]
    fn short_wallet_leaves_short_strings_untouched() {
        assert_eq!(short_wallet("abc"), "abc");
    }

    #[test]
    fn notifier_disabled_without_env_vars() {
        std::env::remove_var("TELEGRAM_BOT_TOKEN");
        std::env::remove_var("TELEGRAM_CHAT_ID");
        let n = TelegramNotifier::from_env();
        assert!(!n.enabled());
    }
}
