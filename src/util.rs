const SMTP_HOST: &str = "SMTP_HOST";
const SMTP_PORT: &str = "SMTP_PORT";
const SMTP_USER: &str = "SMTP_USER";
const SMTP_PASSWORD: &str = "SMTP_PASSWORD";
const EMAIL_FROM: &str = "EMAIL_FROM";
const EMAIL_TO: &str = "EMAIL_TO";

const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

const WEBHOOK_URL: &str = "WEBHOOK_URL";

const DEFAULT_SMTP_PORT: u16 = 587;

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn get_default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

pub fn get_smtp_host() -> Option<String> {
    non_empty_var(SMTP_HOST)
}

pub fn get_smtp_port() -> Option<u16> {
    non_empty_var(SMTP_PORT).and_then(|port| port.parse().ok())
}

pub fn get_smtp_user() -> Option<String> {
    non_empty_var(SMTP_USER)
}

pub fn get_smtp_password() -> Option<String> {
    non_empty_var(SMTP_PASSWORD)
}

pub fn get_email_from() -> Option<String> {
    non_empty_var(EMAIL_FROM)
}

/// Comma separated list of recipients
pub fn get_email_to() -> Option<Vec<String>> {
    non_empty_var(EMAIL_TO).map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(String::from)
            .collect()
    })
}

pub fn get_telegram_bot_token() -> Option<String> {
    non_empty_var(TELEGRAM_BOT_TOKEN)
}

pub fn get_telegram_chat_id() -> Option<String> {
    non_empty_var(TELEGRAM_CHAT_ID)
}

pub fn get_webhook_url() -> Option<String> {
    non_empty_var(WEBHOOK_URL)
}
