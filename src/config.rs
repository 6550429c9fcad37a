use std::net::SocketAddr;
use std::time::Duration;

use chrono_tz::Tz;

/// How schedule writes behave when the conflict check itself fails.
/// `FailOpen` preserves the legacy behavior of never letting a transient
/// read failure block scheduling; `FailClosed` surfaces the outage and
/// blocks the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    FailOpen,
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub dispatch_interval: Duration,
    pub dispatch_batch: i64,
    pub conflict_policy: ConflictPolicy,
    pub timezone: Tz,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;

        let bind_addr = env_parse("COACHD_BIND_ADDR")
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));

        let resend_api_key = std::env::var("RESEND_API_KEY").ok();
        let email_from = std::env::var("COACHD_EMAIL_FROM")
            .unwrap_or_else(|_| "Coach Desk <noreply@coachdesk.app>".to_string());

        let dispatch_interval =
            Duration::from_secs(env_parse("COACHD_DISPATCH_INTERVAL_SECS").unwrap_or(60));
        let dispatch_batch = env_parse("COACHD_DISPATCH_BATCH").unwrap_or(10);

        let conflict_policy = match std::env::var("COACHD_CONFLICT_POLICY").as_deref() {
            Ok("fail_closed") => ConflictPolicy::FailClosed,
            Ok("fail_open") | Err(_) => ConflictPolicy::FailOpen,
            Ok(other) => {
                return Err(anyhow::anyhow!(
                    "invalid COACHD_CONFLICT_POLICY `{other}` (expected fail_open or fail_closed)"
                ));
            }
        };

        let timezone: Tz = match std::env::var("COACHD_TIMEZONE") {
            Ok(name) => name
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid COACHD_TIMEZONE `{name}`"))?,
            Err(_) => chrono_tz::UTC,
        };

        Ok(Self {
            database_url,
            bind_addr,
            resend_api_key,
            email_from,
            dispatch_interval,
            dispatch_batch,
            conflict_policy,
            timezone,
        })
    }
}
