//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;

use officedesk_ai::{OpenAiConfig, RetryPolicy};

use crate::workflows::ExhaustedPolicy;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown timezone `{0}`")]
    InvalidTimezone(String),
    #[error("{key}: `{value}` is not a time of day (expected HH:MM:SS)")]
    InvalidTime { key: &'static str, value: String },
    #[error("{key}: `{value}` is not a valid number")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key}: invalid value `{value}`")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub timezone: Tz,
    pub workers: usize,
    /// Grace period between submission and review generation.
    pub report_generate_delay: Duration,
    pub llm_max_retries: u32,
    pub llm_retry_delay: Duration,
    pub sweep_stagger: Duration,
    pub sweep_lookback_days: u32,
    /// Local time of the reconciliation sweep.
    pub check_report_time: NaiveTime,
    /// Local time of the task-progress run.
    pub daily_task_time: NaiveTime,
    pub exhausted_policy: ExhaustedPolicy,
    /// Shared secret for the schedule trigger endpoints; `None` disables them.
    pub schedule_key: Option<String>,
    pub openai: OpenAiConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7801)),
            timezone: chrono_tz::Asia::Shanghai,
            workers: 5,
            report_generate_delay: Duration::from_secs(5 * 60),
            llm_max_retries: 10,
            llm_retry_delay: Duration::from_millis(1000),
            sweep_stagger: Duration::from_secs(60),
            sweep_lookback_days: 1,
            check_report_time: NaiveTime::from_hms_opt(0, 30, 0).unwrap_or_default(),
            daily_task_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default(),
            exhausted_policy: ExhaustedPolicy::LeaveGenerating,
            schedule_key: None,
            openai: OpenAiConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(raw) = var("BIND_ADDR") {
            cfg.bind_addr = parse_value("BIND_ADDR", &raw)?;
        }
        if let Some(raw) = var("TIMEZONE") {
            cfg.timezone = Tz::from_str(&raw).map_err(|_| ConfigError::InvalidTimezone(raw))?;
        }
        if let Some(raw) = var("WORK_NUMS") {
            cfg.workers = parse_number("WORK_NUMS", &raw)?;
            if cfg.workers == 0 {
                return Err(ConfigError::InvalidValue { key: "WORK_NUMS", value: raw });
            }
        }
        if let Some(raw) = var("REPORT_GENERATE_DELAY_MINS") {
            let mins: u64 = parse_number("REPORT_GENERATE_DELAY_MINS", &raw)?;
            cfg.report_generate_delay = Duration::from_secs(mins.saturating_mul(60));
        }
        if let Some(raw) = var("LLM_MAX_RETRY_TIMES") {
            cfg.llm_max_retries = parse_number("LLM_MAX_RETRY_TIMES", &raw)?;
        }
        if let Some(raw) = var("LLM_RETRY_DELAY_MS") {
            cfg.llm_retry_delay = Duration::from_millis(parse_number("LLM_RETRY_DELAY_MS", &raw)?);
        }
        if let Some(raw) = var("SWEEP_STAGGER_SECS") {
            cfg.sweep_stagger = Duration::from_secs(parse_number("SWEEP_STAGGER_SECS", &raw)?);
        }
        if let Some(raw) = var("SWEEP_LOOKBACK_DAYS") {
            cfg.sweep_lookback_days = parse_number("SWEEP_LOOKBACK_DAYS", &raw)?;
            if cfg.sweep_lookback_days == 0 {
                return Err(ConfigError::InvalidValue { key: "SWEEP_LOOKBACK_DAYS", value: raw });
            }
        }
        if let Some(raw) = var("CHECK_REPORT_TIME") {
            cfg.check_report_time = parse_time("CHECK_REPORT_TIME", &raw)?;
        }
        if let Some(raw) = var("DAILY_TASK_TIME") {
            cfg.daily_task_time = parse_time("DAILY_TASK_TIME", &raw)?;
        }
        if let Some(raw) = var("EXHAUSTED_POLICY") {
            cfg.exhausted_policy = match raw.to_ascii_lowercase().as_str() {
                "leave_generating" => ExhaustedPolicy::LeaveGenerating,
                "mark_failed" => ExhaustedPolicy::MarkFailed,
                _ => return Err(ConfigError::InvalidValue { key: "EXHAUSTED_POLICY", value: raw }),
            };
        }
        cfg.schedule_key = var("DISPOSABLE_APP_KEY");

        if let Some(key) = var("OPENAI_API_KEY") {
            cfg.openai.api_key = key;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            cfg.openai.base_url = url;
        }
        if let Some(model) = var("OPENAI_MODEL") {
            cfg.openai.model = model;
        }
        if let Some(raw) = var("LLM_TIMEOUT_SECS") {
            cfg.openai.timeout = Duration::from_secs(parse_number("LLM_TIMEOUT_SECS", &raw)?);
        }

        Ok(cfg)
    }

    /// Retry policy of the completion client.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.llm_max_retries, self.llm_retry_delay)
    }
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: raw.to_string(),
    })
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_time(key: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ConfigError::InvalidTime {
            key,
            value: raw.to_string(),
        })
}
