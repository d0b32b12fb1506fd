//! Input validation for pony registration and updates.
//!
//! Every violation is reported as [`KeeperError::Validation`] naming the offending
//! field; nothing is silently defaulted.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::KeeperError;
use crate::notification::NotifyChannel;

pub const MIN_DARK_MINUTE: i32 = 5;
/// Thirty days.
pub const MAX_DARK_MINUTE: i32 = 43_200;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{2,50}$").expect("valid name regex"));

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub fn validate_name(name: &str) -> Result<(), KeeperError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(KeeperError::validation(
            "name",
            "must be 2-50 characters of letters, digits, '-' or '_'",
        ))
    }
}

pub fn validate_passcode(passcode: &str) -> Result<(), KeeperError> {
    let len = passcode.chars().count();
    if (3..=50).contains(&len) {
        Ok(())
    } else {
        Err(KeeperError::validation(
            "passcode",
            "must be between 3 and 50 characters",
        ))
    }
}

pub fn validate_dark_minute(dark_minute: i32) -> Result<(), KeeperError> {
    if (MIN_DARK_MINUTE..=MAX_DARK_MINUTE).contains(&dark_minute) {
        Ok(())
    } else {
        Err(KeeperError::validation(
            "dark_minute",
            format!("must be between {MIN_DARK_MINUTE} and {MAX_DARK_MINUTE}"),
        ))
    }
}

pub fn parse_channel(discriminator: &str) -> Result<NotifyChannel, KeeperError> {
    discriminator
        .parse()
        .map_err(|err: crate::notification::UnknownChannel| {
            KeeperError::validation("notify_channel", err.to_string())
        })
}

/// Check `notify_url` against the chosen channel: an e-mail address for e-mail,
/// an absolute http(s) URL for webhooks.
pub fn validate_target(channel: NotifyChannel, target: &str) -> Result<(), KeeperError> {
    let valid = match channel {
        NotifyChannel::Email => target.len() <= 255 && EMAIL_RE.is_match(target),
        NotifyChannel::Webhook => {
            target.len() <= 255
                && Url::parse(target).is_ok_and(|url| {
                    matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
                })
        }
    };

    if valid {
        Ok(())
    } else {
        let message = match channel {
            NotifyChannel::Email => "must be a valid e-mail address",
            NotifyChannel::Webhook => "must be an absolute http(s) url",
        };
        Err(KeeperError::validation("notify_url", message))
    }
}
