//! Delivering run summaries: log, email.
//!
//! Delivery never affects the trading outcome. [`deliver`] logs a failure
//! and returns.

use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{error, info, warn};

use crate::config::{EmailConfig, NotifyConfig, secret_from_env};
use crate::error::{Error, Result};
use crate::summary::RunSummary;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A notification could not be delivered.
#[derive(Debug, thiserror::Error)]
#[error("delivery via {channel} failed: {message}")]
pub struct DeliveryError {
    pub channel: &'static str,
    pub message: String,
}

impl DeliveryError {
    fn email(e: impl std::fmt::Display) -> Self {
        Self {
            channel: "email",
            message: e.to_string(),
        }
    }
}

/// Receives the summary of a run.
pub trait Notifier {
    fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError> {
        (**self).send(summary)
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError> {
        (**self).send(summary)
    }
}

/// Send `summary`, logging (never propagating) a delivery failure.
///
/// Returns whether delivery succeeded.
pub fn deliver<N: Notifier + ?Sized>(notifier: &N, summary: &RunSummary) -> bool {
    match notifier.send(summary) {
        Ok(()) => true,
        Err(e) => {
            error!("Notification not delivered: {e}");
            false
        }
    }
}

/// Writes the summary through `log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError> {
        if summary.needs_attention() {
            warn!("{}", summary.subject());
        } else {
            info!("{}", summary.subject());
        }
        for line in summary.to_string().lines() {
            info!("  {line}");
        }
        Ok(())
    }
}

/// SMTP delivery (STARTTLS).
pub struct EmailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build from config, reading the SMTP password from the environment.
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let password = secret_from_env(&config.password_env)?;
        let credentials = Credentials::new(config.username.clone(), password.to_string());

        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::Config(format!("smtp host {}: {e}", config.smtp_host)))?
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    /// The message that would be sent for `summary`.
    pub fn message(&self, summary: &RunSummary) -> std::result::Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(summary.subject())
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder.body(summary.to_string()).map_err(DeliveryError::email)
    }
}

impl Notifier for EmailNotifier {
    fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError> {
        let message = self.message(summary)?;
        self.transport.send(&message).map_err(DeliveryError::email)?;
        info!("Email summary sent to {} recipient(s)", self.to.len());
        Ok(())
    }
}

/// Sends to every notifier, even after one fails.
pub struct Notifiers(pub Vec<Box<dyn Notifier>>);

impl Notifier for Notifiers {
    fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError> {
        let mut first_error = None;
        for notifier in &self.0 {
            if let Err(e) = notifier.send(summary) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Log notifier, plus email when configured.
pub fn from_config(config: &NotifyConfig) -> Result<Notifiers> {
    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(email) = &config.email {
        notifiers.push(Box::new(EmailNotifier::from_config(email)?));
    }
    Ok(Notifiers(notifiers))
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse::<Mailbox>()
        .map_err(|e| Error::Config(format!("invalid email address {addr:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use allocbook::{Price, RebalanceTarget, Symbol};
    use chrono::NaiveDate;

    use super::*;

    struct Recording(Rc<RefCell<Vec<String>>>);

    impl Notifier for Recording {
        fn send(&self, summary: &RunSummary) -> std::result::Result<(), DeliveryError> {
            self.0.borrow_mut().push(summary.subject());
            Ok(())
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn send(&self, _: &RunSummary) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError {
                channel: "test",
                message: "smtp down".into(),
            })
        }
    }

    fn summary() -> RunSummary {
        let target = RebalanceTarget::new(Symbol::new("TQQQ"), Price(2000_00)).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let mut s = RunSummary::new(date, "sandbox", &target);
        s.skip("mid-month");
        s
    }

    #[test]
    fn deliver_swallows_failure() {
        assert!(!deliver(&Failing, &summary()));
        assert!(deliver(&LogNotifier, &summary()));
    }

    #[test]
    fn fan_out_continues_after_failure() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let list: Vec<Box<dyn Notifier>> =
            vec![Box::new(Failing), Box::new(Recording(Rc::clone(&sent)))];
        let notifiers = Notifiers(list);

        let err = notifiers.send(&summary()).unwrap_err();
        assert_eq!(err.channel, "test");
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn email_message_headers() {
        let notifier = EmailNotifier {
            transport: SmtpTransport::unencrypted_localhost(),
            from: parse_mailbox("Rebalancer <bot@example.com>").unwrap(),
            to: vec![
                parse_mailbox("me@example.com").unwrap(),
                parse_mailbox("ops@example.com").unwrap(),
            ],
        };
        let message = notifier.message(&summary()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: TQQQ rebalance 2026-01-15: skipped"));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("Reason: mid-month"));
    }

    #[test]
    fn bad_address_is_config_error() {
        assert!(matches!(parse_mailbox("not an address"), Err(Error::Config(_))));
    }
}
