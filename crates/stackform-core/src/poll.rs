use crate::event::Event;
use stackform_provider::{ProviderError, StackApi, StackStatus};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Fixed wait between status reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollSettings {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// No wait between reads; for tests against the mock cloud.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// Read status until it is terminal, sleeping `settings.interval` between
/// reads. When `gone` is set, a not-found fault ends polling with that
/// status instead of failing.
pub(crate) fn until_terminal<A: StackApi + ?Sized>(
    conn: &A,
    stack: &str,
    settings: &PollSettings,
    gone: Option<StackStatus>,
    observer: &mut dyn FnMut(&Event),
) -> Result<StackStatus, ProviderError> {
    loop {
        let status = match conn.stack_status(stack) {
            Ok(s) => s,
            Err(e) if e.is_not_found() => match gone {
                Some(status) => {
                    warn!("stack {stack} vanished while polling; treating as {status}");
                    status
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };
        debug!("stack {stack}: {status}");
        observer(&Event::Status {
            stack: stack.to_owned(),
            status,
        });
        if status.is_terminal() {
            return Ok(status);
        }
        if !settings.interval.is_zero() {
            std::thread::sleep(settings.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackform_provider::MockCloud;

    #[test]
    fn default_interval_is_ten_seconds() {
        assert_eq!(PollSettings::default().interval, Duration::from_secs(10));
    }

    #[test]
    fn polls_until_terminal_and_reports_each_read() {
        let cloud = MockCloud::new(["r"]);
        let conn = cloud.region("r");
        conn.create_stack("web", r#"{"Resources": {}}"#).unwrap();
        let mut seen = Vec::new();
        let mut record = |e: &Event| seen.push(e.clone());
        let status =
            until_terminal(&conn, "web", &PollSettings::immediate(), None, &mut record).unwrap();
        assert_eq!(status, StackStatus::CREATE_COMPLETE);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn not_found_maps_to_gone_status_when_allowed() {
        let cloud = MockCloud::new(["r"]);
        let conn = cloud.region("r");
        let status = until_terminal(
            &conn,
            "missing",
            &PollSettings::immediate(),
            Some(StackStatus::DELETE_COMPLETE),
            &mut |_| {},
        )
        .unwrap();
        assert_eq!(status, StackStatus::DELETE_COMPLETE);

        let err = until_terminal(&conn, "missing", &PollSettings::immediate(), None, &mut |_| {})
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
