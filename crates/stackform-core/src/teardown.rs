use crate::converge::Action;
use crate::event::Event;
use crate::locator::{find, StackHandle};
use crate::poll::{until_terminal, PollSettings};
use crate::CoreError;
use stackform_provider::{Cloud, StackStatus};
use stackform_schema::RegionName;
use tracing::info;

/// Delete the named stack and poll until it is gone.
///
/// Unlike convergence, an absent stack is an error. Returns the handle the
/// stack was located through and its final status.
pub fn destroy(
    cloud: &dyn Cloud,
    stack: &str,
    region: Option<&RegionName>,
    poll: &PollSettings,
    observer: &mut dyn FnMut(&Event),
) -> Result<(StackHandle, StackStatus), CoreError> {
    let handle =
        find(cloud, stack, region)?.ok_or_else(|| CoreError::StackNotFound(stack.to_owned()))?;
    observer(&Event::Located {
        stack: stack.to_owned(),
        region: handle.region.to_string(),
    });

    let conn = handle.connection();
    conn.delete_stack(stack)?;
    info!("submitted delete of {stack} in {}", handle.region);
    observer(&Event::Submitted {
        stack: stack.to_owned(),
        region: handle.region.to_string(),
        action: Action::Delete,
    });

    let expected = Action::Delete.expected_status();
    let status = until_terminal(conn, stack, poll, Some(expected), observer)?;
    if status != expected {
        return Err(CoreError::ConvergenceFailed {
            stack: stack.to_owned(),
            expected,
            actual: status,
        });
    }
    info!("stack {stack} deleted");
    Ok((handle, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackform_provider::{MockCall, MockCloud, Phase, StackOperation};

    const DOC: &str = r#"{"Resources": {}}"#;

    fn run(cloud: &MockCloud, stack: &str) -> Result<StackStatus, CoreError> {
        destroy(cloud, stack, None, &PollSettings::immediate(), &mut |_: &Event| {})
            .map(|(_, status)| status)
    }

    #[test]
    fn deletes_and_waits_for_completion() {
        let cloud = MockCloud::new(["r"]);
        cloud.seed_stack("r", "web", DOC).unwrap();
        assert_eq!(run(&cloud, "web").unwrap(), StackStatus::DELETE_COMPLETE);
        assert!(cloud.document("r", "web").is_none());
    }

    #[test]
    fn absent_stack_is_an_error_without_mutation() {
        let cloud = MockCloud::new(["r"]);
        let err = run(&cloud, "ghost").unwrap_err();
        assert!(matches!(err, CoreError::StackNotFound(ref s) if s == "ghost"));
        assert!(cloud.mutations().is_empty());
    }

    #[test]
    fn delete_failed_is_fatal() {
        let cloud = MockCloud::new(["r"]);
        cloud.seed_stack("r", "web", DOC).unwrap();
        let failed = StackStatus::new(StackOperation::Delete, Phase::Failed);
        cloud
            .script_statuses("r", "web", [StackStatus::DELETE_IN_PROGRESS, failed])
            .unwrap();
        let err = run(&cloud, "web").unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConvergenceFailed { actual, .. } if actual == failed
        ));
    }

    #[test]
    fn ambiguous_name_deletes_nothing() {
        let cloud = MockCloud::new(["us-f12g", "us-manassas"]);
        cloud.seed_stack("us-f12g", "inall", DOC).unwrap();
        cloud.seed_stack("us-manassas", "inall", DOC).unwrap();
        let err = run(&cloud, "inall").unwrap_err();
        assert!(matches!(err, CoreError::AmbiguousStack { .. }));
        assert!(!cloud
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::DeleteStack { .. })));
    }
}
