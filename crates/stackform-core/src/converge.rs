use crate::event::Event;
use crate::poll::{until_terminal, PollSettings};
use crate::CoreError;
use serde::Serialize;
use stackform_provider::{Connection, ProviderError, StackStatus};
use stackform_schema::Template;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// Terminal status a successful `self` ends in.
    pub fn expected_status(self) -> StackStatus {
        match self {
            Self::Create => StackStatus::CREATE_COMPLETE,
            Self::Update => StackStatus::UPDATE_COMPLETE,
            Self::Delete => StackStatus::DELETE_COMPLETE,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergeOptions {
    /// Refuse to touch a stack that already exists.
    pub create_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    /// The submitted operation reached its expected terminal status.
    Converged { action: Action, status: StackStatus },
    /// The provider had nothing to change; no polling took place.
    Unchanged,
}

/// Drive the named stack in `conn`'s region to `template`.
///
/// An absent stack is created and a present one updated. Exactly one
/// mutation is submitted; its completion is awaited by polling.
pub fn converge(
    conn: &dyn Connection,
    stack: &str,
    template: &Template,
    options: ConvergeOptions,
    poll: &PollSettings,
    observer: &mut dyn FnMut(&Event),
) -> Result<Outcome, CoreError> {
    let region = conn.region().to_string();

    let existing = match conn.describe_stack(stack) {
        Ok(summary) if summary.status != StackStatus::DELETE_COMPLETE => Some(summary),
        Ok(_) => None,
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let action = match existing {
        Some(ref summary) => {
            observer(&Event::Located {
                stack: stack.to_owned(),
                region: region.clone(),
            });
            if options.create_only {
                return Err(CoreError::CreateOnly(stack.to_owned()));
            }
            info!("stack {stack} exists in {region} ({}), updating", summary.status);
            Action::Update
        }
        None => {
            info!("stack {stack} absent from {region}, creating");
            Action::Create
        }
    };

    let document = template.canonical_json()?;
    let submitted = match action {
        Action::Create => conn.create_stack(stack, &document),
        _ => conn.update_stack(stack, &document),
    };
    match submitted {
        Ok(stack_id) => info!("submitted {action} of {stack} ({stack_id})"),
        Err(ProviderError::NoUpdates { message }) => {
            warn!("stack {stack}: {message}");
            observer(&Event::Unchanged {
                stack: stack.to_owned(),
            });
            return Ok(Outcome::Unchanged);
        }
        Err(e) => return Err(e.into()),
    }
    observer(&Event::Submitted {
        stack: stack.to_owned(),
        region,
        action,
    });

    let status = until_terminal(conn, stack, poll, None, observer)?;
    let expected = action.expected_status();
    if status != expected {
        return Err(CoreError::ConvergenceFailed {
            stack: stack.to_owned(),
            expected,
            actual: status,
        });
    }
    info!("stack {stack} converged: {status}");
    Ok(Outcome::Converged { action, status })
}
