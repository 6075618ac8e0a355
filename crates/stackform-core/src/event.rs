use crate::converge::Action;
use stackform_provider::StackStatus;

/// Progress notifications emitted while driving a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An existing stack was found in `region`.
    Located { stack: String, region: String },
    Submitted {
        stack: String,
        region: String,
        action: Action,
    },
    /// One status read during polling.
    Status { stack: String, status: StackStatus },
    /// The provider reported nothing to change.
    Unchanged { stack: String },
}
