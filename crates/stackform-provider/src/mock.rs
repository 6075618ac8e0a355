//! In-memory cloud for tests and the reference gateway.
//!
//! Ids come from a sequence owned by each `MockCloud` instance, so separate
//! tests never share numbering. Every API call is appended to a call log.
//!
//! Status reads drive the simulated lifecycle: a read returns the current
//! status and then moves an in-progress operation to its `*_COMPLETE`
//! counterpart, so a freshly submitted stack needs exactly two reads to reach
//! a terminal state. Statuses queued with `script_statuses` are returned
//! verbatim first, one per read.

use crate::{
    Cloud, Connection, ImageApi, ImageSummary, Phase, ProviderError, ResourceSummary, StackApi,
    StackStatus, StackSummary, NO_UPDATES_MARKER,
};
use stackform_schema::RegionName;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListRegions,
    ListStacks { region: String, name: Option<String> },
    DescribeStack { region: String, stack: String },
    DescribeStackResource { region: String, stack: String, resource: String },
    CreateStack { region: String, stack: String },
    UpdateStack { region: String, stack: String },
    DeleteStack { region: String, stack: String },
    StackStatus { region: String, stack: String },
    FindImages { region: String, key: String, value: String },
}

impl MockCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateStack { .. } | Self::UpdateStack { .. } | Self::DeleteStack { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct MockStack {
    stack_id: String,
    document: String,
    digest: String,
    status: StackStatus,
    created_at: String,
    resources: BTreeMap<String, ResourceSummary>,
    /// Last accepted revision, restored when an update rolls back.
    previous: Option<Revision>,
}

#[derive(Debug, Clone)]
struct Revision {
    document: String,
    digest: String,
    resources: BTreeMap<String, ResourceSummary>,
}

impl MockStack {
    /// Settle on `status`: a completed rollback reinstates the last accepted
    /// revision, any other completion makes the current one accepted.
    fn settle(&mut self, status: StackStatus) {
        self.status = status;
        if status.phase != Phase::Complete {
            return;
        }
        if status.operation.is_rollback() {
            if let Some(prev) = self.previous.take() {
                self.document = prev.document;
                self.digest = prev.digest;
                self.resources = prev.resources;
            }
        } else {
            self.previous = None;
        }
    }
}

#[derive(Debug, Default)]
struct RegionState {
    stacks: BTreeMap<String, MockStack>,
    images: Vec<ImageSummary>,
    scripts: BTreeMap<String, VecDeque<StackStatus>>,
}

#[derive(Debug, Default)]
struct MockState {
    regions: BTreeMap<String, RegionState>,
    next_id: u64,
    calls: Vec<MockCall>,
    injected: Option<(String, String)>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:06}", self.next_id)
    }

    fn region(&mut self, region: &str) -> Result<&mut RegionState, ProviderError> {
        self.regions
            .get_mut(region)
            .ok_or_else(|| ProviderError::from_fault("NotFound", format!("unknown region '{region}'")))
    }
}

fn is_live(stack: &MockStack) -> bool {
    stack.status != StackStatus::DELETE_COMPLETE
}

fn no_such_stack(name: &str) -> ProviderError {
    ProviderError::from_fault("ValidationError", format!("Stack with id {name} does not exist"))
}

/// Shared handle to one simulated cloud. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MockCloud {
    state: Arc<Mutex<MockState>>,
}

impl MockCloud {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cloud = Self::default();
        if let Ok(mut state) = cloud.state.lock() {
            for r in regions {
                state.regions.insert(r.into(), RegionState::default());
            }
        }
        cloud
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Fault {
                code: "InternalFailure".to_owned(),
                message: format!("mock state poisoned: {e}"),
            })
    }

    /// Place an already-converged stack in `region`.
    pub fn seed_stack(&self, region: &str, name: &str, document: &str) -> Result<String, ProviderError> {
        let mut state = self.lock()?;
        let stack_id = state.next_id("stack");
        let mut stack = MockStack {
            stack_id: stack_id.clone(),
            document: String::new(),
            digest: String::new(),
            status: StackStatus::CREATE_COMPLETE,
            created_at: chrono::Utc::now().to_rfc3339(),
            resources: BTreeMap::new(),
            previous: None,
        };
        apply_document(&mut state, &mut stack, document)?;
        state
            .regions
            .entry(region.to_owned())
            .or_default()
            .stacks
            .insert(name.to_owned(), stack);
        Ok(stack_id)
    }

    pub fn add_image(&self, region: &str, id: &str, name: &str) -> Result<(), ProviderError> {
        let mut state = self.lock()?;
        state
            .regions
            .entry(region.to_owned())
            .or_default()
            .images
            .push(ImageSummary {
                id: id.to_owned(),
                name: name.to_owned(),
            });
        Ok(())
    }

    /// Queue statuses returned verbatim by the next status reads of `stack`.
    pub fn script_statuses(
        &self,
        region: &str,
        stack: &str,
        statuses: impl IntoIterator<Item = StackStatus>,
    ) -> Result<(), ProviderError> {
        let mut state = self.lock()?;
        state
            .region(region)?
            .scripts
            .entry(stack.to_owned())
            .or_default()
            .extend(statuses);
        Ok(())
    }

    /// Make the next create/update/delete fail with this fault.
    pub fn fail_next_mutation(&self, code: &str, message: &str) -> Result<(), ProviderError> {
        self.lock()?.injected = Some((code.to_owned(), message.to_owned()));
        Ok(())
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Create, update and delete calls only.
    pub fn mutations(&self) -> Vec<MockCall> {
        self.calls().into_iter().filter(MockCall::is_mutation).collect()
    }

    pub fn document(&self, region: &str, stack: &str) -> Option<String> {
        let state = self.lock().ok()?;
        state
            .regions
            .get(region)?
            .stacks
            .get(stack)
            .filter(|s| is_live(s))
            .map(|s| s.document.clone())
    }

    pub fn current_status(&self, region: &str, stack: &str) -> Option<StackStatus> {
        let state = self.lock().ok()?;
        state.regions.get(region)?.stacks.get(stack).map(|s| s.status)
    }

    pub fn region_names(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.regions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Region-scoped view without recording a `ListRegions` call.
    pub fn region(&self, region: &str) -> MockConnection {
        MockConnection {
            cloud: self.clone(),
            region: RegionName::from(region),
        }
    }
}

/// Record the document and assign physical ids to any new logical resources.
fn apply_document(
    state: &mut MockState,
    stack: &mut MockStack,
    document: &str,
) -> Result<(), ProviderError> {
    let parsed: serde_json::Value = serde_json::from_str(document).map_err(|e| {
        ProviderError::from_fault("ValidationError", format!("Template format error: {e}"))
    })?;
    let mut resources = BTreeMap::new();
    if let Some(declared) = parsed.get("Resources").and_then(serde_json::Value::as_object) {
        for (logical_id, body) in declared {
            let resource_type = body
                .get("Type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let physical_id = match stack.resources.get(logical_id) {
                Some(existing) if existing.resource_type == resource_type => {
                    existing.physical_id.clone()
                }
                _ => {
                    let prefix = resource_type
                        .rsplit("::")
                        .next()
                        .unwrap_or("resource")
                        .to_lowercase();
                    state.next_id(&prefix)
                }
            };
            resources.insert(
                logical_id.clone(),
                ResourceSummary {
                    logical_id: logical_id.clone(),
                    physical_id,
                    resource_type,
                },
            );
        }
    }
    stack.resources = resources;
    stack.document = document.to_owned();
    stack.digest = blake3::hash(document.as_bytes()).to_hex().to_string();
    Ok(())
}

impl Cloud for MockCloud {
    fn regions(&self) -> Result<Vec<RegionName>, ProviderError> {
        let mut state = self.lock()?;
        state.calls.push(MockCall::ListRegions);
        Ok(state.regions.keys().map(|r| RegionName::from(r.as_str())).collect())
    }

    fn connect(&self, region: &RegionName) -> Result<Box<dyn Connection>, ProviderError> {
        self.lock()?.region(region)?;
        Ok(Box::new(MockConnection {
            cloud: self.clone(),
            region: region.clone(),
        }))
    }
}

pub struct MockConnection {
    cloud: MockCloud,
    region: RegionName,
}

impl MockConnection {
    fn summary(&self, name: &str, stack: &MockStack) -> StackSummary {
        StackSummary {
            name: name.to_owned(),
            stack_id: stack.stack_id.clone(),
            region: self.region.to_string(),
            status: stack.status,
            created_at: stack.created_at.clone(),
        }
    }

    fn take_injected(state: &mut MockState) -> Result<(), ProviderError> {
        match state.injected.take() {
            Some((code, message)) => Err(ProviderError::from_fault(code, message)),
            None => Ok(()),
        }
    }
}

impl StackApi for MockConnection {
    fn region(&self) -> &RegionName {
        &self.region
    }

    fn list_stacks(&self, name: Option<&str>) -> Result<Vec<StackSummary>, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::ListStacks {
            region: self.region.to_string(),
            name: name.map(str::to_owned),
        });
        let region = state.region(&self.region)?;
        Ok(region
            .stacks
            .iter()
            .filter(|(n, s)| is_live(s) && name.map_or(true, |want| want == n.as_str()))
            .map(|(n, s)| self.summary(n, s))
            .collect())
    }

    fn describe_stack(&self, name: &str) -> Result<StackSummary, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::DescribeStack {
            region: self.region.to_string(),
            stack: name.to_owned(),
        });
        let region = state.region(&self.region)?;
        match region.stacks.get(name) {
            Some(s) if is_live(s) => Ok(self.summary(name, s)),
            _ => Err(no_such_stack(name)),
        }
    }

    fn describe_stack_resource(
        &self,
        stack: &str,
        resource: &str,
    ) -> Result<ResourceSummary, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::DescribeStackResource {
            region: self.region.to_string(),
            stack: stack.to_owned(),
            resource: resource.to_owned(),
        });
        let region = state.region(&self.region)?;
        let s = region
            .stacks
            .get(stack)
            .filter(|s| is_live(s))
            .ok_or_else(|| no_such_stack(stack))?;
        s.resources.get(resource).cloned().ok_or_else(|| {
            ProviderError::from_fault(
                "ValidationError",
                format!("Resource {resource} does not exist for stack {stack}"),
            )
        })
    }

    fn create_stack(&self, name: &str, document: &str) -> Result<String, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::CreateStack {
            region: self.region.to_string(),
            stack: name.to_owned(),
        });
        Self::take_injected(&mut state)?;
        state.region(&self.region)?;
        if let Some(existing) = state.regions.get(self.region.as_str()).and_then(|r| r.stacks.get(name)) {
            if is_live(existing) {
                return Err(ProviderError::from_fault(
                    "AlreadyExistsException",
                    format!("Stack [{name}] already exists"),
                ));
            }
        }
        let stack_id = state.next_id("stack");
        let mut stack = MockStack {
            stack_id: stack_id.clone(),
            document: String::new(),
            digest: String::new(),
            status: StackStatus::CREATE_IN_PROGRESS,
            created_at: chrono::Utc::now().to_rfc3339(),
            resources: BTreeMap::new(),
            previous: None,
        };
        apply_document(&mut state, &mut stack, document)?;
        state.region(&self.region)?.stacks.insert(name.to_owned(), stack);
        tracing::debug!("mock: created {name} as {stack_id}");
        Ok(stack_id)
    }

    fn update_stack(&self, name: &str, document: &str) -> Result<String, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::UpdateStack {
            region: self.region.to_string(),
            stack: name.to_owned(),
        });
        Self::take_injected(&mut state)?;
        let mut stack = match state.region(&self.region)?.stacks.get(name) {
            Some(s) if is_live(s) => s.clone(),
            _ => return Err(no_such_stack(name)),
        };
        if !stack.status.is_terminal() {
            return Err(ProviderError::from_fault(
                "ValidationError",
                format!("Stack:{} is in {} state and can not be updated.", stack.stack_id, stack.status),
            ));
        }
        let digest = blake3::hash(document.as_bytes()).to_hex().to_string();
        if digest == stack.digest {
            return Err(ProviderError::from_fault(
                "ValidationError",
                format!("{NO_UPDATES_MARKER}."),
            ));
        }
        stack.previous = Some(Revision {
            document: stack.document.clone(),
            digest: stack.digest.clone(),
            resources: stack.resources.clone(),
        });
        apply_document(&mut state, &mut stack, document)?;
        stack.status = StackStatus::UPDATE_IN_PROGRESS;
        let stack_id = stack.stack_id.clone();
        state.region(&self.region)?.stacks.insert(name.to_owned(), stack);
        Ok(stack_id)
    }

    fn delete_stack(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::DeleteStack {
            region: self.region.to_string(),
            stack: name.to_owned(),
        });
        Self::take_injected(&mut state)?;
        let region = state.region(&self.region)?;
        // Deleting an absent stack is accepted silently, as real providers do.
        if let Some(s) = region.stacks.get_mut(name) {
            if is_live(s) {
                s.status = StackStatus::DELETE_IN_PROGRESS;
            }
        }
        Ok(())
    }

    fn stack_status(&self, name: &str) -> Result<StackStatus, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::StackStatus {
            region: self.region.to_string(),
            stack: name.to_owned(),
        });
        let region = state.region(&self.region)?;
        let Some(stack) = region.stacks.get_mut(name) else {
            return Err(no_such_stack(name));
        };
        if let Some(next) = region.scripts.get_mut(name).and_then(VecDeque::pop_front) {
            stack.settle(next);
            return Ok(next);
        }
        let current = stack.status;
        if current.phase == Phase::InProgress || current.phase == Phase::CleanupInProgress {
            stack.settle(StackStatus::new(current.operation, Phase::Complete));
        }
        Ok(current)
    }
}

impl ImageApi for MockConnection {
    fn find_images_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<ImageSummary>, ProviderError> {
        let mut state = self.cloud.lock()?;
        state.calls.push(MockCall::FindImages {
            region: self.region.to_string(),
            key: key.to_owned(),
            value: value.to_owned(),
        });
        let region = state.region(&self.region)?;
        if key != "Name" {
            return Ok(Vec::new());
        }
        Ok(region
            .images
            .iter()
            .filter(|i| i.name == value)
            .cloned()
            .collect())
    }
}
