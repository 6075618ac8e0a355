use crate::CoreError;
use stackform_provider::{Cloud, Connection, StackStatus, StackSummary};
use stackform_schema::RegionName;
use tracing::{debug, info};

/// A stack found by `find`, with the connection to its region.
pub struct StackHandle {
    pub region: RegionName,
    pub summary: StackSummary,
    connection: Box<dyn Connection>,
}

impl StackHandle {
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }
}

impl std::fmt::Debug for StackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackHandle")
            .field("region", &self.region)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// Locate a live stack by name.
///
/// With a region, only that region is searched. Without one, every region is
/// searched in name order; a name present in more than one region is an
/// error. Absence is `Ok(None)`.
pub fn find(
    cloud: &dyn Cloud,
    name: &str,
    region: Option<&RegionName>,
) -> Result<Option<StackHandle>, CoreError> {
    let regions = match region {
        Some(r) => vec![r.clone()],
        None => {
            let mut all = cloud.regions()?;
            all.sort();
            all
        }
    };

    let mut matches = Vec::new();
    for region in regions {
        let connection = cloud.connect(&region)?;
        let found = connection
            .list_stacks(Some(name))?
            .into_iter()
            .find(|s| s.name == name && s.status != StackStatus::DELETE_COMPLETE);
        match found {
            Some(summary) => {
                debug!("stack {name} found in {region} ({})", summary.status);
                matches.push(StackHandle {
                    region,
                    summary,
                    connection,
                });
            }
            None => debug!("stack {name} not in {region}"),
        }
    }

    if matches.len() > 1 {
        return Err(CoreError::AmbiguousStack {
            name: name.to_owned(),
            regions: matches.iter().map(|h| h.region.to_string()).collect(),
        });
    }
    let handle = matches.pop();
    if let Some(ref h) = handle {
        info!("located stack {name} in {}", h.region);
    }
    Ok(handle)
}
