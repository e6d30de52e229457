//! NDJSON bulk load through the partitioned write path.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use octofhir_partition::PartitionedStorage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub written: usize,
    pub rejected: usize,
}

/// Write every non-blank line of `reader` as one resource.
///
/// Resources carrying an `id` are written with that id (update); the rest get
/// a server-assigned id (create). A line that fails to parse or is rejected
/// by storage is logged and counted; I/O errors abort the load.
pub async fn load_ndjson<R>(storage: &PartitionedStorage, reader: R) -> anyhow::Result<LoadReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = LoadReport::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let resource: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed NDJSON line");
                report.rejected += 1;
                continue;
            }
        };

        let has_id = resource
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        let written = if has_id {
            storage.update(&resource).await
        } else {
            storage.create(&resource).await
        };

        match written {
            Ok(stored) => {
                debug!(
                    line = line_no,
                    resource = %format!("{}/{}", stored.resource_type, stored.id),
                    partition = %stored.partition,
                    "Loaded resource"
                );
                report.written += 1;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Resource rejected");
                report.rejected += 1;
            }
        }
    }

    Ok(report)
}
