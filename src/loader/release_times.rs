//! Parses the release-times CSV (`<release-times-csv>`
//! argument): one row per instance to simulate, `instance_id,release_time`.

use serde::Deserialize;

use crate::error::Result;
use crate::model::InstanceId;

#[derive(Debug, Deserialize)]
struct ReleaseTimeRow {
    instance_id: String,
    release_time: i64,
}

/// Reads the CSV at `path` into `(instance id, release time)` pairs, in
/// file order — the order the driver's queue is seeded in.
pub fn load_release_times(path: &str) -> Result<Vec<(InstanceId, i64)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for record in reader.deserialize() {
        let row: ReleaseTimeRow = record?;
        out.push((InstanceId::new(row.instance_id), row.release_time));
    }
    Ok(out)
}
