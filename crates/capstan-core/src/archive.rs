//! Reading chart archives
//!
//! Chart archives are `.tgz` files with the chart directory at the top
//! level (`<name>/Chart.yaml`, `<name>/values.yaml`, ...). The dependency
//! resolver only needs the identity of an archive, so the read path stops
//! at Chart.yaml instead of unpacking everything.

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;

use crate::chart::Chart;
use crate::error::{CoreError, Result};

/// Read the chart definition out of a `.tgz` archive on disk
pub fn read_chart_definition(archive_path: &Path) -> Result<Chart> {
    let file = File::open(archive_path)?;
    read_chart_definition_from(file)
}

/// Read the chart definition out of in-memory archive bytes
pub fn read_chart_definition_bytes(data: &[u8]) -> Result<Chart> {
    read_chart_definition_from(std::io::Cursor::new(data))
}

fn read_chart_definition_from<R: Read>(reader: R) -> Result<Chart> {
    let decoder = GzDecoder::new(reader);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();

        // Chart.yaml sits directly under the top-level chart directory
        let is_chart_yaml = path.file_name().is_some_and(|n| n == "Chart.yaml")
            && path.components().count() <= 2;

        if is_chart_yaml {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Chart::from_yaml(&content);
        }
    }

    Err(CoreError::Archive {
        message: "archive contains no Chart.yaml".to_string(),
    })
}

/// SHA256 digest of raw bytes, in the `sha256:<hex>` form used by indices
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{:x}", hasher.finalize())
}
