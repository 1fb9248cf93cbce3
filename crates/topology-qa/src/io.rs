//! WKT feature files
//!
//! One geometry per line. Blank lines and `#` comments are skipped, and the
//! 1-based line number becomes the feature id so reports point back into the
//! file.

use crate::error::CliError;
use geo::Geometry;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use topology_qa_lib::{Feature, FeatureCollection};
use wkt::{ToWkt, Wkt};

/// Parse a single WKT geometry
pub fn parse_geometry(text: &str) -> Result<Geometry<f64>, String> {
    let wkt = Wkt::<f64>::from_str(text.trim()).map_err(|e| e.to_string())?;
    Geometry::try_from(wkt).map_err(|e| e.to_string())
}

/// Parse the contents of a feature file
pub fn parse_features(path: &Path, contents: &str) -> Result<FeatureCollection, CliError> {
    let mut features = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let line_number = i + 1;
        let geometry = parse_geometry(text).map_err(|message| CliError::Wkt {
            path: path.to_path_buf(),
            line: line_number,
            message,
        })?;
        features.push(Feature::new(line_number as u64, geometry)?);
    }
    Ok(FeatureCollection::new(features)?)
}

/// Read a feature file
pub fn read_features(path: &Path) -> Result<FeatureCollection, CliError> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let collection = parse_features(path, &contents)?;
    tracing::info!(
        path = %path.display(),
        features = collection.info().feature_count,
        vertices = collection.info().vertex_count,
        "Loaded features"
    );
    Ok(collection)
}

/// Write an indicator layer as `<dir>/<name>.wkt`, one geometry per line
pub fn write_layer(
    dir: &Path,
    name: &str,
    geometries: &[Geometry<f64>],
) -> Result<PathBuf, CliError> {
    let path = dir.join(format!("{name}.wkt"));
    let mut contents = String::new();
    for geometry in geometries {
        contents.push_str(&geometry.wkt_string());
        contents.push('\n');
    }
    fs::write(&path, contents).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), count = geometries.len(), "Wrote layer");
    Ok(path)
}
