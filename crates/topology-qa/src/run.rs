//! Subcommand execution
//!
//! Each subcommand loads its inputs, runs one finder with a
//! [`TracingMonitor`], writes the indicator layers and returns a [`Summary`].

use crate::cli::{Command, CommonArgs};
use crate::error::CliError;
use crate::io::{parse_geometry, read_features, write_layer};
use geo::Geometry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use topology_qa_lib::{
    CloseVertexConfig, CloseVertexFinder, FeatureSegment, IndicatorStats, InternalMatchConfig,
    InternalMatchedSegmentFinder, MatchConfig, MatchedSegmentFinder, OverlapConfig,
    OverlapFinder, TaskMonitor, TracingMonitor,
};

/// Outcome of one subcommand
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub command: &'static str,
    /// Named counts (matched segments, overlapping features, ...)
    pub counts: BTreeMap<&'static str, usize>,
    /// Statistics of every indicator layer
    pub layers: BTreeMap<&'static str, IndicatorStats>,
}

impl Summary {
    fn new(command: &'static str) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    /// Log the summary at `info`
    pub fn log(&self) {
        for (name, count) in &self.counts {
            tracing::info!(command = self.command, "{name}: {count}");
        }
        for (name, stats) in &self.layers {
            tracing::info!(
                command = self.command,
                count = stats.count,
                min_length = stats.min_length,
                max_length = stats.max_length,
                "Layer {name}"
            );
        }
    }
}

/// Indicator layers produced by a subcommand
type Layers = Vec<(&'static str, Vec<Geometry<f64>>)>;

/// Run a parsed command to completion
pub fn run(command: &Command) -> Result<Summary, CliError> {
    let monitor = TracingMonitor::new();
    let common = command.common();
    let (summary, layers) = match command {
        Command::Gaps {
            input,
            no_indicators,
            common,
        } => run_gaps(input, !no_indicators, common, &monitor)?,
        Command::Matches {
            reference,
            subject,
            common,
        } => run_matches(reference, subject, common, &monitor)?,
        Command::Overlaps {
            input,
            other,
            common,
        } => run_overlaps(input, other.as_deref(), common, &monitor)?,
        Command::CloseVertices {
            input0,
            input1,
            common,
        } => run_close_vertices(input0, input1, common, &monitor)?,
    };

    if let Some(dir) = &common.output {
        std::fs::create_dir_all(dir).map_err(|source| CliError::Io {
            path: dir.clone(),
            source,
        })?;
        for (name, geometries) in &layers {
            write_layer(dir, name, geometries)?;
        }
        tracing::info!(dir = %dir.display(), layers = layers.len(), "Wrote indicator layers");
    }
    Ok(summary)
}

fn fence(common: &CommonArgs) -> Result<Option<Geometry<f64>>, CliError> {
    common
        .fence
        .as_deref()
        .map(|text| parse_geometry(text).map_err(CliError::Fence))
        .transpose()
}

fn segment_lines(segments: &[FeatureSegment]) -> Vec<Geometry<f64>> {
    segments
        .iter()
        .map(|s| Geometry::Line(s.line()))
        .collect()
}

fn add_layer(
    summary: &mut Summary,
    layers: &mut Layers,
    name: &'static str,
    geometries: Vec<Geometry<f64>>,
) {
    summary
        .layers
        .insert(name, IndicatorStats::from_geometries(&geometries));
    layers.push((name, geometries));
}

fn run_gaps(
    input: &Path,
    create_indicators: bool,
    common: &CommonArgs,
    monitor: &dyn TaskMonitor,
) -> Result<(Summary, Layers), CliError> {
    let collection = read_features(input)?;
    let config = InternalMatchConfig {
        params: common.match_parameters(),
        fence: fence(common)?,
        create_indicators,
        index: common.index.into(),
    };
    let mut finder = InternalMatchedSegmentFinder::new(&collection, config)?;
    let results = finder.compute_matches(monitor).ok_or(CliError::Cancelled)?;

    let mut summary = Summary::new("gaps");
    summary
        .counts
        .insert("unique_segments", results.unique_segments().len());
    summary
        .counts
        .insert("matched_segments", results.matched_feature_segments().len());
    summary
        .counts
        .insert("matched_features", results.matched_features().len());
    summary
        .counts
        .insert("triangle_matches", results.triangle_matches().len());

    // Both layers stay empty with --no-indicators
    let mut layers = Layers::new();
    add_layer(
        &mut summary,
        &mut layers,
        "matched_segments",
        results.matched_segments().to_vec(),
    );
    add_layer(
        &mut summary,
        &mut layers,
        "size_indicators",
        results.size_indicators().to_vec(),
    );
    Ok((summary, layers))
}

fn run_matches(
    reference: &Path,
    subject: &Path,
    common: &CommonArgs,
    monitor: &dyn TaskMonitor,
) -> Result<(Summary, Layers), CliError> {
    let reference = read_features(reference)?;
    let subject = read_features(subject)?;
    let config = MatchConfig {
        params: common.match_parameters(),
        index: common.index.into(),
    };
    let mut finder = MatchedSegmentFinder::new(&reference, &subject, config)?;
    let results = finder.compute_matches(monitor).ok_or(CliError::Cancelled)?;

    let mut summary = Summary::new("matches");
    summary
        .counts
        .insert("reference_matched", results.reference_matched().len());
    summary
        .counts
        .insert("subject_matched", results.subject_matched().len());

    let mut layers = Layers::new();
    add_layer(
        &mut summary,
        &mut layers,
        "reference_matched",
        segment_lines(results.reference_matched()),
    );
    add_layer(
        &mut summary,
        &mut layers,
        "subject_matched",
        results.matched_segments(),
    );
    add_layer(
        &mut summary,
        &mut layers,
        "size_indicators",
        results.size_indicators().to_vec(),
    );
    Ok((summary, layers))
}

fn run_overlaps(
    input: &Path,
    other: Option<&Path>,
    common: &CommonArgs,
    monitor: &dyn TaskMonitor,
) -> Result<(Summary, Layers), CliError> {
    let c0 = read_features(input)?;
    let c1 = other.map(read_features).transpose()?;
    let config = OverlapConfig {
        fence: fence(common)?,
        index: common.index.into(),
    };
    let mut finder = match &c1 {
        Some(c1) => OverlapFinder::two(&c0, c1, config),
        None => OverlapFinder::single(&c0, config),
    };
    let results = finder.compute_overlaps(monitor).ok_or(CliError::Cancelled)?;

    let mut summary = Summary::new("overlaps");
    summary
        .counts
        .insert("overlapping_pairs", results.overlapping_pairs().len());
    summary
        .counts
        .insert("unresolved_pairs", results.unresolved_pairs());
    summary
        .counts
        .insert("overlapping_features", results.overlapping_features(0).len());
    if c1.is_some() {
        summary.counts.insert(
            "overlapping_features_other",
            results.overlapping_features(1).len(),
        );
    }

    let mut layers = Layers::new();
    add_layer(
        &mut summary,
        &mut layers,
        "overlap_indicators",
        results.overlap_indicators().to_vec(),
    );
    add_layer(
        &mut summary,
        &mut layers,
        "size_indicators",
        results.size_indicators().to_vec(),
    );
    Ok((summary, layers))
}

fn run_close_vertices(
    input0: &Path,
    input1: &Path,
    common: &CommonArgs,
    monitor: &dyn TaskMonitor,
) -> Result<(Summary, Layers), CliError> {
    let c0 = read_features(input0)?;
    let c1 = read_features(input1)?;
    let config = CloseVertexConfig {
        distance_tolerance: common.distance_tolerance,
        index: common.index.into(),
    };
    let mut finder = CloseVertexFinder::new(&c0, &c1, config)?;
    let results = finder.compute(monitor).ok_or(CliError::Cancelled)?;

    let mut summary = Summary::new("close-vertices");
    summary
        .counts
        .insert("close_vertex_pairs", results.indicators().len());

    let mut layers = Layers::new();
    add_layer(
        &mut summary,
        &mut layers,
        "close_vertices",
        results.indicators().to_vec(),
    );
    Ok((summary, layers))
}
