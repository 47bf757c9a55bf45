use crate::chunk::ChunkCutter;
use crate::job::{jobs_from_cutter, ChunkJob, ChunkRecord};
use crate::manifest::{write_batch_manifest, BatchManifest, MANIFEST_FILE_NAME};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use gridmap_core::Network;
use gridmap_mapping::{
    DeltaWriter, LogEntry, MapperParameters, MappingConfig, MappingIndex, MappingLog,
    MappingObserver, PointRange, RunSummary, SnapshotExport, SnapshotWriter, TimeSeriesMapper,
    TimeSeriesTable, VersionSynthesis, BASE_CASE_POINT,
};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const LOG_FILE_NAME: &str = "mapping_log.csv";

/// Everything a chunked run needs. The network and the table are shared
/// read-only; every chunk works on its own clone of the network.
pub struct BatchRunnerConfig {
    pub network: Network,
    pub config: MappingConfig,
    pub table: TimeSeriesTable,
    pub parameters: MapperParameters,
    pub output_root: PathBuf,
    pub chunk_size: i64,
    pub snapshots: SnapshotExport,
    /// 0 picks one thread per CPU.
    pub threads: usize,
}

pub struct BatchSummary {
    pub success: usize,
    pub failure: usize,
    pub manifest_path: PathBuf,
    pub log_path: Option<PathBuf>,
    pub chunks: Vec<ChunkRecord>,
    /// Diagnostics of every successful chunk, ordered by version and point,
    /// followed by one synthesis per version.
    pub log: MappingLog,
}

struct ChunkOutput {
    summary: RunSummary,
    log: MappingLog,
    artifacts: Vec<PathBuf>,
}

pub fn run_batch(config: &BatchRunnerConfig) -> Result<BatchSummary> {
    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "creating batch output root '{}'",
            config.output_root.display()
        )
    })?;

    // configuration errors abort before any chunk runs
    let mut table = config.table.clone();
    table.add_constants(&config.config.constants)?;
    let index = MappingIndex::build(&config.config, &config.network, &table)?;
    let probe = TimeSeriesMapper::new(&index, &table, &config.parameters);
    let range = probe.point_range()?;
    let versions = probe.versions()?;
    let cutter = ChunkCutter::new(range.first as i64, range.last as i64, config.chunk_size)?;
    let jobs = jobs_from_cutter(&cutter, &config.output_root);

    let thread_count = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for chunked runs")?;

    info!(
        chunks = jobs.len(),
        threads = thread_count,
        first = range.first,
        last = range.last,
        "running chunked mapping"
    );
    let outputs: Vec<Result<ChunkOutput>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| run_chunk(job, config, &index, &table, range))
            .collect()
    });

    let mut records = Vec::with_capacity(jobs.len());
    let mut merged = Vec::new();
    for (job, output) in jobs.iter().zip(outputs) {
        let record = match output {
            Ok(output) => {
                let artifacts = output
                    .artifacts
                    .iter()
                    .map(|path| relative(path, &config.output_root))
                    .collect();
                merged.push(output);
                ChunkRecord {
                    chunk_id: job.chunk_id.clone(),
                    first: job.range.first,
                    last: job.range.last,
                    status: "ok".to_string(),
                    error: None,
                    artifacts,
                }
            }
            Err(err) => {
                warn!(chunk = %job.chunk_id, "chunk failed: {err:#}");
                ChunkRecord {
                    chunk_id: job.chunk_id.clone(),
                    first: job.range.first,
                    last: job.range.last,
                    status: "error".to_string(),
                    error: Some(format!("{err:#}")),
                    artifacts: Vec::new(),
                }
            }
        };
        records.push(record);
    }

    let success = records.iter().filter(|r| r.status == "ok").count();
    let failure = records.len() - success;
    let log = merge_outputs(merged, config.parameters.emit_synthesis);

    let log_path = if success > 0 {
        let path = config.output_root.join(LOG_FILE_NAME);
        log.write_csv(&path)?;
        Some(path)
    } else {
        None
    };

    let manifest = BatchManifest {
        created_at: Utc::now(),
        network: config.network.id().to_string(),
        versions,
        first: range.first as i64,
        last: range.last as i64,
        chunk_size: config.chunk_size,
        num_chunks: records.len(),
        success,
        failure,
        log: log_path.as_ref().map(|_| LOG_FILE_NAME.to_string()),
        chunks: records.clone(),
    };
    let manifest_path = config.output_root.join(MANIFEST_FILE_NAME);
    write_batch_manifest(&manifest_path, &manifest)?;
    Ok(BatchSummary {
        success,
        failure,
        manifest_path,
        log_path,
        chunks: records,
        log,
    })
}

/// Map one chunk on a private network clone, writing its delta files (and
/// requested snapshots) under the chunk directory.
fn run_chunk(
    job: &ChunkJob,
    config: &BatchRunnerConfig,
    index: &MappingIndex,
    table: &TimeSeriesTable,
    batch_range: PointRange,
) -> Result<ChunkOutput> {
    let range = job
        .range
        .point_range()
        .ok_or_else(|| anyhow!("chunk {} has no valid range", job.chunk_id))?;
    fs::create_dir_all(&job.output_dir)
        .with_context(|| format!("creating chunk directory '{}'", job.output_dir.display()))?;

    let parameters = MapperParameters {
        point_range: Some(range),
        constant_detection_range: Some(batch_range),
        emit_synthesis: false,
        ..config.parameters.clone()
    };
    let mut network = config.network.clone();
    let mut log = MappingLog::new();
    let mut snapshots = SnapshotWriter::new(&job.output_dir, config.snapshots.clone());
    let mut deltas = DeltaWriter::new(
        &job.output_dir,
        range.len(),
        config.config.contingencies.clone(),
    );
    let summary = {
        let mut observers: [&mut dyn MappingObserver; 2] = [&mut snapshots, &mut deltas];
        TimeSeriesMapper::new(index, table, &parameters).run(
            &mut network,
            &mut observers,
            &mut log,
        )?
    };

    let mut artifacts = deltas.written().to_vec();
    artifacts.extend_from_slice(snapshots.exported());
    info!(
        chunk = %job.chunk_id,
        first = range.first,
        last = range.last,
        entries = log.len(),
        "chunk complete"
    );
    Ok(ChunkOutput {
        summary,
        log,
        artifacts,
    })
}

/// Fold chunk logs in point order. Every chunk evaluates its own base case;
/// a base-case entry already reported by another chunk is dropped. Syntheses
/// are merged per version and rendered once.
fn merge_outputs(outputs: Vec<ChunkOutput>, emit_synthesis: bool) -> MappingLog {
    let mut entries: Vec<LogEntry> = Vec::new();
    let mut base_case: Vec<LogEntry> = Vec::new();
    let mut syntheses: BTreeMap<i32, VersionSynthesis> = BTreeMap::new();
    for output in outputs {
        for entry in output.log.into_entries() {
            if entry.point == BASE_CASE_POINT {
                if base_case.contains(&entry) {
                    continue;
                }
                base_case.push(entry.clone());
            }
            entries.push(entry);
        }
        for (version, synthesis) in &output.summary.syntheses {
            syntheses.entry(*version).or_default().merge(synthesis);
        }
    }
    entries.sort_by_key(|entry| (entry.version, entry.point));

    let mut log = MappingLog::new();
    log.extend(entries);
    if emit_synthesis {
        for (version, synthesis) in &syntheses {
            synthesis.render(&mut log, *version, None);
        }
    }
    log
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
