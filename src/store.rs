use crate::models::{Record, RunId, Target, TargetStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Metadata written next to the results of each run
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: RunId,
    source: &'a str,
    success: bool,
    notes: &'a str,
    results: usize,
    targets: BTreeMap<&'static str, usize>,
}

/// In-memory targets and records for one process, flushed to JSON at run end
pub struct LocalStore {
    source: String,
    data_dir: PathBuf,
    targets: Vec<Target>,
    next_target_id: u64,
    results: Vec<Record>,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        Ok(Self {
            source: "vrbo".to_string(),
            data_dir,
            targets: Vec::new(),
            next_target_id: 1,
            results: Vec::new(),
        })
    }

    pub fn run_start(&self) -> RunId {
        let run_id = Utc::now().timestamp();
        info!(source = %self.source, run_id, "VRBO run_start");
        run_id
    }

    pub fn results_path(&self, run_id: RunId) -> PathBuf {
        self.data_dir.join(format!("vrbo_results_{run_id}.json"))
    }

    pub fn summary_path(&self, run_id: RunId) -> PathBuf {
        self.data_dir.join(format!("vrbo_run_{run_id}.meta.json"))
    }

    /// Write every collected record plus the run summary.
    pub fn run_end(&self, run_id: RunId, success: bool, notes: &str) -> Result<PathBuf> {
        let output = self.results_path(run_id);
        let body = serde_json::to_string_pretty(&self.results)?;
        std::fs::write(&output, body)
            .with_context(|| format!("Failed to write results to {}", output.display()))?;

        let mut targets = BTreeMap::new();
        for target in self.targets.iter().filter(|t| t.run_id == run_id) {
            *targets.entry(target.status.as_str()).or_insert(0) += 1;
        }
        let summary = RunSummary {
            run_id,
            source: &self.source,
            success,
            notes,
            results: self.results.len(),
            targets,
        };
        let summary_path = self.summary_path(run_id);
        std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("Failed to write run summary to {}", summary_path.display()))?;

        info!(
            source = %self.source,
            run_id,
            success,
            results = self.results.len(),
            output = %output.display(),
            notes,
            "VRBO run_end"
        );
        Ok(output)
    }

    /// Queue a listing; `None` when its normalized URL is already known in this run.
    pub fn add_target(
        &mut self,
        run_id: RunId,
        kind: &str,
        clean_url: &str,
        full_url: &str,
        city: Option<&str>,
    ) -> Option<u64> {
        if self.has_target(run_id, clean_url) {
            return None;
        }
        let id = self.next_target_id;
        self.targets.push(Target {
            id,
            run_id,
            kind: kind.to_string(),
            value: clean_url.to_string(),
            url: if full_url.is_empty() {
                clean_url.to_string()
            } else {
                full_url.to_string()
            },
            city: city.map(str::to_string),
            status: TargetStatus::Queued,
        });
        self.next_target_id += 1;
        Some(id)
    }

    pub fn has_target(&self, run_id: RunId, clean_url: &str) -> bool {
        self.targets
            .iter()
            .any(|t| t.run_id == run_id && t.value == clean_url)
    }

    pub fn list_targets(&self, run_id: RunId, kind: &str, status: TargetStatus) -> Vec<Target> {
        self.targets
            .iter()
            .filter(|t| t.run_id == run_id && t.kind == kind && t.status == status)
            .cloned()
            .collect()
    }

    pub fn update_target_status(&mut self, target_id: u64, status: TargetStatus) {
        if let Some(target) = self.targets.iter_mut().find(|t| t.id == target_id) {
            target.status = status;
        }
    }

    pub fn save_rental(&mut self, record: Record) {
        self.results.push(record);
    }

    #[cfg(test)]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    #[cfg(test)]
    pub fn results(&self) -> &[Record] {
        &self.results
    }
}
