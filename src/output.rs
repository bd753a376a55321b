use std::io::{self, Write};

use serde::Serialize;

use crate::app::{BuildResult, DownloadResult, EnrichResult, ExportResult, ProgressEvent, ProgressSink};
use crate::ownership::OwnershipReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_ownership(report: &OwnershipReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_enrich(result: &EnrichResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_export(result: &ExportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Progress stays silent in JSON mode so stdout carries one document.
impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes progress lines to stderr.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn download_summary(result: &DownloadResult) -> String {
        let summary = &result.summary;
        let mut out = format!(
            "Downloaded {} projects, {} versions: {} pages fetched, {} from cache, {} failures\n",
            summary.projects,
            summary.versions,
            summary.pages_fetched,
            summary.pages_cached,
            summary.failures
        );
        for project in &summary.truncated {
            if let Some(version) = project.truncated_at {
                out.push_str(&format!(
                    "  {}: stopped at v{version}; re-run to check later versions\n",
                    project.hum_id
                ));
            }
        }
        out
    }

    pub fn build_summary(result: &BuildResult) -> String {
        let mut out = format!(
            "Built {} projects: {} versions, {} datasets\n",
            result.projects, result.versions, result.datasets
        );
        for failure in &result.failed {
            out.push_str(&format!("  skipped {}: {}\n", failure.hum_id, failure.error));
        }
        out
    }

    pub fn ownership_summary(report: &OwnershipReport) -> String {
        if report.is_clean() {
            return "Ownership: no conflicts, no drift\n".to_string();
        }
        let mut out = format!(
            "Ownership: {} conflicts, {} drifts\n",
            report.conflicts.len(),
            report.drifts.len()
        );
        for conflict in &report.conflicts {
            let owners = conflict
                .claims
                .iter()
                .map(|claim| claim.hum_version_id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "  conflict {} {}: {owners}\n",
                conflict.dataset_id, conflict.version
            ));
        }
        for drift in &report.drifts {
            out.push_str(&format!(
                "  drift {} {} -> {}: {} -> {}\n",
                drift.dataset_id,
                drift.from_version,
                drift.to_version,
                join_ids(&drift.from_owners),
                join_ids(&drift.to_owners)
            ));
        }
        out
    }

    pub fn enrich_summary(result: &EnrichResult) -> String {
        let datasets = &result.datasets;
        let dois = &result.dois;
        format!(
            "Datasets: {} enriched ({} without registry), {} skipped, {} failed\n\
             DOIs: {} added across {} projects, {} failed searches\n",
            datasets.enriched,
            datasets.unroutable,
            datasets.skipped,
            datasets.failures,
            dois.dois_added,
            dois.projects_searched,
            dois.failures
        )
    }

    pub fn export_summary(result: &ExportResult) -> String {
        let mut out = format!(
            "Exported {} records to {}, {} rejected\n",
            result.written,
            result.out_dir,
            result.rejected.len()
        );
        for rejection in &result.rejected {
            out.push_str(&format!(
                "  {} {}: {}\n",
                rejection.kind,
                rejection.id,
                rejection.violations.join("; ")
            ));
        }
        out
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::{Claim, OwnershipConflict};

    #[test]
    fn conflicts_list_every_owner() {
        let report = OwnershipReport {
            conflicts: vec![OwnershipConflict {
                dataset_id: "JGAD000001".to_string(),
                version: "v1".to_string(),
                claims: vec![
                    Claim {
                        hum_id: "hum0001".parse().unwrap(),
                        hum_version_id: "hum0001-v1".parse().unwrap(),
                    },
                    Claim {
                        hum_id: "hum0002".parse().unwrap(),
                        hum_version_id: "hum0002-v1".parse().unwrap(),
                    },
                ],
            }],
            drifts: vec![],
        };
        let text = HumanOutput::ownership_summary(&report);
        assert!(text.contains("1 conflicts"));
        assert!(text.contains("hum0001-v1, hum0002-v1"));
    }
}
