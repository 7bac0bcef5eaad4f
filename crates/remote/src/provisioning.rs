//! The fixed resource topology created after a fresh authentication, and
//! the report describing how far provisioning got.

use chrono::{DateTime, Utc};
use serde::Serialize;

use nx_domain::records::{GroupStrategy, PipelineStep, Topology, WorkerRole};

use crate::types::{CreateGroupRequest, CreatePipelineRequest, SpawnWorkerRequest};

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub role: WorkerRole,
    pub name: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub name: String,
    pub description: String,
    pub steps: Vec<PipelineStep>,
    pub triggers: Vec<String>,
}

/// Everything provisioning creates, in creation order.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub group: CreateGroupRequest,
    pub workers: Vec<WorkerSpec>,
    pub pipelines: Vec<PipelineSpec>,
}

impl ProvisioningPlan {
    /// One hierarchical group, four specialised workers, and the two
    /// standard pipelines.
    pub fn standard() -> Self {
        Self {
            group: CreateGroupRequest {
                topology: Topology::Hierarchical,
                max_workers: 8,
                strategy: GroupStrategy::Specialized,
            },
            workers: vec![
                worker(
                    WorkerRole::Researcher,
                    "research-worker",
                    &["information_gathering", "source_analysis", "summarization"],
                ),
                worker(
                    WorkerRole::Analyst,
                    "analysis-worker",
                    &["data_analysis", "pattern_recognition", "reporting"],
                ),
                worker(
                    WorkerRole::Optimizer,
                    "optimization-worker",
                    &["performance_tuning", "resource_allocation", "bottleneck_detection"],
                ),
                worker(
                    WorkerRole::Coordinator,
                    "coordination-worker",
                    &["task_delegation", "progress_tracking", "conflict_resolution"],
                ),
            ],
            pipelines: vec![
                PipelineSpec {
                    name: "periodic-optimization".into(),
                    description: "Collect metrics, find bottlenecks and apply tuning".into(),
                    steps: steps(&[
                        ("collect", "collect_metrics"),
                        ("analyze", "analyze_performance"),
                        ("optimize", "apply_optimizations"),
                        ("report", "summarize_changes"),
                    ]),
                    triggers: vec!["schedule:hourly".into()],
                },
                PipelineSpec {
                    name: "anomaly-monitoring".into(),
                    description: "Watch live metrics and alert on anomalies".into(),
                    steps: steps(&[
                        ("monitor", "watch_metrics"),
                        ("detect", "detect_anomalies"),
                        ("alert", "notify_coordinator"),
                    ]),
                    triggers: vec!["metric_threshold".into(), "error_rate_spike".into()],
                },
            ],
        }
    }
}

fn worker(role: WorkerRole, name: &str, capabilities: &[&str]) -> WorkerSpec {
    WorkerSpec {
        role,
        name: name.into(),
        capabilities: capabilities.iter().map(|c| (*c).to_owned()).collect(),
    }
}

fn steps(pairs: &[(&str, &str)]) -> Vec<PipelineStep> {
    pairs
        .iter()
        .map(|(name, action)| PipelineStep {
            name: (*name).into(),
            action: (*action).into(),
        })
        .collect()
}

impl WorkerSpec {
    pub(crate) fn request(&self) -> SpawnWorkerRequest {
        SpawnWorkerRequest {
            role: self.role,
            name: self.name.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl PipelineSpec {
    pub(crate) fn request(&self) -> CreatePipelineRequest {
        CreatePipelineRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            steps: self.steps.clone(),
            triggers: self.triggers.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one provisioning step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What a provisioning run created and what it skipped.
///
/// A `group_error` means nothing else was attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisioningReport {
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_error: Option<String>,
    pub workers: Vec<StepOutcome>,
    pub pipelines: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProvisioningReport {
    pub(crate) fn started() -> Self {
        let now = Utc::now();
        Self {
            group_id: None,
            group_error: None,
            workers: Vec::new(),
            pipelines: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn workers_spawned(&self) -> usize {
        self.workers.iter().filter(|w| w.ok()).count()
    }

    pub fn workers_failed(&self) -> usize {
        self.workers.len() - self.workers_spawned()
    }

    pub fn pipelines_registered(&self) -> usize {
        self.pipelines.iter().filter(|p| p.ok()).count()
    }

    /// True when every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.group_error.is_none()
            && self.workers.iter().all(StepOutcome::ok)
            && self.pipelines.iter().all(StepOutcome::ok)
    }
}
