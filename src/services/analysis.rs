//! Structural analysis over the code graph.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SearchConfig};
use crate::context::{AppGraphs, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{DependencyCycle, DependencyLink, ImpactedEntity, Workspace};
use crate::repositories::QueryRepository;
use crate::retry::RetryPolicy;

/// Depth used when a dependency chain is requested without one.
const DEFAULT_CHAIN_DEPTH: u32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub class_name: String,
    /// Workspace the class was found in; `None` when it exists nowhere.
    pub context: Option<String>,
    pub impacted: Vec<ImpactedEntity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyChain {
    pub class_name: String,
    pub context: String,
    pub max_depth: u32,
    pub dependencies: Vec<DependencyLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// The workspace searched, or `None` for all of them.
    pub context: Option<String>,
    pub cycles: Vec<DependencyCycle>,
}

/// Service for impact analysis, dependency chains and cycle detection.
#[derive(FromContext, Clone)]
pub struct AnalysisService {
    queries: QueryRepository,
    graphs: AppGraphs,
    config: Arc<Config>,
    retry: RetryPolicy,
}

impl AnalysisService {
    /// What depends on `class_name`, directly or transitively.
    ///
    /// Without a workspace, the class's own workspace is looked up first and
    /// the traversal stays inside it.
    pub async fn impact_analysis(
        &self,
        workspace: Option<Workspace>,
        class_name: &str,
        cancel: &CancellationToken,
    ) -> Result<ImpactReport, AppError> {
        let workspace = match workspace {
            Some(workspace) => Some(workspace),
            None => {
                self.retry
                    .run("resolve workspace", cancel, || {
                        self.queries.resolve_workspace(class_name)
                    })
                    .await?
            }
        };

        let Some(workspace) = workspace else {
            tracing::debug!(class_name, "Impact analysis target not found in any workspace");
            return Ok(ImpactReport {
                class_name: class_name.to_string(),
                context: None,
                impacted: Vec::new(),
            });
        };

        let search = &self.config.search;
        let graph = self.graphs.workspace(&workspace).await?;
        let impacted = self
            .retry
            .run("impact analysis", cancel, || {
                self.queries.impact_analysis(
                    &graph,
                    class_name,
                    search.max_dependency_depth,
                    search.impact_limit,
                )
            })
            .await?;

        Ok(ImpactReport {
            class_name: class_name.to_string(),
            context: Some(workspace.to_string()),
            impacted,
        })
    }

    /// Outbound `USES` dependencies of `class_name`, nearest first.
    pub async fn dependency_chain(
        &self,
        workspace: &Workspace,
        class_name: &str,
        max_depth: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<DependencyChain, AppError> {
        let max_depth = chain_depth(max_depth, &self.config.search);
        let graph = self.graphs.workspace(workspace).await?;
        let dependencies = self
            .retry
            .run("dependency chain", cancel, || {
                self.queries.dependency_chain(&graph, class_name, max_depth)
            })
            .await?;

        Ok(DependencyChain {
            class_name: class_name.to_string(),
            context: workspace.to_string(),
            max_depth,
            dependencies,
        })
    }

    /// Class-level dependency cycles, in one workspace or across all.
    pub async fn find_cycles(
        &self,
        workspace: Option<&Workspace>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, AppError> {
        let limit = self.config.search.cycle_limit.max(1);
        let cycles = match workspace {
            Some(workspace) => {
                let graph = self.graphs.workspace(workspace).await?;
                self.retry
                    .run("find cycles", cancel, || self.queries.find_cycles(&graph, limit))
                    .await?
            }
            None => {
                self.retry
                    .run("find cycles", cancel, || self.queries.find_cycles_all(limit))
                    .await?
            }
        };

        if !cycles.is_empty() {
            tracing::info!(count = cycles.len(), "Found dependency cycles");
        }

        Ok(CycleReport {
            context: workspace.map(|w| w.to_string()),
            cycles,
        })
    }
}

fn chain_depth(requested: Option<u32>, search: &SearchConfig) -> u32 {
    let ceiling = search.max_dependency_depth.max(1);
    requested
        .unwrap_or(DEFAULT_CHAIN_DEPTH)
        .clamp(1, ceiling)
}
