//! Cache warming executor

use async_trait::async_trait;
use std::sync::Arc;

use super::engine::JobExecutor;
use super::types::{Job, JobError, JobKind, JobResult};
use crate::render::DocumentKind;
use crate::service::{DirectoryService, ServiceError};

/// Renders the job's document and stores it in the cache
pub struct WarmExecutor {
    service: Arc<DirectoryService>,
}

impl WarmExecutor {
    pub fn new(service: Arc<DirectoryService>) -> Self {
        Self { service }
    }
}

fn document_kind(kind: JobKind) -> DocumentKind {
    match kind {
        JobKind::WarmProfile => DocumentKind::Profile,
        JobKind::WarmSitemapChunk => DocumentKind::SitemapChunk,
    }
}

#[async_trait]
impl JobExecutor for WarmExecutor {
    async fn execute(&self, job: &Job) -> JobResult<()> {
        match self.service.warm(document_kind(job.kind), &job.target).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(JobError::InvalidTarget(format!(
                "{} target '{}' not found",
                job.kind, job.target
            ))),
            Err(ServiceError::InvalidKey { kind, key }) => Err(JobError::InvalidTarget(format!(
                "{} key '{}' is malformed",
                kind, key
            ))),
            Err(ServiceError::Store(e)) => Err(JobError::Store(e)),
        }
    }
}
