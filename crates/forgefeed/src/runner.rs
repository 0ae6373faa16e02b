//! Runs one connector step and groups its output for indexing.

use crate::connector::{
    Checkpoint, CheckpointedConnector, ConnectorError, SecondsSinceUnixEpoch,
};
use crate::document::{ConnectorFailure, Document, DocumentOrFailure};

/// Default number of documents per batch.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Output of one step, grouped for the indexing pipeline.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Documents in step order, at most `batch_size` per batch.
    pub batches: Vec<Vec<Document>>,
    pub failures: Vec<ConnectorFailure>,
    pub checkpoint: Checkpoint,
}

impl RunOutput {
    pub fn document_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// Drives a connector one step at a time.
pub struct ConnectorRunner<'a> {
    connector: &'a dyn CheckpointedConnector,
    batch_size: usize,
}

impl<'a> ConnectorRunner<'a> {
    /// A `batch_size` of zero is treated as one.
    pub fn new(connector: &'a dyn CheckpointedConnector, batch_size: usize) -> Self {
        Self {
            connector,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one step.
    ///
    /// With `include_permissions`, the permission-aware entry point is used
    /// when the connector has one. Otherwise the plain step runs.
    pub async fn run(
        &self,
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        checkpoint: Checkpoint,
        include_permissions: bool,
    ) -> Result<RunOutput, ConnectorError> {
        let output = match (include_permissions, self.connector.as_permission_sync()) {
            (true, Some(perm_sync)) => {
                perm_sync
                    .load_from_checkpoint_with_perm_sync(start, end, checkpoint)
                    .await?
            }
            (true, None) => {
                tracing::warn!(
                    "Connector does not support permission sync, running without permissions"
                );
                self.connector
                    .load_from_checkpoint(start, end, checkpoint)
                    .await?
            }
            (false, _) => {
                self.connector
                    .load_from_checkpoint(start, end, checkpoint)
                    .await?
            }
        };

        let mut batches = Vec::new();
        let mut current = Vec::with_capacity(self.batch_size);
        let mut failures = Vec::new();

        for item in output.items {
            match item {
                DocumentOrFailure::Document(doc) => {
                    current.push(doc);
                    if current.len() == self.batch_size {
                        batches.push(std::mem::take(&mut current));
                    }
                }
                DocumentOrFailure::Failure(failure) => {
                    tracing::warn!(
                        "Failed to process {}: {}",
                        failure.failed_item_id(),
                        failure.failure_message
                    );
                    failures.push(failure);
                }
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }

        Ok(RunOutput {
            batches,
            failures,
            checkpoint: output.checkpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{CheckpointOutput, ValidationError};
    use crate::document::DocumentSource;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn doc(n: u32) -> Document {
        Document {
            id: format!("https://github.com/acme/widgets/pull/{}", n),
            blob: Vec::new(),
            source: DocumentSource::Github,
            semantic_identifier: format!("{}:PR.md", n),
            extension: ".md".to_string(),
            size_bytes: 0,
            doc_updated_at: None,
            metadata: BTreeMap::new(),
            external_access: None,
            primary_owners: Vec::new(),
            doc_metadata: BTreeMap::new(),
        }
    }

    /// Emits five documents and one failure; has no permission sync.
    struct Fixed;

    #[async_trait]
    impl CheckpointedConnector for Fixed {
        async fn load_from_checkpoint(
            &self,
            _start: SecondsSinceUnixEpoch,
            _end: SecondsSinceUnixEpoch,
            mut checkpoint: Checkpoint,
        ) -> Result<CheckpointOutput, ConnectorError> {
            let mut items: Vec<DocumentOrFailure> =
                (1..=5).map(|n| DocumentOrFailure::Document(doc(n))).collect();
            items.insert(
                2,
                DocumentOrFailure::Failure(ConnectorFailure::for_item(
                    "99",
                    None,
                    "Error converting PR to document: boom",
                    None,
                )),
            );
            checkpoint.has_more = false;
            Ok(CheckpointOutput { items, checkpoint })
        }

        fn build_dummy_checkpoint(&self) -> Checkpoint {
            Checkpoint::dummy()
        }

        fn validate_checkpoint_json(&self, json: &str) -> Result<Checkpoint, ConnectorError> {
            Ok(Checkpoint::from_json(json)?)
        }

        async fn validate_connector_settings(&self) -> Result<(), ValidationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_splits_documents_into_batches() {
        let runner = ConnectorRunner::new(&Fixed, 2);
        let output = runner
            .run(0, 0, Checkpoint::dummy(), false)
            .await
            .expect("run");

        let sizes: Vec<usize> = output.batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(output.document_count(), 5);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].failed_item_id(), "99");
        assert!(!output.checkpoint.has_more);
        assert_eq!(
            output.batches[0][0].id,
            "https://github.com/acme/widgets/pull/1"
        );
    }

    #[tokio::test]
    async fn test_perm_sync_falls_back_without_capability() {
        let runner = ConnectorRunner::new(&Fixed, 0);
        let output = runner
            .run(0, 0, Checkpoint::dummy(), true)
            .await
            .expect("run");
        assert_eq!(output.batches.len(), 5);
    }
}
