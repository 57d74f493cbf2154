//! # Fetch Pipeline
//!
//! Retrieval of insert targets from the network. The pipeline issues single
//! attempts only; retry bookkeeping and timeouts belong to the insert handle,
//! which owns the pending-command state the retries guard.
//!
//! Every retrieved object is verified to carry exactly the requested name
//! before it is handed onward. No selector or wildcard matching happens on
//! the fetch side.
//!
//! For segmented inserts the pipeline fans one retrieval out per segment
//! name concurrently; [`assemble_segments`] concatenates completed segment
//! payloads in segment order into the single assembled object the insert
//! handle persists.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{trace, warn};

use crate::face::{Face, FetchError};
use crate::messages::ContentObject;
use crate::name::Name;

/// Issues retrieval requests for a target name over a [`Face`].
#[derive(Clone)]
pub struct FetchPipeline<F: Face> {
    face: F,
}

impl<F: Face> FetchPipeline<F> {
    pub fn new(face: F) -> Self {
        Self { face }
    }

    /// One retrieval attempt for `name`, verifying the exact-name match.
    pub async fn retrieve(&self, name: &Name) -> Result<ContentObject, FetchError> {
        let object = self.face.express_retrieval(name).await?;
        if object.name != *name {
            warn!(
                requested = %name,
                received = %object.name,
                "discarding retrieval response under a different name"
            );
            return Err(FetchError::NameMismatch);
        }
        trace!(name = %name, bytes = object.payload.len(), "retrieval attempt completed");
        Ok(object)
    }

    /// One concurrent retrieval attempt per name. Failures are reported per
    /// name; one timed-out segment does not hide a completed sibling.
    pub async fn retrieve_many(
        &self,
        names: Vec<Name>,
    ) -> Vec<(Name, Result<ContentObject, FetchError>)> {
        let attempts = names.into_iter().map(|name| async move {
            let result = self.retrieve(&name).await;
            (name, result)
        });
        join_all(attempts).await
    }
}

/// Concatenate segment payloads in `[start, end]` order into one assembled
/// object named `target`. Returns `None` while any segment is still missing.
pub fn assemble_segments(
    target: &Name,
    start: u64,
    end: u64,
    parts: &HashMap<u64, Vec<u8>>,
) -> Option<ContentObject> {
    let mut payload = Vec::new();
    for segment in start..=end {
        payload.extend_from_slice(parts.get(&segment)?);
    }
    Some(ContentObject::new(target.clone(), payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Face stub answering retrievals from a fixed table.
    struct TableFace {
        objects: Mutex<HashMap<Name, ContentObject>>,
    }

    impl TableFace {
        fn new() -> Self {
            Self {
                objects: Mutex::new(HashMap::new()),
            }
        }

        async fn publish(&self, key: Name, object: ContentObject) {
            self.objects.lock().await.insert(key, object);
        }
    }

    #[async_trait]
    impl Face for TableFace {
        async fn express_retrieval(&self, name: &Name) -> Result<ContentObject, FetchError> {
            self.objects
                .lock()
                .await
                .get(name)
                .cloned()
                .ok_or(FetchError::Timeout)
        }

        async fn send_response(&self, _response: Vec<u8>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn retrieve_returns_matching_object() {
        let face = TableFace::new();
        let name = Name::from_uri("/repo/data/X");
        face.publish(name.clone(), ContentObject::new(name.clone(), vec![1, 2, 3]))
            .await;

        let pipeline = FetchPipeline::new(std::sync::Arc::new(face));
        let object = pipeline.retrieve(&name).await.unwrap();
        assert_eq!(object.name, name);
        assert_eq!(object.payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn retrieve_rejects_name_mismatch() {
        let face = TableFace::new();
        let requested = Name::from_uri("/repo/data/X");
        let other = Name::from_uri("/repo/data/Y");
        face.publish(requested.clone(), ContentObject::new(other, vec![1]))
            .await;

        let pipeline = FetchPipeline::new(std::sync::Arc::new(face));
        assert_eq!(
            pipeline.retrieve(&requested).await,
            Err(FetchError::NameMismatch)
        );
    }

    #[tokio::test]
    async fn retrieve_propagates_timeout() {
        let pipeline = FetchPipeline::new(std::sync::Arc::new(TableFace::new()));
        let missing = Name::from_uri("/repo/missing");
        assert_eq!(pipeline.retrieve(&missing).await, Err(FetchError::Timeout));
    }

    #[tokio::test]
    async fn retrieve_many_reports_per_name() {
        let face = TableFace::new();
        let base = Name::from_uri("/repo/data/X");
        let seg0 = base.append_segment(0);
        face.publish(seg0.clone(), ContentObject::new(seg0.clone(), vec![0xAA]))
            .await;

        let pipeline = FetchPipeline::new(std::sync::Arc::new(face));
        let results = pipeline
            .retrieve_many(vec![seg0.clone(), base.append_segment(1)])
            .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1, Err(FetchError::Timeout));
    }

    #[test]
    fn assemble_concatenates_in_segment_order() {
        let target = Name::from_uri("/repo/data/X");
        let mut parts = HashMap::new();
        parts.insert(1u64, vec![3, 4]);
        parts.insert(0u64, vec![1, 2]);
        parts.insert(2u64, vec![5]);

        let object = assemble_segments(&target, 0, 2, &parts).unwrap();
        assert_eq!(object.name, target);
        assert_eq!(object.payload, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn assemble_incomplete_returns_none() {
        let target = Name::from_uri("/repo/data/X");
        let mut parts = HashMap::new();
        parts.insert(0u64, vec![1]);
        assert!(assemble_segments(&target, 0, 1, &parts).is_none());
    }
}
