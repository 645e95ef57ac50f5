//! Transform contract and pipeline
use crate::error::BuildResult;
use crate::graph::BuildGraph;
use crate::reporter::Reporter;
use async_trait::async_trait;
use std::future::Future;

/// One unit of pipeline work over the whole graph
///
/// A transform mutates the graph in place. An error aborts the rest of the
/// pipeline for the entry point in progress.
#[async_trait]
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, graph: &mut BuildGraph, reporter: &dyn Reporter) -> BuildResult<()>;
}

/// Run `work` as a reported phase
///
/// The phase is marked failed and the error returned unchanged if `work` fails.
pub async fn phase<T, F>(reporter: &dyn Reporter, label: &str, work: F) -> BuildResult<T>
where
    F: Future<Output = BuildResult<T>>,
{
    reporter.start(label);
    match work.await {
        Ok(value) => {
            reporter.succeed(None);
            Ok(value)
        }
        Err(error) => {
            reporter.fail();
            Err(error)
        }
    }
}

/// Transforms run in a fixed order
#[derive(Default)]
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform
    pub fn with(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Run every transform in order, stopping at the first failure
    pub async fn run(&self, graph: &mut BuildGraph, reporter: &dyn Reporter) -> BuildResult<()> {
        for transform in &self.transforms {
            tracing::debug!(transform = transform.name(), "running transform");
            transform.apply(graph, reporter).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::graph::Node;
    use crate::reporter::{MemoryReporter, ReportEvent};

    struct AddFile(&'static str);

    #[async_trait]
    impl Transform for AddFile {
        fn name(&self) -> &str {
            "add-file"
        }

        async fn apply(&self, graph: &mut BuildGraph, reporter: &dyn Reporter) -> BuildResult<()> {
            phase(reporter, self.0, async {
                graph.put(Node::file(self.0));
                Ok(())
            })
            .await
        }
    }

    struct Fails;

    #[async_trait]
    impl Transform for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        async fn apply(&self, _graph: &mut BuildGraph, reporter: &dyn Reporter) -> BuildResult<()> {
            phase(reporter, "failing", async {
                Err::<(), _>(BuildError::NoEntryPointInProgress)
            })
            .await
        }
    }

    #[tokio::test]
    async fn test_pipeline_runs_in_order() {
        let pipeline = Pipeline::new()
            .with(AddFile("file:///a"))
            .with(AddFile("file:///b"));
        let mut graph = BuildGraph::new();
        let reporter = MemoryReporter::new();

        pipeline.run(&mut graph, &reporter).await.unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(reporter.phases(), vec!["file:///a", "file:///b"]);
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline() {
        let pipeline = Pipeline::new()
            .with(Fails)
            .with(AddFile("file:///never"));
        let mut graph = BuildGraph::new();
        let reporter = MemoryReporter::new();

        let result = pipeline.run(&mut graph, &reporter).await;

        assert!(result.is_err());
        assert!(graph.is_empty());
        assert_eq!(
            reporter.events(),
            vec![ReportEvent::Start("failing".to_string()), ReportEvent::Fail]
        );
    }
}
