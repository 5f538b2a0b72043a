use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clustering::Classifier;
use crate::emission::{DeliveryReporter, Publisher};
use crate::ingestion::ObservationSource;
use crate::record::Observation;
use crate::store::StateStore;

/// Summary of one classify-and-publish cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub entities: usize,
    pub groups: usize,
    pub delivered: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Ingests observations one at a time and, after each one, reclassifies and
/// republishes every entity seen so far.
///
/// Everything runs on a single logical thread: a cycle always completes before the
/// next event is awaited, so cycle latency grows with the number of tracked entities.
pub struct Pipeline<S, C, P, R> {
    source: S,
    classifier: C,
    publisher: P,
    reporter: R,
    store: StateStore,
    poll_interval: Duration,
}

impl<S, C, P, R> Pipeline<S, C, P, R>
where
    S: ObservationSource,
    C: Classifier,
    P: Publisher,
    R: DeliveryReporter,
{
    pub fn new(
        source: S,
        classifier: C,
        publisher: P,
        reporter: R,
        store: StateStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            classifier,
            publisher,
            reporter,
            store,
            poll_interval,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Consume until `shutdown` resolves. Shutdown is only observed while waiting for
    /// the next event; a cycle that has started always runs to completion.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.source.next_observation(self.poll_interval) => received,
            };

            match received {
                Ok(Some(observation)) => {
                    self.process(observation).await;
                }
                Ok(None) => debug!("waiting for observations..."),
                Err(e) if e.is_malformed_event() => {
                    metrics::counter!("user_classifier_decode_failures_total").increment(1);
                    warn!("discarding record: {}", e);
                }
                Err(e) => {
                    metrics::counter!("user_classifier_receive_errors_total").increment(1);
                    warn!("failed to receive record: {}", e);
                }
            }
        }

        info!("stopping ingestion");
        self.source.close();
    }

    /// Apply one observation and run a full cycle over the updated state.
    pub async fn process(&mut self, observation: Observation) -> CycleReport {
        info!(
            entity_id = %observation.entity_id,
            total = observation.total,
            count = observation.count,
            "applying observation"
        );
        metrics::counter!("user_classifier_observations_total").increment(1);

        self.store.upsert(observation);
        self.run_cycle().await
    }

    /// Classify the current state and publish an assignment for every tracked entity,
    /// returning once every record has been acknowledged or has failed.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();

        let snapshot = self.store.snapshot();
        let classification = self.classifier.classify(&snapshot);
        let outcomes = self.publisher.publish(&classification.assignments).await;

        let mut delivered = 0;
        for outcome in &outcomes {
            if outcome.is_delivered() {
                delivered += 1;
            }
            self.reporter.report(outcome);
        }

        let report = CycleReport {
            entities: snapshot.len(),
            groups: classification.groups,
            delivered,
            failed: outcomes.len() - delivered,
            duration: start.elapsed(),
        };

        metrics::counter!("user_classifier_cycles_total").increment(1);
        metrics::gauge!("user_classifier_tracked_entities").set(report.entities as f64);
        metrics::gauge!("user_classifier_realized_groups").set(report.groups as f64);
        metrics::histogram!("user_classifier_cycle_duration_seconds")
            .record(report.duration.as_secs_f64());
        info!(
            entities = report.entities,
            groups = report.groups,
            iterations = classification.iterations,
            delivered = report.delivered,
            failed = report.failed,
            "published classification"
        );

        report
    }
}
