use crate::config::Config;
use crate::k8s::{ClusterState, K8sClient, OwnerRef, ProducerSource};
use crate::metrics::PrometheusSink;
use crate::producer::Producer;
use crate::status::{KubeStatusSink, LogStatusSink, StatusSink};
use crate::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Periodically reconciles every known producer.
pub struct Controller {
    cluster: Arc<dyn ClusterState>,
    source: Arc<dyn ProducerSource>,
    status: Arc<dyn StatusSink>,
    metrics: PrometheusSink,
    config: Config,
    reported: HashMap<OwnerRef, Vec<String>>,
}

impl Controller {
    pub fn new(client: K8sClient, metrics: PrometheusSink, config: Config) -> Self {
        Self::with_parts(
            Arc::new(client.clone()),
            Arc::new(client.clone()),
            Arc::new(KubeStatusSink::new(client)),
            metrics,
            config,
        )
    }

    /// `status` receives the summaries of producers found through `source`.
    /// Statically configured producers are always logged.
    pub fn with_parts(
        cluster: Arc<dyn ClusterState>,
        source: Arc<dyn ProducerSource>,
        status: Arc<dyn StatusSink>,
        metrics: PrometheusSink,
        config: Config,
    ) -> Self {
        Self {
            cluster,
            source,
            status,
            metrics,
            config,
            reported: HashMap::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Reconciling reserved capacity every {}s",
            self.config.interval_secs
        );

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let failed = self.reconcile_all().await;
                    if failed > 0 {
                        warn!("{} producers failed to reconcile", failed);
                    }
                }
            }
        }

        Ok(())
    }

    /// One pass over all producers. Returns how many failed.
    pub async fn reconcile_all(&mut self) -> usize {
        let mut producers: Vec<(Producer, Arc<dyn StatusSink>)> = Vec::new();
        let mut failed = 0;
        let mut listed = !self.config.watch_producers;

        if self.config.watch_producers {
            match self
                .source
                .list_producers(self.config.namespace.as_deref())
                .await
            {
                Ok(found) => {
                    listed = true;
                    for producer in found {
                        let owner = OwnerRef::from_producer(&producer);
                        let Some(spec) = producer.spec.reserved_capacity else {
                            debug!("Skipping {}: no reservedCapacity spec", owner);
                            continue;
                        };
                        producers.push((
                            self.producer(owner, spec.node_selector),
                            self.status.clone(),
                        ));
                    }
                }
                Err(e) => {
                    error!("Failed to list MetricsProducers: {}", e);
                    failed += 1;
                }
            }
        }

        let logged: Arc<dyn StatusSink> = Arc::new(LogStatusSink);
        for configured in &self.config.producers {
            let owner = OwnerRef::new(&configured.name, &configured.namespace);
            producers.push((
                self.producer(owner, configured.node_selector.clone()),
                logged.clone(),
            ));
        }

        let mut seen = HashSet::new();
        for (producer, status) in &producers {
            let owner = producer.owner().clone();
            seen.insert(owner.clone());

            let recorded = match producer.compute().await {
                Ok(reservations) => producer.record(&reservations, &self.metrics),
                Err(e) => Err(e),
            };
            let summary = match recorded {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Failed to reconcile {}: {}", owner, e);
                    failed += 1;
                    continue;
                }
            };

            // Gauges are set at this point, so their series are tracked even
            // if the status write below fails.
            let resources: Vec<String> = summary.keys().cloned().collect();
            self.forget_missing(&owner, &resources);
            self.reported.insert(owner.clone(), resources);

            match status.persist(&owner, &summary).await {
                Ok(()) => info!("Reconciled {} across {} resources", owner, summary.len()),
                Err(e) => {
                    error!("Failed to persist status of {}: {}", owner, e);
                    failed += 1;
                }
            }
        }

        if !listed {
            return failed;
        }

        // Producers that disappeared from the cluster keep no series behind.
        let gone: Vec<OwnerRef> = self
            .reported
            .keys()
            .filter(|owner| !seen.contains(*owner))
            .cloned()
            .collect();
        for owner in gone {
            if let Some(resources) = self.reported.remove(&owner) {
                info!("Removing metrics of deleted producer {}", owner);
                self.metrics.forget(&owner, &resources);
            }
        }

        failed
    }

    fn producer(&self, owner: OwnerRef, node_selector: BTreeMap<String, String>) -> Producer {
        Producer::new(owner, node_selector, self.cluster.clone())
            .with_list_concurrency(self.config.list_concurrency)
    }

    fn forget_missing(&self, owner: &OwnerRef, current: &[String]) {
        if let Some(previous) = self.reported.get(owner) {
            let stale: Vec<String> = previous
                .iter()
                .filter(|r| !current.contains(*r))
                .cloned()
                .collect();
            self.metrics.forget(owner, &stale);
        }
    }
}
