use async_trait::async_trait;
use capwatch::k8s::{ClusterState, OwnerRef};
use capwatch::metrics::{MetricKind, MetricsSink};
use capwatch::producer::Producer;
use capwatch::reservation::ResourceQuantity;
use capwatch::status::{ReservedCapacityStatus, StatusSink};
use capwatch::{CapwatchError, Result};
use k8s_openapi::api::core::v1::{
    Container, Node, NodeCondition, NodeSpec, NodeStatus, Pod, PodSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeCluster {
    nodes: Vec<Node>,
    pods: HashMap<String, Vec<Pod>>,
    fail_nodes: bool,
    fail_pods_on: Option<String>,
}

impl FakeCluster {
    fn with_node(mut self, node: Node, pods: Vec<Pod>) -> Self {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.push(node);
        self.pods.insert(name, pods);
        self
    }
}

#[async_trait]
impl ClusterState for FakeCluster {
    async fn list_nodes(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Node>> {
        if self.fail_nodes {
            return Err(CapwatchError::KubernetesError("connection refused".to_string()));
        }

        Ok(self
            .nodes
            .iter()
            .filter(|node| {
                let labels = node.metadata.labels.clone().unwrap_or_default();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        if self.fail_pods_on.as_deref() == Some(node_name) {
            return Err(CapwatchError::KubernetesError("timed out".to_string()));
        }

        Ok(self.pods.get(node_name).cloned().unwrap_or_default())
    }
}

/// Tracks how many pod list calls are running at the same time.
#[derive(Default)]
struct CountingCluster {
    nodes: Vec<Node>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ClusterState for CountingCluster {
    async fn list_nodes(&self, _selector: &BTreeMap<String, String>) -> Result<Vec<Node>> {
        Ok(self.nodes.clone())
    }

    async fn list_pods_on_node(&self, _node_name: &str) -> Result<Vec<Pod>> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![pod(&[("cpu", "1")])])
    }
}

#[derive(Default)]
struct RecordingMetrics {
    samples: Mutex<Vec<(String, MetricKind, OwnerRef, f64)>>,
}

impl RecordingMetrics {
    fn value(&self, resource: &str, kind: MetricKind) -> Option<f64> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .find(|(r, k, _, _)| r == resource && *k == kind)
            .map(|(_, _, _, v)| *v)
    }

    fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record(&self, resource: &str, kind: MetricKind, owner: &OwnerRef, value: f64) -> Result<()> {
        self.samples
            .lock()
            .unwrap()
            .push((resource.to_string(), kind, owner.clone(), value));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingStatus {
    persisted: Mutex<Vec<(OwnerRef, ReservedCapacityStatus)>>,
}

#[async_trait]
impl StatusSink for RecordingStatus {
    async fn persist(&self, owner: &OwnerRef, status: &ReservedCapacityStatus) -> Result<()> {
        self.persisted
            .lock()
            .unwrap()
            .push((owner.clone(), status.clone()));
        Ok(())
    }
}

fn resources(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

fn node(name: &str, allocatable: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([("pool".to_string(), "general".to_string())])),
            ..Default::default()
        },
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            allocatable: Some(resources(allocatable)),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

fn pod(requests: &[(&str, &str)]) -> Pod {
    Pod {
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "app".to_string(),
                resources: Some(ResourceRequirements {
                    requests: Some(resources(requests)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn owner() -> OwnerRef {
    OwnerRef::new("general-pool", "default")
}

fn producer(cluster: FakeCluster) -> Producer {
    Producer::new(owner(), BTreeMap::new(), Arc::new(cluster))
}

fn q(text: &str) -> ResourceQuantity {
    text.parse().unwrap()
}

#[tokio::test]
async fn test_half_reserved_cpu() {
    let cluster = FakeCluster::default().with_node(
        node("node-a", &[("cpu", "2")]),
        vec![pod(&[("cpu", "500m")]), pod(&[("cpu", "500m")])],
    );
    let metrics = RecordingMetrics::default();
    let status = RecordingStatus::default();

    let summary = producer(cluster).reconcile(&metrics, &status).await.unwrap();

    assert_eq!(summary["cpu"], "50.00%, 1/2");
    assert_eq!(metrics.value("cpu", MetricKind::Utilization), Some(0.5));
    assert_eq!(metrics.value("cpu", MetricKind::Reserved), Some(1.0));
    assert_eq!(metrics.value("cpu", MetricKind::Capacity), Some(2.0));

    let persisted = status.persisted.lock().unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].0, owner());
    assert_eq!(persisted[0].1["cpu"], "50.00%, 1/2");
}

#[tokio::test]
async fn test_zero_capacity_reports_nan() {
    let cluster = FakeCluster::default().with_node(
        node("node-a", &[("memory", "0")]),
        vec![pod(&[("memory", "100Mi")])],
    );
    let metrics = RecordingMetrics::default();
    let status = RecordingStatus::default();

    let summary = producer(cluster).reconcile(&metrics, &status).await.unwrap();

    let utilization = metrics.value("memory", MetricKind::Utilization).unwrap();
    assert!(utilization.is_nan());
    assert_eq!(metrics.value("memory", MetricKind::Capacity), Some(0.0));
    assert_eq!(
        metrics.value("memory", MetricKind::Reserved),
        Some(104_857_600.0)
    );
    assert_eq!(summary["memory"], "NaN%, 100Mi/0");
}

#[tokio::test]
async fn test_idle_nodes() {
    let cluster = FakeCluster::default()
        .with_node(node("node-a", &[("cpu", "1")]), vec![])
        .with_node(node("node-b", &[("cpu", "1")]), vec![]);

    let reservations = producer(cluster).compute().await.unwrap();

    let cpu = reservations.get("cpu").unwrap();
    assert_eq!(cpu.capacity, q("2"));
    assert!(cpu.reserved.is_zero());
    assert_eq!(cpu.utilization(), 0.0);
}

#[tokio::test]
async fn test_request_without_capacity() {
    let cluster = FakeCluster::default().with_node(
        node("node-a", &[("cpu", "8")]),
        vec![pod(&[("nvidia.com/gpu", "1")])],
    );

    let reservations = producer(cluster).compute().await.unwrap();

    let gpu = reservations.get("nvidia.com/gpu").unwrap();
    assert!(gpu.capacity.is_zero());
    assert_eq!(gpu.reserved, q("1"));
    assert!(gpu.utilization().is_nan());
}

#[tokio::test]
async fn test_unready_and_cordoned_nodes_are_skipped() {
    let mut not_ready = node("node-b", &[("cpu", "4")]);
    if let Some(conditions) = not_ready
        .status
        .as_mut()
        .and_then(|s| s.conditions.as_mut())
    {
        conditions[0].status = "False".to_string();
    }

    let mut cordoned = node("node-c", &[("cpu", "4")]);
    cordoned.spec = Some(NodeSpec {
        unschedulable: Some(true),
        ..Default::default()
    });

    let cluster = FakeCluster::default()
        .with_node(node("node-a", &[("cpu", "2")]), vec![pod(&[("cpu", "1")])])
        .with_node(not_ready, vec![pod(&[("cpu", "3")])])
        .with_node(cordoned, vec![pod(&[("cpu", "3")])]);

    let reservations = producer(cluster).compute().await.unwrap();

    let cpu = reservations.get("cpu").unwrap();
    assert_eq!(cpu.capacity, q("2"));
    assert_eq!(cpu.reserved, q("1"));
}

#[tokio::test]
async fn test_selector_limits_nodes() {
    let mut gpu_node = node("gpu-1", &[("cpu", "16"), ("nvidia.com/gpu", "4")]);
    gpu_node.metadata.labels = Some(BTreeMap::from([("pool".to_string(), "gpu".to_string())]));

    let cluster = FakeCluster::default()
        .with_node(node("node-a", &[("cpu", "2")]), vec![])
        .with_node(gpu_node, vec![pod(&[("nvidia.com/gpu", "1")])]);

    let selector = BTreeMap::from([("pool".to_string(), "gpu".to_string())]);
    let producer = Producer::new(owner(), selector, Arc::new(cluster));
    let reservations = producer.compute().await.unwrap();

    assert_eq!(reservations.get("cpu").unwrap().capacity, q("16"));
    assert_eq!(
        reservations.get("nvidia.com/gpu").unwrap().summary(),
        "25.00%, 1/4"
    );
}

#[tokio::test]
async fn test_pod_list_failure_reports_nothing() {
    let mut cluster = FakeCluster::default()
        .with_node(node("node-a", &[("cpu", "2")]), vec![pod(&[("cpu", "1")])])
        .with_node(node("node-b", &[("cpu", "2")]), vec![pod(&[("cpu", "1")])]);
    cluster.fail_pods_on = Some("node-b".to_string());

    let metrics = RecordingMetrics::default();
    let status = RecordingStatus::default();

    let err = producer(cluster)
        .reconcile(&metrics, &status)
        .await
        .unwrap_err();

    match &err {
        CapwatchError::ListPods { node, .. } => assert_eq!(node, "node-b"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("timed out"));
    assert_eq!(metrics.len(), 0);
    assert!(status.persisted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_node_list_failure_names_selector() {
    let cluster = FakeCluster {
        fail_nodes: true,
        ..Default::default()
    };
    let selector = BTreeMap::from([("pool".to_string(), "gpu".to_string())]);
    let producer = Producer::new(owner(), selector, Arc::new(cluster));

    let metrics = RecordingMetrics::default();
    let status = RecordingStatus::default();
    let err = producer.reconcile(&metrics, &status).await.unwrap_err();

    assert!(matches!(err, CapwatchError::ListNodes { .. }));
    assert!(err.to_string().contains("pool=gpu"));
    assert_eq!(metrics.len(), 0);
}

#[tokio::test]
async fn test_malformed_quantity_reports_nothing() {
    let cluster = FakeCluster::default().with_node(
        node("node-a", &[("cpu", "2")]),
        vec![pod(&[("memory", "a lot")])],
    );
    let metrics = RecordingMetrics::default();
    let status = RecordingStatus::default();

    let err = producer(cluster)
        .reconcile(&metrics, &status)
        .await
        .unwrap_err();

    assert!(matches!(err, CapwatchError::InvalidQuantity { .. }));
    assert_eq!(metrics.len(), 0);
    assert!(status.persisted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_node_order_does_not_change_totals() {
    let entries = vec![
        (
            node("node-a", &[("cpu", "2"), ("memory", "4Gi")]),
            vec![pod(&[("cpu", "250m"), ("memory", "1Gi")])],
        ),
        (
            node("node-b", &[("cpu", "4"), ("memory", "8Gi")]),
            vec![pod(&[("cpu", "1500m")]), pod(&[("memory", "512Mi")])],
        ),
        (node("node-c", &[("pods", "110")]), vec![]),
    ];

    let forward = entries
        .iter()
        .cloned()
        .fold(FakeCluster::default(), |c, (n, p)| c.with_node(n, p));
    let backward = entries
        .iter()
        .rev()
        .cloned()
        .fold(FakeCluster::default(), |c, (n, p)| c.with_node(n, p));

    let forward = producer(forward).compute().await.unwrap();
    let backward = producer(backward).compute().await.unwrap();

    assert_eq!(forward, backward);
    assert_eq!(forward.get("cpu").unwrap().reserved, q("1750m"));
    assert_eq!(forward.get("memory").unwrap().capacity, q("12Gi"));
    assert_eq!(forward.get("memory").unwrap().reserved, q("1536Mi"));
}

#[tokio::test]
async fn test_compute_is_repeatable() {
    let cluster = FakeCluster::default().with_node(
        node("node-a", &[("cpu", "3")]),
        vec![pod(&[("cpu", "700m")])],
    );
    let producer = producer(cluster);

    let first = producer.compute().await.unwrap();
    let second = producer.compute().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.get("cpu").unwrap().summary(), "23.33%, 700m/3");
}

#[tokio::test]
async fn test_pod_listing_respects_concurrency_limit() {
    let cluster = Arc::new(CountingCluster {
        nodes: (0..200)
            .map(|i| node(&format!("node-{}", i), &[("cpu", "2")]))
            .collect(),
        ..Default::default()
    });
    let producer =
        Producer::new(owner(), BTreeMap::new(), cluster.clone()).with_list_concurrency(8);

    let reservations = producer.compute().await.unwrap();

    let peak = cluster.peak.load(Ordering::SeqCst);
    assert!(peak <= 8, "peak of {} concurrent pod lists", peak);
    assert!(peak > 1);
    assert_eq!(cluster.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(reservations.get("cpu").unwrap().summary(), "50.00%, 200/400");
}

#[tokio::test]
async fn test_zero_concurrency_still_lists_pods() {
    let cluster = Arc::new(CountingCluster {
        nodes: vec![node("node-a", &[("cpu", "2")]), node("node-b", &[("cpu", "2")])],
        ..Default::default()
    });
    let producer =
        Producer::new(owner(), BTreeMap::new(), cluster.clone()).with_list_concurrency(0);

    let reservations = producer.compute().await.unwrap();

    assert_eq!(cluster.peak.load(Ordering::SeqCst), 1);
    assert_eq!(reservations.get("cpu").unwrap().summary(), "50.00%, 2/4");
}
