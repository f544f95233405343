use k8s_openapi::api::core::v1::Node;

/// Only ready, uncordoned nodes count towards capacity. Counting nodes the
/// scheduler cannot use would dilute the denominator.
pub fn is_ready_and_schedulable(node: &Node) -> bool {
    let cordoned = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);

    !cordoned && is_ready(node)
}

pub fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map(|ready| ready.status == "True")
        .unwrap_or(false)
}
