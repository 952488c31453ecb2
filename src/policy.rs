//! The `DeschedulerPolicy` document handed to the descheduler binary through
//! the `policy.yaml` key of the ConfigMap.
//!
//! Field names, nesting and field order are read by the descheduler itself and
//! compared byte-wise for drift, so they must not change.

use serde::{Deserialize, Serialize};

use crate::types::{Param, Strategy};

pub const API_VERSION: &str = "descheduler/v1alpha1";
pub const KIND: &str = "DeschedulerPolicy";

const DEFAULT_NODE_AFFINITY_TYPE: &str = "requiredDuringSchedulingIgnoredDuringExecution";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub api_version: String,
    pub kind: String,
    pub strategies: Strategies,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Strategies {
    #[serde(rename = "LowNodeUtilization")]
    pub low_node_utilization: LowNodeUtilization,
    #[serde(rename = "RemoveDuplicates")]
    pub remove_duplicates: Toggle,
    #[serde(rename = "RemovePodsViolatingInterPodAntiAffinity")]
    pub remove_pods_violating_inter_pod_anti_affinity: Toggle,
    #[serde(rename = "RemovePodsViolatingNodeAffinity")]
    pub remove_pods_violating_node_affinity: NodeAffinity,
}

/// A strategy without parameters.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LowNodeUtilization {
    pub enabled: bool,
    pub params: LowNodeUtilizationParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LowNodeUtilizationParams {
    pub node_resource_utilization_thresholds: NodeResourceUtilizationThresholds,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeResourceUtilizationThresholds {
    pub number_of_nodes: i64,
    pub target_thresholds: ResourceThresholds,
    pub thresholds: ResourceThresholds,
}

/// Utilization percentages; zero means unset and is left out of the document.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceThresholds {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cpu: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub memory: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub pods: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeAffinity {
    pub enabled: bool,
    pub params: NodeAffinityParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinityParams {
    pub node_affinity_type: Vec<String>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            strategies: Strategies::default(),
        }
    }
}

impl Policy {
    /// Canonical text form, stored in the ConfigMap and used for drift checks.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Builds the policy for the requested strategies.
///
/// Strategy names are expected to be validated already; unknown names are
/// skipped.
pub fn compile_policy(strategies: &[Strategy]) -> Policy {
    let mut policy = Policy::default();
    for strategy in strategies {
        let document = &mut policy.strategies;
        match strategy.name.to_lowercase().as_str() {
            "duplicates" => document.remove_duplicates.enabled = true,
            "interpodantiaffinity" => {
                document.remove_pods_violating_inter_pod_anti_affinity.enabled = true
            }
            "lownodeutilization" => {
                document.low_node_utilization.enabled = true;
                let thresholds = &mut document
                    .low_node_utilization
                    .params
                    .node_resource_utilization_thresholds;
                for param in &strategy.params {
                    apply_utilization_param(thresholds, param);
                }
            }
            "nodeaffinity" => {
                let node_affinity = &mut document.remove_pods_violating_node_affinity;
                node_affinity.enabled = true;
                node_affinity
                    .params
                    .node_affinity_type
                    .insert(0, DEFAULT_NODE_AFFINITY_TYPE.to_string());
            }
            _ => {}
        }
    }
    policy
}

fn apply_utilization_param(thresholds: &mut NodeResourceUtilizationThresholds, param: &Param) {
    let value = parse_or_zero(&param.value);
    if param.name.to_lowercase().contains("target") {
        let target = &mut thresholds.target_thresholds;
        match param.name.as_str() {
            "cputargetthreshold" => target.cpu = value,
            "memorytargetthreshold" => target.memory = value,
            "podstargetthreshold" => target.pods = value,
            _ => {}
        }
    } else {
        let low = &mut thresholds.thresholds;
        match param.name.as_str() {
            "cputhreshold" => low.cpu = value,
            "memorythreshold" => low.memory = value,
            "podsthreshold" => low.pods = value,
            _ => {}
        }
    }
    if param.name == "nodes" {
        thresholds.number_of_nodes = value;
    }
}

// Malformed numbers count as zero rather than failing the pass.
fn parse_or_zero(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn strategy(name: &str, params: &[(&str, &str)]) -> Strategy {
        Strategy {
            name: name.to_string(),
            params: params
                .iter()
                .map(|(name, value)| Param::new(*name, *value))
                .collect(),
        }
    }

    fn rendered(strategies: &[Strategy]) -> Value {
        let text = compile_policy(strategies).render().unwrap();
        serde_yaml::from_str(&text).unwrap()
    }

    #[test]
    fn header_is_fixed() {
        let doc = rendered(&[strategy("duplicates", &[])]);
        assert_eq!(doc["apiVersion"].as_str(), Some("descheduler/v1alpha1"));
        assert_eq!(doc["kind"].as_str(), Some("DeschedulerPolicy"));
        assert_eq!(
            doc["strategies"]["RemoveDuplicates"]["enabled"].as_bool(),
            Some(true)
        );
        assert_eq!(
            doc["strategies"]["LowNodeUtilization"]["enabled"].as_bool(),
            Some(false)
        );
    }

    #[test]
    fn strategy_names_match_case_insensitively() {
        let policy = compile_policy(&[
            strategy("InterPodAntiAffinity", &[]),
            strategy("DUPLICATES", &[]),
        ]);
        assert!(policy.strategies.remove_duplicates.enabled);
        assert!(
            policy
                .strategies
                .remove_pods_violating_inter_pod_anti_affinity
                .enabled
        );
        assert!(!policy.strategies.remove_pods_violating_node_affinity.enabled);
    }

    #[test]
    fn low_node_utilization_thresholds() {
        let doc = rendered(&[strategy(
            "lownodeutilization",
            &[("nodes", "3"), ("cputhreshold", "20"), ("cputargetthreshold", "50")],
        )]);
        let low = &doc["strategies"]["LowNodeUtilization"];
        assert_eq!(low["enabled"].as_bool(), Some(true));
        let thresholds = &low["params"]["nodeResourceUtilizationThresholds"];
        assert_eq!(thresholds["numberOfNodes"].as_i64(), Some(3));
        assert_eq!(thresholds["thresholds"]["cpu"].as_i64(), Some(20));
        assert_eq!(thresholds["targetThresholds"]["cpu"].as_i64(), Some(50));
        assert!(thresholds["thresholds"].get("memory").is_none());
        assert!(thresholds["targetThresholds"].get("pods").is_none());
    }

    #[test]
    fn threshold_names_route_by_target_substring() {
        let policy = compile_policy(&[strategy(
            "lownodeutilization",
            &[
                ("memorythreshold", "10"),
                ("podsthreshold", "15"),
                ("memorytargetthreshold", "60"),
                ("podstargetthreshold", "70"),
                ("cpuTargetThreshold", "99"),
                ("unknown", "5"),
            ],
        )]);
        let thresholds = policy
            .strategies
            .low_node_utilization
            .params
            .node_resource_utilization_thresholds;
        assert_eq!(
            thresholds.thresholds,
            ResourceThresholds {
                cpu: 0,
                memory: 10,
                pods: 15
            }
        );
        assert_eq!(
            thresholds.target_thresholds,
            ResourceThresholds {
                cpu: 0,
                memory: 60,
                pods: 70
            }
        );
        assert_eq!(thresholds.number_of_nodes, 0);
    }

    #[test]
    fn malformed_numbers_become_zero() {
        let policy = compile_policy(&[strategy(
            "lownodeutilization",
            &[("nodes", "three"), ("cputhreshold", "20%")],
        )]);
        let thresholds = policy
            .strategies
            .low_node_utilization
            .params
            .node_resource_utilization_thresholds;
        assert_eq!(thresholds.number_of_nodes, 0);
        assert_eq!(thresholds.thresholds.cpu, 0);
    }

    #[test]
    fn node_affinity_gets_default_type() {
        let doc = rendered(&[strategy("nodeaffinity", &[])]);
        let affinity = &doc["strategies"]["RemovePodsViolatingNodeAffinity"];
        assert_eq!(affinity["enabled"].as_bool(), Some(true));
        assert_eq!(
            affinity["params"]["nodeAffinityType"],
            Value::Sequence(vec![Value::String(
                "requiredDuringSchedulingIgnoredDuringExecution".to_string()
            )])
        );
    }

    #[test]
    fn repeated_node_affinity_prepends_without_dedupe() {
        let policy = compile_policy(&[
            strategy("nodeaffinity", &[]),
            strategy("NodeAffinity", &[]),
        ]);
        assert_eq!(
            policy
                .strategies
                .remove_pods_violating_node_affinity
                .params
                .node_affinity_type,
            vec![DEFAULT_NODE_AFFINITY_TYPE.to_string(); 2]
        );
    }

    #[test]
    fn unknown_strategy_is_ignored() {
        assert_eq!(compile_policy(&[strategy("shuffle", &[])]), Policy::default());
    }

    #[test]
    fn rendering_is_deterministic() {
        let strategies = vec![
            strategy("nodeaffinity", &[]),
            strategy("lownodeutilization", &[("nodes", "2"), ("podstargetthreshold", "40")]),
            strategy("duplicates", &[]),
        ];
        let first = compile_policy(&strategies).render().unwrap();
        let second = compile_policy(&strategies.clone()).render().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn keys_follow_declared_order() {
        let text = compile_policy(&[strategy("duplicates", &[])]).render().unwrap();
        let position = |needle: &str| text.find(needle).unwrap();
        assert!(position("apiVersion") < position("kind"));
        assert!(position("kind") < position("strategies"));
        assert!(position("LowNodeUtilization") < position("RemoveDuplicates"));
        assert!(position("numberOfNodes") < position("targetThresholds"));
        assert!(
            position("RemovePodsViolatingInterPodAntiAffinity")
                < position("RemovePodsViolatingNodeAffinity")
        );
    }
}
