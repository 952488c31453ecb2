use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DeschedulerSpec defines the desired state of Descheduler
#[derive(Serialize, Deserialize, JsonSchema, CustomResource, Clone, Debug, Default)]
#[kube(
    group = "descheduler.example.com",
    version = "v1alpha1",
    kind = "Descheduler",
    shortname = "desch",
    namespaced
)]
#[kube(status = "DeschedulerStatus")]
#[kube(printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule"}"#)]
#[kube(printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#)]
#[serde(rename_all = "camelCase")]
pub struct DeschedulerSpec {
    /// Strategies that should be enabled in the descheduler.
    /// Valid names are "duplicates", "interpodantiaffinity",
    /// "lownodeutilization" and "nodeaffinity", matched case-insensitively.
    #[serde(default)]
    pub strategies: Vec<Strategy>,

    /// The schedule of the descheduler run in Cron format,
    /// see <https://en.wikipedia.org/wiki/Cron>.
    #[serde(default)]
    pub schedule: String,

    /// Command line flags passed to the descheduler binary.
    /// Valid names are "descheduling-interval", "dry-run" and "node-selector".
    #[serde(default)]
    pub flags: Vec<Param>,

    /// Image of the descheduler being managed, including its version.
    /// The operator's default image is used when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A descheduler strategy together with its parameters.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq, Eq)]
pub struct Strategy {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub params: Vec<Param>,
}

/// A key/value pair used both for strategy parameters and for flags.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq, Eq)]
pub struct Param {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeschedulerStatus {
    /// Where the operator is in converging the derived ConfigMap and CronJob.
    /// "UpdatingPhase" means a derived resource was deleted and is waiting to
    /// be recreated, "RunningPhase" means both match the spec.
    #[serde(default, skip_serializing_if = "Phase::is_uninitialized")]
    #[schemars(schema_with = "phase_schema")]
    pub phase: Phase,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    #[serde(rename = "")]
    Uninitialized,
    #[serde(rename = "UpdatingPhase")]
    Updating,
    #[serde(rename = "RunningPhase")]
    Running,
}

// Structural schemas need a plain string enum, not one `oneOf` branch per variant.
fn phase_schema(_: &mut SchemaGenerator) -> Schema {
    SchemaObject {
        instance_type: Some(InstanceType::String.into()),
        enum_values: Some(vec!["".into(), "UpdatingPhase".into(), "RunningPhase".into()]),
        ..SchemaObject::default()
    }
    .into()
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Uninitialized
    }
}

impl Phase {
    pub fn is_uninitialized(&self) -> bool {
        *self == Phase::Uninitialized
    }
}

impl Descheduler {
    pub fn phase(&self) -> Phase {
        self.status
            .as_ref()
            .map(|status| status.phase)
            .unwrap_or_default()
    }
}
