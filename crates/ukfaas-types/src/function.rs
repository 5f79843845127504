//! Function specs and the provider request/response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::image::ImageTarget;

/// Requested CPU and memory for a function, as free-form quantity strings
/// (`"1"`, `"500m"`, `"256Mi"`). Malformed values fall back to defaults at
/// replica-build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResources {
    #[serde(default)]
    pub cpu: String,

    #[serde(default)]
    pub memory: String,
}

/// A function deployment as submitted by the gateway.
///
/// Field names follow the provider wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeployment {
    /// Service name, the unique key of the function.
    pub service: String,

    /// OCI image reference of the packaged unikernel.
    pub image: String,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Process override passed to the watchdog.
    #[serde(default, rename = "envProcess")]
    pub env_process: Option<String>,

    #[serde(default, rename = "envVars")]
    pub env_vars: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub constraints: Option<Vec<String>>,

    #[serde(default)]
    pub secrets: Option<Vec<String>>,

    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub limits: Option<FunctionResources>,

    #[serde(default)]
    pub requests: Option<FunctionResources>,

    #[serde(default, rename = "readOnlyRootFilesystem")]
    pub read_only_root_filesystem: bool,
}

impl FunctionDeployment {
    /// Namespace the function belongs to, defaulting when unset.
    pub fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .unwrap_or(crate::DEFAULT_FUNCTION_NAMESPACE)
    }
}

/// The stored desired state of one function: the user's deployment plus the
/// resolved image target.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub deployment: FunctionDeployment,
    pub target: ImageTarget,
}

impl Function {
    /// Service name, the unique key of the function.
    pub fn name(&self) -> &str {
        &self.deployment.service
    }
}

/// Status record projected for `GET /system/functions` and
/// `GET /system/function/{name}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionStatus {
    pub name: String,

    pub image: String,

    pub namespace: String,

    #[serde(rename = "envProcess", skip_serializing_if = "Option::is_none")]
    pub env_process: Option<String>,

    #[serde(rename = "envVars", skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<FunctionResources>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<FunctionResources>,

    #[serde(rename = "readOnlyRootFilesystem")]
    pub read_only_root_filesystem: bool,

    pub replicas: u64,

    #[serde(rename = "availableReplicas")]
    pub available_replicas: u64,
}

/// Body of `DELETE /system/functions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFunctionRequest {
    #[serde(rename = "functionName")]
    pub function_name: String,
}

/// Body of `POST /system/scale-function/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleServiceRequest {
    #[serde(rename = "serviceName")]
    pub service_name: String,

    pub replicas: u64,
}
