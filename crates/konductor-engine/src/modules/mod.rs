//! Built-in modules
//!
//! One file per module, each exporting its typed configuration and a
//! `deploy_<name>_module` entrypoint. Registration order is the default
//! deployment order.

pub mod cert_manager;
pub mod containerized_data_importer;
pub mod hostpath_provisioner;
pub mod kubevirt;
pub mod multus;
pub mod prometheus;

use konductor_kube::{ApplyOptions, CustomTimeouts, ResourceHandle};
use serde_json::{Map, Value as JsonValue};

use crate::registry::ModuleRegistry;

pub use cert_manager::{CertManagerConfig, deploy_cert_manager_module};
pub use containerized_data_importer::{
    ContainerizedDataImporterConfig, deploy_containerized_data_importer_module,
};
pub use hostpath_provisioner::{HostpathProvisionerConfig, deploy_hostpath_provisioner_module};
pub use kubevirt::{KubevirtConfig, deploy_kubevirt_module};
pub use multus::{MultusConfig, deploy_multus_module};
pub use prometheus::{PrometheusConfig, deploy_prometheus_module};

/// Register every built-in module
pub fn register_builtin(registry: &mut ModuleRegistry) {
    registry
        .register("cert_manager", true, deploy_cert_manager_module)
        .register("kubevirt", false, deploy_kubevirt_module)
        .register(
            "containerized_data_importer",
            false,
            deploy_containerized_data_importer_module,
        )
        .register("hostpath_provisioner", false, deploy_hostpath_provisioner_module)
        .register("multus", false, deploy_multus_module)
        .register("prometheus", false, deploy_prometheus_module);
}

/// Overlay user-supplied Helm values onto a module's computed values
///
/// Top-level keys from `overrides` replace computed ones.
pub(crate) fn overlay_values(mut base: JsonValue, overrides: &Map<String, JsonValue>) -> JsonValue {
    if let JsonValue::Object(map) = &mut base {
        for (key, value) in overrides {
            map.insert(key.clone(), value.clone());
        }
    }
    base
}

/// Options for a chart or operator install: prior modules, local handles and a create timeout
pub(crate) fn install_options(
    depends_on: &[ResourceHandle],
    local: &[ResourceHandle],
    timeout: &str,
) -> ApplyOptions {
    ApplyOptions::depends_on(depends_on.iter().chain(local).cloned())
        .with_timeouts(CustomTimeouts::create(timeout))
}
