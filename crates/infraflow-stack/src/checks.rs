//! Structural checks run against a composition before anything is emitted

use crate::composition::Composition;
use crate::database::{SqlUserType, iam_user_name};
use crate::gcp;
use crate::kube;
use infraflow_cloud::{Output, Plan, ResourceId, StackState};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Check {
    ServiceSelectors,
    SecretReferences,
    JobDependencies,
    Kubeconfig,
    DatabaseUser,
    SecretExposure,
    DependencyGraph,
}

impl Check {
    pub const ALL: [Check; 7] = [
        Check::ServiceSelectors,
        Check::SecretReferences,
        Check::JobDependencies,
        Check::Kubeconfig,
        Check::DatabaseUser,
        Check::SecretExposure,
        Check::DependencyGraph,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Check::ServiceSelectors => "Service selectors match a Deployment's pod labels",
            Check::SecretReferences => "Secret references name a declared Secret and key",
            Check::JobDependencies => "Jobs never restart and depend on their images and service account",
            Check::Kubeconfig => "Kubeconfig has a single cluster, context and user",
            Check::DatabaseUser => "Database user is the service account email without its suffix",
            Check::SecretExposure => "No secret value appears in display output",
            Check::DependencyGraph => "Dependencies are declared and acyclic",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Check::ServiceSelectors => "service-selectors",
            Check::SecretReferences => "secret-references",
            Check::JobDependencies => "job-dependencies",
            Check::Kubeconfig => "kubeconfig",
            Check::DatabaseUser => "database-user",
            Check::SecretExposure => "secret-exposure",
            Check::DependencyGraph => "dependency-graph",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed { findings: Vec<String> },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: Check,
    #[serde(flatten)]
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    /// No check failed (skipped checks do not count as failures)
    pub fn is_ok(&self) -> bool {
        !self
            .results
            .iter()
            .any(|r| matches!(r.status, CheckStatus::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Check, &[String])> {
        self.results.iter().filter_map(|r| match &r.status {
            CheckStatus::Failed { findings } => Some((&r.check, findings.as_slice())),
            _ => None,
        })
    }

    pub fn result(&self, check: Check) -> Option<&CheckStatus> {
        self.results
            .iter()
            .find(|r| r.check == check)
            .map(|r| &r.status)
    }

    fn record(&mut self, check: Check, findings: Vec<String>) {
        let status = if findings.is_empty() {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed { findings }
        };
        self.results.push(CheckResult { check, status });
    }
}

/// Run every structural check
pub fn check(composition: &Composition) -> CheckReport {
    let mut report = CheckReport::default();
    report.record(Check::ServiceSelectors, service_selectors(composition));
    report.record(Check::SecretReferences, secret_references(composition));
    report.record(Check::JobDependencies, job_dependencies(composition));
    match kubeconfig(&composition.kubeconfig) {
        Ok(findings) => report.record(Check::Kubeconfig, findings),
        Err(reason) => report.results.push(CheckResult {
            check: Check::Kubeconfig,
            status: CheckStatus::Skipped { reason },
        }),
    }
    report.record(Check::DatabaseUser, database_user(composition));
    report.record(Check::SecretExposure, secret_exposure(composition));
    report.record(Check::DependencyGraph, dependency_graph(composition));
    report
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn service_selectors(composition: &Composition) -> Vec<String> {
    let pod_labels: Vec<BTreeMap<String, String>> = composition
        .of_kind(kube::DEPLOYMENT)
        .map(|d| string_map(&d.config["spec"]["template"]["metadata"]["labels"]))
        .collect();

    let mut findings = Vec::new();
    for service in composition.of_kind(kube::SERVICE) {
        let selector = string_map(&service.config["spec"]["selector"]);
        if selector.is_empty() {
            findings.push(format!("{} has no selector", service.id));
            continue;
        }
        let matched = pod_labels
            .iter()
            .any(|labels| selector.iter().all(|(k, v)| labels.get(k) == Some(v)));
        if !matched {
            findings.push(format!(
                "{} selector {:?} matches no Deployment pod template",
                service.id, selector
            ));
        }
    }
    findings
}

/// Containers of a Deployment or Job pod template
fn containers(config: &Value) -> impl Iterator<Item = &Value> {
    config["spec"]["template"]["spec"]["containers"]
        .as_array()
        .into_iter()
        .flatten()
}

fn secret_references(composition: &Composition) -> Vec<String> {
    let secrets: BTreeMap<&str, BTreeSet<&str>> = composition
        .of_kind(kube::SECRET)
        .map(|s| {
            let keys = ["stringData", "data"]
                .iter()
                .filter_map(|field| s.config[*field].as_object())
                .flat_map(|map| map.keys().map(String::as_str))
                .collect();
            (s.id.name.as_str(), keys)
        })
        .collect();

    let mut findings = Vec::new();
    let mut verify = |owner: &ResourceId, secret: Option<&str>, key: Option<&str>| {
        let Some(secret) = secret else {
            findings.push(format!("{} references a Secret without a name", owner));
            return;
        };
        match (secrets.get(secret), key) {
            (None, _) => findings.push(format!(
                "{} references undeclared Secret '{}'",
                owner, secret
            )),
            (Some(keys), Some(key)) if !keys.contains(key) => findings.push(format!(
                "{} references missing key '{}' of Secret '{}'",
                owner, key, secret
            )),
            _ => {}
        }
    };

    for workload in composition
        .resources
        .iter()
        .filter(|r| r.id.kind == kube::DEPLOYMENT || r.id.kind == kube::JOB)
    {
        for container in containers(&workload.config) {
            for env in container["env"].as_array().into_iter().flatten() {
                let reference = &env["valueFrom"]["secretKeyRef"];
                if !reference.is_null() {
                    verify(&workload.id, reference["name"].as_str(), reference["key"].as_str());
                }
            }
        }
        let volumes = workload.config["spec"]["template"]["spec"]["volumes"].as_array();
        for volume in volumes.into_iter().flatten() {
            let source = &volume["secret"];
            if source.is_null() {
                continue;
            }
            let name = source["secretName"].as_str();
            let items = source["items"].as_array();
            if items.is_none_or(|items| items.is_empty()) {
                verify(&workload.id, name, None);
            }
            for item in items.into_iter().flatten() {
                verify(&workload.id, name, item["key"].as_str());
            }
        }
    }
    findings
}

fn job_dependencies(composition: &Composition) -> Vec<String> {
    let images: BTreeMap<&str, &ResourceId> = composition
        .of_kind(gcp::IMAGE)
        .filter_map(|r| r.config["imageName"].as_str().map(|name| (name, &r.id)))
        .collect();

    let mut findings = Vec::new();
    for job in composition.of_kind(kube::JOB) {
        let pod = &job.config["spec"]["template"]["spec"];
        if pod["restartPolicy"] != "Never" {
            findings.push(format!("{} restartPolicy must be Never", job.id));
        }

        for container in containers(&job.config) {
            let Some(image) = container["image"].as_str() else {
                continue;
            };
            if let Some(image_id) = images.get(image)
                && !job.depends_on.contains(image_id)
            {
                findings.push(format!("{} does not depend on {}", job.id, image_id));
            }
        }

        match pod["serviceAccountName"].as_str() {
            Some(account) => {
                let account_id = ResourceId::new(kube::SERVICE_ACCOUNT, account);
                if !job.depends_on.contains(&account_id) {
                    findings.push(format!("{} does not depend on {}", job.id, account_id));
                }
            }
            None => findings.push(format!("{} has no service account", job.id)),
        }
    }
    findings
}

/// `Err` when the kubeconfig cannot be checked yet
fn kubeconfig(kubeconfig: &Output<String>) -> Result<Vec<String>, String> {
    let text = match kubeconfig {
        Output::Known(text) => text,
        Output::Pending(pending) => return Err(format!("waiting on {}", pending)),
    };

    let value: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(value) => value,
        Err(e) => return Ok(vec![format!("kubeconfig is not valid YAML: {}", e)]),
    };

    let mut findings = Vec::new();
    for section in ["clusters", "contexts", "users"] {
        let count = value[section].as_sequence().map_or(0, |s| s.len());
        if count != 1 {
            findings.push(format!("expected exactly one entry in {}, found {}", section, count));
        }
    }
    let context = value["contexts"][0]["name"].as_str();
    let current = value["current-context"].as_str();
    if context.is_none() || context != current {
        findings.push(format!(
            "current-context {:?} does not name the context {:?}",
            current, context
        ));
    }
    Ok(findings)
}

fn database_user(composition: &Composition) -> Vec<String> {
    let emails: Vec<&str> = composition
        .of_kind(gcp::SERVICE_ACCOUNT)
        .filter_map(|r| r.config["email"].as_str())
        .collect();

    let mut findings = Vec::new();
    for user in composition.of_kind(gcp::SQL_USER) {
        if user.config["type"] != SqlUserType::CloudIamServiceAccount.as_api_str() {
            continue;
        }
        let name = user.config["name"].as_str().unwrap_or_default();
        if !emails.iter().any(|email| iam_user_name(email) == name) {
            findings.push(format!(
                "{} name '{}' is not a declared service account email without '.gserviceaccount.com'",
                user.id, name
            ));
        }
    }
    findings
}

fn secret_exposure(composition: &Composition) -> Vec<String> {
    // Very short values would match by accident
    let secrets: Vec<(&ResourceId, &str)> = composition
        .resources
        .iter()
        .flat_map(|r| r.secrets.values().map(move |s| (&r.id, s.expose().as_str())))
        .filter(|(_, value)| value.len() >= 4)
        .collect();

    let mut surfaces: Vec<(String, String)> = Vec::new();
    for resource in &composition.resources {
        surfaces.push((format!("{} config", resource.id), resource.config.to_string()));
        if let Ok(serialized) = serde_json::to_string(resource) {
            surfaces.push((format!("{} record", resource.id), serialized));
        }
    }
    for (name, export) in &composition.exports {
        if let Some(value) = export.value() {
            surfaces.push((format!("export {}", name), value.clone()));
        }
    }
    if let Some(kubeconfig) = composition.kubeconfig.value() {
        surfaces.push(("kubeconfig".to_string(), kubeconfig.clone()));
    }
    if let Ok(graph) = composition.graph()
        && let Ok(plan) = Plan::diff(&graph, &StackState::new(), composition.deferred.clone())
        && let Ok(json) = serde_json::to_string(&plan)
    {
        surfaces.push(("plan".to_string(), json));
    }

    let mut findings = Vec::new();
    for (owner, secret) in &secrets {
        for (surface, text) in &surfaces {
            if text.contains(secret) {
                findings.push(format!("secret of {} appears in {}", owner, surface));
            }
        }
    }
    findings
}

fn dependency_graph(composition: &Composition) -> Vec<String> {
    let graph = match composition.graph() {
        Ok(graph) => graph,
        Err(e) => return vec![e.to_string()],
    };
    match graph.topological_order() {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{ComposeInputs, compose};
    use infraflow_cloud::{Provider, Resource, Secret};
    use infraflow_core::StackConfig;
    use serde_json::json;

    fn composition() -> Composition {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        compose(&config, &ComposeInputs::for_tests()).unwrap()
    }

    fn status(report: &CheckReport, check: Check) -> &CheckStatus {
        report.result(check).unwrap()
    }

    #[test]
    fn test_composed_stack_passes() {
        let report = check(&composition());
        assert!(report.is_ok(), "{:?}", report.failures().collect::<Vec<_>>());
        assert_eq!(report.results.len(), 7);
        assert!(matches!(
            status(&report, Check::Kubeconfig),
            CheckStatus::Skipped { .. }
        ));
    }

    #[test]
    fn test_selector_mismatch() {
        let mut composition = composition();
        let service = composition
            .resources
            .iter_mut()
            .find(|r| r.id == ResourceId::new(kube::SERVICE, "app"))
            .unwrap();
        service.config["spec"]["selector"] = json!({ "app": "api" });

        let report = check(&composition);
        assert!(matches!(
            status(&report, Check::ServiceSelectors),
            CheckStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_missing_secret_key() {
        let mut composition = composition();
        let secret = composition
            .resources
            .iter_mut()
            .find(|r| r.id == ResourceId::new(kube::SECRET, "token-signing-key"))
            .unwrap();
        secret.config["stringData"] = json!({ "other": "x" });

        let report = check(&composition);
        let CheckStatus::Failed { findings } = status(&report, Check::SecretReferences) else {
            panic!("expected failure");
        };
        assert!(findings[0].contains("missing key 'key'"));
    }

    #[test]
    fn test_job_must_not_restart() {
        let mut composition = composition();
        let job = composition
            .resources
            .iter_mut()
            .find(|r| r.id.kind == kube::JOB)
            .unwrap();
        job.config["spec"]["template"]["spec"]["restartPolicy"] = json!("OnFailure");
        job.depends_on.retain(|d| d.kind != gcp::IMAGE);

        let report = check(&composition);
        let CheckStatus::Failed { findings } = status(&report, Check::JobDependencies) else {
            panic!("expected failure");
        };
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn test_kubeconfig_check() {
        let valid = crate::cluster::kubeconfig("p", "cluster", "1.2.3.4", "Q0E=", "us-central1");
        assert_eq!(kubeconfig(&Output::known(valid)), Ok(Vec::new()));

        let broken = "apiVersion: v1\nclusters: []\ncontexts:\n- name: a\ncurrent-context: b\n";
        let findings = kubeconfig(&Output::known(broken.to_string())).unwrap();
        assert_eq!(findings.len(), 3);
    }

    #[test]
    fn test_database_user_with_suffix() {
        let mut composition = composition();
        let user = composition
            .resources
            .iter_mut()
            .find(|r| r.id.kind == gcp::SQL_USER)
            .unwrap();
        user.config["name"] = json!("app@my-project.iam.gserviceaccount.com");

        let report = check(&composition);
        assert!(matches!(
            status(&report, Check::DatabaseUser),
            CheckStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_secret_in_display_output() {
        let mut composition = composition();
        let leaky = Resource::new(
            ResourceId::new("configmap", "leak"),
            Provider::Kubernetes,
            json!({ "data": { "password": "db-pa$$word-0001" } }),
        );
        composition.resources.push(leaky);

        let report = check(&composition);
        let CheckStatus::Failed { findings } = status(&report, Check::SecretExposure) else {
            panic!("expected failure");
        };
        assert!(findings.iter().any(|f| f.contains("configmap/leak")));
    }

    #[test]
    fn test_secret_wrapper_keeps_record_clean() {
        let composition = composition();
        let user = composition
            .resources
            .iter()
            .find(|r| r.id.kind == gcp::SQL_USER)
            .unwrap();
        let record = serde_json::to_string(user).unwrap();
        assert!(record.contains(Secret::<String>::mask()));
        assert!(!record.contains("db-pa$$word-0001"));
    }

    #[test]
    fn test_undeclared_dependency() {
        let mut composition = composition();
        let first = composition.resources.first_mut().unwrap();
        first.depends_on.push(ResourceId::new("service", "ghost"));

        let report = check(&composition);
        assert!(matches!(
            status(&report, Check::DependencyGraph),
            CheckStatus::Failed { .. }
        ));
    }
}
