//! GCP service account and its IAM bindings

use crate::cluster::ClusterHandle;
use crate::gcp;
use infraflow_cloud::{Resource, ResourceId};
use infraflow_core::StackConfig;
use serde_json::json;

/// Project roles granted to the workload service account
pub const PROJECT_ROLES: [(&str, &str); 2] = [
    ("cloudsql-client", "roles/cloudsql.client"),
    ("cloudsql-instance-user", "roles/cloudsql.instanceUser"),
];

pub const WORKLOAD_IDENTITY_ROLE: &str = "roles/iam.workloadIdentityUser";

/// The workload identity every pod runs as
#[derive(Debug, Clone)]
pub struct Identity {
    pub account: ResourceId,
    pub email: String,
    /// IAM members that must exist before workloads can reach Cloud SQL
    pub bindings: Vec<ResourceId>,
}

pub fn declare(config: &StackConfig, cluster: &ClusterHandle) -> (Vec<Resource>, Identity) {
    let sa = &config.identity.service_account;
    let email = config.service_account_email();
    let account = gcp::resource(
        gcp::SERVICE_ACCOUNT,
        sa,
        json!({
            "project": config.project.id,
            "accountId": sa,
            "displayName": format!("{} workloads ({})", config.project.name, config.stack()),
            "email": email,
        }),
    );
    let account_id = account.id.clone();

    let mut resources = vec![account];
    for (suffix, role) in PROJECT_ROLES {
        resources.push(
            gcp::resource(
                gcp::IAM_MEMBER,
                &format!("{}-{}", sa, suffix),
                json!({
                    "project": config.project.id,
                    "role": role,
                    "member": format!("serviceAccount:{}", email),
                }),
            )
            .depends_on(account_id.clone()),
        );
    }
    resources.push(workload_identity_binding(
        config,
        &config.identity.kubernetes_service_account,
        cluster,
    ));

    let bindings = resources[1..].iter().map(|r| r.id.clone()).collect();
    let identity = Identity {
        account: account_id,
        email,
        bindings,
    };
    (resources, identity)
}

/// Allow the Kubernetes SA `ksa` to act as the GCP service account
pub fn workload_identity_binding(
    config: &StackConfig,
    ksa: &str,
    cluster: &ClusterHandle,
) -> Resource {
    let sa = &config.identity.service_account;
    gcp::resource(
        gcp::IAM_MEMBER,
        &format!("{}-workload-identity-{}", sa, ksa),
        json!({
            "serviceAccount": format!(
                "projects/{}/serviceAccounts/{}",
                config.project.id,
                config.service_account_email()
            ),
            "role": WORKLOAD_IDENTITY_ROLE,
            "member": format!(
                "serviceAccount:{}[{}/{}]",
                config.workload_pool(),
                config.identity.namespace,
                ksa
            ),
        }),
    )
    .depends_on(ResourceId::new(gcp::SERVICE_ACCOUNT, sa))
    .depends_on(cluster.cluster.clone())
}
