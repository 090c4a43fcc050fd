//! Cloud SQL instance, database and IAM user

use crate::gcp;
use crate::identity::Identity;
use infraflow_cloud::{Resource, ResourceId, Secret};
use infraflow_core::StackConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Cloud SQL user types
///
/// `CLOUD_IAM_USER` is for end users; workloads authenticate as
/// `CLOUD_IAM_SERVICE_ACCOUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SqlUserType {
    CloudIamServiceAccount,
    CloudIamUser,
}

impl SqlUserType {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::CloudIamServiceAccount => "CLOUD_IAM_SERVICE_ACCOUNT",
            Self::CloudIamUser => "CLOUD_IAM_USER",
        }
    }
}

const SERVICE_ACCOUNT_SUFFIX: &str = ".gserviceaccount.com";

/// Database user name for an IAM service account: the email without
/// the `.gserviceaccount.com` suffix
pub fn iam_user_name(service_account_email: &str) -> String {
    service_account_email
        .strip_suffix(SERVICE_ACCOUNT_SUFFIX)
        .unwrap_or(service_account_email)
        .to_string()
}

pub const PASSWORD_KEY: &str = "db-password";

/// Handles threaded into workloads that connect through the proxy
#[derive(Debug, Clone)]
pub struct Database {
    pub instance: ResourceId,
    pub database: ResourceId,
    pub user: ResourceId,
    pub user_name: String,
    pub database_name: String,
    pub connection_name: String,
}

impl Database {
    /// Resources a workload must wait for before it can log in
    pub fn dependencies(&self) -> Vec<ResourceId> {
        vec![self.database.clone(), self.user.clone()]
    }
}

pub fn provision(
    config: &StackConfig,
    identity: &Identity,
    password: &Secret<String>,
) -> infraflow_cloud::Result<(Vec<Resource>, Database)> {
    let db = &config.database;
    let project = &config.project.id;

    let mut flags = Vec::new();
    if db.iam_authentication {
        flags.push(json!({ "name": "cloudsql.iam_authentication", "value": "on" }));
    }
    let instance = gcp::resource(
        gcp::SQL_INSTANCE,
        &db.instance,
        json!({
            "project": project,
            "region": config.project.region,
            "databaseVersion": db.version,
            "settings": {
                "settingsVersion": "1",
                "tier": db.tier,
                "databaseFlags": flags,
                "availabilityType": db.availability.as_api_str(),
                "backupConfiguration": { "enabled": db.backups },
            },
        }),
    );
    let instance_id = instance.id.clone();

    let database = gcp::resource(
        gcp::SQL_DATABASE,
        &db.name,
        json!({
            "project": project,
            "instance": db.instance,
            "name": db.name,
        }),
    )
    .depends_on(instance_id.clone());

    let password_resource = gcp::generated(
        gcp::RANDOM_PASSWORD,
        PASSWORD_KEY,
        json!({ "length": 16, "upper": false, "numeric": true, "special": true }),
    );

    let user_name = iam_user_name(&identity.email);
    let user = gcp::resource(
        gcp::SQL_USER,
        &user_name,
        json!({
            "project": project,
            "instance": db.instance,
            "name": user_name,
            "type": SqlUserType::CloudIamServiceAccount.as_api_str(),
            "password": null,
        }),
    )
    .with_secret("/password", password.clone())?
    .depends_on(instance_id.clone())
    .depends_on(identity.account.clone())
    .depends_on(password_resource.id.clone());

    let handle = Database {
        instance: instance_id,
        database: database.id.clone(),
        user: user.id.clone(),
        user_name,
        database_name: db.name.clone(),
        connection_name: config.instance_connection_name(),
    };
    Ok((vec![instance, database, password_resource, user], handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_core::Availability;

    fn identity() -> Identity {
        Identity {
            account: ResourceId::new(gcp::SERVICE_ACCOUNT, "app"),
            email: "app@my-project.iam.gserviceaccount.com".to_string(),
            bindings: Vec::new(),
        }
    }

    fn config() -> StackConfig {
        let mut config = StackConfig::new("dev");
        config.project.id = "my-project".to_string();
        config
    }

    #[test]
    fn test_iam_user_name() {
        assert_eq!(iam_user_name("foo@bar.gserviceaccount.com"), "foo@bar");
        assert_eq!(
            iam_user_name("app@my-project.iam.gserviceaccount.com"),
            "app@my-project.iam"
        );
        assert_eq!(iam_user_name("someone@example.com"), "someone@example.com");
    }

    #[test]
    fn test_user_types_distinct() {
        assert_ne!(
            SqlUserType::CloudIamServiceAccount.as_api_str(),
            SqlUserType::CloudIamUser.as_api_str()
        );
        assert_eq!(
            serde_json::to_value(SqlUserType::CloudIamServiceAccount).unwrap(),
            "CLOUD_IAM_SERVICE_ACCOUNT"
        );
    }

    #[test]
    fn test_provision_database() {
        let password = Secret::new("p@ss-w0rd-123456".to_string());
        let (resources, db) = provision(&config(), &identity(), &password).unwrap();

        assert_eq!(resources.len(), 4);
        assert_eq!(db.connection_name, "my-project:us-central1:web-db");
        assert_eq!(db.user_name, "app@my-project.iam");

        let instance = &resources[0].config;
        assert_eq!(instance["databaseVersion"], "POSTGRES_14");
        assert_eq!(instance["settings"]["availabilityType"], "REGIONAL");
        assert_eq!(
            instance["settings"]["databaseFlags"][0]["name"],
            "cloudsql.iam_authentication"
        );

        let user = &resources[3];
        assert_eq!(user.config["type"], "CLOUD_IAM_SERVICE_ACCOUNT");
        assert_eq!(user.config["password"], "[secret]");
        assert!(user.depends_on.contains(&identity().account));
        assert_eq!(user.materialize().unwrap()["password"], "p@ss-w0rd-123456");
    }

    #[test]
    fn test_zonal_without_iam_flag() {
        let mut config = config();
        config.database.availability = Availability::Zonal;
        config.database.iam_authentication = false;
        let (resources, _) = provision(&config, &identity(), &Secret::new("x".repeat(16))).unwrap();

        let settings = &resources[0].config["settings"];
        assert_eq!(settings["availabilityType"], "ZONAL");
        assert_eq!(settings["databaseFlags"].as_array().map(|a| a.len()), Some(0));
    }
}
