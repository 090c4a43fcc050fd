use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PASSPHRASE: &str = "correct horse battery staple";

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// Minimal app stack
    pub fn with_app_stack() -> Self {
        let project = Self::new();
        project.write_infra_kdl(
            r#"
            project "conduit" id="my-project"
            database "conduit" instance="web-db"
            release version="1.0.0"
            "#,
        );
        project
    }

    pub fn write_infra_kdl(&self, content: &str) {
        fs::write(self.root.path().join("infra.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.path().join(relative)
    }

    /// `infra` run inside the project with a clean environment
    #[allow(deprecated)]
    pub fn infra(&self) -> Command {
        let mut cmd = Command::cargo_bin("infra").unwrap();
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.file(".config"))
            .env_remove("INFRA_STACK")
            .env_remove("INFRAFLOW_PASSPHRASE")
            .env_remove("INFRAFLOW_PROJECT_ROOT");
        cmd
    }
}
