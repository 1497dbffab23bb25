use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const API_KEY: &str = "test-api-key";

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        let path = self.root.path().join("keyflow.kdl");
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.path().join(".keyflow").join("state.json")
    }

    #[allow(dead_code)]
    pub fn write_state(&self, state: &serde_json::Value) {
        let path = self.state_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(state).unwrap()).unwrap();
    }

    #[allow(dead_code)]
    pub fn state(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.state_path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// `keyflow` running in the project with a clean, credentialed environment
    #[allow(deprecated)]
    pub fn keyflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("keyflow").unwrap();
        cmd.current_dir(self.path())
            .env_remove("KEYFLOW_CONFIG")
            .env_remove("KEYFLOW_TIMEOUT")
            .env_remove("KEYFLOW_INTERVAL")
            .env_remove("FUSIONAUTH_HOST")
            .env_remove("FUSIONAUTH_TENANT_ID")
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("NO_COLOR", "1")
            .env("FUSIONAUTH_API_KEY", API_KEY);
        cmd
    }
}
