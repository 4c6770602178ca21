//! Session environment shared by the commands of one invocation.

use std::collections::BTreeMap;

/// Environment variables visible to executed tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    env: BTreeMap<String, String>,
    use_system_env: bool,
}

impl Session {
    /// Layer `project_env` (dotenv sources, in order) over the system
    /// environment when `use_system_env`, else over nothing.
    pub fn new(use_system_env: bool, project_env: Vec<(String, String)>) -> Self {
        let base: Vec<(String, String)> = if use_system_env {
            std::env::vars().collect()
        } else {
            Vec::new()
        };
        Self::from_layers(use_system_env, base, project_env)
    }

    fn from_layers(
        use_system_env: bool,
        base: Vec<(String, String)>,
        project_env: Vec<(String, String)>,
    ) -> Self {
        let mut env = BTreeMap::new();
        for (key, value) in base.into_iter().chain(project_env) {
            env.insert(key, value);
        }
        Self {
            env,
            use_system_env,
        }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn uses_system_env(&self) -> bool {
        self.use_system_env
    }
}
