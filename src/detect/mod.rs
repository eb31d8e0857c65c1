//! The `Detection` record (§3, §6) and a thin in-crate heuristic detector.
//!
//! Full framework detection is an external collaborator per the component
//! table — a real deployment would plug in a much richer detector. This one
//! sniffs marker files so the binary is runnable standalone.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Accepts either an integer or a float for a numeric field the external
/// detector may serialize either way (§6).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Number(pub f64);

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Float(f64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Int(i) => Ok(Number(i as f64)),
            Repr::Float(f) => Ok(Number(f)),
        }
    }
}

impl Number {
    pub fn as_u64(&self) -> u64 {
        self.0.round() as u64
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheck {
    pub path: String,
    pub expected_status: Number,
    pub timeout_seconds: Number,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Detection {
    pub language: String,
    pub framework: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub build_plan: Vec<String>,
    #[serde(default)]
    pub run_plan: Vec<String>,
    #[serde(default)]
    pub healthcheck: Option<HealthCheck>,
}

impl Detection {
    pub fn package_manager(&self) -> &str {
        self.meta.get("package_manager").map(String::as_str).unwrap_or("")
    }

    pub fn is_static(&self) -> bool {
        self.meta.get("deployment_type").map(String::as_str) == Some("static")
    }

    pub fn build_output(&self) -> &str {
        self.meta.get("build_output").map(String::as_str).unwrap_or("dist")
    }
}

/// Sniff a project tree for language/package-manager/framework markers.
/// Deliberately shallow: this is the in-crate fallback, not a replacement
/// for a real detector.
pub fn detect(project_root: &Path) -> Detection {
    if project_root.join("package.json").is_file() {
        return detect_js(project_root);
    }
    if project_root.join("requirements.txt").is_file()
        || project_root.join("pyproject.toml").is_file()
        || project_root.join("Pipfile").is_file()
    {
        return detect_python(project_root);
    }
    if project_root.join("go.mod").is_file() {
        return Detection {
            language: "Go".into(),
            framework: String::new(),
            meta: HashMap::new(),
            build_plan: vec!["go build -o app .".into()],
            run_plan: vec!["./app --port 8000".into()],
            healthcheck: None,
        };
    }
    if project_root.join("Gemfile").is_file() {
        return Detection {
            language: "Ruby".into(),
            framework: "Rails".into(),
            meta: HashMap::from([("package_manager".to_string(), "bundler".to_string())]),
            build_plan: vec!["bundle install".into()],
            run_plan: vec![],
            healthcheck: None,
        };
    }

    Detection {
        language: "Unknown".into(),
        framework: String::new(),
        meta: HashMap::new(),
        build_plan: vec![],
        run_plan: vec![],
        healthcheck: None,
    }
}

fn detect_js(root: &Path) -> Detection {
    let package_manager = if root.join("bun.lockb").is_file() {
        "bun"
    } else if root.join("pnpm-lock.yaml").is_file() {
        "pnpm"
    } else if root.join("yarn.lock").is_file() {
        "yarn"
    } else {
        "npm"
    };

    let pkg_json = std::fs::read_to_string(root.join("package.json")).unwrap_or_default();
    let framework = if pkg_json.contains("\"next\"") {
        "Next.js"
    } else if pkg_json.contains("\"@nestjs/core\"") {
        "NestJS"
    } else if pkg_json.contains("\"express\"") {
        "Express.js"
    } else {
        ""
    };

    let install = format!("{} install", package_manager);
    let build = format!("{} run build", package_manager);

    Detection {
        language: "JavaScript/TypeScript".into(),
        framework: framework.into(),
        meta: HashMap::from([("package_manager".to_string(), package_manager.to_string())]),
        build_plan: vec![install, build],
        run_plan: vec![],
        healthcheck: Some(HealthCheck {
            path: "/".into(),
            expected_status: Number(200.0),
            timeout_seconds: Number(30.0),
        }),
    }
}

fn detect_python(root: &Path) -> Detection {
    let package_manager = if root.join("poetry.lock").is_file() {
        "poetry"
    } else if root.join("uv.lock").is_file() {
        "uv"
    } else if root.join("Pipfile.lock").is_file() {
        "pipenv"
    } else {
        "pip"
    };

    let has_manage_py = root.join("manage.py").is_file();
    let framework = if has_manage_py { "Django" } else { "FastAPI" };

    Detection {
        language: "Python".into(),
        framework: framework.into(),
        meta: HashMap::from([("package_manager".to_string(), package_manager.to_string())]),
        build_plan: vec!["pip install -r requirements.txt".into()],
        run_plan: vec![],
        healthcheck: Some(HealthCheck {
            path: "/".into(),
            expected_status: Number(200.0),
            timeout_seconds: Number(30.0),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn detects_nextjs_from_package_json() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"dependencies":{"next":"14.0.0"}}"#).unwrap();
        fs::write(dir.path().join("bun.lockb"), b"").unwrap();

        let d = detect(dir.path());
        assert_eq!(d.language, "JavaScript/TypeScript");
        assert_eq!(d.framework, "Next.js");
        assert_eq!(d.package_manager(), "bun");
    }

    #[test]
    fn detects_django_from_manage_py() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "django\n").unwrap();
        fs::write(dir.path().join("manage.py"), "").unwrap();

        let d = detect(dir.path());
        assert_eq!(d.language, "Python");
        assert_eq!(d.framework, "Django");
    }

    #[test]
    fn number_accepts_int_or_float() {
        let from_int: Number = serde_json::from_str("200").unwrap();
        let from_float: Number = serde_json::from_str("200.0").unwrap();
        assert_eq!(from_int.as_u64(), 200);
        assert_eq!(from_float.as_u64(), 200);
    }
}
