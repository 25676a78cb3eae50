//! package-lock.json 파서
//!
//! NPM lockfile의 v1 `dependencies` 트리와 v2/v3 `packages` 맵을 모두 걷습니다.
//! v2 파일은 두 트리를 다 담고 있으므로 호출 측(analyzer)에서
//! `(이름, 버전)` 중복을 제거합니다.

use layerlens_core::types::Ecosystem;
use serde_json::Value;

use crate::error::DepsAuditError;
use crate::lockfile::LockfileParser;
use crate::types::Dependency;

/// package-lock.json 파서
pub struct PackageLockParser;

impl LockfileParser for PackageLockParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn can_parse(&self, path: &str) -> bool {
        path.ends_with("package-lock.json")
    }

    fn parse(&self, content: &str, path: &str) -> Result<Vec<Dependency>, DepsAuditError> {
        let root: Value = serde_json::from_str(content).map_err(|e| DepsAuditError::Parse {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;

        let mut deps = Vec::new();

        // v2/v3: "packages" 맵 — 키가 "node_modules/..." 경로
        if let Some(packages) = root.get("packages").and_then(Value::as_object) {
            for (key, entry) in packages {
                // 루트 패키지는 키가 빈 문자열
                if key.is_empty() {
                    continue;
                }
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| package_name_from_key(key));
                let version = entry
                    .get("version")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if name.is_empty() || version.is_empty() {
                    continue;
                }
                deps.push(Dependency::new(name, version));
            }
        }

        // v1 (및 v2 호환): "dependencies" 재귀 트리
        if let Some(dependencies) = root.get("dependencies").and_then(Value::as_object) {
            collect_legacy_tree(dependencies, &mut deps);
        }

        Ok(deps)
    }
}

/// "node_modules/@scope/name" 또는 "node_modules/name"에서 패키지명 추출
fn package_name_from_key(key: &str) -> String {
    match key.rfind("node_modules/") {
        Some(pos) => key[pos + "node_modules/".len()..].to_owned(),
        None => key.to_owned(),
    }
}

/// v1 `dependencies` 트리를 재귀적으로 걷어 의존성을 수집합니다.
fn collect_legacy_tree(tree: &serde_json::Map<String, Value>, deps: &mut Vec<Dependency>) {
    for (name, entry) in tree {
        let version = entry
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !name.is_empty() && !version.is_empty() {
            deps.push(Dependency::new(name.clone(), version));
        }
        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            collect_legacy_tree(nested, deps);
        }
    }
}
