//! yarn.lock v1 파서
//!
//! v1 형식은 결정적 key/block 문법입니다:
//!
//! ```text
//! lodash@^4.17.20, lodash@^4.17.21:
//!   version "4.17.21"
//!   resolved "https://..."
//! ```
//!
//! v2+(berry)는 `__metadata:` 블록으로 시작하는 YAML 형식이라 문법이 다르며,
//! 감지 시 파싱을 거부합니다.

use layerlens_core::types::Ecosystem;

use crate::error::DepsAuditError;
use crate::lockfile::LockfileParser;
use crate::types::Dependency;

/// yarn.lock v1 파서
pub struct YarnLockParser;

impl LockfileParser for YarnLockParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn can_parse(&self, path: &str) -> bool {
        path.ends_with("yarn.lock")
    }

    fn parse(&self, content: &str, path: &str) -> Result<Vec<Dependency>, DepsAuditError> {
        if is_berry_lockfile(content) {
            return Err(DepsAuditError::Parse {
                path: path.to_owned(),
                reason: "yarn.lock v2+ (berry) is not supported; only v1 is parsed".to_owned(),
            });
        }

        let mut deps = Vec::new();
        let mut current_name: Option<String> = None;

        for line in content.lines() {
            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.trim_start().starts_with('#') {
                continue;
            }

            if !line.starts_with([' ', '\t']) {
                // 블록 헤더: `selector[, selector...]:`
                current_name = trimmed
                    .strip_suffix(':')
                    .and_then(|selectors| selectors.split(',').next())
                    .and_then(|selector| selector_name(selector.trim()));
                continue;
            }

            // 블록 본문: `  version "x.y.z"`
            if let Some(ref name) = current_name {
                let body = trimmed.trim_start();
                if let Some(rest) = body.strip_prefix("version ") {
                    let version = rest.trim().trim_matches('"');
                    if !version.is_empty() {
                        deps.push(Dependency::new(name.clone(), version));
                    }
                    current_name = None;
                }
            }
        }

        Ok(deps)
    }
}

/// berry(v2+) lockfile 여부 — `__metadata:` 블록이 표식입니다.
fn is_berry_lockfile(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.trim_start().starts_with("__metadata:"))
}

/// `"@scope/name@^1.0.0"` 형태의 selector에서 패키지명을 추출합니다.
///
/// 이름 자체에 `@` 접두사가 올 수 있으므로 마지막 `@`를 기준으로 자릅니다.
fn selector_name(selector: &str) -> Option<String> {
    let selector = selector.trim_matches('"');
    let at = selector.rfind('@')?;
    if at == 0 {
        // "@scope/name" 단독 — 버전 범위 없는 형태는 v1에서 나오지 않음
        return None;
    }
    let name = &selector[..at];
    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}
