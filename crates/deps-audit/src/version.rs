//! 버전 문자열 정규화 및 범위 매칭
//!
//! lockfile에서 추출된 버전은 `^1.2.3` 같은 범위 연산자를 달고 있을 수 있습니다.
//! advisory API는 구체적 버전만 받으므로 연산자를 벗겨낸 뒤
//! 구체적 버전이 아니면 조회를 건너뜁니다.

use serde::{Deserialize, Serialize};

/// 취약점 영향 버전 범위
///
/// `introduced <= version < fixed` 이면 영향을 받습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRange {
    /// 도입 버전 (None이면 시작 제한 없음)
    pub introduced: Option<String>,
    /// 수정 버전 (None이면 미수정 — 모든 이후 버전 영향)
    pub fixed: Option<String>,
}

/// 선행 범위 연산자와 공백을 제거하고 구체적 버전을 반환합니다.
///
/// 제거 대상: `^`, `~`, `>=`, `<=`, `=`, `>`, `<`, 공백.
/// 남은 문자열이 구체적 버전이 아니면(와일드카드, 범위 등) `None`을 반환하며
/// 해당 의존성은 취약점 조회에서 제외됩니다.
pub fn clean_version(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_start_matches(['^', '~', '=', '>', '<', ' ', '\t'])
        .trim();

    if is_concrete(cleaned) {
        Some(cleaned.to_owned())
    } else {
        None
    }
}

/// 구체적 버전인지 확인합니다.
///
/// 숫자로 시작하고, 버전에 허용되는 문자만 포함하며,
/// `x`/`*` 와일드카드 컴포넌트가 없어야 합니다.
fn is_concrete(version: &str) -> bool {
    if version.is_empty() {
        return false;
    }
    if !version.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return false;
    }
    // "1.x", "1.*" 형태의 와일드카드 컴포넌트 거부
    !version
        .split('.')
        .any(|part| part == "x" || part == "X" || part == "*")
}

/// 주어진 버전이 취약점 영향 범위에 포함되는지 확인합니다.
///
/// SemVer 파싱이 실패하면 보수적으로 매칭하지 않습니다(오탐 방지).
/// 여러 범위 중 하나라도 매칭되면 `true`를 반환합니다.
pub fn is_affected(version_str: &str, ranges: &[VersionRange]) -> bool {
    if ranges.is_empty() {
        return false;
    }
    ranges.iter().any(|range| is_in_range(version_str, range))
}

fn is_in_range(version_str: &str, range: &VersionRange) -> bool {
    let version = match parse_lenient(version_str) {
        Some(v) => v,
        None => {
            tracing::warn!(
                version = %version_str,
                "non-SemVer version string encountered, conservatively not matching"
            );
            return false;
        }
    };

    if let Some(ref introduced) = range.introduced {
        match parse_lenient(introduced) {
            Some(intro) if version >= intro => {}
            _ => return false,
        }
    }

    if let Some(ref fixed) = range.fixed {
        match parse_lenient(fixed) {
            Some(fix) if version < fix => {}
            _ => return false,
        }
    }

    true
}

/// SemVer 파싱 — 흔한 비표준 형태(`v` 접두사, `1.2` 두 자리)를 허용합니다.
fn parse_lenient(version: &str) -> Option<semver::Version> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    if let Ok(parsed) = semver::Version::parse(version) {
        return Some(parsed);
    }
    // "1.2" -> "1.2.0" 패딩 후 재시도
    let dots = version.chars().filter(|c| *c == '.').count();
    if dots < 2 {
        let padded = match dots {
            0 => format!("{version}.0.0"),
            _ => format!("{version}.0"),
        };
        return semver::Version::parse(&padded).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_range_operators() {
        assert_eq!(clean_version("^4.17.21").as_deref(), Some("4.17.21"));
        assert_eq!(clean_version("~1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(clean_version(">=2.0.0").as_deref(), Some("2.0.0"));
        assert_eq!(clean_version("<=3.1.4").as_deref(), Some("3.1.4"));
        assert_eq!(clean_version("= 1.0.0").as_deref(), Some("1.0.0"));
        assert_eq!(clean_version("1.0.0").as_deref(), Some("1.0.0"));
    }

    #[test]
    fn clean_rejects_non_concrete() {
        assert_eq!(clean_version(""), None);
        assert_eq!(clean_version("*"), None);
        assert_eq!(clean_version("1.x"), None);
        assert_eq!(clean_version("1.2.*"), None);
        assert_eq!(clean_version("latest"), None);
        assert_eq!(clean_version("1.0.0 || 2.0.0"), None);
    }

    #[test]
    fn clean_keeps_prerelease_and_build() {
        assert_eq!(
            clean_version("^1.0.0-beta.1").as_deref(),
            Some("1.0.0-beta.1")
        );
        assert_eq!(clean_version("2.0.0+build.5").as_deref(), Some("2.0.0+build.5"));
    }

    fn range(introduced: Option<&str>, fixed: Option<&str>) -> VersionRange {
        VersionRange {
            introduced: introduced.map(str::to_owned),
            fixed: fixed.map(str::to_owned),
        }
    }

    #[test]
    fn affected_within_range() {
        let ranges = [range(Some("1.0.0"), Some("1.5.0"))];
        assert!(is_affected("1.2.3", &ranges));
        assert!(!is_affected("0.9.0", &ranges));
        assert!(!is_affected("1.5.0", &ranges));
    }

    #[test]
    fn affected_open_ended() {
        let ranges = [range(None, Some("2.0.0"))];
        assert!(is_affected("0.1.0", &ranges));
        assert!(!is_affected("2.0.0", &ranges));

        let ranges = [range(Some("3.0.0"), None)];
        assert!(is_affected("3.0.0", &ranges));
        assert!(is_affected("99.0.0", &ranges));
    }

    #[test]
    fn affected_empty_ranges_never_match() {
        assert!(!is_affected("1.0.0", &[]));
    }

    #[test]
    fn affected_non_semver_does_not_match() {
        let ranges = [range(None, None)];
        assert!(!is_affected("not-a-version", &ranges));
    }

    #[test]
    fn lenient_parse_accepts_short_and_prefixed() {
        let ranges = [range(Some("1.0"), Some("v2.0"))];
        assert!(is_affected("1.5", &ranges));
        assert!(is_affected("v1.9.9", &ranges));
        assert!(!is_affected("2.0.0", &ranges));
    }
}
