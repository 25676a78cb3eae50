//! 도메인 타입 — lockfile에서 추출된 의존성

use std::fmt;

use serde::{Deserialize, Serialize};

/// lockfile에서 추출된 (이름, 버전) 의존성
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// 패키지 이름 (scoped 패키지 포함, 예: `@types/node`)
    pub name: String,
    /// 선언된 버전 문자열 (범위 연산자가 남아있을 수 있음)
    pub version: String,
}

impl Dependency {
    /// 이름과 버전으로 의존성을 생성합니다.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_display() {
        let dep = Dependency::new("lodash", "4.17.21");
        assert_eq!(dep.to_string(), "lodash@4.17.21");
    }
}
