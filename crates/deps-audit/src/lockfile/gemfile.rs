//! Gemfile.lock 파서
//!
//! `GEM` 섹션의 `specs:` 블록에서 의존성을 추출합니다.
//! 4칸 들여쓰기가 gem 자체, 6칸 들여쓰기는 해당 gem의 전이 의존성 선언이며
//! 전이 의존성은 버전이 범위로만 적혀 있으므로 수집하지 않습니다.
//!
//! ```text
//! GEM
//!   remote: https://rubygems.org/
//!   specs:
//!     rails (7.1.3)
//!       actionpack (= 7.1.3)
//!     rake (13.1.0)
//! ```

use layerlens_core::types::Ecosystem;

use crate::error::DepsAuditError;
use crate::lockfile::LockfileParser;
use crate::types::Dependency;

/// Gemfile.lock 파서
pub struct GemfileLockParser;

impl LockfileParser for GemfileLockParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::RubyGems
    }

    fn can_parse(&self, path: &str) -> bool {
        path.ends_with("Gemfile.lock")
    }

    fn parse(&self, content: &str, _path: &str) -> Result<Vec<Dependency>, DepsAuditError> {
        let mut deps = Vec::new();
        let mut in_gem_section = false;
        let mut in_specs = false;

        for line in content.lines() {
            if !line.starts_with(' ') && !line.is_empty() {
                // 새 최상위 섹션 (GEM, PLATFORMS, DEPENDENCIES, ...)
                in_gem_section = line.trim_end() == "GEM";
                in_specs = false;
                continue;
            }

            if in_gem_section && line.trim_end() == "  specs:" {
                in_specs = true;
                continue;
            }

            if !in_specs {
                continue;
            }

            // spec 라인: 정확히 4칸 들여쓰기
            if let Some(spec) = line.strip_prefix("    ") {
                if spec.starts_with(' ') {
                    continue; // 6칸 — 전이 의존성 선언
                }
                if let Some(dep) = parse_spec_line(spec.trim_end()) {
                    deps.push(dep);
                }
            }
        }

        Ok(deps)
    }
}

/// `name (version)` 형식의 spec 라인을 파싱합니다.
fn parse_spec_line(spec: &str) -> Option<Dependency> {
    let open = spec.find(" (")?;
    let name = &spec[..open];
    let version = spec[open + 2..].strip_suffix(')')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some(Dependency::new(name, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEMFILE_LOCK: &str = r#"GEM
  remote: https://rubygems.org/
  specs:
    actionpack (7.1.3)
      actionview (= 7.1.3)
      rack (>= 2.2.4)
    rake (13.1.0)
    rexml (3.2.6)

PLATFORMS
  ruby

DEPENDENCIES
  rails (~> 7.1)

BUNDLED WITH
   2.5.4
"#;

    #[test]
    fn can_parse_by_suffix() {
        let parser = GemfileLockParser;
        assert!(parser.can_parse("app/Gemfile.lock"));
        assert!(!parser.can_parse("app/Gemfile"));
    }

    #[test]
    fn parses_specs_section() {
        let deps = GemfileLockParser.parse(GEMFILE_LOCK, "Gemfile.lock").unwrap();
        assert_eq!(deps.len(), 3);
        assert!(deps.contains(&Dependency::new("actionpack", "7.1.3")));
        assert!(deps.contains(&Dependency::new("rake", "13.1.0")));
        assert!(deps.contains(&Dependency::new("rexml", "3.2.6")));
    }

    #[test]
    fn transitive_declarations_are_skipped() {
        let deps = GemfileLockParser.parse(GEMFILE_LOCK, "Gemfile.lock").unwrap();
        assert!(!deps.iter().any(|d| d.name == "actionview"));
        assert!(!deps.iter().any(|d| d.name == "rack"));
    }

    #[test]
    fn dependencies_section_is_not_collected() {
        let deps = GemfileLockParser.parse(GEMFILE_LOCK, "Gemfile.lock").unwrap();
        assert!(!deps.iter().any(|d| d.name == "rails"));
    }

    #[test]
    fn empty_content_yields_no_deps() {
        let deps = GemfileLockParser.parse("", "Gemfile.lock").unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn spec_line_parsing() {
        assert_eq!(
            parse_spec_line("rake (13.1.0)"),
            Some(Dependency::new("rake", "13.1.0"))
        );
        assert_eq!(parse_spec_line("broken"), None);
        assert_eq!(parse_spec_line(" (1.0)"), None);
    }
}
