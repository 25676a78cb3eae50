//! 태그 단위 결과 집계
//!
//! 워커 join 이후 호출되어 자산을 중복 제거하고, 실행 간 결과 비교가
//! 가능하도록 발견 목록을 안정적 순서로 정렬합니다.
//! 경로가 다른 동일 시크릿은 서로 다른 발견이므로 유지됩니다.

use layerlens_core::types::FinalOutput;

/// 태그 스캔 결과를 최종 형태로 다듬습니다.
pub(crate) fn finalize(output: &mut FinalOutput) {
    output.assets.make_unique();

    output
        .secrets
        .sort_by(|a, b| (&a.path, &a.kind, &a.secret).cmp(&(&b.path, &b.kind, &b.secret)));
    output
        .vulnerabilities
        .sort_by(|a, b| (&a.file, &a.package, &a.title).cmp(&(&b.file, &b.package, &b.title)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerlens_core::types::{Assets, SecretIssue, SubAndDom};

    fn secret(path: &str, kind: &str, secret: &str) -> SecretIssue {
        SecretIssue {
            issue: String::new(),
            path: path.to_owned(),
            kind: kind.to_owned(),
            secret: secret.to_owned(),
        }
    }

    #[test]
    fn finalize_dedups_assets_and_sorts_findings() {
        let mut output = FinalOutput::new("repo:tag");
        output.assets = Assets {
            domains: vec![
                SubAndDom {
                    domain: "example.com".to_owned(),
                    subdomains: vec!["b.example.com".to_owned()],
                },
                SubAndDom {
                    domain: "example.com".to_owned(),
                    subdomains: vec!["a.example.com".to_owned()],
                },
            ],
            urls: vec!["https://b.test/".to_owned(), "https://a.test/".to_owned()],
        };
        output.secrets = vec![secret("z", "k", "s"), secret("a", "k", "s")];

        finalize(&mut output);

        assert_eq!(output.assets.domains.len(), 1);
        assert_eq!(
            output.assets.domains[0].subdomains,
            vec!["a.example.com", "b.example.com"]
        );
        assert_eq!(output.assets.urls, vec!["https://a.test/", "https://b.test/"]);
        assert_eq!(output.secrets[0].path, "a");
    }

    #[test]
    fn same_secret_in_different_paths_is_kept() {
        let mut output = FinalOutput::new("repo:tag");
        output.secrets = vec![secret("a/.env", "k", "tok"), secret("b/.env", "k", "tok")];
        finalize(&mut output);
        assert_eq!(output.secrets.len(), 2);
    }
}
