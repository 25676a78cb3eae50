//! 자산 추출 — 파일 내용에서 도메인과 URL 수집
//!
//! 도메인 후보 토큰을 정규식으로 찾은 뒤 public suffix list로
//! 등록 가능(registrable) 도메인을 구해 그 아래에 하위 도메인을 묶습니다.
//! private suffix(`*.github.io` 등)는 무시합니다.
//! URL은 스킴이 있는 것만 수집합니다.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use linkify::{LinkFinder, LinkKind};

use layerlens_core::types::{Assets, SubAndDom};

/// 도메인 후보 토큰 패턴
static DOMAIN_TOKEN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[A-Za-z0-9][A-Za-z0-9.\-]{2,63}\.[A-Za-z0-9]{2,18}")
        .expect("domain token pattern is valid")
});

/// 텍스트에서 스킴을 포함한 URL을 추출합니다.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder.links(text).map(|link| link.as_str().to_owned()).collect()
}

/// 텍스트에서 등록 가능 도메인별로 묶인 도메인/하위 도메인을 추출합니다.
///
/// - 토큰과 등록 가능 도메인이 같으면 하위 도메인으로 넣지 않습니다.
/// - 등록 가능 도메인을 구할 수 없는 토큰(알 수 없는 suffix 등)은 버립니다.
pub fn extract_domains(text: &str) -> Vec<SubAndDom> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for token in DOMAIN_TOKEN.find_iter(text) {
        let token = token.as_str().to_lowercase();
        let Some(domain) = registrable_domain(&token) else {
            continue;
        };

        let subs = grouped.entry(domain.clone()).or_default();
        if token != domain {
            subs.push(token);
        }
    }

    grouped
        .into_iter()
        .map(|(domain, subdomains)| SubAndDom { domain, subdomains })
        .collect()
}

/// public suffix list로 등록 가능 도메인을 구합니다 (ICANN 섹션만).
fn registrable_domain(token: &str) -> Option<String> {
    let domain = psl::domain(token.as_bytes())?;
    if domain.suffix().typ() != Some(psl::Type::Icann) {
        return None;
    }
    std::str::from_utf8(domain.as_bytes())
        .ok()
        .map(str::to_owned)
}

/// 버퍼 하나의 도메인과 URL을 누적 자산에 더합니다.
pub fn add_domains_and_urls(assets: &mut Assets, text: &str) {
    assets.domains.extend(extract_domains(text));
    assets.urls.extend(extract_urls(text));
}
