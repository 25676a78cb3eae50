//! Self-contained HTML report rendering
//!
//! No template engine; the report is small enough to build with `write!`.
//! All user-controlled values (paths, secrets, domains) are HTML-escaped.

use std::fmt::Write;

use layerlens_core::types::FinalOutput;

/// Render the scan results as a standalone HTML page.
pub fn render_html(results: &[FinalOutput]) -> String {
    let mut html = String::from(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Layerlens Scan Report</title>
<style>
  body { font-family: Arial, sans-serif; margin: 20px; }
  h1 { color: #333; }
  table { width: 100%; border-collapse: collapse; margin-bottom: 12px; }
  th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
  th { background-color: #f4f4f4; }
  .section { margin-bottom: 24px; }
</style>
</head>
<body>
<h1>Scan Results</h1>
"#,
    );

    for result in results {
        // write! into String cannot fail
        let _ = write_target_section(&mut html, result);
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn write_target_section(html: &mut String, result: &FinalOutput) -> std::fmt::Result {
    writeln!(html, "<div class=\"section\">")?;
    writeln!(html, "<h2>Target: {}</h2>", escape(&result.target))?;

    writeln!(html, "<h3>Secrets Found:</h3>")?;
    if result.secrets.is_empty() {
        writeln!(html, "<p>No secrets found.</p>")?;
    } else {
        writeln!(
            html,
            "<table><tr><th>Issue</th><th>Path</th><th>Type</th><th>Secret</th></tr>"
        )?;
        for secret in &result.secrets {
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&secret.issue),
                escape(&secret.path),
                escape(&secret.kind),
                escape(&secret.secret),
            )?;
        }
        writeln!(html, "</table>")?;
    }

    writeln!(html, "<h3>Vulnerabilities Found:</h3>")?;
    if result.vulnerabilities.is_empty() {
        writeln!(html, "<p>No vulnerabilities found.</p>")?;
    } else {
        writeln!(
            html,
            "<table><tr><th>Title</th><th>Issue</th><th>File</th><th>Package</th></tr>"
        )?;
        for vuln in &result.vulnerabilities {
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}@{}</td></tr>",
                escape(&vuln.title),
                escape(&vuln.issue),
                escape(&vuln.file),
                escape(&vuln.package),
                escape(&vuln.version),
            )?;
        }
        writeln!(html, "</table>")?;
    }

    writeln!(html, "<h3>Assets:</h3>")?;
    writeln!(html, "<h4>Domains:</h4>")?;
    if result.assets.domains.is_empty() {
        writeln!(html, "<p>No domains found.</p>")?;
    } else {
        writeln!(html, "<table><tr><th>Domain</th><th>Subdomains</th></tr>")?;
        for entry in &result.assets.domains {
            let subs: Vec<String> = entry.subdomains.iter().map(|s| escape(s)).collect();
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(&entry.domain),
                subs.join(" "),
            )?;
        }
        writeln!(html, "</table>")?;
    }

    writeln!(html, "<h4>URLs:</h4>")?;
    if result.assets.urls.is_empty() {
        writeln!(html, "<p>No URLs found.</p>")?;
    } else {
        writeln!(html, "<ul>")?;
        for url in &result.assets.urls {
            writeln!(html, "<li>{}</li>", escape(url))?;
        }
        writeln!(html, "</ul>")?;
    }

    writeln!(html, "</div>")
}

/// Minimal HTML escaping for text content.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
