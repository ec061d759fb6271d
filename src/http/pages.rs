//! The three reserved, statically-served pages (spec.md §4.5, §6): the
//! landing page, `/version`, and `/help`. None of these touch the registry.

use axum::http::HeaderMap;
use axum::response::Html;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost:8080");
    format!("{proto}://{host}")
}

pub async fn landing(headers: HeaderMap) -> Html<String> {
    let base = base_url(&headers);
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>piping-relay</title>
  <style>
    * {{ margin: 0; padding: 0; box-sizing: border-box; }}
    body {{
      font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
      background: #0f1117;
      color: #e1e4e8;
      display: flex;
      align-items: center;
      justify-content: center;
      min-height: 100vh;
    }}
    .container {{ max-width: 640px; padding: 2rem; }}
    h1 {{ font-size: 1.75rem; margin-bottom: 1rem; }}
    pre {{
      background: #161b22;
      border: 1px solid #30363d;
      border-radius: 6px;
      padding: 1rem;
      overflow-x: auto;
      margin-bottom: 1rem;
    }}
    a {{ color: #58a6ff; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>piping-relay</h1>
    <p>Pipe data over HTTP, no storage involved.</p>
    <pre># Send
curl -T myfile {base}/mypath123

# Receive
curl {base}/mypath123</pre>
    <p>See <a href="/help">/help</a> and <a href="/version">/version</a>.</p>
  </div>
</body>
</html>
"#
    ))
}

pub async fn version() -> String {
    format!("piping-relay {VERSION}\n")
}

pub async fn help(headers: HeaderMap) -> String {
    let base = base_url(&headers);
    format!(
        "piping-relay {VERSION}\n\
         \n\
         Send:\n\
         \tcurl -T myfile {base}/mypath123\n\
         \n\
         Get:\n\
         \tcurl {base}/mypath123\n\
         \n\
         Send with a specific number of receivers:\n\
         \tcurl -T myfile '{base}/mypath123?n=3'\n\
         \n\
         Paths '/', '/version' and '/help' are reserved and cannot be used\n\
         as send/receive paths.\n"
    )
}
