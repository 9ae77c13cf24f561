//! Minimal HTML pages for the upload front end.

const STYLE: &str = "body{font-family:sans-serif;max-width:40rem;margin:3rem auto;padding:0 1rem}\
.error{color:#b00020}.ok{color:#1b5e20}a.button{display:inline-block;padding:.4rem .8rem;\
background:#1565c0;color:#fff;text-decoration:none;border-radius:4px}";

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>clipforge</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>Convert a camcorder clip</h1>\n{body}\n</body>\n</html>\n"
    )
}

fn form(accept: &[String]) -> String {
    let accept = accept
        .iter()
        .map(|e| format!(".{}", e.trim_start_matches('.')))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\"{}\" required>\n\
         <button type=\"submit\">Convert and upload</button>\n</form>",
        escape_html(&accept)
    )
}

/// The upload form.
pub fn index_page(accept: &[String]) -> String {
    layout(&form(accept))
}

/// Success page with the storage link and the one-time download link.
pub fn success_page(view_url: &str, download_path: &str, file_name: &str, accept: &[String]) -> String {
    layout(&format!(
        "<p class=\"ok\">Converted and uploaded <strong>{name}</strong>.</p>\n\
         <p><a href=\"{view}\" target=\"_blank\" rel=\"noopener\">View the file in storage</a></p>\n\
         <p><a class=\"button\" href=\"{download}\">Download once</a></p>\n\
         <p>The download link works a single time.</p>\n<hr>\n{form}",
        name = escape_html(file_name),
        view = escape_html(view_url),
        download = escape_html(download_path),
        form = form(accept),
    ))
}

/// Error page linking back to the form.
pub fn error_page(message: &str) -> String {
    layout(&format!(
        "<p class=\"error\">{}</p>\n<p><a href=\"/\">Back to upload</a></p>",
        escape_html(message)
    ))
}
