//! Server-rendered pages: listings, login form, action results.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::config::LOGIN_ROUTE;
use crate::listing::{DirEntry, SortKey, SortOrder, format_timestamp};

/// Characters escaped when embedding names into hrefs. `/` stays literal so
/// directory links keep their trailing slash.
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'&')
    .add(b'%')
    .add(b'+')
    .add(b'\'');

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn href(raw: &str) -> String {
    utf8_percent_encode(raw, HREF_ENCODE).to_string()
}

/// 1024-based unit ladder with one decimal, in the style of the classic
/// `sizeof_fmt` helper.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}YiB")
}

fn page_open(title: &str, heading: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h2>{}</h2>\n<hr>\n",
        title, heading
    )
}

const PAGE_CLOSE: &str = "<hr>\n</body>\n</html>\n";

/// The directory listing page: upload form, create-folder box, zip download
/// link, sort bar, and one line per entry with a delete link.
pub fn listing_page(
    display_path: &str,
    raw_path: &str,
    entries: &[DirEntry],
    sort: SortKey,
    order: SortOrder,
) -> String {
    let title = format!("Directory listing for {}", escape(display_path));
    let mut body = page_open(&title, &title);

    body.push_str("<form enctype=\"multipart/form-data\" method=\"post\">");
    body.push_str("<input name=\"file\" type=\"file\" multiple/>");
    body.push_str("<input type=\"submit\" value=\"upload\"/></form>\n");

    body.push_str(&format!(
        "<form onsubmit=\"window.open('{}?createfolder=' + encodeURIComponent(document.getElementById('folderName').value), '_self'); return false;\">",
        escape(raw_path)
    ));
    body.push_str("<small><i>Create folder:</i></small> <input type=\"text\" id=\"folderName\">");
    body.push_str("<input type=\"submit\" value=\"Create\"></form>\n");

    body.push_str(&format!(
        "<a href=\"{}?download\">Download Directory Tree as Zip</a>\n",
        escape(raw_path)
    ));

    let mut sort_links = Vec::new();
    for key in [SortKey::Name, SortKey::Size, SortKey::Created, SortKey::Updated] {
        let next_order = if key == sort && order == SortOrder::Asc {
            "desc"
        } else {
            "asc"
        };
        sort_links.push(format!(
            "<a href=\"?sort={}&order={}\">{}</a>",
            key.as_query(),
            next_order,
            key.as_query()
        ));
    }
    body.push_str(&format!(
        "<br><small>sort by: {}</small>\n",
        sort_links.join(" | ")
    ));

    body.push_str("<hr>\n<ul>\n");
    if display_path != "/" {
        body.push_str("<li><a href=\"..\">..</a></li>\n");
    }
    for entry in entries {
        let link = href(&entry.link_name());
        let label = escape(&entry.display_name());
        let size = if entry.is_dir {
            String::new()
        } else {
            format!(" <small><i>({})</i></small>", human_size(entry.size))
        };
        let modified = entry
            .modified
            .map(|ts| format!(" <small>{}</small>", format_timestamp(ts)))
            .unwrap_or_default();
        body.push_str(&format!(
            "<li><a href=\"{link}\">{label}</a>{size}{modified} <a href=\"?deletefile={}\">x</a></li>\n",
            href(&entry.name)
        ));
    }
    body.push_str("</ul>\n");
    body.push_str(PAGE_CLOSE);
    body
}

/// The login form. `next` round-trips through a hidden field so a successful
/// login lands where the visitor was headed.
pub fn login_page(next: &str, error: Option<&str>) -> String {
    let mut body = page_open("Login", "Password required");
    if let Some(error) = error {
        body.push_str(&format!("<p><strong>{}</strong></p>\n", escape(error)));
    }
    body.push_str(&format!("<form method=\"post\" action=\"{LOGIN_ROUTE}\">"));
    body.push_str("<input name=\"password\" type=\"password\" autofocus/>");
    body.push_str(&format!(
        "<input name=\"next\" type=\"hidden\" value=\"{}\"/>",
        escape(next)
    ));
    body.push_str("<input type=\"submit\" value=\"login\"/></form>\n");
    body.push_str(PAGE_CLOSE);
    body
}

/// Result page for the action routes (upload, delete, create folder). Always
/// served with HTTP 200; the verdict lives in the body.
pub fn result_page(title: &str, heading: &str, success: bool, message: &str, back: &str) -> String {
    let mut body = page_open(&escape(title), &escape(heading));
    if success {
        body.push_str("<strong>Success:</strong> ");
    } else {
        body.push_str("<strong>Failed:</strong> ");
    }
    body.push_str(&escape(message));
    body.push_str(&format!("<br><a href=\"{}\">back</a>\n", escape(back)));
    body.push_str(PAGE_CLOSE);
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn href_encodes_spaces_but_not_slashes() {
        assert_eq!(href("my file/"), "my%20file/");
        assert_eq!(href("100%.txt"), "100%25.txt");
    }

    #[test]
    fn human_size_walks_the_unit_ladder() {
        assert_eq!(human_size(512), "512.0B");
        assert_eq!(human_size(2048), "2.0KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0MiB");
    }

    #[test]
    fn result_page_carries_the_verdict_in_the_body() {
        let ok = result_page("t", "h", true, "done", "/dir/");
        assert!(ok.contains("<strong>Success:</strong>"));
        let bad = result_page("t", "h", false, "already exists", "/dir/");
        assert!(bad.contains("<strong>Failed:</strong>"));
        assert!(bad.contains("already exists"));
    }

    #[test]
    fn login_page_embeds_next_and_error() {
        let page = login_page("/photos/?sort=size", Some("Wrong password, try again."));
        assert!(page.contains("value=\"/photos/?sort=size\""));
        assert!(page.contains("Wrong password"));
        assert!(page.contains(LOGIN_ROUTE));
    }
}
