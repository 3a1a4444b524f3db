//! Pure rendering of a post into an HTML fragment.
//!
//! Stateless: a fragment depends only on the post. The comment body arrives
//! from upstream already rendered as escaped HTML and is passed through;
//! the header fields are plain text and escaped here.

use crate::chan::Post;

/// Render one post to its fixed-order fragment: subject/author/time/post-id
/// header line, optional file line, optional comment body.
#[must_use]
pub fn format_post(post: &Post) -> String {
    let mut subline_parts: Vec<String> = Vec::new();
    if let Some(sub) = post.sub.as_deref() {
        subline_parts.push(escape_html(sub));
    }
    if let Some(name) = post.name.as_deref() {
        subline_parts.push(escape_html(name));
    }
    subline_parts.push(post.time.to_string());
    let subline = subline_parts.join(" ");

    let file_line = post.attachment().map_or_else(
        || "None".to_string(),
        |a| escape_html(&format!("{}{}", a.original_filename, a.extension)),
    );

    let comment = post
        .com
        .as_deref()
        .map(|com| format!("\n<p class='comment'>{com}</p>"))
        .unwrap_or_default();

    format!(
        "<div class='post'>\
         <span class='subline' id='p{no}'>&gt;{subline} &gt;&gt;{no}</span>\n \
         <span class='file'>File: {file_line}</span>\n\
         {comment}</div>",
        no = post.no,
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
