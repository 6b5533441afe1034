use pulldown_cmark::{html, Options, Parser};
use rand::Rng;

/// Splits generated text into a title and a markdown body.
///
/// Only the first line is inspected. A leading `#` heading becomes the title;
/// anything else keeps the whole text as body and uses `fallback_title`.
pub fn split_title(raw_text: &str, fallback_title: &str) -> (String, String) {
    let text = raw_text.trim();
    let (first, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text, ""),
    };

    if !first.starts_with('#') {
        return (fallback_title.to_string(), text.to_string());
    }

    let title = first.replace('#', "").trim().to_string();
    let body = rest.trim_start_matches(['\r', '\n']).to_string();
    if title.is_empty() {
        // A bare marker line carries no title of its own
        return (fallback_title.to_string(), body);
    }
    (title, body)
}

/// Markdown to HTML, with scripts, handlers and unknown tags removed.
pub fn render_markdown(body: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(body, options);
    let mut unsafe_html = String::new();
    html::push_html(&mut unsafe_html, parser);

    ammonia::clean(&unsafe_html)
}

/// Banner image URL; the seed only varies the picture.
pub fn cover_image_url<R: Rng + ?Sized>(rng: &mut R) -> String {
    let seed: u32 = rng.random_range(1..=9999);
    format!(
        "https://image.pollinations.ai/prompt/futuristic%20technology%20ai%20background?width=800&height=450&seed={}&nologo=true",
        seed
    )
}

/// Post body: centered banner followed by the right-to-left article.
///
/// The wrapper goes through ammonia too, which escapes the image URL.
pub fn compose_post(article_html: &str, image_url: &str) -> String {
    let mut content = String::new();
    content.push_str("<div style=\"text-align:center;margin-bottom:20px\">\n");
    content.push_str(&format!(
        "  <img src=\"{}\" style=\"max-width:100%;border-radius:12px\">\n",
        image_url
    ));
    content.push_str("</div>\n");
    content.push_str("<div dir=\"rtl\" style=\"text-align:right;line-height:1.8\">\n");
    content.push_str(article_html);
    content.push_str("\n</div>\n");

    layout_sanitizer().clean(&content).to_string()
}

/// ammonia defaults plus the inline layout attributes the post wrapper uses.
fn layout_sanitizer() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::default();
    builder
        .add_generic_attributes(&["style"])
        .add_tag_attributes("div", &["dir"]);
    builder
}
