//! Server-rendered pages for the question form.

use pdf_qa_core::SimilarityHit;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};

pub const APP_TITLE: &str = "Q&A Investment Advisor App";
pub const QUESTION_PLACEHOLDER: &str = "Enter your question here";
pub const PANEL_TITLE: &str = "Document Similarity Search";

pub const EXAMPLE_QUESTIONS: [&str; 3] = [
    "What was the company's net profit?",
    "What sustainability initiatives did the bank implement?",
    "Provide a summary of the bank's financial performance.",
];

/// What the page shows below the form.
pub enum Outcome<'a> {
    Empty,
    Answered {
        question: &'a str,
        answer: &'a str,
        top_match: Result<Option<&'a SimilarityHit>, String>,
    },
    Failed {
        question: &'a str,
        message: &'a str,
    },
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Relative targets and http(s)/mailto URLs. Anything else, such as
/// `javascript:` or `data:`, is dropped.
fn is_safe_destination(dest: &str) -> bool {
    let cleaned: String = dest
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    match cleaned.find([':', '/', '?', '#']) {
        Some(end) if cleaned[end..].starts_with(':') => {
            let scheme = cleaned[..end].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
        _ => true,
    }
}

/// Markdown to HTML. Raw HTML in the source is rendered as text and links or
/// images with unsafe targets are reduced to their text.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    // Whether each open link or image was kept, so its end tag matches.
    let mut open: Vec<bool> = Vec::new();
    let events = Parser::new_ext(markdown, options).filter_map(move |event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Link { ref dest_url, .. })
        | Event::Start(Tag::Image { ref dest_url, .. }) => {
            let keep = is_safe_destination(dest_url);
            open.push(keep);
            keep.then_some(event)
        }
        Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
            open.pop().unwrap_or(true).then_some(event)
        }
        other => Some(other),
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn examples_block() -> String {
    let items: String = EXAMPLE_QUESTIONS
        .iter()
        .map(|q| format!("<li>{}</li>", escape_html(q)))
        .collect();
    format!("<section class=\"examples\"><h3>Example questions</h3><ul>{items}</ul></section>")
}

fn panel(top_match: &Result<Option<&SimilarityHit>, String>) -> String {
    let body = match top_match {
        Ok(Some(hit)) => format!("<pre>{}</pre>", escape_html(&hit.text)),
        Ok(None) => "<p>No matching passage.</p>".to_string(),
        Err(message) => format!(
            "<p class=\"error\">Search failed: {}</p>",
            escape_html(message)
        ),
    };
    format!("<details><summary>{PANEL_TITLE}</summary>{body}</details>")
}

pub fn render_page(document_title: &str, outcome: &Outcome<'_>) -> String {
    let question_value = match outcome {
        Outcome::Answered { question, .. } | Outcome::Failed { question, .. } => {
            escape_html(question)
        }
        Outcome::Empty => String::new(),
    };

    let result = match outcome {
        Outcome::Empty => String::new(),
        Outcome::Answered {
            answer, top_match, ..
        } => format!(
            "<article class=\"answer\">{}</article>{}",
            markdown_to_html(answer),
            panel(top_match)
        ),
        Outcome::Failed { message, .. } => format!(
            "<div class=\"error\" role=\"alert\">Could not answer: {}</div>",
            escape_html(message)
        ),
    };

    format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title}</title>\
         <style>body{{font-family:sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem}}\
         .error{{color:#b00020}}input[type=text]{{width:100%;padding:.5rem}}\
         details{{margin-top:1.5rem}}pre{{white-space:pre-wrap}}</style></head>\
         <body><h1>{title}</h1><p class=\"document\">Document: {document}</p>\
         {examples}\
         <form method=\"post\" action=\"/ask\">\
         <input type=\"text\" name=\"question\" placeholder=\"{placeholder}\" value=\"{value}\" autofocus>\
         <button type=\"submit\">Ask</button></form>\
         {result}</body></html>",
        title = escape_html(APP_TITLE),
        document = escape_html(document_title),
        examples = examples_block(),
        placeholder = QUESTION_PLACEHOLDER,
        value = question_value,
        result = result,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> SimilarityHit {
        SimilarityHit {
            entry_id: "e1".to_string(),
            text: text.to_string(),
            metadata: None,
            distance: 0.1,
        }
    }

    #[test]
    fn empty_page_has_form_and_examples() {
        let page = render_page("annualreport", &Outcome::Empty);

        assert!(page.contains("Q&amp;A Investment Advisor App"));
        assert!(page.contains("placeholder=\"Enter your question here\""));
        assert!(page.contains("What was the company&#39;s net profit?"));
        assert!(!page.contains(PANEL_TITLE));
    }

    #[test]
    fn raw_html_in_answers_is_escaped() {
        let rendered = markdown_to_html("**Net profit:** $500m <script>alert(1)</script>");

        assert!(rendered.contains("<strong>Net profit:</strong>"));
        assert!(!rendered.contains("<script>"));
        assert!(rendered.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_links_become_plain_text() {
        let rendered =
            markdown_to_html("[details](javascript:alert(document.cookie)) and [x](JaVaScRiPt:1)");

        assert!(!rendered.contains("<a"));
        assert!(!rendered.to_ascii_lowercase().contains("javascript"));
        assert!(rendered.contains("details"));
    }

    #[test]
    fn data_images_keep_only_their_alt_text() {
        let rendered = markdown_to_html("![chart](data:text/html;base64,PHNjcmlwdD4=)");

        assert!(!rendered.contains("<img"));
        assert!(rendered.contains("chart"));
    }

    #[test]
    fn web_and_relative_links_survive() {
        let rendered = markdown_to_html(
            "[report](https://example.com/report.pdf) [mail](mailto:ir@example.com) [top](#summary)",
        );

        assert!(rendered.contains("<a href=\"https://example.com/report.pdf\">report</a>"));
        assert!(rendered.contains("<a href=\"mailto:ir@example.com\">mail</a>"));
        assert!(rendered.contains("<a href=\"#summary\">top</a>"));
    }

    #[test]
    fn answered_page_shows_only_the_top_match() {
        let top = hit("Net profit was 500m");
        let page = render_page(
            "annualreport",
            &Outcome::Answered {
                question: "What was the net profit?",
                answer: "- Net profit: 500m",
                top_match: Ok(Some(&top)),
            },
        );

        assert!(page.contains("<li>Net profit: 500m</li>"));
        assert!(page.contains("<summary>Document Similarity Search</summary>"));
        assert!(page.contains("<pre>Net profit was 500m</pre>"));
        assert!(page.contains("value=\"What was the net profit?\""));
    }

    #[test]
    fn panel_errors_stay_inside_the_panel() {
        let page = render_page(
            "annualreport",
            &Outcome::Answered {
                question: "q",
                answer: "a",
                top_match: Err("backend <down>".to_string()),
            },
        );

        let details = page.find("<details>").expect("panel present");
        let error = page.find("Search failed: backend &lt;down&gt;").expect("error shown");
        assert!(error > details);
    }

    #[test]
    fn failure_banner_is_escaped() {
        let page = render_page(
            "annualreport",
            &Outcome::Failed {
                question: "q",
                message: "<b>timeout</b>",
            },
        );

        assert!(page.contains("role=\"alert\""));
        assert!(page.contains("&lt;b&gt;timeout&lt;/b&gt;"));
    }
}
