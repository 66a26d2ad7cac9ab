//! Structural decomposition of HTML into ordered sections and assets.
//!
//! Walks the block-level elements of a document in order, cutting a new
//! [`SectionChunk`] at every heading. Tables become pipe grids, preformatted
//! blocks become fenced code. Images are collected independently as [`Asset`]s.
//! Nothing here touches the network or the filesystem.

mod outline;
mod table;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};

use html2doc_shared::{Asset, SectionChunk};

pub use outline::{PREVIEW_CHARS, build_outline};
pub use table::render_table;

/// Heading text of the single section emitted when nothing else matched.
pub const FALLBACK_HEADING: &str = "full text";

/// Elements that always stand as their own block, wherever they appear.
const STRUCTURAL_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "table", "pre"];

/// Elements whose text is contributed to the section body.
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "table", "pre", "code",
];

/// Elements whose contents are never document text.
const HIDDEN_TAGS: &[&str] = &["script", "style", "template", "noscript"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of decomposing one HTML document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    /// Sections in document order, `order` dense from 1.
    pub sections: Vec<SectionChunk>,
    /// Images in document order, independent of section boundaries.
    pub assets: Vec<Asset>,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Decompose raw HTML into ordered sections and assets.
///
/// A `<p>` or `<li>` is one line of text, including any `<p>` or `<code>` it
/// holds. Headings, tables and preformatted blocks are always their own block,
/// even when nested in a list item.
/// When no section results, the whole document text becomes one fallback section.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn extract(html: &str) -> ExtractedDocument {
    let doc = Html::parse_document(html);

    let assets = collect_assets(&doc);
    let mut sections = collect_sections(&doc);

    if sections.is_empty() {
        let text = plain_text(&doc);
        if !text.is_empty() {
            debug!("no block elements matched, emitting full-text section");
            sections.push(SectionChunk {
                id: section_id(1),
                heading: Some(FALLBACK_HEADING.to_string()),
                level: 1,
                body: text,
                order: 1,
            });
        }
    }

    debug!(
        sections = sections.len(),
        assets = assets.len(),
        "structural extraction complete"
    );

    ExtractedDocument { sections, assets }
}

/// Accumulates block text until the next heading closes the section.
struct SectionBuilder {
    sections: Vec<SectionChunk>,
    heading: Option<String>,
    level: u8,
    buffer: Vec<String>,
}

impl SectionBuilder {
    fn new() -> Self {
        Self {
            sections: Vec::new(),
            heading: None,
            level: 1,
            buffer: Vec::new(),
        }
    }

    /// Close the open section; empty bodies are dropped without using an order index.
    fn flush(&mut self) {
        let body = self
            .buffer
            .drain(..)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if body.is_empty() {
            return;
        }

        let order = self.sections.len() + 1;
        self.sections.push(SectionChunk {
            id: section_id(order),
            heading: self.heading.clone(),
            level: self.level,
            body,
            order,
        });
    }

    fn start_heading(&mut self, text: String, level: u8) {
        self.flush();
        self.heading = (!text.is_empty()).then_some(text);
        self.level = level;
    }

    fn push(&mut self, text: String) {
        if !text.is_empty() {
            self.buffer.push(text);
        }
    }

    fn finish(mut self) -> Vec<SectionChunk> {
        self.flush();
        self.sections
    }
}

fn collect_sections(doc: &Html) -> Vec<SectionChunk> {
    let mut builder = SectionBuilder::new();
    walk_blocks(&mut builder, doc.root_element(), false);
    builder.finish()
}

/// Visit the children of `parent` in document order.
///
/// Inside a `<p>`/`<li>` that holds structural blocks (`inline` set), loose
/// text and inline elements between those blocks are gathered into lines.
fn walk_blocks(builder: &mut SectionBuilder, parent: ElementRef, inline: bool) {
    let mut pending: Vec<String> = Vec::new();

    for child in parent.children() {
        let Some(element) = ElementRef::wrap(child) else {
            if let (true, Node::Text(text)) = (inline, child.value()) {
                pending.extend(text.split_whitespace().map(str::to_string));
            }
            continue;
        };

        let name = element.value().name();
        if HIDDEN_TAGS.contains(&name) {
            continue;
        }

        if let Some(level) = heading_level(name) {
            flush_pending(builder, &mut pending);
            builder.start_heading(collapsed_text(&element), level);
            continue;
        }

        match name {
            "table" => {
                flush_pending(builder, &mut pending);
                builder.push(render_table(&element));
            }
            "pre" => {
                flush_pending(builder, &mut pending);
                builder.push(fenced_code(&element));
            }
            "p" | "li" if has_structural_descendant(&element) => {
                flush_pending(builder, &mut pending);
                walk_blocks(builder, element, true);
            }
            "p" | "li" => {
                flush_pending(builder, &mut pending);
                builder.push(collapsed_text(&element));
            }
            "code" if inline => pending.push(collapsed_text(&element)),
            "code" => builder.push(fenced_code(&element)),
            _ if has_block_descendant(&element) => {
                flush_pending(builder, &mut pending);
                walk_blocks(builder, element, inline);
            }
            _ if inline => pending.push(collapsed_text(&element)),
            _ => {}
        }
    }

    flush_pending(builder, &mut pending);
}

fn flush_pending(builder: &mut SectionBuilder, pending: &mut Vec<String>) {
    let line = pending
        .drain(..)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    builder.push(line);
}

fn collect_assets(doc: &Html) -> Vec<Asset> {
    let images = selector("img");
    doc.select(&images)
        .enumerate()
        .map(|(idx, img)| Asset {
            id: format!("asset-{}", idx + 1),
            src: img.value().attr("src").unwrap_or_default().to_string(),
            alt: img.value().attr("alt").map(str::to_string),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

fn section_id(order: usize) -> String {
    format!("sec-{order}")
}

/// `h1`..`h6` → 1..6.
fn heading_level(name: &str) -> Option<u8> {
    let digit = name.strip_prefix('h')?;
    match digit.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

fn has_structural_descendant(element: &ElementRef) -> bool {
    has_descendant(element, STRUCTURAL_TAGS)
}

fn has_block_descendant(element: &ElementRef) -> bool {
    has_descendant(element, BLOCK_TAGS)
}

fn has_descendant(element: &ElementRef, names: &[&str]) -> bool {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|el| names.contains(&el.value().name()))
}

/// Element text with whitespace collapsed. Separate text nodes (split by
/// `<br>`, nested blocks or cell markup) are joined with a space.
pub(crate) fn collapsed_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a `<pre>`/`<code>` block as a fenced code block, keeping line breaks.
fn fenced_code(element: &ElementRef) -> String {
    let code = element.text().collect::<String>();
    let code = code.trim_matches('\n').trim_end();
    if code.trim().is_empty() {
        return String::new();
    }

    let language = code_language(element).unwrap_or_default();
    format!("```{language}\n{code}\n```")
}

/// Language hint from a `language-*` / `lang-*` class on the block or its `<code>` child.
fn code_language(element: &ElementRef) -> Option<String> {
    let from_classes = |el: ElementRef| {
        el.value().classes().find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        })
    };

    from_classes(*element).or_else(|| {
        element
            .children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "code")
            .and_then(from_classes)
    })
}

/// Whole-document text, skipping script and style contents.
fn plain_text(doc: &Html) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|parent| matches!(parent.value().name(), "script" | "style"));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_path(name: &str) -> std::path::PathBuf {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures")
            .join(name)
    }

    fn load_fixture(name: &str) -> String {
        fs::read_to_string(fixture_path(name))
            .unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    fn assert_dense_orders(sections: &[SectionChunk]) {
        for (idx, section) in sections.iter().enumerate() {
            assert_eq!(section.order, idx + 1, "order must be dense from 1");
            assert_eq!(section.id, format!("sec-{}", idx + 1));
            assert!(!section.body.trim().is_empty(), "{} has empty body", section.id);
        }
    }

    #[test]
    fn splits_on_headings() {
        let html = r#"<html><body>
            <h1>Reset password</h1>
            <p>Open the account page.</p>
            <h2>From the app</h2>
            <ul><li>Tap Settings</li><li>Tap Reset</li></ul>
        </body></html>"#;

        let doc = extract(html);
        assert_eq!(doc.sections.len(), 2);
        assert_dense_orders(&doc.sections);

        assert_eq!(doc.sections[0].heading.as_deref(), Some("Reset password"));
        assert_eq!(doc.sections[0].level, 1);
        assert_eq!(doc.sections[0].body, "Open the account page.");

        assert_eq!(doc.sections[1].heading.as_deref(), Some("From the app"));
        assert_eq!(doc.sections[1].level, 2);
        assert_eq!(doc.sections[1].body, "Tap Settings\nTap Reset");
    }

    #[test]
    fn empty_sections_do_not_consume_order() {
        let html = r#"<html><body>
            <h1>Title only</h1>
            <h2>Also empty</h2>
            <h2>Has content</h2>
            <p>Body.</p>
            <h3>Trailing</h3>
            <p>   </p>
        </body></html>"#;

        let doc = extract(html);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].id, "sec-1");
        assert_eq!(doc.sections[0].heading.as_deref(), Some("Has content"));
        assert_eq!(doc.sections[0].level, 2);
    }

    #[test]
    fn content_before_first_heading_is_untitled() {
        let html = "<body><p>Preamble text.</p><h2>Next</h2><p>More.</p></body>";

        let doc = extract(html);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading, None);
        assert_eq!(doc.sections[0].level, 1);
        assert_eq!(doc.sections[1].heading.as_deref(), Some("Next"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        let html = "<body><h1>  Spaced \n heading </h1><p>one\n\n   two <b>three</b></p></body>";

        let doc = extract(html);
        assert_eq!(doc.sections[0].heading.as_deref(), Some("Spaced heading"));
        assert_eq!(doc.sections[0].body, "one two three");
    }

    #[test]
    fn nested_blocks_are_not_duplicated() {
        let html = r#"<body><h1>Steps</h1>
            <ol><li><p>First <code>cmd</code></p></li></ol>
            <p>Use <code>inline</code> code.</p>
        </body>"#;

        let doc = extract(html);
        assert_eq!(doc.sections[0].body, "First cmd\nUse inline code.");
    }

    #[test]
    fn separate_text_nodes_keep_word_boundaries() {
        let html = "<body><h2>Reset<br>password</h2><p>Line one<br>Line two</p>\
            <ul><li><p>Step A</p><p>Step B</p></li></ul></body>";

        let doc = extract(html);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading.as_deref(), Some("Reset password"));
        assert_eq!(doc.sections[0].body, "Line one Line two\nStep A Step B");
    }

    #[test]
    fn table_cells_with_several_nodes_keep_spaces() {
        let html = "<body><h1>Plans</h1><table>\
            <tr><th>Plan<br>name</th></tr><tr><td>Pro<br>plan</td></tr></table></body>";

        let doc = extract(html);
        assert_eq!(
            doc.sections[0].body,
            "| Plan name |\n| --------- |\n| Pro plan  |"
        );
    }

    #[test]
    fn headings_inside_list_items_start_sections() {
        let html = r#"<body><h1>Guide</h1><p>Intro.</p>
            <ul><li><h2>Billing</h2><p>Pay invoices.</p>
                <table><tr><th>A</th><th>B</th></tr><tr><td>x</td><td>y</td></tr></table>
            </li></ul></body>"#;

        let doc = extract(html);
        assert_dense_orders(&doc.sections);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading.as_deref(), Some("Guide"));
        assert_eq!(doc.sections[0].body, "Intro.");
        assert_eq!(doc.sections[1].heading.as_deref(), Some("Billing"));
        assert_eq!(doc.sections[1].level, 2);
        assert_eq!(
            doc.sections[1].body,
            "Pay invoices.\n| A   | B   |\n| --- | --- |\n| x   | y   |"
        );
    }

    #[test]
    fn preformatted_block_in_list_item_stays_fenced() {
        let html = r#"<body><h1>Console</h1><ol>
            <li>Run this command: <pre><code class="language-sh">acct usage</code></pre> then wait.</li>
            <li>Check the result.</li>
        </ol></body>"#;

        let doc = extract(html);
        assert_eq!(
            doc.sections[0].body,
            "Run this command:\n```sh\nacct usage\n```\nthen wait.\nCheck the result."
        );
    }

    #[test]
    fn preformatted_blocks_are_fenced() {
        let html = r#"<body><h1>Example</h1>
<pre><code class="language-sh">curl -X POST \
  https://example.com/reset</code></pre>
</body>"#;

        let doc = extract(html);
        assert_eq!(
            doc.sections[0].body,
            "```sh\ncurl -X POST \\\n  https://example.com/reset\n```"
        );
    }

    #[test]
    fn tables_render_as_grids() {
        let html = r#"<body><h1>Plans</h1>
            <table>
                <tr><th>A</th><th>B</th></tr>
                <tr><td>x</td><td>y</td></tr>
            </table>
        </body>"#;

        let doc = extract(html);
        assert_eq!(
            doc.sections[0].body,
            "| A   | B   |\n| --- | --- |\n| x   | y   |"
        );
    }

    #[test]
    fn fallback_section_covers_full_text() {
        let html = r#"<html><head><style>body { color: red }</style></head>
            <body><div>Loose <span>text</span></div><div>only</div>
            <script>var hidden = 1;</script></body></html>"#;

        let doc = extract(html);
        assert_eq!(doc.sections.len(), 1);
        let section = &doc.sections[0];
        assert_eq!(section.id, "sec-1");
        assert_eq!(section.order, 1);
        assert_eq!(section.level, 1);
        assert_eq!(section.heading.as_deref(), Some(FALLBACK_HEADING));
        assert_eq!(section.body, "Loose text only");
    }

    #[test]
    fn empty_document_yields_nothing() {
        let doc = extract("<html><body>   </body></html>");
        assert!(doc.sections.is_empty());
        assert!(doc.assets.is_empty());
    }

    #[test]
    fn assets_are_numbered_in_document_order() {
        let html = r#"<body>
            <img src="logo.png" alt="Logo">
            <h1>Intro</h1><p>Text <img src="inline.gif"></p>
            <h2>Later</h2><p>More</p><img alt="no source">
        </body>"#;

        let doc = extract(html);
        let ids: Vec<_> = doc.assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["asset-1", "asset-2", "asset-3"]);
        assert_eq!(doc.assets[0].src, "logo.png");
        assert_eq!(doc.assets[0].alt.as_deref(), Some("Logo"));
        assert_eq!(doc.assets[1].alt, None);
        assert_eq!(doc.assets[2].src, "");
    }

    #[test]
    fn heading_level_parsing() {
        assert_eq!(heading_level("h1"), Some(1));
        assert_eq!(heading_level("h6"), Some(6));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("hr"), None);
        assert_eq!(heading_level("p"), None);
    }

    #[test]
    fn support_manual_fixture() {
        let html = load_fixture("html/support-manual.html");
        let doc = extract(&html);

        assert_dense_orders(&doc.sections);
        assert_eq!(doc.sections.len(), 4);
        assert_eq!(doc.sections[0].heading.as_deref(), Some("Customer Support Manual"));
        assert_eq!(doc.sections[1].heading.as_deref(), Some("Resetting a password"));
        assert!(doc.sections[1].body.contains("Open the account settings page"));
        assert_eq!(doc.sections[2].heading.as_deref(), Some("Plan limits"));
        assert!(doc.sections[2].body.contains("| Plan"));
        assert_eq!(doc.sections[3].level, 3);
        assert!(doc.sections[3].body.contains("```"));
        assert_eq!(doc.assets.len(), 2);
        assert_eq!(doc.assets[1].src, "images/reset-button.png");
    }
}
