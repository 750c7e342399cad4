//! Minimal HTML scraping over rendered pages
//!
//! The application renders server-side templates, so the harness only needs
//! to locate a handful of things: hidden form inputs, table rows with their
//! forms, and alert boxes. This module tokenizes tags with regexes and pairs
//! opening and closing tags by name. It is not a conforming HTML parser:
//! elements whose closing tag is omitted extend to the end of the scanned
//! range.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;
use std::rc::Rc;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("valid tag regex")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid attribute regex")
});

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static RAW_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>")
        .expect("valid raw text regex")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z]+);").expect("valid entity regex")
});

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// A single opening or closing tag
#[derive(Debug, Clone)]
pub struct Tag<'a> {
    /// Lowercased tag name
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    attrs_raw: &'a str,
    /// Byte offset of `<`
    pub start: usize,
    /// Byte offset just past `>`
    pub end: usize,
}

impl<'a> Tag<'a> {
    /// Value of an attribute, entity-decoded. Valueless attributes yield `""`.
    pub fn attr(&self, name: &str) -> Option<String> {
        ATTR_RE.captures_iter(self.attrs_raw).find_map(|caps| {
            let key = caps.get(1)?.as_str();
            if !key.eq_ignore_ascii_case(name) {
                return None;
            }
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            Some(decode_entities(value))
        })
    }

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_any_class(&self, wanted: &[String]) -> bool {
        self.classes().iter().any(|c| wanted.iter().any(|w| w == c))
    }

    fn is_void(&self) -> bool {
        self.self_closing || VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

/// An element located in a document: its opening tag plus the extent of its content
///
/// Elements found in the same document share one tag list, so descendant
/// lookups scan only the tags between the opening and closing tag.
#[derive(Debug, Clone)]
pub struct Element<'a> {
    pub tag: Tag<'a>,
    html: &'a str,
    tags: Rc<[Tag<'a>]>,
    /// Indices into `tags` of everything between the opening and closing tag
    children: Range<usize>,
    inner: Range<usize>,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<String> {
        self.tag.attr(name)
    }

    pub fn inner_html(&self) -> &'a str {
        &self.html[self.inner.clone()]
    }

    /// Visible text with whitespace collapsed
    pub fn text(&self) -> String {
        text_content(self.inner_html())
    }

    /// Descendant elements with the given tag name, in document order
    pub fn find_all(&self, name: &str) -> Vec<Element<'a>> {
        let name = name.to_ascii_lowercase();
        elements_in(
            self.html,
            &self.tags,
            self.children.clone(),
            self.inner.end,
            |tag| tag.name == name,
        )
    }

    /// First descendant element matching `pred`
    pub fn find_first(&self, pred: impl Fn(&Tag<'_>) -> bool) -> Option<Element<'a>> {
        elements_in(self.html, &self.tags, self.children.clone(), self.inner.end, pred)
            .into_iter()
            .next()
    }
}

/// All tags of a document in order, skipping anything inside comments
pub fn tags(html: &str) -> Vec<Tag<'_>> {
    let ranges: Vec<Range<usize>> = COMMENT_RE.find_iter(html).map(|m| m.range()).collect();
    let mut comments = ranges.iter().peekable();

    TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            // both sequences are in document order
            while comments.next_if(|c| c.end <= whole.start()).is_some() {}
            if comments
                .peek()
                .is_some_and(|c| c.start <= whole.start() && whole.end() <= c.end)
            {
                return None;
            }
            let attrs_raw = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            Some(Tag {
                name: caps[2].to_ascii_lowercase(),
                closing: !caps[1].is_empty(),
                self_closing: attrs_raw.trim_end().ends_with('/'),
                attrs_raw,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Elements whose opening tag is in `tags[span]` and matches `pred`.
///
/// `end` is the byte offset unclosed elements extend to.
fn elements_in<'a>(
    html: &'a str,
    tags: &Rc<[Tag<'a>]>,
    span: Range<usize>,
    end: usize,
    pred: impl Fn(&Tag<'_>) -> bool,
) -> Vec<Element<'a>> {
    let mut found = Vec::new();

    for i in span.clone() {
        let tag = &tags[i];
        if tag.closing || !pred(tag) {
            continue;
        }
        if tag.is_void() {
            found.push(Element {
                tag: tag.clone(),
                html,
                tags: Rc::clone(tags),
                children: i + 1..i + 1,
                inner: tag.end..tag.end,
            });
            continue;
        }

        let mut depth = 1usize;
        let mut close = span.end;
        let mut inner_end = end;
        for (j, later) in tags[..span.end].iter().enumerate().skip(i + 1) {
            if later.name != tag.name {
                continue;
            }
            if later.closing {
                depth -= 1;
                if depth == 0 {
                    close = j;
                    inner_end = later.start;
                    break;
                }
            } else if !later.self_closing {
                depth += 1;
            }
        }

        found.push(Element {
            tag: tag.clone(),
            html,
            tags: Rc::clone(tags),
            children: i + 1..close,
            inner: tag.end..inner_end,
        });
    }

    found
}

/// All elements with the given tag name, in document order
pub fn find_all<'a>(html: &'a str, name: &str) -> Vec<Element<'a>> {
    let name = name.to_ascii_lowercase();
    let all: Rc<[Tag<'a>]> = tags(html).into();
    elements_in(html, &all, 0..all.len(), html.len(), |tag| tag.name == name)
}

/// First element (in document order) whose opening tag matches `pred`
pub fn find_first<'a>(html: &'a str, pred: impl Fn(&Tag<'_>) -> bool) -> Option<Element<'a>> {
    let all: Rc<[Tag<'a>]> = tags(html).into();
    elements_in(html, &all, 0..all.len(), html.len(), pred)
        .into_iter()
        .next()
}

/// Value of the first `<input>` with the given `name` attribute
pub fn input_value(html: &str, name: &str) -> Option<String> {
    tags(html)
        .into_iter()
        .filter(|tag| !tag.closing && tag.name == "input")
        .find(|tag| tag.attr("name").as_deref() == Some(name))
        .map(|tag| tag.attr("value").unwrap_or_default())
}

/// Visible text of an HTML fragment with whitespace collapsed and trimmed
pub fn text_content(fragment: &str) -> String {
    let without_comments = COMMENT_RE.replace_all(fragment, " ");
    let without_raw = RAW_TEXT_RE.replace_all(&without_comments, " ");
    let without_tags = TAG_RE.replace_all(&without_raw, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "times" => Some('\u{d7}'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
