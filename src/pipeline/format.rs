// src/pipeline/format.rs

//! Announcement formatting.
//!
//! A post is a list of segments: header, name, address, optional detail
//! lines and hashtags. When the rendered text exceeds the platform limit,
//! segments are dropped following [`TRUNCATION_ORDER`] until it fits. The
//! header and name are never dropped; as a last resort the name is shortened.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::{AnnouncementFlags, BotConfig, FormattingFlags, PostTemplate, Restaurant};
use crate::utils::group_thousands;

/// Kind of a post segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Header,
    Name,
    Address,
    Activity,
    SquareFootage,
    Ward,
    Hashtag,
}

/// Segments removed, in order, while the post is over the limit.
///
/// Hashtags go one at a time starting from the last.
const TRUNCATION_ORDER: [SegmentKind; 5] = [
    SegmentKind::Hashtag,
    SegmentKind::Ward,
    SegmentKind::SquareFootage,
    SegmentKind::Activity,
    SegmentKind::Address,
];

const ELLIPSIS: &str = "…";

#[derive(Debug, Clone)]
struct Segment {
    kind: SegmentKind,
    text: String,
}

/// A rendered announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPost {
    pub text: String,
    /// Length in grapheme clusters
    pub length: usize,
    /// Hashtags present in `text`, with their leading `#`
    pub hashtags: Vec<String>,
    /// Whether anything was dropped or shortened to meet the limit
    pub truncated: bool,
}

/// Renders restaurants into announcement text.
#[derive(Debug, Clone)]
pub struct PostFormatter {
    template: PostTemplate,
    announcement: AnnouncementFlags,
    formatting: FormattingFlags,
    hashtags: Vec<String>,
}

impl PostFormatter {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            template: config.post_template.clone(),
            announcement: config.features.announcement.clone(),
            formatting: config.features.formatting.clone(),
            hashtags: normalize_hashtags(&config.all_hashtags()),
        }
    }

    /// Platform limit in grapheme clusters.
    pub fn max_length(&self) -> usize {
        self.formatting.max_length
    }

    /// Format a restaurant. Same record and configuration give the same output.
    pub fn format(&self, restaurant: &Restaurant) -> FormattedPost {
        let mut segments = self.segments(restaurant);
        let limit = self.formatting.max_length;
        let mut truncated = false;

        while grapheme_len(&assemble(&segments)) > limit {
            if !remove_least_essential(&mut segments) {
                shorten_name(&mut segments, limit);
                truncated = true;
                break;
            }
            truncated = true;
        }

        let text = assemble(&segments);
        let hashtags = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Hashtag)
            .map(|s| s.text.clone())
            .collect();

        FormattedPost {
            length: grapheme_len(&text),
            text,
            hashtags,
            truncated,
        }
    }

    /// Build every segment enabled for this record, in post order.
    fn segments(&self, r: &Restaurant) -> Vec<Segment> {
        let t = &self.template;
        let flags = &self.announcement;
        let mut segments = vec![
            Segment {
                kind: SegmentKind::Header,
                text: t.header.clone(),
            },
            Segment {
                kind: SegmentKind::Name,
                text: self.render(&t.name_line, &t.name_prefix, r),
            },
            Segment {
                kind: SegmentKind::Address,
                text: self.render(&t.address_line, &t.address_prefix, r),
            },
        ];

        if flags.include_business_activity && r.business_activity.is_some() {
            segments.push(Segment {
                kind: SegmentKind::Activity,
                text: self.render(&t.activity_line, &t.activity_prefix, r),
            });
        }
        if flags.include_square_footage && r.square_footage.is_some() {
            segments.push(Segment {
                kind: SegmentKind::SquareFootage,
                text: self.render(&t.square_footage_line, &t.square_footage_prefix, r),
            });
        }
        if flags.include_ward && r.ward.is_some() {
            segments.push(Segment {
                kind: SegmentKind::Ward,
                text: self.render(&t.ward_line, &t.ward_prefix, r),
            });
        }
        if self.formatting.add_hashtags {
            segments.extend(self.hashtags.iter().map(|tag| Segment {
                kind: SegmentKind::Hashtag,
                text: tag.clone(),
            }));
        }
        segments
    }

    /// Fill a line template for a record.
    fn render(&self, template: &str, prefix: &str, r: &Restaurant) -> String {
        let prefix = if self.formatting.use_emojis { prefix } else { "" };
        fill_placeholders(template, |key| match key {
            "prefix" => Some(prefix.to_string()),
            "name" => Some(r.name.clone()),
            "address" => Some(r.address.clone()),
            "zip_code" => Some(r.zip_code.clone().unwrap_or_default()),
            "business_activity" => Some(r.business_activity.clone().unwrap_or_default()),
            "square_footage" => Some(r.square_footage.map(group_thousands).unwrap_or_default()),
            "ward" => Some(r.ward.map(|w| w.to_string()).unwrap_or_default()),
            "license_type" => Some(r.license_type.clone()),
            _ => None,
        })
        .trim()
        .to_string()
    }
}

/// Substitute `{key}` placeholders in one left-to-right pass.
///
/// Substituted values are never scanned again. Unknown keys and unmatched
/// braces are copied through unchanged.
fn fill_placeholders(template: &str, value: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match value(&after[..close]) {
                Some(v) => {
                    out.push_str(&v);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Join segments: lines separated by newlines, hashtags on their own paragraph.
fn assemble(segments: &[Segment]) -> String {
    let lines: Vec<&str> = segments
        .iter()
        .filter(|s| s.kind != SegmentKind::Hashtag)
        .map(|s| s.text.as_str())
        .collect();
    let tags: Vec<&str> = segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Hashtag)
        .map(|s| s.text.as_str())
        .collect();

    let mut text = lines.join("\n");
    if !tags.is_empty() {
        text.push_str("\n\n");
        text.push_str(&tags.join(" "));
    }
    text
}

/// Drop the next segment per the truncation table. Returns false when nothing removable is left.
fn remove_least_essential(segments: &mut Vec<Segment>) -> bool {
    for kind in TRUNCATION_ORDER {
        if let Some(idx) = segments.iter().rposition(|s| s.kind == kind) {
            segments.remove(idx);
            return true;
        }
    }
    false
}

/// Shorten the name line so header and name fit within `limit`.
fn shorten_name(segments: &mut [Segment], limit: usize) {
    let header_len: usize = segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Header)
        .map(|s| grapheme_len(&s.text) + 1)
        .sum();
    let budget = limit.saturating_sub(header_len);

    if let Some(name) = segments.iter_mut().find(|s| s.kind == SegmentKind::Name) {
        if grapheme_len(&name.text) > budget {
            let keep = budget.saturating_sub(1);
            let mut shortened: String = name.text.graphemes(true).take(keep).collect();
            shortened = shortened.trim_end().to_string();
            shortened.push_str(ELLIPSIS);
            name.text = shortened;
        }
    }
}

fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Normalize hashtags to `#Tag` form: letters, digits and underscores only,
/// duplicates (ignoring case) and empties dropped, order kept.
pub fn normalize_hashtags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .filter_map(|tag| {
            let body: String = tag
                .trim()
                .trim_start_matches('#')
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if body.is_empty() || !seen.insert(body.to_lowercase()) {
                return None;
            }
            Some(format!("#{body}"))
        })
        .collect()
}
