//! HTML sanitization for rendered template output.
//!
//! Every server-rendered fragment passes through here before reaching any
//! response, including admin preview paths. Tags and attributes are
//! allow-listed per element, URL schemes are restricted, script tags and
//! inline event handlers are removed unconditionally, and links get a safe
//! `rel`.
//!
//! Hydration group markers look like HTML comments, which a generic
//! sanitizer strips. They are swapped for inert text placeholders before
//! cleaning and restored afterward, preserving their order and count.

use crate::constants::{HYDRATION_CLOSE, HYDRATION_OPEN};
use ammonia::Builder;
use std::collections::HashSet;

const HYDRATION_OPEN_TOKEN: &str = "__pw_hydration_open__";
const HYDRATION_CLOSE_TOKEN: &str = "__pw_hydration_close__";

/// Sanitize rendered HTML, preserving hydration markers.
#[must_use]
pub fn sanitize_rendered_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let protected = input
        .replace(HYDRATION_OPEN, HYDRATION_OPEN_TOKEN)
        .replace(HYDRATION_CLOSE, HYDRATION_CLOSE_TOKEN);

    let clean = clean_fragment(&protected);

    clean
        .replace(HYDRATION_OPEN_TOKEN, HYDRATION_OPEN)
        .replace(HYDRATION_CLOSE_TOKEN, HYDRATION_CLOSE)
}

fn clean_fragment(html: &str) -> String {
    let mut builder = Builder::default();

    builder
        .add_tags([
            // Media
            "img", "figure", "figcaption", "video", "source", "picture",
            // Structural and semantic containers
            "section", "article", "aside", "header", "footer", "nav", "main", "details",
            "summary", "mark", "time",
            // Inline vector graphics
            "svg", "path", "circle", "rect", "line", "polyline", "polygon", "g", "defs", "use",
            "symbol", "title", "desc", "clippath", "mask",
            // Basic form controls
            "button", "form", "input", "label", "select", "option", "textarea",
            // Style blocks carry scoped CSS from templates
            "style",
        ])
        .clean_content_tags(HashSet::from(["script"]))
        .add_generic_attributes([
            "class", "id", "style", "role", "tabindex", "title", "lang", "dir", "hidden",
        ])
        .generic_attribute_prefixes(HashSet::from(["data-", "aria-"]))
        .add_tag_attributes("a", ["href", "target", "download"])
        .add_tag_attributes(
            "img",
            ["src", "alt", "width", "height", "loading", "decoding", "srcset", "sizes"],
        )
        .add_tag_attributes(
            "video",
            ["src", "poster", "controls", "autoplay", "muted", "loop", "width", "height"],
        )
        .add_tag_attributes("source", ["src", "srcset", "type", "media", "sizes"])
        .add_tag_attributes("time", ["datetime"])
        .add_tag_attributes(
            "input",
            ["type", "name", "value", "placeholder", "required", "disabled", "checked"],
        )
        .add_tag_attributes("label", ["for"])
        .add_tag_attributes("select", ["name", "required", "disabled"])
        .add_tag_attributes("option", ["value", "selected", "disabled"])
        .add_tag_attributes(
            "textarea",
            ["name", "placeholder", "required", "disabled", "rows", "cols"],
        )
        .add_tag_attributes("button", ["type", "disabled", "name", "value"])
        .add_tag_attributes("form", ["action", "method"])
        .add_tag_attributes("svg", ["viewbox", "width", "height", "fill", "stroke", "xmlns"])
        .add_tag_attributes(
            "path",
            ["d", "fill", "stroke", "stroke-width", "stroke-linecap", "stroke-linejoin"],
        )
        .add_tag_attributes("circle", ["cx", "cy", "r", "fill", "stroke"])
        .add_tag_attributes("rect", ["x", "y", "width", "height", "rx", "ry", "fill", "stroke"])
        .add_tag_attributes("line", ["x1", "y1", "x2", "y2", "stroke", "stroke-width"])
        .add_tag_attributes("polyline", ["points", "fill", "stroke"])
        .add_tag_attributes("polygon", ["points", "fill", "stroke"])
        .add_tag_attributes("g", ["transform", "fill", "stroke"])
        .add_tag_attributes("use", ["href", "x", "y", "width", "height"])
        .add_tag_attributes("symbol", ["id", "viewbox"])
        .add_tag_attributes("clippath", ["id"])
        .add_tag_attributes("mask", ["id"])
        .url_schemes(HashSet::from(["http", "https", "mailto", "tel", "data"]))
        .link_rel(Some("noopener noreferrer"))
        .attribute_filter(|element, attribute, value| {
            // data: URLs are permitted for images only.
            if matches!(attribute, "href" | "src")
                && element != "img"
                && value.trim().to_ascii_lowercase().starts_with("data:")
            {
                return None;
            }
            Some(value.into())
        });

    builder.clean(html).to_string()
}
