//! Block resolution: turning a page's ordered block list into a render plan.
//!
//! Each block references a template by id (or the reserved form sentinel)
//! and carries a property bag. Resolution batch-fetches all referenced
//! templates in one lookup, then dispatches per block:
//!
//! - Templates whose slug is one of the **native section types** pass their
//!   properties straight through, tagged with the type. The presentation
//!   layer renders these with dedicated hand-written components, bypassing
//!   the compile and sandbox path entirely.
//! - Any other template resolves to a static HTML fragment through the
//!   markup-extraction path, sanitized before it enters the plan.
//! - Blocks whose reference cannot be resolved are dropped; the page still
//!   renders with the remaining blocks.
//!
//! [`BlockResolver::render_blocks_live`] is the dynamic variant for
//! contexts that need per-request rendering through the sandbox.

use crate::constants::FORM_BLOCK_SENTINEL;
use crate::render::extract::{extract_markup, extract_style_block};
use crate::render::sanitize::sanitize_rendered_html;
use crate::sandbox::SandboxExecutor;
use crate::template::model::{Block, Template};
use crate::template::store::TemplateStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// The closed set of template slugs the presentation layer renders with
/// dedicated components. Adding a native type means touching both this list
/// and the presentation layer.
pub const NATIVE_SECTION_TYPES: &[&str] = &[
    "hero",
    "services-grid",
    "about-snippet",
    "testimonial-carousel",
    "cta-banner",
    "instructor-grid",
    "values-grid",
    "story",
];

/// One resolved entry in a render plan.
///
/// A sealed union: one variant per native section type carrying its
/// property bag, the form sentinel, and a single `Compiled` variant for
/// arbitrary template content resolved to HTML.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ResolvedBlock {
    Hero { id: String, props: Value },
    ServicesGrid { id: String, props: Value },
    AboutSnippet { id: String, props: Value },
    TestimonialCarousel { id: String, props: Value },
    CtaBanner { id: String, props: Value },
    InstructorGrid { id: String, props: Value },
    ValuesGrid { id: String, props: Value },
    Story { id: String, props: Value },
    Form { id: String, props: Value },
    Compiled {
        id: String,
        template_id: String,
        html: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        css: Option<String>,
        hydration_props: Value,
        has_client_module: bool,
    },
}

fn native_block(slug: &str, id: String, props: Value) -> Option<ResolvedBlock> {
    Some(match slug {
        "hero" => ResolvedBlock::Hero {
            id,
            props,
        },
        "services-grid" => ResolvedBlock::ServicesGrid {
            id,
            props,
        },
        "about-snippet" => ResolvedBlock::AboutSnippet {
            id,
            props,
        },
        "testimonial-carousel" => ResolvedBlock::TestimonialCarousel {
            id,
            props,
        },
        "cta-banner" => ResolvedBlock::CtaBanner {
            id,
            props,
        },
        "instructor-grid" => ResolvedBlock::InstructorGrid {
            id,
            props,
        },
        "values-grid" => ResolvedBlock::ValuesGrid {
            id,
            props,
        },
        "story" => ResolvedBlock::Story {
            id,
            props,
        },
        _ => return None,
    })
}

/// A resolved render plan plus the CSS collected from its templates.
#[derive(Debug, Default, Serialize)]
pub struct ResolveResult {
    pub content: Vec<ResolvedBlock>,
    pub extra_css: String,
}

/// Composes block lists into render plans.
pub struct BlockResolver {
    store: Arc<dyn TemplateStore>,
    sandbox: Arc<SandboxExecutor>,
}

impl BlockResolver {
    #[must_use]
    pub fn new(store: Arc<dyn TemplateStore>, sandbox: Arc<SandboxExecutor>) -> Self {
        Self {
            store,
            sandbox,
        }
    }

    fn fetch_referenced(&self, blocks: &[Block]) -> HashMap<String, Template> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = blocks
            .iter()
            .map(|b| b.template_id.clone())
            .filter(|id| id != FORM_BLOCK_SENTINEL && !id.is_empty())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        self.store.get_many(&ids).into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    /// Resolve blocks to a static render plan.
    #[must_use]
    pub fn resolve_blocks(&self, blocks: &[Block]) -> ResolveResult {
        if blocks.is_empty() {
            return ResolveResult::default();
        }

        let templates = self.fetch_referenced(blocks);
        let mut content = Vec::new();
        let mut css_parts: Vec<String> = Vec::new();

        for block in blocks {
            if block.template_id == FORM_BLOCK_SENTINEL {
                content.push(ResolvedBlock::Form {
                    id: block.id.clone(),
                    props: block.props.clone(),
                });
                continue;
            }

            let Some(template) = templates.get(&block.template_id) else {
                drop_unknown(&block.template_id, &templates);
                continue;
            };

            if let Some(native) =
                native_block(&template.slug, block.id.clone(), block.props.clone())
            {
                content.push(native);
                continue;
            }

            let html = sanitize_rendered_html(&extract_markup(&template.source_code, &block.props));
            let css = template_css(template);
            if let Some(css) = &css {
                css_parts.push(css.clone());
            }

            content.push(ResolvedBlock::Compiled {
                id: block.id.clone(),
                template_id: template.id.clone(),
                html,
                css,
                hydration_props: block.props.clone(),
                has_client_module: template.compiled_client_module.is_some(),
            });
        }

        ResolveResult {
            content,
            extra_css: css_parts.join("\n"),
        }
    }

    /// Resolve blocks with fully dynamic per-request rendering through the
    /// sandbox. Templates that fail to render or were never compiled fall
    /// back to an HTML comment placeholder instead of dropping the block.
    pub async fn render_blocks_live(&self, blocks: &[Block]) -> ResolveResult {
        if blocks.is_empty() {
            return ResolveResult::default();
        }

        let templates = self.fetch_referenced(blocks);

        let rendered = futures::future::join_all(
            blocks.iter().map(|block| self.render_live_block(block, &templates)),
        )
        .await;

        let mut content = Vec::new();
        let mut css_parts: Vec<String> = Vec::new();
        for entry in rendered.into_iter().flatten() {
            let (block, css) = entry;
            if let Some(css) = css {
                if !css.is_empty() {
                    css_parts.push(css);
                }
            }
            content.push(block);
        }

        ResolveResult {
            content,
            extra_css: css_parts.join("\n"),
        }
    }

    async fn render_live_block(
        &self,
        block: &Block,
        templates: &HashMap<String, Template>,
    ) -> Option<(ResolvedBlock, Option<String>)> {
        if block.template_id == FORM_BLOCK_SENTINEL {
            return Some((
                ResolvedBlock::Form {
                    id: block.id.clone(),
                    props: block.props.clone(),
                },
                None,
            ));
        }

        let Some(template) = templates.get(&block.template_id) else {
            drop_unknown(&block.template_id, templates);
            return None;
        };

        if let Some(native) = native_block(&template.slug, block.id.clone(), block.props.clone()) {
            return Some((native, None));
        }

        let compiled_block = |html: String, css: Option<String>| ResolvedBlock::Compiled {
            id: block.id.clone(),
            template_id: template.id.clone(),
            html,
            css: css.clone(),
            hydration_props: block.props.clone(),
            has_client_module: template.compiled_client_module.is_some(),
        };

        let Some(bundle) = template.compiled_server_module.as_deref() else {
            return Some((
                compiled_block(
                    format!("<!-- template \"{}\" not compiled -->", template.slug),
                    None,
                ),
                None,
            ));
        };

        let result = self.sandbox.render(bundle, &block.props).await;
        if let Some(error) = result.error {
            warn!(slug = %template.slug, error = %error, "sandbox render failed for block");
            return Some((
                compiled_block(
                    format!("<!-- template \"{}\" failed to render -->", template.slug),
                    None,
                ),
                None,
            ));
        }

        let css = template_css(template).or_else(|| {
            (!result.styles.is_empty()).then(|| result.styles.clone())
        });
        Some((
            compiled_block(sanitize_rendered_html(&result.markup), css.clone()),
            css,
        ))
    }
}

fn template_css(template: &Template) -> Option<String> {
    template
        .compiled_css
        .clone()
        .filter(|css| !css.is_empty())
        .or_else(|| {
            let css = extract_style_block(&template.source_code);
            (!css.is_empty()).then_some(css)
        })
}

fn drop_unknown(reference: &str, templates: &HashMap<String, Template>) {
    let closest = templates
        .keys()
        .map(|id| (strsim::levenshtein(reference, id), id))
        .min()
        .filter(|(distance, _)| distance * 2 <= reference.len());

    match closest {
        Some((_, id)) => warn!(
            reference = %reference,
            closest = %id,
            "dropping block with unknown template reference"
        ),
        None => warn!(reference = %reference, "dropping block with unknown template reference"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{BundlerService, LuaBundler};
    use crate::constants::SANDBOX_STEP_TIMEOUT;
    use crate::sandbox::WorkerPool;
    use crate::template::model::TemplateCategory;
    use crate::template::store::MemoryStore;
    use serde_json::json;

    fn resolver_with(templates: Vec<Template>) -> BlockResolver {
        let store = Arc::new(MemoryStore::new());
        for template in templates {
            store.insert(template).unwrap();
        }
        let bundler = Arc::new(BundlerService::new(Arc::new(LuaBundler::new("lib"))));
        let sandbox = Arc::new(SandboxExecutor::new(
            bundler,
            Arc::new(WorkerPool::new(2)),
            SANDBOX_STEP_TIMEOUT,
        ));
        BlockResolver::new(store, sandbox)
    }

    fn template(slug: &str, source: &str) -> Template {
        let mut t = Template::new(None, slug, slug, TemplateCategory::Section);
        t.source_code = source.to_string();
        t
    }

    #[test]
    fn test_empty_blocks() {
        let resolver = resolver_with(vec![]);
        let result = resolver.resolve_blocks(&[]);
        assert!(result.content.is_empty());
        assert!(result.extra_css.is_empty());
    }

    #[test]
    fn test_native_section_passes_props_through() {
        let hero = template("hero", "<h1>{headline}</h1>");
        let hero_id = hero.id.clone();
        let resolver = resolver_with(vec![hero]);

        let blocks = vec![Block::new(hero_id, json!({"headline": "Welcome"}))];
        let result = resolver.resolve_blocks(&blocks);

        assert_eq!(result.content.len(), 1);
        let ResolvedBlock::Hero {
            props, ..
        } = &result.content[0]
        else {
            panic!("expected a hero block");
        };
        assert_eq!(props["headline"], "Welcome");
    }

    #[test]
    fn test_arbitrary_template_resolves_to_sanitized_html() {
        let card = template(
            "pricing-card",
            "<div class=\"card\" onclick=\"x()\">{title}</div><style>.card { margin: 0; }</style>",
        );
        let card_id = card.id.clone();
        let resolver = resolver_with(vec![card]);

        let blocks = vec![Block::new(card_id.clone(), json!({"title": "Basic"}))];
        let result = resolver.resolve_blocks(&blocks);

        let ResolvedBlock::Compiled {
            html,
            css,
            template_id,
            ..
        } = &result.content[0]
        else {
            panic!("expected a compiled block");
        };
        assert!(html.contains("Basic"));
        assert!(!html.contains("onclick"));
        assert_eq!(template_id, &card_id);
        assert_eq!(css.as_deref(), Some(".card { margin: 0; }"));
        assert!(result.extra_css.contains(".card"));
    }

    #[test]
    fn test_unknown_reference_dropped_not_fatal() {
        let known = template("known", "<p>k</p>");
        let known_id = known.id.clone();
        let resolver = resolver_with(vec![known]);

        let blocks = vec![
            Block::new(known_id, json!({})),
            Block::new("nonexistent", json!({})),
            Block::new(FORM_BLOCK_SENTINEL, json!({"form_id": "f1"})),
        ];
        let result = resolver.resolve_blocks(&blocks);

        // Exactly N-1 entries plus the form sentinel.
        assert_eq!(result.content.len(), 2);
        assert!(matches!(result.content[1], ResolvedBlock::Form { .. }));
    }

    #[test]
    fn test_all_native_types_recognized() {
        for slug in NATIVE_SECTION_TYPES {
            assert!(
                native_block(slug, "b".to_string(), json!({})).is_some(),
                "slug {slug} should be native"
            );
        }
        assert!(native_block("pricing-card", "b".to_string(), json!({})).is_none());
    }

    #[tokio::test]
    async fn test_live_render_uncompiled_falls_back_to_comment() {
        let card = template("pricing-card", "<p>{title}</p>");
        let card_id = card.id.clone();
        let resolver = resolver_with(vec![card]);

        let result = resolver.render_blocks_live(&[Block::new(card_id, json!({}))]).await;
        let ResolvedBlock::Compiled {
            html, ..
        } = &result.content[0]
        else {
            panic!("expected a compiled block");
        };
        assert!(html.contains("not compiled"));
    }
}
