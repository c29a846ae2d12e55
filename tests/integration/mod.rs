//! End-to-end pipeline tests: author source in, safe HTML out.

use pagewright::bundler::{BundlerService, LuaBundler};
use pagewright::compiler::{CompilerService, MarkupCompiler};
use pagewright::constants::FORM_BLOCK_SENTINEL;
use pagewright::render::{BlockResolver, ResolvedBlock};
use pagewright::sandbox::{SandboxExecutor, WorkerPool};
use pagewright::template::model::{Block, SchemaField, TemplateSchema, TemplateState};
use pagewright::template::{MemoryStore, NewTemplate, TemplateRepository, TemplateStore};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    store: Arc<dyn TemplateStore>,
    compiler: Arc<CompilerService>,
    sandbox: Arc<SandboxExecutor>,
    repository: TemplateRepository,
}

fn harness_with_timeout(step_timeout: Duration) -> Harness {
    let store: Arc<dyn TemplateStore> = Arc::new(MemoryStore::new());
    let bundler = Arc::new(BundlerService::new(Arc::new(LuaBundler::new("lib"))));
    let pool = Arc::new(WorkerPool::new(4));
    let sandbox = Arc::new(SandboxExecutor::new(bundler.clone(), pool, step_timeout));
    let compiler = Arc::new(CompilerService::new(
        store.clone(),
        Arc::new(MarkupCompiler::new()),
        bundler,
        sandbox.clone(),
    ));
    let repository = TemplateRepository::new(store.clone(), compiler.clone());

    Harness {
        store,
        compiler,
        sandbox,
        repository,
    }
}

fn harness() -> Harness {
    harness_with_timeout(Duration::from_millis(2000))
}

fn schema_of(keys: &[&str]) -> TemplateSchema {
    TemplateSchema {
        fields: keys
            .iter()
            .map(|key| SchemaField {
                key: (*key).to_string(),
                field_type: "text".to_string(),
                label: (*key).to_string(),
                required: false,
            })
            .collect(),
    }
}

fn new_template(slug: &str, tenant: Option<&str>, keys: &[&str]) -> NewTemplate {
    NewTemplate {
        tenant_id: tenant.map(String::from),
        slug: slug.to_string(),
        name: slug.to_string(),
        schema: Some(schema_of(keys)),
        ..NewTemplate::default()
    }
}

#[tokio::test]
async fn publish_then_sandbox_render_produces_sanitized_html() {
    let h = harness();
    let template = h.repository.create(new_template("intro", Some("t1"), &["title"])).unwrap();

    let source = "<section><h1>{title}</h1></section>\n<style>\nsection { padding: 1rem; }\n</style>";
    let published =
        h.repository.publish(&template.id, Some("t1"), Some(source.to_string())).await.unwrap();

    assert_eq!(published.state(), TemplateState::PublishedClean);
    assert_eq!(published.compiled_css.as_deref(), Some("section { padding: 1rem; }"));

    let bundle = published.compiled_server_module.unwrap();
    let result = h.sandbox.render(&bundle, &json!({"title": "Hi <there>"})).await;
    assert_eq!(result.error, None);
    assert_eq!(result.markup.trim(), "<section><h1>Hi &lt;there&gt;</h1></section>");
}

#[tokio::test]
async fn preview_compiles_renders_and_sanitizes_without_persisting() {
    let h = harness();

    let preview = h
        .compiler
        .compile_for_preview(
            None,
            r#"<div onclick="steal()">{greeting}</div>"#,
            &schema_of(&["greeting"]),
            &json!({"greeting": "hello"}),
        )
        .await
        .unwrap();

    assert!(preview.html.contains("hello"));
    assert!(!preview.html.contains("onclick"));
    assert!(h.store.list(None).is_empty());
}

#[tokio::test]
async fn dependency_ordered_batch_compile() {
    let h = harness();

    let hero = h.repository.create(new_template("hero", None, &["headline"])).unwrap();
    let landing = h.repository.create(new_template("landing", None, &[])).unwrap();

    h.repository
        .publish(
            &hero.id,
            None,
            Some("<h1>{headline}</h1>".to_string()),
        )
        .await
        .unwrap();

    let landing_source = r#"<script>
local hero = require("@templates/hero")
</script>
<main>{@html hero({ headline = "Welcome" })}</main>"#;
    // Store the source without compiling, then let the batch pass do the work.
    h.repository.save_draft(&landing.id, None, landing_source.to_string()).unwrap();
    let published = h.repository.publish(&landing.id, None, None).await.unwrap();
    assert_eq!(published.dependencies, vec!["hero"]);

    let summary = h.compiler.compile_all_for_tenant(None).await.unwrap();
    assert_eq!(summary.failed, vec![]);
    // hero must come before landing in the compiled order.
    let hero_pos = summary.compiled.iter().position(|s| s == "hero").unwrap();
    let landing_pos = summary.compiled.iter().position(|s| s == "landing").unwrap();
    assert!(hero_pos < landing_pos);

    let landing = h.store.get(&landing.id).unwrap();
    let bundle = landing.compiled_server_module.unwrap();
    let result = h.sandbox.render(&bundle, &json!({})).await;
    assert_eq!(result.error, None);
    assert!(result.markup.contains("<h1>Welcome</h1>"));
}

#[tokio::test]
async fn missing_dependency_is_reported_not_blank() {
    let h = harness();
    let template = h.repository.create(new_template("landing", None, &[])).unwrap();

    let source = r#"<script>
local hero = require("@templates/absent")
</script>
<p>x</p>"#;
    let published =
        h.repository.publish(&template.id, None, Some(source.to_string())).await.unwrap();

    assert_eq!(published.state(), TemplateState::PublishedBroken);
    assert!(published.compile_error.unwrap().contains("absent"));
}

#[tokio::test]
async fn infinite_loop_terminates_within_budget() {
    let h = harness_with_timeout(Duration::from_millis(150));
    let template = h.repository.create(new_template("spin", None, &[])).unwrap();

    let source = "<script>\nwhile true do end\n</script>\n<p>never</p>";
    let published =
        h.repository.publish(&template.id, None, Some(source.to_string())).await.unwrap();
    let bundle = published.compiled_server_module.unwrap();

    let started = Instant::now();
    let result = h.sandbox.render(&bundle, &json!({})).await;
    assert!(result.error.is_some());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn denied_capability_fails_at_render() {
    let h = harness();
    let template = h.repository.create(new_template("leaky", None, &[])).unwrap();

    // A network call attempt: the identifier is simply undefined inside the
    // sandbox, so the render fails instead of silently being granted access.
    let source = "<script>\nlocal body = fetch(\"https://example.com\")\n</script>\n<p>{body}</p>";
    let published =
        h.repository.publish(&template.id, None, Some(source.to_string())).await.unwrap();
    let bundle = published.compiled_server_module.unwrap();

    let result = h.sandbox.render(&bundle, &json!({})).await;
    assert!(result.error.is_some());
}

#[tokio::test]
async fn block_resolution_drops_unknown_references() {
    let h = harness();

    let card = h.repository.create(new_template("pricing-card", None, &["title"])).unwrap();
    h.repository
        .publish(&card.id, None, Some("<div>{title}</div>".to_string()))
        .await
        .unwrap();
    let hero = h.repository.create(new_template("hero", None, &[])).unwrap();

    let resolver = BlockResolver::new(h.store.clone(), h.sandbox.clone());
    let blocks = vec![
        Block::new(hero.id.clone(), json!({"headline": "Big"})),
        Block::new(card.id.clone(), json!({"title": "Basic"})),
        Block::new("missing-id", json!({})),
        Block::new(FORM_BLOCK_SENTINEL, json!({"form_id": "f1"})),
    ];

    let result = resolver.resolve_blocks(&blocks);
    assert_eq!(result.content.len(), 3);
    assert!(matches!(result.content[0], ResolvedBlock::Hero { .. }));
    let ResolvedBlock::Compiled {
        html, ..
    } = &result.content[1]
    else {
        panic!("expected compiled block");
    };
    assert!(html.contains("Basic"));
    assert!(matches!(result.content[2], ResolvedBlock::Form { .. }));
}

#[tokio::test]
async fn live_block_rendering_uses_sandbox_and_sanitizes() {
    let h = harness();

    let card = h.repository.create(new_template("pricing-card", None, &["title"])).unwrap();
    h.repository
        .publish(
            &card.id,
            None,
            Some("<div class=\"card\">{title}</div>".to_string()),
        )
        .await
        .unwrap();

    let resolver = BlockResolver::new(h.store.clone(), h.sandbox.clone());
    let result = resolver
        .render_blocks_live(&[Block::new(card.id.clone(), json!({"title": "<b>raw</b>"}))])
        .await;

    let ResolvedBlock::Compiled {
        html, ..
    } = &result.content[0]
    else {
        panic!("expected compiled block");
    };
    // The interpolation was escaped by the runtime and survived sanitization.
    assert!(html.contains("&lt;b&gt;raw&lt;/b&gt;"));
}

#[tokio::test]
async fn render_is_idempotent_for_pure_templates() {
    let h = harness();
    let template = h.repository.create(new_template("pure", None, &["items"])).unwrap();

    let source = "<ul>{#each items as item}<li>{item}</li>{/each}</ul>";
    let published =
        h.repository.publish(&template.id, None, Some(source.to_string())).await.unwrap();
    let bundle = published.compiled_server_module.unwrap();
    let props = json!({"items": ["a", "b", "c"]});

    let first = h.sandbox.render(&bundle, &props).await;
    let second = h.sandbox.render(&bundle, &props).await;
    assert_eq!(first.error, None);
    assert_eq!(first.markup, second.markup);
    assert_eq!(first.head, second.head);
    assert_eq!(first.styles, second.styles);
}
