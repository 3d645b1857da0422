//! Fetch-cycle behavior: curation gauntlet, dedup, and bookkeeping, with a
//! stub source and a mock image host.

use async_trait::async_trait;
use interfaces::NewsItem;
use news_aggregator::{
    AppConfig, Fetcher, LogLevel, MockCurator, NewsAggregator, NewsSource, PostStatus,
    Result, SourceQuery, Store,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A source that returns a fixed batch of articles.
struct StubSource {
    items: Vec<NewsItem>,
}

#[async_trait]
impl NewsSource for StubSource {
    fn source_id(&self) -> &'static str {
        "stub"
    }

    fn source_name(&self) -> &'static str {
        "Stub"
    }

    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<NewsItem>> {
        Ok(self.items.clone())
    }
}

async fn image_host() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0u8; 4096]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pixel.gif"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/gif")
                .set_body_bytes(vec![0u8; 64]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html></html>"),
        )
        .mount(&server)
        .await;
    server
}

fn article(title: &str, image_url: Option<String>) -> NewsItem {
    NewsItem {
        title: title.to_string(),
        description: Some(format!("descrição de {title}")),
        content: Some(format!("conteúdo completo de {title}")),
        image_url,
        source_name: Some("Stub Outlet".to_string()),
        source_api: "stub".to_string(),
        language: "pt".to_string(),
        category: "technology".to_string(),
    }
}

fn aggregator_with(
    items: Vec<NewsItem>,
    curator: MockCurator,
    store: Store,
) -> NewsAggregator {
    NewsAggregator::new(
        vec![Box::new(StubSource { items })],
        Arc::new(curator),
        store,
        Arc::new(Fetcher::new(Default::default())),
        Arc::new(RwLock::new(AppConfig::default())),
    )
}

#[tokio::test]
async fn approved_articles_are_queued_in_arrival_order() {
    let images = image_host().await;
    let img = format!("{}/img.jpg", images.uri());

    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(
        vec![
            article("Primeira notícia", Some(img.clone())),
            article("Segunda notícia", Some(img.clone())),
        ],
        MockCurator::new(),
        store.clone(),
    );

    let outcome = aggregator.run_cycle().await.unwrap();
    assert_eq!(outcome.fetched, 2);
    assert_eq!(outcome.enqueued, 2);
    assert_eq!(outcome.rejected, 0);

    let queue = store.list_queue().await.unwrap();
    let titles: Vec<&str> = queue.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Primeira notícia", "Segunda notícia"]);
}

#[tokio::test]
async fn same_story_from_two_outlets_is_queued_once() {
    let images = image_host().await;
    let img = format!("{}/img.jpg", images.uri());

    let store = Store::open_in_memory().await.unwrap();
    // The mock curator canonicalizes by normalized title, so the same
    // headline with different casing collapses to one key.
    let aggregator = aggregator_with(
        vec![
            article("Descoberta no Ártico", Some(img.clone())),
            article("DESCOBERTA NO ÁRTICO", Some(img.clone())),
        ],
        MockCurator::new(),
        store.clone(),
    );

    let outcome = aggregator.run_cycle().await.unwrap();
    assert_eq!(outcome.enqueued, 1);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(store.queue_len().await.unwrap(), 1);

    let history = store.recent_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PostStatus::Rejected);
    assert_eq!(history[0].reason.as_deref(), Some("semantic duplicate"));
    assert!(history[0].refined_title.starts_with("[DUPLICATE]"));
}

#[tokio::test]
async fn story_already_in_history_is_not_requeued() {
    let images = image_host().await;
    let img = format!("{}/img.jpg", images.uri());

    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(
        vec![article("Reprise do evento", Some(img.clone()))],
        MockCurator::new(),
        store.clone(),
    );

    // First cycle queues it; pretend it was posted, then fetch it again.
    aggregator.run_cycle().await.unwrap();
    let head = store.next_in_queue().await.unwrap().unwrap();
    store
        .record_disposition(&head.disposition(PostStatus::Posted, None))
        .await
        .unwrap();
    store.remove_from_queue(&head.id).await.unwrap();

    let outcome = aggregator.run_cycle().await.unwrap();
    assert_eq!(outcome.enqueued, 0);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(store.queue_len().await.unwrap(), 0);
}

#[tokio::test]
async fn irrelevant_articles_land_in_history_with_the_verdict() {
    let images = image_host().await;
    let img = format!("{}/img.jpg", images.uri());

    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(
        vec![
            article("PROMO imperdível de celular", Some(img.clone())),
            article("Notícia legítima", Some(img.clone())),
        ],
        MockCurator::new().rejecting("PROMO"),
        store.clone(),
    );

    let outcome = aggregator.run_cycle().await.unwrap();
    assert_eq!(outcome.enqueued, 1);
    assert_eq!(outcome.rejected, 1);

    let history = store.recent_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].refined_title.starts_with("[REJECTED]"));
    assert_eq!(history[0].reason.as_deref(), Some("REJECTED"));
}

#[tokio::test]
async fn articles_without_usable_images_are_skipped() {
    let images = image_host().await;

    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(
        vec![
            article("Sem imagem", None),
            article("Pixel de rastreio", Some(format!("{}/pixel.gif", images.uri()))),
            article("Imagem que é página", Some(format!("{}/page.html", images.uri()))),
            article("Com imagem boa", Some(format!("{}/img.jpg", images.uri()))),
        ],
        MockCurator::new(),
        store.clone(),
    );

    let outcome = aggregator.run_cycle().await.unwrap();
    assert_eq!(outcome.skipped, 3);
    assert_eq!(outcome.enqueued, 1);
    // Skipped articles never reach history; they may come back with a
    // usable image on a later cycle.
    assert!(store.recent_history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn outlet_suffix_is_stripped_before_curation() {
    let images = image_host().await;
    let img = format!("{}/img.jpg", images.uri());

    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(
        vec![article("Nova descoberta científica - G1", Some(img))],
        MockCurator::new(),
        store.clone(),
    );
    aggregator.run_cycle().await.unwrap();

    let head = store.next_in_queue().await.unwrap().unwrap();
    assert_eq!(head.refined_title, "Nova descoberta científica");
}

#[tokio::test]
async fn curation_cost_accumulates_on_the_queued_item() {
    let images = image_host().await;
    let img = format!("{}/img.jpg", images.uri());

    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(
        vec![article("Notícia custosa", Some(img))],
        MockCurator::new().with_cost(0.001),
        store.clone(),
    );
    aggregator.run_cycle().await.unwrap();

    // canonical + relevance + refine + rewrite + categorize = 5 calls.
    let head = store.next_in_queue().await.unwrap().unwrap();
    assert!((head.cost_usd - 0.005).abs() < 1e-9, "got {}", head.cost_usd);
}

#[tokio::test]
async fn cycle_start_and_finish_are_logged_to_the_event_sink() {
    let store = Store::open_in_memory().await.unwrap();
    let aggregator = aggregator_with(Vec::new(), MockCurator::new(), store.clone());

    aggregator.run_cycle().await.unwrap();

    let events = store.recent_events(10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].level, LogLevel::Info);
    assert!(events[0].message.contains("finished"));
    assert!(events[1].message.contains("started"));
}
