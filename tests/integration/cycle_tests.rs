// Whole-cycle behavior: removal, sentinel handling, isolation and single-flight.

use super::*;
use std::time::Instant;
use uatu_pricewatch::models::TargetStatus;
use uatu_pricewatch::plugins::ParserKind;
use uatu_pricewatch::{CycleOutcome, CycleReport};
use wiremock::MockServer;

fn sellers(observations: &[uatu_pricewatch::models::Observation]) -> Vec<(&str, String)> {
    observations
        .iter()
        .map(|o| (o.seller.as_str(), o.price.to_string()))
        .collect()
}

#[tokio::test]
async fn test_vanished_seller_is_removed() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    let first = MockServer::start().await;
    mount_page(&first, "/p/1", html(offer_page(&[("A", "10,00"), ("B", "11,00")]))).await;
    let target = seed_target(&store, "sku-1", format!("{}/p/1", first.uri())).await?;
    crawler.run_cycle().await?;

    // Same target URL, different page content on the second run.
    let second = MockServer::start().await;
    mount_page(&second, "/p/1", html(offer_page(&[("A", "9,50")]))).await;
    sqlx::query("UPDATE targets SET url = ? WHERE id = ?")
        .bind(format!("{}/p/1", second.uri()))
        .bind(&target.id)
        .execute(store.pool())
        .await?;
    age_all_targets(&store).await?;
    crawler.run_cycle().await?;

    let observations = store.observations_for_product("sku-1").await?;
    assert_eq!(sellers(&observations), vec![("A", "9.50".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_missing_sentinel_is_zeroed_not_deleted() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    let first = MockServer::start().await;
    mount_page(&first, "/p/1", html(offer_page(&[(SENTINEL, "20,00"), ("A", "21,00")]))).await;
    let target = seed_target(&store, "sku-1", format!("{}/p/1", first.uri())).await?;
    crawler.run_cycle().await?;

    let second = MockServer::start().await;
    mount_page(&second, "/p/1", html(offer_page(&[("A", "19,00")]))).await;
    sqlx::query("UPDATE targets SET url = ? WHERE id = ?")
        .bind(format!("{}/p/1", second.uri()))
        .bind(&target.id)
        .execute(store.pool())
        .await?;
    age_all_targets(&store).await?;
    crawler.run_cycle().await?;

    let observations = store.observations_for_product("sku-1").await?;
    assert_eq!(
        sellers(&observations),
        vec![("A", "19.00".to_string()), (SENTINEL, "0".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_absent_sentinel_row_is_not_created() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    mount_page(&server, "/p/1", html(offer_page(&[("A", "5,00")]))).await;
    seed_target(&store, "sku-1", format!("{}/p/1", server.uri())).await?;
    crawler.run_cycle().await?;

    let observations = store.observations_for_product("sku-1").await?;
    assert_eq!(sellers(&observations), vec![("A", "5.00".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    mount_page(&server, "/p/1", html(offer_page(&[("A", "1,00")]))).await;
    mount_page(&server, "/p/2", ResponseTemplate::new(503)).await;
    mount_page(&server, "/p/3", html(offer_page(&[("C", "3,00")]))).await;

    let t1 = seed_target(&store, "sku-1", format!("{}/p/1", server.uri())).await?;
    let t2 = seed_target(&store, "sku-2", format!("{}/p/2", server.uri())).await?;
    let t3 = seed_target(&store, "sku-3", format!("{}/p/3", server.uri())).await?;

    let outcome = crawler.run_cycle().await?;
    assert_eq!(
        outcome,
        CycleOutcome::Completed(CycleReport {
            selected: 3,
            succeeded: 2,
            failed: 1
        })
    );

    let status = |t: Option<uatu_pricewatch::models::Target>| t.map(|t| t.status);
    assert_eq!(status(store.get_target(&t1.id).await?), Some(TargetStatus::Success));
    assert_eq!(status(store.get_target(&t2.id).await?), Some(TargetStatus::Error));
    assert_eq!(status(store.get_target(&t3.id).await?), Some(TargetStatus::Success));
    assert!(store.observations_for_product("sku-2").await?.is_empty());
    assert_eq!(store.observations_for_product("sku-3").await?.len(), 1);

    // ERROR targets are retried on the next cycle regardless of age.
    let outcome = crawler.run_cycle().await?;
    assert!(matches!(outcome, CycleOutcome::Completed(CycleReport { selected: 1, .. })));
    Ok(())
}

#[tokio::test]
async fn test_parse_failure_leaves_observations_untouched() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    let first = MockServer::start().await;
    mount_page(&first, "/p/1", html(offer_page(&[("A", "7,00")]))).await;
    let target = seed_target(&store, "sku-1", format!("{}/p/1", first.uri())).await?;
    crawler.run_cycle().await?;

    let second = MockServer::start().await;
    mount_page(&second, "/p/1", html("<html><body>Em manutenção</body></html>".to_string())).await;
    sqlx::query("UPDATE targets SET url = ? WHERE id = ?")
        .bind(format!("{}/p/1", second.uri()))
        .bind(&target.id)
        .execute(store.pool())
        .await?;
    age_all_targets(&store).await?;
    crawler.run_cycle().await?;

    let stored = store.get_target(&target.id).await?.expect("target");
    assert_eq!(stored.status, TargetStatus::Error);
    let observations = store.observations_for_product("sku-1").await?;
    assert_eq!(sellers(&observations), vec![("A", "7.00".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_rerun_is_idempotent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    mount_page(
        &server,
        "/p/1",
        html(offer_page(&[(SENTINEL, "3,00"), ("A", "2,00"), ("A", "2,50")])),
    )
    .await;
    seed_target(&store, "sku-1", format!("{}/p/1", server.uri())).await?;

    crawler.run_cycle().await?;
    let once = store.observations_for_product("sku-1").await?;

    age_all_targets(&store).await?;
    crawler.run_cycle().await?;
    let twice = store.observations_for_product("sku-1").await?;

    assert_eq!(once, twice);
    // Duplicate seller blocks: the first occurrence wins.
    assert_eq!(
        sellers(&twice),
        vec![("A", "2.00".to_string()), (SENTINEL, "3.00".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_concurrent_trigger_is_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::ZERO);

    mount_page(
        &server,
        "/p/slow",
        html(offer_page(&[("A", "1,00")])).set_delay(Duration::from_millis(300)),
    )
    .await;
    seed_target(&store, "sku-1", format!("{}/p/slow", server.uri())).await?;

    let second = {
        let crawler = Arc::clone(&crawler);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            crawler.run_cycle().await
        }
    };
    let (first, second) = tokio::join!(crawler.run_cycle(), second);

    assert!(matches!(first?, CycleOutcome::Completed(CycleReport { succeeded: 1, .. })));
    assert_eq!(second?, CycleOutcome::Skipped);
    assert!(!crawler.guard().is_running());
    Ok(())
}

#[tokio::test]
async fn test_pacer_spaces_targets() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::from_millis(100));

    mount_page(&server, "/p/1", html(offer_page(&[("A", "1,00")]))).await;
    mount_page(&server, "/p/2", html(offer_page(&[("B", "2,00")]))).await;
    seed_target(&store, "sku-1", format!("{}/p/1", server.uri())).await?;
    seed_target(&store, "sku-2", format!("{}/p/2", server.uri())).await?;

    let started = Instant::now();
    crawler.run_cycle().await?;

    // One pause after each of the two targets.
    assert!(started.elapsed() >= Duration::from_millis(200));
    Ok(())
}

#[tokio::test]
async fn test_pacer_runs_after_failed_target() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;
    let crawler = create_test_crawler(&store, default_parsers(), Duration::from_millis(100));

    mount_page(&server, "/p/1", ResponseTemplate::new(503)).await;
    mount_page(&server, "/p/2", html(offer_page(&[("B", "2,00")]))).await;
    seed_target(&store, "sku-1", format!("{}/p/1", server.uri())).await?;
    seed_target(&store, "sku-2", format!("{}/p/2", server.uri())).await?;

    let started = Instant::now();
    let outcome = crawler.run_cycle().await?;

    assert!(matches!(outcome, CycleOutcome::Completed(CycleReport { failed: 1, succeeded: 1, .. })));
    assert!(started.elapsed() >= Duration::from_millis(200));
    Ok(())
}

#[tokio::test]
async fn test_host_override_selects_json_ld() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = create_test_store().await?;

    let mut parsers = default_parsers();
    let host = url::Url::parse(&server.uri())?
        .host_str()
        .map(str::to_string)
        .expect("mock server host");
    parsers.set_host_override(&host, ParserKind::JsonLd);
    let crawler = create_test_crawler(&store, parsers, Duration::ZERO);

    let page = r#"<html><head><script type="application/ld+json">
        {"@type": "Product", "offers": [
            {"@type": "Offer", "price": "49.90", "seller": {"name": "Loja Oficial"}},
            {"@type": "Offer", "price": 45, "seller": {"name": "B"}}
        ]}
    </script></head><body></body></html>"#;
    mount_page(&server, "/p/1", html(page.to_string())).await;
    seed_target(&store, "sku-1", format!("{}/p/1", server.uri())).await?;

    crawler.run_cycle().await?;

    let observations = store.observations_for_product("sku-1").await?;
    assert_eq!(
        sellers(&observations),
        vec![("B", "45".to_string()), (SENTINEL, "49.90".to_string())]
    );
    Ok(())
}
