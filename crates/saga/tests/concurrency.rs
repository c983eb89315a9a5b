//! Concurrent placements against the same stock.

use common::UserId;
use domain::{Money, OrderStatus};
use futures_util::future::join_all;
use rstest::rstest;
use saga::{
    InMemoryInventoryService, InMemoryPaymentService, PlaceOrder, SagaConfig, SagaCoordinator,
    SagaError,
};
use store::InMemoryOrderStore;

fn coordinator(
    inventory: &InMemoryInventoryService,
) -> SagaCoordinator<InMemoryOrderStore, InMemoryInventoryService, InMemoryPaymentService> {
    SagaCoordinator::with_config(
        InMemoryOrderStore::new(),
        inventory.clone(),
        InMemoryPaymentService::new(),
        SagaConfig::default().without_backoff(),
    )
}

#[rstest]
#[case::more_buyers_than_stock(20, 7)]
#[case::exact_fit(16, 16)]
#[case::plenty(8, 100)]
#[case::sold_out(10, 0)]
#[case::single_unit(64, 1)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_placements_never_oversell(#[case] buyers: usize, #[case] stock: i64) {
    let inventory = InMemoryInventoryService::with_stock([("HOT", stock)]);
    let coordinator = coordinator(&inventory);

    let placements = (0..buyers).map(|_| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .place_order(PlaceOrder::new(UserId::new()).item("HOT", 1, Money::from_cents(500)))
                .await
        })
    });
    let results: Vec<_> = join_all(placements)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let confirmed = results
        .iter()
        .filter(|r| matches!(r, Ok(order) if order.status == OrderStatus::Confirmed))
        .count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_insufficient_stock()))
        .count();

    let expected = buyers.min(stock as usize);
    assert_eq!(confirmed, expected);
    assert_eq!(short, buyers - expected);
    assert_eq!(
        inventory.available("HOT").await,
        Some(stock - expected as i64)
    );
    assert_eq!(inventory.held_count().await, expected);
}

#[rstest]
#[case(30, 5)]
#[case(12, 12)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_placements_return_their_other_items(#[case] buyers: usize, #[case] hot: i64) {
    let cold = 1_000;
    let inventory = InMemoryInventoryService::with_stock([("COLD", cold), ("HOT", hot)]);
    let coordinator = coordinator(&inventory);

    let placements = (0..buyers).map(|_| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let request = PlaceOrder::new(UserId::new())
                .item("COLD", 2, Money::from_cents(100))
                .item("HOT", 1, Money::from_cents(900));
            coordinator.place_order(request).await
        })
    });
    let results: Vec<Result<_, SagaError>> = join_all(placements)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let confirmed = results.iter().filter(|r| r.is_ok()).count() as i64;
    assert_eq!(confirmed, hot.min(buyers as i64));
    assert_eq!(inventory.available("HOT").await, Some(hot - confirmed));
    assert_eq!(inventory.available("COLD").await, Some(cold - 2 * confirmed));
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(e) => e.is_insufficient_stock(),
    }));
}
