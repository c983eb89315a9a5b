use common::ReservationToken;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::ProductId;
use store::{InMemoryStockStore, StockStore};

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let stock = InMemoryStockStore::with_stock([("SKU-BENCH", 1_000_000)]);
    let product = ProductId::new("SKU-BENCH");

    c.bench_function("stock/reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let token = ReservationToken::new();
                stock.reserve(token, &product, 1).await.unwrap();
                stock.release(token, &product, 1).await.unwrap();
            });
        });
    });
}

fn bench_contended_reserve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let product = ProductId::new("SKU-HOT");

    c.bench_function("stock/contended_reserve_64", |b| {
        b.iter(|| {
            rt.block_on(async {
                let stock = InMemoryStockStore::with_stock([("SKU-HOT", 32)]);
                let tasks: Vec<_> = (0..64)
                    .map(|_| {
                        let stock = stock.clone();
                        let product = product.clone();
                        tokio::spawn(async move {
                            stock
                                .reserve(ReservationToken::new(), &product, 1)
                                .await
                                .unwrap()
                        })
                    })
                    .collect();
                futures_util::future::join_all(tasks).await;
            });
        });
    });
}

criterion_group!(benches, bench_reserve_release, bench_contended_reserve);
criterion_main!(benches);
