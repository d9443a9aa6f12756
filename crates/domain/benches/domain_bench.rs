use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AddressId, Aggregate, ChangeStatus, CustomerId, LineItem, LoyaltyBalance, Money, Order,
    OrderEvent, OrderService, OrderStatus, PaymentMethod, PlaceOrder, Pricing, ProductId,
    ProductSnapshot,
};
use event_store::{EventStore, InMemoryEventStore};

fn lines(count: u32) -> Vec<LineItem> {
    (1..=count)
        .map(|i| {
            LineItem::new(
                ProductId::new(),
                i,
                Money::new(10_000 * i64::from(i)),
                ProductSnapshot {
                    name: format!("Product {i}"),
                    brand: "Bench".to_string(),
                    category: "misc".to_string(),
                    image: None,
                    specs: Default::default(),
                },
            )
        })
        .collect()
}

fn place_cmd(customer_id: CustomerId) -> PlaceOrder {
    PlaceOrder::new(customer_id, lines(5), AddressId::new(), PaymentMethod::Cod)
        .with_discount("BENCH001", 10)
        .with_loyalty_points(2)
}

fn bench_pricing(c: &mut Criterion) {
    let items = lines(20);
    c.bench_function("domain/price_20_lines", |b| {
        b.iter(|| Pricing::compute(&items, Some(15), 3).unwrap());
    });
}

fn bench_place_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/place_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = OrderService::new(InMemoryEventStore::new());
                service.place_order(place_cmd(CustomerId::new())).await.unwrap();
            });
        });
    });
}

fn bench_status_walk(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/place_and_deliver", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service = OrderService::new(InMemoryEventStore::new());
                let cmd = place_cmd(CustomerId::new());
                let order_id = cmd.order_id;
                service.place_order(cmd).await.unwrap();
                for status in [
                    OrderStatus::Confirmed,
                    OrderStatus::Shipping,
                    OrderStatus::Delivered,
                ] {
                    service
                        .change_status(ChangeStatus::new(order_id, status))
                        .await
                        .unwrap();
                }
            });
        });
    });
}

fn bench_reconstruction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = OrderService::new(InMemoryEventStore::new());
    let cmd = place_cmd(CustomerId::new());
    let order_id = cmd.order_id;
    rt.block_on(async {
        service.place_order(cmd).await.unwrap();
        service
            .change_status(ChangeStatus::new(order_id, OrderStatus::Confirmed))
            .await
            .unwrap();
    });

    c.bench_function("domain/reconstruct_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = service
                    .store()
                    .get_events_for_aggregate(order_id)
                    .await
                    .unwrap();
                let mut order = Order::default();
                for event in &events {
                    let domain_event: OrderEvent =
                        serde_json::from_value(event.payload.clone()).unwrap();
                    order.apply(domain_event);
                }
            });
        });
    });
}

fn bench_loyalty_balance(c: &mut Criterion) {
    let orders: Vec<Order> = (0..100)
        .map(|_| {
            let mut order = Order::default();
            let placed = order.place(&place_cmd(CustomerId::new()), Utc::now()).unwrap();
            order.apply_events(placed);
            for status in [
                OrderStatus::Confirmed,
                OrderStatus::Shipping,
                OrderStatus::Delivered,
            ] {
                let events = order.change_status(status, None, Utc::now()).unwrap();
                order.apply_events(events);
            }
            order
        })
        .collect();

    c.bench_function("domain/loyalty_balance_100_orders", |b| {
        b.iter(|| LoyaltyBalance::from_orders(&orders).available());
    });
}

criterion_group!(
    benches,
    bench_pricing,
    bench_place_order,
    bench_status_walk,
    bench_reconstruction,
    bench_loyalty_balance,
);
criterion_main!(benches);
