use chrono::Utc;
use common::{CartId, Money, ShopId, UserId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{
    Actor, CheckoutLine, FulfillmentStatus, ItemStatusUpdate, Order, OrderScope, PaymentMethod,
    Product, ShippingAddress, derive_order_status, plan_checkout,
};

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Bench Buyer".to_string(),
        street: "1 Loop Rd".to_string(),
        city: "Accra".to_string(),
        state: "Greater Accra".to_string(),
        zip_code: None,
        country: "Ghana".to_string(),
        phone: "0240000000".to_string(),
    }
}

fn lines(count: usize, shops: &[ShopId]) -> Vec<CheckoutLine> {
    (0..count)
        .map(|i| CheckoutLine {
            product: Product::new(
                shops[i % shops.len()],
                format!("Product {i}"),
                Money::from_cents(100 + i as i64),
                1_000,
                Utc::now(),
            )
            .unwrap(),
            quantity: 2,
        })
        .collect()
}

fn order_with(count: usize, shops: &[ShopId]) -> Order {
    plan_checkout(
        UserId::new(),
        CartId::new(),
        lines(count, shops),
        address(),
        PaymentMethod::CreditCard,
        Utc::now(),
    )
    .unwrap()
    .order
}

fn bench_plan_checkout(c: &mut Criterion) {
    let shops = [ShopId::new(), ShopId::new()];
    let mut group = c.benchmark_group("domain/plan_checkout");
    for count in [1, 10, 100] {
        let input = lines(count, &shops);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| {
                plan_checkout(
                    UserId::new(),
                    CartId::new(),
                    input.clone(),
                    address(),
                    PaymentMethod::Momo,
                    Utc::now(),
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_item_update(c: &mut Criterion) {
    let shop = ShopId::new();
    let order = order_with(50, &[shop]);
    let actor = Actor::shop(UserId::new(), shop);
    let item_id = order.items[25].id;

    c.bench_function("domain/update_item_status", |b| {
        b.iter(|| {
            order
                .update_item_status(
                    &actor,
                    item_id,
                    ItemStatusUpdate::to(FulfillmentStatus::Shipped),
                    Utc::now(),
                )
                .unwrap()
        });
    });
}

fn bench_visibility(c: &mut Criterion) {
    let shops: Vec<ShopId> = (0..5).map(|_| ShopId::new()).collect();
    let order = order_with(100, &shops);
    let scope = OrderScope::Shop(shops[2]);

    c.bench_function("domain/shop_projection", |b| {
        b.iter(|| scope.project(order.clone()).unwrap());
    });

    c.bench_function("domain/derive_order_status", |b| {
        b.iter(|| derive_order_status(order.status, order.items.iter().map(|item| item.status)));
    });
}

criterion_group!(
    benches,
    bench_plan_checkout,
    bench_item_update,
    bench_visibility
);
criterion_main!(benches);
