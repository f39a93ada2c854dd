use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Cart, CartProduct, LineItemRequest, OrderEngine, ShippingAddress, Subject, SubjectId,
};
use order_store::{InMemoryOrderStore, NewProduct, OrderStore};
use rust_decimal::Decimal;

fn shipping() -> ShippingAddress {
    ShippingAddress {
        full_name: "Bench Buyer".to_string(),
        email: "bench@example.com".to_string(),
        phone: "555-0100".to_string(),
        address: "1 Loop Street".to_string(),
        city: "Springfield".to_string(),
        state: "SP".to_string(),
        zip_code: "12345".to_string(),
    }
}

fn bench_cart_mutations(c: &mut Criterion) {
    let products: Vec<_> = (1..=20)
        .map(|id| CartProduct {
            id: id.into(),
            name: format!("Plant {id}"),
            price: Decimal::new(999 + id, 2),
            image: None,
        })
        .collect();

    c.bench_function("domain/cart_add_20_products_twice", |b| {
        b.iter(|| {
            let mut cart = Cart::new();
            for product in products.iter().chain(products.iter()) {
                cart.add_item(Some(product), 1);
            }
            cart.set_quantity(products[0].id, 5);
            cart.remove_item(products[1].id);
            cart.total()
        });
    });
}

fn bench_place_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryOrderStore::new();
    let product = rt.block_on(async {
        store
            .insert_product(NewProduct::new("Bench Fern", Decimal::new(1250, 2), i32::MAX))
            .await
            .unwrap()
    });
    let engine = OrderEngine::new(store);
    let subject = Subject::customer(SubjectId::new(1));
    let shipping = shipping();

    c.bench_function("domain/place_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .place_order(
                        &subject,
                        vec![LineItemRequest::new(product.id, 1)],
                        &shipping,
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_cart_mutations, bench_place_order);
criterion_main!(benches);
