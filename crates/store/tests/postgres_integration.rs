//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use serial_test::serial;
use sqlx::PgPool;
use store::{
    CatalogStore, Money, NewCategory, NewOrder, NewOrderItem, NewProduct, OrderQuery,
    OrderSortField, OrderStatus, OrderStore, OrderTotals, OrderUpdate, PageRequest, PaymentStatus,
    PostgresStore, Product, ProductChanges, ProductFilter, ProductId, ProductSortField,
    ProductStatus, ShippingAddress, SortDirection, StockDecrement, StoreError, UserId,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// A store with its own pool over emptied tables.
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, products, categories RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn shipping(email: &str) -> ShippingAddress {
    ShippingAddress {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: email.into(),
        phone: Some("555-0100".into()),
        address: "12 Analytical St".into(),
        address_2: None,
        city: "London".into(),
        state: "LDN".into(),
        zip: "N1 9GU".into(),
        country: "GB".into(),
    }
}

fn line_item(product: &Product, quantity: u32) -> NewOrderItem {
    NewOrderItem::snapshot(product, quantity).unwrap()
}

fn new_order(number: &str, user_id: Option<UserId>, items: Vec<NewOrderItem>) -> NewOrder {
    let subtotal = items.iter().fold(Money::zero(), |acc, i| acc + i.subtotal);
    NewOrder {
        order_number: number.into(),
        user_id,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: "pending".into(),
        shipping: shipping("ada@example.com"),
        billing: None,
        totals: OrderTotals::new(subtotal, Money::zero(), Money::zero(), Money::zero()),
        notes: None,
        items,
    }
}

fn decrement(product_id: ProductId, quantity: u32) -> StockDecrement {
    StockDecrement {
        product_id,
        quantity,
    }
}

#[tokio::test]
#[serial]
async fn test_insert_and_get_product() {
    let store = get_test_store().await;

    let product = store
        .insert_product(
            NewProduct::new("Trail Runner", "TR-1", Money::from_cents(5000), 10)
                .with_sale_price(Money::from_cents(4000)),
        )
        .await
        .unwrap();

    assert_eq!(product.slug, "trail-runner");
    assert_eq!(product.current_price(), Money::from_cents(4000));

    let loaded = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded, product);
}

#[tokio::test]
#[serial]
async fn test_duplicate_sku_is_rejected() {
    let store = get_test_store().await;

    store
        .insert_product(NewProduct::new("A", "SKU-1", Money::from_cents(100), 1))
        .await
        .unwrap();
    let err = store
        .insert_product(NewProduct::new("B", "SKU-1", Money::from_cents(100), 1))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::DuplicateSku(sku) if sku == "SKU-1"));
}

#[tokio::test]
#[serial]
async fn test_create_order_decrements_stock() {
    let store = get_test_store().await;
    let product = store
        .insert_product(NewProduct::new("Mug", "MUG-1", Money::from_cents(1250), 10))
        .await
        .unwrap();

    let order = store
        .create_order(
            new_order(
                "VEL-260101-AAAA",
                Some(UserId::new(7)),
                vec![line_item(&product, 3)],
            ),
            &[decrement(product.id, 3)],
        )
        .await
        .unwrap();

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].product_id, Some(product.id));
    assert_eq!(order.totals.total, Money::from_cents(3750));

    let stock = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(stock.quantity, 7);

    let loaded = store
        .find_order_by_number("VEL-260101-AAAA")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.id, order.id);
    assert_eq!(loaded.items, order.items);
    assert_eq!(loaded.shipping, order.shipping);
    assert_eq!(loaded.billing, None);
}

#[tokio::test]
#[serial]
async fn test_insufficient_stock_rolls_back_everything() {
    let store = get_test_store().await;
    let plenty = store
        .insert_product(NewProduct::new("Plenty", "P-1", Money::from_cents(100), 50))
        .await
        .unwrap();
    let scarce = store
        .insert_product(NewProduct::new("Scarce", "S-1", Money::from_cents(100), 1))
        .await
        .unwrap();

    let err = store
        .create_order(
            new_order(
                "VEL-260101-BBBB",
                None,
                vec![
                    line_item(&plenty, 5),
                    line_item(&scarce, 2),
                ],
            ),
            &[decrement(plenty.id, 5), decrement(scarce.id, 2)],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::InsufficientStock { product_id, .. } if product_id == scarce.id
    ));
    assert_eq!(store.get_product(plenty.id).await.unwrap().unwrap().quantity, 50);
    assert!(
        store
            .find_order_by_number("VEL-260101-BBBB")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn test_duplicate_order_number_rolls_back_stock() {
    let store = get_test_store().await;
    let product = store
        .insert_product(NewProduct::new("Mug", "MUG-1", Money::from_cents(100), 10))
        .await
        .unwrap();

    store
        .create_order(
            new_order("VEL-260101-CCCC", None, vec![line_item(&product, 1)]),
            &[decrement(product.id, 1)],
        )
        .await
        .unwrap();

    let err = store
        .create_order(
            new_order("VEL-260101-CCCC", None, vec![line_item(&product, 2)]),
            &[decrement(product.id, 2)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::DuplicateOrderNumber(n) if n == "VEL-260101-CCCC"));
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().quantity, 9);
}

#[tokio::test]
#[serial]
async fn test_concurrent_orders_never_oversell() {
    let store = get_test_store().await;
    let product = store
        .insert_product(NewProduct::new("Last Ones", "L-1", Money::from_cents(100), 5))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        let product = product.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_order(
                    new_order(
                        &format!("VEL-260101-R{:03}", i),
                        None,
                        vec![line_item(&product, 1)],
                    ),
                    &[decrement(product.id, 1)],
                )
                .await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(StoreError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().quantity, 0);
}

#[tokio::test]
#[serial]
async fn test_query_orders_filters_and_sorts() {
    let store = get_test_store().await;
    let product = store
        .insert_product(NewProduct::new("Mug", "MUG-1", Money::from_cents(100), 100))
        .await
        .unwrap();

    for (i, qty) in [1u32, 5, 3].into_iter().enumerate() {
        store
            .create_order(
                new_order(
                    &format!("VEL-260101-Q{i:03}"),
                    Some(UserId::new(1)),
                    vec![line_item(&product, qty)],
                ),
                &[decrement(product.id, qty)],
            )
            .await
            .unwrap();
    }

    let by_total = store
        .query_orders(
            &OrderQuery::new().sort(OrderSortField::Total, SortDirection::Descending),
            PageRequest::new(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(by_total.total, 3);
    assert_eq!(by_total.items.len(), 2);
    assert_eq!(by_total.items[0].totals.total, Money::from_cents(500));
    assert_eq!(by_total.items[1].totals.total, Money::from_cents(300));

    let search = store
        .query_orders(&OrderQuery::new().search("q001"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(search.total, 1);
    assert_eq!(search.items[0].order_number, "VEL-260101-Q001");

    let wildcard = store
        .query_orders(&OrderQuery::new().search("%"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(wildcard.total, 0);

    let mine = store
        .list_orders_for_user(UserId::new(1), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(mine.total, 3);
    assert_eq!(mine.items[0].order_number, "VEL-260101-Q002");
}

#[tokio::test]
#[serial]
async fn test_update_order_and_stats() {
    let store = get_test_store().await;
    let product = store
        .insert_product(NewProduct::new("Mug", "MUG-1", Money::from_cents(1000), 10))
        .await
        .unwrap();
    let order = store
        .create_order(
            new_order("VEL-260101-DDDD", None, vec![line_item(&product, 2)]),
            &[decrement(product.id, 2)],
        )
        .await
        .unwrap();

    let updated = store
        .update_order(
            order.id,
            OrderUpdate {
                status: Some(OrderStatus::Processing),
                payment_status: Some(PaymentStatus::Paid),
                notes: Some("gift wrap".into()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Processing);
    assert_eq!(updated.notes.as_deref(), Some("gift wrap"));
    assert_eq!(updated.items.len(), 1);

    let stats = store.order_stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.revenue, Money::from_cents(2000));
}

#[tokio::test]
#[serial]
async fn test_product_update_delete_and_listing() {
    let store = get_test_store().await;
    let a = store
        .insert_product(NewProduct::new("Alpha", "A-1", Money::from_cents(100), 3))
        .await
        .unwrap();
    store
        .insert_product(NewProduct::new("Beta", "B-1", Money::from_cents(100), 0).inactive())
        .await
        .unwrap();

    let listed = store
        .list_products(&ProductFilter::storefront(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].id, a.id);

    let updated = store
        .update_product(
            a.id,
            ProductChanges {
                quantity: Some(20),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.quantity, 20);

    let stats = store.product_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.out_of_stock, 1);

    let order = store
        .create_order(
            new_order("VEL-260101-EEEE", None, vec![line_item(&updated, 1)]),
            &[decrement(a.id, 1)],
        )
        .await
        .unwrap();
    assert!(store.delete_product(a.id).await.unwrap());
    assert!(!store.delete_product(a.id).await.unwrap());

    let kept = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(kept.items[0].product_id, None);
    assert_eq!(kept.items[0].product_name, "Alpha");
}

#[tokio::test]
#[serial]
async fn test_stale_status_change_is_refused() {
    let store = get_test_store().await;
    let order = store
        .create_order(new_order("VEL-260101-FFFF", None, vec![]), &[])
        .await
        .unwrap();

    let shipped = store
        .set_order_status(order.id, OrderStatus::Pending, OrderStatus::Shipped)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let stale = store
        .set_order_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert!(stale.is_none());
    let current = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Shipped);
}

#[tokio::test]
#[serial]
async fn test_revenue_by_day_counts_paid_orders() {
    let store = get_test_store().await;
    let product = store
        .insert_product(NewProduct::new("Mug", "MUG-1", Money::from_cents(1500), 10))
        .await
        .unwrap();
    for number in ["VEL-260101-GGG1", "VEL-260101-GGG2"] {
        let order = store
            .create_order(new_order(number, None, vec![line_item(&product, 1)]), &[])
            .await
            .unwrap();
        store
            .update_order(order.id, OrderUpdate::payment_status(PaymentStatus::Paid))
            .await
            .unwrap();
    }
    store
        .create_order(new_order("VEL-260101-GGG3", None, vec![line_item(&product, 1)]), &[])
        .await
        .unwrap();

    let now = chrono::Utc::now();
    let days = store
        .revenue_by_day(now - chrono::Duration::days(7))
        .await
        .unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].revenue, Money::from_cents(3000));

    let none = store
        .revenue_by_day(now + chrono::Duration::days(1))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
#[serial]
async fn test_categories_slugs_and_product_counts() {
    let store = get_test_store().await;
    let shoes = store
        .insert_category(NewCategory::new("Shoes").sorted(2))
        .await
        .unwrap();
    let trail = store
        .insert_category(NewCategory::new("Trail").under(shoes.id).sorted(1))
        .await
        .unwrap();
    let err = store
        .insert_category(NewCategory::new("Shoes"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateSlug(slug) if slug == "shoes"));

    store
        .insert_product(
            NewProduct::new("Runner", "R-1", Money::from_cents(100), 1).with_category(trail.id),
        )
        .await
        .unwrap();
    let err = store
        .insert_product(NewProduct::new("Runner", "R-2", Money::from_cents(100), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateSlug(slug) if slug == "runner"));

    let categories = store.list_categories().await.unwrap();
    let ids: Vec<_> = categories.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![trail.id, shoes.id]);
    assert_eq!(
        store.find_category_by_slug("trail").await.unwrap().unwrap().parent_id,
        Some(shoes.id)
    );

    let counts = store.count_products_by_category().await.unwrap();
    assert_eq!(counts.get(&trail.id), Some(&1));
    assert_eq!(counts.get(&shoes.id), None);
    assert_eq!(
        store.find_product_by_slug("runner").await.unwrap().map(|p| p.sku),
        Some("R-1".to_string())
    );
}

#[tokio::test]
#[serial]
async fn test_product_listing_price_stock_and_sort() {
    let store = get_test_store().await;
    for (name, sku, cents, qty) in [
        ("Anvil", "A-1", 9000, 0),
        ("Bolt", "B-1", 50, 2),
        ("Widget", "W-1", 1000, 20),
    ] {
        store
            .insert_product(NewProduct::new(name, sku, Money::from_cents(cents), qty))
            .await
            .unwrap();
    }

    let newest_first = store
        .list_products(&ProductFilter::default(), PageRequest::default())
        .await
        .unwrap();
    let names: Vec<_> = newest_first.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Widget", "Bolt", "Anvil"]);

    let filter = ProductFilter {
        max_price: Some(Money::from_cents(1000)),
        in_stock: true,
        sort_by: ProductSortField::Price,
        direction: SortDirection::Ascending,
        ..Default::default()
    };
    let page = store.list_products(&filter, PageRequest::default()).await.unwrap();
    let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Bolt", "Widget"]);

    let filter = ProductFilter {
        status: Some(ProductStatus::OutOfStock),
        ..Default::default()
    };
    let page = store.list_products(&filter, PageRequest::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "Anvil");
}
