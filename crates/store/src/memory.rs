use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    Category, CategoryId, DailyRevenue, Money, NewCategory, NewOrder, NewProduct, Order, OrderId,
    OrderItemId, OrderQuery, OrderStats, OrderStatus, OrderUpdate, Page, PageRequest,
    PaymentStatus, Product, ProductChanges, ProductFilter, ProductId, ProductStats, Result,
    StockDecrement, StoreError, UserId, category,
    store::{CatalogStore, OrderStore},
};

#[derive(Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, Category>,
    orders: BTreeMap<OrderId, Order>,
    next_product_id: i64,
    next_category_id: i64,
    next_order_id: i64,
    next_item_id: i64,
    fail_on_create_order: bool,
}

/// In-memory store implementation for tests and local runs.
///
/// Provides the same interface and guarantees as the PostgreSQL
/// implementation; writes are serialised through one lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `create_order` call fail with a backend error
    /// before touching any row.
    pub async fn set_fail_on_create_order(&self, fail: bool) {
        self.state.write().await.fail_on_create_order = fail;
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Current quantity on hand, keyed by product id.
    pub async fn stock_levels(&self) -> BTreeMap<ProductId, i32> {
        self.state
            .read()
            .await
            .products
            .iter()
            .map(|(id, p)| (*id, p.quantity))
            .collect()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_products_by_ids(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<Page<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| filter.compare(a, b));
        Ok(Page::from_sorted(products, page))
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::DuplicateSku(product.sku));
        }
        if state.products.values().any(|p| p.slug == product.slug) {
            return Err(StoreError::DuplicateSlug(product.slug));
        }
        state.next_product_id += 1;
        let id = ProductId::new(state.next_product_id);
        let product = product.into_product(id, Utc::now());
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>> {
        let mut state = self.state.write().await;
        if let Some(sku) = &changes.sku
            && state.products.values().any(|p| p.id != id && &p.sku == sku)
        {
            return Err(StoreError::DuplicateSku(sku.clone()));
        }
        if let Some(slug) = &changes.slug
            && state.products.values().any(|p| p.id != id && &p.slug == slug)
        {
            return Err(StoreError::DuplicateSlug(slug.clone()));
        }
        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(product);
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.products.remove(&id).is_none() {
            return Ok(false);
        }
        for order in state.orders.values_mut() {
            for item in &mut order.items {
                if item.product_id == Some(id) {
                    item.product_id = None;
                }
            }
        }
        Ok(true)
    }

    async fn product_stats(&self) -> Result<ProductStats> {
        let state = self.state.read().await;
        let mut stats = ProductStats::default();
        for product in state.products.values() {
            stats.total += 1;
            stats.active += u64::from(product.is_active);
            stats.low_stock += u64::from(product.is_low_stock());
            stats.out_of_stock += u64::from(product.is_out_of_stock());
        }
        Ok(stats)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut categories: Vec<_> = state.categories.values().cloned().collect();
        categories.sort_by(category::sibling_order);
        Ok(categories)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let state = self.state.read().await;
        Ok(state.categories.values().find(|c| c.slug == slug).cloned())
    }

    async fn insert_category(&self, category: NewCategory) -> Result<Category> {
        let mut state = self.state.write().await;
        if state.categories.values().any(|c| c.slug == category.slug) {
            return Err(StoreError::DuplicateSlug(category.slug));
        }
        state.next_category_id += 1;
        let id = CategoryId::new(state.next_category_id);
        let category = category.into_category(id, Utc::now());
        state.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn count_products_by_category(&self) -> Result<HashMap<CategoryId, u64>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for category_id in state.products.values().filter_map(|p| p.category_id) {
            *counts.entry(category_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: NewOrder, decrements: &[StockDecrement]) -> Result<Order> {
        let mut state = self.state.write().await;

        if state.fail_on_create_order {
            return Err(StoreError::Backend(
                "order write rejected by storage".to_string(),
            ));
        }
        if !order.totals.is_balanced() {
            return Err(StoreError::Backend(
                "order total does not balance".to_string(),
            ));
        }

        // Check every guard before the first write so a failure leaves no trace
        let mut remaining: HashMap<ProductId, i64> = HashMap::new();
        for decrement in decrements {
            let insufficient = || StoreError::InsufficientStock {
                product_id: decrement.product_id,
                requested: decrement.quantity,
            };
            let product = state
                .products
                .get(&decrement.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(insufficient)?;
            let left = remaining
                .entry(product.id)
                .or_insert_with(|| i64::from(product.quantity));
            if *left < i64::from(decrement.quantity) {
                return Err(insufficient());
            }
            *left -= i64::from(decrement.quantity);
        }

        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::DuplicateOrderNumber(order.order_number));
        }

        let now = Utc::now();
        for (product_id, left) in remaining {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.quantity = i32::try_from(left).unwrap_or(i32::MAX);
                product.updated_at = now;
            }
        }

        state.next_order_id += 1;
        let order_id = OrderId::new(state.next_order_id);
        let mut items = Vec::with_capacity(order.items.len());
        for item in order.items {
            state.next_item_id += 1;
            items.push(item.into_item(OrderItemId::new(state.next_item_id), order_id));
        }

        let stored = Order {
            id: order_id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            shipping: order.shipping,
            billing: order.billing,
            totals: order.totals,
            notes: order.notes,
            items,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order_id, stored.clone());
        Ok(stored)
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn list_orders_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        self.query_orders(&OrderQuery::for_user(user_id), page).await
    }

    async fn query_orders(&self, query: &OrderQuery, page: PageRequest) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| query.compare(a, b));
        Ok(Page::from_sorted(orders, page))
    }

    async fn update_order(&self, id: OrderId, update: OrderUpdate) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        update.apply_to(order);
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn set_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.status = next;
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn order_stats(&self) -> Result<OrderStats> {
        let state = self.state.read().await;
        let mut stats = OrderStats::default();
        for order in state.orders.values() {
            stats.total += 1;
            match order.status {
                OrderStatus::Pending => stats.pending += 1,
                OrderStatus::Processing => stats.processing += 1,
                OrderStatus::Delivered => stats.delivered += 1,
                OrderStatus::Shipped | OrderStatus::Cancelled => {}
            }
            if order.payment_status == PaymentStatus::Paid {
                stats.revenue += order.totals.total;
            }
        }
        Ok(stats)
    }

    async fn revenue_by_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyRevenue>> {
        let state = self.state.read().await;
        let mut days = BTreeMap::new();
        for order in state.orders.values() {
            if order.payment_status == PaymentStatus::Paid && order.created_at >= since {
                *days
                    .entry(order.created_at.date_naive())
                    .or_insert_with(Money::zero) += order.totals.total;
            }
        }
        Ok(days
            .into_iter()
            .map(|(date, revenue)| DailyRevenue { date, revenue })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        NewOrderItem, OrderTotals, ProductSortField, ProductStatus, ShippingAddress, SortDirection,
    };

    fn shipping() -> ShippingAddress {
        ShippingAddress {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            address: "12 Analytical Row".into(),
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
            order_number: number.to_string(),
            user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: "pending".into(),
            shipping: shipping(),
            billing: None,
            totals: OrderTotals::new(subtotal, Money::zero(), Money::zero(), Money::zero()),
            notes: None,
            items,
        }
    }

    async fn seeded() -> (InMemoryStore, Product) {
        let store = InMemoryStore::new();
        let product = store
            .insert_product(NewProduct::new("Widget", "W-1", Money::from_cents(1000), 5))
            .await
            .unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn create_order_decrements_stock_and_assigns_ids() {
        let (store, product) = seeded().await;
        let item = line_item(&product, 2);
        let order = store
            .create_order(
                new_order("VEL-1", None, vec![item]),
                &[StockDecrement {
                    product_id: product.id,
                    quantity: 2,
                }],
            )
            .await
            .unwrap();

        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].order_id, order.id);
        assert_eq!(store.stock_levels().await[&product.id], 3);
    }

    #[tokio::test]
    async fn insufficient_stock_writes_nothing() {
        let (store, product) = seeded().await;
        let decrements = [
            StockDecrement {
                product_id: product.id,
                quantity: 3,
            },
            StockDecrement {
                product_id: product.id,
                quantity: 3,
            },
        ];
        let err = store
            .create_order(new_order("VEL-1", None, vec![]), &decrements)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        assert_eq!(store.stock_levels().await[&product.id], 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_order_number_is_rejected() {
        let (store, _) = seeded().await;
        store
            .create_order(new_order("VEL-1", None, vec![]), &[])
            .await
            .unwrap();
        let err = store
            .create_order(new_order("VEL-1", None, vec![]), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOrderNumber(n) if n == "VEL-1"));
    }

    #[tokio::test]
    async fn injected_failure_leaves_stock_untouched() {
        let (store, product) = seeded().await;
        store.set_fail_on_create_order(true).await;
        let result = store
            .create_order(
                new_order("VEL-1", None, vec![]),
                &[StockDecrement {
                    product_id: product.id,
                    quantity: 1,
                }],
            )
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.stock_levels().await[&product.id], 5);
    }

    #[tokio::test]
    async fn user_orders_are_newest_first_and_paginated() {
        let (store, _) = seeded().await;
        let user = UserId::new(9);
        for n in 1..=3 {
            store
                .create_order(new_order(&format!("VEL-{n}"), Some(user), vec![]), &[])
                .await
                .unwrap();
        }
        store
            .create_order(new_order("VEL-other", Some(UserId::new(1)), vec![]), &[])
            .await
            .unwrap();

        let page = store
            .list_orders_for_user(user, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let numbers: Vec<_> = page.items.iter().map(|o| o.order_number.as_str()).collect();
        assert_eq!(numbers, vec!["VEL-3", "VEL-2"]);
    }

    #[tokio::test]
    async fn deleting_product_keeps_item_snapshot() {
        let (store, product) = seeded().await;
        let order = store
            .create_order(
                new_order("VEL-1", None, vec![line_item(&product, 1)]),
                &[],
            )
            .await
            .unwrap();

        assert!(store.delete_product(product.id).await.unwrap());
        let order = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.items[0].product_id, None);
        assert_eq!(order.items[0].product_name, "Widget");
        assert_eq!(order.items[0].price, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn duplicate_sku_is_rejected() {
        let (store, product) = seeded().await;
        let err = store
            .insert_product(NewProduct::new("Other", "W-1", Money::from_cents(1), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSku(_)));

        let other = store
            .insert_product(NewProduct::new("Other", "O-1", Money::from_cents(1), 1))
            .await
            .unwrap();
        let err = store
            .update_product(
                other.id,
                ProductChanges {
                    sku: Some(product.sku.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSku(_)));
    }

    #[tokio::test]
    async fn stats_count_revenue_from_paid_orders_only() {
        let (store, product) = seeded().await;
        let paid = store
            .create_order(
                new_order("VEL-1", None, vec![line_item(&product, 2)]),
                &[],
            )
            .await
            .unwrap();
        store
            .create_order(
                new_order("VEL-2", None, vec![line_item(&product, 1)]),
                &[],
            )
            .await
            .unwrap();
        store
            .update_order(paid.id, OrderUpdate::payment_status(PaymentStatus::Paid))
            .await
            .unwrap();

        let stats = store.order_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.revenue, Money::from_cents(2000));
    }

    #[tokio::test]
    async fn status_change_requires_the_expected_current_status() {
        let (store, _) = seeded().await;
        let order = store
            .create_order(new_order("VEL-1", None, vec![]), &[])
            .await
            .unwrap();

        let delivered = store
            .set_order_status(order.id, OrderStatus::Pending, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.unwrap().status, OrderStatus::Delivered);

        // A writer that still believes the order is pending loses.
        let stale = store
            .set_order_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(stale, None);
        let order = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);

        let missing = store
            .set_order_status(OrderId::new(99), OrderStatus::Pending, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn unbalanced_totals_are_rejected() {
        let (store, product) = seeded().await;
        let mut order = new_order("VEL-1", None, vec![line_item(&product, 1)]);
        order.totals.total = Money::from_cents(1);
        let result = store
            .create_order(
                order,
                &[StockDecrement {
                    product_id: product.id,
                    quantity: 1,
                }],
            )
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.stock_levels().await[&product.id], 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn revenue_by_day_groups_paid_orders() {
        let (store, product) = seeded().await;
        for number in ["VEL-1", "VEL-2", "VEL-3"] {
            store
                .create_order(new_order(number, None, vec![line_item(&product, 1)]), &[])
                .await
                .unwrap();
        }
        for id in [1, 2] {
            store
                .update_order(
                    OrderId::new(id),
                    OrderUpdate::payment_status(PaymentStatus::Paid),
                )
                .await
                .unwrap();
        }

        let now = Utc::now();
        let days = store
            .revenue_by_day(now - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, now.date_naive());
        assert_eq!(days[0].revenue, Money::from_cents(2000));

        let future = store
            .revenue_by_day(now + chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn listing_filters_and_sorts_products() {
        let (store, widget) = seeded().await;
        store
            .insert_product(NewProduct::new("Anvil", "A-1", Money::from_cents(9000), 0))
            .await
            .unwrap();
        store
            .insert_product(NewProduct::new("Bolt", "B-1", Money::from_cents(50), 2))
            .await
            .unwrap();

        let newest_first = store
            .list_products(&ProductFilter::default(), PageRequest::new(1, 10))
            .await
            .unwrap();
        let names: Vec<_> = newest_first.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bolt", "Anvil", "Widget"]);

        let filter = ProductFilter {
            min_price: Some(Money::from_cents(100)),
            in_stock: true,
            ..Default::default()
        };
        let page = store.list_products(&filter, PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, widget.id);

        let filter = ProductFilter {
            sort_by: ProductSortField::Price,
            direction: SortDirection::Ascending,
            ..Default::default()
        };
        let page = store.list_products(&filter, PageRequest::new(1, 10)).await.unwrap();
        let prices: Vec<_> = page.items.iter().map(|p| p.price.cents()).collect();
        assert_eq!(prices, vec![50, 1000, 9000]);

        let filter = ProductFilter {
            status: Some(ProductStatus::LowStock),
            ..Default::default()
        };
        let page = store.list_products(&filter, PageRequest::new(1, 10)).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bolt", "Widget"]);
    }

    #[tokio::test]
    async fn duplicate_slugs_are_rejected() {
        let (store, product) = seeded().await;
        let err = store
            .insert_product(NewProduct::new("Widget", "W-2", Money::from_cents(1), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSlug(slug) if slug == product.slug));

        store.insert_category(NewCategory::new("Shoes")).await.unwrap();
        let err = store
            .insert_category(NewCategory::new("Shoes"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSlug(_)));
    }

    #[tokio::test]
    async fn categories_are_ordered_and_counted() {
        let store = InMemoryStore::new();
        let shoes = store
            .insert_category(NewCategory::new("Shoes").sorted(2))
            .await
            .unwrap();
        let bags = store
            .insert_category(NewCategory::new("Bags").sorted(1))
            .await
            .unwrap();
        for (name, sku) in [("Runner", "R-1"), ("Walker", "W-1")] {
            store
                .insert_product(
                    NewProduct::new(name, sku, Money::from_cents(100), 1).with_category(shoes.id),
                )
                .await
                .unwrap();
        }

        let categories = store.list_categories().await.unwrap();
        assert_eq!(categories[0].id, bags.id);
        assert_eq!(categories[1].id, shoes.id);
        assert_eq!(
            store.find_category_by_slug("shoes").await.unwrap().map(|c| c.id),
            Some(shoes.id)
        );

        let counts = store.count_products_by_category().await.unwrap();
        assert_eq!(counts.get(&shoes.id), Some(&2));
        assert_eq!(counts.get(&bags.id), None);
    }
}
