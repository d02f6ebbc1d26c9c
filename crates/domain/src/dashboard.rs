use chrono::{Duration, Utc};
use store::{
    CatalogStore, DailyRevenue, Order, OrderQuery, OrderStats, OrderStore, PageRequest,
    ProductStats,
};

use crate::error::DomainError;

/// How many recent orders the dashboard shows.
pub const RECENT_ORDERS: u32 = 5;

/// How far back the daily revenue series reaches.
pub const REVENUE_DAYS: i64 = 7;

/// Admin dashboard figures.
#[derive(Debug, Clone)]
pub struct DashboardStats {
    pub orders: OrderStats,
    pub products: ProductStats,
    /// Paid revenue per day over the last [`REVENUE_DAYS`] days, oldest first.
    pub revenue_by_day: Vec<DailyRevenue>,
    pub recent_orders: Vec<Order>,
}

#[derive(Clone)]
pub struct DashboardService<S> {
    store: S,
}

impl<S: CatalogStore + OrderStore> DashboardService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn stats(&self) -> Result<DashboardStats, DomainError> {
        let orders = self.store.order_stats().await?;
        let products = self.store.product_stats().await?;
        let since = Utc::now() - Duration::days(REVENUE_DAYS);
        let revenue_by_day = self.store.revenue_by_day(since).await?;
        let recent_orders = self
            .store
            .query_orders(&OrderQuery::new(), PageRequest::new(1, RECENT_ORDERS))
            .await?
            .items;

        Ok(DashboardStats {
            orders,
            products,
            revenue_by_day,
            recent_orders,
        })
    }
}
