use chrono::{DateTime, Utc};

use crate::{Order, OrderStatus, PaymentStatus, UserId};

/// Column an order listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSortField {
    #[default]
    CreatedAt,
    Total,
}

impl OrderSortField {
    pub fn column(&self) -> &'static str {
        match self {
            OrderSortField::CreatedAt => "created_at",
            OrderSortField::Total => "total_cents",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Builder for order listings.
///
/// Filters are combined with AND. The default sort is newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    pub status: Option<OrderStatus>,

    pub payment_status: Option<PaymentStatus>,

    /// Case-insensitive substring of order number, shipping email, or
    /// shipping first/last name.
    pub search: Option<String>,

    /// Created at or after (inclusive).
    pub from: Option<DateTime<Utc>>,

    /// Created at or before (inclusive).
    pub to: Option<DateTime<Utc>>,

    pub sort_by: OrderSortField,

    pub direction: SortDirection,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders owned by one user, newest first.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn sort(mut self, field: OrderSortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.direction = direction;
        self
    }

    /// In-process evaluation of the filters, used by the in-memory store.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id != Some(user_id)
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(payment_status) = self.payment_status
            && order.payment_status != payment_status
        {
            return false;
        }
        if let Some(from) = self.from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to
            && order.created_at > to
        {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let haystacks = [
                &order.order_number,
                &order.shipping.email,
                &order.shipping.first_name,
                &order.shipping.last_name,
            ];
            if !haystacks.iter().any(|h| h.to_lowercase().contains(&term)) {
                return false;
            }
        }
        true
    }

    /// In-process ordering matching the SQL `ORDER BY`, ties broken by id.
    pub fn compare(&self, a: &Order, b: &Order) -> std::cmp::Ordering {
        let ordering = match self.sort_by {
            OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderSortField::Total => a.totals.total.cmp(&b.totals.total),
        }
        .then(a.id.cmp(&b.id));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}
