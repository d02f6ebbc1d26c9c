//! Product categories. Categories form a tree through `parent_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CategoryId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    /// Position among siblings, ascending.
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
}

impl NewCategory {
    /// An active root category with the slug derived from `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            parent_id: None,
            slug: crate::product::slugify(&name),
            name,
            description: None,
            image_url: None,
            is_active: true,
            sort_order: 0,
        }
    }

    pub fn under(mut self, parent_id: CategoryId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn sorted(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn into_category(self, id: CategoryId, now: DateTime<Utc>) -> Category {
        Category {
            id,
            parent_id: self.parent_id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            image_url: self.image_url,
            is_active: self.is_active,
            sort_order: self.sort_order,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sibling order: `sort_order`, then id.
pub fn sibling_order(a: &Category, b: &Category) -> std::cmp::Ordering {
    a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_category_derives_slug() {
        let category = NewCategory::new("Trail & Road Shoes").under(CategoryId::new(1));
        assert_eq!(category.slug, "trail-road-shoes");
        assert_eq!(category.parent_id, Some(CategoryId::new(1)));
        assert!(category.is_active);
    }

    #[test]
    fn siblings_sort_by_position_then_id() {
        let now = Utc::now();
        let mut categories = vec![
            NewCategory::new("B").sorted(2).into_category(CategoryId::new(1), now),
            NewCategory::new("C").sorted(1).into_category(CategoryId::new(3), now),
            NewCategory::new("A").sorted(1).into_category(CategoryId::new(2), now),
        ];
        categories.sort_by(sibling_order);
        let ids: Vec<i64> = categories.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
