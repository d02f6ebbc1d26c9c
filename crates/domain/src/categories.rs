//! Category tree browsing and category creation.

use std::collections::HashMap;

use serde::Deserialize;
use store::{CatalogStore, Category, CategoryId, NewCategory, product::slugify};

use crate::error::{DomainError, ValidationErrors};
use crate::validation::{optional, required};

const NAME_MAX: usize = 255;

/// How many levels below a category `show` includes.
pub const SHOW_DEPTH: usize = 2;

/// A category with its product count and, depending on the view, its
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub category: Category,
    pub products_count: u64,
    pub children: Vec<CategoryNode>,
}

/// One category with its parent and two levels of children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDetail {
    pub node: CategoryNode,
    pub parent: Option<Category>,
}

/// Category fields as submitted by an admin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

impl CategoryInput {
    pub fn into_new_category(self) -> Result<NewCategory, DomainError> {
        let mut errors = ValidationErrors::new();
        let name = required(&mut errors, "name", self.name.as_deref(), NAME_MAX);
        let description = optional(
            &mut errors,
            "description",
            self.description.as_deref(),
            usize::MAX,
        );
        let image_url = optional(&mut errors, "image_url", self.image_url.as_deref(), usize::MAX);
        errors.into_result()?;

        let Some(name) = name else {
            return Err(DomainError::validation("name", "The name field is required."));
        };
        let mut category = NewCategory::new(name);
        category.description = description;
        category.image_url = image_url;
        category.parent_id = self.parent_id.map(CategoryId::new);
        category.is_active = self.is_active.unwrap_or(true);
        category.sort_order = self.sort_order.unwrap_or(0);
        Ok(category)
    }
}

/// Groups categories by parent. Each group keeps the store's sibling order.
fn by_parent(categories: &[Category]) -> HashMap<Option<CategoryId>, Vec<&Category>> {
    let mut grouped: HashMap<Option<CategoryId>, Vec<&Category>> = HashMap::new();
    for category in categories {
        grouped.entry(category.parent_id).or_default().push(category);
    }
    grouped
}

fn build_node(
    category: &Category,
    grouped: &HashMap<Option<CategoryId>, Vec<&Category>>,
    counts: &HashMap<CategoryId, u64>,
    depth: usize,
    active_only: bool,
) -> CategoryNode {
    let children = if depth == 0 {
        Vec::new()
    } else {
        grouped
            .get(&Some(category.id))
            .into_iter()
            .flatten()
            .filter(|child| !active_only || child.is_active)
            .map(|child| build_node(child, grouped, counts, depth - 1, active_only))
            .collect()
    };
    CategoryNode {
        category: category.clone(),
        products_count: counts.get(&category.id).copied().unwrap_or(0),
        children,
    }
}

#[derive(Clone)]
pub struct CategoryService<S> {
    store: S,
}

impl<S: CatalogStore> CategoryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Active root categories with their active children, by `sort_order`.
    #[tracing::instrument(skip(self))]
    pub async fn tree(&self) -> Result<Vec<CategoryNode>, DomainError> {
        let categories = self.store.list_categories().await?;
        let counts = self.store.count_products_by_category().await?;
        let grouped = by_parent(&categories);

        Ok(grouped
            .get(&None)
            .into_iter()
            .flatten()
            .filter(|root| root.is_active)
            .map(|root| build_node(root, &grouped, &counts, 1, true))
            .collect())
    }

    /// A category by slug, with its parent and two levels of children.
    #[tracing::instrument(skip(self))]
    pub async fn show(&self, slug: &str) -> Result<CategoryDetail, DomainError> {
        let categories = self.store.list_categories().await?;
        let category = categories
            .iter()
            .find(|c| c.slug == slug)
            .ok_or_else(DomainError::category_not_found)?;
        let counts = self.store.count_products_by_category().await?;
        let grouped = by_parent(&categories);

        let parent = category
            .parent_id
            .and_then(|id| categories.iter().find(|c| c.id == id))
            .cloned();
        Ok(CategoryDetail {
            node: build_node(category, &grouped, &counts, SHOW_DEPTH, false),
            parent,
        })
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, input: CategoryInput) -> Result<Category, DomainError> {
        let mut new = input.into_new_category()?;
        if let Some(parent_id) = new.parent_id
            && self.store.get_category(parent_id).await?.is_none()
        {
            return Err(DomainError::validation(
                "parent_id",
                "The selected parent_id is invalid.",
            ));
        }

        let base = slugify(&new.name);
        let mut n = 0;
        while self.store.find_category_by_slug(&new.slug).await?.is_some() {
            n += 1;
            new.slug = format!("{base}-{n}");
        }

        let category = self.store.insert_category(new).await?;
        tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
        Ok(category)
    }
}
