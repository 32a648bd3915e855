use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{instrument, warn};

use crate::{
    cache::InMemoryCache,
    db::with_lookup_retry,
    entities::restaurant::{self, Entity as RestaurantEntity, Model as RestaurantModel},
    errors::ServiceError,
};

fn id_key(id: i64) -> String {
    format!("restaurant:id:{id}")
}

fn slug_key(slug: &str) -> String {
    format!("restaurant:slug:{}", slug.to_lowercase())
}

/// Read path for restaurants with a process-local TTL cache. Writes made
/// through this service invalidate the cached entry immediately; other
/// instances converge within the TTL.
#[derive(Clone)]
pub struct RestaurantService {
    db: Arc<DatabaseConnection>,
    cache: InMemoryCache,
    ttl: Duration,
}

impl RestaurantService {
    pub fn new(db: Arc<DatabaseConnection>, cache: InMemoryCache, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// Resolves an active restaurant by id or slug.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        id: Option<i64>,
        slug: Option<&str>,
    ) -> Result<RestaurantModel, ServiceError> {
        let restaurant = match (id, slug) {
            (Some(id), _) => self.find_by_id(id).await?,
            (None, Some(slug)) => self.find_by_slug(slug).await?,
            (None, None) => {
                return Err(ServiceError::ValidationError(
                    "Either restaurantId or restaurantSlug is required".to_string(),
                ))
            }
        };

        match restaurant {
            Some(r) if r.is_active => Ok(r),
            _ => Err(ServiceError::NotFound(
                "Restaurant not found or inactive".to_string(),
            )),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<RestaurantModel>, ServiceError> {
        if let Some(hit) = self.cached(&id_key(id)) {
            return Ok(Some(hit));
        }
        let db = self.db.clone();
        let found = with_lookup_retry("restaurant_by_id", || {
            let db = db.clone();
            async move { RestaurantEntity::find_by_id(id).one(&*db).await }
        })
        .await?;
        if let Some(ref model) = found {
            self.store(model);
        }
        Ok(found)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<RestaurantModel>, ServiceError> {
        if let Some(hit) = self.cached(&slug_key(slug)) {
            return Ok(Some(hit));
        }
        let db = self.db.clone();
        let slug_owned = slug.to_string();
        let found = with_lookup_retry("restaurant_by_slug", || {
            let db = db.clone();
            let slug = slug_owned.clone();
            async move {
                RestaurantEntity::find()
                    .filter(restaurant::Column::Slug.eq(slug))
                    .one(&*db)
                    .await
            }
        })
        .await?;
        if let Some(ref model) = found {
            self.store(model);
        }
        Ok(found)
    }

    /// Persists the gateway vendor id and invalidates the cached entry.
    #[instrument(skip(self))]
    pub async fn set_vendor_id(
        &self,
        restaurant: RestaurantModel,
        vendor_id: &str,
    ) -> Result<RestaurantModel, ServiceError> {
        let id = restaurant.id;
        let slug = restaurant.slug.clone();

        let mut active: restaurant::ActiveModel = restaurant.into();
        active.vendor_id = Set(Some(vendor_id.to_string()));
        active.updated_at = Set(chrono::Utc::now());
        let updated = active.update(&*self.db).await?;

        self.cache.delete(&id_key(id));
        self.cache.delete(&slug_key(&slug));
        Ok(updated)
    }

    fn cached(&self, key: &str) -> Option<RestaurantModel> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(key, error = %e, "Dropping undecodable cache entry");
                self.cache.delete(key);
                None
            }
        }
    }

    fn store(&self, model: &RestaurantModel) {
        let Ok(json) = serde_json::to_string(model) else {
            return;
        };
        self.cache.set(&id_key(model.id), &json, Some(self.ttl));
        self.cache.set(&slug_key(&model.slug), &json, Some(self.ttl));
    }
}
