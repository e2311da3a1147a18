use crate::entities::property::GetPropertySnapshot;
use crate::framework::{DatabaseProcessor, StoreError};
use kanau::processor::Processor;
use rentchain_sdk::objects::PropertySnapshot;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Read access to property listings.
#[async_trait::async_trait]
pub trait PropertyCatalog: Send + Sync {
    async fn snapshot(&self, property_id: i64) -> Result<Option<PropertySnapshot>, StoreError>;
}

#[async_trait::async_trait]
impl PropertyCatalog for DatabaseProcessor {
    async fn snapshot(&self, property_id: i64) -> Result<Option<PropertySnapshot>, StoreError> {
        Ok(self.process(GetPropertySnapshot { property_id }).await?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPropertyCatalog {
    properties: RwLock<HashMap<i64, PropertySnapshot>>,
}

impl MemoryPropertyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, snapshot: PropertySnapshot) {
        self.properties
            .write()
            .await
            .insert(snapshot.property_id, snapshot);
    }
}

#[async_trait::async_trait]
impl PropertyCatalog for MemoryPropertyCatalog {
    async fn snapshot(&self, property_id: i64) -> Result<Option<PropertySnapshot>, StoreError> {
        Ok(self.properties.read().await.get(&property_id).cloned())
    }
}
