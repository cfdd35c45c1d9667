use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::stock::{Location, NewProductBatch, ProductBatch};
use crate::repositories::StockLookup;

/// How a receipt line's location was determined.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedLocation {
    /// Caller supplied the location; existence is enforced downstream by
    /// the inventory subsystem.
    Provided { location_id: Uuid },
    /// Fell back to the system default location.
    Default { location: Location },
}

impl ResolvedLocation {
    pub fn location_id(&self) -> Uuid {
        match self {
            ResolvedLocation::Provided { location_id } => *location_id,
            ResolvedLocation::Default { location } => location.id,
        }
    }
}

/// How a receipt line's batch was determined.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedBatch {
    Existing(ProductBatch),
    Created(ProductBatch),
}

impl ResolvedBatch {
    pub fn batch_id(&self) -> Uuid {
        match self {
            ResolvedBatch::Existing(batch) | ResolvedBatch::Created(batch) => batch.id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, ResolvedBatch::Created(_))
    }
}

/// Resolves the operational parameters a receipt line may omit: a usable
/// stock location and a product batch, creating the batch when necessary.
#[derive(Clone)]
pub struct AllocationService {
    stock: Arc<dyn StockLookup>,
    batch_prefix: String,
}

impl AllocationService {
    pub fn new(stock: Arc<dyn StockLookup>, config: &AppConfig) -> Self {
        Self {
            stock,
            batch_prefix: config.batch_number_prefix.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve_location(
        &self,
        requested: Option<Uuid>,
    ) -> Result<ResolvedLocation, ServiceError> {
        if let Some(location_id) = requested {
            return Ok(ResolvedLocation::Provided { location_id });
        }
        let location = self
            .stock
            .find_default_location()
            .await?
            .ok_or(ServiceError::NoLocationAvailable)?;
        info!(location_id = %location.id, code = %location.code, "resolved default location");
        Ok(ResolvedLocation::Default { location })
    }

    /// Uses the requested batch when it exists; otherwise creates one with
    /// zero initial quantity. Stock movements, not creation, adjust the
    /// batch quantity.
    #[instrument(skip(self))]
    pub async fn resolve_batch(
        &self,
        requested: Option<Uuid>,
        product_id: Uuid,
        item_id: Uuid,
        po_number: Option<&str>,
    ) -> Result<ResolvedBatch, ServiceError> {
        if let Some(batch_id) = requested {
            if let Some(batch) = self.stock.find_batch(batch_id).await? {
                return Ok(ResolvedBatch::Existing(batch));
            }
            info!(%batch_id, "requested batch not found, creating a replacement");
        }
        let batch_no = self.batch_number(po_number, item_id);
        let created = self
            .stock
            .create_batch(NewProductBatch {
                product_id,
                batch_no,
                initial_quantity: 0,
            })
            .await
            .map_err(|e| ServiceError::BatchCreationFailed(e.to_string()))?;
        info!(batch_id = %created.id, batch_no = %created.batch_no, "created batch for receipt");
        Ok(ResolvedBatch::Created(created))
    }

    /// `{prefix}-PO-{po_number}-{first 8 of item id}` when order context
    /// is known, else a time/random number.
    fn batch_number(&self, po_number: Option<&str>, item_id: Uuid) -> String {
        match po_number {
            Some(po) => {
                let item8 = item_id.simple().to_string()[..8].to_uppercase();
                format!("{}-PO-{}-{}", self.batch_prefix, po, item8)
            }
            None => {
                let suffix: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(6)
                    .map(char::from)
                    .collect::<String>()
                    .to_uppercase();
                format!(
                    "{}-{}-{}",
                    self.batch_prefix,
                    Utc::now().timestamp_millis(),
                    suffix
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryStockStore;
    use assert_matches::assert_matches;

    fn service(stock: Arc<InMemoryStockStore>) -> AllocationService {
        AllocationService::new(stock, &AppConfig::default())
    }

    #[tokio::test]
    async fn provided_location_passes_through_unresolved() {
        let stock = Arc::new(InMemoryStockStore::new());
        let svc = service(stock);
        let location_id = Uuid::new_v4();

        let resolved = svc.resolve_location(Some(location_id)).await.unwrap();
        assert_matches!(resolved, ResolvedLocation::Provided { location_id: id } if id == location_id);
    }

    #[tokio::test]
    async fn missing_location_resolves_to_default() {
        let stock = Arc::new(InMemoryStockStore::new());
        stock.add_location("A-01", "Aisle 1");
        let default = stock.add_location("DEFAULT", "Receiving dock");
        let svc = service(stock);

        let resolved = svc.resolve_location(None).await.unwrap();
        assert_eq!(resolved.location_id(), default.id);
        assert_matches!(resolved, ResolvedLocation::Default { .. });
    }

    #[tokio::test]
    async fn no_locations_at_all_is_an_error() {
        let svc = service(Arc::new(InMemoryStockStore::new()));
        let err = svc.resolve_location(None).await.unwrap_err();
        assert_matches!(err, ServiceError::NoLocationAvailable);
    }

    #[tokio::test]
    async fn existing_batch_is_reused() {
        let stock = Arc::new(InMemoryStockStore::new());
        let product_id = Uuid::new_v4();
        let batch = stock
            .create_batch(NewProductBatch {
                product_id,
                batch_no: "LOT-7".into(),
                initial_quantity: 0,
            })
            .await
            .unwrap();
        let svc = service(stock);

        let resolved = svc
            .resolve_batch(Some(batch.id), product_id, Uuid::new_v4(), Some("PO-202501-AAAAAA"))
            .await
            .unwrap();
        assert_matches!(resolved, ResolvedBatch::Existing(b) if b.id == batch.id);
    }

    #[tokio::test]
    async fn missing_batch_is_created_with_traceable_number() {
        let stock = Arc::new(InMemoryStockStore::new());
        let svc = service(stock.clone());
        let product_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();

        let resolved = svc
            .resolve_batch(None, product_id, item_id, Some("PO-202501-AAAAAA"))
            .await
            .unwrap();

        assert!(resolved.was_created());
        let batch = stock.find_batch(resolved.batch_id()).await.unwrap().unwrap();
        assert_eq!(batch.quantity, 0);
        let item8 = item_id.simple().to_string()[..8].to_uppercase();
        assert_eq!(batch.batch_no, format!("BATCH-PO-PO-202501-AAAAAA-{}", item8));
    }

    #[tokio::test]
    async fn dangling_batch_reference_gets_a_replacement() {
        let stock = Arc::new(InMemoryStockStore::new());
        let svc = service(stock.clone());

        let resolved = svc
            .resolve_batch(Some(Uuid::new_v4()), Uuid::new_v4(), Uuid::new_v4(), Some("PO-202501-BBBBBB"))
            .await
            .unwrap();
        assert!(resolved.was_created());
    }

    #[tokio::test]
    async fn batch_number_without_order_context_is_time_based() {
        let stock = Arc::new(InMemoryStockStore::new());
        let svc = service(stock);

        let resolved = svc
            .resolve_batch(None, Uuid::new_v4(), Uuid::new_v4(), None)
            .await
            .unwrap();
        let ResolvedBatch::Created(batch) = resolved else {
            panic!("expected created batch");
        };
        assert!(batch.batch_no.starts_with("BATCH-"));
        // BATCH-{millis}-{6 alphanumerics}
        let parts: Vec<&str> = batch.batch_no.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
    }
}
