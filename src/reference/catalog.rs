use std::collections::HashMap;

use tracing::debug;

use crate::error::StoreResult;
use crate::model::{EntityKind, EntityRecord, ObjectType};
use crate::store::SnapshotStore;

/// Route metadata copied onto bus records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteInfo {
    pub agency_name: String,
    pub long_name: String,
    pub short_name: String,
}

/// Route lookup by route id. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    routes: HashMap<String, RouteInfo>,
}

impl ReferenceCatalog {
    /// Indexes every `BusRoute` in `records`; other kinds are ignored. A route with
    /// no known agency gets an empty agency name.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EntityRecord>) -> Self {
        let routes = records
            .into_iter()
            .filter_map(|record| match &record.kind {
                EntityKind::BusRoute(route) => Some((
                    route.route_id.clone(),
                    RouteInfo {
                        agency_name: route.agency_name.clone().unwrap_or_default(),
                        long_name: route.long_name.clone(),
                        short_name: route.short_name.clone(),
                    },
                )),
                _ => None,
            })
            .collect();
        Self { routes }
    }

    /// Builds the catalog from the routes held in the permanent store.
    pub async fn load(store: &dyn SnapshotStore) -> StoreResult<Self> {
        let records = store.query_by_type(ObjectType::BusRoute).await?;
        let catalog = Self::from_records(&records);
        debug!(routes = catalog.len(), "Reference catalog loaded");
        Ok(catalog)
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteInfo> {
        self.routes.get(route_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Database, SqliteSnapshotStore, Table};
    use crate::test_utils::{bus, route};

    #[test]
    fn test_lookup_by_route_id() {
        let records = vec![route("R1", Some("Dublin Bus")), route("R2", None), bus("V1", "R1")];
        let catalog = ReferenceCatalog::from_records(&records);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.route("R1").unwrap().agency_name, "Dublin Bus");
        assert_eq!(catalog.route("R1").unwrap().short_name, "R1s");
        assert_eq!(catalog.route("R2").unwrap().agency_name, "");
        assert!(catalog.route("R9").is_none());
    }

    #[tokio::test]
    async fn test_load_from_permanent_store() {
        let store = SqliteSnapshotStore::new(Database::open_in_memory().unwrap(), Table::Permanent, 1);
        store
            .append(&[route("R1", Some("Go-Ahead")), route("R2", None)])
            .await
            .unwrap();

        let catalog = ReferenceCatalog::load(&store).await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.route("R1").unwrap().long_name, "R1 long");
    }
}
