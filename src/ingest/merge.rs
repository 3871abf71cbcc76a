use tracing::debug;

use crate::model::{EntityKind, EntityRecord};
use crate::reference::ReferenceCatalog;

/// Stamps every record with `timestamp` and copies route metadata onto bus records.
///
/// A bus whose route is not in the catalog is kept with empty route metadata.
/// Returns the merged records and how many buses had no route match.
pub fn merge(
    batches: Vec<Vec<EntityRecord>>,
    catalog: &ReferenceCatalog,
    timestamp: i64,
) -> (Vec<EntityRecord>, usize) {
    let mut mismatches = 0;
    let mut merged = Vec::with_capacity(batches.iter().map(Vec::len).sum());

    for mut record in batches.into_iter().flatten() {
        record.timestamp = Some(timestamp);
        if let EntityKind::Bus(bus) = &mut record.kind {
            match catalog.route(&bus.route) {
                Some(info) => {
                    bus.route_agency_name = info.agency_name.clone();
                    bus.route_long_name = info.long_name.clone();
                    bus.route_short_name = info.short_name.clone();
                }
                None => {
                    debug!(bus = %bus.bus_id, route = %bus.route, "Route not in catalog");
                    bus.route_agency_name.clear();
                    bus.route_long_name.clear();
                    bus.route_short_name.clear();
                    mismatches += 1;
                }
            }
        }
        merged.push(record);
    }
    (merged, mismatches)
}
