//! Property-based test generators using proptest.

use catalyst_protocol::{EntityType, Pointer};
use proptest::prelude::*;

/// Strategy for a parcel coordinate pointer such as `"-12,40"`.
pub fn parcel_strategy() -> impl Strategy<Value = Pointer> {
    (-150i32..150, -150i32..150).prop_map(|(x, y)| format!("{x},{y}"))
}

/// Strategy for between 1 and `max` distinct parcel pointers.
pub fn parcels_strategy(max: usize) -> impl Strategy<Value = Vec<Pointer>> {
    prop::collection::btree_set(parcel_strategy(), 1..=max.max(1))
        .prop_map(|set| set.into_iter().collect())
}

/// Strategy for any entity type.
pub fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

/// Strategy for file contents.
pub fn file_bytes_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for a signed offset in milliseconds within `±range_ms`.
pub fn timestamp_offset_strategy(range_ms: i64) -> impl Strategy<Value = i64> {
    -range_ms..=range_ms
}
