//! Single-field checks used by the resolvers.
//!
//! Each check is independent; callers feed the results into an
//! [`ErrorAggregator`](crate::error::ErrorAggregator) so one failure never
//! hides another.

use crate::error::ResolveError;

/// Fails when `value` is negative, naming the field and the value.
pub fn non_negative(field: &'static str, value: i64) -> Result<(), ResolveError> {
    if value < 0 {
        return Err(ResolveError::Negative { field, value });
    }
    Ok(())
}

/// [`non_negative`] for an optional field; absent stays absent.
pub fn optional_non_negative(
    field: &'static str,
    value: Option<i64>,
) -> Result<Option<u64>, ResolveError> {
    match value {
        None => Ok(None),
        Some(v) => non_negative(field, v).map(|()| Some(v.unsigned_abs())),
    }
}
