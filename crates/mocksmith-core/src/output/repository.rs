use async_trait::async_trait;

use crate::error::Result;
use crate::generate::value::{RowSnapshot, Value};
use crate::schema::descriptor::EntityDescriptor;

/// Persistence seam for `Pipeline::generate_and_insert`.
///
/// `insert` receives one sub-batch, already bound and with store-assigned
/// keys cleared, and returns the rows as stored: same order, same length,
/// with every assigned primary key filled in. Those returned rows are what
/// later entities sample their foreign keys from.
#[async_trait]
pub trait RowRepository: Send + Sync {
    async fn insert(
        &self,
        entity: &EntityDescriptor,
        rows: Vec<RowSnapshot>,
    ) -> Result<Vec<RowSnapshot>>;
}

/// True when `value` should be replaced by a store-assigned identity.
pub(crate) fn is_unassigned_key(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null) | Some(Value::Int(0)))
}
